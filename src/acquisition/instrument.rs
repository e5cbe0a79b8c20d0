use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use super::macro_file::{CSV_OUTPUT, SPA_OUTPUT};

pub const DEFAULT_PROG_ID: &str = "OmnicApp.OmnicApp";

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("could not launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("automation call failed ({status}): {stderr}")]
    Automation { status: String, stderr: String },

    #[error("simulated collection failed: {0}")]
    Simulation(#[from] std::io::Error),
}

/// Something that can run an OMNIC macro.
///
/// `run_macro` only starts the macro; completion is detected by polling for
/// its output files.
pub trait Instrument {
    fn run_macro(&mut self, macro_path: &Path) -> Result<(), InstrumentError>;
}

// ---------------------------------------------------------------------------
// OMNIC through COM automation
// ---------------------------------------------------------------------------

/// Drives OMNIC through its COM automation object by submitting
/// `RunMacro <short path>` from a PowerShell host.
#[derive(Debug, Clone)]
pub struct OmnicApp {
    pub prog_id: String,
    pub shell: String,
}

impl Default for OmnicApp {
    fn default() -> Self {
        OmnicApp {
            prog_id: DEFAULT_PROG_ID.to_string(),
            shell: "powershell".to_string(),
        }
    }
}

impl OmnicApp {
    /// PowerShell that resolves the 8.3 short path (OMNIC's command parser
    /// splits on spaces) and hands it to `ExecuteCommand`.
    pub fn automation_script(&self, macro_path: &Path) -> String {
        let path = ps_quote(&macro_path.display().to_string());
        let prog_id = ps_quote(&self.prog_id);
        format!(
            "$ErrorActionPreference = 'Stop'; \
             $short = (New-Object -ComObject Scripting.FileSystemObject).GetFile({path}).ShortPath; \
             $app = New-Object -ComObject {prog_id}; \
             $app.ExecuteCommand(\"RunMacro $short\") | Out-Null"
        )
    }
}

impl Instrument for OmnicApp {
    fn run_macro(&mut self, macro_path: &Path) -> Result<(), InstrumentError> {
        let absolute = std::path::absolute(macro_path).unwrap_or_else(|_| macro_path.to_path_buf());
        let output = Command::new(&self.shell)
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(self.automation_script(&absolute))
            .output()
            .map_err(|source| InstrumentError::Launch {
                program: self.shell.clone(),
                source,
            })?;

        if output.status.success() {
            log::debug!("RunMacro submitted for {}", absolute.display());
            Ok(())
        } else {
            Err(InstrumentError::Automation {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Single-quoted PowerShell literal.
fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Stand-in for the spectrometer: every macro run immediately writes a
/// synthetic spectrum as `processing.csv` plus a raw little-endian `f32`
/// intensity dump as `processing.spa`.
#[derive(Debug, Clone)]
pub struct Simulator {
    output_dir: PathBuf,
    runs: u32,
}

impl Simulator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Simulator {
            output_dir: output_dir.into(),
            runs: 0,
        }
    }

    /// Absorbance at `wavenumber` after `run` collections: a sloped
    /// background with a carbonyl band growing over time.
    pub fn absorbance(wavenumber: f64, run: u32) -> f64 {
        let growth = 1.0 - (-(run as f64) / 8.0).exp();
        let band = 0.6 * growth * (-((wavenumber - 1715.0) / 18.0).powi(2)).exp();
        let background = 0.05 + 2e-5 * (wavenumber - 400.0);
        background + band
    }
}

impl Instrument for Simulator {
    fn run_macro(&mut self, _macro_path: &Path) -> Result<(), InstrumentError> {
        let wavenumbers = (0..1800).map(|i| 4000.0 - 2.0 * i as f64);
        let mut csv = Vec::new();
        let mut spa = Vec::new();
        for w in wavenumbers {
            let a = Simulator::absorbance(w, self.runs);
            writeln!(csv, "{w:.4},{a:.6}")?;
            spa.extend_from_slice(&(a as f32).to_le_bytes());
        }
        fs::write(self.output_dir.join(CSV_OUTPUT), csv)?;
        fs::write(self.output_dir.join(SPA_OUTPUT), spa)?;
        self.runs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_quotes_path_and_prog_id() {
        let app = OmnicApp::default();
        let script = app.automation_script(Path::new(r"C:\Users\o'neil\run dir\collect.mac"));
        assert!(script.contains(r"GetFile('C:\Users\o''neil\run dir\collect.mac')"));
        assert!(script.contains("New-Object -ComObject 'OmnicApp.OmnicApp'"));
        assert!(script.contains("ExecuteCommand(\"RunMacro $short\")"));
    }

    #[test]
    fn missing_shell_is_a_launch_error() {
        let mut app = OmnicApp {
            shell: "definitely-not-a-shell-5f1c".into(),
            ..Default::default()
        };
        let err = app.run_macro(Path::new("collect.mac")).unwrap_err();
        assert!(matches!(err, InstrumentError::Launch { .. }));
    }

    #[test]
    fn simulator_writes_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = Simulator::new(dir.path());
        sim.run_macro(Path::new("collect.mac")).unwrap();

        let csv = fs::read_to_string(dir.path().join(CSV_OUTPUT)).unwrap();
        assert_eq!(csv.lines().count(), 1800);
        assert!(csv.starts_with("4000.0000,"));
        let spa = fs::read(dir.path().join(SPA_OUTPUT)).unwrap();
        assert_eq!(spa.len(), 1800 * 4);
    }

    #[test]
    fn simulated_band_grows() {
        assert!(Simulator::absorbance(1715.0, 10) > Simulator::absorbance(1715.0, 1));
        let background = 0.05 + 2e-5 * (1715.0 - 400.0);
        assert!((Simulator::absorbance(1715.0, 0) - background).abs() < 1e-12);
    }
}
