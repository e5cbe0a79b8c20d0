use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// File name of the generated macro, rewritten before every collection.
pub const MACRO_FILE: &str = "collect.mac";
/// Export written by the macro; always the same name, whatever the sample.
pub const CSV_OUTPUT: &str = "processing.csv";
/// Native OMNIC spectrum written by the macro.
pub const SPA_OUTPUT: &str = "processing.spa";

pub const DEFAULT_EXPERIMENT: &str = r"C:\my documents\omnic\Param\Default.exp";

/// An OMNIC macro that loads an experiment, collects one sample and exports
/// it as `processing.csv` and `processing.spa`.
#[derive(Debug, Clone)]
pub struct MacroScript {
    pub sample_name: String,
    pub experiment_file: String,
    pub author: String,
}

impl MacroScript {
    pub fn new(sample_name: impl Into<String>) -> Self {
        MacroScript {
            sample_name: sample_name.into(),
            experiment_file: DEFAULT_EXPERIMENT.to_string(),
            author: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn with_experiment(mut self, experiment_file: impl Into<String>) -> Self {
        self.experiment_file = experiment_file.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Title OMNIC gives the collected spectrum.
    pub fn spectrum_title(&self) -> String {
        format!("spectrum_{}", self.sample_name)
    }

    /// Macro text: header, command script, flag section and the task list,
    /// separated by `§` lines.
    pub fn render(&self) -> String {
        let title = self.spectrum_title();
        let experiment = &self.experiment_file;
        let lines = [
            "OmnicMacroFile Version 10.0,".to_string(),
            format!("caption,Macros\\Basic - {MACRO_FILE}"),
            format!(">pName,{MACRO_FILE}"),
            ">pComments,".to_string(),
            format!(">pAuthor,{}", self.author),
            ">pReset,true".to_string(),
            ">pFormat,?".to_string(),
            "§".to_string(),
            r#"send updateReadout "Open Experiment", 1"#.to_string(),
            format!(r#"send executeOmnic "[LoadParameters " & getRTSFN("{experiment}") & "]""#),
            r#"send updateReadout "Collect Sample", 2"#.to_string(),
            "send enableApp false".to_string(),
            format!(r#"send executeOmnic "[Invoke CollectSample ""{title}"" AUTO POLLING]""#),
            r#"send waitOnInvoke "CollectSample""#.to_string(),
            r#"send updateReadout "Save As", 3"#.to_string(),
            format!(r#"send executeOmnic "[Export " & getRTSFN("{CSV_OUTPUT}") & "]""#),
            r#"send updateReadout "Save As", 4"#.to_string(),
            format!(r#"send executeOmnic "[Export " & getRTSFN("{SPA_OUTPUT}") & "]""#),
            r#"sysError = "ok""#.to_string(),
            "send updateReadout".to_string(),
            "§".to_string(),
            "false".to_string(),
            "§".to_string(),
        ];

        let mut text = lines.join("\r\n");
        text.push_str("\r\n");
        for task in [
            task_button("Open Experiment", "LoadParameters", &format!(r#""{experiment}",false,1,1,1,1"#)),
            task_button("Collect Sample", "CollectSample", &format!(r#""{title}",true,false,false"#)),
            task_button("Save As", "SaveAs", &format!(r#""{CSV_OUTPUT}",false"#)),
            task_button("Save As", "SaveAs", &format!(r#""{SPA_OUTPUT}",false"#)),
        ] {
            text.push_str(&task);
        }
        text.push_str("§\r\n");
        text
    }

    /// Write the macro in the Windows-1252 code page OMNIC expects.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, encode_ansi(&self.render()))
            .with_context(|| format!("writing macro {}", path.display()))?;
        log::info!(
            "Macro file {} generated with sample name {}",
            path.display(),
            self.spectrum_title()
        );
        Ok(())
    }
}

fn task_button(caption: &str, alias: &str, params: &str) -> String {
    format!(
        "Button,{caption}\r\nstrokeColor,240,50,100\r\n>pTaskType,3\r\n>pAlias,{alias}\r\n>pParamList,{params}\r\n¡endTask!\r\n"
    )
}

/// Windows-1252 characters that sit in the 0x80..=0x9F block, by byte.
/// Unassigned bytes hold `None`.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('€'), None, Some('‚'), Some('ƒ'), Some('„'), Some('…'), Some('†'), Some('‡'),
    Some('ˆ'), Some('‰'), Some('Š'), Some('‹'), Some('Œ'), None, Some('Ž'), None,
    None, Some('‘'), Some('’'), Some('“'), Some('”'), Some('•'), Some('–'), Some('—'),
    Some('˜'), Some('™'), Some('š'), Some('›'), Some('œ'), None, Some('ž'), Some('Ÿ'),
];

/// Encode to Windows-1252; characters outside the code page become `?`.
pub fn encode_ansi(text: &str) -> Vec<u8> {
    text.chars().map(cp1252_byte).collect()
}

fn cp1252_byte(c: char) -> u8 {
    match u32::from(c) {
        code @ (0x00..=0x7F | 0xA0..=0xFF) => code as u8,
        _ => CP1252_HIGH
            .iter()
            .position(|&mapped| mapped == Some(c))
            .map_or(b'?', |i| 0x80 + i as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_name_appears_in_collect_and_task_list() {
        let text = MacroScript::new("0007").render();
        assert_eq!(text.matches("spectrum_0007").count(), 2);
        assert!(text.contains(r#"[Invoke CollectSample ""spectrum_0007"" AUTO POLLING]"#));
        assert!(text.contains(r#">pParamList,"spectrum_0007",true,false,false"#));
    }

    #[test]
    fn outputs_are_fixed_names() {
        let text = MacroScript::new("anything").render();
        assert!(text.contains(r#"getRTSFN("processing.csv")"#));
        assert!(text.contains(r#"getRTSFN("processing.spa")"#));
        assert_eq!(text.matches("¡endTask!").count(), 4);
        assert_eq!(text.lines().filter(|l| l.trim_end() == "§").count(), 4);
    }

    #[test]
    fn experiment_and_author_are_configurable() {
        let text = MacroScript::new("0")
            .with_experiment(r"D:\param\kinetics.exp")
            .with_author("lab")
            .render();
        assert!(text.contains(r#"getRTSFN("D:\param\kinetics.exp")"#));
        assert!(text.contains(">pAuthor,lab\r\n"));
    }

    #[test]
    fn ansi_encoding_is_single_byte() {
        assert_eq!(encode_ansi("a§¡"), vec![b'a', 0xA7, 0xA1]);
        assert_eq!(encode_ansi("→"), vec![b'?']);
    }

    #[test]
    fn code_page_block_is_mapped() {
        assert_eq!(encode_ansi("€ – Ÿ"), vec![0x80, b' ', 0x96, b' ', 0x9F]);
        // C1 control characters have no Windows-1252 byte.
        assert_eq!(encode_ansi("\u{0081}\u{0090}"), vec![b'?', b'?']);
        assert_eq!(encode_ansi("Müller"), b"M\xFCller".to_vec());
    }

    #[test]
    fn written_file_starts_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MACRO_FILE);
        MacroScript::new("0001").write_to(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"OmnicMacroFile Version 10.0,\r\n"));
        assert!(bytes.contains(&0xA7));
    }
}
