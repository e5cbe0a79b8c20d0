use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::macro_file::{CSV_OUTPUT, SPA_OUTPUT};

/// The two files every collection leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Csv,
    Spa,
}

impl Artifact {
    pub const ALL: [Artifact; 2] = [Artifact::Spa, Artifact::Csv];

    /// Fixed name the macro exports to.
    pub fn source_name(self) -> &'static str {
        match self {
            Artifact::Csv => CSV_OUTPUT,
            Artifact::Spa => SPA_OUTPUT,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Artifact::Csv => "csv",
            Artifact::Spa => "spa",
        }
    }

    /// `NNNN.<ext>` for a cycle index.
    pub fn indexed_name(self, index: u32) -> String {
        format!("{index:04}.{}", self.extension())
    }
}

/// What happened to one artifact of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenameOutcome {
    Renamed { to: PathBuf },
    /// No source file: never written, or already consumed.
    Missing,
    /// An earlier file with the target name is kept untouched.
    DestinationExists { to: PathBuf },
    Failed { reason: String },
}

impl RenameOutcome {
    pub fn is_renamed(&self) -> bool {
        matches!(self, RenameOutcome::Renamed { .. })
    }
}

/// Move `processing.<ext>` in `dir` to `<index:04>.<ext>`.
///
/// Never fails: every problem is logged and returned as an outcome so the
/// cycle can carry on without the file. A single `rename` keeps the move
/// atomic, and an existing target is never overwritten.
pub fn rename_output(dir: &Path, artifact: Artifact, index: u32) -> RenameOutcome {
    let source = dir.join(artifact.source_name());
    let target = dir.join(artifact.indexed_name(index));

    if !source.exists() {
        log::warn!("No {} file found in {}", artifact.source_name(), dir.display());
        return RenameOutcome::Missing;
    }
    if target.exists() {
        log::warn!(
            "{} already exists, leaving {} in place",
            target.display(),
            artifact.source_name()
        );
        return RenameOutcome::DestinationExists { to: target };
    }

    match fs::rename(&source, &target) {
        Ok(()) => {
            log::info!("Completed processing {}", target.display());
            RenameOutcome::Renamed { to: target }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("{} disappeared before it could be renamed", source.display());
            RenameOutcome::Missing
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            log::error!("Permission denied renaming {}: {e}", source.display());
            RenameOutcome::Failed {
                reason: format!("permission denied: {e}"),
            }
        }
        Err(e) => {
            log::error!("Could not rename {}: {e}", source.display());
            RenameOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Move a leftover `processing.<ext>` out of the way before cycle `index`
/// starts, so it cannot be taken for that cycle's output.
///
/// The file becomes `processing_stale_<index:04>.<ext>` (with a `_<n>`
/// suffix if that name is taken). Falls back to deleting it; an error means
/// the leftover is still in place.
pub fn set_aside_stale(dir: &Path, artifact: Artifact, index: u32) -> io::Result<Option<PathBuf>> {
    let source = dir.join(artifact.source_name());
    if !source.exists() {
        return Ok(None);
    }

    let ext = artifact.extension();
    let target = (0u32..)
        .map(|n| match n {
            0 => dir.join(format!("processing_stale_{index:04}.{ext}")),
            n => dir.join(format!("processing_stale_{index:04}_{n}.{ext}")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| dir.join(format!("processing_stale.{ext}")));

    match fs::rename(&source, &target) {
        Ok(()) => {
            log::warn!(
                "Leftover {} found before collection {index:04}, moved to {}",
                artifact.source_name(),
                target.display()
            );
            Ok(Some(target))
        }
        Err(e) => {
            log::warn!("Could not move leftover {}: {e}, deleting it", source.display());
            fs::remove_file(&source)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_to_zero_padded_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CSV_OUTPUT), "1,2\n").unwrap();

        let outcome = rename_output(dir.path(), Artifact::Csv, 12);
        assert_eq!(
            outcome,
            RenameOutcome::Renamed {
                to: dir.path().join("0012.csv")
            }
        );
        assert!(!dir.path().join(CSV_OUTPUT).exists());
        assert_eq!(fs::read_to_string(dir.path().join("0012.csv")).unwrap(), "1,2\n");
    }

    #[test]
    fn missing_source_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(rename_output(dir.path(), Artifact::Spa, 0), RenameOutcome::Missing);
        assert!(!dir.path().join("0000.spa").exists());
    }

    #[test]
    fn second_rename_of_same_source_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SPA_OUTPUT), [1u8, 2, 3]).unwrap();
        assert!(rename_output(dir.path(), Artifact::Spa, 3).is_renamed());
        assert_eq!(rename_output(dir.path(), Artifact::Spa, 3), RenameOutcome::Missing);
    }

    #[test]
    fn existing_target_is_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001.csv"), "old").unwrap();
        fs::write(dir.path().join(CSV_OUTPUT), "new").unwrap();

        let outcome = rename_output(dir.path(), Artifact::Csv, 1);
        assert!(matches!(outcome, RenameOutcome::DestinationExists { .. }));
        assert_eq!(fs::read_to_string(dir.path().join("0001.csv")).unwrap(), "old");
        assert!(dir.path().join(CSV_OUTPUT).exists());
    }

    #[test]
    fn names_are_four_digits() {
        assert_eq!(Artifact::Spa.indexed_name(7), "0007.spa");
        assert_eq!(Artifact::Csv.indexed_name(12345), "12345.csv");
    }

    #[test]
    fn leftovers_are_moved_aside_without_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("processing_stale_0002.spa"), "older").unwrap();
        fs::write(dir.path().join(SPA_OUTPUT), "old").unwrap();

        let moved = set_aside_stale(dir.path(), Artifact::Spa, 2).unwrap();
        assert_eq!(moved, Some(dir.path().join("processing_stale_0002_1.spa")));
        assert!(!dir.path().join(SPA_OUTPUT).exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("processing_stale_0002.spa")).unwrap(),
            "older"
        );
        assert_eq!(set_aside_stale(dir.path(), Artifact::Csv, 2).unwrap(), None);
    }
}
