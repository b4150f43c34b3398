//! File Store
//!
//! A directory per stage under one root. A file's stage is the directory it
//! sits in and its identity is its name; there is no index.
//!
//! Moves never leave a file in two stages or in none: a same-filesystem
//! `rename` is tried first, and the fallback copies, syncs and verifies the
//! copy before removing the source.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// A named stage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Incoming,
    Written,
    Mangled,
    Errored,
    Discarded,
    PitWritten,
    Archive,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Incoming,
        Stage::Written,
        Stage::Mangled,
        Stage::Errored,
        Stage::Discarded,
        Stage::PitWritten,
        Stage::Archive,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Incoming => "Incoming",
            Stage::Written => "Written",
            Stage::Mangled => "Mangled",
            Stage::Errored => "Errored",
            Stage::Discarded => "Discarded",
            Stage::PitWritten => "PitWritten",
            Stage::Archive => "Archive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Directory-backed staging area
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    pub fn path(&self, stage: Stage, name: &str) -> PathBuf {
        self.stage_dir(stage).join(name)
    }

    /// Create every stage directory
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        for stage in Stage::ALL {
            fs::create_dir_all(self.stage_dir(stage))?;
        }
        Ok(())
    }

    /// Files currently in `stage`
    ///
    /// The listing is read lazily from the directory and yields whatever
    /// order the filesystem returns. A stage directory that does not exist
    /// yet is empty.
    pub fn list_pending(&self, stage: Stage) -> Result<PendingFiles, StoreError> {
        match fs::read_dir(self.stage_dir(stage)) {
            Ok(entries) => Ok(PendingFiles { entries: Some(entries) }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PendingFiles { entries: None }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn contains(&self, stage: Stage, name: &str) -> bool {
        validate_name(name).is_ok() && self.path(stage, name).is_file()
    }

    pub fn read(&self, stage: Stage, name: &str) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        match fs::read(self.path(stage, name)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::Missing {
                name: name.to_string(),
                stage,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new file in `stage`
    ///
    /// The bytes land in a hidden temp file first and are renamed into
    /// place, so listings never see a half-written file. An existing file
    /// with the same name is never replaced.
    pub fn write_new(&self, stage: Stage, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_name(name)?;
        let dir = self.stage_dir(stage);
        fs::create_dir_all(&dir)?;

        let target = dir.join(name);
        if target.exists() {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
                stage,
            });
        }

        let temp = dir.join(format!(".{}.tmp", name));
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Move `name` from one stage to another
    ///
    /// Fails when the source is missing or the destination already holds a
    /// file of that name, so repeating a completed move is an error. On any
    /// failure the source is left untouched.
    pub fn move_file(&self, name: &str, from: Stage, to: Stage) -> Result<(), StoreError> {
        self.relocate(name, from, to, false)
    }

    /// Move `name` from one stage to another, replacing any file of that
    /// name already in the destination
    ///
    /// Pit visits are keyed by team alone, so a later visit supersedes the
    /// earlier one. A missing source is still an error.
    pub fn replace_file(&self, name: &str, from: Stage, to: Stage) -> Result<(), StoreError> {
        self.relocate(name, from, to, true)
    }

    fn relocate(&self, name: &str, from: Stage, to: Stage, replace: bool) -> Result<(), StoreError> {
        validate_name(name)?;
        let src = self.path(from, name);
        let dst = self.path(to, name);

        if !src.is_file() {
            return Err(StoreError::Missing {
                name: name.to_string(),
                stage: from,
            });
        }

        let move_error = |source| StoreError::Move {
            name: name.to_string(),
            from,
            to,
            source,
        };

        fs::create_dir_all(self.stage_dir(to)).map_err(move_error)?;
        if dst.exists() {
            if !replace {
                return Err(StoreError::AlreadyExists {
                    name: name.to_string(),
                    stage: to,
                });
            }
            info!(file = %name, stage = %to, "Replacing earlier file");
        }

        match fs::rename(&src, &dst) {
            Ok(()) => {
                debug!(file = %name, from = %from, to = %to, "Moved file");
                Ok(())
            }
            Err(e) => {
                debug!(file = %name, error = %e, "Rename failed, falling back to copy");
                copy_then_remove(&src, &dst).map_err(move_error)
            }
        }
    }
}

/// Copy, verify, then remove the source; undo the copy on failure
fn copy_then_remove(src: &Path, dst: &Path) -> std::io::Result<()> {
    let result = (|| -> std::io::Result<()> {
        let copied = fs::copy(src, dst)?;
        fs::File::open(dst)?.sync_all()?;

        let expected = fs::metadata(src)?.len();
        if copied != expected || fs::metadata(dst)?.len() != expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("copy verification failed ({} of {} bytes)", copied, expected),
            ));
        }
        fs::remove_file(src)
    })();

    if result.is_err() && src.exists() {
        if let Err(e) = fs::remove_file(dst) {
            warn!(path = %dst.display(), error = %e, "Could not remove partial copy");
        }
    }
    result
}

/// Reject names that would escape the stage directory
fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..");
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Lazy listing of one stage
///
/// Yields regular file names, skipping hidden temp files. Single pass; list
/// again to see new arrivals.
pub struct PendingFiles {
    entries: Option<fs::ReadDir>,
}

impl Iterator for PendingFiles {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => return Some(name),
                Ok(_) => continue,
                Err(raw) => debug!(name = ?raw, "Skipping non UTF-8 file name"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_write_and_list() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"{}").unwrap();
        store.write_new(Stage::Incoming, "b.json", b"{}").unwrap();

        let mut names: Vec<String> = store.list_pending(Stage::Incoming).unwrap().collect();
        names.sort();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_list_missing_stage_is_empty() {
        let (_dir, store) = store();
        assert_eq!(store.list_pending(Stage::Archive).unwrap().count(), 0);
    }

    #[test]
    fn test_list_skips_hidden_and_directories() {
        let (_dir, store) = store();
        store.ensure_layout().unwrap();
        fs::write(store.stage_dir(Stage::Incoming).join(".x.json.tmp"), b"").unwrap();
        fs::create_dir(store.stage_dir(Stage::Incoming).join("nested")).unwrap();
        store.write_new(Stage::Incoming, "real.json", b"{}").unwrap();

        let names: Vec<String> = store.list_pending(Stage::Incoming).unwrap().collect();
        assert_eq!(names, vec!["real.json"]);
    }

    #[test]
    fn test_write_new_refuses_existing() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"1").unwrap();
        let err = store.write_new(Stage::Incoming, "a.json", b"2").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.read(Stage::Incoming, "a.json").unwrap(), b"1");
    }

    #[test]
    fn test_move_creates_destination() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"data").unwrap();

        store.move_file("a.json", Stage::Incoming, Stage::Written).unwrap();
        assert!(!store.contains(Stage::Incoming, "a.json"));
        assert_eq!(store.read(Stage::Written, "a.json").unwrap(), b"data");
    }

    #[test]
    fn test_repeated_move_is_error() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"data").unwrap();
        store.move_file("a.json", Stage::Incoming, Stage::Written).unwrap();

        let err = store.move_file("a.json", Stage::Incoming, Stage::Written).unwrap_err();
        assert!(matches!(err, StoreError::Missing { stage: Stage::Incoming, .. }));
    }

    #[test]
    fn test_move_onto_existing_leaves_source() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"new").unwrap();
        store.write_new(Stage::Written, "a.json", b"old").unwrap();

        let err = store.move_file("a.json", Stage::Incoming, Stage::Written).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { stage: Stage::Written, .. }));
        assert_eq!(store.read(Stage::Incoming, "a.json").unwrap(), b"new");
        assert_eq!(store.read(Stage::Written, "a.json").unwrap(), b"old");
    }

    #[test]
    fn test_replace_overwrites_existing() {
        let (_dir, store) = store();
        store.write_new(Stage::Incoming, "a.json", b"new").unwrap();
        store.write_new(Stage::PitWritten, "a.json", b"old").unwrap();

        store.replace_file("a.json", Stage::Incoming, Stage::PitWritten).unwrap();
        assert!(!store.contains(Stage::Incoming, "a.json"));
        assert_eq!(store.read(Stage::PitWritten, "a.json").unwrap(), b"new");
    }

    #[test]
    fn test_replace_missing_source_is_error() {
        let (_dir, store) = store();
        let err = store.replace_file("a.json", Stage::Incoming, Stage::PitWritten).unwrap_err();
        assert!(matches!(err, StoreError::Missing { stage: Stage::Incoming, .. }));
    }

    #[test]
    fn test_copy_fallback_removes_source() {
        let (dir, _store) = store();
        let src = dir.path().join("src.json");
        let dst = dir.path().join("dst.json");
        fs::write(&src, b"payload").unwrap();

        copy_then_remove(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (_dir, store) = store();
        for name in ["", "../x.json", "a/b.json", ".hidden"] {
            assert!(matches!(
                store.write_new(Stage::Incoming, name, b"{}"),
                Err(StoreError::InvalidName(_))
            ));
        }
    }
}
