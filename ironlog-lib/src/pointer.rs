//src/pointer.rs
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::ObjectId;

#[derive(Error, Debug)]
pub enum PointerError {
    #[error("I/O error accessing session pointer '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode session pointer: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Session pointer '{path}' is unreadable: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The file remembering which workout is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPointer {
    path: PathBuf,
    write_attempts: u32,
}

impl SessionPointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_attempts: 1,
        }
    }

    /// Retries failed writes up to `attempts` times in total (minimum 1).
    #[must_use]
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// An absent or empty file means no session.
    /// # Errors
    /// `PointerError::Io` on read failure, `PointerError::Decode` on garbage.
    pub fn read(&self) -> Result<Option<ObjectId>, PointerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PointerError::Decode {
                path: self.path.clone(),
                source,
            })
    }

    /// Atomically replaces the file with `id`.
    /// # Errors
    /// The last failure once every attempt has been used.
    pub fn write(&self, id: &ObjectId) -> Result<(), PointerError> {
        let encoded = serde_json::to_vec(id).map_err(PointerError::Encode)?;
        let mut attempt = 1;
        loop {
            match self.write_once(&encoded) {
                Ok(()) => {
                    debug!(%id, path = %self.path.display(), "Wrote session pointer");
                    return Ok(());
                }
                Err(e) if attempt < self.write_attempts => {
                    warn!("Session pointer write attempt {attempt} failed: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(self.io_error(e)),
            }
        }
    }

    /// Returns whether a file was removed. A missing file is fine.
    /// # Errors
    /// `PointerError::Io` for failures other than the file being absent.
    pub fn remove(&self) -> Result<bool, PointerError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn write_once(&self, encoded: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)?;
        restrict_permissions(&tmp_file)?;
        tmp_file.write_all(encoded)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("pointer"), OsString::from);
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> PointerError {
        PointerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}
