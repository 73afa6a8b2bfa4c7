//! Write-then-commit files
//!
//! A [`StagedFile`] is written under a `.partial` sibling name and only
//! appears at its final path once [`StagedFile::commit`] renames it. A staged
//! file that is discarded, or dropped without being settled, is removed, so
//! readers never observe a half-written output.

use crate::error::{FscacheError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

/// An output file that is not visible at its final path until committed
#[derive(Debug)]
pub struct StagedFile {
    final_path: PathBuf,
    partial_path: PathBuf,
    settled: bool,
}

impl StagedFile {
    /// Create the staging file next to `final_path`, truncating any leftover
    /// partial file from an earlier run. Returns the handle to write into.
    pub async fn create(final_path: impl Into<PathBuf>) -> Result<(Self, File)> {
        let final_path = final_path.into();
        let partial_path = partial_path_for(&final_path)?;

        let file = File::create(&partial_path).await?;
        debug!(path = %partial_path.display(), "Created staging file");

        Ok((
            Self {
                final_path,
                partial_path,
                settled: false,
            },
            file,
        ))
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Move the staged content to its final path, replacing any previous file.
    pub async fn commit(mut self) -> Result<PathBuf> {
        tokio::fs::rename(&self.partial_path, &self.final_path).await?;
        self.settled = true;
        debug!(path = %self.final_path.display(), "Committed staged file");
        Ok(self.final_path.clone())
    }

    /// Remove the staged content. The final path is left untouched.
    pub async fn discard(mut self) -> Result<()> {
        self.settled = true;
        match tokio::fs::remove_file(&self.partial_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.partial_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.partial_path.display(), error = %e, "Failed to remove abandoned staging file");
            }
        }
    }
}

fn partial_path_for(final_path: &Path) -> Result<PathBuf> {
    let file_name = final_path.file_name().ok_or_else(|| FscacheError::InvalidPath {
        path: final_path.display().to_string(),
        reason: "path has no file name".to_string(),
    })?;

    let mut partial: OsString = file_name.to_os_string();
    partial.push(PARTIAL_SUFFIX);
    Ok(final_path.with_file_name(partial))
}
