use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Revocable on-disk preview of a document under review.
///
/// The browser-based client backed previews with object URLs that had to be
/// revoked by hand; the desktop equivalent is a temp-file copy the host can
/// hand to a viewer. Release is explicit and idempotent; the handle is never
/// reclaimed implicitly, so a forgotten release shows up as a leftover file
/// rather than silent growth.
#[derive(Debug)]
pub struct PreviewHandle {
    path: PathBuf,
    released: bool,
}

impl PreviewHandle {
    pub fn acquire(document_id: &str, bytes: &[u8]) -> Result<Self> {
        let dir = std::env::temp_dir().join("fatura-review-previews");
        fs::create_dir_all(&dir).map_err(|e| anyhow!("Preview dir: {}", e))?;
        let path = dir.join(format!("{}.pdf", document_id));
        fs::write(&path, bytes).map_err(|e| anyhow!("Preview write {}: {}", path.display(), e))?;
        Ok(PreviewHandle {
            path,
            released: false,
        })
    }

    /// Path of the preview file, while the handle is live.
    pub fn path(&self) -> Option<&Path> {
        if self.released {
            None
        } else {
            Some(&self.path)
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Removes the preview file. Only the first call does anything.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "could not remove preview file");
        }
    }
}
