//! Entry points through which new print jobs reach the queue.

use crate::services::queue::{EntryId, IngestError};
use crate::state::ConversionService;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Watches the staging file a printer driver writes to, and accepts files
/// handed over by other applications.
#[derive(Debug, Clone)]
pub struct IngestPoller {
    drop_file: Utf8PathBuf,
}

impl IngestPoller {
    /// Create a poller for `drop_file`, creating its parent directory.
    pub fn new<P: AsRef<Utf8Path>>(drop_file: P) -> std::io::Result<Self> {
        let drop_file = drop_file.as_ref().to_path_buf();
        if let Some(parent) = drop_file.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { drop_file })
    }

    pub fn drop_file(&self) -> &Utf8Path {
        &self.drop_file
    }

    /// Queue the staging file if a non-empty one is present.
    ///
    /// The staging file is deleted once it has been queued. If it cannot be
    /// queued yet (most likely still being written) it is left for the next
    /// tick.
    ///
    /// # Returns
    /// `true` if a file was queued on this call
    pub fn poll_for_dropped_file(&self, service: &ConversionService) -> bool {
        let len = match fs::metadata(&self.drop_file) {
            Ok(meta) => meta.len(),
            Err(_) => return false,
        };
        if len == 0 {
            return false;
        }

        match service.queue_ingest(&self.drop_file) {
            Ok(id) => {
                if let Err(e) = fs::remove_file(&self.drop_file) {
                    tracing::warn!("Failed to remove staging file {}: {}", self.drop_file, e);
                }
                tracing::info!("Picked up print job from {} as {}", self.drop_file, id);
                true
            }
            Err(e) => {
                tracing::debug!("Staging file not ready: {}", e);
                false
            }
        }
    }

    /// Queue a file transferred from another application.
    ///
    /// The source file is left in place.
    pub fn receive_transferred_file(
        &self,
        service: &ConversionService,
        path: &Utf8Path,
    ) -> Result<EntryId, IngestError> {
        let id = service.queue_ingest(path)?;
        tracing::info!("Received {} as {}", path, id);
        Ok(id)
    }
}
