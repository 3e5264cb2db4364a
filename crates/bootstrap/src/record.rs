//! Persisted record of how a node bootstrapped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::NodeRole;

/// Written by a node once its role is settled so peers and operators can
/// check which secret the cluster was formed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRecord {
    /// Name of the node that wrote the record.
    pub identity: String,

    /// Role the node bootstrapped with.
    pub role: NodeRole,

    /// Fingerprint of the cluster secret in use, if one was loaded.
    pub secret_fingerprint: Option<String>,

    /// Seconds since the Unix epoch.
    pub recorded_at: u64,
}

impl BootstrapRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        role: NodeRole,
        secret_fingerprint: Option<String>,
    ) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());

        Self {
            identity: identity.into(),
            role,
            secret_fingerprint,
            recorded_at,
        }
    }

    /// Reads a record, returning `None` if none has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn read(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let contents = match tokio::fs::read(path.as_ref()).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io("failed to read bootstrap record", e)),
        };

        Ok(Some(serde_json::from_slice(&contents)?))
    }

    /// Writes the record, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub async fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let contents = serde_json::to_vec_pretty(self)?;

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Io("failed to create bootstrap record directory", e))?;

        let written = path.clone();
        tokio::task::spawn_blocking(move || replace(&dir, &written, &contents))
            .await
            .map_err(|e| {
                Error::Io("bootstrap record writer failed", std::io::Error::other(e))
            })??;

        debug!("wrote bootstrap record to {}", path.display());

        Ok(())
    }
}

fn replace(dir: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| Error::Io("failed to create temporary bootstrap record", e))?;
    file.write_all(contents)
        .map_err(|e| Error::Io("failed to write bootstrap record", e))?;
    file.persist(path)
        .map_err(|e| Error::Io("failed to replace bootstrap record", e.error))?;

    Ok(())
}
