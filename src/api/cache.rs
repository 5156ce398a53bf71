use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::models::LoginResponse;

/// Storage key of the one persisted login snapshot.
pub const SNAPSHOT_KEY: &str = "auth_snapshot";

/// File-backed cache of the last successful login response.
#[derive(Debug, Clone)]
pub struct LoginCache {
    path: PathBuf,
}

impl LoginCache {
    /// `<user cache dir>/based_chat/auth_snapshot.json`, falling back to
    /// the working directory when no cache dir is known.
    pub fn default_location() -> Self {
        let dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("based_chat");
        Self::in_dir(dir)
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join(format!("{SNAPSHOT_KEY}.json")) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing is cached. A corrupt snapshot is discarded.
    pub fn load(&self) -> Result<Option<LoginResponse>, ClientError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| ClientError::cache(self.display(), e))?;
        match serde_json::from_str(&raw) {
            Ok(login) => Ok(Some(login)),
            Err(e) => {
                warn!(path = %self.display(), "Discarding unreadable login snapshot: {e}");
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn store(&self, login: &LoginResponse) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ClientError::cache(self.display(), e))?;
        }
        let raw = serde_json::to_string_pretty(login).map_err(|e| ClientError::cache(self.display(), e))?;
        fs::write(&self.path, raw).map_err(|e| ClientError::cache(self.display(), e))?;
        debug!(path = %self.display(), "Login snapshot stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::cache(self.display(), e)),
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}
