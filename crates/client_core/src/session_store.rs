use std::{
    fs, io,
    path::{Path, PathBuf},
};

use shared::domain::SessionRecord;
use thiserror::Error;
use tracing::{info, warn};

const APP_DIR_NAME: &str = "distill_editor";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("unable to resolve local app data dir")]
    NoDataDir,
    #[error("failed to access session file '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to encode session record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store rooted at `data_dir`, or the per-user local data dir when absent.
    pub fn in_data_dir(data_dir: Option<&Path>) -> Result<Self, SessionStoreError> {
        let root = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::data_local_dir()
                .ok_or(SessionStoreError::NoDataDir)?
                .join(APP_DIR_NAME),
        };
        Ok(Self::new(root.join(SESSION_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_create(&self) -> Result<SessionRecord, SessionStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => Ok(record),
                Err(error) => {
                    warn!(path = %self.path.display(), %error, "session file unreadable; starting a new session");
                    self.reset()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => self.reset(),
            Err(source) => Err(SessionStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn reset(&self) -> Result<SessionRecord, SessionStoreError> {
        let record = SessionRecord::fresh();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SessionStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let encoded = serde_json::to_string_pretty(&record)?;
        fs::write(&self.path, encoded).map_err(|source| SessionStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(session_id = %record.session_id, path = %self.path.display(), "created session");
        Ok(record)
    }
}
