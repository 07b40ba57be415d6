use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::driver::DriverProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub profile: Option<DriverProfile>,
    #[serde(default)]
    pub online: bool,
}

/// Token, profile and availability, mirrored to a JSON file so they survive
/// restarts. Without a path the session lives in memory only.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    data: RwLock<SessionData>,
}

impl SessionStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SessionData>(&raw) {
                Ok(data) => data,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "session file unreadable; starting fresh");
                    SessionData::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => SessionData::default(),
            Err(err) => {
                return Err(AppError::Internal(format!(
                    "failed to read session file {}: {err}",
                    path.display()
                )));
            }
        };

        debug!(path = %path.display(), online = data.online, "session loaded");
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(SessionData::default()),
        }
    }

    pub fn snapshot(&self) -> SessionData {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().token
    }

    pub fn is_online(&self) -> bool {
        self.snapshot().online
    }

    pub fn set_online(&self, online: bool) -> Result<(), AppError> {
        self.update(|data| data.online = online)
    }

    pub fn sign_in(&self, token: String, profile: DriverProfile) -> Result<(), AppError> {
        self.update(|data| {
            data.token = Some(token);
            data.profile = Some(profile);
        })
    }

    pub fn sign_out(&self) -> Result<(), AppError> {
        self.update(|data| *data = SessionData::default())
    }

    fn update<F>(&self, change: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut SessionData),
    {
        // persisted under the write lock: the file always matches memory
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        change(&mut *guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &SessionData) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let raw = serde_json::to_string_pretty(data)
            .map_err(|err| AppError::Internal(format!("failed to encode session: {err}")))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|err| {
                AppError::Internal(format!(
                    "failed to write session file {}: {err}",
                    path.display()
                ))
            })
    }
}
