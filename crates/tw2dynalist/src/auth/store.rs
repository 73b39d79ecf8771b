//! Token file persistence.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::oauth::Token;
use super::AuthError;

/// Token plus the account it belongs to, as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(flatten)]
    pub token: Token,
    /// Numeric Twitter account ID; empty or `me` until resolved.
    #[serde(default)]
    pub user_id: String,
}

impl StoredToken {
    /// Whether the account ID still has to be looked up.
    pub fn needs_user_lookup(&self) -> bool {
        needs_user_lookup(&self.user_id)
    }
}

/// `true` when `user_id` is not a resolved account ID.
pub fn needs_user_lookup(user_id: &str) -> bool {
    user_id.is_empty() || user_id == "me"
}

/// Reads and writes the token file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the stored token; a missing file is `None`.
    pub fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Token file not found");
                return Ok(None);
            }
            Err(source) => return Err(self.io_error(source)),
        };

        let stored = serde_json::from_str(&content).map_err(|source| AuthError::StoreParse {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "Loaded token from file");
        Ok(Some(stored))
    }

    /// Persist `token` for `user_id`, readable by the owner only.
    pub fn save(&self, token: &Token, user_id: &str) -> Result<(), AuthError> {
        let stored = StoredToken {
            token: token.clone(),
            user_id: user_id.to_string(),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|source| {
            AuthError::StoreParse {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut options = OpenOptions::new();
        options.truncate(true).write(true).create(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        let mut file = options.open(&self.path).map_err(|e| self.io_error(e))?;
        // mode() only applies on creation
        #[cfg(unix)]
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), user_id, "Saved token to file");
        Ok(())
    }

    /// Delete the token file. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool, AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed token file, re-authentication required");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> AuthError {
        AuthError::Store {
            path: self.path.clone(),
            source,
        }
    }
}
