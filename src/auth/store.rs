//! Durable storage of the session tokens
//!
//! The whole credential triple lives in a single JSON file that is replaced
//! atomically on every change.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File name of the token store inside the tokens directory
pub const TOKEN_FILE: &str = "auth-tokens.json";

/// The persisted session state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token sent to the API
    #[serde(default)]
    pub id_token: Option<String>,
    /// Long-lived token exchanged for a new id token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of `id_token` in epoch seconds
    #[serde(default)]
    pub expiry: i64,
}

impl Credential {
    /// Returns the id token if it is still valid at `now` (epoch seconds)
    pub fn valid_id_token(&self, now: i64) -> Option<&str> {
        match &self.id_token {
            Some(token) if self.expiry > now => Some(token.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id_token.is_none() && self.refresh_token.is_none()
    }
}

/// Reads and writes the credential file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store keeping its file in `dir`, created on first save
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Loads the stored credential
    ///
    /// A missing, truncated or otherwise unparsable file yields an empty
    /// credential.
    pub fn load(&self) -> Credential {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                info!(path = %path.display(), error = %e, "no stored session");
                return Credential::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(credential) => credential,
            Err(e) => {
                info!(path = %path.display(), error = %e, "stored session is invalid, ignoring it");
                Credential::default()
            }
        }
    }

    /// Replaces the stored credential with `credential`
    pub fn save(&self, credential: &Credential) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_vec(credential)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.path()).map_err(|e| e.error)?;

        debug!(path = %self.path().display(), "stored session");
        Ok(())
    }

    /// Removes the stored credential; a missing file is not an error
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(self.path()) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
