//! Runtime settings
//!
//! Everything that lives on disk is placed under one profile directory:
//!
//! ```text
//! <profile>/
//!   credentials.hash   fingerprint of the configured username and password
//!   tokens/            persisted session
//!   cache/             cached catalog metadata
//! ```

use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File holding the fingerprint of the last seen credentials
pub const FINGERPRINT_FILE: &str = "credentials.hash";

/// Paths and credentials for one run
#[derive(Clone)]
pub struct Settings {
    profile_dir: PathBuf,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("profile_dir", &self.profile_dir)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn new(profile_dir: PathBuf, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            profile_dir,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Platform data directory for the application
    ///
    /// Returns `None` if it cannot be determined (e.g., no home directory).
    pub fn default_profile_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "goplay")?;
        Some(project_dirs.data_dir().to_path_buf())
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.profile_dir.join("tokens")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.profile_dir.join("cache")
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Hex SHA-256 of username and password
    ///
    /// Each field is prefixed with its length so moving characters from one
    /// field to the other changes the fingerprint.
    pub fn credentials_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [&self.username, &self.password] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Records the current credentials, returning whether they differ from the
    /// ones seen on the previous run
    ///
    /// A run without credentials leaves the stored fingerprint alone and
    /// counts as unchanged, so the persisted session stays usable.
    pub fn credentials_changed(&self) -> io::Result<bool> {
        if !self.has_credentials() {
            return Ok(false);
        }

        let path = self.profile_dir.join(FINGERPRINT_FILE);
        let previous = match fs::read_to_string(&path) {
            Ok(previous) => previous,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let current = self.credentials_fingerprint();
        if previous.trim() == current {
            return Ok(false);
        }

        fs::create_dir_all(&self.profile_dir)?;
        fs::write(&path, &current)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directories() {
        let settings = Settings::new(PathBuf::from("/profile"), "user", "pass");

        assert_eq!(settings.tokens_dir(), PathBuf::from("/profile/tokens"));
        assert_eq!(settings.cache_dir(), PathBuf::from("/profile/cache"));
    }

    #[test]
    fn test_fingerprint() {
        let settings = Settings::new(PathBuf::from("/profile"), "user", "pass");
        let fingerprint = settings.credentials_fingerprint();

        assert_eq!(fingerprint.len(), 64);
        assert_ne!(fingerprint, Settings::new(PathBuf::new(), "user", "other").credentials_fingerprint());
        assert_eq!(fingerprint, Settings::new(PathBuf::new(), "user", "pass").credentials_fingerprint());
    }

    #[test]
    fn test_fingerprint_keeps_fields_apart() {
        let left = Settings::new(PathBuf::new(), "ab", "c").credentials_fingerprint();
        let right = Settings::new(PathBuf::new(), "a", "bc").credentials_fingerprint();

        assert_ne!(left, right);
    }

    #[test]
    fn test_credentials_changed() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::new(dir.path().to_path_buf(), "user", "pass");

        assert!(settings.credentials_changed().unwrap());
        assert!(!settings.credentials_changed().unwrap());

        let other = Settings::new(dir.path().to_path_buf(), "user", "new-pass");
        assert!(other.credentials_changed().unwrap());
        assert!(!other.credentials_changed().unwrap());
    }

    #[test]
    fn test_run_without_credentials_keeps_fingerprint() {
        let dir = TempDir::new().unwrap();
        let with = Settings::new(dir.path().to_path_buf(), "user", "pass");
        let without = Settings::new(dir.path().to_path_buf(), "", "");

        assert!(with.credentials_changed().unwrap());
        assert!(!without.credentials_changed().unwrap());
        assert!(!with.credentials_changed().unwrap());

        let stored = fs::read_to_string(dir.path().join(FINGERPRINT_FILE)).unwrap();
        assert_eq!(stored, with.credentials_fingerprint());
    }

    #[test]
    fn test_username_only_counts_as_no_credentials() {
        let dir = TempDir::new().unwrap();
        Settings::new(dir.path().to_path_buf(), "user", "pass")
            .credentials_changed()
            .unwrap();

        let partial = Settings::new(dir.path().to_path_buf(), "user", "");

        assert!(!partial.credentials_changed().unwrap());
    }

    #[test]
    fn test_no_credentials_on_first_run_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::new(dir.path().to_path_buf(), "", "");

        assert!(!settings.has_credentials());
        assert!(!settings.credentials_changed().unwrap());
    }
}
