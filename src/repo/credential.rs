use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::AuthCredential;

/// Narrow read/write interface over wherever the credential is kept
pub trait CredentialStore: Send {
    /// Load the stored credential, if there is a usable one
    fn load(&self) -> Result<Option<AuthCredential>>;

    /// Persist `credential`, replacing any previous one
    fn save(&self, credential: &AuthCredential) -> Result<()>;

    /// Forget the stored credential
    fn clear(&self) -> Result<()>;
}

/// Credential persisted as a small JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<AuthCredential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<AuthCredential>(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // Unreadable store counts as logged out
                warn!(
                    "Ignoring unreadable credential file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &AuthCredential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(credential)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Atomic replace
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// In-memory store, handy for tests and one-shot commands
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: std::sync::Mutex<Option<AuthCredential>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<AuthCredential>) -> Self {
        Self {
            inner: std::sync::Mutex::new(initial),
        }
    }

    pub fn current(&self) -> Option<AuthCredential> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<AuthCredential>> {
        Ok(self.current())
    }

    fn save(&self, credential: &AuthCredential) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("credential.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("credential.json");
        let store = FileCredentialStore::new(&path);

        let cred = AuthCredential::new("1", "first");
        store.save(&cred).unwrap();
        assert!(path.exists());
        assert_eq!(store.load().unwrap(), Some(cred));
    }

    #[test]
    fn test_save_overwrites_previous_credential() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("credential.json"));

        store.save(&AuthCredential::new("1", "old")).unwrap();
        store.save(&AuthCredential::new("2", "new")).unwrap();
        assert_eq!(store.load().unwrap(), Some(AuthCredential::new("2", "new")));
    }

    #[test]
    fn test_corrupted_file_loads_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credential.json");
        fs::write(&path, "not json").unwrap();
        let store = FileCredentialStore::new(&path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("credential.json"));
        store.save(&AuthCredential::new("1", "x")).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credential.json");
        FileCredentialStore::new(&path)
            .save(&AuthCredential::new("1", "x"))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
