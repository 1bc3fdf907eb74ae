use std::{
    fs, io,
    path::{Path, PathBuf},
};

use parley_common::Identity;

use crate::error::Result;

/// The single persisted identity+token record.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored identity. A record that does not parse is treated as absent: the user
    /// simply has to log in again.
    pub fn load(&self) -> Option<Identity> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "cannot read session: {err}");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "ignoring malformed session: {err}");
                None
            }
        }
    }

    pub fn save(&self, identity: &Identity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(identity)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_common::User;

    use super::*;

    fn identity() -> Identity {
        Identity {
            user: User {
                identifier: "u1".into(),
                display_name: "Alice".into(),
                email: Some("alice@example.com".into()),
                avatar: None,
            },
            token: "jwt".into(),
        }
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));
        assert_eq!(store.load(), None);

        store.save(&identity()).unwrap();
        assert_eq!(store.load(), Some(identity()));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[test]
    fn malformed_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{\"name\": 3}").unwrap();
        assert_eq!(SessionStore::new(path).load(), None);
    }
}
