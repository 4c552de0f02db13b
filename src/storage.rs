//! Sled-backed storage for the signed-in session.
//!
//! The database is temporary: it disappears when the process exits, so the
//! session lives exactly as long as the program does.

use crate::auth::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key of the single session record
pub const CURRENT_USER_KEY: &str = "refine_current_user";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A signed-in user session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Who is signed in
    pub identity: Identity,
    /// When the session started
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    /// Start a new session for an identity
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            signed_in_at: Utc::now(),
        }
    }
}

/// Process-scoped key/value home for the current session record.
pub struct SessionStorage {
    db: sled::Db,
}

impl SessionStorage {
    /// Open a fresh temporary store
    pub fn open() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store the session, replacing any previous one
    pub fn put(&self, session: &Session) -> Result<(), StorageError> {
        let value = serde_json::to_vec(session)?;
        self.db.insert(CURRENT_USER_KEY, value)?;
        Ok(())
    }

    /// Retrieve the stored session, if any
    pub fn get(&self) -> Result<Option<Session>, StorageError> {
        match self.db.get(CURRENT_USER_KEY)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Remove the stored session. Returns whether one existed.
    pub fn delete(&self) -> Result<bool, StorageError> {
        Ok(self.db.remove(CURRENT_USER_KEY)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round() {
        let storage = SessionStorage::open().unwrap();
        assert_eq!(storage.get().unwrap(), None);

        let session = Session::new(Identity::new("sam@example.com"));
        storage.put(&session).unwrap();
        assert_eq!(storage.get().unwrap(), Some(session));

        assert!(storage.delete().unwrap());
        assert_eq!(storage.get().unwrap(), None);
        assert!(!storage.delete().unwrap());
    }

    #[test]
    fn put_replaces_previous_session() {
        let storage = SessionStorage::open().unwrap();
        storage
            .put(&Session::new(Identity::new("first@example.com")))
            .unwrap();
        storage
            .put(&Session::new(Identity::new("second@example.com")))
            .unwrap();

        let stored = storage.get().unwrap().unwrap();
        assert_eq!(stored.identity.as_str(), "second@example.com");
    }

    #[test]
    fn stores_are_independent() {
        let a = SessionStorage::open().unwrap();
        let b = SessionStorage::open().unwrap();
        a.put(&Session::new(Identity::new("sam@example.com"))).unwrap();
        assert!(b.get().unwrap().is_none());
    }

    #[test]
    fn record_is_json_with_identity_string() {
        let session = Session::new(Identity::new("sam@example.com"));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["identity"], "sam@example.com");
        assert!(value["signed_in_at"].is_string());
    }
}
