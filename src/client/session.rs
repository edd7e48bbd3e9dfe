use secrecy::Secret;
use serde::{Deserialize, Serialize};

use crate::client::secure_storage::SecureStorage;
use crate::client::storage::{StorageBackend, StorageError};

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user";

/// The signed-in principal as the login endpoint reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

/// Credentials and user of the current session, sealed at rest.
pub struct SessionStore {
    storage: SecureStorage<Box<dyn StorageBackend>>,
}

impl SessionStore {
    /// Opens the store and seals any plaintext session left by older clients.
    pub fn open(
        backend: Box<dyn StorageBackend>,
        passphrase: &Secret<String>,
    ) -> Result<Self, StorageError> {
        let storage = SecureStorage::new(backend, passphrase)?;
        storage.migrate_plaintext(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])?;
        Ok(Self { storage })
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_item(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.storage.get_item(REFRESH_TOKEN_KEY)
    }

    pub fn user(&self) -> Result<Option<SessionUser>, StorageError> {
        self.storage.get_item(USER_KEY)
    }

    pub fn save_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        self.storage.set_item(ACCESS_TOKEN_KEY, &access_token)?;
        self.storage.set_item(REFRESH_TOKEN_KEY, &refresh_token)
    }

    pub fn save_user(&self, user: &SessionUser) -> Result<(), StorageError> {
        self.storage.set_item(USER_KEY, user)
    }

    pub fn is_authenticated(&self) -> Result<bool, StorageError> {
        Ok(self.access_token()?.is_some() && self.refresh_token()?.is_some())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    fn passphrase() -> Secret<String> {
        Secret::new("device-bound passphrase".to_string())
    }

    #[test]
    fn test_session_round_trip_and_clear() {
        let store = SessionStore::open(Box::new(MemoryStorage::new()), &passphrase()).unwrap();
        let user = SessionUser {
            id: "1".into(),
            email: "a@x.com".into(),
            name: "A".into(),
            role: "clerk".into(),
        };

        store.save_tokens("access", "refresh").unwrap();
        store.save_user(&user).unwrap();
        assert!(store.is_authenticated().unwrap());
        assert_eq!(store.user().unwrap(), Some(user));

        store.clear().unwrap();
        assert!(!store.is_authenticated().unwrap());
        assert!(store.user().unwrap().is_none());
    }

    #[test]
    fn test_legacy_plaintext_session_is_sealed_on_open() {
        let backend = MemoryStorage::new();
        backend.set("access_token", "legacy-access").unwrap();
        backend.set("refresh_token", "legacy-refresh").unwrap();

        let store = SessionStore::open(Box::new(backend), &passphrase()).unwrap();

        assert_eq!(store.access_token().unwrap().as_deref(), Some("legacy-access"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("legacy-refresh"));
    }
}
