//! Encrypted-at-rest key/value store for client session state.
//!
//! Every value is JSON-serialised, wrapped with the time it was written,
//! encrypted with AES-256-CBC and tagged with HMAC-SHA-256 over the key
//! name, IV and ciphertext. Reads check the tag (constant time) before
//! decrypting and treat anything older than `max_age` as absent.
//!
//! Sealed layout: `enc:v1:<base64(iv || ciphertext)>.<base64(tag)>`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{thread_rng, RngCore};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::client::storage::{StorageBackend, StorageError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const SEALED_PREFIX: &str = "enc:v1:";
const NAMESPACE: &str = "secure:";
const MIGRATION_MARKER: &str = "secure:__migrated_v1";
const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

fn default_max_age() -> Duration {
    Duration::hours(24)
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    value: serde_json::Value,
    /// Unix millis
    stored_at: i64,
}

pub struct SecureStorage<B> {
    backend: B,
    enc_key: [u8; KEY_LEN],
    mac_key: [u8; KEY_LEN],
    max_age: Duration,
}

/// Independent encryption and MAC keys from one passphrase.
fn derive_key(passphrase: &Secret<String>, label: &str) -> Result<[u8; KEY_LEN], StorageError> {
    let mut mac = HmacSha256::new_from_slice(passphrase.expose_secret().as_bytes())
        .map_err(|e| StorageError::Crypto(e.to_string()))?;
    mac.update(label.as_bytes());
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

fn namespaced(key: &str) -> String {
    format!("{}{}", NAMESPACE, key)
}

impl<B: StorageBackend> SecureStorage<B> {
    pub fn new(backend: B, passphrase: &Secret<String>) -> Result<Self, StorageError> {
        Ok(Self {
            backend,
            enc_key: derive_key(passphrase, "archive-session/enc")?,
            mac_key: derive_key(passphrase, "archive-session/mac")?,
            max_age: default_max_age(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_item<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.set_item_at(key, value, Utc::now())
    }

    fn set_item_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        stored_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let envelope = Envelope {
            value: serde_json::to_value(value)?,
            stored_at: stored_at.timestamp_millis(),
        };
        let sealed = self.seal(key, &serde_json::to_vec(&envelope)?)?;
        self.backend.set(&namespaced(key), &sealed)
    }

    /// `None` for missing, tampered, undecodable or expired entries.
    pub fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.get_item_at(key, Utc::now())
    }

    fn get_item_at<T: DeserializeOwned>(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<T>, StorageError> {
        let sealed = match self.backend.get(&namespaced(key))? {
            Some(sealed) => sealed,
            None => return Ok(None),
        };

        let plaintext = match self.open(key, &sealed) {
            Some(plaintext) => plaintext,
            None => {
                tracing::warn!(key = key, "Discarding session entry that failed verification");
                return Ok(None);
            }
        };

        let envelope: Envelope = match serde_json::from_slice(&plaintext) {
            Ok(envelope) => envelope,
            Err(_) => return Ok(None),
        };
        if now.timestamp_millis() - envelope.stored_at > self.max_age.num_milliseconds() {
            tracing::debug!(key = key, "Session entry is past its maximum age");
            return Ok(None);
        }

        Ok(serde_json::from_value(envelope.value).ok())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(&namespaced(key))
    }

    /// Remove every sealed entry.
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in self.backend.keys()? {
            if key.starts_with(NAMESPACE) && key != MIGRATION_MARKER {
                self.backend.remove(&key)?;
            }
        }
        Ok(())
    }

    /// Move legacy plaintext entries under `keys` into sealed storage.
    ///
    /// Runs once per backend; the marker makes later calls a no-op.
    /// Returns how many entries were re-encrypted.
    pub fn migrate_plaintext(&self, keys: &[&str]) -> Result<usize, StorageError> {
        if self.backend.get(MIGRATION_MARKER)?.is_some() {
            return Ok(0);
        }

        let mut migrated = 0;
        for key in keys {
            let Some(raw) = self.backend.get(key)? else {
                continue;
            };
            let value = serde_json::from_str::<serde_json::Value>(&raw)
                .unwrap_or(serde_json::Value::String(raw));
            self.set_item(key, &value)?;
            self.backend.remove(key)?;
            migrated += 1;
        }

        self.backend.set(MIGRATION_MARKER, "1")?;
        if migrated > 0 {
            tracing::info!(migrated, "Re-encrypted legacy session entries");
        }
        Ok(migrated)
    }

    fn mac(&self, key: &str, body: &[u8]) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| StorageError::Crypto(e.to_string()))?;
        mac.update(key.as_bytes());
        mac.update(&[0]);
        mac.update(body);
        Ok(mac)
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> Result<String, StorageError> {
        let mut iv = [0u8; IV_LEN];
        thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&self.enc_key, &iv)
            .map_err(|e| StorageError::Crypto(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut body = Vec::with_capacity(IV_LEN + ciphertext.len());
        body.extend_from_slice(&iv);
        body.extend_from_slice(&ciphertext);

        let tag = self.mac(key, &body)?.finalize().into_bytes();
        Ok(format!(
            "{}{}.{}",
            SEALED_PREFIX,
            STANDARD.encode(&body),
            STANDARD.encode(tag)
        ))
    }

    fn open(&self, key: &str, sealed: &str) -> Option<Vec<u8>> {
        let (body, tag) = sealed.strip_prefix(SEALED_PREFIX)?.split_once('.')?;
        let body = STANDARD.decode(body).ok()?;
        let tag = STANDARD.decode(tag).ok()?;

        // Tag first; nothing unauthenticated reaches the cipher.
        self.mac(key, &body).ok()?.verify_slice(&tag).ok()?;

        if body.len() <= IV_LEN {
            return None;
        }
        let (iv, ciphertext) = body.split_at(IV_LEN);
        Aes256CbcDec::new_from_slices(&self.enc_key, iv)
            .ok()?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    fn storage() -> SecureStorage<MemoryStorage> {
        SecureStorage::new(MemoryStorage::new(), &Secret::new("device passphrase".to_string()))
            .unwrap()
    }

    #[test]
    fn test_value_round_trips_within_max_age() {
        let store = storage();
        store.set_item("refresh_token", &"opaque-value").unwrap();

        let value: Option<String> = store.get_item("refresh_token").unwrap();
        assert_eq!(value.as_deref(), Some("opaque-value"));
    }

    #[test]
    fn test_stored_value_is_not_plaintext() {
        let store = storage();
        store.set_item("access_token", &"eyJhbGciOi").unwrap();

        let raw = store.backend().get("secure:access_token").unwrap().unwrap();
        assert!(raw.starts_with(SEALED_PREFIX));
        assert!(!raw.contains("eyJhbGciOi"));
    }

    #[test]
    fn test_any_flipped_ciphertext_byte_hides_the_value() {
        let store = storage();
        store.set_item("token", &"secret").unwrap();
        let raw = store.backend().get("secure:token").unwrap().unwrap();
        let (body, tag) = raw.strip_prefix(SEALED_PREFIX).unwrap().split_once('.').unwrap();
        let body = STANDARD.decode(body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            let forged = format!("{}{}.{}", SEALED_PREFIX, STANDARD.encode(&tampered), tag);
            store.backend().set("secure:token", &forged).unwrap();

            let value: Option<String> = store.get_item("token").unwrap();
            assert!(value.is_none(), "byte {} flipped but value was returned", i);
        }
    }

    #[test]
    fn test_entry_moved_to_another_key_is_rejected() {
        let store = storage();
        store.set_item("a", &"value").unwrap();
        let raw = store.backend().get("secure:a").unwrap().unwrap();
        store.backend().set("secure:b", &raw).unwrap();

        let value: Option<String> = store.get_item("b").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_entry_older_than_max_age_is_absent() {
        let store = storage();
        let written = Utc::now() - Duration::hours(25);
        store.set_item_at("token", &"stale", written).unwrap();

        let value: Option<String> = store.get_item("token").unwrap();
        assert!(value.is_none());

        let fresh: Option<String> = store
            .get_item_at("token", written + Duration::hours(23))
            .unwrap();
        assert_eq!(fresh.as_deref(), Some("stale"));
    }

    #[test]
    fn test_wrong_passphrase_reads_nothing() {
        let store = storage();
        store.set_item("token", &"secret").unwrap();
        let raw = store.backend().get("secure:token").unwrap().unwrap();

        let other = SecureStorage::new(MemoryStorage::new(), &Secret::new("other".to_string()))
            .unwrap();
        other.backend().set("secure:token", &raw).unwrap();

        assert!(other.get_item::<String>("token").unwrap().is_none());
    }

    #[test]
    fn test_plaintext_migration_runs_once() {
        let store = storage();
        store.backend().set("access_token", "legacy-access").unwrap();
        store.backend().set("user", r#"{"id":"1","email":"a@x.com"}"#).unwrap();

        let migrated = store.migrate_plaintext(&["access_token", "user", "absent"]).unwrap();

        assert_eq!(migrated, 2);
        assert!(store.backend().get("access_token").unwrap().is_none());
        assert!(store.backend().get("user").unwrap().is_none());
        let access: Option<String> = store.get_item("access_token").unwrap();
        assert_eq!(access.as_deref(), Some("legacy-access"));
        let user: Option<serde_json::Value> = store.get_item("user").unwrap();
        assert_eq!(user.unwrap()["email"], "a@x.com");

        store.backend().set("access_token", "written-after").unwrap();
        assert_eq!(store.migrate_plaintext(&["access_token"]).unwrap(), 0);
    }

    #[test]
    fn test_clear_keeps_migration_marker() {
        let store = storage();
        store.migrate_plaintext(&[]).unwrap();
        store.set_item("a", &1).unwrap();

        store.clear().unwrap();

        assert!(store.get_item::<i32>("a").unwrap().is_none());
        assert_eq!(store.migrate_plaintext(&["a"]).unwrap(), 0);
    }
}
