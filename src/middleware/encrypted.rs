//! Encrypting decorator store
//!
//! Wraps any store and encrypts record values at rest with AES-256-GCM.
//! The record's `age` stays plaintext so the orchestrator can make
//! freshness decisions without decrypting. Keys are suffixed with a digest
//! of the passphrase so stores encrypted with different passphrases never
//! read each other's ciphertext.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::store::{CacheRecord, CacheStore};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Minimum accepted passphrase length
const MIN_KEY_LENGTH: usize = 8;

/// Envelope stored in place of the plaintext value
#[derive(Debug, Serialize, Deserialize)]
struct SealedValue {
    /// Base64-encoded ciphertext
    ciphertext: String,
    /// Base64-encoded nonce
    nonce: String,
}

/// Store decorator that encrypts values before they reach the inner store.
#[derive(Clone)]
pub struct EncryptedStore {
    store: Arc<dyn CacheStore>,
    cipher: Aes256Gcm,
    key_suffix: String,
}

impl fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("store", &self.store)
            .field("cipher", &"<Aes256Gcm>")
            .finish()
    }
}

impl EncryptedStore {
    /// Wraps `store`, deriving a 256-bit key from `key` and `salt`.
    ///
    /// The salt protects the derived key from rainbow tables; use a value
    /// that is stable across processes sharing the store.
    pub fn new(store: Arc<dyn CacheStore>, key: &str, salt: &str) -> Result<Self, CacheError> {
        if key.len() < MIN_KEY_LENGTH {
            return Err(CacheError::configuration(format!(
                "encryption key must be at least {} characters long",
                MIN_KEY_LENGTH
            )));
        }

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(salt.as_bytes())
            .map_err(|e| CacheError::encryption(format!("Failed to derive key: {}", e)))?;
        mac.update(key.as_bytes());
        let derived = mac.finalize().into_bytes();

        let cipher = Aes256Gcm::new_from_slice(derived.as_slice())
            .map_err(|e| CacheError::encryption(format!("Failed to create cipher: {}", e)))?;

        let key_suffix = BASE64.encode(Sha256::digest(key.as_bytes()));

        Ok(Self {
            store,
            cipher,
            key_suffix,
        })
    }

    fn sealed_key(&self, key: &str) -> String {
        format!("{}#{}", key, self.key_suffix)
    }

    fn seal(&self, record: &CacheRecord) -> Result<CacheRecord, CacheError> {
        let plaintext = serde_json::to_vec(&record.value)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| CacheError::encryption(format!("Encryption failed: {}", e)))?;

        let sealed = SealedValue {
            ciphertext: BASE64.encode(&ciphertext),
            nonce: BASE64.encode(nonce_bytes),
        };

        Ok(CacheRecord {
            value: serde_json::to_value(&sealed)?,
            age: record.age,
        })
    }

    fn open(&self, record: &CacheRecord) -> Result<CacheRecord, CacheError> {
        let sealed: SealedValue = serde_json::from_value(record.value.clone())
            .map_err(|e| CacheError::encryption(format!("Invalid sealed record: {}", e)))?;

        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|e| CacheError::encryption(format!("Invalid ciphertext base64: {}", e)))?;
        let nonce_bytes = BASE64
            .decode(&sealed.nonce)
            .map_err(|e| CacheError::encryption(format!("Invalid nonce base64: {}", e)))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CacheError::encryption("Invalid nonce size"));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| CacheError::encryption(format!("Decryption failed: {}", e)))?;

        Ok(CacheRecord {
            value: serde_json::from_slice(&plaintext)
                .map_err(|e| CacheError::encryption(format!("Invalid decrypted value: {}", e)))?,
            age: record.age,
        })
    }
}

#[async_trait]
impl CacheStore for EncryptedStore {
    fn name(&self) -> &str {
        self.store.name()
    }

    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, CacheError> {
        match self.store.get(&self.sealed_key(key)).await? {
            Some(record) => Ok(Some(self.open(&record)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        record: &CacheRecord,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let sealed = self.seal(record)?;
        self.store.set(&self.sealed_key(key), &sealed, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(&self.sealed_key(key)).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear().await
    }

    async fn dispose(&self) -> Result<(), CacheError> {
        self.store.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;
    use serde_json::json;

    fn encrypted(inner: Arc<MockStore>) -> EncryptedStore {
        EncryptedStore::new(inner, "correct horse battery staple", "pepper").unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = encrypted(Arc::new(MockStore::default()));
        let record = CacheRecord::new(&json!({"user": "alice", "roles": ["admin"]})).unwrap();

        store.set("k", &record, None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_inner_store_never_sees_plaintext() {
        let inner = Arc::new(MockStore::default());
        let store = encrypted(inner.clone());
        let record = CacheRecord::new(&"top secret").unwrap();

        store.set("k", &record, None).await.unwrap();

        let sealed_key = store.sealed_key("k");
        let stored = inner.record(&sealed_key).unwrap();
        assert_ne!(stored.value, record.value);
        assert!(stored.value.get("ciphertext").is_some());
        assert!(!stored.value.to_string().contains("top secret"));
    }

    #[tokio::test]
    async fn test_age_stays_readable() {
        let inner = Arc::new(MockStore::default());
        let store = encrypted(inner.clone());
        let record = CacheRecord::with_age(&"v", 1234).unwrap();

        store.set("k", &record, None).await.unwrap();
        assert_eq!(inner.record(&store.sealed_key("k")).unwrap().age, 1234);
    }

    #[tokio::test]
    async fn test_different_keys_are_isolated() {
        let inner = Arc::new(MockStore::default());
        let first = EncryptedStore::new(inner.clone(), "first-passphrase", "salt").unwrap();
        let second = EncryptedStore::new(inner.clone(), "second-passphrase", "salt").unwrap();

        let record = CacheRecord::new(&"private").unwrap();
        first.set("k", &record, None).await.unwrap();

        // a different passphrase resolves to a different sealed key
        assert_eq!(second.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_fails_to_open() {
        let inner = Arc::new(MockStore::default());
        let store = encrypted(inner.clone());
        let record = CacheRecord::new(&"v").unwrap();

        store.set("k", &record, None).await.unwrap();

        let sealed_key = store.sealed_key("k");
        let mut stored = inner.record(&sealed_key).unwrap();
        stored.value["ciphertext"] = json!(BASE64.encode(b"not the real ciphertext"));
        inner.set(&sealed_key, &stored, None).await.unwrap();

        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_short_key_is_rejected() {
        let result = EncryptedStore::new(Arc::new(MockStore::default()), "short", "salt");
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_delete_targets_sealed_key() {
        let inner = Arc::new(MockStore::default());
        let store = encrypted(inner.clone());
        let record = CacheRecord::new(&"v").unwrap();

        store.set("k", &record, None).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(inner.len(), 0);
    }
}
