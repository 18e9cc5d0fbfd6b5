//! Transport integrity gate.
//!
//! Mutating batches travel in an envelope `{<list>, hash}` where `hash` is
//! the hex HMAC-SHA256 of the list under a key shared by the server and its
//! clients. The canonical form is `serde_json`'s compact encoding of the
//! parsed, typed list, with fields in declaration order. This authenticates
//! transport from any holder of the key; it is not an end-to-end MAC.

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::{Result, VaultError};

type HmacSha256 = Hmac<Sha256>;

/// A request body carrying a MAC over its item list.
pub trait SignedEnvelope {
    /// List item type.
    type Item: Serialize;

    /// The protected list.
    fn items(&self) -> &[Self::Item];

    /// The hex MAC sent by the client.
    fn hash(&self) -> &str;
}

/// Statistics for a hasher pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HasherPoolStats {
    /// Hashers currently checked out.
    pub active: usize,
    /// Hashers waiting in the pool.
    pub idle: usize,
    /// Hashers created since startup.
    pub total_created: u64,
}

struct HasherPoolInner {
    keyed: HmacSha256,
    available: Mutex<Vec<HmacSha256>>,
    semaphore: Semaphore,
    active_count: AtomicUsize,
    total_created: AtomicU64,
}

impl HasherPoolInner {
    fn return_hasher(&self, mut mac: HmacSha256) {
        mac.reset();
        self.available.lock().push(mac);
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.semaphore.add_permits(1);
    }
}

/// A pool of keyed HMAC-SHA256 instances.
///
/// Built once at startup with the integrity key. Instances are handed out
/// one caller at a time and are reset on the way out and on the way back.
#[derive(Clone)]
pub struct HasherPool {
    inner: Arc<HasherPoolInner>,
}

impl std::fmt::Debug for HasherPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HasherPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl HasherPool {
    /// Creates a pool of at most `size` hashers keyed with `key`.
    pub fn new(key: &[u8], size: usize) -> Result<Self> {
        if size == 0 {
            return Err(VaultError::Internal("hasher pool size must be at least 1".into()));
        }
        let keyed = HmacSha256::new_from_slice(key)
            .map_err(|e| VaultError::Internal(format!("integrity key: {}", e)))?;

        Ok(Self {
            inner: Arc::new(HasherPoolInner {
                keyed,
                available: Mutex::new(Vec::with_capacity(size)),
                semaphore: Semaphore::new(size),
                active_count: AtomicUsize::new(0),
                total_created: AtomicU64::new(0),
            }),
        })
    }

    /// Waits for a free hasher.
    pub async fn acquire(&self) -> Result<PooledHasher> {
        let permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| VaultError::Internal("hasher pool closed".into()))?;
        // Given back when the hasher returns.
        permit.forget();

        let mut mac = match self.inner.available.lock().pop() {
            Some(mac) => mac,
            None => {
                self.inner.total_created.fetch_add(1, Ordering::Relaxed);
                self.inner.keyed.clone()
            }
        };
        mac.reset();
        self.inner.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(PooledHasher {
            mac: Some(mac),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> HasherPoolStats {
        HasherPoolStats {
            active: self.inner.active_count.load(Ordering::Relaxed),
            idle: self.inner.available.lock().len(),
            total_created: self.inner.total_created.load(Ordering::Relaxed),
        }
    }
}

/// A hasher checked out of a [`HasherPool`].
pub struct PooledHasher {
    mac: Option<HmacSha256>,
    pool: Arc<HasherPoolInner>,
}

impl PooledHasher {
    fn mac(&mut self) -> &mut HmacSha256 {
        self.mac.get_or_insert_with(|| self.pool.keyed.clone())
    }

    /// Computes the hex MAC of `bytes`.
    pub fn sign(&mut self, bytes: &[u8]) -> String {
        let mac = self.mac();
        mac.update(bytes);
        hex::encode(mac.finalize_reset().into_bytes())
    }

    /// Checks `bytes` against a hex MAC in constant time.
    ///
    /// Only the lowercase encoding [`sign`](Self::sign) produces is accepted.
    pub fn verify(&mut self, bytes: &[u8], hex_tag: &str) -> bool {
        if hex_tag.bytes().any(|b| b.is_ascii_uppercase()) {
            return false;
        }
        let Ok(tag) = hex::decode(hex_tag) else {
            return false;
        };
        let mac = self.mac();
        mac.update(bytes);
        mac.verify_slice_reset(&tag).is_ok()
    }
}

impl Drop for PooledHasher {
    fn drop(&mut self) {
        if let Some(mac) = self.mac.take() {
            self.pool.return_hasher(mac);
        }
    }
}

/// Verifies envelope MACs before a batch reaches the engine.
#[derive(Debug, Clone)]
pub struct IntegrityGate {
    pool: HasherPool,
}

impl IntegrityGate {
    /// Creates a gate drawing hashers from `pool`.
    pub fn new(pool: HasherPool) -> Self {
        Self { pool }
    }

    /// Returns the canonical bytes the MAC covers.
    pub fn canonical_bytes<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
        serde_json::to_vec(items).map_err(|e| VaultError::Internal(e.to_string()))
    }

    /// Computes the envelope hash a client must send for `items`.
    pub async fn sign<T: Serialize>(&self, items: &[T]) -> Result<String> {
        let bytes = Self::canonical_bytes(items)?;
        Ok(self.pool.acquire().await?.sign(&bytes))
    }

    /// Fails with [`VaultError::Integrity`] unless the envelope hash matches.
    pub async fn verify<E: SignedEnvelope>(&self, envelope: &E) -> Result<()> {
        let bytes = Self::canonical_bytes(envelope.items())?;
        let mut hasher = self.pool.acquire().await?;
        if hasher.verify(&bytes, envelope.hash()) {
            Ok(())
        } else {
            tracing::warn!(items = envelope.items().len(), "envelope hash mismatch");
            Err(VaultError::Integrity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::UploadRequest;
    use proptest::prelude::*;
    use vaultsync_types::{NewRecord, UserId};

    const KEY: &[u8] = b"transport-integrity-key";

    fn gate() -> IntegrityGate {
        IntegrityGate::new(HasherPool::new(KEY, 2).unwrap())
    }

    fn items() -> Vec<NewRecord> {
        vec![NewRecord {
            client_side_id: "c1".into(),
            payload: "P1".into(),
            hash: "h1".into(),
        }]
    }

    fn envelope(payload_list: Vec<NewRecord>, hash: String) -> UploadRequest {
        UploadRequest {
            user_id: Some(UserId::new(1)),
            payload_list,
            length: None,
            hash,
        }
    }

    #[test]
    fn test_canonical_form_is_declaration_order() {
        let bytes = IntegrityGate::canonical_bytes(&items()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"client_side_id":"c1","payload":"P1","hash":"h1"}]"#
        );
    }

    #[tokio::test]
    async fn test_matches_plain_hmac() {
        let gate = gate();
        let bytes = IntegrityGate::canonical_bytes(&items()).unwrap();
        let mut mac = HmacSha256::new_from_slice(KEY).unwrap();
        mac.update(&bytes);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(gate.sign(&items()).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_verify() {
        let gate = gate();
        let hash = gate.sign(&items()).await.unwrap();

        assert!(gate.verify(&envelope(items(), hash.clone())).await.is_ok());

        let mut tampered = items();
        tampered[0].payload = "P2".into();
        assert!(matches!(
            gate.verify(&envelope(tampered, hash)).await,
            Err(VaultError::Integrity)
        ));
        assert!(matches!(
            gate.verify(&envelope(items(), "zz".into())).await,
            Err(VaultError::Integrity)
        ));
        assert!(matches!(
            gate.verify(&envelope(items(), String::new())).await,
            Err(VaultError::Integrity)
        ));
    }

    #[tokio::test]
    async fn test_verify_is_case_sensitive() {
        let gate = gate();
        let hash = gate.sign(&items()).await.unwrap();
        assert!(hash.bytes().any(|b| b.is_ascii_alphabetic()));

        assert!(matches!(
            gate.verify(&envelope(items(), hash.to_uppercase())).await,
            Err(VaultError::Integrity)
        ));

        // One flipped letter is enough.
        let pos = hash.find(|c: char| c.is_ascii_alphabetic()).unwrap();
        let mut mixed = hash.clone();
        mixed.replace_range(pos..pos + 1, &hash[pos..pos + 1].to_uppercase());
        assert!(gate.verify(&envelope(items(), mixed)).await.is_err());

        // The pooled hasher is still usable after a rejection.
        assert!(gate.verify(&envelope(items(), hash)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pool_reuses_hashers() {
        let pool = HasherPool::new(KEY, 2).unwrap();
        {
            let _a = pool.acquire().await.unwrap();
            let _b = pool.acquire().await.unwrap();
            assert_eq!(pool.stats().active, 2);
        }
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 2);

        let _c = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().total_created, 2);
    }

    #[tokio::test]
    async fn test_returned_hasher_is_clean() {
        let pool = HasherPool::new(KEY, 1).unwrap();
        {
            let mut h = pool.acquire().await.unwrap();
            // Leave data in the hasher without finalizing.
            h.mac().update(b"garbage");
        }
        let first = pool.acquire().await.unwrap().sign(b"data");
        let second = pool.acquire().await.unwrap().sign(b"data");
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(HasherPool::new(KEY, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_change_breaks_the_hash(
            id in "[a-z0-9]{1,16}",
            payload in ".{0,64}",
            other in ".{0,64}",
        ) {
            prop_assume!(payload != other);
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let gate = gate();
                let list = vec![NewRecord { client_side_id: id.clone(), payload, hash: "h".into() }];
                let hash = gate.sign(&list).await.unwrap();
                prop_assert!(gate.verify(&envelope(list.clone(), hash.clone())).await.is_ok());

                let mut changed = list;
                changed[0].payload = other;
                prop_assert!(gate.verify(&envelope(changed, hash)).await.is_err());
                Ok(())
            })?;
        }
    }
}
