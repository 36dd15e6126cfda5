//! Alias-indexed key pair lifecycle.
//!
//! [`KeyPairLifecycle`] is the only way the rest of the crate reaches a key
//! store. Callers get public keys by value; the private half is resolved for
//! decryption through a crate-internal path and never returned.
//!
//! The public key text is mirrored into a [`PreferenceStore`] under the field
//! [`PUBLIC_KEY_FIELD`] of namespace `<prefix>.<alias>`. That cache is advisory:
//! the key store decides whether an alias exists.

use crate::codec::{KeyCodec, PublicKeyMaterial};
use crate::common::{KeyPairAlias, KeyParameters};
use crate::error::{Error, Result};
use crate::keystore::{KeyPairHandle, SecureKeyStore};
use crate::preferences::PreferenceStore;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};

/// Preference field holding the cached public key text.
pub const PUBLIC_KEY_FIELD: &str = "PublicKey";

/// Value returned by the cache lookups when nothing is cached.
pub const KEY_DOES_NOT_EXIST: &str = "KeyDoesNotExist";

pub const DEFAULT_NAMESPACE_PREFIX: &str = "seal-keypair";

pub struct KeyPairLifecycle {
    store: Arc<dyn SecureKeyStore>,
    preferences: Arc<dyn PreferenceStore>,
    namespace_prefix: String,
    /// 同一别名的生成/删除串行化；不同别名互不阻塞
    alias_locks: DashMap<KeyPairAlias, Arc<Mutex<()>>>,
}

impl KeyPairLifecycle {
    /// Opens `store` and builds a lifecycle on top of it.
    pub fn new(
        store: Arc<dyn SecureKeyStore>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Result<Self> {
        store.open()?;
        Ok(Self {
            store,
            preferences,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            alias_locks: DashMap::new(),
        })
    }

    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    /// Runs `f` holding the lock of `alias`, then drops the lock from the
    /// map once no other caller holds or waits on it.
    fn with_alias_lock<T>(&self, alias: &KeyPairAlias, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.alias_locks.entry(alias.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);
        self.alias_locks
            .remove_if(alias, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn cache_namespace(&self, alias: &KeyPairAlias) -> String {
        format!("{}.{}", self.namespace_prefix, alias)
    }

    /// Generates the key pair for `alias` if absent, otherwise resolves it.
    /// Returns only the public key.
    ///
    /// An existing pair generated with different parameters is an
    /// `UnsupportedParameters` error; it is never replaced.
    ///
    /// The cached public key text is refreshed on success. A failing
    /// preference store does not fail the call: the key store is
    /// authoritative, so the cache write is only logged with `warn!`.
    pub fn ensure_key_pair(&self, alias: &str, params: &KeyParameters) -> Result<PublicKeyMaterial> {
        let alias = KeyPairAlias::parse(alias)?;
        params.validate()?;

        self.with_alias_lock(&alias, || {
            let handle = match self.store.get_key_pair(&alias) {
                Ok(existing) => {
                    debug!("resolved existing key pair `{}`", alias);
                    existing
                }
                Err(Error::AliasNotFound(_)) => {
                    info!("generating key pair `{}`", alias);
                    self.store.generate_key_pair(&alias, params)?
                }
                Err(e) => return Err(e),
            };

            if !handle.parameters().is_compatible_with(params) {
                return Err(Error::UnsupportedParameters(format!(
                    "alias `{}` was generated with {:?}, requested {:?}",
                    alias,
                    handle.parameters(),
                    params
                )));
            }

            let (public_key, _) = handle.into_public();
            // 与删除共用别名锁，缓存不会写回已删除的公钥
            if let Err(e) = self.refresh_cache(&alias, &public_key) {
                warn!("public key cache for `{}` not refreshed: {}", alias, e);
            }
            Ok(public_key)
        })
    }

    /// Resolves the public key of an existing alias without generating.
    pub fn public_key(&self, alias: &str) -> Result<PublicKeyMaterial> {
        let alias = KeyPairAlias::parse(alias)?;
        let (public_key, _) = self.resolve_public(&alias)?;
        Ok(public_key)
    }

    /// Generation parameters recorded for `alias`.
    pub fn parameters(&self, alias: &str) -> Result<KeyParameters> {
        let alias = KeyPairAlias::parse(alias)?;
        let (_, parameters) = self.resolve_public(&alias)?;
        Ok(parameters)
    }

    pub(crate) fn resolve_public(
        &self,
        alias: &KeyPairAlias,
    ) -> Result<(PublicKeyMaterial, KeyParameters)> {
        Ok(self.store.get_key_pair(alias)?.into_public())
    }

    /// Resolves the full key pair. Only the decryption path may call this.
    pub(crate) fn resolve_for_private_use(&self, alias: &str) -> Result<KeyPairHandle> {
        let alias = KeyPairAlias::parse(alias)?;
        self.store.get_key_pair(&alias)
    }

    /// Deletes the key pair, then drops its cached public key.
    ///
    /// Deleting an unknown alias fails with `AliasNotFound` and leaves the
    /// cache untouched. Once the key store delete succeeds the call succeeds;
    /// a failure to clear the cache is only logged with `warn!`.
    pub fn delete_alias(&self, alias: &str) -> Result<()> {
        let alias = KeyPairAlias::parse(alias)?;
        self.with_alias_lock(&alias, || {
            self.store.delete_key_pair(&alias)?;
            info!("deleted key pair `{}`", alias);
            if let Err(e) = self
                .preferences
                .remove(&self.cache_namespace(&alias), PUBLIC_KEY_FIELD)
            {
                warn!("cached public key for `{}` not removed: {}", alias, e);
            }
            Ok(())
        })
    }

    pub fn contains(&self, alias: &str) -> Result<bool> {
        let alias = KeyPairAlias::parse(alias)?;
        self.store.contains(&alias)
    }

    /// All aliases currently held by the key store.
    pub fn aliases(&self) -> Result<Vec<KeyPairAlias>> {
        self.store.aliases()?.collect()
    }

    /// Unpadded text encoding of the public key of an existing alias.
    pub fn export_public_key_text(&self, alias: &str) -> Result<String> {
        Ok(KeyCodec::encode_public_key_as_text(&self.public_key(alias)?))
    }

    fn refresh_cache(&self, alias: &KeyPairAlias, public_key: &PublicKeyMaterial) -> Result<()> {
        let namespace = self.cache_namespace(alias);
        let text = KeyCodec::encode_public_key_as_text(public_key);
        let cached = self
            .preferences
            .get(&namespace, PUBLIC_KEY_FIELD, KEY_DOES_NOT_EXIST)?;
        if cached != text {
            self.preferences.put(&namespace, PUBLIC_KEY_FIELD, &text)?;
            debug!(
                "cached public key for `{}` ({})",
                alias,
                public_key.fingerprint()
            );
        }
        Ok(())
    }

    /// Validates `text` as a public key encoding and caches it for `alias`.
    ///
    /// Text that does not decode is rejected and nothing is written.
    pub fn store_public_key_text(&self, alias: &str, text: &str) -> Result<PublicKeyMaterial> {
        let alias = KeyPairAlias::parse(alias)?;
        let public_key = KeyCodec::decode_public_key_from_text(text)?;
        self.preferences.put(
            &self.cache_namespace(&alias),
            PUBLIC_KEY_FIELD,
            &KeyCodec::encode_public_key_as_text(&public_key),
        )?;
        Ok(public_key)
    }

    /// Raw cached text for `alias`, or [`KEY_DOES_NOT_EXIST`].
    pub fn cached_public_key_text(&self, alias: &str) -> Result<String> {
        let alias = KeyPairAlias::parse(alias)?;
        self.preferences.get(
            &self.cache_namespace(&alias),
            PUBLIC_KEY_FIELD,
            KEY_DOES_NOT_EXIST,
        )
    }

    /// Decoded cached public key, if any.
    ///
    /// A cached value that no longer decodes is reported as absent.
    pub fn cached_public_key(&self, alias: &str) -> Result<Option<PublicKeyMaterial>> {
        let text = self.cached_public_key_text(alias)?;
        if text == KEY_DOES_NOT_EXIST {
            return Ok(None);
        }
        match KeyCodec::decode_public_key_from_text(&text) {
            Ok(public_key) => Ok(Some(public_key)),
            Err(e) => {
                warn!("ignoring undecodable cached public key for `{}`: {}", alias, e);
                Ok(None)
            }
        }
    }

    /// Removes the cached public key for `alias` if one is present.
    pub fn remove_cached_public_key(&self, alias: &str) -> Result<()> {
        let alias = KeyPairAlias::parse(alias)?;
        let namespace = self.cache_namespace(&alias);
        let cached = self
            .preferences
            .get(&namespace, PUBLIC_KEY_FIELD, KEY_DOES_NOT_EXIST)?;
        if cached != KEY_DOES_NOT_EXIST {
            self.preferences.remove(&namespace, PUBLIC_KEY_FIELD)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::MemoryKeyStore;
    use crate::common::Digest;
    use crate::preferences::MemoryPreferences;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    /// 可在 `get` 处暂停调用方的偏好存储
    #[derive(Default)]
    struct GatedPreferences {
        inner: MemoryPreferences,
        entered: Mutex<Option<Sender<()>>>,
        release: Mutex<Option<Receiver<()>>>,
    }

    impl GatedPreferences {
        /// The next `get` signals `entered` and blocks until `release` fires.
        fn arm(&self) -> (Receiver<()>, Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            *self.entered.lock().unwrap() = Some(entered_tx);
            *self.release.lock().unwrap() = Some(release_rx);
            (entered_rx, release_tx)
        }
    }

    impl PreferenceStore for GatedPreferences {
        fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
            self.inner.put(namespace, key, value)
        }

        fn get(&self, namespace: &str, key: &str, default: &str) -> Result<String> {
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                let release = self.release.lock().unwrap().take().unwrap();
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.get(namespace, key, default)
        }

        fn remove(&self, namespace: &str, key: &str) -> Result<()> {
            self.inner.remove(namespace, key)
        }
    }

    /// 所有写操作都失败的偏好存储
    struct ReadOnlyPreferences;

    impl PreferenceStore for ReadOnlyPreferences {
        fn put(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Err(Error::Preferences("read-only".to_string()))
        }

        fn get(&self, _: &str, _: &str, default: &str) -> Result<String> {
            Ok(default.to_string())
        }

        fn remove(&self, _: &str, _: &str) -> Result<()> {
            Err(Error::Preferences("read-only".to_string()))
        }
    }

    fn lifecycle() -> KeyPairLifecycle {
        KeyPairLifecycle::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryPreferences::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let lifecycle = lifecycle();
        let params = KeyParameters::default();

        let first = lifecycle.ensure_key_pair("userKeys", &params).unwrap();
        let second = lifecycle.ensure_key_pair("userKeys", &params).unwrap();
        assert_eq!(first, second);
        assert_eq!(lifecycle.public_key("userKeys").unwrap(), first);
    }

    #[test]
    fn test_ensure_rejects_parameter_mismatch() {
        let lifecycle = lifecycle();
        lifecycle
            .ensure_key_pair("userKeys", &KeyParameters::default())
            .unwrap();

        let err = lifecycle
            .ensure_key_pair("userKeys", &KeyParameters::rsa_oaep_sha256(2048))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedParameters(_)));
    }

    #[test]
    fn test_invalid_alias_rejected_everywhere() {
        let lifecycle = lifecycle();
        let params = KeyParameters::default();
        assert!(matches!(lifecycle.ensure_key_pair("", &params), Err(Error::InvalidAlias(_))));
        assert!(matches!(lifecycle.public_key(" "), Err(Error::InvalidAlias(_))));
        assert!(matches!(lifecycle.delete_alias(""), Err(Error::InvalidAlias(_))));
        assert!(matches!(lifecycle.resolve_for_private_use(""), Err(Error::InvalidAlias(_))));
    }

    #[test]
    fn test_ensure_populates_cache_and_delete_clears_it() {
        let lifecycle = lifecycle();
        let public_key = lifecycle
            .ensure_key_pair("userKeys", &KeyParameters::default())
            .unwrap();

        let text = lifecycle.cached_public_key_text("userKeys").unwrap();
        assert_eq!(text, KeyCodec::encode_public_key_as_text(&public_key));
        assert!(!text.ends_with('='));
        assert_eq!(lifecycle.cached_public_key("userKeys").unwrap(), Some(public_key));

        lifecycle.delete_alias("userKeys").unwrap();
        assert_eq!(lifecycle.cached_public_key_text("userKeys").unwrap(), KEY_DOES_NOT_EXIST);
        assert!(matches!(
            lifecycle.resolve_for_private_use("userKeys"),
            Err(Error::AliasNotFound(_))
        ));
        assert!(matches!(lifecycle.delete_alias("userKeys"), Err(Error::AliasNotFound(_))));
    }

    #[test]
    fn test_store_public_key_text_validates() {
        let lifecycle = lifecycle();
        let public_key = lifecycle
            .ensure_key_pair("source", &KeyParameters::default())
            .unwrap();
        let text = lifecycle.export_public_key_text("source").unwrap();

        let stored = lifecycle.store_public_key_text("peer", &text).unwrap();
        assert_eq!(stored, public_key);
        assert_eq!(lifecycle.cached_public_key("peer").unwrap(), Some(public_key));
        // 缓存不代表密钥库中存在该别名
        assert!(!lifecycle.contains("peer").unwrap());

        let err = lifecycle.store_public_key_text("other", "%%%").unwrap_err();
        assert!(matches!(err, Error::MalformedKeyEncoding(_)));
        assert_eq!(lifecycle.cached_public_key_text("other").unwrap(), KEY_DOES_NOT_EXIST);

        lifecycle.remove_cached_public_key("peer").unwrap();
        lifecycle.remove_cached_public_key("peer").unwrap();
        assert_eq!(lifecycle.cached_public_key("peer").unwrap(), None);
    }

    #[test]
    fn test_concurrent_ensure_converges_on_one_pair() {
        let lifecycle = Arc::new(lifecycle());
        let params = KeyParameters::default();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                let params = params.clone();
                thread::spawn(move || lifecycle.ensure_key_pair("shared", &params).unwrap())
            })
            .collect();
        let keys: Vec<PublicKeyMaterial> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(lifecycle.aliases().unwrap().len(), 1);
    }

    #[test]
    fn test_digest_order_does_not_matter() {
        let lifecycle = lifecycle();
        let first = lifecycle
            .ensure_key_pair("userKeys", &KeyParameters::default())
            .unwrap();

        let mut reordered = KeyParameters::default();
        reordered.digests = vec![Digest::Sha512, Digest::Sha256];
        assert_eq!(lifecycle.ensure_key_pair("userKeys", &reordered).unwrap(), first);
    }

    #[test]
    fn test_cache_failures_do_not_fail_the_lifecycle() {
        let lifecycle = KeyPairLifecycle::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(ReadOnlyPreferences),
        )
        .unwrap();

        let public_key = lifecycle
            .ensure_key_pair("userKeys", &KeyParameters::default())
            .unwrap();
        assert_eq!(lifecycle.public_key("userKeys").unwrap(), public_key);
        assert_eq!(lifecycle.cached_public_key("userKeys").unwrap(), None);

        lifecycle.delete_alias("userKeys").unwrap();
        assert!(!lifecycle.contains("userKeys").unwrap());

        // 显式缓存操作仍然报告错误
        let text = KeyCodec::encode_public_key_as_text(&public_key);
        assert!(matches!(
            lifecycle.store_public_key_text("peer", &text),
            Err(Error::Preferences(_))
        ));
    }

    #[test]
    fn test_delete_waits_for_inflight_cache_refresh() {
        let preferences = Arc::new(GatedPreferences::default());
        let lifecycle = Arc::new(
            KeyPairLifecycle::new(Arc::new(MemoryKeyStore::new()), preferences.clone()).unwrap(),
        );
        let params = KeyParameters::default();
        lifecycle.ensure_key_pair("k", &params).unwrap();

        let (entered, release) = preferences.arm();
        let refresher = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || lifecycle.ensure_key_pair("k", &params).unwrap())
        };
        entered.recv().unwrap();

        let deleter = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || lifecycle.delete_alias("k").unwrap())
        };
        // 删除方应阻塞在别名锁上，直到刷新完成
        thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();

        refresher.join().unwrap();
        deleter.join().unwrap();

        assert!(!lifecycle.contains("k").unwrap());
        assert_eq!(lifecycle.cached_public_key_text("k").unwrap(), KEY_DOES_NOT_EXIST);
    }

    #[test]
    fn test_alias_locks_are_released() {
        let lifecycle = lifecycle();
        let params = KeyParameters::default();

        lifecycle.ensure_key_pair("userKeys", &params).unwrap();
        assert!(lifecycle.delete_alias("never-existed").is_err());
        lifecycle.delete_alias("userKeys").unwrap();
        assert!(lifecycle.alias_locks.is_empty());
    }
}
