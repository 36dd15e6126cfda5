//! Process-local key store.

use super::{Aliases, KeyPairHandle, SecureKeyStore};
use crate::common::{KeyPairAlias, KeyParameters};
use crate::error::{Error, Result};
use crate::systems::rsa::RsaSystem;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};

/// A key store that keeps key pairs in memory for the lifetime of the value.
///
/// Suitable for tests and for hosts that provide no persistent secure storage.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: DashMap<KeyPairAlias, KeyPairHandle>,
    opened: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.opened.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(
                "memory key store has not been opened".to_string(),
            ))
        }
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn open(&self) -> Result<()> {
        if !self.opened.swap(true, Ordering::AcqRel) {
            debug!("memory key store opened");
        }
        Ok(())
    }

    fn generate_key_pair(
        &self,
        alias: &KeyPairAlias,
        params: &KeyParameters,
    ) -> Result<KeyPairHandle> {
        self.ensure_open()?;
        if let Some(existing) = self.entries.get(alias) {
            return Ok(existing.value().clone());
        }

        // 在分片锁之外生成，避免阻塞其他别名
        let private_key = RsaSystem::generate_private_key(params)?;
        let handle = KeyPairHandle::new(alias.clone(), params.clone(), private_key)?;

        let stored = match self.entries.entry(alias.clone()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                info!(
                    "generated {}-bit key pair `{}` ({})",
                    params.key_size_bits,
                    alias,
                    handle.public_key().fingerprint()
                );
                vacant.insert(handle).value().clone()
            }
        };
        Ok(stored)
    }

    fn get_key_pair(&self, alias: &KeyPairAlias) -> Result<KeyPairHandle> {
        self.ensure_open()?;
        self.entries
            .get(alias)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::AliasNotFound(alias.to_string()))
    }

    fn delete_key_pair(&self, alias: &KeyPairAlias) -> Result<()> {
        self.ensure_open()?;
        match self.entries.remove(alias) {
            Some(_) => {
                info!("deleted key pair `{}`", alias);
                Ok(())
            }
            None => Err(Error::AliasNotFound(alias.to_string())),
        }
    }

    fn aliases(&self) -> Result<Aliases<'_>> {
        self.ensure_open()?;
        let mut snapshot: Vec<KeyPairAlias> =
            self.entries.iter().map(|entry| entry.key().clone()).collect();
        snapshot.sort();
        Ok(Aliases::new(snapshot.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(name: &str) -> KeyPairAlias {
        KeyPairAlias::parse(name).unwrap()
    }

    fn opened_store() -> MemoryKeyStore {
        let store = MemoryKeyStore::new();
        store.open().unwrap();
        store
    }

    #[test]
    fn test_operations_require_open() {
        let store = MemoryKeyStore::new();
        let err = store.get_key_pair(&alias("a")).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(matches!(store.aliases(), Err(Error::StoreUnavailable(_))));

        store.open().unwrap();
        store.open().unwrap();
        assert!(matches!(store.get_key_pair(&alias("a")), Err(Error::AliasNotFound(_))));
    }

    #[test]
    fn test_generate_reuses_existing_pair() {
        let store = opened_store();
        let first = store
            .generate_key_pair(&alias("userKeys"), &KeyParameters::default())
            .unwrap();
        // 不同参数也不会覆盖已有密钥对
        let second = store
            .generate_key_pair(&alias("userKeys"), &KeyParameters::rsa_oaep_sha256(2048))
            .unwrap();

        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(second.parameters(), &KeyParameters::default());
    }

    #[test]
    fn test_generate_rejects_unsupported_parameters() {
        let store = opened_store();
        let err = store
            .generate_key_pair(&alias("weak"), &KeyParameters::rsa_pkcs1(512))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedParameters(_)));
        assert!(!store.contains(&alias("weak")).unwrap());
    }

    #[test]
    fn test_delete_is_strict() {
        let store = opened_store();
        store
            .generate_key_pair(&alias("temp"), &KeyParameters::default())
            .unwrap();

        store.delete_key_pair(&alias("temp")).unwrap();
        assert!(matches!(store.get_key_pair(&alias("temp")), Err(Error::AliasNotFound(_))));
        assert!(matches!(
            store.delete_key_pair(&alias("temp")),
            Err(Error::AliasNotFound(_))
        ));
    }

    #[test]
    fn test_aliases_lists_sorted_snapshot() {
        let store = opened_store();
        for name in ["b", "a"] {
            store
                .generate_key_pair(&alias(name), &KeyParameters::default())
                .unwrap();
        }
        let listed: Vec<String> = store
            .aliases()
            .unwrap()
            .map(|a| a.unwrap().to_string())
            .collect();
        assert_eq!(listed, vec!["a", "b"]);
    }
}
