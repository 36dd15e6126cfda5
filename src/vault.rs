//! `KeyVault` 门面：把密钥库、公钥缓存、生命周期管理与加解密服务组装在一起。

use crate::cipher::CipherService;
use crate::codec::PublicKeyMaterial;
use crate::common::VaultConfig;
use crate::error::Result;
use crate::keystore::{MemoryKeyStore, SecureKeyStore};
use crate::lifecycle::KeyPairLifecycle;
use crate::preferences::{MemoryPreferences, PreferenceStore};
use std::sync::Arc;

#[cfg(feature = "file-store")]
use crate::keystore::FileKeyStore;
#[cfg(feature = "file-store")]
use crate::preferences::JsonFilePreferences;
#[cfg(feature = "file-store")]
use log::info;
#[cfg(feature = "file-store")]
use secrecy::SecretString;

/// Entry point bundling a configured lifecycle and cipher service.
pub struct KeyVault {
    config: VaultConfig,
    lifecycle: Arc<KeyPairLifecycle>,
    cipher: CipherService,
}

impl KeyVault {
    /// Opens the password-protected vault under `config.store_dir`, with the
    /// public key cache under `config.preferences_dir`.
    ///
    /// 中文: 首次打开时创建保险库；之后必须使用相同口令。
    #[cfg(feature = "file-store")]
    pub fn open(config: VaultConfig, password: SecretString) -> Result<Self> {
        config.validate()?;
        let store =
            FileKeyStore::new(config.store_dir.clone(), password).with_kdf(config.kdf.clone());
        let preferences = JsonFilePreferences::new(config.preferences_dir.clone())?;
        info!(
            "opening key vault at {} (cache at {})",
            config.store_dir.display(),
            config.preferences_dir.display()
        );
        Self::with_stores(Arc::new(store), Arc::new(preferences), config)
    }

    /// Builds a vault over caller-provided backends. The store is opened here.
    pub fn with_stores(
        store: Arc<dyn SecureKeyStore>,
        preferences: Arc<dyn PreferenceStore>,
        config: VaultConfig,
    ) -> Result<Self> {
        config.validate()?;
        let lifecycle = Arc::new(
            KeyPairLifecycle::new(store, preferences)?
                .with_namespace_prefix(config.preference_namespace.clone()),
        );
        Ok(Self {
            cipher: CipherService::new(Arc::clone(&lifecycle)),
            lifecycle,
            config,
        })
    }

    /// A vault that lives only as long as the value.
    pub fn in_memory() -> Result<Self> {
        Self::with_stores(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryPreferences::new()),
            VaultConfig::default(),
        )
    }

    /// Ensures `alias` exists with the configured default parameters.
    pub fn ensure_default_key_pair(&self, alias: &str) -> Result<PublicKeyMaterial> {
        self.lifecycle
            .ensure_key_pair(alias, &self.config.key_parameters)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &KeyPairLifecycle {
        &self.lifecycle
    }

    pub fn cipher(&self) -> &CipherService {
        &self.cipher
    }
}
