//! Password-protected directory key store.
// 中文: 基于口令保护的目录密钥库。
//
// Layout:
//   <root>/vault.json                          KDF salt + costs + sealed check value
//   <root>/entries/<base64url(alias)>.key.json  one key pair per file

use super::container::{SALT_SIZE, SealedBox, WrappingKey, derive_wrapping_key, random_bytes};
use super::{Aliases, KeyPairHandle, SecureKeyStore};
use crate::common::{KdfConfig, KeyPairAlias, KeyParameters};
use crate::error::{Error, Result};
use crate::systems::rsa::RsaSystem;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::NamedTempFile;

const VAULT_FILE: &str = "vault.json";
const ENTRIES_DIR: &str = "entries";
const ENTRY_SUFFIX: &str = ".key.json";
const VAULT_FORMAT_VERSION: u32 = 1;
const VAULT_CHECK: &[u8] = b"seal-keypair/vault-check/v1";
const VAULT_CHECK_AAD: &[u8] = b"seal-keypair/vault";

/// Vault header persisted at `<root>/vault.json`.
#[derive(Serialize, Deserialize)]
struct VaultHeader {
    version: u32,
    salt: String,
    kdf: KdfConfig,
    check: SealedBox,
}

/// One key pair on disk. The private key is sealed with the vault wrapping
/// key and bound to its alias.
#[derive(Serialize, Deserialize)]
struct KeyEntry {
    alias: KeyPairAlias,
    created_at: DateTime<Utc>,
    parameters: KeyParameters,
    /// SPKI DER, standard base64
    public_key: String,
    private_key: SealedBox,
}

/// A software key vault: each key pair lives in its own JSON file, with the
/// PKCS#8 private key sealed under an AES-256-GCM key derived from the vault
/// password by Argon2id.
///
/// `open` derives the wrapping key once and checks it against the vault
/// header, so a wrong password fails up front with `StoreUnavailable`.
///
/// 中文: 软件密钥保险库。每个密钥对保存为单独的 JSON 文件，私钥以 Argon2id
/// 派生的 AES-256-GCM 密钥封装。
pub struct FileKeyStore {
    root: PathBuf,
    password: SecretString,
    kdf: KdfConfig,
    wrapping_key: OnceLock<WrappingKey>,
}

impl FileKeyStore {
    /// Creates a store rooted at `root`. Nothing touches the disk until
    /// [`SecureKeyStore::open`].
    pub fn new(root: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            root: root.into(),
            password,
            kdf: KdfConfig::default(),
            wrapping_key: OnceLock::new(),
        }
    }

    /// KDF costs used when the vault is created. An existing vault keeps the
    /// costs recorded in its header.
    pub fn with_kdf(mut self, kdf: KdfConfig) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    fn entry_path(&self, alias: &KeyPairAlias) -> PathBuf {
        self.entries_dir().join(format!(
            "{}{}",
            URL_SAFE_NO_PAD.encode(alias.as_str()),
            ENTRY_SUFFIX
        ))
    }

    fn wrapping_key(&self) -> Result<&WrappingKey> {
        self.wrapping_key.get().ok_or_else(|| {
            Error::StoreUnavailable(format!(
                "key store at {} has not been opened",
                self.root.display()
            ))
        })
    }

    fn unlock(&self) -> Result<WrappingKey> {
        let header_path = self.root.join(VAULT_FILE);
        match fs::read_to_string(&header_path) {
            Ok(json) => self.unlock_existing(&json),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.create_vault(&header_path),
            Err(e) => Err(unavailable(&header_path, e)),
        }
    }

    fn unlock_existing(&self, json: &str) -> Result<WrappingKey> {
        let header: VaultHeader = serde_json::from_str(json)
            .map_err(|e| Error::StoreUnavailable(format!("vault header is unreadable: {}", e)))?;
        if header.version != VAULT_FORMAT_VERSION {
            return Err(Error::StoreUnavailable(format!(
                "unsupported vault format version {}",
                header.version
            )));
        }
        let salt = STANDARD
            .decode(&header.salt)
            .map_err(|e| Error::StoreUnavailable(format!("vault salt is unreadable: {}", e)))?;

        let key = derive_wrapping_key(&self.password, &salt, &header.kdf)?;
        let accepted = header
            .check
            .open(&key, VAULT_CHECK_AAD)
            .is_some_and(|check| check.as_slice() == VAULT_CHECK);
        if !accepted {
            return Err(Error::StoreUnavailable(
                "vault password rejected".to_string(),
            ));
        }
        Ok(key)
    }

    fn create_vault(&self, header_path: &Path) -> Result<WrappingKey> {
        self.kdf.validate()?;
        let salt = random_bytes::<SALT_SIZE>()?;
        let key = derive_wrapping_key(&self.password, &salt, &self.kdf)?;
        let header = VaultHeader {
            version: VAULT_FORMAT_VERSION,
            salt: STANDARD.encode(salt),
            kdf: self.kdf.clone(),
            check: SealedBox::seal(&key, VAULT_CHECK, VAULT_CHECK_AAD)?,
        };
        let json = serde_json::to_vec_pretty(&header)
            .map_err(|e| Error::StoreUnavailable(format!("cannot encode vault header: {}", e)))?;

        match write_new_file(&self.root, header_path, &json) {
            Ok(()) => {
                info!("created key vault at {}", self.root.display());
                Ok(key)
            }
            // 另一个进程抢先创建了保险库，以其为准
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let json =
                    fs::read_to_string(header_path).map_err(|e| unavailable(header_path, e))?;
                self.unlock_existing(&json)
            }
            Err(e) => Err(unavailable(header_path, e)),
        }
    }

    fn read_entry(&self, alias: &KeyPairAlias) -> Result<KeyPairHandle> {
        let key = self.wrapping_key()?;
        let path = self.entry_path(alias);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::AliasNotFound(alias.to_string()));
            }
            Err(e) => return Err(unavailable(&path, e)),
        };
        decode_entry(alias, &json, key)
            .inspect_err(|e| warn!("rejecting key store entry {}: {}", path.display(), e))
    }
}

fn decode_entry(alias: &KeyPairAlias, json: &str, key: &WrappingKey) -> Result<KeyPairHandle> {
    let entry: KeyEntry = serde_json::from_str(json)
        .map_err(|e| Error::corrupt(alias.as_str(), format!("unreadable entry: {}", e)))?;
    if &entry.alias != alias {
        return Err(Error::corrupt(
            alias.as_str(),
            format!("entry belongs to alias `{}`", entry.alias),
        ));
    }

    let private_der = entry
        .private_key
        .open(key, alias.as_str().as_bytes())
        .ok_or_else(|| Error::corrupt(alias.as_str(), "private key cannot be unsealed"))?;
    let private_key = RsaSystem::import_private_key(&private_der)
        .map_err(|e| Error::corrupt(alias.as_str(), e.to_string()))?;
    let handle = KeyPairHandle::new(alias.clone(), entry.parameters, private_key)?;

    let stored_public = STANDARD
        .decode(&entry.public_key)
        .map_err(|e| Error::corrupt(alias.as_str(), format!("public key unreadable: {}", e)))?;
    if stored_public != handle.public_key().as_der() {
        return Err(Error::corrupt(
            alias.as_str(),
            "public key does not match private key",
        ));
    }
    Ok(handle)
}

fn decode_alias(encoded: &str) -> Result<KeyPairAlias> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::corrupt(encoded, format!("entry file name: {}", e)))?;
    let alias = String::from_utf8(bytes)
        .map_err(|e| Error::corrupt(encoded, format!("entry file name: {}", e)))?;
    KeyPairAlias::parse(alias)
        .map_err(|e| Error::corrupt(encoded, format!("entry file name: {}", e)))
}

fn unavailable(path: &Path, e: io::Error) -> Error {
    Error::StoreUnavailable(format!("{}: {}", path.display(), e))
}

/// Writes `bytes` to `path` atomically, failing with `AlreadyExists` rather
/// than replacing an existing file.
fn write_new_file(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

impl SecureKeyStore for FileKeyStore {
    fn open(&self) -> Result<()> {
        if self.wrapping_key.get().is_some() {
            return Ok(());
        }
        let entries = self.entries_dir();
        fs::create_dir_all(&entries).map_err(|e| unavailable(&entries, e))?;

        let key = self.unlock()?;
        // 并发 open 时先完成者胜出，两者派生出的密钥相同
        let _ = self.wrapping_key.set(key);
        debug!("opened key store at {}", self.root.display());
        Ok(())
    }

    fn generate_key_pair(
        &self,
        alias: &KeyPairAlias,
        params: &KeyParameters,
    ) -> Result<KeyPairHandle> {
        let key = self.wrapping_key()?;
        match self.read_entry(alias) {
            Ok(existing) => return Ok(existing),
            Err(Error::AliasNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let private_key = RsaSystem::generate_private_key(params)?;
        let private_der = RsaSystem::export_private_key(&private_key)?;
        let sealed = SealedBox::seal(key, &private_der, alias.as_str().as_bytes())?;
        let handle = KeyPairHandle::new(alias.clone(), params.clone(), private_key)?;

        let entry = KeyEntry {
            alias: alias.clone(),
            created_at: Utc::now(),
            parameters: params.clone(),
            public_key: STANDARD.encode(handle.public_key().as_der()),
            private_key: sealed,
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| Error::StoreUnavailable(format!("cannot encode entry: {}", e)))?;

        let path = self.entry_path(alias);
        match write_new_file(&self.entries_dir(), &path, &json) {
            Ok(()) => {
                info!(
                    "generated {}-bit key pair `{}` ({})",
                    params.key_size_bits,
                    alias,
                    handle.public_key().fingerprint()
                );
                Ok(handle)
            }
            // 并发生成同一别名：以先写入者为准
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.read_entry(alias),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn get_key_pair(&self, alias: &KeyPairAlias) -> Result<KeyPairHandle> {
        self.read_entry(alias)
    }

    fn delete_key_pair(&self, alias: &KeyPairAlias) -> Result<()> {
        self.wrapping_key()?;
        let path = self.entry_path(alias);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("deleted key pair `{}`", alias);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::AliasNotFound(alias.to_string()))
            }
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn aliases(&self) -> Result<Aliases<'_>> {
        self.wrapping_key()?;
        let dir = self.entries_dir();
        let read_dir = fs::read_dir(&dir).map_err(|e| unavailable(&dir, e))?;

        Ok(Aliases::new(read_dir.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(Error::StoreUnavailable(e.to_string()))),
            };
            let file_name = entry.file_name();
            // 临时文件与无关文件不属于密钥条目
            let encoded = file_name.to_str()?.strip_suffix(ENTRY_SUFFIX)?;
            Some(decode_alias(encoded))
        })))
    }
}
