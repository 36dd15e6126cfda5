//!
//! # 通用配置模块
//!
//! 包含密钥对生成参数与密钥库（Vault）配置。
//! 生成参数在密钥对创建时固定，并随密钥对一起保存，使用时必须与之匹配。
//!
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 允许的 RSA 模数长度
pub const SUPPORTED_RSA_KEY_BITS: [usize; 3] = [2048, 3072, 4096];

/// 默认 RSA 模数长度
pub const DEFAULT_RSA_KEY_BITS: usize = 2048;

/// 非对称算法
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Rsa,
}

/// 摘要算法
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Digest {
    Sha256,
    Sha512,
}

/// 加密填充方案
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionPadding {
    /// RSA PKCS#1 v1.5
    RsaPkcs1,
    /// RSA OAEP，MGF1 与标签哈希均为 SHA-256
    RsaOaepSha256,
}

impl EncryptionPadding {
    /// Bytes of the modulus consumed by the padding structure.
    pub fn overhead_bytes(self) -> usize {
        match self {
            EncryptionPadding::RsaPkcs1 => 11,
            // 2 * hLen + 2
            EncryptionPadding::RsaOaepSha256 => 2 * 32 + 2,
        }
    }
}

/// 密钥用途
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPurposes {
    pub encrypt: bool,
    pub decrypt: bool,
}

impl KeyPurposes {
    pub const ENCRYPT_DECRYPT: KeyPurposes = KeyPurposes {
        encrypt: true,
        decrypt: true,
    };
}

impl Default for KeyPurposes {
    fn default() -> Self {
        Self::ENCRYPT_DECRYPT
    }
}

/// Parameters fixed when a key pair is generated.
///
/// The bundle is stored next to the key pair; encryption and decryption always
/// use the stored bundle, so a pair can never be used with a padding scheme it
/// was not generated for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParameters {
    pub algorithm: KeyAlgorithm,
    pub key_size_bits: usize,
    pub purposes: KeyPurposes,
    pub digests: Vec<Digest>,
    pub padding: EncryptionPadding,
}

impl Default for KeyParameters {
    fn default() -> Self {
        Self::rsa_pkcs1(DEFAULT_RSA_KEY_BITS)
    }
}

impl KeyParameters {
    /// RSA with PKCS#1 v1.5 encryption padding.
    pub fn rsa_pkcs1(key_size_bits: usize) -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            key_size_bits,
            purposes: KeyPurposes::ENCRYPT_DECRYPT,
            digests: vec![Digest::Sha256, Digest::Sha512],
            padding: EncryptionPadding::RsaPkcs1,
        }
    }

    /// RSA with OAEP (SHA-256) encryption padding.
    pub fn rsa_oaep_sha256(key_size_bits: usize) -> Self {
        Self {
            padding: EncryptionPadding::RsaOaepSha256,
            ..Self::rsa_pkcs1(key_size_bits)
        }
    }

    /// Checks that a key pair can be generated and used with these parameters.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            KeyAlgorithm::Rsa => {}
        }
        if !SUPPORTED_RSA_KEY_BITS.contains(&self.key_size_bits) {
            return Err(Error::UnsupportedParameters(format!(
                "RSA key size {} is not one of {:?}",
                self.key_size_bits, SUPPORTED_RSA_KEY_BITS
            )));
        }
        if !(self.purposes.encrypt && self.purposes.decrypt) {
            return Err(Error::UnsupportedParameters(
                "key pairs must be generated for both encryption and decryption".to_string(),
            ));
        }
        if self.digests.is_empty() {
            return Err(Error::UnsupportedParameters(
                "digest set must not be empty".to_string(),
            ));
        }
        if self.padding == EncryptionPadding::RsaOaepSha256
            && !self.digests.contains(&Digest::Sha256)
        {
            return Err(Error::UnsupportedParameters(
                "OAEP padding requires SHA-256 in the digest set".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a key pair generated with `self` serves a request for `other`.
    ///
    /// 摘要按集合比较，与声明顺序和重复项无关
    pub fn is_compatible_with(&self, other: &KeyParameters) -> bool {
        self.algorithm == other.algorithm
            && self.key_size_bits == other.key_size_bits
            && self.purposes == other.purposes
            && self.padding == other.padding
            && self.digest_set() == other.digest_set()
    }

    fn digest_set(&self) -> BTreeSet<Digest> {
        self.digests.iter().copied().collect()
    }

    /// Largest plaintext, in bytes, a single encryption can take:
    /// `key_size_bits / 8 - padding overhead`.
    pub fn max_plaintext_len(&self) -> usize {
        (self.key_size_bits / 8).saturating_sub(self.padding.overhead_bytes())
    }
}

/// Argon2id 口令派生参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfConfig {
    /// 内存成本（KiB）
    pub memory_cost_kib: u32,
    /// 迭代次数
    pub time_cost: u32,
    /// 并行度
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_cost == 0 || self.parallelism == 0 {
            return Err(Error::Configuration(
                "KDF time cost and parallelism must be at least 1".to_string(),
            ));
        }
        if self.memory_cost_kib < 8 * self.parallelism {
            return Err(Error::Configuration(format!(
                "KDF memory cost must be at least {} KiB",
                8 * self.parallelism
            )));
        }
        Ok(())
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./keys")
}

fn default_preferences_dir() -> PathBuf {
    PathBuf::from("./prefs")
}

fn default_preference_namespace() -> String {
    "seal-keypair".to_string()
}

/// 完整配置文件，代表了密钥库的所有可配置项。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VaultConfig {
    /// 密钥库目录
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// 公钥缓存（偏好设置）目录
    #[serde(default = "default_preferences_dir")]
    pub preferences_dir: PathBuf,
    /// 公钥缓存命名空间前缀
    #[serde(default = "default_preference_namespace")]
    pub preference_namespace: String,
    /// 新密钥对的默认生成参数
    #[serde(default)]
    pub key_parameters: KeyParameters,
    /// 口令派生参数
    #[serde(default)]
    pub kdf: KdfConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            preferences_dir: default_preferences_dir(),
            preference_namespace: default_preference_namespace(),
            key_parameters: KeyParameters::default(),
            kdf: KdfConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Creates a config rooted at `dir`, with `keys/` and `prefs/` underneath.
    pub fn rooted_at<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            store_dir: dir.join("keys"),
            preferences_dir: dir.join("prefs"),
            ..Self::default()
        }
    }

    /// Loads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: VaultConfig = serde_json::from_str(&json).map_err(|e| {
            Error::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Configuration(e.to_string()))?;
        fs::write(path, json).map_err(|e| {
            Error::Configuration(format!("cannot write {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.preference_namespace.trim().is_empty() {
            return Err(Error::Configuration(
                "preference namespace must not be empty".to_string(),
            ));
        }
        self.key_parameters
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        self.kdf.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_parameters() {
        let params = KeyParameters::default();
        assert_eq!(params.algorithm, KeyAlgorithm::Rsa);
        assert_eq!(params.key_size_bits, 2048);
        assert_eq!(params.padding, EncryptionPadding::RsaPkcs1);
        assert_eq!(params.digests, vec![Digest::Sha256, Digest::Sha512]);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_max_plaintext_len() {
        assert_eq!(KeyParameters::rsa_pkcs1(2048).max_plaintext_len(), 245);
        assert_eq!(KeyParameters::rsa_pkcs1(4096).max_plaintext_len(), 501);
        assert_eq!(KeyParameters::rsa_oaep_sha256(2048).max_plaintext_len(), 190);
    }

    #[test]
    fn test_weak_key_sizes_rejected() {
        for bits in [512, 1024, 2047, 8192] {
            let err = KeyParameters::rsa_pkcs1(bits).validate().unwrap_err();
            assert!(matches!(err, Error::UnsupportedParameters(_)));
        }
    }

    #[test]
    fn test_invalid_parameter_bundles_rejected() {
        let mut params = KeyParameters::default();
        params.purposes.decrypt = false;
        assert!(matches!(params.validate(), Err(Error::UnsupportedParameters(_))));

        let mut params = KeyParameters::default();
        params.digests.clear();
        assert!(matches!(params.validate(), Err(Error::UnsupportedParameters(_))));

        let mut params = KeyParameters::rsa_oaep_sha256(2048);
        params.digests = vec![Digest::Sha512];
        assert!(matches!(params.validate(), Err(Error::UnsupportedParameters(_))));
    }

    #[test]
    fn test_digests_compare_as_a_set() {
        let stored = KeyParameters::default();
        let mut reordered = KeyParameters::default();
        reordered.digests = vec![Digest::Sha512, Digest::Sha256, Digest::Sha512];
        assert!(stored.is_compatible_with(&reordered));

        let mut narrower = KeyParameters::default();
        narrower.digests = vec![Digest::Sha256];
        assert!(!stored.is_compatible_with(&narrower));

        assert!(!stored.is_compatible_with(&KeyParameters::rsa_oaep_sha256(2048)));
        assert!(!stored.is_compatible_with(&KeyParameters::rsa_pkcs1(3072)));
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.config.json");
        let mut config = VaultConfig::rooted_at(dir.path());
        config.key_parameters = KeyParameters::rsa_oaep_sha256(3072);
        config.save(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "store_dir": "/var/lib/keys" }"#).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded.store_dir, PathBuf::from("/var/lib/keys"));
        assert_eq!(loaded.preference_namespace, "seal-keypair");
        assert_eq!(loaded.kdf, KdfConfig::default());
    }

    #[test]
    fn test_config_rejects_weak_key_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weak.json");
        let mut config = VaultConfig::default();
        config.key_parameters.key_size_bits = 512;
        config.save(&path).unwrap();

        assert!(matches!(VaultConfig::load(&path), Err(Error::Configuration(_))));
    }
}
