//! Defines the custom error type for the `seal-keypair` crate.

use thiserror::Error;

/// The main error type for the `seal-keypair` crate.
///
/// Every failure inside the crate surfaces through this enum; nothing is
/// swallowed or only logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid key pair alias: {0}")]
    InvalidAlias(String),

    #[error("secure key store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no key pair stored under alias `{0}`")]
    AliasNotFound(String),

    #[error("unsupported key parameters: {0}")]
    UnsupportedParameters(String),

    #[error("key store entry for `{alias}` is corrupt: {reason}")]
    CorruptEntry { alias: String, reason: String },

    #[error("malformed public key encoding: {0}")]
    MalformedKeyEncoding(String),

    #[error("invalid public key structure: {0}")]
    InvalidKeySpec(String),

    #[error("plaintext is empty")]
    EmptyInput,

    #[error("plaintext of {actual} bytes exceeds the {max} byte limit of the key")]
    KeySizeExceeded { max: usize, actual: usize },

    // 解密路径的两类错误刻意不携带细节，避免成为填充预言机。
    #[error("ciphertext is malformed")]
    MalformedCiphertext,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("preference store error: {0}")]
    Preferences(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cryptography error: {0}")]
    Cryptography(String),
}

impl Error {
    pub(crate) fn corrupt(alias: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptEntry {
            alias: alias.into(),
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type for `seal-keypair` operations.
pub type Result<T> = std::result::Result<T, Error>;
