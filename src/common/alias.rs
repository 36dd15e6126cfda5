//! Validated key pair aliases.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 别名的最大字节长度（文件存储会将别名编码进文件名）
pub const MAX_ALIAS_LEN: usize = 128;

/// The identifier of one key pair inside a secure key store.
///
/// An alias is never empty or whitespace-only and never longer than
/// [`MAX_ALIAS_LEN`] bytes. Every public operation validates its alias
/// argument through [`KeyPairAlias::parse`] before touching a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPairAlias(String);

impl KeyPairAlias {
    /// Validates `alias` and wraps it.
    pub fn parse(alias: impl Into<String>) -> Result<Self> {
        let alias = alias.into();
        if alias.trim().is_empty() {
            return Err(Error::InvalidAlias("alias must not be empty".to_string()));
        }
        if alias.len() > MAX_ALIAS_LEN {
            return Err(Error::InvalidAlias(format!(
                "alias is {} bytes long, the limit is {}",
                alias.len(),
                MAX_ALIAS_LEN
            )));
        }
        if alias.chars().any(char::is_control) {
            return Err(Error::InvalidAlias(
                "alias must not contain control characters".to_string(),
            ));
        }
        Ok(Self(alias))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyPairAlias {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for KeyPairAlias {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<KeyPairAlias> for String {
    fn from(alias: KeyPairAlias) -> Self {
        alias.0
    }
}

impl AsRef<str> for KeyPairAlias {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyPairAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
