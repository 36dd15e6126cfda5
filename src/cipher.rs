//! Encrypt-with-public-key / decrypt-with-private-key over aliased key pairs.
//!
//! Ciphertext travels as padded standard base64 without line wrapping.
//! Decryption accepts padded or unpadded text and ignores ASCII whitespace.
//!
//! Encryption never generates keys: an unknown alias is `AliasNotFound`.
//! Every cipher-level decryption failure is reported as `DecryptionFailed`,
//! whatever the underlying cause.

use crate::codec::LENIENT_STANDARD;
use crate::common::KeyPairAlias;
use crate::common::utils::strip_ascii_whitespace;
use crate::error::{Error, Result};
use crate::lifecycle::KeyPairLifecycle;
use crate::systems::rsa::RsaSystem;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Text-encoded ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CipherText(String);

impl CipherText {
    fn from_bytes(ciphertext: &[u8]) -> Self {
        Self(STANDARD.encode(ciphertext))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CipherText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CipherText> for String {
    fn from(value: CipherText) -> Self {
        value.0
    }
}

impl fmt::Display for CipherText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 加解密服务，密钥对均通过 [`KeyPairLifecycle`] 解析
#[derive(Clone)]
pub struct CipherService {
    lifecycle: Arc<KeyPairLifecycle>,
}

impl CipherService {
    pub fn new(lifecycle: Arc<KeyPairLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Arc<KeyPairLifecycle> {
        &self.lifecycle
    }

    /// Encrypts UTF-8 text with the public key of `alias`.
    ///
    /// Blank text is `EmptyInput`. Text longer than
    /// [`CipherService::max_plaintext_len`] bytes is `KeySizeExceeded`.
    pub fn encrypt(&self, alias: &str, plaintext: &str) -> Result<CipherText> {
        if plaintext.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        self.encrypt_bytes(alias, plaintext.as_bytes())
    }

    pub fn encrypt_bytes(&self, alias: &str, plaintext: &[u8]) -> Result<CipherText> {
        if plaintext.is_empty() {
            return Err(Error::EmptyInput);
        }
        let alias = KeyPairAlias::parse(alias)?;
        let (public_key, parameters) = self.lifecycle.resolve_public(&alias)?;
        let ciphertext =
            RsaSystem::encrypt(&public_key.to_rsa()?, parameters.padding, plaintext)?;
        debug!("encrypted {} bytes for `{}`", plaintext.len(), alias);
        Ok(CipherText::from_bytes(&ciphertext))
    }

    /// Decrypts text produced by [`CipherService::encrypt`].
    ///
    /// A payload that decrypts but is not UTF-8 is `DecryptionFailed`.
    pub fn decrypt(&self, alias: &str, ciphertext: &str) -> Result<String> {
        let plaintext = self.decrypt_bytes(alias, ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
    }

    pub fn decrypt_bytes(&self, alias: &str, ciphertext: &str) -> Result<Vec<u8>> {
        let handle = self.lifecycle.resolve_for_private_use(alias)?;
        handle.decrypt(&decode_ciphertext(ciphertext)?)
    }

    /// Largest plaintext, in bytes, one encryption under `alias` accepts.
    pub fn max_plaintext_len(&self, alias: &str) -> Result<usize> {
        let alias = KeyPairAlias::parse(alias)?;
        let (_, parameters) = self.lifecycle.resolve_public(&alias)?;
        Ok(parameters.max_plaintext_len())
    }

    /// Encrypts a batch in parallel, resolving the key once.
    ///
    /// The outer error covers alias resolution; each item carries its own result.
    #[cfg(feature = "parallel")]
    pub fn encrypt_many<S>(&self, alias: &str, plaintexts: &[S]) -> Result<Vec<Result<CipherText>>>
    where
        S: AsRef<str> + Sync,
    {
        let alias = KeyPairAlias::parse(alias)?;
        let (public_key, parameters) = self.lifecycle.resolve_public(&alias)?;
        let public_key = public_key.to_rsa()?;

        Ok(plaintexts
            .par_iter()
            .map(|plaintext| {
                let plaintext = plaintext.as_ref();
                if plaintext.trim().is_empty() {
                    return Err(Error::EmptyInput);
                }
                RsaSystem::encrypt(&public_key, parameters.padding, plaintext.as_bytes())
                    .map(|ciphertext| CipherText::from_bytes(&ciphertext))
            })
            .collect())
    }

    /// Decrypts a batch in parallel, resolving the key pair once.
    #[cfg(feature = "parallel")]
    pub fn decrypt_many<S>(&self, alias: &str, ciphertexts: &[S]) -> Result<Vec<Result<String>>>
    where
        S: AsRef<str> + Sync,
    {
        let handle = self.lifecycle.resolve_for_private_use(alias)?;

        Ok(ciphertexts
            .par_iter()
            .map(|ciphertext| {
                let plaintext = handle.decrypt(&decode_ciphertext(ciphertext.as_ref())?)?;
                String::from_utf8(plaintext).map_err(|_| Error::DecryptionFailed)
            })
            .collect())
    }
}

fn decode_ciphertext(text: &str) -> Result<Vec<u8>> {
    let compact = strip_ascii_whitespace(text);
    if compact.is_empty() {
        return Err(Error::MalformedCiphertext);
    }
    LENIENT_STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| Error::MalformedCiphertext)
}
