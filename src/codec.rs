//! Public key encodings.
//!
//! Public keys travel as X.509 `SubjectPublicKeyInfo` DER. The text form is
//! the standard 64-symbol alphabet without padding, which survives stores that
//! mangle `=`. Decoding is lenient about padding and ASCII whitespace so keys
//! exported by line-wrapping platform encoders still import.
//!
//! Private keys have no encoding here: they never leave the key store.

use crate::common::utils::{fingerprint, strip_ascii_whitespace};
use crate::error::{Error, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use rsa::RsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 解码时同时接受有填充和无填充的输入
pub(crate) const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A public key held as its canonical SPKI DER encoding.
///
/// Equality is byte equality of the encoding.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyMaterial {
    #[serde(with = "serde_bytes")]
    der: Vec<u8>,
}

impl PublicKeyMaterial {
    pub fn from_rsa(key: &RsaPublicKey) -> Result<Self> {
        let der = key
            .to_public_key_der()
            .map_err(|e| Error::InvalidKeySpec(format!("cannot encode RSA public key: {}", e)))?;
        Ok(Self {
            der: der.as_bytes().to_vec(),
        })
    }

    /// Parses SPKI DER bytes; anything that is not an RSA public key is
    /// `InvalidKeySpec`.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| Error::InvalidKeySpec(e.to_string()))?;
        Self::from_rsa(&key)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_rsa(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(&self.der)
            .map_err(|e| Error::InvalidKeySpec(e.to_string()))
    }

    /// Modulus size in bits, or 0 if the encoding no longer parses.
    pub fn key_size_bits(&self) -> usize {
        self.to_rsa().map(|k| k.size() * 8).unwrap_or(0)
    }

    /// SHA-256 of the DER encoding, base64url without padding.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.der)
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Converts public keys to and from their portable encodings.
pub struct KeyCodec;

impl KeyCodec {
    /// Standard SPKI DER encoding; deterministic for a given key.
    pub fn encode_public_key(key: &PublicKeyMaterial) -> Vec<u8> {
        key.der.clone()
    }

    /// Unpadded base64 of [`KeyCodec::encode_public_key`].
    pub fn encode_public_key_as_text(key: &PublicKeyMaterial) -> String {
        STANDARD_NO_PAD.encode(&key.der)
    }

    /// Inverse of [`KeyCodec::encode_public_key_as_text`].
    ///
    /// Invalid base64 framing is `MalformedKeyEncoding`; well-framed bytes that
    /// are not an RSA `SubjectPublicKeyInfo` are `InvalidKeySpec`.
    pub fn decode_public_key_from_text(text: &str) -> Result<PublicKeyMaterial> {
        let compact = strip_ascii_whitespace(text);
        if compact.is_empty() {
            return Err(Error::MalformedKeyEncoding("encoded key is empty".to_string()));
        }
        let der = LENIENT_STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| Error::MalformedKeyEncoding(e.to_string()))?;
        PublicKeyMaterial::from_der(&der)
    }

    /// PEM (`-----BEGIN PUBLIC KEY-----`) form of the key.
    pub fn encode_public_key_as_pem(key: &PublicKeyMaterial) -> Result<String> {
        key.to_rsa()?
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::InvalidKeySpec(format!("cannot export PEM: {}", e)))
    }

    pub fn decode_public_key_from_pem(pem: &str) -> Result<PublicKeyMaterial> {
        let key = RsaPublicKey::from_public_key_pem(pem.trim())
            .map_err(|e| Error::MalformedKeyEncoding(e.to_string()))?;
        PublicKeyMaterial::from_rsa(&key)
    }
}
