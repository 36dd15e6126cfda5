//! Password-derived wrapping key and the sealed container used by the file store.
// 中文: 口令派生的封装密钥，以及文件存储所使用的加密容器。

use crate::common::config::KdfConfig;
use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand_core::{OsRng, TryRngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const WRAPPING_KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;

/// The AES-256 key that seals private keys at rest.
pub type WrappingKey = Zeroizing<[u8; WRAPPING_KEY_SIZE]>;

/// Derives the wrapping key from the vault password with Argon2id.
///
/// 中文: 使用 Argon2id 从保险库口令派生封装密钥。
pub fn derive_wrapping_key(
    password: &SecretString,
    salt: &[u8],
    kdf: &KdfConfig,
) -> Result<WrappingKey> {
    let params = Params::new(
        kdf.memory_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(WRAPPING_KEY_SIZE),
    )
    .map_err(|e| Error::Configuration(format!("invalid Argon2 parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; WRAPPING_KEY_SIZE]);
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key[..])
        .map_err(|e| Error::Cryptography(format!("password derivation failed: {}", e)))?;
    Ok(key)
}

/// Fills a fresh random buffer from the operating system.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Cryptography(format!("system RNG failure: {}", e)))?;
    Ok(bytes)
}

/// AES-256-GCM sealed bytes, bound to associated data.
///
/// Both fields are standard base64 so the container embeds cleanly in JSON.
///
/// 中文: 以 AES-256-GCM 封装的数据，绑定关联数据（AAD）。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SealedBox {
    nonce: String,
    ciphertext: String,
}

impl SealedBox {
    pub fn seal(key: &WrappingKey, plaintext: &[u8], aad: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Cryptography(format!("invalid wrapping key: {}", e)))?;
        let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| Error::Cryptography(format!("sealing failed: {}", e)))?;

        Ok(Self {
            nonce: STANDARD.encode(nonce_bytes),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }

    /// Opens the box. Returns `None` when the nonce, tag, key or associated
    /// data does not match; callers decide which error that is.
    pub fn open(&self, key: &WrappingKey, aad: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
        let nonce = STANDARD.decode(&self.nonce).ok()?;
        if nonce.len() != NONCE_SIZE {
            return None;
        }
        let ciphertext = STANDARD.decode(&self.ciphertext).ok()?;
        let cipher = Aes256Gcm::new_from_slice(&key[..]).ok()?;
        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad,
                },
            )
            .ok()
            .map(Zeroizing::new)
    }
}
