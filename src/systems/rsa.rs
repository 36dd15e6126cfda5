//! `RsaSystem` 提供基于 RSA 的密钥生成与单块加解密。
//! 支持 PKCS#1 v1.5 与 OAEP(SHA-256) 两种填充，由密钥对生成时的参数决定。

use crate::common::config::{EncryptionPadding, KeyParameters};
use crate::common::utils::ZeroizingVec;
use crate::error::{Error, Result};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::rand_core::OsRng as RsaOsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// RSA加密系统实现
pub struct RsaSystem;

impl RsaSystem {
    /// 按参数生成私钥（参数需事先校验）
    pub fn generate_private_key(params: &KeyParameters) -> Result<RsaPrivateKey> {
        params.validate()?;
        let mut rng = RsaOsRng;
        RsaPrivateKey::new(&mut rng, params.key_size_bits)
            .map_err(|e| Error::Cryptography(format!("RSA key generation failed: {}", e)))
    }

    /// 使用公钥加密单个数据块
    pub fn encrypt(
        public_key: &RsaPublicKey,
        padding: EncryptionPadding,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let max = public_key.size().saturating_sub(padding.overhead_bytes());
        if plaintext.len() > max {
            return Err(Error::KeySizeExceeded {
                max,
                actual: plaintext.len(),
            });
        }

        let mut rng = RsaOsRng;
        let result = match padding {
            EncryptionPadding::RsaPkcs1 => public_key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext),
            EncryptionPadding::RsaOaepSha256 => {
                public_key.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            }
        };
        result.map_err(|e| match e {
            rsa::Error::MessageTooLong => Error::KeySizeExceeded {
                max,
                actual: plaintext.len(),
            },
            other => Error::Cryptography(format!("RSA encryption failed: {}", other)),
        })
    }

    /// 使用私钥解密单个数据块。
    ///
    /// 所有失败（长度、填充、模数范围）都统一为 `DecryptionFailed`。
    pub fn decrypt(
        private_key: &RsaPrivateKey,
        padding: EncryptionPadding,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() != private_key.size() {
            return Err(Error::DecryptionFailed);
        }
        let result = match padding {
            EncryptionPadding::RsaPkcs1 => private_key.decrypt(Pkcs1v15Encrypt, ciphertext),
            EncryptionPadding::RsaOaepSha256 => {
                private_key.decrypt(Oaep::new::<Sha256>(), ciphertext)
            }
        };
        result.map_err(|_| Error::DecryptionFailed)
    }

    /// 将私钥导出为 PKCS#8 DER（仅供密钥库内部封装使用）
    pub(crate) fn export_private_key(private_key: &RsaPrivateKey) -> Result<ZeroizingVec> {
        let der = private_key
            .to_pkcs8_der()
            .map_err(|e| Error::Cryptography(format!("cannot encode RSA private key: {}", e)))?;
        Ok(ZeroizingVec(der.as_bytes().to_vec()))
    }

    pub(crate) fn import_private_key(der: &[u8]) -> Result<RsaPrivateKey> {
        RsaPrivateKey::from_pkcs8_der(der).map_err(|e| Error::InvalidKeySpec(e.to_string()))
    }
}
