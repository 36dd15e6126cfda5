use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 自动清零的字节向量，用于私钥等敏感数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingVec(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl std::ops::Deref for ZeroizingVec {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for ZeroizingVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 指纹，URL 安全的无填充 Base64
pub fn fingerprint(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(data))
}

/// 去除所有 ASCII 空白字符（平台编码器可能按行折断 Base64 输出）
pub(crate) fn strip_ascii_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(b"public key bytes");
        let b = fingerprint(b"public key bytes");
        let c = fingerprint(b"other bytes");

        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 字节摘要 -> 43 个字符
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_strip_ascii_whitespace() {
        assert_eq!(strip_ascii_whitespace("QUJD\nREVG\r\n R0g= "), "QUJDREVGR0g=");
    }

    #[test]
    fn test_zeroizing_vec_deref() {
        let v = ZeroizingVec(vec![1, 2, 3]);
        assert_eq!(&*v, &[1, 2, 3]);
        assert_eq!(v.as_ref(), &[1, 2, 3]);
    }
}
