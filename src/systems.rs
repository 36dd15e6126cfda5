//! 算法系统集合
//!
//! 目前仅包含 RSA 实现；密钥库与加解密服务都通过这里完成底层运算。
pub mod rsa;
