//! 通用模块，包含别名、配置参数与工具函数

pub mod alias;
pub mod config;
pub mod utils;

pub use self::alias::KeyPairAlias;
pub use self::config::{
    Digest, EncryptionPadding, KdfConfig, KeyAlgorithm, KeyParameters, KeyPurposes, VaultConfig,
};
pub use self::utils::ZeroizingVec;
