//!
//! 集成测试的通用辅助函数
//!
#![allow(dead_code)]

use seal_keypair::common::KdfConfig;
use seal_keypair::{KeyVault, VaultConfig};
use std::path::Path;

/// 初始化日志输出（`RUST_LOG=debug cargo test` 可查看）
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 测试用的低成本 Argon2 参数
pub fn fast_kdf() -> KdfConfig {
    KdfConfig {
        memory_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

/// 以 `dir` 为根目录的保险库配置
pub fn config_at(dir: &Path) -> VaultConfig {
    VaultConfig {
        kdf: fast_kdf(),
        ..VaultConfig::rooted_at(dir)
    }
}

pub fn memory_vault() -> KeyVault {
    init_logging();
    KeyVault::in_memory().unwrap()
}
