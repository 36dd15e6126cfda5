//! # Seal-Keypair: Alias-Indexed Asymmetric Key Management
//!
//! `seal-keypair` keeps RSA key pairs in a secure key store, addressed by alias,
//! and offers public-key encryption and private-key decryption over them.
//! Private keys never leave the store: callers only ever receive public keys,
//! and decryption resolves the private half internally.
//!
//! ## Core Concepts
//!
//! - **`SecureKeyStore`**: contract over the backing key store. `seal-keypair` ships
//!   an in-memory store and a password-protected on-disk vault (`file-store`).
//! - **`KeyCodec`**: portable encodings (SPKI DER, base64 text, PEM) of public keys.
//! - **`PreferenceStore`**: namespaced key-value storage caching exported public keys.
//! - **`KeyPairLifecycle`**: generate-or-resolve by alias, delete, cache maintenance.
//! - **`CipherService`**: encrypt/decrypt with the key pair of an alias.
//! - **`KeyVault`**: a facade wiring all of the above from a `VaultConfig`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seal_keypair::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let vault = KeyVault::in_memory()?;
//!     let public_key = vault.ensure_default_key_pair("userKeys")?;
//!     println!("generated {}", public_key.fingerprint());
//!
//!     let ciphertext = vault.cipher().encrypt("userKeys", "hello")?;
//!     let plaintext = vault.cipher().decrypt("userKeys", ciphertext.as_str())?;
//!     assert_eq!(plaintext, "hello");
//!
//!     vault.lifecycle().delete_alias("userKeys")?;
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod codec;
pub mod common;
pub mod error;
pub mod keystore;
pub mod lifecycle;
pub mod preferences;
pub mod systems;
pub mod vault;

pub use cipher::{CipherService, CipherText};
pub use codec::{KeyCodec, PublicKeyMaterial};
pub use common::{KeyPairAlias, KeyParameters, VaultConfig};
pub use error::{Error, Result};
pub use keystore::{KeyPairHandle, MemoryKeyStore, SecureKeyStore};
pub use lifecycle::KeyPairLifecycle;
pub use preferences::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
pub use vault::KeyVault;

#[cfg(feature = "file-store")]
pub use keystore::FileKeyStore;

// --- Prelude ---
// The types most callers need.
pub mod prelude {
    pub use crate::cipher::{CipherService, CipherText};
    pub use crate::codec::{KeyCodec, PublicKeyMaterial};
    pub use crate::common::{EncryptionPadding, KdfConfig, KeyPairAlias, KeyParameters, VaultConfig};
    pub use crate::error::{Error, Result};
    pub use crate::keystore::{MemoryKeyStore, SecureKeyStore};
    pub use crate::lifecycle::KeyPairLifecycle;
    pub use crate::preferences::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
    pub use crate::vault::KeyVault;

    #[cfg(feature = "file-store")]
    pub use crate::keystore::FileKeyStore;
}

/// The version of the `seal-keypair` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
