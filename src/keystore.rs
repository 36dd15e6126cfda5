//! Secure key store abstraction.
//!
//! A [`SecureKeyStore`] owns key pairs indexed by [`KeyPairAlias`]. It hands out
//! [`KeyPairHandle`]s that expose the public half by value and keep the private
//! half behind an opaque [`PrivateKeyRef`] that only this crate can use.
//!
//! Backends:
//! - [`MemoryKeyStore`], process-local.
//! - [`FileKeyStore`], a password-protected directory vault (feature `file-store`).

use crate::codec::PublicKeyMaterial;
use crate::common::{KeyPairAlias, KeyParameters};
use crate::error::{Error, Result};
use crate::systems::rsa::RsaSystem;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "file-store")]
pub mod container;
#[cfg(feature = "file-store")]
pub mod file;
pub mod memory;

#[cfg(feature = "file-store")]
pub use self::file::FileKeyStore;
pub use self::memory::MemoryKeyStore;

/// Shared, non-extractable reference to a private key.
///
/// The key is only reachable from inside the crate; the RSA private key
/// zeroizes itself when the last reference drops.
#[derive(Clone)]
pub struct PrivateKeyRef(Arc<RsaPrivateKey>);

impl fmt::Debug for PrivateKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyRef(<redacted>)")
    }
}

/// A key pair resolved from a store.
#[derive(Clone, Debug)]
pub struct KeyPairHandle {
    alias: KeyPairAlias,
    parameters: KeyParameters,
    public_key: PublicKeyMaterial,
    private_key: PrivateKeyRef,
}

impl KeyPairHandle {
    /// Wraps a private key taken over by a store. The public half is derived
    /// from it.
    pub fn new(
        alias: KeyPairAlias,
        parameters: KeyParameters,
        private_key: RsaPrivateKey,
    ) -> Result<Self> {
        let public_key = PublicKeyMaterial::from_rsa(&RsaPublicKey::from(&private_key))?;
        Ok(Self {
            alias,
            parameters,
            public_key,
            private_key: PrivateKeyRef(Arc::new(private_key)),
        })
    }

    pub fn alias(&self) -> &KeyPairAlias {
        &self.alias
    }

    pub fn parameters(&self) -> &KeyParameters {
        &self.parameters
    }

    pub fn public_key(&self) -> &PublicKeyMaterial {
        &self.public_key
    }

    /// Drops the private reference and keeps only the public half.
    pub fn into_public(self) -> (PublicKeyMaterial, KeyParameters) {
        (self.public_key, self.parameters)
    }

    pub(crate) fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        RsaSystem::decrypt(&self.private_key.0, self.parameters.padding, ciphertext)
    }
}

/// Lazy iterator over the aliases of a store.
///
/// Reflects the store at the time of iteration; it is not restartable and
/// makes no promise about entries added or removed while it runs.
pub struct Aliases<'a> {
    inner: Box<dyn Iterator<Item = Result<KeyPairAlias>> + Send + 'a>,
}

impl<'a> Aliases<'a> {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<KeyPairAlias>> + Send + 'a,
    {
        Self {
            inner: Box::new(iter),
        }
    }
}

impl Iterator for Aliases<'_> {
    type Item = Result<KeyPairAlias>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Contract over a secure key store.
///
/// Pinned policies shared by every backend:
/// - generating under an alias that already exists returns the stored pair
///   unchanged, whatever parameters are passed;
/// - deleting an absent alias fails with `AliasNotFound`;
/// - any operation before [`SecureKeyStore::open`] fails with `StoreUnavailable`.
pub trait SecureKeyStore: Send + Sync {
    /// Establishes the session with the backing store. Idempotent.
    fn open(&self) -> Result<()>;

    fn generate_key_pair(
        &self,
        alias: &KeyPairAlias,
        params: &KeyParameters,
    ) -> Result<KeyPairHandle>;

    fn get_key_pair(&self, alias: &KeyPairAlias) -> Result<KeyPairHandle>;

    fn delete_key_pair(&self, alias: &KeyPairAlias) -> Result<()>;

    fn aliases(&self) -> Result<Aliases<'_>>;

    fn contains(&self, alias: &KeyPairAlias) -> Result<bool> {
        match self.get_key_pair(alias) {
            Ok(_) => Ok(true),
            Err(Error::AliasNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
