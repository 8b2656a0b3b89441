use crate::crypto::envelope::{EncryptionAlgorithm, Envelope, EnvelopeEngine};
use crate::errors::{CryptoError, KeyResult, StoreError, StoreResult};
use crate::master_key::{self, MasterKey};
use crate::store::Store;
use std::path::Path;

/// Store decorator that envelope-encrypts every value.
///
/// Implements the same contract as the store it wraps; the wrapped store only
/// ever observes serialized envelopes, never plaintext. Keys and listings
/// pass through untouched.
pub struct EncryptedOverlay<S> {
    inner: S,
    engine: EnvelopeEngine,
    key: MasterKey,
}

impl<S: Store> EncryptedOverlay<S> {
    /// Wrap `inner` with an already-loaded master key.
    pub fn new(inner: S, key: MasterKey, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            inner,
            engine: EnvelopeEngine::new(algorithm),
            key,
        }
    }

    /// Wrap `inner`, loading or generating the master key at `key_path`.
    pub fn open_at(
        inner: S,
        key_path: &Path,
        algorithm: EncryptionAlgorithm,
        auto_generate: bool,
    ) -> KeyResult<Self> {
        let key = master_key::load_or_create(key_path, algorithm, auto_generate)?;
        Ok(Self::new(inner, key, algorithm))
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.engine.algorithm()
    }

    pub fn key_id(&self) -> &str {
        self.key.kid()
    }

    /// Borrow the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Crypto failures on stored records surface as integrity errors; the
/// distinction between a bad MAC and bad padding stays out of the store
/// contract.
fn integrity(err: CryptoError) -> StoreError {
    StoreError::Integrity(err.to_string())
}

impl<S: Store> Store for EncryptedOverlay<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.inner.get(key)? {
            None => Ok(None),
            Some(bytes) => {
                let envelope = Envelope::from_bytes(&bytes).map_err(integrity)?;
                let plaintext = self.engine.open(&self.key, &envelope).map_err(integrity)?;
                Ok(Some(plaintext))
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let envelope = self.engine.seal(&self.key, value).map_err(integrity)?;
        let bytes = envelope.to_bytes().map_err(integrity)?;
        self.inner.set(key, &bytes)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list(prefix)
    }
}
