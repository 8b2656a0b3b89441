use crate::errors::StoreResult;

pub mod file;
pub mod memory;

/// Storage contract implemented by backing stores and the encrypted overlay.
///
/// Keys are slash-separated strings and values are opaque byte blobs. A
/// single-process implementation must provide read-your-writes consistency;
/// any further synchronisation is the implementor's concern.
pub trait Store: Send + Sync {
    /// Fetch the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Remove the value stored under `key`.
    ///
    /// Deleting an absent key fails with [`StoreError::NotFound`].
    ///
    /// [`StoreError::NotFound`]: crate::errors::StoreError::NotFound
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Enumerate the keys starting with `prefix`.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

impl<T> Store for Box<T>
where
    T: Store + ?Sized,
{
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).list(prefix)
    }
}

impl<T> Store for std::sync::Arc<T>
where
    T: Store + ?Sized,
{
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        (**self).list(prefix)
    }
}
