//! Core domain primitives shared by the lockbox broker and its tooling.

pub mod crypto;
pub mod errors;
pub mod master_key;
pub mod overlay;
pub mod store;

pub use crypto::envelope::{EncryptionAlgorithm, Envelope, EnvelopeEngine};
pub use errors::{CryptoError, CryptoResult, KeyError, KeyResult, StoreError, StoreResult};
pub use master_key::{load_or_create, MasterKey};
pub use overlay::EncryptedOverlay;
pub use store::{file::FileStore, memory::MemoryStore, Store};
