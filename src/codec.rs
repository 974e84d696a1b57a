//! Byte encoding for everything the engine keeps in a [`KeyValueStore`].
//!
//! Values are opaque to the store. We use JSON so that a stored record can
//! be inspected with `sqlite3` when debugging a catalog load; lists keep
//! their order.
//!
//! [`KeyValueStore`]: crate::store::KeyValueStore

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::StoreError;

/// Encode a value for storage.
pub fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(StoreError::Codec)
}

/// Decode a stored value.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::Codec)
}
