//! Adapters from a [`RecordStore`] to the engine's store/load facilities.
//!
//! The graph engine consumes storage only through two functions. These
//! helpers build them from any backend:
//!
//! ```
//! use strata_store::{load_facility, store_facility, InMemoryRecordStore, RecordStore};
//!
//! let store = InMemoryRecordStore::new();
//! let mut put = store_facility(&store);
//! put("1", b"record").unwrap();
//!
//! let mut get = load_facility(&store);
//! assert_eq!(get("1").unwrap(), b"record");
//! assert!(get("2").is_err());
//! ```

use crate::error::{StoreError, StoreResult};
use crate::traits::RecordStore;

/// "Store bytes under a key", backed by `store`.
pub fn store_facility<S>(store: &S) -> impl FnMut(&str, &[u8]) -> StoreResult<()> + '_
where
    S: RecordStore + ?Sized,
{
    move |key, bytes| store.put(key, bytes)
}

/// "Load bytes for a key", backed by `store`.
///
/// A missing record is reported as [`StoreError::NotFound`].
pub fn load_facility<S>(store: &S) -> impl FnMut(&str) -> StoreResult<Vec<u8>> + '_
where
    S: RecordStore + ?Sized,
{
    move |key| {
        store
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
