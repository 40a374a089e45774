//! Error types for the object-graph engine.

use strata_registry::RegistryError;
use strata_store::StoreError;
use strata_types::{ClassId, InstanceId, TypeError};

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Class registration failed. Treated as fatal at startup.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A record names a class with no resolvable factory.
    #[error("unknown class {class_id} in record {key}")]
    UnknownClass {
        /// Class id read from the record.
        class_id: ClassId,
        /// Store key of the record.
        key: String,
    },

    /// A loaded object lacks the capability the receiving handle declares.
    #[error("object {id} of class {found} does not provide {expected}")]
    TypeMismatch {
        /// Identity of the loaded object.
        id: InstanceId,
        /// Capability the handle was declared with.
        expected: &'static str,
        /// Class name of the loaded object.
        found: &'static str,
    },

    /// The object is mutably borrowed and cannot be visited.
    #[error("object {0} is borrowed elsewhere")]
    Busy(InstanceId),

    /// Serialization was requested on a context without a store facility.
    #[error("context has no store facility")]
    NoStoreFacility,

    /// Deserialization had to load a record but the context has no load facility.
    #[error("context has no load facility")]
    NoLoadFacility,

    /// Primitive encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] TypeError),

    /// The store or load facility failed. Carried through unmodified.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
