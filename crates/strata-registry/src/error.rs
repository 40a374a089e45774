//! Error types for the class registry.

use strata_types::ClassId;

/// Errors raised by registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The class id is already taken, either by the same name registered
    /// twice or by a hash collision between two names.
    #[error(
        "class {name:?} ({class_id}) collides with registered class {existing:?}; \
         choose another class name"
    )]
    DuplicateClass {
        /// The colliding id.
        class_id: ClassId,
        /// Name of the class that already owns the id.
        existing: String,
        /// Name of the class being registered.
        name: String,
    },
}

/// Convenience alias for registry results.
pub type RegistryResult<T> = Result<T, RegistryError>;
