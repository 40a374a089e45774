use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Domain tag prepended to every class name before hashing.
const CLASS_DOMAIN: &str = "strata-class-v1";

/// Stable 32-bit identifier of a persistable class.
///
/// A `ClassId` is derived from the class name with a domain-separated BLAKE3
/// hash truncated to 32 bits. The same name always produces the same id, in
/// every process, so ids recorded in stored data stay meaningful across runs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(u32);

impl ClassId {
    /// Name of the root of the polymorphic hierarchy.
    pub const ROOT_NAME: &'static str = "Object";

    /// Derive the class id for a class name.
    pub fn of(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CLASS_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 4];
        prefix.copy_from_slice(&digest.as_bytes()[..4]);
        Self(u32::from_le_bytes(prefix))
    }

    /// The root base identifier, shared by placeholders and the root capability.
    pub fn root() -> Self {
        Self::of(Self::ROOT_NAME)
    }

    /// Wrap a raw id read from the wire.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Hex-encoded representation (8 characters, big-endian).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from the 8-character hex form produced by [`to_hex`](Self::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 4,
                actual: bytes.len(),
            })?;
        Ok(Self(u32::from_be_bytes(arr)))
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.to_hex())
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<u32> for ClassId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ClassId> for u32 {
    fn from(id: ClassId) -> Self {
        id.0
    }
}
