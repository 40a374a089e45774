use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

/// Process-wide source of fresh instance ids. Zero is never handed out.
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of an object instance across process runs.
///
/// An `InstanceId` pairs a 31-bit id with a residency flag. On the wire both
/// are packed into one `u32`: the id occupies the low 31 bits and the flag the
/// top bit. Id `0` means "no identity" and is never assigned to a real object.
///
/// Equality, hashing and ordering consider the id only; two identities that
/// differ only in their residency flag refer to the same instance.
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
pub struct InstanceId {
    id: u32,
    resident: bool,
}

impl InstanceId {
    /// Wire bit carrying the residency flag.
    pub const FLAG_BIT: u32 = 1 << 31;
    /// Mask selecting the id bits of a wire value.
    pub const ID_MASK: u32 = !Self::FLAG_BIT;
    /// The invalid identity (id `0`, unresident).
    pub const INVALID: Self = Self {
        id: 0,
        resident: false,
    };

    /// Create an identity from its parts.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not fit into 31 bits.
    pub fn new(id: u32, resident: bool) -> Self {
        assert!(id & Self::FLAG_BIT == 0, "instance id {id} overflows 31 bits");
        Self { id, resident }
    }

    /// Generate a fresh, process-unique resident identity.
    ///
    /// Ids come from a monotonic counter and are never reused within a
    /// process lifetime.
    pub fn generate() -> Self {
        let id = NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed);
        Self::new(id, true)
    }

    /// Record that `id` is in use, so [`generate`](Self::generate) never
    /// hands it out later in this process.
    pub fn observe(id: u32) {
        let next = (id & Self::ID_MASK).saturating_add(1);
        NEXT_ID.fetch_max(next, AtomicOrdering::Relaxed);
    }

    /// The numeric id (without the flag).
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Replace the numeric id, keeping the residency flag.
    pub fn set_id(&mut self, id: u32) {
        *self = Self::new(id, self.resident);
    }

    /// Whether the identity refers to a resident object.
    pub fn is_resident(&self) -> bool {
        self.resident
    }

    /// Set or clear the residency flag.
    pub fn set_resident(&mut self, resident: bool) {
        self.resident = resident;
    }

    /// The same id with the residency flag set to `resident`.
    pub fn with_resident(self, resident: bool) -> Self {
        Self {
            id: self.id,
            resident,
        }
    }

    /// Returns `true` unless this is the invalid identity.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }

    /// Encode into a single wire integer: `id | (resident << 31)`.
    pub fn to_wire(&self) -> u32 {
        if self.resident {
            self.id | Self::FLAG_BIT
        } else {
            self.id
        }
    }

    /// Decode from a wire integer, splitting the flag back out.
    pub fn from_wire(raw: u32) -> Self {
        Self {
            id: raw & Self::ID_MASK,
            resident: raw & Self::FLAG_BIT != 0,
        }
    }

    /// The store key for this identity: the decimal form of the id.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

impl PartialEq for InstanceId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InstanceId {}

impl Hash for InstanceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for InstanceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstanceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.resident { "" } else { "~" };
        write!(f, "InstanceId({flag}{})", self.id)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
