//! Kernel Object Table
//!
//! Issues opaque ids for kernel objects and answers liveness queries.
//! Ids are never reused, so a handle that outlives its object can always be
//! told apart from a newer object.

use alloc::collections::BTreeMap;

// ============================================================================
// Kernel Object Types
// ============================================================================

/// Kernel object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum KobjectType {
    /// User-visible POSIX timer
    Timer = 0,
    /// Ephemeral timer backing a sleep
    SleepTimer = 1,
}

/// Number of kernel object types
pub const KOT_MAX_TYPE: usize = 2;

impl KobjectType {
    /// Get type name for debugging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::SleepTimer => "sleep_timer",
        }
    }
}

/// Kernel object id (never zero for a live object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KobjectId(pub u64);

impl KobjectId {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

// ============================================================================
// Kernel Object Table
// ============================================================================

/// Statistics for kobject operations
#[derive(Debug, Default, Clone, Copy)]
pub struct KobjectStats {
    /// Total ids issued
    pub created: u64,
    /// Total ids released
    pub destroyed: u64,
    /// Live objects by type
    pub by_type: [u32; KOT_MAX_TYPE],
}

/// Registry of live kernel objects
#[derive(Debug)]
pub struct KobjectTable {
    objects: BTreeMap<KobjectId, KobjectType>,
    next_id: u64,
    pub stats: KobjectStats,
}

impl KobjectTable {
    pub const fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 1,
            stats: KobjectStats {
                created: 0,
                destroyed: 0,
                by_type: [0; KOT_MAX_TYPE],
            },
        }
    }

    /// Issue a fresh id for a new object
    pub fn alloc_id(&mut self, kotype: KobjectType) -> KobjectId {
        let id = KobjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id, kotype);

        self.stats.created += 1;
        self.stats.by_type[kotype as usize] += 1;
        id
    }

    /// Release an id; returns false if it was not live
    pub fn free_id(&mut self, id: KobjectId) -> bool {
        match self.objects.remove(&id) {
            Some(kotype) => {
                self.stats.destroyed += 1;
                self.stats.by_type[kotype as usize] -= 1;
                true
            }
            None => false,
        }
    }

    /// Is `id` a live object?
    pub fn is_live(&self, id: KobjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Get total number of live objects
    pub fn count(&self) -> usize {
        self.objects.len()
    }

    /// Get count by type
    pub fn count_by_type(&self, kotype: KobjectType) -> u32 {
        self.stats.by_type[kotype as usize]
    }
}

impl Default for KobjectTable {
    fn default() -> Self {
        Self::new()
    }
}
