//! Module: registry
//!
//! Purpose: Owns every attached caliper and maps identities to instances.
//!
//! Architecture:
//! - Fixed slot array behind an `IsrLock` (no allocation under the lock)
//! - Identities carry a slot index and a generation, so a handle that
//!   outlived its instance is rejected instead of hitting a newer one
//! - Insertion is two-phase: `reserve` a slot, build the instance outside
//!   the lock, then `fill` it
//! - Instances are `Arc`s; removal hands the last reference back to the
//!   caller so deallocation never happens inside the critical section
//!
//! Safety: Safe. Locking through `IsrLock`.

use alloc::sync::Arc;

use crate::caliper::Caliper;
use crate::error::CaliperError;
use crate::lock::IsrLock;

/// Opaque handle to an attached caliper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CaliperId(u32);

impl CaliperId {
    pub const fn from_parts(index: u16, generation: u16) -> Self {
        Self(((generation as u32) << 16) | index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }

    #[inline]
    pub const fn generation(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for CaliperId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}.{}", self.index(), self.generation())
    }
}

enum Slot {
    Vacant { generation: u16 },
    Reserved { generation: u16 },
    Occupied(Arc<Caliper>),
}

/// Registry of attached calipers.
pub struct Registry<const N: usize> {
    slots: IsrLock<[Slot; N]>,
}

impl<const N: usize> Registry<N> {
    pub fn new() -> Self {
        assert!(N <= u16::MAX as usize, "Registry size must fit a u16 index");

        Self {
            slots: IsrLock::new(core::array::from_fn(|_| Slot::Vacant { generation: 0 })),
        }
    }

    /// Claim a free slot and return the identity its instance will carry.
    pub fn reserve(&self) -> Result<CaliperId, CaliperError> {
        self.slots.lock(|slots| {
            for (index, slot) in slots.iter_mut().enumerate() {
                if let Slot::Vacant { generation } = *slot {
                    // Generation 0 is never issued
                    let generation = generation.wrapping_add(1).max(1);
                    *slot = Slot::Reserved { generation };
                    return Ok(CaliperId::from_parts(index as u16, generation));
                }
            }
            Err(CaliperError::AllocationFailure)
        })
    }

    /// Publish an instance into the slot reserved for its identity.
    pub fn fill(&self, caliper: Arc<Caliper>) -> Result<(), CaliperError> {
        let id = caliper.id();
        // The instance comes back on error and is dropped after the lock
        let rejected = self.slots.lock(|slots| match slots.get_mut(id.index()) {
            Some(slot) if is_reserved(slot, id) => {
                *slot = Slot::Occupied(caliper);
                None
            }
            _ => Some(caliper),
        });
        match rejected {
            None => Ok(()),
            Some(_) => Err(CaliperError::InvalidHandle),
        }
    }

    /// Give a reserved slot back without publishing anything.
    pub fn cancel(&self, id: CaliperId) {
        self.slots.lock(|slots| {
            if let Some(slot) = slots.get_mut(id.index()) {
                if is_reserved(slot, id) {
                    *slot = Slot::Vacant { generation: id.generation() };
                }
            }
        });
    }

    /// Look up a live instance.
    pub fn get(&self, id: CaliperId) -> Option<Arc<Caliper>> {
        self.slots.lock(|slots| match slots.get(id.index()) {
            Some(Slot::Occupied(caliper)) if caliper.id() == id => Some(Arc::clone(caliper)),
            _ => None,
        })
    }

    /// Detach an instance. The caller drops the returned reference.
    pub fn remove(&self, id: CaliperId) -> Option<Arc<Caliper>> {
        self.slots.lock(|slots| {
            let slot = slots.get_mut(id.index())?;
            if !is_occupied_by(slot, id) {
                return None;
            }
            match core::mem::replace(slot, Slot::Vacant { generation: id.generation() }) {
                Slot::Occupied(caliper) => Some(caliper),
                _ => None,
            }
        })
    }

    /// Detach any one instance (used to empty the registry on shutdown).
    pub fn pop_any(&self) -> Option<Arc<Caliper>> {
        self.slots.lock(|slots| {
            let slot = slots.iter_mut().find(|s| matches!(s, Slot::Occupied(_)))?;
            let generation = slot_generation(slot);
            match core::mem::replace(slot, Slot::Vacant { generation }) {
                Slot::Occupied(caliper) => Some(caliper),
                _ => None,
            }
        })
    }

    /// Visit every live instance under the registry lock.
    ///
    /// `f` runs inside the critical section: same rules as the lock itself.
    #[inline]
    pub fn for_each(&self, mut f: impl FnMut(&Caliper)) {
        self.slots.lock(|slots| {
            for slot in slots.iter() {
                if let Slot::Occupied(caliper) = slot {
                    f(caliper);
                }
            }
        });
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.slots.lock(|slots| slots.iter().filter(|s| matches!(s, Slot::Occupied(_))).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn is_reserved(slot: &Slot, id: CaliperId) -> bool {
    matches!(slot, Slot::Reserved { generation } if *generation == id.generation())
}

fn is_occupied_by(slot: &Slot, id: CaliperId) -> bool {
    matches!(slot, Slot::Occupied(caliper) if caliper.id() == id)
}

fn slot_generation(slot: &Slot) -> u16 {
    match slot {
        Slot::Vacant { generation } | Slot::Reserved { generation } => *generation,
        Slot::Occupied(caliper) => caliper.id().generation(),
    }
}
