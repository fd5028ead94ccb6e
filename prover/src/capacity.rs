//! Admission control over how many blocks this prover works on at once.
//!
//! Capacity is modelled as a list of slots. A slot owned by block `0` is a
//! speculative reservation taken while bidding for work over the assignment
//! endpoint; it always expires. A slot owned by a nonzero block id is a
//! commitment to prove that block and only goes away on explicit release.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Owner id marking a reservation that is not bound to a block yet.
pub const RESERVATION_OWNER: u64 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapacitySlot {
    pub owner_block_id: u64,
    pub expires_at: Option<Instant>,
}

impl CapacitySlot {
    fn reservation(expires_at: Instant) -> Self {
        Self {
            owner_block_id: RESERVATION_OWNER,
            expires_at: Some(expires_at),
        }
    }

    fn committed(block_id: u64) -> Self {
        Self {
            owner_block_id: block_id,
            expires_at: None,
        }
    }

    pub fn is_reservation(&self) -> bool {
        self.owner_block_id == RESERVATION_OWNER
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// Slot bookkeeping, without any locking. Slots are kept sorted by ascending
/// expiry with committed slots last, so the first slot is always the
/// reservation closest to expiring.
#[derive(Debug)]
pub struct SlotsManager {
    slots: Vec<CapacitySlot>,
    max_slots: u64,
}

impl SlotsManager {
    pub fn new(max_slots: u64) -> Self {
        Self {
            slots: Vec::with_capacity(max_slots as usize),
            max_slots,
        }
    }

    pub fn max_slots(&self) -> u64 {
        self.max_slots
    }

    /// Number of slots still free, counting expired reservations as free.
    pub fn read_slots(&self, now: Instant) -> u64 {
        let live = self.slots.iter().filter(|s| !s.is_expired(now)).count() as u64;
        self.max_slots.saturating_sub(live)
    }

    fn remaining(&self) -> u64 {
        self.max_slots.saturating_sub(self.slots.len() as u64)
    }

    fn is_full(&self) -> bool {
        self.slots.len() as u64 >= self.max_slots
    }

    fn sort(&mut self) {
        // `None` (never expires) must sort after every reservation.
        self.slots.sort_by(|a, b| match (a.expires_at, b.expires_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    fn first_reservation(&self) -> Option<usize> {
        self.slots.iter().position(CapacitySlot::is_reservation)
    }

    /// Drops the soonest-to-expire reservation if, and only if, it already
    /// expired. At most one slot is reclaimed per call.
    fn reclaim_one_expired(&mut self, now: Instant) -> bool {
        match self.slots.first() {
            Some(slot) if slot.is_reservation() && slot.is_expired(now) => {
                self.slots.remove(0);
                true
            }
            _ => false,
        }
    }

    /// Commits a slot to `block_id`, converting the soonest-to-expire
    /// reservation when one exists.
    fn take_one_slot(&mut self, block_id: u64) -> Option<u64> {
        if let Some(idx) = self.first_reservation() {
            self.slots.remove(idx);
        } else if self.is_full() {
            return None;
        }
        self.slots.push(CapacitySlot::committed(block_id));
        self.sort();
        Some(self.remaining())
    }

    fn release_one_slot(&mut self, block_id: u64) -> Option<u64> {
        let idx = self
            .slots
            .iter()
            .position(|s| !s.is_reservation() && s.owner_block_id == block_id)?;
        self.slots.remove(idx);
        Some(self.remaining())
    }

    fn add_reservation(&mut self, expires_at: Instant) -> Option<u64> {
        if self.is_full() {
            return None;
        }
        self.slots.push(CapacitySlot::reservation(expires_at));
        self.sort();
        Some(self.remaining())
    }

    pub fn slots(&self) -> &[CapacitySlot] {
        &self.slots
    }
}

/// Thread safe capacity arbiter shared by the event handlers, the proving
/// tasks and the assignment endpoint.
#[derive(Debug)]
pub struct CapacityManager {
    inner: RwLock<SlotsManager>,
    temp_capacity_ttl: Duration,
}

impl CapacityManager {
    pub fn new(max_slots: u64, temp_capacity_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(SlotsManager::new(max_slots)),
            temp_capacity_ttl,
        }
    }

    pub fn max_capacity(&self) -> u64 {
        self.inner.read().max_slots()
    }

    /// Returns how many more blocks this prover could take on right now.
    pub fn read_capacity(&self) -> u64 {
        let remaining = self.inner.read().read_slots(Instant::now());
        debug!(remaining, "Reading capacity");
        remaining
    }

    /// Commits one slot to `block_id`. Returns the remaining capacity and
    /// whether the slot was taken.
    pub fn take_one_capacity(&self, block_id: u64) -> (u64, bool) {
        if block_id == RESERVATION_OWNER {
            warn!("Refusing to commit capacity to block 0");
            return (self.read_capacity(), false);
        }

        let mut slots = self.inner.write();
        match slots.take_one_slot(block_id) {
            Some(remaining) => {
                info!(block_id, remaining, "Took one capacity");
                (remaining, true)
            }
            None => {
                warn!(block_id, max = slots.max_slots(), "Could not take one capacity");
                (0, false)
            }
        }
    }

    /// Releases the slot committed to `block_id`. Returns `false` when no slot
    /// is committed to it, e.g. on a double release.
    pub fn release_one_capacity(&self, block_id: u64) -> (u64, bool) {
        let mut slots = self.inner.write();
        match slots.release_one_slot(block_id) {
            Some(remaining) => {
                info!(block_id, remaining, "Released one capacity");
                (remaining, true)
            }
            None => {
                warn!(block_id, "No capacity committed to block, nothing to release");
                (slots.remaining(), false)
            }
        }
    }

    /// Takes a short lived reservation while bidding for a block that is not
    /// proposed yet. Reclaims a single expired reservation first.
    pub fn take_one_temp_capacity(&self) -> (u64, bool) {
        let now = Instant::now();
        let mut slots = self.inner.write();

        if slots.reclaim_one_expired(now) {
            debug!("Reclaimed one expired temporary capacity");
        }

        match slots.add_reservation(now + self.temp_capacity_ttl) {
            Some(remaining) => {
                info!(remaining, "Took one temporary capacity");
                (remaining, true)
            }
            None => {
                warn!("Could not take one temporary capacity");
                (0, false)
            }
        }
    }

    /// Snapshot of the current slots, soonest expiry first.
    pub fn slots(&self) -> Vec<CapacitySlot> {
        self.inner.read().slots().to_vec()
    }
}
