//! State shared between the event handlers.
//!
//! Only the event handling layer writes here, every other component reads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::proof_types::{L1Header, TierId, TierInfo};

#[derive(Debug, Default)]
pub struct SharedState {
    last_handled_block_id: AtomicU64,
    l1_current: RwLock<Option<L1Header>>,
    reorg_detected: AtomicBool,
    tiers: RwLock<Vec<TierInfo>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_handled_block_id(&self) -> u64 {
        self.last_handled_block_id.load(Ordering::Acquire)
    }

    /// Moves the cursor forward to `block_id`. Never moves it backwards, use
    /// [`Self::reset_last_handled_block_id`] for that.
    pub fn advance_last_handled_block_id(&self, block_id: u64) {
        let previous = self
            .last_handled_block_id
            .fetch_max(block_id, Ordering::AcqRel);
        if block_id > previous {
            debug!(block_id, "Advanced last handled block id");
        }
    }

    /// Rewinds the cursor after a reorg.
    pub fn reset_last_handled_block_id(&self, block_id: u64) {
        info!(block_id, "Resetting last handled block id");
        self.last_handled_block_id.store(block_id, Ordering::Release);
    }

    pub fn l1_current(&self) -> Option<L1Header> {
        self.l1_current.read().clone()
    }

    pub fn set_l1_current(&self, header: L1Header) {
        debug!(height = header.number, hash = %header.hash, "Updating L1 cursor");
        *self.l1_current.write() = Some(header);
    }

    pub fn reorg_detected(&self) -> bool {
        self.reorg_detected.load(Ordering::Acquire)
    }

    pub fn set_reorg_detected(&self, detected: bool) {
        self.reorg_detected.store(detected, Ordering::Release);
    }

    /// Clears the reorg flag, returning whether it was set.
    pub fn take_reorg_detected(&self) -> bool {
        self.reorg_detected.swap(false, Ordering::AcqRel)
    }

    pub fn tiers(&self) -> Vec<TierInfo> {
        self.tiers.read().clone()
    }

    pub fn tier(&self, id: TierId) -> Option<TierInfo> {
        self.tiers.read().iter().find(|t| t.id == id).cloned()
    }

    /// Replaces the tier list, keeping it ordered by ascending id.
    pub fn set_tiers(&self, mut tiers: Vec<TierInfo>) {
        tiers.sort_by_key(|t| t.id);
        *self.tiers.write() = tiers;
    }
}
