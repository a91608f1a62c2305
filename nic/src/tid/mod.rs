//! Firmware identifier namespaces.
//!
//! The device hands out three flavours of connection identifier:
//!
//! - **TIDs** index established connections. Slots are assigned by the
//!   firmware, so the host side is a plain lookup table.
//! - **ATIDs** name in-flight active opens. They are host-assigned from
//!   a generation-counted arena, so a stale handle from a completed
//!   open can never free someone else's slot.
//! - **STIDs** name listening servers. IPv4 servers take one slot and
//!   IPv6 servers take two adjacent slots; the region bitmap records
//!   the width of every allocation and rejects mismatched frees.
//!
//! Releasing a TID requires telling the firmware. When that message
//! cannot be sent without blocking, the release is parked on the
//! [`reclaim::Reclaimer`] and completed later from process context.

pub mod reclaim;

use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::vec::Vec;
use log::debug;
use spin::Mutex;

use crate::error::{NicError, Result};
use crate::hw::fw::TidReleaseSender;
use crate::hw::platform::{Sleeper, WorkScheduler};
use idpool::{Arena, Handle, RegionBitmap, RegionWidth};

pub use reclaim::{PendingRelease, Reclaimer, MAX_SEND_RETRIES};

/// Opaque per-connection state registered by the upper layer alongside
/// an identifier, returned on lookup and on free.
pub type OwnerToken = u64;

/// Address family of a listening server, which fixes how many STID
/// slots it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

impl AddrFamily {
    fn width(self) -> RegionWidth {
        match self {
            AddrFamily::Ipv4 => RegionWidth::One,
            AddrFamily::Ipv6 => RegionWidth::Two,
        }
    }
}

/// Namespace sizes, read from the firmware at configuration time.
#[derive(Debug, Clone, Copy)]
pub struct TidCounts {
    /// Connection TIDs, starting at 0.
    pub ntids: usize,
    /// Active-open TIDs.
    pub natids: usize,
    /// Server TIDs.
    pub nstids: usize,
    /// First STID value; the bitmap works in zero-based offsets and
    /// this base is applied at the edges.
    pub stid_base: u32,
}

/// Handle for an active-open identifier.
///
/// Carries a generation, so freeing it twice or after reuse fails with
/// [`NicError::BadIdentifier`] instead of corrupting the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atid(Handle);

impl Atid {
    /// Raw identifier value carried in wire messages.
    pub fn value(&self) -> u32 {
        self.0.index()
    }
}

struct StidState {
    map: RegionBitmap,
    /// Owner token per base slot, `None` when unallocated.
    owners: Vec<Option<OwnerToken>>,
}

/// All three identifier namespaces plus the deferred-release worker.
///
/// Every namespace sits behind its own short-held lock; nothing is
/// held across a firmware interaction.
pub struct TidTable {
    counts: TidCounts,
    atids: Mutex<Arena<OwnerToken>>,
    stids: Mutex<StidState>,
    tids: Mutex<Vec<Option<OwnerToken>>>,
    tids_in_use: AtomicUsize,
    reclaim: Reclaimer,
}

impl TidTable {
    pub fn new(counts: TidCounts) -> Self {
        let mut tids = Vec::new();
        tids.resize_with(counts.ntids, || None);
        let mut owners = Vec::new();
        owners.resize_with(counts.nstids, || None);
        Self {
            counts,
            atids: Mutex::new(Arena::new(counts.natids)),
            stids: Mutex::new(StidState { map: RegionBitmap::new(counts.nstids), owners }),
            tids: Mutex::new(tids),
            tids_in_use: AtomicUsize::new(0),
            reclaim: Reclaimer::new(),
        }
    }

    pub fn counts(&self) -> TidCounts {
        self.counts
    }

    // ===================================================================
    // Active-open identifiers
    // ===================================================================

    /// Claim an ATID for a new active open.
    pub fn alloc_atid(&self, owner: OwnerToken) -> Result<Atid> {
        let handle = self.atids.lock().alloc(owner).ok_or(NicError::ResourceExhausted)?;
        Ok(Atid(handle))
    }

    /// Release an ATID, returning the owner token registered at
    /// allocation. Stale or double frees are rejected.
    pub fn free_atid(&self, atid: Atid) -> Result<OwnerToken> {
        Ok(self.atids.lock().free(atid.0)?)
    }

    /// Owner token behind a live ATID, if the handle is current.
    pub fn lookup_atid(&self, atid: Atid) -> Option<OwnerToken> {
        self.atids.lock().get(atid.0).copied()
    }

    pub fn atids_in_use(&self) -> usize {
        self.atids.lock().in_use()
    }

    // ===================================================================
    // Server identifiers
    // ===================================================================

    /// Claim an STID for a listening server. IPv6 servers occupy two
    /// adjacent slots and the returned value names the first.
    pub fn alloc_stid(&self, family: AddrFamily, owner: OwnerToken) -> Result<u32> {
        let mut st = self.stids.lock();
        let base = st.map.alloc(family.width()).ok_or(NicError::ResourceExhausted)?;
        st.owners[base] = Some(owner);
        Ok(self.counts.stid_base + base as u32)
    }

    /// Release an STID. The family must match the allocation; freeing
    /// an IPv6 server as IPv4 (or vice versa) is rejected with the
    /// slots untouched.
    pub fn free_stid(&self, stid: u32, family: AddrFamily) -> Result<OwnerToken> {
        let base = stid
            .checked_sub(self.counts.stid_base)
            .ok_or(NicError::BadIdentifier)? as usize;
        let mut st = self.stids.lock();
        st.map.free(base, family.width())?;
        // free() has validated the slot, so an owner must be present.
        st.owners[base].take().ok_or(NicError::BadIdentifier)
    }

    /// Owner token registered for a live STID.
    pub fn lookup_stid(&self, stid: u32) -> Option<OwnerToken> {
        let base = stid.checked_sub(self.counts.stid_base)? as usize;
        let st = self.stids.lock();
        if !st.map.is_used(base) {
            return None;
        }
        st.owners.get(base).copied().flatten()
    }

    pub fn stids_in_use(&self) -> usize {
        self.stids.lock().map.bits_in_use()
    }

    // ===================================================================
    // Connection identifiers
    // ===================================================================

    /// Record the owner of a firmware-assigned connection TID.
    pub fn insert_tid(&self, tid: u32, owner: OwnerToken) -> Result<()> {
        let mut tids = self.tids.lock();
        let slot = tids.get_mut(tid as usize).ok_or(NicError::BadIdentifier)?;
        if slot.replace(owner).is_none() {
            self.tids_in_use.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Owner token behind a live connection TID.
    pub fn lookup_tid(&self, tid: u32) -> Option<OwnerToken> {
        self.tids.lock().get(tid as usize).copied().flatten()
    }

    /// Drop a connection TID and notify the firmware on `chan`.
    ///
    /// The table slot is cleared immediately. If the release message
    /// cannot be sent right now, the `{tid, chan}` pair is parked for
    /// the reclaim worker, so the notification still goes out exactly
    /// once. Safe to call from atomic context.
    pub fn remove_tid<H>(&self, hal: &H, chan: u8, tid: u32)
    where
        H: TidReleaseSender + WorkScheduler,
    {
        let had_owner = {
            let mut tids = self.tids.lock();
            match tids.get_mut(tid as usize) {
                Some(slot) => slot.take().is_some(),
                None => {
                    debug!("remove of out-of-range tid {}", tid);
                    return;
                }
            }
        };
        if had_owner {
            // Saturating: a remove racing a failed insert must not wrap.
            self.tids_in_use
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
                .ok();
        }
        if hal.try_send_tid_release(chan, tid).is_err() {
            self.reclaim.enqueue(hal, chan, tid);
        }
    }

    /// Park a TID release without attempting the immediate send.
    pub fn queue_tid_release<S: WorkScheduler>(&self, sched: &S, chan: u8, tid: u32) {
        self.reclaim.enqueue(sched, chan, tid);
    }

    /// Run the deferred-release worker. Process context only.
    pub fn process_reclaim<H>(&self, hal: &H) -> usize
    where
        H: TidReleaseSender + Sleeper + WorkScheduler,
    {
        self.reclaim.process(hal)
    }

    /// Stop deferred reclaim and wait for in-flight worker runs to
    /// drain. Part of tear-down; queued-but-unsent releases are
    /// dropped, which is fine because the firmware is reset next.
    pub fn quiesce_reclaim<S: Sleeper>(&self, sleeper: &S) {
        self.reclaim.cancel();
        let mut attempt = 0;
        while self.reclaim.is_active() {
            attempt += 1;
            sleeper.backoff(attempt);
        }
    }

    /// Re-arm deferred reclaim after a quiesce, ahead of the next
    /// bring-up.
    pub fn resume_reclaim(&self) {
        self.reclaim.reset();
    }

    pub fn tids_in_use(&self) -> usize {
        self.tids_in_use.load(Ordering::Acquire)
    }

    pub fn pending_releases(&self) -> usize {
        self.reclaim.pending()
    }
}
