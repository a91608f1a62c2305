//! Queue context types.

use crate::coalesce::HoldoffParams;

/// Free lists are considered starving below this many available buffers.
pub const FL_STARVE_THRES: u16 = 4;

/// Handler role of a response queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RspqRole {
    /// Ethernet receive traffic.
    Ethernet,
    /// Offload (upper-layer driver) traffic.
    Offload,
    /// Firmware event notifications.
    FwEvent,
}

/// A hardware response queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespQueue {
    /// Handler role.
    pub role: RspqRole,
    /// Owning port.
    pub port: usize,
    /// Queue capacity in entries.
    pub size: u16,
    /// Absolute (adapter-wide) hardware id; valid while `live`.
    pub abs_id: u16,
    /// Firmware context id; valid while `live`.
    pub cntxt_id: u16,
    /// Index within the owning port's queue-set range.
    pub idx: u16,
    /// Interrupt-coalescing state.
    pub holdoff: HoldoffParams,
    /// Whether the hardware context exists.
    pub live: bool,
}

impl RespQueue {
    /// A queue with no hardware state yet.
    pub fn new(role: RspqRole, port: usize, size: u16) -> Self {
        Self {
            role,
            port,
            size,
            abs_id: 0,
            cntxt_id: 0,
            idx: 0,
            holdoff: HoldoffParams::default(),
            live: false,
        }
    }
}

/// A receive-buffer free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    /// Ring capacity.
    pub size: u16,
    /// Buffers currently available to hardware.
    pub avail: u16,
    /// Buffer credit not yet pushed to hardware.
    pub pend_cred: u16,
    /// Consumer index.
    pub cidx: u16,
    /// Producer index.
    pub pidx: u16,
    /// Firmware context id.
    pub cntxt_id: u16,
    /// Set when `avail` dropped below [`FL_STARVE_THRES`].
    pub starving: bool,
}

impl FreeList {
    /// An empty free list of the given capacity.
    pub fn new(size: u16) -> Self {
        Self { size, avail: 0, pend_cred: 0, cidx: 0, pidx: 0, cntxt_id: 0, starving: false }
    }

    /// Record the current buffer count, updating the starving flag.
    pub fn set_avail(&mut self, avail: u16) {
        self.avail = avail;
        if avail < FL_STARVE_THRES {
            self.starving = true;
        }
    }
}

/// A transmit descriptor ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxQueue {
    /// Ring capacity.
    pub size: u16,
    /// Descriptors in flight.
    pub in_use: u16,
    /// Consumer index.
    pub cidx: u16,
    /// Producer index.
    pub pidx: u16,
    /// Times the queue was stopped on exhaustion.
    pub stops: u32,
    /// Times the queue was restarted.
    pub restarts: u32,
    /// Firmware context id.
    pub cntxt_id: u16,
    /// Owning port.
    pub port: usize,
}

impl TxQueue {
    /// An idle ring of the given capacity.
    pub fn new(port: usize, size: u16) -> Self {
        Self { size, in_use: 0, cidx: 0, pidx: 0, stops: 0, restarts: 0, cntxt_id: 0, port }
    }
}

/// A receive queue-set: response queue plus its buffer free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxQueue {
    /// The response queue.
    pub rspq: RespQueue,
    /// Its receive-buffer free list.
    pub fl: FreeList,
}
