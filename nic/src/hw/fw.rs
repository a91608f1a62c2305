//! Firmware queue and identifier-release commands.
//!
//! Queue context allocation/free is parameterized by queue role; the
//! command wire format stays behind the trait.

use crate::coalesce::HoldoffParams;

/// Role a hardware queue context is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    /// Ethernet data queues.
    Ethernet,
    /// Per-port control transmit queues.
    Control,
    /// Offload (e.g. iSCSI) queues.
    Offload,
    /// RDMA queues.
    Rdma,
    /// The firmware event queue.
    FwEvent,
}

/// Where a response queue's interrupts are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrDest {
    /// Direct delivery on an MSI-X slot (1-based; slot 0 is non-data).
    Vector(u16),
    /// No own vector; events are forwarded to the queue with this
    /// absolute id (shared-interrupt mode).
    Forwarded(u16),
}

/// Hardware ids assigned to a newly created response queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RspqIds {
    /// Absolute (adapter-wide) queue id.
    pub abs_id: u16,
    /// Firmware context id.
    pub cntxt_id: u16,
    /// Context id of the attached free list, when one was requested.
    pub fl_cntxt_id: Option<u16>,
}

/// Firmware command failures during queue setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwError {
    /// Mailbox timed out.
    Timeout,
    /// Firmware rejected the command, or ran out of contexts.
    Rejected,
}

/// Firmware queue context allocation and release.
///
/// Implementations encode these operations as commands over the device
/// [`Mailbox`](crate::hw::mailbox::Mailbox); a mailbox that never
/// answers surfaces as [`FwError::Timeout`], a device-side refusal as
/// [`FwError::Rejected`].
pub trait FwQueueOps {
    /// Create a response queue (+ optional free list) for `role` on `port`.
    ///
    /// `holdoff` is the interrupt-coalescing state to program at creation.
    fn alloc_rspq(
        &self,
        role: QueueRole,
        port: usize,
        intr: IntrDest,
        size: u16,
        fl_size: Option<u16>,
        holdoff: HoldoffParams,
    ) -> Result<RspqIds, FwError>;

    /// Create a transmit queue bound to the firmware event queue's
    /// context (completions are reported there).
    ///
    /// For [`QueueRole::Control`] queues, `cmpl_cntxt_id` carries the
    /// context id of the port's RDMA response queue, or 0 when the
    /// device has none.
    fn alloc_txq(
        &self,
        role: QueueRole,
        port: usize,
        size: u16,
        fwevt_cntxt_id: u16,
        cmpl_cntxt_id: u16,
    ) -> Result<u16, FwError>;

    /// Free a response queue and its free list, if any.
    fn free_rspq(&self, cntxt_id: u16, fl_cntxt_id: Option<u16>);

    /// Free a transmit queue.
    fn free_txq(&self, role: QueueRole, cntxt_id: u16);

    /// Update a live response queue's interrupt packet-count threshold
    /// index.
    fn set_intr_pktcnt(&self, cntxt_id: u16, pktcnt_idx: u8) -> Result<(), FwError>;
}

/// Message-buffer allocation failed in a context that must not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientFailure;

/// Transmission of TID release notifications to firmware.
pub trait TidReleaseSender {
    /// Build and send one release notification for `tid` on offload
    /// channel `chan`.
    ///
    /// # Contract
    /// - MUST NOT block: under memory pressure the message buffer
    ///   allocation fails with [`TransientFailure`] instead
    /// - On `Ok` the notification is queued to hardware exactly once
    fn try_send_tid_release(&self, chan: u8, tid: u32) -> Result<(), TransientFailure>;
}
