//! NIC control-plane error types.

use core::fmt;

pub type Result<T> = core::result::Result<T, NicError>;

/// The bring-up step that failed, for [`NicError::SetupFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Shared-interrupt control/status queue.
    IntrQueue,
    /// Firmware event queue.
    FwEventQueue,
    /// Per-port Ethernet receive queue-set.
    EthRxQueue,
    /// Per-port Ethernet transmit queue.
    EthTxQueue,
    /// Offload receive queue-set.
    OfldRxQueue,
    /// Offload transmit queue.
    OfldTxQueue,
    /// RDMA receive queue.
    RdmaRxQueue,
    /// Per-port control transmit queue.
    CtrlTxQueue,
    /// Interrupt handler registration.
    IrqBind,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IntrQueue => "shared interrupt queue",
            Self::FwEventQueue => "firmware event queue",
            Self::EthRxQueue => "ethernet rx queue",
            Self::EthTxQueue => "ethernet tx queue",
            Self::OfldRxQueue => "offload rx queue",
            Self::OfldTxQueue => "offload tx queue",
            Self::RdmaRxQueue => "rdma rx queue",
            Self::CtrlTxQueue => "control tx queue",
            Self::IrqBind => "interrupt binding",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicError {
    /// No free identifier / queue-set capacity / vector available.
    /// Never retried by this layer.
    ResourceExhausted,
    /// A multi-step setup failed; everything already allocated was freed
    /// before this was returned.
    SetupFailed(SetupStage),
    /// Firmware mailbox command timed out.
    MailboxTimeout,
    /// Firmware mailbox command was rejected or failed at the device.
    MailboxError,
    /// The platform could not grant the minimum interrupt-vector budget.
    VectorShortfall,
    /// The device is detached or being torn down.
    Detached,
    /// An identifier was freed twice, with a stale handle, or under the
    /// wrong address family.
    BadIdentifier,
}

impl fmt::Display for NicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted => write!(f, "Resource exhausted"),
            Self::SetupFailed(stage) => write!(f, "Setup failed at {}", stage),
            Self::MailboxTimeout => write!(f, "Mailbox command timed out"),
            Self::MailboxError => write!(f, "Mailbox command failed"),
            Self::VectorShortfall => write!(f, "Interrupt vector budget unavailable"),
            Self::Detached => write!(f, "Device detached"),
            Self::BadIdentifier => write!(f, "Bad identifier"),
        }
    }
}

impl From<idpool::PoolError> for NicError {
    fn from(_: idpool::PoolError) -> Self {
        Self::BadIdentifier
    }
}

impl From<crate::hw::fw::FwError> for NicError {
    fn from(e: crate::hw::fw::FwError) -> Self {
        match e {
            crate::hw::fw::FwError::Timeout => Self::MailboxTimeout,
            crate::hw::fw::FwError::Rejected => Self::MailboxError,
        }
    }
}
