//! Hardware queue resource state.
//!
//! Holds every queue context the device owns between a bring-up and a
//! bring-down transition. Nothing in here survives a failed bring-up:
//! [`bringup::setup_queues`] either fills the whole structure or leaves
//! it empty.

pub mod bringup;
pub mod irq;
mod types;

pub use types::{FreeList, RespQueue, RspqRole, RxQueue, TxQueue, FL_STARVE_THRES};

use alloc::vec::Vec;

/// All hardware queue resources of one adapter.
#[derive(Debug, Default)]
pub struct Sge {
    /// Shared-interrupt control/status queue; only in non-MSI-X modes.
    pub intrq: Option<RespQueue>,
    /// Firmware event queue.
    pub fw_evtq: Option<RespQueue>,
    /// Ethernet receive queue-sets, indexed by absolute queue-set number.
    pub eth_rxq: Vec<RxQueue>,
    /// Ethernet transmit queues, parallel to `eth_rxq`.
    pub eth_txq: Vec<TxQueue>,
    /// Offload receive queue-sets.
    pub ofld_rxq: Vec<RxQueue>,
    /// Offload transmit queues, parallel to `ofld_rxq`.
    pub ofld_txq: Vec<TxQueue>,
    /// RDMA receive queues, one per port.
    pub rdma_rxq: Vec<RxQueue>,
    /// Per-port control transmit queues.
    pub ctrlq: Vec<TxQueue>,
}

impl Sge {
    /// Empty state, no hardware resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live hardware queue contexts.
    pub fn resource_count(&self) -> usize {
        self.intrq.iter().count()
            + self.fw_evtq.iter().count()
            + self.eth_rxq.len()
            + self.eth_txq.len()
            + self.ofld_rxq.len()
            + self.ofld_txq.len()
            + self.rdma_rxq.len()
            + self.ctrlq.len()
    }

    /// Whether the device holds no queue resources at all.
    pub fn is_empty(&self) -> bool {
        self.resource_count() == 0
    }
}
