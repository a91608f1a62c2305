//! Interrupt-vector budget negotiation.
//!
//! Probes the platform for MSI-X vectors, retrying at the reported
//! ceiling while it still covers the minimum budget, and falls back to
//! MSI and then legacy INTx. A reduced grant rebalances the Ethernet
//! queue-set plan; Ethernet keeps priority for leftover vectors.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info};

use crate::hw::platform::{IrqPlatform, MsixError};
use crate::plan::QueuePlan;

/// MSI-X vectors reserved ahead of the data queues: slot 0 for non-data
/// interrupts, slot 1 for the firmware event queue.
pub const EXTRA_VECS: u16 = 2;

/// Interrupt delivery mode the device ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqMode {
    /// One vector per queue.
    Msix,
    /// Single MSI vector shared by all queues.
    Msi,
    /// Legacy line interrupt shared by all queues.
    Intx,
}

/// A granted MSI-X vector and its diagnostic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsixVector {
    /// Platform vector id.
    pub vec: u32,
    /// Role-and-index name, e.g. `"eth0-Rx3"`.
    pub desc: String,
}

/// Outcome of vector negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrqState {
    /// Delivery mode.
    pub mode: IrqMode,
    /// Granted vectors in slot order; a single shared entry outside
    /// MSI-X mode.
    pub vectors: Vec<MsixVector>,
}

impl IrqState {
    /// Whether every queue multiplexes onto one interrupt source.
    pub fn is_shared(&self) -> bool {
        self.mode != IrqMode::Msix
    }
}

/// Negotiate the vector budget and fit `plan` to the grant.
///
/// Wants one vector per planned queue plus [`EXTRA_VECS`]; needs at
/// least one per port plus overhead (doubled per channel when offload is
/// enabled, one slot for each possible upper-layer driver). When MSI-X
/// cannot cover the need, the plan is collapsed to one queue-set per
/// port and a single shared vector (MSI, or INTx as the last resort).
pub fn negotiate<P: IrqPlatform>(
    platform: &P,
    plan: &mut QueuePlan,
    dev_name: &str,
    port_names: &[&str],
) -> IrqState {
    let nchan = plan.nports() as u16;
    let ofld_need = if plan.is_offload() { 2 * nchan } else { 0 };

    let mut want = plan.max_eth_qsets + EXTRA_VECS;
    if plan.is_offload() {
        want += plan.rdma_qs + plan.ofld_qsets;
    }
    let need = nchan + EXTRA_VECS + ofld_need;

    let granted = loop {
        match platform.enable_msix(want as usize) {
            Ok(vecs) => break Some(vecs),
            Err(MsixError::Shortfall(ceiling)) if ceiling >= need as usize => {
                // The platform reported a lower ceiling that still covers
                // the minimum; retry there.
                want = ceiling as u16;
            }
            Err(MsixError::Shortfall(ceiling)) => {
                info!("only {} MSI-X vectors left, not using MSI-X", ceiling);
                break None;
            }
            Err(MsixError::Unavailable) => break None,
        }
    };

    if let Some(vecs) = granted {
        // Distribute available vectors to the queue groups. Every group
        // gets its minimum requirement and NIC gets top priority for
        // leftovers.
        let i = want - EXTRA_VECS - ofld_need;
        if i < plan.max_eth_qsets {
            plan.max_eth_qsets = i;
            if i < plan.eth_qsets {
                plan.rebalance(i);
            }
        }
        if plan.is_offload() {
            let mut i = want - EXTRA_VECS - plan.max_eth_qsets;
            i -= ofld_need - nchan;
            plan.ofld_qsets = (i / nchan) * nchan; // round down
        }
        debug!(
            "msi-x: {} vectors, eth {} ofld {} rdma {}",
            want, plan.eth_qsets, plan.ofld_qsets, plan.rdma_qs
        );
        return IrqState { mode: IrqMode::Msix, vectors: name_vectors(dev_name, port_names, plan, &vecs) };
    }

    // Single shared interrupt source: every queue polls through one
    // vector, so the plan collapses to one queue-set per port.
    plan.rebalance(1);
    plan.max_eth_qsets = plan.eth_qsets;

    let (mode, vec) = match platform.enable_msi() {
        Ok(vec) => (IrqMode::Msi, vec),
        Err(_) => (IrqMode::Intx, platform.legacy_vector()),
    };
    debug!("falling back to {:?}", mode);
    IrqState {
        mode,
        vectors: alloc::vec![MsixVector { vec, desc: String::from(dev_name) }],
    }
}

/// Synthesize a diagnostic name per vector, by role and index.
fn name_vectors(
    dev_name: &str,
    port_names: &[&str],
    plan: &QueuePlan,
    vecs: &[u32],
) -> Vec<MsixVector> {
    let mut out = Vec::with_capacity(vecs.len());
    let mut push = |desc: String| {
        let vec = vecs[out.len()];
        out.push(MsixVector { vec, desc });
    };

    push(String::from(dev_name));
    push(format!("{}-FWeventq", dev_name));
    for (i, port) in plan.ports.iter().enumerate() {
        for j in 0..port.nqsets {
            push(format!("{}-Rx{}", port_names[i], j));
        }
    }
    for i in 0..plan.ofld_qsets {
        push(format!("{}-ofld{}", dev_name, i));
    }
    for i in 0..plan.rdma_qs {
        push(format!("{}-rdma{}", dev_name, i));
    }
    out
}
