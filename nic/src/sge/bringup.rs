//! Queue context allocation and release.
//!
//! Contexts are allocated in a fixed order; any failure frees everything
//! allocated by prior steps before the error is returned, so the device
//! never holds partial queue state.

use log::debug;

use crate::coalesce::{self, HoldoffParams, HoldoffTables};
use crate::error::{NicError, Result, SetupStage};
use crate::hw::fw::{FwQueueOps, IntrDest, QueueRole};
use crate::plan::QueuePlan;
use crate::sge::{FreeList, RespQueue, RspqRole, RxQueue, Sge, TxQueue};

/// Allocate every hardware queue context the plan calls for.
///
/// Order: the shared-interrupt queue (non-MSI-X modes only), the
/// firmware event queue, per-port Ethernet receive then transmit
/// queue-sets, offload receive/transmit queue-sets, RDMA receive queues,
/// and finally per-port control transmit queues (whose completion
/// context is the port's RDMA queue, or 0 when there is none).
///
/// On failure `sge` is left empty and the device holds zero queue
/// resources.
pub fn setup_queues<F: FwQueueOps>(
    fw: &F,
    plan: &QueuePlan,
    shared_intr: bool,
    tables: &HoldoffTables,
    sge: &mut Sge,
) -> Result<()> {
    debug_assert!(sge.is_empty(), "bring-up over live queue state");
    let geo = &plan.geometry;

    macro_rules! step {
        ($res:expr, $stage:expr) => {
            match $res {
                Ok(v) => v,
                Err(_) => {
                    free_queues(fw, sge);
                    return Err(NicError::SetupFailed($stage));
                }
            }
        };
    }

    // MSI-X slot 0 carries non-data interrupts; data queues start at 1.
    let mut msi_idx: u16 = 1;

    if shared_intr {
        let holdoff = default_holdoff(fw, tables, 6, 0);
        let q = step!(
            alloc_rx(fw, QueueRole::FwEvent, RspqRole::FwEvent, 0, geo.intrq, None,
                     IntrDest::Vector(0), holdoff),
            SetupStage::IntrQueue
        );
        sge.intrq = Some(q.rspq);
    }

    let dest = |sge: &Sge, slot: u16| match &sge.intrq {
        Some(intrq) => IntrDest::Forwarded(intrq.abs_id),
        None => IntrDest::Vector(slot),
    };

    let holdoff = default_holdoff(fw, tables, 6, 0);
    let fw_evtq = step!(
        alloc_rx(fw, QueueRole::FwEvent, RspqRole::FwEvent, 0, geo.fwevt_rspq, None,
                 dest(sge, msi_idx), holdoff),
        SetupStage::FwEventQueue
    );
    let fwevt_cntxt_id = fw_evtq.rspq.cntxt_id;
    sge.fw_evtq = Some(fw_evtq.rspq);

    for (port_idx, port) in plan.ports.iter().enumerate() {
        for j in 0..port.nqsets {
            if !shared_intr {
                msi_idx += 1;
            }
            let holdoff = default_holdoff(fw, tables, 0, 0);
            let mut q = step!(
                alloc_rx(fw, QueueRole::Ethernet, RspqRole::Ethernet, port_idx, geo.eth_rspq,
                         Some(geo.eth_fl), dest(sge, msi_idx), holdoff),
                SetupStage::EthRxQueue
            );
            q.rspq.idx = j;
            sge.eth_rxq.push(q);
        }
        for _ in 0..port.nqsets {
            let cntxt_id = step!(
                fw.alloc_txq(QueueRole::Ethernet, port_idx, geo.eth_txq, fwevt_cntxt_id, 0),
                SetupStage::EthTxQueue
            );
            let mut t = TxQueue::new(port_idx, geo.eth_txq);
            t.cntxt_id = cntxt_id;
            sge.eth_txq.push(t);
        }
    }

    // Offload queues are spread evenly across the channels.
    if plan.ofld_qsets > 0 {
        let per_chan = plan.ofld_qsets as usize / plan.nports();
        for i in 0..plan.ofld_qsets as usize {
            let port_idx = i / per_chan;
            if !shared_intr {
                msi_idx += 1;
            }
            let holdoff = default_holdoff(fw, tables, 0, 0);
            let q = step!(
                alloc_rx(fw, QueueRole::Offload, RspqRole::Offload, port_idx, geo.ofld_rspq,
                         Some(geo.ofld_fl), dest(sge, msi_idx), holdoff),
                SetupStage::OfldRxQueue
            );
            sge.ofld_rxq.push(q);

            let cntxt_id = step!(
                fw.alloc_txq(QueueRole::Offload, port_idx, geo.ofld_txq, fwevt_cntxt_id, 0),
                SetupStage::OfldTxQueue
            );
            let mut t = TxQueue::new(port_idx, geo.ofld_txq);
            t.cntxt_id = cntxt_id;
            sge.ofld_txq.push(t);
        }
    }

    for i in 0..plan.rdma_qs as usize {
        if !shared_intr {
            msi_idx += 1;
        }
        let holdoff = default_holdoff(fw, tables, 0, 0);
        let q = step!(
            alloc_rx(fw, QueueRole::Rdma, RspqRole::Offload, i, geo.rdma_rspq,
                     Some(geo.rdma_fl), dest(sge, msi_idx), holdoff),
            SetupStage::RdmaRxQueue
        );
        sge.rdma_rxq.push(q);
    }

    for port_idx in 0..plan.nports() {
        // An absent RDMA queue leaves the completion context at 0, which
        // is exactly the value hardware expects in that case.
        let rdma_cntxt_id = sge.rdma_rxq.get(port_idx).map(|q| q.rspq.cntxt_id).unwrap_or(0);
        let cntxt_id = step!(
            fw.alloc_txq(QueueRole::Control, port_idx, geo.ctrl_txq, fwevt_cntxt_id, rdma_cntxt_id),
            SetupStage::CtrlTxQueue
        );
        let mut t = TxQueue::new(port_idx, geo.ctrl_txq);
        t.cntxt_id = cntxt_id;
        sge.ctrlq.push(t);
    }

    debug!("queue setup complete: {} contexts", sge.resource_count());
    Ok(())
}

/// Free every queue resource, newest class first. Idempotent.
pub fn free_queues<F: FwQueueOps>(fw: &F, sge: &mut Sge) {
    for q in sge.ctrlq.drain(..).rev() {
        fw.free_txq(QueueRole::Control, q.cntxt_id);
    }
    for q in sge.rdma_rxq.drain(..).rev() {
        fw.free_rspq(q.rspq.cntxt_id, Some(q.fl.cntxt_id));
    }
    for q in sge.ofld_txq.drain(..).rev() {
        fw.free_txq(QueueRole::Offload, q.cntxt_id);
    }
    for q in sge.ofld_rxq.drain(..).rev() {
        fw.free_rspq(q.rspq.cntxt_id, Some(q.fl.cntxt_id));
    }
    for q in sge.eth_txq.drain(..).rev() {
        fw.free_txq(QueueRole::Ethernet, q.cntxt_id);
    }
    for q in sge.eth_rxq.drain(..).rev() {
        fw.free_rspq(q.rspq.cntxt_id, Some(q.fl.cntxt_id));
    }
    if let Some(q) = sge.fw_evtq.take() {
        fw.free_rspq(q.cntxt_id, None);
    }
    if let Some(q) = sge.intrq.take() {
        fw.free_rspq(q.cntxt_id, None);
    }
}

/// Quantize default hold-off parameters for a queue about to be created.
fn default_holdoff<F: FwQueueOps>(
    fw: &F,
    tables: &HoldoffTables,
    us: u32,
    cnt: u32,
) -> HoldoffParams {
    let mut q = RespQueue::new(RspqRole::Ethernet, 0, 0);
    // Not live, so this only resolves table indices; no command is sent.
    let _ = coalesce::program(fw, tables, &mut q, us, cnt);
    q.holdoff
}

fn alloc_rx<F: FwQueueOps>(
    fw: &F,
    fw_role: QueueRole,
    role: RspqRole,
    port: usize,
    size: u16,
    fl_size: Option<u16>,
    intr: IntrDest,
    holdoff: HoldoffParams,
) -> core::result::Result<RxQueue, crate::hw::fw::FwError> {
    let ids = fw.alloc_rspq(fw_role, port, intr, size, fl_size, holdoff)?;
    let mut rspq = RespQueue::new(role, port, size);
    rspq.abs_id = ids.abs_id;
    rspq.cntxt_id = ids.cntxt_id;
    rspq.holdoff = holdoff;
    rspq.live = true;
    let mut fl = FreeList::new(fl_size.unwrap_or(0));
    fl.cntxt_id = ids.fl_cntxt_id.unwrap_or(0);
    Ok(RxQueue { rspq, fl })
}
