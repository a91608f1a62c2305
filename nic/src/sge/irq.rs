//! Interrupt handler binding.
//!
//! One registration per allocated queue, in allocation order. A failed
//! registration unwinds exactly the ones already granted, in reverse,
//! before the error is returned.

use crate::error::{NicError, Result, SetupStage};
use crate::hw::platform::IrqPlatform;
use crate::intr::IrqState;
use crate::sge::Sge;

/// Register an interrupt handler for every vector in slot order.
///
/// Slot 0 is the non-data interrupt, slot 1 the firmware event queue,
/// and the remaining slots follow the queue allocation order (Ethernet,
/// offload, RDMA). In shared modes there is a single registration.
pub fn bind_queue_irqs<P: IrqPlatform>(platform: &P, sge: &Sge, irq: &IrqState) -> Result<()> {
    if !irq.is_shared() {
        let queues = 2 + sge.eth_rxq.len() + sge.ofld_rxq.len() + sge.rdma_rxq.len();
        if irq.vectors.len() != queues {
            // Vector plan out of step with the allocated queues.
            return Err(NicError::VectorShortfall);
        }
    }

    for (k, v) in irq.vectors.iter().enumerate() {
        if platform.request_irq(v.vec, &v.desc).is_err() {
            for undo in irq.vectors[..k].iter().rev() {
                platform.free_irq(undo.vec);
            }
            return Err(NicError::SetupFailed(SetupStage::IrqBind));
        }
    }
    Ok(())
}

/// Release every registration taken by [`bind_queue_irqs`], newest first.
pub fn free_queue_irqs<P: IrqPlatform>(platform: &P, irq: &IrqState) {
    for v in irq.vectors.iter().rev() {
        platform.free_irq(v.vec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coalesce::HoldoffTables;
    use crate::hw::platform::{IrqError, MsixError};
    use crate::intr::{self, IrqMode, MsixVector};
    use crate::plan::QueuePlan;
    use crate::sge::bringup::setup_queues;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    struct FakePlatform {
        fail_at: Option<usize>,
        requests: Cell<usize>,
        bound: RefCell<Vec<u32>>,
        freed: RefCell<Vec<u32>>,
    }

    impl FakePlatform {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                requests: Cell::new(0),
                bound: RefCell::new(Vec::new()),
                freed: RefCell::new(Vec::new()),
            }
        }
    }

    impl IrqPlatform for FakePlatform {
        fn enable_msix(&self, count: usize) -> core::result::Result<Vec<u32>, MsixError> {
            Ok((0..count as u32).collect())
        }

        fn enable_msi(&self) -> core::result::Result<u32, MsixError> {
            Ok(77)
        }

        fn disable_intr(&self) {}

        fn request_irq(&self, vec: u32, _name: &str) -> core::result::Result<(), IrqError> {
            let n = self.requests.get() + 1;
            self.requests.set(n);
            if self.fail_at == Some(n) {
                return Err(IrqError::RequestFailed);
            }
            self.bound.borrow_mut().push(vec);
            Ok(())
        }

        fn free_irq(&self, vec: u32) {
            self.freed.borrow_mut().push(vec);
        }

        fn legacy_vector(&self) -> u32 {
            9
        }
    }

    struct NullFw;

    impl crate::hw::fw::FwQueueOps for NullFw {
        fn alloc_rspq(
            &self,
            _role: crate::hw::fw::QueueRole,
            _port: usize,
            _intr: crate::hw::fw::IntrDest,
            _size: u16,
            fl_size: Option<u16>,
            _holdoff: crate::coalesce::HoldoffParams,
        ) -> core::result::Result<crate::hw::fw::RspqIds, crate::hw::fw::FwError> {
            Ok(crate::hw::fw::RspqIds { abs_id: 0, cntxt_id: 0, fl_cntxt_id: fl_size.map(|_| 0) })
        }

        fn alloc_txq(
            &self,
            _role: crate::hw::fw::QueueRole,
            _port: usize,
            _size: u16,
            _fwevt: u16,
            _cmpl: u16,
        ) -> core::result::Result<u16, crate::hw::fw::FwError> {
            Ok(0)
        }

        fn free_rspq(&self, _cntxt_id: u16, _fl: Option<u16>) {}
        fn free_txq(&self, _role: crate::hw::fw::QueueRole, _cntxt_id: u16) {}

        fn set_intr_pktcnt(
            &self,
            _cntxt_id: u16,
            _idx: u8,
        ) -> core::result::Result<(), crate::hw::fw::FwError> {
            Ok(())
        }
    }

    fn msix_fixture(platform: &FakePlatform) -> (Sge, IrqState) {
        let mut plan = QueuePlan::compute(&[true, false], 2, 8, false);
        let irq = intr::negotiate(platform, &mut plan, "tetra0", &["eth0", "eth1"]);
        assert_eq!(irq.mode, IrqMode::Msix);
        let mut sge = Sge::new();
        setup_queues(&NullFw, &plan, false, &HoldoffTables::default(), &mut sge).unwrap();
        (sge, irq)
    }

    #[test]
    fn test_bind_registers_all_slots() {
        let platform = FakePlatform::new(None);
        let (sge, irq) = msix_fixture(&platform);
        bind_queue_irqs(&platform, &sge, &irq).unwrap();
        // 2 overhead + 3 ethernet queue-sets.
        assert_eq!(platform.bound.borrow().len(), 5);
        free_queue_irqs(&platform, &irq);
        let bound: Vec<u32> = platform.bound.borrow().clone();
        let mut freed = platform.freed.borrow().clone();
        freed.reverse();
        assert_eq!(bound, freed);
    }

    #[test]
    fn test_bind_failure_unwinds_in_reverse() {
        let platform = FakePlatform::new(Some(4));
        let (sge, irq) = msix_fixture(&platform);
        let err = bind_queue_irqs(&platform, &sge, &irq);
        assert_eq!(err, Err(NicError::SetupFailed(SetupStage::IrqBind)));
        // The three granted registrations were released, newest first.
        let bound: Vec<u32> = platform.bound.borrow().clone();
        let mut freed = platform.freed.borrow().clone();
        assert_eq!(bound.len(), 3);
        freed.reverse();
        assert_eq!(bound, freed);
    }

    #[test]
    fn test_shared_mode_single_registration() {
        let platform = FakePlatform::new(None);
        let mut plan = QueuePlan::compute(&[true, false], 2, 8, false);
        let irq = IrqState {
            mode: IrqMode::Intx,
            vectors: alloc::vec![MsixVector { vec: platform.legacy_vector(), desc: String::from("tetra0") }],
        };
        plan.rebalance(1);
        let mut sge = Sge::new();
        setup_queues(&NullFw, &plan, true, &HoldoffTables::default(), &mut sge).unwrap();
        bind_queue_irqs(&platform, &sge, &irq).unwrap();
        assert_eq!(platform.bound.borrow().len(), 1);
    }

    #[test]
    fn test_bind_rejects_short_vector_plan() {
        let platform = FakePlatform::new(None);
        let (sge, mut irq) = msix_fixture(&platform);
        irq.vectors.pop();
        let err = bind_queue_irqs(&platform, &sge, &irq);
        assert_eq!(err, Err(NicError::VectorShortfall));
        assert!(platform.bound.borrow().is_empty());
    }
}
