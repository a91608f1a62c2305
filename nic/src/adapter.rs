//! Device aggregate and bring-up / tear-down orchestration.
//!
//! An [`Adapter`] owns everything the device holds between attach and
//! detach: the port set, the queue-set plan, the identifier namespaces
//! and all live queue state. `bring_up` and `tear_down` are externally
//! serialized; only one transition runs at a time, and a failed
//! bring-up unwinds synchronously before returning.

use core::ops::Range;

use alloc::string::String;
use alloc::vec::Vec;
use log::info;

use crate::coalesce::{self, HoldoffTables};
use crate::error::{NicError, Result};
use crate::hw::NicHal;
use crate::intr::{self, IrqState};
use crate::mtu::{self, DEFAULT_MTUS, NMTUS};
use crate::plan::QueuePlan;
use crate::sge::{bringup, irq as sge_irq, Sge};
use crate::tid::{TidCounts, TidTable};

/// Static description of one network port.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Interface name, used in vector descriptions.
    pub name: String,
    /// 10G-class link.
    pub is_10g: bool,
    /// Hardware channel the port transmits on.
    pub chan: u8,
    /// Firmware virtual interface id.
    pub viid: u16,
}

/// Attach-time parameters, read from firmware and platform queries.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Device name, used as the vector-name prefix.
    pub name: String,
    /// Online CPUs, the upper bound on queue-sets per 10G port.
    pub cpu_count: usize,
    /// Queue-set capacity reported by firmware.
    pub hw_max_qsets: u16,
    /// Whether offload (upper-layer driver) queues are provisioned.
    pub offload: bool,
    /// Identifier namespace bounds reported by firmware.
    pub tid_counts: TidCounts,
}

/// One NIC: ports, plan, identifier namespaces and live queue state.
pub struct Adapter<H: NicHal> {
    hal: H,
    name: String,
    ports: Vec<PortInfo>,
    plan: QueuePlan,
    tables: HoldoffTables,
    mtus: [u16; NMTUS],
    tids: TidTable,
    sge: Sge,
    irq: Option<IrqState>,
    up: bool,
}

impl<H: NicHal> Adapter<H> {
    /// Build the device aggregate and its initial queue-set plan.
    /// No hardware resources are touched until [`Adapter::bring_up`].
    pub fn new(hal: H, cfg: AdapterConfig, ports: Vec<PortInfo>) -> Self {
        let is_10g: Vec<bool> = ports.iter().map(|p| p.is_10g).collect();
        let plan = QueuePlan::compute(&is_10g, cfg.cpu_count, cfg.hw_max_qsets, cfg.offload);
        Self {
            hal,
            name: cfg.name,
            ports,
            plan,
            tables: HoldoffTables::default(),
            mtus: DEFAULT_MTUS,
            tids: TidTable::new(cfg.tid_counts),
            sge: Sge::new(),
            irq: None,
            up: false,
        }
    }

    /// Allocate every hardware resource and go live.
    ///
    /// Negotiates the interrupt-vector budget (possibly shrinking the
    /// plan), creates all queue contexts in fixed order, binds one
    /// handler per vector and finally unmasks the device. Any failure
    /// unwinds completely; on error the device holds zero queue
    /// resources and zero registrations. A no-op when already up.
    pub fn bring_up(&mut self) -> Result<()> {
        if self.up {
            return Ok(());
        }
        self.tids.resume_reclaim();

        let mut plan = self.plan.clone();
        let irq = {
            let names: Vec<&str> = self.ports.iter().map(|p| p.name.as_str()).collect();
            intr::negotiate(&self.hal, &mut plan, &self.name, &names)
        };
        self.plan = plan;

        if let Err(e) =
            bringup::setup_queues(&self.hal, &self.plan, irq.is_shared(), &self.tables, &mut self.sge)
        {
            self.hal.disable_intr();
            return Err(e);
        }
        if let Err(e) = sge_irq::bind_queue_irqs(&self.hal, &self.sge, &irq) {
            bringup::free_queues(&self.hal, &mut self.sge);
            self.hal.disable_intr();
            return Err(e);
        }
        self.hal.intr_enable();

        info!(
            "{}: up with {} queue contexts in {:?} mode",
            self.name,
            self.sge.resource_count(),
            irq.mode
        );
        self.irq = Some(irq);
        self.up = true;
        Ok(())
    }

    /// Quiesce and release every hardware resource.
    ///
    /// Masks device interrupts, drains the deferred TID reclaimer
    /// (discarding unsent releases), unbinds handlers in reverse order,
    /// frees all queue contexts and returns the vector grant. A no-op
    /// when already down.
    pub fn tear_down(&mut self) {
        if !self.up {
            return;
        }
        self.hal.intr_disable();
        self.tids.quiesce_reclaim(&self.hal);
        if let Some(irq) = self.irq.take() {
            sge_irq::free_queue_irqs(&self.hal, &irq);
        }
        bringup::free_queues(&self.hal, &mut self.sge);
        self.hal.disable_intr();
        self.up = false;
        info!("{}: down", self.name);
    }

    // ===================================================================
    // Introspection
    // ===================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn nports(&self) -> usize {
        self.ports.len()
    }

    pub fn port(&self, idx: usize) -> Option<&PortInfo> {
        self.ports.get(idx)
    }

    /// Hardware channel of a port.
    pub fn port_chan(&self, idx: usize) -> Option<u8> {
        self.ports.get(idx).map(|p| p.chan)
    }

    /// Port currently mapped to a hardware channel.
    pub fn port_for_chan(&self, chan: u8) -> Option<usize> {
        self.ports.iter().position(|p| p.chan == chan)
    }

    /// Ethernet queue-set indices assigned to a port by the current plan.
    pub fn qset_range(&self, port: usize) -> Option<Range<usize>> {
        let p = self.plan.ports.get(port)?;
        let first = p.first_qset as usize;
        Some(first..first + p.nqsets as usize)
    }

    pub fn plan(&self) -> &QueuePlan {
        &self.plan
    }

    pub fn sge(&self) -> &Sge {
        &self.sge
    }

    pub fn tids(&self) -> &TidTable {
        &self.tids
    }

    pub fn irq_state(&self) -> Option<&IrqState> {
        self.irq.as_ref()
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Largest tabulated MTU not exceeding `mtu`, with its table index.
    pub fn best_mtu(&self, mtu: u16) -> (u16, usize) {
        mtu::best_mtu(&self.mtus, mtu)
    }

    // ===================================================================
    // Coalescing, at port granularity
    // ===================================================================

    /// Apply interrupt hold-off settings to a port's first queue-set.
    /// Requires live queues.
    pub fn set_coalesce(&mut self, port: usize, us: u32, cnt: u32) -> Result<()> {
        let range = self.qset_range(port).ok_or(NicError::BadIdentifier)?;
        let q = self.sge.eth_rxq.get_mut(range.start).ok_or(NicError::Detached)?;
        coalesce::program(&self.hal, &self.tables, &mut q.rspq, us, cnt)
    }

    /// Effective hold-off time and packet count of a port's first
    /// queue-set, resolved through the hardware tables.
    pub fn get_coalesce(&self, port: usize) -> Result<(u32, u32)> {
        let range = self.qset_range(port).ok_or(NicError::BadIdentifier)?;
        let q = self.sge.eth_rxq.get(range.start).ok_or(NicError::Detached)?;
        Ok((
            coalesce::holdoff_time_us(&self.tables, &q.rspq),
            coalesce::holdoff_pkt_count(&self.tables, &q.rspq),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::fw::{FwError, FwQueueOps, IntrDest, QueueRole, RspqIds, TidReleaseSender, TransientFailure};
    use crate::hw::mailbox::{Mailbox, MboxError, MboxWait, MBOX_LEN};
    use crate::hw::platform::{IrqError, IrqPlatform, MsixError, Sleeper, WorkScheduler};
    use crate::hw::regs::Registers;
    use crate::intr::IrqMode;
    use core::cell::{Cell, RefCell};

    /// Full fake HAL: grants whatever is asked unless a failure is
    /// programmed in.
    struct FakeHal {
        msix_avail: Cell<usize>,
        live_rspqs: Cell<usize>,
        live_txqs: Cell<usize>,
        irqs: RefCell<Vec<u32>>,
        intr_on: Cell<bool>,
        /// Fail the n-th rspq allocation (1-based), 0 = never.
        rspq_fail_at: Cell<usize>,
        rspq_allocs: Cell<usize>,
        irq_fail: Cell<bool>,
        next_id: Cell<u16>,
    }

    impl FakeHal {
        fn new(msix_avail: usize) -> Self {
            Self {
                msix_avail: Cell::new(msix_avail),
                live_rspqs: Cell::new(0),
                live_txqs: Cell::new(0),
                irqs: RefCell::new(Vec::new()),
                intr_on: Cell::new(false),
                rspq_fail_at: Cell::new(0),
                rspq_allocs: Cell::new(0),
                irq_fail: Cell::new(false),
                next_id: Cell::new(1),
            }
        }

        fn live(&self) -> usize {
            self.live_rspqs.get() + self.live_txqs.get()
        }

        fn take_id(&self) -> u16 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }
    }

    impl FwQueueOps for FakeHal {
        fn alloc_rspq(
            &self,
            _role: QueueRole,
            _port: usize,
            _intr: IntrDest,
            _size: u16,
            fl_size: Option<u16>,
            _holdoff: crate::coalesce::HoldoffParams,
        ) -> core::result::Result<RspqIds, FwError> {
            let n = self.rspq_allocs.get() + 1;
            self.rspq_allocs.set(n);
            if self.rspq_fail_at.get() == n {
                return Err(FwError::Rejected);
            }
            self.live_rspqs.set(self.live_rspqs.get() + 1);
            Ok(RspqIds {
                abs_id: self.take_id(),
                cntxt_id: self.take_id(),
                fl_cntxt_id: fl_size.map(|_| self.take_id()),
            })
        }

        fn alloc_txq(
            &self,
            _role: QueueRole,
            _port: usize,
            _size: u16,
            _fwevt_cntxt_id: u16,
            _cmpl_cntxt_id: u16,
        ) -> core::result::Result<u16, FwError> {
            self.live_txqs.set(self.live_txqs.get() + 1);
            Ok(self.take_id())
        }

        fn free_rspq(&self, _cntxt_id: u16, _fl_cntxt_id: Option<u16>) {
            self.live_rspqs.set(self.live_rspqs.get() - 1);
        }

        fn free_txq(&self, _role: QueueRole, _cntxt_id: u16) {
            self.live_txqs.set(self.live_txqs.get() - 1);
        }

        fn set_intr_pktcnt(&self, _cntxt_id: u16, _idx: u8) -> core::result::Result<(), FwError> {
            Ok(())
        }
    }

    impl IrqPlatform for FakeHal {
        fn enable_msix(&self, count: usize) -> core::result::Result<Vec<u32>, MsixError> {
            let avail = self.msix_avail.get();
            if count > avail {
                return Err(MsixError::Shortfall(avail));
            }
            Ok((0..count as u32).collect())
        }

        fn enable_msi(&self) -> core::result::Result<u32, MsixError> {
            Ok(99)
        }

        fn disable_intr(&self) {}

        fn request_irq(&self, vec: u32, _name: &str) -> core::result::Result<(), IrqError> {
            if self.irq_fail.get() {
                return Err(IrqError::RequestFailed);
            }
            self.irqs.borrow_mut().push(vec);
            Ok(())
        }

        fn free_irq(&self, vec: u32) {
            let mut irqs = self.irqs.borrow_mut();
            let pos = irqs.iter().rposition(|&v| v == vec).expect("freeing unclaimed irq");
            irqs.remove(pos);
        }

        fn legacy_vector(&self) -> u32 {
            7
        }
    }

    impl Registers for FakeHal {
        fn read32(&self, _addr: u32) -> u32 {
            0
        }
        fn write32(&self, _addr: u32, _val: u32) {}
        fn rearm_queue_intr(&self, _cntxt_id: u16, _credits: u16) {}
        fn intr_enable(&self) {
            self.intr_on.set(true);
        }
        fn intr_disable(&self) {
            self.intr_on.set(false);
        }
    }

    impl Mailbox for FakeHal {
        fn command(
            &self,
            _req: &[u8; MBOX_LEN],
            _reply: &mut [u8; MBOX_LEN],
            _wait: MboxWait,
        ) -> core::result::Result<(), MboxError> {
            Ok(())
        }
    }

    impl TidReleaseSender for FakeHal {
        fn try_send_tid_release(&self, _chan: u8, _tid: u32) -> core::result::Result<(), TransientFailure> {
            Ok(())
        }
    }

    impl Sleeper for FakeHal {
        fn backoff(&self, _attempt: u32) {}
    }

    impl WorkScheduler for FakeHal {
        fn schedule_reclaim(&self) {}
    }

    fn two_port_adapter(msix_avail: usize) -> Adapter<FakeHal> {
        let hal = FakeHal::new(msix_avail);
        let cfg = AdapterConfig {
            name: String::from("nic0"),
            cpu_count: 4,
            hw_max_qsets: 16,
            offload: false,
            tid_counts: TidCounts { ntids: 32, natids: 8, nstids: 8, stid_base: 0 },
        };
        let ports = alloc::vec![
            PortInfo { name: String::from("eth0"), is_10g: true, chan: 0, viid: 0x10 },
            PortInfo { name: String::from("eth1"), is_10g: false, chan: 1, viid: 0x11 },
        ];
        Adapter::new(hal, cfg, ports)
    }

    #[test]
    fn test_bring_up_allocates_and_unmasks() {
        let mut ad = two_port_adapter(64);
        ad.bring_up().unwrap();
        assert!(ad.is_up());
        assert_eq!(ad.irq_state().unwrap().mode, IrqMode::Msix);
        // Fake firmware's live contexts match the device's view.
        assert_eq!(ad.hal().live(), ad.sge().resource_count());
        assert!(ad.hal().intr_on.get());
        // Second call is a no-op.
        let before = ad.hal().live();
        ad.bring_up().unwrap();
        assert_eq!(ad.hal().live(), before);
    }

    #[test]
    fn test_bring_up_failure_leaves_no_resources() {
        let mut ad = two_port_adapter(64);
        ad.hal.rspq_fail_at.set(3);
        assert!(ad.bring_up().is_err());
        assert!(!ad.is_up());
        assert_eq!(ad.hal().live(), 0);
        assert!(ad.sge().is_empty());
        assert!(ad.hal().irqs.borrow().is_empty());
        assert!(!ad.hal().intr_on.get());
    }

    #[test]
    fn test_irq_bind_failure_frees_queues() {
        let mut ad = two_port_adapter(64);
        ad.hal.irq_fail.set(true);
        assert!(ad.bring_up().is_err());
        assert_eq!(ad.hal().live(), 0);
        assert!(ad.sge().is_empty());
        assert!(ad.hal().irqs.borrow().is_empty());
    }

    #[test]
    fn test_tear_down_releases_everything() {
        let mut ad = two_port_adapter(64);
        ad.bring_up().unwrap();
        ad.tear_down();
        assert!(!ad.is_up());
        assert_eq!(ad.hal().live(), 0);
        assert!(ad.sge().is_empty());
        assert!(ad.hal().irqs.borrow().is_empty());
        assert!(!ad.hal().intr_on.get());
        // Idempotent.
        ad.tear_down();
        assert_eq!(ad.hal().live(), 0);
    }

    #[test]
    fn test_cycle_down_up_again() {
        let mut ad = two_port_adapter(64);
        ad.bring_up().unwrap();
        ad.tear_down();
        ad.bring_up().unwrap();
        assert!(ad.is_up());
        assert_eq!(ad.hal().live(), ad.sge().resource_count());
        // Reclaim was re-armed by the second bring-up.
        ad.tids().queue_tid_release(ad.hal(), 0, 5);
        assert_eq!(ad.tids().pending_releases(), 1);
    }

    #[test]
    fn test_shared_mode_when_msix_short() {
        // Ceiling below the minimum forces the MSI fallback and a
        // one-queue-set-per-port plan.
        let mut ad = two_port_adapter(2);
        ad.bring_up().unwrap();
        assert_eq!(ad.irq_state().unwrap().mode, IrqMode::Msi);
        assert_eq!(ad.plan().eth_qsets, 2);
        // Shared mode allocates the forwarding queue.
        assert!(ad.sge().intrq.is_some());
        assert_eq!(ad.hal().irqs.borrow().len(), 1);
    }

    #[test]
    fn test_port_and_qset_lookups() {
        let ad = two_port_adapter(64);
        assert_eq!(ad.port_chan(1), Some(1));
        assert_eq!(ad.port_for_chan(0), Some(0));
        assert_eq!(ad.port_for_chan(9), None);
        // 10G port gets 4 (cpu-clamped), the 1G port exactly 1.
        assert_eq!(ad.qset_range(0), Some(0..4));
        assert_eq!(ad.qset_range(1), Some(4..5));
        assert_eq!(ad.qset_range(2), None);
    }

    #[test]
    fn test_coalesce_requires_live_queues() {
        let mut ad = two_port_adapter(64);
        assert!(matches!(ad.set_coalesce(0, 50, 8), Err(NicError::Detached)));
        ad.bring_up().unwrap();
        ad.set_coalesce(0, 50, 8).unwrap();
        assert_eq!(ad.get_coalesce(0).unwrap(), (50, 8));
        assert!(matches!(ad.get_coalesce(7), Err(NicError::BadIdentifier)));
    }

    #[test]
    fn test_best_mtu_uses_default_table() {
        let ad = two_port_adapter(64);
        assert_eq!(ad.best_mtu(1500), (1500, 8));
        assert_eq!(ad.best_mtu(9000), (9000, 14));
    }
}
