//! Queue-set planning.
//!
//! Decides how many queue-sets each port gets from the port speed
//! classes, the CPU count and the hardware queue-set budget, and can
//! shrink an existing plan when the interrupt-vector grant comes in
//! lower than requested.

use alloc::vec::Vec;

/// Hardware limit on Ethernet queue-sets.
pub const MAX_ETH_QSETS: u16 = 32;

/// Hardware limit on offload queue-sets.
pub const MAX_OFLD_QSETS: u16 = 16;

/// Maximum number of ports on one adapter.
pub const MAX_NPORTS: usize = 4;

/// Maximum number of RDMA ingress queues (one per port).
pub const MAX_RDMA_QUEUES: u16 = MAX_NPORTS as u16;

/// Default ring sizes for every queue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    /// Ethernet response queue capacity.
    pub eth_rspq: u16,
    /// Ethernet receive free-list capacity.
    pub eth_fl: u16,
    /// Ethernet transmit ring capacity.
    pub eth_txq: u16,
    /// Control transmit ring capacity.
    pub ctrl_txq: u16,
    /// Offload response queue capacity.
    pub ofld_rspq: u16,
    /// Offload receive free-list capacity.
    pub ofld_fl: u16,
    /// Offload transmit ring capacity.
    pub ofld_txq: u16,
    /// RDMA response queue capacity.
    pub rdma_rspq: u16,
    /// RDMA receive free-list capacity.
    pub rdma_fl: u16,
    /// Firmware event queue capacity.
    pub fwevt_rspq: u16,
    /// Shared-interrupt queue capacity.
    pub intrq: u16,
}

impl Default for RingGeometry {
    fn default() -> Self {
        Self {
            eth_rspq: 1024,
            eth_fl: 72,
            eth_txq: 1024,
            ctrl_txq: 512,
            ofld_rspq: 1024,
            ofld_fl: 72,
            ofld_txq: 1024,
            rdma_rspq: 511,
            rdma_fl: 72,
            fwevt_rspq: 512,
            intrq: 2 * (MAX_ETH_QSETS + MAX_OFLD_QSETS + MAX_RDMA_QUEUES + 2),
        }
    }
}

/// One port's share of the Ethernet queue-set range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPlan {
    /// Offset of the port's first queue-set.
    pub first_qset: u16,
    /// Number of queue-sets.
    pub nqsets: u16,
    /// Whether this is a 10G-class port.
    pub is_10g: bool,
}

/// The complete queue-set plan for one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePlan {
    /// Per-port queue-set assignments, in registration order.
    pub ports: Vec<PortPlan>,
    /// Total Ethernet queue-sets currently planned.
    pub eth_qsets: u16,
    /// Upper bound on Ethernet queue-sets; vector negotiation may lower it.
    pub max_eth_qsets: u16,
    /// Offload queue-sets (0 when the device has no offload support).
    pub ofld_qsets: u16,
    /// RDMA ingress queues (one per port when offload is enabled).
    pub rdma_qs: u16,
    /// Ring geometry for all queue classes.
    pub geometry: RingGeometry,
}

impl QueuePlan {
    /// Compute the default plan.
    ///
    /// Non-10G ports always get exactly one queue-set. 10G ports share
    /// what remains of `hw_max_qsets`, capped by `cpu_count`. The
    /// quotient is deliberately not floored at 1: with more 10G ports
    /// than budget the plan degenerates to 0 queue-sets per 10G port,
    /// and callers see that rather than an invented minimum.
    pub fn compute(is_10g: &[bool], cpu_count: usize, hw_max_qsets: u16, offload: bool) -> Self {
        let nports = is_10g.len();
        let n10g = is_10g.iter().filter(|&&t| t).count();

        // One queue-set per non-10G port, up to one per CPU for 10G ports.
        let mut q10g: i32 = 0;
        if n10g > 0 {
            q10g = (hw_max_qsets as i32 - (nports as i32 - n10g as i32)) / n10g as i32;
        }
        if q10g > cpu_count as i32 {
            q10g = cpu_count as i32;
        }
        let q10g = q10g.max(0) as u16;

        let mut ports = Vec::with_capacity(nports);
        let mut qidx = 0u16;
        for &is_10g in is_10g {
            let nqsets = if is_10g { q10g } else { 1 };
            ports.push(PortPlan { first_qset: qidx, nqsets, is_10g });
            qidx += nqsets;
        }

        let (ofld_qsets, rdma_qs) = if offload {
            // One offload queue per channel for all-1G devices, otherwise
            // all available queues split across channels, capped by cores.
            let ofld = if n10g > 0 {
                let i = (MAX_OFLD_QSETS as usize).min(cpu_count) as u16;
                roundup(i, nports as u16)
            } else {
                nports as u16
            };
            // One RDMA ingress queue per channel suffices.
            (ofld, nports as u16)
        } else {
            (0, 0)
        };

        Self {
            ports,
            eth_qsets: qidx,
            max_eth_qsets: qidx,
            ofld_qsets,
            rdma_qs,
            geometry: RingGeometry::default(),
        }
    }

    /// Reduce the number of Ethernet queue-sets across all ports to at
    /// most `n`, then recompute `first_qset` offsets.
    ///
    /// Ports are scanned in order, each losing one queue-set per sweep
    /// while it has more than one; a port is never reduced below one
    /// queue-set, so `n` is effectively floored at the port count.
    pub fn rebalance(&mut self, n: u16) {
        while n < self.eth_qsets {
            let before = self.eth_qsets;
            for port in self.ports.iter_mut() {
                if port.nqsets > 1 {
                    port.nqsets -= 1;
                    self.eth_qsets -= 1;
                    if self.eth_qsets <= n {
                        break;
                    }
                }
            }
            if self.eth_qsets == before {
                break;
            }
        }

        let mut qidx = 0u16;
        for port in self.ports.iter_mut() {
            port.first_qset = qidx;
            qidx += port.nqsets;
        }
    }

    /// Number of ports in the plan.
    pub fn nports(&self) -> usize {
        self.ports.len()
    }

    /// Whether the plan includes offload queues.
    pub fn is_offload(&self) -> bool {
        self.ofld_qsets > 0
    }
}

/// Round `v` up to a multiple of `m`.
fn roundup(v: u16, m: u16) -> u16 {
    ((v + m - 1) / m) * m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(plan: &QueuePlan) -> Vec<u16> {
        plan.ports.iter().map(|p| p.nqsets).collect()
    }

    fn offsets(plan: &QueuePlan) -> Vec<u16> {
        plan.ports.iter().map(|p| p.first_qset).collect()
    }

    #[test]
    fn test_plan_mixed_port_speeds() {
        // 4 ports, 2 of them 10G, 8 CPUs, budget 32:
        // q10g = (32 - 2) / 2 = 15, clamped to 8.
        let plan = QueuePlan::compute(&[true, false, true, false], 8, 32, false);
        assert_eq!(counts(&plan), [8, 1, 8, 1]);
        assert_eq!(offsets(&plan), [0, 8, 9, 17]);
        assert_eq!(plan.eth_qsets, 18);
    }

    #[test]
    fn test_plan_non_10g_always_one() {
        let plan = QueuePlan::compute(&[false, false, false, false], 16, 32, false);
        assert_eq!(counts(&plan), [1, 1, 1, 1]);
        assert_eq!(plan.eth_qsets, 4);
    }

    #[test]
    fn test_plan_within_budget() {
        for &(n10g, nports, cpus, max) in
            &[(1usize, 2usize, 4usize, 8u16), (2, 4, 8, 32), (4, 4, 2, 16), (3, 4, 64, 32)]
        {
            let flags: Vec<bool> = (0..nports).map(|i| i < n10g).collect();
            let plan = QueuePlan::compute(&flags, cpus, max, false);
            assert!(plan.eth_qsets <= max, "{:?} exceeds {}", counts(&plan), max);
            for p in plan.ports.iter().filter(|p| !p.is_10g) {
                assert_eq!(p.nqsets, 1);
            }
        }
    }

    #[test]
    fn test_plan_degenerate_budget() {
        // 3 10G ports with a budget of 2: q10g = (2 - 1) / 3 = 0. The
        // arithmetic is preserved as-is, so 10G ports end up with zero
        // queue-sets while the 1G port keeps its one.
        let plan = QueuePlan::compute(&[true, true, true, false], 8, 2, false);
        assert_eq!(counts(&plan), [0, 0, 0, 1]);
        assert_eq!(plan.eth_qsets, 1);
    }

    #[test]
    fn test_plan_offload_sizing() {
        let plan = QueuePlan::compute(&[true, false, true, false], 6, 32, true);
        // min(16, 6) = 6, rounded up to a multiple of 4 ports.
        assert_eq!(plan.ofld_qsets, 8);
        assert_eq!(plan.rdma_qs, 4);

        let all_1g = QueuePlan::compute(&[false, false], 6, 32, true);
        assert_eq!(all_1g.ofld_qsets, 2);
        assert_eq!(all_1g.rdma_qs, 2);
    }

    #[test]
    fn test_rebalance_shrinks_in_order() {
        let mut plan = QueuePlan::compute(&[true, false, true, false], 8, 32, false);
        assert_eq!(counts(&plan), [8, 1, 8, 1]);
        plan.rebalance(12);
        assert_eq!(plan.eth_qsets, 12);
        assert_eq!(counts(&plan), [5, 1, 5, 1]);
        assert_eq!(offsets(&plan), [0, 5, 6, 11]);
    }

    #[test]
    fn test_rebalance_never_below_one_per_port() {
        let mut plan = QueuePlan::compute(&[true, true, false, false], 8, 32, false);
        plan.rebalance(1);
        assert!(plan.ports.iter().all(|p| p.nqsets == 1));
        assert_eq!(plan.eth_qsets, 4);
        assert_eq!(offsets(&plan), [0, 1, 2, 3]);
    }

    #[test]
    fn test_rebalance_noop_when_within_cap() {
        let mut plan = QueuePlan::compute(&[true, false], 4, 16, false);
        let before = plan.clone();
        plan.rebalance(plan.eth_qsets);
        assert_eq!(plan, before);
    }
}
