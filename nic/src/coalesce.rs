//! Interrupt-coalescing quantization.
//!
//! Hardware supports a small set of hold-off timer values and packet-count
//! thresholds; requests are quantized to the nearest supported slot.

use crate::error::{NicError, Result};
use crate::hw::fw::FwQueueOps;
use crate::sge::RespQueue;

/// Number of hold-off timer slots.
pub const NTIMERS: usize = 6;

/// Number of packet-count threshold slots.
pub const NCOUNTERS: usize = 4;

/// Timer index encoding "timer disabled".
pub const TIMER_OFF: u8 = NTIMERS as u8;

/// Default hold-off timer values, in microseconds.
pub const DEFAULT_TIMER_US: [u16; NTIMERS] = [5, 10, 20, 50, 100, 200];

/// Default packet-count thresholds.
pub const DEFAULT_COUNTER: [u16; NCOUNTERS] = [1, 8, 16, 32];

/// The coalescing tables the device was configured with.
#[derive(Debug, Clone, Copy)]
pub struct HoldoffTables {
    /// Hold-off timer values in microseconds.
    pub timer_us: [u16; NTIMERS],
    /// Packet-count thresholds.
    pub counter: [u16; NCOUNTERS],
}

impl Default for HoldoffTables {
    fn default() -> Self {
        Self { timer_us: DEFAULT_TIMER_US, counter: DEFAULT_COUNTER }
    }
}

/// A response queue's resolved interrupt hold-off state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldoffParams {
    /// Index into the timer table, or [`TIMER_OFF`].
    pub timer_idx: u8,
    /// Index into the packet-count table.
    pub pktcnt_idx: u8,
    /// Whether the packet counter arms interrupts.
    pub cnt_en: bool,
}

impl HoldoffParams {
    /// Hold-off state for a queue created with explicit indices and the
    /// counter disabled.
    pub const fn timer_only(timer_idx: u8) -> Self {
        Self { timer_idx, pktcnt_idx: 0, cnt_en: false }
    }
}

impl Default for HoldoffParams {
    fn default() -> Self {
        Self { timer_idx: 0, pktcnt_idx: 0, cnt_en: false }
    }
}

/// Index of the table entry nearest to `requested`.
///
/// Forward scan with strict less-than, so the lowest index wins ties.
/// `table` must be non-empty.
pub fn nearest(requested: u32, table: &[u16]) -> usize {
    let mut matched = 0;
    let mut min_delta = u32::MAX;
    for (i, &v) in table.iter().enumerate() {
        let delta = requested.abs_diff(v as u32);
        if delta < min_delta {
            min_delta = delta;
            matched = i;
        }
    }
    matched
}

/// A queue's current hold-off time in microseconds. 0 means no timer.
pub fn holdoff_time_us(tables: &HoldoffTables, q: &RespQueue) -> u32 {
    let idx = q.holdoff.timer_idx as usize;
    if idx < NTIMERS { tables.timer_us[idx] as u32 } else { 0 }
}

/// A queue's current packet-count threshold. 0 means counter disabled.
pub fn holdoff_pkt_count(tables: &HoldoffTables, q: &RespQueue) -> u32 {
    if q.holdoff.cnt_en { tables.counter[q.holdoff.pktcnt_idx as usize] as u32 } else { 0 }
}

/// Set a response queue's interrupt hold-off time and packet count.
///
/// At least one of the two mechanisms must arm interrupts, so when both
/// `us` and `cnt` are zero the packet count is forced to 1. If the queue
/// already has live hardware state and its packet-count index changes, a
/// parameter-update command is issued immediately; otherwise the values
/// are only cached for creation time.
pub fn program<F: FwQueueOps>(
    fw: &F,
    tables: &HoldoffTables,
    q: &mut RespQueue,
    us: u32,
    mut cnt: u32,
) -> Result<()> {
    if us == 0 && cnt == 0 {
        cnt = 1;
    }

    if cnt != 0 {
        let new_idx = nearest(cnt, &tables.counter) as u8;
        if q.live && q.holdoff.pktcnt_idx != new_idx {
            // The queue has already been created, update it in place.
            fw.set_intr_pktcnt(q.cntxt_id, new_idx).map_err(NicError::from)?;
        }
        q.holdoff.pktcnt_idx = new_idx;
    }

    q.holdoff.timer_idx = if us == 0 { TIMER_OFF } else { nearest(us, &tables.timer_us) as u8 };
    q.holdoff.cnt_en = cnt > 0;
    Ok(())
}
