//! Deferred TID release.
//!
//! When the fast removal path cannot allocate a release message without
//! blocking, the identifier is parked here and a worker drains the list
//! from process context, where retrying with sleeps is allowed. Every
//! parked entry produces exactly one release notification, unless the
//! device is torn down first.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::vec::Vec;
use log::warn;
use spin::Mutex;

use crate::hw::fw::TidReleaseSender;
use crate::hw::platform::{Sleeper, WorkScheduler};

/// Send attempts per entry before the worker gives the list back and
/// reschedules itself.
pub const MAX_SEND_RETRIES: u32 = 64;

/// One identifier awaiting its release notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRelease {
    /// The identifier to release.
    pub tid: u32,
    /// Offload channel the notification must go out on.
    pub chan: u8,
}

struct PendingState {
    list: Vec<PendingRelease>,
    /// A worker run is scheduled or in progress.
    scheduled: bool,
}

/// The deferred-release worker state.
pub struct Reclaimer {
    state: Mutex<PendingState>,
    cancelled: AtomicBool,
    /// Worker runs currently inside [`Reclaimer::process`].
    active: AtomicUsize,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PendingState { list: Vec::new(), scheduled: false }),
            cancelled: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        }
    }

    /// Park `tid` for deferred release on `chan`, scheduling a worker
    /// run if none is pending. Safe from interrupt context; the lock is
    /// released before this returns.
    pub fn enqueue<S: WorkScheduler>(&self, sched: &S, chan: u8, tid: u32) {
        if self.cancelled.load(Ordering::Acquire) {
            // Tear-down discards queued-but-unsent releases.
            return;
        }
        let kick = {
            let mut st = self.state.lock();
            st.list.push(PendingRelease { tid, chan });
            if st.scheduled {
                false
            } else {
                st.scheduled = true;
                true
            }
        };
        if kick {
            sched.schedule_reclaim();
        }
    }

    /// Drain the pending list. Process context only.
    ///
    /// Detaches the whole list under the lock, then sends each entry
    /// outside it so enqueuers are never blocked. Buffer allocation is
    /// retried with backoff up to [`MAX_SEND_RETRIES`] times per entry;
    /// on exhaustion the unsent remainder is pushed back and the worker
    /// rescheduled, so no release is ever lost. Returns the number of
    /// notifications sent.
    pub fn process<H>(&self, hal: &H) -> usize
    where
        H: TidReleaseSender + Sleeper + WorkScheduler,
    {
        self.active.fetch_add(1, Ordering::AcqRel);
        let sent = self.process_inner(hal);
        self.active.fetch_sub(1, Ordering::AcqRel);
        sent
    }

    fn process_inner<H>(&self, hal: &H) -> usize
    where
        H: TidReleaseSender + Sleeper + WorkScheduler,
    {
        let mut sent = 0;
        loop {
            let batch = {
                let mut st = self.state.lock();
                if st.list.is_empty() || self.cancelled.load(Ordering::Acquire) {
                    st.list.clear();
                    st.scheduled = false;
                    return sent;
                }
                core::mem::take(&mut st.list)
            };

            let mut entries = batch.into_iter();
            while let Some(entry) = entries.next() {
                let mut attempt = 0u32;
                loop {
                    if self.cancelled.load(Ordering::Acquire) {
                        let mut st = self.state.lock();
                        st.list.clear();
                        st.scheduled = false;
                        return sent;
                    }
                    match hal.try_send_tid_release(entry.chan, entry.tid) {
                        Ok(()) => {
                            sent += 1;
                            break;
                        }
                        Err(_) if attempt + 1 < MAX_SEND_RETRIES => {
                            attempt += 1;
                            hal.backoff(attempt);
                        }
                        Err(_) => {
                            // Give the remainder back and try again in a
                            // fresh worker run.
                            warn!("tid release stalled, rescheduling");
                            {
                                let mut st = self.state.lock();
                                st.list.push(entry);
                                st.list.extend(entries);
                            }
                            hal.schedule_reclaim();
                            return sent;
                        }
                    }
                }
            }
        }
    }

    /// Stop deferred reclaim and discard anything still queued. Called
    /// at tear-down; running workers exit at their next cancellation
    /// check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let mut st = self.state.lock();
        st.list.clear();
        st.scheduled = false;
    }

    /// Re-arm after a cancellation, ahead of the next bring-up. Callers
    /// must have waited for active workers to drain first.
    pub fn reset(&self) {
        debug_assert!(!self.is_active());
        self.cancelled.store(false, Ordering::Release);
    }

    /// Whether any worker run is still inside [`Reclaimer::process`].
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Entries currently parked (diagnostics).
    pub fn pending(&self) -> usize {
        self.state.lock().list.len()
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}
