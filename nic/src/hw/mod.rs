//! Downward interfaces to firmware and platform.
//!
//! The control plane never touches wire formats or bus plumbing directly;
//! everything below it is reached through the narrow traits in this
//! module. Embedders implement them once per platform.

pub mod fw;
pub mod mailbox;
pub mod platform;
pub mod regs;

pub use fw::{FwError, FwQueueOps, IntrDest, QueueRole, RspqIds, TidReleaseSender, TransientFailure};
pub use mailbox::{Mailbox, MboxError, MboxWait, MBOX_LEN};
pub use platform::{IrqError, IrqPlatform, MsixError, Sleeper, WorkScheduler};
pub use regs::Registers;

/// Everything the adapter needs from the outside world, as one bound.
///
/// Blanket-implemented, so embedders only implement the individual traits.
pub trait NicHal:
    FwQueueOps + TidReleaseSender + Mailbox + Registers + IrqPlatform + Sleeper + WorkScheduler
{
}

impl<T> NicHal for T where
    T: FwQueueOps + TidReleaseSender + Mailbox + Registers + IrqPlatform + Sleeper + WorkScheduler
{
}
