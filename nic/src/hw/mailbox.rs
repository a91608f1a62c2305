//! Firmware mailbox primitive.
//!
//! A bounded-wait, fixed-size command/reply channel to on-device
//! firmware. Command encoding is the implementor's concern; this layer
//! only sees opaque byte blocks.

/// Size of one mailbox command and of its reply, in bytes.
pub const MBOX_LEN: usize = 64;

/// How the caller is willing to wait for the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MboxWait {
    /// Sleep between polls; only valid from process context.
    Sleep,
    /// Busy-poll; required from interrupt context.
    Spin,
}

/// Mailbox failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MboxError {
    /// No reply within the bounded wait.
    Timeout,
    /// Firmware rejected or failed the command.
    Device,
}

/// Bounded-wait mailbox command/reply.
pub trait Mailbox {
    /// Issue one command and wait for its reply.
    ///
    /// # Contract
    /// - MUST NOT wait longer than the implementation's fixed bound
    /// - With [`MboxWait::Spin`] MUST NOT sleep
    fn command(
        &self,
        req: &[u8; MBOX_LEN],
        reply: &mut [u8; MBOX_LEN],
        wait: MboxWait,
    ) -> Result<(), MboxError>;
}
