//! Platform interrupt, scheduling and timing services.

use alloc::vec::Vec;

/// MSI-X enable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsixError {
    /// The platform can provide only this many vectors. The caller may
    /// retry at or below the reported ceiling.
    Shortfall(usize),
    /// MSI-X (or MSI) is not available at all.
    Unavailable,
}

/// Per-registration interrupt errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// The vector could not be claimed.
    RequestFailed,
}

/// Platform interrupt-vector budget and handler registration.
pub trait IrqPlatform {
    /// Request `count` MSI-X vectors. Returns their platform vector ids
    /// on a full grant.
    fn enable_msix(&self, count: usize) -> Result<Vec<u32>, MsixError>;

    /// Request a single MSI vector.
    fn enable_msi(&self) -> Result<u32, MsixError>;

    /// Release all vectors granted by [`IrqPlatform::enable_msix`] or
    /// [`IrqPlatform::enable_msi`].
    fn disable_intr(&self);

    /// Register a handler on `vec` under a diagnostic `name`.
    fn request_irq(&self, vec: u32, name: &str) -> Result<(), IrqError>;

    /// Release a handler registration.
    fn free_irq(&self, vec: u32);

    /// The legacy (INTx) line shared by the whole device.
    fn legacy_vector(&self) -> u32;
}

/// Bounded sleeping for retry backoff. Process context only.
pub trait Sleeper {
    /// Sleep for roughly `attempt` backoff units. Implementations choose
    /// the unit; the hint only grows with consecutive failures.
    fn backoff(&self, attempt: u32);
}

/// Deferred-work scheduling.
pub trait WorkScheduler {
    /// Ask the platform to run the TID reclaim worker soon, in process
    /// context. Multiple requests may coalesce into one run.
    fn schedule_reclaim(&self);
}
