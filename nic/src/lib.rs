//! Multi-queue NIC control-plane resource management.
//!
//! Everything between "the device is attached" and "packets can flow":
//! planning queue-sets across ports, negotiating an interrupt-vector
//! budget with the platform, quantizing coalescing settings to the
//! hardware tables, all-or-nothing queue bring-up, and the firmware
//! identifier namespaces (TID/ATID/STID) with deferred release.
//!
//! The data path itself, command wire formats and link management live
//! elsewhere; this crate consumes them through the traits in [`hw`].

#![no_std]

extern crate alloc;

pub mod adapter;
pub mod coalesce;
pub mod error;
pub mod hw;
pub mod intr;
pub mod mtu;
pub mod plan;
pub mod registry;
pub mod sge;
pub mod tid;

pub use adapter::{Adapter, AdapterConfig, PortInfo};
pub use error::{NicError, Result, SetupStage};
pub use intr::{IrqMode, IrqState};
pub use plan::QueuePlan;
pub use registry::{Registry, UldHooks, UldKind};
pub use tid::{AddrFamily, TidCounts, TidTable};
