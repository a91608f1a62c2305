//! Adapter and upper-layer-driver registry.
//!
//! There is no process-global device list; callers construct a
//! [`Registry`], hand it the adapters they own and the upper-layer
//! protocol drivers (ULDs) interested in offload-capable devices, and
//! pass it wherever lookups are needed. Registration order does not
//! matter: a ULD arriving after an adapter is told about it
//! immediately, and vice versa.

use alloc::boxed::Box;
use alloc::vec::Vec;
use log::info;

use crate::adapter::Adapter;
use crate::error::{NicError, Result};
use crate::hw::NicHal;

/// Upper-layer driver classes, one registration slot each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UldKind {
    Rdma,
    Iscsi,
}

/// Callbacks an upper-layer driver receives as offload-capable
/// adapters come and go.
pub trait UldHooks<H: NicHal> {
    /// An offload-capable adapter is available.
    fn attach(&self, adapter: &Adapter<H>);

    /// The adapter named is going away; the driver must drop every
    /// reference to it before returning.
    fn detach(&self, name: &str);
}

/// Explicitly passed registry of adapters and ULD hooks.
pub struct Registry<H: NicHal> {
    adapters: Vec<Adapter<H>>,
    ulds: Vec<(UldKind, Box<dyn UldHooks<H>>)>,
}

impl<H: NicHal> Registry<H> {
    pub fn new() -> Self {
        Self { adapters: Vec::new(), ulds: Vec::new() }
    }

    /// Add an adapter, notifying every registered ULD when the device
    /// carries offload queues. Names must be unique.
    pub fn register_adapter(&mut self, adapter: Adapter<H>) -> Result<()> {
        if self.adapter(adapter.name()).is_some() {
            return Err(NicError::BadIdentifier);
        }
        if adapter.plan().is_offload() {
            for (_, uld) in self.ulds.iter() {
                uld.attach(&adapter);
            }
        }
        info!("registered adapter {}", adapter.name());
        self.adapters.push(adapter);
        Ok(())
    }

    /// Remove an adapter by name, notifying ULDs first so they drop
    /// their references before ownership is returned to the caller.
    pub fn unregister_adapter(&mut self, name: &str) -> Option<Adapter<H>> {
        let pos = self.adapters.iter().position(|a| a.name() == name)?;
        if self.adapters[pos].plan().is_offload() {
            for (_, uld) in self.ulds.iter() {
                uld.detach(name);
            }
        }
        Some(self.adapters.remove(pos))
    }

    pub fn adapter(&self, name: &str) -> Option<&Adapter<H>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    pub fn adapter_mut(&mut self, name: &str) -> Option<&mut Adapter<H>> {
        self.adapters.iter_mut().find(|a| a.name() == name)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Adapter<H>> {
        self.adapters.iter()
    }

    /// Register an upper-layer driver. It is attached to every
    /// offload-capable adapter already present. One registration per
    /// [`UldKind`].
    pub fn register_uld(&mut self, kind: UldKind, hooks: Box<dyn UldHooks<H>>) -> Result<()> {
        if self.ulds.iter().any(|(k, _)| *k == kind) {
            return Err(NicError::BadIdentifier);
        }
        for adapter in self.adapters.iter().filter(|a| a.plan().is_offload()) {
            hooks.attach(adapter);
        }
        self.ulds.push((kind, hooks));
        Ok(())
    }

    /// Remove an upper-layer driver, detaching it from every
    /// offload-capable adapter first.
    pub fn unregister_uld(&mut self, kind: UldKind) -> Option<Box<dyn UldHooks<H>>> {
        let pos = self.ulds.iter().position(|(k, _)| *k == kind)?;
        let (_, hooks) = self.ulds.remove(pos);
        for adapter in self.adapters.iter().filter(|a| a.plan().is_offload()) {
            hooks.detach(adapter.name());
        }
        Some(hooks)
    }
}

impl<H: NicHal> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
