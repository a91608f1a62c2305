//! Firmware-agnostic identifier allocators.
//!
//! This crate provides the allocators behind device-visible identifier
//! namespaces: identifiers handed to on-device firmware must be dense,
//! stable integers, so the usual handle-only arena tricks (packing a
//! generation into the id) are not available.
//!
//! # Design Philosophy
//!
//! - **Zero dependencies**: `no_std` + `alloc`, nothing else
//! - **Dense integer ids**: the allocated index *is* the firmware id
//! - **Misuse detection**: generation-checked handles ([`Arena`]) and
//!   width-checked frees ([`RegionBitmap`]) catch double-free and
//!   use-after-free instead of silently corrupting the namespace
//! - **O(1) or short-scan operations**: safe to call under a short-held
//!   lock from interrupt context
//!
//! # Allocators
//!
//! 1. [`Arena`]: free-list arena with per-slot generations. One slot per
//!    id, pop/push in O(1).
//! 2. [`RegionBitmap`]: bitmap supporting 1-bit and 2-bit reservation
//!    widths in one shared namespace.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;

/// Sentinel index terminating the arena free list.
const NO_SLOT: u32 = u32::MAX;

/// Bits per bitmap word.
const WORD_BITS: usize = 64;

// ============================================================================
// Error types
// ============================================================================

/// Identifier pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Index is outside the namespace.
    OutOfRange,
    /// Handle generation does not match the slot (use-after-free).
    StaleHandle,
    /// Slot is not currently allocated (double-free).
    NotAllocated,
    /// Free width does not match the allocation width.
    WidthMismatch,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "identifier out of range"),
            Self::StaleHandle => write!(f, "stale handle"),
            Self::NotAllocated => write!(f, "identifier not allocated"),
            Self::WidthMismatch => write!(f, "reservation width mismatch"),
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = core::result::Result<T, PoolError>;

// ============================================================================
// Generation-counted arena
// ============================================================================

/// Handle to an allocated arena slot.
///
/// The `index` is the dense, firmware-visible identifier; the generation
/// only exists host-side to catch stale frees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// The dense identifier this handle names.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

struct Slot<T> {
    value: Option<T>,
    /// Bumped on every free; a handle is valid only while generations match.
    generation: u32,
    /// Next slot in the free list, `NO_SLOT` at the tail.
    next_free: u32,
}

/// Fixed-capacity arena with an intrusive free list and per-slot generations.
///
/// Allocation pops the free-list head, free pushes it back; both are O(1)
/// and never allocate, so they are safe under a short-held lock.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    in_use: usize,
}

impl<T> Arena<T> {
    /// Create an arena with `capacity` slots, all free.
    ///
    /// Slots are threaded onto the free list in ascending index order, so
    /// the first allocation returns id 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity < NO_SLOT as usize, "capacity exceeds index space");
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next = if i + 1 < capacity { (i + 1) as u32 } else { NO_SLOT };
            slots.push(Slot { value: None, generation: 0, next_free: next });
        }
        Self {
            slots,
            free_head: if capacity > 0 { 0 } else { NO_SLOT },
            in_use: 0,
        }
    }

    /// Allocate a slot and store `value` in it.
    ///
    /// Returns `None` when the namespace is exhausted.
    pub fn alloc(&mut self, value: T) -> Option<Handle> {
        if self.free_head == NO_SLOT {
            return None;
        }
        let index = self.free_head;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none(), "free-list slot must be empty");
        self.free_head = slot.next_free;
        slot.value = Some(value);
        slot.next_free = NO_SLOT;
        self.in_use += 1;
        Some(Handle { index, generation: slot.generation })
    }

    /// Release a slot, returning the stored value.
    ///
    /// Rejects stale handles (generation mismatch) and slots that are not
    /// currently allocated.
    pub fn free(&mut self, handle: Handle) -> Result<T> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(PoolError::OutOfRange)?;
        if slot.generation != handle.generation {
            return Err(PoolError::StaleHandle);
        }
        let value = slot.value.take().ok_or(PoolError::NotAllocated)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.next_free = self.free_head;
        self.free_head = handle.index;
        self.in_use -= 1;
        Ok(value)
    }

    /// Get the value behind a handle, if it is still live.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Look up by raw index, ignoring generations.
    ///
    /// For diagnostics only; prefer [`Arena::get`].
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.value.as_ref()
    }

    /// Number of allocated slots.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Length of the free list (walks it; test/debug aid).
    pub fn free_list_len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.free_head;
        while cur != NO_SLOT {
            n += 1;
            cur = self.slots[cur as usize].next_free;
        }
        n
    }
}

// ============================================================================
// Region bitmap
// ============================================================================

/// Reservation width for [`RegionBitmap`] allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionWidth {
    /// One bit per identifier.
    One,
    /// Two consecutive bits, base aligned to an even index.
    Two,
}

impl RegionWidth {
    #[inline]
    const fn bits(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Bitmap allocator with per-allocation reservation widths.
///
/// Two id families share one namespace: one reserves single bits, the
/// other reserves aligned pairs. Each allocation's width is recorded so a
/// free with the wrong width (or of an unallocated id) is rejected.
pub struct RegionBitmap {
    used: Vec<u64>,
    /// Set on the base bit of every 2-bit allocation.
    wide: Vec<u64>,
    bits: usize,
    bits_in_use: usize,
}

impl RegionBitmap {
    /// Create a bitmap covering `bits` identifiers, all free.
    pub fn new(bits: usize) -> Self {
        let words = (bits + WORD_BITS - 1) / WORD_BITS;
        Self {
            used: {
                let mut v = Vec::new();
                v.resize(words, 0);
                v
            },
            wide: {
                let mut v = Vec::new();
                v.resize(words, 0);
                v
            },
            bits,
            bits_in_use: 0,
        }
    }

    #[inline]
    fn test(&self, bit: usize) -> bool {
        self.used[bit / WORD_BITS] & (1u64 << (bit % WORD_BITS)) != 0
    }

    #[inline]
    fn set(&mut self, bit: usize) {
        self.used[bit / WORD_BITS] |= 1u64 << (bit % WORD_BITS);
    }

    #[inline]
    fn clear(&mut self, bit: usize) {
        self.used[bit / WORD_BITS] &= !(1u64 << (bit % WORD_BITS));
    }

    /// Allocate a region of the given width, returning its base id.
    ///
    /// 1-bit allocations take the first zero bit; 2-bit allocations take
    /// the first free even-aligned pair. Returns `None` when no region of
    /// the requested width is free.
    pub fn alloc(&mut self, width: RegionWidth) -> Option<usize> {
        match width {
            RegionWidth::One => {
                let base = (0..self.bits).find(|&b| !self.test(b))?;
                self.set(base);
                self.bits_in_use += 1;
                Some(base)
            }
            RegionWidth::Two => {
                let base = (0..self.bits.saturating_sub(1))
                    .step_by(2)
                    .find(|&b| !self.test(b) && !self.test(b + 1))?;
                self.set(base);
                self.set(base + 1);
                self.wide[base / WORD_BITS] |= 1u64 << (base % WORD_BITS);
                self.bits_in_use += 2;
                Some(base)
            }
        }
    }

    /// Free the region at `base`, which must have been allocated with the
    /// same `width`.
    pub fn free(&mut self, base: usize, width: RegionWidth) -> Result<()> {
        if base + width.bits() > self.bits {
            return Err(PoolError::OutOfRange);
        }
        let is_wide = self.wide[base / WORD_BITS] & (1u64 << (base % WORD_BITS)) != 0;
        match width {
            RegionWidth::One => {
                if !self.test(base) {
                    return Err(PoolError::NotAllocated);
                }
                if is_wide {
                    return Err(PoolError::WidthMismatch);
                }
                // 2-bit regions are even-aligned, so an odd bit whose
                // predecessor carries the wide marker is the interior
                // half of a live pair.
                if base % 2 == 1
                    && self.wide[(base - 1) / WORD_BITS] & (1u64 << ((base - 1) % WORD_BITS)) != 0
                {
                    return Err(PoolError::WidthMismatch);
                }
                self.clear(base);
                self.bits_in_use -= 1;
            }
            RegionWidth::Two => {
                if !self.test(base) || !self.test(base + 1) {
                    return Err(PoolError::NotAllocated);
                }
                if !is_wide {
                    return Err(PoolError::WidthMismatch);
                }
                self.clear(base);
                self.clear(base + 1);
                self.wide[base / WORD_BITS] &= !(1u64 << (base % WORD_BITS));
                self.bits_in_use -= 2;
            }
        }
        Ok(())
    }

    /// Whether id `bit` is currently reserved (by either family).
    pub fn is_used(&self, bit: usize) -> bool {
        bit < self.bits && self.test(bit)
    }

    /// Number of reserved bits.
    #[inline]
    pub fn bits_in_use(&self) -> usize {
        self.bits_in_use
    }

    /// Namespace size in bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits
    }

    /// Whether the namespace is empty (zero-sized).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
