//! Device register access.

/// 32-bit register read/write, with 64-bit access composed from two
/// 32-bit halves for platforms without native 64-bit MMIO.
pub trait Registers {
    /// Read a 32-bit register.
    fn read32(&self, addr: u32) -> u32;

    /// Write a 32-bit register.
    fn write32(&self, addr: u32, val: u32);

    /// Read a 64-bit register as two 32-bit halves, low word first.
    fn read64(&self, addr: u32) -> u64 {
        let lo = self.read32(addr) as u64;
        let hi = self.read32(addr + 4) as u64;
        lo | (hi << 32)
    }

    /// Write a 64-bit register as two 32-bit halves, low word first.
    fn write64(&self, addr: u32, val: u64) {
        self.write32(addr, val as u32);
        self.write32(addr + 4, (val >> 32) as u32);
    }

    /// Re-arm the interrupt for a response queue and return `credits`
    /// processed entries to hardware (doorbell nudge).
    fn rearm_queue_intr(&self, cntxt_id: u16, credits: u16);

    /// Unmask device interrupt sources. Called once the queues exist
    /// and handlers are bound.
    fn intr_enable(&self);

    /// Mask all device interrupt sources. First step of tear-down.
    fn intr_disable(&self);
}
