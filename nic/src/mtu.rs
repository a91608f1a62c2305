//! Hardware MTU table lookup.

/// Number of entries in the hardware MTU table.
pub const NMTUS: usize = 16;

/// Default MTU table programmed into firmware.
pub const DEFAULT_MTUS: [u16; NMTUS] = [
    88, 256, 512, 576, 808, 1024, 1280, 1488, 1500, 2002, 2048, 4096, 4352, 8192, 9000, 9600,
];

/// Find the MTU table entry closest to `mtu` without exceeding it.
///
/// Returns the value and its index. If `mtu` is smaller than every entry,
/// the smallest tabulated value is selected. `mtus` must be non-empty;
/// device MTU tables always carry [`NMTUS`] entries.
pub fn best_mtu(mtus: &[u16], mtu: u16) -> (u16, usize) {
    let mut i = 0;
    while i < mtus.len() - 1 && mtus[i + 1] <= mtu {
        i += 1;
    }
    (mtus[i], i)
}
