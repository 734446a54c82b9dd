//! Wraparound-aware comparison of 32-bit TCP sequence numbers.

use std::cmp::Ordering;

/// Distance from either end of the sequence space within which two values
/// are treated as having wrapped.
pub const SEQ_WINDOW: u32 = 0xFFFF;

/// Compare two sequence numbers on the 32-bit ring.
///
/// `Less` means `a` comes before `b`. Values more than half the ring apart
/// have no meaningful order.
#[inline]
pub fn compare(a: u32, b: u32) -> Ordering {
    compare_with_window(a, b, SEQ_WINDOW)
}

#[inline]
pub fn compare_with_window(a: u32, b: u32, window: u32) -> Ordering {
    if a < window && b > u32::MAX - window {
        Ordering::Greater
    } else if b < window && a > u32::MAX - window {
        Ordering::Less
    } else {
        (a.wrapping_sub(b) as i32).cmp(&0)
    }
}

/// Number of sequence positions from `from` forward to `to`.
#[inline]
pub fn distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}
