//! Utility functions for register range calculations.
//!
//! These helpers are useful when implementing a custom [`Port`](crate::client::Port)
//! or a device driver that needs to reason about register ranges and where they
//! land inside the port's fixed-size caches.

use crate::client::{ClientError, port::CACHE_HEADER_LEN};

/// Number of addressable registers on a device.
pub const REGISTER_SPACE: usize = 256;

/// Most registers a single bus transaction can carry.
pub const MAX_REGISTER_COUNT: usize = 26;

/// Calculates the register interval covered by a range.
///
/// Returns `(first, end)` where end is exclusive, or an error if the range is
/// invalid.
///
/// # Arguments
/// * `first_register` - First register of the range
/// * `count` - Number of registers in the range
///
/// # Errors
/// * [`ClientError::ZeroLength`] - if `count` is 0
/// * [`ClientError::TooManyRegisters`] - if `count` exceeds [`MAX_REGISTER_COUNT`]
/// * [`ClientError::RegisterOverflow`] - if the range runs past register 0xFF
///
/// # Example
/// ```
/// use i2c_device_client::client::helpers::register_span;
///
/// assert_eq!(register_span(0x40, 22).unwrap(), (0x40, 0x56));
/// assert!(register_span(0xF0, 20).is_err());
/// ```
pub fn register_span(first_register: u8, count: usize) -> Result<(usize, usize), ClientError> {
    if count == 0 {
        return Err(ClientError::ZeroLength);
    }
    if count > MAX_REGISTER_COUNT {
        return Err(ClientError::TooManyRegisters {
            count,
            max: MAX_REGISTER_COUNT,
        });
    }

    let first = first_register as usize;
    let end = first + count;

    if end > REGISTER_SPACE {
        return Err(ClientError::RegisterOverflow {
            first_register,
            count,
        });
    }

    Ok((first, end))
}

/// Returns true if `[inner_first, inner_first + inner_count)` lies entirely
/// inside `[outer_first, outer_first + outer_count)`.
///
/// An empty inner range is never contained.
pub fn span_contains(
    outer_first: u8,
    outer_count: usize,
    inner_first: u8,
    inner_count: usize,
) -> bool {
    if inner_count == 0 {
        return false;
    }
    let outer_end = outer_first as usize + outer_count;
    let inner_end = inner_first as usize + inner_count;
    outer_first <= inner_first && inner_end <= outer_end
}

/// Calculates the byte offsets in a port cache holding a sub-range of a window.
///
/// `window_first` is the first register whose value sits right after the
/// cache header. Returns `(start, end)` with end exclusive, or an error if the
/// registers were not part of that window.
pub fn cache_span(
    window_first: u8,
    window_count: usize,
    first_register: u8,
    count: usize,
) -> Result<(usize, usize), ClientError> {
    if !span_contains(window_first, window_count, first_register, count) {
        return Err(ClientError::OutOfRange {
            first_register,
            count,
            window_first,
            window_count,
        });
    }
    let start = (first_register - window_first) as usize + CACHE_HEADER_LEN;
    Ok((start, start + count))
}

#[test]
fn register_span_edge_cases() {
    // Zero length
    assert_eq!(register_span(0, 0), Err(ClientError::ZeroLength));

    // Too many for one transaction
    assert_eq!(
        register_span(0, MAX_REGISTER_COUNT + 1),
        Err(ClientError::TooManyRegisters {
            count: MAX_REGISTER_COUNT + 1,
            max: MAX_REGISTER_COUNT
        })
    );

    // Last register of the device
    assert_eq!(register_span(0xFF, 1), Ok((0xFF, 0x100)));

    // Runs past the end
    assert_eq!(
        register_span(0xFF, 2),
        Err(ClientError::RegisterOverflow {
            first_register: 0xFF,
            count: 2
        })
    );

    // Largest transaction
    assert_eq!(register_span(0x10, MAX_REGISTER_COUNT), Ok((0x10, 0x2A)));
}

#[test]
fn span_contains_boundaries() {
    // Exact match
    assert!(span_contains(0x40, 22, 0x40, 22));
    // Interior
    assert!(span_contains(0x40, 22, 0x45, 1));
    // Last register
    assert!(span_contains(0x40, 22, 0x55, 1));
    // One past the end
    assert!(!span_contains(0x40, 22, 0x56, 1));
    // Straddles the start
    assert!(!span_contains(0x40, 22, 0x3F, 2));
    // Straddles the end
    assert!(!span_contains(0x40, 22, 0x54, 3));
    // Empty request
    assert!(!span_contains(0x40, 22, 0x40, 0));
}

#[test]
fn cache_span_accounts_for_header() {
    assert_eq!(cache_span(0x40, 22, 0x40, 4), Ok((4, 8)));
    assert_eq!(cache_span(0x40, 22, 0x45, 1), Ok((9, 10)));
    assert!(matches!(
        cache_span(0x40, 4, 0x44, 1),
        Err(ClientError::OutOfRange { .. })
    ));
}
