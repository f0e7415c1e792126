use super::macros::{impl_read_register, impl_read_registers, impl_view_common};
use crate::client::{ClientError, ClientResult, helpers::span_contains};

/// Read-only view over a run of register values.
///
/// Accessors take device register numbers, not byte offsets, so a caller can
/// pull fields straight out of a window snapshot using the device's register
/// map.
#[derive(Debug, Clone, Copy)]
pub struct RegisterView<'a> {
    first: u8,
    bytes: &'a [u8],
}

impl<'a> RegisterView<'a> {
    /// Creates a view whose first byte holds `first_register`.
    #[inline]
    pub fn new(first_register: u8, bytes: &'a [u8]) -> Self {
        Self {
            first: first_register,
            bytes,
        }
    }

    /// Raw register values.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Copies `dest.len()` register values starting at `register`.
    pub fn copy_to_slice(&self, register: u8, dest: &mut [u8]) -> ClientResult<()> {
        let at = self.offset_of(register, dest.len())?;
        dest.copy_from_slice(&self.bytes[at..at + dest.len()]);
        Ok(())
    }

    impl_view_common!();
    impl_read_registers!();
}
