use super::macros::{impl_view_common, impl_write_register, impl_write_registers};
use crate::client::{ClientError, ClientResult, helpers::span_contains};

/// Write-only view used to compose a multi-register write payload.
///
/// Handed out by [`I2cDeviceClient::write_with`](crate::client::I2cDeviceClient::write_with);
/// fields are addressed by register number and the view cannot be read back.
#[derive(Debug)]
pub struct RegisterViewMut<'a> {
    first: u8,
    bytes: &'a mut [u8],
}

impl<'a> RegisterViewMut<'a> {
    /// Creates a view whose first byte holds `first_register`.
    #[inline]
    pub fn new(first_register: u8, bytes: &'a mut [u8]) -> Self {
        Self {
            first: first_register,
            bytes,
        }
    }

    /// Copies `src` into consecutive registers starting at `register`.
    pub fn copy_from_slice(&mut self, register: u8, src: &[u8]) -> ClientResult<()> {
        let at = self.offset_of(register, src.len())?;
        self.bytes[at..at + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Sets every register in the view to `value`.
    #[inline]
    pub fn fill(&mut self, value: u8) {
        self.bytes.fill(value);
    }

    impl_view_common!();
    impl_write_registers!();
}
