//! Typed register accessors on the client.
//!
//! Each accessor is one blocking read or write of the value's width, so a
//! multi-byte value is always captured by a single bus transaction.

use crate::client::{ClientResult, I2cDeviceClient, Port};

macro_rules! impl_typed_register {
    ($type:ty, $size:literal) => {
        paste::paste! {
            #[doc = "Reads a little-endian `" $type "` from " $size " registers starting at `register`."]
            pub fn [<read_ $type _le>](&self, register: u8) -> ClientResult<$type> {
                self.read_timestamped(register, $size)?
                    .view()
                    .[<read_ $type _le>](register)
            }

            #[doc = "Reads a big-endian `" $type "` from " $size " registers starting at `register`."]
            pub fn [<read_ $type _be>](&self, register: u8) -> ClientResult<$type> {
                self.read_timestamped(register, $size)?
                    .view()
                    .[<read_ $type _be>](register)
            }

            #[doc = "Writes a little-endian `" $type "` to " $size " registers starting at `register`."]
            pub fn [<write_ $type _le>](
                &self,
                register: u8,
                value: $type,
                wait: bool,
            ) -> ClientResult<()> {
                self.write(register, &value.to_le_bytes(), wait)
            }

            #[doc = "Writes a big-endian `" $type "` to " $size " registers starting at `register`."]
            pub fn [<write_ $type _be>](
                &self,
                register: u8,
                value: $type,
                wait: bool,
            ) -> ClientResult<()> {
                self.write(register, &value.to_be_bytes(), wait)
            }
        }
    };
}

impl<P: Port> I2cDeviceClient<P> {
    /// Reads one register as an `i8`.
    pub fn read_i8(&self, register: u8) -> ClientResult<i8> {
        self.read8(register).map(|value| value as i8)
    }

    /// Writes an `i8` to one register.
    pub fn write_i8(&self, register: u8, value: i8, wait: bool) -> ClientResult<()> {
        self.write8(register, value as u8, wait)
    }

    impl_typed_register!(u16, 2);
    impl_typed_register!(i16, 2);
    impl_typed_register!(u32, 4);
    impl_typed_register!(i32, 4);
}
