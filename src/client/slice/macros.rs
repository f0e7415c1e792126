/// Generates read method(s) for a single primitive type.
macro_rules! impl_read_register {
    // Single byte types - no endianness suffix
    (u8) => {
        /// Reads the `u8` held in `register`.
        #[inline]
        pub fn read_u8(&self, register: u8) -> ClientResult<u8> {
            let at = self.offset_of(register, 1)?;
            Ok(self.bytes[at])
        }
    };
    (i8) => {
        /// Reads the `i8` held in `register`.
        #[inline]
        pub fn read_i8(&self, register: u8) -> ClientResult<i8> {
            let at = self.offset_of(register, 1)?;
            Ok(self.bytes[at] as i8)
        }
    };
    // Multi-byte types - le/be variants
    ($type:ty, $size:literal) => {
        paste::paste! {
            #[doc = "Reads a little-endian `" $type "` starting at `register`."]
            #[doc = ""]
            #[doc = "Fails with [`ClientError::OutOfRange`](crate::client::ClientError::OutOfRange)"]
            #[doc = "unless all " $size " registers lie inside the view."]
            #[inline]
            pub fn [<read_ $type _le>](&self, register: u8) -> ClientResult<$type> {
                let at = self.offset_of(register, $size)?;
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&self.bytes[at..at + $size]);
                Ok(<$type>::from_le_bytes(raw))
            }

            #[doc = "Reads a big-endian `" $type "` starting at `register`."]
            #[doc = ""]
            #[doc = "Fails with [`ClientError::OutOfRange`](crate::client::ClientError::OutOfRange)"]
            #[doc = "unless all " $size " registers lie inside the view."]
            #[inline]
            pub fn [<read_ $type _be>](&self, register: u8) -> ClientResult<$type> {
                let at = self.offset_of(register, $size)?;
                let mut raw = [0u8; $size];
                raw.copy_from_slice(&self.bytes[at..at + $size]);
                Ok(<$type>::from_be_bytes(raw))
            }
        }
    };
}

/// Generates read methods for all standard primitive types.
macro_rules! impl_read_registers {
    () => {
        impl_read_register!(u8);
        impl_read_register!(i8);
        impl_read_register!(u16, 2);
        impl_read_register!(i16, 2);
        impl_read_register!(u32, 4);
        impl_read_register!(i32, 4);
    };
}

/// Generates write method(s) for a single primitive type.
macro_rules! impl_write_register {
    (u8) => {
        /// Stores a `u8` into `register`.
        #[inline]
        pub fn write_u8(&mut self, register: u8, value: u8) -> ClientResult<()> {
            let at = self.offset_of(register, 1)?;
            self.bytes[at] = value;
            Ok(())
        }
    };
    (i8) => {
        /// Stores an `i8` into `register`.
        #[inline]
        pub fn write_i8(&mut self, register: u8, value: i8) -> ClientResult<()> {
            let at = self.offset_of(register, 1)?;
            self.bytes[at] = value as u8;
            Ok(())
        }
    };
    ($type:ty, $size:literal) => {
        paste::paste! {
            #[doc = "Stores a little-endian `" $type "` starting at `register`."]
            #[inline]
            pub fn [<write_ $type _le>](&mut self, register: u8, value: $type) -> ClientResult<()> {
                let at = self.offset_of(register, $size)?;
                self.bytes[at..at + $size].copy_from_slice(&value.to_le_bytes());
                Ok(())
            }

            #[doc = "Stores a big-endian `" $type "` starting at `register`."]
            #[inline]
            pub fn [<write_ $type _be>](&mut self, register: u8, value: $type) -> ClientResult<()> {
                let at = self.offset_of(register, $size)?;
                self.bytes[at..at + $size].copy_from_slice(&value.to_be_bytes());
                Ok(())
            }
        }
    };
}

/// Generates write methods for all standard primitive types.
macro_rules! impl_write_registers {
    () => {
        impl_write_register!(u8);
        impl_write_register!(i8);
        impl_write_register!(u16, 2);
        impl_write_register!(i16, 2);
        impl_write_register!(u32, 4);
        impl_write_register!(i32, 4);
    };
}

/// Generates the addressing methods shared by every register view.
macro_rules! impl_view_common {
    () => {
        /// First register held by the view.
        #[inline]
        pub fn first_register(&self) -> u8 {
            self.first
        }

        /// Number of registers held by the view.
        #[inline]
        pub fn len(&self) -> usize {
            self.bytes.len()
        }

        /// Returns true if the view holds no registers.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.bytes.is_empty()
        }

        /// Returns true if all of `[register, register + count)` lies inside the view.
        #[inline]
        pub fn covers(&self, register: u8, count: usize) -> bool {
            span_contains(self.first, self.bytes.len(), register, count)
        }

        fn offset_of(&self, register: u8, count: usize) -> ClientResult<usize> {
            if !self.covers(register, count) {
                return Err(ClientError::OutOfRange {
                    first_register: register,
                    count,
                    window_first: self.first,
                    window_count: self.bytes.len(),
                });
            }
            Ok((register - self.first) as usize)
        }
    };
}

pub(super) use impl_read_register;
pub(super) use impl_read_registers;
pub(super) use impl_view_common;
pub(super) use impl_write_register;
pub(super) use impl_write_registers;
