//! Little-endian primitive reading and writing for CIL instruction streams.
//!
//! CIL operands are stored little-endian regardless of the host platform (ECMA-335 III.1.2).
//! This module provides the [`crate::file::io::CilIO`] trait, implemented for every integer and
//! floating point width an operand can have, and bounds-checked helpers that read a value at a
//! cursor and advance it, or append a value to an output buffer.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Endian-aware conversion between primitives and byte arrays
//! - [`crate::file::io::read_le_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_le`] - Append a value to a growable output buffer
//!
//! # Examples
//!
//! ```rust,ignore
//! use cilgraph::file::io::read_le_at;
//!
//! let data = [0x01, 0x00, 0x00, 0x00, 0xFE];
//! let mut offset = 0;
//! let value: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!(value, 1);
//! assert_eq!(offset, 4);
//! ```

use crate::Result;

/// Trait for implementing type-specific safe binary data reading operations.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
///
/// # Thread Safety
///
/// All implementations of [`CilIO`] are thread-safe as they only work with primitive types
/// and perform pure conversion operations without any shared state modification.
pub trait CilIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// The offset is only advanced if the read succeeds.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Appends `value` in little-endian byte order to `buffer`.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}
