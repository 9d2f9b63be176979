//! Little-endian primitive reading and writing for the request wire format.
//!
//! Every structure exchanged with the external specializer (argument descriptors, request
//! records, lookup entries) is laid out in the guest's linear memory, which is always
//! little-endian. This module provides the bounds-checked primitives the rest of the crate
//! uses to produce and consume those bytes, so that encodings are identical on every host
//! regardless of its native byte order.
//!
//! # Key Components
//!
//! - [`ProtoIO`] - Trait mapping a primitive to its fixed-size little-endian byte array
//! - [`read_le`] / [`read_le_at`] - Bounds-checked reads, optionally advancing an offset
//! - [`write_le`] / [`write_le_at`] - Bounds-checked writes, optionally advancing an offset
//! - [`Parser`] - Cursor over a byte slice built on the functions above
//! - [`Physical`] - Memory-mapped file backend for guest image dumps
//!
//! # Examples
//!
//! ```rust
//! use specreq::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 8];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 7u32)?;
//! write_le_at(&mut data, &mut offset, 42u32)?;
//! assert_eq!(data, [7, 0, 0, 0, 42, 0, 0, 0]);
//!
//! offset = 0;
//! let first: u32 = read_le_at(&data, &mut offset)?;
//! assert_eq!(first, 7);
//! # Ok::<(), specreq::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] when the buffer is too small for the
//! requested operation; no partial reads or writes are performed.

mod parser;
mod physical;

pub use parser::Parser;
pub use physical::Physical;

use crate::Result;

/// Primitive types that have a fixed little-endian representation in the wire format.
///
/// Implemented for the integer and floating point widths that appear in argument
/// descriptors and guest records.
pub trait ProtoIO: Sized + Copy {
    /// Fixed-size byte array holding the encoded value
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encode to little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_proto_io {
    ($($ty:ty),*) => {
        $(
            impl ProtoIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

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

impl_proto_io!(u8, u16, u32, u64, i32, i64, f32, f64);

/// Read a value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: ProtoIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a value at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: ProtoIO>(data: &[u8], offset: &mut usize) -> Result<T> {
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

/// Write a value to the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn write_le<T: ProtoIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Write a value at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn write_le_at<T: ProtoIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;

    Ok(())
}

/// Round `len` up to the next multiple of 8.
///
/// Used for inline buffer padding and for record placement in guest images.
#[must_use]
pub const fn align8(len: usize) -> usize {
    (len + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn read_le_u32() {
        let data = [0x78, 0x56, 0x34, 0x12, 0xFF];
        let value: u32 = read_le(&data).unwrap();
        assert_eq!(value, 0x12345678);
    }

    #[test]
    fn read_le_at_sequential() {
        let data = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut offset = 0;

        let first: u32 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(offset, 4);
        let second: u64 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(offset, 12);

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn write_le_floats() {
        let mut buffer = [0u8; 4];
        write_le(&mut buffer, 1.0f32).unwrap();
        assert_eq!(buffer, [0x00, 0x00, 0x80, 0x3F]);

        let mut buffer = [0u8; 8];
        write_le(&mut buffer, 1.0f64).unwrap();
        assert_eq!(buffer, [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F]);
    }

    #[test]
    fn write_le_at_sequential() {
        let mut buffer = [0u8; 8];
        let mut offset = 0;

        write_le_at(&mut buffer, &mut offset, 0x1234u16).unwrap();
        write_le_at(&mut buffer, &mut offset, 0x5678u16).unwrap();
        write_le_at(&mut buffer, &mut offset, 0xABCDu32).unwrap();
        assert_eq!(offset, 8);

        assert_eq!(buffer, [0x34, 0x12, 0x78, 0x56, 0xCD, 0xAB, 0x00, 0x00]);
    }

    #[test]
    fn bounds() {
        let mut buffer = [0u8; 2];
        assert!(matches!(
            write_le(&mut buffer, 0x12345678u32),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(buffer, [0, 0]);

        let mut offset = usize::MAX - 1;
        assert!(matches!(
            read_le_at::<u32>(&buffer, &mut offset),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, usize::MAX - 1);
    }

    #[test]
    fn align() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }
}
