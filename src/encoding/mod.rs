//! Argument descriptor encoding for specialization requests.
//!
//! A request's argument buffer is a flat sequence of fixed-size descriptor records, one per
//! positional argument of the target function. The bytes of that buffer form the second half
//! of the request's identity key, so the external specializer and the post-specialization run
//! must produce byte-identical buffers for the same logical intent. Every byte written here is
//! therefore fully determined by the descriptor: unused value bytes and buffer padding are
//! always zero.
//!
//! # Record Layout
//!
//! Each record is [`DESCRIPTOR_SIZE`] bytes, little-endian:
//!
//! ```text
//! offset  size  field
//! 0       4     flags       (ArgFlags, bit 0 = specialize)
//! 4       4     type tag    (ArgType)
//! 8       8     value union (zero-filled, then the value in its low bytes)
//! ```
//!
//! For [`ArgType::Buffer`] the value union holds `len: u32` followed by `padded_len: u32`,
//! and `padded_len` bytes of inline data follow the record: the `len` bytes of the constant
//! memory region, then zero padding up to the next multiple of 8.
//!
//! # Key Components
//!
//! - [`ArgType`] - Type tag stored in every record
//! - [`ArgFlags`] - Flag word stored in every record
//! - [`ArgDescriptor`] - Closed set of argument dispositions
//! - [`ArgWriter`] - Growable, capped buffer that serializes descriptors
//! - [`ArgReader`] - Decoder yielding descriptors back from a buffer
//!
//! # Examples
//!
//! ```rust
//! use specreq::encoding::{ArgDescriptor, ArgWriter, DESCRIPTOR_SIZE};
//!
//! let mut writer = ArgWriter::new();
//! writer.write_descriptor(&ArgDescriptor::I32(42))?;
//! writer.write_descriptor(&ArgDescriptor::Buffer(&[1, 2, 3]))?;
//! writer.write_descriptor(&ArgDescriptor::Runtime)?;
//!
//! let bytes = writer.take();
//! assert_eq!(bytes.len(), 3 * DESCRIPTOR_SIZE + 8);
//! assert!(writer.is_empty());
//! # Ok::<(), specreq::Error>(())
//! ```

mod reader;
mod writer;

pub use reader::ArgReader;
pub use writer::ArgWriter;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter};

use crate::{io::align8, Error, Result};

/// Hard cap on the size of one request's argument buffer (1 MiB).
pub const MAX_ARG_BYTES: usize = 1024 * 1024;

/// Size of one encoded descriptor record in bytes.
pub const DESCRIPTOR_SIZE: usize = 16;

/// Type tag of an encoded argument descriptor.
///
/// The numeric values are part of the wire format shared with the external specializer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, EnumIter, EnumCount)]
#[repr(u32)]
pub enum ArgType {
    /// 32-bit integer, boolean or 32-bit address
    I32 = 0,
    /// 64-bit integer
    I64 = 1,
    /// Single precision float
    F32 = 2,
    /// Double precision float
    F64 = 3,
    /// Constant memory region with inline contents
    Buffer = 4,
    /// Not specialized
    None = 255,
}

impl ArgType {
    /// The tag as stored in the record.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ArgType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(ArgType::I32),
            1 => Ok(ArgType::I64),
            2 => Ok(ArgType::F32),
            3 => Ok(ArgType::F64),
            4 => Ok(ArgType::Buffer),
            255 => Ok(ArgType::None),
            other => Err(Error::InvalidArgType(other)),
        }
    }
}

bitflags! {
    /// Flag word at the start of every descriptor record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ArgFlags: u32 {
        /// The argument is specialized on the recorded value
        const SPECIALIZE = 0x0000_0001;
    }
}

/// The specialization disposition of one positional argument.
///
/// This is the closed set of everything the wire format can express. The typed façade in
/// [`crate::request`] lowers its wrappers onto these variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDescriptor<'a> {
    /// Argument stays a runtime value in the specialized function
    Runtime,
    /// Specialize on a 32-bit value
    I32(u32),
    /// Specialize on a 64-bit value
    I64(u64),
    /// Specialize on a single precision float
    F32(f32),
    /// Specialize on a double precision float
    F64(f64),
    /// Specialize on the current contents of a memory region
    Buffer(&'a [u8]),
}

impl ArgDescriptor<'_> {
    /// Type tag written for this descriptor.
    #[must_use]
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgDescriptor::Runtime => ArgType::None,
            ArgDescriptor::I32(_) => ArgType::I32,
            ArgDescriptor::I64(_) => ArgType::I64,
            ArgDescriptor::F32(_) => ArgType::F32,
            ArgDescriptor::F64(_) => ArgType::F64,
            ArgDescriptor::Buffer(_) => ArgType::Buffer,
        }
    }

    /// Flag word written for this descriptor.
    #[must_use]
    pub fn flags(&self) -> ArgFlags {
        match self {
            ArgDescriptor::Runtime => ArgFlags::empty(),
            _ => ArgFlags::SPECIALIZE,
        }
    }

    /// Returns `true` unless this is [`ArgDescriptor::Runtime`].
    #[must_use]
    pub fn is_specialized(&self) -> bool {
        self.flags().contains(ArgFlags::SPECIALIZE)
    }

    /// Number of bytes this descriptor occupies in an argument buffer, inline data included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            ArgDescriptor::Buffer(data) => DESCRIPTOR_SIZE + align8(data.len()),
            _ => DESCRIPTOR_SIZE,
        }
    }
}

/// Padded length of an inline buffer of `len` bytes: `ceil(len / 8) * 8`.
#[must_use]
pub const fn padded_len(len: u32) -> u32 {
    len.saturating_add(7) & !7
}
