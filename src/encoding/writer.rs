//! Growable, capped serialization buffer for argument descriptors.

use log::trace;

use crate::{
    config::RuntimeConfig,
    encoding::{padded_len, ArgDescriptor, DESCRIPTOR_SIZE, MAX_ARG_BYTES},
    io::{write_le_at, ProtoIO},
    Error, Result,
};

/// Serializes [`ArgDescriptor`]s into a flat byte buffer.
///
/// The buffer grows geometrically: the first growth reserves `initial_capacity` bytes and
/// every later growth doubles the capacity until the request fits. The total length can never
/// exceed the configured limit (at most [`MAX_ARG_BYTES`]). A call that would cross the limit
/// fails without touching the buffer, so the writer keeps exactly the bytes of every earlier
/// successful call.
///
/// # Examples
///
/// ```rust
/// use specreq::encoding::{ArgDescriptor, ArgWriter};
///
/// let mut writer = ArgWriter::new();
/// writer.write_descriptor(&ArgDescriptor::I64(u64::MAX))?;
/// assert_eq!(writer.len(), 16);
///
/// let bytes = writer.take();
/// assert_eq!(&bytes[4..8], &[1, 0, 0, 0]); // ArgType::I64
/// # Ok::<(), specreq::Error>(())
/// ```
#[derive(Debug)]
pub struct ArgWriter {
    buffer: Vec<u8>,
    limit: usize,
    initial_capacity: usize,
}

impl Default for ArgWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgWriter {
    /// Creates an empty writer with the default 1 MiB cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    /// Creates an empty writer using the limits of `config`.
    #[must_use]
    pub fn with_config(config: &RuntimeConfig) -> Self {
        ArgWriter {
            buffer: Vec::new(),
            limit: config.arg_limit(),
            initial_capacity: config.initial_capacity.max(1),
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Currently reserved capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// The cap this writer enforces.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserve `bytes` zeroed bytes at the end of the buffer and return them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the buffer would exceed its limit and
    /// [`Error::AllocationFailed`] if growing the buffer fails. In both cases the buffer is
    /// left unchanged.
    pub fn allocate(&mut self, bytes: usize) -> Result<&mut [u8]> {
        let start = self.buffer.len();
        let end = self.check_fits(bytes)?;

        if end > self.buffer.capacity() {
            let mut desired = if self.buffer.capacity() == 0 {
                self.initial_capacity
            } else {
                self.buffer.capacity()
            };
            while desired < end {
                desired = desired.saturating_mul(2);
            }
            self.buffer.try_reserve_exact(desired - start)?;
        }

        self.buffer.resize(end, 0);
        Ok(&mut self.buffer[start..end])
    }

    /// Append a little-endian primitive.
    ///
    /// # Errors
    /// See [`ArgWriter::allocate`].
    pub fn write<T: ProtoIO>(&mut self, value: T) -> Result<()> {
        let mem = self.allocate(std::mem::size_of::<T>())?;
        let mut offset = 0;
        write_le_at(mem, &mut offset, value)
    }

    /// Append one descriptor record, followed by its inline data for buffers.
    ///
    /// The record and its data are reserved in a single allocation, so a failing call never
    /// leaves a dangling record without its data.
    ///
    /// # Errors
    /// See [`ArgWriter::allocate`].
    pub fn write_descriptor(&mut self, descriptor: &ArgDescriptor<'_>) -> Result<()> {
        let inline_len = match *descriptor {
            ArgDescriptor::Buffer(data) => {
                Some(u32::try_from(data.len()).map_err(|_| Error::CapacityExceeded {
                    requested: data.len(),
                    limit: self.limit,
                })?)
            }
            _ => None,
        };

        trace!(
            "encoding {:?} at offset {}",
            descriptor.arg_type(),
            self.buffer.len()
        );

        let mem = self.allocate(descriptor.encoded_len())?;
        let (record, inline) = mem.split_at_mut(DESCRIPTOR_SIZE);
        let mut offset = 0;
        write_le_at(record, &mut offset, descriptor.flags().bits())?;
        write_le_at(record, &mut offset, descriptor.arg_type().as_u32())?;

        // The value union and the padding were zero-filled by `allocate`.
        match *descriptor {
            ArgDescriptor::Runtime => {}
            ArgDescriptor::I32(value) => write_le_at(record, &mut offset, value)?,
            ArgDescriptor::I64(value) => write_le_at(record, &mut offset, value)?,
            ArgDescriptor::F32(value) => write_le_at(record, &mut offset, value)?,
            ArgDescriptor::F64(value) => write_le_at(record, &mut offset, value)?,
            ArgDescriptor::Buffer(data) => {
                let len = inline_len.unwrap_or_default();
                write_le_at(record, &mut offset, len)?;
                write_le_at(record, &mut offset, padded_len(len))?;
                inline[..data.len()].copy_from_slice(data);
            }
        }

        Ok(())
    }

    /// Move the accumulated bytes out, leaving the writer empty with no capacity.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn check_fits(&self, bytes: usize) -> Result<usize> {
        match self.buffer.len().checked_add(bytes) {
            Some(end) if end <= self.limit => Ok(end),
            _ => Err(Error::CapacityExceeded {
                requested: self.buffer.len().saturating_add(bytes),
                limit: self.limit,
            }),
        }
    }
}
