//! Cursor-based reader over encoded argument buffers.
//!
//! The [`Parser`] keeps a position into a borrowed byte slice and reads little-endian
//! primitives and raw byte runs from it, with bounds checks on every access.

use crate::{
    io::{read_le_at, ProtoIO},
    Result,
};

/// A bounds-checked cursor over a byte slice.
///
/// # Examples
///
/// ```rust
/// use specreq::io::Parser;
///
/// let data = [0x01, 0x00, 0x00, 0x00, 0xAA, 0xBB];
/// let mut parser = Parser::new(&data);
///
/// assert_eq!(parser.read_le::<u32>()?, 1);
/// assert_eq!(parser.read_bytes(2)?, &[0xAA, 0xBB]);
/// assert!(!parser.has_more_data());
/// # Ok::<(), specreq::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Read a little-endian value and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: ProtoIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;

        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(end)
    }

    /// Read `length` raw bytes from the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `length` bytes would exceed the data.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_reads() {
        let data = [0x2A, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u32>().unwrap(), 42);
        assert_eq!(parser.pos(), 4);
        assert_eq!(parser.read_bytes(3).unwrap(), &[1, 2, 3]);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn bounds() {
        let data = [0u8; 6];
        let mut parser = Parser::new(&data);

        parser.read_bytes(2).unwrap();
        assert!(matches!(
            parser.read_le::<u64>(),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(parser.pos(), 2);

        assert!(parser.read_bytes(usize::MAX).is_err());
        assert!(parser.read_bytes(5).is_err());
        assert_eq!(parser.read_le::<u32>().unwrap(), 0);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn empty() {
        let parser = Parser::new(&[]);
        assert!(!parser.has_more_data());
        assert_eq!(parser.pos(), 0);
    }
}
