//! Decoder for encoded argument buffers.

use crate::{
    encoding::{padded_len, ArgDescriptor, ArgFlags, ArgType},
    io::Parser,
    Result,
};

/// Iterates the descriptors of an encoded argument buffer.
///
/// Decoding is strict: it rejects anything [`crate::encoding::ArgWriter`] would never
/// produce, including non-zero bytes in unused parts of the value union and non-zero
/// padding after inline buffer data. After the first error the iterator is exhausted.
///
/// # Examples
///
/// ```rust
/// use specreq::encoding::{ArgDescriptor, ArgReader, ArgWriter};
///
/// let mut writer = ArgWriter::new();
/// writer.write_descriptor(&ArgDescriptor::I32(42))?;
/// writer.write_descriptor(&ArgDescriptor::Runtime)?;
/// let bytes = writer.take();
///
/// let args = ArgReader::new(&bytes).collect::<specreq::Result<Vec<_>>>()?;
/// assert_eq!(args, [ArgDescriptor::I32(42), ArgDescriptor::Runtime]);
/// # Ok::<(), specreq::Error>(())
/// ```
pub struct ArgReader<'a> {
    parser: Parser<'a>,
    failed: bool,
}

impl<'a> ArgReader<'a> {
    /// Creates a reader over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        ArgReader {
            parser: Parser::new(data),
            failed: false,
        }
    }

    /// Decode every descriptor in `data`.
    ///
    /// # Errors
    /// Returns the first decoding error encountered.
    pub fn decode_all(data: &'a [u8]) -> Result<Vec<ArgDescriptor<'a>>> {
        ArgReader::new(data).collect()
    }

    fn read_descriptor(&mut self) -> Result<ArgDescriptor<'a>> {
        let start = self.parser.pos();
        let flags = self.parser.read_le::<u32>()?;
        let ty = ArgType::try_from(self.parser.read_le::<u32>()?)?;

        let Some(flags) = ArgFlags::from_bits(flags) else {
            return Err(malformed_error!(
                "Unknown flag bits {:#x} in descriptor at offset {}",
                flags,
                start
            ));
        };
        if flags.contains(ArgFlags::SPECIALIZE) == (ty == ArgType::None) {
            return Err(malformed_error!(
                "Descriptor at offset {} has type {:?} but flags {:?}",
                start,
                ty,
                flags
            ));
        }

        let low = self.parser.read_le::<u32>()?;
        let high = self.parser.read_le::<u32>()?;
        let narrow = matches!(ty, ArgType::I32 | ArgType::F32 | ArgType::None);
        if (narrow && high != 0) || (ty == ArgType::None && low != 0) {
            return Err(malformed_error!(
                "Descriptor at offset {} has non-zero unused value bytes",
                start
            ));
        }

        let raw = u64::from(low) | (u64::from(high) << 32);
        Ok(match ty {
            ArgType::None => ArgDescriptor::Runtime,
            ArgType::I32 => ArgDescriptor::I32(low),
            ArgType::I64 => ArgDescriptor::I64(raw),
            ArgType::F32 => ArgDescriptor::F32(f32::from_bits(low)),
            ArgType::F64 => ArgDescriptor::F64(f64::from_bits(raw)),
            ArgType::Buffer => {
                if high != padded_len(low) || high < low {
                    return Err(malformed_error!(
                        "Buffer at offset {} has length {} but padded length {}",
                        start,
                        low,
                        high
                    ));
                }
                let inline = self.parser.read_bytes(high as usize)?;
                let (data, padding) = inline.split_at(low as usize);
                if padding.iter().any(|&byte| byte != 0) {
                    return Err(malformed_error!(
                        "Buffer at offset {} has non-zero padding",
                        start
                    ));
                }
                ArgDescriptor::Buffer(data)
            }
        })
    }
}

impl<'a> Iterator for ArgReader<'a> {
    type Item = Result<ArgDescriptor<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.parser.has_more_data() {
            return None;
        }

        let result = self.read_descriptor();
        self.failed = result.is_err();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoding::ArgWriter, Error};

    fn encode(args: &[ArgDescriptor<'_>]) -> Vec<u8> {
        let mut writer = ArgWriter::new();
        for arg in args {
            writer.write_descriptor(arg).unwrap();
        }
        writer.take()
    }

    #[test]
    fn decodes_mixed_sequence() {
        let region = [9u8; 13];
        let args = [
            ArgDescriptor::I64(0x0123_4567_89AB_CDEF),
            ArgDescriptor::Buffer(&region),
            ArgDescriptor::F64(-2.5),
            ArgDescriptor::Buffer(&[]),
            ArgDescriptor::Runtime,
        ];
        let bytes = encode(&args);

        assert_eq!(ArgReader::decode_all(&bytes).unwrap(), args);
    }

    #[test]
    fn rejects_dirty_padding() {
        let mut bytes = encode(&[ArgDescriptor::Buffer(&[1, 2, 3])]);
        bytes[20] = 0xFF;

        assert!(matches!(
            ArgReader::decode_all(&bytes),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_dirty_union() {
        let mut bytes = encode(&[ArgDescriptor::I32(1)]);
        bytes[15] = 1;
        assert!(ArgReader::decode_all(&bytes).is_err());

        let mut bytes = encode(&[ArgDescriptor::Runtime]);
        bytes[8] = 1;
        assert!(ArgReader::decode_all(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_tags_and_flags() {
        let mut bytes = encode(&[ArgDescriptor::I32(1)]);
        bytes[4] = 7;
        assert!(matches!(
            ArgReader::decode_all(&bytes),
            Err(Error::InvalidArgType(7))
        ));

        let mut bytes = encode(&[ArgDescriptor::Runtime]);
        bytes[0] = 1;
        assert!(ArgReader::decode_all(&bytes).is_err());
    }

    #[test]
    fn truncated_input() {
        let bytes = encode(&[ArgDescriptor::Buffer(&[1, 2, 3])]);
        let mut reader = ArgReader::new(&bytes[..20]);
        assert!(matches!(reader.next(), Some(Err(Error::OutOfBounds { .. }))));
        assert!(reader.next().is_none());
    }
}
