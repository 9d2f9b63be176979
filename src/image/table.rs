//! Lookup table in guest memory.

use crate::{
    image::{
        guest_address, guest_offset, guest_slice, FuncTable, LOOKUP_ENTRY_SIZE,
        LOOKUP_HEADER_SIZE,
    },
    io::{align8, read_le_at, write_le_at},
    lookup::{LookupEntry, LookupTable},
    FuncRef, Result,
};

/// A lookup table laid out for a guest image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImage {
    bytes: Vec<u8>,
    base: u32,
}

impl TableImage {
    /// The image bytes, to be placed at [`TableImage::base`].
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Guest address of the first byte.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Guest address of the table header.
    #[must_use]
    pub fn header(&self) -> u32 {
        self.base
    }
}

/// Lay out `table` at guest address `base`: the header, the entry array, then every entry's
/// argument buffer 8-byte aligned. An empty table has a null entry pointer.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the image would not fit the 32-bit address space or
/// `funcs` cannot index a function.
pub fn write_lookup_table(
    table: &LookupTable,
    base: u32,
    funcs: &mut impl FuncTable,
) -> Result<TableImage> {
    let entries_start = LOOKUP_HEADER_SIZE;
    let mut size = entries_start + table.len() * LOOKUP_ENTRY_SIZE;
    let mut buffers = Vec::with_capacity(table.len());
    for entry in table {
        buffers.push(size);
        size += align8(entry.args().len());
    }
    guest_address(base, size)?;

    let count = u32::try_from(table.len())
        .map_err(|_| malformed_error!("Lookup table of {} entries", table.len()))?;
    let entries = if table.is_empty() {
        0
    } else {
        guest_address(base, entries_start)?
    };

    let mut bytes = vec![0u8; size];
    let mut offset = 0;
    write_le_at(&mut bytes, &mut offset, entries)?;
    write_le_at(&mut bytes, &mut offset, count)?;

    for (entry, &data) in table.iter().zip(&buffers) {
        let args = entry.args();
        let argbuf = if args.is_empty() {
            0
        } else {
            guest_address(base, data)?
        };
        let arglen = u32::try_from(args.len())
            .map_err(|_| malformed_error!("Argument buffer of {} bytes", args.len()))?;

        write_le_at(&mut bytes, &mut offset, entry.func_id())?;
        write_le_at(&mut bytes, &mut offset, argbuf)?;
        write_le_at(&mut bytes, &mut offset, arglen)?;
        write_le_at(&mut bytes, &mut offset, funcs.index_of(entry.specialized())?)?;

        bytes[data..data + args.len()].copy_from_slice(args);
    }

    Ok(TableImage { bytes, base })
}

/// Decode the lookup table whose header sits at guest address `table_addr`.
///
/// Entry functions are returned as [`FuncRef`]s holding the raw table index.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] for addresses outside the image,
/// [`crate::Error::Malformed`] for an entry with a null function and
/// [`crate::Error::UnsortedTable`] if the entries are not strictly sorted.
pub fn read_lookup_table(image: &[u8], base: u32, table_addr: u32) -> Result<LookupTable> {
    let mut offset = guest_offset(base, table_addr)?;
    let entries = read_le_at::<u32>(image, &mut offset)?;
    let count = read_le_at::<u32>(image, &mut offset)?;
    if count == 0 {
        return Ok(LookupTable::empty());
    }

    // Bounds-check the whole array before trusting the count.
    let array_len = count
        .checked_mul(LOOKUP_ENTRY_SIZE as u32)
        .ok_or(out_of_bounds_error!())?;
    let array = guest_slice(image, base, entries, array_len)?;

    let mut decoded = Vec::with_capacity(count as usize);
    let mut offset = 0;
    for index in 0..count {
        let func_id = read_le_at::<u32>(array, &mut offset)?;
        let argbuf = read_le_at::<u32>(array, &mut offset)?;
        let arglen = read_le_at::<u32>(array, &mut offset)?;
        let specialized = read_le_at::<u32>(array, &mut offset)?;

        let Some(specialized) = FuncRef::new(specialized as usize) else {
            return Err(malformed_error!(
                "Lookup entry {} has a null specialized function",
                index
            ));
        };
        let args = if arglen == 0 {
            Vec::new()
        } else {
            guest_slice(image, base, argbuf, arglen)?.to_vec()
        };

        decoded.push(LookupEntry::new(func_id, args, specialized));
    }

    LookupTable::new(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::{DirectFuncs, FuncIndex},
        io::write_le,
        Error,
    };

    fn func(raw: usize) -> FuncRef {
        FuncRef::new(raw).unwrap()
    }

    fn sample() -> LookupTable {
        LookupTable::from_unsorted(vec![
            LookupEntry::new(4, vec![1, 2, 3], func(10)),
            LookupEntry::new(4, vec![1, 2], func(11)),
            LookupEntry::new(1, vec![], func(12)),
            LookupEntry::new(9, vec![0xFF; 17], func(10)),
        ])
        .unwrap()
    }

    #[test]
    fn layout() {
        let image = write_lookup_table(&sample(), 0x800, &mut DirectFuncs).unwrap();
        let bytes = image.bytes();

        // Header points right behind itself.
        assert_eq!(&bytes[0..8], &[0x08, 0x08, 0, 0, 4, 0, 0, 0]);
        // First entry is the smallest key: function 1 without arguments.
        assert_eq!(&bytes[8..24], &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 12, 0, 0, 0]);
        assert_eq!(bytes.len(), 8 + 4 * 16 + 8 + 8 + 24);
    }

    #[test]
    fn entry_argument_fields() {
        let image = write_lookup_table(&sample(), 0x800, &mut DirectFuncs).unwrap();
        let bytes = image.bytes();

        let fields: Vec<(u32, u32)> = (0..4)
            .map(|index| {
                let mut offset = 8 + index * 16 + 4;
                let argbuf = read_le_at::<u32>(bytes, &mut offset).unwrap();
                let arglen = read_le_at::<u32>(bytes, &mut offset).unwrap();
                (argbuf, arglen)
            })
            .collect();
        assert_eq!(fields, [(0, 0), (0x848, 2), (0x850, 3), (0x858, 17)]);
    }

    #[test]
    fn write_then_read() {
        let table = sample();
        let image = write_lookup_table(&table, 0x800, &mut DirectFuncs).unwrap();
        let read = read_lookup_table(image.bytes(), image.base(), image.header()).unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn renumbered_functions() {
        let table = sample();
        let mut funcs = FuncIndex::new();
        let image = write_lookup_table(&table, 0x20, &mut funcs).unwrap();
        let read = read_lookup_table(image.bytes(), 0x20, 0x20).unwrap();

        for (original, decoded) in table.iter().zip(&read) {
            assert_eq!(original.key(), decoded.key());
            assert_eq!(
                funcs.get(decoded.specialized().get() as u32),
                Some(original.specialized())
            );
        }
    }

    #[test]
    fn empty_table() {
        let image = write_lookup_table(&LookupTable::empty(), 0x40, &mut DirectFuncs).unwrap();
        assert_eq!(image.bytes(), &[0; 8]);
        assert!(read_lookup_table(image.bytes(), 0x40, 0x40)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejects_damaged_tables() {
        let image = write_lookup_table(&sample(), 0x800, &mut DirectFuncs).unwrap();

        let mut unsorted = image.bytes().to_vec();
        write_le(&mut unsorted[8..], 99u32).unwrap();
        assert!(matches!(
            read_lookup_table(&unsorted, 0x800, 0x800),
            Err(Error::UnsortedTable { index: 1 })
        ));

        let mut null = image.bytes().to_vec();
        write_le(&mut null[8 + 12..], 0u32).unwrap();
        assert!(matches!(
            read_lookup_table(&null, 0x800, 0x800),
            Err(Error::Malformed { .. })
        ));

        let mut huge = image.bytes().to_vec();
        write_le(&mut huge[4..], u32::MAX).unwrap();
        assert!(matches!(
            read_lookup_table(&huge, 0x800, 0x800),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
