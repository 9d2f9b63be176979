//! Guest memory layout of the protocol state.
//!
//! The external specializer does not call into the program. It reads the pending request
//! list out of a memory snapshot and patches a sorted lookup table back into the image. Both
//! sides therefore agree on a fixed layout of 32-bit little-endian records in linear memory,
//! where every pointer is a guest address and `0` is null.
//!
//! # Record Layouts
//!
//! ```text
//! request record (28 bytes)       lookup header (8 bytes)    lookup entry (16 bytes)
//! 0   next         u32            0  entries   u32           0   func_id      u32
//! 4   prev         u32            4  nentries  u32           4   argbuf       u32
//! 8   func_id      u32                                       8   arglen       u32
//! 12  func         u32                                       12  specialized  u32
//! 16  argbuf       u32
//! 20  arglen       u32
//! 24  specialized  u32 (address of the destination slot)
//! ```
//!
//! Function references are 32-bit function table indices. A [`FuncTable`] maps host-side
//! [`FuncRef`]s onto them: [`DirectFuncs`] on `wasm32`, where a `FuncRef` already is the
//! table index, and [`FuncIndex`] wherever references have to be renumbered.
//!
//! # Key Components
//!
//! - [`write_pending`] / [`read_pending`] - The pending request list
//! - [`write_lookup_table`] / [`read_lookup_table`] - The lookup table
//! - [`GuestImage`] - Memory-mapped image dump for the readers

mod pending;
mod table;

pub use pending::{read_pending, write_pending, PendingImage, PendingRecord};
pub use table::{read_lookup_table, write_lookup_table, TableImage};

use std::path::Path;

use crate::{io::Physical, lookup::LookupTable, FuncRef, Result};

/// Size of a request record.
pub const REQUEST_RECORD_SIZE: usize = 28;

/// Size of the lookup table header.
pub const LOOKUP_HEADER_SIZE: usize = 8;

/// Size of a lookup entry.
pub const LOOKUP_ENTRY_SIZE: usize = 16;

/// Assigns guest function table indices to function references.
pub trait FuncTable {
    /// The guest index of `func`.
    ///
    /// # Errors
    /// Returns an error if `func` has no 32-bit index.
    fn index_of(&mut self, func: FuncRef) -> Result<u32>;
}

/// Uses the reference itself as the table index.
///
/// This is the mapping of a `wasm32` guest, where function pointers are table indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectFuncs;

impl FuncTable for DirectFuncs {
    fn index_of(&mut self, func: FuncRef) -> Result<u32> {
        u32::try_from(func.get()).map_err(|_| {
            malformed_error!(
                "Function reference {} does not fit a 32-bit table index",
                func
            )
        })
    }
}

/// Numbers function references densely from 1, in order of first use.
#[derive(Debug, Clone, Default)]
pub struct FuncIndex {
    funcs: Vec<FuncRef>,
}

impl FuncIndex {
    /// An empty numbering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference that was assigned `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<FuncRef> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.funcs.get(position).copied()
    }

    /// Number of distinct references seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Returns `true` if no reference has been numbered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl FuncTable for FuncIndex {
    fn index_of(&mut self, func: FuncRef) -> Result<u32> {
        let position = match self.funcs.iter().position(|&known| known == func) {
            Some(position) => position,
            None => {
                self.funcs.push(func);
                self.funcs.len() - 1
            }
        };

        u32::try_from(position + 1)
            .map_err(|_| malformed_error!("Function table exceeds 32-bit indices"))
    }
}

/// Guest address of `offset` bytes into an image starting at `base`.
fn guest_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| malformed_error!("Image exceeds the 32-bit address space"))
}

/// `len` bytes of `image` at guest address `addr`.
fn guest_slice(image: &[u8], base: u32, addr: u32, len: u32) -> Result<&[u8]> {
    let start = guest_offset(base, addr)?;
    let end = start
        .checked_add(len as usize)
        .ok_or(out_of_bounds_error!())?;
    image.get(start..end).ok_or(out_of_bounds_error!())
}

/// Offset into an image starting at `base` of guest address `addr`.
fn guest_offset(base: u32, addr: u32) -> Result<usize> {
    addr.checked_sub(base)
        .map(|offset| offset as usize)
        .ok_or(out_of_bounds_error!())
}

/// A memory-mapped dump of guest linear memory.
///
/// `base` is the guest address of the first byte of the file, usually `0` for a full
/// linear memory dump.
///
/// # Examples
///
/// ```rust,no_run
/// use specreq::image::GuestImage;
///
/// let image = GuestImage::from_file("snapshot.bin", 0)?;
/// for record in image.read_pending(0x1_0000)? {
///     println!("function {} with {} argument bytes", record.func_id(), record.args().len());
/// }
/// # Ok::<(), specreq::Error>(())
/// ```
pub struct GuestImage {
    physical: Physical,
    base: u32,
}

impl GuestImage {
    /// Map the dump at `path`, located at guest address `base`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn from_file(path: impl AsRef<Path>, base: u32) -> Result<Self> {
        Ok(GuestImage {
            physical: Physical::new(path)?,
            base,
        })
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.physical.data()
    }

    /// Guest address of the first byte.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Walk the pending list starting at guest address `head`.
    ///
    /// # Errors
    /// See [`read_pending`].
    pub fn read_pending(&self, head: u32) -> Result<Vec<PendingRecord<'_>>> {
        read_pending(self.data(), self.base, head)
    }

    /// Decode the lookup table whose header sits at guest address `table_addr`.
    ///
    /// # Errors
    /// See [`read_lookup_table`].
    pub fn read_lookup_table(&self, table_addr: u32) -> Result<LookupTable> {
        read_lookup_table(self.data(), self.base, table_addr)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{lookup::LookupEntry, Error};

    #[test]
    fn func_index_is_dense() {
        let a = FuncRef::new(0x1000).unwrap();
        let b = FuncRef::new(0x2000).unwrap();
        let mut index = FuncIndex::new();

        assert_eq!(index.index_of(a).unwrap(), 1);
        assert_eq!(index.index_of(b).unwrap(), 2);
        assert_eq!(index.index_of(a).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(2), Some(b));
        assert_eq!(index.get(0), None);
    }

    #[test]
    fn direct_funcs() {
        let mut funcs = DirectFuncs;
        assert_eq!(funcs.index_of(FuncRef::new(17).unwrap()).unwrap(), 17);
        let wide = usize::try_from(u64::from(u32::MAX) + 1)
            .ok()
            .and_then(FuncRef::new);
        if let Some(wide) = wide {
            assert!(funcs.index_of(wide).is_err());
        }
    }

    #[test]
    fn address_helpers() {
        assert_eq!(guest_address(0x100, 8).unwrap(), 0x108);
        assert!(guest_address(u32::MAX, 1).is_err());
        assert!(matches!(guest_offset(0x100, 0xFF), Err(Error::OutOfBounds { .. })));
        assert_eq!(guest_slice(&[1, 2, 3, 4], 0x10, 0x11, 2).unwrap(), &[2, 3]);
        assert!(guest_slice(&[1, 2, 3, 4], 0x10, 0x13, 2).is_err());
    }

    #[test]
    fn mapped_image() {
        let func = FuncRef::new(3).unwrap();
        let table = LookupTable::new(vec![
            LookupEntry::new(1, vec![0xAA; 5], func),
            LookupEntry::new(2, vec![], func),
        ])
        .unwrap();
        let written = write_lookup_table(&table, 0x4000, &mut DirectFuncs).unwrap();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(written.bytes()).unwrap();
        file.flush().unwrap();

        let image = GuestImage::from_file(file.path(), 0x4000).unwrap();
        assert_eq!(image.base(), 0x4000);
        assert_eq!(image.data().len(), written.bytes().len());
        assert_eq!(image.read_lookup_table(written.header()).unwrap(), table);
    }
}
