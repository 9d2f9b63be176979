//! Pending request list in guest memory.

use crate::{
    image::{guest_address, guest_offset, guest_slice, FuncTable, REQUEST_RECORD_SIZE},
    io::{align8, read_le_at, write_le_at},
    queue::RequestQueue,
    Result,
};

/// A request record padded to keep the slot cell and argument buffer 8-byte aligned.
const RECORD_STRIDE: usize = 32;

/// Destination slot cell following each record.
const SLOT_STRIDE: usize = 8;

/// A pending list laid out for a guest image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    bytes: Vec<u8>,
    base: u32,
    head: u32,
}

impl PendingImage {
    /// The image bytes, to be placed at [`PendingImage::base`].
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Guest address of the first byte.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Guest address of the first record, `0` for an empty list.
    #[must_use]
    pub fn head(&self) -> u32 {
        self.head
    }
}

/// One request record read back from a guest image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRecord<'a> {
    address: u32,
    func_id: u32,
    func: u32,
    args: &'a [u8],
    slot: u32,
}

impl<'a> PendingRecord<'a> {
    /// Guest address of the record.
    #[must_use]
    pub fn address(&self) -> u32 {
        self.address
    }

    /// The function id.
    #[must_use]
    pub fn func_id(&self) -> u32 {
        self.func_id
    }

    /// Table index of the generic function.
    #[must_use]
    pub fn func(&self) -> u32 {
        self.func
    }

    /// The encoded argument buffer.
    #[must_use]
    pub fn args(&self) -> &'a [u8] {
        self.args
    }

    /// Guest address of the destination slot.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// Lay out the pending list of `queue` at guest address `base`.
///
/// Records appear in list order, each followed by its destination slot cell (holding the
/// current slot value) and its 8-byte aligned argument buffer. A request without arguments
/// gets a null `argbuf`.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if `base` is null, if the image would not fit the
/// 32-bit address space, or if `funcs` cannot index a function.
pub fn write_pending(
    queue: &RequestQueue,
    base: u32,
    funcs: &mut impl FuncTable,
) -> Result<PendingImage> {
    if base == 0 {
        return Err(malformed_error!("Image base address must be non-zero"));
    }

    let mut offsets = Vec::with_capacity(queue.len());
    let mut size = 0usize;
    for (_, request) in queue {
        offsets.push(size);
        size = size
            .checked_add(RECORD_STRIDE + SLOT_STRIDE + align8(request.args().len()))
            .ok_or_else(|| malformed_error!("Pending list exceeds the address space"))?;
    }
    guest_address(base, size)?;

    let mut bytes = vec![0u8; size];
    let mut prev = 0u32;
    for (position, (_, request)) in queue.iter().enumerate() {
        let start = offsets[position];
        let address = guest_address(base, start)?;
        let next = match offsets.get(position + 1) {
            Some(&offset) => guest_address(base, offset)?,
            None => 0,
        };
        let slot = guest_address(base, start + RECORD_STRIDE)?;
        let data = start + RECORD_STRIDE + SLOT_STRIDE;
        let args = request.args();
        let argbuf = if args.is_empty() {
            0
        } else {
            guest_address(base, data)?
        };
        let arglen = u32::try_from(args.len())
            .map_err(|_| malformed_error!("Argument buffer of {} bytes", args.len()))?;

        let mut offset = start;
        write_le_at(&mut bytes, &mut offset, next)?;
        write_le_at(&mut bytes, &mut offset, prev)?;
        write_le_at(&mut bytes, &mut offset, request.func_id())?;
        write_le_at(&mut bytes, &mut offset, funcs.index_of(request.generic())?)?;
        write_le_at(&mut bytes, &mut offset, argbuf)?;
        write_le_at(&mut bytes, &mut offset, arglen)?;
        write_le_at(&mut bytes, &mut offset, slot)?;

        let resolved = match request.resolved() {
            Some(func) => funcs.index_of(func)?,
            None => 0,
        };
        let mut offset = start + RECORD_STRIDE;
        write_le_at(&mut bytes, &mut offset, resolved)?;

        bytes[data..data + args.len()].copy_from_slice(args);
        prev = address;
    }

    Ok(PendingImage {
        bytes,
        base,
        head: if queue.is_empty() { 0 } else { base },
    })
}

/// Walk the pending list starting at guest address `head` in an image located at `base`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] for addresses outside the image and
/// [`crate::Error::Malformed`] if a `prev` link does not point back at the previous record or
/// the list does not terminate.
pub fn read_pending(image: &[u8], base: u32, head: u32) -> Result<Vec<PendingRecord<'_>>> {
    let limit = image.len() / REQUEST_RECORD_SIZE;
    let mut records = Vec::new();
    let mut prev = 0u32;
    let mut address = head;

    while address != 0 {
        if records.len() > limit {
            return Err(malformed_error!(
                "Pending list starting at {:#x} does not terminate",
                head
            ));
        }

        let mut offset = guest_offset(base, address)?;
        let next = read_le_at::<u32>(image, &mut offset)?;
        let back = read_le_at::<u32>(image, &mut offset)?;
        let func_id = read_le_at::<u32>(image, &mut offset)?;
        let func = read_le_at::<u32>(image, &mut offset)?;
        let argbuf = read_le_at::<u32>(image, &mut offset)?;
        let arglen = read_le_at::<u32>(image, &mut offset)?;
        let slot = read_le_at::<u32>(image, &mut offset)?;

        if back != prev {
            return Err(malformed_error!(
                "Request at {:#x} links back to {:#x}, expected {:#x}",
                address,
                back,
                prev
            ));
        }

        let args = if arglen == 0 {
            &[][..]
        } else {
            guest_slice(image, base, argbuf, arglen)?
        };

        records.push(PendingRecord {
            address,
            func_id,
            func,
            args,
            slot,
        });
        prev = address;
        address = next;
    }

    Ok(records)
}
