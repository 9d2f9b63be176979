//! Integration tests for the full request lifecycle.
//!
//! These tests drive both runs of a specialized program through the public API:
//! - Pre-specialization: requests are encoded, queued and exported as a guest image
//! - Table construction: the pending requests become a sorted lookup table
//! - Post-specialization: the same call sites resolve through the installed table

use specreq::{
    encoding::{ArgDescriptor, ArgReader, DESCRIPTOR_SIZE},
    image::{read_lookup_table, read_pending, write_lookup_table, write_pending, FuncIndex},
    prelude::*,
};

type InterpretFn = fn(*const u8, u32, u64) -> u64;

fn interpret(code: *const u8, len: u32, input: u64) -> u64 {
    let code = unsafe { std::slice::from_raw_parts(code, len as usize) };
    code.iter().fold(input, |acc, &op| acc * 3 + u64::from(op))
}

/// Stands in for the code the specializer generates for the program `[1, 2, 3]`.
fn interpret_123(_code: *const u8, _len: u32, input: u64) -> u64 {
    input * 27 + 18
}

specreq::define_target!(1, interpret);

fn scale(factor: u32) -> u32 {
    factor
}

/// The call site of the example program.
fn call_site(
    ctx: &mut SpecializationContext,
    slot: &SpecializedSlot<InterpretFn>,
    program: &[u8],
) -> specreq::Result<RequestHandle> {
    request(
        ctx,
        slot,
        interpret,
        7,
        (
            SpecializeMemory::new(program),
            Specialize(program.len() as u32),
            Runtime::new(),
        ),
    )
}

#[test]
fn scenario_encoding_and_release() -> specreq::Result<()> {
    fn target(_value: u32, _region: *const u8, _runtime: u64) {}

    let mut ctx = SpecializationContext::new();
    let slot = SpecializedSlot::<fn(u32, *const u8, u64)>::new();
    let handle = request(
        &mut ctx,
        &slot,
        target,
        7,
        (
            Specialize(42u32),
            SpecializeMemory::new(&[1, 2, 3]),
            Runtime::new(),
        ),
    )?;

    let expected: Vec<u8> = [
        // 32-bit value 42
        &[1, 0, 0, 0, 0, 0, 0, 0, 42, 0, 0, 0, 0, 0, 0, 0][..],
        // buffer, len 3, padded 8, then the inline bytes
        &[1, 0, 0, 0, 4, 0, 0, 0, 3, 0, 0, 0, 8, 0, 0, 0],
        &[1, 2, 3, 0, 0, 0, 0, 0],
        // not specialized
        &[0, 0, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ]
    .concat();

    let queued = ctx.get(handle).expect("request is live");
    assert_eq!(queued.func_id(), 7);
    assert_eq!(queued.args(), &expected[..]);
    assert_eq!(ctx.pending_len(), 1);

    assert!(ctx.release(handle));
    assert_eq!(ctx.pending_len(), 0);
    assert!(ctx.get(handle).is_none());
    assert!(ctx.pending().next().is_none());
    ctx.queue().validate()?;
    Ok(())
}

#[test]
fn both_runs() -> specreq::Result<()> {
    let program = [1u8, 2, 3];
    let other = [4u8];

    // Pre-specialization run.
    let mut ctx = SpecializationContext::new();
    let slot = SpecializedSlot::<InterpretFn>::new();
    let first = call_site(&mut ctx, &slot, &program)?;
    let second = call_site(&mut ctx, &slot, &other)?;
    assert_eq!(ctx.pending_len(), 2);
    assert_eq!(slot.get_or(interpret)(program.as_ptr(), 3, 1), 45);

    // The specializer reads the pending list from the snapshot...
    let mut funcs = FuncIndex::new();
    let snapshot = write_pending(ctx.queue(), 0x1_0000, &mut funcs)?;
    let records = read_pending(snapshot.bytes(), snapshot.base(), snapshot.head())?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].args(), ctx.get(second).map(Request::args).unwrap_or_default());

    // ...specializes only the first program and patches a table in.
    let record = records
        .iter()
        .find(|record| record.args() == ctx.get(first).map(Request::args).unwrap_or_default())
        .expect("first request exported");
    let specialized = (interpret_123 as InterpretFn).func_ref();
    let table = LookupTable::new(vec![LookupEntry::new(
        record.func_id(),
        record.args().to_vec(),
        specialized,
    )])?;
    assert!(ctx.release(first));
    assert!(ctx.release(second));

    // Post-specialization run of the same binary.
    let mut ctx = SpecializationContext::new();
    unsafe { ctx.install_lookup_table(table)? };

    let hit = SpecializedSlot::<InterpretFn>::new();
    let handle = call_site(&mut ctx, &hit, &program)?;
    assert!(hit.is_resolved());
    assert_eq!(hit.get_or(interpret)(program.as_ptr(), 3, 1), 45);
    assert_eq!(hit.func_ref(), Some(specialized));
    assert_eq!(ctx.pending_len(), 0);
    assert!(ctx.release(handle));

    let miss = SpecializedSlot::<InterpretFn>::new();
    let handle = call_site(&mut ctx, &miss, &other)?;
    assert!(!miss.is_resolved());
    assert_eq!(miss.get_or(interpret)(other.as_ptr(), 1, 1), 7);
    assert!(ctx.release(handle));
    assert!(!ctx.release(handle));

    ctx.queue().validate()?;
    Ok(())
}

#[test]
fn table_survives_guest_image() -> specreq::Result<()> {
    let mut ctx = SpecializationContext::new();
    let slot = SpecializedSlot::<fn(u32) -> u32>::new();
    let mut entries = Vec::new();
    for factor in [9u32, 2, 5] {
        let handle = request(&mut ctx, &slot, scale, 3, (Specialize(factor),))?;
        let args = ctx.get(handle).map(|r| r.args().to_vec()).unwrap_or_default();
        entries.push(LookupEntry::new(3, args, FuncRef::new(factor as usize).expect("non-zero")));
    }
    let table = LookupTable::from_unsorted(entries)?;

    let image = write_lookup_table(&table, 0x2000, &mut specreq::image::DirectFuncs)?;
    let patched = read_lookup_table(image.bytes(), image.base(), image.header())?;
    assert_eq!(patched, table);

    let mut writer = specreq::encoding::ArgWriter::new();
    writer.write_descriptor(&ArgDescriptor::I32(5))?;
    let probe = Request::new(3, scale as fn(u32) -> u32, writer.take(), &slot);

    let mut ctx = SpecializationContext::new();
    // SAFETY: every entry stands for a `fn(u32) -> u32`, and the slot is never called.
    unsafe { ctx.install_lookup_table(patched)? };
    assert_eq!(ctx.find(&probe).map(LookupEntry::specialized), FuncRef::new(5));
    Ok(())
}

#[test]
fn decode_queued_arguments() -> specreq::Result<()> {
    let mut ctx = SpecializationContext::new();
    let slot = SpecializedSlot::<InterpretFn>::new();
    let handle = call_site(&mut ctx, &slot, &[0xEE; 11])?;

    let args = ctx.get(handle).map(Request::args).unwrap_or_default();
    assert_eq!(args.len(), 3 * DESCRIPTOR_SIZE + 16);
    assert_eq!(
        ArgReader::decode_all(args)?,
        [
            ArgDescriptor::Buffer(&[0xEE; 11]),
            ArgDescriptor::I32(11),
            ArgDescriptor::Runtime,
        ]
    );
    Ok(())
}

#[test]
fn capacity_failure_leaves_nothing_queued() {
    let region = vec![0u8; specreq::MAX_ARG_BYTES - DESCRIPTOR_SIZE];
    let mut ctx = SpecializationContext::new();
    let slot = SpecializedSlot::<fn(*const u8) -> u32>::new();

    fn first(_data: *const u8) -> u32 {
        0
    }

    // Exactly at the cap.
    let handle = request(&mut ctx, &slot, first, 1, (SpecializeMemory::new(&region),))
        .expect("fits exactly");
    assert_eq!(
        ctx.get(handle).map(|r| r.args().len()),
        Some(specreq::MAX_ARG_BYTES)
    );

    // One byte over.
    let region = vec![0u8; specreq::MAX_ARG_BYTES - DESCRIPTOR_SIZE + 1];
    let result = request(&mut ctx, &slot, first, 1, (SpecializeMemory::new(&region),));
    assert!(matches!(result, Err(Error::CapacityExceeded { .. })));
    assert_eq!(ctx.pending_len(), 1);
    ctx.queue().validate().expect("queue intact");
}
