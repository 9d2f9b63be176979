//! Intrinsics understood by the external specializer.
//!
//! Interpreter loops built on this crate annotate themselves with these calls so the
//! specializer can unroll dispatch over a constant bytecode: contexts track the interpreted
//! program counter, registers and globals carry interpreter state across contexts, and the
//! stack/local intrinsics expose operand stack and local slots.
//!
//! On `wasm32` every function is an import from the `weval` module, which the specializer
//! recognizes and replaces. On any other target they are inert host implementations with the
//! same observable behavior for unspecialized code: context and debugging calls do nothing,
//! value intrinsics return their input, memory intrinsics perform the access they describe,
//! and registers and globals live in a per-thread register file.

use std::ffi::CStr;

#[cfg(target_arch = "wasm32")]
#[link(wasm_import_module = "weval")]
extern "C" {
    #[link_name = "push.context"]
    fn weval_push_context(pc: u32);
    #[link_name = "pop.context"]
    fn weval_pop_context();
    #[link_name = "update.context"]
    fn weval_update_context(pc: u32);
    #[link_name = "context.bucket"]
    fn weval_context_bucket(bucket: u32);
    #[link_name = "read.reg"]
    fn weval_read_reg(idx: u64) -> u64;
    #[link_name = "write.reg"]
    fn weval_write_reg(idx: u64, value: u64);
    #[link_name = "specialize.value"]
    fn weval_specialize_value(value: u32, lo: u32, hi: u32) -> u32;
    #[link_name = "read.global"]
    fn weval_read_global(idx: u64) -> u64;
    #[link_name = "write.global"]
    fn weval_write_global(idx: u64, value: u64);
    #[link_name = "read.specialization.global"]
    fn weval_read_specialization_global(idx: u32) -> u64;
    #[link_name = "trace.line"]
    fn weval_trace_line(line: u32);
    #[link_name = "abort.specialization"]
    fn weval_abort_specialization(line: u32, fatal: u32);
    #[link_name = "assert.const32"]
    fn weval_assert_const32(value: u32, line: u32);
    #[link_name = "assert.specialized"]
    fn weval_assert_specialized(line: u32);
    #[link_name = "reachable.at.depth"]
    fn weval_reachable_at_depth(depth: u32);
    #[link_name = "print"]
    fn weval_print(message: *const std::ffi::c_char, line: u32, value: u32);
    #[link_name = "push.stack"]
    fn weval_push_stack(slot: *mut u64, value: u64);
    #[link_name = "sync.stack"]
    fn weval_sync_stack();
    #[link_name = "read.stack"]
    fn weval_read_stack(depth: u32, slot: *const u64) -> u64;
    #[link_name = "write.stack"]
    fn weval_write_stack(depth: u32, slot: *mut u64, value: u64);
    #[link_name = "pop.stack"]
    fn weval_pop_stack(slot: *const u64) -> u64;
    #[link_name = "read.local"]
    fn weval_read_local(idx: u32, slot: *const u64) -> u64;
    #[link_name = "write.local"]
    fn weval_write_local(idx: u32, slot: *mut u64, value: u64);
}

#[cfg(not(target_arch = "wasm32"))]
use host::*;

#[cfg(not(target_arch = "wasm32"))]
mod host {
    #![allow(clippy::missing_safety_doc)]

    use std::{
        cell::RefCell,
        collections::HashMap,
        ffi::{c_char, CStr},
    };

    use log::{debug, trace, warn};

    thread_local! {
        static REGISTERS: RefCell<HashMap<u64, u64>> = RefCell::new(HashMap::new());
        static GLOBALS: RefCell<HashMap<u64, u64>> = RefCell::new(HashMap::new());
    }

    pub unsafe fn weval_push_context(_pc: u32) {}

    pub unsafe fn weval_pop_context() {}

    pub unsafe fn weval_update_context(_pc: u32) {}

    pub unsafe fn weval_context_bucket(_bucket: u32) {}

    pub unsafe fn weval_read_reg(idx: u64) -> u64 {
        REGISTERS.with(|regs| regs.borrow().get(&idx).copied().unwrap_or(0))
    }

    pub unsafe fn weval_write_reg(idx: u64, value: u64) {
        REGISTERS.with(|regs| regs.borrow_mut().insert(idx, value));
    }

    pub unsafe fn weval_specialize_value(value: u32, _lo: u32, _hi: u32) -> u32 {
        value
    }

    pub unsafe fn weval_read_global(idx: u64) -> u64 {
        GLOBALS.with(|globals| globals.borrow().get(&idx).copied().unwrap_or(0))
    }

    pub unsafe fn weval_write_global(idx: u64, value: u64) {
        GLOBALS.with(|globals| globals.borrow_mut().insert(idx, value));
    }

    pub unsafe fn weval_read_specialization_global(idx: u32) -> u64 {
        weval_read_global(u64::from(idx))
    }

    pub unsafe fn weval_trace_line(line: u32) {
        trace!("trace line {line}");
    }

    pub unsafe fn weval_abort_specialization(line: u32, fatal: u32) {
        if fatal != 0 {
            warn!("specialization aborted at line {line}");
        } else {
            debug!("specialization aborted at line {line}");
        }
    }

    pub unsafe fn weval_assert_const32(_value: u32, _line: u32) {}

    pub unsafe fn weval_assert_specialized(_line: u32) {}

    pub unsafe fn weval_reachable_at_depth(_depth: u32) {}

    pub unsafe fn weval_print(message: *const c_char, line: u32, value: u32) {
        let message = CStr::from_ptr(message);
        debug!("{} (line {line}): {value:#x}", message.to_string_lossy());
    }

    pub unsafe fn weval_push_stack(slot: *mut u64, value: u64) {
        slot.write(value);
    }

    pub unsafe fn weval_sync_stack() {}

    pub unsafe fn weval_read_stack(_depth: u32, slot: *const u64) -> u64 {
        slot.read()
    }

    pub unsafe fn weval_write_stack(_depth: u32, slot: *mut u64, value: u64) {
        slot.write(value);
    }

    pub unsafe fn weval_pop_stack(slot: *const u64) -> u64 {
        slot.read()
    }

    pub unsafe fn weval_read_local(_idx: u32, slot: *const u64) -> u64 {
        slot.read()
    }

    pub unsafe fn weval_write_local(_idx: u32, slot: *mut u64, value: u64) {
        slot.write(value);
    }
}

/// Enter a new interpreter context at program counter `pc`.
pub fn push_context(pc: u32) {
    unsafe { weval_push_context(pc) }
}

/// Leave the innermost interpreter context.
pub fn pop_context() {
    unsafe { weval_pop_context() }
}

/// Move the innermost context to program counter `pc`.
pub fn update_context(pc: u32) {
    unsafe { weval_update_context(pc) }
}

/// Group the current context into `bucket` for statistics.
pub fn context_bucket(bucket: u32) {
    unsafe { weval_context_bucket(bucket) }
}

/// Read interpreter register `idx`.
#[must_use]
pub fn read_reg(idx: u64) -> u64 {
    unsafe { weval_read_reg(idx) }
}

/// Write interpreter register `idx`.
pub fn write_reg(idx: u64, value: u64) {
    unsafe { weval_write_reg(idx, value) }
}

/// Treat `value` as a constant in `lo..hi` and specialize on it.
#[must_use]
pub fn specialize_value(value: u32, lo: u32, hi: u32) -> u32 {
    unsafe { weval_specialize_value(value, lo, hi) }
}

/// Read interpreter global `idx`.
#[must_use]
pub fn read_global(idx: u64) -> u64 {
    unsafe { weval_read_global(idx) }
}

/// Write interpreter global `idx`.
pub fn write_global(idx: u64, value: u64) {
    unsafe { weval_write_global(idx, value) }
}

/// Read a global whose value is fixed for the specialization.
#[must_use]
pub fn read_specialization_global(idx: u32) -> u64 {
    unsafe { weval_read_specialization_global(idx) }
}

/// Record that execution reached source line `line`.
pub fn trace_line(line: u32) {
    unsafe { weval_trace_line(line) }
}

/// Give up specializing the current function; `fatal` fails the whole run.
pub fn abort_specialization(line: u32, fatal: bool) {
    unsafe { weval_abort_specialization(line, u32::from(fatal)) }
}

/// Assert that `value` is a specialization-time constant.
pub fn assert_const32(value: u32, line: u32) {
    unsafe { weval_assert_const32(value, line) }
}

/// Assert that the enclosing code is being specialized.
pub fn assert_specialized(line: u32) {
    unsafe { weval_assert_specialized(line) }
}

/// Mark this point as reachable at context depth `depth`.
pub fn reachable_at_depth(depth: u32) {
    unsafe { weval_reachable_at_depth(depth) }
}

/// Print `message` with `line` and `value` from specialized code.
pub fn print(message: &CStr, line: u32, value: u32) {
    unsafe { weval_print(message.as_ptr(), line, value) }
}

/// Push `value` onto the operand stack slot `slot`.
///
/// # Safety
/// `slot` must be valid for writes.
pub unsafe fn push_stack(slot: *mut u64, value: u64) {
    weval_push_stack(slot, value)
}

/// Flush operand stack values tracked by the specializer back to memory.
pub fn sync_stack() {
    unsafe { weval_sync_stack() }
}

/// Read the operand stack slot `depth` entries below the top.
///
/// # Safety
/// `slot` must be valid for reads.
pub unsafe fn read_stack(depth: u32, slot: *const u64) -> u64 {
    weval_read_stack(depth, slot)
}

/// Overwrite the operand stack slot `depth` entries below the top.
///
/// # Safety
/// `slot` must be valid for writes.
pub unsafe fn write_stack(depth: u32, slot: *mut u64, value: u64) {
    weval_write_stack(depth, slot, value)
}

/// Pop the operand stack slot `slot`.
///
/// # Safety
/// `slot` must be valid for reads.
pub unsafe fn pop_stack(slot: *const u64) -> u64 {
    weval_pop_stack(slot)
}

/// Read local `idx` stored at `slot`.
///
/// # Safety
/// `slot` must be valid for reads.
pub unsafe fn read_local(idx: u32, slot: *const u64) -> u64 {
    weval_read_local(idx, slot)
}

/// Write local `idx` stored at `slot`.
///
/// # Safety
/// `slot` must be valid for writes.
pub unsafe fn write_local(idx: u32, slot: *mut u64, value: u64) {
    weval_write_local(idx, slot, value)
}
