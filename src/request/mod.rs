//! Specialization requests and the typed façade that builds them.
//!
//! A [`Request`] is one call site's declaration that a target function should be specialized
//! for a given argument disposition. It carries the caller-chosen stable function identity,
//! the generic implementation, the encoded argument buffer, and a shared destination slot that
//! receives the specialized function once a lookup succeeds.
//!
//! # Key Components
//!
//! - [`FuncRef`] - Type-erased, non-null function reference as stored in slots and tables
//! - [`FnPtr`] - Function pointer types that can be erased to and restored from [`FuncRef`]
//! - [`SpecializedSlot`] - Typed destination slot shared between a call site and its request
//! - [`Request`] - The request itself, owning its argument buffer
//! - [`Runtime`], [`Specialize`], [`SpecializeMemory`] - Argument-kind wrappers
//! - [`RequestBuilder`] and [`request`] - Construction and submission
//!
//! # Examples
//!
//! ```rust
//! use specreq::prelude::*;
//!
//! fn scale(factor: u32, value: u64) -> u64 {
//!     u64::from(factor) * value
//! }
//!
//! let mut ctx = SpecializationContext::new();
//! let slot = SpecializedSlot::<fn(u32, u64) -> u64>::new();
//!
//! let handle = request(
//!     &mut ctx,
//!     &slot,
//!     scale,
//!     3,
//!     (Specialize(4u32), Runtime::new()),
//! )?;
//!
//! assert_eq!(ctx.pending_len(), 1);
//! assert_eq!(slot.get_or(scale)(4, 10), 40);
//! ctx.release(handle);
//! # Ok::<(), specreq::Error>(())
//! ```

mod builder;

pub use builder::{
    request, ArgList, ArgSpec, RequestBuilder, Runtime, Specialize, SpecializeMemory,
    SpecializeValue,
};

use std::{cell::Cell, fmt, marker::PhantomData, num::NonZeroUsize, rc::Rc};

use crate::lookup::IdentityKey;

/// Type-erased reference to a function.
///
/// On `wasm32` this is the function's table index, which is what the external specializer
/// writes into lookup entries. Zero is never a valid reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(NonZeroUsize);

impl FuncRef {
    /// Wrap a raw function address or table index; `None` for zero.
    #[must_use]
    pub fn new(raw: usize) -> Option<FuncRef> {
        NonZeroUsize::new(raw).map(FuncRef)
    }

    /// The raw address or table index.
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func@{:#x}", self.0)
    }
}

/// Function pointer types usable as specialization targets.
///
/// Implemented for `fn` and `extern "C" fn` pointers with up to eight parameters. `Params`
/// is the tuple of parameter types; [`ArgList`] uses it to check argument wrappers against
/// the target position by position at compile time.
pub trait FnPtr: Copy {
    /// Tuple of the parameter types
    type Params;

    /// Number of parameters
    const ARITY: usize;

    /// Erase to a [`FuncRef`].
    fn func_ref(self) -> FuncRef;

    /// Restore a typed pointer from a [`FuncRef`].
    ///
    /// # Safety
    ///
    /// `func` must refer to a function whose signature is exactly `Self`.
    unsafe fn from_func_ref(func: FuncRef) -> Self;
}

macro_rules! impl_fn_ptr {
    (@impl $ty:ty; $($arg:ident),*) => {
        impl<R, $($arg),*> FnPtr for $ty {
            type Params = ($($arg,)*);

            const ARITY: usize = count_tts!($($arg)*);

            fn func_ref(self) -> FuncRef {
                // Function pointers are never null.
                FuncRef(NonZeroUsize::new(self as usize).unwrap_or(NonZeroUsize::MIN))
            }

            unsafe fn from_func_ref(func: FuncRef) -> Self {
                std::mem::transmute_copy::<usize, Self>(&func.get())
            }
        }
    };
    ($($arg:ident),*) => {
        impl_fn_ptr!(@impl fn($($arg),*) -> R; $($arg),*);
        impl_fn_ptr!(@impl extern "C" fn($($arg),*) -> R; $($arg),*);
    };
}

impl_fn_ptr!();
impl_fn_ptr!(A0);
impl_fn_ptr!(A0, A1);
impl_fn_ptr!(A0, A1, A2);
impl_fn_ptr!(A0, A1, A2, A3);
impl_fn_ptr!(A0, A1, A2, A3, A4);
impl_fn_ptr!(A0, A1, A2, A3, A4, A5);
impl_fn_ptr!(A0, A1, A2, A3, A4, A5, A6);
impl_fn_ptr!(A0, A1, A2, A3, A4, A5, A6, A7);

/// Destination slot for a resolved specialization.
///
/// The slot is shared (reference counted) between the call site and the [`Request`] that
/// targets it. It starts empty; a successful lookup writes the specialized function into it.
/// An empty slot means "call the generic implementation".
pub struct SpecializedSlot<F> {
    cell: Rc<Cell<Option<FuncRef>>>,
    _marker: PhantomData<F>,
}

impl<F: FnPtr> SpecializedSlot<F> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        SpecializedSlot {
            cell: Rc::new(Cell::new(None)),
            _marker: PhantomData,
        }
    }

    /// The specialized function, if one has been resolved.
    #[must_use]
    pub fn get(&self) -> Option<F> {
        // Only lookup tables installed through the unsafe
        // `SpecializationContext::install_lookup_table` write into slots, and that contract
        // requires each entry's function to match the signature of its targets.
        self.cell.get().map(|func| unsafe { F::from_func_ref(func) })
    }

    /// The specialized function, or `generic` if none was resolved.
    #[must_use]
    pub fn get_or(&self, generic: F) -> F {
        self.get().unwrap_or(generic)
    }

    /// Returns `true` once a specialization has been written.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The raw value of the slot.
    #[must_use]
    pub fn func_ref(&self) -> Option<FuncRef> {
        self.cell.get()
    }
}

impl<F: FnPtr> Default for SpecializedSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for SpecializedSlot<F> {
    fn clone(&self) -> Self {
        SpecializedSlot {
            cell: Rc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<F> fmt::Debug for SpecializedSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpecializedSlot").field(&self.cell.get()).finish()
    }
}

/// One specialization request.
///
/// The identity key is `(func_id, args)`. The request exclusively owns its argument buffer;
/// both are dropped together when the request is released.
pub struct Request {
    func_id: u32,
    generic: FuncRef,
    args: Vec<u8>,
    slot: Rc<Cell<Option<FuncRef>>>,
}

impl Request {
    /// Assemble a request from an already encoded argument buffer.
    ///
    /// Most callers go through [`RequestBuilder`] or [`request`] instead, which encode the
    /// arguments and submit in one step.
    #[must_use]
    pub fn new<F: FnPtr>(
        func_id: u32,
        generic: F,
        args: Vec<u8>,
        slot: &SpecializedSlot<F>,
    ) -> Request {
        Request {
            func_id,
            generic: generic.func_ref(),
            args,
            slot: Rc::clone(&slot.cell),
        }
    }

    /// Caller-supplied stable identity of the target function.
    #[must_use]
    pub fn func_id(&self) -> u32 {
        self.func_id
    }

    /// The generic implementation.
    #[must_use]
    pub fn generic(&self) -> FuncRef {
        self.generic
    }

    /// The encoded argument buffer.
    #[must_use]
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Identity key used to match this request against a lookup table.
    #[must_use]
    pub fn key(&self) -> IdentityKey<'_> {
        IdentityKey::new(self.func_id, &self.args)
    }

    /// Current value of the destination slot.
    #[must_use]
    pub fn resolved(&self) -> Option<FuncRef> {
        self.slot.get()
    }

    pub(crate) fn write_slot(&self, func: FuncRef) {
        self.slot.set(Some(func));
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("func_id", &self.func_id)
            .field("generic", &self.generic)
            .field("arglen", &self.args.len())
            .field("resolved", &self.slot.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: u32, b: u32) -> u32 {
        a + b
    }

    fn mul(a: u32, b: u32) -> u32 {
        a * b
    }

    extern "C" fn negate(value: i64) -> i64 {
        -value
    }

    #[test]
    fn func_ref_roundtrip() {
        let ptr: fn(u32, u32) -> u32 = add;
        let func = ptr.func_ref();
        let back = unsafe { <fn(u32, u32) -> u32>::from_func_ref(func) };
        assert_eq!(back(2, 3), 5);

        let ptr: extern "C" fn(i64) -> i64 = negate;
        let back = unsafe { <extern "C" fn(i64) -> i64>::from_func_ref(ptr.func_ref()) };
        assert_eq!(back(7), -7);

        assert!(FuncRef::new(0).is_none());
    }

    #[test]
    fn arity() {
        assert_eq!(<fn() -> u32 as FnPtr>::ARITY, 0);
        assert_eq!(<fn(u32, u32) -> u32 as FnPtr>::ARITY, 2);
        assert_eq!(
            <extern "C" fn(u8, u8, u8, u8, u8, u8, u8, u8) as FnPtr>::ARITY,
            8
        );
    }

    #[test]
    fn slot_is_shared_with_request() {
        let slot = SpecializedSlot::<fn(u32, u32) -> u32>::new();
        let request = Request::new(1, add as fn(u32, u32) -> u32, vec![], &slot);
        assert!(!slot.is_resolved());
        assert_eq!(slot.get_or(add)(2, 3), 5);

        request.write_slot((mul as fn(u32, u32) -> u32).func_ref());
        assert!(slot.is_resolved());
        assert_eq!(slot.get_or(add)(2, 3), 6);
        assert_eq!(request.resolved(), slot.func_ref());
    }
}
