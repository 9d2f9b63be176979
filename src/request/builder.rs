//! # Request Builder
//!
//! Typed construction of specialization requests. A call site describes each positional
//! argument of the target with one of three wrappers:
//!
//! - [`Runtime<T>`] - the argument stays generic
//! - [`Specialize<T>`] - specialize on this exact value
//! - [`SpecializeMemory`] - specialize on the current contents of a memory region
//!
//! The wrapper's type selects the encoding at compile time through [`SpecializeValue`], so a
//! `u32` always becomes a 32-bit record and an `f64` always a 64-bit float record. There is
//! no silent truncation and no way to spell the same intent with two different encodings.
//!
//! Two entry points exist:
//!
//! - [`request`] takes the arguments as a tuple. The tuple is checked against the target's
//!   parameter list at compile time: position `i` of the tuple must be a wrapper whose
//!   parameter type is the target's `i`-th parameter type.
//! - [`RequestBuilder`] adds arguments one at a time and checks only the count, at build
//!   time, when [`crate::RuntimeConfig::check_arity`] is enabled.
//!
//! Pointer-valued specialization encodes the address as a 32-bit value and is therefore only
//! available when compiling for a 32-bit target; elsewhere it fails to compile.

use std::marker::PhantomData;

use log::warn;

use crate::{
    context::SpecializationContext,
    encoding::{ArgDescriptor, ArgWriter},
    queue::RequestHandle,
    request::{FnPtr, Request, SpecializedSlot},
    Error, Result,
};

/// Value types that can be specialized on, with their fixed encoding.
pub trait SpecializeValue: Copy {
    /// The descriptor recorded for `self`.
    fn descriptor(self) -> ArgDescriptor<'static>;
}

impl SpecializeValue for u32 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(self)
    }
}

impl SpecializeValue for i32 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(self as u32)
    }
}

impl SpecializeValue for bool {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(u32::from(self))
    }
}

impl SpecializeValue for u64 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I64(self)
    }
}

impl SpecializeValue for i64 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I64(self as u64)
    }
}

impl SpecializeValue for f32 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::F32(self)
    }
}

impl SpecializeValue for f64 {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::F64(self)
    }
}

#[cfg(target_pointer_width = "32")]
impl<T> SpecializeValue for *const T {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(self as usize as u32)
    }
}

#[cfg(target_pointer_width = "32")]
impl<T> SpecializeValue for *mut T {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(self as usize as u32)
    }
}

#[cfg(target_pointer_width = "32")]
impl SpecializeValue for usize {
    fn descriptor(self) -> ArgDescriptor<'static> {
        ArgDescriptor::I32(self as u32)
    }
}

/// An argument-kind wrapper.
///
/// `Param` is the type of the target parameter the wrapper stands for.
pub trait ArgSpec {
    /// Target parameter type
    type Param;

    /// The descriptor this wrapper lowers to.
    fn descriptor(&self) -> ArgDescriptor<'_>;
}

/// The argument is not specialized.
pub struct Runtime<T>(PhantomData<T>);

impl<T> Runtime<T> {
    /// Marks a parameter of type `T` as a runtime value.
    #[must_use]
    pub fn new() -> Self {
        Runtime(PhantomData)
    }
}

impl<T> Default for Runtime<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ArgSpec for Runtime<T> {
    type Param = T;

    fn descriptor(&self) -> ArgDescriptor<'_> {
        ArgDescriptor::Runtime
    }
}

/// Specialize the argument on exactly this value.
#[derive(Debug, Clone, Copy)]
pub struct Specialize<T>(pub T);

impl<T: SpecializeValue> ArgSpec for Specialize<T> {
    type Param = T;

    fn descriptor(&self) -> ArgDescriptor<'_> {
        self.0.descriptor()
    }
}

/// Specialize a pointer-like parameter `P` on the current contents of `len` bytes it points to.
///
/// The bytes are copied into the request when it is built; later changes to the region do
/// not affect a request that already exists.
pub struct SpecializeMemory<'a, P> {
    data: &'a [u8],
    _param: PhantomData<P>,
}

impl<'a, P> SpecializeMemory<'a, P> {
    /// Snapshot `data` for a parameter of type `P`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SpecializeMemory {
            data,
            _param: PhantomData,
        }
    }

    /// Snapshot `len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for the lifetime `'a`, and the memory must
    /// be initialized.
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: *const u8, len: u32) -> Self {
        Self::new(std::slice::from_raw_parts(ptr, len as usize))
    }

    /// The region that will be recorded.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

impl<P> ArgSpec for SpecializeMemory<'_, P> {
    type Param = P;

    fn descriptor(&self) -> ArgDescriptor<'_> {
        ArgDescriptor::Buffer(self.data)
    }
}

/// An ordered argument list matching a parameter tuple `Params` position for position.
///
/// Implemented for tuples of [`ArgSpec`] wrappers up to eight elements.
pub trait ArgList<Params> {
    /// Number of arguments
    const LEN: usize;

    /// Encode every argument, in order.
    ///
    /// # Errors
    /// Propagates encoder failures.
    fn encode(&self, writer: &mut ArgWriter) -> Result<()>;
}

impl ArgList<()> for () {
    const LEN: usize = 0;

    fn encode(&self, _writer: &mut ArgWriter) -> Result<()> {
        Ok(())
    }
}

macro_rules! impl_arg_list {
    ($($wrapper:ident $param:ident $idx:tt),+) => {
        impl<$($param, $wrapper: ArgSpec<Param = $param>),+> ArgList<($($param,)+)>
            for ($($wrapper,)+)
        {
            const LEN: usize = count_tts!($($idx)+);

            fn encode(&self, writer: &mut ArgWriter) -> Result<()> {
                $(writer.write_descriptor(&self.$idx.descriptor())?;)+
                Ok(())
            }
        }
    };
}

impl_arg_list!(W0 A0 0);
impl_arg_list!(W0 A0 0, W1 A1 1);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2, W3 A3 3);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2, W3 A3 3, W4 A4 4);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2, W3 A3 3, W4 A4 4, W5 A5 5);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2, W3 A3 3, W4 A4 4, W5 A5 5, W6 A6 6);
impl_arg_list!(W0 A0 0, W1 A1 1, W2 A2 2, W3 A3 3, W4 A4 4, W5 A5 5, W6 A6 6, W7 A7 7);

/// Build a request from a typed argument tuple and submit it.
///
/// Before specialization the request is queued for the external specializer. After
/// specialization it is matched against the lookup table right away and, on a hit, `slot`
/// receives the specialized function. Either way the returned handle owns the request until
/// [`SpecializationContext::release`].
///
/// # Errors
///
/// Returns [`Error::CapacityExceeded`] or [`Error::AllocationFailed`] if the arguments do not
/// fit the encoder. Nothing is queued in that case.
///
/// # Examples
///
/// ```rust
/// use specreq::prelude::*;
///
/// fn run(code: *const u8, len: u32, input: u64) -> u64 {
///     input + u64::from(len)
/// }
///
/// let code = [0x10, 0x20, 0x30];
/// let mut ctx = SpecializationContext::new();
/// let slot = SpecializedSlot::<fn(*const u8, u32, u64) -> u64>::new();
///
/// let handle = request(
///     &mut ctx,
///     &slot,
///     run,
///     1,
///     (SpecializeMemory::new(&code), Specialize(3u32), Runtime::new()),
/// )?;
/// assert_eq!(ctx.get(handle).map(|r| r.args().len()), Some(3 * 16 + 8));
/// # Ok::<(), specreq::Error>(())
/// ```
pub fn request<F, A>(
    ctx: &mut SpecializationContext,
    slot: &SpecializedSlot<F>,
    generic: F,
    func_id: u32,
    args: A,
) -> Result<RequestHandle>
where
    F: FnPtr,
    A: ArgList<F::Params>,
{
    let mut writer = ArgWriter::with_config(ctx.config());
    if let Err(error) = args.encode(&mut writer) {
        warn!("request for function {func_id} not built: {error}");
        return Err(error);
    }

    let request = Request::new(func_id, generic, writer.take(), slot);
    ctx.submit(request)
}

/// Fluent, incrementally built request.
///
/// Arguments are encoded as they are added. The first encoding failure is kept and reported
/// by [`RequestBuilder::build`] / [`RequestBuilder::submit`]; later arguments are ignored.
///
/// # Examples
///
/// ```rust
/// use specreq::prelude::*;
///
/// fn blend(a: f32, b: f32, t: f64) -> f64 {
///     f64::from(a) * (1.0 - t) + f64::from(b) * t
/// }
///
/// let mut ctx = SpecializationContext::new();
/// let slot = SpecializedSlot::<fn(f32, f32, f64) -> f64>::new();
///
/// let handle = RequestBuilder::new(&ctx, &slot, blend, 9)
///     .arg(Specialize(0.0f32))
///     .arg(Specialize(1.0f32))
///     .arg(Runtime::<f64>::new())
///     .submit(&mut ctx)?;
///
/// assert!(ctx.release(handle));
/// # Ok::<(), specreq::Error>(())
/// ```
pub struct RequestBuilder<F: FnPtr> {
    func_id: u32,
    generic: F,
    slot: SpecializedSlot<F>,
    writer: ArgWriter,
    count: usize,
    check_arity: bool,
    error: Option<Error>,
}

impl<F: FnPtr> RequestBuilder<F> {
    /// Start a request for `generic`, identified by `func_id`, resolving into `slot`.
    ///
    /// The context is only consulted for its configuration.
    #[must_use]
    pub fn new(
        ctx: &SpecializationContext,
        slot: &SpecializedSlot<F>,
        generic: F,
        func_id: u32,
    ) -> Self {
        RequestBuilder {
            func_id,
            generic,
            slot: slot.clone(),
            writer: ArgWriter::with_config(ctx.config()),
            count: 0,
            check_arity: ctx.config().check_arity,
            error: None,
        }
    }

    /// Append the next positional argument.
    #[must_use]
    pub fn arg<A: ArgSpec>(mut self, arg: A) -> Self {
        self.count += 1;
        if self.error.is_none() {
            if let Err(error) = self.writer.write_descriptor(&arg.descriptor()) {
                self.error = Some(error);
            }
        }
        self
    }

    /// Number of arguments added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no argument has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finish encoding and produce the request without submitting it.
    ///
    /// # Errors
    ///
    /// Returns the first encoding error, or [`Error::ArityMismatch`] if arity checking is
    /// enabled and the argument count differs from the target's parameter count.
    pub fn build(mut self) -> Result<Request> {
        if let Some(error) = self.error.take() {
            warn!("request for function {} not built: {error}", self.func_id);
            return Err(error);
        }
        if self.check_arity && self.count != F::ARITY {
            return Err(Error::ArityMismatch {
                expected: F::ARITY,
                found: self.count,
            });
        }

        Ok(Request::new(
            self.func_id,
            self.generic,
            self.writer.take(),
            &self.slot,
        ))
    }

    /// Build the request and hand it to `ctx`.
    ///
    /// # Errors
    /// See [`RequestBuilder::build`].
    pub fn submit(self, ctx: &mut SpecializationContext) -> Result<RequestHandle> {
        let request = self.build()?;
        ctx.submit(request)
    }
}
