//! Process-wide specialization state.
//!
//! [`SpecializationContext`] owns everything the protocol shares between call sites: the
//! pending request queue, the "is specialized" flag and the lookup table. A program creates
//! one at startup and threads it through its initialization sequence.
//!
//! # Lifecycle
//!
//! 1. Constructed empty: not specialized, empty table. Submitted requests are queued for the
//!    external specializer.
//! 2. [`SpecializationContext::install_lookup_table`] populates the table once and flips the
//!    flag. From then on submission resolves immediately against the table and nothing is
//!    queued.
//! 3. Read-only thereafter, apart from request ownership.
//!
//! The context is not thread-safe; wrap it in a mutex or confine it to initialization code
//! if call sites can run concurrently.
//!
//! # Examples
//!
//! ```rust
//! use specreq::prelude::*;
//! use specreq::lookup::{LookupEntry, LookupTable};
//!
//! fn generic(x: u32) -> u32 {
//!     x + 1
//! }
//!
//! fn specialized(_x: u32) -> u32 {
//!     43
//! }
//!
//! // Pre-specialization run: the request is queued.
//! let mut ctx = SpecializationContext::new();
//! let slot = SpecializedSlot::<fn(u32) -> u32>::new();
//! let handle = request(&mut ctx, &slot, generic, 7, (Specialize(42u32),))?;
//! let key = ctx.get(handle).map(|r| r.args().to_vec()).unwrap_or_default();
//! assert_eq!(ctx.pending_len(), 1);
//!
//! // Post-specialization run: the same call site resolves through the table.
//! let target = (specialized as fn(u32) -> u32).func_ref();
//! let table = LookupTable::new(vec![LookupEntry::new(7, key, target)])?;
//!
//! let mut ctx = SpecializationContext::new();
//! // SAFETY: the entry for function 7 has the signature of `generic`.
//! unsafe { ctx.install_lookup_table(table)? };
//!
//! let slot = SpecializedSlot::<fn(u32) -> u32>::new();
//! let handle = request(&mut ctx, &slot, generic, 7, (Specialize(42u32),))?;
//! assert_eq!(ctx.pending_len(), 0);
//! assert_eq!(slot.get_or(generic)(42), 43);
//! assert!(ctx.release(handle));
//! # Ok::<(), specreq::Error>(())
//! ```

use log::debug;

use crate::{
    config::RuntimeConfig,
    lookup::{LookupEntry, LookupTable},
    queue::{self, RequestHandle, RequestQueue},
    Error, FuncRef, Request, Result,
};

/// Single owner of the queue, the specialized flag and the lookup table.
#[derive(Debug, Default)]
pub struct SpecializationContext {
    config: RuntimeConfig,
    queue: RequestQueue,
    specialized: bool,
    table: LookupTable,
}

impl SpecializationContext {
    /// A fresh, not yet specialized context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh context using `config`.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        SpecializationContext {
            config,
            ..Self::default()
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns `true` once a lookup table has been installed.
    #[must_use]
    pub fn is_specialized(&self) -> bool {
        self.specialized
    }

    /// The installed lookup table; empty before specialization.
    #[must_use]
    pub fn lookup_table(&self) -> &LookupTable {
        &self.table
    }

    /// The request queue.
    #[must_use]
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Populate the lookup table and switch to specialized mode.
    ///
    /// Requests queued before the call stay queued; only later submissions resolve.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySpecialized`] on a second call and, when
    /// [`RuntimeConfig::validate_table`] is set, [`Error::UnsortedTable`] for a table that is
    /// not strictly sorted. The context is unchanged on error.
    ///
    /// # Safety
    ///
    /// Resolution writes each entry's function into the slots of matching requests, and
    /// [`crate::SpecializedSlot::get`] turns it back into a typed function pointer. Every entry
    /// must therefore refer to a function with exactly the signature of the generic function
    /// its function id belongs to.
    pub unsafe fn install_lookup_table(&mut self, table: LookupTable) -> Result<()> {
        if self.specialized {
            return Err(Error::AlreadySpecialized);
        }
        if self.config.validate_table {
            table.validate()?;
        }

        debug!("installing lookup table with {} entries", table.len());
        self.table = table;
        self.specialized = true;
        Ok(())
    }

    /// Hand a request to the protocol.
    ///
    /// Before specialization the request is linked at the head of the pending list. After
    /// specialization it is resolved against the lookup table instead and never queued.
    /// Either way the returned handle owns the request.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailed`] if the request cannot be stored; nothing is queued
    /// and no slot is written.
    pub fn submit(&mut self, request: Request) -> Result<RequestHandle> {
        if self.specialized {
            let handle = self.queue.insert_detached(request)?;
            if let Some(request) = self.queue.get(handle) {
                self.resolve(request);
            }
            return Ok(handle);
        }

        let func_id = request.func_id();
        let arglen = request.args().len();
        let handle = self.queue.push_front(request)?;
        debug!("queued request {handle} for function {func_id} ({arglen} argument bytes)");
        Ok(handle)
    }

    /// Release a request and its argument buffer.
    ///
    /// Works for queued requests and for requests that were resolved without being queued.
    /// Returns `false` for a handle that was already released.
    pub fn release(&mut self, handle: RequestHandle) -> bool {
        let released = self.queue.release(handle);
        if let Some(request) = &released {
            debug!(
                "released request {handle} for function {}",
                request.func_id()
            );
        }
        released.is_some()
    }

    /// Look `request` up in the table without touching its slot.
    #[must_use]
    pub fn find(&self, request: &Request) -> Option<&LookupEntry> {
        self.table.find(&request.key())
    }

    /// Match `request` against the table and, on a hit, write the specialized function into
    /// its slot. A miss leaves the slot as it was.
    pub fn resolve(&self, request: &Request) -> Option<FuncRef> {
        match self.find(request) {
            Some(entry) => {
                debug!(
                    "resolved function {} to {}",
                    request.func_id(),
                    entry.specialized()
                );
                request.write_slot(entry.specialized());
                Some(entry.specialized())
            }
            None => {
                debug!("no specialization for function {}", request.func_id());
                None
            }
        }
    }

    /// The request behind `handle`, if it has not been released.
    #[must_use]
    pub fn get(&self, handle: RequestHandle) -> Option<&Request> {
        self.queue.get(handle)
    }

    /// Iterate the pending list from the head.
    #[must_use]
    pub fn pending(&self) -> queue::Iter<'_> {
        self.queue.iter()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lookup::LookupEntry,
        request::{request, Runtime, Specialize, SpecializedSlot},
        FnPtr,
    };

    fn generic(a: u32, b: u64) -> u64 {
        u64::from(a) + b
    }

    fn fast(_a: u32, b: u64) -> u64 {
        b + 1000
    }

    type Target = fn(u32, u64) -> u64;

    fn submit(
        ctx: &mut SpecializationContext,
        slot: &SpecializedSlot<Target>,
        value: u32,
    ) -> RequestHandle {
        request(ctx, slot, generic, 5, (Specialize(value), Runtime::new())).unwrap()
    }

    fn args_for(value: u32) -> Vec<u8> {
        let mut ctx = SpecializationContext::new();
        let slot = SpecializedSlot::<Target>::new();
        let handle = submit(&mut ctx, &slot, value);
        ctx.get(handle).unwrap().args().to_vec()
    }

    fn specialized_context() -> SpecializationContext {
        let table = LookupTable::new(vec![LookupEntry::new(
            5,
            args_for(1),
            (fast as Target).func_ref(),
        )])
        .unwrap();

        let mut ctx = SpecializationContext::new();
        unsafe { ctx.install_lookup_table(table).unwrap() };
        ctx
    }

    #[test]
    fn queues_before_specialization() {
        let mut ctx = SpecializationContext::new();
        let slot = SpecializedSlot::<Target>::new();
        let first = submit(&mut ctx, &slot, 1);
        let second = submit(&mut ctx, &slot, 2);

        assert!(!ctx.is_specialized());
        assert_eq!(ctx.pending_len(), 2);
        assert_eq!(ctx.pending().next().map(|(handle, _)| handle), Some(second));
        assert!(!slot.is_resolved());

        assert!(ctx.release(first));
        assert!(!ctx.release(first));
        assert_eq!(ctx.pending_len(), 1);
        ctx.queue().validate().unwrap();
    }

    #[test]
    fn resolves_after_specialization() {
        let mut ctx = specialized_context();

        let hit = SpecializedSlot::<Target>::new();
        let handle = submit(&mut ctx, &hit, 1);
        assert_eq!(hit.get_or(generic)(1, 1), 1001);
        assert_eq!(ctx.pending_len(), 0);
        assert!(ctx.get(handle).is_some());
        assert!(ctx.release(handle));
        ctx.queue().validate().unwrap();

        let miss = SpecializedSlot::<Target>::new();
        let handle = submit(&mut ctx, &miss, 2);
        assert!(!miss.is_resolved());
        assert_eq!(miss.get_or(generic)(2, 1), 3);
        assert!(ctx.release(handle));
    }

    #[test]
    fn install_only_once() {
        let mut ctx = specialized_context();
        let result = unsafe { ctx.install_lookup_table(LookupTable::empty()) };
        assert!(matches!(result, Err(Error::AlreadySpecialized)));
        assert_eq!(ctx.lookup_table().len(), 1);
    }

    #[test]
    fn install_validates_order() {
        let func = (fast as Target).func_ref();
        let table = LookupTable::new_unchecked(vec![
            LookupEntry::new(9, vec![], func),
            LookupEntry::new(1, vec![], func),
        ]);

        let mut ctx = SpecializationContext::new();
        let result = unsafe { ctx.install_lookup_table(table.clone()) };
        assert!(matches!(result, Err(Error::UnsortedTable { index: 1 })));
        assert!(!ctx.is_specialized());

        let mut ctx = SpecializationContext::with_config(RuntimeConfig::minimal());
        assert!(unsafe { ctx.install_lookup_table(table) }.is_ok());
        assert!(ctx.is_specialized());
    }

    #[test]
    fn queued_requests_survive_installation() {
        let mut ctx = SpecializationContext::new();
        let slot = SpecializedSlot::<Target>::new();
        let handle = submit(&mut ctx, &slot, 1);

        unsafe { ctx.install_lookup_table(LookupTable::empty()).unwrap() };
        assert_eq!(ctx.pending_len(), 1);
        assert!(ctx.release(handle));
        assert_eq!(ctx.pending_len(), 0);
    }
}
