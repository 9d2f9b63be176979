// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'request/mod.rs' restores typed function pointers from erased references
// - 'io/physical.rs' uses mmap to map a file into memory
// - 'intrinsics.rs' declares the specializer's imports and raw stack slot accessors

//! # specreq
//!
//! Guest-side runtime for partial-evaluation specialization requests.
//!
//! A program built on `specreq` declares, at points it chooses, that a function should be
//! specialized against some of its arguments: exact values, or the current contents of a
//! constant memory region. Other arguments stay generic. An external specializer snapshots
//! the program, walks the pending requests, generates the specialized functions and patches
//! a sorted lookup table back into the program. When the patched program runs, the very same
//! call sites find their specialization in that table and call it instead of the generic
//! implementation.
//!
//! ## Features
//!
//! - **Deterministic encoding** - Argument dispositions serialize to byte-identical buffers
//!   across runs, with zeroed union bytes and padding
//! - **Typed requests** - Argument wrappers are checked against the target's parameter list at
//!   compile time
//! - **Safe queue** - Generation-checked handles over an arena instead of raw list pointers
//! - **Exact matching** - Binary search over a strictly ordered table with a single comparator
//! - **Guest image codec** - The 32-bit record layout the specializer reads and patches
//!
//! ## Quick Start
//!
//! ```rust
//! use specreq::prelude::*;
//!
//! fn interpret(code: *const u8, len: u32, input: u64) -> u64 {
//!     // a bytecode interpreter over `len` bytes at `code`
//!     input + u64::from(len)
//! }
//!
//! let program = [0x01, 0x02, 0x03];
//! let mut ctx = SpecializationContext::new();
//! let slot = SpecializedSlot::<fn(*const u8, u32, u64) -> u64>::new();
//!
//! // Ask for `interpret` specialized on this program, with a runtime input.
//! let handle = request(
//!     &mut ctx,
//!     &slot,
//!     interpret,
//!     7,
//!     (
//!         SpecializeMemory::new(&program),
//!         Specialize(program.len() as u32),
//!         Runtime::new(),
//!     ),
//! )?;
//!
//! // Until a specialization is installed the generic implementation runs.
//! let run = slot.get_or(interpret);
//! assert_eq!(run(program.as_ptr(), 3, 10), 13);
//!
//! ctx.release(handle);
//! # Ok::<(), specreq::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`encoding`] - Argument descriptor wire format, [`encoding::ArgWriter`] and
//!   [`encoding::ArgReader`]
//! - [`request`] - [`Request`], typed slots and the builder façade
//! - [`queue`] - Pending request arena and list
//! - [`lookup`] - Identity key ordering and the lookup table
//! - [`context`] - [`SpecializationContext`], the process-wide state
//! - [`image`] - Guest memory layout of queue and table
//! - [`intrinsics`] - Specializer intrinsics for interpreter loops
//! - [`prelude`] - Common re-exports
//!
//! ## Two Runs, One Binary
//!
//! Before specialization, [`SpecializationContext::submit`] links every request into the
//! pending list. After [`SpecializationContext::install_lookup_table`], submission resolves
//! each request against the table instead and nothing is queued. Requests are owned by their
//! creator in both runs and released with [`SpecializationContext::release`].
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Failing to build a request never leaves
//! anything queued, and a lookup miss is not an error; in both cases the program keeps
//! calling its generic implementation.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use specreq::prelude::*;
///
/// let ctx = SpecializationContext::new();
/// assert!(!ctx.is_specialized());
/// ```
pub mod prelude;

/// Runtime configuration for request construction and table installation
pub mod config;

/// Little-endian primitive access, a cursor parser and memory-mapped file access
pub mod io;

/// Serialization of argument dispositions into request argument buffers
///
/// # Examples
///
/// ```rust
/// use specreq::encoding::{ArgDescriptor, ArgWriter};
///
/// let mut writer = ArgWriter::new();
/// writer.write_descriptor(&ArgDescriptor::Buffer(&[1, 2, 3]))?;
/// assert_eq!(writer.len(), 24);
/// # Ok::<(), specreq::Error>(())
/// ```
pub mod encoding;

pub mod request;

pub mod queue;

pub mod lookup;

pub mod context;

pub mod image;

pub mod intrinsics;

/// `specreq` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `specreq` Error type
///
/// # Examples
///
/// ```rust
/// use specreq::{encoding::ArgWriter, Error};
///
/// let mut writer = ArgWriter::new();
/// match writer.allocate(usize::MAX) {
///     Err(Error::CapacityExceeded { limit, .. }) => println!("cap is {limit} bytes"),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

/// Runtime configuration
pub use config::RuntimeConfig;

/// Process-wide specialization state
pub use context::SpecializationContext;

/// Hard cap on one request's argument buffer
pub use encoding::MAX_ARG_BYTES;

/// Lookup table and entries
pub use lookup::{IdentityKey, LookupEntry, LookupTable};

/// Request handles
pub use queue::RequestHandle;

/// Requests, function references and slots
pub use request::{FnPtr, FuncRef, Request, SpecializedSlot};
