//! # specreq Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the specreq library. Import it to build and submit specialization requests.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all specreq operations
pub use crate::Error;

/// The result type used throughout specreq
pub use crate::Result;

/// Configuration for request construction and table installation
pub use crate::RuntimeConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Process-wide specialization state
pub use crate::SpecializationContext;

/// Owning handle to a submitted request
pub use crate::RequestHandle;

// ================================================================================================
// Requests
// ================================================================================================

/// Requests, erased function references and typed destination slots
pub use crate::request::{FnPtr, FuncRef, Request, SpecializedSlot};

/// Argument-kind wrappers
pub use crate::request::{Runtime, Specialize, SpecializeMemory};

/// Request construction
pub use crate::request::{request, ArgList, ArgSpec, RequestBuilder, SpecializeValue};

// ================================================================================================
// Lookup
// ================================================================================================

/// Resolved specializations
pub use crate::lookup::{IdentityKey, LookupEntry, LookupTable};
