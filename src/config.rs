//! Runtime configuration for request construction and table installation.

use crate::encoding::MAX_ARG_BYTES;

/// Configuration for a [`crate::SpecializationContext`].
///
/// The argument buffer cap can only be lowered below [`MAX_ARG_BYTES`]; larger values are
/// clamped, since the external specializer relies on that bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound for one request's encoded argument buffer (default: 1 MiB)
    pub max_arg_bytes: usize,

    /// Capacity reserved by the encoder on its first growth (default: 1024)
    pub initial_capacity: usize,

    /// Reject requests whose argument count differs from the target's arity
    pub check_arity: bool,

    /// Re-verify strict key ordering when a lookup table is installed
    pub validate_table: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_arg_bytes: MAX_ARG_BYTES,
            initial_capacity: 1024,
            check_arity: true,
            validate_table: true,
        }
    }
}

impl RuntimeConfig {
    /// Minimal checking, for initialization code that already trusts its inputs
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            check_arity: false,
            validate_table: false,
            ..Self::default()
        }
    }

    /// All checks enabled with a smaller argument cap of 64 KiB
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_arg_bytes: 64 * 1024,
            ..Self::default()
        }
    }

    /// Set the argument buffer cap, clamped to [`MAX_ARG_BYTES`].
    #[must_use]
    pub fn with_max_arg_bytes(mut self, max: usize) -> Self {
        self.max_arg_bytes = max.min(MAX_ARG_BYTES);
        self
    }

    /// The effective argument cap after clamping.
    #[must_use]
    pub fn arg_limit(&self) -> usize {
        self.max_arg_bytes.min(MAX_ARG_BYTES)
    }
}
