use std::collections::TryReserveError;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure on the request construction path is reported through this type and never
/// aborts the process. A failed construction leaves no request queued; callers fall back to
/// the generic implementation. A lookup miss is *not* an error and is reported as `None`
/// by [`crate::LookupTable::find`] instead.
///
/// # Error Categories
///
/// ## Request Construction
/// - [`Error::CapacityExceeded`] - The argument buffer would grow past its hard cap
/// - [`Error::AllocationFailed`] - The allocator refused to grow the argument buffer
/// - [`Error::ArityMismatch`] - Argument list length differs from the target's parameter count
///
/// ## Image and Buffer Decoding
/// - [`Error::OutOfBounds`] - A read would have run past the end of the data
/// - [`Error::Malformed`] - A record or argument buffer has an invalid structure
/// - [`Error::InvalidArgType`] - Unknown argument type tag in an encoded descriptor
/// - [`Error::UnsortedTable`] - A lookup table violates the comparator ordering
///
/// ## Lifecycle
/// - [`Error::AlreadySpecialized`] - A second lookup table installation was attempted
///
/// ## I/O
/// - [`Error::FileError`] - Filesystem errors while loading an image dump
///
/// # Examples
///
/// ```rust
/// use specreq::{encoding::ArgWriter, Error};
///
/// let mut writer = ArgWriter::new();
/// match writer.allocate(2 * 1024 * 1024) {
///     Err(Error::CapacityExceeded { requested, limit }) => {
///         assert!(requested > limit);
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The argument buffer would exceed its hard size cap.
    ///
    /// Raised by the encoder before any memory is reserved, so the buffer keeps the
    /// contents it had before the failing call.
    #[error("Argument buffer of {requested} bytes exceeds the limit of {limit} bytes")]
    CapacityExceeded {
        /// Total buffer size the failing call would have produced
        requested: usize,
        /// The active cap
        limit: usize,
    },

    /// Growing the argument buffer failed in the allocator.
    #[error("Failed to grow argument buffer - {0}")]
    AllocationFailed(#[from] TryReserveError),

    /// The number of argument wrappers does not match the target function's arity.
    #[error("Target takes {expected} arguments, request describes {found}")]
    ArityMismatch {
        /// Parameter count of the target function
        expected: usize,
        /// Number of argument wrappers supplied
        found: usize,
    },

    /// An out of bound access was attempted while decoding.
    ///
    /// # Fields
    ///
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The data is damaged and could not be decoded.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An encoded descriptor carries an unknown type tag.
    #[error("Unknown argument type tag - {0}")]
    InvalidArgType(u32),

    /// A lookup table is not strictly ordered by identity key.
    ///
    /// `index` is the first entry that does not sort strictly after its predecessor.
    #[error("Lookup table is not strictly sorted at entry {index}")]
    UnsortedTable {
        /// Index of the offending entry
        index: usize,
    },

    /// A lookup table was already installed; the specialized state is populated only once.
    #[error("A lookup table has already been installed")]
    AlreadySpecialized,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
