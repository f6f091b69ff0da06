//! Error types used across the crate.

use core::fmt::Display;

/// [`core::result::Result`] with [`Error`] as the error type.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
/// An error returned from a function in this crate.
///
/// A failed call never changes the allocation it was asked to work on.
pub enum Error {
    /// The backing memory could not satisfy the request.
    OutOfMemory,
    /// Storage for allocator bookkeeping, such as a destruction callback
    /// entry, could not be allocated.
    AllocatorError,
    /// Attempted to create a zero-sized region or allocation.
    AllocZeroSize,
    /// The specified alignment was not a power of two.
    InvalidAlignment,
    /// Expansion and shrinking were both requested for the same side of a
    /// block.
    ConflictingFlags,
    /// The resize cannot be satisfied: it would shrink the block to nothing,
    /// the preferred amount is below the required one, or the resulting size
    /// overflows.
    InfeasibleResize,
    /// The allocator does not support this operation.
    Unsupported,
    /// A stacklike allocator can only resize its most recent allocation.
    NotStackTop,
}
impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::AllocatorError => write!(f, "could not allocate allocator bookkeeping"),
            Self::AllocZeroSize => write!(f, "attempted to allocate a zero-sized block"),
            Self::InvalidAlignment => write!(f, "the alignment was not a power of two"),
            Self::ConflictingFlags => {
                write!(f, "expand and shrink were both requested for one side")
            }
            Self::InfeasibleResize => write!(f, "the resize request cannot be satisfied"),
            Self::Unsupported => write!(f, "the allocator does not support this operation"),
            Self::NotStackTop => write!(f, "the block is not the top of the stack"),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Error {}
