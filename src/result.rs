//! Successful outcomes of allocation requests.
//!
//! Failures are reported as [`Error`](crate::Error)s, so a value of these
//! types always describes live memory.

use core::ptr::NonNull;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A block returned by [`Allocator::allocate`](crate::Allocator::allocate).
///
/// The caller owns the bytes until it hands them back through
/// [`deallocate`](crate::Allocator::deallocate) or
/// [`reallocate`](crate::Allocator::reallocate).
pub struct Allocation {
    data: NonNull<u8>,
    size: usize,
}
impl Allocation {
    pub(crate) const fn new(data: NonNull<u8>, size: usize) -> Self {
        Self { data, size }
    }

    /// The base of the block.
    pub const fn data(&self) -> NonNull<u8> {
        self.data
    }
    /// The granted size, which is at least the requested size.
    pub const fn size(&self) -> usize {
        self.size
    }
    /// The block as a raw byte slice.
    pub fn as_slice_ptr(&self) -> NonNull<[u8]> {
        NonNull::slice_from_raw_parts(self.data, self.size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A block returned by [`Allocator::reallocate`](crate::Allocator::reallocate).
pub struct Reallocation {
    data: NonNull<u8>,
    size: usize,
    original: Option<NonNull<u8>>,
    kept: bool,
}
impl Reallocation {
    pub(crate) const fn new(
        data: NonNull<u8>,
        size: usize,
        original: Option<NonNull<u8>>,
        kept: bool,
    ) -> Self {
        Self {
            data,
            size,
            original,
            kept,
        }
    }

    /// The base of the resized block.
    pub const fn data(&self) -> NonNull<u8> {
        self.data
    }
    /// The new granted size.
    pub const fn size(&self) -> usize {
        self.size
    }
    /// Where the first byte of the old block now lives.
    ///
    /// This is [`data`](Reallocation::data) unless the front was expanded, in
    /// which case it lies `required_front` bytes further in. If the front was
    /// shrunk, the old first byte is gone and this is `None`.
    pub const fn data_original_offset(&self) -> Option<NonNull<u8>> {
        self.original
    }
    /// Whether the old block is still alive as a separate allocation.
    ///
    /// Only ever `true` when
    /// [`KEEP_OLD_NOCOPY`](crate::ReallocFlags::KEEP_OLD_NOCOPY) was
    /// requested. The old block keeps its contents and must eventually be
    /// freed by the caller.
    pub const fn kept(&self) -> bool {
        self.kept
    }
    /// Forget the resize details and keep only the block.
    pub const fn into_allocation(self) -> Allocation {
        Allocation::new(self.data, self.size)
    }
}
