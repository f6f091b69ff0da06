//! The shape of an allocation request.

use core::mem::size_of;

/// The alignment used when a caller does not ask for one.
///
/// Two machine words, which is what general purpose `malloc`
/// implementations guarantee.
pub const DEFAULT_ALIGN: usize = 2 * size_of::<usize>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The size and alignment of a block.
///
/// # Usage
/// For a standard Rust type, you can simply use `Layout::new::<T>()`. This
/// type also implements `From<`[`core::alloc::Layout`]`>`. For raw byte
/// buffers use [`Layout::from_size_align`], or [`Layout::from_size`] to get
/// [`DEFAULT_ALIGN`].
pub struct Layout {
    size: usize,
    align: usize,
}
impl Layout {
    /// Constructs a new layout from a size and an alignment.
    ///
    /// The size must be non-zero, and the alignment must be a power of two. If
    /// either of these conditions is not met, or the size rounded up to the
    /// alignment would exceed `isize::MAX`, this function returns `None`.
    pub const fn from_size_align(size: usize, align: usize) -> Option<Self> {
        if !align.is_power_of_two() {
            return None;
        }
        if size == 0 || size > isize::MAX as usize - (align - 1) {
            return None;
        }
        Some(Self { size, align })
    }
    /// Constructs a new layout with [`DEFAULT_ALIGN`].
    pub const fn from_size(size: usize) -> Option<Self> {
        Self::from_size_align(size, DEFAULT_ALIGN)
    }
    /// Constructs a new layout that matches a standard Rust type.
    ///
    /// Zero-sized types get a size of one byte.
    pub const fn new<T>() -> Self {
        let core_layout = core::alloc::Layout::new::<T>();
        Self {
            size: if core_layout.size() == 0 {
                1
            } else {
                core_layout.size()
            },
            align: core_layout.align(),
        }
    }

    /// Queries the size of this layout.
    ///
    /// The size is non-zero.
    pub const fn size(&self) -> usize {
        self.size
    }
    /// Queries the alignment of this layout.
    ///
    /// The alignment is a power of two.
    pub const fn align(&self) -> usize {
        self.align
    }

    pub(crate) fn to_core(self) -> core::alloc::Layout {
        // SAFETY: every constructor keeps the alignment a power of two and the
        // rounded size within `isize::MAX`.
        unsafe { core::alloc::Layout::from_size_align_unchecked(self.size, self.align) }
    }
}
impl From<core::alloc::Layout> for Layout {
    fn from(core_layout: core::alloc::Layout) -> Self {
        Self {
            size: core_layout.size().max(1),
            align: core_layout.align(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_requests() {
        assert!(Layout::from_size_align(0, 8).is_none());
        assert!(Layout::from_size_align(8, 0).is_none());
        assert!(Layout::from_size_align(8, 12).is_none());
        let layout = Layout::from_size_align(100, 8).unwrap();
        assert_eq!((layout.size(), layout.align()), (100, 8));
    }

    #[test]
    fn defaults() {
        assert_eq!(Layout::from_size(3).unwrap().align(), DEFAULT_ALIGN);
        assert_eq!(Layout::new::<()>().size(), 1);
        assert_eq!(Layout::new::<u64>().align(), core::mem::align_of::<u64>());
    }
}
