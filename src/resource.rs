//! Memory resources backing the allocators.
//!
//! In order to facilitate operation in many different environments, this crate
//! does not use the `alloc` crate. Instead, allocators get their memory from a
//! [`MemoryResource`], which only has to hand out and take back raw blocks.
//!
//! With the `nightly` feature, you can use any type that implements
//! [`core::alloc::Allocator`]. With the `std` feature, [`SystemResource`]
//! forwards to the global allocator. Alternatively, you can implement the
//! trait yourself, for example over a static buffer or a page allocator.

use core::ptr::NonNull;

use crate::layout::Layout;

/// A general purpose source of raw memory.
///
/// # Implementing
/// Only [`allocate`](MemoryResource::allocate) and
/// [`deallocate`](MemoryResource::deallocate) are required. A resource that
/// cannot satisfy a request returns `None`; it must never panic or abort.
///
/// # Safety
/// Blocks returned by `allocate` must be valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and must not overlap any
/// other live block from the same resource. This follows the rules of
/// [`core::alloc::Allocator`].
pub unsafe trait MemoryResource {
    /// Allocate a block that satisfies `layout`.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;
    /// Free a block previously returned by this resource.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`allocate`](MemoryResource::allocate)
    /// on this resource with the same `layout`, and must not have been freed
    /// since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocate a zeroed block that satisfies `layout`.
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.allocate(layout)?;
        unsafe { ptr.as_ptr().write_bytes(0, layout.size()) };
        Some(ptr)
    }
}

#[cfg(feature = "nightly")]
unsafe impl<T: core::alloc::Allocator> MemoryResource for T {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = <Self as core::alloc::Allocator>::allocate(self, layout.to_core());
        ptr.map(|ptr| ptr.cast()).ok()
    }
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = <Self as core::alloc::Allocator>::allocate_zeroed(self, layout.to_core());
        ptr.map(|ptr| ptr.cast()).ok()
    }
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { <Self as core::alloc::Allocator>::deallocate(self, ptr, layout.to_core()) }
    }
}

#[cfg(any(test, feature = "std"))]
#[derive(Clone, Copy, Debug, Default)]
/// The process-wide allocator from [`std::alloc`].
pub struct SystemResource;

#[cfg(any(test, feature = "std"))]
unsafe impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { std::alloc::alloc(layout.to_core()) })
    }
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { std::alloc::alloc_zeroed(layout.to_core()) })
    }
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout.to_core()) }
    }
}
