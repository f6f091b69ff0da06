#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, doc, feature = "std")), no_std)]
#![cfg_attr(feature = "nightly", feature(allocator_api))]
#![deny(missing_docs)]

use core::ptr::NonNull;

pub use crate::callbacks::DestructionCallback;

#[doc(inline)]
pub use arena::*;
#[doc(inline)]
pub use error::*;
#[doc(inline)]
pub use flags::*;
#[doc(inline)]
pub use layout::*;
#[doc(inline)]
pub use lock::*;
#[doc(inline)]
pub use options::*;
#[doc(inline)]
pub use resource::*;
#[doc(inline)]
pub use result::*;
#[doc(inline)]
pub use stack::*;
#[doc(inline)]
pub use system::*;
#[doc(inline)]
pub use wrap::*;

pub mod arena;
pub mod error;
pub mod flags;
pub mod layout;
pub mod lock;
pub mod options;
pub mod resource;
pub mod result;
pub mod stack;
pub mod system;
pub mod wrap;

mod allocation_table;
mod callbacks;
mod region;

/// A byte-level allocator.
///
/// Allocators are used through `&dyn Allocator` as often as through concrete
/// types, so every method takes `&self` and all failures come back as
/// [`Error`]s. A failed call never alters existing allocations.
///
/// # Capabilities
/// Not every allocator supports every operation. [`features`] reports what an
/// instance can do, and callers should check it before asking for anything
/// beyond [`allocate`]:
/// - without [`FREE_AND_REALLOC`](FeatureFlags::FREE_AND_REALLOC),
///   [`reallocate`] always fails with [`Error::Unsupported`] and
///   [`deallocate`] does nothing;
/// - without [`CLEARING`](FeatureFlags::CLEARING), [`clear`] does nothing;
/// - without [`CALLBACKS`](FeatureFlags::CALLBACKS),
///   [`register_destruction_callback`] fails.
///
/// Calling [`deallocate`] or [`clear`] on an allocator that does not support
/// them is a bug in the caller, and trips a debug assertion.
///
/// # Safety
/// Implementations must return blocks that are valid for the granted size,
/// aligned as requested, and disjoint from every other live block of the same
/// allocator.
///
/// [`features`]: Allocator::features
/// [`allocate`]: Allocator::allocate
/// [`reallocate`]: Allocator::reallocate
/// [`deallocate`]: Allocator::deallocate
/// [`clear`]: Allocator::clear
/// [`register_destruction_callback`]: Allocator::register_destruction_callback
pub unsafe trait Allocator {
    /// Allocate a block of at least `layout.size()` bytes aligned to
    /// `layout.align()`.
    ///
    /// # Returns
    /// [`Error::OutOfMemory`] if the memory is exhausted.
    fn allocate(&self, layout: Layout) -> Result<Allocation>;

    /// Resize a live block at the front, the back, or both. See
    /// [`ReallocateOptions`] for how requests are described.
    ///
    /// Unless [`KEEP_OLD_NOCOPY`](ReallocFlags::KEEP_OLD_NOCOPY) is set, the
    /// surviving bytes end up in the new block and the old block is released.
    /// With it, nothing is copied, and if the block moved the old one stays
    /// alive and [`Reallocation::kept`] is `true`.
    ///
    /// # Returns
    /// If the block could not be resized, it is left untouched and one of
    /// these errors is returned:
    /// - [`Error::ConflictingFlags`] - a side was asked to grow and shrink.
    /// - [`Error::InfeasibleResize`] - the block would shrink to nothing, a
    ///   preferred amount is below the required one, or the size overflows.
    /// - [`Error::OutOfMemory`] - there is no room for the new size.
    /// - [`Error::Unsupported`] - the allocator cannot resize blocks.
    /// - [`Error::NotStackTop`] - a stacklike allocator was asked to resize a
    ///   block other than its most recent one.
    ///
    /// # Safety
    /// The options must describe a live block from this allocator, with the
    /// alignment it was allocated with.
    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation>;

    /// Free a block.
    ///
    /// # Safety
    /// `data` and `layout` must describe a live block from this allocator,
    /// with the granted size and the requested alignment.
    unsafe fn deallocate(&self, data: NonNull<u8>, layout: Layout);

    /// Run every destruction callback, newest first, then release all
    /// outstanding allocations at once.
    ///
    /// # Safety
    /// No block from this allocator may be used afterwards.
    unsafe fn clear(&self);

    /// What this allocator supports. Constant for the lifetime of the
    /// instance.
    fn features(&self) -> FeatureFlags;

    /// Register `callback` to run with `user_data` when the allocator is
    /// cleared or dropped. The entry itself is stored in memory from this
    /// allocator.
    ///
    /// # Returns
    /// - [`Error::AllocatorError`] - no memory was left for the entry.
    /// - [`Error::Unsupported`] - the allocator does not support callbacks.
    ///
    /// # Safety
    /// The callback must be safe to run with `user_data` whenever the
    /// allocator is cleared or dropped, and must not call back into this
    /// allocator.
    unsafe fn register_destruction_callback(
        &self,
        user_data: *mut (),
        callback: DestructionCallback,
    ) -> Result<()>;

    /// Allocate `size` bytes with [`DEFAULT_ALIGN`].
    fn allocate_bytes(&self, size: usize) -> Result<Allocation> {
        self.allocate(Layout::from_size(size).ok_or(Error::AllocZeroSize)?)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Mutex;

    use super::*;

    type System = SystemAllocator<'static, SystemResource, Mutex<()>>;
    type Stack = StackAllocator<'static, SystemResource, Mutex<()>>;

    fn system() -> System {
        SystemAllocator::new("system", SystemResource)
    }

    fn stack() -> Stack {
        StackAllocator::create("stack", 0x1000, SystemResource).unwrap()
    }

    fn fill(allocation: &Allocation) {
        for i in 0..allocation.size() {
            unsafe { allocation.data().as_ptr().add(i).write(i as u8) };
        }
    }

    fn bytes(data: NonNull<u8>, len: usize) -> Vec<u8> {
        unsafe { core::slice::from_raw_parts(data.as_ptr(), len) }.to_vec()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    fn round_trip(allocator: &dyn Allocator) {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let first = allocator.allocate(layout).unwrap();
        fill(&first);
        unsafe { allocator.deallocate(first.data(), Layout::from_size_align(first.size(), 8).unwrap()) };
        let second = allocator.allocate(layout).unwrap();
        fill(&second);
        assert_eq!(bytes(second.data(), 64), pattern(64));
        unsafe { allocator.deallocate(second.data(), Layout::from_size_align(second.size(), 8).unwrap()) };
    }

    fn infeasible_is_noop(allocator: &dyn Allocator) {
        let first = allocator.allocate(Layout::from_size_align(32, 8).unwrap()).unwrap();
        fill(&first);
        let options = ReallocateOptions::new(first.data(), first.size(), 8).shrink_back(first.size());
        assert_eq!(unsafe { allocator.reallocate(&options) }, Err(Error::InfeasibleResize));
        let options = ReallocateOptions::new(first.data(), first.size(), 8).expand_back(16, 8);
        assert_eq!(unsafe { allocator.reallocate(&options) }, Err(Error::InfeasibleResize));
        assert_eq!(bytes(first.data(), 32), pattern(32));
        unsafe { allocator.deallocate(first.data(), Layout::from_size_align(first.size(), 8).unwrap()) };
    }

    fn expand_then_shrink(allocator: &dyn Allocator) {
        let first = allocator.allocate(Layout::from_size_align(40, 8).unwrap()).unwrap();
        fill(&first);
        let options = ReallocateOptions::new(first.data(), first.size(), 8).expand_back(24, 24);
        let grown = unsafe { allocator.reallocate(&options) }.unwrap();
        assert_eq!(grown.size(), first.size() + 24);
        let options = ReallocateOptions::new(grown.data(), grown.size(), 8).shrink_back(24);
        let shrunk = unsafe { allocator.reallocate(&options) }.unwrap();
        assert_eq!(shrunk.size(), first.size());
        assert_eq!(bytes(shrunk.data(), 40), pattern(40));
        unsafe { allocator.deallocate(shrunk.data(), Layout::from_size_align(shrunk.size(), 8).unwrap()) };
    }

    #[test]
    fn system_round_trip() {
        round_trip(&system());
    }

    #[test]
    fn stack_round_trip() {
        round_trip(&stack());
    }

    #[test]
    fn system_infeasible_is_noop() {
        infeasible_is_noop(&system());
    }

    #[test]
    fn stack_infeasible_is_noop() {
        infeasible_is_noop(&stack());
    }

    #[test]
    fn system_expand_then_shrink() {
        expand_then_shrink(&system());
    }

    #[test]
    fn stack_expand_then_shrink() {
        expand_then_shrink(&stack());
    }

    #[test]
    fn concrete_example() {
        let allocator = system();
        let first = allocator.allocate(Layout::from_size_align(100, 8).unwrap()).unwrap();
        assert!(first.size() >= 100);
        assert_eq!(first.data().as_ptr() as usize % 8, 0);
        fill(&first);

        let options = ReallocateOptions::new(first.data(), 100, 8)
            .with_flags(ReallocFlags::EXPAND_BACK)
            .with_required_back(50)
            .with_preferred_back(50);
        let grown = unsafe { allocator.reallocate(&options) }.unwrap();
        assert!(grown.size() >= 150);
        assert!(!grown.kept());
        assert_eq!(grown.data_original_offset(), Some(grown.data()));
        assert_eq!(bytes(grown.data(), 100), pattern(100));
        assert_eq!(allocator.usage().allocations, 1);
        unsafe { allocator.deallocate(grown.data(), Layout::from_size_align(grown.size(), 8).unwrap()) };
    }

    #[test]
    fn features_are_consistent() {
        let system = system();
        let stack = stack();
        let arena = ArenaAllocator::<_, Mutex<()>>::create("arena", 0x100, SystemResource).unwrap();
        let allocators: [&dyn Allocator; 3] = [&system, &stack, &arena];
        for allocator in allocators {
            assert!(allocator.features().is_consistent());
            assert!(allocator.features().contains(FeatureFlags::NOTHROW));
        }
    }

    struct Marker<'a> {
        id: u32,
        log: &'a RefCell<Vec<u32>>,
    }

    unsafe fn record(user_data: *mut ()) {
        let marker = &*(user_data as *const Marker);
        marker.log.borrow_mut().push(marker.id);
    }

    #[test]
    fn callbacks_in_reverse_order() {
        let log = RefCell::new(Vec::new());
        let mut markers: Vec<Marker> = (1..=3).map(|id| Marker { id, log: &log }).collect();
        let allocator = stack();
        let dyn_allocator: &dyn Allocator = &allocator;
        for marker in markers.iter_mut() {
            unsafe {
                dyn_allocator
                    .register_destruction_callback(marker as *mut Marker as *mut (), record)
                    .unwrap()
            };
        }
        unsafe { dyn_allocator.clear() };
        assert_eq!(*log.borrow(), [3, 2, 1]);
        unsafe { dyn_allocator.clear() };
        assert_eq!(*log.borrow(), [3, 2, 1]);
    }

    #[test]
    fn allocate_bytes_rejects_zero() {
        assert_eq!(system().allocate_bytes(0), Err(Error::AllocZeroSize));
        let allocator = system();
        let block = allocator.allocate_bytes(3).unwrap();
        assert_eq!(block.data().as_ptr() as usize % DEFAULT_ALIGN, 0);
        unsafe { allocator.deallocate(block.data(), Layout::from_size(3).unwrap()) };
    }
}
