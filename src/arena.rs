//! A monotonic allocator that only frees everything at once.

use core::{
    cell::UnsafeCell,
    fmt::Debug,
    mem::{align_of, size_of},
    ptr::NonNull,
};

use crate::{
    callbacks::{CallbackEntry, CallbackList, DestructionCallback},
    error::{Error, Result},
    flags::FeatureFlags,
    layout::Layout,
    lock::Lock,
    options::ReallocateOptions,
    region::Region,
    resource::MemoryResource,
    result::{Allocation, Reallocation},
    Allocator,
};

/// A bump allocator over a fixed region.
///
/// Allocation is a pointer bump under the lock. Individual blocks can never
/// be freed or resized; the whole arena is reset by
/// [`clear`](Allocator::clear), which first runs the destruction callbacks.
pub struct ArenaAllocator<'label, R: MemoryResource, L: Lock> {
    label: &'label str,
    lock: L,
    inner: UnsafeCell<ArenaInner>,
    resource: R,
}

struct ArenaInner {
    region: Region,
    callbacks: CallbackList,
}

impl<'label, R: MemoryResource, L: Lock> ArenaAllocator<'label, R, L> {
    /// Everything an arena allocator supports.
    pub const FEATURES: FeatureFlags = FeatureFlags::CLEARING
        .union(FeatureFlags::THREADSAFE)
        .union(FeatureFlags::CALLBACKS)
        .union(FeatureFlags::NOTHROW);

    /// Create an arena of `capacity` bytes taken from `resource`.
    ///
    /// # Returns
    /// - [`Error::AllocZeroSize`] - the capacity is zero.
    /// - [`Error::OutOfMemory`] - the resource could not provide the region.
    pub fn create(label: &'label str, capacity: usize, resource: R) -> Result<Self> {
        let region = Region::create(&resource, capacity)?;
        Ok(Self {
            label,
            lock: L::default(),
            inner: UnsafeCell::new(ArenaInner {
                region,
                callbacks: CallbackList::EMPTY,
            }),
            resource,
        })
    }

    /// Get the label for this allocator.
    pub fn label(&self) -> &'label str {
        self.label
    }

    /// Get the space taken by blocks and callback entries.
    pub fn used_space(&self) -> usize {
        let guard = self.lock.lock();
        let used = unsafe { &*self.inner.get() }.region.used();
        drop(guard);
        used
    }

    /// Get the space still available.
    pub fn free_space(&self) -> usize {
        let guard = self.lock.lock();
        let free = unsafe { &*self.inner.get() }.region.free();
        drop(guard);
        free
    }
}

unsafe impl<'label, R: MemoryResource, L: Lock> Allocator for ArenaAllocator<'label, R, L> {
    fn allocate(&self, layout: Layout) -> Result<Allocation> {
        let guard = self.lock.lock();
        let inner = unsafe { &mut *self.inner.get() };
        let data = inner
            .region
            .bump(layout.size(), layout.align(), 0)
            .map(|(offset, _)| unsafe { inner.region.at(offset) });
        drop(guard);

        let data = data.ok_or(Error::OutOfMemory)?;
        log::trace!(
            "{}: bumped {:#x} bytes at {:p}",
            self.label,
            layout.size(),
            data
        );
        Ok(Allocation::new(data, layout.size()))
    }

    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation> {
        log::trace!(
            "{}: refusing to resize {:p}",
            self.label,
            options.data()
        );
        Err(Error::Unsupported)
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, _layout: Layout) {
        debug_assert!(
            self.features().contains(FeatureFlags::FREE_AND_REALLOC),
            "{}: an arena cannot free {:p} on its own",
            self.label,
            data
        );
        log::warn!("{}: ignoring free of {:p}", self.label, data);
    }

    unsafe fn clear(&self) {
        let guard = self.lock.lock();
        let inner = &mut *self.inner.get();
        // Entries live in the region, so they stay valid until the reset.
        let ran = inner.callbacks.take().run(|_| {});
        inner.region.reset();
        drop(guard);

        log::debug!("{}: cleared, ran {} destruction callbacks", self.label, ran);
    }

    fn features(&self) -> FeatureFlags {
        Self::FEATURES
    }

    unsafe fn register_destruction_callback(
        &self,
        user_data: *mut (),
        callback: DestructionCallback,
    ) -> Result<()> {
        let guard = self.lock.lock();
        let inner = &mut *self.inner.get();
        let entry = inner
            .region
            .carve_tail(size_of::<CallbackEntry>(), align_of::<CallbackEntry>())
            .ok_or(Error::AllocatorError)?;
        inner.callbacks.push(entry.cast(), user_data, callback);
        drop(guard);

        Ok(())
    }
}

impl<'label, R: MemoryResource, L: Lock> Debug for ArenaAllocator<'label, R, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Arena allocator {} with:", self.label)?;
        let guard = self.lock.lock();

        let inner = unsafe { &*self.inner.get() };
        writeln!(f, "  Region at {:p} (len: {:#x})", inner.region.base(), inner.region.capacity())?;
        writeln!(f, "  Used: {:#x}", inner.region.used())?;

        drop(guard);

        Ok(())
    }
}
impl<'label, R: MemoryResource, L: Lock> Drop for ArenaAllocator<'label, R, L> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let ran = unsafe { inner.callbacks.take().run(|_| {}) };
        if ran != 0 {
            log::debug!("{}: ran {} destruction callbacks", self.label, ran);
        }
        unsafe { inner.region.release(&self.resource) };
    }
}
unsafe impl<'label, R: MemoryResource + Sync, L: Lock + Sync> Sync
    for ArenaAllocator<'label, R, L>
{
}
unsafe impl<'label, R: MemoryResource + Send, L: Lock + Send> Send
    for ArenaAllocator<'label, R, L>
{
}

#[cfg(test)]
mod tests {
    use std::sync::{Barrier, Mutex};

    use super::*;
    use crate::resource::SystemResource;

    fn create_arena() -> ArenaAllocator<'static, SystemResource, Mutex<()>> {
        ArenaAllocator::create("arena", 0x100, SystemResource).unwrap()
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn bump() {
        let arena = create_arena();
        let first = arena.allocate(layout(0x10)).unwrap();
        let second = arena.allocate(layout(0x10)).unwrap();
        println!("{arena:?}");
        assert_eq!(
            second.data().as_ptr() as usize - first.data().as_ptr() as usize,
            0x10
        );
        assert_eq!(arena.used_space(), 0x20);
        assert_eq!(arena.allocate(layout(0x100)), Err(Error::OutOfMemory));
    }

    #[test]
    fn reallocate_is_unsupported() {
        let arena = create_arena();
        let block = arena.allocate(layout(0x10)).unwrap();
        unsafe { block.data().as_ptr().write_bytes(0xab, 0x10) };
        let options = ReallocateOptions::new(block.data(), 0x10, 8).expand_back(8, 8);
        assert_eq!(
            unsafe { arena.reallocate(&options) },
            Err(Error::Unsupported)
        );
        let bytes = unsafe { core::slice::from_raw_parts(block.data().as_ptr(), 0x10) };
        assert!(bytes.iter().all(|&b| b == 0xab));
        assert_eq!(arena.used_space(), 0x10);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn deallocate_is_unsupported() {
        let arena = create_arena();
        let block = arena.allocate(layout(0x10)).unwrap();
        unsafe { arena.deallocate(block.data(), layout(0x10)) };
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn deallocate_is_noop() {
        let arena = create_arena();
        let block = arena.allocate(layout(0x10)).unwrap();
        unsafe { arena.deallocate(block.data(), layout(0x10)) };
        assert_eq!(arena.used_space(), 0x10);
        let next = arena.allocate(layout(0x10)).unwrap();
        assert_ne!(next.data(), block.data());
    }

    #[test]
    fn clear_resets() {
        static RAN: portable_atomic::AtomicUsize = portable_atomic::AtomicUsize::new(0);
        unsafe fn count(_: *mut ()) {
            RAN.fetch_add(1, portable_atomic::Ordering::Relaxed);
        }

        let arena = create_arena();
        let first = arena.allocate(layout(0x10)).unwrap();
        unsafe { arena.register_destruction_callback(core::ptr::null_mut(), count) }.unwrap();
        unsafe { arena.clear() };
        assert_eq!(RAN.load(portable_atomic::Ordering::Relaxed), 1);
        assert_eq!(arena.used_space(), 0);
        let again = arena.allocate(layout(0x10)).unwrap();
        assert_eq!(again.data(), first.data());
    }

    #[test]
    fn shared_between_threads() {
        let arena = create_arena();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    arena.allocate(layout(0x10)).unwrap();
                });
            }
        });
        assert_eq!(arena.used_space(), 0x40);
    }

    #[test]
    fn registration_waits_for_clear() {
        static RAN: portable_atomic::AtomicUsize = portable_atomic::AtomicUsize::new(0);
        unsafe fn wait(user_data: *mut ()) {
            (*(user_data as *const Barrier)).wait();
        }
        unsafe fn count(_: *mut ()) {
            RAN.fetch_add(1, portable_atomic::Ordering::Relaxed);
        }

        let arena = create_arena();
        let barrier = Barrier::new(2);
        let user_data = &barrier as *const Barrier as *mut ();
        unsafe { arena.register_destruction_callback(user_data, wait) }.unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| unsafe { arena.clear() });
            scope.spawn(|| {
                // The clearing thread is now inside the callback.
                barrier.wait();
                unsafe { arena.register_destruction_callback(core::ptr::null_mut(), count) }
                    .unwrap();
            });
        });

        // The entry registered mid-clear survived the reset.
        assert_eq!(arena.used_space(), size_of::<CallbackEntry>());
        assert_eq!(arena.allocate(layout(0x100)), Err(Error::OutOfMemory));
        let rest = arena.allocate(layout(arena.free_space())).unwrap();
        unsafe { rest.data().as_ptr().write_bytes(0xff, rest.size()) };

        unsafe { arena.clear() };
        assert_eq!(RAN.load(portable_atomic::Ordering::Relaxed), 1);
        assert_eq!(arena.used_space(), 0);
    }
}
