//! A stacklike allocator that resizes its most recent block in place.

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

/// Every block is preceded by the cursor from before it was allocated.
const HEADER: usize = size_of::<usize>();

/// A stack allocator over a fixed region.
///
/// Blocks are handed out one after another, and only the most recent one can
/// be freed or resized. In exchange, resizing that block never moves it: the
/// base stays where it is and the stack top follows the new end. Callback
/// entries are carved from the far end of the region, so registering one does
/// not change which block is on top.
///
/// # Usage
/// ```rust
/// # use bytealloc::{Allocator, Layout, ReallocateOptions, StackAllocator, SystemResource};
/// # type Lock = std::sync::Mutex<()>;
/// let stack = StackAllocator::<_, Lock>::create("scratch", 0x1000, SystemResource).unwrap();
/// let block = stack.allocate(Layout::from_size_align(0x10, 8).unwrap()).unwrap();
///
/// let options = ReallocateOptions::new(block.data(), 0x10, 8).expand_back(0x10, 0x100);
/// let grown = unsafe { stack.reallocate(&options) }.unwrap();
/// assert_eq!(grown.data(), block.data());
/// assert_eq!(grown.size(), 0x110);
/// ```
pub struct StackAllocator<'label, R: MemoryResource, L: Lock> {
    label: &'label str,
    lock: L,
    inner: UnsafeCell<StackInner>,
    resource: R,
}

struct StackInner {
    region: Region,
    callbacks: CallbackList,
}
impl StackInner {
    /// Offset of `data` if it is the block on top of the stack.
    fn top_offset(&self, data: NonNull<u8>, size: usize) -> Option<usize> {
        self.region
            .offset_of(data)
            .filter(|&offset| offset >= HEADER && offset + size == self.region.cursor())
    }

    /// # Safety
    /// `offset` must be the data offset of a block allocated from this stack.
    unsafe fn header(&self, offset: usize) -> NonNull<usize> {
        self.region.at(offset - HEADER).cast()
    }
}

impl<'label, R: MemoryResource, L: Lock> StackAllocator<'label, R, L> {
    /// Everything a stack allocator supports.
    pub const FEATURES: FeatureFlags = FeatureFlags::FREE_AND_REALLOC
        .union(FeatureFlags::CLEARING)
        .union(FeatureFlags::IN_PLACE)
        .union(FeatureFlags::EXPAND_FRONT)
        .union(FeatureFlags::EXPAND_BACK)
        .union(FeatureFlags::SHRINK_RECLAIMS)
        .union(FeatureFlags::NOCOPY)
        .union(FeatureFlags::STACKLIKE)
        .union(FeatureFlags::CALLBACKS)
        .union(FeatureFlags::NOTHROW);

    /// Create a stack of `capacity` bytes taken from `resource`.
    ///
    /// # Parameters
    /// - `label` - a label for the allocator. This is used for debugging
    ///   purposes.
    /// - `capacity` - the size of the region, including block headers and
    ///   callback entries.
    /// - `resource` - where the region comes from. It is given back when the
    ///   stack is dropped.
    ///
    /// # Returns
    /// - [`Error::AllocZeroSize`] - the capacity is zero.
    /// - [`Error::OutOfMemory`] - the resource could not provide the region.
    pub fn create(label: &'label str, capacity: usize, resource: R) -> Result<Self> {
        let region = Region::create(&resource, capacity)?;
        Ok(Self {
            label,
            lock: L::default(),
            inner: UnsafeCell::new(StackInner {
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

    /// Get the size of the region.
    pub fn capacity(&self) -> usize {
        let guard = self.lock.lock();
        let capacity = unsafe { &*self.inner.get() }.region.capacity();
        drop(guard);
        capacity
    }

    /// Get the space taken by blocks, their headers and callback entries.
    pub fn used_space(&self) -> usize {
        let guard = self.lock.lock();
        let used = unsafe { &*self.inner.get() }.region.used();
        drop(guard);
        used
    }

    /// Get the space still available between the stack top and the callback
    /// entries.
    pub fn free_space(&self) -> usize {
        let guard = self.lock.lock();
        let free = unsafe { &*self.inner.get() }.region.free();
        drop(guard);
        free
    }
}

unsafe impl<'label, R: MemoryResource, L: Lock> Allocator for StackAllocator<'label, R, L> {
    fn allocate(&self, layout: Layout) -> Result<Allocation> {
        let align = layout.align().max(align_of::<usize>());

        let guard = self.lock.lock();
        let inner = unsafe { &mut *self.inner.get() };
        let data = inner
            .region
            .bump(layout.size(), align, HEADER)
            .map(|(offset, previous)| unsafe {
                inner.header(offset).as_ptr().write(previous);
                inner.region.at(offset)
            });
        drop(guard);

        match data {
            Some(data) => {
                log::trace!(
                    "{}: pushed {:#x} bytes at {:p}",
                    self.label,
                    layout.size(),
                    data
                );
                Ok(Allocation::new(data, layout.size()))
            }
            None => {
                log::debug!("{}: no room for {:#x} bytes", self.label, layout.size());
                Err(Error::OutOfMemory)
            }
        }
    }

    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation> {
        let plan = options.plan()?;
        let data = options.data();
        debug_assert!(
            data.as_ptr() as usize % options.align() == 0,
            "{}: {:p} is not aligned to {:#x}",
            self.label,
            data,
            options.align()
        );

        let guard = self.lock.lock();
        let inner = &mut *self.inner.get();
        let offset = inner
            .top_offset(data, options.size())
            .ok_or(Error::NotStackTop)?;

        let available = inner.region.limit() - offset;
        if plan.new_size() > available {
            return Err(Error::OutOfMemory);
        }
        let size = plan.new_size() + plan.spare_back().min(available - plan.new_size());

        if !plan.nocopy() && plan.source_offset() != plan.target_offset() {
            core::ptr::copy(
                data.as_ptr().add(plan.source_offset()),
                data.as_ptr().add(plan.target_offset()),
                plan.kept_len(),
            );
        }
        inner.region.set_cursor(offset + size);
        drop(guard);

        log::trace!(
            "{}: resized {:#x} bytes at {:p} to {:#x} bytes",
            self.label,
            options.size(),
            data,
            size
        );
        Ok(Reallocation::new(
            data,
            size,
            plan.original_offset(data),
            false,
        ))
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, layout: Layout) {
        let guard = self.lock.lock();
        let inner = &mut *self.inner.get();
        let top = inner.top_offset(data, layout.size());
        debug_assert!(
            top.is_some(),
            "{}: {:p} is not the top of the stack",
            self.label,
            data
        );
        match top {
            Some(offset) => {
                let previous = inner.header(offset).as_ptr().read();
                inner.region.set_cursor(previous);
                drop(guard);
                log::trace!("{}: popped {:#x} bytes at {:p}", self.label, layout.size(), data);
            }
            None => {
                drop(guard);
                log::warn!("{}: ignoring free of {:p} below the top", self.label, data);
            }
        }
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

impl<'label, R: MemoryResource, L: Lock> Debug for StackAllocator<'label, R, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Stack allocator {} with:", self.label)?;
        let guard = self.lock.lock();

        let inner = unsafe { &*self.inner.get() };
        writeln!(f, "  Region at {:p} (len: {:#x})", inner.region.base(), inner.region.capacity())?;
        writeln!(f, "  Top: {:#x}", inner.region.cursor())?;
        writeln!(f, "  Free: {:#x}", inner.region.free())?;
        writeln!(
            f,
            "  Destruction callbacks: {}",
            unsafe { inner.callbacks.iter() }.count()
        )?;

        drop(guard);

        Ok(())
    }
}
impl<'label, R: MemoryResource, L: Lock> Drop for StackAllocator<'label, R, L> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let ran = unsafe { inner.callbacks.take().run(|_| {}) };
        if ran != 0 {
            log::debug!("{}: ran {} destruction callbacks", self.label, ran);
        }
        unsafe { inner.region.release(&self.resource) };
    }
}
unsafe impl<'label, R: MemoryResource + Send, L: Lock + Send> Send
    for StackAllocator<'label, R, L>
{
}
