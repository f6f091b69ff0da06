//! An allocator over a general purpose memory resource.

use core::{cell::UnsafeCell, fmt::Debug, ptr::NonNull};

use portable_atomic::{AtomicUsize, Ordering};

use crate::{
    allocation_table::AllocationTable,
    callbacks::{CallbackEntry, CallbackList, DestructionCallback},
    error::{Error, Result},
    flags::FeatureFlags,
    layout::Layout,
    lock::Lock,
    options::ReallocateOptions,
    resource::MemoryResource,
    result::{Allocation, Reallocation},
    Allocator,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// A snapshot of what a [`SystemAllocator`] currently has handed out.
pub struct Usage {
    /// Number of live blocks.
    pub allocations: usize,
    /// Total size of the live blocks, in bytes.
    pub bytes: usize,
}

/// An allocator that takes every block straight from a [`MemoryResource`].
///
/// The resource does all the real work, so this allocator cannot resize in
/// place: every [`reallocate`](Allocator::reallocate) allocates a new block,
/// copies the surviving bytes over and frees the old one. It also cannot
/// [`clear`](Allocator::clear), because a general resource has no notion of
/// "everything this allocator handed out".
///
/// # Usage
/// ```rust
/// # use bytealloc::{Allocator, Layout, ReallocateOptions, SystemAllocator, SystemResource};
/// # type Lock = std::sync::Mutex<()>;
/// let allocator = SystemAllocator::<_, Lock>::new("heap", SystemResource);
/// let block = allocator.allocate(Layout::from_size_align(100, 8).unwrap()).unwrap();
///
/// let options = ReallocateOptions::new(block.data(), block.size(), 8).expand_back(50, 50);
/// let block = unsafe { allocator.reallocate(&options) }.unwrap();
/// assert_eq!(block.size(), 150);
///
/// unsafe { allocator.deallocate(block.data(), Layout::from_size_align(150, 8).unwrap()) };
/// ```
///
/// # Destruction callbacks
/// Callback entries are allocated from the resource. Since the allocator is
/// never cleared, the callbacks run, newest first, when it is dropped.
pub struct SystemAllocator<'label, R: MemoryResource, L: Lock> {
    label: &'label str,
    lock: L,
    inner: UnsafeCell<SystemInner>,
    resource: R,
    zeroed: bool,
    allocations: AtomicUsize,
    bytes: AtomicUsize,
}

struct SystemInner {
    callbacks: CallbackList,
    allocation_table: AllocationTable,
}

impl<'label, R: MemoryResource, L: Lock> SystemAllocator<'label, R, L> {
    /// Everything a system allocator supports.
    pub const FEATURES: FeatureFlags = FeatureFlags::FREE_AND_REALLOC
        .union(FeatureFlags::EXPAND_FRONT)
        .union(FeatureFlags::EXPAND_BACK)
        .union(FeatureFlags::SHRINK_RECLAIMS)
        .union(FeatureFlags::NOCOPY)
        .union(FeatureFlags::KEEP_OLD)
        .union(FeatureFlags::THREADSAFE)
        .union(FeatureFlags::CALLBACKS)
        .union(FeatureFlags::NOTHROW);

    /// Create an allocator drawing from `resource`.
    ///
    /// # Parameters
    /// - `label` - a label for the allocator. This is used for debugging
    ///   purposes.
    /// - `resource` - where blocks come from.
    pub fn new(label: &'label str, resource: R) -> Self {
        Self::with_zeroing(label, resource, false)
    }

    /// Create an allocator whose blocks always start out zeroed, including
    /// the bytes a resize adds. It reports
    /// [`ZERO_INIT`](FeatureFlags::ZERO_INIT) on top of [`Self::FEATURES`].
    pub fn new_zeroed(label: &'label str, resource: R) -> Self {
        Self::with_zeroing(label, resource, true)
    }

    fn with_zeroing(label: &'label str, resource: R, zeroed: bool) -> Self {
        Self {
            label,
            lock: L::default(),
            inner: UnsafeCell::new(SystemInner {
                callbacks: CallbackList::EMPTY,
                allocation_table: AllocationTable::new(),
            }),
            resource,
            zeroed,
            allocations: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    /// Get the label for this allocator.
    pub fn label(&self) -> &'label str {
        self.label
    }

    /// Get the resource blocks are drawn from.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Count the blocks currently handed out.
    pub fn usage(&self) -> Usage {
        Usage {
            allocations: self.allocations.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    fn with_table(&self, f: impl FnOnce(&mut AllocationTable)) {
        if AllocationTable::ENABLED {
            let guard = self.lock.lock();
            f(unsafe { &mut (*self.inner.get()).allocation_table });
            drop(guard);
        }
    }

    /// # Safety
    /// `data` must be a live block from this allocator with this `layout`.
    unsafe fn release(&self, data: NonNull<u8>, layout: Layout) {
        self.with_table(|table| table.remove(data, layout));
        self.resource.deallocate(data, layout);
        self.allocations.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}

unsafe impl<'label, R: MemoryResource, L: Lock> Allocator for SystemAllocator<'label, R, L> {
    fn allocate(&self, layout: Layout) -> Result<Allocation> {
        let data = if self.zeroed {
            self.resource.allocate_zeroed(layout)
        } else {
            self.resource.allocate(layout)
        };
        let data = data.ok_or_else(|| {
            log::debug!(
                "{}: resource could not provide {:#x} bytes",
                self.label,
                layout.size()
            );
            Error::OutOfMemory
        })?;
        self.with_table(|table| table.insert(data, layout));
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size(), Ordering::Relaxed);

        log::trace!(
            "{}: allocated {:#x} bytes at {:p}",
            self.label,
            layout.size(),
            data
        );
        Ok(Allocation::new(data, layout.size()))
    }

    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation> {
        let plan = options.plan()?;
        let old = Layout::from_size_align(options.size(), options.align())
            .ok_or(Error::InfeasibleResize)?;
        debug_assert!(
            options.data().as_ptr() as usize % options.align() == 0,
            "{}: {:p} is not aligned to {:#x}",
            self.label,
            options.data(),
            options.align()
        );
        self.with_table(|table| table.check(options.data(), old));

        let layout =
            Layout::from_size_align(plan.new_size(), options.align()).ok_or(Error::InfeasibleResize)?;
        let data = self.allocate(layout)?.data();

        let kept = if plan.nocopy() {
            true
        } else {
            core::ptr::copy_nonoverlapping(
                options.data().as_ptr().add(plan.source_offset()),
                data.as_ptr().add(plan.target_offset()),
                plan.kept_len(),
            );
            self.release(options.data(), old);
            false
        };

        log::trace!(
            "{}: moved {:#x} bytes at {:p} to {:#x} bytes at {:p}{}",
            self.label,
            old.size(),
            options.data(),
            layout.size(),
            data,
            if kept { " (old block kept)" } else { "" }
        );
        Ok(Reallocation::new(
            data,
            layout.size(),
            plan.original_offset(data),
            kept,
        ))
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, layout: Layout) {
        debug_assert!(
            data.as_ptr() as usize % layout.align() == 0,
            "{}: {:p} is not aligned to {:#x}",
            self.label,
            data,
            layout.align()
        );
        self.release(data, layout);
        log::trace!("{}: freed {:#x} bytes at {:p}", self.label, layout.size(), data);
    }

    unsafe fn clear(&self) {
        debug_assert!(
            self.features().contains(FeatureFlags::CLEARING),
            "{}: a system allocator cannot be cleared",
            self.label
        );
        log::warn!("{}: ignoring clear, which is not supported", self.label);
    }

    fn features(&self) -> FeatureFlags {
        if self.zeroed {
            Self::FEATURES.union(FeatureFlags::ZERO_INIT)
        } else {
            Self::FEATURES
        }
    }

    unsafe fn register_destruction_callback(
        &self,
        user_data: *mut (),
        callback: DestructionCallback,
    ) -> Result<()> {
        let entry = self
            .resource
            .allocate(Layout::new::<CallbackEntry>())
            .ok_or(Error::AllocatorError)?;

        let guard = self.lock.lock();
        (*self.inner.get())
            .callbacks
            .push(entry.cast(), user_data, callback);
        drop(guard);

        Ok(())
    }
}

impl<'label, R: MemoryResource, L: Lock> Debug for SystemAllocator<'label, R, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let usage = self.usage();
        writeln!(f, "System allocator {} with:", self.label)?;
        writeln!(f, "  Zeroed: {}", self.zeroed)?;
        writeln!(f, "  Live allocations: {}", usage.allocations)?;
        writeln!(f, "  Live bytes: {:#x}", usage.bytes)?;

        let guard = self.lock.lock();
        let inner = unsafe { &*self.inner.get() };
        let callbacks = unsafe { inner.callbacks.iter() }.count();
        drop(guard);

        writeln!(f, "  Destruction callbacks: {callbacks}")
    }
}
impl<'label, R: MemoryResource, L: Lock> Drop for SystemAllocator<'label, R, L> {
    fn drop(&mut self) {
        let chain = self.inner.get_mut().callbacks.take();
        let resource = &self.resource;
        let ran = unsafe {
            chain.run(|entry| resource.deallocate(entry.cast(), Layout::new::<CallbackEntry>()))
        };
        if ran != 0 {
            log::debug!("{}: ran {} destruction callbacks", self.label, ran);
        }
    }
}
unsafe impl<'label, R: MemoryResource + Sync, L: Lock + Sync> Sync
    for SystemAllocator<'label, R, L>
{
}
unsafe impl<'label, R: MemoryResource + Send, L: Lock + Send> Send
    for SystemAllocator<'label, R, L>
{
}
