//! Decorators that switch off one operation of another allocator.
//!
//! Both wrappers borrow the allocator they decorate, so they cannot outlive
//! it. They work with concrete allocators and with `dyn Allocator` alike.

use core::ptr::NonNull;

use crate::{
    callbacks::DestructionCallback,
    error::Result,
    flags::FeatureFlags,
    layout::Layout,
    options::ReallocateOptions,
    result::{Allocation, Reallocation},
    Allocator,
};

#[derive(Debug)]
/// Forwards everything except [`clear`](Allocator::clear), which does
/// nothing.
///
/// Hand this to code that may clear its allocator when the allocator is
/// shared with others who still need their blocks. The reported features do
/// not include [`CLEARING`](FeatureFlags::CLEARING).
pub struct DisableClearing<'a, A: Allocator + ?Sized> {
    backing: &'a A,
}
impl<'a, A: Allocator + ?Sized> DisableClearing<'a, A> {
    /// Wrap `backing`.
    pub const fn new(backing: &'a A) -> Self {
        Self { backing }
    }
    /// Get the wrapped allocator.
    pub const fn backing(&self) -> &'a A {
        self.backing
    }
}
impl<'a, A: Allocator + ?Sized> Clone for DisableClearing<'a, A> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, A: Allocator + ?Sized> Copy for DisableClearing<'a, A> {}

unsafe impl<'a, A: Allocator + ?Sized> Allocator for DisableClearing<'a, A> {
    fn allocate(&self, layout: Layout) -> Result<Allocation> {
        self.backing.allocate(layout)
    }
    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation> {
        self.backing.reallocate(options)
    }
    unsafe fn deallocate(&self, data: NonNull<u8>, layout: Layout) {
        self.backing.deallocate(data, layout)
    }
    unsafe fn clear(&self) {
        log::trace!("clear suppressed");
    }
    fn features(&self) -> FeatureFlags {
        self.backing.features().difference(FeatureFlags::CLEARING)
    }
    unsafe fn register_destruction_callback(
        &self,
        user_data: *mut (),
        callback: DestructionCallback,
    ) -> Result<()> {
        self.backing.register_destruction_callback(user_data, callback)
    }
}

#[derive(Debug)]
/// Forwards everything except [`deallocate`](Allocator::deallocate), which
/// does nothing.
///
/// Layered over a clearing allocator, this gives arena-style usage: blocks are
/// never given back one by one, and the backing allocator's
/// [`clear`](Allocator::clear) still releases everything.
pub struct DisableFreeing<'a, A: Allocator + ?Sized> {
    backing: &'a A,
}
impl<'a, A: Allocator + ?Sized> DisableFreeing<'a, A> {
    /// Wrap `backing`.
    pub const fn new(backing: &'a A) -> Self {
        Self { backing }
    }
    /// Get the wrapped allocator.
    pub const fn backing(&self) -> &'a A {
        self.backing
    }
}
impl<'a, A: Allocator + ?Sized> Clone for DisableFreeing<'a, A> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, A: Allocator + ?Sized> Copy for DisableFreeing<'a, A> {}

unsafe impl<'a, A: Allocator + ?Sized> Allocator for DisableFreeing<'a, A> {
    fn allocate(&self, layout: Layout) -> Result<Allocation> {
        self.backing.allocate(layout)
    }
    unsafe fn reallocate(&self, options: &ReallocateOptions) -> Result<Reallocation> {
        self.backing.reallocate(options)
    }
    unsafe fn deallocate(&self, data: NonNull<u8>, _layout: Layout) {
        log::trace!("free of {:p} suppressed", data);
    }
    unsafe fn clear(&self) {
        self.backing.clear()
    }
    fn features(&self) -> FeatureFlags {
        self.backing.features()
    }
    unsafe fn register_destruction_callback(
        &self,
        user_data: *mut (),
        callback: DestructionCallback,
    ) -> Result<()> {
        self.backing.register_destruction_callback(user_data, callback)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        arena::ArenaAllocator, resource::SystemResource, stack::StackAllocator,
        system::SystemAllocator,
    };

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn clearing_disabled() {
        let arena = ArenaAllocator::<_, Mutex<()>>::create("arena", 0x100, SystemResource).unwrap();
        let shared: &dyn Allocator = &arena;
        let wrapper = DisableClearing::new(shared);
        assert!(!wrapper.features().contains(FeatureFlags::CLEARING));
        assert!(wrapper.features().contains(FeatureFlags::CALLBACKS));

        let block = wrapper.allocate(layout(0x10)).unwrap();
        unsafe { block.data().as_ptr().write_bytes(0x5a, 0x10) };
        unsafe { wrapper.clear() };
        assert_eq!(arena.used_space(), 0x10);
        let bytes = unsafe { core::slice::from_raw_parts(block.data().as_ptr(), 0x10) };
        assert!(bytes.iter().all(|&b| b == 0x5a));

        unsafe { arena.clear() };
        assert_eq!(arena.used_space(), 0);
    }

    #[test]
    fn freeing_disabled() {
        let stack =
            StackAllocator::<_, Mutex<()>>::create("stack", 0x100, SystemResource).unwrap();
        let wrapper = DisableFreeing::new(&stack);
        assert_eq!(wrapper.features(), stack.features());

        let first = wrapper.allocate(layout(0x10)).unwrap();
        let second = wrapper.allocate(layout(0x10)).unwrap();
        let used = stack.used_space();
        unsafe {
            wrapper.deallocate(second.data(), layout(0x10));
            wrapper.deallocate(first.data(), layout(0x10));
        }
        assert_eq!(stack.used_space(), used);

        let options = ReallocateOptions::new(second.data(), 0x10, 8).expand_back(8, 8);
        let grown = unsafe { wrapper.reallocate(&options) }.unwrap();
        assert_eq!(grown.size(), 0x18);

        unsafe { wrapper.clear() };
        assert_eq!(stack.used_space(), 0);
    }

    #[test]
    fn wrappers_nest() {
        let system = SystemAllocator::<_, Mutex<()>>::new("system", SystemResource);
        let no_clear = DisableClearing::new(&system);
        let no_free = DisableFreeing::new(&no_clear);
        let block = no_free.allocate(layout(0x10)).unwrap();
        unsafe { no_free.deallocate(block.data(), layout(0x10)) };
        assert_eq!(system.usage().allocations, 1);
        unsafe { no_free.clear() };
        unsafe { system.deallocate(block.data(), layout(0x10)) };
        assert_eq!(system.usage().allocations, 0);
    }
}
