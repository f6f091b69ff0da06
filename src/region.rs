use core::ptr::NonNull;

use crate::{
    error::{Error, Result},
    layout::{Layout, DEFAULT_ALIGN},
    resource::MemoryResource,
};

/// A fixed buffer carved from both ends.
///
/// Allocations grow upward from `cursor`, bookkeeping grows downward from
/// `tail`. The two never cross. Offsets are relative to `base`.
pub struct Region {
    base: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    cursor: usize,
    tail: usize,
}
impl Region {
    pub const fn new(base: NonNull<u8>, layout: Layout) -> Self {
        Self {
            base,
            layout,
            capacity: layout.size(),
            cursor: 0,
            tail: layout.size(),
        }
    }

    /// Take a buffer of `capacity` bytes from `resource`.
    pub fn create(resource: &impl MemoryResource, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::AllocZeroSize);
        }
        let layout = Layout::from_size_align(capacity, DEFAULT_ALIGN).ok_or(Error::OutOfMemory)?;
        let base = resource.allocate(layout).ok_or(Error::OutOfMemory)?;
        Ok(Self::new(base, layout))
    }

    /// Hand the buffer back to the resource it was created from.
    ///
    /// # Safety
    /// The region must come from [`Region::create`] on `resource`, and nothing
    /// inside it may be used afterwards.
    pub unsafe fn release(&self, resource: &impl MemoryResource) {
        resource.deallocate(self.base, self.layout);
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn cursor(&self) -> usize {
        self.cursor
    }
    /// The highest offset an allocation may end at.
    pub fn limit(&self) -> usize {
        self.tail
    }
    pub fn used(&self) -> usize {
        self.cursor + (self.capacity - self.tail)
    }
    pub fn free(&self) -> usize {
        self.tail - self.cursor
    }

    /// Offset of `ptr` from the base, if it lies within the region.
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        (ptr.as_ptr() as usize)
            .checked_sub(self.base.as_ptr() as usize)
            .filter(|&offset| offset <= self.capacity)
    }

    /// # Safety
    /// `offset` must not exceed the capacity.
    pub unsafe fn at(&self, offset: usize) -> NonNull<u8> {
        self.base.add(offset)
    }

    /// Reserve `size` bytes aligned to `align`, leaving at least `header`
    /// bytes between the old cursor and the returned offset.
    ///
    /// Returns the data offset and the cursor before the bump.
    pub fn bump(&mut self, size: usize, align: usize, header: usize) -> Option<(usize, usize)> {
        let base = self.base.as_ptr() as usize;
        let start = base.checked_add(self.cursor)?.checked_add(header)?;
        let data = start.checked_next_multiple_of(align)? - base;
        let end = data.checked_add(size)?;
        if end > self.tail {
            return None;
        }
        let previous = self.cursor;
        self.cursor = end;
        Some((data, previous))
    }

    /// Move the cursor to `offset`, which must lie between the base and the
    /// tail.
    pub fn set_cursor(&mut self, offset: usize) {
        debug_assert!(offset <= self.tail);
        self.cursor = offset;
    }

    /// Reserve `size` bytes aligned to `align` at the tail end.
    pub fn carve_tail(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.base.as_ptr() as usize;
        let end = base + self.tail;
        let start = end.checked_sub(size)? & !(align - 1);
        if start < base + self.cursor {
            return None;
        }
        self.tail = start - base;
        Some(unsafe { self.at(self.tail) })
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.tail = self.capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ends() {
        let mut buffer = [0u64; 32];
        let base = NonNull::from(&mut buffer).cast::<u8>();
        let mut region = Region::new(base, Layout::from_size_align(256, 8).unwrap());

        let (data, previous) = region.bump(10, 8, 0).unwrap();
        assert_eq!((data, previous), (0, 0));
        let (data, previous) = region.bump(10, 8, 8).unwrap();
        assert_eq!((data, previous), (24, 10));
        assert_eq!(region.cursor(), 34);

        let entry = region.carve_tail(24, 8).unwrap();
        assert_eq!(region.offset_of(entry), Some(232));
        assert_eq!(region.used(), 34 + 24);
        assert_eq!(region.free(), 232 - 34);

        assert!(region.bump(200, 8, 0).is_none());
        assert!(region.carve_tail(200, 8).is_none());

        region.reset();
        assert_eq!(region.free(), 256);
    }

    #[test]
    fn from_resource() {
        use crate::resource::SystemResource;

        assert!(matches!(
            Region::create(&SystemResource, 0),
            Err(Error::AllocZeroSize)
        ));
        let region = Region::create(&SystemResource, 0x100).unwrap();
        assert_eq!(region.base().as_ptr() as usize % DEFAULT_ALIGN, 0);
        assert_eq!(region.capacity(), 0x100);
        unsafe { region.release(&SystemResource) };
    }
}
