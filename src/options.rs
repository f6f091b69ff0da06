//! Resize requests.

use core::ptr::NonNull;

use crate::{
    error::{Error, Result},
    flags::ReallocFlags,
};

#[derive(Clone, Copy, Debug)]
/// A request to resize a live block, passed to
/// [`Allocator::reallocate`](crate::Allocator::reallocate).
///
/// # Usage
/// Start from [`ReallocateOptions::new`] with the block being resized, then
/// describe what should happen to each side:
/// ```rust
/// # use core::ptr::NonNull;
/// # use bytealloc::ReallocateOptions;
/// # let data = NonNull::<u64>::dangling().cast::<u8>();
/// let options = ReallocateOptions::new(data, 100, 8)
///     .expand_back(50, 64)
///     .shrink_front(4);
/// assert_eq!(options.required_back(), 50);
/// ```
/// Each side can either grow or shrink, never both. A growing side asks for
/// at least `required` bytes and accepts up to `preferred`; a shrinking side
/// drops exactly `required` bytes and leaves `preferred` at zero.
pub struct ReallocateOptions {
    data: NonNull<u8>,
    size: usize,
    align: usize,
    required_front: usize,
    required_back: usize,
    preferred_front: usize,
    preferred_back: usize,
    flags: ReallocFlags,
}
impl ReallocateOptions {
    /// Describe the live block at `data`, `size` bytes long, allocated with
    /// alignment `align`. Without further changes the request relocates the
    /// block unchanged.
    pub const fn new(data: NonNull<u8>, size: usize, align: usize) -> Self {
        Self {
            data,
            size,
            align,
            required_front: 0,
            required_back: 0,
            preferred_front: 0,
            preferred_back: 0,
            flags: ReallocFlags::empty(),
        }
    }

    /// Replace the request flags.
    pub const fn with_flags(mut self, flags: ReallocFlags) -> Self {
        self.flags = flags;
        self
    }
    /// Set the number of bytes that must be added or removed at the front.
    pub const fn with_required_front(mut self, bytes: usize) -> Self {
        self.required_front = bytes;
        self
    }
    /// Set the number of bytes that must be added or removed at the back.
    pub const fn with_required_back(mut self, bytes: usize) -> Self {
        self.required_back = bytes;
        self
    }
    /// Set the number of bytes the caller would like added at the front.
    pub const fn with_preferred_front(mut self, bytes: usize) -> Self {
        self.preferred_front = bytes;
        self
    }
    /// Set the number of bytes the caller would like added at the back.
    pub const fn with_preferred_back(mut self, bytes: usize) -> Self {
        self.preferred_back = bytes;
        self
    }

    /// Grow the back by at least `required` and at most `preferred` bytes.
    pub const fn expand_back(self, required: usize, preferred: usize) -> Self {
        let flags = self.flags.union(ReallocFlags::EXPAND_BACK);
        self.with_flags(flags)
            .with_required_back(required)
            .with_preferred_back(preferred)
    }
    /// Drop `bytes` bytes from the back.
    pub const fn shrink_back(self, bytes: usize) -> Self {
        let flags = self.flags.union(ReallocFlags::SHRINK_BACK);
        self.with_flags(flags)
            .with_required_back(bytes)
            .with_preferred_back(0)
    }
    /// Grow the front by at least `required` and at most `preferred` bytes.
    pub const fn expand_front(self, required: usize, preferred: usize) -> Self {
        let flags = self.flags.union(ReallocFlags::EXPAND_FRONT);
        self.with_flags(flags)
            .with_required_front(required)
            .with_preferred_front(preferred)
    }
    /// Drop `bytes` bytes from the front.
    pub const fn shrink_front(self, bytes: usize) -> Self {
        let flags = self.flags.union(ReallocFlags::SHRINK_FRONT);
        self.with_flags(flags)
            .with_required_front(bytes)
            .with_preferred_front(0)
    }
    /// Leave the old block alive and skip copying.
    pub const fn keep_old_nocopy(self) -> Self {
        let flags = self.flags.union(ReallocFlags::KEEP_OLD_NOCOPY);
        self.with_flags(flags)
    }
    /// Allow the allocator to relocate for locality.
    pub const fn try_defragment(self) -> Self {
        let flags = self.flags.union(ReallocFlags::TRY_DEFRAGMENT);
        self.with_flags(flags)
    }

    /// The base of the block being resized.
    pub const fn data(&self) -> NonNull<u8> {
        self.data
    }
    /// The current size of the block.
    pub const fn size(&self) -> usize {
        self.size
    }
    /// The alignment the block was allocated with.
    pub const fn align(&self) -> usize {
        self.align
    }
    /// Bytes that must change at the front.
    pub const fn required_front(&self) -> usize {
        self.required_front
    }
    /// Bytes that must change at the back.
    pub const fn required_back(&self) -> usize {
        self.required_back
    }
    /// Bytes the caller would like added at the front.
    pub const fn preferred_front(&self) -> usize {
        self.preferred_front
    }
    /// Bytes the caller would like added at the back.
    pub const fn preferred_back(&self) -> usize {
        self.preferred_back
    }
    /// The request flags.
    pub const fn flags(&self) -> ReallocFlags {
        self.flags
    }

    /// Check the request and work out the byte movements it implies.
    ///
    /// This never touches the block, so an error here leaves it exactly as
    /// it was.
    pub fn plan(&self) -> Result<ResizePlan> {
        if !self.align.is_power_of_two() {
            return Err(Error::InvalidAlignment);
        }
        let (shrink_front, expand_front, _) = side(
            self.flags,
            ReallocFlags::SHRINK_FRONT,
            ReallocFlags::EXPAND_FRONT,
            self.required_front,
            self.preferred_front,
        )?;
        let (shrink_back, expand_back, spare_back) = side(
            self.flags,
            ReallocFlags::SHRINK_BACK,
            ReallocFlags::EXPAND_BACK,
            self.required_back,
            self.preferred_back,
        )?;

        let dropped = shrink_front
            .checked_add(shrink_back)
            .ok_or(Error::InfeasibleResize)?;
        if dropped >= self.size {
            return Err(Error::InfeasibleResize);
        }
        let kept_len = self.size - dropped;
        let new_size = kept_len
            .checked_add(expand_front)
            .and_then(|size| size.checked_add(expand_back))
            .filter(|&size| size <= isize::MAX as usize - (self.align - 1))
            .ok_or(Error::InfeasibleResize)?;

        Ok(ResizePlan {
            shrink_front,
            expand_front,
            expand_back,
            spare_back,
            kept_len,
            new_size,
            nocopy: self.flags.contains(ReallocFlags::KEEP_OLD_NOCOPY),
        })
    }
}

/// Returns `(shrink, expand, spare)` for one side of the block.
fn side(
    flags: ReallocFlags,
    shrink_flag: ReallocFlags,
    expand_flag: ReallocFlags,
    required: usize,
    preferred: usize,
) -> Result<(usize, usize, usize)> {
    match (flags.contains(shrink_flag), flags.contains(expand_flag)) {
        (true, true) => Err(Error::ConflictingFlags),
        (true, false) => {
            debug_assert_eq!(preferred, 0, "preferred bytes make no sense when shrinking");
            Ok((required, 0, 0))
        }
        (false, true) if preferred < required => Err(Error::InfeasibleResize),
        (false, true) => Ok((0, required, preferred - required)),
        (false, false) => Ok((0, 0, 0)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A validated resize request.
///
/// The bytes that survive the resize are `kept_len` bytes starting
/// `shrink_front` bytes into the old block. In the new block they start
/// `expand_front` bytes in.
pub struct ResizePlan {
    shrink_front: usize,
    expand_front: usize,
    expand_back: usize,
    spare_back: usize,
    kept_len: usize,
    new_size: usize,
    nocopy: bool,
}
impl ResizePlan {
    /// Offset of the surviving bytes in the old block.
    pub const fn source_offset(&self) -> usize {
        self.shrink_front
    }
    /// Offset of the surviving bytes in the new block.
    pub const fn target_offset(&self) -> usize {
        self.expand_front
    }
    /// Number of bytes carried over from the old block.
    pub const fn kept_len(&self) -> usize {
        self.kept_len
    }
    /// Size of the new block when every side gets its required amount.
    pub const fn new_size(&self) -> usize {
        self.new_size
    }
    /// Bytes added at the back when granting the required amount.
    pub const fn expand_back(&self) -> usize {
        self.expand_back
    }
    /// Extra bytes the back may grow by beyond the required amount.
    pub const fn spare_back(&self) -> usize {
        self.spare_back
    }
    /// Whether the old contents should be left where they are.
    pub const fn nocopy(&self) -> bool {
        self.nocopy
    }
    /// Where the old first byte lands in a new block based at `base`.
    ///
    /// # Safety
    /// `base` must point to a block of at least
    /// [`new_size`](ResizePlan::new_size) bytes.
    pub unsafe fn original_offset(&self, base: NonNull<u8>) -> Option<NonNull<u8>> {
        if self.shrink_front != 0 {
            None
        } else {
            Some(base.add(self.expand_front))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> ReallocateOptions {
        ReallocateOptions::new(NonNull::<u64>::dangling().cast(), 100, 8)
    }

    #[test]
    fn expand_back() {
        let plan = block().expand_back(50, 50).plan().unwrap();
        assert_eq!(plan.new_size(), 150);
        assert_eq!(plan.kept_len(), 100);
        assert_eq!((plan.source_offset(), plan.target_offset()), (0, 0));
        assert_eq!(plan.spare_back(), 0);
    }

    #[test]
    fn preferred_below_required() {
        assert_eq!(
            block().expand_back(50, 10).plan(),
            Err(Error::InfeasibleResize)
        );
        assert_eq!(
            block().expand_front(8, 0).plan(),
            Err(Error::InfeasibleResize)
        );
    }

    #[test]
    fn shrink_to_nothing() {
        assert_eq!(block().shrink_back(100).plan(), Err(Error::InfeasibleResize));
        assert_eq!(block().shrink_back(200).plan(), Err(Error::InfeasibleResize));
        assert_eq!(
            block().shrink_back(60).shrink_front(40).plan(),
            Err(Error::InfeasibleResize)
        );
        assert_eq!(block().shrink_back(99).plan().unwrap().new_size(), 1);
    }

    #[test]
    fn conflicting_sides() {
        let both_back =
            block().with_flags(ReallocFlags::EXPAND_BACK | ReallocFlags::SHRINK_BACK);
        assert_eq!(both_back.plan(), Err(Error::ConflictingFlags));
        let both_front =
            block().with_flags(ReallocFlags::EXPAND_FRONT | ReallocFlags::SHRINK_FRONT);
        assert_eq!(both_front.plan(), Err(Error::ConflictingFlags));
    }

    #[test]
    fn front_shrink_back_expand() {
        let plan = block().shrink_front(10).expand_back(20, 30).plan().unwrap();
        assert_eq!(plan.kept_len(), 90);
        assert_eq!(plan.new_size(), 110);
        assert_eq!(plan.source_offset(), 10);
        assert_eq!(plan.target_offset(), 0);
        assert_eq!(plan.spare_back(), 10);
        let base = NonNull::<u64>::dangling().cast::<u8>();
        assert_eq!(unsafe { plan.original_offset(base) }, None);
    }

    #[test]
    fn front_expand_back_shrink() {
        let plan = block().expand_front(16, 16).shrink_back(30).plan().unwrap();
        assert_eq!(plan.kept_len(), 70);
        assert_eq!(plan.new_size(), 86);
        assert_eq!(plan.source_offset(), 0);
        assert_eq!(plan.target_offset(), 16);
    }

    #[test]
    fn overflow() {
        assert_eq!(
            block().expand_back(usize::MAX, usize::MAX).plan(),
            Err(Error::InfeasibleResize)
        );
    }

    #[test]
    fn plain_move() {
        let plan = block().try_defragment().plan().unwrap();
        assert_eq!(plan.new_size(), 100);
        assert!(!plan.nocopy());
        assert!(block().keep_old_nocopy().plan().unwrap().nocopy());
    }
}
