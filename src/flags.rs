//! Capability and request flag sets.

use bitflags::bitflags;

bitflags! {
    /// What an allocator is able to do.
    ///
    /// An allocator reports its set once through
    /// [`Allocator::features`](crate::Allocator::features), and the set never
    /// changes for the lifetime of the instance. Callers are expected to check
    /// it before issuing requests of a particular shape.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u16 {
        /// Individual blocks can be freed and reallocated.
        const FREE_AND_REALLOC = 1 << 0;
        /// [`clear`](crate::Allocator::clear) releases every outstanding
        /// allocation at once.
        const CLEARING = 1 << 1;
        /// Resizes keep the base pointer where it is.
        const IN_PLACE = 1 << 2;
        /// Blocks can grow at the front.
        const EXPAND_FRONT = 1 << 3;
        /// Blocks can grow at the back.
        const EXPAND_BACK = 1 << 4;
        /// Bytes released by shrinking become available again.
        const SHRINK_RECLAIMS = 1 << 5;
        /// [`ReallocFlags::KEEP_OLD_NOCOPY`] is honoured.
        const NOCOPY = 1 << 6;
        /// A relocating resize can leave the old block alive.
        const KEEP_OLD = 1 << 7;
        /// Only the most recent live allocation may be resized or freed.
        const STACKLIKE = 1 << 8;
        /// Concurrent calls from several threads are individually safe.
        const THREADSAFE = 1 << 9;
        /// Fresh memory is zeroed.
        const ZERO_INIT = 1 << 10;
        /// Destruction callbacks can be registered.
        const CALLBACKS = 1 << 11;
        /// Failures are always reported through the return value.
        const NOTHROW = 1 << 12;
    }
}
impl FeatureFlags {
    /// Whether this set can be honoured at all.
    ///
    /// A stacklike allocator cannot be threadsafe: another thread allocating
    /// between two calls would move the top of the stack.
    pub const fn is_consistent(self) -> bool {
        !self.contains(Self::STACKLIKE.union(Self::THREADSAFE))
    }
}

bitflags! {
    /// The shape of a single resize request. See
    /// [`ReallocateOptions`](crate::ReallocateOptions).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ReallocFlags: u8 {
        /// Drop `required_back` bytes from the end of the block.
        const SHRINK_BACK = 1 << 0;
        /// Add between `required_back` and `preferred_back` bytes at the end.
        const EXPAND_BACK = 1 << 1;
        /// Drop `required_front` bytes from the start of the block.
        const SHRINK_FRONT = 1 << 2;
        /// Add between `required_front` and `preferred_front` bytes before the
        /// start.
        const EXPAND_FRONT = 1 << 3;
        /// Leave the old block alive and do not copy anything into the new
        /// one.
        const KEEP_OLD_NOCOPY = 1 << 4;
        /// Relocation is welcome even when an in-place resize would work.
        const TRY_DEFRAGMENT = 1 << 5;
    }
}
