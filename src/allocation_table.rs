use core::ptr::NonNull;

use crate::layout::Layout;

#[cfg(all(debug_assertions, any(test, feature = "std")))]
pub use tracked::AllocationTable;
#[cfg(not(all(debug_assertions, any(test, feature = "std"))))]
pub use untracked::AllocationTable;

/// Live-block bookkeeping for debug builds, used to catch blocks that are
/// handed back twice, never existed, or come back with a different layout.
#[cfg(all(debug_assertions, any(test, feature = "std")))]
mod tracked {
    use core::hash::BuildHasherDefault;
    use std::collections::HashMap;

    use rustc_hash::FxHasher;

    use super::*;

    pub struct AllocationTable {
        blocks: HashMap<usize, Layout, BuildHasherDefault<FxHasher>>,
    }
    impl AllocationTable {
        pub const ENABLED: bool = true;

        pub fn new() -> Self {
            Self {
                blocks: HashMap::default(),
            }
        }

        pub fn insert(&mut self, base: NonNull<u8>, layout: Layout) {
            let previous = self.blocks.insert(base.as_ptr() as usize, layout);
            assert!(previous.is_none(), "{base:p} was handed out twice");
        }

        pub fn check(&self, base: NonNull<u8>, layout: Layout) {
            match self.blocks.get(&(base.as_ptr() as usize)) {
                Some(live) => assert_eq!(
                    *live, layout,
                    "{base:p} was allocated with a different size or alignment"
                ),
                None => panic!("{base:p} is not a live allocation"),
            }
        }

        pub fn remove(&mut self, base: NonNull<u8>, layout: Layout) {
            self.check(base, layout);
            self.blocks.remove(&(base.as_ptr() as usize));
        }
    }
}

#[cfg(not(all(debug_assertions, any(test, feature = "std"))))]
mod untracked {
    use super::*;

    pub struct AllocationTable;
    impl AllocationTable {
        pub const ENABLED: bool = false;

        pub fn new() -> Self {
            Self
        }
        pub fn insert(&mut self, _base: NonNull<u8>, _layout: Layout) {}
        pub fn check(&self, _base: NonNull<u8>, _layout: Layout) {}
        pub fn remove(&mut self, _base: NonNull<u8>, _layout: Layout) {}
    }
}
