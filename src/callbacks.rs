use core::ptr::NonNull;

/// A function run when an allocator is cleared or dropped, together with the
/// `user_data` pointer it was registered with.
pub type DestructionCallback = unsafe fn(user_data: *mut ());

/// One registered callback.
///
/// Entries live in memory taken from the allocator they are registered on.
pub struct CallbackEntry {
    user_data: *mut (),
    callback: DestructionCallback,
    previous: Option<NonNull<CallbackEntry>>,
}
impl CallbackEntry {
    /// # Safety
    /// The callback must be safe to run with its `user_data`.
    pub unsafe fn invoke(&self) {
        (self.callback)(self.user_data)
    }
}

/// Singly linked list of callbacks, newest first.
pub struct CallbackList {
    head: Option<NonNull<CallbackEntry>>,
}
impl CallbackList {
    pub const EMPTY: Self = Self { head: None };

    /// # Safety
    /// `entry` must be valid for writes of a [`CallbackEntry`] and stay valid
    /// until the list is taken.
    pub unsafe fn push(
        &mut self,
        entry: NonNull<CallbackEntry>,
        user_data: *mut (),
        callback: DestructionCallback,
    ) {
        entry.as_ptr().write(CallbackEntry {
            user_data,
            callback,
            previous: self.head,
        });
        self.head = Some(entry);
    }

    /// Detach the whole chain, leaving the list empty.
    pub fn take(&mut self) -> CallbackListIter {
        CallbackListIter {
            next: self.head.take(),
        }
    }

    /// # Safety
    /// No entry in the list may be currently in use, but all must be valid.
    pub unsafe fn iter(&self) -> CallbackListIter {
        CallbackListIter { next: self.head }
    }
}
impl Default for CallbackList {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Walks entries from newest to oldest.
///
/// The link to the next entry is read before an entry is yielded, so the
/// caller may release each entry as soon as it has been handed out.
pub struct CallbackListIter {
    next: Option<NonNull<CallbackEntry>>,
}
impl CallbackListIter {
    /// Invoke every remaining callback, handing each entry to `release`
    /// afterwards. Returns how many callbacks ran.
    ///
    /// # Safety
    /// Every remaining entry must be valid and its callback safe to run.
    pub unsafe fn run(self, mut release: impl FnMut(NonNull<CallbackEntry>)) -> usize {
        let mut count = 0;
        for entry in self {
            entry.as_ref().invoke();
            release(entry);
            count += 1;
        }
        count
    }
}
impl Iterator for CallbackListIter {
    type Item = NonNull<CallbackEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next;
        if let Some(next) = next {
            self.next = unsafe { next.as_ref().previous };
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use core::mem::MaybeUninit;
    use std::cell::RefCell;

    use super::*;

    struct Marker<'a> {
        id: u32,
        log: &'a RefCell<Vec<u32>>,
    }

    unsafe fn record(user_data: *mut ()) {
        let marker = &*(user_data as *const Marker);
        marker.log.borrow_mut().push(marker.id);
    }

    #[test]
    fn newest_first() {
        let log = RefCell::new(Vec::new());
        let mut markers: Vec<Marker> = (1..=3).map(|id| Marker { id, log: &log }).collect();
        let mut storage: [MaybeUninit<CallbackEntry>; 3] =
            [MaybeUninit::uninit(), MaybeUninit::uninit(), MaybeUninit::uninit()];

        let mut list = CallbackList::EMPTY;
        for (marker, slot) in markers.iter_mut().zip(storage.iter_mut()) {
            let entry = NonNull::from(slot).cast();
            unsafe { list.push(entry, marker as *mut Marker as *mut (), record) };
        }
        assert_eq!(unsafe { list.iter() }.count(), 3);

        let mut released = 0;
        let ran = unsafe { list.take().run(|_| released += 1) };
        assert_eq!(ran, 3);
        assert_eq!(released, 3);
        assert_eq!(unsafe { list.iter() }.count(), 0);
        assert_eq!(*log.borrow(), [3, 2, 1]);
    }
}
