use crate::task::{TaskHandle, WakeupSource, handle_eq};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;

type Slots = VecDeque<Option<TaskHandle>>;

/// The parking lot belonging to one synchronization object.
///
/// Waiters are appended in FIFO order and woken in that order. A slot is
/// either a live handle or a tombstone (`None`) left behind by
/// [`remove`](WaitList::remove); tombstones are drained lazily by the wake
/// operations, which keeps the mainline wake paths cheap and `remove`
/// linear.
///
/// The list's lock doubles as the lock under which callers publish the
/// condition their waiters predicate on. "Evaluate predicate, then park"
/// and "change predicate, then wake" must both run under the
/// [`WaitListLock`] for the same list, which is what rules out the lost
/// wakeup.
#[derive(Debug, Default)]
pub struct WaitList {
    waiting: Mutex<Slots>,
}

/// Capability token proving the caller holds a [`WaitList`]'s lock.
///
/// Obtained from [`WaitList::lock`]; every guarded operation debug-asserts
/// the token was issued by the list it is used on.
pub struct WaitListLock<'a> {
    list: &'a WaitList,
    guard: MutexGuard<'a, Slots>,
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the list's lock.
    pub fn lock(&self) -> WaitListLock<'_> {
        WaitListLock {
            list: self,
            guard: self.waiting.lock(),
        }
    }

    /// Park `context` at the back of the list. No wakeup side effect.
    pub fn append(&self, lock: &mut WaitListLock<'_>, context: TaskHandle) {
        self.assert_owns(lock);
        lock.guard.push_back(Some(context));
    }

    /// Wake the frontmost live waiter, if any.
    ///
    /// Tombstones in front of it are popped along the way. At most one
    /// live handle is woken per call; an empty (or tombstones-only) list
    /// is left empty.
    pub fn wakeup_one(&self, lock: &mut WaitListLock<'_>) {
        self.assert_owns(lock);
        while let Some(slot) = lock.guard.pop_front() {
            if let Some(context) = slot {
                context.wakeup(WakeupSource::WaitList);
                break;
            }
        }
    }

    /// Wake every live waiter in append order, then clear the list.
    pub fn wakeup_all(&self, lock: &mut WaitListLock<'_>) {
        self.assert_owns(lock);
        for slot in lock.guard.iter() {
            if let Some(context) = slot {
                context.wakeup(WakeupSource::WaitList);
            }
        }
        lock.guard.clear();
    }

    /// True when the list holds no live waiters.
    pub fn is_empty(&self, lock: &WaitListLock<'_>) -> bool {
        self.assert_owns(lock);
        lock.guard.iter().all(Option::is_none)
    }

    /// Null out the first slot holding `context`, leaving a tombstone for
    /// the next wake pass. A no-op when `context` is not on the list.
    ///
    /// Takes the list's lock internally, so it is safe to call from the
    /// task's own execution context. This is the escape hatch for
    /// cancelled waits.
    pub fn remove(&self, context: &TaskHandle) {
        let mut lock = self.lock();

        let found = lock
            .guard
            .iter()
            .position(|slot| matches!(slot, Some(c) if handle_eq(c, context)));
        let Some(index) = found else { return };

        lock.guard[index] = None;

        debug_assert!(
            !lock
                .guard
                .iter()
                .skip(index + 1)
                .any(|slot| matches!(slot, Some(c) if handle_eq(c, context))),
            "task context parked twice on one wait list"
        );
    }

    fn assert_owns(&self, lock: &WaitListLock<'_>) {
        debug_assert!(
            std::ptr::eq(lock.list, self),
            "wait-list lock token used on a different list"
        );
    }
}
