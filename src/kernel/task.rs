// Task contract and the containment bookkeeping queues use to link tasks
//
// A task is any 'static value that can run with no arguments and owns a
// Link. The Link is what a Queue threads through; host code only ever
// constructs one and hands it back from Task::link().
//
// Membership is an explicit marker next to the successor pointer, not the
// pointer itself. The marker is claimed with CAS so a main-context put and
// an ISR put racing on the same task cannot both win.

use core::cell::Cell;
use core::fmt;

use portable_atomic::{AtomicBool, Ordering};

/// A deferred unit of work.
///
/// The scheduler never inspects the outcome of [`Task::run`] and never
/// retries it. Any state the work needs must live in the implementor.
///
/// # Safety
///
/// [`Task::link`] must return a reference to the same `Link` on every call
/// for as long as the task lives, and that `Link` must not be shared with
/// any other task. Queues write the link's successor without further
/// synchronization once they have claimed it; handing out a different
/// `Link` would let two queues write the same cell.
///
/// ```ignore
/// struct Blink {
///     led: Led,
///     link: Link,
/// }
///
/// unsafe impl Task for Blink {
///     fn run(&self) {
///         self.led.toggle();
///     }
///
///     fn link(&self) -> &Link {
///         &self.link
///     }
/// }
/// ```
pub unsafe trait Task: Sync {
    fn run(&self);

    /// The link this task is queued through.
    fn link(&self) -> &Link;
}

/// Intrusive queue bookkeeping embedded in every task.
pub struct Link {
    // successor in the owning queue's cycle; only touched by that queue
    next: Cell<Option<&'static dyn Task>>,
    queued: AtomicBool,
}

// Safety: `next` is written only by the queue that successfully claimed
// `queued` (the `Task` contract ties each task to exactly one link), and a
// queue is reached either through `&mut` from main context
// or through a critical section. `release` clears `next` before publishing
// the marker, so the next claimant never observes a stale successor.
unsafe impl Sync for Link {}

impl Link {
    pub const fn new() -> Self {
        Self {
            next: Cell::new(None),
            queued: AtomicBool::new(false),
        }
    }

    /// True while the task is a member of some queue.
    #[inline]
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    // false if another queue already owns the task
    #[inline]
    pub(crate) fn claim(&self) -> bool {
        self.queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub(crate) fn release(&self) {
        self.next.set(None);
        self.queued.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn next(&self) -> Option<&'static dyn Task> {
        self.next.get()
    }

    #[inline]
    pub(crate) fn set_next(&self, next: &'static dyn Task) {
        self.next.set(Some(next));
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("queued", &self.is_queued())
            .finish()
    }
}

/// Task backed by a plain function or closure.
///
/// ```ignore
/// static TICK: FnTask<fn()> = FnTask::new(on_tick);
/// ```
pub struct FnTask<F> {
    f: F,
    link: Link,
}

impl<F> FnTask<F>
where
    F: Fn() + Sync,
{
    pub const fn new(f: F) -> Self {
        Self {
            f,
            link: Link::new(),
        }
    }
}

// Safety: `link` always returns the embedded field.
unsafe impl<F> Task for FnTask<F>
where
    F: Fn() + Sync,
{
    #[inline]
    fn run(&self) {
        (self.f)()
    }

    #[inline]
    fn link(&self) -> &Link {
        &self.link
    }
}

/// Identity comparison; two task references are the same task iff they
/// point at the same storage.
#[inline]
pub(crate) fn same_task(a: &dyn Task, b: &dyn Task) -> bool {
    core::ptr::addr_eq(a as *const dyn Task, b as *const dyn Task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fresh_link_is_not_queued() {
        let link = Link::new();
        assert!(!link.is_queued());
        assert!(link.next().is_none());
    }

    #[test]
    fn claim_is_exclusive_until_release() {
        let link = Link::new();
        assert!(link.claim());
        assert!(link.is_queued());
        assert!(!link.claim());

        link.release();
        assert!(!link.is_queued());
        assert!(link.claim());
    }

    #[test]
    fn fn_task_runs_its_closure() {
        static HITS: AtomicUsize = AtomicUsize::new(0);
        let task = FnTask::new(|| {
            HITS.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        });

        task.run();
        task.run();
        assert_eq!(HITS.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert!(!task.link().is_queued());
    }

    #[test]
    fn identity_is_by_address() {
        fn noop() {}
        let a: &'static FnTask<fn()> = Box::leak(Box::new(FnTask::new(noop as fn())));
        let b: &'static FnTask<fn()> = Box::leak(Box::new(FnTask::new(noop as fn())));
        assert!(same_task(a, a));
        assert!(!same_task(a, b));
    }
}
