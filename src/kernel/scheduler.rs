// Two-queue cooperative scheduler
//
// Main-context work goes through Scheduler::put, interrupt work through
// IsrQueue::put. Each execute() call runs at most one task: ISR work first,
// then main work, then (optionally) sleep until the next interrupt.
//
// The ISR queue and its pending flag are the only state shared with
// interrupt context. Main context touches them only inside critical
// sections, and never while a task is running.
use core::cell::RefCell;
use core::fmt;

use critical_section::{CriticalSection, Mutex};
use log::{debug, trace};
use portable_atomic::{AtomicBool, Ordering};

use super::queue::{PutError, Queue};
use super::task::{Task, same_task};
use super::wake::Sleep;

/// What a single [`Scheduler::execute`] step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran the head of the ISR queue
    Isr,
    /// Ran the head of the main queue
    Main,
    /// Both queues looked empty, but ISR work landed before the halt
    Deferred,
    /// Halted and woke on an interrupt
    Slept,
    /// Nothing to run and sleep was not requested
    Idle,
}

impl Dispatch {
    pub const fn ran_task(self) -> bool {
        matches!(self, Dispatch::Isr | Dispatch::Main)
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Isr => write!(f, "Isr"),
            Dispatch::Main => write!(f, "Main"),
            Dispatch::Deferred => write!(f, "Deferred"),
            Dispatch::Slept => write!(f, "Slept"),
            Dispatch::Idle => write!(f, "Idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    /// Another scheduler already consumes this ISR queue
    AlreadyBound,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::AlreadyBound => write!(f, "isr queue already bound to a scheduler"),
        }
    }
}

impl core::error::Error for BindError {}

/// Queue fed from interrupt handlers.
///
/// Lives in a `static` so handlers can reach it:
///
/// ```ignore
/// static ISR_QUEUE: IsrQueue = IsrQueue::new();
///
/// fn gpio_handler() {
///     critical_section::with(|cs| {
///         let _ = ISR_QUEUE.put(cs, &BUTTON);
///     });
/// }
/// ```
pub struct IsrQueue {
    queue: Mutex<RefCell<Queue>>,
    // mirrors !queue.is_empty() so execute can test it without masking
    pending: AtomicBool,
    // set while a scheduler consumes this queue; only one may
    bound: AtomicBool,
}

impl IsrQueue {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Queue::new())),
            pending: AtomicBool::new(false),
            bound: AtomicBool::new(false),
        }
    }

    /// Submit `task` from interrupt context.
    ///
    /// The critical section token is the proof that nothing else touches
    /// the ISR queue meanwhile; inside a handler that is already the case,
    /// so taking one costs nothing extra.
    pub fn put(
        &self,
        cs: CriticalSection<'_>,
        task: &'static dyn Task,
    ) -> Result<&'static dyn Task, PutError> {
        let task = self.queue.borrow_ref_mut(cs).push(task)?;
        self.pending.store(true, Ordering::Release);
        Ok(task)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn len(&self, cs: CriticalSection<'_>) -> usize {
        self.queue.borrow_ref(cs).len()
    }

    fn head(&self, cs: CriticalSection<'_>) -> Option<&'static dyn Task> {
        self.queue.borrow_ref(cs).peek()
    }

    /// True while a [`Scheduler`] consumes this queue.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    fn bind(&self) -> Result<(), BindError> {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BindError::AlreadyBound)
    }

    fn unbind(&self) {
        self.bound.store(false, Ordering::Release);
    }

    // drop the head that just ran; last one out clears the flag
    fn retire(&self, cs: CriticalSection<'_>, ran: Option<&'static dyn Task>) {
        let mut queue = self.queue.borrow_ref_mut(cs);
        let popped = queue.pop();
        debug_assert!(
            match (popped, ran) {
                (Some(popped), Some(ran)) => same_task(popped, ran),
                (None, None) => true,
                _ => false,
            },
            "retired isr task is not the one that ran"
        );
        if queue.is_empty() {
            self.pending.store(false, Ordering::Release);
        }
    }
}

impl Default for IsrQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-context half of the scheduler.
///
/// Owns the main queue and the platform sleeper, and is the sole consumer
/// of the [`IsrQueue`] that interrupt handlers feed. Create one at startup
/// and drive [`execute`](Self::execute) from the main loop forever.
pub struct Scheduler<S: Sleep> {
    main: Queue,
    isr: &'static IsrQueue,
    sleeper: S,
}

impl<S: Sleep> Scheduler<S> {
    /// Bind to `isr` as its only consumer.
    ///
    /// Fails if another live scheduler is already bound to it; the binding
    /// is released when the scheduler is dropped.
    pub fn new(isr: &'static IsrQueue, sleeper: S) -> Result<Self, BindError> {
        isr.bind()?;
        Ok(Self {
            main: Queue::new(),
            isr,
            sleeper,
        })
    }

    /// Submit `task` from main context.
    pub fn put(&mut self, task: &'static dyn Task) -> Result<&'static dyn Task, PutError> {
        self.main
            .push(task)
            .inspect_err(|e| debug!("put rejected: {}", e))
    }

    /// Same as [`IsrQueue::put`] on this scheduler's ISR queue.
    pub fn put_isr(
        &self,
        cs: CriticalSection<'_>,
        task: &'static dyn Task,
    ) -> Result<&'static dyn Task, PutError> {
        self.isr.put(cs, task)
    }

    /// Run one scheduling step.
    ///
    /// `sleep` is the low-power mode to enter when there is nothing to
    /// do, or `None` to return immediately instead.
    pub fn execute(&mut self, sleep: Option<S::Mode>) -> Dispatch {
        let dispatch = self.step(sleep);
        trace!("execute: {}", dispatch);
        dispatch
    }

    fn step(&mut self, sleep: Option<S::Mode>) -> Dispatch {
        if self.isr.is_pending() {
            self.run_isr_head();
            return Dispatch::Isr;
        }

        if let Some(task) = self.main.pop() {
            task.run();
            return Dispatch::Main;
        }

        match sleep {
            Some(mode) => self.idle(mode),
            None => Dispatch::Idle,
        }
    }

    // The head stays queued while it runs; interrupts only ever append
    // behind it and this scheduler is the only consumer, so it is still the
    // head when we come back to retire it.
    fn run_isr_head(&self) {
        let head = critical_section::with(|cs| self.isr.head(cs));
        if let Some(task) = head {
            task.run();
        }
        critical_section::with(|cs| self.isr.retire(cs, head));
    }

    fn idle(&mut self, mode: S::Mode) -> Dispatch {
        let isr = self.isr;
        let sleeper = &mut self.sleeper;

        let slept = critical_section::with(|cs| {
            // an interrupt may have queued work since the check in execute
            if isr.is_pending() {
                return false;
            }
            sleeper.sleep(cs, mode);
            true
        });

        if slept {
            Dispatch::Slept
        } else {
            Dispatch::Deferred
        }
    }

    pub fn is_idle(&self) -> bool {
        self.main.is_empty() && !self.isr.is_pending()
    }

    /// Tasks waiting in both queues.
    pub fn pending(&self) -> usize {
        self.main.len() + critical_section::with(|cs| self.isr.len(cs))
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn sleeper_mut(&mut self) -> &mut S {
        &mut self.sleeper
    }
}

impl<S: Sleep> Drop for Scheduler<S> {
    fn drop(&mut self) {
        self.isr.unbind();
    }
}
