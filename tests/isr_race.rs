// Threads stand in for interrupt handlers; the critical-section std
// backend is a global lock, which gives the same mutual exclusion that
// masking interrupts gives on a single core.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;

use critical_section::CriticalSection;
use pulp_sched::kernel::{IsrQueue, Link, Scheduler, Sleep, Task};

struct Counted {
    runs: AtomicUsize,
    link: Link,
}

impl Counted {
    const fn new() -> Self {
        Self {
            runs: AtomicUsize::new(0),
            link: Link::new(),
        }
    }
}

unsafe impl Task for Counted {
    fn run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    fn link(&self) -> &Link {
        &self.link
    }
}

struct CheckedNap {
    isr: &'static IsrQueue,
    naps: usize,
}

impl Sleep for CheckedNap {
    type Mode = ();

    fn sleep(&mut self, _cs: CriticalSection<'_>, _mode: ()) {
        assert!(!self.isr.is_pending(), "halted with ISR work queued");
        self.naps += 1;
        thread::yield_now();
    }
}

struct NoNap;

impl Sleep for NoNap {
    type Mode = ();

    fn sleep(&mut self, _cs: CriticalSection<'_>, _mode: ()) {}
}

static ISR_QUEUE: IsrQueue = IsrQueue::new();
static TASKS: [Counted; 4] = [const { Counted::new() }; 4];

#[test]
fn isr_submissions_are_never_lost_or_doubled() {
    const ROUNDS: usize = 20_000;

    let done = AtomicBool::new(false);
    let accepted: [AtomicUsize; 4] = [const { AtomicUsize::new(0) }; 4];

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..ROUNDS {
                let slot = i % TASKS.len();
                let task: &'static dyn Task = &TASKS[slot];
                if critical_section::with(|cs| ISR_QUEUE.put(cs, task)).is_ok() {
                    accepted[slot].fetch_add(1, Ordering::Relaxed);
                }
                if i % 64 == 0 {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        });

        let mut sched = Scheduler::new(
            &ISR_QUEUE,
            CheckedNap {
                isr: &ISR_QUEUE,
                naps: 0,
            },
        ).unwrap();
        while !done.load(Ordering::Acquire) {
            sched.execute(Some(()));
        }
        while sched.execute(None).ran_task() {}
        assert!(sched.is_idle());
    });

    let mut total = 0;
    for (task, accepted) in TASKS.iter().zip(&accepted) {
        let accepted = accepted.load(Ordering::Relaxed);
        assert_eq!(task.runs.load(Ordering::Relaxed), accepted);
        assert!(!task.link().is_queued());
        total += accepted;
    }
    assert!(total > 0);
    assert!(!ISR_QUEUE.is_pending());
}

static SHARED: IsrQueue = IsrQueue::new();
static ONCE: Counted = Counted::new();

#[test]
fn isr_queue_accepts_a_single_consumer() {
    critical_section::with(|cs| SHARED.put(cs, &ONCE)).unwrap();

    let bound = AtomicUsize::new(0);
    let attempted = Barrier::new(2);
    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                let sched = Scheduler::new(&SHARED, NoNap);
                // keep the winner alive until both have tried
                attempted.wait();
                if let Ok(mut sched) = sched {
                    bound.fetch_add(1, Ordering::Relaxed);
                    while sched.execute(None).ran_task() {}
                }
            });
        }
    });

    assert_eq!(bound.load(Ordering::Relaxed), 1);
    assert_eq!(ONCE.runs.load(Ordering::Relaxed), 1);
    assert!(!SHARED.is_pending());
    assert!(!SHARED.is_bound());
}
