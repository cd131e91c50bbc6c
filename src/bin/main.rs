// pulp-sched demo for the ESP32-C3
//
// Boot sequence: logger -> timer -> scheduler
// Main loop: execute() one task at a time, WFI when both queues are empty
//
// TIMG0 fires every TICK_MS and its handler queues TICK through the ISR
// queue. A tick that arrives while the previous one is still queued is
// coalesced and counted. Every REPORT_EVERY ticks the main loop queues a
// status report on the main queue.

#![no_std]
#![no_main]

use core::cell::RefCell;

use critical_section::Mutex;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::time::{Duration, Instant};
use esp_hal::timer::PeriodicTimer;
use esp_hal::timer::timg::TimerGroup;
use log::{info, warn};
use portable_atomic::{AtomicU32, Ordering};
use static_cell::StaticCell;

use pulp_sched::kernel::{FnTask, IsrQueue, Link, Scheduler, Task, Wfi};

esp_bootloader_esp_idf::esp_app_desc!();

const TICK_MS: u64 = 10;
const REPORT_EVERY: u32 = 100; // 1 second in 10ms ticks

static TIMER0: Mutex<RefCell<Option<PeriodicTimer<'static, esp_hal::Blocking>>>> =
    Mutex::new(RefCell::new(None));

static ISR_QUEUE: IsrQueue = IsrQueue::new();

// riscv32imc has no atomic add; portable-atomic falls back to a cs
static TICKS: AtomicU32 = AtomicU32::new(0);
static COALESCED: AtomicU32 = AtomicU32::new(0);

static TICK: FnTask<fn()> = FnTask::new(on_tick);
static REPORT: StaticCell<Report> = StaticCell::new();

fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

struct Report {
    booted: Instant,
    link: Link,
}

// Safety: `link` always returns the embedded field.
unsafe impl Task for Report {
    fn run(&self) {
        info!(
            "uptime {}ms: {} ticks, {} coalesced",
            self.booted.elapsed().as_millis(),
            TICKS.load(Ordering::Relaxed),
            COALESCED.load(Ordering::Relaxed),
        );
    }

    fn link(&self) -> &Link {
        &self.link
    }
}

#[esp_hal::handler(priority = esp_hal::interrupt::Priority::Priority1)]
fn timer0_handler() {
    critical_section::with(|cs| {
        if let Some(timer) = TIMER0.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
        if ISR_QUEUE.put(cs, &TICK).is_err() {
            COALESCED.fetch_add(1, Ordering::Relaxed);
        }
    });
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("booting...");

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut timer0 = PeriodicTimer::new(timg0.timer0);
    critical_section::with(|cs| {
        timer0.set_interrupt_handler(timer0_handler);
        timer0.start(Duration::from_millis(TICK_MS)).unwrap();
        timer0.listen();
        TIMER0.borrow_ref_mut(cs).replace(timer0);
    });
    info!("timer initialized.");

    let report: &'static Report = REPORT.init(Report {
        booted: Instant::now(),
        link: Link::new(),
    });
    let mut sched = Scheduler::new(&ISR_QUEUE, Wfi).unwrap();
    info!("scheduler ready.");

    let mut next_report = REPORT_EVERY;
    loop {
        sched.execute(Some(()));

        if TICKS.load(Ordering::Relaxed) >= next_report {
            next_report = next_report.wrapping_add(REPORT_EVERY);
            if sched.put(report).is_err() {
                warn!("report still queued, skipping");
            }
        }
    }
}
