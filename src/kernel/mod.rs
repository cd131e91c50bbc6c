// Cooperative scheduler and idle/sleep primitives
// Single core, no preemption. Tasks run to completion, one per execute().
//
// Two queues: main (fed from the main loop) and ISR (fed from interrupt
// handlers through a critical section). ISR work always goes first. When
// both are empty the main loop may sleep until the next interrupt.

pub mod queue;
pub mod scheduler;
pub mod task;
pub mod wake;

pub use queue::{PutError, Queue};
pub use scheduler::{BindError, Dispatch, IsrQueue, Scheduler};
pub use task::{FnTask, Link, Task};
pub use wake::{Sleep, Wfi, wait_for_interrupt};
