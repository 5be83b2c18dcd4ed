//! Strand: a single-threaded cooperative task scheduler
//!
//! Tasks are coroutines resumed one step at a time by a round-robin run
//! queue. A coroutine can delegate to a sub-coroutine (the task flattens
//! arbitrary delegation depth into one resumable sequence), request scheduler
//! actions by yielding a [`SystemCall`], and perform non-blocking socket I/O
//! through [`Socket`]'s coroutine-shaped operations, suspending until the
//! scheduler's I/O poll task observes readiness.
//!
//! ```no_run
//! use strand::{from_fn, Scheduler, Step, SystemCall, Value};
//!
//! let mut n = 0;
//! let mut scheduler = Scheduler::new();
//! scheduler.new_task(from_fn(move |input| {
//!     n += 1;
//!     match n {
//!         1 => Ok(Step::Syscall(SystemCall::get_task_id())),
//!         2 => {
//!             println!("running as task {:?}", input.as_task());
//!             Ok(Step::Done)
//!         }
//!         _ => Ok(Step::Done),
//!     }
//! }));
//! scheduler.run().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod coroutine;
mod error;
mod poller;
mod scheduler;
mod socket;
mod syscall;
mod task;
mod value;

pub use coroutine::{from_fn, BoxCoroutine, Coroutine, Emit, Step};
pub use error::{SchedulerError, TaskError};
pub use poller::{Multiplexer, PollEvents, PollMultiplexer, Timeout};
pub use scheduler::{FailurePolicy, Scheduler, SchedulerConfig, SchedulerStats};
pub use socket::{Socket, SocketId};
pub use syscall::SystemCall;
pub use task::{RunResult, Task, TaskId};
pub use value::Value;
