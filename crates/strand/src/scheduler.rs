//! The scheduler: task table, FIFO run queue, I/O wait sets
//!
//! Single-threaded and cooperative. The run loop repeatedly dequeues the head
//! task and resumes it once; a resumed task either yields a system call (the
//! scheduler executes it), yields an ordinary value (the task is re-queued at
//! the tail, giving round-robin fairness), or finishes (it is removed). Tasks
//! waiting for socket readiness live in per-direction wait sets and are woken
//! by the internal I/O poll task.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use rustc_hash::FxHashMap;
use tracing::{debug, error, trace};

use crate::coroutine::{BoxCoroutine, Coroutine, Step};
use crate::error::{SchedulerError, TaskError};
use crate::poller::{Multiplexer, PollMultiplexer, Timeout};
use crate::socket::{Socket, SocketId};
use crate::syscall::SystemCall;
use crate::task::{RunResult, Task, TaskId};
use crate::value::Value;

/// What to do when an error escapes a task's outermost frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the entire run loop, returning
    /// [`SchedulerError::TaskFailed`]. Fail-fast; callers needing isolation
    /// between tasks wrap task bodies with their own top-level handler.
    #[default]
    Abort,
    /// Drop the failed task, log the error, and keep running the others.
    DropTask,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
    /// Policy for errors that no frame of a task catches.
    pub failure_policy: FailurePolicy,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks spawned.
    pub tasks_spawned: u64,
    /// Total tasks that ran to completion.
    pub tasks_completed: u64,
    /// Tasks currently in the task table.
    pub active_tasks: usize,
    /// Task ids currently queued to run.
    pub queued: usize,
    /// Sockets with a registered read waiter.
    pub read_waiters: usize,
    /// Sockets with a registered write waiter.
    pub write_waiters: usize,
}

/// A task parked until a socket becomes ready in one direction.
struct IoWaiter {
    fd: RawFd,
    task: TaskId,
}

/// The perpetual internal task installed by [`Scheduler::with_io_poll`]:
/// one multiplexing pass per scheduling cycle, forever.
struct IoPollCoroutine;

impl Coroutine for IoPollCoroutine {
    fn resume(&mut self, _input: Value) -> Result<Step, TaskError> {
        Ok(Step::Syscall(SystemCall::io_poll()))
    }
}

/// The cooperative scheduler. Owns every task from creation to completion.
pub struct Scheduler {
    next_id: u64,
    tasks: FxHashMap<TaskId, Task>,
    run_queue: VecDeque<TaskId>,
    readers: FxHashMap<SocketId, IoWaiter>,
    writers: FxHashMap<SocketId, IoWaiter>,
    multiplexer: Box<dyn Multiplexer>,
    config: SchedulerConfig,
    io_poll_task: Option<TaskId>,
    tasks_spawned: u64,
    tasks_completed: u64,
}

impl Scheduler {
    /// Create a scheduler with the default configuration and the `poll(2)`
    /// multiplexer.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Scheduler {
            next_id: 0,
            tasks: FxHashMap::default(),
            run_queue: VecDeque::new(),
            readers: FxHashMap::default(),
            writers: FxHashMap::default(),
            multiplexer: Box::new(PollMultiplexer),
            config,
            io_poll_task: None,
            tasks_spawned: 0,
            tasks_completed: 0,
        }
    }

    /// Replace the readiness multiplexer (consuming builder style).
    pub fn with_multiplexer(mut self, multiplexer: Box<dyn Multiplexer>) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    /// Install the perpetual I/O poll task and return the scheduler.
    pub fn with_io_poll(mut self) -> Self {
        let id = self.new_task(Box::new(IoPollCoroutine));
        self.io_poll_task = Some(id);
        self
    }

    /// Id of the installed I/O poll task, if any.
    pub fn io_poll_task(&self) -> Option<TaskId> {
        self.io_poll_task
    }

    /// Create a task for `coroutine`, register it, and enqueue it at the run
    /// queue's tail. Ids start at 1 and are never reused, even across kills.
    pub fn new_task(&mut self, coroutine: BoxCoroutine) -> TaskId {
        self.next_id += 1;
        let id = TaskId::from_u64(self.next_id);
        self.tasks.insert(id, Task::new(id, coroutine));
        self.tasks_spawned += 1;
        debug!("task {} spawned", id);
        self.schedule(id);
        id
    }

    /// Remove a task from every scheduler structure. Returns whether it
    /// existed.
    ///
    /// This is bookkeeping removal only: no cancellation signal reaches the
    /// coroutine and resources it owns are not released. Registered I/O
    /// waits are purged so a readiness event can never resume a dead id.
    pub fn kill_task(&mut self, id: TaskId) -> bool {
        if self.tasks.remove(&id).is_none() {
            return false;
        }
        self.run_queue.retain(|&queued| queued != id);
        self.readers.retain(|_, w| w.task != id);
        self.writers.retain(|_, w| w.task != id);
        debug!("task {} killed", id);
        true
    }

    /// Append a task id to the run queue's tail. A task id occupies at most
    /// one queue slot; re-scheduling an already-queued id is a no-op.
    pub fn schedule(&mut self, id: TaskId) {
        if !self.run_queue.contains(&id) {
            trace!("task {} scheduled", id);
            self.run_queue.push_back(id);
        }
    }

    /// Store a resume value for a task's next resumption. Unknown ids are
    /// ignored.
    pub fn send_to(&mut self, id: TaskId, value: Value) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.send(value);
        }
    }

    /// Store an injected error for a task's next resumption. Unknown ids are
    /// ignored.
    pub fn throw_to(&mut self, id: TaskId, err: TaskError) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.throw(err);
        }
    }

    /// Register `task` as the single read waiter for `socket`, overwriting
    /// any prior waiter. Does not enqueue it.
    pub fn wait_for_read(&mut self, socket: &Socket, task: TaskId) {
        trace!("task {} waiting for read on socket {}", task, socket.id());
        self.readers.insert(
            socket.id(),
            IoWaiter {
                fd: socket.raw_fd(),
                task,
            },
        );
    }

    /// Register `task` as the single write waiter for `socket`, overwriting
    /// any prior waiter. Does not enqueue it.
    pub fn wait_for_write(&mut self, socket: &Socket, task: TaskId) {
        trace!("task {} waiting for write on socket {}", task, socket.id());
        self.writers.insert(
            socket.id(),
            IoWaiter {
                fd: socket.raw_fd(),
                task,
            },
        );
    }

    /// Drive the run queue until it is empty.
    ///
    /// Each dequeued task is resumed exactly once per cycle. A system-call
    /// continuation that fails has its error injected back into the
    /// requester, which is then rescheduled. An error escaping a task's
    /// outermost frame follows the configured [`FailurePolicy`].
    pub fn run(&mut self) -> Result<(), SchedulerError> {
        while let Some(id) = self.run_queue.pop_front() {
            let Some(task) = self.tasks.get_mut(&id) else {
                // Killed while queued; nothing left to resume.
                continue;
            };

            match task.run() {
                Ok(RunResult::Syscall(call)) => {
                    trace!("task {} requested {:?}", id, call);
                    if let Err(err) = call.invoke(id, self) {
                        debug!("system call failed for task {}: {}", id, err);
                        self.throw_to(id, err);
                        self.schedule(id);
                    }
                }
                Ok(RunResult::Yielded(_)) => {
                    // Plain cooperative yield: back to the tail.
                    self.schedule(id);
                }
                Ok(RunResult::Finished) => {
                    self.tasks.remove(&id);
                    self.tasks_completed += 1;
                    debug!("task {} completed", id);
                }
                Err(err) => {
                    self.tasks.remove(&id);
                    match self.config.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(SchedulerError::TaskFailed { id, source: err });
                        }
                        FailurePolicy::DropTask => {
                            error!("task {} failed: {}", id, err);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// One multiplexing pass over the wait sets.
    ///
    /// Skipped entirely when both sets are empty. Blocks indefinitely when
    /// nothing else is runnable (the poll task has already been dequeued at
    /// this point), polls without blocking otherwise so runnable work is
    /// never starved. Every ready handle's waiter is removed from its wait
    /// set — waiting is one-shot — and rescheduled.
    pub(crate) fn poll_io(&mut self) -> Result<(), TaskError> {
        if self.readers.is_empty() && self.writers.is_empty() {
            return Ok(());
        }

        let timeout = if self.run_queue.is_empty() {
            Timeout::Block
        } else {
            Timeout::Immediate
        };

        let read_fds: Vec<RawFd> = self.readers.values().map(|w| w.fd).collect();
        let write_fds: Vec<RawFd> = self.writers.values().map(|w| w.fd).collect();
        let events = self.multiplexer.poll(&read_fds, &write_fds, timeout)?;

        for fd in events.readable {
            if let Some(task) = take_waiter(&mut self.readers, fd) {
                trace!("task {} woken for read", task);
                self.schedule(task);
            }
        }
        for fd in events.writable {
            if let Some(task) = take_waiter(&mut self.writers, fd) {
                trace!("task {} woken for write", task);
                self.schedule(task);
            }
        }
        Ok(())
    }

    /// Current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_spawned: self.tasks_spawned,
            tasks_completed: self.tasks_completed,
            active_tasks: self.tasks.len(),
            queued: self.run_queue.len(),
            read_waiters: self.readers.len(),
            write_waiters: self.writers.len(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove and return the waiter registered for `fd`, if any.
fn take_waiter(waiters: &mut FxHashMap<SocketId, IoWaiter>, fd: RawFd) -> Option<TaskId> {
    let key = waiters
        .iter()
        .find_map(|(id, w)| (w.fd == fd).then_some(*id))?;
    waiters.remove(&key).map(|w| w.task)
}
