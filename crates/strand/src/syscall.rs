//! System calls: scheduler-executed actions requested by coroutines
//!
//! A coroutine that needs the scheduler to act on its behalf yields a
//! [`SystemCall`] instead of an observable value. The scheduler invokes the
//! wrapped continuation exactly once with the requesting task's id and a
//! mutable borrow of itself; an `Err` from the continuation is caught by the
//! run loop and injected back into the requester as an error.

use crate::coroutine::BoxCoroutine;
use crate::error::TaskError;
use crate::scheduler::Scheduler;
use crate::socket::Socket;
use crate::task::TaskId;
use crate::value::Value;

type Continuation = Box<dyn FnOnce(TaskId, &mut Scheduler) -> Result<(), TaskError>>;

/// A deferred, scheduler-executed action.
///
/// The continuation is solely responsible for what happens to the requesting
/// task next: reschedule it, leave it waiting, or nothing at all.
pub struct SystemCall {
    name: &'static str,
    continuation: Continuation,
}

impl SystemCall {
    /// Wrap a continuation as a system call. `name` shows up in `Debug`
    /// output and trace logs.
    pub fn new<F>(name: &'static str, continuation: F) -> Self
    where
        F: FnOnce(TaskId, &mut Scheduler) -> Result<(), TaskError> + 'static,
    {
        SystemCall {
            name,
            continuation: Box::new(continuation),
        }
    }

    /// The name given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute the continuation. Consumes the call; invoked exactly once by
    /// the scheduler's run loop.
    pub(crate) fn invoke(self, task: TaskId, scheduler: &mut Scheduler) -> Result<(), TaskError> {
        (self.continuation)(task, scheduler)
    }

    /// Send the requester its own task id and reschedule it.
    pub fn get_task_id() -> Self {
        SystemCall::new("get_task_id", |task, scheduler| {
            scheduler.send_to(task, Value::Task(task));
            scheduler.schedule(task);
            Ok(())
        })
    }

    /// Kill the target task and reschedule the requester.
    ///
    /// An unknown target raises [`TaskError::InvalidTaskId`], which the
    /// scheduler injects back into the requester on its next resumption.
    pub fn kill_task(target: TaskId) -> Self {
        SystemCall::new("kill_task", move |task, scheduler| {
            if scheduler.kill_task(target) {
                scheduler.schedule(task);
                Ok(())
            } else {
                Err(TaskError::InvalidTaskId(target))
            }
        })
    }

    /// Spawn a new task (fire and forget), send the new id back to the
    /// requester, and reschedule it.
    pub fn new_task(coroutine: BoxCoroutine) -> Self {
        SystemCall::new("new_task", move |task, scheduler| {
            let spawned = scheduler.new_task(coroutine);
            scheduler.send_to(task, Value::Task(spawned));
            scheduler.schedule(task);
            Ok(())
        })
    }

    /// Register the requester as the read waiter for `socket`.
    ///
    /// Does not reschedule it: the task stays suspended until the I/O poll
    /// task observes read readiness on the socket.
    pub fn wait_for_read(socket: Socket) -> Self {
        SystemCall::new("wait_for_read", move |task, scheduler| {
            scheduler.wait_for_read(&socket, task);
            Ok(())
        })
    }

    /// Register the requester as the write waiter for `socket`. See
    /// [`wait_for_read`](SystemCall::wait_for_read).
    pub fn wait_for_write(socket: Socket) -> Self {
        SystemCall::new("wait_for_write", move |task, scheduler| {
            scheduler.wait_for_write(&socket, task);
            Ok(())
        })
    }

    /// One multiplexing pass over the wait sets, then reschedule the
    /// requester. Yielded once per cycle by the internal I/O poll task.
    pub(crate) fn io_poll() -> Self {
        SystemCall::new("io_poll", |task, scheduler| {
            scheduler.poll_io()?;
            scheduler.schedule(task);
            Ok(())
        })
    }
}

impl std::fmt::Debug for SystemCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemCall({})", self.name)
    }
}
