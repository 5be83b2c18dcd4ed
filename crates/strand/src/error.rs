//! Error types for tasks and the scheduler

use crate::task::TaskId;
use thiserror::Error;

/// An error raised inside a task's coroutine tree or by a system call
/// executed on its behalf.
///
/// Task errors are private to the task they occur in: the delegation
/// algorithm hands them to the nearest ancestor frame whose coroutine
/// catches them, and only an error nobody catches escapes `Task::run`.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A system call named a task id that is not in the task table.
    #[error("invalid task ID: {0}")]
    InvalidTaskId(TaskId),

    /// `accept` was requested on a socket that is not a listener.
    #[error("socket is not a listener")]
    NotAListener,

    /// `read`/`write` was requested on a socket that is not a connected stream.
    #[error("socket is not a connected stream")]
    NotAStream,

    /// The socket was already closed.
    #[error("socket is closed")]
    SocketClosed,

    /// An OS-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A failure raised by application coroutine logic.
    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Application-level error with a free-form message.
    pub fn other(msg: impl Into<String>) -> Self {
        TaskError::Other(msg.into())
    }
}

/// A failure that aborts the scheduler's run loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An error escaped a task's outermost frame while the failure policy
    /// was [`FailurePolicy::Abort`](crate::scheduler::FailurePolicy::Abort).
    #[error("task {id} failed: {source}")]
    TaskFailed {
        /// The task the error escaped from.
        id: TaskId,
        /// The escaped error.
        source: TaskError,
    },
}
