//! Dynamic values exchanged between coroutines and the scheduler

use crate::socket::Socket;
use crate::task::TaskId;

/// A value yielded by a coroutine or sent back into one on resumption.
///
/// Coroutines are untyped at the scheduling boundary: a parent may delegate
/// to any sub-coroutine and receive whatever it returns. `Value` is the
/// closed set of shapes that can cross that boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value; also what a coroutine receives on its first resumption.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Raw bytes, e.g. the payload of a socket read.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Str(String),
    /// A task id, e.g. the reply to [`SystemCall::get_task_id`](crate::syscall::SystemCall::get_task_id).
    Task(TaskId),
    /// A socket handle, e.g. the connection produced by `accept`.
    Socket(Socket),
}

impl Value {
    /// Whether this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrowed byte payload, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrowed string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Task-id payload, if any.
    pub fn as_task(&self) -> Option<TaskId> {
        match self {
            Value::Task(id) => Some(*id),
            _ => None,
        }
    }

    /// Borrowed socket payload, if any.
    pub fn as_socket(&self) -> Option<&Socket> {
        match self {
            Value::Socket(s) => Some(s),
            _ => None,
        }
    }

    /// Owned byte payload, if any.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Owned socket payload, if any.
    pub fn into_socket(self) -> Option<Socket> {
        match self {
            Value::Socket(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<TaskId> for Value {
    fn from(id: TaskId) -> Self {
        Value::Task(id)
    }
}

impl From<Socket> for Value {
    fn from(s: Socket) -> Self {
        Value::Socket(s)
    }
}
