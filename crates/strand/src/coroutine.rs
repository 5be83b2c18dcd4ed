//! The coroutine abstraction: explicit resumable state machines
//!
//! A coroutine is any stateful computation that can be resumed with a value
//! (or an injected error) and produces one [`Step`] per resumption. The trait
//! is deliberately manual — no host-language generator magic — because the
//! delegation semantics in [`Task`](crate::task::Task) (ReturnValue splicing,
//! frame-by-frame error redirection) are bespoke.

use crate::error::TaskError;
use crate::syscall::SystemCall;
use crate::value::Value;

/// A boxed coroutine, as stored in task frames and delegation steps.
pub type BoxCoroutine = Box<dyn Coroutine>;

/// An observable value handed to the external driver, with an optional
/// association key carried through delegation unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Emit {
    /// Pass-through tag; `None` when the coroutine attached no key.
    pub key: Option<Value>,
    /// The yielded value itself.
    pub value: Value,
}

impl Emit {
    /// An untagged yield.
    pub fn new(value: Value) -> Self {
        Emit { key: None, value }
    }

    /// A key-tagged yield.
    pub fn keyed(key: Value, value: Value) -> Self {
        Emit {
            key: Some(key),
            value,
        }
    }
}

/// What a coroutine produces at one suspension point.
pub enum Step {
    /// Yield an ordinary observable value to the external driver.
    Yield(Emit),
    /// Yield a scheduler-executed action instead of an observable value.
    Syscall(SystemCall),
    /// Splice a nested coroutine in as if inlined; its `Return` payload is
    /// delivered back here as the next resume value.
    Delegate(BoxCoroutine),
    /// Terminate the enclosing delegation frame, handing the payload to the
    /// parent frame. At the top level the payload is discarded.
    Return(Value),
    /// The coroutine is exhausted.
    Done,
}

impl Step {
    /// Shorthand for an untagged `Step::Yield`.
    pub fn value(value: Value) -> Self {
        Step::Yield(Emit::new(value))
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Yield(emit) => f.debug_tuple("Yield").field(emit).finish(),
            Step::Syscall(call) => f.debug_tuple("Syscall").field(call).finish(),
            Step::Delegate(_) => f.write_str("Delegate(..)"),
            Step::Return(v) => f.debug_tuple("Return").field(v).finish(),
            Step::Done => f.write_str("Done"),
        }
    }
}

/// A resumable computation.
///
/// The contract mirrors a manually-driven generator:
///
/// - `resume(input)` advances to the next suspension point. The very first
///   resumption receives [`Value::Null`]; later ones receive whatever the
///   driver (or a completed sub-coroutine) sent back.
/// - `throw(err)` resumes with an injected error instead of a value. The
///   default implementation re-raises, which makes the error propagate to the
///   parent frame — override it to catch.
/// - After returning [`Step::Done`], [`Step::Return`], or `Err`, a coroutine
///   is never resumed again.
pub trait Coroutine {
    /// Resume with a value and produce the next step.
    fn resume(&mut self, input: Value) -> Result<Step, TaskError>;

    /// Resume with an injected error. Uncaught by default.
    fn throw(&mut self, err: TaskError) -> Result<Step, TaskError> {
        Err(err)
    }
}

/// A coroutine built from a closure, mostly useful for small tasks and tests.
///
/// The closure receives the resume value and returns the next step; captured
/// state (a step counter, accumulated data) carries it between resumptions.
/// Injected errors are uncaught, as per the trait default.
struct FnCoroutine<F> {
    f: F,
}

impl<F> Coroutine for FnCoroutine<F>
where
    F: FnMut(Value) -> Result<Step, TaskError>,
{
    fn resume(&mut self, input: Value) -> Result<Step, TaskError> {
        (self.f)(input)
    }
}

/// Wrap a closure as a [`BoxCoroutine`].
pub fn from_fn<F>(f: F) -> BoxCoroutine
where
    F: FnMut(Value) -> Result<Step, TaskError> + 'static,
{
    Box::new(FnCoroutine { f })
}
