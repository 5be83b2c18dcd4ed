//! Task structure and the delegation-flattening algorithm
//!
//! A task wraps one user coroutine and normalizes arbitrarily deep delegation
//! (a coroutine yielding another coroutine) into a single flat resumable
//! sequence. The flattening uses an explicit LIFO stack of suspended ancestor
//! frames; a completed frame's `Return` payload becomes the resume value of
//! its parent, and an error is re-thrown frame by frame until some ancestor
//! catches it or it escapes the task.

use crate::coroutine::{BoxCoroutine, Emit, Step};
use crate::error::TaskError;
use crate::syscall::SystemCall;
use crate::value::Value;

/// Unique identifier for a task.
///
/// Issued by the scheduler, starting at 1, strictly increasing, never reused
/// — not even after the task is killed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value.
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What one `Task::run` invocation produced.
#[derive(Debug)]
pub enum RunResult {
    /// The flattened sequence yielded an ordinary observable value.
    Yielded(Emit),
    /// The flattened sequence yielded a scheduler-executed action.
    Syscall(SystemCall),
    /// The sequence is exhausted; the task is finished.
    Finished,
}

/// The scheduler's unit of execution: one flattened coroutine sequence.
pub struct Task {
    /// Stable identity, set at construction.
    id: TaskId,

    /// The coroutine frame currently being driven.
    current: BoxCoroutine,

    /// Suspended ancestor frames; depth equals delegation depth.
    frames: Vec<BoxCoroutine>,

    /// True until the first `run` invocation.
    before_first: bool,

    /// Resume value for the next `run`. Mutually exclusive with
    /// `throw_error`; consumed (and cleared) by the resumption that uses it.
    send_value: Option<Value>,

    /// Error to inject on the next `run`; takes precedence over `send_value`.
    throw_error: Option<TaskError>,

    /// Set once the flattened sequence is exhausted or an error escaped.
    finished: bool,
}

/// What gets fed into the current frame on the next internal resumption.
enum Feed {
    Value(Value),
    Error(TaskError),
}

impl Task {
    /// Wrap a coroutine as a task. Ids are allocated by the scheduler.
    pub fn new(id: TaskId, coroutine: BoxCoroutine) -> Self {
        Task {
            id,
            current: coroutine,
            frames: Vec::new(),
            before_first: true,
            send_value: None,
            throw_error: None,
            finished: false,
        }
    }

    /// Stable identity, set at construction.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Store a resume value for the next `run`.
    pub fn send(&mut self, value: Value) {
        self.send_value = Some(value);
    }

    /// Store an injected error for the next `run`.
    ///
    /// Takes precedence over any stored resume value, which is dropped so
    /// that at most one of the two slots is ever populated.
    pub fn throw(&mut self, err: TaskError) {
        self.send_value = None;
        self.throw_error = Some(err);
    }

    /// True once the flattened sequence is exhausted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Resume the flattened sequence once.
    ///
    /// The first invocation produces the initial value without sending
    /// anything. Subsequent invocations inject the stored error if one is
    /// pending, else send the stored resume value (defaulting to
    /// [`Value::Null`]). An error that no frame catches marks the task
    /// finished and propagates to the caller.
    pub fn run(&mut self) -> Result<RunResult, TaskError> {
        if self.finished {
            return Ok(RunResult::Finished);
        }

        let feed = if self.before_first {
            self.before_first = false;
            Feed::Value(Value::Null)
        } else if let Some(err) = self.throw_error.take() {
            Feed::Error(err)
        } else {
            Feed::Value(self.send_value.take().unwrap_or(Value::Null))
        };

        self.advance(feed)
    }

    /// Drive the current frame (and the frame stack) to the next external
    /// suspension point.
    fn advance(&mut self, mut feed: Feed) -> Result<RunResult, TaskError> {
        loop {
            let step = match feed {
                Feed::Value(value) => self.current.resume(value),
                Feed::Error(err) => self.current.throw(err),
            };

            match step {
                // Pure descent: the nested frame starts fresh.
                Ok(Step::Delegate(sub)) => {
                    let parent = std::mem::replace(&mut self.current, sub);
                    self.frames.push(parent);
                    feed = Feed::Value(Value::Null);
                }

                // Frame complete; its payload resumes the parent. A `Return`
                // at the true top level is an ordinary completion with a
                // discarded payload.
                Ok(Step::Return(value)) => match self.frames.pop() {
                    None => {
                        self.finished = true;
                        return Ok(RunResult::Finished);
                    }
                    Some(parent) => {
                        self.current = parent;
                        feed = Feed::Value(value);
                    }
                },

                // Plain exhaustion resumes the parent with an absent value.
                Ok(Step::Done) => match self.frames.pop() {
                    None => {
                        self.finished = true;
                        return Ok(RunResult::Finished);
                    }
                    Some(parent) => {
                        self.current = parent;
                        feed = Feed::Value(Value::Null);
                    }
                },

                Ok(Step::Yield(emit)) => return Ok(RunResult::Yielded(emit)),
                Ok(Step::Syscall(call)) => return Ok(RunResult::Syscall(call)),

                // Redirect the error to the parent frame; with no parent left
                // it escapes the task.
                Err(err) => match self.frames.pop() {
                    None => {
                        self.finished = true;
                        return Err(err);
                    }
                    Some(parent) => {
                        self.current = parent;
                        feed = Feed::Error(err);
                    }
                },
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("depth", &self.frames.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::{from_fn, Coroutine};

    fn yielded(result: RunResult) -> Value {
        match result {
            RunResult::Yielded(emit) => emit.value,
            other => panic!("expected a yielded value, got {:?}", other),
        }
    }

    /// Child coroutine yielding V3, then returning R to its parent.
    fn child_returning(v3: i64, r: i64) -> BoxCoroutine {
        let mut n = 0;
        from_fn(move |_| {
            n += 1;
            match n {
                1 => Ok(Step::value(Value::Int(v3))),
                _ => Ok(Step::Return(Value::Int(r))),
            }
        })
    }

    #[test]
    fn first_run_produces_initial_value_without_sending() {
        let mut task = Task::new(
            TaskId::from_u64(1),
            from_fn(|input| {
                assert!(input.is_null());
                Ok(Step::value(Value::Int(1)))
            }),
        );
        assert_eq!(yielded(task.run().unwrap()), Value::Int(1));
    }

    #[test]
    fn delegation_flattens_and_splices_the_return_value() {
        // Parent: V1, V2, delegate(child: V3 then Return 40), then V4 = R + 2.
        let mut child = Some(child_returning(3, 40));
        let mut n = 0;
        let parent = from_fn(move |input| {
            n += 1;
            match n {
                1 => Ok(Step::value(Value::Int(1))),
                2 => Ok(Step::value(Value::Int(2))),
                3 => Ok(Step::Delegate(child.take().unwrap())),
                4 => {
                    // Receives exactly the child's return payload.
                    let r = input.as_int().unwrap();
                    assert_eq!(r, 40);
                    Ok(Step::value(Value::Int(r + 2)))
                }
                _ => Ok(Step::Done),
            }
        });

        let mut task = Task::new(TaskId::from_u64(1), parent);
        assert_eq!(yielded(task.run().unwrap()), Value::Int(1));
        task.send(Value::Null);
        assert_eq!(yielded(task.run().unwrap()), Value::Int(2));
        task.send(Value::Null);
        // The externally observed value comes from the child, one level down.
        assert_eq!(yielded(task.run().unwrap()), Value::Int(3));
        task.send(Value::Null);
        assert_eq!(yielded(task.run().unwrap()), Value::Int(42));
        task.send(Value::Null);
        assert!(matches!(task.run().unwrap(), RunResult::Finished));
        assert!(task.is_finished());
    }

    #[test]
    fn plain_exhaustion_resumes_parent_with_null() {
        let mut child = Some(from_fn(|_| Ok(Step::Done)));
        let mut n = 0;
        let parent = from_fn(move |input| {
            n += 1;
            match n {
                1 => Ok(Step::Delegate(child.take().unwrap())),
                2 => {
                    assert!(input.is_null());
                    Ok(Step::value(Value::Int(5)))
                }
                _ => Ok(Step::Done),
            }
        });

        let mut task = Task::new(TaskId::from_u64(1), parent);
        assert_eq!(yielded(task.run().unwrap()), Value::Int(5));
    }

    #[test]
    fn top_level_return_is_ordinary_completion() {
        let mut n = 0;
        let mut task = Task::new(
            TaskId::from_u64(1),
            from_fn(move |_| {
                n += 1;
                match n {
                    1 => Ok(Step::value(Value::Int(1))),
                    _ => Ok(Step::Return(Value::Int(99))),
                }
            }),
        );
        assert_eq!(yielded(task.run().unwrap()), Value::Int(1));
        task.send(Value::Null);
        // The payload is discarded, not delivered anywhere.
        assert!(matches!(task.run().unwrap(), RunResult::Finished));
        assert!(task.is_finished());
    }

    /// Level-1 coroutine that catches injected errors and yields a marker.
    struct CatchingRoot {
        inner: Option<BoxCoroutine>,
        n: u32,
    }

    impl Coroutine for CatchingRoot {
        fn resume(&mut self, _input: Value) -> Result<Step, TaskError> {
            self.n += 1;
            match self.n {
                1 => Ok(Step::Delegate(self.inner.take().unwrap())),
                _ => Ok(Step::Done),
            }
        }

        fn throw(&mut self, err: TaskError) -> Result<Step, TaskError> {
            Ok(Step::value(Value::Str(format!("caught: {}", err))))
        }
    }

    #[test]
    fn error_three_levels_deep_is_catchable_at_level_one() {
        // Level 3 fails immediately; level 2 does not catch.
        let level3 = from_fn(|_| Err(TaskError::other("deep failure")));
        let mut l3 = Some(level3);
        let level2 = from_fn(move |_| Ok(Step::Delegate(l3.take().unwrap())));

        let mut task = Task::new(
            TaskId::from_u64(1),
            Box::new(CatchingRoot {
                inner: Some(level2),
                n: 0,
            }),
        );

        let observed = yielded(task.run().unwrap());
        assert_eq!(observed, Value::Str("caught: deep failure".into()));
        assert!(!task.is_finished());
    }

    #[test]
    fn uncaught_error_escapes_the_task() {
        let mut l3 = Some(from_fn(|_| Err(TaskError::other("deep failure"))));
        let mut l2 = Some(from_fn(move |_| Ok(Step::Delegate(l3.take().unwrap()))));
        let level1 = from_fn(move |_| Ok(Step::Delegate(l2.take().unwrap())));

        let mut task = Task::new(TaskId::from_u64(1), level1);
        let err = task.run().unwrap_err();
        assert!(matches!(err, TaskError::Other(msg) if msg == "deep failure"));
        assert!(task.is_finished());
    }

    #[test]
    fn throw_takes_precedence_over_send_and_both_clear() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder {
            seen: Rc<RefCell<Vec<String>>>,
        }

        impl Coroutine for Recorder {
            fn resume(&mut self, input: Value) -> Result<Step, TaskError> {
                let mut seen = self.seen.borrow_mut();
                seen.push(format!("value: {:?}", input));
                if seen.len() >= 3 {
                    Ok(Step::Done)
                } else {
                    Ok(Step::value(Value::Null))
                }
            }

            fn throw(&mut self, err: TaskError) -> Result<Step, TaskError> {
                self.seen.borrow_mut().push(format!("error: {}", err));
                Ok(Step::value(Value::Null))
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut task = Task::new(
            TaskId::from_u64(1),
            Box::new(Recorder { seen: seen.clone() }),
        );

        task.run().unwrap();
        task.send(Value::Int(1));
        task.throw(TaskError::other("boom"));
        task.run().unwrap();
        // The send slot was cleared by throw: next resumption sees Null.
        task.run().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen[0], "value: Null");
        assert_eq!(seen[1], "error: boom");
        assert_eq!(seen[2], "value: Null");
    }

    #[test]
    fn run_after_finish_is_idempotent() {
        let mut task = Task::new(TaskId::from_u64(1), from_fn(|_| Ok(Step::Done)));
        assert!(matches!(task.run().unwrap(), RunResult::Finished));
        assert!(matches!(task.run().unwrap(), RunResult::Finished));
    }
}
