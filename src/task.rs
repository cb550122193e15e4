// ═══════════════════════════════════════════════════════════
// Task — one-shot async value settled on the scheduler thread
// ═══════════════════════════════════════════════════════════
//
// QUICK REFERENCE
// ───────────────────────────────────────────────────────────
//
//  CREATING TASKS
//  Task::new(&sched, |settler| ...)     executor runs immediately
//  Task::deferred(&sched)               (Task, Settler) pair
//  Task::succeeded / failed / from_result
//
//  SETTLING
//  settler.succeed(v) / fail(e) / settle(outcome)
//      First call wins; later calls are ignored and return false.
//
//  CONTINUATIONS
//  task.register(on_success, on_failure)
//  task.on_settled(|outcome| ...)
//      Always queued as microtasks, never run inside the call.
//
//  CHAINING
//  map, try_map, and_then, or_else, map_err,
//  inspect, inspect_err, finally
//
// ═══════════════════════════════════════════════════════════

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::error::{LookupError, Outcome};
use crate::scheduler::Scheduler;

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>)>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Rc<Outcome<T>>),
}

struct Shared<T> {
    state: RefCell<State<T>>,
    scheduler: Scheduler,
}

/// A value that becomes available later, exactly once.
pub struct Task<T> {
    shared: Rc<Shared<T>>,
}

/// The write side of a task. Clones settle the same task.
pub struct Settler<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task { shared: Rc::clone(&self.shared) }
    }
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Settler { shared: Rc::clone(&self.shared) }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.borrow() {
            State::Pending(_) => "pending",
            State::Settled(outcome) if outcome.is_ok() => "fulfilled",
            State::Settled(_) => "rejected",
        };
        f.debug_struct("Task").field("state", &state).finish()
    }
}

// ── Settling ──────────────────────────────────────────────────────────────────

impl<T: 'static> Settler<T> {
    pub fn succeed(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn fail(&self, error: LookupError) -> bool {
        self.settle(Err(error))
    }

    /// Moves the task out of `Pending` and queues every stored continuation,
    /// in registration order. Returns false if the task had already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        let outcome = Rc::new(outcome);
        let waiting = {
            let mut state = self.shared.state.borrow_mut();
            let waiting = match &mut *state {
                State::Settled(_) => return false,
                State::Pending(waiting) => mem::take(waiting),
            };
            *state = State::Settled(Rc::clone(&outcome));
            waiting
        };

        for continuation in waiting {
            let outcome = Rc::clone(&outcome);
            self.shared
                .scheduler
                .enqueue_microtask(move || continuation(&outcome));
        }
        true
    }
}

// ── Construction and continuations ────────────────────────────────────────────

impl<T: 'static> Task<T> {
    fn pending(scheduler: &Scheduler) -> Self {
        Task {
            shared: Rc::new(Shared {
                state: RefCell::new(State::Pending(Vec::new())),
                scheduler: scheduler.clone(),
            }),
        }
    }

    /// Creates a task and runs `executor` right away with its settler.
    pub fn new<F>(scheduler: &Scheduler, executor: F) -> Self
    where
        F: FnOnce(Settler<T>),
    {
        let task = Self::pending(scheduler);
        executor(task.settler());
        task
    }

    pub fn deferred(scheduler: &Scheduler) -> (Self, Settler<T>) {
        let task = Self::pending(scheduler);
        let settler = task.settler();
        (task, settler)
    }

    pub fn succeeded(scheduler: &Scheduler, value: T) -> Self {
        Self::from_result(scheduler, Ok(value))
    }

    pub fn failed(scheduler: &Scheduler, error: LookupError) -> Self {
        Self::from_result(scheduler, Err(error))
    }

    pub fn from_result(scheduler: &Scheduler, outcome: Outcome<T>) -> Self {
        Task {
            shared: Rc::new(Shared {
                state: RefCell::new(State::Settled(Rc::new(outcome))),
                scheduler: scheduler.clone(),
            }),
        }
    }

    fn settler(&self) -> Settler<T> {
        Settler { shared: Rc::clone(&self.shared) }
    }

    pub fn scheduler(&self) -> Scheduler {
        self.shared.scheduler.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.shared.state.borrow(), State::Pending(_))
    }

    /// Attaches a continuation that sees the settled outcome.
    pub fn on_settled<F>(&self, continuation: F)
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        let settled = {
            let mut state = self.shared.state.borrow_mut();
            match &mut *state {
                State::Pending(waiting) => {
                    waiting.push(Box::new(continuation));
                    return;
                }
                State::Settled(outcome) => Rc::clone(outcome),
            }
        };
        self.shared
            .scheduler
            .enqueue_microtask(move || continuation(&settled));
    }

    pub fn register<S, F>(&self, on_success: S, on_failure: F)
    where
        S: FnOnce(&T) + 'static,
        F: FnOnce(&LookupError) + 'static,
    {
        self.on_settled(move |outcome| match outcome {
            Ok(value) => on_success(value),
            Err(error) => on_failure(error),
        });
    }
}

// ── Chaining ──────────────────────────────────────────────────────────────────

impl<T: Clone + 'static> Task<T> {
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.shared.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some((**outcome).clone()),
        }
    }

    /// Settles `settler` with whatever this task settles with.
    pub fn forward(&self, settler: Settler<T>) {
        self.on_settled(move |outcome| {
            settler.settle(outcome.clone());
        });
    }

    pub fn map<U, F>(&self, f: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like `map`, but the step itself may fail with a classified error.
    pub fn try_map<U, F>(&self, f: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> Outcome<U> + 'static,
    {
        let source = self.clone();
        Task::new(&self.shared.scheduler, move |settler| {
            source.on_settled(move |outcome| {
                settler.settle(outcome.clone().and_then(f));
            });
        })
    }

    /// Dependent chaining: the next task is only built once this one
    /// succeeds. A failure skips `f` entirely.
    pub fn and_then<U, F>(&self, f: F) -> Task<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Task<U> + 'static,
    {
        let source = self.clone();
        Task::new(&self.shared.scheduler, move |settler| {
            source.on_settled(move |outcome| match outcome {
                Ok(value) => f(value.clone()).forward(settler),
                Err(error) => {
                    settler.fail(error.clone());
                }
            });
        })
    }

    /// Recovers from a failure with another task. Successes pass through.
    pub fn or_else<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(LookupError) -> Task<T> + 'static,
    {
        let source = self.clone();
        Task::new(&self.shared.scheduler, move |settler| {
            source.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    settler.succeed(value.clone());
                }
                Err(error) => f(error.clone()).forward(settler),
            });
        })
    }

    pub fn map_err<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(LookupError) -> LookupError + 'static,
    {
        let source = self.clone();
        Task::new(&self.shared.scheduler, move |settler| {
            source.on_settled(move |outcome| {
                settler.settle(outcome.clone().map_err(f));
            });
        })
    }

    pub fn inspect<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(&T) + 'static,
    {
        self.passthrough(move |outcome| {
            if let Ok(value) = outcome {
                f(value);
            }
        })
    }

    pub fn inspect_err<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(&LookupError) + 'static,
    {
        self.passthrough(move |outcome| {
            if let Err(error) = outcome {
                f(error);
            }
        })
    }

    /// Runs `f` once the task settles either way; the outcome is unchanged.
    pub fn finally<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce() + 'static,
    {
        self.passthrough(move |_| f())
    }

    fn passthrough<F>(&self, f: F) -> Task<T>
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        let source = self.clone();
        Task::new(&self.shared.scheduler, move |settler| {
            source.on_settled(move |outcome| {
                f(outcome);
                settler.settle(outcome.clone());
            });
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
