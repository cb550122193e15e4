// ═══════════════════════════════════════════════════════════
// Combinators — one task out of many independent ones
// ═══════════════════════════════════════════════════════════
//
//  all(tasks)          every value in input order, or the first error
//                      to arrive (by settlement time)
//  race(tasks)         whichever input settles first, either way
//  any(tasks)          first success, or AllFailed with every error
//  all_settled(tasks)  every outcome in input order; never fails
//
// None of these cancel anything. Inputs that lose keep running and
// their later settlements land on an already-settled task.
// ═══════════════════════════════════════════════════════════

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{LookupError, Outcome};
use crate::scheduler::Scheduler;
use crate::task::Task;

/// Per-input result slots plus the number of inputs still outstanding.
struct Slots<S> {
    values: RefCell<Vec<Option<S>>>,
    remaining: Cell<usize>,
}

impl<S> Slots<S> {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Slots {
            values: RefCell::new((0..len).map(|_| None).collect()),
            remaining: Cell::new(len),
        })
    }

    /// Stores one result; returns every slot once the last one has arrived.
    fn fill(&self, index: usize, value: S) -> Option<Vec<S>> {
        self.values.borrow_mut()[index] = Some(value);
        self.remaining.set(self.remaining.get() - 1);
        if self.remaining.get() > 0 {
            return None;
        }
        Some(self.values.borrow_mut().drain(..).flatten().collect())
    }
}

pub fn all<T, I>(scheduler: &Scheduler, tasks: I) -> Task<Vec<T>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    let tasks: Vec<Task<T>> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Task::succeeded(scheduler, Vec::new());
    }

    Task::new(scheduler, move |settler| {
        let slots = Slots::new(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let slots = Rc::clone(&slots);
            let settler = settler.clone();
            task.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    if let Some(values) = slots.fill(index, value.clone()) {
                        settler.succeed(values);
                    }
                }
                Err(error) => {
                    if settler.fail(error.clone()) {
                        tracing::debug!(index, %error, "all: input failed, abandoning the rest");
                    }
                }
            });
        }
    })
}

/// An empty input never settles.
pub fn race<T, I>(scheduler: &Scheduler, tasks: I) -> Task<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    let tasks: Vec<Task<T>> = tasks.into_iter().collect();
    Task::new(scheduler, move |settler| {
        for task in &tasks {
            task.forward(settler.clone());
        }
    })
}

pub fn any<T, I>(scheduler: &Scheduler, tasks: I) -> Task<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    let tasks: Vec<Task<T>> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Task::failed(scheduler, LookupError::AllFailed(Vec::new()));
    }

    Task::new(scheduler, move |settler| {
        let errors = Slots::new(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let errors = Rc::clone(&errors);
            let settler = settler.clone();
            task.on_settled(move |outcome| match outcome {
                Ok(value) => {
                    settler.succeed(value.clone());
                }
                Err(error) => {
                    if let Some(all) = errors.fill(index, error.clone()) {
                        settler.fail(LookupError::AllFailed(all));
                    }
                }
            });
        }
    })
}

pub fn all_settled<T, I>(scheduler: &Scheduler, tasks: I) -> Task<Vec<Outcome<T>>>
where
    T: Clone + 'static,
    I: IntoIterator<Item = Task<T>>,
{
    let tasks: Vec<Task<T>> = tasks.into_iter().collect();
    if tasks.is_empty() {
        return Task::succeeded(scheduler, Vec::new());
    }

    Task::new(scheduler, move |settler| {
        let slots = Slots::new(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let slots = Rc::clone(&slots);
            let settler = settler.clone();
            task.on_settled(move |outcome| {
                if let Some(outcomes) = slots.fill(index, outcome.clone()) {
                    settler.succeed(outcomes);
                }
            });
        }
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
