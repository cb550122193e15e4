// ═══════════════════════════════════════════════════════════
// Scheduler — cooperative single-thread event loop
// ═══════════════════════════════════════════════════════════
//
// QUICK REFERENCE
// ───────────────────────────────────────────────────────────
//
//  QUEUES (highest priority first)
//  microtasks      Task continuations. Drained completely before
//                  anything else runs, including microtasks queued
//                  by other microtasks.
//  timers          Callbacks ordered by deadline, FIFO on ties.
//  completions     Results of blocking work finished on a worker
//                  thread, delivered back onto this thread.
//
//  ENTRY POINTS
//  enqueue_microtask(job)
//  schedule_timer(delay, job) -> TimerId
//  cancel_timer(id)
//      A cancelled timer never fires and no longer keeps run()
//      going. A delay past the end of the clock never fires.
//  spawn_blocking(work, deliver)
//      `work` runs on a worker thread, `deliver` runs here with
//      its result, or with `WorkerPanic` if `work` panicked.
//  run()
//      Drives all queues until nothing is left to do.
//
// ═══════════════════════════════════════════════════════════

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce()>;
type Payload = Box<dyn Any + Send>;
type Completion = Result<Payload, WorkerPanic>;
type Delivery = Box<dyn FnOnce(Completion)>;

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Blocking work panicked instead of producing a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("worker thread panicked: {0}")]
pub struct WorkerPanic(pub String);

/// Handle to a single-threaded event loop. Cloning shares the same queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

struct Inner {
    microtasks: RefCell<VecDeque<Job>>,
    timers: RefCell<BTreeMap<(Instant, u64), Job>>,
    deadlines: RefCell<HashMap<u64, Instant>>,
    in_flight: RefCell<HashMap<u64, Delivery>>,
    completions_tx: Sender<(u64, Completion)>,
    completions_rx: Receiver<(u64, Completion)>,
    next_seq: Cell<u64>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Scheduler {
            inner: Rc::new(Inner {
                microtasks: RefCell::new(VecDeque::new()),
                timers: RefCell::new(BTreeMap::new()),
                deadlines: RefCell::new(HashMap::new()),
                in_flight: RefCell::new(HashMap::new()),
                completions_tx,
                completions_rx,
                next_seq: Cell::new(1),
            }),
        }
    }

    fn next_seq(&self) -> u64 {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        seq
    }

    pub fn enqueue_microtask<F>(&self, job: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.microtasks.borrow_mut().push_back(Box::new(job));
    }

    pub fn schedule_timer<F>(&self, delay: Duration, job: F) -> TimerId
    where
        F: FnOnce() + 'static,
    {
        let seq = self.next_seq();
        match Instant::now().checked_add(delay) {
            Some(deadline) => {
                self.inner.timers.borrow_mut().insert((deadline, seq), Box::new(job));
                self.inner.deadlines.borrow_mut().insert(seq, deadline);
            }
            None => tracing::debug!(?delay, "timer delay is past the end of the clock, it will never fire"),
        }
        TimerId(seq)
    }

    /// Removes a timer that has not fired yet. Returns whether it was pending.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        let deadline = self.inner.deadlines.borrow_mut().remove(&id.0);
        let Some(at) = deadline else { return false };
        let removed = self.inner.timers.borrow_mut().remove(&(at, id.0));
        removed.is_some()
    }

    /// Runs `work` on a fresh worker thread and hands its result to `deliver`
    /// on the scheduler thread, as a completion callback of `run()`.
    pub fn spawn_blocking<R, W, D>(&self, work: W, deliver: D) -> io::Result<()>
    where
        R: Send + 'static,
        W: FnOnce() -> R + Send + 'static,
        D: FnOnce(Result<R, WorkerPanic>) + 'static,
    {
        let id = self.next_seq();
        let tx = self.inner.completions_tx.clone();
        thread::Builder::new()
            .name(format!("whereami-io-{}", id))
            .spawn(move || {
                let completion = panic::catch_unwind(AssertUnwindSafe(work))
                    .map(|result| Box::new(result) as Payload)
                    .map_err(|cause| WorkerPanic(panic_message(cause.as_ref())));
                // The scheduler may be gone already; nobody is waiting then.
                let _ = tx.send((id, completion));
            })?;

        let delivery: Delivery = Box::new(move |completion: Completion| match completion {
            Ok(payload) => match payload.downcast::<R>() {
                Ok(result) => deliver(Ok(*result)),
                Err(_) => tracing::error!(id, "blocking completion had an unexpected type"),
            },
            Err(panicked) => {
                tracing::error!(id, error = %panicked, "blocking work panicked");
                deliver(Err(panicked));
            }
        });
        self.inner.in_flight.borrow_mut().insert(id, delivery);
        Ok(())
    }

    /// True while any queue still holds work or a worker has not reported back.
    pub fn has_work(&self) -> bool {
        !self.inner.microtasks.borrow().is_empty()
            || !self.inner.timers.borrow().is_empty()
            || !self.inner.in_flight.borrow().is_empty()
    }

    /// Drives the loop until every queue is empty and no blocking work is
    /// outstanding.
    pub fn run(&self) {
        loop {
            self.drain_microtasks();

            if let Some(job) = self.pop_due_timer() {
                job();
                continue;
            }

            if let Ok((id, completion)) = self.inner.completions_rx.try_recv() {
                self.deliver(id, completion);
                continue;
            }

            let next_deadline = self.inner.timers.borrow().keys().next().map(|(at, _)| *at);
            let waiting_on_io = !self.inner.in_flight.borrow().is_empty();

            // The loop holds a sender itself, so the channel never disconnects
            // and every worker reports back exactly once.
            match (next_deadline, waiting_on_io) {
                (None, false) => break,
                (Some(at), false) => thread::sleep(at.saturating_duration_since(Instant::now())),
                (None, true) => {
                    if let Ok((id, completion)) = self.inner.completions_rx.recv() {
                        self.deliver(id, completion);
                    }
                }
                (Some(at), true) => {
                    let wait = at.saturating_duration_since(Instant::now());
                    match self.inner.completions_rx.recv_timeout(wait) {
                        Ok((id, completion)) => self.deliver(id, completion),
                        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
                    }
                }
            }
        }
    }

    fn drain_microtasks(&self) {
        loop {
            let next = self.inner.microtasks.borrow_mut().pop_front();
            match next {
                Some(job) => job(),
                None => break,
            }
        }
    }

    fn pop_due_timer(&self) -> Option<Job> {
        let mut timers = self.inner.timers.borrow_mut();
        let due = matches!(timers.keys().next(), Some((at, _)) if *at <= Instant::now());
        if !due {
            return None;
        }
        let ((_, seq), job) = timers.pop_first()?;
        self.inner.deadlines.borrow_mut().remove(&seq);
        Some(job)
    }

    fn deliver(&self, id: u64, completion: Completion) {
        let delivery = self.inner.in_flight.borrow_mut().remove(&id);
        match delivery {
            Some(deliver) => deliver(completion),
            None => tracing::warn!(id, "completion arrived for unknown work"),
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
