// ═══════════════════════════════════════════════════════════
// Timers — delays, deadlines and the timeout guard
// ═══════════════════════════════════════════════════════════

use std::time::Duration;

use crate::combinator::race;
use crate::error::LookupError;
use crate::scheduler::{Scheduler, TimerId};
use crate::task::Task;

/// Fulfils with `()` once `duration` has passed.
pub fn delay(scheduler: &Scheduler, duration: Duration) -> Task<()> {
    Task::new(scheduler, |settler| {
        scheduler.schedule_timer(duration, move || {
            settler.succeed(());
        });
    })
}

/// Fails with `LookupError::Timeout` once `duration` has passed.
pub fn deadline<T: 'static>(scheduler: &Scheduler, duration: Duration) -> Task<T> {
    deadline_timer(scheduler, duration).0
}

fn deadline_timer<T: 'static>(scheduler: &Scheduler, duration: Duration) -> (Task<T>, TimerId) {
    let (task, settler) = Task::deferred(scheduler);
    let timer = scheduler.schedule_timer(duration, move || {
        settler.fail(LookupError::Timeout(duration));
    });
    (task, timer)
}

/// Races `task` against a deadline.
///
/// Nothing is cancelled when the deadline wins: `task` keeps running and its
/// eventual outcome is simply not observed through the returned task. When
/// `task` settles first the deadline timer is cancelled, so it does not hold
/// `Scheduler::run` open.
pub fn with_timeout<T: Clone + 'static>(task: &Task<T>, duration: Duration) -> Task<T> {
    let scheduler = task.scheduler();
    let (guard, timer) = deadline_timer(&scheduler, duration);

    let timers = scheduler.clone();
    task.on_settled(move |_| {
        timers.cancel_timer(timer);
    });
    race(&scheduler, [task.clone(), guard])
}
