#![forbid(unsafe_code)]

//! Single-threaded cooperative executor.
//!
//! Cells are `!Send`, so update futures run on a [`LocalPool`] owned by the
//! thread that owns the cells. Nothing runs until the pool is driven:
//! [`Executor::run_until_stalled`] polls every task until each is waiting on
//! something external (typically a simulated backend), which makes the
//! interleaving of completions fully scripted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{LocalSpawnExt, SpawnError};
use tracing::trace;

/// Handle to the result of a spawned future.
pub struct Task<R> {
    slot: Rc<RefCell<Option<R>>>,
    finished: Rc<Cell<bool>>,
}

impl<R> Task<R> {
    /// Whether the future has run to completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Take the output. `None` while the task is still running, or if the
    /// output was already taken.
    pub fn take(&self) -> Option<R> {
        self.slot.borrow_mut().take()
    }
}

impl<R> fmt::Debug for Task<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("finished", &self.finished.get())
            .finish()
    }
}

/// A local task pool plus its spawner.
pub struct Executor {
    pool: LocalPool,
    spawner: LocalSpawner,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

impl Executor {
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self { pool, spawner }
    }

    /// Queue `future` on the pool. It first runs on the next
    /// [`run_until_stalled`](Self::run_until_stalled) or
    /// [`block_on`](Self::block_on).
    pub fn spawn<F, R>(&self, future: F) -> Result<Task<R>, SpawnError>
    where
        F: Future<Output = R> + 'static,
        R: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let finished = Rc::new(Cell::new(false));
        let out = Rc::clone(&slot);
        let done = Rc::clone(&finished);
        self.spawner.spawn_local(async move {
            let output = future.await;
            *out.borrow_mut() = Some(output);
            done.set(true);
        })?;
        trace!("executor.spawn");
        Ok(Task { slot, finished })
    }

    /// A spawner that can queue more tasks from inside running ones.
    #[must_use]
    pub fn spawner(&self) -> LocalSpawner {
        self.spawner.clone()
    }

    /// Poll every task until none can make progress.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Run all tasks to completion.
    pub fn run(&mut self) {
        self.pool.run();
    }

    /// Drive `future` (and any spawned tasks) until `future` completes.
    pub fn block_on<F: Future>(&mut self, future: F) -> F::Output {
        self.pool.run_until(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    #[test]
    fn spawned_task_runs_on_drive() {
        let mut executor = Executor::new();
        let task = executor.spawn(async { 7 }).expect("pool accepts tasks");
        assert!(!task.is_finished());
        executor.run_until_stalled();
        assert!(task.is_finished());
        assert_eq!(task.take(), Some(7));
        assert_eq!(task.take(), None);
        assert!(task.is_finished());
    }

    #[test]
    fn stalled_task_waits_for_signal() {
        let mut executor = Executor::new();
        let (tx, rx) = oneshot::channel::<u32>();
        let task = executor
            .spawn(async move { rx.await.unwrap_or(0) + 1 })
            .expect("pool accepts tasks");

        executor.run_until_stalled();
        assert!(!task.is_finished());

        tx.send(41).expect("receiver alive");
        executor.run_until_stalled();
        assert_eq!(task.take(), Some(42));
    }

    #[test]
    fn block_on_drives_spawned_tasks() {
        let mut executor = Executor::new();
        let (tx, rx) = oneshot::channel::<&str>();
        let _sender = executor
            .spawn(async move {
                let _ = tx.send("done");
            })
            .expect("pool accepts tasks");
        let received = executor.block_on(rx);
        assert_eq!(received, Ok("done"));
    }
}
