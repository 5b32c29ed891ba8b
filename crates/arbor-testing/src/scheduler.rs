//! Deterministic UI scheduler for tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use arbor_core::{UiScheduler, UiTask};

/// Queues posted tasks until the test runs them explicitly.
///
/// The thread that constructs the scheduler is treated as the UI thread.
pub struct ManualScheduler {
    ui_thread: ThreadId,
    queue: Mutex<VecDeque<UiTask>>,
    posted: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ui_thread: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
            posted: AtomicUsize::new(0),
        })
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<UiTask>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs queued tasks in FIFO order, including tasks they post, until the
    /// queue is empty. Returns how many tasks ran.
    pub fn run_queued(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Runs only the oldest queued task.
    pub fn run_one(&self) -> bool {
        let task = self.queue().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Tasks waiting to run.
    pub fn queued(&self) -> usize {
        self.queue().len()
    }

    /// Tasks posted since construction.
    pub fn posted(&self) -> usize {
        self.posted.load(Ordering::SeqCst)
    }
}

impl UiScheduler for ManualScheduler {
    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread
    }

    fn post_ui(&self, task: UiTask) {
        self.posted.fetch_add(1, Ordering::SeqCst);
        self.queue().push_back(task);
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("queued", &self.queued())
            .field("posted", &self.posted())
            .finish()
    }
}
