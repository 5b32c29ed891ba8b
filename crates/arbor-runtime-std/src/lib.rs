//! Standard runtime services backed by Rust's `std` library.
//!
//! [`StdUiScheduler`] implements [`arbor_core::UiScheduler`] with an `mpsc`
//! queue bound to the thread that created it. Hosts either register a wake
//! callback and call [`StdUiScheduler::drain`] from their event loop, or block
//! in [`StdUiScheduler::wait_and_drain`]. [`LayoutRuntime`] bundles one
//! scheduler with one [`LayoutCoordinator`] for an application.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use arbor_core::{CoordinatorConfig, LayoutCoordinator, UiScheduler, UiTask, ViewTree};

type WakeCallback = Arc<dyn Fn() + Send + Sync + 'static>;

struct PendingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        Self { counter }
    }
}

impl<'a> Drop for PendingGuard<'a> {
    fn drop(&mut self) {
        let previous = self.counter.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "UI scheduler pending count underflowed");
    }
}

/// UI scheduler that queues tasks over an `mpsc` channel.
pub struct StdUiScheduler {
    ui_thread_id: ThreadId,
    tx: mpsc::Sender<UiTask>,
    rx: Mutex<mpsc::Receiver<UiTask>>,
    pending: AtomicUsize,
    wake: RwLock<Option<WakeCallback>>,
}

impl StdUiScheduler {
    /// Creates a scheduler whose UI thread is the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            ui_thread_id: thread::current().id(),
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
            wake: RwLock::new(None),
        }
    }

    /// Registers a callback invoked from the posting thread after each post.
    pub fn set_wake_callback(&self, wake: impl Fn() + Send + Sync + 'static) {
        *self
            .wake
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(wake));
    }

    /// Clears any registered wake callback.
    pub fn clear_wake_callback(&self) {
        *self
            .wake
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    fn wake(&self) {
        let wake = self
            .wake
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(wake) = wake {
            wake();
        }
    }

    fn receiver(&self) -> MutexGuard<'_, mpsc::Receiver<UiTask>> {
        self.rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns whether tasks have been posted but not run yet.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Runs queued tasks on the UI thread until the queue is empty, including
    /// tasks posted by the tasks themselves. Returns how many ran.
    pub fn drain(&self) -> usize {
        self.assert_ui_thread();
        let mut ran = 0;
        loop {
            let next = self.receiver().try_recv().ok();
            let Some(task) = next else {
                return ran;
            };
            self.run(task);
            ran += 1;
        }
    }

    /// Blocks up to `timeout` for the first task, then drains the queue.
    pub fn wait_and_drain(&self, timeout: Duration) -> usize {
        self.assert_ui_thread();
        let first = self.receiver().recv_timeout(timeout).ok();
        match first {
            Some(task) => {
                self.run(task);
                1 + self.drain()
            }
            None => 0,
        }
    }

    fn run(&self, task: UiTask) {
        let _guard = PendingGuard::new(&self.pending);
        task();
    }

    fn assert_ui_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.ui_thread_id,
            "UI tasks drained off the scheduler's UI thread"
        );
    }
}

impl Default for StdUiScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdUiScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdUiScheduler")
            .field("ui_thread_id", &self.ui_thread_id)
            .field("pending", &self.pending.load(Ordering::SeqCst))
            .finish()
    }
}

impl UiScheduler for StdUiScheduler {
    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread_id
    }

    fn post_ui(&self, task: UiTask) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::warn!("UI task dropped: scheduler queue closed");
            return;
        }
        self.wake();
    }
}

/// Convenience container bundling a standard scheduler with the coordinator
/// for one view tree.
pub struct LayoutRuntime<T: ViewTree> {
    scheduler: Arc<StdUiScheduler>,
    coordinator: Arc<LayoutCoordinator<T>>,
}

impl<T: ViewTree> LayoutRuntime<T> {
    /// Creates a runtime whose UI thread is the calling thread.
    pub fn new(tree: Arc<T>) -> Self {
        Self::with_config(tree, CoordinatorConfig::default())
    }

    pub fn with_config(tree: Arc<T>, config: CoordinatorConfig) -> Self {
        let scheduler = Arc::new(StdUiScheduler::new());
        let coordinator = LayoutCoordinator::with_config(tree, scheduler.clone(), config);
        Self {
            scheduler,
            coordinator,
        }
    }

    /// Returns the coordinator. Hand clones of it to anything that raises
    /// layout requests.
    pub fn coordinator(&self) -> Arc<LayoutCoordinator<T>> {
        Arc::clone(&self.coordinator)
    }

    pub fn scheduler(&self) -> Arc<StdUiScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn tree(&self) -> &Arc<T> {
        self.coordinator.tree()
    }

    /// Runs every queued UI task, including scheduled layout passes, until
    /// nothing is left. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        self.scheduler.drain()
    }

    pub fn has_pending(&self) -> bool {
        self.scheduler.has_pending() || self.coordinator.has_pending_updates()
    }

    pub fn set_wake_callback(&self, wake: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_wake_callback(wake);
    }

    pub fn clear_wake_callback(&self) {
        self.scheduler.clear_wake_callback();
    }
}

impl<T: ViewTree> fmt::Debug for LayoutRuntime<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutRuntime")
            .field("scheduler", &self.scheduler)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
