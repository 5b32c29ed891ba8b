//! Platform abstraction for the thread that owns the view tree.
//!
//! The coordinator never touches a platform event loop directly. It asks the
//! host whether the caller is on the UI thread and hands it closures to run
//! there later.

/// A unit of work posted to the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs work on the thread that owns the view tree.
///
/// Implementations must be safe to use from multiple threads.
pub trait UiScheduler: Send + Sync {
    /// Returns true when called from the UI thread. Must not have side effects.
    fn is_ui_thread(&self) -> bool;

    /// Queue `task` to run once, later, on the UI thread.
    ///
    /// Tasks posted from one thread run in the order they were posted. A task
    /// must never run synchronously inside this call, even when the caller is
    /// already on the UI thread.
    fn post_ui(&self, task: UiTask);
}
