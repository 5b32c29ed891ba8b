//! Layout update coordinator.
//!
//! Views report "my intrinsic size may have changed" and "my children must be
//! re-arranged" from any thread. The coordinator deduplicates those requests
//! and batches them into a single pass on the UI thread. A pass runs in two
//! phases:
//!
//! 1. **Sizing**, deepest views first. A parent's intrinsic size depends on
//!    its children, so children are resolved before their ancestors.
//! 2. **Layout**, shallowest views first. A child's bounds depend on the space
//!    its parent hands out, so parents are arranged before their children.
//!
//! Each phase keeps draining its own pending set until it stays empty, so a
//! recompute that requests more work of the same kind is handled in the same
//! phase. Sizing requests raised during the layout phase are not revisited by
//! the running pass; they schedule a fresh pass instead.
//!
//! A callback that keeps re-requesting itself makes the pass spin forever.
//! This is a caller bug. The coordinator only logs a warning once a phase
//! crosses [`CoordinatorConfig::storm_warning_iterations`].

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use smallvec::SmallVec;

use crate::collections::set::{new_set, HashSet};
use crate::platform::UiScheduler;
use crate::view::{depth_of, is_attached, ViewId, ViewTree};

const DEFAULT_STORM_WARNING_ITERATIONS: usize = 10_000;

/// Tunables for a [`LayoutCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Loop iterations after which a phase logs a re-request storm warning.
    pub storm_warning_iterations: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            storm_warning_iterations: DEFAULT_STORM_WARNING_ITERATIONS,
        }
    }
}

/// Where the coordinator currently is in its scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Nothing scheduled, no pass running.
    Idle,
    /// A pass has been posted to the UI thread and has not started yet.
    Scheduled,
    /// A pass is executing on the UI thread.
    Running,
}

/// Work done by a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub sizing_updates: usize,
    pub layout_updates: usize,
    pub sizing_iterations: usize,
    pub layout_iterations: usize,
    pub stale_skipped: usize,
}

/// Totals accumulated over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub passes: u64,
    pub sizing_updates: u64,
    pub layout_updates: u64,
    pub stale_skipped: u64,
}

impl CoordinatorStats {
    fn record(&mut self, pass: &PassStats) {
        self.passes += 1;
        self.sizing_updates += pass.sizing_updates as u64;
        self.layout_updates += pass.layout_updates as u64;
        self.stale_skipped += pass.stale_skipped as u64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Sizing,
    Layout,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Sizing => "sizing",
            Phase::Layout => "layout",
        }
    }
}

struct PendingState {
    sizing: HashSet<ViewId>,
    layout: HashSet<ViewId>,
    scheduled: bool,
    running: bool,
    stats: CoordinatorStats,
}

impl PendingState {
    fn new() -> Self {
        Self {
            sizing: new_set(),
            layout: new_set(),
            scheduled: false,
            running: false,
            stats: CoordinatorStats::default(),
        }
    }

    fn set_mut(&mut self, phase: Phase) -> &mut HashSet<ViewId> {
        match phase {
            Phase::Sizing => &mut self.sizing,
            Phase::Layout => &mut self.layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ToDo {
    pub(crate) view: ViewId,
    pub(crate) depth: usize,
}

/// Sorted work for one phase. The next item to process sits at the end of
/// `items` so popping is O(1).
pub(crate) struct WorkList {
    phase: Phase,
    items: Vec<ToDo>,
    queued: HashSet<ViewId>,
}

impl WorkList {
    pub(crate) fn new(phase: Phase) -> Self {
        Self {
            phase,
            items: Vec::new(),
            queued: new_set(),
        }
    }

    /// Resolves depths for `captured` under the structure lock and merges the
    /// live ones into the list. Views already waiting get their depth
    /// refreshed, since earlier callbacks may have moved them. Returns how
    /// many captured views no longer resolve.
    pub(crate) fn merge<T: ViewTree + ?Sized>(&mut self, tree: &T, captured: &[ViewId]) -> usize {
        let mut stale = 0;
        let items = &mut self.items;
        let queued = &mut self.queued;
        tree.read_structure(&mut |structure| {
            // Detached entries keep their old depth; the pop-time check drops them.
            for todo in items.iter_mut() {
                if let Some(depth) = depth_of(structure, todo.view) {
                    todo.depth = depth;
                }
            }
            for &view in captured {
                if queued.contains(&view) {
                    continue;
                }
                match depth_of(structure, view) {
                    Some(depth) => {
                        queued.insert(view);
                        items.push(ToDo { view, depth });
                    }
                    None => {
                        log::trace!("skipping {view}: no longer attached");
                        stale += 1;
                    }
                }
            }
        });
        self.sort();
        stale
    }

    fn sort(&mut self) {
        // Ties resolve to the smallest id first in both phases.
        match self.phase {
            Phase::Sizing => self.items.sort_unstable_by(|a, b| {
                a.depth.cmp(&b.depth).then_with(|| b.view.cmp(&a.view))
            }),
            Phase::Layout => self.items.sort_unstable_by(|a, b| {
                b.depth.cmp(&a.depth).then_with(|| b.view.cmp(&a.view))
            }),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<ToDo> {
        let todo = self.items.pop()?;
        self.queued.remove(&todo.view);
        Some(todo)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

/// Clears the running flag when a pass ends, including by unwinding out of a
/// recompute callback.
struct RunningGuard<'a> {
    pending: &'a Mutex<PendingState>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        debug_assert!(pending.running, "layout pass running flag cleared twice");
        pending.running = false;
    }
}

/// Collects layout requests from any thread and services them in ordered
/// passes on the UI thread.
///
/// Construct one per view tree and share the returned [`Arc`] with every
/// component that needs to raise requests.
pub struct LayoutCoordinator<T: ViewTree> {
    tree: Arc<T>,
    scheduler: Arc<dyn UiScheduler>,
    pending: Mutex<PendingState>,
    config: CoordinatorConfig,
    this: Weak<Self>,
}

impl<T: ViewTree> LayoutCoordinator<T> {
    pub fn new(tree: Arc<T>, scheduler: Arc<dyn UiScheduler>) -> Arc<Self> {
        Self::with_config(tree, scheduler, CoordinatorConfig::default())
    }

    pub fn with_config(
        tree: Arc<T>,
        scheduler: Arc<dyn UiScheduler>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            tree,
            scheduler,
            pending: Mutex::new(PendingState::new()),
            config,
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        // No callback runs with this lock held, so the state is consistent
        // even if another thread panicked while holding it.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `view` for a sizing info update. Call this when padding,
    /// content or anything else that feeds the view's preferred, minimum or
    /// maximum size changes.
    pub fn request_sizing_update(&self, view: ViewId) {
        self.request(Phase::Sizing, view);
    }

    /// Registers `view` for re-layout. Call this when a child's size or any of
    /// the parameters that position children (margins, alignment) change.
    pub fn request_layout_update(&self, view: ViewId) {
        self.request(Phase::Layout, view);
    }

    fn request(&self, phase: Phase, view: ViewId) {
        if self.lock().set_mut(phase).insert(view) {
            log::trace!("{} update requested for {view}", phase.label());
        }
        self.schedule_if_needed();
    }

    /// Posts one pass to the UI thread unless one is already waiting.
    ///
    /// The pass is always deferred, even when called on the UI thread, so a
    /// burst of requests within one unit of UI work collapses into one pass.
    pub fn schedule_if_needed(&self) {
        {
            let mut pending = self.lock();
            if pending.scheduled {
                return;
            }
            pending.scheduled = true;
        }

        log::trace!("posting layout pass to the UI thread");
        let this = self.this.clone();
        self.scheduler.post_ui(Box::new(move || match this.upgrade() {
            Some(coordinator) => coordinator.run_scheduled_pass(),
            None => log::trace!("layout coordinator dropped before its pass ran"),
        }));
    }

    /// Runs pending work immediately when called on the UI thread.
    ///
    /// Off the UI thread this does nothing: any pending work already has a
    /// pass scheduled. Inside a running pass it also does nothing, since the
    /// running pass drains the sets itself.
    pub fn update_now(&self) {
        if !self.scheduler.is_ui_thread() {
            log::debug!("update_now called off the UI thread; leaving work to the scheduled pass");
            return;
        }
        self.run_pass();
    }

    fn run_scheduled_pass(&self) {
        self.lock().scheduled = false;
        self.run_pass();
    }

    fn run_pass(&self) {
        assert!(
            self.scheduler.is_ui_thread(),
            "layout pass run off the UI thread"
        );

        {
            let mut pending = self.lock();
            if pending.running {
                log::debug!("layout pass already running; ignoring nested request");
                return;
            }
            pending.running = true;
        }
        let running = RunningGuard {
            pending: &self.pending,
        };

        let mut stats = PassStats::default();
        self.drain_phase(Phase::Sizing, &mut stats);
        self.drain_phase(Phase::Layout, &mut stats);

        log::debug!(
            "layout pass done: {} sizing, {} layout, {} stale",
            stats.sizing_updates,
            stats.layout_updates,
            stats.stale_skipped
        );
        self.lock().stats.record(&stats);
        drop(running);

        // A scheduled pass that fired while this one was running returned
        // without doing anything, so leftover work needs its own pass.
        if self.has_pending_updates() {
            self.schedule_if_needed();
        }
    }

    fn drain_phase(&self, phase: Phase, stats: &mut PassStats) {
        let mut work = WorkList::new(phase);
        let mut iterations = 0usize;
        let mut warned = false;

        loop {
            iterations += 1;
            if !warned && iterations > self.config.storm_warning_iterations {
                warned = true;
                log::warn!(
                    "{} phase passed {} iterations; views keep re-requesting updates",
                    phase.label(),
                    self.config.storm_warning_iterations
                );
            }

            let captured = self.take_pending(phase);
            if !captured.is_empty() {
                stats.stale_skipped += work.merge(&*self.tree, &captured);
            }

            let Some(todo) = work.pop() else {
                break;
            };

            // An earlier callback in this phase may have torn the view down.
            if !is_attached(&*self.tree, todo.view) {
                log::trace!("skipping {}: detached during pass", todo.view);
                stats.stale_skipped += 1;
                continue;
            }

            match phase {
                Phase::Sizing => {
                    self.tree.update_sizing_info(todo.view);
                    stats.sizing_updates += 1;
                }
                Phase::Layout => {
                    self.tree.layout(todo.view);
                    stats.layout_updates += 1;
                }
            }
        }

        match phase {
            Phase::Sizing => stats.sizing_iterations = iterations,
            Phase::Layout => stats.layout_iterations = iterations,
        }
    }

    fn take_pending(&self, phase: Phase) -> SmallVec<[ViewId; 16]> {
        let mut pending = self.lock();
        let taken = mem::take(pending.set_mut(phase));
        drop(pending);
        taken.into_iter().collect()
    }

    /// Whether any sizing or layout request is waiting for a pass.
    pub fn has_pending_updates(&self) -> bool {
        let pending = self.lock();
        !pending.sizing.is_empty() || !pending.layout.is_empty()
    }

    /// Current position in the schedule/run cycle.
    pub fn state(&self) -> CoordinatorState {
        let pending = self.lock();
        if pending.running {
            CoordinatorState::Running
        } else if pending.scheduled {
            CoordinatorState::Scheduled
        } else {
            CoordinatorState::Idle
        }
    }

    /// Totals over every pass run so far.
    pub fn stats(&self) -> CoordinatorStats {
        self.lock().stats
    }

    /// The tunables this coordinator was built with.
    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// The tree this coordinator drives.
    pub fn tree(&self) -> &Arc<T> {
        &self.tree
    }
}

impl<T: ViewTree> fmt::Debug for LayoutCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.lock();
        f.debug_struct("LayoutCoordinator")
            .field("pending_sizing", &pending.sizing.len())
            .field("pending_layout", &pending.layout.len())
            .field("scheduled", &pending.scheduled)
            .field("running", &pending.running)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
