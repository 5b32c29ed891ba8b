//! Arena-backed view tree for tests and demos.
//!
//! [`ViewArena`] implements [`ViewTree`] with a real structure lock, records
//! every recompute callback it receives and lets tests hook into those
//! callbacks to raise new requests or mutate the tree mid-pass.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use arbor_core::{depth_of, TreeStructure, ViewId, ViewTree};

/// A recompute callback observed by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutCall {
    Sizing(ViewId),
    Layout(ViewId),
}

impl LayoutCall {
    pub fn view(self) -> ViewId {
        match self {
            LayoutCall::Sizing(view) | LayoutCall::Layout(view) => view,
        }
    }

    pub fn is_sizing(self) -> bool {
        matches!(self, LayoutCall::Sizing(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    UnknownView(ViewId),
    WouldCycle { view: ViewId, parent: ViewId },
    RootCannotMove,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::UnknownView(view) => write!(f, "view {view} is not in the arena"),
            TreeError::WouldCycle { view, parent } => {
                write!(f, "attaching {view} under {parent} would create a cycle")
            }
            TreeError::RootCannotMove => write!(f, "the root view cannot be detached or removed"),
        }
    }
}

impl std::error::Error for TreeError {}

/// Callback run inside a recompute. Receives the view being recomputed.
pub type LayoutHook = Arc<dyn Fn(ViewId) + Send + Sync>;

#[derive(Debug, Default)]
struct Node {
    parent: Option<ViewId>,
    children: Vec<ViewId>,
}

struct ArenaStructure {
    nodes: HashMap<ViewId, Node>,
    root: ViewId,
    next_id: u64,
}

impl ArenaStructure {
    fn node(&self, view: ViewId) -> Result<&Node, TreeError> {
        self.nodes.get(&view).ok_or(TreeError::UnknownView(view))
    }

    fn unlink(&mut self, view: ViewId) {
        let parent = self.nodes.get_mut(&view).and_then(|node| node.parent.take());
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != view);
            }
        }
    }

    fn is_in_subtree(&self, candidate: ViewId, subtree_root: ViewId) -> bool {
        let mut current = Some(candidate);
        while let Some(view) = current {
            if view == subtree_root {
                return true;
            }
            current = self.nodes.get(&view).and_then(|node| node.parent);
        }
        false
    }
}

impl TreeStructure for ArenaStructure {
    fn parent_of(&self, view: ViewId) -> Option<ViewId> {
        self.nodes.get(&view).and_then(|node| node.parent)
    }

    fn is_root(&self, view: ViewId) -> bool {
        view == self.root
    }
}

#[derive(Default)]
struct Hooks {
    sizing: HashMap<ViewId, LayoutHook>,
    layout: HashMap<ViewId, LayoutHook>,
}

/// Thread-safe view tree with a single root.
pub struct ViewArena {
    structure: RwLock<ArenaStructure>,
    calls: Mutex<Vec<LayoutCall>>,
    hooks: Mutex<Hooks>,
    ui_thread: Mutex<Option<ThreadId>>,
}

impl ViewArena {
    pub fn new() -> Self {
        let root = ViewId::new(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::default());
        Self {
            structure: RwLock::new(ArenaStructure {
                nodes,
                root,
                next_id: 2,
            }),
            calls: Mutex::new(Vec::new()),
            hooks: Mutex::new(Hooks::default()),
            ui_thread: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ArenaStructure> {
        self.structure
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ArenaStructure> {
        self.structure
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn calls_lock(&self) -> MutexGuard<'_, Vec<LayoutCall>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hooks_lock(&self) -> MutexGuard<'_, Hooks> {
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn root(&self) -> ViewId {
        self.read().root
    }

    /// Creates a new view as the last child of `parent`.
    pub fn insert_child(&self, parent: ViewId) -> Result<ViewId, TreeError> {
        let mut structure = self.write();
        structure.node(parent)?;
        let view = ViewId::new(structure.next_id);
        structure.next_id += 1;
        structure.nodes.insert(
            view,
            Node {
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(parent_node) = structure.nodes.get_mut(&parent) {
            parent_node.children.push(view);
        }
        Ok(view)
    }

    /// Creates `len` nested views below `parent`, outermost first.
    pub fn insert_chain(&self, parent: ViewId, len: usize) -> Result<Vec<ViewId>, TreeError> {
        let mut chain = Vec::with_capacity(len);
        let mut current = parent;
        for _ in 0..len {
            current = self.insert_child(current)?;
            chain.push(current);
        }
        Ok(chain)
    }

    /// Unlinks `view` (and its subtree) from its parent. The views stay alive
    /// and can be reattached later.
    pub fn detach(&self, view: ViewId) -> Result<(), TreeError> {
        let mut structure = self.write();
        if view == structure.root {
            return Err(TreeError::RootCannotMove);
        }
        structure.node(view)?;
        structure.unlink(view);
        Ok(())
    }

    /// Moves `view` under `parent`, detaching it from its current parent.
    pub fn reattach(&self, view: ViewId, parent: ViewId) -> Result<(), TreeError> {
        let mut structure = self.write();
        if view == structure.root {
            return Err(TreeError::RootCannotMove);
        }
        structure.node(view)?;
        structure.node(parent)?;
        if structure.is_in_subtree(parent, view) {
            return Err(TreeError::WouldCycle { view, parent });
        }
        structure.unlink(view);
        if let Some(node) = structure.nodes.get_mut(&view) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = structure.nodes.get_mut(&parent) {
            parent_node.children.push(view);
        }
        Ok(())
    }

    /// Destroys `view` and every view below it.
    pub fn remove(&self, view: ViewId) -> Result<(), TreeError> {
        let mut structure = self.write();
        if view == structure.root {
            return Err(TreeError::RootCannotMove);
        }
        structure.node(view)?;
        structure.unlink(view);

        let mut removed = HashSet::new();
        let mut doomed = vec![view];
        while let Some(next) = doomed.pop() {
            if let Some(node) = structure.nodes.remove(&next) {
                removed.insert(next);
                doomed.extend(node.children);
            }
        }
        drop(structure);

        let mut hooks = self.hooks_lock();
        hooks.sizing.retain(|id, _| !removed.contains(id));
        hooks.layout.retain(|id, _| !removed.contains(id));
        Ok(())
    }

    pub fn contains(&self, view: ViewId) -> bool {
        self.read().nodes.contains_key(&view)
    }

    pub fn parent(&self, view: ViewId) -> Option<ViewId> {
        self.read().parent_of(view)
    }

    pub fn children(&self, view: ViewId) -> Vec<ViewId> {
        self.read()
            .nodes
            .get(&view)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Depth below the root, or `None` when the view is not attached.
    pub fn depth(&self, view: ViewId) -> Option<usize> {
        depth_of(&*self.read(), view)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every recompute received so far, in call order.
    pub fn calls(&self) -> Vec<LayoutCall> {
        self.calls_lock().clone()
    }

    pub fn take_calls(&self) -> Vec<LayoutCall> {
        std::mem::take(&mut *self.calls_lock())
    }

    /// Runs `hook` inside every sizing recompute of `view`.
    pub fn on_sizing(&self, view: ViewId, hook: impl Fn(ViewId) + Send + Sync + 'static) {
        self.hooks_lock().sizing.insert(view, Arc::new(hook));
    }

    /// Runs `hook` inside every layout recompute of `view`.
    pub fn on_layout(&self, view: ViewId, hook: impl Fn(ViewId) + Send + Sync + 'static) {
        self.hooks_lock().layout.insert(view, Arc::new(hook));
    }

    pub fn clear_hooks(&self) {
        let mut hooks = self.hooks_lock();
        hooks.sizing.clear();
        hooks.layout.clear();
    }

    /// Makes every later recompute assert that it runs on the calling thread.
    pub fn bind_ui_thread(&self) {
        *self
            .ui_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(thread::current().id());
    }

    fn record(&self, call: LayoutCall) {
        let bound = *self
            .ui_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(ui_thread) = bound {
            assert_eq!(
                thread::current().id(),
                ui_thread,
                "recompute of {} invoked off the UI thread",
                call.view()
            );
        }
        log::trace!("arena recompute {call:?}");
        self.calls_lock().push(call);

        let hook = {
            let hooks = self.hooks_lock();
            match call {
                LayoutCall::Sizing(view) => hooks.sizing.get(&view).cloned(),
                LayoutCall::Layout(view) => hooks.layout.get(&view).cloned(),
            }
        };
        if let Some(hook) = hook {
            hook(call.view());
        }
    }
}

impl Default for ViewArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ViewArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let structure = self.read();
        f.debug_struct("ViewArena")
            .field("root", &structure.root)
            .field("views", &structure.nodes.len())
            .field("calls", &self.calls_lock().len())
            .finish()
    }
}

impl ViewTree for ViewArena {
    fn read_structure(&self, f: &mut dyn FnMut(&dyn TreeStructure)) {
        let structure = self.read();
        f(&*structure);
    }

    fn update_sizing_info(&self, view: ViewId) {
        self.record(LayoutCall::Sizing(view));
    }

    fn layout(&self, view: ViewId) {
        self.record(LayoutCall::Layout(view));
    }
}
