//! View identity and the narrow tree interface the coordinator consumes.

use std::fmt;

/// Lightweight handle identifying one view instance.
///
/// Handles never keep a view alive. A handle whose view has been destroyed or
/// detached simply stops resolving against the tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ViewId(u64);

impl ViewId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewId({})", self.0)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ViewId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Read-only access to the shape of the tree.
///
/// Only valid while the tree's structure lock is held, see
/// [`ViewTree::read_structure`].
pub trait TreeStructure {
    /// Current parent of `view`, or `None` for roots and unknown views.
    fn parent_of(&self, view: ViewId) -> Option<ViewId>;

    /// True when `view` is a live root of the tree (a window content view).
    fn is_root(&self, view: ViewId) -> bool;
}

/// The view tree driven by a [`LayoutCoordinator`](crate::LayoutCoordinator).
///
/// Structure queries go through [`read_structure`](Self::read_structure) so
/// the coordinator can take one consistent snapshot of depths. The recompute
/// callbacks are only ever invoked on the UI thread and without the structure
/// lock held; they may mutate the tree and raise new requests.
pub trait ViewTree: Send + Sync + 'static {
    /// Run `f` while holding the tree-wide structure read lock.
    fn read_structure(&self, f: &mut dyn FnMut(&dyn TreeStructure));

    /// Recompute the intrinsic preferred/minimum/maximum size of `view`.
    fn update_sizing_info(&self, view: ViewId);

    /// Recompute the positions and sizes `view` assigns to its children.
    fn layout(&self, view: ViewId);
}

/// Number of ancestor links between `view` and its root.
///
/// Returns `None` when the chain does not end at a live root, i.e. the view
/// was destroyed or sits in a detached subtree.
pub fn depth_of(structure: &dyn TreeStructure, view: ViewId) -> Option<usize> {
    let mut depth = 0;
    let mut current = view;
    while let Some(parent) = structure.parent_of(current) {
        depth += 1;
        current = parent;
    }
    structure.is_root(current).then_some(depth)
}

/// Convenience wrapper that resolves `view` under the structure lock.
pub fn is_attached<T: ViewTree + ?Sized>(tree: &T, view: ViewId) -> bool {
    let mut attached = false;
    tree.read_structure(&mut |structure| {
        attached = depth_of(structure, view).is_some();
    });
    attached
}
