//! Core of the Arbor layout pipeline.
//!
//! [`LayoutCoordinator`] batches sizing and layout requests raised from any
//! thread into ordered passes on the UI thread. The view tree and the UI
//! thread are supplied by the host through [`ViewTree`] and [`UiScheduler`].

pub mod collections;
mod coordinator;
mod platform;
mod view;

pub use coordinator::{
    CoordinatorConfig, CoordinatorState, CoordinatorStats, LayoutCoordinator, PassStats,
};
pub use platform::{UiScheduler, UiTask};
pub use view::{depth_of, is_attached, TreeStructure, ViewId, ViewTree};
