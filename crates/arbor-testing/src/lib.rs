//! Testing utilities and harness for Arbor

pub mod arena;
pub mod assertions;
pub mod scheduler;

pub use arena::{LayoutCall, LayoutHook, TreeError, ViewArena};
pub use scheduler::ManualScheduler;

pub mod prelude {
    pub use crate::arena::{LayoutCall, TreeError, ViewArena};
    pub use crate::assertions::*;
    pub use crate::scheduler::ManualScheduler;
}
