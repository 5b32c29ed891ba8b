#[cfg(feature = "std-hash")]
pub mod set {
    pub use std::collections::HashSet;

    pub fn new_set<T>() -> HashSet<T> {
        HashSet::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod set {
    pub use rustc_hash::FxHashSet as HashSet;

    pub fn new_set<T>() -> HashSet<T> {
        HashSet::default()
    }
}
