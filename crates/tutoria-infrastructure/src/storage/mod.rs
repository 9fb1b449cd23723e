//! File storage primitives shared by the on-disk stores.

pub mod atomic_json;

pub use atomic_json::{AtomicJsonError, AtomicJsonFile};
