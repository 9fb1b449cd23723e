//! Sector domain module.

mod model;

pub use model::{SECTOR_NOT_FOUND, Sector};
