//! User domain module.
//!
//! # Module Structure
//!
//! - `model`: `User`, `Role` and the add/update request types
//! - `credential`: salted password hashing and verification

mod credential;
mod model;

pub use credential::{hash_password, is_hashed, verify_password};
pub use model::{NewUser, Role, User, UserPatch};
