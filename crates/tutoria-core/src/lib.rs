//! Domain model and persistence contracts for Tutoria.
//!
//! Nothing in this crate performs I/O. Backends live in
//! `tutoria-infrastructure`; the entity store lives in `tutoria-application`.

pub mod config;
pub mod document;
pub mod error;
pub mod kv;
pub mod persistence;
pub mod sector;
pub mod seed;
pub mod tutorial;
pub mod user;
pub mod validation;

pub use document::{Collection, Document, Fields};
pub use error::{Result, TutoriaError};
pub use persistence::{BackendKind, ChangeHandler, PersistenceAdapter, Subscription};
