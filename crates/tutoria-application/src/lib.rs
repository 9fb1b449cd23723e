//! Entity store, session gate and startup wiring for Tutoria.

pub mod auth;
pub mod bootstrap;
pub mod store;
pub mod telemetry;

pub use auth::SessionGate;
pub use bootstrap::{Tutoria, start, start_with_config};
pub use store::{DashboardStats, EntityStore, StoreEvent, StoreOptions};
pub use telemetry::{OperationalEvent, OperationalLogLayer, init_tracing};
