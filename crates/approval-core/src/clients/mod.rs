//! Adapters for the engine ports
//!
//! In-process implementations of role lookup, id allocation, notification and
//! audit. Storage adapters live in `crate::stores`.

pub mod audit;
pub mod ids;
pub mod notify;
pub mod roles;

pub use audit::{FileAuditLog, MemoryAuditLog};
pub use ids::UuidIdGenerator;
pub use notify::LogNotifier;
pub use roles::{StaticRoleDirectory, UserProfile};
