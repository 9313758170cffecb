// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod text;

pub use crate::api::create_router;
pub use crate::engine::StatusEngine;
pub use crate::model::{Snapshot, Status, StatusRecord};
pub use crate::registry::{Registry, SourceDescriptor};
