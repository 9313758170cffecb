// src/config/mod.rs
pub mod engine;
pub mod sources;

pub use engine::EngineConfig;
pub use sources::{load_registry_default, load_registry_from};
