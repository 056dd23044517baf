//! Configuration models for the engine and its thread pool.

pub mod engine;

pub use engine::{EngineConfig, ThreadPoolKind, ENV_PREFIX};
