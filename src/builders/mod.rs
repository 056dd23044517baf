//! Builders that assemble an engine from configuration.

pub mod engine_builder;

pub use engine_builder::{build_engine, build_thread_pool};
