//! # Prometheus Script Engine
//!
//! A host-embeddable scheduler for game scripts.
//!
//! Scripts are compiled once through a pluggable language adapter, queued by
//! priority, and run on a bounded thread pool. A running script may block on a
//! [`GameFuture`](core::GameFuture) whose condition is re-evaluated once per
//! frame by the host's game thread, so script code reads sequentially while the
//! game loop never blocks on it.
//!
//! ## Core Problem Solved
//!
//! Game scripts want to say "walk to the door, then wait until it opens, then
//! speak". The frame loop cannot block on any of that, and handing every script
//! its own thread does not scale. The engine:
//!
//! - **Bounds concurrency**: at most `max_concurrent_scripts` scripts run at
//!   once, one per pooled executor.
//! - **Orders fairly**: higher priority first, FIFO within a priority.
//! - **Serializes interaction**: at most one interactive script (dialogue,
//!   cutscene) runs engine-wide, while other scripts keep flowing.
//! - **Skips cooperatively**: skipping a script raises its interrupt flag; the
//!   script unwinds at its next future wait with
//!   [`ScriptError::ScriptSkipped`](core::ScriptError::ScriptSkipped).
//! - **Routes callbacks**: listeners that ask for the game thread get their
//!   callbacks during [`ScriptEngine::update`](core::ScriptEngine::update).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use prometheus_script_engine::config::EngineConfig;
//! use prometheus_script_engine::core::{GameFuture, ScriptBindings, ScriptEngine};
//!
//! let engine = ScriptEngine::new(EngineConfig::from_env()?, MyLanguage::default())?;
//! let greet = engine.compile_script_with_path("scripts/greet.lua", GREET)?;
//! engine.invoke(greet, ScriptBindings::new().with("npc", 12));
//!
//! // Inside a script (on a worker thread):
//! let door_open = GameFuture::new(&engine, move |_delta| door.is_open())?;
//! door_open.wait_for_completion()?;
//!
//! // Host frame loop (game thread):
//! loop {
//!     engine.update(frame_delta);
//! }
//! ```
//!
//! ## Thread pools
//!
//! Two [`ThreadPoolProvider`](core::ThreadPoolProvider) strategies ship with the
//! crate: a dedicated pool of named OS threads
//! ([`DedicatedThreadPool`](core::DedicatedThreadPool)) and, behind the default
//! `tokio-runtime` feature, a pool backed by a private tokio runtime
//! ([`TokioThreadPool`](runtime::TokioThreadPool)).

/// Concurrent containers: locked queues and maps, open-addressing id maps,
/// the monitor used for blocking handoff.
pub mod collections;
/// Engine configuration.
pub mod config;
/// Core scheduling: engine, queue, executors, futures, thread pools.
pub mod core;
/// Builders that assemble an engine from configuration.
pub mod builders;
/// Runtime adapters and the serializable API surface.
pub mod runtime;
/// Shared utilities: clock, interrupts, telemetry.
pub mod util;

pub use crate::config::EngineConfig;
pub use crate::core::{
    GameFuture, ScriptBindings, ScriptEngine, ScriptError, ScriptInvocationListener, ScriptResult,
};
