//! Runtime adapters and the serializable API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_pool;

pub use api::{EngineHealth, EngineSnapshot};
#[cfg(feature = "tokio-runtime")]
pub use tokio_pool::TokioThreadPool;
