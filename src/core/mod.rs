//! Core scheduling: the engine, its invocation queue, executor pool, thread
//! pool providers and game futures.

pub mod bindings;
pub mod engine;
pub mod error;
pub mod execution;
pub mod executor;
pub mod executor_pool;
pub mod future;
pub mod invocation;
pub mod invocation_queue;
pub mod listener;
pub mod notification;
pub mod pool;
pub mod thread_pool;

/// Id assigned to a compiled script.
pub type ScriptId = u32;
/// Id assigned to one invocation of a script.
pub type TaskId = u64;
/// Id of a game future.
pub type FutureId = u64;

pub use bindings::{ScriptBindings, ScriptValue};
pub use engine::ScriptEngine;
pub use error::{AppResult, ScriptError, ScriptResult};
pub use execution::ScriptExecutionTask;
pub use executor::{EmbeddedScriptInvoker, ExecutionContext, ScriptExecutor, ScriptLanguage};
pub use executor_pool::{CompileCache, CompiledScript, ExecutorLease, ExecutorPool};
pub use future::{FutureCondition, FutureState, GameFuture};
pub use invocation::{ScriptInvocation, ScriptInvocationPool};
pub use invocation_queue::ScriptInvocationQueue;
pub use listener::{ScriptInvocationListener, ScriptOutcome};
pub use notification::{ProcessedSignal, ScriptNotification};
pub use pool::{ObjectPool, Poolable};
pub use thread_pool::{
    DedicatedThreadPool, Job, PoolError, PoolStats, TaskHandle, ThreadPoolProvider,
};
