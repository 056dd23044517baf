//! Language adapter contract.
//!
//! A [`ScriptLanguage`] is the factory the engine is built with; it creates
//! one [`ScriptExecutor`] per pool slot. Executors compile source into the
//! language's `Compiled` form and run it against a set of bindings. The engine
//! never looks inside either type.

use std::sync::Arc;

use super::bindings::ScriptBindings;
use super::engine::ScriptEngine;
use super::error::{ScriptError, ScriptResult};
use super::executor_pool::CompileCache;
use super::{ScriptId, TaskId};

/// Factory for executors of one scripting language.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_script_engine::core::{ScriptExecutor, ScriptLanguage, ScriptResult};
///
/// struct Lua;
///
/// impl ScriptLanguage for Lua {
///     type Compiled = LuaChunk;
///     type Executor = LuaState;
///
///     fn name(&self) -> &str {
///         "lua"
///     }
///
///     fn create_executor(&self) -> ScriptResult<LuaState> {
///         LuaState::new()
///     }
/// }
/// ```
pub trait ScriptLanguage: Send + Sync + 'static {
    /// Compiled representation shared by every executor.
    type Compiled: Send + Sync + 'static;

    /// Executor type created per pool slot.
    type Executor: ScriptExecutor<Compiled = Self::Compiled>;

    /// Language name, used in logs and snapshots.
    fn name(&self) -> &str;

    /// Builds one executor instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be created.
    fn create_executor(&self) -> ScriptResult<Self::Executor>;

    /// Whether scripts may run other scripts synchronously through
    /// [`ScriptExecutor::execute_embedded`].
    fn supports_embedded_sync(&self) -> bool {
        true
    }
}

/// One interpreter instance. Never shared between threads at the same time.
pub trait ScriptExecutor: Send + 'static {
    /// Compiled representation (same as the owning language's).
    type Compiled: Send + Sync + 'static;

    /// Compiles source text.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Compile`] for invalid source.
    fn compile(&mut self, source: &str) -> ScriptResult<Self::Compiled>;

    /// Runs a compiled script.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Access to the engine and other compiled scripts
    /// * `compiled` - The script to run
    /// * `bindings` - Input variables
    /// * `return_result` - Whether the caller wants the bindings back
    ///
    /// # Errors
    ///
    /// [`ScriptError::ScriptSkipped`] when the script was skipped while waiting
    /// on a future; any other error is reported as a failure.
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_, Self::Compiled>,
        compiled: &Self::Compiled,
        bindings: ScriptBindings,
        return_result: bool,
    ) -> ScriptResult<Option<ScriptBindings>>;

    /// Runs `script_id` inside the script `parent_script_id` currently
    /// executing on this executor, sharing its bindings.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    fn execute_embedded(
        &mut self,
        ctx: &ExecutionContext<'_, Self::Compiled>,
        parent_script_id: ScriptId,
        script_id: ScriptId,
        compiled: &Self::Compiled,
        bindings: &mut ScriptBindings,
    ) -> ScriptResult<()>;

    /// Clears per-run state before the executor returns to its pool.
    fn release(&mut self) {}
}

/// What an executor can see of the engine while a script runs.
pub struct ExecutionContext<'a, C> {
    engine: &'a ScriptEngine,
    cache: &'a CompileCache<C>,
    script_id: ScriptId,
    task_id: TaskId,
}

impl<'a, C: Send + Sync + 'static> ExecutionContext<'a, C> {
    pub(crate) const fn new(
        engine: &'a ScriptEngine,
        cache: &'a CompileCache<C>,
        script_id: ScriptId,
        task_id: TaskId,
    ) -> Self {
        Self {
            engine,
            cache,
            script_id,
            task_id,
        }
    }

    /// Script being executed.
    #[must_use]
    pub const fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Invocation task id.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// The engine running this script; futures are created against it.
    #[must_use]
    pub const fn engine(&self) -> &'a ScriptEngine {
        self.engine
    }

    /// Invoker for running other scripts from this one.
    #[must_use]
    pub const fn invoker(&self) -> EmbeddedScriptInvoker<'a, C> {
        EmbeddedScriptInvoker {
            engine: self.engine,
            cache: self.cache,
            parent_script_id: self.script_id,
            task_id: self.task_id,
        }
    }
}

impl<C> std::fmt::Debug for ExecutionContext<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("script_id", &self.script_id)
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// Lets a running script look up and start other scripts.
pub struct EmbeddedScriptInvoker<'a, C> {
    engine: &'a ScriptEngine,
    cache: &'a CompileCache<C>,
    parent_script_id: ScriptId,
    task_id: TaskId,
}

impl<C: Send + Sync + 'static> EmbeddedScriptInvoker<'_, C> {
    /// Script that owns this invoker.
    #[must_use]
    pub const fn parent_script_id(&self) -> ScriptId {
        self.parent_script_id
    }

    /// Id of the script compiled from `filepath`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScriptPath`] if nothing was compiled from it.
    pub fn script_id(&self, filepath: &str) -> ScriptResult<ScriptId> {
        self.cache
            .id_for_path(filepath)
            .ok_or_else(|| ScriptError::NoSuchScriptPath(filepath.to_owned()))
    }

    /// Compiled form of `script_id`, for [`ScriptExecutor::execute_embedded`].
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScript`] for an unknown id.
    pub fn compiled(&self, script_id: ScriptId) -> ScriptResult<Arc<C>> {
        self.cache
            .get(script_id)
            .ok_or(ScriptError::NoSuchScript { script_id })
    }

    /// Queues `script_id` with a copy of `bindings`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScript`] for an unknown id.
    pub fn invoke_async(&self, script_id: ScriptId, bindings: &ScriptBindings) -> ScriptResult<TaskId> {
        if !self.cache.contains(script_id) {
            return Err(ScriptError::NoSuchScript { script_id });
        }
        Ok(self.engine.invoke(script_id, bindings.clone()))
    }

    /// Queues the script compiled from `filepath` with a copy of `bindings`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScriptPath`] if nothing was compiled from it.
    pub fn invoke_async_by_path(&self, filepath: &str, bindings: &ScriptBindings) -> ScriptResult<TaskId> {
        let script_id = self.script_id(filepath)?;
        self.invoke_async(script_id, bindings)
    }

    /// Runs `script_id` to completion on `executor`, the executor running the
    /// parent script, sharing the parent's `bindings`. Behaves like a function
    /// call: whatever the child writes to `bindings` is visible to the parent
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScript`] for an unknown id,
    /// [`ScriptError::Execution`] if the language has no embedded support, and
    /// anything the child script fails with, including
    /// [`ScriptError::ScriptSkipped`].
    pub fn invoke_sync<E>(
        &self,
        executor: &mut E,
        script_id: ScriptId,
        bindings: &mut ScriptBindings,
    ) -> ScriptResult<()>
    where
        E: ScriptExecutor<Compiled = C>,
    {
        if !self.engine.supports_embedded_sync() {
            return Err(ScriptError::Execution(format!(
                "{} does not support embedded invocation",
                self.engine.language_name()
            )));
        }
        let compiled = self.compiled(script_id)?;
        let ctx = ExecutionContext::new(self.engine, self.cache, script_id, self.task_id);
        executor.execute_embedded(&ctx, self.parent_script_id, script_id, &compiled, bindings)
    }

    /// [`invoke_sync`](Self::invoke_sync) for the script compiled from
    /// `filepath`.
    ///
    /// # Errors
    ///
    /// [`ScriptError::NoSuchScriptPath`] if nothing was compiled from it, plus
    /// everything [`invoke_sync`](Self::invoke_sync) returns.
    pub fn invoke_sync_by_path<E>(
        &self,
        executor: &mut E,
        filepath: &str,
        bindings: &mut ScriptBindings,
    ) -> ScriptResult<()>
    where
        E: ScriptExecutor<Compiled = C>,
    {
        let script_id = self.script_id(filepath)?;
        self.invoke_sync(executor, script_id, bindings)
    }
}

impl<C> std::fmt::Debug for EmbeddedScriptInvoker<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedScriptInvoker")
            .field("parent_script_id", &self.parent_script_id)
            .finish_non_exhaustive()
    }
}
