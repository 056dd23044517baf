//! Pool of language executors plus the compiled-script cache.
//!
//! The pool holds exactly `size` executors. A lease takes one out and puts it
//! back (after [`ScriptExecutor::release`]) when dropped, so an executor is
//! never used by two threads at once.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::bindings::ScriptBindings;
use super::engine::ScriptEngine;
use super::error::{ScriptError, ScriptResult};
use super::executor::{ExecutionContext, ScriptExecutor, ScriptLanguage};
use super::{ScriptId, TaskId};
use crate::collections::{BlockingQueue, RwIntMap, RwMap};

/// A compiled script and where it came from.
#[derive(Debug)]
pub struct CompiledScript<C> {
    script_id: ScriptId,
    filepath: Option<String>,
    compiled: Arc<C>,
}

impl<C> CompiledScript<C> {
    /// Assigned id.
    #[must_use]
    pub const fn script_id(&self) -> ScriptId {
        self.script_id
    }

    /// Path given at compile time.
    #[must_use]
    pub fn filepath(&self) -> Option<&str> {
        self.filepath.as_deref()
    }

    /// The language's compiled form.
    #[must_use]
    pub fn compiled(&self) -> &Arc<C> {
        &self.compiled
    }
}

/// Compiled scripts keyed by id, filepath and content hash.
pub struct CompileCache<C> {
    scripts: RwIntMap<Arc<CompiledScript<C>>>,
    by_path: RwMap<String, ScriptId>,
    by_content: RwMap<u64, ScriptId>,
    next_id: AtomicU32,
    compile_lock: Mutex<()>,
}

impl<C> Default for CompileCache<C> {
    fn default() -> Self {
        Self {
            scripts: RwIntMap::new(),
            by_path: RwMap::new(),
            by_content: RwMap::new(),
            next_id: AtomicU32::new(1),
            compile_lock: Mutex::new(()),
        }
    }
}

impl<C> CompileCache<C> {
    /// Compiled form of `script_id`.
    #[must_use]
    pub fn get(&self, script_id: ScriptId) -> Option<Arc<C>> {
        self.scripts
            .with(u64::from(script_id), |script| Arc::clone(&script.compiled))
    }

    /// Full entry for `script_id`.
    #[must_use]
    pub fn entry(&self, script_id: ScriptId) -> Option<Arc<CompiledScript<C>>> {
        self.scripts.with(u64::from(script_id), Arc::clone)
    }

    /// Returns `true` if `script_id` was compiled.
    #[must_use]
    pub fn contains(&self, script_id: ScriptId) -> bool {
        self.scripts.contains_key(u64::from(script_id))
    }

    /// Id of the script compiled from `filepath`.
    #[must_use]
    pub fn id_for_path(&self, filepath: &str) -> Option<ScriptId> {
        self.by_path.get(&filepath.to_owned())
    }

    /// Filepath `script_id` was compiled from.
    #[must_use]
    pub fn filepath(&self, script_id: ScriptId) -> Option<String> {
        self.scripts
            .with(u64::from(script_id), |script| script.filepath.clone())
            .flatten()
    }

    /// Number of compiled scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns `true` if nothing has been compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    fn cached(&self, filepath: Option<&str>, hash: u64) -> Option<ScriptId> {
        match filepath {
            Some(path) => self.id_for_path(path),
            None => self.by_content.get(&hash),
        }
    }

    fn insert(&self, filepath: Option<&str>, hash: u64, compiled: C) -> ScriptId {
        let script_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(path) = filepath {
            self.by_path.insert(path.to_owned(), script_id);
        }
        self.by_content.put_if_absent(hash, script_id);
        self.scripts.insert(
            u64::from(script_id),
            Arc::new(CompiledScript {
                script_id,
                filepath: filepath.map(str::to_owned),
                compiled: Arc::new(compiled),
            }),
        );
        script_id
    }
}

impl<C> std::fmt::Debug for CompileCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileCache")
            .field("scripts", &self.scripts.len())
            .field("paths", &self.by_path.len())
            .finish()
    }
}

fn content_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

struct PoolInner<L: ScriptLanguage> {
    language: L,
    idle: BlockingQueue<L::Executor>,
    cache: CompileCache<L::Compiled>,
    size: usize,
}

/// Fixed-size pool of executors for one language.
pub struct ExecutorPool<L: ScriptLanguage> {
    inner: Arc<PoolInner<L>>,
}

impl<L: ScriptLanguage> Clone for ExecutorPool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ScriptLanguage> ExecutorPool<L> {
    /// Creates `size` executors up front.
    ///
    /// # Errors
    ///
    /// [`ScriptError::InvalidConfig`] for a zero size, or whatever
    /// [`ScriptLanguage::create_executor`] fails with.
    pub fn new(language: L, size: usize) -> ScriptResult<Self> {
        if size == 0 {
            return Err(ScriptError::InvalidConfig("executor pool size must be > 0".into()));
        }
        let idle = BlockingQueue::new(size);
        for _ in 0..size {
            let executor = language.create_executor()?;
            // Capacity equals size, so this cannot be rejected.
            let _ = idle.offer(executor);
        }
        debug!(language = language.name(), size, "Executor pool created");
        Ok(Self {
            inner: Arc::new(PoolInner {
                language,
                idle,
                cache: CompileCache::default(),
                size,
            }),
        })
    }

    /// Takes an idle executor without waiting.
    #[must_use]
    pub fn try_lease(&self) -> Option<ExecutorLease<L>> {
        self.inner.idle.poll().map(|executor| self.lease(executor))
    }

    /// Waits up to `timeout` for an idle executor.
    #[must_use]
    pub fn lease_timeout(&self, timeout: Duration) -> Option<ExecutorLease<L>> {
        self.inner
            .idle
            .poll_timeout(timeout)
            .map(|executor| self.lease(executor))
    }

    fn lease(&self, executor: L::Executor) -> ExecutorLease<L> {
        ExecutorLease {
            executor: Some(executor),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Idle executors.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.idle.len()
    }

    /// Total executors.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// The language this pool was built for.
    #[must_use]
    pub fn language(&self) -> &L {
        &self.inner.language
    }

    /// Compiled scripts.
    #[must_use]
    pub fn cache(&self) -> &CompileCache<L::Compiled> {
        &self.inner.cache
    }

    /// Compiles `source`, returning the existing id if the same filepath (or,
    /// without a filepath, the same content) was compiled before.
    ///
    /// # Errors
    ///
    /// [`ScriptError::InsufficientCompilers`] if no executor frees up within
    /// `timeout`; [`ScriptError::Compile`] from the language.
    pub fn compile(&self, source: &str, filepath: Option<&str>, timeout: Duration) -> ScriptResult<ScriptId> {
        let cache = &self.inner.cache;
        let hash = content_hash(source);
        if let Some(script_id) = cache.cached(filepath, hash) {
            return Ok(script_id);
        }

        let _guard = cache.compile_lock.lock();
        if let Some(script_id) = cache.cached(filepath, hash) {
            return Ok(script_id);
        }
        let Some(mut lease) = self.lease_timeout(timeout) else {
            warn!(language = self.inner.language.name(), ?timeout, "No executor free to compile");
            return Err(ScriptError::InsufficientCompilers);
        };
        let compiled = lease
            .executor_mut()
            .ok_or(ScriptError::InsufficientCompilers)?
            .compile(source)?;
        let script_id = cache.insert(filepath, hash, compiled);
        debug!(script_id, filepath, "Script compiled");
        Ok(script_id)
    }

    /// Stops handing out executors; leased ones are dropped on return.
    pub fn close(&self) {
        self.inner.idle.close();
        drop(self.inner.idle.drain());
    }
}

impl<L: ScriptLanguage> std::fmt::Debug for ExecutorPool<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorPool")
            .field("language", &self.inner.language.name())
            .field("size", &self.inner.size)
            .field("available", &self.available())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// Exclusive use of one executor. Returned to the pool on drop.
pub struct ExecutorLease<L: ScriptLanguage> {
    executor: Option<L::Executor>,
    inner: Arc<PoolInner<L>>,
}

impl<L: ScriptLanguage> ExecutorLease<L> {
    /// The leased executor. Only `Drop` takes it out.
    pub fn executor_mut(&mut self) -> Option<&mut L::Executor> {
        self.executor.as_mut()
    }
}

impl<L: ScriptLanguage> Drop for ExecutorLease<L> {
    fn drop(&mut self) {
        if let Some(mut executor) = self.executor.take() {
            executor.release();
            if self.inner.idle.offer(executor).is_err() {
                debug!(language = self.inner.language.name(), "Executor pool closed - dropping executor");
            }
        }
    }
}

/// Engine-facing, language-erased view of an [`ExecutorPool`].
pub(crate) trait ScriptRunner: Send + Sync {
    fn language_name(&self) -> &str;
    fn supports_embedded_sync(&self) -> bool;
    fn compile(&self, source: &str, filepath: Option<&str>, timeout: Duration) -> ScriptResult<ScriptId>;
    fn compiled_script_id(&self, filepath: &str) -> Option<ScriptId>;
    fn filepath(&self, script_id: ScriptId) -> Option<String>;
    fn contains(&self, script_id: ScriptId) -> bool;
    fn compiled_count(&self) -> usize;
    fn try_lease(&self) -> Option<Box<dyn LeasedExecutor>>;
    fn lease_timeout(&self, timeout: Duration) -> Option<Box<dyn LeasedExecutor>>;
    fn available(&self) -> usize;
    fn size(&self) -> usize;
    fn close(&self);
}

/// Language-erased lease.
pub(crate) trait LeasedExecutor: Send {
    fn run(
        &mut self,
        engine: &ScriptEngine,
        task_id: TaskId,
        script_id: ScriptId,
        bindings: ScriptBindings,
        return_result: bool,
    ) -> ScriptResult<Option<ScriptBindings>>;
}

impl<L: ScriptLanguage> LeasedExecutor for ExecutorLease<L> {
    fn run(
        &mut self,
        engine: &ScriptEngine,
        task_id: TaskId,
        script_id: ScriptId,
        bindings: ScriptBindings,
        return_result: bool,
    ) -> ScriptResult<Option<ScriptBindings>> {
        let inner = Arc::clone(&self.inner);
        let compiled = inner
            .cache
            .get(script_id)
            .ok_or(ScriptError::NoSuchScript { script_id })?;
        let ctx = ExecutionContext::new(engine, &inner.cache, script_id, task_id);
        self.executor_mut()
            .ok_or(ScriptError::ExecutorUnavailable { script_id })?
            .execute(&ctx, &compiled, bindings, return_result)
    }
}

impl<L: ScriptLanguage> ScriptRunner for ExecutorPool<L> {
    fn language_name(&self) -> &str {
        self.inner.language.name()
    }

    fn supports_embedded_sync(&self) -> bool {
        self.inner.language.supports_embedded_sync()
    }

    fn compile(&self, source: &str, filepath: Option<&str>, timeout: Duration) -> ScriptResult<ScriptId> {
        Self::compile(self, source, filepath, timeout)
    }

    fn compiled_script_id(&self, filepath: &str) -> Option<ScriptId> {
        self.inner.cache.id_for_path(filepath)
    }

    fn filepath(&self, script_id: ScriptId) -> Option<String> {
        self.inner.cache.filepath(script_id)
    }

    fn contains(&self, script_id: ScriptId) -> bool {
        self.inner.cache.contains(script_id)
    }

    fn compiled_count(&self) -> usize {
        self.inner.cache.len()
    }

    fn try_lease(&self) -> Option<Box<dyn LeasedExecutor>> {
        Self::try_lease(self).map(|lease| Box::new(lease) as Box<dyn LeasedExecutor>)
    }

    fn lease_timeout(&self, timeout: Duration) -> Option<Box<dyn LeasedExecutor>> {
        Self::lease_timeout(self, timeout).map(|lease| Box::new(lease) as Box<dyn LeasedExecutor>)
    }

    fn available(&self) -> usize {
        Self::available(self)
    }

    fn size(&self) -> usize {
        Self::size(self)
    }

    fn close(&self) {
        Self::close(self);
    }
}

/// Reads a whole script source from `reader`.
pub(crate) fn read_source(mut reader: impl Read) -> ScriptResult<String> {
    let mut source = String::new();
    reader.read_to_string(&mut source)?;
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    struct EchoExecutor {
        released: usize,
    }

    impl ScriptLanguage for Echo {
        type Compiled = String;
        type Executor = EchoExecutor;

        fn name(&self) -> &str {
            "echo"
        }

        fn create_executor(&self) -> ScriptResult<EchoExecutor> {
            Ok(EchoExecutor { released: 0 })
        }
    }

    impl ScriptExecutor for EchoExecutor {
        type Compiled = String;

        fn compile(&mut self, source: &str) -> ScriptResult<String> {
            if source.is_empty() {
                return Err(ScriptError::Compile("empty source".into()));
            }
            Ok(source.to_owned())
        }

        fn execute(
            &mut self,
            _ctx: &ExecutionContext<'_, String>,
            compiled: &String,
            bindings: ScriptBindings,
            return_result: bool,
        ) -> ScriptResult<Option<ScriptBindings>> {
            Ok(return_result.then(|| bindings.with("echo", compiled.as_str())))
        }

        fn execute_embedded(
            &mut self,
            _ctx: &ExecutionContext<'_, String>,
            _parent_script_id: ScriptId,
            _script_id: ScriptId,
            _compiled: &String,
            _bindings: &mut ScriptBindings,
        ) -> ScriptResult<()> {
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_compile_is_idempotent() {
        let pool = ExecutorPool::new(Echo, 1).unwrap();
        let a = pool.compile("print(1)", None, TIMEOUT).unwrap();
        let b = pool.compile("print(1)", None, TIMEOUT).unwrap();
        assert_eq!(a, b);

        let c = pool.compile("print(2)", Some("scripts/two.lua"), TIMEOUT).unwrap();
        let d = pool.compile("changed", Some("scripts/two.lua"), TIMEOUT).unwrap();
        assert_eq!(c, d);
        assert_ne!(a, c);
        assert_eq!(pool.cache().filepath(c).as_deref(), Some("scripts/two.lua"));
        assert_eq!(pool.cache().len(), 2);
    }

    #[test]
    fn test_compile_error_propagates() {
        let pool = ExecutorPool::new(Echo, 1).unwrap();
        assert!(matches!(
            pool.compile("", None, TIMEOUT),
            Err(ScriptError::Compile(_))
        ));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_compile_without_free_executor() {
        let pool = ExecutorPool::new(Echo, 1).unwrap();
        let _lease = pool.try_lease().unwrap();
        assert_eq!(
            pool.compile("x", None, Duration::from_millis(10)),
            Err(ScriptError::InsufficientCompilers)
        );
    }

    #[test]
    fn test_lease_returns_on_drop() {
        let pool = ExecutorPool::new(Echo, 2).unwrap();
        let mut lease = pool.try_lease().unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(lease.executor_mut().map(|e| e.released), Some(0));
        drop(lease);
        assert_eq!(pool.available(), 2);

        pool.close();
        assert!(pool.try_lease().is_none());
    }

    #[test]
    fn test_read_source() {
        let source = read_source("let x = 1;".as_bytes()).unwrap();
        assert_eq!(source, "let x = 1;");
    }
}
