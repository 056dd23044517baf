//! Test fixtures: a closure-driven script language and a channel listener.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use prometheus_script_engine::core::{
    ExecutionContext, ScriptBindings, ScriptEngine, ScriptError, ScriptExecutor,
    ScriptInvocationListener, ScriptLanguage, ScriptResult,
};
use prometheus_script_engine::core::ScriptId;

type Body = dyn Fn(&ExecutionContext<'_, Compiled>, &mut ScriptBindings) -> ScriptResult<()> + Send + Sync;

type ExecutorBody = dyn Fn(&mut ClosureExecutor, &ExecutionContext<'_, Compiled>, &mut ScriptBindings) -> ScriptResult<()>
    + Send
    + Sync;

/// A "compiled" script is the registered closure.
#[derive(Clone)]
pub enum Compiled {
    Plain(Arc<Body>),
    /// Gets the executor it runs on, for embedded invocation.
    WithExecutor(Arc<ExecutorBody>),
}

/// Scripts are registered by name; the source text is the name.
#[derive(Clone, Default)]
pub struct ClosureLanguage {
    scripts: Arc<Mutex<HashMap<String, Compiled>>>,
}

impl ClosureLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        body: impl Fn(&ExecutionContext<'_, Compiled>, &mut ScriptBindings) -> ScriptResult<()>
            + Send
            + Sync
            + 'static,
    ) {
        self.scripts
            .lock()
            .insert(name.to_owned(), Compiled::Plain(Arc::new(body)));
    }

    pub fn register_with_executor(
        &self,
        name: &str,
        body: impl Fn(&mut ClosureExecutor, &ExecutionContext<'_, Compiled>, &mut ScriptBindings) -> ScriptResult<()>
            + Send
            + Sync
            + 'static,
    ) {
        self.scripts
            .lock()
            .insert(name.to_owned(), Compiled::WithExecutor(Arc::new(body)));
    }
}

impl ScriptLanguage for ClosureLanguage {
    type Compiled = Compiled;
    type Executor = ClosureExecutor;

    fn name(&self) -> &str {
        "closure"
    }

    fn create_executor(&self) -> ScriptResult<ClosureExecutor> {
        Ok(ClosureExecutor {
            scripts: Arc::clone(&self.scripts),
            embedded_calls: Vec::new(),
        })
    }
}

pub struct ClosureExecutor {
    scripts: Arc<Mutex<HashMap<String, Compiled>>>,
    /// `(parent, child)` pairs seen by `execute_embedded`.
    pub embedded_calls: Vec<(ScriptId, ScriptId)>,
}

impl ClosureExecutor {
    fn run(
        &mut self,
        ctx: &ExecutionContext<'_, Compiled>,
        compiled: &Compiled,
        bindings: &mut ScriptBindings,
    ) -> ScriptResult<()> {
        match compiled {
            Compiled::Plain(body) => body(ctx, bindings),
            Compiled::WithExecutor(body) => body(self, ctx, bindings),
        }
    }
}

impl ScriptExecutor for ClosureExecutor {
    type Compiled = Compiled;

    fn compile(&mut self, source: &str) -> ScriptResult<Compiled> {
        self.scripts
            .lock()
            .get(source)
            .cloned()
            .ok_or_else(|| ScriptError::Compile(format!("unknown script `{source}`")))
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_, Compiled>,
        compiled: &Compiled,
        mut bindings: ScriptBindings,
        return_result: bool,
    ) -> ScriptResult<Option<ScriptBindings>> {
        self.run(ctx, compiled, &mut bindings)?;
        Ok(return_result.then_some(bindings))
    }

    fn execute_embedded(
        &mut self,
        ctx: &ExecutionContext<'_, Compiled>,
        parent_script_id: ScriptId,
        script_id: ScriptId,
        compiled: &Compiled,
        bindings: &mut ScriptBindings,
    ) -> ScriptResult<()> {
        self.embedded_calls.push((parent_script_id, script_id));
        self.run(ctx, compiled, bindings)
    }

    fn release(&mut self) {
        self.embedded_calls.clear();
    }
}

/// Listener callbacks as data.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin(ScriptId),
    Success(ScriptId, Option<ScriptBindings>),
    Skipped(ScriptId),
    Exception(ScriptId, ScriptError),
    Cancelled(ScriptId),
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Begin(_))
    }
}

pub struct ChannelListener {
    tx: Sender<Event>,
    game_thread: bool,
}

impl ChannelListener {
    pub fn new(game_thread: bool) -> (Arc<Self>, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx, game_thread }), rx)
    }
}

impl ScriptInvocationListener for ChannelListener {
    fn on_script_begin(&self, script_id: ScriptId) {
        let _ = self.tx.send(Event::Begin(script_id));
    }
    fn on_script_success(&self, script_id: ScriptId, result: Option<ScriptBindings>) {
        let _ = self.tx.send(Event::Success(script_id, result));
    }
    fn on_script_skipped(&self, script_id: ScriptId) {
        let _ = self.tx.send(Event::Skipped(script_id));
    }
    fn on_script_exception(&self, script_id: ScriptId, error: ScriptError) {
        let _ = self.tx.send(Event::Exception(script_id, error));
    }
    fn on_script_cancelled(&self, script_id: ScriptId) {
        let _ = self.tx.send(Event::Cancelled(script_id));
    }
    fn call_on_game_thread(&self) -> bool {
        self.game_thread
    }
}

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for the first terminal event without driving the game thread.
pub fn wait_outcome(rx: &Receiver<Event>) -> Event {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(remaining).expect("no outcome before timeout");
        if event.is_terminal() {
            return event;
        }
    }
}

/// Drives `engine.update` until `rx` yields a terminal event.
pub fn pump_until_outcome(engine: &ScriptEngine, rx: &Receiver<Event>) -> Event {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        engine.update(0.016);
        while let Ok(event) = rx.try_recv() {
            if event.is_terminal() {
                return event;
            }
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("no outcome before timeout");
}

/// Polls `condition` for up to the test timeout.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
