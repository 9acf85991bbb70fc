use crate::config::Options;
use crate::language::compiler::code::{Program, Stmt};
use crate::runtime::{
    async_runtime::TaskRunner,
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

pub type EnvRef = Arc<Env>;

/// Deferred call with its function and arguments already evaluated.
pub type DeferredCall = Box<dyn FnOnce(&Arc<ThreadGlobals>) -> RuntimeResult<()> + Send>;

/// Pending out-of-band transfer of control, checked by the executor each time
/// the instruction chain stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Signal {
    #[default]
    None,
    Return,
    Defer,
    Panic,
}

/// State shared by every goroutine of one interpreter.
pub struct Globals {
    pub options: Options,
    tasks: TaskRunner,
    output: Mutex<String>,
    pushed: AtomicUsize,
    popped: AtomicUsize,
}

impl Globals {
    pub fn new(options: Options) -> Arc<Self> {
        Arc::new(Self {
            options,
            tasks: TaskRunner::new(),
            output: Mutex::new(String::new()),
            pushed: AtomicUsize::new(0),
            popped: AtomicUsize::new(0),
        })
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.tasks
    }

    /// Output of `print` and `println`.
    pub fn write(&self, text: &str) {
        if self.options.capture_output {
            self.output.lock().push_str(text);
        } else {
            print!("{text}");
        }
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock())
    }

    /// Block environments entered and left so far, across all goroutines.
    pub fn env_stats(&self) -> (usize, usize) {
        (
            self.pushed.load(Ordering::Relaxed),
            self.popped.load(Ordering::Relaxed),
        )
    }
}

#[derive(Default)]
struct SignalState {
    signal: Signal,
    interrupt: Option<Stmt>,
    deferred: Option<DeferredCall>,
    panic: Option<RuntimeError>,
}

/// Per-goroutine state: the pending signal, the interrupt instruction and
/// the pool of reusable block environments.
pub struct ThreadGlobals {
    globals: Arc<Globals>,
    file_env: Mutex<Weak<Env>>,
    top_env: Mutex<Weak<Env>>,
    state: Mutex<SignalState>,
    pool: Mutex<Vec<Slots>>,
}

/// Storage of a released environment, ready to back a new one.
#[derive(Default)]
struct Slots {
    binds: Vec<Mutex<Value>>,
    int_binds: Vec<AtomicU64>,
}

impl Slots {
    fn resize(&mut self, binds: usize, int_binds: usize) {
        self.binds.truncate(binds);
        for slot in &mut self.binds {
            *slot.get_mut() = Value::Nil;
        }
        self.binds.resize_with(binds, || Mutex::new(Value::Nil));
        self.int_binds.truncate(int_binds);
        for slot in &mut self.int_binds {
            *slot.get_mut() = 0;
        }
        self.int_binds.resize_with(int_binds, || AtomicU64::new(0));
    }
}

impl ThreadGlobals {
    pub fn new(globals: Arc<Globals>) -> Arc<Self> {
        Arc::new(Self {
            globals,
            file_env: Mutex::new(Weak::new()),
            top_env: Mutex::new(Weak::new()),
            state: Mutex::new(SignalState::default()),
            pool: Mutex::new(Vec::new()),
        })
    }

    /// Fresh state for a new goroutine, sharing file and top environments.
    pub fn spawn_child(&self) -> Arc<Self> {
        Arc::new(Self {
            globals: self.globals.clone(),
            file_env: Mutex::new(self.file_env.lock().clone()),
            top_env: Mutex::new(self.top_env.lock().clone()),
            state: Mutex::new(SignalState::default()),
            pool: Mutex::new(Vec::new()),
        })
    }

    pub fn globals(&self) -> &Arc<Globals> {
        &self.globals
    }

    pub fn set_file_env(&self, env: &EnvRef) {
        *self.file_env.lock() = Arc::downgrade(env);
        *self.top_env.lock() = Arc::downgrade(env);
    }

    pub fn file_env(&self) -> Option<EnvRef> {
        self.file_env.lock().upgrade()
    }

    pub fn top_env(&self) -> Option<EnvRef> {
        self.top_env.lock().upgrade()
    }

    pub fn signal(&self) -> Signal {
        self.state.lock().signal
    }

    pub fn raise(&self, signal: Signal) {
        self.state.lock().signal = signal;
    }

    /// Reads and clears the pending signal.
    pub fn take_signal(&self) -> Signal {
        std::mem::take(&mut self.state.lock().signal)
    }

    pub fn interrupt(&self) -> Option<Stmt> {
        self.state.lock().interrupt.clone()
    }

    pub fn set_interrupt(&self, interrupt: Option<Stmt>) {
        self.state.lock().interrupt = interrupt;
    }

    pub fn install_defer(&self, call: DeferredCall) {
        self.state.lock().deferred = Some(call);
    }

    pub fn take_defer(&self) -> Option<DeferredCall> {
        self.state.lock().deferred.take()
    }

    pub fn set_panic(&self, err: RuntimeError) {
        self.state.lock().panic = Some(err);
    }

    pub fn take_panic(&self) -> Option<RuntimeError> {
        self.state.lock().panic.take()
    }

    fn acquire(
        self: &Arc<Self>,
        outer: Option<EnvRef>,
        program: Program,
        ip: usize,
        binds: usize,
        int_binds: usize,
    ) -> EnvRef {
        let mut slots = self.pool.lock().pop().unwrap_or_default();
        slots.resize(binds, int_binds);
        Arc::new(Env {
            binds: slots.binds,
            int_binds: slots.int_binds,
            ip: AtomicUsize::new(ip),
            program,
            outer,
            thread: self.clone(),
        })
    }

    /// Marks the block environment `env` as left and recycles it.
    pub fn release(&self, env: EnvRef) {
        self.globals.popped.fetch_add(1, Ordering::Relaxed);
        self.recycle(env);
    }

    /// Keeps the slots of `env` for reuse when nothing else holds it.
    pub fn recycle(&self, env: EnvRef) {
        let Ok(env) = Arc::try_unwrap(env) else {
            return;
        };
        let mut pool = self.pool.lock();
        if pool.len() < self.globals.options.env_pool_capacity {
            pool.push(Slots {
                binds: env.binds,
                int_binds: env.int_binds,
            });
        }
    }

    pub fn pooled(&self) -> usize {
        self.pool.lock().len()
    }
}

/// Runtime frame of a function call or of a block that declares variables.
/// Scalars live in `int_binds` as raw bits, everything else in `binds`.
pub struct Env {
    binds: Vec<Mutex<Value>>,
    int_binds: Vec<AtomicU64>,
    ip: AtomicUsize,
    program: Program,
    outer: Option<EnvRef>,
    thread: Arc<ThreadGlobals>,
}

impl Env {
    /// Environment of a source file; it has no outer environment.
    pub fn new_file(thread: &Arc<ThreadGlobals>, program: Program, binds: usize, int_binds: usize) -> EnvRef {
        thread.acquire(None, program, 0, binds, int_binds)
    }

    /// Environment of one function call, starting at the first instruction.
    pub fn new_func(
        outer: Option<&EnvRef>,
        thread: &Arc<ThreadGlobals>,
        program: &Program,
        binds: usize,
        int_binds: usize,
    ) -> EnvRef {
        thread.acquire(outer.cloned(), program.clone(), 0, binds, int_binds)
    }

    /// Enters a block: a child environment running the same instruction
    /// stream, positioned at the current instruction.
    pub fn push(self: &EnvRef, binds: usize, int_binds: usize) -> EnvRef {
        self.thread.globals.pushed.fetch_add(1, Ordering::Relaxed);
        trace!(binds, int_binds, ip = self.ip(), "push env");
        self.thread.acquire(
            Some(self.clone()),
            self.program.clone(),
            self.ip(),
            binds,
            int_binds,
        )
    }

    /// Leaves a block entered by `push`, carrying the instruction pointer back out.
    pub fn pop(self: EnvRef) -> EnvRef {
        let Some(outer) = self.outer.clone() else {
            return self;
        };
        outer.set_ip(self.ip());
        self.thread.clone().release(self);
        outer
    }

    pub fn ip(&self) -> usize {
        self.ip.load(Ordering::Relaxed)
    }

    pub fn set_ip(&self, ip: usize) {
        self.ip.store(ip, Ordering::Relaxed);
    }

    pub fn stmt_at(&self, ip: usize) -> Option<Stmt> {
        self.program.stmt(ip)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn outer(&self) -> Option<&EnvRef> {
        self.outer.as_ref()
    }

    /// The environment `n` hops outward.
    pub fn up<'e>(self: &'e EnvRef, n: usize) -> &'e EnvRef {
        let mut env = self;
        for _ in 0..n {
            match &env.outer {
                Some(outer) => env = outer,
                None => break,
            }
        }
        env
    }

    pub fn thread(&self) -> &Arc<ThreadGlobals> {
        &self.thread
    }

    pub fn bind(&self, index: usize) -> Value {
        self.binds
            .get(index)
            .map(|slot| slot.lock().clone())
            .unwrap_or(Value::Nil)
    }

    pub fn set_bind(&self, index: usize, value: Value) {
        if let Some(slot) = self.binds.get(index) {
            *slot.lock() = value;
        }
    }

    pub fn int_bind(&self, index: usize) -> u64 {
        self.int_binds
            .get(index)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn set_int_bind(&self, index: usize, bits: u64) {
        if let Some(slot) = self.int_binds.get(index) {
            slot.store(bits, Ordering::Relaxed);
        }
    }

    pub fn bind_count(&self) -> usize {
        self.binds.len()
    }

    pub fn int_bind_count(&self) -> usize {
        self.int_binds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> Arc<ThreadGlobals> {
        ThreadGlobals::new(Globals::new(Options::default()))
    }

    #[test]
    fn pushed_block_is_reused_after_pop() {
        let thread = thread();
        let file = Env::new_file(&thread, Program::empty(), 1, 0);
        let block = file.push(2, 1);
        block.set_bind(1, Value::Int(3));
        block.set_int_bind(0, 9);
        let back = block.pop();
        assert!(Arc::ptr_eq(&back, &file));
        assert_eq!(thread.pooled(), 1);

        let again = file.push(1, 1);
        assert_eq!(thread.pooled(), 0);
        assert_eq!(again.bind_count(), 1);
        assert_eq!(again.int_bind_count(), 1);
        assert_eq!(again.int_bind(0), 0);
        assert!(again.bind(0).is_nil());
        assert_eq!(thread.globals().env_stats(), (2, 1));
    }

    #[test]
    fn captured_block_is_not_pooled() {
        let thread = thread();
        let file = Env::new_file(&thread, Program::empty(), 0, 0);
        let block = file.push(1, 0);
        let captured = block.clone();
        block.pop();
        assert_eq!(thread.pooled(), 0);
        assert!(captured.outer().is_some());
    }

    #[test]
    fn up_walks_outer_chain() {
        let thread = thread();
        let file = Env::new_file(&thread, Program::empty(), 0, 0);
        let inner = file.push(0, 0).push(0, 0);
        assert!(Arc::ptr_eq(inner.up(2), &file));
        assert!(Arc::ptr_eq(inner.up(5), &file));
    }

    #[test]
    fn child_thread_starts_without_pending_signal() {
        let parent = thread();
        parent.raise(Signal::Panic);
        let child = parent.spawn_child();
        assert_eq!(child.signal(), Signal::None);
        assert!(Arc::ptr_eq(child.globals(), parent.globals()));
    }
}
