use crate::config::Options;
use crate::language::{
    ast::File,
    compiler::{compile_file, Bind},
    errors::CompileError,
    types::FuncType,
};
use crate::runtime::{
    environment::{DeferredCall, Env, EnvRef, Globals, Signal, ThreadGlobals},
    error::{RuntimeError, RuntimeResult},
    value::{FuncValue, Value},
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Runs `env` from its current instruction until the chain stops without a
/// pending defer. Deferred calls run last-in first-out once the function is
/// done, whether it returned normally or panicked.
pub fn exec(env: EnvRef) -> RuntimeResult<()> {
    let thread = env.thread().clone();
    let tracing_steps = thread.globals().options.trace;
    let root = env.clone();
    thread.set_interrupt(None);

    let mut deferred: Vec<DeferredCall> = Vec::new();
    let mut next = env.stmt_at(env.ip());
    let mut env = env;
    let mut outcome = loop {
        while let Some(stmt) = next {
            if tracing_steps {
                trace!(ip = env.ip(), span = ?env.program().span(env.ip()), "step");
            }
            (next, env) = stmt.run(env);
        }
        match thread.take_signal() {
            Signal::None | Signal::Return => break Ok(()),
            Signal::Defer => match thread.take_defer() {
                Some(call) => {
                    deferred.push(call);
                    next = env.stmt_at(env.ip());
                }
                None => break Err(RuntimeError::internal("defer signal without a pending call")),
            },
            Signal::Panic => {
                break Err(thread
                    .take_panic()
                    .unwrap_or_else(|| RuntimeError::internal("panic signal without a pending error")))
            }
        }
    };
    unwind(env, &root);

    while let Some(call) = deferred.pop() {
        if let Err(err) = call(&thread) {
            if let Err(previous) = &outcome {
                warn!(error = %previous, "panic replaced by a panic in a deferred call");
            }
            outcome = Err(err);
        }
    }
    outcome
}

/// Leaves every block environment still entered below `root`.
fn unwind(mut env: EnvRef, root: &EnvRef) {
    while !Arc::ptr_eq(&env, root) {
        let Some(outer) = env.outer().cloned() else {
            break;
        };
        let thread = env.thread().clone();
        thread.release(env);
        env = outer;
    }
}

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("no file loaded")]
    NotLoaded,
    #[error("undefined function: {name}")]
    UndefinedFunction { name: String },
}

/// Host-facing entry point: registers natives, compiles one file, runs its
/// initialisers and calls its functions.
pub struct Interpreter {
    globals: Arc<Globals>,
    thread: Arc<ThreadGlobals>,
    natives: Vec<(String, FuncValue)>,
    file_env: Option<EnvRef>,
    symbols: HashMap<String, Bind>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Interpreter {
    pub fn new(options: Options) -> Self {
        let globals = Globals::new(options);
        let thread = ThreadGlobals::new(globals.clone());
        Self {
            globals,
            thread,
            natives: Vec::new(),
            file_env: None,
            symbols: HashMap::new(),
        }
    }

    /// Makes a host function visible to files loaded afterwards.
    pub fn define_native<F>(&mut self, name: &str, ty: FuncType, imp: F)
    where
        F: Fn(&Arc<ThreadGlobals>, Vec<Value>) -> RuntimeResult<Vec<Value>> + Send + Sync + 'static,
    {
        let value = FuncValue::new(Arc::new(ty), Arc::new(imp));
        self.natives.push((name.to_string(), value));
    }

    pub fn load(&mut self, file: &File) -> Result<(), InterpreterError> {
        let natives: Vec<_> = self
            .natives
            .iter()
            .map(|(name, func)| (name.clone(), func.ty.clone()))
            .collect();
        let compiled = compile_file(file, &natives)?;
        debug!(
            instructions = compiled.program.len(),
            binds = compiled.binds,
            int_binds = compiled.int_binds,
            "loaded file"
        );
        let env = Env::new_file(&self.thread, compiled.program, compiled.binds, compiled.int_binds);
        self.thread.set_file_env(&env);
        for (name, func) in &self.natives {
            if let Some(bind) = compiled.symbols.get(name) {
                bind.store(&env, Value::Func(func.clone()));
            }
        }
        exec(env.clone())?;
        self.file_env = Some(env);
        self.symbols = compiled.symbols;
        Ok(())
    }

    /// Current value of a package-level variable or function.
    pub fn global(&self, name: &str) -> Option<Value> {
        let env = self.file_env.as_ref()?;
        self.symbols.get(name).map(|bind| bind.load(env))
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, InterpreterError> {
        if self.file_env.is_none() {
            return Err(InterpreterError::NotLoaded);
        }
        match self.global(name) {
            Some(Value::Func(func)) => Ok(func.call(&self.thread, args)?),
            _ => Err(InterpreterError::UndefinedFunction {
                name: name.to_string(),
            }),
        }
    }

    /// Calls `main`, then waits for every goroutine it started.
    pub fn run(&self) -> Result<(), InterpreterError> {
        let outcome = self.call("main", Vec::new()).map(|_| ());
        self.wait();
        outcome
    }

    pub fn wait(&self) {
        self.globals.tasks().join_all();
    }

    pub fn take_output(&self) -> String {
        self.globals.take_output()
    }

    pub fn globals(&self) -> &Arc<Globals> {
        &self.globals
    }

    pub fn env_stats(&self) -> (usize, usize) {
        self.globals.env_stats()
    }
}
