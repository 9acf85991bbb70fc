//! Instruction stream shared by one function body and all of its nested blocks.

use crate::language::span::Span;
use crate::runtime::{
    environment::{EnvRef, Signal},
    error::{RuntimeError, RuntimeResult},
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One compiled instruction: runs against an environment and names the
/// instruction to run next together with the environment to run it in.
/// `None` stops the trampoline.
#[derive(Clone)]
pub struct Stmt(Arc<dyn Fn(EnvRef) -> (Option<Stmt>, EnvRef) + Send + Sync>);

impl Stmt {
    pub fn run(&self, env: EnvRef) -> (Option<Stmt>, EnvRef) {
        (self.0)(env)
    }
}

impl std::fmt::Debug for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Stmt")
    }
}

pub fn stmt<F>(f: F) -> Stmt
where
    F: Fn(EnvRef) -> (Option<Stmt>, EnvRef) + Send + Sync + 'static,
{
    Stmt(Arc::new(f))
}

/// Handle to the stream under construction. Cloning shares the stream, so
/// nested block compilers append to the same list and IPs stay global to the
/// function.
#[derive(Clone, Default)]
pub struct Code {
    inner: Rc<RefCell<CodeInner>>,
}

#[derive(Default)]
struct CodeInner {
    list: Vec<Stmt>,
    spans: Vec<Span>,
    with_defers: bool,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&self, stmt: Stmt, span: Span) {
        let mut inner = self.inner.borrow_mut();
        inner.list.push(stmt);
        inner.spans.push(span);
    }

    /// Drops every instruction from `len` onward. Used to discard code that
    /// was compiled only to surface errors.
    pub fn truncate(&self, len: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.list.truncate(len);
        inner.spans.truncate(len);
    }

    pub fn mark_defers(&self) {
        self.inner.borrow_mut().with_defers = true;
    }

    pub fn with_defers(&self) -> bool {
        self.inner.borrow().with_defers
    }

    pub fn freeze(&self) -> Program {
        let inner = self.inner.borrow();
        Program {
            inner: Arc::new(ProgramInner {
                stmts: inner.list.clone(),
                spans: inner.spans.clone(),
                with_defers: inner.with_defers,
            }),
        }
    }
}

/// Immutable instruction stream of a compiled function, shared read-only by
/// every environment that runs it.
#[derive(Clone)]
pub struct Program {
    inner: Arc<ProgramInner>,
}

struct ProgramInner {
    stmts: Vec<Stmt>,
    spans: Vec<Span>,
    with_defers: bool,
}

impl Program {
    pub fn empty() -> Self {
        Code::new().freeze()
    }

    pub fn stmt(&self, ip: usize) -> Option<Stmt> {
        self.inner.stmts.get(ip).cloned()
    }

    pub fn span(&self, ip: usize) -> Option<Span> {
        self.inner.spans.get(ip).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.stmts.is_empty()
    }

    pub fn with_defers(&self) -> bool {
        self.inner.with_defers
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("len", &self.len())
            .field("with_defers", &self.with_defers())
            .finish()
    }
}

/// Jump destination that may not be known when the jump is compiled.
/// Written once by the compiler, read by the instructions that captured it.
#[derive(Clone, Debug, Default)]
pub struct JumpTarget(Arc<AtomicUsize>);

impl JumpTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ip: usize) {
        self.0.store(ip, Ordering::Release);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// `[binds, int_binds]` of a block, patched after the block is compiled and
/// read by the instruction that allocates its environment.
#[derive(Clone, Debug, Default)]
pub struct BindCounts(Arc<[AtomicUsize; 2]>);

impl BindCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, binds: usize, int_binds: usize) {
        self.0[0].store(binds, Ordering::Release);
        self.0[1].store(int_binds, Ordering::Release);
    }

    pub fn get(&self) -> (usize, usize) {
        (
            self.0[0].load(Ordering::Acquire),
            self.0[1].load(Ordering::Acquire),
        )
    }
}

/// Moves to the next instruction in the same environment.
pub fn advance(env: EnvRef) -> (Option<Stmt>, EnvRef) {
    let ip = env.ip() + 1;
    env.set_ip(ip);
    (env.stmt_at(ip), env)
}

pub fn goto(env: EnvRef, ip: usize) -> (Option<Stmt>, EnvRef) {
    env.set_ip(ip);
    (env.stmt_at(ip), env)
}

/// Hops `upn` environments outward, releasing each one left behind, then
/// jumps to `ip` in the environment reached.
pub fn jump_out(mut env: EnvRef, upn: usize, ip: usize) -> (Option<Stmt>, EnvRef) {
    for _ in 0..upn {
        env = match env.outer() {
            Some(outer) => {
                let outer = outer.clone();
                let thread = env.thread().clone();
                thread.release(env);
                outer
            }
            None => break,
        };
    }
    goto(env, ip)
}

/// Raises `signal` on the running thread and transfers to its interrupt.
pub fn interrupt(env: EnvRef, signal: Signal) -> (Option<Stmt>, EnvRef) {
    let thread = env.thread().clone();
    thread.raise(signal);
    (thread.interrupt(), env)
}

/// Instruction running `f` for its effect, then moving on; a failure
/// becomes a panic.
pub fn effect<F>(f: F) -> Stmt
where
    F: Fn(&EnvRef) -> RuntimeResult<()> + Send + Sync + 'static,
{
    stmt(move |env| match f(&env) {
        Ok(()) => advance(env),
        Err(err) => raise(env, err),
    })
}

/// Turns a runtime failure into a pending panic.
pub fn raise(env: EnvRef, err: RuntimeError) -> (Option<Stmt>, EnvRef) {
    env.thread().set_panic(err);
    interrupt(env, Signal::Panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_discards_instructions_and_positions() {
        let code = Code::new();
        for start in 0..4 {
            code.append(stmt(advance), Span::new(start, start + 1));
        }
        code.truncate(2);
        let program = code.freeze();
        assert_eq!(program.len(), 2);
        assert_eq!(program.span(1), Some(Span::new(1, 2)));
        assert!(program.stmt(2).is_none());
    }

    #[test]
    fn clones_share_the_stream() {
        let code = Code::new();
        let nested = code.clone();
        nested.append(stmt(advance), Span::default());
        nested.mark_defers();
        assert_eq!(code.len(), 1);
        assert!(code.with_defers());
    }

    #[test]
    fn instructions_chain_through_the_trampoline() {
        use crate::config::Options;
        use crate::runtime::environment::{Env, Globals, ThreadGlobals};

        let code = Code::new();
        code.append(stmt(advance), Span::default());
        code.append(stmt(|env| goto(env, 7)), Span::default());
        let program = code.freeze();
        let thread = ThreadGlobals::new(Globals::new(Options::default()));
        let env = Env::new_file(&thread, program.clone(), 0, 0);

        let Some(first) = program.stmt(0) else {
            panic!("missing first instruction");
        };
        let (next, env) = first.run(env);
        assert_eq!(env.ip(), 1);
        let (next, env) = next.expect("second instruction").run(env);
        assert!(next.is_none());
        assert_eq!(env.ip(), 7);
    }

    #[test]
    fn jump_target_is_visible_through_clones() {
        let target = JumpTarget::new();
        let captured = target.clone();
        target.set(17);
        assert_eq!(captured.get(), 17);
    }
}
