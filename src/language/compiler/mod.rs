//! Compiles statements into chains of closures that run against `Env` frames.
//!
//! One `Comp` frame exists per lexical scope. Frames that declare variables
//! push a runtime environment; the others cost nothing at run time and
//! contribute zero hops when identifiers are resolved through them.

use crate::language::{
    ast::*,
    errors::{CompileError, CompileResult},
    span::Span,
    types::{FuncType, Type, TypeExpr},
};
use crate::runtime::{
    environment::{Env, EnvRef, Signal},
    error::{RuntimeError, RuntimeResult},
    value::{binary_op, unary_op, FuncValue, MapValue, SliceValue, Value},
};
use code::{
    advance, effect, goto, interrupt, jump_out, raise, stmt, BindCounts, Code, JumpTarget, Stmt,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

pub mod code;

mod assign;
mod builtins;
mod call;
mod closures;
mod decl;
mod emit;
mod expr;
mod range;
mod resolve;
mod scopes;
mod select;
mod switch;

pub use closures::FuncTemplate;
pub use decl::{compile_file, CompiledFile};
pub use expr::{CompiledExpr, Pred, XFun, XVFun};
pub use scopes::{Bind, BindClass, Comp, Symbol};

#[cfg(test)]
mod tests;
