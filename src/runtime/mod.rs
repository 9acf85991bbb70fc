pub mod async_runtime;
pub mod channel;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod value;

pub use interpreter::{exec, Interpreter, InterpreterError};
