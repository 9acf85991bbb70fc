use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A panic raised while running compiled code. It travels to the executor
/// through the panic signal, never through the instruction return value.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Runtime panic: {message}")]
    Panic { message: String },
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },
    #[error("index out of range [{index}] with length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("integer divide by zero")]
    DivisionByZero,
    #[error("assignment to entry in nil map")]
    NilMap,
    #[error("call of nil function")]
    NilFunc,
    #[error("{op} on closed channel")]
    ClosedChannel { op: &'static str },
    #[error("Function expected {expected} arguments but received {received}")]
    ArityMismatch { expected: usize, received: usize },
    #[error("Operation not supported: {message}")]
    Unsupported { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RuntimeError {
    pub fn panic(message: impl Into<String>) -> Self {
        RuntimeError::Panic {
            message: message.into(),
        }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RuntimeError::Unsupported {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            message: message.into(),
        }
    }
}
