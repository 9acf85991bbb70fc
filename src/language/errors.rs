use crate::language::span::Span;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Fatal error raised while compiling one function. Compilation of the
/// enclosing function stops at the first one.
#[derive(Clone, Debug, Error)]
pub enum CompileError {
    #[error("unimplemented statement: {node} <{kind}>")]
    UnimplementedStatement {
        node: String,
        kind: &'static str,
        span: Span,
    },
    #[error("unimplemented branch statement: {keyword}")]
    UnimplementedBranch { keyword: &'static str, span: Span },
    #[error("misplaced {clause}: not inside switch or select")]
    MisplacedCase { clause: &'static str, span: Span },
    #[error("misplaced fallthrough: {reason}")]
    MisplacedFallthrough { reason: &'static str, span: Span },
    #[error("{keyword} label not defined: {label}")]
    UndefinedLabel {
        keyword: &'static str,
        label: String,
        span: Span,
    },
    #[error("{keyword} outside {context}")]
    OutsideContext {
        keyword: &'static str,
        context: &'static str,
        span: Span,
    },
    #[error("invalid for: cannot declare new variables in post statement")]
    DeclareInPost { span: Span },
    #[error("return: expecting {expected} expressions, found {found}")]
    ReturnArity {
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("incompatible types in assignment: {expected} = {actual}")]
    IncompatibleTypes {
        expected: String,
        actual: String,
        span: Span,
    },
    #[error("undefined: {name}")]
    Undefined { name: String, span: Span },
    #[error("{name} redeclared in this block")]
    Redeclared { name: String, span: Span },
    #[error("{message}")]
    Invalid { message: String, span: Span },
    #[error("internal error: {message}")]
    Internal { message: String, span: Span },
}

impl CompileError {
    pub fn invalid(message: impl Into<String>, span: Span) -> Self {
        CompileError::Invalid {
            message: message.into(),
            span,
        }
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        CompileError::Internal {
            message: message.into(),
            span,
        }
    }

    pub fn incompatible(expected: impl ToString, actual: impl ToString, span: Span) -> Self {
        CompileError::IncompatibleTypes {
            expected: expected.to_string(),
            actual: actual.to_string(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            CompileError::UnimplementedStatement { span, .. }
            | CompileError::UnimplementedBranch { span, .. }
            | CompileError::MisplacedCase { span, .. }
            | CompileError::MisplacedFallthrough { span, .. }
            | CompileError::UndefinedLabel { span, .. }
            | CompileError::OutsideContext { span, .. }
            | CompileError::DeclareInPost { span }
            | CompileError::ReturnArity { span, .. }
            | CompileError::IncompatibleTypes { span, .. }
            | CompileError::Undefined { span, .. }
            | CompileError::Redeclared { span, .. }
            | CompileError::Invalid { span, .. }
            | CompileError::Internal { span, .. } => *span,
        }
    }

    /// Internal-consistency errors point at a bug in the compiler, not in the program.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal { .. })
    }

    pub fn help(&self) -> Option<&'static str> {
        match self {
            CompileError::OutsideContext { keyword: "break", .. } => {
                Some("break must appear inside a for, switch or select body")
            }
            CompileError::DeclareInPost { .. } => Some("move the declaration into the loop init"),
            CompileError::ReturnArity { .. } => {
                Some("a bare return is only allowed when the results are named")
            }
            CompileError::Internal { .. } => Some("this is a bug in the compiler"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_label_mentions_keyword_and_label() {
        let err = CompileError::UndefinedLabel {
            keyword: "break",
            label: "outer".into(),
            span: Span::new(3, 8),
        };
        assert_eq!(err.to_string(), "break label not defined: outer");
        assert_eq!(err.span(), Span::new(3, 8));
    }

    #[test]
    fn outside_context_matches_go_wording() {
        let err = CompileError::OutsideContext {
            keyword: "break",
            context: "for/switch",
            span: Span::default(),
        };
        assert_eq!(err.to_string(), "break outside for/switch");
        assert!(err.help().is_some());
    }

    #[test]
    fn internal_errors_are_flagged() {
        let err = CompileError::internal("bind count mismatch", Span::default());
        assert!(err.is_internal());
        assert!(err.to_string().starts_with("internal error"));
    }
}
