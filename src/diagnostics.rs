use crate::language::errors::CompileError;
use crate::runtime::{error::RuntimeError, InterpreterError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct CompileDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl CompileDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &CompileError) -> Self {
        let label = if err.is_internal() {
            "while compiling this"
        } else {
            "here"
        };
        Self {
            src,
            span: err.span().into(),
            help: err.help().map(str::to_string),
            message: err.to_string(),
            label: label.to_string(),
        }
    }
}

/// Renders a compile error against the file it came from.
pub fn render_compile_error(name: &str, source: &str, err: &CompileError) -> String {
    let src = NamedSource::new(name, source.to_string());
    format!("{:?}", Report::new(CompileDiagnostic::from_error(src, err)))
}

pub fn emit_compile_error(name: &str, source: &str, err: &CompileError) {
    eprintln!("{}", render_compile_error(name, source, err));
}

pub fn report_runtime_error(err: &RuntimeError) {
    error!(error = %err, "goroutine panicked");
    eprintln!("Runtime error: {}", err);
}

pub fn report_interpreter_error(name: &str, source: &str, err: &InterpreterError) {
    match err {
        InterpreterError::Compile(err) => emit_compile_error(name, source, err),
        InterpreterError::Runtime(err) => report_runtime_error(err),
        other => eprintln!("{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::span::Span;

    #[test]
    fn diagnostic_carries_message_and_help() {
        let err = CompileError::DeclareInPost {
            span: Span::new(4, 10),
        };
        let src = NamedSource::new("loop.go", "for i := 0; i < 3; j := 1 {}".to_string());
        let diagnostic = CompileDiagnostic::from_error(src, &err);
        assert_eq!(
            diagnostic.to_string(),
            "invalid for: cannot declare new variables in post statement"
        );
        assert_eq!(
            diagnostic.help.as_deref(),
            Some("move the declaration into the loop init")
        );
        assert_eq!(diagnostic.span, SourceSpan::from((4, 6)));
    }

    #[test]
    fn rendered_report_names_the_file() {
        let err = CompileError::Undefined {
            name: "x".into(),
            span: Span::new(0, 1),
        };
        let rendered = render_compile_error("main.go", "x", &err);
        assert!(rendered.contains("undefined: x"));
        assert!(rendered.contains("main.go"));
    }
}
