use std::env;

/// Default number of block environments kept for reuse per goroutine.
pub const DEFAULT_ENV_POOL_CAPACITY: usize = 32;

/// Interpreter settings. Hosts build them explicitly or read them from the
/// `GOFLOW_*` environment variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Log every executed instruction at `trace` level.
    pub trace: bool,
    pub env_pool_capacity: usize,
    /// Collect `print`/`println` output instead of writing it to stdout.
    pub capture_output: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trace: false,
            env_pool_capacity: DEFAULT_ENV_POOL_CAPACITY,
            capture_output: false,
        }
    }
}

impl Options {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trace: env::var("GOFLOW_TRACE")
                .map(|value| is_truthy(&value))
                .unwrap_or(defaults.trace),
            env_pool_capacity: env::var("GOFLOW_ENV_POOL")
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(defaults.env_pool_capacity),
            capture_output: env::var("GOFLOW_CAPTURE_OUTPUT")
                .map(|value| is_truthy(&value))
                .unwrap_or(defaults.capture_output),
        }
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_env_pool_capacity(mut self, capacity: usize) -> Self {
        self.env_pool_capacity = capacity;
        self
    }

    pub fn capturing_output(mut self) -> Self {
        self.capture_output = true;
        self
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn builders_override_defaults() {
        let options = Options::default()
            .with_trace(true)
            .with_env_pool_capacity(0)
            .capturing_output();
        assert!(options.trace);
        assert_eq!(options.env_pool_capacity, 0);
        assert!(options.capture_output);
    }

    #[test]
    fn environment_overrides_pool_capacity() {
        std::env::set_var("GOFLOW_ENV_POOL", " 4 ");
        let options = Options::from_env();
        std::env::remove_var("GOFLOW_ENV_POOL");
        assert_eq!(options.env_pool_capacity, 4);
    }
}
