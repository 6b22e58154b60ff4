//! Configuration for the execution engine.

use std::collections::HashMap;
use std::time::Duration;

/// Configuration for [`NbconvertEngine`](super::NbconvertEngine).
///
/// Use the builder methods to customize execution.
///
/// # Example
///
/// ```
/// use notebook_mcp::engine::ExecutionConfig;
/// use std::time::Duration;
///
/// let config = ExecutionConfig::default()
///     .with_jupyter_command("/opt/conda/bin/jupyter")
///     .with_kernel_name("python3")
///     .with_timeout(Duration::from_secs(60))
///     .with_env("MPLBACKEND", "Agg");
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// The `jupyter` launcher to invoke.
    pub jupyter_command: String,

    /// Kernel to run; `None` uses the kernel named in the notebook metadata.
    pub kernel_name: Option<String>,

    /// Maximum time a single cell may run.
    pub timeout: Duration,

    /// Maximum time to wait for the kernel to start.
    pub startup_timeout: Duration,

    /// Extra environment variables for the engine process.
    pub env_vars: HashMap<String, String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jupyter_command: String::from("jupyter"),
            kernel_name: None,
            timeout: Duration::from_secs(600),
            startup_timeout: Duration::from_secs(60),
            env_vars: HashMap::new(),
        }
    }
}

impl ExecutionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `jupyter` launcher.
    #[must_use]
    pub fn with_jupyter_command(mut self, command: impl Into<String>) -> Self {
        self.jupyter_command = command.into();
        self
    }

    /// Forces a kernel instead of the one named by the notebook.
    #[must_use]
    pub fn with_kernel_name(mut self, kernel_name: impl Into<String>) -> Self {
        self.kernel_name = Some(kernel_name.into());
        self
    }

    /// Sets the per-cell execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the kernel startup timeout.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Adds an environment variable for the engine process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Hard deadline for a run over `code_cells` code cells.
    ///
    /// Per-cell limits are enforced by the engine itself; this bounds the
    /// whole child process in case the engine hangs outside a cell.
    #[must_use]
    pub fn process_deadline(&self, code_cells: usize) -> Duration {
        let cells = u32::try_from(code_cells.max(1)).unwrap_or(u32::MAX);
        self.startup_timeout
            .saturating_add(self.timeout.saturating_mul(cells))
    }
}
