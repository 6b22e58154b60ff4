//! Server configuration.

use crate::engine::ExecutionConfig;

/// Configuration shared by every tool invocation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How notebooks are executed
    pub execution: ExecutionConfig,

    /// Longest edge, in pixels, of image outputs sent to the client.
    /// `None` sends images unchanged.
    pub image_max_size: Option<u32>,

    /// Serialize invocations on the same notebook through a sidecar lock file
    pub lock_notebooks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            image_max_size: None,
            lock_notebooks: true,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution configuration.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    /// Downscale image outputs so neither edge exceeds `max_size` pixels.
    #[must_use]
    pub fn with_image_max_size(mut self, max_size: u32) -> Self {
        self.image_max_size = Some(max_size);
        self
    }

    /// Enable or disable notebook locking.
    #[must_use]
    pub fn with_locking(mut self, enabled: bool) -> Self {
        self.lock_notebooks = enabled;
        self
    }
}
