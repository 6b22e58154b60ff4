//! Delegation of notebook execution to an external engine.
//!
//! The crate never runs code itself. An [`ExecutionEngine`] receives a whole
//! document, runs its code cells against a live kernel, and hands back the
//! executed document with outputs and execution counts attached. Exceptions
//! raised by notebook code come back as `error` outputs; only infrastructure
//! failures are returned as [`ExecutionError`].
//!
//! [`NbconvertEngine`] is the production engine: it drives
//! `jupyter nbconvert --execute` (nbclient) in a child process.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use notebook_mcp::engine::{ExecutionConfig, ExecutionEngine, NbconvertEngine};
//! use notebook_mcp::notebook::NotebookDocument;
//!
//! let config = ExecutionConfig::default().with_timeout(Duration::from_secs(120));
//! let engine = NbconvertEngine::new(config);
//!
//! let document = NotebookDocument::load(Path::new("/tmp/analysis.ipynb")).unwrap();
//! let executed = engine.execute(&document, Path::new("/tmp")).unwrap();
//! println!("{} cells executed", executed.cells.len());
//! ```

mod config;
mod nbconvert;

pub use config::ExecutionConfig;
pub use nbconvert::{EngineOutput, NbconvertEngine};

use std::path::Path;

use crate::error::ExecutionError;
use crate::notebook::NotebookDocument;

/// Runs notebook documents against a kernel.
pub trait ExecutionEngine: Send + Sync {
    /// Executes every code cell of `document` in order.
    ///
    /// `working_dir` is the directory the kernel should start in, normally the
    /// directory holding the notebook so relative paths resolve as in Jupyter.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Timeout` if the engine exceeds its deadline and
    /// `ExecutionError::Engine` if it cannot run or returns an unusable result.
    fn execute(
        &self,
        document: &NotebookDocument,
        working_dir: &Path,
    ) -> Result<NotebookDocument, ExecutionError>;
}
