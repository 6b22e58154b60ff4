//! notebook-mcp - Jupyter notebook tools for AI agents over MCP.
//!
//! This crate lets an agent read notebooks with their outputs, add, edit and
//! delete cells, and execute notebooks through an external Jupyter engine.
//! Notebooks are nbformat v4 JSON files; fields this crate does not model are
//! preserved across edits.
//!
//! # Platform Requirements
//!
//! - `jupyter nbconvert` 6.0+ on `PATH` (or configured with `--jupyter`)
//! - an installed kernel for the notebooks being executed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use notebook_mcp::engine::NbconvertEngine;
//! use notebook_mcp::{server, system};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = server::ServerConfig::default();
//!
//!     // Validate the execution engine
//!     system::check_all(&config.execution)?;
//!
//!     // Start MCP server
//!     let engine = Arc::new(NbconvertEngine::new(config.execution.clone()));
//!     server::run(config, engine).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod notebook;
pub mod server;
pub mod system;

// Re-export commonly used types
pub use engine::{ExecutionConfig, ExecutionEngine, NbconvertEngine};
pub use error::{Error, ExecutionError, NotebookError, Result};
pub use notebook::{Cell, CellPosition, NotebookManager, Output};
pub use server::{NotebookServer, ServerConfig};
