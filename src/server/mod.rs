//! MCP server implementation.
//!
//! This module provides the MCP server that handles tool calls from AI agents.

mod config;
mod content;
mod handler;
mod requests;
mod tools;

pub use config::ServerConfig;
pub use content::{thumbnail_png, to_contents};
pub use handler::{NotebookServer, run};
pub use requests::{
    AddCellRequest, DeleteCellRequest, EditCellRequest, ExecuteNotebookRequest, PositionArg,
    ReadNotebookRequest,
};
pub use tools::{NO_OUTPUT, ToolContext, cell_marker};
