//! MCP server handler implementation.

use std::error::Error as _;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
};
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::content::to_contents;
use super::requests::{
    AddCellRequest, DeleteCellRequest, EditCellRequest, ExecuteNotebookRequest,
    ReadNotebookRequest,
};
use super::tools::ToolContext;
use crate::engine::ExecutionEngine;
use crate::error::{NotebookError, ServerError};
use crate::notebook::Output;

/// The MCP server exposing notebook tools.
#[derive(Clone)]
pub struct NotebookServer {
    context: Arc<ToolContext>,
    tool_router: ToolRouter<Self>,
}

impl NotebookServer {
    /// Create a new notebook server executing through `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn ExecutionEngine>, config: ServerConfig) -> Self {
        Self {
            context: Arc::new(ToolContext::new(engine, config)),
            tool_router: Self::tool_router(),
        }
    }

    /// Runs one tool invocation on the blocking pool and converts the result.
    async fn run_tool<F>(&self, tool: &'static str, f: F) -> Result<CallToolResult, McpError>
    where
        F: FnOnce(&ToolContext) -> Result<Vec<Output>, NotebookError> + Send + 'static,
    {
        debug!(tool, "Tool invoked");
        let context = Arc::clone(&self.context);
        let image_max_size = context.config().image_max_size;

        let result = tokio::task::spawn_blocking(move || f(&context))
            .await
            .map_err(|e| McpError::internal_error(format!("{tool} task failed: {e}"), None))?;

        match result {
            Ok(outputs) => Ok(CallToolResult::success(to_contents(
                outputs,
                image_max_size,
            ))),
            Err(e) => {
                warn!(tool, error = %e, "Tool failed");
                Ok(CallToolResult::error(vec![Content::text(error_chain(&e))]))
            }
        }
    }
}

#[tool_router]
impl NotebookServer {
    #[tool(
        description = "Read a Jupyter notebook. For every cell returns a marker line (index, type, id, execution count), the cell source, and the stored outputs (text or images)."
    )]
    pub async fn read_notebook_with_outputs(
        &self,
        Parameters(request): Parameters<ReadNotebookRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool("read_notebook_with_outputs", move |ctx| {
            ctx.read_notebook(&request.notebook_path)
        })
        .await
    }

    #[tool(
        description = "Add a cell to a Jupyter notebook at a position (\"end\" or a zero-based index). Code cells are executed and their outputs returned; the notebook is saved."
    )]
    pub async fn add_cell(
        &self,
        Parameters(request): Parameters<AddCellRequest>,
    ) -> Result<CallToolResult, McpError> {
        let position = match request.position() {
            Ok(position) => position,
            Err(message) => return Ok(CallToolResult::error(vec![Content::text(message)])),
        };

        self.run_tool("add_cell", move |ctx| {
            ctx.add_cell(
                &request.notebook_path,
                request.cell_type(),
                request.source.as_deref().unwrap_or_default(),
                position,
            )
        })
        .await
    }

    #[tool(
        description = "Replace the source of the code cell with the given id, execute it and return its outputs; the notebook is saved. Returns a notice if no code cell has that id."
    )]
    pub async fn edit_cell(
        &self,
        Parameters(request): Parameters<EditCellRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool("edit_cell", move |ctx| {
            ctx.edit_cell(
                &request.notebook_path,
                &request.cell_id,
                request.source.as_deref().unwrap_or_default(),
            )
        })
        .await
    }

    #[tool(
        description = "Remove the cell with the given id from a Jupyter notebook and save it. Returns a notice if no cell has that id."
    )]
    pub async fn delete_cell(
        &self,
        Parameters(request): Parameters<DeleteCellRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool("delete_cell", move |ctx| {
            ctx.delete_cell(&request.notebook_path, &request.cell_id)
        })
        .await
    }

    #[tool(
        description = "Execute a whole Jupyter notebook, optionally injecting parameters into cells tagged 'parameters', save it, and return every cell's marker and outputs."
    )]
    pub async fn execute_notebook(
        &self,
        Parameters(request): Parameters<ExecuteNotebookRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_tool("execute_notebook", move |ctx| {
            ctx.execute_notebook(
                &request.notebook_path,
                &request.parameters.unwrap_or_default(),
            )
        })
        .await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for NotebookServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Jupyter notebook tools. Read notebooks with their outputs, add, edit or \
                 delete cells, and execute notebooks. Paths should be absolute. Cells are \
                 addressed by id (shown in read_notebook_with_outputs markers); edited and \
                 added code cells are executed and the notebook is saved."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Renders an error with its chain of causes on one line.
fn error_chain(error: &NotebookError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Run the MCP server.
///
/// This function starts the server with stdio transport and waits for it to complete.
///
/// # Errors
///
/// Returns error if server initialization or transport fails.
pub async fn run(config: ServerConfig, engine: Arc<dyn ExecutionEngine>) -> crate::error::Result<()> {
    info!("Starting notebook MCP server");
    debug!(?config, "Using stdio transport");

    let server = NotebookServer::new(engine, config);

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| ServerError::InitializationFailed(e.to_string()))?;

    info!("Server initialized, waiting for requests");

    service
        .waiting()
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))?;

    info!("Server shutdown complete");
    Ok(())
}
