//! Error types for the notebook MCP server.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the application.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// System requirements not met
    #[error("System requirements check failed")]
    #[diagnostic(code(nbmcp::system::requirements))]
    SystemRequirements(#[from] SystemRequirementsError),

    /// Notebook access failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Notebook(#[from] NotebookError),

    /// MCP server error
    #[error("MCP server error")]
    #[diagnostic(code(nbmcp::server))]
    Server(#[from] ServerError),

    /// I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(nbmcp::io))]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening, mutating, executing or saving a notebook.
#[derive(Error, Debug, Diagnostic)]
pub enum NotebookError {
    /// The notebook path does not exist
    #[error("Notebook not found: {}", .path.display())]
    #[diagnostic(
        code(nbmcp::notebook::not_found),
        help("Pass an absolute path to an existing .ipynb file")
    )]
    NotFound { path: PathBuf },

    /// The file is not a supported notebook document
    #[error("Failed to parse notebook {}: {reason}", .path.display())]
    #[diagnostic(
        code(nbmcp::notebook::parse),
        help("Only nbformat v4 JSON documents are supported")
    )]
    Parse { path: PathBuf, reason: String },

    /// The notebook file exists but could not be read
    #[error("Failed to read notebook {}", .path.display())]
    #[diagnostic(code(nbmcp::notebook::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Insert requested with a cell type outside code/markdown/raw
    #[error("Unsupported cell type: {cell_type}")]
    #[diagnostic(
        code(nbmcp::notebook::cell_type),
        help("Use one of: code, markdown, raw")
    )]
    UnsupportedCellType { cell_type: String },

    /// A cell index beyond the end of the document
    #[error("Cell index {index} is out of range (notebook has {len} cells)")]
    #[diagnostic(code(nbmcp::notebook::cell_index))]
    CellIndexOutOfRange { index: usize, len: usize },

    /// Persisting the notebook failed
    #[error("Failed to write notebook: {context}")]
    #[diagnostic(code(nbmcp::notebook::write))]
    Write {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The advisory notebook lock could not be taken
    #[error("Failed to lock notebook: {context}")]
    #[diagnostic(code(nbmcp::notebook::lock))]
    Lock {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The execution engine failed (not an error raised by notebook code)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
}

/// Infrastructure-level failures of the external execution engine.
///
/// Exceptions raised by notebook code are not represented here; they are
/// captured as `error` outputs on the executed cell.
#[derive(Error, Debug, Diagnostic)]
pub enum ExecutionError {
    /// Execution exceeded the configured deadline
    #[error("Notebook execution timed out after {} seconds", .timeout.as_secs())]
    #[diagnostic(
        code(nbmcp::execution::timeout),
        help("Raise the limit with --timeout or split long-running cells")
    )]
    Timeout { timeout: Duration },

    /// The engine could not be started or reported a failure
    #[error("Execution engine error: {reason}")]
    #[diagnostic(code(nbmcp::execution::engine))]
    Engine { reason: String },

    /// Scratch files for the engine could not be prepared
    #[error("Failed to prepare execution workspace: {context}")]
    #[diagnostic(code(nbmcp::execution::workspace))]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to system requirements validation.
#[derive(Error, Debug, Diagnostic)]
pub enum SystemRequirementsError {
    /// The jupyter launcher is not installed
    #[error("Jupyter command '{command}' was not found")]
    #[diagnostic(
        code(nbmcp::system::jupyter_missing),
        help("Install it with: pip install jupyter nbconvert ipykernel")
    )]
    JupyterMissing {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// nbconvert is not available through the launcher
    #[error("'{command} nbconvert' is unavailable: {stderr}")]
    #[diagnostic(
        code(nbmcp::system::nbconvert_missing),
        help("Install it with: pip install nbconvert")
    )]
    NbconvertUnavailable { command: String, stderr: String },

    /// The engine answered with an unparsable version string
    #[error("Could not parse nbconvert version from '{output}'")]
    #[diagnostic(code(nbmcp::system::version))]
    UnparsableVersion { output: String },

    /// nbconvert is older than the minimum version
    #[error("nbconvert {found} is below minimum required {required}")]
    #[diagnostic(
        code(nbmcp::system::nbconvert_version),
        help("Upgrade with: pip install -U nbconvert")
    )]
    NbconvertTooOld { found: String, required: String },
}

/// Failures while downscaling an image output.
#[derive(Error, Debug, Diagnostic)]
pub enum ThumbnailError {
    /// The payload is not valid base64
    #[error("Image payload is not valid base64")]
    #[diagnostic(code(nbmcp::image::base64))]
    Base64(#[from] base64::DecodeError),

    /// The payload could not be decoded or re-encoded as PNG
    #[error("Failed to process PNG image")]
    #[diagnostic(code(nbmcp::image::png))]
    Image(#[from] image::ImageError),
}

/// Errors related to the MCP server.
#[derive(Error, Debug, Diagnostic)]
pub enum ServerError {
    /// Failed to initialize server
    #[error("Failed to initialize MCP server: {0}")]
    #[diagnostic(code(nbmcp::server::init))]
    InitializationFailed(String),

    /// Transport error
    #[error("Transport error: {0}")]
    #[diagnostic(code(nbmcp::server::transport))]
    Transport(String),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
