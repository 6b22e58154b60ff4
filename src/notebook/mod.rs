//! In-memory access to Jupyter notebooks (nbformat v4).
//!
//! The module is layered leaves first:
//!
//! - [`output`]: normalizes one raw output record into an [`Output`] (text or image)
//! - [`cell`]: turns one raw cell record into a structured [`Cell`]
//! - [`document`]: the raw, lossless on-disk document and its persistence
//! - [`manager`]: the [`NotebookManager`] facade owning one open document
//! - [`lock`]: optional advisory locking around a notebook path
//!
//! Raw records are kept as `serde_json` maps so fields this crate does not
//! understand survive a load/mutate/save cycle untouched.
//!
//! # Example
//!
//! ```no_run
//! use notebook_mcp::notebook::{CellPosition, NotebookManager};
//!
//! let mut manager = NotebookManager::open("/tmp/analysis.ipynb").unwrap();
//! let index = manager
//!     .insert_cell("markdown", "# Results", CellPosition::End)
//!     .unwrap();
//! println!("inserted at {index}");
//! manager.save(None).unwrap();
//! ```

mod cell;
mod document;
mod lock;
mod manager;
mod output;

pub use cell::{Cell, CellKind, CellType, is_parameters_cell, new_cell_id};
pub use document::{NotebookDocument, RawCell, SUPPORTED_NBFORMAT};
pub use lock::NotebookLock;
pub use manager::{CellPosition, NotebookManager, python_literal};
pub use output::{Output, PNG_MIME_TYPE};

use serde_json::Value;

/// Joins a multiline field stored either as one string or as a list of
/// line fragments.
///
/// Returns `None` when the value is neither; non-string list entries are skipped.
#[must_use]
pub fn join_fragments(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => Some(parts.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Splits text into line fragments that keep their line endings, the way
/// nbformat stores multiline strings on disk.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_owned).collect()
}
