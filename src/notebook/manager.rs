//! The notebook access facade.
//!
//! A [`NotebookManager`] owns one document loaded from disk. Every tool call
//! opens a fresh manager, mutates, executes, saves and drops it; nothing is
//! cached between calls.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument, trace};

use super::cell::{Cell, CellType, is_parameters_cell, new_cell_id};
use super::document::NotebookDocument;
use super::split_lines;
use crate::engine::ExecutionEngine;
use crate::error::{ExecutionError, NotebookError};

/// Where to insert a new cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CellPosition {
    /// Append after the last cell.
    #[default]
    End,
    /// Insert at this zero-based index; past-the-end indices append.
    Index(usize),
}

impl FromStr for CellPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("end") {
            return Ok(Self::End);
        }
        match s.parse::<i64>() {
            Ok(n) => Ok(Self::from(n)),
            Err(_) => Err(format!(
                "invalid cell position '{s}': expected \"end\" or a zero-based index"
            )),
        }
    }
}

impl From<i64> for CellPosition {
    /// Negative values mean "end", matching the `-1` convention of Jupyter tooling.
    fn from(n: i64) -> Self {
        usize::try_from(n).map_or(Self::End, Self::Index)
    }
}

/// An open notebook.
#[derive(Debug, Clone)]
pub struct NotebookManager {
    path: PathBuf,
    document: NotebookDocument,
}

impl NotebookManager {
    /// Opens and parses the notebook at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::NotFound` if the path does not exist and
    /// `NotebookError::Parse` if it is not an nbformat v4 document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, NotebookError> {
        let path = path.into();
        let document = NotebookDocument::load(&path)?;
        Ok(Self { path, document })
    }

    /// Path the notebook was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw document.
    #[must_use]
    pub fn document(&self) -> &NotebookDocument {
        &self.document
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.document.cells.len()
    }

    /// Returns true if the notebook has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document.cells.is_empty()
    }

    /// Structured view of every cell, in order.
    #[must_use]
    pub fn list_cells(&self) -> Vec<Cell> {
        self.document.cells.iter().map(Cell::from_raw).collect()
    }

    /// Structured view of the cell at `index`.
    #[must_use]
    pub fn cell(&self, index: usize) -> Option<Cell> {
        self.document.cells.get(index).map(Cell::from_raw)
    }

    /// Index of the first cell with the given id.
    #[must_use]
    pub fn find_cell(&self, id: &str) -> Option<usize> {
        self.document
            .cells
            .iter()
            .position(|cell| cell.get("id").and_then(Value::as_str) == Some(id))
    }

    /// Inserts a new cell and returns the index it landed at.
    ///
    /// New cells get an id only when the document's format version requires
    /// one (nbformat 4.5+).
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::UnsupportedCellType` unless `cell_type` is
    /// `code`, `markdown` or `raw`.
    #[instrument(skip(self, source), fields(path = %self.path.display()))]
    pub fn insert_cell(
        &mut self,
        cell_type: &str,
        source: &str,
        position: CellPosition,
    ) -> Result<usize, NotebookError> {
        let cell_type = CellType::from_str(cell_type)?;
        let id = self.document.supports_cell_ids().then(new_cell_id);
        let cell = cell_type.new_raw_cell(source, id);

        let len = self.document.cells.len();
        let index = match position {
            CellPosition::Index(index) if index < len => {
                self.document.cells.insert(index, cell);
                index
            }
            _ => {
                self.document.cells.push(cell);
                len
            }
        };

        debug!(index, %cell_type, "Inserted cell");
        Ok(index)
    }

    /// Removes the first cell with the given id.
    ///
    /// Returns false if no cell matched.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn remove_cell(&mut self, id: &str) -> bool {
        match self.find_cell(id) {
            Some(index) => {
                self.document.cells.remove(index);
                debug!(index, "Removed cell");
                true
            }
            None => {
                trace!("No cell with this id");
                false
            }
        }
    }

    /// Replaces the source of the code cell with the given id.
    ///
    /// Returns false without touching the document if no cell matched or the
    /// matching cell is not a code cell. Stale outputs and the execution
    /// count are cleared along with the old source.
    #[instrument(skip(self, new_source), fields(path = %self.path.display()))]
    pub fn update_cell_source(&mut self, id: &str, new_source: &str) -> bool {
        let Some(index) = self.find_cell(id) else {
            trace!("No cell with this id");
            return false;
        };

        let cell = &mut self.document.cells[index];
        if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
            debug!(index, "Refusing to update a non-code cell");
            return false;
        }

        cell.insert("source".into(), json!(split_lines(new_source)));
        cell.insert("outputs".into(), json!([]));
        cell.insert("execution_count".into(), Value::Null);
        debug!(index, "Updated cell source");
        true
    }

    /// Rewrites every parameters cell as `params = {...}`.
    ///
    /// Does nothing for an empty map. Returns the number of cells rewritten.
    pub fn inject_parameters(&mut self, parameters: &Map<String, Value>) -> usize {
        if parameters.is_empty() {
            return 0;
        }

        let source = format!("params = {}", python_literal(&Value::Object(parameters.clone())));
        let mut rewritten = 0;
        for cell in self
            .document
            .cells
            .iter_mut()
            .filter(|cell| is_parameters_cell(cell))
        {
            cell.insert("source".into(), json!(split_lines(&source)));
            rewritten += 1;
        }

        debug!(rewritten, "Injected parameters");
        rewritten
    }

    /// Executes the cell at `index` and returns it with its new outputs.
    ///
    /// The engine runs every cell up to and including `index` so the kernel
    /// sees the state built by the cells above. Only the target cell's
    /// outputs and execution count are copied back. Non-code cells are
    /// returned without running anything.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::CellIndexOutOfRange` for a bad index and
    /// `NotebookError::Execution` if the engine fails. Exceptions raised by
    /// notebook code are not errors; they show up as outputs.
    #[instrument(skip(self, engine, parameters), fields(path = %self.path.display()))]
    pub fn execute_cell(
        &mut self,
        engine: &dyn ExecutionEngine,
        index: usize,
        parameters: &Map<String, Value>,
    ) -> Result<Cell, NotebookError> {
        let len = self.document.cells.len();
        if index >= len {
            return Err(NotebookError::CellIndexOutOfRange { index, len });
        }

        let target = &self.document.cells[index];
        if target.get("cell_type").and_then(Value::as_str) != Some("code") {
            debug!(index, "Target is not a code cell, nothing to execute");
            return Ok(Cell::from_raw(target));
        }

        self.inject_parameters(parameters);

        let mut prefix = self.document.clone();
        prefix.cells.truncate(index + 1);

        let executed = engine.execute(&prefix, &self.working_dir())?;
        let executed_cell = executed
            .cells
            .get(index)
            .ok_or_else(|| ExecutionError::Engine {
                reason: format!(
                    "engine returned {} cells, expected at least {}",
                    executed.cells.len(),
                    index + 1
                ),
            })?;

        let cell = &mut self.document.cells[index];
        for key in ["outputs", "execution_count"] {
            match executed_cell.get(key) {
                Some(value) => cell.insert(key.into(), value.clone()),
                None => cell.remove(key),
            };
        }

        let cell = Cell::from_raw(cell);
        debug!(
            index,
            outputs = cell.outputs().len(),
            execution_count = ?cell.execution_count(),
            "Executed cell"
        );
        Ok(cell)
    }

    /// Executes the whole notebook and returns every cell.
    ///
    /// The executed document replaces the in-memory one, so engine-side
    /// metadata updates (such as `language_info`) are kept too.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::Execution` if the engine fails.
    #[instrument(skip(self, engine, parameters), fields(path = %self.path.display()))]
    pub fn execute_notebook(
        &mut self,
        engine: &dyn ExecutionEngine,
        parameters: &Map<String, Value>,
    ) -> Result<Vec<Cell>, NotebookError> {
        self.inject_parameters(parameters);

        let executed = engine.execute(&self.document, &self.working_dir())?;
        if executed.cells.len() != self.document.cells.len() {
            return Err(ExecutionError::Engine {
                reason: format!(
                    "engine returned {} cells, expected {}",
                    executed.cells.len(),
                    self.document.cells.len()
                ),
            }
            .into());
        }

        self.document = executed;
        debug!(cells = self.document.cells.len(), "Executed notebook");
        Ok(self.list_cells())
    }

    /// Saves the notebook to `path`, or back to where it was opened from.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::Write` if persisting fails.
    pub fn save(&self, path: Option<&Path>) -> Result<(), NotebookError> {
        self.document.save(path.unwrap_or(&self.path))
    }

    /// Directory the kernel should run in: the notebook's own directory.
    fn working_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Renders a JSON value as a Python literal.
#[must_use]
pub fn python_literal(value: &Value) -> String {
    let mut out = String::new();
    write_python_literal(&mut out, value);
    out
}

fn write_python_literal(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        // JSON string escapes are valid Python string escapes.
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_python_literal(out, item);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            for (i, (key, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_python_literal(out, item);
            }
            out.push('}');
        }
    }
}
