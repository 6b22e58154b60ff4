//! Tool implementations.
//!
//! Each function performs one complete invocation: lock, open, mutate,
//! execute, save. They block, so the handler runs them on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use serde_json::Map;
use tracing::{debug, info};

use super::config::ServerConfig;
use crate::engine::ExecutionEngine;
use crate::error::NotebookError;
use crate::notebook::{Cell, CellPosition, NotebookLock, NotebookManager, Output};

/// Text returned for a code cell that produced no outputs.
pub const NO_OUTPUT: &str = "(no output)";

/// Header line identifying a cell in tool results.
#[must_use]
pub fn cell_marker(index: usize, cell: &Cell) -> String {
    let mut marker = format!(
        "Cell {index} [{}] id={}",
        cell.cell_type(),
        cell.id.as_deref().unwrap_or("<none>")
    );
    if let Some(count) = cell.execution_count() {
        marker.push_str(&format!(" execution_count={count}"));
    }
    marker
}

/// Engine and settings shared by all tool invocations.
#[derive(Clone)]
pub struct ToolContext {
    engine: Arc<dyn ExecutionEngine>,
    config: ServerConfig,
}

impl ToolContext {
    #[must_use]
    pub fn new(engine: Arc<dyn ExecutionEngine>, config: ServerConfig) -> Self {
        Self { engine, config }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Every cell as marker, content and outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the notebook cannot be opened.
    pub fn read_notebook(&self, notebook_path: &str) -> Result<Vec<Output>, NotebookError> {
        let path = Path::new(notebook_path);
        let _lock = self.lock(path)?;
        let manager = NotebookManager::open(path)?;

        let mut result = Vec::new();
        for (index, cell) in manager.list_cells().into_iter().enumerate() {
            result.push(Output::text(cell_marker(index, &cell)));
            result.push(Output::text(cell.content.clone()));
            result.extend(cell.outputs().iter().cloned());
        }

        debug!(cells = manager.len(), items = result.len(), "Read notebook");
        Ok(result)
    }

    /// Inserts a cell, executes it if it is code, and saves.
    ///
    /// Returns the new cell's outputs, or its marker for non-code cells.
    ///
    /// # Errors
    ///
    /// Returns an error if the cell type is unsupported, or if opening,
    /// executing or saving fails. The file is left untouched on error.
    pub fn add_cell(
        &self,
        notebook_path: &str,
        cell_type: &str,
        source: &str,
        position: CellPosition,
    ) -> Result<Vec<Output>, NotebookError> {
        let path = Path::new(notebook_path);
        let _lock = self.lock(path)?;
        let mut manager = NotebookManager::open(path)?;

        let index = manager.insert_cell(cell_type, source, position)?;
        let cell = manager
            .cell(index)
            .ok_or(NotebookError::CellIndexOutOfRange {
                index,
                len: manager.len(),
            })?;

        let result = if cell.is_code() {
            let executed = manager.execute_cell(self.engine.as_ref(), index, &Map::new())?;
            outputs_or_placeholder(&executed)
        } else {
            vec![Output::text(cell_marker(index, &cell))]
        };

        manager.save(None)?;
        info!(path = %path.display(), index, %cell_type, "Added cell");
        Ok(result)
    }

    /// Replaces a code cell's source, executes it, and saves.
    ///
    /// An unknown id, or an id naming a non-code cell, yields a notice and
    /// leaves the file untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, executing or saving fails.
    pub fn edit_cell(
        &self,
        notebook_path: &str,
        cell_id: &str,
        source: &str,
    ) -> Result<Vec<Output>, NotebookError> {
        let path = Path::new(notebook_path);
        let _lock = self.lock(path)?;
        let mut manager = NotebookManager::open(path)?;

        let found = manager.find_cell(cell_id);
        let Some(index) = found.filter(|_| manager.update_cell_source(cell_id, source)) else {
            return Ok(vec![Output::text(format!(
                "No cell was updated: no code cell with id '{cell_id}' in {}",
                path.display()
            ))]);
        };

        let executed = manager.execute_cell(self.engine.as_ref(), index, &Map::new())?;

        manager.save(None)?;
        info!(path = %path.display(), index, %cell_id, "Edited cell");
        Ok(outputs_or_placeholder(&executed))
    }

    /// Removes a cell and saves.
    ///
    /// # Errors
    ///
    /// Returns an error if opening or saving fails.
    pub fn delete_cell(
        &self,
        notebook_path: &str,
        cell_id: &str,
    ) -> Result<Vec<Output>, NotebookError> {
        let path = Path::new(notebook_path);
        let _lock = self.lock(path)?;
        let mut manager = NotebookManager::open(path)?;

        if !manager.remove_cell(cell_id) {
            return Ok(vec![Output::text(format!(
                "No cell was removed: no cell with id '{cell_id}' in {}",
                path.display()
            ))]);
        }

        manager.save(None)?;
        info!(path = %path.display(), %cell_id, "Deleted cell");
        Ok(vec![Output::text(format!(
            "Removed cell {cell_id} ({} cells remain)",
            manager.len()
        ))])
    }

    /// Executes the whole notebook with optional parameters and saves.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, executing or saving fails.
    pub fn execute_notebook(
        &self,
        notebook_path: &str,
        parameters: &Map<String, serde_json::Value>,
    ) -> Result<Vec<Output>, NotebookError> {
        let path = Path::new(notebook_path);
        let _lock = self.lock(path)?;
        let mut manager = NotebookManager::open(path)?;

        let cells = manager.execute_notebook(self.engine.as_ref(), parameters)?;
        manager.save(None)?;

        let mut result = Vec::new();
        for (index, cell) in cells.iter().enumerate() {
            result.push(Output::text(cell_marker(index, cell)));
            if cell.is_code() {
                result.extend(outputs_or_placeholder(cell));
            }
        }

        info!(path = %path.display(), cells = cells.len(), "Executed notebook");
        Ok(result)
    }

    fn lock(&self, path: &Path) -> Result<Option<NotebookLock>, NotebookError> {
        if !self.config.lock_notebooks {
            return Ok(None);
        }
        // Opening reports a missing notebook more clearly than the lock would.
        if !path.exists() {
            return Err(NotebookError::NotFound {
                path: path.to_path_buf(),
            });
        }
        NotebookLock::acquire(path).map(Some)
    }
}

fn outputs_or_placeholder(cell: &Cell) -> Vec<Output> {
    if cell.outputs().is_empty() {
        vec![Output::text(NO_OUTPUT)]
    } else {
        cell.outputs().to_vec()
    }
}
