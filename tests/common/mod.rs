//! Shared fixtures for integration tests.
//!
//! [`ScriptedEngine`] stands in for Jupyter. It understands a tiny subset of
//! Python, one statement per line:
//! - `print('text')` / `print("text")` produces a stdout stream output
//! - `raise Name('message')` produces an error output and stops the cell
//! - `show_png()` produces a display_data output with a PNG payload
//!
//! Everything else runs silently.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use notebook_mcp::ExecutionError;
use notebook_mcp::engine::ExecutionEngine;
use notebook_mcp::notebook::{NotebookDocument, join_fragments};
use serde_json::{Value, json};

/// A 1x1 transparent PNG.
pub const TINY_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Fake execution engine interpreting a few Python-like statements.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    calls: AtomicUsize,
    cells_seen: Mutex<Vec<usize>>,
    sources_seen: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose every run fails with an engine error.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Number of times `execute` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cell count of each document handed to the engine.
    pub fn cells_seen(&self) -> Vec<usize> {
        self.cells_seen.lock().expect("poisoned").clone()
    }

    /// Source of every code cell executed, in execution order.
    pub fn sources_seen(&self) -> Vec<String> {
        self.sources_seen.lock().expect("poisoned").clone()
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn execute(
        &self,
        document: &NotebookDocument,
        working_dir: &Path,
    ) -> Result<NotebookDocument, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cells_seen
            .lock()
            .expect("poisoned")
            .push(document.cells.len());
        assert!(working_dir.is_dir(), "working dir must exist");

        if let Some(reason) = &self.failure {
            return Err(ExecutionError::Engine {
                reason: reason.clone(),
            });
        }

        let mut executed = document.clone();
        let mut count: i64 = 0;
        for cell in executed
            .cells
            .iter_mut()
            .filter(|cell| cell.get("cell_type").and_then(Value::as_str) == Some("code"))
        {
            count += 1;
            let source = cell.get("source").and_then(join_fragments).unwrap_or_default();
            self.sources_seen
                .lock()
                .expect("poisoned")
                .push(source.clone());

            cell.insert("outputs".into(), Value::Array(run_source(&source, count)));
            cell.insert("execution_count".into(), json!(count));
        }
        Ok(executed)
    }
}

fn run_source(source: &str, count: i64) -> Vec<Value> {
    let mut outputs = Vec::new();
    for line in source.lines().map(str::trim) {
        if let Some(text) = call_argument(line, "print(") {
            outputs.push(json!({"output_type": "stream", "name": "stdout", "text": [format!("{text}\n")]}));
        } else if line == "show_png()" {
            outputs.push(json!({
                "output_type": "display_data",
                "data": {"image/png": TINY_PNG, "text/plain": ["<Figure size 1x1>"]},
                "metadata": {}
            }));
        } else if let Some(rest) = line.strip_prefix("raise ") {
            let (ename, evalue) = rest
                .split_once('(')
                .map(|(name, arg)| (name.to_string(), unquote(arg.trim_end_matches(')'))))
                .unwrap_or_else(|| (rest.to_string(), String::new()));
            outputs.push(json!({
                "output_type": "error",
                "ename": ename,
                "evalue": evalue,
                "traceback": [format!("Traceback in cell {count}"), format!("{ename}: {evalue}")]
            }));
            break;
        }
    }
    outputs
}

fn call_argument(line: &str, prefix: &str) -> Option<String> {
    line.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(')'))
        .map(unquote)
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '\'' || c == '"').to_string()
}

// =============================================================================
// Notebook fixtures
// =============================================================================

pub fn code_cell(id: &str, source: &str) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "id": id,
        "metadata": {},
        "outputs": [],
        "source": source
    })
}

pub fn markdown_cell(id: &str, source: &str) -> Value {
    json!({
        "cell_type": "markdown",
        "id": id,
        "metadata": {},
        "source": source
    })
}

/// A code cell tagged as the parameters cell.
pub fn parameters_cell(id: &str, source: &str) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "id": id,
        "metadata": {"tags": ["parameters"]},
        "outputs": [],
        "source": source
    })
}

/// An nbformat 4.5 notebook with the given cells and some fields the crate
/// does not model.
pub fn notebook_json(cells: Vec<Value>) -> Value {
    json!({
        "cells": cells,
        "metadata": {
            "kernelspec": {"display_name": "Python 3", "language": "python", "name": "python3"},
            "custom_tool": {"keep": [1, 2, 3]}
        },
        "nbformat": 4,
        "nbformat_minor": 5
    })
}

/// Writes `notebook` to `dir/name` and returns the path.
pub fn write_notebook(dir: &Path, name: &str, notebook: &Value) -> PathBuf {
    let path = dir.join(name);
    let content = serde_json::to_string_pretty(notebook).expect("serialize notebook");
    std::fs::write(&path, content).expect("write notebook");
    path
}

pub fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path).expect("read notebook");
    serde_json::from_str(&content).expect("parse notebook")
}

/// The standard two-cell document: markdown "Title" then code "x=1".
pub fn title_and_assignment(dir: &Path) -> PathBuf {
    write_notebook(
        dir,
        "analysis.ipynb",
        &notebook_json(vec![markdown_cell("md-title", "Title"), code_cell("code-x", "x=1")]),
    )
}
