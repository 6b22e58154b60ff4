//! Integration tests for the nbconvert execution engine.
//!
//! The engine runs `<jupyter> nbconvert ...`. With the launcher set to `sh`,
//! that becomes `sh nbconvert ...`, so a script named `nbconvert` in the
//! notebook's directory stands in for Jupyter. The fakes understand the
//! `--output-dir` flag and treat the last argument as the input notebook.
//!
//! Tests that need a real Jupyter installation are `#[ignore]`d; run them with
//! `cargo test -- --ignored`.

#![cfg(unix)]

mod common;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use notebook_mcp::ExecutionError;
use notebook_mcp::engine::{ExecutionConfig, ExecutionEngine, NbconvertEngine};
use notebook_mcp::notebook::{CellPosition, NotebookDocument, NotebookManager, Output};
use serde_json::Map;
use tempfile::TempDir;

use common::{code_cell, notebook_json, title_and_assignment, write_notebook};

/// Copies the input to the output directory, like an engine that ran cells
/// without producing output. Records its working directory.
const COPY_SCRIPT: &str = r#"
out_dir=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) out_dir="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
pwd > engine-cwd.txt
cp "$input" "$out_dir/executed.ipynb"
"#;

/// Writes a fixed executed notebook with one stream output.
const OUTPUT_SCRIPT: &str = r#"
out_dir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) out_dir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat > "$out_dir/executed.ipynb" <<'EOF'
{
 "cells": [
  {
   "cell_type": "code",
   "execution_count": 1,
   "id": "only",
   "metadata": {},
   "outputs": [{"name": "stdout", "output_type": "stream", "text": ["42\n"]}],
   "source": ["print(42)"]
  }
 ],
 "metadata": {"language_info": {"name": "python"}},
 "nbformat": 4,
 "nbformat_minor": 5
}
EOF
"#;

const CELL_TIMEOUT_SCRIPT: &str = r#"
echo "nbclient.exceptions.CellTimeoutError: A cell timed out while it was being executed, after 1 seconds." >&2
exit 1
"#;

const CRASH_SCRIPT: &str = r#"
echo "Traceback (most recent call last):" >&2
echo "jupyter_client.kernelspec.NoSuchKernel: No such kernel named julia" >&2
exit 1
"#;

const NO_RESULT_SCRIPT: &str = "exit 0\n";

// `exec` so the kill reaches the sleeping process itself
const HANG_SCRIPT: &str = "exec sleep 30\n";

/// Leaves a background child holding stdout/stderr, like a kernel would.
const BACKGROUND_CHILD_SCRIPT: &str = "sleep 8 &\nexec sleep 30\n";

/// Helper to build an engine that runs `sh nbconvert ...` in the notebook dir.
fn fake_engine(timeout_secs: u64) -> NbconvertEngine {
    NbconvertEngine::new(
        ExecutionConfig::new()
            .with_jupyter_command("sh")
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_startup_timeout(Duration::from_secs(1)),
    )
}

fn install_fake(dir: &Path, script: &str) {
    fs::write(dir.join("nbconvert"), script).expect("write fake nbconvert");
}

/// Files left in `dir` apart from the notebook, the fake and its log.
fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            !name.ends_with(".ipynb") || name.starts_with(".nbmcp-")
        })
        .filter(|name| name != "nbconvert" && name != "engine-cwd.txt")
        .collect()
}

fn one_cell_document() -> NotebookDocument {
    let json = notebook_json(vec![code_cell("only", "print(42)")]);
    NotebookDocument::from_json_str(&json.to_string()).expect("document")
}

// =============================================================================
// Successful runs
// =============================================================================

#[test]
fn test_engine_runs_in_working_dir_and_reads_result() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), COPY_SCRIPT);
    let document = one_cell_document();

    let executed = fake_engine(5)
        .execute(&document, dir.path())
        .expect("execute");

    assert_eq!(executed, document);
    let cwd = fs::read_to_string(dir.path().join("engine-cwd.txt")).expect("cwd log");
    assert_eq!(
        fs::canonicalize(cwd.trim()).expect("canonical cwd"),
        fs::canonicalize(dir.path()).expect("canonical dir")
    );
    assert!(leftovers(dir.path()).is_empty(), "{:?}", leftovers(dir.path()));
}

#[test]
fn test_engine_outputs_flow_into_notebook() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), OUTPUT_SCRIPT);
    let path = write_notebook(
        dir.path(),
        "answer.ipynb",
        &notebook_json(vec![code_cell("only", "print(42)")]),
    );
    let engine = fake_engine(5);

    let mut manager = NotebookManager::open(&path).expect("open");
    let cell = manager
        .execute_cell(&engine, 0, &Map::new())
        .expect("execute");
    manager.save(None).expect("save");

    assert_eq!(cell.outputs(), [Output::text("42\n")]);
    assert_eq!(cell.execution_count(), Some(1));
    let reopened = NotebookManager::open(&path).expect("reopen");
    assert_eq!(reopened.cell(0).expect("cell").outputs(), [Output::text("42\n")]);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_cell_timeout_reported_as_timeout() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), CELL_TIMEOUT_SCRIPT);

    let result = fake_engine(7).execute(&one_cell_document(), dir.path());

    assert!(
        matches!(result, Err(ExecutionError::Timeout { timeout }) if timeout == Duration::from_secs(7)),
        "{result:?}"
    );
}

#[test]
fn test_crash_reported_with_stderr() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), CRASH_SCRIPT);

    let result = fake_engine(5).execute(&one_cell_document(), dir.path());

    match result {
        Err(ExecutionError::Engine { reason }) => {
            assert!(reason.contains("code 1"), "{reason}");
            assert!(reason.contains("NoSuchKernel"), "{reason}");
        }
        other => panic!("expected engine error, got {other:?}"),
    }
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn test_missing_result_is_engine_error() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), NO_RESULT_SCRIPT);

    let result = fake_engine(5).execute(&one_cell_document(), dir.path());

    assert!(
        matches!(result, Err(ExecutionError::Engine { ref reason }) if reason.contains("executed notebook")),
        "{result:?}"
    );
}

#[test]
fn test_hung_engine_is_killed_at_deadline() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), HANG_SCRIPT);
    let start = Instant::now();

    let result = fake_engine(1).execute(&one_cell_document(), dir.path());

    assert!(matches!(result, Err(ExecutionError::Timeout { .. })), "{result:?}");
    assert!(
        start.elapsed() < Duration::from_secs(20),
        "engine should be killed well before it finishes sleeping"
    );
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn test_deadline_holds_when_descendant_keeps_pipes_open() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), BACKGROUND_CHILD_SCRIPT);
    let start = Instant::now();

    // 1s startup + 1s per cell
    let result = fake_engine(1).execute(&one_cell_document(), dir.path());

    assert!(
        matches!(result, Err(ExecutionError::Timeout { timeout }) if timeout == Duration::from_secs(2)),
        "{result:?}"
    );
    let elapsed = start.elapsed();
    assert!(
        elapsed < Duration::from_secs(6),
        "returned after {elapsed:?}, background child kept the engine alive"
    );
    assert!(leftovers(dir.path()).is_empty());
}

#[test]
fn test_failed_execution_keeps_notebook_unchanged() {
    let dir = TempDir::new().expect("tempdir");
    install_fake(dir.path(), CRASH_SCRIPT);
    let path = title_and_assignment(dir.path());
    let before = fs::read_to_string(&path).expect("read");

    let mut manager = NotebookManager::open(&path).expect("open");
    manager
        .insert_cell("code", "print('hi')", CellPosition::End)
        .expect("insert");
    assert!(manager.execute_cell(&fake_engine(5), 2, &Map::new()).is_err());

    assert_eq!(fs::read_to_string(&path).expect("read"), before);
}

// =============================================================================
// Real Jupyter
// =============================================================================

#[test]
#[ignore = "requires jupyter nbconvert and a python3 kernel"]
fn test_real_jupyter_executes_cell() {
    let dir = TempDir::new().expect("tempdir");
    let path = title_and_assignment(dir.path());
    let engine = NbconvertEngine::new(ExecutionConfig::new().with_timeout(Duration::from_secs(60)));

    let mut manager = NotebookManager::open(&path).expect("open");
    let index = manager
        .insert_cell("code", "print('hi')", CellPosition::End)
        .expect("insert");
    let cell = manager
        .execute_cell(&engine, index, &Map::new())
        .expect("execute");

    assert_eq!(cell.outputs(), [Output::text("hi\n")]);
    assert!(cell.execution_count().is_some_and(|n| n > 0));
}

#[test]
#[ignore = "requires jupyter nbconvert and a python3 kernel"]
fn test_real_jupyter_captures_exceptions() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_notebook(
        dir.path(),
        "boom.ipynb",
        &notebook_json(vec![code_cell("boom", "raise ValueError('bad')")]),
    );
    let engine = NbconvertEngine::new(ExecutionConfig::default());

    let mut manager = NotebookManager::open(&path).expect("open");
    let cell = manager
        .execute_cell(&engine, 0, &Map::new())
        .expect("exceptions are outputs, not failures");

    let payload: serde_json::Value =
        serde_json::from_str(cell.outputs()[0].as_text().expect("text")).expect("json");
    assert_eq!(payload["ename"], "ValueError");
    assert_eq!(payload["evalue"], "bad");
}
