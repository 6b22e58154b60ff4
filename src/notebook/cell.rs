//! Structured view of notebook cells.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::document::RawCell;
use super::output::Output;
use super::{join_fragments, split_lines};
use crate::error::NotebookError;

/// Metadata key (and tag) marking a parameters cell.
const PARAMETERS_MARKER: &str = "parameters";

/// Cell types that can be created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Executable code cell
    #[default]
    Code,
    /// Markdown documentation cell
    Markdown,
    /// Raw cell, passed through untouched by converters
    Raw,
}

impl CellType {
    /// Returns the nbformat name of this cell type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Raw => "raw",
        }
    }

    /// Builds a new raw cell record of this type, shaped like nbformat's
    /// `new_code_cell` / `new_markdown_cell` / `new_raw_cell`.
    #[must_use]
    pub fn new_raw_cell(self, source: &str, id: Option<String>) -> RawCell {
        // Keys in sorted order, as nbformat writes them.
        let mut cell = Map::new();
        cell.insert("cell_type".into(), json!(self.as_str()));
        if self == Self::Code {
            cell.insert("execution_count".into(), Value::Null);
        }
        if let Some(id) = id {
            cell.insert("id".into(), json!(id));
        }
        cell.insert("metadata".into(), json!({}));
        if self == Self::Code {
            cell.insert("outputs".into(), json!([]));
        }
        cell.insert("source".into(), json!(split_lines(source)));
        cell
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellType {
    type Err = NotebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(Self::Code),
            "markdown" => Ok(Self::Markdown),
            "raw" => Ok(Self::Raw),
            other => Err(NotebookError::UnsupportedCellType {
                cell_type: other.to_string(),
            }),
        }
    }
}

/// Type-specific part of a cell. Only code cells carry outputs.
#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Code {
        outputs: Vec<Output>,
        execution_count: Option<i64>,
    },
    Markdown,
    Raw,
    /// A cell type this crate does not know, kept verbatim.
    Other(String),
}

/// A notebook cell as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Cell identifier; absent in documents older than nbformat 4.5.
    pub id: Option<String>,
    /// Source text, reassembled from its stored fragments.
    pub content: String,
    /// Cell metadata, copied verbatim.
    pub metadata: Map<String, Value>,
    pub kind: CellKind,
}

impl Cell {
    /// Builds a structured cell from a raw cell record.
    #[must_use]
    pub fn from_raw(raw: &RawCell) -> Self {
        let cell_type = raw.get("cell_type").and_then(Value::as_str).unwrap_or("");

        let kind = match cell_type {
            "code" => CellKind::Code {
                outputs: raw
                    .get("outputs")
                    .and_then(Value::as_array)
                    .map(|outputs| outputs.iter().map(Output::from_raw).collect())
                    .unwrap_or_default(),
                execution_count: raw.get("execution_count").and_then(Value::as_i64),
            },
            "markdown" => CellKind::Markdown,
            "raw" => CellKind::Raw,
            other => CellKind::Other(other.to_string()),
        };

        Self {
            id: raw.get("id").and_then(Value::as_str).map(String::from),
            content: raw
                .get("source")
                .and_then(join_fragments)
                .unwrap_or_default(),
            metadata: raw
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            kind,
        }
    }

    /// Returns the cell type as stored in the document.
    #[must_use]
    pub fn cell_type(&self) -> &str {
        match &self.kind {
            CellKind::Code { .. } => "code",
            CellKind::Markdown => "markdown",
            CellKind::Raw => "raw",
            CellKind::Other(name) => name,
        }
    }

    /// Returns true for code cells.
    #[must_use]
    pub fn is_code(&self) -> bool {
        matches!(self.kind, CellKind::Code { .. })
    }

    /// Normalized outputs; always empty for non-code cells.
    #[must_use]
    pub fn outputs(&self) -> &[Output] {
        match &self.kind {
            CellKind::Code { outputs, .. } => outputs,
            _ => &[],
        }
    }

    /// Execution count of a code cell that has been run.
    #[must_use]
    pub fn execution_count(&self) -> Option<i64> {
        match &self.kind {
            CellKind::Code {
                execution_count, ..
            } => *execution_count,
            _ => None,
        }
    }

    /// Returns true if this is a code cell marked for parameter injection.
    #[must_use]
    pub fn is_parameters_cell(&self) -> bool {
        self.is_code() && metadata_marks_parameters(&self.metadata)
    }
}

/// Returns true if a raw cell is a code cell marked for parameter injection.
///
/// A cell is marked by a `parameters` metadata key or a `parameters` entry
/// in `metadata.tags`.
#[must_use]
pub fn is_parameters_cell(raw: &RawCell) -> bool {
    let is_code = raw.get("cell_type").and_then(Value::as_str) == Some("code");
    is_code
        && raw
            .get("metadata")
            .and_then(Value::as_object)
            .is_some_and(metadata_marks_parameters)
}

fn metadata_marks_parameters(metadata: &Map<String, Value>) -> bool {
    metadata.contains_key(PARAMETERS_MARKER)
        || metadata
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(PARAMETERS_MARKER)))
}

/// Generates a cell id the way nbformat does: 8 lowercase hex characters.
#[must_use]
pub fn new_cell_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: Value) -> RawCell {
        value.as_object().cloned().expect("test cell must be an object")
    }

    #[test]
    fn test_code_cell_from_raw() {
        let cell = Cell::from_raw(&raw(json!({
            "cell_type": "code",
            "id": "a1b2c3d4",
            "execution_count": 2,
            "metadata": {"collapsed": false},
            "outputs": [
                {"output_type": "stream", "name": "stdout", "text": ["1\n", "2\n"]},
                {"output_type": "execute_result", "data": {"text/plain": "3"}, "metadata": {}}
            ],
            "source": ["for i in (1, 2):\n", "    print(i)\n", "3"]
        })));

        assert_eq!(cell.id.as_deref(), Some("a1b2c3d4"));
        assert_eq!(cell.cell_type(), "code");
        assert_eq!(cell.content, "for i in (1, 2):\n    print(i)\n3");
        assert_eq!(cell.execution_count(), Some(2));
        assert_eq!(cell.outputs(), &[Output::text("1\n2\n"), Output::text("3")]);
        assert_eq!(cell.metadata.get("collapsed"), Some(&json!(false)));
    }

    #[test]
    fn test_non_code_cells_never_have_outputs() {
        for cell_type in ["markdown", "raw", "heading", ""] {
            let cell = Cell::from_raw(&raw(json!({
                "cell_type": cell_type,
                "metadata": {},
                "outputs": [{"output_type": "stream", "text": "leak"}],
                "execution_count": 9,
                "source": "text"
            })));
            assert!(cell.outputs().is_empty(), "cell_type {cell_type:?}");
            assert_eq!(cell.execution_count(), None);
        }
    }

    #[test]
    fn test_unknown_cell_type_preserved() {
        let cell = Cell::from_raw(&raw(json!({
            "cell_type": "sql",
            "metadata": {},
            "source": "select 1"
        })));
        assert_eq!(cell.kind, CellKind::Other("sql".to_string()));
        assert_eq!(cell.cell_type(), "sql");
    }

    #[test]
    fn test_single_string_source_unchanged() {
        let source = "x = 1\ny = 2\n";
        let cell = Cell::from_raw(&raw(json!({
            "cell_type": "markdown",
            "metadata": {},
            "source": source
        })));
        assert_eq!(cell.content, source);
    }

    #[test]
    fn test_missing_fields_tolerated() {
        let cell = Cell::from_raw(&raw(json!({"cell_type": "code"})));
        assert!(cell.id.is_none());
        assert_eq!(cell.content, "");
        assert!(cell.metadata.is_empty());
        assert!(cell.outputs().is_empty());
        assert_eq!(cell.execution_count(), None);
    }

    #[test]
    fn test_cell_type_from_str() {
        assert_eq!("code".parse::<CellType>().ok(), Some(CellType::Code));
        assert_eq!("markdown".parse::<CellType>().ok(), Some(CellType::Markdown));
        assert_eq!("raw".parse::<CellType>().ok(), Some(CellType::Raw));

        let err = "heading".parse::<CellType>().unwrap_err();
        assert!(matches!(
            err,
            NotebookError::UnsupportedCellType { ref cell_type } if cell_type == "heading"
        ));
    }

    #[test]
    fn test_new_raw_cell_shapes() {
        let code = CellType::Code.new_raw_cell("a\nb", Some("deadbeef".into()));
        assert_eq!(
            Value::Object(code),
            json!({
                "cell_type": "code",
                "execution_count": null,
                "id": "deadbeef",
                "metadata": {},
                "outputs": [],
                "source": ["a\n", "b"]
            })
        );

        let markdown = CellType::Markdown.new_raw_cell("# Title", None);
        assert_eq!(
            Value::Object(markdown),
            json!({"cell_type": "markdown", "metadata": {}, "source": ["# Title"]})
        );
    }

    #[test]
    fn test_parameters_marker() {
        let by_key = raw(json!({"cell_type": "code", "metadata": {"parameters": {}}}));
        let by_tag = raw(json!({"cell_type": "code", "metadata": {"tags": ["parameters"]}}));
        let markdown = raw(json!({"cell_type": "markdown", "metadata": {"parameters": {}}}));
        let plain = raw(json!({"cell_type": "code", "metadata": {"tags": ["setup"]}}));

        assert!(is_parameters_cell(&by_key));
        assert!(is_parameters_cell(&by_tag));
        assert!(!is_parameters_cell(&markdown));
        assert!(!is_parameters_cell(&plain));
        assert!(Cell::from_raw(&by_tag).is_parameters_cell());
        assert!(!Cell::from_raw(&markdown).is_parameters_cell());
    }

    #[test]
    fn test_new_cell_id_format() {
        let id = new_cell_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(new_cell_id(), new_cell_id());
    }
}
