//! Tool parameter types.

use rmcp::schemars;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::notebook::CellPosition;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadNotebookRequest {
    /// Path to the notebook.
    #[schemars(description = "Absolute path to the .ipynb file")]
    pub notebook_path: String,
}

/// Insert position: `"end"` or a zero-based index.
#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum PositionArg {
    Index(i64),
    Keyword(String),
}

impl PositionArg {
    /// Resolves to a cell position; negative indices mean the end.
    ///
    /// # Errors
    ///
    /// Returns a message for keywords other than `"end"` or a number.
    pub fn resolve(&self) -> Result<CellPosition, String> {
        match self {
            Self::Index(n) => Ok(CellPosition::from(*n)),
            Self::Keyword(s) => s.parse(),
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddCellRequest {
    #[schemars(description = "Absolute path to the .ipynb file")]
    pub notebook_path: String,

    #[schemars(description = "Cell type: 'code' (default), 'markdown' or 'raw'")]
    pub cell_type: Option<String>,

    #[schemars(description = "Source of the new cell (default: empty)")]
    pub source: Option<String>,

    #[schemars(
        description = "Where to insert the cell: \"end\" (default) or a zero-based index. Indices past the end append."
    )]
    pub position: Option<PositionArg>,
}

impl AddCellRequest {
    /// Cell type, defaulting to code.
    #[must_use]
    pub fn cell_type(&self) -> &str {
        self.cell_type.as_deref().unwrap_or("code")
    }

    /// Requested position, defaulting to the end.
    ///
    /// # Errors
    ///
    /// Returns a message if the position cannot be interpreted.
    pub fn position(&self) -> Result<CellPosition, String> {
        self.position
            .as_ref()
            .map_or(Ok(CellPosition::End), PositionArg::resolve)
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EditCellRequest {
    #[schemars(description = "Absolute path to the .ipynb file")]
    pub notebook_path: String,

    #[schemars(description = "Id of the code cell to replace")]
    pub cell_id: String,

    #[schemars(description = "New source of the cell (default: empty)")]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeleteCellRequest {
    #[schemars(description = "Absolute path to the .ipynb file")]
    pub notebook_path: String,

    #[schemars(description = "Id of the cell to remove")]
    pub cell_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteNotebookRequest {
    #[schemars(description = "Absolute path to the .ipynb file")]
    pub notebook_path: String,

    #[schemars(
        description = "Values injected as `params = {...}` into cells tagged 'parameters' before execution"
    )]
    pub parameters: Option<Map<String, Value>>,
}
