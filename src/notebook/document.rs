//! Raw notebook documents and their persistence.
//!
//! The document keeps cells as raw JSON maps; the structured [`Cell`] view is
//! derived on demand. Serialization follows the nbformat on-disk convention
//! (sorted keys, one-space indent, trailing newline), so re-saving an
//! untouched notebook written by Jupyter is byte-stable in the common case.
//!
//! [`Cell`]: super::Cell

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use crate::error::NotebookError;

/// The nbformat major version this crate reads and writes.
pub const SUPPORTED_NBFORMAT: u64 = 4;

/// First minor version of nbformat 4 in which cells carry ids.
const CELL_ID_MINOR_VERSION: u64 = 5;

/// One cell exactly as stored in the document.
pub type RawCell = Map<String, Value>;

/// An nbformat v4 document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookDocument {
    /// Ordered cell records.
    pub cells: Vec<RawCell>,
    /// Document metadata (kernelspec, language_info, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Format major version.
    pub nbformat: u64,
    /// Format minor version.
    pub nbformat_minor: u64,
    /// Top-level keys this crate does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotebookDocument {
    /// Creates an empty document of the given nbformat 4 minor version.
    #[must_use]
    pub fn new(nbformat_minor: u64) -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            nbformat: SUPPORTED_NBFORMAT,
            nbformat_minor,
            extra: Map::new(),
        }
    }

    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the text is not JSON, lacks
    /// required fields, or is not an nbformat v4 document.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        let document: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;

        if document.nbformat != SUPPORTED_NBFORMAT {
            return Err(format!(
                "unsupported nbformat version {}.{} (expected {}.x)",
                document.nbformat, document.nbformat_minor, SUPPORTED_NBFORMAT
            ));
        }

        Ok(document)
    }

    /// Serializes the document in nbformat's on-disk layout.
    ///
    /// Top-level keys, including unmodeled ones, come out sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let fields: BTreeMap<String, Value> = serde_json::from_value(serde_json::to_value(self)?)?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        fields.serialize(&mut serializer)?;
        buf.push(b'\n');
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Loads a document from disk.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::NotFound` if the path does not exist,
    /// `NotebookError::Read` if it cannot be read, and
    /// `NotebookError::Parse` if the content is not a supported notebook.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, NotebookError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NotebookError::NotFound {
                path: path.to_path_buf(),
            },
            _ => NotebookError::Read {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let document = Self::from_json_str(&content).map_err(|reason| NotebookError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!(
            cells = document.cells.len(),
            nbformat_minor = document.nbformat_minor,
            "Loaded notebook"
        );
        Ok(document)
    }

    /// Saves the document atomically.
    ///
    /// Writes to a temporary sibling file first, then renames it over the
    /// target so readers never observe a half-written notebook. A symlinked
    /// path is resolved first, so the link survives and the file it points to
    /// receives the new content with its permissions intact.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::Write` if any step fails.
    #[instrument(skip(self), fields(path = %path.display(), cells = self.cells.len()))]
    pub fn save(&self, path: &Path) -> Result<(), NotebookError> {
        let json = self.to_json_string().map_err(|e| NotebookError::Write {
            context: format!("failed to serialize notebook: {e}"),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        let target = resolve_target(path)?;
        let path = target.as_path();
        let temp_path = path.with_extension("ipynb.tmp");

        let mut file = fs::File::create(&temp_path).map_err(|e| NotebookError::Write {
            context: format!("failed to create temp file: {}", temp_path.display()),
            source: e,
        })?;

        file.write_all(json.as_bytes())
            .map_err(|e| NotebookError::Write {
                context: format!("failed to write notebook: {}", temp_path.display()),
                source: e,
            })?;

        file.sync_all().map_err(|e| NotebookError::Write {
            context: "failed to sync notebook file".to_string(),
            source: e,
        })?;
        trace!(temp = %temp_path.display(), "Wrote temp notebook");

        if let Ok(existing) = fs::metadata(path) {
            fs::set_permissions(&temp_path, existing.permissions()).map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                NotebookError::Write {
                    context: format!("failed to copy permissions onto {}", temp_path.display()),
                    source: e,
                }
            })?;
        }

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            NotebookError::Write {
                context: format!(
                    "failed to rename temp file {} to {}",
                    temp_path.display(),
                    path.display()
                ),
                source: e,
            }
        })?;

        debug!("Saved notebook");
        Ok(())
    }

    /// Returns true if this format version requires cell ids.
    #[must_use]
    pub fn supports_cell_ids(&self) -> bool {
        self.nbformat > SUPPORTED_NBFORMAT || self.nbformat_minor >= CELL_ID_MINOR_VERSION
    }
}

/// Follows `path` to the file it names when it is a symlink.
fn resolve_target(path: &Path) -> Result<PathBuf, NotebookError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::canonicalize(path).map_err(|e| NotebookError::Write {
                context: format!("failed to resolve symlink: {}", path.display()),
                source: e,
            })?;
            trace!(target = %target.display(), "Resolved notebook symlink");
            Ok(target)
        }
        _ => Ok(path.to_path_buf()),
    }
}
