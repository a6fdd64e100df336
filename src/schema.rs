//! Temporary storage for a turn's output schema.
//!
//! `codex exec --output-schema` takes a file path, so the schema is written
//! to a private temporary directory that is removed when the
//! [`OutputSchemaFile`] is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

const SCHEMA_DIR_PREFIX: &str = "codex-output-schema-";
const SCHEMA_FILE_NAME: &str = "schema.json";

/// Errors preparing the output schema file.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// Schemas must be plain JSON objects.
    #[error("output_schema must be a plain JSON object")]
    NotAnObject,

    /// Failed to serialize the schema.
    #[error("Failed to serialize output schema: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to create or write the temporary file.
    #[error("Failed to write output schema: {0}")]
    Io(#[from] std::io::Error),
}

/// A schema written to disk for the lifetime of one turn.
#[derive(Debug)]
pub struct OutputSchemaFile {
    // Held for its Drop, which removes the directory.
    _dir: TempDir,
    path: PathBuf,
}

impl OutputSchemaFile {
    /// Write `schema` to a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotAnObject` if `schema` is not a JSON object,
    /// or an I/O error if the file cannot be written.
    pub fn create(schema: &serde_json::Value) -> Result<Self, SchemaError> {
        if !schema.is_object() {
            return Err(SchemaError::NotAnObject);
        }

        let dir = tempfile::Builder::new()
            .prefix(SCHEMA_DIR_PREFIX)
            .tempdir()?;
        let path = dir.path().join(SCHEMA_FILE_NAME);
        std::fs::write(&path, serde_json::to_vec(schema)?)?;

        tracing::debug!(path = %path.display(), "Wrote output schema");
        Ok(Self { _dir: dir, path })
    }

    /// Path passed to `--output-schema`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write the schema if one was given.
///
/// # Errors
///
/// See [`OutputSchemaFile::create`].
pub fn create_output_schema_file(
    schema: Option<&serde_json::Value>,
) -> Result<Option<OutputSchemaFile>, SchemaError> {
    schema.map(OutputSchemaFile::create).transpose()
}
