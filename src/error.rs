use thiserror::Error;

/// Failures that stop a table from being read or a build from starting.
///
/// Every variant is raised before the table is mutated.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),
    #[error("row {row}: invalid value '{value}' in column '{column}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("row {row}: expected {expected} cells, found {found}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("duplicate record for frame_i={frame_i}, Cell_ID={cell_id}")]
    DuplicateKey { frame_i: i64, cell_id: i64 },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TableError {
    pub fn invalid(row: usize, column: &str, value: &str) -> Self {
        TableError::InvalidValue {
            row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}
