use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for the storage module.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Error returned by the tables whenever a request doesn't fit their shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErr {
    /// A row buffer or a batch doesn't match the expected length.
    SizeMismatch { expected: usize, got: usize },
    /// The requested row isn't part of the table.
    RowOutOfRange { row: usize, rows: usize },
    /// The parameter generator ran out before every row was initialized.
    Exhausted { expected: usize, got: usize },
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {expected}, got {got}")
            }
            Self::RowOutOfRange { row, rows } => {
                write!(f, "row {row} is out of range, the table holds {rows} rows")
            }
            Self::Exhausted { expected, got } => write!(
                f,
                "parameter generator exhausted: expected {expected} values, got {got}"
            ),
        }
    }
}

impl Error for StoreErr {}
