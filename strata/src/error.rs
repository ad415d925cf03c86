use std::fmt;
use std::io;

/// Errors surfaced by the storage layer. I/O failures have no recovery
/// path here; callers either abort or report them.
#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    /// The file or an in-page pointer is inconsistent with the format.
    Corrupt(String),
    /// The page cache is exhausted; the table cannot grow any further.
    TableFull,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "i/o error: {}", err),
            StorageError::Corrupt(msg) => write!(f, "corrupt database: {}", msg),
            StorageError::TableFull => write!(f, "table full"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
