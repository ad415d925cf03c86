use std::fmt;

use strata::StorageError;

/// Rejections raised while validating a parsed statement, before any page
/// is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// Row ids are user-visible keys and must be strictly positive.
    InvalidId,
    UsernameTooLong(usize),
    EmailTooLong(usize),
    /// A WHERE condition's string operand exceeds the storable length.
    ValueTooLong(usize),
    /// The WHERE expression tree exceeds the node budget.
    ExpressionTooLarge(usize),
    /// A condition pairs a field with an operand of the other type.
    TypeMismatch,
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementError::InvalidId => write!(f, "id must be positive"),
            StatementError::UsernameTooLong(len) => {
                write!(f, "username is {} bytes, over the limit", len)
            }
            StatementError::EmailTooLong(len) => {
                write!(f, "email is {} bytes, over the limit", len)
            }
            StatementError::ValueTooLong(len) => {
                write!(f, "condition value is {} bytes, over the limit", len)
            }
            StatementError::ExpressionTooLarge(nodes) => {
                write!(f, "where expression has {} nodes, over the limit", nodes)
            }
            StatementError::TypeMismatch => {
                write!(f, "condition value does not match the field type")
            }
        }
    }
}

impl std::error::Error for StatementError {}

#[derive(Debug)]
pub enum ExecutionError {
    Storage(StorageError),
    Statement(StatementError),
    TransactionInProgress,
    NoActiveTransaction,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Storage(err) => write!(f, "{}", err),
            ExecutionError::Statement(err) => write!(f, "invalid statement: {}", err),
            ExecutionError::TransactionInProgress => {
                write!(f, "a transaction is already in progress")
            }
            ExecutionError::NoActiveTransaction => write!(f, "no active transaction"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        ExecutionError::Storage(err)
    }
}

impl From<StatementError> for ExecutionError {
    fn from(err: StatementError) -> Self {
        ExecutionError::Statement(err)
    }
}
