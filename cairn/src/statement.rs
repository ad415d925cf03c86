//! The parsed-statement surface.
//!
//! The tokenizer and grammar live outside this crate; what arrives here is
//! an already-shaped `Statement` with an optional WHERE expression tree.
//! Validation happens once, up front, so execution never sees an
//! out-of-range field.

use crate::errors::StatementError;
use strata::row::{EMAIL_MAX_LENGTH, USERNAME_MAX_LENGTH};
use strata::Row;

/// Cap on WHERE expression size; anything larger is rejected as a parse
/// artifact rather than evaluated.
pub const MAX_WHERE_EXPR_NODES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Username,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

/// A condition operand: ids compare numerically, the string fields
/// byte-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    Id(u32),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCondition {
    pub field: Field,
    pub op: CompareOp,
    pub value: ConditionValue,
}

impl BasicCondition {
    pub fn id(op: CompareOp, value: u32) -> Self {
        BasicCondition {
            field: Field::Id,
            op,
            value: ConditionValue::Id(value),
        }
    }

    pub fn username(op: CompareOp, value: &str) -> Self {
        BasicCondition {
            field: Field::Username,
            op,
            value: ConditionValue::Text(value.to_string()),
        }
    }

    pub fn email(op: CompareOp, value: &str) -> Self {
        BasicCondition {
            field: Field::Email,
            op,
            value: ConditionValue::Text(value.to_string()),
        }
    }

    fn validate(&self) -> Result<(), StatementError> {
        match (self.field, &self.value) {
            (Field::Id, ConditionValue::Id(_)) => Ok(()),
            (Field::Username, ConditionValue::Text(text))
            | (Field::Email, ConditionValue::Text(text)) => {
                if text.len() > EMAIL_MAX_LENGTH {
                    Err(StatementError::ValueTooLong(text.len()))
                } else {
                    Ok(())
                }
            }
            _ => Err(StatementError::TypeMismatch),
        }
    }
}

/// A boolean expression over one row. And/Or short-circuit left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhereExpr {
    Basic(BasicCondition),
    And(Box<WhereExpr>, Box<WhereExpr>),
    Or(Box<WhereExpr>, Box<WhereExpr>),
}

impl WhereExpr {
    pub fn basic(condition: BasicCondition) -> Self {
        WhereExpr::Basic(condition)
    }

    pub fn and(left: WhereExpr, right: WhereExpr) -> Self {
        WhereExpr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: WhereExpr, right: WhereExpr) -> Self {
        WhereExpr::Or(Box::new(left), Box::new(right))
    }

    pub fn node_count(&self) -> usize {
        match self {
            WhereExpr::Basic(_) => 1,
            WhereExpr::And(left, right) | WhereExpr::Or(left, right) => {
                1 + left.node_count() + right.node_count()
            }
        }
    }

    /// The top-level AND conjuncts, left to right. An OR at the top level
    /// is a single opaque conjunct.
    pub fn conjuncts(&self) -> Vec<&WhereExpr> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a WhereExpr>) {
        match self {
            WhereExpr::And(left, right) => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    fn validate(&self) -> Result<(), StatementError> {
        let nodes = self.node_count();
        if nodes > MAX_WHERE_EXPR_NODES {
            return Err(StatementError::ExpressionTooLarge(nodes));
        }
        self.validate_nodes()
    }

    fn validate_nodes(&self) -> Result<(), StatementError> {
        match self {
            WhereExpr::Basic(condition) => condition.validate(),
            WhereExpr::And(left, right) | WhereExpr::Or(left, right) => {
                left.validate_nodes()?;
                right.validate_nodes()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(Row),
    Select {
        filter: Option<WhereExpr>,
    },
    /// Only the present fields are written; absent ones keep their stored
    /// value.
    Update {
        username: Option<String>,
        email: Option<String>,
        filter: Option<WhereExpr>,
    },
    Delete {
        filter: Option<WhereExpr>,
    },
}

impl Statement {
    pub fn validate(&self) -> Result<(), StatementError> {
        match self {
            Statement::Insert(row) => {
                if row.id == 0 {
                    return Err(StatementError::InvalidId);
                }
                validate_username(&row.username)?;
                validate_email(&row.email)
            }
            Statement::Select { filter } => validate_filter(filter),
            Statement::Update {
                username,
                email,
                filter,
            } => {
                if let Some(username) = username {
                    validate_username(username)?;
                }
                if let Some(email) = email {
                    validate_email(email)?;
                }
                validate_filter(filter)
            }
            Statement::Delete { filter } => validate_filter(filter),
        }
    }
}

fn validate_username(username: &str) -> Result<(), StatementError> {
    if username.len() > USERNAME_MAX_LENGTH {
        Err(StatementError::UsernameTooLong(username.len()))
    } else {
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), StatementError> {
    if email.len() > EMAIL_MAX_LENGTH {
        Err(StatementError::EmailTooLong(email.len()))
    } else {
        Ok(())
    }
}

fn validate_filter(filter: &Option<WhereExpr>) -> Result<(), StatementError> {
    match filter {
        Some(expr) => expr.validate(),
        None => Ok(()),
    }
}
