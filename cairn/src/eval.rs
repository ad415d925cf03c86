//! WHERE expression evaluation over a single row.

use std::cmp::Ordering;

use crate::statement::{BasicCondition, CompareOp, ConditionValue, Field, WhereExpr};
use strata::Row;

/// And/Or short-circuit: the right side never runs when the left side
/// already decides.
pub fn evaluate_where(row: &Row, expr: &WhereExpr) -> bool {
    match expr {
        WhereExpr::Basic(condition) => evaluate_basic(row, condition),
        WhereExpr::And(left, right) => evaluate_where(row, left) && evaluate_where(row, right),
        WhereExpr::Or(left, right) => evaluate_where(row, left) || evaluate_where(row, right),
    }
}

fn evaluate_basic(row: &Row, condition: &BasicCondition) -> bool {
    let ordering = match (condition.field, &condition.value) {
        (Field::Id, ConditionValue::Id(value)) => row.id.cmp(value),
        // String fields compare byte-wise, like the stored representation.
        (Field::Username, ConditionValue::Text(value)) => {
            row.username.as_bytes().cmp(value.as_bytes())
        }
        (Field::Email, ConditionValue::Text(value)) => row.email.as_bytes().cmp(value.as_bytes()),
        // Mismatched pairs are screened out at validation; nothing matches.
        _ => return false,
    };
    op_accepts(condition.op, ordering)
}

fn op_accepts(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Equal => ordering == Ordering::Equal,
        CompareOp::NotEqual => ordering != Ordering::Equal,
        CompareOp::Greater => ordering == Ordering::Greater,
        CompareOp::Less => ordering == Ordering::Less,
        CompareOp::GreaterEqual => ordering != Ordering::Less,
        CompareOp::LessEqual => ordering != Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::BasicCondition;

    fn row() -> Row {
        Row::new(5, "mallory", "mallory@example.com")
    }

    #[test]
    fn test_id_comparisons() {
        let row = row();
        for (op, expected) in [
            (CompareOp::Equal, true),
            (CompareOp::NotEqual, false),
            (CompareOp::Greater, false),
            (CompareOp::Less, false),
            (CompareOp::GreaterEqual, true),
            (CompareOp::LessEqual, true),
        ] {
            let expr = WhereExpr::basic(BasicCondition::id(op, 5));
            assert_eq!(evaluate_where(&row, &expr), expected, "op {:?}", op);
        }
        let expr = WhereExpr::basic(BasicCondition::id(CompareOp::Greater, 4));
        assert!(evaluate_where(&row, &expr));
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let row = row();
        let expr = WhereExpr::basic(BasicCondition::username(CompareOp::Greater, "alice"));
        assert!(evaluate_where(&row, &expr));
        let expr = WhereExpr::basic(BasicCondition::username(CompareOp::Less, "zed"));
        assert!(evaluate_where(&row, &expr));
        // A strict prefix compares as smaller.
        let expr = WhereExpr::basic(BasicCondition::username(CompareOp::Greater, "mallor"));
        assert!(evaluate_where(&row, &expr));
    }

    #[test]
    fn test_and_or_combinations() {
        let row = row();
        let id_is_5 = WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 5));
        let id_is_6 = WhereExpr::basic(BasicCondition::id(CompareOp::Equal, 6));
        let name_matches = WhereExpr::basic(BasicCondition::username(CompareOp::Equal, "mallory"));

        assert!(evaluate_where(
            &row,
            &WhereExpr::and(id_is_5.clone(), name_matches.clone())
        ));
        assert!(!evaluate_where(
            &row,
            &WhereExpr::and(id_is_6.clone(), name_matches.clone())
        ));
        assert!(evaluate_where(
            &row,
            &WhereExpr::or(id_is_6.clone(), name_matches)
        ));
        assert!(!evaluate_where(
            &row,
            &WhereExpr::or(id_is_6.clone(), id_is_6)
        ));
    }

    #[test]
    fn test_parenthesized_or_under_and() {
        // (id < 2 OR id > 2) AND username = "a"
        let expr = WhereExpr::and(
            WhereExpr::or(
                WhereExpr::basic(BasicCondition::id(CompareOp::Less, 2)),
                WhereExpr::basic(BasicCondition::id(CompareOp::Greater, 2)),
            ),
            WhereExpr::basic(BasicCondition::username(CompareOp::Equal, "a")),
        );

        assert!(evaluate_where(&Row::new(1, "a", "a@e"), &expr));
        assert!(!evaluate_where(&Row::new(2, "a", "b@e"), &expr));
        assert!(!evaluate_where(&Row::new(3, "b", "c@e"), &expr));
    }
}
