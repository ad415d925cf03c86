//! Scan planning.
//!
//! Every SELECT (and the scan halves of UPDATE/DELETE) runs one of three
//! strategies: a point lookup on the primary key, a forward range scan
//! from a start key, or a full scan. Candidates are generated from the
//! WHERE shape and scored against the table statistics; without valid
//! statistics a fixed cost per strategy decides.

use crate::statement::{CompareOp, ConditionValue, Field, WhereExpr};
use crate::statistics::TableStatistics;

/// Fixed fallback costs when no usable statistics exist.
const FALLBACK_INDEX_LOOKUP_COST: f64 = 1.0;
const FALLBACK_RANGE_SCAN_COST: f64 = 10.0;
const FALLBACK_FULL_SCAN_COST: f64 = 100.0;

/// Per-row predicate evaluation overhead in the full-scan cost.
const PREDICATE_EVAL_COST: f64 = 0.1;

/// Assumed selectivity of a compound predicate.
const COMPOUND_SELECTIVITY: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    FullScan,
    IndexLookup,
    RangeScan,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryPlan {
    pub kind: PlanKind,
    pub start_key: u32,
    pub has_start_key: bool,
    /// Always true today; backward scans are a reserved extension.
    pub forward: bool,
    pub estimated_cost: f64,
    pub estimated_rows: u32,
}

impl QueryPlan {
    fn full_scan() -> Self {
        QueryPlan {
            kind: PlanKind::FullScan,
            start_key: 0,
            has_start_key: false,
            forward: true,
            estimated_cost: 0.0,
            estimated_rows: 0,
        }
    }

    fn index_lookup(key: u32) -> Self {
        QueryPlan {
            kind: PlanKind::IndexLookup,
            start_key: key,
            has_start_key: true,
            forward: true,
            estimated_cost: 0.0,
            estimated_rows: 0,
        }
    }

    fn range_scan(start_key: u32) -> Self {
        QueryPlan {
            kind: PlanKind::RangeScan,
            start_key,
            has_start_key: true,
            forward: true,
            estimated_cost: 0.0,
            estimated_rows: 0,
        }
    }
}

/// Generates the candidate plans the WHERE shape admits, scores each, and
/// keeps the cheapest. Ties go to the earlier candidate, so the point
/// lookup wins outright when costs are equal.
pub fn plan_query(filter: Option<&WhereExpr>, stats: &TableStatistics) -> QueryPlan {
    let mut candidates = Vec::with_capacity(3);
    if let Some(expr) = filter {
        if let Some(key) = equality_lookup_key(expr) {
            candidates.push(QueryPlan::index_lookup(key));
        }
        if let Some(start_key) = range_scan_start(expr) {
            candidates.push(QueryPlan::range_scan(start_key));
        }
    }
    candidates.push(QueryPlan::full_scan());

    let mut best: Option<QueryPlan> = None;
    for mut plan in candidates {
        plan.estimated_rows = estimate_result_rows(&plan, stats, filter);
        plan.estimated_cost = estimate_cost(&plan, stats, filter);
        let replace = match &best {
            None => true,
            Some(current) => plan.estimated_cost < current.estimated_cost,
        };
        if replace {
            best = Some(plan);
        }
    }
    let best = best.unwrap_or_else(QueryPlan::full_scan);
    crate::cairn_debug_log!(
        "[plan_query] chose {:?} (cost {:.2}, ~{} rows)",
        best.kind,
        best.estimated_cost,
        best.estimated_rows
    );
    best
}

/// A key usable for a point lookup: the whole WHERE is `id = k`, or some
/// top-level conjunct is.
fn equality_lookup_key(expr: &WhereExpr) -> Option<u32> {
    expr.conjuncts().into_iter().find_map(|conjunct| {
        if let WhereExpr::Basic(condition) = conjunct {
            if condition.field == Field::Id && condition.op == CompareOp::Equal {
                if let ConditionValue::Id(value) = condition.value {
                    return Some(value);
                }
            }
        }
        None
    })
}

/// A start key for a forward range scan. A lone `id < k` / `id <= k`
/// still scans from the front and lets the filter bound the range; inside
/// a compound WHERE only lower bounds qualify.
fn range_scan_start(expr: &WhereExpr) -> Option<u32> {
    if let WhereExpr::Basic(condition) = expr {
        if condition.field == Field::Id {
            if let ConditionValue::Id(value) = condition.value {
                return match condition.op {
                    CompareOp::Greater => Some(value.wrapping_add(1)),
                    CompareOp::GreaterEqual => Some(value),
                    CompareOp::Less | CompareOp::LessEqual => Some(0),
                    _ => None,
                };
            }
        }
        return None;
    }
    expr.conjuncts().into_iter().find_map(|conjunct| {
        if let WhereExpr::Basic(condition) = conjunct {
            if condition.field == Field::Id {
                if let ConditionValue::Id(value) = condition.value {
                    return match condition.op {
                        CompareOp::Greater => Some(value.wrapping_add(1)),
                        CompareOp::GreaterEqual => Some(value),
                        _ => None,
                    };
                }
            }
        }
        None
    })
}

/// How many rows the plan is expected to produce before the WHERE filter
/// prunes further. Zero when statistics cannot say.
pub fn estimate_result_rows(
    plan: &QueryPlan,
    stats: &TableStatistics,
    filter: Option<&WhereExpr>,
) -> u32 {
    if !stats.is_valid || stats.total_rows == 0 {
        return 0;
    }

    match plan.kind {
        PlanKind::IndexLookup => 1,
        PlanKind::RangeScan => {
            if let Some(WhereExpr::Basic(condition)) = filter {
                if condition.field == Field::Id {
                    if let ConditionValue::Id(value) = condition.value {
                        return estimate_id_range_rows(plan, stats, condition.op, value);
                    }
                }
            }
            // No single id bound to reason about; assume half the table.
            stats.total_rows / 2
        }
        PlanKind::FullScan => match filter {
            None => stats.total_rows,
            Some(WhereExpr::Basic(condition)) => {
                let cardinality = match condition.field {
                    Field::Id => stats.id_cardinality,
                    Field::Username => stats.username_cardinality,
                    Field::Email => stats.email_cardinality,
                };
                let selectivity = if cardinality > 0 {
                    1.0 / cardinality as f64
                } else {
                    1.0
                };
                at_least_one(stats.total_rows, selectivity)
            }
            Some(_) => at_least_one(stats.total_rows, COMPOUND_SELECTIVITY),
        },
    }
}

/// Uniform-distribution estimate over the covered slice of
/// `[id_min, id_max]`.
fn estimate_id_range_rows(
    plan: &QueryPlan,
    stats: &TableStatistics,
    op: CompareOp,
    value: u32,
) -> u32 {
    let mut start_id = if plan.has_start_key {
        plan.start_key
    } else {
        stats.id_min
    };
    let mut end_id = stats.id_max;

    match op {
        CompareOp::Less => {
            end_id = value.wrapping_sub(1).min(stats.id_max);
        }
        CompareOp::LessEqual => {
            end_id = value.min(stats.id_max);
        }
        CompareOp::Greater | CompareOp::GreaterEqual => {
            start_id = plan.start_key;
        }
        _ => {}
    }

    if stats.id_max > stats.id_min && end_id >= start_id {
        let covered = (end_id - start_id) as u64 + 1;
        let span = (stats.id_max - stats.id_min) as u64 + 1;
        let range_ratio = covered as f64 / span as f64;
        let estimated = (stats.total_rows as f64 * range_ratio) as u32;
        estimated.min(stats.total_rows)
    } else {
        0
    }
}

fn at_least_one(total_rows: u32, selectivity: f64) -> u32 {
    let estimated = (total_rows as f64 * selectivity) as u32;
    if estimated == 0 && total_rows > 0 {
        1
    } else {
        estimated
    }
}

/// Scores a plan. Lookup pays a descent; a range scan pays a descent plus
/// the rows it walks; a full scan pays every row plus per-row predicate
/// evaluation when a WHERE is present.
pub fn estimate_cost(
    plan: &QueryPlan,
    stats: &TableStatistics,
    filter: Option<&WhereExpr>,
) -> f64 {
    if !stats.is_valid || stats.total_rows == 0 {
        return match plan.kind {
            PlanKind::IndexLookup => FALLBACK_INDEX_LOOKUP_COST,
            PlanKind::RangeScan => FALLBACK_RANGE_SCAN_COST,
            PlanKind::FullScan => FALLBACK_FULL_SCAN_COST,
        };
    }

    let total = stats.total_rows as f64;
    match plan.kind {
        PlanKind::IndexLookup => total.log2() + 1.0,
        PlanKind::RangeScan => {
            total.log2() + estimate_result_rows(plan, stats, filter) as f64
        }
        PlanKind::FullScan => {
            let mut cost = total;
            if filter.is_some() {
                cost += total * PREDICATE_EVAL_COST;
            }
            cost
        }
    }
}
