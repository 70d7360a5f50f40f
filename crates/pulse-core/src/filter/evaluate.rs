//! Condition-chain evaluation over an indexed snapshot.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rayon::prelude::*;

use crate::filter::condition::{
    FilterCondition, FilterCriteria, FilterOperator, FilterValue, LogicalOperator, ScalarLiteral,
};
use crate::filter::index::FilterIndex;
use crate::point::{DataPoint, FieldValue};

/// Diagnostic counters for the filter subsystem.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FilterStats {
    /// Points in the evaluated snapshot.
    pub data_size: usize,
    /// Indexed entries across all fields.
    pub index_size: usize,
    /// Cached evaluation results.
    pub cache_size: usize,
    /// Fields with index coverage.
    pub indexed_fields: Vec<String>,
}

#[derive(Debug)]
struct CacheEntry {
    epoch: u64,
    covered: usize,
    positions: Arc<Vec<u32>>,
}

const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Evaluates filter criteria as a left-to-right condition chain.
///
/// The running result starts as all observations; each condition narrows
/// (And) or widens (Or) it according to its own connector. Groups run as
/// independent sub-chains combined the same way at the top level. Results
/// come back as snapshot positions in original order.
///
/// A small result cache keyed by (criteria fingerprint, index epoch,
/// snapshot length) short-circuits repeated evaluations of unchanged
/// inputs; it is invalidated by construction whenever either input moves.
#[derive(Debug)]
pub struct FilterEvaluator {
    cache: HashMap<u64, CacheEntry>,
    cache_capacity: usize,
}

impl Default for FilterEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterEvaluator {
    /// Creates an evaluator with the default cache capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Creates an evaluator with a specific cache capacity (0 disables).
    #[must_use]
    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            cache_capacity,
        }
    }

    /// Number of cached results.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Diagnostic counters for the given snapshot and index.
    #[must_use]
    pub fn stats(&self, snapshot_len: usize, index: &FilterIndex) -> FilterStats {
        FilterStats {
            data_size: snapshot_len,
            index_size: index.entry_count(),
            cache_size: self.cache.len(),
            indexed_fields: index.indexed_fields(),
        }
    }

    /// Evaluates `criteria`, returning matching positions in snapshot order.
    ///
    /// The index must cover the same snapshot (same point positions); the
    /// caller guarantees that by rebuilding or extending it alongside the
    /// snapshot. No evaluation failure propagates: malformed conditions
    /// match nothing and are logged at `warn`.
    pub fn evaluate(
        &mut self,
        criteria: &FilterCriteria,
        snapshot: &[DataPoint],
        index: &mut FilterIndex,
    ) -> Arc<Vec<u32>> {
        let fingerprint = criteria_fingerprint(criteria);
        if let Some(fp) = fingerprint {
            if let Some(entry) = self.cache.get(&fp) {
                if entry.epoch == index.epoch() && entry.covered == snapshot.len() {
                    return Arc::clone(&entry.positions);
                }
            }
        }

        let mut result = eval_chain(&criteria.conditions, snapshot, index);
        for group in &criteria.grouping {
            let sub = eval_chain(&group.conditions, snapshot, index);
            combine(&mut result, sub, group.connector());
        }

        let mut positions: Vec<u32> = result.into_iter().collect();
        positions.sort_unstable();
        let positions = Arc::new(positions);

        if let (Some(fp), true) = (fingerprint, self.cache_capacity > 0) {
            let (epoch, covered) = (index.epoch(), snapshot.len());
            // Entries for older snapshots can never hit again.
            self.cache.retain(|_, e| e.epoch == epoch && e.covered == covered);
            if self.cache.len() >= self.cache_capacity {
                self.cache.clear();
            }
            self.cache.insert(
                fp,
                CacheEntry {
                    epoch,
                    covered,
                    positions: Arc::clone(&positions),
                },
            );
        }

        positions
    }

    /// Evaluates and materializes the matching points, original order.
    pub fn apply(
        &mut self,
        criteria: &FilterCriteria,
        snapshot: &[DataPoint],
        index: &mut FilterIndex,
    ) -> Vec<DataPoint> {
        let positions = self.evaluate(criteria, snapshot, index);
        positions
            .iter()
            .filter_map(|&p| snapshot.get(p as usize))
            .cloned()
            .collect()
    }
}

fn criteria_fingerprint(criteria: &FilterCriteria) -> Option<u64> {
    let json = serde_json::to_string(criteria).ok()?;
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    Some(hasher.finish())
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "snapshot positions fit u32 at the supported dataset scale"
)]
fn all_positions(len: usize) -> HashSet<u32> {
    (0..len as u32).collect()
}

fn eval_chain(
    conditions: &[FilterCondition],
    snapshot: &[DataPoint],
    index: &mut FilterIndex,
) -> HashSet<u32> {
    let mut result = all_positions(snapshot.len());
    for condition in conditions {
        let matched = match_condition(condition, snapshot, index);
        combine(&mut result, matched, condition.connector());
    }
    result
}

fn combine(result: &mut HashSet<u32>, matched: HashSet<u32>, connector: LogicalOperator) {
    match connector {
        LogicalOperator::And => result.retain(|p| matched.contains(p)),
        LogicalOperator::Or => result.extend(matched),
    }
}

fn match_condition(
    condition: &FilterCondition,
    snapshot: &[DataPoint],
    index: &mut FilterIndex,
) -> HashSet<u32> {
    match (condition.operator, &condition.value) {
        (FilterOperator::Eq, FilterValue::Scalar(lit)) => {
            eq_match(&condition.field, lit, snapshot, index)
        }
        (FilterOperator::In, FilterValue::List(lits)) => {
            membership_match(&condition.field, lits, true, snapshot, index)
        }
        (FilterOperator::NotIn, FilterValue::List(lits)) => {
            membership_match(&condition.field, lits, false, snapshot, index)
        }
        (FilterOperator::Between, FilterValue::List(bounds)) if bounds.len() == 2 => range_match(
            &condition.field,
            bounds.first(),
            true,
            bounds.get(1),
            true,
            snapshot,
            index,
        ),
        (FilterOperator::Gt, FilterValue::Scalar(lit)) => {
            range_match(&condition.field, Some(lit), false, None, false, snapshot, index)
        }
        (FilterOperator::Lt, FilterValue::Scalar(lit)) => {
            range_match(&condition.field, None, false, Some(lit), false, snapshot, index)
        }
        _ => {
            // Fail closed: a malformed condition matches nothing rather
            // than aborting the filter pass.
            tracing::warn!(
                condition = %condition.id,
                field = %condition.field,
                operator = %condition.operator,
                "filter condition value shape does not fit its operator; matching nothing"
            );
            HashSet::new()
        }
    }
}

/// Aligns a condition bound with the variant of a stored field value.
///
/// Same variant passes through; ISO text promotes to an instant when the
/// field holds instants. Anything else cannot match.
fn align_bound(stored: &FieldValue, bound: &FieldValue) -> Option<FieldValue> {
    match (stored, bound) {
        (FieldValue::Instant(_), FieldValue::Text(_)) => bound.promote_to_instant(),
        _ if stored.variant_matches(bound) => Some(bound.clone()),
        _ => None,
    }
}

/// Indexed equality lookup aligned per stored variant: the raw bound
/// hits same-variant entries, and an ISO text bound additionally hits
/// instant entries after promotion. Mirrors what [`align_bound`] does
/// per point in the scan fallback, so mixed-variant fields behave the
/// same either way.
fn indexed_eq(index: &FilterIndex, field: &str, bound: &FieldValue) -> HashSet<u32> {
    let mut positions: HashSet<u32> = index
        .eq_positions(field, bound)
        .into_iter()
        .flatten()
        .copied()
        .collect();
    if let FieldValue::Text(_) = bound {
        if let Some(promoted) = bound.promote_to_instant() {
            positions.extend(index.eq_positions(field, &promoted).into_iter().flatten());
        }
    }
    positions
}

fn eq_match(
    field: &str,
    lit: &ScalarLiteral,
    snapshot: &[DataPoint],
    index: &mut FilterIndex,
) -> HashSet<u32> {
    let bound = lit.to_field_value();
    if index.covers(field) {
        return indexed_eq(index, field, &bound);
    }
    scan(snapshot, field, |value| {
        align_bound(value, &bound).is_some_and(|aligned| *value == aligned)
    })
}

fn membership_match(
    field: &str,
    lits: &[ScalarLiteral],
    keep_members: bool,
    snapshot: &[DataPoint],
    index: &mut FilterIndex,
) -> HashSet<u32> {
    if index.covers(field) {
        let mut members = HashSet::new();
        for lit in lits {
            members.extend(indexed_eq(index, field, &lit.to_field_value()));
        }
        if keep_members {
            return members;
        }
        // NotIn: positions where the field resolved but is not a member.
        // Absent fields never match, mirroring the scan fallback.
        return index
            .present_positions(field)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !members.contains(p))
            .collect();
    }

    let bounds: Vec<FieldValue> = lits.iter().map(ScalarLiteral::to_field_value).collect();
    scan(snapshot, field, move |value| {
        let is_member = bounds
            .iter()
            .any(|b| align_bound(value, b).is_some_and(|aligned| *value == aligned));
        is_member == keep_members
    })
}

#[expect(
    clippy::too_many_arguments,
    reason = "bounds travel as (value, inclusive) pairs for the three range operators"
)]
fn range_match(
    field: &str,
    low: Option<&ScalarLiteral>,
    low_inclusive: bool,
    high: Option<&ScalarLiteral>,
    high_inclusive: bool,
    snapshot: &[DataPoint],
    index: &mut FilterIndex,
) -> HashSet<u32> {
    if index.covers(field) {
        let low = low.map(ScalarLiteral::to_field_value);
        let high = high.map(ScalarLiteral::to_field_value);
        if let (Some(l), Some(h)) = (&low, &high) {
            if !l.variant_matches(h) {
                tracing::warn!(field, "range bounds are of mixed kinds; matching nothing");
                return HashSet::new();
            }
        }
        // Raw bounds hit same-variant entries only (the index clamps the
        // range to the bounds' variant region).
        let mut positions: HashSet<u32> = index
            .range_positions(field, low.as_ref(), low_inclusive, high.as_ref(), high_inclusive)
            .unwrap_or_default()
            .into_iter()
            .collect();
        // ISO text bounds additionally cover instant entries, matching the
        // per-point promotion done by the scan fallback.
        let promoted = |bound: &Option<FieldValue>| match bound {
            None => Some(None),
            Some(b @ FieldValue::Text(_)) => b.promote_to_instant().map(Some),
            Some(_) => None,
        };
        if let (Some(low_p), Some(high_p)) = (promoted(&low), promoted(&high)) {
            if low_p.is_some() || high_p.is_some() {
                positions.extend(
                    index
                        .range_positions(
                            field,
                            low_p.as_ref(),
                            low_inclusive,
                            high_p.as_ref(),
                            high_inclusive,
                        )
                        .unwrap_or_default(),
                );
            }
        }
        return positions;
    }

    let low = low.map(ScalarLiteral::to_field_value);
    let high = high.map(ScalarLiteral::to_field_value);
    scan(snapshot, field, move |value| {
        let low_ok = low.as_ref().map_or(true, |b| {
            align_bound(value, b).is_some_and(|b| if low_inclusive { *value >= b } else { *value > b })
        });
        let high_ok = high.as_ref().map_or(true, |b| {
            align_bound(value, b)
                .is_some_and(|b| if high_inclusive { *value <= b } else { *value < b })
        });
        low_ok && high_ok
    })
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "snapshot positions fit u32 at the supported dataset scale"
)]
fn scan<F>(snapshot: &[DataPoint], field: &str, predicate: F) -> HashSet<u32>
where
    F: Fn(&FieldValue) -> bool + Sync + Send,
{
    snapshot
        .par_iter()
        .enumerate()
        .filter_map(|(position, point)| {
            point
                .field(field)
                .filter(|value| predicate(value))
                .map(|_| position as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::condition::{
        FilterGroup, categorical_filter, date_range_filter, single_category_filter,
    };
    use crate::types::PointId;
    use chrono::{TimeZone, Utc};
    use serde_json::{Map, json};

    fn point(id: &str, value: f64, category: &str, minute: u32) -> DataPoint {
        let mut metadata = Map::new();
        metadata.insert(
            "status".to_string(),
            json!(if value > 50.0 { "degraded" } else { "healthy" }),
        );
        DataPoint {
            id: PointId::new(id).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            value,
            category: category.to_string(),
            source: "node-a".to_string(),
            metadata,
        }
    }

    fn sample() -> Vec<DataPoint> {
        vec![
            point("p0", 10.0, "cpu", 0),
            point("p1", 60.0, "memory", 1),
            point("p2", 30.0, "cpu", 2),
            point("p3", 80.0, "disk", 3),
        ]
    }

    fn apply(criteria: &FilterCriteria, snapshot: &[DataPoint]) -> Vec<String> {
        let mut index = FilterIndex::build_default(snapshot);
        let mut evaluator = FilterEvaluator::new();
        evaluator
            .apply(criteria, snapshot, &mut index)
            .iter()
            .map(|p| p.id.as_str().to_string())
            .collect()
    }

    #[test]
    fn empty_criteria_matches_everything_in_order() {
        let snapshot = sample();
        let matched = apply(&FilterCriteria::identity(), &snapshot);
        assert_eq!(matched, vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn eq_narrows_to_matching_category() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("category", "cpu", None)],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p0", "p2"]);
    }

    #[test]
    fn and_chain_narrows_progressively() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![
                single_category_filter("category", "cpu", None),
                FilterCondition::new(
                    "value",
                    FilterOperator::Gt,
                    FilterValue::Scalar(20.0.into()),
                ),
            ],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p2"]);
    }

    #[test]
    fn or_widens_the_running_result() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![
                single_category_filter("category", "cpu", None),
                single_category_filter("category", "disk", Some(LogicalOperator::Or)),
            ],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p0", "p2", "p3"]);
    }

    #[test]
    fn between_is_inclusive_on_both_ends() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![FilterCondition::new(
                "value",
                FilterOperator::Between,
                FilterValue::List(vec![10.0.into(), 60.0.into()]),
            )],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn in_and_not_in_partition_the_dataset() {
        let snapshot = sample();
        let members = |op| FilterCriteria {
            conditions: vec![categorical_filter(
                "category",
                vec!["cpu".into(), "disk".into()],
                op,
                None,
            )],
            grouping: Vec::new(),
        };
        let included = apply(&members(FilterOperator::In), &snapshot);
        let excluded = apply(&members(FilterOperator::NotIn), &snapshot);

        assert_eq!(included, vec!["p0", "p2", "p3"]);
        assert_eq!(excluded, vec!["p1"]);
        // Disjoint union equals the whole dataset.
        let mut all: Vec<_> = included.into_iter().chain(excluded).collect();
        all.sort();
        assert_eq!(all, vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn date_range_compares_as_instants() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![date_range_filter(
                "timestamp",
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 2, 0).unwrap(),
                None,
            )],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p1", "p2"]);
    }

    #[test]
    fn dotted_metadata_path_falls_back_to_scan() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("metadata.status", "degraded", None)],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p1", "p3"]);
    }

    #[test]
    fn unresolved_field_matches_nothing() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("metadata.missing", "x", None)],
            grouping: Vec::new(),
        };
        assert!(apply(&criteria, &snapshot).is_empty());
    }

    #[test]
    fn malformed_value_shape_fails_closed() {
        let snapshot = sample();
        // Between with a scalar instead of a range: matches nothing.
        let criteria = FilterCriteria {
            conditions: vec![FilterCondition::new(
                "value",
                FilterOperator::Between,
                FilterValue::Scalar(10.0.into()),
            )],
            grouping: Vec::new(),
        };
        assert!(apply(&criteria, &snapshot).is_empty());

        // Under Or it has no effect on the accumulated result.
        let criteria = FilterCriteria {
            conditions: vec![
                single_category_filter("category", "cpu", None),
                FilterCondition::new(
                    "value",
                    FilterOperator::Between,
                    FilterValue::Scalar(10.0.into()),
                )
                .with_logical_operator(LogicalOperator::Or),
            ],
            grouping: Vec::new(),
        };
        assert_eq!(apply(&criteria, &snapshot), vec!["p0", "p2"]);
    }

    #[test]
    fn between_requires_exactly_two_bounds() {
        let snapshot = sample();
        for bounds in [vec![10.0.into()], vec![10.0.into(), 30.0.into(), 60.0.into()]] {
            let criteria = FilterCriteria {
                conditions: vec![FilterCondition::new(
                    "value",
                    FilterOperator::Between,
                    FilterValue::List(bounds),
                )],
                grouping: Vec::new(),
            };
            assert!(apply(&criteria, &snapshot).is_empty());
        }
    }

    #[test]
    fn cross_type_comparison_never_matches() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("value", "cpu", None)],
            grouping: Vec::new(),
        };
        assert!(apply(&criteria, &snapshot).is_empty());
    }

    #[test]
    fn mixed_kind_field_agrees_between_index_and_scan() {
        let mut snapshot = sample();
        snapshot[0].metadata.insert("code".to_string(), json!(5.0));
        snapshot[1]
            .metadata
            .insert("code".to_string(), json!("overload"));
        snapshot[2].metadata.insert("code".to_string(), json!(42.0));

        let apply_with = |criteria: &FilterCriteria, index: &mut FilterIndex| {
            let mut evaluator = FilterEvaluator::new();
            evaluator
                .apply(criteria, &snapshot, index)
                .iter()
                .map(|p| p.id.as_str().to_string())
                .collect::<Vec<_>>()
        };

        let gt = FilterCriteria {
            conditions: vec![FilterCondition::new(
                "metadata.code",
                FilterOperator::Gt,
                FilterValue::Scalar(4.0.into()),
            )],
            grouping: Vec::new(),
        };
        let eq = FilterCriteria {
            conditions: vec![single_category_filter("metadata.code", "overload", None)],
            grouping: Vec::new(),
        };

        // Indexed: only the numeric entries fall in a numeric range, and
        // the text entry alone matches the text literal.
        let mut indexed = FilterIndex::build(&snapshot, &["metadata.code"]);
        assert_eq!(apply_with(&gt, &mut indexed), vec!["p0", "p2"]);
        assert_eq!(apply_with(&eq, &mut indexed), vec!["p1"]);

        // The scan fallback (field not covered) must agree.
        let mut scanned = FilterIndex::build_default(&snapshot);
        assert_eq!(apply_with(&gt, &mut scanned), vec!["p0", "p2"]);
        assert_eq!(apply_with(&eq, &mut scanned), vec!["p1"]);
    }

    #[test]
    fn groups_combine_as_independent_subchains() {
        let snapshot = sample();
        let group = FilterGroup {
            logical_operator: Some(LogicalOperator::Or),
            ..FilterGroup::new(vec![FilterCondition::new(
                "value",
                FilterOperator::Gt,
                FilterValue::Scalar(70.0.into()),
            )])
        };
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("category", "cpu", None)],
            grouping: vec![group],
        };
        // cpu points, widened by the >70 group (p3).
        assert_eq!(apply(&criteria, &snapshot), vec!["p0", "p2", "p3"]);
    }

    #[test]
    fn cache_hits_on_unchanged_inputs_and_misses_on_new_epoch() {
        let snapshot = sample();
        let criteria = FilterCriteria {
            conditions: vec![single_category_filter("category", "cpu", None)],
            grouping: Vec::new(),
        };
        let mut evaluator = FilterEvaluator::new();

        let mut index = FilterIndex::build_default(&snapshot);
        let first = evaluator.evaluate(&criteria, &snapshot, &mut index);
        let second = evaluator.evaluate(&criteria, &snapshot, &mut index);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(evaluator.cache_size(), 1);

        // A rebuilt index carries a new epoch: the stale entry is evicted.
        let mut rebuilt = FilterIndex::build_default(&snapshot);
        let third = evaluator.evaluate(&criteria, &snapshot, &mut rebuilt);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
        assert_eq!(evaluator.cache_size(), 1);
    }
}
