//! Per-field secondary index over one dataset snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::point::{DataPoint, FieldValue};

/// Fields indexed by default. Dotted metadata paths are evaluated by full
/// scan instead, which keeps incremental updates O(batch) without tracking
/// open-ended metadata keys.
pub const DEFAULT_INDEXED_FIELDS: [&str; 4] = ["category", "source", "value", "timestamp"];

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Secondary index enabling sub-linear condition evaluation.
///
/// An index is always built from exactly one dataset snapshot, identified
/// by its epoch. [`FilterIndex::extend`] covers batches appended to that
/// same snapshot; a wholesale dataset change requires a fresh
/// [`FilterIndex::build`], never a mix of two snapshots.
#[derive(Debug)]
pub struct FilterIndex {
    epoch: u64,
    covered: u32,
    fields: HashMap<String, FieldIndex>,
}

/// Lookup structures for one field.
#[derive(Debug, Default)]
struct FieldIndex {
    /// value -> positions holding that value, ascending.
    by_value: HashMap<FieldValue, Vec<u32>>,
    /// (value, position) pairs, sorted by value once `sorted` is set.
    ordered: Vec<(FieldValue, u32)>,
    sorted: bool,
}

impl FieldIndex {
    fn insert(&mut self, value: FieldValue, position: u32) {
        self.by_value
            .entry(value.clone())
            .or_default()
            .push(position);
        self.ordered.push((value, position));
        self.sorted = false;
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.ordered
                .sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            self.sorted = true;
        }
    }
}

impl FilterIndex {
    /// Builds a fresh index over `snapshot` for the given fields.
    ///
    /// Points where a field does not resolve are skipped for that field
    /// only; they remain reachable through the evaluator's scan fallback.
    #[must_use]
    pub fn build<S: AsRef<str>>(snapshot: &[DataPoint], fields: &[S]) -> Self {
        let mut index = Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            covered: 0,
            fields: fields
                .iter()
                .map(|f| (f.as_ref().to_string(), FieldIndex::default()))
                .collect(),
        };
        index.extend(snapshot);
        index
    }

    /// Builds an index over the default field set.
    #[must_use]
    pub fn build_default(snapshot: &[DataPoint]) -> Self {
        Self::build(snapshot, &DEFAULT_INDEXED_FIELDS)
    }

    /// Incrementally indexes a batch appended to the covered snapshot.
    ///
    /// Cost is O(batch x fields), independent of how much is already
    /// indexed; range structures re-sort lazily on the next range lookup.
    pub fn extend(&mut self, batch: &[DataPoint]) {
        for point in batch {
            let position = self.covered;
            for (field, entries) in &mut self.fields {
                if let Some(value) = point.field(field) {
                    entries.insert(value, position);
                }
            }
            self.covered += 1;
        }
    }

    /// Snapshot identity this index was built from.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of points covered by the index.
    #[must_use]
    pub const fn covered(&self) -> usize {
        self.covered as usize
    }

    /// Whether lookups exist for the given field.
    #[must_use]
    pub fn covers(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Positions whose field equals `value` exactly.
    #[must_use]
    pub fn eq_positions(&self, field: &str, value: &FieldValue) -> Option<&[u32]> {
        self.fields
            .get(field)?
            .by_value
            .get(value)
            .map(Vec::as_slice)
    }

    /// All positions where the field resolved at index-build time.
    #[must_use]
    pub fn present_positions(&self, field: &str) -> Option<Vec<u32>> {
        self.fields
            .get(field)
            .map(|entries| entries.ordered.iter().map(|&(_, p)| p).collect())
    }

    /// Positions whose field value lies within the given bounds.
    ///
    /// `None` bounds are unbounded on that side; `*_inclusive` selects
    /// between `Between` (inclusive) and `Gt`/`Lt` (strict) semantics.
    /// Comparisons only make sense within one value kind, so the range is
    /// clamped to the region of entries sharing the bounds' variant; other
    /// variants stored under the same field never match. At least one
    /// bound is required.
    #[must_use]
    pub fn range_positions(
        &mut self,
        field: &str,
        low: Option<&FieldValue>,
        low_inclusive: bool,
        high: Option<&FieldValue>,
        high_inclusive: bool,
    ) -> Option<Vec<u32>> {
        let rank = low.or(high)?.variant_rank();
        let entries = self.fields.get_mut(field)?;
        entries.ensure_sorted();
        let ordered = &entries.ordered;

        let start = match low {
            Some(low) => ordered.partition_point(|(v, _)| {
                if low_inclusive { v < low } else { v <= low }
            }),
            None => ordered.partition_point(|(v, _)| v.variant_rank() < rank),
        };
        let end = match high {
            Some(high) => ordered.partition_point(|(v, _)| {
                if high_inclusive { v <= high } else { v < high }
            }),
            None => ordered.partition_point(|(v, _)| v.variant_rank() <= rank),
        };

        if start >= end {
            return Some(Vec::new());
        }
        Some(ordered[start..end].iter().map(|&(_, p)| p).collect())
    }

    /// Total number of indexed entries across all fields.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.fields.values().map(|f| f.ordered.len()).sum()
    }

    /// Names of the indexed fields, sorted for stable output.
    #[must_use]
    pub fn indexed_fields(&self) -> Vec<String> {
        let mut fields: Vec<_> = self.fields.keys().cloned().collect();
        fields.sort();
        fields
    }
}
