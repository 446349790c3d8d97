use std::{cmp::Ordering, ops::Range};

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    table::{
        event::{RowEvent, RowEvents},
        row::TelemetryRow,
    },
    telemetry::SharedFormatter,
};

// ================================================================================================
// Sort Options
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Which value key rows are ordered by, and in which direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOptions {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortOptions {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Desc,
        }
    }
}

type SortKey = Option<OrderedFloat<f64>>;

/// Orders two derived keys under `direction`.
///
/// Unparseable keys (`None`) rank after every parseable key in both
/// directions and compare equal among themselves, so they keep arrival order
/// at the tail of the sequence.
#[inline]
fn compare_keys(direction: SortDirection, a: SortKey, b: SortKey) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Asc => a.cmp(&b),
            SortDirection::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug)]
pub(crate) struct Entry<D> {
    key: SortKey,
    row: TelemetryRow<D>,
}

impl<D> Entry<D> {
    #[inline]
    pub(crate) fn key(&self) -> Option<f64> {
        self.key.map(|k| k.0)
    }

    pub(crate) fn into_row(self) -> TelemetryRow<D> {
        self.row
    }
}

// ================================================================================================
// Sorted Collection
// ================================================================================================

/// An ordered sequence of telemetry rows keyed by a derived numeric value.
///
/// Keys are derived once per row, on insertion or when the sort options
/// change, by the formatter of the sort key. Lookups are binary searches over
/// the cached keys.
///
/// # Ordering Guarantees
///
/// - Adjacent rows `a`, `b` always satisfy `compare(a, b) <= 0`.
/// - Rows with equal keys keep their insertion order.
/// - Rows whose key cannot be parsed are appended after every parseable row.
///
/// # Performance Characteristics
///
/// - `add_one`: O(log n) search plus the `Vec` shift
/// - `add_many`: O(k log k + n + k), a single merge pass
/// - `sorted_index` / `sorted_last_index`: O(log n)
/// - `sort_by`: O(n log n), re-derives every key
///
/// # Examples
///
/// ```rust
/// # use std::sync::Arc;
/// # use serde_json::json;
/// # use telemetry_table::table::{SortedCollection, SortOptions, TelemetryRow};
/// # use telemetry_table::telemetry::{EntityKey, JsonFormatKind, JsonFormatter};
/// let mut rows = SortedCollection::new();
/// rows.sort_by(
///     SortOptions::asc("utc"),
///     Arc::new(JsonFormatter::new("utc", JsonFormatKind::Utc)),
/// );
///
/// for t in [5, 1, 3] {
///     rows.add_one(TelemetryRow::new(EntityKey::from("sat"), json!({ "utc": t })));
/// }
///
/// let keys: Vec<_> = rows.keys().collect();
/// assert_eq!(keys, vec![Some(1.0), Some(3.0), Some(5.0)]);
/// ```
#[derive(Debug)]
pub struct SortedCollection<D> {
    entries: Vec<Entry<D>>,
    options: Option<SortOptions>,
    formatter: Option<SharedFormatter<D>>,
    events: RowEvents<D>,
}

impl<D> Default for SortedCollection<D> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            options: None,
            formatter: None,
            events: RowEvents::default(),
        }
    }
}

impl<D> SortedCollection<D> {
    /// Creates an empty, unsorted collection. Until [`sort_by`](Self::sort_by)
    /// is called every key is unparseable and rows keep arrival order.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn options(&self) -> Option<&SortOptions> {
        self.options.as_ref()
    }

    #[inline]
    fn direction(&self) -> SortDirection {
        self.options
            .as_ref()
            .map(|o| o.direction)
            .unwrap_or_default()
    }

    #[inline]
    fn derive_key(&self, row: &TelemetryRow<D>) -> SortKey {
        self.formatter
            .as_ref()
            .and_then(|f| f.parse_key(row.datum()))
            .map(OrderedFloat)
    }

    /// The derived key of `row` under the current options.
    pub fn key_of(&self, row: &TelemetryRow<D>) -> Option<f64> {
        self.derive_key(row).map(|k| k.0)
    }

    /// Listener for `add` / `remove` / `sort` notifications, on an unbounded
    /// channel. See [`RowEvents::subscribe`].
    pub fn subscribe(&mut self) -> async_channel::Receiver<RowEvent<D>> {
        self.events.subscribe()
    }

    // ============================================================================================
    // Sorting
    // ============================================================================================

    /// Sets the sort options and re-sorts every held row.
    ///
    /// Keys are re-derived with `formatter`, since the key itself may have
    /// changed (e.g. a different time system). The sort is stable, so rows
    /// with equal keys keep their relative order.
    pub fn sort_by(&mut self, options: SortOptions, formatter: SharedFormatter<D>) {
        self.resort(options, formatter);
        self.notify_sorted();
    }

    /// [`sort_by`](Self::sort_by) without the `Sorted` notification, for
    /// callers that move rows around before announcing the new order.
    pub(crate) fn resort(&mut self, options: SortOptions, formatter: SharedFormatter<D>) {
        tracing::debug!(
            key = %options.key,
            direction = %options.direction,
            rows = self.entries.len(),
            "Re-sorting collection"
        );
        self.options = Some(options);
        self.formatter = Some(formatter);

        let mut entries = std::mem::take(&mut self.entries);
        for entry in entries.iter_mut() {
            entry.key = self.derive_key(&entry.row);
        }
        let direction = self.direction();
        entries.sort_by(|a, b| compare_keys(direction, a.key, b.key));
        self.entries = entries;
    }

    pub(crate) fn notify_sorted(&mut self) {
        self.events.emit_with(|| RowEvent::Sorted);
    }

    // ============================================================================================
    // Binary Search
    // ============================================================================================

    #[inline]
    fn lower_bound(&self, key: SortKey) -> usize {
        let direction = self.direction();
        self.entries
            .partition_point(|e| compare_keys(direction, e.key, key) == Ordering::Less)
    }

    #[inline]
    fn upper_bound(&self, key: SortKey) -> usize {
        let direction = self.direction();
        self.entries
            .partition_point(|e| compare_keys(direction, e.key, key) != Ordering::Greater)
    }

    /// First position where a row keyed `value` could be inserted without
    /// breaking the order, i.e. before any rows with an equal key.
    ///
    /// NaN is treated as unparseable and maps to the start of the
    /// unparseable tail.
    pub fn sorted_index(&self, value: f64) -> usize {
        self.lower_bound(Some(value).filter(|v| !v.is_nan()).map(OrderedFloat))
    }

    /// Last position where a row keyed `value` could be inserted without
    /// breaking the order, i.e. after any rows with an equal key.
    pub fn sorted_last_index(&self, value: f64) -> usize {
        self.upper_bound(Some(value).filter(|v| !v.is_nan()).map(OrderedFloat))
    }

    // ============================================================================================
    // Insertion
    // ============================================================================================

    /// Inserts one row after any rows with an equal key and returns its index.
    ///
    /// Emits `Added` with the single row and its index.
    pub fn add_one(&mut self, row: TelemetryRow<D>) -> usize {
        let key = self.derive_key(&row);
        let index = self.upper_bound(key);
        tracing::trace!(index, key = ?key.map(|k| k.0), "Row inserted");

        self.events.emit_with(|| RowEvent::Added {
            rows: vec![row.clone()],
            index: Some(index),
        });
        self.entries.insert(index, Entry { key, row });
        index
    }

    /// Inserts a batch of rows and emits a single `Added` for the whole batch.
    ///
    /// The result is identical to calling [`add_one`](Self::add_one) for each
    /// row in order. Returns the number of rows inserted.
    pub fn add_many<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = TelemetryRow<D>>,
    {
        let mut incoming: Vec<Entry<D>> = rows
            .into_iter()
            .map(|row| Entry {
                key: self.derive_key(&row),
                row,
            })
            .collect();
        if incoming.is_empty() {
            return 0;
        }

        let direction = self.direction();
        incoming.sort_by(|a, b| compare_keys(direction, a.key, b.key));
        let count = incoming.len();

        self.events.emit_with(|| RowEvent::Added {
            rows: incoming.iter().map(|e| e.row.clone()).collect(),
            index: None,
        });
        self.merge_sorted(incoming);
        count
    }

    /// Merges an already sorted run into the collection without notifying.
    /// Existing rows win ties, which keeps the arrival order of duplicates.
    pub(crate) fn merge_sorted(&mut self, incoming: Vec<Entry<D>>) {
        let direction = self.direction();
        let appends_cleanly = match (self.entries.last(), incoming.first()) {
            (Some(last), Some(first)) => {
                compare_keys(direction, last.key, first.key) != Ordering::Greater
            }
            _ => true,
        };

        if appends_cleanly {
            self.entries.extend(incoming);
        } else {
            let existing = std::mem::take(&mut self.entries);
            self.entries = existing
                .into_iter()
                .merge_by(incoming, |a, b| {
                    compare_keys(direction, a.key, b.key) != Ordering::Greater
                })
                .collect();
        }
    }

    // ============================================================================================
    // Removal
    // ============================================================================================

    /// Removes every row and emits `Removed` with all of them.
    pub fn clear(&mut self) -> Vec<TelemetryRow<D>> {
        let removed: Vec<_> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(Entry::into_row)
            .collect();
        if !removed.is_empty() {
            self.events.emit_with(|| RowEvent::Removed {
                rows: removed.clone(),
            });
        }
        removed
    }

    /// Removes every row matching `predicate`, emitting one `Removed`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<TelemetryRow<D>>
    where
        F: FnMut(&TelemetryRow<D>) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| predicate(&e.row));
        self.entries = kept;

        let removed: Vec<_> = removed.into_iter().map(Entry::into_row).collect();
        if !removed.is_empty() {
            self.events.emit_with(|| RowEvent::Removed {
                rows: removed.clone(),
            });
        }
        removed
    }

    /// Splices out `[0, end)` and emits `Removed` for it.
    pub(crate) fn discard_front(&mut self, end: usize) -> Vec<TelemetryRow<D>> {
        let end = end.min(self.entries.len());
        let discarded: Vec<_> = self
            .entries
            .drain(..end)
            .map(Entry::into_row)
            .collect();
        if !discarded.is_empty() {
            self.events.emit_with(|| RowEvent::Removed {
                rows: discarded.clone(),
            });
        }
        discarded
    }

    /// Splices out `[0, end)` silently, keeping the derived keys.
    pub(crate) fn take_front(&mut self, end: usize) -> Vec<Entry<D>> {
        self.take_range(0..end)
    }

    /// Splices out `range` silently, keeping the derived keys. The range is
    /// clamped to the held rows.
    pub(crate) fn take_range(&mut self, range: Range<usize>) -> Vec<Entry<D>> {
        let end = range.end.min(self.entries.len());
        let start = range.start.min(end);
        self.entries.drain(start..end).collect()
    }

    /// Adds a sorted run, emitting one `Added` for it.
    ///
    /// A run whose keys are not below any parseable key held here is spliced
    /// in front of the unparseable tail, found by binary search. Any other run
    /// is merged.
    pub(crate) fn promote(&mut self, run: Vec<Entry<D>>) -> usize {
        let Some(first) = run.first() else {
            return 0;
        };

        let direction = self.direction();
        let tail = self.lower_bound(None);
        let in_order = tail
            .checked_sub(1)
            .and_then(|last| self.entries.get(last))
            .is_none_or(|last| compare_keys(direction, last.key, first.key) != Ordering::Greater);

        let count = run.len();
        self.events.emit_with(|| RowEvent::Added {
            rows: run.iter().map(|e| e.row.clone()).collect(),
            index: None,
        });
        if in_order {
            self.entries.splice(tail..tail, run);
        } else {
            tracing::trace!(count, "Promoted run overlaps held rows, merging");
            self.merge_sorted(run);
        }
        count
    }

    // ============================================================================================
    // Iteration
    // ============================================================================================

    pub fn get(&self, index: usize) -> Option<&TelemetryRow<D>> {
        self.entries.get(index).map(|e| &e.row)
    }

    pub fn rows(&self) -> impl Iterator<Item = &TelemetryRow<D>> {
        self.entries.iter().map(|e| &e.row)
    }

    /// Derived keys in collection order; `None` marks unparseable rows.
    pub fn keys(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.entries.iter().map(Entry::key)
    }

    pub fn first_key(&self) -> Option<f64> {
        self.entries.first().and_then(Entry::key)
    }

    pub fn last_key(&self) -> Option<f64> {
        self.entries.iter().rev().find_map(Entry::key)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
    use serde_json::{Value, json};

    use super::*;
    use crate::telemetry::{EntityKey, JsonFormatKind, JsonFormatter};

    // ============================================================================
    // Test Helpers
    // ============================================================================

    fn row(t: i64) -> TelemetryRow<Value> {
        TelemetryRow::new(EntityKey::from("sat.battery"), json!({ "utc": t }))
    }

    /// Row with a tag so duplicates can be told apart.
    fn tagged(t: i64, tag: u32) -> TelemetryRow<Value> {
        TelemetryRow::new(EntityKey::from("sat.battery"), json!({ "utc": t, "tag": tag }))
    }

    fn garbage() -> TelemetryRow<Value> {
        TelemetryRow::new(EntityKey::from("sat.battery"), json!({ "utc": "not a time" }))
    }

    fn sorted(direction: SortDirection) -> SortedCollection<Value> {
        let mut c = SortedCollection::new();
        c.sort_by(
            SortOptions {
                key: "utc".to_string(),
                direction,
            },
            Arc::new(JsonFormatter::new("utc", JsonFormatKind::Utc)),
        );
        c
    }

    fn keys(c: &SortedCollection<Value>) -> Vec<Option<f64>> {
        c.keys().collect()
    }

    fn tags(c: &SortedCollection<Value>) -> Vec<u64> {
        c.rows()
            .map(|r| r.datum()["tag"].as_u64().unwrap())
            .collect()
    }

    fn assert_ordered(c: &SortedCollection<Value>) {
        let direction = c.direction();
        let ks: Vec<_> = c.entries.iter().map(|e| e.key).collect();
        for pair in ks.windows(2) {
            assert_ne!(
                compare_keys(direction, pair[0], pair[1]),
                Ordering::Greater,
                "order violated: {:?}",
                ks
            );
        }
    }

    // ============================================================================
    // Insertion
    // ============================================================================

    #[test]
    fn add_one_sorts_ascending() {
        let mut c = sorted(SortDirection::Asc);
        assert_eq!(c.add_one(row(5)), 0);
        assert_eq!(c.add_one(row(1)), 0);
        assert_eq!(c.add_one(row(3)), 1);
        assert_eq!(keys(&c), vec![Some(1.0), Some(3.0), Some(5.0)]);
    }

    #[test]
    fn add_one_sorts_descending() {
        let mut c = sorted(SortDirection::Desc);
        for t in [5, 1, 3] {
            c.add_one(row(t));
        }
        assert_eq!(keys(&c), vec![Some(5.0), Some(3.0), Some(1.0)]);
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            let mut c = sorted(direction);
            c.add_one(tagged(10, 0));
            c.add_one(tagged(20, 1));
            c.add_one(tagged(10, 2));
            c.add_one(tagged(10, 3));
            c.add_one(tagged(20, 4));

            let expected = match direction {
                SortDirection::Asc => vec![0, 2, 3, 1, 4],
                SortDirection::Desc => vec![1, 4, 0, 2, 3],
            };
            assert_eq!(tags(&c), expected, "direction {direction}");
        }
    }

    #[test]
    fn unparseable_keys_go_to_the_end() {
        let mut c = sorted(SortDirection::Asc);
        c.add_one(row(10));
        assert_eq!(c.add_one(garbage()), 1);
        c.add_one(row(30));
        c.add_one(row(20));

        assert_eq!(keys(&c), vec![Some(10.0), Some(20.0), Some(30.0), None]);
        assert_eq!(c.last_key(), Some(30.0));
    }

    #[test]
    fn random_insertion_keeps_order_and_stability() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut input: Vec<(i64, u32)> = (0..200).map(|i| ((i % 37) as i64, i)).collect();
        input.shuffle(&mut rng);

        let mut c = sorted(SortDirection::Asc);
        for (t, tag) in &input {
            c.add_one(tagged(*t, *tag));
            assert_ordered(&c);
        }

        // Stable: equal keys appear in the order they were inserted.
        let by_key = input.iter().into_group_map_by(|(t, _)| *t);
        for (t, group) in by_key {
            let expected: Vec<u64> = group.iter().map(|(_, tag)| *tag as u64).collect();
            let actual: Vec<u64> = c
                .rows()
                .filter(|r| r.datum()["utc"].as_i64() == Some(t))
                .map(|r| r.datum()["tag"].as_u64().unwrap())
                .collect();
            assert_eq!(actual, expected, "key {t}");
        }
    }

    #[test]
    fn add_many_matches_repeated_add_one() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut input: Vec<(i64, u32)> = (0..100).map(|i| ((i % 13) as i64, i)).collect();
        input.shuffle(&mut rng);
        let (first, second) = input.split_at(40);

        let mut one_by_one = sorted(SortDirection::Asc);
        let mut batched = sorted(SortDirection::Asc);
        for (t, tag) in first.iter().chain(second) {
            one_by_one.add_one(tagged(*t, *tag));
        }
        batched.add_many(first.iter().map(|(t, tag)| tagged(*t, *tag)));
        batched.add_many(second.iter().map(|(t, tag)| tagged(*t, *tag)));

        assert_eq!(tags(&batched), tags(&one_by_one));
    }

    #[test]
    fn add_many_emits_one_batch() {
        let mut c = sorted(SortDirection::Asc);
        let events = c.subscribe();

        assert_eq!(c.add_many(vec![row(3), row(1), row(2)]), 3);
        assert_eq!(c.add_many(Vec::new()), 0);

        match events.try_recv().unwrap() {
            RowEvent::Added { rows, index } => {
                assert_eq!(rows.len(), 3);
                assert_eq!(index, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn add_one_emits_index() {
        let mut c = sorted(SortDirection::Asc);
        c.add_one(row(10));
        let events = c.subscribe();
        c.add_one(row(5));

        match events.try_recv().unwrap() {
            RowEvent::Added { rows, index } => {
                assert_eq!(rows, vec![row(5)]);
                assert_eq!(index, Some(0));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ============================================================================
    // Binary Search
    // ============================================================================

    #[test]
    fn sorted_index_biases_before_equal_keys() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many(vec![row(10), row(20), row(20), row(20), row(30)]);

        assert_eq!(c.sorted_index(20.0), 1);
        assert_eq!(c.sorted_last_index(20.0), 4);
        assert_eq!(c.sorted_index(5.0), 0);
        assert_eq!(c.sorted_last_index(35.0), 5);
        assert_eq!(c.sorted_index(25.0), c.sorted_last_index(25.0));
    }

    #[test]
    fn sorted_index_stops_before_unparseable_tail() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many(vec![row(10), garbage(), row(20)]);
        assert_eq!(c.sorted_last_index(100.0), 2);
        assert_eq!(c.sorted_index(f64::NAN), 2);
    }

    // ============================================================================
    // Sorting & Removal
    // ============================================================================

    #[test]
    fn sort_by_rederives_keys() {
        let mut c = sorted(SortDirection::Asc);
        c.add_one(TelemetryRow::new(EntityKey::from("a"), json!({ "utc": 1, "met": 30 })));
        c.add_one(TelemetryRow::new(EntityKey::from("a"), json!({ "utc": 2, "met": 10 })));
        c.add_one(TelemetryRow::new(EntityKey::from("a"), json!({ "utc": 3, "met": 20 })));
        let events = c.subscribe();

        c.sort_by(
            SortOptions::asc("met"),
            Arc::new(JsonFormatter::new("met", JsonFormatKind::Number)),
        );

        assert_eq!(keys(&c), vec![Some(10.0), Some(20.0), Some(30.0)]);
        assert!(matches!(events.try_recv().unwrap(), RowEvent::Sorted));
    }

    #[test]
    fn clear_emits_all_rows() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many(vec![row(1), row(2)]);
        let events = c.subscribe();

        assert_eq!(c.clear().len(), 2);
        assert!(c.is_empty());
        assert_eq!(events.try_recv().unwrap().rows().len(), 2);

        // Nothing left, nothing emitted.
        assert!(c.clear().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn remove_where_keeps_order() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many((0..10).map(row));
        let removed = c.remove_where(|r| r.datum()["utc"].as_i64().unwrap() % 2 == 0);

        assert_eq!(removed.len(), 5);
        assert_eq!(
            keys(&c),
            vec![Some(1.0), Some(3.0), Some(5.0), Some(7.0), Some(9.0)]
        );
    }

    #[test]
    fn promote_lands_before_unparseable_tail() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many(vec![row(1), garbage()]);

        let mut future = sorted(SortDirection::Asc);
        future.add_many(vec![row(5), row(6)]);
        let run = future.take_front(2);

        assert_eq!(c.promote(run), 2);
        assert_eq!(keys(&c), vec![Some(1.0), Some(5.0), Some(6.0), None]);
        assert!(future.is_empty());
    }

    #[test]
    fn promote_merges_a_run_that_overlaps_held_rows() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many(vec![tagged(10, 0), tagged(20, 1), tagged(30, 2), garbage()]);
        let events = c.subscribe();

        let mut future = sorted(SortDirection::Asc);
        future.add_many(vec![tagged(1, 3), tagged(20, 4), tagged(40, 5)]);
        let run = future.take_front(3);

        assert_eq!(c.promote(run), 3);
        assert_ordered(&c);
        assert_eq!(
            keys(&c),
            vec![
                Some(1.0),
                Some(10.0),
                Some(20.0),
                Some(20.0),
                Some(30.0),
                Some(40.0),
                None
            ]
        );
        // Held rows win ties.
        let tied: Vec<_> = c
            .rows()
            .skip(2)
            .take(2)
            .map(|r| r.datum()["tag"].as_u64().unwrap())
            .collect();
        assert_eq!(tied, vec![1, 4]);
        assert!(matches!(
            events.try_recv(),
            Ok(RowEvent::Added { index: None, ref rows }) if rows.len() == 3
        ));
    }

    #[test]
    fn take_range_is_clamped_and_silent() {
        let mut c = sorted(SortDirection::Asc);
        c.add_many((0..5).map(row));
        let events = c.subscribe();

        let taken = c.take_range(3..10);
        assert_eq!(
            taken.iter().map(|e| e.key()).collect::<Vec<_>>(),
            vec![Some(3.0), Some(4.0)]
        );
        assert!(c.take_range(7..9).is_empty());
        assert_eq!(c.len(), 3);
        assert!(events.is_empty());
    }
}
