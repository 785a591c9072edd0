//! Buckets are the primary internal storage type.
//!
//! One bucket entry exists per distinct metric identity -- name, kind and
//! canonicalized tag set -- and holds that identity's accumulated state for
//! the current flush window. The whole store is drained and cleared exactly
//! once per flush; nothing survives a window.

use metric::{AggregateKind, MetricEvent, MetricKind, Payload, TagMap};
use seahash::SeaHasher;
use stats;
use std::collections::HashMap;
use std::collections::hash_map::{Entry, Values};
use std::hash::BuildHasherDefault;

/// A `HashMap` keyed with seahash, cheap to hash the string keys the store
/// produces in volume.
pub type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

/// Per-kind accumulation state. A closed set: the merge and export routines
/// match on this exhaustively, so a new kind cannot be half-wired.
#[derive(Debug, Clone, PartialEq)]
enum Accum {
    /// Running sum of a count metric.
    Sum(f64),
    /// Most recent value of a gauge metric.
    Set(f64),
    /// Raw samples of a histogram metric, in insertion order, plus the
    /// export configuration captured from the first event of the window.
    Samples {
        values: Vec<f64>,
        percentiles: Vec<f64>,
        aggregates: Vec<AggregateKind>,
    },
}

/// The accumulated state of one metric identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetric {
    /// The metric name.
    pub name: String,
    /// The identity tags.
    pub tags: TagMap,
    /// Timestamp of the last event merged into this entry, ms since epoch.
    pub last_updated: i64,
    value: Accum,
}

impl StoredMetric {
    fn seed(event: MetricEvent) -> StoredMetric {
        let value = match event.kind {
            MetricKind::Count => Accum::Sum(event.value),
            MetricKind::Gauge => Accum::Set(event.value),
            MetricKind::Histogram => Accum::Samples {
                values: vec![event.value],
                percentiles: event.percentiles,
                aggregates: event.aggregates,
            },
        };
        StoredMetric {
            name: event.name,
            tags: event.tags,
            last_updated: event.timestamp,
            value: value,
        }
    }

    // The event's kind always matches self's kind: the store key includes
    // the kind, so mismatched events land in different entries.
    fn merge(&mut self, event: MetricEvent) {
        match self.value {
            Accum::Sum(ref mut total) => *total += event.value,
            Accum::Set(ref mut current) => *current = event.value,
            // percentiles / aggregates are first-write-wins for the window;
            // a later event's conflicting options are silently ignored
            Accum::Samples { ref mut values, .. } => values.push(event.value),
        }
        self.last_updated = event.timestamp;
    }

    /// The kind of metric this entry accumulates.
    pub fn kind(&self) -> MetricKind {
        match self.value {
            Accum::Sum(_) => MetricKind::Count,
            Accum::Set(_) => MetricKind::Gauge,
            Accum::Samples { .. } => MetricKind::Histogram,
        }
    }

    /// The scalar value of a count or gauge entry, `None` for histograms.
    pub fn value(&self) -> Option<f64> {
        match self.value {
            Accum::Sum(total) => Some(total),
            Accum::Set(current) => Some(current),
            Accum::Samples { .. } => None,
        }
    }

    /// The raw samples of a histogram entry, `None` for counts and gauges.
    pub fn samples(&self) -> Option<&[f64]> {
        match self.value {
            Accum::Samples { ref values, .. } => Some(values),
            _ => None,
        }
    }

    fn push_payloads(&self, payloads: &mut Vec<Payload>) {
        match self.value {
            Accum::Sum(total) => payloads.push(Payload {
                kind: MetricKind::Count,
                name: self.name.clone(),
                value: total,
                tags: self.tags.clone(),
                timestamp: self.last_updated,
            }),
            Accum::Set(current) => payloads.push(Payload {
                kind: MetricKind::Gauge,
                name: self.name.clone(),
                value: current,
                tags: self.tags.clone(),
                timestamp: self.last_updated,
            }),
            Accum::Samples {
                ref values,
                ref percentiles,
                ref aggregates,
            } => {
                if percentiles.is_empty() && aggregates.is_empty() {
                    // nothing requested, nothing exported
                    return;
                }
                let sorted = stats::sorted(values);
                for &p in percentiles {
                    if let Some(value) = stats::percentile(&sorted, p) {
                        payloads.push(Payload {
                            kind: MetricKind::Gauge,
                            name: format!("{}.p{}", self.name, (p * 100.0).round() as i64),
                            value: value,
                            tags: self.tags.clone(),
                            timestamp: self.last_updated,
                        });
                    }
                }
                for &agg in aggregates {
                    if let Some(value) = stats::aggregate(agg, values) {
                        let kind = match agg {
                            AggregateKind::Count => MetricKind::Count,
                            _ => MetricKind::Gauge,
                        };
                        payloads.push(Payload {
                            kind: kind,
                            name: format!("{}.{}", self.name, agg),
                            value: value,
                            tags: self.tags.clone(),
                            timestamp: self.last_updated,
                        });
                    }
                }
            }
        }
    }
}

/// Buckets store all metrics between flushes.
pub struct Buckets {
    inner: HashMapSea<String, StoredMetric>,
}

impl Default for Buckets {
    fn default() -> Buckets {
        Buckets {
            inner: HashMapSea::default(),
        }
    }
}

impl Buckets {
    /// Create an empty store.
    pub fn new() -> Buckets {
        Default::default()
    }

    /// Derive the canonical identity key for an event.
    ///
    /// Two events with the same name and kind whose tag sets differ only in
    /// insertion order always derive the same key; the tag segment is sorted
    /// by construction. An empty tag set contributes an empty segment.
    fn key_for(event: &MetricEvent) -> String {
        format!("{}:{}:{}", event.name, event.kind, event.tags.to_segment())
    }

    /// Merge one event into the store.
    ///
    /// Counts sum, gauges overwrite, histograms append; `last_updated`
    /// always takes the incoming event's timestamp. Never fails for
    /// well-formed input and returns nothing.
    pub fn add(&mut self, event: MetricEvent) {
        let key = Buckets::key_for(&event);
        match self.inner.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(event),
            Entry::Vacant(entry) => {
                entry.insert(StoredMetric::seed(event));
            }
        }
    }

    /// Merge a sequence of events in the order given.
    pub fn add_many<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = MetricEvent>,
    {
        for event in events {
            self.add(event);
        }
    }

    /// The number of distinct metric identities stored, not the number of
    /// raw events observed.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Determine if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate the stored entries, in no particular order.
    pub fn iter(&self) -> Values<String, StoredMetric> {
        self.inner.values()
    }

    /// Remove every entry. Only ever called as part of a flush.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Transform every entry into zero or more export payloads.
    ///
    /// Counts and gauges pass through verbatim. Histograms expand into one
    /// gauge per requested percentile (`name.p50` and friends) and one
    /// payload per requested aggregate; a histogram with no requests
    /// contributes nothing. `_flush_window_s` is the length of the window
    /// being drained; none of the current kinds consume it.
    pub fn to_payloads(&self, _flush_window_s: u64) -> Vec<Payload> {
        let mut payloads = Vec::with_capacity(self.inner.len());
        for stored in self.inner.values() {
            stored.push_payloads(&mut payloads);
        }
        payloads
    }
}

// Tests
//
#[cfg(test)]
mod test {
    extern crate quickcheck;

    use self::quickcheck::{QuickCheck, TestResult};
    use super::*;
    use metric::{AggregateKind, MetricEvent, MetricKind};

    fn find<'a>(payloads: &'a [Payload], name: &str) -> &'a Payload {
        payloads
            .iter()
            .find(|p| p.name == name)
            .expect("payload not found")
    }

    #[test]
    fn count_accumulates() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("some.metric", 5.0)
                .counter()
                .time(1000)
                .overlay_tag("service", "api"),
        );
        buckets.add(
            MetricEvent::new("some.metric", 3.0)
                .counter()
                .time(2000)
                .overlay_tag("service", "api"),
        );

        assert_eq!(1, buckets.len());
        let stored = buckets.iter().next().unwrap();
        assert_eq!(Some(8.0), stored.value());
        assert_eq!(2000, stored.last_updated);
    }

    #[test]
    fn gauge_overwrites() {
        let mut buckets = Buckets::new();
        buckets.add(MetricEvent::new("some.gauge", 100.0).gauge().time(1000));
        buckets.add(MetricEvent::new("some.gauge", 200.0).gauge().time(2000));

        assert_eq!(1, buckets.len());
        let stored = buckets.iter().next().unwrap();
        assert_eq!(Some(200.0), stored.value());
        assert_eq!(2000, stored.last_updated);
    }

    #[test]
    fn histogram_appends_in_order() {
        let mut buckets = Buckets::new();
        buckets.add(MetricEvent::new("some.hist", 100.0).histogram().time(1000));
        buckets.add(MetricEvent::new("some.hist", 200.0).histogram().time(2000));

        assert_eq!(1, buckets.len());
        let stored = buckets.iter().next().unwrap();
        assert_eq!(Some(&[100.0, 200.0][..]), stored.samples());
        assert_eq!(2000, stored.last_updated);
    }

    #[test]
    fn histogram_options_are_first_write_wins() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("some.hist", 100.0)
                .histogram()
                .time(1000)
                .percentiles(vec![0.5]),
        );
        // a later event's conflicting request is ignored, not an error
        buckets.add(
            MetricEvent::new("some.hist", 200.0)
                .histogram()
                .time(2000)
                .percentiles(vec![0.99])
                .aggregates(vec![AggregateKind::Max]),
        );

        let payloads = buckets.to_payloads(5);
        assert_eq!(1, payloads.len());
        assert_eq!("some.hist.p50", payloads[0].name);
    }

    #[test]
    fn add_many_applies_in_order() {
        let mut buckets = Buckets::new();
        buckets.add_many(vec![
            MetricEvent::new("batch.counter", 5.0).counter().time(1000),
            MetricEvent::new("batch.gauge", 100.0).gauge().time(1000),
            MetricEvent::new("batch.counter", 3.0).counter().time(2000),
            MetricEvent::new("batch.gauge", 200.0).gauge().time(2000),
            MetricEvent::new("batch.hist", 7.0).histogram().time(3000),
        ]);

        assert_eq!(3, buckets.len());
        let payloads = buckets.to_payloads(5);

        let counter = find(&payloads, "batch.counter");
        assert_eq!(8.0, counter.value);

        // the later gauge event must have been applied second
        let gauge = find(&payloads, "batch.gauge");
        assert_eq!(200.0, gauge.value);
        assert_eq!(2000, gauge.timestamp);
    }

    #[test]
    fn distinct_kinds_are_distinct_keys() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.metric", 1.0)
                .counter()
                .overlay_tag("service", "api"),
        );
        buckets.add(
            MetricEvent::new("test.metric", 2.0)
                .gauge()
                .overlay_tag("service", "api"),
        );
        buckets.add(
            MetricEvent::new("test.metric", 3.0)
                .counter()
                .overlay_tag("service", "api"),
        );

        assert_eq!(2, buckets.len());
    }

    #[test]
    fn tag_order_does_not_split_identity() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.counter", 5.0)
                .counter()
                .overlay_tag("service", "api")
                .overlay_tag("region", "us-east-1"),
        );
        buckets.add(
            MetricEvent::new("test.counter", 3.0)
                .counter()
                .overlay_tag("region", "us-east-1")
                .overlay_tag("service", "api"),
        );

        assert_eq!(1, buckets.len());
        assert_eq!(Some(8.0), buckets.iter().next().unwrap().value());
    }

    #[test]
    fn distinct_tag_values_are_distinct_keys() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("some.metric", 1.0)
                .gauge()
                .overlay_tag("foo", "bar"),
        );
        buckets.add(
            MetricEvent::new("some.metric", 1.0)
                .gauge()
                .overlay_tag("foo", "bingo"),
        );

        assert_eq!(2, buckets.len());
    }

    #[test]
    fn empty_tags_are_a_valid_identity() {
        let mut buckets = Buckets::new();
        buckets.add(MetricEvent::new("test.counter", 5.0).counter().time(1000));

        assert_eq!(1, buckets.len());
        let stored = buckets.iter().next().unwrap();
        assert!(stored.tags.is_empty());
    }

    #[test]
    fn clear_empties_the_store() {
        let mut buckets = Buckets::new();
        buckets.add(MetricEvent::new("test.counter", 5.0).counter());
        assert_eq!(1, buckets.len());

        buckets.clear();
        assert_eq!(0, buckets.len());
        assert!(buckets.is_empty());
    }

    #[test]
    fn count_and_gauge_export_verbatim() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.counter", 5.0)
                .counter()
                .time(1000)
                .overlay_tag("service", "api"),
        );
        buckets.add(
            MetricEvent::new("test.gauge", 100.0)
                .gauge()
                .time(2000)
                .overlay_tag("region", "us-east-1"),
        );

        let payloads = buckets.to_payloads(60);
        assert_eq!(2, payloads.len());

        let counter = find(&payloads, "test.counter");
        assert_eq!(MetricKind::Count, counter.kind);
        assert_eq!(5.0, counter.value);
        assert_eq!(1000, counter.timestamp);
        assert_eq!(Some("api"), counter.tags.get("service"));

        let gauge = find(&payloads, "test.gauge");
        assert_eq!(MetricKind::Gauge, gauge.kind);
        assert_eq!(100.0, gauge.value);
        assert_eq!(2000, gauge.timestamp);
    }

    #[test]
    fn histogram_percentiles_export_as_gauges() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.histogram", 100.0)
                .histogram()
                .time(1000)
                .percentiles(vec![0.5, 0.95]),
        );
        buckets.add(
            MetricEvent::new("test.histogram", 200.0)
                .histogram()
                .time(2000)
                .percentiles(vec![0.5, 0.95]),
        );

        let payloads = buckets.to_payloads(60);
        assert_eq!(2, payloads.len());

        let p50 = find(&payloads, "test.histogram.p50");
        assert_eq!(MetricKind::Gauge, p50.kind);
        assert_eq!(100.0, p50.value);
        assert_eq!(2000, p50.timestamp);

        let p95 = find(&payloads, "test.histogram.p95");
        assert_eq!(MetricKind::Gauge, p95.kind);
        assert_eq!(200.0, p95.value);
        assert_eq!(2000, p95.timestamp);
    }

    #[test]
    fn histogram_aggregates_export_with_proper_kinds() {
        let aggs = vec![
            AggregateKind::Count,
            AggregateKind::Max,
            AggregateKind::Min,
            AggregateKind::Avg,
        ];
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.histogram", 100.0)
                .histogram()
                .time(1000)
                .aggregates(aggs.clone()),
        );
        buckets.add(
            MetricEvent::new("test.histogram", 200.0)
                .histogram()
                .time(2000)
                .aggregates(aggs),
        );

        let payloads = buckets.to_payloads(60);
        assert_eq!(4, payloads.len());

        let count = find(&payloads, "test.histogram.count");
        assert_eq!(MetricKind::Count, count.kind);
        assert_eq!(2.0, count.value);

        let max = find(&payloads, "test.histogram.max");
        assert_eq!(MetricKind::Gauge, max.kind);
        assert_eq!(200.0, max.value);

        let min = find(&payloads, "test.histogram.min");
        assert_eq!(MetricKind::Gauge, min.kind);
        assert_eq!(100.0, min.value);

        let avg = find(&payloads, "test.histogram.avg");
        assert_eq!(MetricKind::Gauge, avg.kind);
        assert_eq!(150.0, avg.value);
    }

    #[test]
    fn histogram_with_both_percentiles_and_aggregates() {
        let mut buckets = Buckets::new();
        buckets.add(
            MetricEvent::new("test.histogram", 100.0)
                .histogram()
                .time(1000)
                .percentiles(vec![0.5])
                .aggregates(vec![AggregateKind::Count]),
        );

        let payloads = buckets.to_payloads(60);
        assert_eq!(2, payloads.len());

        let p50 = find(&payloads, "test.histogram.p50");
        assert_eq!(MetricKind::Gauge, p50.kind);
        assert_eq!(100.0, p50.value);

        let count = find(&payloads, "test.histogram.count");
        assert_eq!(MetricKind::Count, count.kind);
        assert_eq!(1.0, count.value);
    }

    #[test]
    fn bare_histogram_exports_nothing() {
        let mut buckets = Buckets::new();
        buckets.add(MetricEvent::new("test.histogram", 100.0).histogram().time(1000));

        let payloads = buckets.to_payloads(60);
        assert!(payloads.is_empty());
    }

    #[test]
    fn count_summation() {
        fn inner(values: Vec<f64>) -> TestResult {
            if values.iter().any(|v| !v.is_finite()) {
                return TestResult::discard();
            }
            let mut buckets = Buckets::new();
            for (idx, &v) in values.iter().enumerate() {
                buckets.add(MetricEvent::new("qc.counter", v).counter().time(idx as i64));
            }
            if values.is_empty() {
                assert!(buckets.is_empty());
                return TestResult::passed();
            }

            assert_eq!(1, buckets.len());
            let stored = buckets.iter().next().unwrap();
            let expected: f64 = values.iter().sum();
            assert_eq!(Some(expected), stored.value());
            assert_eq!((values.len() - 1) as i64, stored.last_updated);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .max_tests(10000)
            .quickcheck(inner as fn(Vec<f64>) -> TestResult);
    }

    #[test]
    fn gauge_takes_last_value() {
        fn inner(values: Vec<f64>) -> TestResult {
            if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
                return TestResult::discard();
            }
            let mut buckets = Buckets::new();
            for (idx, &v) in values.iter().enumerate() {
                buckets.add(MetricEvent::new("qc.gauge", v).gauge().time(idx as i64));
            }

            assert_eq!(1, buckets.len());
            let stored = buckets.iter().next().unwrap();
            assert_eq!(Some(*values.last().unwrap()), stored.value());
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .max_tests(10000)
            .quickcheck(inner as fn(Vec<f64>) -> TestResult);
    }

    #[test]
    fn key_is_permutation_invariant() {
        fn inner(raw_pairs: Vec<(String, String)>) -> TestResult {
            // keep the first value per key so insertion order is the only
            // thing that differs between the two events
            let mut pairs: Vec<(String, String)> = Vec::new();
            for &(ref k, ref v) in &raw_pairs {
                if !pairs.iter().any(|&(ref seen, _)| seen == k) {
                    pairs.push((k.clone(), v.clone()));
                }
            }

            let mut forward = MetricEvent::new("qc.perm", 1.0).counter();
            for &(ref k, ref v) in &pairs {
                forward = forward.overlay_tag(k.clone(), v.clone());
            }
            let mut reverse = MetricEvent::new("qc.perm", 1.0).counter();
            for &(ref k, ref v) in pairs.iter().rev() {
                reverse = reverse.overlay_tag(k.clone(), v.clone());
            }

            let mut buckets = Buckets::new();
            buckets.add(forward);
            buckets.add(reverse);
            assert_eq!(1, buckets.len());
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .max_tests(10000)
            .quickcheck(inner as fn(Vec<(String, String)>) -> TestResult);
    }
}
