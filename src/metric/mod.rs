//! The event model: what a metric is on its way into the store and what it
//! looks like on its way out to a sink.
//!
//! A `MetricEvent` is one observation emitted by a unit of work. Events are
//! merged into the aggregation store by identity; a `Payload` is the compact,
//! already-aggregated shape a sink receives. Histograms only ever exist on
//! the ingress side -- by the time a sink is involved they have been expanded
//! into count and gauge payloads.

use serde_json;
use serde_json::Value;
use std::error;
use std::fmt;
use time;

pub mod tagmap;

pub use self::tagmap::TagMap;

/// The three ingress metric kinds. The kind participates in identity: a count
/// and a gauge under the same name and tags are distinct metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricKind {
    /// A running sum. Merging adds the incoming value.
    Count,
    /// A point-in-time reading. Merging overwrites with the incoming value.
    Gauge,
    /// A sample sequence. Merging appends the incoming value.
    Histogram,
}

impl MetricKind {
    /// The wire spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match *self {
            MetricKind::Count => "COUNT",
            MetricKind::Gauge => "GAUGE",
            MetricKind::Histogram => "HISTOGRAM",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed-form statistics a histogram may request at export time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    /// Sample count. The only aggregate exported as a count payload.
    Count,
    /// Sum of all samples.
    Sum,
    /// Largest sample.
    Max,
    /// Smallest sample.
    Min,
    /// Arithmetic mean.
    Avg,
    /// Middle sorted sample; lower-middle when the length is even.
    Median,
}

impl AggregateKind {
    /// The suffix appended to the source metric's name on export.
    pub fn as_str(&self) -> &'static str {
        match *self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Max => "max",
            AggregateKind::Min => "min",
            AggregateKind::Avg => "avg",
            AggregateKind::Median => "median",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric observation, the unit of ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    /// How this event merges into the store.
    pub kind: MetricKind,
    /// The metric name. Decant does not validate or normalize names.
    pub name: String,
    /// The observed value.
    pub value: f64,
    /// Identity tags, canonicalized.
    pub tags: TagMap,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Requested export percentiles, each in `[0, 1]`. Histogram only.
    pub percentiles: Vec<f64>,
    /// Requested export aggregates. Histogram only.
    pub aggregates: Vec<AggregateKind>,
}

impl MetricEvent {
    /// Create a new count event with the current wall-clock time. Chain the
    /// other constructors to adjust kind, time, tags and histogram options.
    pub fn new<S>(name: S, value: f64) -> MetricEvent
    where
        S: Into<String>,
    {
        MetricEvent {
            kind: MetricKind::Count,
            name: name.into(),
            value: value,
            tags: TagMap::default(),
            timestamp: time::now_ms(),
            percentiles: Vec::new(),
            aggregates: Vec::new(),
        }
    }

    /// Set the kind to `Count`.
    pub fn counter(mut self) -> MetricEvent {
        self.kind = MetricKind::Count;
        self
    }

    /// Set the kind to `Gauge`.
    pub fn gauge(mut self) -> MetricEvent {
        self.kind = MetricKind::Gauge;
        self
    }

    /// Set the kind to `Histogram`.
    pub fn histogram(mut self) -> MetricEvent {
        self.kind = MetricKind::Histogram;
        self
    }

    /// Set the timestamp, milliseconds since the Unix epoch.
    pub fn time(mut self, ts: i64) -> MetricEvent {
        self.timestamp = ts;
        self
    }

    /// Overlay a single tag, replacing any previous value under the key.
    pub fn overlay_tag<S>(mut self, key: S, val: S) -> MetricEvent
    where
        S: Into<String>,
    {
        self.tags.insert(key.into(), val.into());
        self
    }

    /// Set the requested export percentiles.
    pub fn percentiles(mut self, percentiles: Vec<f64>) -> MetricEvent {
        self.percentiles = percentiles;
        self
    }

    /// Set the requested export aggregates.
    pub fn aggregates(mut self, aggregates: Vec<AggregateKind>) -> MetricEvent {
        self.aggregates = aggregates;
        self
    }

    /// Validate and convert one embedded wire message into an event.
    ///
    /// The message must carry a recognized kind, a string name, a numeric
    /// value and an object of scalar tags. A missing timestamp is filled from
    /// `default_timestamp`, the enclosing batch's delivery time. Anything
    /// else is a `ParseError` and the caller is expected to drop the message
    /// with a warning, never to fail the batch.
    pub fn from_json(message: &Value, default_timestamp: i64) -> Result<MetricEvent, ParseError> {
        let wire: WireMetric = serde_json::from_value(message.clone())?;
        let mut tags = TagMap::new();
        for (key, val) in &wire.tags {
            match scalar_tag(val) {
                Some(rendered) => {
                    tags.insert(key.clone(), rendered);
                }
                None => return Err(ParseError::NonScalarTag(key.clone())),
            }
        }
        let (percentiles, aggregates) = match wire.options {
            Some(options) => (options.percentiles, options.aggregates),
            None => (Vec::new(), Vec::new()),
        };
        Ok(MetricEvent {
            kind: wire.kind,
            name: wire.name,
            value: wire.value,
            tags: tags,
            timestamp: wire.timestamp.unwrap_or(default_timestamp),
            percentiles: percentiles,
            aggregates: aggregates,
        })
    }
}

/// The structural shape of an embedded metric message.
#[derive(Debug, Deserialize)]
struct WireMetric {
    #[serde(rename = "type")]
    kind: MetricKind,
    name: String,
    value: f64,
    tags: serde_json::Map<String, Value>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    options: Option<WireOptions>,
}

#[derive(Debug, Deserialize)]
struct WireOptions {
    #[serde(default)]
    percentiles: Vec<f64>,
    #[serde(default)]
    aggregates: Vec<AggregateKind>,
}

/// Canonicalize a scalar tag value to its string rendering. Arrays and
/// objects are not scalars and have no rendering.
fn scalar_tag(val: &Value) -> Option<String> {
    match *val {
        Value::String(ref s) => Some(s.clone()),
        Value::Number(ref n) => Some(n.to_string()),
        Value::Bool(b) => Some(if b {
            String::from("true")
        } else {
            String::from("false")
        }),
        Value::Null => Some(String::from("null")),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Why a wire message failed validation.
#[derive(Debug)]
pub enum ParseError {
    /// The message was not structurally a metric: wrong shape, unknown kind,
    /// missing required field or mistyped field.
    Structure(serde_json::Error),
    /// A tag value was an array or object. Tag values must be scalars.
    NonScalarTag(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> ParseError {
        ParseError::Structure(e)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::Structure(ref e) => write!(f, "not a metric message: {}", e),
            ParseError::NonScalarTag(ref key) => {
                write!(f, "tag {:?} does not hold a scalar value", key)
            }
        }
    }
}

impl error::Error for ParseError {}

/// The export unit: one already-aggregated point handed to every sink. The
/// kind is only ever `Count` or `Gauge`; histograms are expanded before
/// export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    /// Count or gauge. Never histogram.
    pub kind: MetricKind,
    /// The metric name, possibly suffixed with a percentile or aggregate
    /// label.
    pub name: String,
    /// The aggregated value.
    pub value: f64,
    /// The source metric's tags, copied verbatim.
    pub tags: TagMap,
    /// The source metric's last-updated time, milliseconds since the Unix
    /// epoch.
    pub timestamp: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_json_accepts_well_formed_count() {
        let message = json!({
            "type": "COUNT",
            "name": "requests",
            "value": 3.0,
            "tags": {"service": "api", "shard": 7, "canary": true, "tier": null},
            "timestamp": 1000
        });

        let event = MetricEvent::from_json(&message, 9999).unwrap();
        assert_eq!(MetricKind::Count, event.kind);
        assert_eq!("requests", event.name);
        assert_eq!(3.0, event.value);
        assert_eq!(1000, event.timestamp);
        assert_eq!(Some("api"), event.tags.get("service"));
        assert_eq!(Some("7"), event.tags.get("shard"));
        assert_eq!(Some("true"), event.tags.get("canary"));
        assert_eq!(Some("null"), event.tags.get("tier"));
    }

    #[test]
    fn from_json_defaults_timestamp_to_delivery() {
        let message = json!({
            "type": "GAUGE",
            "name": "depth",
            "value": 12.5,
            "tags": {}
        });

        let event = MetricEvent::from_json(&message, 4242).unwrap();
        assert_eq!(4242, event.timestamp);
    }

    #[test]
    fn from_json_reads_histogram_options() {
        let message = json!({
            "type": "HISTOGRAM",
            "name": "latency",
            "value": 100.0,
            "tags": {},
            "options": {"percentiles": [0.5, 0.95], "aggregates": ["count", "max"]}
        });

        let event = MetricEvent::from_json(&message, 0).unwrap();
        assert_eq!(MetricKind::Histogram, event.kind);
        assert_eq!(vec![0.5, 0.95], event.percentiles);
        assert_eq!(
            vec![AggregateKind::Count, AggregateKind::Max],
            event.aggregates
        );
    }

    #[test]
    fn from_json_rejects_unknown_kind() {
        let message = json!({
            "type": "TIMER",
            "name": "latency",
            "value": 1.0,
            "tags": {}
        });
        assert!(MetricEvent::from_json(&message, 0).is_err());
    }

    #[test]
    fn from_json_rejects_missing_fields() {
        let message = json!({"type": "COUNT", "name": "requests", "tags": {}});
        assert!(MetricEvent::from_json(&message, 0).is_err());

        let message = json!({"type": "COUNT", "name": "requests", "value": 1.0});
        assert!(MetricEvent::from_json(&message, 0).is_err());
    }

    #[test]
    fn from_json_rejects_mistyped_value() {
        let message = json!({
            "type": "COUNT",
            "name": "requests",
            "value": "five",
            "tags": {}
        });
        assert!(MetricEvent::from_json(&message, 0).is_err());

        let message = json!({
            "type": "COUNT",
            "name": 10,
            "value": 1.0,
            "tags": {}
        });
        assert!(MetricEvent::from_json(&message, 0).is_err());
    }

    #[test]
    fn from_json_rejects_composite_tag_value() {
        let message = json!({
            "type": "COUNT",
            "name": "requests",
            "value": 1.0,
            "tags": {"nested": {"a": 1}}
        });
        match MetricEvent::from_json(&message, 0) {
            Err(ParseError::NonScalarTag(ref key)) => assert_eq!("nested", key),
            other => panic!("expected NonScalarTag, got {:?}", other),
        }
    }
}
