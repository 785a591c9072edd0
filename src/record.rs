//! The ingress boundary: what the transport hands the flush controller.
//!
//! A `Record` describes one completed invocation of the host's unit of work.
//! It carries zero or more opaque metric messages -- validated structurally
//! at ingest, never trusted -- plus the metadata the controller turns into
//! derived global tags and built-in invocation metrics.

use metric::TagMap;
use serde_json::Value;

/// Classification of what triggered the host's unit of work. Rendered as the
/// `trigger` tag value on every derived global tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// An inbound HTTP request.
    Fetch,
    /// A remote procedure call.
    Rpc,
    /// A websocket event.
    WebSocket,
    /// An inbound email.
    Email,
    /// A queue consumer batch.
    Queue,
    /// A cron expression firing.
    Cron,
    /// A scheduled alarm.
    Scheduled,
    /// Anything the host could not classify.
    Unknown,
}

impl Trigger {
    /// The tag-value spelling of the trigger.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Trigger::Fetch => "fetch",
            Trigger::Rpc => "rpc",
            Trigger::WebSocket => "websocket",
            Trigger::Email => "email",
            Trigger::Queue => "queue",
            Trigger::Cron => "cron",
            Trigger::Scheduled => "scheduled",
            Trigger::Unknown => "unknown",
        }
    }
}

impl Default for Trigger {
    fn default() -> Trigger {
        Trigger::Unknown
    }
}

/// One host invocation, the unit of batch ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Identity of the source that ran, e.g. a script or service name.
    pub source: Option<String>,
    /// Version identity of the source, if the host tracks deployments.
    pub version: Option<String>,
    /// What triggered the invocation.
    pub trigger: Trigger,
    /// How the invocation ended, e.g. `ok` or `exception`.
    pub outcome: Option<String>,
    /// When the record was produced, milliseconds since the Unix epoch.
    /// `None` means the ingest path stamps the batch's delivery time.
    pub timestamp: Option<i64>,
    /// Wall-clock duration of the invocation in milliseconds.
    pub wall_time_ms: Option<f64>,
    /// CPU time consumed by the invocation in milliseconds.
    pub cpu_time_ms: Option<f64>,
    /// The embedded metric messages published during the invocation. Opaque
    /// until validated.
    pub messages: Vec<Value>,
}

impl Record {
    /// Create an empty record. Chain the setters to fill it in.
    pub fn new() -> Record {
        Default::default()
    }

    /// Set the source identity.
    pub fn source<S>(mut self, source: S) -> Record
    where
        S: Into<String>,
    {
        self.source = Some(source.into());
        self
    }

    /// Set the source version identity.
    pub fn version<S>(mut self, version: S) -> Record
    where
        S: Into<String>,
    {
        self.version = Some(version.into());
        self
    }

    /// Set the trigger classification.
    pub fn trigger(mut self, trigger: Trigger) -> Record {
        self.trigger = trigger;
        self
    }

    /// Set the outcome.
    pub fn outcome<S>(mut self, outcome: S) -> Record
    where
        S: Into<String>,
    {
        self.outcome = Some(outcome.into());
        self
    }

    /// Set the record's production time, milliseconds since the Unix epoch.
    pub fn time(mut self, ts: i64) -> Record {
        self.timestamp = Some(ts);
        self
    }

    /// Set the invocation's wall-clock duration in milliseconds.
    pub fn wall_time_ms(mut self, ms: f64) -> Record {
        self.wall_time_ms = Some(ms);
        self
    }

    /// Set the invocation's CPU time in milliseconds.
    pub fn cpu_time_ms(mut self, ms: f64) -> Record {
        self.cpu_time_ms = Some(ms);
        self
    }

    /// Append one embedded metric message.
    pub fn message(mut self, message: Value) -> Record {
        self.messages.push(message);
        self
    }

    /// The derived global tags for this record. Merged beneath every
    /// embedded event's own tags; the event wins on key collision.
    pub fn global_tags(&self) -> TagMap {
        let mut tags = TagMap::new();
        tags.insert("trigger", self.trigger.as_str());
        if let Some(ref source) = self.source {
            tags.insert("source", source.as_str());
        }
        if let Some(ref version) = self.version {
            tags.insert("version", version.as_str());
        }
        if let Some(ref outcome) = self.outcome {
            tags.insert("outcome", outcome.as_str());
        }
        tags
    }
}
