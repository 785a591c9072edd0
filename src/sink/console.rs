//! Console sink, prints every batch to stdout. Intended for demonstration
//! and local debugging.

use chrono::Utc;
use metric::Payload;
use sink::{Error, Sink};

/// The console sink.
pub struct Console {
    name: String,
}

/// Configuration for the `Console` sink.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// The sink's name, used in flush failure logs.
    pub name: String,
}

impl Default for ConsoleConfig {
    fn default() -> ConsoleConfig {
        ConsoleConfig {
            name: String::from("console"),
        }
    }
}

impl Console {
    /// Create a new Console sink.
    pub fn new(config: ConsoleConfig) -> Console {
        Console { name: config.name }
    }
}

impl Sink for Console {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_metrics(&self, payloads: &[Payload]) -> Result<(), Error> {
        println!(
            "flush of {} payloads at {}",
            payloads.len(),
            Utc::now().to_rfc3339()
        );
        for payload in payloads {
            println!(
                "    {} {}{{{}}}: {} @{}",
                payload.kind,
                payload.name,
                payload.tags.to_segment(),
                payload.value,
                payload.timestamp
            );
        }
        Ok(())
    }
}
