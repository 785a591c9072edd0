//! Null sink
//!
//! This sink is intended for testing and demonstration. Every batch it
//! receives will be deallocated.

use metric::Payload;
use sink::{Error, Sink};

/// The null sink.
pub struct Null {
    name: String,
}

/// Configuration for the `Null` sink.
#[derive(Debug, Clone, Deserialize)]
pub struct NullConfig {
    /// The sink's name, used in flush failure logs.
    pub name: String,
}

impl Default for NullConfig {
    fn default() -> NullConfig {
        NullConfig {
            name: String::from("null"),
        }
    }
}

impl Null {
    /// Create a new Null sink.
    pub fn new(config: NullConfig) -> Null {
        Null { name: config.name }
    }
}

impl Sink for Null {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_metrics(&self, _payloads: &[Payload]) -> Result<(), Error> {
        // discard the batch, intentionally
        Ok(())
    }
}
