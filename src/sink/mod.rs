//! A 'sink' is a sink for export payloads.
//!
//! Every downstream backend -- console, SaaS metrics API, analytics write
//! path -- implements the one-method contract here. The flush controller
//! treats all sinks identically: each registered sink gets every drained
//! batch, concurrently with its siblings, and a failure in one never
//! disturbs the others. Delivery is best-effort and at-most-once; a rejected
//! batch is logged and gone.

use metric::Payload;
use std::error;
use std::fmt;

mod console;
mod null;

pub use self::console::{Console, ConsoleConfig};
pub use self::null::{Null, NullConfig};

/// Why a sink rejected a batch. Carries a human-readable cause and nothing
/// else; the controller only ever logs it.
#[derive(Debug)]
pub struct Error {
    reason: String,
}

impl Error {
    /// Create a new sink error from its cause.
    pub fn new<S>(reason: S) -> Error
    where
        S: Into<String>,
    {
        Error {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl error::Error for Error {}

/// The contract every backend exporter implements.
///
/// Implementations must accept an empty batch, must not assume a batch will
/// be retried, and are expected to do their own formatting, batching and
/// authentication internally. The controller invokes sinks from background
/// threads, hence the `Send + Sync` bound.
pub trait Sink: Send + Sync {
    /// A short name for this sink, used in flush failure logs.
    fn name(&self) -> &str;

    /// Accept one drained batch of export payloads.
    ///
    /// The batch is shared with sibling sinks and must not be mutated. An
    /// `Err` marks the whole batch undelivered for this sink only.
    fn send_metrics(&self, payloads: &[Payload]) -> Result<(), Error>;
}
