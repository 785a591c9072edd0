//! Decant aggregates fine-grained metric events in memory and periodically
//! decants compact summaries to one or more downstream sinks. It exists to
//! keep high-frequency, low-latency metric emission decoupled from network
//! export, which is slow, fallible and must never block the caller.
//!
//! The pieces, leaf first:
//!
//!  * `stats` -- pure percentile / aggregate computation over raw samples.
//!  * `buckets` -- the keyed aggregation store, one entry per distinct
//!    (name, kind, tag set) identity.
//!  * `exporter` -- the flush controller. It owns the store, decides when a
//!    window closes (size threshold or debounce timer) and fans the drained
//!    payloads out to every configured sink.
//!  * `sink` -- the contract every downstream exporter implements, plus the
//!    trivial console and null sinks.
//!
//! Unflushed data is purely in-memory and is lost on crash, by intent. Export
//! is best-effort and at-most-once: a sink that rejects a batch does not get
//! the batch again and does not disturb its sibling sinks.
#![deny(missing_docs, trivial_numeric_casts, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate seahash;
extern crate serde;
extern crate toml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate serde_json;

#[cfg(test)]
extern crate quickcheck;

pub mod buckets;
pub mod config;
pub mod exporter;
pub mod metric;
pub mod record;
pub mod sink;
pub mod stats;
pub mod time;
