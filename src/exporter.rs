//! The flush controller: decides when the store's window closes and moves
//! the drained payloads to the sinks.
//!
//! Two triggers close a window. Crossing the distinct-identity threshold
//! flushes immediately: the store is drained synchronously inside the
//! ingestion call and only the sink dispatch runs in the background. Below
//! the threshold a debounce timer is armed for `max_buffer_duration`; a
//! monotonic generation counter invalidates the timer if an immediate flush
//! supersedes it, so a stale wakeup is a silent no-op rather than a
//! duplicate flush.
//!
//! Ingestion never returns an error and never waits on a sink. The embedding
//! host is expected to serialize calls into the controller; the only shared
//! mutable coordination between the control path and its background work is
//! the generation counter, the scheduled flag and the store's mutex.

use buckets::Buckets;
use config::{ExporterConfig, MAX_BUFFER_DURATION_CAP_S};
use metric::{AggregateKind, MetricEvent, Payload, TagMap};
use record::Record;
use sink::Sink;
use std::cmp;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use time;

lazy_static! {
    /// Export shape of the built-in invocation histograms.
    static ref INVOCATION_PERCENTILES: Vec<f64> = vec![0.5, 0.75, 0.9, 0.95, 0.99];
    static ref INVOCATION_AGGREGATES: Vec<AggregateKind> = vec![AggregateKind::Max];
}

/// State shared between the control path and background work.
struct Shared {
    buckets: Mutex<Buckets>,
    sinks: Vec<Box<dyn Sink>>,
    /// Monotonic flush generation. A debounce timer captures the value at
    /// arming time and only flushes if it still matches at wakeup.
    generation: AtomicUsize,
    /// Whether a debounce timer is pending. Idle/Pending in one bit.
    scheduled: AtomicBool,
    flush_window_s: u64,
}

impl Shared {
    /// Atomically drain the store: produce the window's payloads, clear
    /// every entry and return to Idle. The store is empty before any sink
    /// sees a payload, so a slow sink cannot block the next window.
    fn drain(&self) -> Vec<Payload> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        self.scheduled.store(false, Ordering::SeqCst);
        let payloads = buckets.to_payloads(self.flush_window_s);
        buckets.clear();
        payloads
    }

    /// Hand one drained batch to every sink concurrently. Each sink runs on
    /// its own thread against the same immutable batch; a failing or
    /// panicking sink is logged and isolated, its siblings deliver anyway.
    /// Nothing is retried or re-queued.
    fn dispatch(shared: &Arc<Shared>, payloads: Vec<Payload>) {
        let batch: Arc<Vec<Payload>> = Arc::new(payloads);
        let mut workers = Vec::with_capacity(shared.sinks.len());
        for idx in 0..shared.sinks.len() {
            let shared = Arc::clone(shared);
            let batch = Arc::clone(&batch);
            workers.push(thread::spawn(move || {
                let sink = &shared.sinks[idx];
                if let Err(e) = sink.send_metrics(&batch) {
                    error!(
                        "sink {} rejected flush of {} payloads: {}",
                        sink.name(),
                        batch.len(),
                        e
                    );
                }
            }));
        }
        for (idx, worker) in workers.into_iter().enumerate() {
            if worker.join().is_err() {
                error!("sink {} panicked during flush", shared.sinks[idx].name());
            }
        }
    }

    /// Drain and, if the window held anything, dispatch. An empty drain
    /// invokes no sink at all, which is what makes back-to-back flushes
    /// idempotent.
    fn perform_flush(shared: &Arc<Shared>) {
        let payloads = shared.drain();
        if payloads.is_empty() {
            trace!("flush of empty window, skipping dispatch");
            return;
        }
        Shared::dispatch(shared, payloads);
    }
}

/// The flush controller. Owns the aggregation store for its whole life; no
/// other component reads or writes the store directly.
pub struct Exporter {
    shared: Arc<Shared>,
    max_buffer_size: usize,
    buffer_duration: Duration,
    global_tags: TagMap,
    emit_invocation_duration: bool,
    emit_invocation_cost: bool,
    emit_invocation_count: bool,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Exporter {
    /// Create a controller over the given sinks. The store starts empty;
    /// `max_buffer_duration` is clamped to `MAX_BUFFER_DURATION_CAP_S`.
    pub fn new(config: ExporterConfig, sinks: Vec<Box<dyn Sink>>) -> Exporter {
        let duration_s = cmp::min(config.max_buffer_duration, MAX_BUFFER_DURATION_CAP_S);
        Exporter {
            shared: Arc::new(Shared {
                buckets: Mutex::new(Buckets::new()),
                sinks: sinks,
                generation: AtomicUsize::new(0),
                scheduled: AtomicBool::new(false),
                flush_window_s: duration_s,
            }),
            max_buffer_size: config.max_buffer_size,
            buffer_duration: Duration::from_secs(duration_s),
            global_tags: config.global_tags,
            emit_invocation_duration: config.invocation_duration,
            emit_invocation_cost: config.invocation_cost,
            emit_invocation_count: config.invocation_count,
            handles: Vec::new(),
        }
    }

    /// Ingest one batch of records.
    ///
    /// Every embedded metric message is validated structurally; malformed
    /// messages are dropped with a warning and never fail the batch. Valid
    /// events are enriched with the record's derived global tags and the
    /// configured fixed tags -- event tags win on collision -- and merged
    /// into the store in the order given. Afterwards the controller decides
    /// whether this window closes now, later, or not yet. Never blocks on a
    /// sink and never returns an error.
    pub fn ingest(&mut self, batch: Vec<Record>) {
        let delivered = time::now_ms();
        {
            let mut buckets = self.shared.buckets.lock().expect("buckets lock poisoned");
            for record in batch {
                let record_ts = record.timestamp.unwrap_or(delivered);
                let globals = record.global_tags();
                self.add_invocation_metrics(&mut buckets, &record, &globals, record_ts);
                for message in &record.messages {
                    match MetricEvent::from_json(message, record_ts) {
                        Ok(mut event) => {
                            event.tags.merge(&globals);
                            event.tags.merge(&self.global_tags);
                            buckets.add(event);
                        }
                        Err(e) => warn!("dropping malformed metric message: {}", e),
                    }
                }
            }
        }
        self.schedule();
    }

    /// Flush now, synchronously: drain the store and run the sink fan-out
    /// to completion on the calling thread. Intended for host shutdown
    /// paths. Idempotent when the store is empty; any pending debounce
    /// timer is superseded.
    pub fn flush(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        Shared::perform_flush(&self.shared);
    }

    /// The number of distinct metric identities currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.shared.buckets.lock().expect("buckets lock poisoned").len()
    }

    /// Block until all background work -- pending debounce timers and
    /// in-flight sink dispatches -- has settled. A pending timer is waited
    /// out, not cancelled, so this can take up to `max_buffer_duration`.
    pub fn await_background(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("background flush task panicked");
            }
        }
    }

    /// Post-ingest scheduling decision, the controller's two-state machine.
    fn schedule(&mut self) {
        self.reap();
        let key_count = self.buffered_len();
        if key_count >= self.max_buffer_size {
            // supersede any pending debounce timer, then flush now; the
            // drain happens on this thread so the caller observes an empty
            // store, only the dispatch is deferred
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            trace!("threshold flush at {} identities", key_count);
            let payloads = self.shared.drain();
            if !payloads.is_empty() {
                let shared = Arc::clone(&self.shared);
                self.handles
                    .push(thread::spawn(move || Shared::dispatch(&shared, payloads)));
            }
            return;
        }
        if key_count == 0 {
            return;
        }
        if self.shared.scheduled.swap(true, Ordering::SeqCst) {
            // already Pending, the armed timer governs this window
            return;
        }
        let local = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.shared);
        let delay = self.buffer_duration;
        self.handles.push(thread::spawn(move || {
            thread::sleep(delay);
            if shared.generation.load(Ordering::SeqCst) == local {
                Shared::perform_flush(&shared);
            } else {
                trace!("debounce timer superseded, ignoring wakeup");
            }
        }));
    }

    fn add_invocation_metrics(
        &self,
        buckets: &mut Buckets,
        record: &Record,
        globals: &TagMap,
        ts: i64,
    ) {
        if self.emit_invocation_duration {
            if let Some(wall) = record.wall_time_ms {
                self.add_enriched(
                    buckets,
                    MetricEvent::new("invocation.wall_time", wall)
                        .histogram()
                        .time(ts)
                        .percentiles(INVOCATION_PERCENTILES.clone())
                        .aggregates(INVOCATION_AGGREGATES.clone()),
                    globals,
                );
            }
        }
        if self.emit_invocation_cost {
            if let Some(cpu) = record.cpu_time_ms {
                self.add_enriched(
                    buckets,
                    MetricEvent::new("invocation.cpu_time", cpu)
                        .histogram()
                        .time(ts)
                        .percentiles(INVOCATION_PERCENTILES.clone())
                        .aggregates(INVOCATION_AGGREGATES.clone()),
                    globals,
                );
            }
        }
        if self.emit_invocation_count {
            self.add_enriched(
                buckets,
                MetricEvent::new("invocation.count", 1.0).counter().time(ts),
                globals,
            );
        }
    }

    fn add_enriched(&self, buckets: &mut Buckets, mut event: MetricEvent, globals: &TagMap) {
        event.tags.merge(globals);
        event.tags.merge(&self.global_tags);
        buckets.add(event);
    }

    /// Join background threads that have already finished so the handle
    /// list cannot grow without bound in a long-lived host.
    fn reap(&mut self) {
        let handles = mem::replace(&mut self.handles, Vec::new());
        for handle in handles {
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("background flush task panicked");
                }
            } else {
                self.handles.push(handle);
            }
        }
    }
}
