//! Monitor orchestration
//!
//! Wires the capture producers, the ingestion queue and the single
//! processing consumer together, and owns the shutdown ordering: stop
//! halts the producers, the sentinel follows the last enqueued packet,
//! and the consumer is joined before the final report is produced.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::capture::{self, CaptureSource, DecodedPacket, Endpoint};
use crate::config::MonitorConfig;
use crate::queue::{self, PacketEvent};
use crate::report;
use crate::resolve::Resolver;
use crate::stats::{SharedStatistic, Statistic};
use crate::tracker::ConnectionTracker;
use crate::{MonitorError, Result};

/// Consumer-side processing state: the tracker plus both statistic sinks.
///
/// Owned by exactly one thread; only the aggregate handle is shared (for
/// snapshots), everything else is unsynchronized by design.
pub struct Pipeline {
    tracker: ConnectionTracker,
    aggregate: SharedStatistic,
    per_destination: BTreeMap<String, Statistic>,
    resolver: Option<Resolver>,
}

impl Pipeline {
    /// Create a pipeline feeding the given aggregate handle.
    pub fn new(ports: Vec<u16>, aggregate: SharedStatistic, resolve_names: bool) -> Self {
        Self {
            tracker: ConnectionTracker::new(ports),
            aggregate,
            per_destination: BTreeMap::new(),
            resolver: resolve_names.then(Resolver::new),
        }
    }

    /// Process one decoded packet. Returns the live per-connection line
    /// when the packet completed a connection.
    pub fn process(&mut self, packet: &DecodedPacket) -> Option<String> {
        let completed = self.tracker.process(packet)?;

        let label = self.label(completed.destination);

        self.per_destination
            .entry(label.clone())
            .or_default()
            .add(completed.requests);
        self.aggregate.add(completed.requests);

        Some(report::live_line(&label, completed.requests))
    }

    fn label(&mut self, destination: Endpoint) -> String {
        if let Some(resolver) = &mut self.resolver {
            if let Some(host) = resolver.lookup(destination.addr) {
                return format!("{host}:{}", destination.port);
            }
        }

        destination.to_string()
    }

    /// Render the final report.
    pub fn report(&self) -> String {
        report::render(&self.aggregate.snapshot(), &self.per_destination)
    }

    /// Per-destination statistics accumulated so far.
    pub fn per_destination(&self) -> &BTreeMap<String, Statistic> {
        &self.per_destination
    }

    /// Connections with unresolved requests.
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }
}

/// Requests an orderly shutdown from any thread (CLI signal supervisor,
/// test harness).
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the producers to halt; idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// False once shutdown has been requested or the run finished.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// The connection monitor.
pub struct Monitor {
    config: MonitorConfig,
    running: Arc<AtomicBool>,
    aggregate: SharedStatistic,
}

impl Monitor {
    /// Create a monitor from configuration.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            aggregate: SharedStatistic::new(),
        }
    }

    /// The BPF filter for the configured ports.
    pub fn filter(&self) -> String {
        capture::build_filter(&self.config.ports)
    }

    /// Shared handle to the aggregate statistic, for live snapshots.
    pub fn aggregate(&self) -> SharedStatistic {
        self.aggregate.clone()
    }

    /// Handle for requesting shutdown out-of-band.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Request an orderly shutdown; `run` completes and returns the report.
    pub fn stop(&self) {
        self.shutdown_handle().stop();
    }

    /// Capture until every source is exhausted or `stop` is called, then
    /// return the final report.
    pub fn run(&self) -> Result<String> {
        let devices = if self.config.devices.is_empty() {
            capture::default_devices()?
        } else {
            self.config.devices.clone()
        };

        let filter = self.filter();

        let mut sources = Vec::with_capacity(devices.len());
        for device in &devices {
            tracing::info!(%device, "opening capture");
            sources.push(CaptureSource::open(device, &filter)?);
        }

        let (packet_queue, receiver) = queue::channel();

        let mut producers = Vec::with_capacity(sources.len());
        for source in sources {
            let queue = packet_queue.clone();
            let running = Arc::clone(&self.running);

            producers.push(
                thread::Builder::new()
                    .name(format!("capture-{}", source.name))
                    .spawn(move || capture::capture_loop(source, queue, running))?,
            );
        }

        let mut pipeline = Pipeline::new(
            self.config.ports.clone(),
            self.aggregate.clone(),
            self.config.resolve_names,
        );
        let quiet = self.config.quiet;

        let consumer = thread::Builder::new().name("process".into()).spawn(move || {
            loop {
                match receiver.dequeue() {
                    PacketEvent::Packet(packet) => {
                        if let Some(line) = pipeline.process(&packet) {
                            if !quiet {
                                println!("{line}");
                            }
                        }
                    }
                    PacketEvent::Shutdown => break,
                }
            }

            pipeline
        })?;

        // Producers exit on source exhaustion or a stop request; the
        // sentinel must follow everything they enqueued.
        for producer in producers {
            let _ = producer.join();
        }

        self.running.store(false, Ordering::SeqCst);
        packet_queue.close();

        let pipeline = consumer.join().map_err(|_| MonitorError::Processor)?;

        Ok(pipeline.report())
    }
}
