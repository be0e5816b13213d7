//! # wifisim-runner library
//!
//! Library interface for the wifisim simulation runner.
//!
//! This crate provides:
//! - The discrete-event loop ([`EventLoop`]) driving a [`BuiltSimulation`]
//! - Run statistics, global and per node
//! - A JSON trace of transmissions, receptions and channel switches
//! - An in-memory metrics recorder with JSON and Prometheus export
//!
//! Events are popped in time order, ties broken by event id. Events
//! cancelled by an entity after they were queued are discarded when popped.

pub mod metrics_export;

use serde::Serialize;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use wifisim_agents::{TrafficAgent, TrafficStats};
pub use wifisim_common::SimTime;
use wifisim_common::{EntityId, Event, EventId, EventPayload, PhyNotification, SimContext, SimError};
pub use wifisim_model::{build_simulation, load_model, load_model_from_str, load_models, BuiltSimulation, NodeInfo};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] wifisim_model::ModelError),

    /// Simulation error.
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// ============================================================================
// Simulation Statistics
// ============================================================================

/// Per-node statistics seen by the runner, keyed by PHY entity id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeStats {
    /// Frames put on the air.
    pub tx: u64,
    /// Frames decoded.
    pub rx_ok: u64,
    /// Frames that failed to decode.
    pub rx_error: u64,
    /// Arrivals dropped before or during reception.
    pub rx_drop: u64,
}

/// Statistics collected during simulation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStats {
    /// Total events processed.
    pub total_events: u64,
    /// Events discarded because they were cancelled.
    pub cancelled_events: u64,
    /// Frames handed to the channel medium.
    pub frames_transmitted: u64,
    /// Signal arrivals delivered by the channel medium.
    pub signal_arrivals: u64,
    /// Frames decoded.
    pub frames_received: u64,
    /// Frames that failed to decode.
    pub frames_errored: u64,
    /// Arrivals dropped, by reason.
    pub frames_dropped: BTreeMap<String, u64>,
    /// Channel switches started.
    pub channel_switches: u64,
    /// Final simulation time.
    pub simulation_time_us: u64,
    /// Wall clock time in milliseconds.
    pub wall_time_ms: u64,
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Progress information passed to the progress callback during simulation.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current simulation time.
    pub sim_time: SimTime,
    /// Target simulation time (end time).
    pub target_time: SimTime,
    /// Elapsed wall clock time since start.
    pub wall_elapsed: Duration,
    /// Total events processed so far.
    pub events_processed: u64,
    /// Progress as a percentage (0.0 to 100.0).
    pub progress_percent: f64,
}

// ============================================================================
// Trace Recording
// ============================================================================

/// A frame put on the air.
#[derive(Debug, Clone, Serialize)]
pub struct TxPayload {
    /// Frame identifier.
    pub frame_id: u64,
    /// Frame size in bytes.
    pub size_bytes: u32,
    /// Destination MAC address.
    pub destination: String,
    /// Payload mode name.
    pub mode: String,
    /// Preamble format.
    pub preamble: String,
    /// Burst position.
    pub packet_type: String,
    /// Radiated power in dBm.
    pub tx_power_dbm: f64,
}

/// The outcome of one arrival at a PHY.
#[derive(Debug, Clone, Serialize)]
pub struct RxPayload {
    /// Frame identifier.
    pub frame_id: u64,
    /// Reception status: "ok", "error" or "drop".
    pub status: String,
    /// SNR in dB, for decoded and failed frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr_db: Option<f64>,
    /// Drop reason, for dropped frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A channel switch.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchPayload {
    /// Switch delay in microseconds.
    pub duration_us: u64,
}

/// Payload types for different trace events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TracePayload {
    /// Transmission.
    #[serde(rename = "TX")]
    Tx(TxPayload),
    /// Reception outcome.
    #[serde(rename = "RX")]
    Rx(RxPayload),
    /// Channel switch.
    #[serde(rename = "CHANNEL_SWITCH")]
    ChannelSwitch(SwitchPayload),
}

/// A trace entry for output.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// Node name.
    pub origin: String,
    /// Entity id of the reporting PHY.
    pub origin_id: String,
    /// Simulation time in seconds.
    pub time_s: f64,
    /// Event-specific payload (flattened into this object).
    #[serde(flatten)]
    pub payload: TracePayload,
}

/// Trace recorder for outputting simulation events.
pub struct TraceRecorder {
    output: Option<Box<dyn Write>>,
    entries: Vec<TraceEntry>,
}

impl TraceRecorder {
    /// Create a new trace recorder. Without an output nothing is kept.
    pub fn new(output: Option<Box<dyn Write>>) -> Self {
        TraceRecorder {
            output,
            entries: Vec::new(),
        }
    }

    /// Whether entries are being kept.
    pub fn is_enabled(&self) -> bool {
        self.output.is_some()
    }

    /// Record an event.
    pub fn record(&mut self, entry: TraceEntry) {
        if self.is_enabled() {
            self.entries.push(entry);
        }
    }

    /// Flush all entries to output.
    pub fn flush(&mut self) -> Result<(), RunnerError> {
        if let Some(ref mut output) = self.output {
            let json = serde_json::to_string_pretty(&self.entries)?;
            writeln!(output, "{}", json)?;
            output.flush()?;
        }
        Ok(())
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// The main simulation event loop.
pub struct EventLoop {
    event_queue: BinaryHeap<Event>,
    simulation: BuiltSimulation,
    context: SimContext,
    trace: TraceRecorder,
    stats: SimulationStats,
    /// Per-node statistics, keyed by PHY entity ID.
    node_stats: HashMap<u64, NodeStats>,
    /// Node name by PHY and agent entity ID.
    entity_names: HashMap<u64, String>,
}

impl EventLoop {
    /// Create a new event loop.
    pub fn new(simulation: BuiltSimulation, seed: u64, trace_output: Option<Box<dyn Write>>) -> Self {
        let mut context = SimContext::new(seed);
        let mut event_queue = BinaryHeap::new();

        // Re-number initial events so they share the context's id space
        for mut event in simulation.initial_events.iter().cloned() {
            event.id = EventId(context.next_event_id());
            event_queue.push(event);
        }

        let mut node_stats = HashMap::new();
        let mut entity_names = HashMap::new();
        for node_info in &simulation.node_infos {
            node_stats.insert(node_info.phy_entity_id, NodeStats::default());
            entity_names.insert(node_info.phy_entity_id, node_info.name.clone());
            entity_names.insert(node_info.agent_entity_id, node_info.name.clone());
        }

        EventLoop {
            event_queue,
            simulation,
            context,
            trace: TraceRecorder::new(trace_output),
            stats: SimulationStats::default(),
            node_stats,
            entity_names,
        }
    }

    /// Run the simulation for the specified duration.
    pub fn run(&mut self, duration: SimTime) -> Result<SimulationStats, RunnerError> {
        self.run_with_progress(duration, None, |_, _, _| {})
    }

    /// Run the simulation with an optional stop flag and a progress callback.
    ///
    /// The callback is invoked roughly every five seconds of wall time or
    /// every 100 000 events, and once more at the end with `is_final` set.
    pub fn run_with_progress<F>(
        &mut self,
        duration: SimTime,
        stop_flag: Option<Arc<AtomicBool>>,
        mut on_progress: F,
    ) -> Result<SimulationStats, RunnerError>
    where
        F: FnMut(&Self, ProgressInfo, bool), // bool = is_final
    {
        let start_time = Instant::now();
        let end_time = duration;
        let progress_interval = Duration::from_secs(5);
        let event_progress_interval = 100_000u64;
        let mut last_progress = Instant::now();
        let mut last_progress_events = 0u64;

        self.event_queue.push(Event {
            id: EventId(u64::MAX),
            time: end_time,
            source: EntityId::new(0),
            targets: vec![],
            payload: EventPayload::SimulationEnd,
        });

        while let Some(event) = self.event_queue.pop() {
            if let Some(ref flag) = stop_flag {
                if flag.load(Ordering::Relaxed) {
                    info!(time = %self.context.time(), "simulation stopped");
                    break;
                }
            }

            if matches!(event.payload, EventPayload::SimulationEnd) {
                self.context.set_time(event.time);
                break;
            }

            if self.context.take_cancelled(event.id) {
                self.stats.cancelled_events += 1;
                continue;
            }

            self.context.set_time(event.time);
            self.simulation.entities.dispatch_event(&event, &mut self.context)?;
            self.event_queue.extend(self.context.take_pending_events());

            self.stats.total_events += 1;
            self.update_stats(&event);
            self.record_trace(&event);

            let should_report = last_progress.elapsed() >= progress_interval
                || self.stats.total_events - last_progress_events >= event_progress_interval;
            if should_report {
                let progress = self.progress(end_time, start_time.elapsed(), false);
                on_progress(self, progress, false);
                last_progress = Instant::now();
                last_progress_events = self.stats.total_events;
            }
        }

        self.stats.simulation_time_us = self.context.time().as_micros();
        self.stats.wall_time_ms = start_time.elapsed().as_millis() as u64;
        let progress = self.progress(end_time, start_time.elapsed(), true);
        on_progress(self, progress, true);

        self.trace.flush()?;
        info!(
            events = self.stats.total_events,
            frames = self.stats.frames_transmitted,
            wall_ms = self.stats.wall_time_ms,
            "simulation finished"
        );

        Ok(self.stats.clone())
    }

    fn progress(&self, end_time: SimTime, wall_elapsed: Duration, is_final: bool) -> ProgressInfo {
        let sim_time = self.context.time();
        let progress_percent = if is_final || end_time == SimTime::ZERO {
            100.0
        } else {
            sim_time.as_secs_f64() / end_time.as_secs_f64() * 100.0
        };
        ProgressInfo {
            sim_time,
            target_time: end_time,
            wall_elapsed,
            events_processed: self.stats.total_events,
            progress_percent,
        }
    }

    /// Get the per-node statistics, keyed by PHY entity id.
    pub fn node_stats(&self) -> &HashMap<u64, NodeStats> {
        &self.node_stats
    }

    /// Get the simulation node info.
    pub fn node_infos(&self) -> &[NodeInfo] {
        &self.simulation.node_infos
    }

    /// Traffic counters of every node's agent, in node order.
    pub fn agent_stats(&self) -> Vec<(String, TrafficStats)> {
        self.simulation
            .node_infos
            .iter()
            .filter_map(|info| {
                self.simulation
                    .entities
                    .get_as::<TrafficAgent>(EntityId(info.agent_entity_id))
                    .map(|agent| (info.name.clone(), agent.stats().clone()))
            })
            .collect()
    }

    /// Get current statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Get current simulation time.
    pub fn current_time(&self) -> SimTime {
        self.context.time()
    }

    /// Access the simulated entities.
    pub fn simulation(&self) -> &BuiltSimulation {
        &self.simulation
    }

    /// Update statistics based on event type.
    fn update_stats(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::ChannelTransmit(tx) => {
                self.stats.frames_transmitted += 1;
                if let Some(stats) = self.node_stats.get_mut(&tx.phy_id.0) {
                    stats.tx += 1;
                }
            }
            EventPayload::SignalArrival(_) => {
                self.stats.signal_arrivals += 1;
            }
            EventPayload::PhyNotification(n) => {
                let stats = self.node_stats.entry(n.phy_id.0).or_default();
                match &n.notification {
                    PhyNotification::RxEndOk { .. } => {
                        stats.rx_ok += 1;
                        self.stats.frames_received += 1;
                    }
                    PhyNotification::RxEndError { .. } => {
                        stats.rx_error += 1;
                        self.stats.frames_errored += 1;
                    }
                    PhyNotification::RxDrop { reason, .. } => {
                        stats.rx_drop += 1;
                        *self.stats.frames_dropped.entry(reason.as_label().to_string()).or_default() += 1;
                    }
                    PhyNotification::ChannelSwitching { .. } => {
                        self.stats.channel_switches += 1;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    /// Record a trace entry for an event.
    fn record_trace(&mut self, event: &Event) {
        if !self.trace.is_enabled() {
            return;
        }

        let (phy_id, payload) = match &event.payload {
            EventPayload::ChannelTransmit(tx) => (
                tx.phy_id,
                TracePayload::Tx(TxPayload {
                    frame_id: tx.frame.id,
                    size_bytes: tx.frame.size_bytes,
                    destination: tx.frame.destination.to_string(),
                    mode: tx.tx_vector.mode.name(),
                    preamble: format!("{:?}", tx.preamble),
                    packet_type: format!("{:?}", tx.packet_type),
                    tx_power_dbm: tx.tx_power_dbm,
                }),
            ),
            EventPayload::PhyNotification(n) => {
                let payload = match &n.notification {
                    PhyNotification::RxEndOk { frame, snr, .. } => TracePayload::Rx(RxPayload {
                        frame_id: frame.id,
                        status: "ok".to_string(),
                        snr_db: Some(10.0 * snr.log10()),
                        reason: None,
                    }),
                    PhyNotification::RxEndError { frame, snr } => TracePayload::Rx(RxPayload {
                        frame_id: frame.id,
                        status: "error".to_string(),
                        snr_db: Some(10.0 * snr.log10()),
                        reason: None,
                    }),
                    PhyNotification::RxDrop { frame, reason } => TracePayload::Rx(RxPayload {
                        frame_id: frame.id,
                        status: "drop".to_string(),
                        snr_db: None,
                        reason: Some(reason.as_label().to_string()),
                    }),
                    PhyNotification::ChannelSwitching { duration } => TracePayload::ChannelSwitch(SwitchPayload {
                        duration_us: duration.as_micros(),
                    }),
                    _ => return,
                };
                (n.phy_id, payload)
            }
            _ => return,
        };

        let origin = self
            .entity_names
            .get(&phy_id.0)
            .cloned()
            .unwrap_or_else(|| format!("Entity_{}", phy_id.0));
        debug!(origin = %origin, time = %event.time, payload = ?payload, "trace");

        self.trace.record(TraceEntry {
            origin,
            origin_id: phy_id.0.to_string(),
            time_s: event.time.as_secs_f64(),
            payload,
        });
    }
}

/// Create a new event loop from a built simulation, without a trace.
pub fn create_event_loop(simulation: BuiltSimulation, seed: u64) -> EventLoop {
    EventLoop::new(simulation, seed, None)
}
