//! # wifisim-agents
//!
//! Traffic agents for wifisim.
//!
//! This crate provides:
//!
//! - [`TrafficAgent`] - A MAC-stub entity attached to one PHY. It requests
//!   transmissions of single frames or A-MPDU bursts on a jittered schedule,
//!   optionally retunes its PHY once, and tallies the upward notifications
//!   the PHY sends back.
//!
//! - [`TrafficConfig`] - The per-node traffic configuration as it appears in
//!   scenario files.

use metrics::counter;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, trace};
use wifisim_common::{
    AmpduTag, Entity, EntityId, Event, EventPayload, MacAddress, PacketType, PhyNotification,
    PhyTxRequestEvent, SetChannelEvent, SimContext, SimError, SimTime, TxVector, WifiFrame,
    WifiMode, WifiPreamble,
};
use wifisim_phy::metric_defs;
use wifisim_phy::MetricLabels;

// ============================================================================
// Errors
// ============================================================================

/// Invalid traffic configuration.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The mode name is not in the mode table.
    #[error("unknown wifi mode: {0}")]
    UnknownMode(String),

    /// A burst was configured with a preamble that cannot open one.
    #[error("A-MPDU bursts of {size} need an HT preamble, got {preamble:?}")]
    InvalidBurst { size: u8, preamble: WifiPreamble },

    /// Frame size of zero.
    #[error("frame size must be positive")]
    EmptyFrame,
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Default frame size in bytes, MAC header and FCS included.
pub const DEFAULT_FRAME_SIZE: u32 = 1500;

/// Default payload mode.
pub const DEFAULT_MODE: &str = "OfdmRate6Mbps";

/// One-off retune of the attached PHY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSwitchConfig {
    /// When to retune, in seconds from the start.
    pub at_s: f64,
    /// New channel set encoding.
    pub channel_number: u64,
    /// New active set encoding.
    pub active_channels: u64,
    /// New primary channel id.
    pub primary_channel: u16,
}

/// Traffic generated by one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Whether the node sends at all.
    pub enabled: bool,
    /// Delay before the first transmission, in seconds.
    pub startup_s: f64,
    /// Standard deviation of the startup delay.
    pub startup_jitter_s: f64,
    /// Gap between the end of one transmission and the next, in seconds.
    pub interval_s: f64,
    /// Standard deviation of the gap.
    pub interval_jitter_s: f64,
    /// Stop after this many frames or bursts.
    pub message_count: Option<u32>,
    /// Stop sending after this time, in seconds.
    pub shutdown_s: Option<f64>,
    /// Frame size in bytes.
    pub frame_size: u32,
    /// Destination node name; broadcast when absent.
    pub destination: Option<String>,
    /// Payload mode name, e.g. `OfdmRate6Mbps` or `HtMcs7BW40MHz`.
    pub mode: String,
    /// Tx power level index.
    pub tx_power_level: u8,
    /// Preamble of single frames and of the first sub-frame of a burst.
    pub preamble: WifiPreamble,
    /// Sub-frames per A-MPDU burst; 1 sends plain frames.
    pub ampdu_size: u8,
    /// MAC duration field in microseconds.
    pub duration_field_us: u64,
    /// Optional retune.
    pub channel_switch: Option<ChannelSwitchConfig>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        TrafficConfig {
            enabled: false,
            startup_s: 0.0,
            startup_jitter_s: 0.0,
            interval_s: 0.01,
            interval_jitter_s: 0.0,
            message_count: None,
            shutdown_s: None,
            frame_size: DEFAULT_FRAME_SIZE,
            destination: None,
            mode: DEFAULT_MODE.to_string(),
            tx_power_level: 0,
            preamble: WifiPreamble::Long,
            ampdu_size: 1,
            duration_field_us: 0,
            channel_switch: None,
        }
    }
}

impl TrafficConfig {
    /// Resolve the configured mode and check the burst shape.
    pub fn tx_vector(&self) -> Result<TxVector, AgentError> {
        let mode = WifiMode::from_name(&self.mode).ok_or_else(|| AgentError::UnknownMode(self.mode.clone()))?;
        if self.frame_size == 0 {
            return Err(AgentError::EmptyFrame);
        }
        if self.ampdu_size > 1
            && !matches!(self.preamble, WifiPreamble::HtMixed | WifiPreamble::HtGreenfield)
        {
            return Err(AgentError::InvalidBurst {
                size: self.ampdu_size,
                preamble: self.preamble,
            });
        }
        let mut tx_vector = TxVector::new(mode);
        tx_vector.tx_power_level = self.tx_power_level;
        Ok(tx_vector)
    }
}

/// Where an agent sits in the simulation.
#[derive(Debug, Clone)]
pub struct TrafficLink {
    /// PHY the agent drives.
    pub phy: EntityId,
    /// The node's own address.
    pub address: MacAddress,
    /// Resolved destination address.
    pub destination: MacAddress,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters kept by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficStats {
    /// Frames handed to the PHY.
    pub frames_sent: u64,
    /// Bursts started.
    pub bursts_sent: u64,
    /// Bursts cut short by a channel switch.
    pub bursts_aborted: u64,
    /// Frames decoded, whatever their destination.
    pub rx_ok: u64,
    /// Decoded frames addressed to this node or to a group.
    pub frames_received: u64,
    /// Frames that failed to decode.
    pub rx_error: u64,
    /// Dropped arrivals by reason label.
    pub rx_drop: BTreeMap<String, u64>,
    /// CCA busy announcements.
    pub cca_busy: u64,
    /// NAV announcements.
    pub nav: u64,
    /// Channel switches performed by the PHY.
    pub channel_switches: u64,
}

impl TrafficStats {
    /// Total dropped arrivals.
    pub fn rx_dropped(&self) -> u64 {
        self.rx_drop.values().sum()
    }
}

// ============================================================================
// Timer IDs
// ============================================================================

const TIMER_INIT: u64 = 0;
const TIMER_STARTUP: u64 = 1;
const TIMER_SEND: u64 = 2;
const TIMER_BURST_NEXT: u64 = 3;
const TIMER_SHUTDOWN: u64 = 4;
const TIMER_CHANNEL_SWITCH: u64 = 5;

/// Sending state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficState {
    /// Traffic disabled in the configuration.
    Disabled,
    /// Waiting for the startup delay.
    WaitingStartup,
    /// Waiting for the next send time.
    WaitingInterval,
    /// Sending sub-frames of a burst.
    InBurst {
        /// Sub-frames still to request, the next one included.
        remaining: u8,
    },
    /// Done sending.
    Shutdown,
}

// ============================================================================
// Traffic Agent Entity
// ============================================================================

/// MAC-stub entity driving one PHY.
pub struct TrafficAgent {
    id: EntityId,
    name: String,
    config: TrafficConfig,
    link: TrafficLink,
    tx_vector: TxVector,
    rng: ChaCha8Rng,
    state: TrafficState,
    busy_until: SimTime,
    messages_sent: u32,
    stats: TrafficStats,
    metric_labels: MetricLabels,
}

impl TrafficAgent {
    /// Create an agent. Fails when the mode or burst shape is invalid.
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        config: TrafficConfig,
        link: TrafficLink,
        rng: ChaCha8Rng,
        metric_labels: MetricLabels,
    ) -> Result<Self, AgentError> {
        let tx_vector = config.tx_vector()?;
        let state = if config.enabled {
            TrafficState::WaitingStartup
        } else {
            TrafficState::Disabled
        };
        Ok(TrafficAgent {
            id,
            name: name.into(),
            config,
            link,
            tx_vector,
            rng,
            state,
            busy_until: SimTime::ZERO,
            messages_sent: 0,
            stats: TrafficStats::default(),
            metric_labels,
        })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration.
    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// PHY this agent drives.
    pub fn phy(&self) -> EntityId {
        self.link.phy
    }

    /// Current sending state.
    pub fn state(&self) -> TrafficState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    // ========================================================================
    // Timing Helpers
    // ========================================================================

    /// Delay with optional normally distributed jitter, clamped at zero.
    fn jittered_delay(&mut self, base_s: f64, jitter_s: f64) -> SimTime {
        let delay = if jitter_s > 0.0 {
            match Normal::new(base_s, jitter_s) {
                Ok(normal) => normal.sample(&mut self.rng).max(0.0),
                Err(_) => base_s,
            }
        } else {
            base_s
        };
        SimTime::from_secs(delay.max(0.0))
    }

    fn schedule(&self, ctx: &mut SimContext, delay: SimTime, timer_id: u64) {
        ctx.post_event(delay, vec![self.id], EventPayload::Timer { timer_id });
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn on_init(&mut self, ctx: &mut SimContext) {
        if let Some(switch) = &self.config.channel_switch {
            let delay = SimTime::from_secs(switch.at_s.max(0.0));
            self.schedule(ctx, delay, TIMER_CHANNEL_SWITCH);
        }
        if self.state != TrafficState::WaitingStartup {
            return;
        }
        let delay = self.jittered_delay(self.config.startup_s, self.config.startup_jitter_s);
        info!(agent = %self.name, startup = %delay, "traffic scheduled");
        self.schedule(ctx, delay, TIMER_STARTUP);
        if let Some(shutdown_s) = self.config.shutdown_s {
            self.schedule(ctx, SimTime::from_secs(shutdown_s.max(0.0)), TIMER_SHUTDOWN);
        }
    }

    /// Start the next frame or burst, or defer while the PHY is busy.
    fn send_next(&mut self, ctx: &mut SimContext) {
        if let Some(limit) = self.config.message_count {
            if self.messages_sent >= limit {
                debug!(agent = %self.name, limit, "message count limit reached");
                self.state = TrafficState::Shutdown;
                return;
            }
        }

        let now = ctx.time();
        if self.busy_until > now {
            self.state = TrafficState::WaitingInterval;
            self.schedule(ctx, self.busy_until - now, TIMER_SEND);
            return;
        }

        self.messages_sent += 1;
        let size = self.config.ampdu_size.max(1);
        let labels = self.metric_labels.to_labels();
        if size > 1 {
            self.stats.bursts_sent += 1;
            counter!(metric_defs::AGENT_BURSTS_SENT.name, &labels).increment(1);
        }
        self.state = TrafficState::InBurst { remaining: size };
        self.request_subframe(ctx);
    }

    /// Hand the next sub-frame of the current burst to the PHY.
    fn request_subframe(&mut self, ctx: &mut SimContext) {
        let TrafficState::InBurst { remaining } = self.state else {
            return;
        };
        let size = self.config.ampdu_size.max(1);
        let (preamble, packet_type, ampdu) = if size == 1 {
            (self.config.preamble, PacketType::Normal, None)
        } else {
            let preamble = if remaining == size {
                self.config.preamble
            } else {
                WifiPreamble::None
            };
            let packet_type = if remaining == 1 {
                PacketType::AmpduLast
            } else {
                PacketType::AmpduMiddle
            };
            (preamble, packet_type, Some(AmpduTag { remaining }))
        };

        let frame = WifiFrame {
            id: ctx.next_event_id(),
            size_bytes: self.config.frame_size,
            source: self.link.address,
            destination: self.link.destination,
            duration_field: SimTime::from_micros(self.config.duration_field_us),
            ampdu,
        };
        trace!(
            agent = %self.name,
            frame = frame.id,
            remaining,
            ?preamble,
            "requesting transmission"
        );

        self.stats.frames_sent += 1;
        counter!(metric_defs::AGENT_FRAMES_SENT.name, &self.metric_labels.to_labels()).increment(1);
        self.state = TrafficState::InBurst { remaining: remaining - 1 };
        ctx.post_immediate(
            vec![self.link.phy],
            EventPayload::PhyTxRequest(PhyTxRequestEvent {
                frame,
                tx_vector: self.tx_vector,
                preamble,
                packet_type,
            }),
        );
    }

    /// Our PHY started sending one of our frames.
    fn on_tx_begin(&mut self, ctx: &mut SimContext, duration: SimTime) {
        self.busy_until = self.busy_until.max(ctx.time() + duration);
        match self.state {
            TrafficState::InBurst { remaining } if remaining > 0 => {
                self.schedule(ctx, duration, TIMER_BURST_NEXT);
            }
            TrafficState::InBurst { .. } => {
                self.state = TrafficState::WaitingInterval;
                let gap = self.jittered_delay(self.config.interval_s, self.config.interval_jitter_s);
                self.schedule(ctx, duration + gap, TIMER_SEND);
            }
            _ => {}
        }
    }

    fn on_channel_switching(&mut self, ctx: &mut SimContext, duration: SimTime) {
        self.stats.channel_switches += 1;
        self.busy_until = self.busy_until.max(ctx.time() + duration);
        if let TrafficState::InBurst { remaining } = self.state {
            debug!(agent = %self.name, remaining, "burst cut short by channel switch");
            self.stats.bursts_aborted += 1;
            self.state = TrafficState::WaitingInterval;
            let gap = self.jittered_delay(self.config.interval_s, self.config.interval_jitter_s);
            self.schedule(ctx, duration + gap, TIMER_SEND);
        }
    }

    fn switch_channel(&mut self, ctx: &mut SimContext) {
        let Some(switch) = self.config.channel_switch.clone() else {
            return;
        };
        info!(
            agent = %self.name,
            channel_number = switch.channel_number,
            active = switch.active_channels,
            primary = switch.primary_channel,
            "requesting channel switch"
        );
        ctx.post_immediate(
            vec![self.link.phy],
            EventPayload::SetChannel(SetChannelEvent {
                channel_number: switch.channel_number,
                active_channels: switch.active_channels,
                primary_channel: switch.primary_channel,
            }),
        );
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn handle_notification(&mut self, notification: &PhyNotification, ctx: &mut SimContext) {
        match notification {
            PhyNotification::TxBegin { duration, .. } => self.on_tx_begin(ctx, *duration),
            PhyNotification::RxEndOk { frame, snr, .. } => {
                self.stats.rx_ok += 1;
                if frame.destination == self.link.address || frame.destination.is_group() {
                    self.stats.frames_received += 1;
                    counter!(metric_defs::AGENT_FRAMES_RECEIVED.name, &self.metric_labels.to_labels())
                        .increment(1);
                }
                trace!(agent = %self.name, frame = frame.id, snr, "frame received");
            }
            PhyNotification::RxEndError { .. } => self.stats.rx_error += 1,
            PhyNotification::RxDrop { reason, .. } => {
                *self.stats.rx_drop.entry(reason.as_label().to_string()).or_default() += 1;
            }
            PhyNotification::CcaBusyStart { .. } => self.stats.cca_busy += 1,
            PhyNotification::NavStart { .. } => self.stats.nav += 1,
            PhyNotification::ChannelSwitching { duration } => self.on_channel_switching(ctx, *duration),
            PhyNotification::RxBegin { .. }
            | PhyNotification::MonitorSniffRx(_)
            | PhyNotification::MonitorSniffTx(_) => {}
        }
    }
}

impl Entity for TrafficAgent {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::Timer { timer_id } => match *timer_id {
                TIMER_INIT => self.on_init(ctx),
                TIMER_STARTUP => {
                    if self.state == TrafficState::WaitingStartup {
                        self.send_next(ctx);
                    }
                }
                TIMER_SEND => {
                    if self.state == TrafficState::WaitingInterval {
                        self.send_next(ctx);
                    }
                }
                TIMER_BURST_NEXT => {
                    if matches!(self.state, TrafficState::InBurst { remaining } if remaining > 0) {
                        self.request_subframe(ctx);
                    }
                }
                TIMER_SHUTDOWN => {
                    if self.state != TrafficState::Disabled && self.state != TrafficState::Shutdown {
                        debug!(agent = %self.name, "shutdown time reached");
                        self.state = TrafficState::Shutdown;
                    }
                }
                TIMER_CHANNEL_SWITCH => self.switch_channel(ctx),
                _ => {}
            },
            EventPayload::PhyNotification(note) => self.handle_notification(&note.notification, ctx),
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use wifisim_common::{DropReason, EventId, NodeRole, PhyNotificationEvent};

    const AGENT: EntityId = EntityId(10);
    const PHY: EntityId = EntityId(1);

    fn agent(config: TrafficConfig) -> TrafficAgent {
        TrafficAgent::new(
            AGENT,
            "sta0",
            config,
            TrafficLink {
                phy: PHY,
                address: MacAddress::from_index(0),
                destination: MacAddress::from_index(1),
            },
            ChaCha8Rng::seed_from_u64(7),
            MetricLabels::new("sta0", NodeRole::Sta),
        )
        .unwrap()
    }

    fn enabled() -> TrafficConfig {
        TrafficConfig {
            enabled: true,
            startup_s: 0.001,
            interval_s: 0.002,
            frame_size: 200,
            ..Default::default()
        }
    }

    fn deliver(agent: &mut TrafficAgent, ctx: &mut SimContext, payload: EventPayload) -> Vec<Event> {
        let event = Event {
            id: EventId(ctx.next_event_id()),
            time: ctx.time(),
            source: AGENT,
            targets: vec![AGENT],
            payload,
        };
        agent.handle_event(&event, ctx).unwrap();
        ctx.take_pending_events()
    }

    fn timer(agent: &mut TrafficAgent, ctx: &mut SimContext, timer_id: u64) -> Vec<Event> {
        deliver(agent, ctx, EventPayload::Timer { timer_id })
    }

    fn note(agent: &mut TrafficAgent, ctx: &mut SimContext, notification: PhyNotification) -> Vec<Event> {
        deliver(
            agent,
            ctx,
            EventPayload::PhyNotification(PhyNotificationEvent { phy_id: PHY, notification }),
        )
    }

    fn tx_requests(events: &[Event]) -> Vec<&PhyTxRequestEvent> {
        events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::PhyTxRequest(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    fn timers(events: &[Event]) -> Vec<(SimTime, u64)> {
        events
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::Timer { timer_id } => Some((e.time, timer_id)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_config_default() {
        let config = TrafficConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.frame_size, DEFAULT_FRAME_SIZE);
        assert_eq!(config.ampdu_size, 1);
        assert_eq!(config.tx_vector().unwrap().mode, WifiMode::ofdm(6).unwrap());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = "enabled: true\ninterval_s: 0.5\nmode: HtMcs7BW20MHz\npreamble: ht_mixed\nampdu_size: 4\n";
        let config: TrafficConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.ampdu_size, 4);
        assert_eq!(config.preamble, WifiPreamble::HtMixed);
        assert_eq!(config.frame_size, DEFAULT_FRAME_SIZE, "unset fields keep their defaults");
        assert_eq!(config.tx_vector().unwrap().mode.mcs, Some(7));
    }

    #[test]
    fn test_config_rejects_bad_mode_and_burst() {
        let bad_mode = TrafficConfig { mode: "OfdmRate7Mbps".into(), ..Default::default() };
        assert!(matches!(bad_mode.tx_vector(), Err(AgentError::UnknownMode(_))));

        let bad_burst = TrafficConfig { ampdu_size: 3, ..Default::default() };
        assert!(matches!(bad_burst.tx_vector(), Err(AgentError::InvalidBurst { size: 3, .. })));

        let empty = TrafficConfig { frame_size: 0, ..Default::default() };
        assert!(matches!(empty.tx_vector(), Err(AgentError::EmptyFrame)));
    }

    #[test]
    fn test_disabled_agent_stays_quiet() {
        let mut a = agent(TrafficConfig::default());
        let mut ctx = SimContext::new(1);
        let events = timer(&mut a, &mut ctx, TIMER_INIT);
        assert!(events.is_empty(), "disabled agent scheduled {:?}", timers(&events));
        assert_eq!(a.state(), TrafficState::Disabled);
    }

    #[test]
    fn test_init_schedules_startup_and_shutdown() {
        let mut a = agent(TrafficConfig { shutdown_s: Some(1.0), ..enabled() });
        let mut ctx = SimContext::new(1);
        let events = timer(&mut a, &mut ctx, TIMER_INIT);
        assert_eq!(
            timers(&events),
            vec![(SimTime::from_millis(1), TIMER_STARTUP), (SimTime::from_millis(1000), TIMER_SHUTDOWN)]
        );
    }

    #[test]
    fn test_single_frame_then_interval() {
        let mut a = agent(enabled());
        let mut ctx = SimContext::new(1);
        ctx.set_time(SimTime::from_millis(1));
        let events = timer(&mut a, &mut ctx, TIMER_STARTUP);
        let reqs = tx_requests(&events);
        assert_eq!(reqs.len(), 1);
        let req = reqs[0];
        assert_eq!(req.frame.size_bytes, 200);
        assert_eq!(req.frame.destination, MacAddress::from_index(1));
        assert_eq!(req.preamble, WifiPreamble::Long);
        assert_eq!(req.packet_type, PacketType::Normal);
        assert!(req.frame.ampdu.is_none());

        let frame = req.frame.clone();
        let events = note(&mut a, &mut ctx, PhyNotification::TxBegin { frame, duration: SimTime::from_micros(292) });
        assert_eq!(
            timers(&events),
            vec![(SimTime::from_micros(1000 + 292 + 2000), TIMER_SEND)],
            "next frame waits for the end of TX plus the interval"
        );
        assert_eq!(a.state(), TrafficState::WaitingInterval);
        assert_eq!(a.stats().frames_sent, 1);
        assert_eq!(a.stats().bursts_sent, 0);
    }

    #[test]
    fn test_burst_sub_frames() {
        let config = TrafficConfig {
            mode: "HtMcs7BW20MHz".into(),
            preamble: WifiPreamble::HtMixed,
            ampdu_size: 3,
            ..enabled()
        };
        let mut a = agent(config);
        let mut ctx = SimContext::new(1);
        let sub_air = SimTime::from_micros(40);

        let mut shapes = Vec::new();
        let mut events = timer(&mut a, &mut ctx, TIMER_STARTUP);
        for _ in 0..3 {
            let req = tx_requests(&events)[0].clone();
            shapes.push((req.preamble, req.packet_type, req.frame.ampdu.map(|t| t.remaining)));
            events = note(&mut a, &mut ctx, PhyNotification::TxBegin { frame: req.frame, duration: sub_air });
            let (at, id) = timers(&events)[0];
            ctx.set_time(at);
            if id == TIMER_SEND {
                break;
            }
            assert_eq!(id, TIMER_BURST_NEXT);
            events = timer(&mut a, &mut ctx, TIMER_BURST_NEXT);
        }

        assert_eq!(
            shapes,
            vec![
                (WifiPreamble::HtMixed, PacketType::AmpduMiddle, Some(3)),
                (WifiPreamble::None, PacketType::AmpduMiddle, Some(2)),
                (WifiPreamble::None, PacketType::AmpduLast, Some(1)),
            ]
        );
        assert_eq!(ctx.time(), SimTime::from_micros(3 * 40 + 2000));
        assert_eq!(a.stats().frames_sent, 3);
        assert_eq!(a.stats().bursts_sent, 1);
    }

    #[test]
    fn test_message_count_limit() {
        let mut a = agent(TrafficConfig { message_count: Some(1), ..enabled() });
        let mut ctx = SimContext::new(1);
        let events = timer(&mut a, &mut ctx, TIMER_STARTUP);
        let frame = tx_requests(&events)[0].frame.clone();
        note(&mut a, &mut ctx, PhyNotification::TxBegin { frame, duration: SimTime::from_micros(10) });
        let events = timer(&mut a, &mut ctx, TIMER_SEND);
        assert!(tx_requests(&events).is_empty());
        assert_eq!(a.state(), TrafficState::Shutdown);
    }

    #[test]
    fn test_shutdown_stops_sending() {
        let mut a = agent(enabled());
        let mut ctx = SimContext::new(1);
        timer(&mut a, &mut ctx, TIMER_SHUTDOWN);
        let events = timer(&mut a, &mut ctx, TIMER_STARTUP);
        assert!(tx_requests(&events).is_empty());
        assert_eq!(a.state(), TrafficState::Shutdown);
    }

    #[test]
    fn test_send_deferred_while_switching() {
        let mut a = agent(enabled());
        let mut ctx = SimContext::new(1);
        note(&mut a, &mut ctx, PhyNotification::ChannelSwitching { duration: SimTime::from_micros(250) });
        let events = timer(&mut a, &mut ctx, TIMER_STARTUP);
        assert!(tx_requests(&events).is_empty());
        assert_eq!(timers(&events), vec![(SimTime::from_micros(250), TIMER_SEND)]);

        ctx.set_time(SimTime::from_micros(250));
        let events = timer(&mut a, &mut ctx, TIMER_SEND);
        assert_eq!(tx_requests(&events).len(), 1);
    }

    #[test]
    fn test_channel_switch_aborts_burst() {
        let config = TrafficConfig {
            mode: "HtMcs0BW20MHz".into(),
            preamble: WifiPreamble::HtMixed,
            ampdu_size: 4,
            channel_switch: Some(ChannelSwitchConfig {
                at_s: 0.0,
                channel_number: 11,
                active_channels: 11,
                primary_channel: 11,
            }),
            ..enabled()
        };
        let mut a = agent(config);
        let mut ctx = SimContext::new(1);
        timer(&mut a, &mut ctx, TIMER_STARTUP);

        let events = timer(&mut a, &mut ctx, TIMER_CHANNEL_SWITCH);
        assert!(events.iter().any(|e| matches!(
            &e.payload,
            EventPayload::SetChannel(s) if s.channel_number == 11 && s.primary_channel == 11
        )));

        let events = note(&mut a, &mut ctx, PhyNotification::ChannelSwitching { duration: SimTime::from_micros(250) });
        assert_eq!(a.state(), TrafficState::WaitingInterval);
        assert_eq!(timers(&events), vec![(SimTime::from_micros(250 + 2000), TIMER_SEND)]);
        assert_eq!(a.stats().bursts_aborted, 1);
        assert_eq!(a.stats().channel_switches, 1);

        let events = timer(&mut a, &mut ctx, TIMER_BURST_NEXT);
        assert!(tx_requests(&events).is_empty(), "aborted burst does not continue");
    }

    #[test]
    fn test_notifications_counted() {
        let mut a = agent(TrafficConfig::default());
        let mut ctx = SimContext::new(1);
        let mut frame = WifiFrame {
            id: 1,
            size_bytes: 100,
            source: MacAddress::from_index(1),
            destination: MacAddress::from_index(0),
            duration_field: SimTime::ZERO,
            ampdu: None,
        };
        let mode = WifiMode::ofdm(6).unwrap();
        note(&mut a, &mut ctx, PhyNotification::RxEndOk { frame: frame.clone(), snr: 100.0, mode, preamble: WifiPreamble::Long });
        frame.destination = MacAddress::from_index(5);
        note(&mut a, &mut ctx, PhyNotification::RxEndOk { frame: frame.clone(), snr: 100.0, mode, preamble: WifiPreamble::Long });
        note(&mut a, &mut ctx, PhyNotification::RxEndError { frame: frame.clone(), snr: 1.0 });
        note(&mut a, &mut ctx, PhyNotification::RxDrop { frame: frame.clone(), reason: DropReason::Busy });
        note(&mut a, &mut ctx, PhyNotification::RxDrop { frame, reason: DropReason::Busy });
        note(&mut a, &mut ctx, PhyNotification::CcaBusyStart { duration: SimTime::from_micros(5) });
        note(&mut a, &mut ctx, PhyNotification::NavStart { duration: SimTime::from_micros(5) });

        let stats = a.stats();
        assert_eq!(stats.rx_ok, 2);
        assert_eq!(stats.frames_received, 1, "only frames addressed to us are delivered");
        assert_eq!(stats.rx_error, 1);
        assert_eq!(stats.rx_drop.get("busy"), Some(&2));
        assert_eq!(stats.rx_dropped(), 2);
        assert_eq!(stats.cca_busy, 1);
        assert_eq!(stats.nav, 1);
    }

    #[test]
    fn test_jitter_is_reproducible_and_non_negative() {
        let config = TrafficConfig { startup_s: 0.0001, startup_jitter_s: 0.01, ..enabled() };
        let draws = |seed| {
            let mut a = agent(config.clone());
            a.rng = ChaCha8Rng::seed_from_u64(seed);
            (0..32).map(|_| a.jittered_delay(0.0001, 0.01)).collect::<Vec<_>>()
        };
        let first = draws(3);
        assert_eq!(first, draws(3));
        assert!(first.iter().any(|d| *d == SimTime::ZERO), "negative draws clamp to zero");
        assert!(first.iter().any(|d| *d > SimTime::from_millis(1)));
    }
}
