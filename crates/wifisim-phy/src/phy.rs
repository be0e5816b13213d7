//! The PHY entity: receive state machine, transmit path and channel switching.

use crate::channel_bonding::ChannelBonding;
use crate::config::PhyConfig;
use crate::error::PhyResult;
use crate::interference::{InterferenceHelper, RxEvent};
use crate::lut::PerLookupTables;
use crate::metric_defs::{self, MetricLabels};
use crate::per::PerEngine;
use crate::plcp::tx_duration;
use crate::state::{PhyState, PhyStateTracker};
use crate::{dbm_to_w, w_to_dbm};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use wifisim_common::{
    ChannelEndpointUpdateEvent, ChannelTransmitEvent, DropReason, Entity, EntityId, Event, EventId, EventPayload,
    MacAddress, MonitorSniff, NodeRole, PhyNotification, PhyNotificationEvent, PhyTxRequestEvent, Position, RxSignal,
    SetChannelEvent, SignalArrivalEvent, SimContext, SimError, SimTime, WifiFrame, WifiPreamble,
};

/// Timer ids used by the PHY.
const TIMER_END_RX: u64 = 1;
const TIMER_DEFERRED_SWITCH: u64 = 2;
const TIMER_CCA_END: u64 = 3;

/// Build the PER engine a configuration asks for.
pub fn build_per_engine(config: &PhyConfig, tables: &Arc<PerLookupTables>) -> PerEngine {
    if config.use_lut_for_per {
        PerEngine::lookup(Arc::clone(tables), config.coding)
    } else {
        PerEngine::closed_form()
    }
}

/// A uniform draw at or below the preamble PER loses synchronization.
fn preamble_lost(draw: f64, preamble_per: f64) -> bool {
    draw <= preamble_per
}

/// Progress of the first sub-frame of an A-MPDU burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstMpduStatus {
    /// No burst, or a later sub-frame is being received.
    #[default]
    Idle,
    /// The first sub-frame is being received.
    Receiving,
    /// The first sub-frame decoded.
    Ok,
    /// The first sub-frame failed; the rest of the burst is dropped.
    Failed,
}

/// Where a PHY sits and who it talks to.
#[derive(Debug, Clone)]
pub struct PhyLink {
    /// Channel medium entity.
    pub channel: EntityId,
    /// Entity receiving notifications.
    pub agent: EntityId,
    /// Own MAC address.
    pub address: MacAddress,
    /// Antenna position.
    pub position: Position,
    /// Network role.
    pub role: NodeRole,
}

/// Frame the PHY is synchronized to.
#[derive(Debug, Clone)]
struct Reception {
    event: RxEvent,
    frame: WifiFrame,
    end_rx: EventId,
}

/// An 802.11n PHY.
pub struct WifiPhy {
    id: EntityId,
    config: PhyConfig,
    link: PhyLink,
    bonding: ChannelBonding,
    state: PhyStateTracker,
    interference: InterferenceHelper,
    rng: ChaCha8Rng,

    reception: Option<Reception>,
    mpdus_num: u8,
    first_mpdu: FirstMpduStatus,
    deferred_switch: Option<SetChannelEvent>,
    cca_timer: Option<EventId>,

    metric_labels: MetricLabels,
}

impl WifiPhy {
    /// Create a PHY tuned to the configured channel.
    pub fn new(
        id: EntityId,
        config: PhyConfig,
        link: PhyLink,
        engine: PerEngine,
        rng: ChaCha8Rng,
        metric_labels: MetricLabels,
    ) -> PhyResult<Self> {
        let bonding = ChannelBonding::new(
            config.frequency_mhz,
            config.channel_number,
            config.active_channels,
            config.primary_channel,
        )?;
        let interference = InterferenceHelper::new(bonding.num_channels(), config.noise_figure_linear(), engine);
        Ok(WifiPhy {
            id,
            config,
            link,
            bonding,
            state: PhyStateTracker::new(),
            interference,
            rng,
            reception: None,
            mpdus_num: 0,
            first_mpdu: FirstMpduStatus::Idle,
            deferred_switch: None,
            cca_timer: None,
            metric_labels,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &PhyConfig {
        &self.config
    }

    /// Current channel configuration.
    pub fn bonding(&self) -> &ChannelBonding {
        &self.bonding
    }

    /// Own MAC address.
    pub fn address(&self) -> MacAddress {
        self.link.address
    }

    /// State at `now`.
    pub fn state(&self, now: SimTime) -> PhyState {
        self.state.state(now)
    }

    /// Interference accumulator.
    pub fn interference(&self) -> &InterferenceHelper {
        &self.interference
    }

    /// A-MPDU bookkeeping: sub-frames still expected and first sub-frame status.
    pub fn ampdu_progress(&self) -> (u8, FirstMpduStatus) {
        (self.mpdus_num, self.first_mpdu)
    }

    /// Metric labels.
    pub fn metric_labels(&self) -> &MetricLabels {
        &self.metric_labels
    }

    /// Tuning and position as announced to the channel medium.
    pub fn endpoint_update(&self) -> ChannelEndpointUpdateEvent {
        ChannelEndpointUpdateEvent {
            phy_id: self.id,
            frequency_mhz: self.config.frequency_mhz,
            channel_number: self.bonding.channel_number(),
            active_channels: self.bonding.active_encoding(),
            primary_channel: self.bonding.primary(),
            position: self.link.position,
            role: self.link.role,
        }
    }

    fn notify(&self, ctx: &mut SimContext, notification: PhyNotification) {
        ctx.post_immediate(
            vec![self.link.agent],
            EventPayload::PhyNotification(PhyNotificationEvent {
                phy_id: self.id,
                notification,
            }),
        );
    }

    fn drop_frame(&self, ctx: &mut SimContext, frame: &WifiFrame, reason: DropReason) {
        tracing::debug!(phy = %self.id, frame = frame.id, reason = reason.as_label(), "frame dropped");
        let mut labels = self.metric_labels.to_labels();
        labels.push(("reason", reason.as_label().to_string()));
        metrics::counter!(metric_defs::PHY_RX_DROP.name, &labels).increment(1);
        self.notify(ctx, PhyNotification::RxDrop { frame: frame.clone(), reason });
    }

    // ========================================================================
    // Receive path
    // ========================================================================

    fn start_receive(&mut self, arrival: &SignalArrivalEvent, ctx: &mut SimContext) {
        let now = ctx.time();
        let frame = &arrival.frame;
        let duration = tx_duration(
            frame.size_bytes,
            &arrival.tx_vector,
            arrival.preamble,
            arrival.signal.packet_type,
        );
        let signal = RxSignal {
            powers: arrival
                .signal
                .powers
                .iter()
                .map(|&dbm| dbm_to_w(dbm + self.config.rx_gain_db))
                .collect(),
            ..arrival.signal.clone()
        };
        let event = self
            .interference
            .add(now, duration, frame.size_bytes, arrival.tx_vector, arrival.preamble, signal);

        match self.state.state(now) {
            PhyState::Switching | PhyState::Rx | PhyState::Tx => {
                self.drop_frame(ctx, frame, DropReason::Busy);
                if event.end > now + self.state.delay_until_idle(now) {
                    self.maybe_cca_busy(ctx);
                }
            }
            PhyState::Idle | PhyState::CcaBusy => {
                let primary_w = event
                    .signal
                    .powers
                    .get(self.bonding.primary_index())
                    .copied()
                    .unwrap_or(0.0);
                if primary_w >= self.config.ed_threshold_w() {
                    match self.try_sync(&event, arrival, ctx) {
                        Ok(()) => self.begin_rx(event, frame.clone(), ctx),
                        Err(reason) => {
                            self.drop_frame(ctx, frame, reason);
                            self.maybe_cca_busy(ctx);
                        }
                    }
                } else {
                    tracing::debug!(
                        phy = %self.id,
                        power_dbm = w_to_dbm(primary_w),
                        threshold_dbm = self.config.ed_threshold_dbm,
                        "signal below energy detection threshold"
                    );
                    self.drop_frame(ctx, frame, DropReason::BelowEdThreshold);
                    self.maybe_cca_busy(ctx);
                }
            }
        }
    }

    /// Decide whether to synchronize to an arrival above the ED threshold.
    fn try_sync(
        &mut self,
        event: &RxEvent,
        arrival: &SignalArrivalEvent,
        ctx: &mut SimContext,
    ) -> Result<(), DropReason> {
        let frame = &arrival.frame;

        let per_preamble = self.interference.preamble_per(event);
        if preamble_lost(self.rng.gen::<f64>(), per_preamble) {
            return Err(DropReason::PreambleSync);
        }

        if self.config.check_address_at_phy
            && frame.destination != self.link.address
            && !frame.destination.is_group()
        {
            self.notify(
                ctx,
                PhyNotification::NavStart {
                    duration: frame.duration_field + event.duration(),
                },
            );
            return Err(DropReason::AddressMismatch);
        }

        if event.signal.active_width() < self.bonding.num_active() {
            return Err(DropReason::TooNarrow);
        }

        let no_preamble = arrival.preamble == WifiPreamble::None;
        match (no_preamble, frame.ampdu, self.mpdus_num) {
            (true, _, 0) => return Err(DropReason::AmpduNoBurst),
            (false, Some(tag), 0) => {
                self.mpdus_num = tag.remaining.saturating_sub(1);
                self.first_mpdu = FirstMpduStatus::Receiving;
            }
            (true, Some(tag), expected) => {
                if tag.remaining < expected {
                    tracing::warn!(
                        phy = %self.id,
                        missing = expected - tag.remaining,
                        "sub-frames missing from A-MPDU"
                    );
                    self.mpdus_num = tag.remaining;
                } else {
                    self.mpdus_num -= 1;
                }
            }
            (false, _, expected) if expected > 0 => {
                tracing::debug!(phy = %self.id, expected, "A-MPDU ended before its last sub-frames");
                self.first_mpdu = FirstMpduStatus::Idle;
                self.mpdus_num = 0;
            }
            _ => self.first_mpdu = FirstMpduStatus::Idle,
        }
        Ok(())
    }

    fn begin_rx(&mut self, event: RxEvent, frame: WifiFrame, ctx: &mut SimContext) {
        let now = ctx.time();
        let duration = event.duration();
        tracing::debug!(phy = %self.id, frame = frame.id, duration = %duration, "sync to signal");
        self.state.switch_to_rx(now, duration);
        self.notify(ctx, PhyNotification::RxBegin { frame_id: frame.id, duration });
        self.interference.notify_rx_start();
        let end_rx = ctx.post_event(duration, vec![self.id], EventPayload::Timer { timer_id: TIMER_END_RX });
        self.reception = Some(Reception { event, frame, end_rx });
    }

    fn end_receive(&mut self, ctx: &mut SimContext) {
        let Some(Reception { event, frame, .. }) = self.reception.take() else {
            tracing::trace!(phy = %self.id, "end of reception with nothing in progress");
            return;
        };
        debug_assert_eq!(event.end, ctx.time(), "end of reception fired off schedule");

        if self.first_mpdu == FirstMpduStatus::Failed {
            self.interference.notify_rx_end();
            self.state.end_rx();
            self.drop_frame(ctx, &frame, DropReason::AmpduFirstFailed);
            return;
        }

        let snr_per = self.interference.calculate_snr_per(&event);
        self.interference.notify_rx_end();
        self.state.end_rx();
        tracing::debug!(
            phy = %self.id,
            frame = frame.id,
            mode = %event.mode().name(),
            snr = snr_per.snr,
            per = snr_per.per,
            "reception complete"
        );

        let labels = self.metric_labels.to_labels();
        metrics::histogram!(metric_defs::PHY_RX_SNR.name, &labels).record(10.0 * snr_per.snr.log10());
        metrics::histogram!(metric_defs::PHY_RX_PER.name, &labels).record(snr_per.per);

        if self.rng.gen::<f64>() > snr_per.per {
            metrics::counter!(metric_defs::PHY_RX_OK.name, &labels).increment(1);
            let rx_w = event.rx_power_w();
            let sniff = MonitorSniff {
                frame_id: frame.id,
                frequency_mhz: self.config.frequency_mhz,
                channel: self.bonding.primary(),
                rate_500kbps: self.rate_500kbps(&event),
                short_preamble: event.preamble == WifiPreamble::Short,
                signal_dbm: Some(w_to_dbm(rx_w)),
                noise_dbm: Some(w_to_dbm(rx_w / snr_per.snr) - self.config.noise_figure_db),
            };
            self.notify(ctx, PhyNotification::MonitorSniffRx(sniff));
            self.notify(
                ctx,
                PhyNotification::RxEndOk {
                    frame,
                    snr: snr_per.snr,
                    mode: event.mode(),
                    preamble: event.preamble,
                },
            );
            if self.first_mpdu == FirstMpduStatus::Receiving {
                self.first_mpdu = FirstMpduStatus::Ok;
            }
        } else {
            metrics::counter!(metric_defs::PHY_RX_ERROR.name, &labels).increment(1);
            self.notify(ctx, PhyNotification::RxEndError { frame, snr: snr_per.snr });
            if self.first_mpdu == FirstMpduStatus::Receiving {
                self.first_mpdu = FirstMpduStatus::Failed;
            }
        }
    }

    fn rate_500kbps(&self, event: &RxEvent) -> u32 {
        (event.mode().data_rate_bps * u64::from(event.tx_vector.nss) / 500_000) as u32
    }

    /// Extend CCA busy while the primary sub-channel stays above the CCA threshold.
    fn maybe_cca_busy(&mut self, ctx: &mut SimContext) {
        let now = ctx.time();
        let busy = self.interference.energy_duration(
            self.config.cca_threshold_w(),
            self.bonding.primary_index(),
            now,
        );
        if busy == SimTime::ZERO {
            return;
        }

        let added = self.state.switch_maybe_to_cca_busy(now, busy);
        self.notify(ctx, PhyNotification::CcaBusyStart { duration: busy });
        if added > SimTime::ZERO {
            let labels = self.metric_labels.to_labels();
            metrics::counter!(metric_defs::PHY_CCA_BUSY.name, &labels).increment(added.as_micros());
            if let Some(timer) = self.cca_timer.take() {
                ctx.cancel_event(timer);
            }
            let until = self.state.cca_end() - now;
            let timer = EventPayload::Timer { timer_id: TIMER_CCA_END };
            self.cca_timer = Some(ctx.post_event(until, vec![self.id], timer));
            tracing::debug!(phy = %self.id, until = %self.state.cca_end(), "CCA busy");
        }
    }

    // ========================================================================
    // Transmit path
    // ========================================================================

    fn send_packet(&mut self, request: &PhyTxRequestEvent, ctx: &mut SimContext) -> Result<(), SimError> {
        let now = ctx.time();
        let state = self.state.state(now);
        if matches!(state, PhyState::Tx | PhyState::Switching) {
            return Err(SimError::HandlerError {
                entity: self.id,
                message: format!("transmission requested while {}", state),
            });
        }

        if let Some(reception) = self.reception.take() {
            ctx.cancel_event(reception.end_rx);
            self.interference.notify_rx_end();
            self.state.end_rx();
            self.drop_frame(ctx, &reception.frame, DropReason::TxPreempted);
        }

        let frame = &request.frame;
        let tx_vector = request.tx_vector;
        let duration = tx_duration(frame.size_bytes, &tx_vector, request.preamble, request.packet_type);
        let tx_power_dbm = self.config.tx_power_dbm(tx_vector.tx_power_level) + self.config.tx_gain_db;
        tracing::debug!(
            phy = %self.id,
            frame = frame.id,
            mode = %tx_vector.mode.name(),
            duration = %duration,
            tx_power_dbm,
            "transmission started"
        );

        let labels = self.metric_labels.to_labels();
        metrics::counter!(metric_defs::PHY_TX_FRAMES.name, &labels).increment(1);
        metrics::counter!(metric_defs::PHY_TX_AIRTIME.name, &labels).increment(duration.as_micros());

        self.notify(ctx, PhyNotification::TxBegin { frame: frame.clone(), duration });
        self.notify(
            ctx,
            PhyNotification::MonitorSniffTx(MonitorSniff {
                frame_id: frame.id,
                frequency_mhz: self.config.frequency_mhz,
                channel: self.bonding.primary(),
                rate_500kbps: (tx_vector.mode.data_rate_bps * u64::from(tx_vector.nss) / 500_000) as u32,
                short_preamble: request.preamble == WifiPreamble::Short,
                signal_dbm: None,
                noise_dbm: None,
            }),
        );

        self.state.switch_to_tx(now, duration);
        ctx.post_immediate(
            vec![self.link.channel],
            EventPayload::ChannelTransmit(ChannelTransmitEvent {
                phy_id: self.id,
                frame: frame.clone(),
                tx_power_dbm,
                tx_vector,
                preamble: request.preamble,
                packet_type: request.packet_type,
            }),
        );
        Ok(())
    }

    // ========================================================================
    // Channel switching
    // ========================================================================

    fn set_channel(&mut self, request: &SetChannelEvent, ctx: &mut SimContext) -> Result<(), SimError> {
        let now = ctx.time();
        let bonding = ChannelBonding::new(
            self.config.frequency_mhz,
            request.channel_number,
            request.active_channels,
            request.primary_channel,
        )
        .map_err(|e| SimError::HandlerError {
            entity: self.id,
            message: e.to_string(),
        })?;

        if now == SimTime::ZERO {
            tracing::debug!(phy = %self.id, channels = ?bonding.channels(), "start on channel");
            self.adopt_channel(bonding, ctx);
            return Ok(());
        }

        match self.state.state(now) {
            PhyState::Tx | PhyState::Switching => {
                let delay = self.state.delay_until_idle(now);
                tracing::debug!(phy = %self.id, delay = %delay, "channel switch postponed");
                self.deferred_switch = Some(request.clone());
                ctx.post_event(delay, vec![self.id], EventPayload::Timer { timer_id: TIMER_DEFERRED_SWITCH });
                return Ok(());
            }
            PhyState::Rx => {
                tracing::debug!(phy = %self.id, "reception aborted by channel switch");
                if let Some(reception) = self.reception.take() {
                    ctx.cancel_event(reception.end_rx);
                }
            }
            PhyState::Idle | PhyState::CcaBusy => {}
        }

        let delay = self.config.channel_switch_delay();
        tracing::debug!(
            phy = %self.id,
            from = ?self.bonding.channels(),
            to = ?bonding.channels(),
            "switching channel"
        );
        self.state.switch_to_switching(now, delay);
        if let Some(timer) = self.cca_timer.take() {
            ctx.cancel_event(timer);
        }
        self.mpdus_num = 0;
        self.first_mpdu = FirstMpduStatus::Idle;
        self.notify(ctx, PhyNotification::ChannelSwitching { duration: delay });
        self.adopt_channel(bonding, ctx);
        Ok(())
    }

    fn adopt_channel(&mut self, bonding: ChannelBonding, ctx: &mut SimContext) {
        self.interference.reset(bonding.num_channels());
        self.bonding = bonding;
        let update = self.endpoint_update();
        ctx.post_immediate(vec![self.link.channel], EventPayload::ChannelEndpointUpdate(update));
    }
}

impl Entity for WifiPhy {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::PhyTxRequest(request) => self.send_packet(request, ctx)?,
            EventPayload::SetChannel(request) => self.set_channel(request, ctx)?,
            EventPayload::SignalArrival(arrival) => self.start_receive(arrival, ctx),
            EventPayload::Timer { timer_id } => match *timer_id {
                TIMER_END_RX => self.end_receive(ctx),
                TIMER_DEFERRED_SWITCH => {
                    if let Some(request) = self.deferred_switch.take() {
                        self.set_channel(&request, ctx)?;
                    }
                }
                TIMER_CCA_END => {
                    self.cca_timer = None;
                    tracing::trace!(phy = %self.id, state = %self.state.state(ctx.time()), "CCA busy period over");
                }
                other => tracing::warn!(phy = %self.id, timer = other, "unknown timer"),
            },
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_rate::{ErrorRateModel, NistErrorRateModel};
    use crate::lut::PerTable;
    use crate::per::PerStrategy;
    use rand::SeedableRng;
    use std::collections::BinaryHeap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wifisim_common::{AmpduTag, PacketType, TxVector, WifiMode};

    const PHY: EntityId = EntityId(1);
    const CHANNEL: EntityId = EntityId(100);
    const AGENT: EntityId = EntityId(200);

    /// Drives one PHY; everything it sends elsewhere is collected.
    struct Harness {
        phy: WifiPhy,
        ctx: SimContext,
        queue: BinaryHeap<Event>,
        notes: Vec<(SimTime, PhyNotification)>,
        to_channel: Vec<EventPayload>,
    }

    impl Harness {
        fn new(config: PhyConfig) -> Self {
            let tables = Arc::new(PerLookupTables::default());
            let engine = build_per_engine(&config, &tables);
            Self::with_engine(config, engine)
        }

        fn with_engine(config: PhyConfig, engine: PerEngine) -> Self {
            let link = PhyLink {
                channel: CHANNEL,
                agent: AGENT,
                address: MacAddress::from_index(1),
                position: Position::new(0.0, 0.0, 0.0),
                role: NodeRole::Sta,
            };
            let phy = WifiPhy::new(
                PHY,
                config,
                link,
                engine,
                ChaCha8Rng::seed_from_u64(7),
                MetricLabels::new("sta0", NodeRole::Sta),
            )
            .unwrap();
            Harness {
                phy,
                ctx: SimContext::new(1),
                queue: BinaryHeap::new(),
                notes: Vec::new(),
                to_channel: Vec::new(),
            }
        }

        fn closed_form() -> Self {
            Self::new(PhyConfig { use_lut_for_per: false, ..Default::default() })
        }

        fn inject(&mut self, at: SimTime, payload: EventPayload) {
            let id = EventId(self.ctx.next_event_id());
            self.queue.push(Event { id, time: at, source: AGENT, targets: vec![PHY], payload });
        }

        fn run_until(&mut self, until: SimTime) {
            while self.queue.peek().is_some_and(|e| e.time <= until) {
                let Some(event) = self.queue.pop() else { break };
                if self.ctx.take_cancelled(event.id) {
                    continue;
                }
                self.ctx.set_time(event.time);
                for target in &event.targets {
                    match *target {
                        PHY => {
                            self.ctx.set_source(PHY);
                            self.phy.handle_event(&event, &mut self.ctx).unwrap();
                        }
                        AGENT => {
                            if let EventPayload::PhyNotification(n) = &event.payload {
                                self.notes.push((event.time, n.notification.clone()));
                            }
                        }
                        _ => self.to_channel.push(event.payload.clone()),
                    }
                }
                self.queue.extend(self.ctx.take_pending_events());
            }
            self.ctx.set_time(until);
        }

        fn drops(&self) -> Vec<(u64, DropReason)> {
            self.notes
                .iter()
                .filter_map(|(_, n)| match n {
                    PhyNotification::RxDrop { frame, reason } => Some((frame.id, *reason)),
                    _ => None,
                })
                .collect()
        }

        fn received_ok(&self) -> Vec<u64> {
            self.notes
                .iter()
                .filter_map(|(_, n)| match n {
                    PhyNotification::RxEndOk { frame, .. } => Some(frame.id),
                    _ => None,
                })
                .collect()
        }
    }

    fn frame(id: u64, size: u32, destination: MacAddress) -> WifiFrame {
        WifiFrame {
            id,
            size_bytes: size,
            source: MacAddress::from_index(9),
            destination,
            duration_field: SimTime::from_micros(44),
            ampdu: None,
        }
    }

    fn ofdm6() -> TxVector {
        TxVector::new(WifiMode::ofdm(6).unwrap())
    }

    fn arrival(
        frame: WifiFrame,
        tx: TxVector,
        preamble: WifiPreamble,
        packet_type: PacketType,
        powers: Vec<f64>,
        range: (usize, usize),
    ) -> EventPayload {
        EventPayload::SignalArrival(SignalArrivalEvent {
            source_phy: EntityId(9),
            frame,
            signal: RxSignal {
                packet_type,
                active_range_start: range.0,
                active_range_end: range.1,
                powers,
            },
            tx_vector: tx,
            preamble,
        })
    }

    fn simple_arrival(id: u64, dbm: f64) -> EventPayload {
        arrival(frame(id, 1000, MacAddress::BROADCAST), ofdm6(), WifiPreamble::Long, PacketType::Normal, vec![dbm], (0, 0))
    }

    fn duration_of(size: u32, tx: &TxVector, preamble: WifiPreamble, packet_type: PacketType) -> SimTime {
        tx_duration(size, tx, preamble, packet_type)
    }

    #[test]
    fn test_clean_reception() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), simple_arrival(1, -50.0));
        h.run_until(SimTime::from_micros(11));
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Rx);

        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.received_ok(), vec![1]);
        assert!(h.notes.iter().any(|(_, n)| matches!(n, PhyNotification::RxBegin { frame_id: 1, .. })));
        let sniff = h.notes.iter().find_map(|(_, n)| match n {
            PhyNotification::MonitorSniffRx(s) => Some(s.clone()),
            _ => None,
        });
        let sniff = sniff.expect("monitor copy of the received frame");
        assert_eq!(sniff.rate_500kbps, 12);
        assert!((sniff.signal_dbm.unwrap() - (-49.0)).abs() < 1e-9, "rx gain is applied");
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Idle);
        assert!(!h.phy.interference().is_rxing());
    }

    #[test]
    fn test_below_ed_threshold() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), simple_arrival(1, -100.0));
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.drops(), vec![(1, DropReason::BelowEdThreshold)]);
        assert!(h.received_ok().is_empty());
    }

    #[test]
    fn test_ed_threshold_is_inclusive() {
        let config = PhyConfig {
            use_lut_for_per: false,
            rx_gain_db: 0.0,
            ed_threshold_dbm: -70.0,
            ..Default::default()
        };
        let mut h = Harness::new(config);
        h.inject(SimTime::from_micros(10), simple_arrival(1, -70.0));
        h.inject(SimTime::from_millis(5), simple_arrival(2, -70.01));
        h.run_until(SimTime::from_millis(10));

        assert_eq!(h.received_ok(), vec![1], "power exactly at the threshold is detected");
        assert_eq!(h.drops(), vec![(2, DropReason::BelowEdThreshold)]);
    }

    #[test]
    fn test_preamble_draw_boundary() {
        assert!(preamble_lost(0.25, 0.25), "a draw equal to the PER loses sync");
        assert!(!preamble_lost(0.250001, 0.25));
        assert!(preamble_lost(0.0, 0.0));
        assert!(preamble_lost(0.999, 1.0));
    }

    #[test]
    fn test_cca_busy_between_thresholds() {
        let mut h = Harness::closed_form();
        let start = SimTime::from_micros(10);
        h.inject(start, simple_arrival(1, -98.0));
        h.run_until(SimTime::from_micros(11));

        let expected = duration_of(1000, &ofdm6(), WifiPreamble::Long, PacketType::Normal);
        assert_eq!(h.drops(), vec![(1, DropReason::BelowEdThreshold)]);
        assert!(h
            .notes
            .iter()
            .any(|(_, n)| *n == PhyNotification::CcaBusyStart { duration: expected }));
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::CcaBusy);

        h.run_until(start + expected);
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Idle);
    }

    #[test]
    fn test_busy_drop_while_receiving() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), simple_arrival(1, -50.0));
        h.inject(SimTime::from_micros(50), simple_arrival(2, -50.0));
        h.run_until(SimTime::from_millis(5));
        assert!(h.drops().contains(&(2, DropReason::Busy)));
    }

    #[test]
    fn test_preamble_sync_failure() {
        let mut h = Harness::closed_form();
        // just above ED, SNR around -1.5 dB
        h.inject(SimTime::from_micros(10), simple_arrival(1, -96.5));
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.drops(), vec![(1, DropReason::PreambleSync)]);
    }

    #[test]
    fn test_address_mismatch_sets_nav() {
        let mut h = Harness::closed_form();
        let other = MacAddress::from_index(42);
        h.inject(
            SimTime::from_micros(10),
            arrival(frame(1, 1000, other), ofdm6(), WifiPreamble::Long, PacketType::Normal, vec![-50.0], (0, 0)),
        );
        h.run_until(SimTime::from_millis(5));

        let air = duration_of(1000, &ofdm6(), WifiPreamble::Long, PacketType::Normal);
        assert_eq!(h.drops(), vec![(1, DropReason::AddressMismatch)]);
        assert!(h
            .notes
            .iter()
            .any(|(_, n)| *n == PhyNotification::NavStart { duration: SimTime::from_micros(44) + air }));
    }

    #[test]
    fn test_address_check_disabled() {
        let mut h = Harness::new(PhyConfig {
            use_lut_for_per: false,
            check_address_at_phy: false,
            ..Default::default()
        });
        h.inject(
            SimTime::from_micros(10),
            arrival(frame(1, 1000, MacAddress::from_index(42)), ofdm6(), WifiPreamble::Long, PacketType::Normal, vec![-50.0], (0, 0)),
        );
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.received_ok(), vec![1]);
    }

    #[test]
    fn test_too_narrow_for_bonded_receiver() {
        let mut h = Harness::new(PhyConfig {
            use_lut_for_per: false,
            frequency_mhz: 5000,
            channel_number: 3640,
            active_channels: 3640,
            primary_channel: 36,
            ..Default::default()
        });
        h.inject(
            SimTime::from_micros(10),
            arrival(
                frame(1, 1000, MacAddress::BROADCAST),
                ofdm6(),
                WifiPreamble::Long,
                PacketType::Normal,
                vec![-50.0, f64::NEG_INFINITY],
                (0, 0),
            ),
        );
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.drops(), vec![(1, DropReason::TooNarrow)]);
    }

    #[test]
    fn test_subframe_without_burst() {
        let mut h = Harness::closed_form();
        let tx = TxVector::new(WifiMode::ht(7, 20, false).unwrap());
        let mut f = frame(1, 1000, MacAddress::BROADCAST);
        f.ampdu = Some(AmpduTag { remaining: 2 });
        h.inject(
            SimTime::from_micros(10),
            arrival(f, tx, WifiPreamble::None, PacketType::AmpduMiddle, vec![-50.0], (0, 0)),
        );
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.drops(), vec![(1, DropReason::AmpduNoBurst)]);
    }

    #[test]
    fn test_ampdu_first_failure_drops_burst() {
        let mut h = Harness::closed_form();
        let tx = TxVector::new(WifiMode::ht(7, 20, false).unwrap());
        let sizes = [1500u32, 1500, 1500];
        let kinds = [
            (WifiPreamble::HtMixed, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduLast),
        ];
        let propagation = SimTime::from_nanos(33);

        let mut at = SimTime::from_micros(10);
        for (i, ((preamble, packet_type), size)) in kinds.iter().zip(sizes).enumerate() {
            let mut f = frame(i as u64 + 1, size, MacAddress::BROADCAST);
            f.ampdu = Some(AmpduTag { remaining: (3 - i) as u8 });
            h.inject(at, arrival(f, tx, *preamble, *packet_type, vec![-50.0], (0, 0)));
            at = at + duration_of(size, &tx, *preamble, *packet_type) + propagation;
        }
        // strong burst in the middle of the first sub-frame's payload
        h.inject(
            SimTime::from_micros(10 + 100),
            arrival(frame(99, 10, MacAddress::BROADCAST), ofdm6(), WifiPreamble::Long, PacketType::Normal, vec![-40.0], (0, 0)),
        );

        h.run_until(SimTime::from_millis(5));
        assert!(h
            .notes
            .iter()
            .any(|(_, n)| matches!(n, PhyNotification::RxEndError { frame, .. } if frame.id == 1)));
        let drops = h.drops();
        assert!(drops.contains(&(99, DropReason::Busy)));
        assert!(drops.contains(&(2, DropReason::AmpduFirstFailed)));
        assert!(drops.contains(&(3, DropReason::AmpduFirstFailed)));
        assert!(h.received_ok().is_empty());
        assert_eq!(h.phy.ampdu_progress(), (0, FirstMpduStatus::Failed));
    }

    /// NIST model that counts how often it is asked for a chunk.
    #[derive(Debug, Clone, Default)]
    struct CountingModel {
        calls: Arc<AtomicUsize>,
    }

    impl ErrorRateModel for CountingModel {
        fn chunk_success_rate(&self, mode: &WifiMode, snr: f64, nbits: u64) -> f64 {
            self.calls.fetch_add(1, Ordering::Relaxed);
            NistErrorRateModel.chunk_success_rate(mode, snr, nbits)
        }
    }

    #[test]
    fn test_ampdu_failed_burst_skips_per() {
        let model = CountingModel::default();
        let calls = Arc::clone(&model.calls);
        let engine = PerEngine::new(PerStrategy::ClosedForm(Box::new(model)));
        let mut h = Harness::with_engine(PhyConfig { use_lut_for_per: false, ..Default::default() }, engine);

        let tx = TxVector::new(WifiMode::ht(7, 20, false).unwrap());
        let kinds = [
            (WifiPreamble::HtMixed, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduLast),
        ];
        let mut arrivals = Vec::new();
        let mut at = SimTime::from_micros(10);
        for (i, (preamble, packet_type)) in kinds.iter().enumerate() {
            let mut f = frame(i as u64 + 1, 1500, MacAddress::BROADCAST);
            f.ampdu = Some(AmpduTag { remaining: (3 - i) as u8 });
            h.inject(at, arrival(f, tx, *preamble, *packet_type, vec![-50.0], (0, 0)));
            arrivals.push(at);
            at = at + duration_of(1500, &tx, *preamble, *packet_type) + SimTime::from_nanos(33);
        }
        h.inject(
            SimTime::from_micros(110),
            arrival(frame(99, 10, MacAddress::BROADCAST), ofdm6(), WifiPreamble::Long, PacketType::Normal, vec![-40.0], (0, 0)),
        );

        h.run_until(arrivals[1] - SimTime::from_nanos(1));
        assert!(calls.load(Ordering::Relaxed) > 0, "first sub-frame is scored");
        assert_eq!(h.phy.ampdu_progress().1, FirstMpduStatus::Failed);

        // After each later sub-frame syncs, only its end of reception runs
        // before the next arrival.
        for (i, start) in arrivals.iter().enumerate().skip(1) {
            h.run_until(*start);
            calls.store(0, Ordering::Relaxed);
            let until = arrivals.get(i + 1).map_or(SimTime::from_millis(5), |next| *next - SimTime::from_nanos(1));
            h.run_until(until);
            assert_eq!(calls.load(Ordering::Relaxed), 0, "sub-frame {} dropped without scoring", i + 1);
        }

        let drops = h.drops();
        assert!(drops.contains(&(2, DropReason::AmpduFirstFailed)));
        assert!(drops.contains(&(3, DropReason::AmpduFirstFailed)));
    }

    #[test]
    fn test_ampdu_burst_received() {
        let mut h = Harness::closed_form();
        let tx = TxVector::new(WifiMode::ht(7, 20, false).unwrap());
        let kinds = [
            (WifiPreamble::HtMixed, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduMiddle),
            (WifiPreamble::None, PacketType::AmpduLast),
        ];
        let mut at = SimTime::from_micros(10);
        for (i, (preamble, packet_type)) in kinds.iter().enumerate() {
            let mut f = frame(i as u64 + 1, 500, MacAddress::BROADCAST);
            f.ampdu = Some(AmpduTag { remaining: (3 - i) as u8 });
            h.inject(at, arrival(f, tx, *preamble, *packet_type, vec![-50.0], (0, 0)));
            at = at + duration_of(500, &tx, *preamble, *packet_type) + SimTime::from_nanos(33);
        }
        h.run_until(SimTime::from_millis(5));
        assert_eq!(h.received_ok(), vec![1, 2, 3]);
        assert_eq!(h.phy.ampdu_progress(), (0, FirstMpduStatus::Ok));
    }

    #[test]
    fn test_send_preempts_reception() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), simple_arrival(1, -50.0));
        let request = PhyTxRequestEvent {
            frame: frame(7, 200, MacAddress::BROADCAST),
            tx_vector: ofdm6(),
            preamble: WifiPreamble::Long,
            packet_type: PacketType::Normal,
        };
        h.inject(SimTime::from_micros(40), EventPayload::PhyTxRequest(request));
        h.run_until(SimTime::from_millis(5));

        assert_eq!(h.drops(), vec![(1, DropReason::TxPreempted)]);
        assert!(h.received_ok().is_empty(), "cancelled reception must not complete");
        let sent: Vec<_> = h
            .to_channel
            .iter()
            .filter_map(|p| match p {
                EventPayload::ChannelTransmit(t) => Some(t.tx_power_dbm),
                _ => None,
            })
            .collect();
        assert_eq!(sent.len(), 1);
        assert!((sent[0] - (PhyConfig::DEFAULT_TX_POWER_DBM + PhyConfig::DEFAULT_GAIN_DB)).abs() < 1e-12);
        assert!(h.notes.iter().any(|(_, n)| matches!(n, PhyNotification::MonitorSniffTx(s) if s.frame_id == 7)));
    }

    #[test]
    fn test_arrival_during_tx_is_busy() {
        let mut h = Harness::closed_form();
        let request = PhyTxRequestEvent {
            frame: frame(7, 1000, MacAddress::BROADCAST),
            tx_vector: ofdm6(),
            preamble: WifiPreamble::Long,
            packet_type: PacketType::Normal,
        };
        h.inject(SimTime::from_micros(10), EventPayload::PhyTxRequest(request));
        h.inject(SimTime::from_micros(20), simple_arrival(1, -50.0));
        h.run_until(SimTime::from_micros(21));
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Tx);
        assert_eq!(h.drops(), vec![(1, DropReason::Busy)]);
    }

    fn switch_to(channel: u64) -> EventPayload {
        EventPayload::SetChannel(SetChannelEvent {
            channel_number: channel,
            active_channels: channel,
            primary_channel: channel as u16,
        })
    }

    #[test]
    fn test_channel_set_at_start_is_not_a_switch() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::ZERO, switch_to(6));
        h.run_until(SimTime::ZERO);
        assert_eq!(h.phy.bonding().primary(), 6);
        assert_eq!(h.phy.state(SimTime::ZERO), PhyState::Idle);
        assert!(h.notes.is_empty());
        assert!(matches!(h.to_channel.as_slice(), [EventPayload::ChannelEndpointUpdate(u)] if u.primary_channel == 6));
    }

    #[test]
    fn test_channel_switch_blocks_reception() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), switch_to(6));
        h.inject(SimTime::from_micros(100), simple_arrival(1, -50.0));
        h.run_until(SimTime::from_micros(101));
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Switching);
        assert!(h
            .notes
            .iter()
            .any(|(_, n)| *n == PhyNotification::ChannelSwitching { duration: SimTime::from_micros(250) }));
        assert_eq!(h.drops(), vec![(1, DropReason::Busy)]);
        assert_eq!(h.phy.bonding().primary(), 6);
    }

    #[test]
    fn test_channel_switch_aborts_reception() {
        let mut h = Harness::closed_form();
        h.inject(SimTime::from_micros(10), simple_arrival(1, -50.0));
        h.inject(SimTime::from_micros(30), switch_to(6));
        h.run_until(SimTime::from_millis(5));
        assert!(h.received_ok().is_empty());
        assert!(h.phy.interference().ledger(0).is_empty(), "switching erases the ledgers");
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Idle);
    }

    #[test]
    fn test_channel_switch_deferred_during_tx() {
        let mut h = Harness::closed_form();
        let request = PhyTxRequestEvent {
            frame: frame(7, 1000, MacAddress::BROADCAST),
            tx_vector: ofdm6(),
            preamble: WifiPreamble::Long,
            packet_type: PacketType::Normal,
        };
        let air = duration_of(1000, &ofdm6(), WifiPreamble::Long, PacketType::Normal);
        h.inject(SimTime::from_micros(10), EventPayload::PhyTxRequest(request));
        h.inject(SimTime::from_micros(20), switch_to(6));
        h.run_until(SimTime::from_micros(21));
        assert_eq!(h.phy.bonding().primary(), 5, "switch waits for the transmission");

        h.run_until(SimTime::from_micros(10) + air);
        assert_eq!(h.phy.bonding().primary(), 6);
        assert_eq!(h.phy.state(h.ctx.time()), PhyState::Switching);
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut h = Harness::closed_form();
        let event = Event {
            id: EventId(0),
            time: SimTime::from_micros(5),
            source: AGENT,
            targets: vec![PHY],
            payload: EventPayload::SetChannel(SetChannelEvent {
                channel_number: 507,
                active_channels: 507,
                primary_channel: 5,
            }),
        };
        assert!(h.phy.handle_event(&event, &mut h.ctx).is_err());
    }

    #[test]
    fn test_lookup_engine_selected() {
        let config = PhyConfig::default();
        let tables = Arc::new(PerLookupTables::default());
        tables.insert(
            crate::lut::PerTableKey { coding: config.coding, size_class: 1458, mcs: 0 },
            PerTable::from_rows(vec![(0.0, 0.5)]),
        );
        assert!(matches!(build_per_engine(&config, &tables).strategy(), crate::per::PerStrategy::Lookup { .. }));
        let closed = PhyConfig { use_lut_for_per: false, ..config };
        assert!(matches!(build_per_engine(&closed, &tables).strategy(), crate::per::PerStrategy::ClosedForm(_)));
    }
}
