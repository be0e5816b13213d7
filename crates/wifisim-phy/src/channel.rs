//! The shared radio medium.
//!
//! The channel keeps a view of every PHY's tuning and position, fed by
//! `ChannelEndpointUpdate` events, and turns each `ChannelTransmit` into one
//! `SignalArrival` per receiver that can see the frame.

use crate::adjacent::{adjacent_attenuation_db, AdjacentOffsets};
use crate::channel_bonding::ChannelBonding;
use crate::error::PhyResult;
use crate::metric_defs::{self, MetricLabels};
use std::collections::BTreeMap;
use wifisim_common::{
    ChannelEndpointUpdateEvent, ChannelTransmitEvent, Entity, EntityId, Event, EventPayload, NodeRole, Position,
    RxSignal, SignalArrivalEvent, SimContext, SimError,
};
use wifisim_propagation::{Endpoint, PropagationDelayModel, PropagationLossModel};

// ============================================================================
// Endpoints
// ============================================================================

/// What the channel knows about one PHY.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    /// PHY entity.
    pub phy_id: EntityId,
    /// Operating frequency in MHz.
    pub frequency_mhz: u32,
    /// Channel set, active span and primary.
    pub bonding: ChannelBonding,
    /// Antenna position.
    pub position: Position,
    /// Network role.
    pub role: NodeRole,
}

impl ChannelEndpoint {
    /// Decode an endpoint update.
    pub fn from_update(update: &ChannelEndpointUpdateEvent) -> PhyResult<Self> {
        Ok(ChannelEndpoint {
            phy_id: update.phy_id,
            frequency_mhz: update.frequency_mhz,
            bonding: ChannelBonding::new(
                update.frequency_mhz,
                update.channel_number,
                update.active_channels,
                update.primary_channel,
            )?,
            position: update.position,
            role: update.role,
        })
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.phy_id, self.position)
    }
}

// ============================================================================
// Overlap
// ============================================================================

/// How a sender's active span lands on a receiver's channel set.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOverlap {
    /// Attenuation in dB relative to the link loss, per receiver sub-channel.
    attenuation_db: Vec<Option<f64>>,
    co_channel: Vec<usize>,
}

impl LinkOverlap {
    /// Classify every receiver sub-channel as co-channel, adjacent or unseen.
    ///
    /// Adjacent candidates are up to one active-span width of sub-channels
    /// either side of the sender's span. Combinations the leakage table does
    /// not cover are logged and contribute nothing.
    pub fn compute(sender: &ChannelBonding, receiver: &ChannelBonding) -> Self {
        let active = sender.active_channels();
        let n = active.len();
        let spacing = i32::from(sender.band().spacing());
        let first = i32::from(active[0]);
        let last = i32::from(active[n - 1]);

        let mut attenuation_db = Vec::with_capacity(receiver.num_channels());
        let mut co_channel = Vec::new();
        for (k, &ch) in receiver.channels().iter().enumerate() {
            let ch = i32::from(ch);
            if active.iter().any(|&a| i32::from(a) == ch) {
                co_channel.push(k);
                attenuation_db.push(Some(10.0 * (1.0 / n as f64).log10()));
                continue;
            }

            let offsets = if ch > last && (ch - last) % spacing == 0 && (ch - last) / spacing <= n as i32 {
                AdjacentOffsets { high: vec![((ch - last) / spacing) as u32], low: Vec::new() }
            } else if ch < first && (first - ch) % spacing == 0 && (first - ch) / spacing <= n as i32 {
                AdjacentOffsets { high: Vec::new(), low: vec![((first - ch) / spacing) as u32] }
            } else {
                attenuation_db.push(None);
                continue;
            };

            match adjacent_attenuation_db(sender.band(), sender.width_mhz(), &offsets) {
                Ok(db) => attenuation_db.push(Some(db)),
                Err(e) => {
                    tracing::warn!(error = %e, channel = ch, "adjacent leakage ignored");
                    attenuation_db.push(None);
                }
            }
        }

        LinkOverlap {
            attenuation_db,
            co_channel,
        }
    }

    /// Span of receiver sub-channels the frame occupies.
    ///
    /// The co-channel span when there is one, otherwise the span of
    /// sub-channels reached by leakage.
    pub fn active_range(&self) -> Option<(usize, usize)> {
        if let (Some(&a), Some(&b)) = (self.co_channel.first(), self.co_channel.last()) {
            return Some((a, b));
        }
        let mut seen = self.attenuation_db.iter().enumerate().filter(|(_, a)| a.is_some()).map(|(k, _)| k);
        let a = seen.next()?;
        Some((a, seen.last().unwrap_or(a)))
    }

    /// Per sub-channel received power for a link delivering `rx_dbm`.
    ///
    /// Unseen sub-channels carry no power.
    pub fn powers_dbm(&self, rx_dbm: f64) -> Vec<f64> {
        self.attenuation_db
            .iter()
            .map(|a| a.map_or(f64::NEG_INFINITY, |db| rx_dbm + db))
            .collect()
    }
}

// ============================================================================
// Channel Entity
// ============================================================================

/// Radio medium connecting every PHY on the simulation.
pub struct WifiChannel {
    id: EntityId,
    loss: Box<dyn PropagationLossModel>,
    delay: Box<dyn PropagationDelayModel>,
    endpoints: BTreeMap<EntityId, ChannelEndpoint>,
    use_new_model: bool,
    metric_labels: MetricLabels,
}

impl WifiChannel {
    /// Create a channel with a loss model (usually a chain) and a delay model.
    pub fn new(
        id: EntityId,
        loss: Box<dyn PropagationLossModel>,
        delay: Box<dyn PropagationDelayModel>,
        use_new_model: bool,
    ) -> Self {
        WifiChannel {
            id,
            loss,
            delay,
            endpoints: BTreeMap::new(),
            use_new_model,
            metric_labels: MetricLabels::entity("channel", "channel"),
        }
    }

    /// Register or refresh a PHY.
    pub fn update_endpoint(&mut self, update: &ChannelEndpointUpdateEvent) -> PhyResult<()> {
        let endpoint = ChannelEndpoint::from_update(update)?;
        tracing::debug!(
            phy = %update.phy_id,
            frequency_mhz = update.frequency_mhz,
            channels = ?endpoint.bonding.channels(),
            active = ?endpoint.bonding.active_channels(),
            "channel endpoint updated"
        );
        self.endpoints.insert(update.phy_id, endpoint);
        Ok(())
    }

    /// Registered PHY.
    pub fn endpoint(&self, id: EntityId) -> Option<&ChannelEndpoint> {
        self.endpoints.get(&id)
    }

    /// Number of registered PHYs.
    pub fn num_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    fn send(&mut self, tx: &ChannelTransmitEvent, ctx: &mut SimContext) {
        let Some(sender) = self.endpoints.get(&tx.phy_id).cloned() else {
            tracing::warn!(phy = %tx.phy_id, "transmission from unregistered PHY");
            return;
        };
        let labels = self.metric_labels.to_labels();

        let receivers: Vec<ChannelEndpoint> = self
            .endpoints
            .values()
            .filter(|r| r.phy_id != sender.phy_id && r.frequency_mhz == sender.frequency_mhz)
            .cloned()
            .collect();

        for receiver in receivers {
            let signal = if self.use_new_model {
                let overlap = LinkOverlap::compute(&sender.bonding, &receiver.bonding);
                let Some((start, end)) = overlap.active_range() else {
                    metrics::counter!(metric_defs::CHANNEL_SUPPRESSED.name, &labels).increment(1);
                    continue;
                };
                let rx_dbm = self.link_power(&sender, &receiver, tx.tx_power_dbm);
                RxSignal {
                    packet_type: tx.packet_type,
                    active_range_start: start,
                    active_range_end: end,
                    powers: overlap.powers_dbm(rx_dbm),
                }
            } else {
                if sender.bonding.channel_number() != receiver.bonding.channel_number() {
                    metrics::counter!(metric_defs::CHANNEL_SUPPRESSED.name, &labels).increment(1);
                    continue;
                }
                RxSignal {
                    packet_type: tx.packet_type,
                    active_range_start: 0,
                    active_range_end: 0,
                    powers: vec![self.link_power(&sender, &receiver, tx.tx_power_dbm)],
                }
            };

            let delay = self.delay.delay(&sender.endpoint(), &receiver.endpoint());
            tracing::trace!(
                from = %sender.phy_id,
                to = %receiver.phy_id,
                frame = tx.frame.id,
                powers = ?signal.powers,
                delay = %delay,
                "signal scheduled"
            );
            ctx.post_event(
                delay,
                vec![receiver.phy_id],
                EventPayload::SignalArrival(SignalArrivalEvent {
                    source_phy: sender.phy_id,
                    frame: tx.frame.clone(),
                    signal,
                    tx_vector: tx.tx_vector,
                    preamble: tx.preamble,
                }),
            );
            metrics::counter!(metric_defs::CHANNEL_DELIVERIES.name, &labels).increment(1);
        }
    }

    fn link_power(&mut self, sender: &ChannelEndpoint, receiver: &ChannelEndpoint, tx_power_dbm: f64) -> f64 {
        self.loss.calc_rx_power_for_roles(
            tx_power_dbm,
            &sender.endpoint(),
            &receiver.endpoint(),
            sender.role,
            receiver.role,
        )
    }
}

impl Entity for WifiChannel {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn handle_event(&mut self, event: &Event, ctx: &mut SimContext) -> Result<(), SimError> {
        match &event.payload {
            EventPayload::ChannelTransmit(tx) => self.send(tx, ctx),
            EventPayload::ChannelEndpointUpdate(update) => {
                self.update_endpoint(update).map_err(|e| SimError::HandlerError {
                    entity: self.id,
                    message: e.to_string(),
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
