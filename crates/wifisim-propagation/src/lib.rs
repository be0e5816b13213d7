//! # wifisim-propagation
//!
//! Propagation loss and delay models for the wifisim PHY.
//!
//! This crate provides:
//! - The loss model contract ([`PropagationLossModel`]) with an optional
//!   role-aware entry point
//! - Deterministic models: [`FriisPropagationLoss`], [`TwoRayGroundPropagationLoss`],
//!   [`LogDistancePropagationLoss`], [`ThreeLogDistancePropagationLoss`]
//! - Empirical models with shadow fading: [`IndoorChannelLoss`] (channels B and D)
//!   and [`OutdoorPropagationLoss`]
//! - Random and override models: [`NakagamiPropagationLoss`], [`RandomPropagationLoss`],
//!   [`FixedRssLoss`], [`MatrixPropagationLoss`], [`RangePropagationLoss`]
//! - Ordered composition ([`PropagationChain`])
//! - Delay models ([`PropagationDelayModel`])
//! - Serde configuration for all of the above ([`LossModelConfig`], [`DelayModelConfig`])

mod config;
mod delay;
mod empirical;
mod error;
mod friis;
mod log_distance;
mod overrides;
pub mod shadowing;
mod stochastic;

pub use config::{DelayModelConfig, LossModelConfig, MatrixEntry};
pub use delay::{ConstantSpeedPropagationDelay, PropagationDelayModel, RandomPropagationDelay};
pub use empirical::{IndoorChannelLoss, IndoorProfile, OutdoorPropagationLoss};
pub use error::{PropagationError, PropagationResult};
pub use friis::{FriisPropagationLoss, TwoRayGroundPropagationLoss};
pub use log_distance::{LogDistancePropagationLoss, ThreeLogDistancePropagationLoss};
pub use overrides::{FixedRssLoss, MatrixPropagationLoss, RangePropagationLoss};
pub use shadowing::ShadowFading;
pub use stochastic::{NakagamiPropagationLoss, RandomPropagationLoss, RandomVariable};

use wifisim_common::{EntityId, NodeRole, Position};

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// One side of a link: who and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    /// Entity owning the antenna.
    pub id: EntityId,
    /// Antenna position.
    pub position: Position,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(id: EntityId, position: Position) -> Self {
        Endpoint { id, position }
    }

    /// Distance to another endpoint in meters.
    pub fn distance_to(&self, other: &Endpoint) -> f64 {
        self.position.distance_to(&other.position)
    }
}

/// Maps a transmit power to a received power for a pair of endpoints.
///
/// Models that draw random numbers own their generator, so evaluation takes
/// `&mut self`.
pub trait PropagationLossModel: Send + std::fmt::Debug {
    /// Received power in dBm.
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64;

    /// Received power when the node roles are known.
    ///
    /// Only role-sensitive models override this.
    fn calc_rx_power_for_roles(
        &mut self,
        tx_power_dbm: f64,
        a: &Endpoint,
        b: &Endpoint,
        _role_a: NodeRole,
        _role_b: NodeRole,
    ) -> f64 {
        self.calc_rx_power(tx_power_dbm, a, b)
    }

    /// Short model name for logs.
    fn name(&self) -> &'static str;
}

/// Ordered list of loss models; each one sees the previous model's output.
#[derive(Debug, Default)]
pub struct PropagationChain {
    models: Vec<Box<dyn PropagationLossModel>>,
}

impl PropagationChain {
    /// Create an empty chain (received power equals transmit power).
    pub fn new() -> Self {
        PropagationChain { models: Vec::new() }
    }

    /// Append a model to the end of the chain.
    pub fn push(&mut self, model: Box<dyn PropagationLossModel>) {
        self.models.push(model);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, model: Box<dyn PropagationLossModel>) -> Self {
        self.push(model);
        self
    }

    /// Number of models in the chain.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the chain has no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl PropagationLossModel for PropagationChain {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        self.models
            .iter_mut()
            .fold(tx_power_dbm, |power, model| model.calc_rx_power(power, a, b))
    }

    fn calc_rx_power_for_roles(
        &mut self,
        tx_power_dbm: f64,
        a: &Endpoint,
        b: &Endpoint,
        role_a: NodeRole,
        role_b: NodeRole,
    ) -> f64 {
        self.models.iter_mut().fold(tx_power_dbm, |power, model| {
            model.calc_rx_power_for_roles(power, a, b, role_a, role_b)
        })
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Free-space gain `λ² / (16π²d²L)` in dB.
pub(crate) fn friis_gain_db(lambda: f64, distance: f64, system_loss: f64) -> f64 {
    let numerator = lambda * lambda;
    let denominator = 16.0 * std::f64::consts::PI * std::f64::consts::PI * distance * distance * system_loss;
    10.0 * (numerator / denominator).log10()
}

#[cfg(test)]
pub(crate) fn endpoints(distance: f64) -> (Endpoint, Endpoint) {
    (
        Endpoint::new(EntityId(1), Position::new(0.0, 0.0, 0.0)),
        Endpoint::new(EntityId(2), Position::new(distance, 0.0, 0.0)),
    )
}
