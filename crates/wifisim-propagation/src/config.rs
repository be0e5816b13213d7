//! Serde descriptions of loss and delay models, as they appear in scenario files.

use crate::{
    ConstantSpeedPropagationDelay, FixedRssLoss, FriisPropagationLoss, IndoorChannelLoss, IndoorProfile,
    LogDistancePropagationLoss, MatrixPropagationLoss, NakagamiPropagationLoss, OutdoorPropagationLoss,
    PropagationDelayModel, PropagationError, PropagationLossModel, PropagationResult, RandomPropagationDelay,
    RandomPropagationLoss, RandomVariable, RangePropagationLoss, ThreeLogDistancePropagationLoss,
    TwoRayGroundPropagationLoss,
};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use wifisim_common::EntityId;

fn default_friis_frequency() -> f64 {
    FriisPropagationLoss::DEFAULT_FREQUENCY_HZ
}
fn default_one() -> f64 {
    1.0
}
fn default_min_distance() -> f64 {
    FriisPropagationLoss::DEFAULT_MIN_DISTANCE
}
fn default_log_exponent() -> f64 {
    LogDistancePropagationLoss::DEFAULT_EXPONENT
}
fn default_log_reference_loss() -> f64 {
    LogDistancePropagationLoss::DEFAULT_REFERENCE_LOSS
}
fn default_three_log_distances() -> [f64; 3] {
    ThreeLogDistancePropagationLoss::DEFAULT_DISTANCES
}
fn default_three_log_exponents() -> [f64; 3] {
    ThreeLogDistancePropagationLoss::DEFAULT_EXPONENTS
}
fn default_three_log_reference_loss() -> f64 {
    ThreeLogDistancePropagationLoss::DEFAULT_REFERENCE_LOSS
}
fn default_nakagami_distances() -> [f64; 2] {
    NakagamiPropagationLoss::DEFAULT_DISTANCES
}
fn default_nakagami_m() -> [f64; 3] {
    NakagamiPropagationLoss::DEFAULT_M
}
fn default_indoor_frequency() -> f64 {
    IndoorChannelLoss::DEFAULT_FREQUENCY_HZ
}
fn default_indoor_exponent() -> f64 {
    IndoorChannelLoss::DEFAULT_EXPONENT
}
fn default_shadow_sigma() -> f64 {
    IndoorChannelLoss::DEFAULT_SHADOW_SIGMA_DB
}
fn default_outdoor_frequency() -> f64 {
    OutdoorPropagationLoss::DEFAULT_FREQUENCY_HZ
}
fn default_h_bs() -> f64 {
    OutdoorPropagationLoss::DEFAULT_H_BS
}
fn default_h_ms() -> f64 {
    OutdoorPropagationLoss::DEFAULT_H_MS
}
fn default_true() -> bool {
    true
}
fn default_fixed_rss() -> f64 {
    FixedRssLoss::DEFAULT_RSS_DBM
}
fn default_matrix_loss() -> f64 {
    f64::MAX
}
fn default_max_range() -> f64 {
    RangePropagationLoss::DEFAULT_MAX_RANGE
}
fn default_speed() -> f64 {
    crate::SPEED_OF_LIGHT
}

/// One explicit link in a matrix model, endpoints named by node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Transmitting node name.
    pub from: String,
    /// Receiving node name.
    pub to: String,
    /// Loss in dB.
    pub loss_db: f64,
    /// Also apply in the reverse direction.
    #[serde(default = "default_true")]
    pub symmetric: bool,
}

/// A loss model in a propagation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum LossModelConfig {
    /// Free space.
    Friis {
        #[serde(default = "default_friis_frequency")]
        frequency_hz: f64,
        #[serde(default = "default_one")]
        system_loss: f64,
        #[serde(default = "default_min_distance")]
        min_distance: f64,
    },
    /// Two-ray ground reflection.
    TwoRayGround {
        #[serde(default = "default_friis_frequency")]
        frequency_hz: f64,
        #[serde(default = "default_one")]
        system_loss: f64,
        #[serde(default = "default_min_distance")]
        min_distance: f64,
        #[serde(default)]
        height_above_z: f64,
    },
    /// Single-slope log distance.
    LogDistance {
        #[serde(default = "default_log_exponent")]
        exponent: f64,
        #[serde(default = "default_one")]
        reference_distance: f64,
        #[serde(default = "default_log_reference_loss")]
        reference_loss: f64,
    },
    /// Three-slope log distance.
    ThreeLogDistance {
        #[serde(default = "default_three_log_distances")]
        distances: [f64; 3],
        #[serde(default = "default_three_log_exponents")]
        exponents: [f64; 3],
        #[serde(default = "default_three_log_reference_loss")]
        reference_loss: f64,
    },
    /// Nakagami-m fading.
    Nakagami {
        #[serde(default = "default_nakagami_distances")]
        distances: [f64; 2],
        #[serde(default = "default_nakagami_m")]
        m: [f64; 3],
    },
    /// TGn indoor channel B or D.
    Indoor {
        profile: IndoorProfile,
        #[serde(default = "default_indoor_frequency")]
        frequency_hz: f64,
        #[serde(default = "default_indoor_exponent")]
        exponent: f64,
        /// Overrides the profile breakpoint and its loss.
        #[serde(default)]
        reference: Option<(f64, f64)>,
        #[serde(default = "default_shadow_sigma")]
        sigma_before_db: f64,
        #[serde(default = "default_shadow_sigma")]
        sigma_after_db: f64,
    },
    /// Outdoor micro-cell.
    Outdoor {
        #[serde(default = "default_outdoor_frequency")]
        frequency_hz: f64,
        #[serde(default = "default_h_bs")]
        h_bs: f64,
        #[serde(default = "default_h_ms")]
        h_ms: f64,
        #[serde(default = "default_true")]
        los: bool,
    },
    /// Random attenuation.
    Random {
        #[serde(default)]
        variable: RandomVariable,
    },
    /// Fixed received power.
    FixedRss {
        #[serde(default = "default_fixed_rss")]
        rss_dbm: f64,
    },
    /// Explicit link table.
    Matrix {
        #[serde(default = "default_matrix_loss")]
        default_loss: f64,
        #[serde(default)]
        entries: Vec<MatrixEntry>,
    },
    /// Hard range cutoff.
    Range {
        #[serde(default = "default_max_range")]
        max_range: f64,
    },
}

fn positive(model: &'static str, name: &'static str, value: f64) -> PropagationResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PropagationError::invalid(model, name, format!("must be positive, got {}", value)))
    }
}

impl LossModelConfig {
    /// Instantiate the model. `resolve` maps node names to entity ids for matrix entries.
    pub fn build<F>(&self, rng: ChaCha8Rng, resolve: F) -> PropagationResult<Box<dyn PropagationLossModel>>
    where
        F: Fn(&str) -> Option<EntityId>,
    {
        let model: Box<dyn PropagationLossModel> = match self {
            LossModelConfig::Friis { frequency_hz, system_loss, min_distance } => {
                positive("friis", "frequency_hz", *frequency_hz)?;
                positive("friis", "system_loss", *system_loss)?;
                Box::new(FriisPropagationLoss::new(*frequency_hz, *system_loss, *min_distance))
            }
            LossModelConfig::TwoRayGround { frequency_hz, system_loss, min_distance, height_above_z } => {
                positive("two_ray_ground", "frequency_hz", *frequency_hz)?;
                positive("two_ray_ground", "system_loss", *system_loss)?;
                Box::new(TwoRayGroundPropagationLoss::new(
                    *frequency_hz,
                    *system_loss,
                    *min_distance,
                    *height_above_z,
                ))
            }
            LossModelConfig::LogDistance { exponent, reference_distance, reference_loss } => {
                positive("log_distance", "reference_distance", *reference_distance)?;
                Box::new(LogDistancePropagationLoss::new(*exponent, *reference_distance, *reference_loss))
            }
            LossModelConfig::ThreeLogDistance { distances, exponents, reference_loss } => {
                positive("three_log_distance", "distances[0]", distances[0])?;
                if !(distances[0] <= distances[1] && distances[1] <= distances[2]) {
                    return Err(PropagationError::invalid(
                        "three_log_distance",
                        "distances",
                        "breakpoints must be non-decreasing",
                    ));
                }
                Box::new(ThreeLogDistancePropagationLoss::new(*distances, *exponents, *reference_loss))
            }
            LossModelConfig::Nakagami { distances, m } => {
                for value in m {
                    positive("nakagami", "m", *value)?;
                }
                Box::new(NakagamiPropagationLoss::new(*distances, *m, rng))
            }
            LossModelConfig::Indoor {
                profile,
                frequency_hz,
                exponent,
                reference,
                sigma_before_db,
                sigma_after_db,
            } => {
                positive("indoor", "frequency_hz", *frequency_hz)?;
                let mut model = IndoorChannelLoss::new(*profile, rng);
                model.set_frequency(*frequency_hz);
                model.set_exponent(*exponent);
                model.set_shadow_sigma(*sigma_before_db, *sigma_after_db);
                if let Some((distance, loss)) = reference {
                    positive("indoor", "reference distance", *distance)?;
                    model.set_reference(*distance, *loss);
                }
                Box::new(model)
            }
            LossModelConfig::Outdoor { frequency_hz, h_bs, h_ms, los } => {
                positive("outdoor", "frequency_hz", *frequency_hz)?;
                Box::new(
                    OutdoorPropagationLoss::new(rng)
                        .with_frequency(*frequency_hz)
                        .with_heights(*h_bs, *h_ms)
                        .with_los(*los),
                )
            }
            LossModelConfig::Random { variable } => Box::new(RandomPropagationLoss::new(*variable, rng)),
            LossModelConfig::FixedRss { rss_dbm } => Box::new(FixedRssLoss::new(*rss_dbm)),
            LossModelConfig::Matrix { default_loss, entries } => {
                let mut matrix = MatrixPropagationLoss::new(*default_loss);
                for entry in entries {
                    let from = resolve(&entry.from)
                        .ok_or_else(|| PropagationError::UnknownEndpoint(entry.from.clone()))?;
                    let to = resolve(&entry.to).ok_or_else(|| PropagationError::UnknownEndpoint(entry.to.clone()))?;
                    matrix.set_loss(from, to, entry.loss_db, entry.symmetric);
                }
                Box::new(matrix)
            }
            LossModelConfig::Range { max_range } => Box::new(RangePropagationLoss::new(*max_range)),
        };
        Ok(model)
    }
}

/// The propagation delay model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DelayModelConfig {
    /// Distance over a constant speed.
    ConstantSpeed {
        #[serde(default = "default_speed")]
        speed: f64,
    },
    /// Random delay in seconds.
    Random { variable: RandomVariable },
}

impl Default for DelayModelConfig {
    fn default() -> Self {
        DelayModelConfig::ConstantSpeed { speed: default_speed() }
    }
}

impl DelayModelConfig {
    /// Instantiate the model.
    pub fn build(&self, rng: ChaCha8Rng) -> PropagationResult<Box<dyn PropagationDelayModel>> {
        Ok(match self {
            DelayModelConfig::ConstantSpeed { speed } => {
                positive("constant_speed", "speed", *speed)?;
                Box::new(ConstantSpeedPropagationDelay::new(*speed))
            }
            DelayModelConfig::Random { variable } => Box::new(RandomPropagationDelay::new(*variable, rng)),
        })
    }
}
