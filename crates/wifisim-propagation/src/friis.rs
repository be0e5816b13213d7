use crate::{friis_gain_db, Endpoint, PropagationLossModel, SPEED_OF_LIGHT};

/// Free-space (Friis) loss.
///
/// `rx = tx + 10·log10(λ² / (16π²d²L))`; at or below the minimum distance
/// the input power is returned unchanged.
#[derive(Debug, Clone)]
pub struct FriisPropagationLoss {
    frequency_hz: f64,
    lambda: f64,
    system_loss: f64,
    min_distance: f64,
}

impl FriisPropagationLoss {
    /// Default carrier frequency (Hz).
    pub const DEFAULT_FREQUENCY_HZ: f64 = 5.15e9;
    /// Default system loss (linear).
    pub const DEFAULT_SYSTEM_LOSS: f64 = 1.0;
    /// Default minimum distance (m).
    pub const DEFAULT_MIN_DISTANCE: f64 = 0.5;

    /// Create a model with explicit parameters.
    pub fn new(frequency_hz: f64, system_loss: f64, min_distance: f64) -> Self {
        FriisPropagationLoss {
            frequency_hz,
            lambda: SPEED_OF_LIGHT / frequency_hz,
            system_loss,
            min_distance,
        }
    }

    /// Carrier frequency in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }
}

impl Default for FriisPropagationLoss {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_FREQUENCY_HZ,
            Self::DEFAULT_SYSTEM_LOSS,
            Self::DEFAULT_MIN_DISTANCE,
        )
    }
}

impl PropagationLossModel for FriisPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        if distance <= self.min_distance {
            return tx_power_dbm;
        }
        if distance < 3.0 * self.lambda {
            tracing::trace!(distance, lambda = self.lambda, "friis applied in the near field");
        }
        tx_power_dbm + friis_gain_db(self.lambda, distance, self.system_loss)
    }

    fn name(&self) -> &'static str {
        "friis"
    }
}

/// Two-ray ground reflection loss.
///
/// Below the crossover distance `4π·ht·hr/λ` this is Friis; above it
/// `rx = tx + 10·log10(ht²hr² / (d⁴L))`. Antenna heights are the endpoint
/// z coordinates plus a common extra height.
#[derive(Debug, Clone)]
pub struct TwoRayGroundPropagationLoss {
    lambda: f64,
    system_loss: f64,
    min_distance: f64,
    height_above_z: f64,
}

impl TwoRayGroundPropagationLoss {
    /// Default carrier frequency (Hz).
    pub const DEFAULT_FREQUENCY_HZ: f64 = 5.15e9;
    /// Default minimum distance (m).
    pub const DEFAULT_MIN_DISTANCE: f64 = 0.5;

    /// Create a model with explicit parameters.
    pub fn new(frequency_hz: f64, system_loss: f64, min_distance: f64, height_above_z: f64) -> Self {
        TwoRayGroundPropagationLoss {
            lambda: SPEED_OF_LIGHT / frequency_hz,
            system_loss,
            min_distance,
            height_above_z,
        }
    }

    /// Crossover distance for a pair of endpoints.
    pub fn crossover_distance(&self, a: &Endpoint, b: &Endpoint) -> f64 {
        let ht = a.position.z + self.height_above_z;
        let hr = b.position.z + self.height_above_z;
        4.0 * std::f64::consts::PI * ht * hr / self.lambda
    }
}

impl Default for TwoRayGroundPropagationLoss {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FREQUENCY_HZ, 1.0, Self::DEFAULT_MIN_DISTANCE, 0.0)
    }
}

impl PropagationLossModel for TwoRayGroundPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        if distance <= self.min_distance {
            return tx_power_dbm;
        }

        let ht = a.position.z + self.height_above_z;
        let hr = b.position.z + self.height_above_z;
        let d_cross = self.crossover_distance(a, b);

        if distance <= d_cross {
            return tx_power_dbm + friis_gain_db(self.lambda, distance, self.system_loss);
        }

        let numerator = ht * ht * hr * hr;
        let denominator = distance.powi(4) * self.system_loss;
        tx_power_dbm + 10.0 * (numerator / denominator).log10()
    }

    fn name(&self) -> &'static str {
        "two_ray_ground"
    }
}
