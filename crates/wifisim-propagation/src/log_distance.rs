use crate::{Endpoint, PropagationLossModel};

/// Single-slope log-distance loss.
#[derive(Debug, Clone)]
pub struct LogDistancePropagationLoss {
    exponent: f64,
    reference_distance: f64,
    reference_loss: f64,
}

impl LogDistancePropagationLoss {
    /// Default path loss exponent.
    pub const DEFAULT_EXPONENT: f64 = 3.0;
    /// Default reference distance (m).
    pub const DEFAULT_REFERENCE_DISTANCE: f64 = 1.0;
    /// Default reference loss (dB), Friis at 1 m and 5.15 GHz.
    pub const DEFAULT_REFERENCE_LOSS: f64 = 46.6777;

    /// Create a model with explicit parameters.
    pub fn new(exponent: f64, reference_distance: f64, reference_loss: f64) -> Self {
        LogDistancePropagationLoss {
            exponent,
            reference_distance,
            reference_loss,
        }
    }
}

impl Default for LogDistancePropagationLoss {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_EXPONENT,
            Self::DEFAULT_REFERENCE_DISTANCE,
            Self::DEFAULT_REFERENCE_LOSS,
        )
    }
}

impl PropagationLossModel for LogDistancePropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        if distance <= self.reference_distance {
            return tx_power_dbm;
        }
        let path_loss_db = 10.0 * self.exponent * (distance / self.reference_distance).log10();
        tx_power_dbm - self.reference_loss - path_loss_db
    }

    fn name(&self) -> &'static str {
        "log_distance"
    }
}

/// Three-slope log-distance loss.
///
/// Below `d0` there is no loss at all. From `d0` the reference loss applies and
/// the slope changes at `d1` and `d2`.
#[derive(Debug, Clone)]
pub struct ThreeLogDistancePropagationLoss {
    distances: [f64; 3],
    exponents: [f64; 3],
    reference_loss: f64,
}

impl ThreeLogDistancePropagationLoss {
    /// Default breakpoints d0, d1, d2 (m).
    pub const DEFAULT_DISTANCES: [f64; 3] = [1.0, 200.0, 500.0];
    /// Default exponents for the three segments.
    pub const DEFAULT_EXPONENTS: [f64; 3] = [1.9, 3.8, 3.8];
    /// Default reference loss at d0 (dB).
    pub const DEFAULT_REFERENCE_LOSS: f64 = 60.396;

    /// Create a model with explicit parameters.
    pub fn new(distances: [f64; 3], exponents: [f64; 3], reference_loss: f64) -> Self {
        debug_assert!(distances[0] <= distances[1] && distances[1] <= distances[2]);
        ThreeLogDistancePropagationLoss {
            distances,
            exponents,
            reference_loss,
        }
    }

    fn path_loss_db(&self, distance: f64) -> f64 {
        let [d0, d1, d2] = self.distances;
        let [n0, n1, n2] = self.exponents;

        if distance < d0 {
            0.0
        } else if distance < d1 {
            self.reference_loss + 10.0 * n0 * (distance / d0).log10()
        } else if distance < d2 {
            self.reference_loss + 10.0 * n0 * (d1 / d0).log10() + 10.0 * n1 * (distance / d1).log10()
        } else {
            self.reference_loss
                + 10.0 * n0 * (d1 / d0).log10()
                + 10.0 * n1 * (d2 / d1).log10()
                + 10.0 * n2 * (distance / d2).log10()
        }
    }
}

impl Default for ThreeLogDistancePropagationLoss {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_DISTANCES,
            Self::DEFAULT_EXPONENTS,
            Self::DEFAULT_REFERENCE_LOSS,
        )
    }
}

impl PropagationLossModel for ThreeLogDistancePropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        tx_power_dbm - self.path_loss_db(distance)
    }

    fn name(&self) -> &'static str {
        "three_log_distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints;

    #[test]
    fn test_log_distance_reference() {
        let mut model = LogDistancePropagationLoss::default();
        let (a, b) = endpoints(1.0);
        assert_eq!(model.calc_rx_power(10.0, &a, &b), 10.0);

        let (a, b) = endpoints(10.0);
        let rx = model.calc_rx_power(10.0, &a, &b);
        assert!((rx - (10.0 - 46.6777 - 30.0)).abs() < 1e-9, "got {}", rx);
    }

    #[test]
    fn test_three_log_below_d0_is_lossless() {
        let mut model = ThreeLogDistancePropagationLoss::default();
        let (a, b) = endpoints(0.5);
        assert_eq!(model.calc_rx_power(15.0, &a, &b), 15.0);
    }

    #[test]
    fn test_three_log_is_continuous_at_breakpoints() {
        let model = ThreeLogDistancePropagationLoss::default();
        for d in [200.0, 500.0] {
            let below = model.path_loss_db(d - 1e-9);
            let at = model.path_loss_db(d);
            assert!((below - at).abs() < 1e-6, "discontinuity at {}", d);
        }
    }

    #[test]
    fn test_three_log_monotonic() {
        let mut model = ThreeLogDistancePropagationLoss::default();
        let mut last = f64::INFINITY;
        for d in [1.0, 10.0, 150.0, 250.0, 600.0, 2000.0] {
            let (a, b) = endpoints(d);
            let rx = model.calc_rx_power(0.0, &a, &b);
            assert!(rx < last, "power must fall with distance at {}", d);
            last = rx;
        }
    }
}
