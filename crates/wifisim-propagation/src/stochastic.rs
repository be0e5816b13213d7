use crate::{Endpoint, PropagationLossModel};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

/// Scalar random source for attenuation and delay draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RandomVariable {
    /// Always the same value.
    Constant {
        /// The value.
        value: f64,
    },
    /// Uniform over `[min, max)`.
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl RandomVariable {
    /// Draw one value.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match *self {
            RandomVariable::Constant { value } => value,
            RandomVariable::Uniform { min, max } => min + (max - min) * rng.gen::<f64>(),
        }
    }
}

impl Default for RandomVariable {
    fn default() -> Self {
        RandomVariable::Constant { value: 1.0 }
    }
}

/// Subtracts a random attenuation from the input power.
#[derive(Debug, Clone)]
pub struct RandomPropagationLoss {
    variable: RandomVariable,
    rng: ChaCha8Rng,
}

impl RandomPropagationLoss {
    /// Create a model drawing from `variable`.
    pub fn new(variable: RandomVariable, rng: ChaCha8Rng) -> Self {
        RandomPropagationLoss { variable, rng }
    }
}

impl PropagationLossModel for RandomPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, _a: &Endpoint, _b: &Endpoint) -> f64 {
        tx_power_dbm - self.variable.sample(&mut self.rng)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Nakagami-m fast fading.
///
/// The received power in watts is drawn from `Gamma(m, P/m)` where `P` is the
/// input power and `m` is chosen by distance band.
#[derive(Debug, Clone)]
pub struct NakagamiPropagationLoss {
    distances: [f64; 2],
    m: [f64; 3],
    rng: ChaCha8Rng,
}

impl NakagamiPropagationLoss {
    /// Default band edges d1, d2 (m).
    pub const DEFAULT_DISTANCES: [f64; 2] = [80.0, 200.0];
    /// Default m for the three bands.
    pub const DEFAULT_M: [f64; 3] = [1.5, 0.75, 0.75];

    /// Create a model with explicit bands.
    pub fn new(distances: [f64; 2], m: [f64; 3], rng: ChaCha8Rng) -> Self {
        NakagamiPropagationLoss { distances, m, rng }
    }

    /// Create a model with the default bands.
    pub fn with_defaults(rng: ChaCha8Rng) -> Self {
        Self::new(Self::DEFAULT_DISTANCES, Self::DEFAULT_M, rng)
    }

    fn m_for(&self, distance: f64) -> f64 {
        if distance < self.distances[0] {
            self.m[0]
        } else if distance < self.distances[1] {
            self.m[1]
        } else {
            self.m[2]
        }
    }
}

impl PropagationLossModel for NakagamiPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        let m = self.m_for(distance);
        let power_w = 10f64.powf((tx_power_dbm - 30.0) / 10.0);

        let received_w = match Gamma::new(m, power_w / m) {
            Ok(gamma) => gamma.sample(&mut self.rng),
            Err(err) => {
                tracing::warn!(m, power_w, %err, "invalid nakagami parameters, passing power through");
                power_w
            }
        };
        10.0 * received_w.log10() + 30.0
    }

    fn name(&self) -> &'static str {
        "nakagami"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints;
    use rand::SeedableRng;

    #[test]
    fn test_random_default_is_one_db() {
        let mut model = RandomPropagationLoss::new(RandomVariable::default(), ChaCha8Rng::seed_from_u64(1));
        let (a, b) = endpoints(10.0);
        assert_eq!(model.calc_rx_power(10.0, &a, &b), 9.0);
    }

    #[test]
    fn test_random_uniform_bounds() {
        let variable = RandomVariable::Uniform { min: 2.0, max: 4.0 };
        let mut model = RandomPropagationLoss::new(variable, ChaCha8Rng::seed_from_u64(2));
        let (a, b) = endpoints(10.0);
        for _ in 0..100 {
            let rx = model.calc_rx_power(0.0, &a, &b);
            assert!((-4.0..=-2.0).contains(&rx), "rx {} outside range", rx);
        }
    }

    #[test]
    fn test_nakagami_preserves_mean_power() {
        let mut model = NakagamiPropagationLoss::with_defaults(ChaCha8Rng::seed_from_u64(3));
        let (a, b) = endpoints(100.0);
        let n = 20_000;
        let mean_w = (0..n)
            .map(|_| 10f64.powf((model.calc_rx_power(0.0, &a, &b) - 30.0) / 10.0))
            .sum::<f64>()
            / n as f64;
        // 0 dBm = 1 mW
        assert!((mean_w - 1e-3).abs() < 5e-5, "mean power {} W should be near 1 mW", mean_w);
    }

    #[test]
    fn test_nakagami_band_selection() {
        let model = NakagamiPropagationLoss::new([10.0, 20.0], [3.0, 2.0, 1.0], ChaCha8Rng::seed_from_u64(4));
        assert_eq!(model.m_for(5.0), 3.0);
        assert_eq!(model.m_for(10.0), 2.0);
        assert_eq!(model.m_for(25.0), 1.0);
    }
}
