use crate::{Endpoint, RandomVariable, SPEED_OF_LIGHT};
use rand_chacha::ChaCha8Rng;
use wifisim_common::SimTime;

/// Time a signal takes to travel between two endpoints.
pub trait PropagationDelayModel: Send + std::fmt::Debug {
    /// Propagation delay from `a` to `b`.
    fn delay(&mut self, a: &Endpoint, b: &Endpoint) -> SimTime;
}

/// Distance divided by a constant speed.
#[derive(Debug, Clone)]
pub struct ConstantSpeedPropagationDelay {
    speed: f64,
}

impl ConstantSpeedPropagationDelay {
    /// Create a model with the given speed in m/s.
    pub fn new(speed: f64) -> Self {
        ConstantSpeedPropagationDelay { speed }
    }
}

impl Default for ConstantSpeedPropagationDelay {
    fn default() -> Self {
        Self::new(SPEED_OF_LIGHT)
    }
}

impl PropagationDelayModel for ConstantSpeedPropagationDelay {
    fn delay(&mut self, a: &Endpoint, b: &Endpoint) -> SimTime {
        SimTime::from_secs(a.distance_to(b) / self.speed)
    }
}

/// Delay drawn from a random variable in seconds, regardless of distance.
#[derive(Debug, Clone)]
pub struct RandomPropagationDelay {
    variable: RandomVariable,
    rng: ChaCha8Rng,
}

impl RandomPropagationDelay {
    /// Create a model drawing seconds from `variable`.
    pub fn new(variable: RandomVariable, rng: ChaCha8Rng) -> Self {
        RandomPropagationDelay { variable, rng }
    }
}

impl PropagationDelayModel for RandomPropagationDelay {
    fn delay(&mut self, _a: &Endpoint, _b: &Endpoint) -> SimTime {
        SimTime::from_secs(self.variable.sample(&mut self.rng).max(0.0))
    }
}
