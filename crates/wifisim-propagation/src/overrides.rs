use crate::{Endpoint, PropagationLossModel};
use std::collections::HashMap;
use wifisim_common::EntityId;

/// Ignores the input and returns a fixed received power.
#[derive(Debug, Clone)]
pub struct FixedRssLoss {
    rss_dbm: f64,
}

impl FixedRssLoss {
    /// Default received power (dBm).
    pub const DEFAULT_RSS_DBM: f64 = -150.0;

    /// Create a model returning `rss_dbm`.
    pub fn new(rss_dbm: f64) -> Self {
        FixedRssLoss { rss_dbm }
    }
}

impl Default for FixedRssLoss {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RSS_DBM)
    }
}

impl PropagationLossModel for FixedRssLoss {
    fn calc_rx_power(&mut self, _tx_power_dbm: f64, _a: &Endpoint, _b: &Endpoint) -> f64 {
        self.rss_dbm
    }

    fn name(&self) -> &'static str {
        "fixed_rss"
    }
}

/// Explicit per-link losses keyed by ordered endpoint pair.
#[derive(Debug, Clone)]
pub struct MatrixPropagationLoss {
    default_loss: f64,
    losses: HashMap<(EntityId, EntityId), f64>,
}

impl MatrixPropagationLoss {
    /// Create a matrix where unlisted links lose `default_loss` dB.
    pub fn new(default_loss: f64) -> Self {
        MatrixPropagationLoss {
            default_loss,
            losses: HashMap::new(),
        }
    }

    /// Set the loss from `a` to `b`, and from `b` to `a` when symmetric.
    pub fn set_loss(&mut self, a: EntityId, b: EntityId, loss_db: f64, symmetric: bool) {
        debug_assert!(a != b);
        self.losses.insert((a, b), loss_db);
        if symmetric {
            self.losses.insert((b, a), loss_db);
        }
    }

    /// Loss for unlisted links.
    pub fn set_default_loss(&mut self, loss_db: f64) {
        self.default_loss = loss_db;
    }
}

impl Default for MatrixPropagationLoss {
    fn default() -> Self {
        Self::new(f64::MAX)
    }
}

impl PropagationLossModel for MatrixPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let loss = self.losses.get(&(a.id, b.id)).copied().unwrap_or(self.default_loss);
        tx_power_dbm - loss
    }

    fn name(&self) -> &'static str {
        "matrix"
    }
}

/// Hard cutoff: unchanged within range, -1000 dBm beyond.
#[derive(Debug, Clone)]
pub struct RangePropagationLoss {
    max_range: f64,
}

impl RangePropagationLoss {
    /// Default maximum range (m).
    pub const DEFAULT_MAX_RANGE: f64 = 250.0;
    /// Power reported beyond the range (dBm).
    pub const OUT_OF_RANGE_DBM: f64 = -1000.0;

    /// Create a model with the given range.
    pub fn new(max_range: f64) -> Self {
        RangePropagationLoss { max_range }
    }
}

impl Default for RangePropagationLoss {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RANGE)
    }
}

impl PropagationLossModel for RangePropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        if a.distance_to(b) <= self.max_range {
            tx_power_dbm
        } else {
            Self::OUT_OF_RANGE_DBM
        }
    }

    fn name(&self) -> &'static str {
        "range"
    }
}
