//! Empirical indoor (TGn channels B and D) and outdoor loss models.

use crate::{friis_gain_db, Endpoint, PropagationLossModel, ShadowFading, SPEED_OF_LIGHT};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use wifisim_common::NodeRole;

// ============================================================================
// Indoor
// ============================================================================

/// TGn indoor channel profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndoorProfile {
    /// Residential, breakpoint 5 m.
    ChannelB,
    /// Large office, breakpoint 10 m.
    ChannelD,
}

impl IndoorProfile {
    /// Breakpoint distance (m).
    pub fn reference_distance(&self) -> f64 {
        match self {
            IndoorProfile::ChannelB => 5.0,
            IndoorProfile::ChannelD => 10.0,
        }
    }

    /// Friis loss at the breakpoint for the given carrier, when tabulated.
    pub fn reference_loss(&self, frequency_hz: f64) -> Option<f64> {
        match (self, frequency_hz) {
            (IndoorProfile::ChannelB, f) if f == 5.0e9 => Some(60.396),
            (IndoorProfile::ChannelB, f) if f == 2.4e9 => Some(54.0),
            (IndoorProfile::ChannelD, f) if f == 5.0e9 => Some(66.417),
            (IndoorProfile::ChannelD, f) if f == 2.4e9 => Some(60.04),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            IndoorProfile::ChannelB => "indoor_channel_b",
            IndoorProfile::ChannelD => "indoor_channel_d",
        }
    }
}

/// Indoor log-distance loss with a free-space segment and shadow fading on both sides.
///
/// ```text
/// d <= d0:  rx = tx + 10·log10(λ²/(16π²d²)) + S(σ_before)
/// d >  d0:  rx = tx - L0 - 10·n·log10(d/d0) + S(σ_after)
/// ```
#[derive(Debug, Clone)]
pub struct IndoorChannelLoss {
    profile: IndoorProfile,
    exponent: f64,
    reference_distance: f64,
    reference_loss: f64,
    sigma_before: f64,
    sigma_after: f64,
    lambda: f64,
    shadow: ShadowFading,
}

impl IndoorChannelLoss {
    /// Default path loss exponent.
    pub const DEFAULT_EXPONENT: f64 = 3.5;
    /// Default carrier frequency (Hz).
    pub const DEFAULT_FREQUENCY_HZ: f64 = 5.0e9;
    /// Default shadow fading deviation on both sides of the breakpoint (dB).
    pub const DEFAULT_SHADOW_SIGMA_DB: f64 = 5.0;

    /// Create a model with the profile defaults at 5 GHz.
    pub fn new(profile: IndoorProfile, rng: ChaCha8Rng) -> Self {
        let mut model = IndoorChannelLoss {
            profile,
            exponent: Self::DEFAULT_EXPONENT,
            reference_distance: profile.reference_distance(),
            reference_loss: 0.0,
            sigma_before: Self::DEFAULT_SHADOW_SIGMA_DB,
            sigma_after: Self::DEFAULT_SHADOW_SIGMA_DB,
            lambda: 0.0,
            shadow: ShadowFading::new(rng),
        };
        model.set_frequency(Self::DEFAULT_FREQUENCY_HZ);
        model
    }

    /// Retune; at 5 GHz and 2.4 GHz the reference loss follows the carrier.
    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.lambda = SPEED_OF_LIGHT / frequency_hz;
        if let Some(loss) = self.profile.reference_loss(frequency_hz) {
            self.reference_loss = loss;
        }
    }

    /// Override the breakpoint and its loss.
    pub fn set_reference(&mut self, reference_distance: f64, reference_loss: f64) {
        self.reference_distance = reference_distance;
        self.reference_loss = reference_loss;
    }

    /// Override the path loss exponent.
    pub fn set_exponent(&mut self, exponent: f64) {
        self.exponent = exponent;
    }

    /// Override the shadow deviations before and after the breakpoint.
    pub fn set_shadow_sigma(&mut self, before_db: f64, after_db: f64) {
        self.sigma_before = before_db;
        self.sigma_after = after_db;
    }

    /// Loss at the breakpoint currently in use.
    pub fn reference_loss(&self) -> f64 {
        self.reference_loss
    }
}

impl PropagationLossModel for IndoorChannelLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);

        if distance <= self.reference_distance {
            let shadow = self.shadow.sample(0.0, self.sigma_before);
            if distance == 0.0 {
                return tx_power_dbm + shadow;
            }
            return tx_power_dbm + friis_gain_db(self.lambda, distance, 1.0) + shadow;
        }

        let path_loss_db = 10.0 * self.exponent * (distance / self.reference_distance).log10();
        let shadow = self.shadow.sample(0.0, self.sigma_after);
        tx_power_dbm - self.reference_loss - path_loss_db + shadow
    }

    fn name(&self) -> &'static str {
        self.profile.label()
    }
}

// ============================================================================
// Outdoor
// ============================================================================

/// Outdoor micro-cell loss with LOS/NLOS branches and antenna heights.
#[derive(Debug, Clone)]
pub struct OutdoorPropagationLoss {
    frequency_hz: f64,
    h_bs: f64,
    h_ms: f64,
    los: bool,
    shadow: ShadowFading,
    los_rng: ChaCha8Rng,
}

impl OutdoorPropagationLoss {
    /// Speed of light used by the breakpoint formula.
    pub const C: f64 = 3.0e8;
    /// Default carrier frequency (Hz).
    pub const DEFAULT_FREQUENCY_HZ: f64 = 5.0e9;
    /// Default base station height (m).
    pub const DEFAULT_H_BS: f64 = 10.0;
    /// Default mobile station height (m).
    pub const DEFAULT_H_MS: f64 = 1.5;
    /// Shadow deviation beyond the LOS breakpoint (dB).
    pub const LOS_SHADOW_SIGMA_DB: f64 = 3.0;
    /// Shadow deviation for NLOS links (dB).
    pub const NLOS_SHADOW_SIGMA_DB: f64 = 4.0;

    /// Create a model with default heights, LOS and 5 GHz.
    pub fn new(mut rng: ChaCha8Rng) -> Self {
        let shadow = ShadowFading::new(ChaCha8Rng::seed_from_u64(rng.gen()));
        OutdoorPropagationLoss {
            frequency_hz: Self::DEFAULT_FREQUENCY_HZ,
            h_bs: Self::DEFAULT_H_BS,
            h_ms: Self::DEFAULT_H_MS,
            los: true,
            shadow,
            los_rng: rng,
        }
    }

    /// Set the carrier frequency.
    pub fn with_frequency(mut self, frequency_hz: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    /// Set the antenna heights.
    pub fn with_heights(mut self, h_bs: f64, h_ms: f64) -> Self {
        self.h_bs = h_bs;
        self.h_ms = h_ms;
        self
    }

    /// Set the fixed LOS flag used by the role-agnostic entry point.
    pub fn with_los(mut self, los: bool) -> Self {
        self.los = los;
        self
    }

    /// Breakpoint distance `4(hBS−1)(hMS−1)f/C`.
    pub fn breakpoint_distance(&self, h_bs: f64, h_ms: f64) -> f64 {
        4.0 * (h_bs - 1.0) * (h_ms - 1.0) * self.frequency_hz / Self::C
    }

    /// Probability of line of sight at a distance.
    pub fn los_probability(distance: f64) -> f64 {
        let decay = (-distance / 36.0).exp();
        (18.0 / distance).min(1.0) * (1.0 - decay) + decay
    }

    /// Base and mobile station heights for a link between two roles.
    pub fn heights_for_roles(role_a: NodeRole, role_b: NodeRole) -> (f64, f64) {
        match (role_a, role_b) {
            (NodeRole::Sta, NodeRole::Sta) => (1.5, 1.5),
            (NodeRole::Ap, NodeRole::Ap) => (10.0, 10.0),
            _ => (10.0, 1.5),
        }
    }

    fn rx_power(&mut self, tx_power_dbm: f64, distance: f64, h_bs: f64, h_ms: f64, los: bool) -> f64 {
        if distance == 0.0 {
            return tx_power_dbm;
        }
        let f_ghz = self.frequency_hz / 1.0e9;

        let path_loss_db = if los {
            if distance <= self.breakpoint_distance(h_bs, h_ms) {
                22.0 * distance.log10() + 28.0 + 20.0 * f_ghz.log10()
            } else {
                40.0 * distance.log10() + 7.8 - 18.0 * (h_bs - 1.0).log10() - 18.0 * (h_ms - 1.0).log10()
                    + 2.0 * f_ghz.log10()
                    + self.shadow.sample(0.0, Self::LOS_SHADOW_SIGMA_DB)
            }
        } else {
            36.7 * distance.log10() + 22.7 + 26.0 * f_ghz.log10() + self.shadow.sample(0.0, Self::NLOS_SHADOW_SIGMA_DB)
        };

        tx_power_dbm - path_loss_db
    }
}

impl PropagationLossModel for OutdoorPropagationLoss {
    fn calc_rx_power(&mut self, tx_power_dbm: f64, a: &Endpoint, b: &Endpoint) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        let (h_bs, h_ms, los) = (self.h_bs, self.h_ms, self.los);
        self.rx_power(tx_power_dbm, distance, h_bs, h_ms, los)
    }

    fn calc_rx_power_for_roles(
        &mut self,
        tx_power_dbm: f64,
        a: &Endpoint,
        b: &Endpoint,
        role_a: NodeRole,
        role_b: NodeRole,
    ) -> f64 {
        let distance = a.distance_to(b);
        debug_assert!(distance >= 0.0);
        let (h_bs, h_ms) = Self::heights_for_roles(role_a, role_b);
        let los = self.los_rng.gen::<f64>() < Self::los_probability(distance);
        tracing::trace!(distance, h_bs, h_ms, los, "outdoor role-aware draw");
        self.rx_power(tx_power_dbm, distance, h_bs, h_ms, los)
    }

    fn name(&self) -> &'static str {
        "outdoor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_indoor_reference_loss_follows_frequency() {
        let mut b = IndoorChannelLoss::new(IndoorProfile::ChannelB, rng(1));
        assert_eq!(b.reference_loss(), 60.396);
        b.set_frequency(2.4e9);
        assert_eq!(b.reference_loss(), 54.0);

        let mut d = IndoorChannelLoss::new(IndoorProfile::ChannelD, rng(1));
        assert_eq!(d.reference_loss(), 66.417);
        d.set_frequency(2.4e9);
        assert_eq!(d.reference_loss(), 60.04);
        d.set_frequency(3.0e9);
        assert_eq!(d.reference_loss(), 60.04, "untabulated carriers keep the previous loss");
    }

    #[test]
    fn test_indoor_without_shadow_matches_formulas() {
        let mut model = IndoorChannelLoss::new(IndoorProfile::ChannelB, rng(2));
        model.set_shadow_sigma(0.0, 0.0);

        let (a, b) = endpoints(2.0);
        let lambda = SPEED_OF_LIGHT / 5.0e9;
        let near = model.calc_rx_power(20.0, &a, &b);
        assert!((near - (20.0 + friis_gain_db(lambda, 2.0, 1.0))).abs() < 1e-9);

        let (a, b) = endpoints(50.0);
        let far = model.calc_rx_power(20.0, &a, &b);
        assert!((far - (20.0 - 60.396 - 35.0)).abs() < 1e-9, "got {}", far);
    }

    #[test]
    fn test_indoor_shadow_applies_below_reference() {
        let mut model = IndoorChannelLoss::new(IndoorProfile::ChannelD, rng(3));
        let (a, b) = endpoints(4.0);
        let draws: Vec<f64> = (0..8).map(|_| model.calc_rx_power(20.0, &a, &b)).collect();
        assert!(draws.windows(2).any(|w| w[0] != w[1]), "shadowing must vary the result");
    }

    #[test]
    fn test_outdoor_los_below_breakpoint_is_deterministic() {
        let mut model = OutdoorPropagationLoss::new(rng(4));
        let d_bp = model.breakpoint_distance(10.0, 1.5);
        assert!((d_bp - 4.0 * 9.0 * 0.5 * 5.0e9 / 3.0e8).abs() < 1e-9);

        let (a, b) = endpoints(100.0);
        let rx = model.calc_rx_power(20.0, &a, &b);
        let expected = 20.0 - (22.0 * 2.0 + 28.0 + 20.0 * 5.0f64.log10());
        assert!((rx - expected).abs() < 1e-9, "got {} expected {}", rx, expected);
    }

    #[test]
    fn test_outdoor_los_probability() {
        assert!((OutdoorPropagationLoss::los_probability(1.0) - 1.0).abs() < 1e-12);
        let p = OutdoorPropagationLoss::los_probability(100.0);
        assert!(p > 0.0 && p < 1.0);
        assert!(OutdoorPropagationLoss::los_probability(400.0) < p);
    }

    #[test]
    fn test_outdoor_roles_change_heights() {
        // Short links are always LOS and below every role's breakpoint, so the
        // result is deterministic and independent of heights.
        let mut model = OutdoorPropagationLoss::new(rng(5));
        let (a, b) = endpoints(1.0);
        let sta_sta = model.calc_rx_power_for_roles(0.0, &a, &b, NodeRole::Sta, NodeRole::Sta);
        let ap_ap = model.calc_rx_power_for_roles(0.0, &a, &b, NodeRole::Ap, NodeRole::Ap);
        assert!((sta_sta - ap_ap).abs() < 1e-12);

        assert_eq!(OutdoorPropagationLoss::heights_for_roles(NodeRole::Sta, NodeRole::Sta), (1.5, 1.5));
        assert_eq!(OutdoorPropagationLoss::heights_for_roles(NodeRole::Sta, NodeRole::Ap), (10.0, 1.5));
        assert_eq!(OutdoorPropagationLoss::heights_for_roles(NodeRole::Ap, NodeRole::Sta), (10.0, 1.5));
        assert_eq!(OutdoorPropagationLoss::heights_for_roles(NodeRole::Ap, NodeRole::Ap), (10.0, 10.0));
    }

    #[test]
    fn test_outdoor_role_draws_mix_los_and_nlos() {
        // At 300 m the LOS probability is about 6%, so NLOS dominates and the
        // average loss sits near the NLOS mean.
        let mut model = OutdoorPropagationLoss::new(rng(6));
        let (a, b) = endpoints(300.0);
        let n = 2000;
        let mean = (0..n)
            .map(|_| model.calc_rx_power_for_roles(0.0, &a, &b, NodeRole::Sta, NodeRole::Sta))
            .sum::<f64>()
            / n as f64;
        let nlos_mean = -(36.7 * 300f64.log10() + 22.7 + 26.0 * 5f64.log10());
        assert!((mean - nlos_mean).abs() < 3.0, "mean {} vs nlos {}", mean, nlos_mean);
    }
}
