//! PHY configuration.
//!
//! Every tunable has a `DEFAULT_*` constant so the model crate can list them
//! and scenario files can override any subset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use wifisim_common::SimTime;

/// Forward error correction code family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodingType {
    /// Binary convolutional code.
    #[default]
    Bcc,
    /// Low-density parity check.
    Ldpc,
}

impl CodingType {
    /// Prefix used in PER table file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            CodingType::Bcc => "BCC",
            CodingType::Ldpc => "LDPC",
        }
    }
}

/// Configuration of one PHY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    /// Energy detection threshold on the primary sub-channel (dBm).
    pub ed_threshold_dbm: f64,
    /// CCA mode 1 threshold (dBm).
    pub cca_threshold_dbm: f64,
    /// Transmit antenna gain (dB).
    pub tx_gain_db: f64,
    /// Receive antenna gain (dB).
    pub rx_gain_db: f64,
    /// Lowest transmit power level (dBm).
    pub tx_power_start_dbm: f64,
    /// Highest transmit power level (dBm).
    pub tx_power_end_dbm: f64,
    /// Number of power levels between start and end, inclusive.
    pub tx_power_levels: u8,
    /// Receiver noise figure (dB).
    pub noise_figure_db: f64,
    /// Time spent in SWITCHING on a channel change (µs).
    pub channel_switch_delay_us: u64,
    /// Operating frequency (MHz).
    pub frequency_mhz: u32,
    /// Operating channel width (MHz).
    pub channel_width_mhz: u32,
    /// Digit-pair encoded channel set.
    pub channel_number: u64,
    /// Digit-pair encoded active channels.
    pub active_channels: u64,
    /// Primary channel id.
    pub primary_channel: u16,
    /// Use the bonded-channel medium instead of the single-channel path.
    pub use_new_model: bool,
    /// Drop frames addressed to other stations at the PHY.
    pub check_address_at_phy: bool,
    /// Use PER tables instead of the closed-form error model.
    pub use_lut_for_per: bool,
    /// Code family used for PER table selection.
    pub coding: CodingType,
    /// Number of transmit antennas.
    pub tx_antennas: u8,
    /// Number of receive antennas.
    pub rx_antennas: u8,
    /// Short guard interval enabled.
    pub short_guard_interval: bool,
    /// LDPC enabled.
    pub ldpc: bool,
    /// STBC enabled.
    pub stbc: bool,
    /// Greenfield preamble enabled.
    pub greenfield: bool,
    /// Channel bonding enabled.
    pub channel_bonding: bool,
    /// Directory holding the PER tables.
    pub lut_dir: PathBuf,
}

impl PhyConfig {
    /// Default energy detection threshold (dBm).
    pub const DEFAULT_ED_THRESHOLD_DBM: f64 = -96.0;
    /// Default CCA threshold (dBm).
    pub const DEFAULT_CCA_THRESHOLD_DBM: f64 = -99.0;
    /// Default tx and rx gain (dB).
    pub const DEFAULT_GAIN_DB: f64 = 1.0;
    /// Default transmit power for both ends of the range (dBm).
    pub const DEFAULT_TX_POWER_DBM: f64 = 16.0206;
    /// Default number of transmit power levels.
    pub const DEFAULT_TX_POWER_LEVELS: u8 = 1;
    /// Default noise figure (dB).
    pub const DEFAULT_NOISE_FIGURE_DB: f64 = 7.0;
    /// Default channel switch delay (µs).
    pub const DEFAULT_CHANNEL_SWITCH_DELAY_US: u64 = 250;
    /// Default operating frequency (MHz).
    pub const DEFAULT_FREQUENCY_MHZ: u32 = 2407;
    /// Default channel width (MHz).
    pub const DEFAULT_CHANNEL_WIDTH_MHZ: u32 = 20;
    /// Default channel set, active set and primary.
    pub const DEFAULT_CHANNEL: u16 = 5;
    /// Default PER table directory.
    pub const DEFAULT_LUT_DIR: &'static str = "per_tables";

    /// Transmit power in dBm for a power level.
    pub fn tx_power_dbm(&self, level: u8) -> f64 {
        if self.tx_power_levels <= 1 {
            return self.tx_power_start_dbm;
        }
        let step = (self.tx_power_end_dbm - self.tx_power_start_dbm) / f64::from(self.tx_power_levels - 1);
        self.tx_power_start_dbm + f64::from(level) * step
    }

    /// Noise figure as a linear ratio.
    pub fn noise_figure_linear(&self) -> f64 {
        10f64.powf(self.noise_figure_db / 10.0)
    }

    /// Channel switch delay.
    pub fn channel_switch_delay(&self) -> SimTime {
        SimTime::from_micros(self.channel_switch_delay_us)
    }

    /// Energy detection threshold in watts.
    pub fn ed_threshold_w(&self) -> f64 {
        crate::dbm_to_w(self.ed_threshold_dbm)
    }

    /// CCA threshold in watts.
    pub fn cca_threshold_w(&self) -> f64 {
        crate::dbm_to_w(self.cca_threshold_dbm)
    }
}

impl Default for PhyConfig {
    fn default() -> Self {
        PhyConfig {
            ed_threshold_dbm: Self::DEFAULT_ED_THRESHOLD_DBM,
            cca_threshold_dbm: Self::DEFAULT_CCA_THRESHOLD_DBM,
            tx_gain_db: Self::DEFAULT_GAIN_DB,
            rx_gain_db: Self::DEFAULT_GAIN_DB,
            tx_power_start_dbm: Self::DEFAULT_TX_POWER_DBM,
            tx_power_end_dbm: Self::DEFAULT_TX_POWER_DBM,
            tx_power_levels: Self::DEFAULT_TX_POWER_LEVELS,
            noise_figure_db: Self::DEFAULT_NOISE_FIGURE_DB,
            channel_switch_delay_us: Self::DEFAULT_CHANNEL_SWITCH_DELAY_US,
            frequency_mhz: Self::DEFAULT_FREQUENCY_MHZ,
            channel_width_mhz: Self::DEFAULT_CHANNEL_WIDTH_MHZ,
            channel_number: u64::from(Self::DEFAULT_CHANNEL),
            active_channels: u64::from(Self::DEFAULT_CHANNEL),
            primary_channel: Self::DEFAULT_CHANNEL,
            use_new_model: true,
            check_address_at_phy: true,
            use_lut_for_per: true,
            coding: CodingType::Bcc,
            tx_antennas: 1,
            rx_antennas: 1,
            short_guard_interval: false,
            ldpc: false,
            stbc: false,
            greenfield: false,
            channel_bonding: false,
            lut_dir: PathBuf::from(Self::DEFAULT_LUT_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_power_levels() {
        let mut config = PhyConfig::default();
        assert_eq!(config.tx_power_dbm(0), PhyConfig::DEFAULT_TX_POWER_DBM);
        assert_eq!(config.tx_power_dbm(3), PhyConfig::DEFAULT_TX_POWER_DBM, "single level ignores the index");

        config.tx_power_start_dbm = 10.0;
        config.tx_power_end_dbm = 20.0;
        config.tx_power_levels = 3;
        assert_eq!(config.tx_power_dbm(1), 15.0);
        assert_eq!(config.tx_power_dbm(2), 20.0);
    }

    #[test]
    fn test_noise_figure_linear() {
        let config = PhyConfig { noise_figure_db: 10.0, ..Default::default() };
        assert!((config.noise_figure_linear() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_thresholds_in_watts() {
        let config = PhyConfig { ed_threshold_dbm: -60.0, cca_threshold_dbm: -90.0, ..Default::default() };
        assert!((config.ed_threshold_w() - 1e-9).abs() < 1e-21);
        assert!((config.cca_threshold_w() - 1e-12).abs() < 1e-24);
        assert_eq!(config.channel_switch_delay(), SimTime::from_micros(250));
    }
}
