//! # wifisim-phy
//!
//! 802.11n physical layer for the wifisim discrete-event simulator.
//!
//! This crate provides:
//! - The channel medium entity ([`WifiChannel`]) with co-channel and
//!   adjacent-channel overlap between bonded channel sets
//! - The PHY entity ([`WifiPhy`]) and its receive state machine
//! - Per-sub-channel interference accounting ([`InterferenceHelper`])
//! - Packet error rate estimation, closed form or from PER tables ([`PerEngine`])
//! - PLCP duration tables and phase plans ([`plcp`])
//! - Channel number encodings ([`ChannelBonding`])
//! - Metric definitions ([`metric_defs`])
//!
//! ## Example
//!
//! ```rust
//! use wifisim_phy::plcp::tx_duration;
//! use wifisim_common::{PacketType, TxVector, WifiMode, WifiPreamble};
//!
//! let tx = TxVector::new(WifiMode::ofdm(6).unwrap());
//! let air = tx_duration(100, &tx, WifiPreamble::Long, PacketType::Normal);
//! assert_eq!(air.as_micros(), 160);
//! ```

pub mod adjacent;
mod channel;
pub mod channel_bonding;
mod config;
mod error;
pub mod error_rate;
mod interference;
pub mod lut;
pub mod metric_defs;
pub mod per;
mod phy;
pub mod plcp;
mod state;

pub use channel::{ChannelEndpoint, LinkOverlap, WifiChannel};
pub use channel_bonding::{Band, ChannelBonding};
pub use config::{CodingType, PhyConfig};
pub use error::{PhyError, PhyResult};
pub use error_rate::{ErrorRateModel, NistErrorRateModel};
pub use interference::{InterferenceHelper, NiChange, RxEvent, SnrPer};
pub use lut::{PerLookupTables, PerTable, PerTableKey};
pub use metric_defs::MetricLabels;
pub use per::{PerEngine, PerStrategy};
pub use phy::{build_per_engine, FirstMpduStatus, PhyLink, WifiPhy};
pub use state::{PhyState, PhyStateTracker};

/// Convert dBm to watts.
pub fn dbm_to_w(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0) / 1000.0
}

/// Convert watts to dBm.
pub fn w_to_dbm(w: f64) -> f64 {
    10.0 * w.log10() + 30.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_conversions() {
        assert!((dbm_to_w(30.0) - 1.0).abs() < 1e-12);
        assert!((dbm_to_w(-30.0) - 1e-6).abs() < 1e-18);
        assert!((w_to_dbm(dbm_to_w(-72.5)) + 72.5).abs() < 1e-9);
        assert_eq!(dbm_to_w(f64::NEG_INFINITY), 0.0, "unseen sub-channels carry no power");
    }
}
