//! 802.11 PHY data carried between entities.
//!
//! These are the values that travel inside events: transmission modes and
//! vectors, frames with their A-MPDU tags, the per-sub-channel received power
//! record, and the upward notifications a PHY produces.

use crate::SimTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Modes
// ============================================================================

/// Modulation family of a [`WifiMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationClass {
    /// Legacy 802.11a/g OFDM.
    Ofdm,
    /// 802.11n high throughput.
    Ht,
}

/// Convolutional code rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeRate {
    /// Rate 1/2.
    Half,
    /// Rate 2/3.
    TwoThirds,
    /// Rate 3/4.
    ThreeQuarters,
    /// Rate 5/6.
    FiveSixths,
}

impl CodeRate {
    /// Fraction of coded bits that carry data.
    pub fn ratio(&self) -> f64 {
        match self {
            CodeRate::Half => 1.0 / 2.0,
            CodeRate::TwoThirds => 2.0 / 3.0,
            CodeRate::ThreeQuarters => 3.0 / 4.0,
            CodeRate::FiveSixths => 5.0 / 6.0,
        }
    }
}

const OFDM_RATES_MBPS: [u32; 8] = [6, 9, 12, 18, 24, 36, 48, 54];

const OFDM_CODING: [(u16, CodeRate); 8] = [
    (2, CodeRate::Half),
    (2, CodeRate::ThreeQuarters),
    (4, CodeRate::Half),
    (4, CodeRate::ThreeQuarters),
    (16, CodeRate::Half),
    (16, CodeRate::ThreeQuarters),
    (64, CodeRate::TwoThirds),
    (64, CodeRate::ThreeQuarters),
];

const HT_CODING: [(u16, CodeRate); 8] = [
    (2, CodeRate::Half),
    (4, CodeRate::Half),
    (4, CodeRate::ThreeQuarters),
    (16, CodeRate::Half),
    (16, CodeRate::ThreeQuarters),
    (64, CodeRate::TwoThirds),
    (64, CodeRate::ThreeQuarters),
    (64, CodeRate::FiveSixths),
];

/// HT data rates in bps, indexed by [bandwidth 20/40/80][short GI][mcs].
const HT_RATES_BPS: [[[u64; 8]; 2]; 3] = [
    [
        [6_500_000, 13_000_000, 19_500_000, 26_000_000, 39_000_000, 52_000_000, 58_500_000, 65_000_000],
        [7_200_000, 14_400_000, 21_700_000, 28_900_000, 43_300_000, 57_800_000, 65_000_000, 72_200_000],
    ],
    [
        [13_500_000, 27_000_000, 40_500_000, 54_000_000, 81_000_000, 108_000_000, 121_500_000, 135_000_000],
        [15_000_000, 30_000_000, 45_000_000, 60_000_000, 90_000_000, 120_000_000, 135_000_000, 150_000_000],
    ],
    [
        [29_250_000, 58_500_000, 87_750_000, 117_000_000, 175_500_000, 234_000_000, 263_250_000, 292_500_000],
        [32_500_000, 65_000_000, 97_500_000, 130_000_000, 195_000_000, 260_000_000, 292_500_000, 325_000_000],
    ],
];

const HT_BANDWIDTHS_MHZ: [u32; 3] = [20, 40, 80];

/// A modulation and coding scheme as seen by the PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WifiMode {
    /// Modulation family.
    pub class: ModulationClass,
    /// Occupied bandwidth in Hz.
    pub bandwidth_hz: u32,
    /// Data rate in bits per second.
    pub data_rate_bps: u64,
    /// Code rate.
    pub code_rate: CodeRate,
    /// Constellation size (2, 4, 16 or 64).
    pub constellation_size: u16,
    /// HT MCS index, `None` for legacy modes.
    pub mcs: Option<u8>,
    /// Short guard interval.
    pub short_gi: bool,
}

impl WifiMode {
    /// Legacy OFDM mode at 20 MHz for one of 6/9/12/18/24/36/48/54 Mbps.
    pub fn ofdm(rate_mbps: u32) -> Option<WifiMode> {
        let idx = OFDM_RATES_MBPS.iter().position(|r| *r == rate_mbps)?;
        let (constellation_size, code_rate) = OFDM_CODING[idx];
        Some(WifiMode {
            class: ModulationClass::Ofdm,
            bandwidth_hz: 20_000_000,
            data_rate_bps: rate_mbps as u64 * 1_000_000,
            code_rate,
            constellation_size,
            mcs: None,
            short_gi: false,
        })
    }

    /// HT mode for MCS 0-7 at 20, 40 or 80 MHz.
    pub fn ht(mcs: u8, bandwidth_mhz: u32, short_gi: bool) -> Option<WifiMode> {
        let bw_idx = HT_BANDWIDTHS_MHZ.iter().position(|b| *b == bandwidth_mhz)?;
        let rate = *HT_RATES_BPS[bw_idx][short_gi as usize].get(mcs as usize)?;
        let (constellation_size, code_rate) = HT_CODING[mcs as usize];
        Some(WifiMode {
            class: ModulationClass::Ht,
            bandwidth_hz: bandwidth_mhz * 1_000_000,
            data_rate_bps: rate,
            code_rate,
            constellation_size,
            mcs: Some(mcs),
            short_gi,
        })
    }

    /// The legacy 6 Mbps mode used for L-SIG fields.
    pub fn ofdm_header() -> WifiMode {
        WifiMode {
            class: ModulationClass::Ofdm,
            bandwidth_hz: 20_000_000,
            data_rate_bps: 6_000_000,
            code_rate: CodeRate::Half,
            constellation_size: 2,
            mcs: None,
            short_gi: false,
        }
    }

    /// Every mode known to the simulator.
    pub fn all() -> Vec<WifiMode> {
        let legacy = OFDM_RATES_MBPS.iter().filter_map(|r| WifiMode::ofdm(*r));
        let ht = HT_BANDWIDTHS_MHZ.iter().flat_map(|bw| {
            [false, true]
                .into_iter()
                .flat_map(move |sgi| (0..8u8).filter_map(move |mcs| WifiMode::ht(mcs, *bw, sgi)))
        });
        legacy.chain(ht).collect()
    }

    /// Look a mode up by its unique name.
    pub fn from_name(name: &str) -> Option<WifiMode> {
        WifiMode::all().into_iter().find(|m| m.name() == name)
    }

    /// Unique name, e.g. `OfdmRate6Mbps` or `HtMcs7BW40MHzShGi`.
    pub fn name(&self) -> String {
        match (self.class, self.mcs) {
            (ModulationClass::Ht, Some(mcs)) => format!(
                "HtMcs{}BW{}MHz{}",
                mcs,
                self.bandwidth_hz / 1_000_000,
                if self.short_gi { "ShGi" } else { "" }
            ),
            _ => format!("OfdmRate{}Mbps", self.data_rate_bps / 1_000_000),
        }
    }

    /// Coded bit rate (data rate divided by code rate).
    pub fn phy_rate_bps(&self) -> f64 {
        self.data_rate_bps as f64 / self.code_rate.ratio()
    }

    /// Bandwidth in MHz.
    pub fn bandwidth_mhz(&self) -> u32 {
        self.bandwidth_hz / 1_000_000
    }
}

impl std::fmt::Display for WifiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for WifiMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for WifiMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        WifiMode::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown wifi mode: {}", name)))
    }
}

/// PLCP preamble format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiPreamble {
    /// Legacy long preamble.
    Long,
    /// Legacy short preamble.
    Short,
    /// HT mixed format.
    HtMixed,
    /// HT greenfield.
    HtGreenfield,
    /// No preamble: continuation sub-frame of an A-MPDU.
    None,
}

/// Position of a frame inside an A-MPDU burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    /// Stand-alone frame or the last sub-frame of a burst.
    #[default]
    Normal,
    /// Any sub-frame except the last; carries no tail bits.
    AmpduMiddle,
    /// Last sub-frame of a burst.
    AmpduLast,
}

/// Transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TxVector {
    /// Payload mode.
    pub mode: WifiMode,
    /// Index into the tx power range.
    #[serde(default)]
    pub tx_power_level: u8,
    /// Spatial streams.
    #[serde(default = "one")]
    pub nss: u8,
    /// Extension spatial streams.
    #[serde(default)]
    pub ness: u8,
    /// Space-time block coding.
    #[serde(default)]
    pub stbc: bool,
}

fn one() -> u8 {
    1
}

impl TxVector {
    /// Single stream vector at power level zero.
    pub fn new(mode: WifiMode) -> Self {
        TxVector {
            mode,
            tx_power_level: 0,
            nss: 1,
            ness: 0,
            stbc: false,
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// All-ones broadcast address.
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Locally administered unicast address derived from a node index.
    pub fn from_index(index: u32) -> Self {
        let b = index.to_be_bytes();
        MacAddress([0x02, 0x00, b[0], b[1], b[2], b[3]])
    }

    /// Group (broadcast or multicast) address.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// A-MPDU tag attached to each sub-frame of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmpduTag {
    /// Sub-frames remaining in the burst, this one included.
    pub remaining: u8,
}

/// A MAC frame as far as the PHY cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiFrame {
    /// Simulation-wide frame identifier.
    pub id: u64,
    /// Size in bytes, MAC header and FCS included.
    pub size_bytes: u32,
    /// Transmitter address.
    pub source: MacAddress,
    /// Receiver address (addr1).
    pub destination: MacAddress,
    /// MAC duration field (NAV).
    pub duration_field: SimTime,
    /// Present on A-MPDU sub-frames.
    pub ampdu: Option<AmpduTag>,
}

// ============================================================================
// Received Signal
// ============================================================================

/// Received power record for one arrival.
///
/// `powers[k]` is the power on the receiver's k-th sub-channel. The active
/// range is the contiguous span `[active_range_start, active_range_end]` of
/// receiver sub-channel indices the frame occupies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxSignal {
    /// Position within an A-MPDU burst.
    pub packet_type: PacketType,
    /// First occupied sub-channel index.
    pub active_range_start: usize,
    /// Last occupied sub-channel index.
    pub active_range_end: usize,
    /// Power per sub-channel (dBm on the wire, watts inside the accumulator).
    pub powers: Vec<f64>,
}

impl RxSignal {
    /// Number of sub-channels the frame occupies.
    pub fn active_width(&self) -> usize {
        self.active_range_end + 1 - self.active_range_start
    }

    /// Legacy two-digit header slot, `10 * end + start`.
    pub fn header_slot(&self) -> usize {
        10 * self.active_range_end + self.active_range_start
    }

    /// Sum of powers over the active range.
    pub fn active_power(&self) -> f64 {
        self.powers[self.active_range_start..=self.active_range_end].iter().sum()
    }
}

/// Network role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Access point.
    Ap,
    /// Station.
    #[default]
    Sta,
}

impl NodeRole {
    /// Label used in metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeRole::Ap => "ap",
            NodeRole::Sta => "sta",
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Why a PHY dropped an arriving frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// PHY was transmitting, receiving or switching.
    Busy,
    /// Primary sub-channel power below the energy detection threshold.
    BelowEdThreshold,
    /// Preamble detection failed.
    PreambleSync,
    /// Addressed to another station.
    AddressMismatch,
    /// Frame occupies fewer sub-channels than the receiver listens on.
    TooNarrow,
    /// Preamble-less sub-frame with no burst in progress.
    AmpduNoBurst,
    /// First sub-frame of the burst failed.
    AmpduFirstFailed,
    /// Reception aborted by a local transmission.
    TxPreempted,
}

impl DropReason {
    /// Label used in metrics and traces.
    pub fn as_label(&self) -> &'static str {
        match self {
            DropReason::Busy => "busy",
            DropReason::BelowEdThreshold => "below_ed_threshold",
            DropReason::PreambleSync => "preamble_sync",
            DropReason::AddressMismatch => "address_mismatch",
            DropReason::TooNarrow => "too_narrow",
            DropReason::AmpduNoBurst => "ampdu_no_burst",
            DropReason::AmpduFirstFailed => "ampdu_first_failed",
            DropReason::TxPreempted => "tx_preempted",
        }
    }
}

/// Monitor-mode sniffer record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSniff {
    /// Frame identifier.
    pub frame_id: u64,
    /// Operating frequency in MHz.
    pub frequency_mhz: u32,
    /// Primary channel id.
    pub channel: u16,
    /// Data rate in units of 500 kbps.
    pub rate_500kbps: u32,
    /// Short preamble in use.
    pub short_preamble: bool,
    /// Signal power in dBm (reception only).
    pub signal_dbm: Option<f64>,
    /// Noise power in dBm (reception only).
    pub noise_dbm: Option<f64>,
}

/// Upward notifications from a PHY to its agent.
#[derive(Debug, Clone, PartialEq)]
pub enum PhyNotification {
    /// Synchronized to a frame.
    RxBegin {
        /// Frame identifier.
        frame_id: u64,
        /// Remaining air time.
        duration: SimTime,
    },
    /// Frame decoded.
    RxEndOk {
        /// The frame.
        frame: WifiFrame,
        /// Linear SNR at the start of the frame.
        snr: f64,
        /// Payload mode.
        mode: WifiMode,
        /// Preamble format.
        preamble: WifiPreamble,
    },
    /// Frame failed to decode.
    RxEndError {
        /// The frame.
        frame: WifiFrame,
        /// Linear SNR at the start of the frame.
        snr: f64,
    },
    /// Frame was not received at all.
    RxDrop {
        /// The frame.
        frame: WifiFrame,
        /// Drop cause.
        reason: DropReason,
    },
    /// Sniffer copy of a received frame.
    MonitorSniffRx(MonitorSniff),
    /// Sniffer copy of a transmitted frame.
    MonitorSniffTx(MonitorSniff),
    /// Transmission started.
    TxBegin {
        /// The frame.
        frame: WifiFrame,
        /// Air time.
        duration: SimTime,
    },
    /// Virtual carrier sense set by an overheard frame.
    NavStart {
        /// NAV duration from now.
        duration: SimTime,
    },
    /// Medium sensed busy.
    CcaBusyStart {
        /// Busy duration from now.
        duration: SimTime,
    },
    /// Channel switch started.
    ChannelSwitching {
        /// Switch delay.
        duration: SimTime,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip() {
        for mode in WifiMode::all() {
            assert_eq!(WifiMode::from_name(&mode.name()), Some(mode), "mode {}", mode);
        }
        assert_eq!(WifiMode::all().len(), 8 + 48);
    }

    #[test]
    fn test_ht_rates() {
        let m = WifiMode::ht(7, 40, true).unwrap();
        assert_eq!(m.data_rate_bps, 150_000_000);
        assert_eq!(m.name(), "HtMcs7BW40MHzShGi");
        assert!((m.phy_rate_bps() - 180_000_000.0).abs() < 1.0);
        assert!(WifiMode::ht(8, 20, false).is_none());
        assert!(WifiMode::ht(0, 160, false).is_none());
    }

    #[test]
    fn test_mac_group_bit() {
        assert!(MacAddress::BROADCAST.is_group());
        assert!(!MacAddress::from_index(7).is_group());
        assert_eq!(MacAddress::from_index(7).to_string(), "02:00:00:00:00:07");
    }

    #[test]
    fn test_rx_signal_range() {
        let s = RxSignal {
            packet_type: PacketType::Normal,
            active_range_start: 1,
            active_range_end: 2,
            powers: vec![1.0, 2.0, 3.0, 4.0],
        };
        assert_eq!(s.active_width(), 2);
        assert_eq!(s.header_slot(), 21);
        assert_eq!(s.active_power(), 5.0);
    }
}
