//! Property constant definitions.
//!
//! This module contains all property definitions organized by category.
//!
//! ## Maintenance Guidelines
//!
//! 1. **Description is user-facing** - The description string is displayed by
//!    the `wifisim properties` command. Include valid values and units there.
//!
//! 2. **Keys mirror struct fields** - The key after the namespace is the serde
//!    field name of the struct the namespace is resolved into (`phy` into
//!    `PhyConfig`, `traffic` into `TrafficConfig`, `simulation` into
//!    `SimulationConfig`). Defaults must equal the struct's `Default`.
//!
//! ## Property Categories
//!
//! ### Node Properties
//! - **PHY** - Thresholds, gains, power levels, tuning and PER selection
//! - **Traffic** - What the node's traffic agent sends and when
//!
//! ### Simulation Properties
//! - **Simulation** - Seed and duration

use super::types::{PropertyDef, PropertyDefault, PropertyScope, ValueKind};

use PropertyDefault::{Bool, Float, Integer, Null};
use PropertyScope::{Node, Simulation};

// ============================================================================
// PHY Properties (Node scope)
// ============================================================================

/// Energy detection threshold on the primary sub-channel.
pub const PHY_ED_THRESHOLD_DBM: PropertyDef = PropertyDef::new(
    "phy/ed_threshold_dbm",
    "Energy detection threshold on the primary sub-channel. Arrivals below it are dropped without synchronizing",
    Float(-96.0),
    ValueKind::Float,
    Node,
)
.with_unit("dBm");

/// CCA mode 1 threshold.
pub const PHY_CCA_THRESHOLD_DBM: PropertyDef = PropertyDef::new(
    "phy/cca_threshold_dbm",
    "CCA mode 1 threshold. Unsynchronized energy above it marks the medium busy",
    Float(-99.0),
    ValueKind::Float,
    Node,
)
.with_unit("dBm");

/// Transmit antenna gain, added to the radiated power.
pub const PHY_TX_GAIN_DB: PropertyDef = PropertyDef::new(
    "phy/tx_gain_db",
    "Transmit antenna gain, added to the radiated power",
    Float(1.0),
    ValueKind::Float,
    Node,
)
.with_unit("dB");

/// Receive antenna gain, added to every arriving power.
pub const PHY_RX_GAIN_DB: PropertyDef = PropertyDef::new(
    "phy/rx_gain_db",
    "Receive antenna gain, added to every arriving power",
    Float(1.0),
    ValueKind::Float,
    Node,
)
.with_unit("dB");

/// Transmit power of level 0.
pub const PHY_TX_POWER_START_DBM: PropertyDef = PropertyDef::new(
    "phy/tx_power_start_dbm",
    "Transmit power of level 0",
    Float(16.0206),
    ValueKind::Float,
    Node,
)
.with_unit("dBm")
.with_aliases(&["phy/tx_power_dbm"]);

/// Transmit power of the highest level.
pub const PHY_TX_POWER_END_DBM: PropertyDef = PropertyDef::new(
    "phy/tx_power_end_dbm",
    "Transmit power of the highest level",
    Float(16.0206),
    ValueKind::Float,
    Node,
)
.with_unit("dBm");

/// Number of evenly spaced power levels between start and end, inclusive.
pub const PHY_TX_POWER_LEVELS: PropertyDef = PropertyDef::new(
    "phy/tx_power_levels",
    "Number of evenly spaced power levels between start and end, inclusive. With 1 every level transmits at the start power",
    Integer(1),
    ValueKind::Integer,
    Node,
);

/// Receiver noise figure applied to the thermal noise floor.
pub const PHY_NOISE_FIGURE_DB: PropertyDef = PropertyDef::new(
    "phy/noise_figure_db",
    "Receiver noise figure applied to the thermal noise floor",
    Float(7.0),
    ValueKind::Float,
    Node,
)
.with_unit("dB");

/// Time spent in SWITCHING after a channel change.
pub const PHY_CHANNEL_SWITCH_DELAY_US: PropertyDef = PropertyDef::new(
    "phy/channel_switch_delay_us",
    "Time spent in SWITCHING after a channel change",
    Integer(250),
    ValueKind::Integer,
    Node,
)
.with_unit("us");

/// Operating frequency.
pub const PHY_FREQUENCY_MHZ: PropertyDef = PropertyDef::new(
    "phy/frequency_mhz",
    "Operating frequency. Below 3000 MHz the 2.4 GHz channel ids (spacing 1) apply, otherwise the 5 GHz ids (spacing 4)",
    Integer(2407),
    ValueKind::Integer,
    Node,
)
.with_unit("MHz");

/// Operating channel width.
pub const PHY_CHANNEL_WIDTH_MHZ: PropertyDef = PropertyDef::new(
    "phy/channel_width_mhz",
    "Operating channel width",
    Integer(20),
    ValueKind::Integer,
    Node,
)
.with_unit("MHz");

/// Channel set, two decimal digits per 20 MHz sub-channel (e.g.
pub const PHY_CHANNEL_NUMBER: PropertyDef = PropertyDef::new(
    "phy/channel_number",
    "Channel set, two decimal digits per 20 MHz sub-channel (e.g. 3640 for channels 36 and 40, 203 for 2 and 3)",
    Integer(5),
    ValueKind::Integer,
    Node,
);

/// Contiguous part of the channel set the PHY listens on, same encoding as channel_number.
pub const PHY_ACTIVE_CHANNELS: PropertyDef = PropertyDef::new(
    "phy/active_channels",
    "Contiguous part of the channel set the PHY listens on, same encoding as channel_number",
    Integer(5),
    ValueKind::Integer,
    Node,
);

/// Primary sub-channel id; must be one of the active channels.
pub const PHY_PRIMARY_CHANNEL: PropertyDef = PropertyDef::new(
    "phy/primary_channel",
    "Primary sub-channel id; must be one of the active channels",
    Integer(5),
    ValueKind::Integer,
    Node,
);

/// Deliver per sub-channel powers with co- and adjacent-channel overlap.
pub const PHY_USE_NEW_MODEL: PropertyDef = PropertyDef::new(
    "phy/use_new_model",
    "Deliver per sub-channel powers with co- and adjacent-channel overlap. When false only same-channel receivers hear a frame",
    Bool(true),
    ValueKind::Bool,
    Node,
);

/// Drop frames addressed to other stations at the PHY and start NAV instead.
pub const PHY_CHECK_ADDRESS_AT_PHY: PropertyDef = PropertyDef::new(
    "phy/check_address_at_phy",
    "Drop frames addressed to other stations at the PHY and start NAV instead",
    Bool(true),
    ValueKind::Bool,
    Node,
);

/// Take packet error rates from PER tables instead of the closed-form error model.
pub const PHY_USE_LUT_FOR_PER: PropertyDef = PropertyDef::new(
    "phy/use_lut_for_per",
    "Take packet error rates from PER tables instead of the closed-form error model",
    Bool(true),
    ValueKind::Bool,
    Node,
);

/// Code family used to pick PER tables.
pub const PHY_CODING: PropertyDef = PropertyDef::new(
    "phy/coding",
    "Code family used to pick PER tables: BCC or LDPC",
    PropertyDefault::String("BCC"),
    ValueKind::String,
    Node,
);

/// Number of transmit antennas.
pub const PHY_TX_ANTENNAS: PropertyDef = PropertyDef::new(
    "phy/tx_antennas",
    "Number of transmit antennas",
    Integer(1),
    ValueKind::Integer,
    Node,
);

/// Number of receive antennas.
pub const PHY_RX_ANTENNAS: PropertyDef = PropertyDef::new(
    "phy/rx_antennas",
    "Number of receive antennas",
    Integer(1),
    ValueKind::Integer,
    Node,
);

/// Short guard interval support.
pub const PHY_SHORT_GUARD_INTERVAL: PropertyDef = PropertyDef::new(
    "phy/short_guard_interval",
    "Short guard interval support",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// LDPC support.
pub const PHY_LDPC: PropertyDef = PropertyDef::new(
    "phy/ldpc",
    "LDPC support",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// Space-time block coding support.
pub const PHY_STBC: PropertyDef = PropertyDef::new(
    "phy/stbc",
    "Space-time block coding support",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// HT greenfield preamble support.
pub const PHY_GREENFIELD: PropertyDef = PropertyDef::new(
    "phy/greenfield",
    "HT greenfield preamble support",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// Channel bonding support.
pub const PHY_CHANNEL_BONDING: PropertyDef = PropertyDef::new(
    "phy/channel_bonding",
    "Channel bonding support",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// Directory holding the PER tables ({BCC|LDPC}{32|1458}mcs{0-7}.txt).
pub const PHY_LUT_DIR: PropertyDef = PropertyDef::new(
    "phy/lut_dir",
    "Directory holding the PER tables ({BCC|LDPC}{32|1458}mcs{0-7}.txt). Relative paths resolve against the scenario file",
    PropertyDefault::String("per_tables"),
    ValueKind::String,
    Node,
);

// ============================================================================
// Traffic Properties (Node scope)
// ============================================================================

/// Whether the node's traffic agent sends frames.
pub const TRAFFIC_ENABLED: PropertyDef = PropertyDef::new(
    "traffic/enabled",
    "Whether the node's traffic agent sends frames",
    Bool(false),
    ValueKind::Bool,
    Node,
);

/// Delay before the first transmission.
pub const TRAFFIC_STARTUP_S: PropertyDef = PropertyDef::new(
    "traffic/startup_s",
    "Delay before the first transmission",
    Float(0.0),
    ValueKind::Float,
    Node,
)
.with_unit("s");

/// Standard deviation of the startup delay (normal distribution, clamped at zero).
pub const TRAFFIC_STARTUP_JITTER_S: PropertyDef = PropertyDef::new(
    "traffic/startup_jitter_s",
    "Standard deviation of the startup delay (normal distribution, clamped at zero)",
    Float(0.0),
    ValueKind::Float,
    Node,
)
.with_unit("s");

/// Gap between the end of one transmission and the start of the next.
pub const TRAFFIC_INTERVAL_S: PropertyDef = PropertyDef::new(
    "traffic/interval_s",
    "Gap between the end of one transmission and the start of the next",
    Float(0.01),
    ValueKind::Float,
    Node,
)
.with_unit("s");

/// Standard deviation of the gap (normal distribution, clamped at zero).
pub const TRAFFIC_INTERVAL_JITTER_S: PropertyDef = PropertyDef::new(
    "traffic/interval_jitter_s",
    "Standard deviation of the gap (normal distribution, clamped at zero)",
    Float(0.0),
    ValueKind::Float,
    Node,
)
.with_unit("s");

/// Stop after this many frames or bursts.
pub const TRAFFIC_MESSAGE_COUNT: PropertyDef = PropertyDef::new(
    "traffic/message_count",
    "Stop after this many frames or bursts. null for unlimited",
    Null,
    ValueKind::Integer,
    Node,
);

/// Stop sending at this time.
pub const TRAFFIC_SHUTDOWN_S: PropertyDef = PropertyDef::new(
    "traffic/shutdown_s",
    "Stop sending at this time. null to send until the end",
    Null,
    ValueKind::Float,
    Node,
)
.with_unit("s");

/// Frame size including MAC header and FCS.
pub const TRAFFIC_FRAME_SIZE: PropertyDef = PropertyDef::new(
    "traffic/frame_size",
    "Frame size including MAC header and FCS",
    Integer(1500),
    ValueKind::Integer,
    Node,
)
.with_unit("bytes");

/// Name of the destination node.
pub const TRAFFIC_DESTINATION: PropertyDef = PropertyDef::new(
    "traffic/destination",
    "Name of the destination node. null for broadcast",
    Null,
    ValueKind::String,
    Node,
);

/// Payload mode name, e.g.
pub const TRAFFIC_MODE: PropertyDef = PropertyDef::new(
    "traffic/mode",
    "Payload mode name, e.g. OfdmRate6Mbps, HtMcs7BW20MHz or HtMcs7BW40MHzShGi",
    PropertyDefault::String("OfdmRate6Mbps"),
    ValueKind::String,
    Node,
);

/// Transmit power level index.
pub const TRAFFIC_TX_POWER_LEVEL: PropertyDef = PropertyDef::new(
    "traffic/tx_power_level",
    "Transmit power level index",
    Integer(0),
    ValueKind::Integer,
    Node,
);

/// Preamble of single frames and first sub-frames.
pub const TRAFFIC_PREAMBLE: PropertyDef = PropertyDef::new(
    "traffic/preamble",
    "Preamble of single frames and first sub-frames: long, short, ht_mixed or ht_greenfield",
    PropertyDefault::String("long"),
    ValueKind::String,
    Node,
);

/// Sub-frames per A-MPDU burst.
pub const TRAFFIC_AMPDU_SIZE: PropertyDef = PropertyDef::new(
    "traffic/ampdu_size",
    "Sub-frames per A-MPDU burst. 1 sends plain frames; larger bursts need an HT preamble",
    Integer(1),
    ValueKind::Integer,
    Node,
);

/// MAC duration field carried by each frame, read by overhearing stations as NAV.
pub const TRAFFIC_DURATION_FIELD_US: PropertyDef = PropertyDef::new(
    "traffic/duration_field_us",
    "MAC duration field carried by each frame, read by overhearing stations as NAV",
    Integer(0),
    ValueKind::Integer,
    Node,
)
.with_unit("us");

/// One-off retune.
pub const TRAFFIC_CHANNEL_SWITCH: PropertyDef = PropertyDef::new(
    "traffic/channel_switch",
    "One-off retune: {at_s, channel_number, active_channels, primary_channel}. null for none",
    Null,
    ValueKind::Map,
    Node,
);

// ============================================================================
// Simulation Properties (Simulation scope)
// ============================================================================

/// Scenario seed.
pub const SIMULATION_SEED: PropertyDef = PropertyDef::new(
    "simulation/seed",
    "Scenario seed. Every radio and random model derives its own stream from it",
    Integer(0),
    ValueKind::Integer,
    Simulation,
);

/// Simulated time to run.
pub const SIMULATION_DURATION_S: PropertyDef = PropertyDef::new(
    "simulation/duration_s",
    "Simulated time to run",
    Float(10.0),
    ValueKind::Float,
    Simulation,
)
.with_unit("s");
