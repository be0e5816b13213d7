use std::path::PathBuf;
use thiserror::Error;

/// Result type for PHY configuration and table loading.
pub type PhyResult<T> = Result<T, PhyError>;

/// Errors raised while configuring a PHY or loading its tables.
#[derive(Debug, Error)]
pub enum PhyError {
    /// A channel encoding does not decode to an ascending, evenly spaced set.
    #[error("bad channel encoding {encoding}: {reason}")]
    BadChannelEncoding {
        /// The offending encoded value.
        encoding: u64,
        /// What is wrong with it.
        reason: String,
    },

    /// The primary channel is not one of the active channels.
    #[error("primary channel {primary} is not in the active set {active:?}")]
    PrimaryNotActive {
        /// Primary channel id.
        primary: u16,
        /// Decoded active channel ids.
        active: Vec<u16>,
    },

    /// The active channels are not a contiguous part of the channel set.
    #[error("active channels {active:?} are not a contiguous part of {channels:?}")]
    ActiveNotContiguous {
        /// Decoded active channel ids.
        active: Vec<u16>,
        /// Decoded full channel set.
        channels: Vec<u16>,
    },

    /// A PER table file could not be read.
    #[error("failed to read PER table {path}: {source}")]
    LutIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No adjacent-channel attenuation is tabulated for this configuration.
    #[error("no adjacent-channel attenuation for {band} band, {bandwidth_mhz} MHz sender, offsets {offsets:?}")]
    UnsupportedAdjacent {
        /// Operating band label.
        band: &'static str,
        /// Sender bandwidth.
        bandwidth_mhz: u32,
        /// Offsets of the adjacent sub-channels, in channel spacings.
        offsets: Vec<u32>,
    },
}
