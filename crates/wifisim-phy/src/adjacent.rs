//! Measured adjacent-channel leakage.
//!
//! Attenuation of a sender's power as seen on 20 MHz sub-channels just
//! outside its active span. Offsets count sub-channels away from the span
//! edge: 1 is the sub-channel right next to it.

use crate::channel_bonding::Band;
use crate::error::{PhyError, PhyResult};

/// Adjacent sub-channels hit by a transmission, split by side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacentOffsets {
    /// Offsets above the sender's highest active sub-channel.
    pub high: Vec<u32>,
    /// Offsets below the sender's lowest active sub-channel.
    pub low: Vec<u32>,
}

impl AdjacentOffsets {
    /// Total number of adjacent sub-channels.
    pub fn count(&self) -> usize {
        self.high.len() + self.low.len()
    }

    /// True when nothing is adjacent.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Attenuation in dB for a sender of `sender_width_mhz` leaking onto `offsets`.
pub fn adjacent_attenuation_db(band: Band, sender_width_mhz: u32, offsets: &AdjacentOffsets) -> PhyResult<f64> {
    let mut high = offsets.high.clone();
    let mut low = offsets.low.clone();
    high.sort_unstable();
    low.sort_unstable();
    let five = band == Band::FiveGhz;
    let one_side = |pattern: &[u32]| (high == pattern && low.is_empty()) || (low == pattern && high.is_empty());

    let attenuation = match (sender_width_mhz, offsets.count()) {
        (20, 1) => Some(if five { -23.72 } else { -23.77 }),
        (20, 2) => Some(if five { -20.72 } else { -20.77 }),

        (40, 1) if one_side(&[1]) => Some(-25.02),
        (40, 1) if one_side(&[2]) => Some(if five { -35.61 } else { -36.99 }),
        (40, 2) if one_side(&[1, 2]) => Some(if five { -24.65 } else { -24.75 }),
        (40, 2) if high == [1] && low == [1] => Some(-22.02),

        (80, 1) if one_side(&[1]) => Some(-26.88),
        (80, 1) if one_side(&[2]) => Some(-31.79),
        (80, 1) if one_side(&[3]) => Some(-36.73),
        (80, 1) if one_side(&[4]) => Some(-43.01),
        (80, 2) if one_side(&[1, 2]) => Some(-25.67),
        (80, 2) if one_side(&[2, 3]) => Some(-30.58),
        (80, 2) if one_side(&[3, 4]) => Some(-35.81),
        (80, 3) if one_side(&[1, 2, 3]) => Some(-25.34),
        (80, 3) if one_side(&[2, 3, 4]) => Some(-30.34),
        (80, 4) => Some(-25.27),
        _ => None,
    };

    attenuation.ok_or_else(|| PhyError::UnsupportedAdjacent {
        band: band.as_label(),
        bandwidth_mhz: sender_width_mhz,
        offsets: high.iter().chain(low.iter()).copied().collect(),
    })
}
