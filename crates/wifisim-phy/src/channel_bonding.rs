//! Channel sets and bonded-channel bookkeeping.
//!
//! Channel sets are written as decimal digit pairs, two digits per 20 MHz
//! sub-channel: `3640` is {36, 40} and `203` is {2, 3} (a leading zero is
//! implied for an odd number of digits).

use crate::error::{PhyError, PhyResult};
use serde::Serialize;

/// Operating band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Band {
    /// 2.4 GHz ISM band.
    TwoPointFourGhz,
    /// 5 GHz band.
    FiveGhz,
}

impl Band {
    /// Band of an operating frequency.
    pub fn from_frequency(frequency_mhz: u32) -> Band {
        if frequency_mhz < 3000 {
            Band::TwoPointFourGhz
        } else {
            Band::FiveGhz
        }
    }

    /// Distance between neighbouring 20 MHz sub-channels, in channel ids.
    pub fn spacing(&self) -> u16 {
        match self {
            Band::TwoPointFourGhz => 1,
            Band::FiveGhz => 4,
        }
    }

    /// Short label for logs and errors.
    pub fn as_label(&self) -> &'static str {
        match self {
            Band::TwoPointFourGhz => "2.4GHz",
            Band::FiveGhz => "5GHz",
        }
    }
}

/// Decode a digit-pair channel encoding.
pub fn decode_channels(encoding: u64) -> PhyResult<Vec<u16>> {
    if encoding == 0 {
        return Err(PhyError::BadChannelEncoding {
            encoding,
            reason: "empty channel set".to_string(),
        });
    }
    let mut digits = encoding.to_string();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    let channels = digits
        .as_bytes()
        .chunks(2)
        .map(|pair| u16::from(pair[0] - b'0') * 10 + u16::from(pair[1] - b'0'))
        .collect::<Vec<_>>();
    if channels.contains(&0) {
        return Err(PhyError::BadChannelEncoding {
            encoding,
            reason: "channel id 0".to_string(),
        });
    }
    Ok(channels)
}

/// Encode channel ids as digit pairs.
pub fn encode_channels(channels: &[u16]) -> u64 {
    channels.iter().fold(0u64, |acc, &ch| acc * 100 + u64::from(ch))
}

/// A radio's channel set, the contiguous part of it in use, and the primary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelBonding {
    band: Band,
    channels: Vec<u16>,
    active_start: usize,
    active_end: usize,
    primary: u16,
}

impl ChannelBonding {
    /// Build and validate a channel configuration.
    pub fn new(frequency_mhz: u32, channel_number: u64, active_channels: u64, primary: u16) -> PhyResult<Self> {
        let band = Band::from_frequency(frequency_mhz);
        let channels = decode_channels(channel_number)?;
        let active = decode_channels(active_channels)?;

        for set in [(&channels, channel_number), (&active, active_channels)] {
            let spaced = set.0.windows(2).all(|w| w[1] > w[0] && w[1] - w[0] == band.spacing());
            if !spaced {
                return Err(PhyError::BadChannelEncoding {
                    encoding: set.1,
                    reason: format!("channels must ascend by {} in the {} band", band.spacing(), band.as_label()),
                });
            }
        }

        let end_of = |start: usize| start + active.len();
        let active_start = match channels.iter().position(|&ch| ch == active[0]) {
            Some(start) if end_of(start) <= channels.len() && channels[start..end_of(start)] == active[..] => start,
            _ => return Err(PhyError::ActiveNotContiguous { active, channels }),
        };
        if !active.contains(&primary) {
            return Err(PhyError::PrimaryNotActive { primary, active });
        }

        Ok(ChannelBonding {
            band,
            active_end: active_start + active.len() - 1,
            active_start,
            channels,
            primary,
        })
    }

    /// Operating band.
    pub fn band(&self) -> Band {
        self.band
    }

    /// Every sub-channel id the radio spans.
    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    /// Sub-channel ids in use.
    pub fn active_channels(&self) -> &[u16] {
        &self.channels[self.active_start..=self.active_end]
    }

    /// Inclusive index range of the active channels within the channel set.
    pub fn active_range(&self) -> (usize, usize) {
        (self.active_start, self.active_end)
    }

    /// Primary channel id.
    pub fn primary(&self) -> u16 {
        self.primary
    }

    /// Index of the primary channel within the channel set.
    pub fn primary_index(&self) -> usize {
        self.channels.iter().position(|&ch| ch == self.primary).unwrap_or(self.active_start)
    }

    /// Index of a channel id within the channel set.
    pub fn index_of(&self, channel: u16) -> Option<usize> {
        self.channels.iter().position(|&ch| ch == channel)
    }

    /// Number of sub-channels in the channel set.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of active sub-channels.
    pub fn num_active(&self) -> usize {
        self.active_end - self.active_start + 1
    }

    /// Width of the active span in MHz.
    pub fn width_mhz(&self) -> u32 {
        20 * self.num_active() as u32
    }

    /// Digit-pair encoding of the channel set.
    pub fn channel_number(&self) -> u64 {
        encode_channels(&self.channels)
    }

    /// Digit-pair encoding of the active set.
    pub fn active_encoding(&self) -> u64 {
        encode_channels(self.active_channels())
    }
}
