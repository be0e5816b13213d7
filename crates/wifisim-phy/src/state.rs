//! PHY state tracking.
//!
//! The state is derived from end times rather than stored, so a state whose
//! end time has passed falls back to the next one down without a callback.
//! Priority when several overlap: TX, RX, SWITCHING, CCA_BUSY, IDLE.

use serde::Serialize;
use std::fmt;
use wifisim_common::SimTime;

/// Externally visible PHY state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhyState {
    /// Medium idle.
    Idle,
    /// Energy above the CCA threshold.
    CcaBusy,
    /// Synchronized to a frame.
    Rx,
    /// Transmitting.
    Tx,
    /// Retuning.
    Switching,
}

impl fmt::Display for PhyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhyState::Idle => "IDLE",
            PhyState::CcaBusy => "CCA_BUSY",
            PhyState::Rx => "RX",
            PhyState::Tx => "TX",
            PhyState::Switching => "SWITCHING",
        };
        f.write_str(s)
    }
}

/// End times of every busy period a PHY can be in.
#[derive(Debug, Clone, Default)]
pub struct PhyStateTracker {
    tx_end: SimTime,
    rx_end: Option<SimTime>,
    switch_end: SimTime,
    cca_end: SimTime,
}

impl PhyStateTracker {
    /// Tracker starting in IDLE.
    pub fn new() -> Self {
        Self::default()
    }

    /// State at `now`.
    pub fn state(&self, now: SimTime) -> PhyState {
        if self.tx_end > now {
            PhyState::Tx
        } else if self.rx_end.is_some() {
            PhyState::Rx
        } else if self.switch_end > now {
            PhyState::Switching
        } else if self.cca_end > now {
            PhyState::CcaBusy
        } else {
            PhyState::Idle
        }
    }

    /// Whether the PHY is in `state` at `now`.
    pub fn is(&self, state: PhyState, now: SimTime) -> bool {
        self.state(now) == state
    }

    /// Time until the current busy period ends; zero when idle.
    pub fn delay_until_idle(&self, now: SimTime) -> SimTime {
        match self.state(now) {
            PhyState::Tx => self.tx_end - now,
            PhyState::Rx => self.rx_end.map_or(SimTime::ZERO, |end| end - now),
            PhyState::Switching => self.switch_end - now,
            PhyState::CcaBusy => self.cca_end - now,
            PhyState::Idle => SimTime::ZERO,
        }
    }

    /// End of the current CCA busy period.
    pub fn cca_end(&self) -> SimTime {
        self.cca_end
    }

    /// Enter TX for `duration`.
    pub fn switch_to_tx(&mut self, now: SimTime, duration: SimTime) {
        debug_assert!(!self.is(PhyState::Tx, now), "already transmitting");
        self.rx_end = None;
        self.tx_end = now + duration;
    }

    /// Enter RX for `duration`.
    pub fn switch_to_rx(&mut self, now: SimTime, duration: SimTime) {
        debug_assert!(
            matches!(self.state(now), PhyState::Idle | PhyState::CcaBusy),
            "RX entered from {}",
            self.state(now)
        );
        self.rx_end = Some(now + duration);
    }

    /// Leave RX, at the end of the frame or on an abort.
    pub fn end_rx(&mut self) {
        self.rx_end = None;
    }

    /// Enter SWITCHING for `duration`, cancelling any reception.
    pub fn switch_to_switching(&mut self, now: SimTime, duration: SimTime) {
        debug_assert!(!self.is(PhyState::Tx, now), "channel switch while transmitting");
        self.rx_end = None;
        self.cca_end = self.cca_end.min(now);
        self.switch_end = now + duration;
    }

    /// Extend CCA busy to at least `now + duration`.
    ///
    /// Returns the busy time added beyond what was already announced.
    pub fn switch_maybe_to_cca_busy(&mut self, now: SimTime, duration: SimTime) -> SimTime {
        let end = now + duration;
        let added = end - self.cca_end.max(now);
        self.cca_end = self.cca_end.max(end);
        added
    }
}
