//! Per-sub-channel interference accounting.
//!
//! Every arrival adds a `+P` step at its start and a `-P` step at its end to
//! the ledger of each sub-channel it reaches. Steps older than the last
//! reception are folded into a per-sub-channel baseline.

use crate::per::PerEngine;
use wifisim_common::{PacketType, RxSignal, SimTime, TxVector, WifiMode, WifiPreamble};

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.3803e-23;
/// Reference noise temperature (K).
pub const NOISE_TEMPERATURE_K: f64 = 290.0;

/// A step in aggregate interference power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiChange {
    /// When the step happens.
    pub time: SimTime,
    /// Power change in watts.
    pub delta: f64,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    change: NiChange,
    owner: u64,
}

/// One arrival as tracked by the accumulator.
#[derive(Debug, Clone)]
pub struct RxEvent {
    /// Accumulator-assigned id.
    pub id: u64,
    /// Frame size in bytes.
    pub size_bytes: u32,
    /// Transmission parameters.
    pub tx_vector: TxVector,
    /// Preamble format.
    pub preamble: WifiPreamble,
    /// A-MPDU position.
    pub packet_type: PacketType,
    /// Arrival time.
    pub start: SimTime,
    /// End of the frame.
    pub end: SimTime,
    /// Received power per sub-channel, in watts.
    pub signal: RxSignal,
}

impl RxEvent {
    /// Air time.
    pub fn duration(&self) -> SimTime {
        self.end - self.start
    }

    /// Payload mode.
    pub fn mode(&self) -> WifiMode {
        self.tx_vector.mode
    }

    /// Received power summed over the active sub-channels (W).
    pub fn rx_power_w(&self) -> f64 {
        self.signal.active_power()
    }
}

/// SNR and PER of a completed reception.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnrPer {
    /// Linear SNR at the start of the frame.
    pub snr: f64,
    /// Packet error rate over the whole frame.
    pub per: f64,
}

/// `signal / (noise floor + interference)` for a mode's bandwidth.
pub fn calculate_snr(signal_w: f64, noise_interference_w: f64, noise_figure: f64, mode: &WifiMode) -> f64 {
    let thermal = BOLTZMANN * NOISE_TEMPERATURE_K * f64::from(mode.bandwidth_hz);
    signal_w / (noise_figure * thermal + noise_interference_w)
}

/// Interference ledgers for every sub-channel of one radio.
#[derive(Debug)]
pub struct InterferenceHelper {
    ledgers: Vec<Vec<LedgerEntry>>,
    first_powers: Vec<f64>,
    rxing: bool,
    next_id: u64,
    noise_figure: f64,
    engine: PerEngine,
}

impl InterferenceHelper {
    /// Accumulator for `num_channels` sub-channels.
    pub fn new(num_channels: usize, noise_figure: f64, engine: PerEngine) -> Self {
        InterferenceHelper {
            ledgers: vec![Vec::new(); num_channels],
            first_powers: vec![0.0; num_channels],
            rxing: false,
            next_id: 0,
            noise_figure,
            engine,
        }
    }

    /// Linear noise figure.
    pub fn noise_figure(&self) -> f64 {
        self.noise_figure
    }

    /// PER engine in use.
    pub fn engine(&self) -> &PerEngine {
        &self.engine
    }

    /// Number of sub-channels tracked.
    pub fn num_channels(&self) -> usize {
        self.ledgers.len()
    }

    /// Baseline power of a sub-channel (W).
    pub fn first_power(&self, pos: usize) -> f64 {
        self.first_powers.get(pos).copied().unwrap_or(0.0)
    }

    /// Steps currently held for a sub-channel.
    pub fn ledger(&self, pos: usize) -> Vec<NiChange> {
        self.ledgers.get(pos).map_or_else(Vec::new, |l| l.iter().map(|e| e.change).collect())
    }

    /// True between `notify_rx_start` and `notify_rx_end`.
    pub fn is_rxing(&self) -> bool {
        self.rxing
    }

    /// Register an arrival at `now` lasting `duration`.
    pub fn add(
        &mut self,
        now: SimTime,
        duration: SimTime,
        size_bytes: u32,
        tx_vector: TxVector,
        preamble: WifiPreamble,
        signal: RxSignal,
    ) -> RxEvent {
        let event = RxEvent {
            id: self.next_id,
            size_bytes,
            tx_vector,
            preamble,
            packet_type: signal.packet_type,
            start: now,
            end: now + duration,
            signal,
        };
        self.next_id += 1;

        if event.signal.powers.len() > self.ledgers.len() {
            self.ledgers.resize(event.signal.powers.len(), Vec::new());
            self.first_powers.resize(event.signal.powers.len(), 0.0);
        }

        for (pos, &power) in event.signal.powers.iter().enumerate() {
            if !self.rxing {
                let ledger = &mut self.ledgers[pos];
                let past = ledger.partition_point(|e| e.change.time <= now);
                self.first_powers[pos] += ledger.drain(..past).map(|e| e.change.delta).sum::<f64>();
            }
            self.insert(pos, NiChange { time: event.start, delta: power }, event.id);
            self.insert(pos, NiChange { time: event.end, delta: -power }, event.id);
        }
        tracing::trace!(event = event.id, start = %event.start, end = %event.end, "interference added");
        event
    }

    fn insert(&mut self, pos: usize, change: NiChange, owner: u64) {
        let ledger = &mut self.ledgers[pos];
        let at = ledger.partition_point(|e| e.change.time <= change.time);
        ledger.insert(at, LedgerEntry { change, owner });
    }

    /// Time from `now` until the power on sub-channel `pos` drops below `threshold_w`.
    pub fn energy_duration(&self, threshold_w: f64, pos: usize, now: SimTime) -> SimTime {
        self.energy_duration_from(threshold_w, pos, now)
    }

    /// Like [`energy_duration`](Self::energy_duration) but measured from an arbitrary time.
    pub fn energy_duration_from(&self, threshold_w: f64, pos: usize, from: SimTime) -> SimTime {
        let Some(ledger) = self.ledgers.get(pos) else {
            return SimTime::ZERO;
        };
        let mut power = self.first_powers[pos];
        let mut end = from;
        for entry in ledger {
            power += entry.change.delta;
            end = entry.change.time;
            if end < from {
                continue;
            }
            if power < threshold_w {
                break;
            }
        }
        end - from
    }

    /// Interference seen by `event` and the merged steps during it.
    ///
    /// The window starts with an absolute entry at the event start holding the
    /// initial interference, continues with the summed steps of the event's
    /// active sub-channels strictly inside the frame, and ends with a zero step
    /// at the event end. The event's own steps are excluded.
    pub fn noise_interference(&self, event: &RxEvent) -> (f64, Vec<NiChange>) {
        let (a, b) = (event.signal.active_range_start, event.signal.active_range_end);
        let mut initial = 0.0;
        let mut steps: Vec<NiChange> = Vec::new();

        for pos in a..=b {
            let Some(ledger) = self.ledgers.get(pos) else {
                continue;
            };
            initial += self.first_powers[pos];
            for entry in ledger.iter().filter(|e| e.owner != event.id) {
                if entry.change.time <= event.start {
                    initial += entry.change.delta;
                } else if entry.change.time < event.end {
                    steps.push(entry.change);
                }
            }
        }

        steps.sort_by_key(|c| c.time);
        let mut window = Vec::with_capacity(steps.len() + 2);
        window.push(NiChange { time: event.start, delta: initial });
        for step in steps {
            let merge = window.len() > 1;
            match window.last_mut() {
                Some(last) if merge && last.time == step.time => last.delta += step.delta,
                _ => window.push(step),
            }
        }
        window.push(NiChange { time: event.end, delta: 0.0 });
        (initial, window)
    }

    /// SNR for a signal against the thermal floor plus `noise_interference_w`.
    pub fn calculate_snr(&self, signal_w: f64, noise_interference_w: f64, mode: &WifiMode) -> f64 {
        calculate_snr(signal_w, noise_interference_w, self.noise_figure, mode)
    }

    /// SNR at the frame start and PER over the whole frame.
    pub fn calculate_snr_per(&self, event: &RxEvent) -> SnrPer {
        let (initial, window) = self.noise_interference(event);
        let snr = self.calculate_snr(event.rx_power_w(), initial, &event.mode());
        let per = self.engine.frame_per(event, &window, self.noise_figure);
        SnrPer { snr, per }
    }

    /// PER over the leading part of the frame, used at sync time.
    pub fn preamble_per(&self, event: &RxEvent) -> f64 {
        let (_, window) = self.noise_interference(event);
        self.engine.preamble_per(event, &window, self.noise_figure)
    }

    /// Drop every ledger and baseline.
    pub fn erase_events(&mut self) {
        for ledger in &mut self.ledgers {
            ledger.clear();
        }
        self.first_powers.iter_mut().for_each(|p| *p = 0.0);
        self.rxing = false;
        tracing::trace!("interference ledgers erased");
    }

    /// Erase and track a different number of sub-channels.
    pub fn reset(&mut self, num_channels: usize) {
        self.erase_events();
        self.ledgers.resize(num_channels, Vec::new());
        self.first_powers.resize(num_channels, 0.0);
    }

    /// A reception started; stop folding old steps.
    pub fn notify_rx_start(&mut self) {
        self.rxing = true;
    }

    /// The reception ended.
    pub fn notify_rx_end(&mut self) {
        self.rxing = false;
    }
}
