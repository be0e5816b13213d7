//! Packet error rate over an interference window.
//!
//! Both strategies walk the same chunks: every interval between two
//! interference steps is intersected with the frame's phase plan, and each
//! piece is scored with the SNR in force during it and the mode of its phase.

use crate::config::CodingType;
use crate::error_rate::{ErrorRateModel, NistErrorRateModel};
use crate::interference::{calculate_snr, NiChange, RxEvent};
use crate::lut::{size_class, PerLookupTables, PerTableKey};
use crate::plcp::{mode_to_mcs, phase_plan, SYMBOL_US};
use std::sync::Arc;
use wifisim_common::{SimTime, WifiMode};

/// Leading part of a frame covered by the sync-time PER estimate.
pub const PREAMBLE_WINDOW: SimTime = SimTime::from_micros(44);

/// How chunk error rates are obtained.
#[derive(Debug)]
pub enum PerStrategy {
    /// Closed-form model; chunk success rates multiply.
    ClosedForm(Box<dyn ErrorRateModel>),
    /// Table lookup; the weakest chunk dominates.
    Lookup {
        /// Shared table cache.
        tables: Arc<PerLookupTables>,
        /// Code family used to pick tables.
        coding: CodingType,
    },
}

/// PER calculator used by the interference accumulator.
#[derive(Debug)]
pub struct PerEngine {
    strategy: PerStrategy,
}

/// A piece of the frame decoded at one SNR with one mode.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    mode: WifiMode,
    snr: f64,
    duration: SimTime,
}

impl PerEngine {
    /// Engine with an explicit strategy.
    pub fn new(strategy: PerStrategy) -> Self {
        PerEngine { strategy }
    }

    /// Closed-form engine with the NIST error model.
    pub fn closed_form() -> Self {
        Self::new(PerStrategy::ClosedForm(Box::new(NistErrorRateModel)))
    }

    /// Table lookup engine.
    pub fn lookup(tables: Arc<PerLookupTables>, coding: CodingType) -> Self {
        Self::new(PerStrategy::Lookup { tables, coding })
    }

    /// Strategy in use.
    pub fn strategy(&self) -> &PerStrategy {
        &self.strategy
    }

    /// PER of the whole frame.
    pub fn frame_per(&self, event: &RxEvent, window: &[NiChange], noise_figure: f64) -> f64 {
        1.0 - self.success_rate(event, window, noise_figure, None)
    }

    /// PER of the leading part of the frame.
    pub fn preamble_per(&self, event: &RxEvent, window: &[NiChange], noise_figure: f64) -> f64 {
        1.0 - self.success_rate(event, window, noise_figure, Some(PREAMBLE_WINDOW))
    }

    fn success_rate(&self, event: &RxEvent, window: &[NiChange], noise_figure: f64, limit: Option<SimTime>) -> f64 {
        let chunks = chunks(event, window, noise_figure, limit);
        match &self.strategy {
            PerStrategy::ClosedForm(model) => chunks
                .iter()
                .map(|c| {
                    if c.duration == SimTime::ZERO {
                        return 1.0;
                    }
                    let nbits = (c.mode.phy_rate_bps() * c.duration.as_secs_f64()) as u64;
                    model.chunk_success_rate(&c.mode, c.snr, nbits)
                })
                .product(),
            PerStrategy::Lookup { tables, coding } => {
                let total_symbols = event.duration().as_micros_f64() / SYMBOL_US;
                if total_symbols <= 0.0 {
                    return 1.0;
                }
                let size = size_class(*coding, event.size_bytes);
                chunks.iter().fold(1.0f64, |psr, c| {
                    let key = PerTableKey { coding: *coding, size_class: size, mcs: mode_to_mcs(&c.mode) };
                    let per = tables.per(key, c.snr);
                    let symbols = c.duration.as_micros_f64() / SYMBOL_US;
                    psr.min((1.0 - per).powf(symbols / total_symbols))
                })
            }
        }
    }
}

/// Split the window into scored chunks.
///
/// With a `limit`, the walk stops after the first interval that ends more
/// than `limit` past the frame start.
fn chunks(event: &RxEvent, window: &[NiChange], noise_figure: f64, limit: Option<SimTime>) -> Vec<Chunk> {
    let Some(first) = window.first() else {
        return Vec::new();
    };
    let plan = phase_plan(event.start, event.end, &event.tx_vector, event.preamble);
    let signal = event.rx_power_w();

    let mut out = Vec::new();
    let mut previous = first.time;
    let mut interference = first.delta;
    for step in &window[1..] {
        let current = step.time;
        debug_assert!(current >= previous, "interference window out of order");
        for phase in &plan {
            let Some(mode) = phase.mode else { continue };
            let start = previous.max(phase.start);
            let end = current.min(phase.end);
            if end > start {
                out.push(Chunk {
                    mode,
                    snr: calculate_snr(signal, interference, noise_figure, &mode),
                    duration: end - start,
                });
            }
        }
        interference += step.delta;
        previous = current;
        if limit.is_some_and(|l| current - first.time > l) {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interference::{InterferenceHelper, BOLTZMANN};
    use crate::lut::PerTable;
    use wifisim_common::{PacketType, RxSignal, TxVector, WifiPreamble};

    fn floor_w() -> f64 {
        BOLTZMANN * 290.0 * 20e6
    }

    fn event_with(helper: &mut InterferenceHelper, snr: f64, mcs: u8) -> RxEvent {
        let tx = TxVector::new(WifiMode::ht(mcs, 20, false).unwrap());
        let duration = crate::plcp::tx_duration(1000, &tx, WifiPreamble::HtMixed, PacketType::Normal);
        helper.add(
            SimTime::ZERO,
            duration,
            1000,
            tx,
            WifiPreamble::HtMixed,
            RxSignal {
                packet_type: PacketType::Normal,
                active_range_start: 0,
                active_range_end: 0,
                powers: vec![snr * floor_w()],
            },
        )
    }

    fn per_with_interference(interference_w: f64) -> f64 {
        let mut helper = InterferenceHelper::new(1, 1.0, PerEngine::closed_form());
        let event = event_with(&mut helper, 10f64.powf(1.2), 2);
        helper.notify_rx_start();
        helper.add(
            SimTime::from_micros(40),
            SimTime::from_micros(60),
            200,
            TxVector::new(WifiMode::ofdm(6).unwrap()),
            WifiPreamble::Long,
            RxSignal {
                packet_type: PacketType::Normal,
                active_range_start: 0,
                active_range_end: 0,
                powers: vec![interference_w],
            },
        );
        helper.calculate_snr_per(&event).per
    }

    #[test]
    fn test_per_monotonic_in_interference() {
        let mut last = per_with_interference(0.0);
        for k in 1..=12 {
            let per = per_with_interference(floor_w() * 10f64.powf(k as f64 / 4.0 - 1.0));
            assert!(per >= last, "PER fell from {} to {} as interference grew", last, per);
            last = per;
        }
        assert!(last > 0.99, "strong interference should destroy the frame, PER {}", last);
    }

    #[test]
    fn test_clean_frame_high_snr() {
        let mut helper = InterferenceHelper::new(1, 1.0, PerEngine::closed_form());
        let event = event_with(&mut helper, 1e4, 0);
        let result = helper.calculate_snr_per(&event);
        assert!(result.per < 1e-6);
        assert!((result.snr - 1e4).abs() < 1e-6 * 1e4);
    }

    #[test]
    fn test_chunks_split_at_phase_boundaries() {
        let mut helper = InterferenceHelper::new(1, 1.0, PerEngine::closed_form());
        let event = event_with(&mut helper, 100.0, 0);
        let (_, window) = helper.noise_interference(&event);
        let pieces = chunks(&event, &window, 1.0, None);
        // L-SIG, HT-SIG and payload; preamble and training never fail
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].duration, SimTime::from_micros(4));
        assert_eq!(pieces[1].duration, SimTime::from_micros(8));
        let covered: u64 = pieces.iter().map(|c| c.duration.as_nanos()).sum();
        assert_eq!(covered, (event.duration() - SimTime::from_micros(16 + 8)).as_nanos());
    }

    #[test]
    fn test_preamble_window_stops_early() {
        let mut helper = InterferenceHelper::new(1, 1.0, PerEngine::closed_form());
        let event = event_with(&mut helper, 100.0, 0);
        let window = vec![
            NiChange { time: SimTime::ZERO, delta: 0.0 },
            NiChange { time: SimTime::from_micros(30), delta: 0.0 },
            NiChange { time: SimTime::from_micros(50), delta: 0.0 },
            NiChange { time: SimTime::from_micros(80), delta: 0.0 },
            NiChange { time: event.end, delta: 0.0 },
        ];
        let full = chunks(&event, &window, 1.0, None);
        let early = chunks(&event, &window, 1.0, Some(PREAMBLE_WINDOW));
        let early_end: u64 = early.iter().map(|c| c.duration.as_nanos()).sum();
        assert!(early.len() < full.len());
        // walk stops after the interval ending at 50 µs
        assert_eq!(early_end, SimTime::from_micros(50 - 16 - 8).as_nanos());
    }

    #[test]
    fn test_lookup_takes_weakest_chunk() {
        let tables = Arc::new(PerLookupTables::default());
        let key = |mcs| PerTableKey { coding: CodingType::Bcc, size_class: 1458, mcs };
        tables.insert(key(0), PerTable::from_rows(vec![(0.0, 0.5), (20.0, 0.0)]));
        tables.insert(key(3), PerTable::from_rows(vec![(0.0, 0.5), (20.0, 0.2)]));

        let engine = PerEngine::lookup(tables, CodingType::Bcc);
        let mut helper = InterferenceHelper::new(1, 1.0, engine);
        let tx = TxVector::new(WifiMode::ht(3, 20, false).unwrap());
        let event = helper.add(
            SimTime::ZERO,
            SimTime::from_micros(400),
            1000,
            tx,
            WifiPreamble::HtMixed,
            RxSignal {
                packet_type: PacketType::Normal,
                active_range_start: 0,
                active_range_end: 0,
                powers: vec![100.5 * floor_w()],
            },
        );
        let per = helper.calculate_snr_per(&event).per;
        // payload spans 400 - 36 µs of 400 µs at PER 0.2
        let expected = 1.0 - 0.8f64.powf(364.0 / 400.0);
        assert!((per - expected).abs() < 1e-9, "per {} expected {}", per, expected);
    }

    #[test]
    fn test_zero_length_window_is_clean() {
        let engine = PerEngine::closed_form();
        let mut helper = InterferenceHelper::new(1, 1.0, PerEngine::closed_form());
        let event = event_with(&mut helper, 1.0, 0);
        assert_eq!(engine.frame_per(&event, &[], 1.0), 0.0);
    }
}
