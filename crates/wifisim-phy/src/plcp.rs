//! PLCP field durations and the per-frame phase plan.

use wifisim_common::{ModulationClass, PacketType, SimTime, TxVector, WifiMode, WifiPreamble};

/// Legacy preamble (STF + LTF) duration at 20 MHz and above (µs).
pub const PREAMBLE_US: f64 = 16.0;
/// L-SIG duration (µs).
pub const LSIG_US: f64 = 4.0;
/// HT-SIG duration (µs).
pub const HTSIG_US: f64 = 8.0;
/// OFDM symbol with long guard interval (µs).
pub const SYMBOL_US: f64 = 4.0;
/// OFDM symbol with short guard interval (µs).
pub const SYMBOL_SHORT_GI_US: f64 = 3.6;

const SERVICE_BITS: f64 = 16.0;
const TAIL_BITS: f64 = 6.0;

/// Preamble duration in µs.
pub fn preamble_us(mode: &WifiMode, preamble: WifiPreamble) -> f64 {
    if preamble == WifiPreamble::None {
        return 0.0;
    }
    match mode.bandwidth_mhz() {
        5 => 64.0,
        10 => 32.0,
        _ => PREAMBLE_US,
    }
}

/// L-SIG duration in µs.
pub fn lsig_us(preamble: WifiPreamble) -> f64 {
    match preamble {
        WifiPreamble::HtGreenfield | WifiPreamble::None => 0.0,
        _ => LSIG_US,
    }
}

/// HT-SIG duration in µs.
pub fn htsig_us(preamble: WifiPreamble) -> f64 {
    match preamble {
        WifiPreamble::HtMixed | WifiPreamble::HtGreenfield => HTSIG_US,
        _ => 0.0,
    }
}

/// HT training field duration in µs.
pub fn training_us(preamble: WifiPreamble, tx_vector: &TxVector) -> f64 {
    let ltfs = |n: u8| if n < 3 { f64::from(n) } else { 4.0 };
    let data_ltfs = ltfs(tx_vector.nss);
    let extension_ltfs = ltfs(tx_vector.ness);
    match preamble {
        WifiPreamble::HtMixed => 4.0 + 4.0 * data_ltfs + 4.0 * extension_ltfs,
        WifiPreamble::HtGreenfield => 4.0 * data_ltfs + 4.0 * extension_ltfs,
        _ => 0.0,
    }
}

/// Mode used to decode the L-SIG field.
pub fn header_mode(_payload: &WifiMode, _preamble: WifiPreamble) -> WifiMode {
    WifiMode::ofdm_header()
}

/// Mode used to decode the HT-SIG field.
pub fn htsig_mode(payload: &WifiMode) -> WifiMode {
    WifiMode::ht(0, payload.bandwidth_mhz(), false).unwrap_or_else(WifiMode::ofdm_header)
}

/// Symbol duration for a mode in µs.
pub fn symbol_us(mode: &WifiMode) -> f64 {
    if mode.class == ModulationClass::Ht && mode.short_gi {
        SYMBOL_SHORT_GI_US
    } else {
        SYMBOL_US
    }
}

/// Payload duration in µs.
///
/// Middle sub-frames of an A-MPDU are not padded to a symbol boundary and
/// carry no tail bits; frames without a preamble carry no SERVICE field.
pub fn payload_us(size_bytes: u32, tx_vector: &TxVector, preamble: WifiPreamble, packet_type: PacketType) -> f64 {
    let symbol = symbol_us(&tx_vector.mode);
    let bits_per_symbol =
        (tx_vector.mode.data_rate_bps as f64 * symbol / 1e6).round() * f64::from(tx_vector.nss.max(1));
    let middle = packet_type == PacketType::AmpduMiddle;

    let mut bits = 8.0 * f64::from(size_bytes);
    if preamble != WifiPreamble::None {
        bits += SERVICE_BITS;
    }
    if !middle {
        bits += TAIL_BITS;
    }

    let symbols = if middle {
        bits / bits_per_symbol
    } else if tx_vector.stbc {
        2.0 * (bits / (2.0 * bits_per_symbol)).ceil()
    } else {
        (bits / bits_per_symbol).ceil()
    };
    symbols * symbol
}

/// Total air time of a frame.
pub fn tx_duration(size_bytes: u32, tx_vector: &TxVector, preamble: WifiPreamble, packet_type: PacketType) -> SimTime {
    let us = preamble_us(&tx_vector.mode, preamble)
        + lsig_us(preamble)
        + htsig_us(preamble)
        + training_us(preamble, tx_vector)
        + payload_us(size_bytes, tx_vector, preamble, packet_type);
    SimTime::from_micros_f64(us)
}

/// Part of a frame decoded with one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Legacy preamble; never errors.
    Preamble,
    /// L-SIG field.
    LegacySignal,
    /// HT-SIG field.
    HtSignal,
    /// HT training symbols; never errors.
    Training,
    /// Data symbols.
    Payload,
}

/// One time slice of a frame and the mode its bits are sent with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    /// Which field this is.
    pub kind: PhaseKind,
    /// Start time.
    pub start: SimTime,
    /// End time.
    pub end: SimTime,
    /// Mode whose error rate applies, `None` for fields that cannot fail.
    pub mode: Option<WifiMode>,
}

/// Ordered, non-empty phases of a frame starting at `start` and ending at `end`.
pub fn phase_plan(start: SimTime, end: SimTime, tx_vector: &TxVector, preamble: WifiPreamble) -> Vec<Phase> {
    let payload = tx_vector.mode;
    let boundaries = [
        (PhaseKind::Preamble, preamble_us(&payload, preamble), None),
        (PhaseKind::LegacySignal, lsig_us(preamble), Some(header_mode(&payload, preamble))),
        (PhaseKind::HtSignal, htsig_us(preamble), Some(htsig_mode(&payload))),
        (PhaseKind::Training, training_us(preamble, tx_vector), None),
    ];

    let mut phases = Vec::with_capacity(5);
    let mut offset_us = 0.0;
    let mut cursor = start;
    for (kind, us, mode) in boundaries {
        offset_us += us;
        let next = (start + SimTime::from_micros_f64(offset_us)).min(end);
        if next > cursor {
            phases.push(Phase { kind, start: cursor, end: next, mode });
            cursor = next;
        }
    }
    if end > cursor {
        phases.push(Phase { kind: PhaseKind::Payload, start: cursor, end, mode: Some(payload) });
    }
    phases
}

/// HT MCS index used to pick a PER table for a mode.
///
/// Legacy modes map by data rate onto the HT rate grid; unknown rates use MCS 0.
pub fn mode_to_mcs(mode: &WifiMode) -> u8 {
    if let Some(mcs) = mode.mcs {
        return mcs;
    }
    match mode.data_rate_bps {
        6_500_000 | 7_200_000 | 13_500_000 | 15_000_000 => 0,
        13_000_000 | 14_400_000 | 27_000_000 | 30_000_000 => 1,
        19_500_000 | 21_700_000 | 40_500_000 | 45_000_000 => 2,
        26_000_000 | 28_900_000 | 54_000_000 | 60_000_000 => 3,
        39_000_000 | 43_300_000 | 81_000_000 | 90_000_000 => 4,
        52_000_000 | 57_800_000 | 108_000_000 | 120_000_000 => 5,
        58_500_000 | 121_500_000 => 6,
        65_000_000 | 72_200_000 | 135_000_000 | 150_000_000 => 7,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ht_vector(mcs: u8, bw: u32) -> TxVector {
        TxVector::new(WifiMode::ht(mcs, bw, false).unwrap())
    }

    #[test]
    fn test_legacy_duration() {
        // 1000 bytes at 6 Mbps: ceil((16 + 8000 + 6) / 24) = 335 symbols
        let tx = TxVector::new(WifiMode::ofdm(6).unwrap());
        let d = tx_duration(1000, &tx, WifiPreamble::Long, PacketType::Normal);
        assert_eq!(d, SimTime::from_micros(16 + 4 + 335 * 4));
    }

    #[test]
    fn test_ht_mixed_duration() {
        // MCS7 20 MHz: 260 bits per symbol, ceil((16 + 12000 + 6) / 260) = 47
        let tx = ht_vector(7, 20);
        let d = tx_duration(1500, &tx, WifiPreamble::HtMixed, PacketType::Normal);
        assert_eq!(d, SimTime::from_micros(16 + 4 + 8 + 8 + 47 * 4));
    }

    #[test]
    fn test_greenfield_skips_lsig() {
        let tx = ht_vector(0, 20);
        assert_eq!(lsig_us(WifiPreamble::HtGreenfield), 0.0);
        assert_eq!(training_us(WifiPreamble::HtGreenfield, &tx), 4.0);
        assert_eq!(training_us(WifiPreamble::HtMixed, &tx), 8.0);
    }

    #[test]
    fn test_training_ltf_count() {
        let mut tx = ht_vector(0, 20);
        tx.nss = 3;
        assert_eq!(training_us(WifiPreamble::HtMixed, &tx), 4.0 + 16.0);
        tx.ness = 1;
        assert_eq!(training_us(WifiPreamble::HtMixed, &tx), 4.0 + 16.0 + 4.0);
    }

    #[test]
    fn test_ampdu_middle_not_padded() {
        let tx = ht_vector(0, 20);
        let us = payload_us(14, &tx, WifiPreamble::None, PacketType::AmpduMiddle);
        assert!((us - 112.0 / 26.0 * 4.0).abs() < 1e-9, "fractional symbols expected, got {}", us);
        let last = payload_us(13, &tx, WifiPreamble::None, PacketType::AmpduLast);
        assert_eq!(last, 20.0);
    }

    #[test]
    fn test_short_gi_symbol() {
        let tx = TxVector::new(WifiMode::ht(7, 20, true).unwrap());
        let us = payload_us(100, &tx, WifiPreamble::HtMixed, PacketType::Normal);
        let symbols = (us / 3.6).round();
        assert!((us - symbols * 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_stbc_even_symbols() {
        let mut tx = ht_vector(0, 20);
        tx.stbc = true;
        let us = payload_us(1, &tx, WifiPreamble::HtMixed, PacketType::Normal);
        assert_eq!(us, 8.0, "one symbol of data rounds up to two under STBC");
    }

    #[test]
    fn test_phase_plan_ht_mixed() {
        let tx = ht_vector(3, 40);
        let start = SimTime::from_micros(100);
        let end = start + tx_duration(500, &tx, WifiPreamble::HtMixed, PacketType::Normal);
        let plan = phase_plan(start, end, &tx, WifiPreamble::HtMixed);
        let kinds: Vec<_> = plan.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PhaseKind::Preamble, PhaseKind::LegacySignal, PhaseKind::HtSignal, PhaseKind::Training, PhaseKind::Payload]
        );
        assert_eq!(plan[1].mode, Some(WifiMode::ofdm_header()));
        assert_eq!(plan[2].mode, WifiMode::ht(0, 40, false));
        assert_eq!(plan[2].start, start + SimTime::from_micros(20));
        assert_eq!(plan[4].end, end);
        assert!(plan.windows(2).all(|w| w[0].end == w[1].start), "phases must tile the frame");
    }

    #[test]
    fn test_phase_plan_legacy_and_none() {
        let tx = TxVector::new(WifiMode::ofdm(54).unwrap());
        let end = tx_duration(200, &tx, WifiPreamble::Long, PacketType::Normal);
        let plan = phase_plan(SimTime::ZERO, end, &tx, WifiPreamble::Long);
        assert_eq!(plan.len(), 3, "legacy frames have preamble, L-SIG and payload");

        let plan = phase_plan(SimTime::ZERO, SimTime::from_micros(40), &tx, WifiPreamble::None);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].kind, PhaseKind::Payload);
    }

    #[test]
    fn test_mode_to_mcs() {
        assert_eq!(mode_to_mcs(&WifiMode::ht(5, 40, true).unwrap()), 5);
        assert_eq!(mode_to_mcs(&WifiMode::ofdm(54).unwrap()), 3);
        assert_eq!(mode_to_mcs(&WifiMode::ofdm(6).unwrap()), 0);
    }
}
