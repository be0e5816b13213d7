//! Closed-form chunk error model.

use wifisim_common::{CodeRate, WifiMode};

/// Probability that a chunk of bits sent with one mode survives.
pub trait ErrorRateModel: Send + std::fmt::Debug {
    /// Success probability of `nbits` bits at linear SNR `snr`.
    fn chunk_success_rate(&self, mode: &WifiMode, snr: f64, nbits: u64) -> f64;
}

/// Complementary error function (Abramowitz & Stegun 7.1.26).
pub fn erfc(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * x.abs());
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let result = poly * (-x * x).exp();
    if x >= 0.0 {
        result
    } else {
        2.0 - result
    }
}

/// Uncoded BER curves with a union bound for the convolutional code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NistErrorRateModel;

impl NistErrorRateModel {
    /// Uncoded bit error rate for a constellation.
    pub fn uncoded_ber(constellation_size: u16, snr: f64) -> f64 {
        match constellation_size {
            2 => 0.5 * erfc(snr.sqrt()),
            4 => 0.5 * erfc((snr / 2.0).sqrt()),
            16 => 0.75 * 0.5 * erfc((snr / 10.0).sqrt()),
            _ => 7.0 / 12.0 * 0.5 * erfc((snr / 42.0).sqrt()),
        }
    }

    /// Coded first-event error probability for a raw bit error rate.
    pub fn coded_pe(ber: f64, code_rate: CodeRate) -> f64 {
        let d = (4.0 * ber * (1.0 - ber)).sqrt();
        let series = |first_power: i32, coefficients: &[f64]| -> f64 {
            coefficients
                .iter()
                .enumerate()
                .map(|(i, c)| c * d.powi(first_power + i as i32))
                .sum()
        };
        match code_rate {
            CodeRate::Half => {
                let coefficients = [36.0, 211.0, 1404.0, 11633.0, 77433.0, 502690.0, 3322763.0, 21292910.0, 134365911.0];
                // only even powers of D appear for rate 1/2
                0.5 * coefficients
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c * d.powi(10 + 2 * i as i32))
                    .sum::<f64>()
            }
            CodeRate::TwoThirds => {
                1.0 / (2.0 * 2.0)
                    * series(6, &[3.0, 70.0, 285.0, 1276.0, 6160.0, 27128.0, 117019.0, 498860.0, 2103891.0, 8784123.0])
            }
            CodeRate::ThreeQuarters => {
                1.0 / (2.0 * 3.0)
                    * series(
                        5,
                        &[42.0, 201.0, 1492.0, 10469.0, 62935.0, 379644.0, 2253373.0, 13073811.0, 75152755.0, 428005675.0],
                    )
            }
            CodeRate::FiveSixths => {
                1.0 / (2.0 * 5.0)
                    * series(
                        4,
                        &[
                            92.0,
                            528.0,
                            8694.0,
                            79453.0,
                            792114.0,
                            7375573.0,
                            67884974.0,
                            610875423.0,
                            5427275376.0,
                            47664215639.0,
                        ],
                    )
            }
        }
    }
}

impl ErrorRateModel for NistErrorRateModel {
    fn chunk_success_rate(&self, mode: &WifiMode, snr: f64, nbits: u64) -> f64 {
        let ber = Self::uncoded_ber(mode.constellation_size, snr);
        let pe = Self::coded_pe(ber, mode.code_rate).min(1.0);
        (1.0 - pe).powf(nbits as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erfc_reference_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!((erfc(1.0) - 0.157299207).abs() < 1e-6);
        assert!((erfc(-1.0) - 1.842700793).abs() < 1e-6);
        assert!(erfc(6.0) < 1e-15);
    }

    #[test]
    fn test_ber_decreases_with_snr() {
        for size in [2u16, 4, 16, 64] {
            let low = NistErrorRateModel::uncoded_ber(size, 1.0);
            let high = NistErrorRateModel::uncoded_ber(size, 100.0);
            assert!(high < low, "{}-point BER should fall with SNR", size);
        }
    }

    #[test]
    fn test_success_rate_extremes() {
        let model = NistErrorRateModel;
        let mode = WifiMode::ht(0, 20, false).unwrap();
        assert!(model.chunk_success_rate(&mode, 1000.0, 8000) > 0.999);
        assert!(model.chunk_success_rate(&mode, 0.01, 8000) < 1e-6);
        assert_eq!(model.chunk_success_rate(&mode, 0.01, 0), 1.0, "zero bits always succeed");
    }

    #[test]
    fn test_higher_mcs_needs_more_snr() {
        let model = NistErrorRateModel;
        let snr = 10f64.powf(15.0 / 10.0);
        let robust = model.chunk_success_rate(&WifiMode::ht(0, 20, false).unwrap(), snr, 8000);
        let fragile = model.chunk_success_rate(&WifiMode::ht(7, 20, false).unwrap(), snr, 8000);
        assert!(robust > fragile);
    }
}
