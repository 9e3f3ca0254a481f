//! Exact timestamp arithmetic on rational time bases.
//!
//! All math is done in `i128` so that `ts * num * den` products of 64-bit
//! timestamps and 32-bit rationals never overflow. Denominators are expected
//! to be positive, which holds for every time base FFmpeg hands out.

use std::cmp::Ordering;

use ffmpeg_next::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Zero,
    /// Toward negative infinity.
    Down,
    /// Toward positive infinity.
    Up,
    /// To nearest, halfway cases away from zero.
    NearInf,
}

fn div_round(n: i128, d: i128, rounding: Rounding) -> i128 {
    debug_assert!(d > 0);
    match rounding {
        Rounding::Zero => n / d,
        Rounding::Down => {
            if n >= 0 {
                n / d
            } else {
                -((-n + d - 1) / d)
            }
        }
        Rounding::Up => {
            if n >= 0 {
                (n + d - 1) / d
            } else {
                -(-n / d)
            }
        }
        Rounding::NearInf => {
            let half = d / 2;
            if n >= 0 {
                (n + half) / d
            } else {
                -((-n + half) / d)
            }
        }
    }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

/// Computes `a * b / c` exactly with the requested rounding.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rounding: Rounding) -> i64 {
    let (b, c) = if c < 0 {
        (-(b as i128), -(c as i128))
    } else {
        (b as i128, c as i128)
    };
    if c == 0 {
        return 0;
    }
    saturate(div_round(a as i128 * b, c, rounding))
}

/// Converts `ts` from time base `from` to time base `to`, rounding to the
/// nearest tick with halfway cases away from zero.
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    let b = from.numerator() as i128 * to.denominator() as i128;
    let c = to.numerator() as i128 * from.denominator() as i128;
    if c <= 0 {
        return 0;
    }
    saturate(div_round(ts as i128 * b, c, Rounding::NearInf))
}

/// Orders two timestamps expressed in different time bases without any
/// floating point.
pub fn compare(a: i64, tb_a: Rational, b: i64, tb_b: Rational) -> Ordering {
    let lhs = a as i128 * tb_a.numerator() as i128 * tb_b.denominator() as i128;
    let rhs = b as i128 * tb_b.numerator() as i128 * tb_a.denominator() as i128;
    lhs.cmp(&rhs)
}

/// Number of output samples a resampler may produce for `input` new samples
/// given `delay` samples (in input rate) still buffered inside it.
pub fn output_capacity(delay: i64, input: usize, in_rate: u32, out_rate: u32) -> usize {
    let total = delay.max(0).saturating_add(input as i64);
    rescale_rnd(total, out_rate as i64, in_rate as i64, Rounding::Up).max(0) as usize
}

/// Seconds represented by `ts` in `time_base`, for logging and summaries.
pub fn to_seconds(ts: i64, time_base: Rational) -> f64 {
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_audio_to_millis() {
        let out = rescale(100, Rational::new(1, 48000), Rational::new(1, 1000));
        // 100 * 1000 / 48000 = 2.083
        assert_eq!(out, 2);
    }

    #[test]
    fn test_rescale_rounds_half_away_from_zero() {
        let half = Rational::new(1, 2);
        let one = Rational::new(1, 1);
        assert_eq!(rescale(1, half, one), 1);
        assert_eq!(rescale(3, half, one), 2);
        assert_eq!(rescale(-1, half, one), -1);
        assert_eq!(rescale(-3, half, one), -2);
    }

    #[test]
    fn test_rescale_error_does_not_drift() {
        let from = Rational::new(1, 48000);
        let to = Rational::new(1, 1000);
        let mut previous = i64::MIN;
        for i in 0..10_000i64 {
            let pts = i * 1024;
            let out = rescale(pts, from, to);
            let exact = pts as f64 * 1000.0 / 48000.0;
            assert!(
                (out as f64 - exact).abs() <= 0.5,
                "packet {} off by more than half a tick",
                i
            );
            assert!(out >= previous);
            previous = out;
        }
        // 9999 * 1024 / 48 = 213312.0
        assert_eq!(previous, 213_312);
    }

    #[test]
    fn test_rescale_to_mpegts_clock() {
        let out = rescale(25, Rational::new(1, 25), Rational::new(1, 90000));
        assert_eq!(out, 90000);
        let out = rescale(1024, Rational::new(1, 44100), Rational::new(1, 90000));
        // 1024 * 90000 / 44100 = 2089.79
        assert_eq!(out, 2090);
    }

    #[test]
    fn test_compare_across_time_bases() {
        let audio = Rational::new(1, 48000);
        let video = Rational::new(1, 25);
        assert_eq!(compare(1920, audio, 1, video), Ordering::Equal);
        assert_eq!(compare(1919, audio, 1, video), Ordering::Less);
        assert_eq!(compare(1921, audio, 1, video), Ordering::Greater);
        assert_eq!(compare(0, audio, 0, video), Ordering::Equal);
    }

    #[test]
    fn test_rescale_rnd_modes() {
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Zero), 3);
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::Up), 4);
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Up), -3);
        assert_eq!(rescale_rnd(-7, 1, 2, Rounding::Down), -4);
        assert_eq!(rescale_rnd(7, 1, 2, Rounding::NearInf), 4);
    }

    #[test]
    fn test_output_capacity_rounds_up() {
        // 1024 samples at 44100 -> 48000 is 1114.56
        assert_eq!(output_capacity(0, 1024, 44100, 48000), 1115);
        // buffered delay grows the request
        assert_eq!(output_capacity(16, 1024, 44100, 48000), 1132);
        assert_eq!(output_capacity(0, 1024, 48000, 48000), 1024);
    }
}
