//! Formatting helpers for receiver frequencies and rates.

/// Format a frequency in hertz as a human-readable MHz string.
///
/// ```
/// use rsplib_core::format_freq_mhz;
///
/// assert_eq!(format_freq_mhz(14_074_000.0), "14.074000 MHz");
/// assert_eq!(format_freq_mhz(1_090_000_000.0), "1090.000000 MHz");
/// ```
pub fn format_freq_mhz(freq_hz: f64) -> String {
    let mhz = freq_hz / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

/// Format a sample rate in hertz as mega-samples per second.
///
/// ```
/// use rsplib_core::format_sample_rate;
///
/// assert_eq!(format_sample_rate(2_000_000.0), "2.000 MS/s");
/// assert_eq!(format_sample_rate(62_500.0), "0.063 MS/s");
/// ```
pub fn format_sample_rate(rate_hz: f64) -> String {
    let msps = rate_hz / 1_000_000.0;
    format!("{msps:.3} MS/s")
}

/// Convert a power ratio to decibels relative to full scale of a 16-bit
/// I/Q pair.
///
/// Returns `f32::NEG_INFINITY` for zero power.
pub fn power_to_dbfs(mean_power: f32) -> f32 {
    const FULL_SCALE: f32 = 32768.0 * 32768.0 * 2.0;
    if mean_power <= 0.0 {
        return f32::NEG_INFINITY;
    }
    10.0 * (mean_power / FULL_SCALE).log10()
}
