//! Media time utilities.
//!
//! All timestamps exchanged between Splice components are microseconds
//! relative to the start of the media item (or of the output file for
//! muxer-level values).

/// Microseconds per second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Number of PCM frames in one AAC-LC access unit.
pub const AAC_LC_ACCESS_UNIT_SAMPLES: u32 = 1024;

/// Duration in microseconds of `sample_count` samples at `sample_rate` Hz.
///
/// Returns 0 when the sample rate is unknown (0).
pub fn sample_count_to_duration_us(sample_count: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    sample_count.saturating_mul(MICROS_PER_SEC) / sample_rate as u64
}

/// Convert microseconds to seconds.
pub fn us_to_secs(us: u64) -> f64 {
    us as f64 / MICROS_PER_SEC as f64
}

/// Convert seconds to microseconds, clamping negative input to zero.
pub fn secs_to_us(secs: f64) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (secs * MICROS_PER_SEC as f64).round() as u64
}

/// Convert microseconds to whole milliseconds.
pub fn us_to_ms(us: u64) -> u64 {
    us / 1_000
}

/// Format microseconds the way ffmpeg expects for `-ss` / `-to`.
pub fn us_to_ffmpeg_time(us: u64) -> String {
    format!("{:.6}", us_to_secs(us))
}
