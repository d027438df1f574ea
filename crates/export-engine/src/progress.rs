//! Job progress and its blending across phases.

use std::fmt;

use serde::Serialize;

/// Weight of the remux of already-written video when resuming.
pub const RESUME_REMUX_WEIGHT: f64 = 0.15;
/// Weight of encoding the rest of the video when resuming.
pub const RESUME_VIDEO_TAIL_WEIGHT: f64 = 0.40;
/// Weight of the audio pass when resuming.
pub const RESUME_AUDIO_WEIGHT: f64 = 0.30;

/// Progress as reported to the job owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "percent", rename_all = "snake_case")]
pub enum ProgressState {
    NotStarted,
    /// Work is scheduled but nothing has reported progress yet.
    Waiting,
    Available(u8),
    Unavailable,
}

impl ProgressState {
    pub fn percent(self) -> Option<u8> {
        match self {
            ProgressState::Available(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressState::NotStarted => write!(f, "not started"),
            ProgressState::Waiting => write!(f, "waiting"),
            ProgressState::Available(p) => write!(f, "{p}%"),
            ProgressState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Blend a phase's own progress into the job-wide scale.
///
/// `prior` is the summed weight of completed phases and `weight` that of the
/// current one, both as fractions of the whole job. `session` is `None`
/// while the phase has no transcode session yet.
pub fn blend(prior: f64, weight: f64, session: Option<ProgressState>) -> ProgressState {
    let prior_percent = (prior * 100.0).clamp(0.0, 100.0);
    match session {
        None | Some(ProgressState::NotStarted) | Some(ProgressState::Waiting) => {
            if prior_percent == 0.0 {
                ProgressState::Waiting
            } else {
                ProgressState::Available(prior_percent.round() as u8)
            }
        }
        Some(ProgressState::Available(p)) => {
            let blended = prior_percent + p.min(100) as f64 * weight.clamp(0.0, 1.0);
            ProgressState::Available(blended.round().min(100.0) as u8)
        }
        Some(ProgressState::Unavailable) => ProgressState::Unavailable,
    }
}

/// Share of a trimmed export covered by the transcoded head:
/// `(boundary - trim start) / total media duration`.
pub fn trim_head_weight(trim_start_us: u64, boundary_us: u64, total_duration_us: u64) -> f64 {
    if total_duration_us == 0 {
        return 0.0;
    }
    (boundary_us.saturating_sub(trim_start_us) as f64 / total_duration_us as f64).clamp(0.0, 1.0)
}
