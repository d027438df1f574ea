//! Per-job export options.

use splice_common::config::AppConfig;
use splice_common::time::AAC_LC_ACCESS_UNIT_SAMPLES;
use splice_composition::{Composition, Format, HdrMode};

/// What the caller wants the output to look like, independent of the
/// composition's own edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformationRequest {
    /// Requested output video mime. `None` keeps the source codec.
    pub video_mime: Option<String>,

    /// Requested output audio mime. `None` keeps the source codec.
    pub audio_mime: Option<String>,

    /// Overrides the composition's HDR mode.
    pub hdr_mode: Option<HdrMode>,
}

impl TransformationRequest {
    fn hdr_mode(&self, composition: &Composition) -> HdrMode {
        self.hdr_mode.unwrap_or(composition.hdr_mode)
    }

    /// Whether video in `format` would have to be re-encoded.
    pub fn requires_video_transcode(&self, composition: &Composition, format: &Format) -> bool {
        if self
            .video_mime
            .as_deref()
            .is_some_and(|mime| mime != format.sample_mime)
        {
            return true;
        }
        if composition.has_video_effects() {
            return true;
        }
        format.is_hdr() && self.hdr_mode(composition) != HdrMode::KeepHdr
    }

    /// Whether audio in `format` would have to be re-encoded.
    pub fn requires_audio_transcode(&self, composition: &Composition, format: &Format) -> bool {
        if self
            .audio_mime
            .as_deref()
            .is_some_and(|mime| mime != format.sample_mime)
        {
            return true;
        }
        composition.has_audio_effects()
    }
}

/// Engine-level options for one export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Enter the trim chain for eligible compositions.
    pub trim_optimization: bool,

    /// PCM frames per encoded audio access unit; the smallest keyframe gap
    /// worth optimizing is one such unit.
    pub audio_access_unit_samples: u32,

    /// Report blended progress while resuming instead of "unavailable".
    pub report_resume_progress: bool,

    pub transformation: TransformationRequest,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            trim_optimization: false,
            audio_access_unit_samples: AAC_LC_ACCESS_UNIT_SAMPLES,
            report_resume_progress: false,
            transformation: TransformationRequest::default(),
        }
    }
}

impl From<&AppConfig> for ExportOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            trim_optimization: config.export.trim_optimization,
            audio_access_unit_samples: config.export.audio_access_unit_samples,
            report_resume_progress: config.export.report_resume_progress,
            transformation: TransformationRequest::default(),
        }
    }
}
