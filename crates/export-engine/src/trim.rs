//! Trim optimization planning.
//!
//! A trimmed export only needs to re-encode the span between the trim start
//! and the next sync sample; everything after that can be copied. Whether
//! that is possible, and worth it, is decided once from the trim probe.

use splice_common::error::{SpliceError, SpliceResult};
use splice_common::time::sample_count_to_duration_us;
use splice_composition::{Composition, Format};

use crate::options::ExportOptions;
use crate::probe::{SyncBoundary, TrimInfo};
use crate::progress::trim_head_weight;
use crate::result::OptimizationResult;

/// Everything the trim chain needs once the probe has been accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimPlan {
    pub trim_start_us: u64,
    pub trim_end_us: Option<u64>,
    pub boundary_us: u64,
    pub duration_us: u64,
    pub video_format: Format,
    pub audio_format: Option<Format>,
}

impl TrimPlan {
    /// Share of the job covered by the transcoded head, measured against
    /// the whole media duration.
    pub fn head_weight(&self) -> f64 {
        trim_head_weight(self.trim_start_us, self.boundary_us, self.duration_us)
    }

    /// Composition for the transcoded head, `[trim start, boundary)`.
    pub fn head_composition(&self, original: &Composition) -> SpliceResult<Composition> {
        original.trim_optimized(
            self.trim_start_us,
            Some(self.boundary_us),
            self.duration_us,
            false,
            true,
        )
    }

    /// Composition for the copied tail, `[boundary, trim end)`.
    pub fn tail_composition(&self, original: &Composition) -> SpliceResult<Composition> {
        Ok(original
            .trim_optimized(
                self.boundary_us,
                self.trim_end_us,
                self.duration_us,
                true,
                true,
            )?
            .with_transmux(true, true))
    }

    /// Output timestamp at which the tail starts.
    pub fn tail_offset_us(&self) -> u64 {
        self.boundary_us.saturating_sub(self.trim_start_us)
    }
}

/// What to do after the trim probe.
#[derive(Debug, Clone, PartialEq)]
pub enum TrimDecision {
    Optimize(TrimPlan),
    /// Run a full export of `composition` instead.
    Abandon {
        reason: OptimizationResult,
        composition: Composition,
    },
}

/// Apply the trim rules to a successful probe of `composition`'s only item.
pub fn decide(
    composition: &Composition,
    info: &TrimInfo,
    options: &ExportOptions,
) -> SpliceResult<TrimDecision> {
    let item = composition
        .first_item()
        .filter(|_| composition.is_single_asset())
        .ok_or_else(|| SpliceError::unsupported("trim optimization needs a single media item"))?;
    let trim_start_us = item.clip().start_us;
    let trim_end_us = item.clip().end_us;

    let abandon = |reason: OptimizationResult, composition: Composition| -> SpliceResult<TrimDecision> {
        Ok(TrimDecision::Abandon {
            reason,
            composition,
        })
    };

    let boundary_us = match info.next_sync {
        SyncBoundary::At(us) => us,
        SyncBoundary::EndOfSource | SyncBoundary::None => {
            return abandon(
                OptimizationResult::AbandonedNoOptimalKeyframe,
                composition.clone(),
            );
        }
    };
    if trim_end_us.is_some_and(|end| end < boundary_us) {
        return abandon(
            OptimizationResult::AbandonedNoOptimalKeyframe,
            composition.clone(),
        );
    }

    // An edit list can make the trim start land exactly on the first sample.
    if info.first_video_sample_us == Some(boundary_us) {
        let marked = composition.trim_optimized(
            trim_start_us,
            trim_end_us,
            info.duration_us,
            true,
            false,
        )?;
        return abandon(
            OptimizationResult::AbandonedKeyframePlacementOptimalForTrim,
            marked,
        );
    }

    let access_unit_us = info
        .audio_format
        .as_ref()
        .and_then(|format| format.sample_rate)
        .map(|rate| sample_count_to_duration_us(options.audio_access_unit_samples as u64, rate))
        .unwrap_or(0);
    let gap_us = boundary_us.saturating_sub(trim_start_us);
    if gap_us <= access_unit_us || info.first_sample_after_start_is_sync {
        return abandon(
            OptimizationResult::AbandonedKeyframePlacementOptimalForTrim,
            composition.with_clip_start_at_keyframe(boundary_us)?,
        );
    }

    let Some(video_format) = info.video_format.clone() else {
        return abandon(OptimizationResult::AbandonedOther, composition.clone());
    };
    let request = &options.transformation;
    let audio_transcode = info
        .audio_format
        .as_ref()
        .is_some_and(|format| request.requires_audio_transcode(composition, format));
    if request.requires_video_transcode(composition, &video_format) || audio_transcode {
        return abandon(
            OptimizationResult::AbandonedTranscodingRequested,
            composition.clone(),
        );
    }

    Ok(TrimDecision::Optimize(TrimPlan {
        trim_start_us,
        trim_end_us,
        boundary_us,
        duration_us: info.duration_us,
        video_format,
        audio_format: info.audio_format.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TransformationRequest;
    use proptest::prelude::*;
    use splice_composition::{EditedItem, Effect};

    const SECOND: u64 = 1_000_000;

    fn composition() -> Composition {
        Composition::single(EditedItem::new("/media/in.mp4").with_clip(2 * SECOND, Some(8 * SECOND)))
    }

    /// 10 240 Hz makes one 1024-sample access unit exactly 100 ms.
    fn info(boundary: SyncBoundary) -> TrimInfo {
        TrimInfo {
            next_sync: boundary,
            duration_us: 10 * SECOND,
            first_video_sample_us: Some(0),
            first_sample_after_start_is_sync: false,
            video_format: Some(Format::video("video/avc", 1920, 1080)),
            audio_format: Some(Format::audio("audio/mp4a-latm", 10_240, 2)),
        }
    }

    fn reason(decision: &TrimDecision) -> Option<OptimizationResult> {
        match decision {
            TrimDecision::Optimize(_) => None,
            TrimDecision::Abandon { reason, .. } => Some(*reason),
        }
    }

    #[test]
    fn test_boundary_well_after_start_optimizes() {
        let decision = decide(
            &composition(),
            &info(SyncBoundary::At(3_500_000)),
            &ExportOptions::default(),
        )
        .unwrap();
        let TrimDecision::Optimize(plan) = decision else {
            panic!("expected optimization, got {decision:?}");
        };
        assert_eq!(plan.boundary_us, 3_500_000);
        assert_eq!(plan.tail_offset_us(), 1_500_000);
        assert!((plan.head_weight() - 0.15).abs() < 1e-9);

        let head = plan.head_composition(&composition()).unwrap();
        assert_eq!(head.first_item().unwrap().clip().end_us, Some(3_500_000));
        let tail = plan.tail_composition(&composition()).unwrap();
        assert_eq!(tail.first_item().unwrap().clip().start_us, 3_500_000);
        assert_eq!(tail.first_item().unwrap().clip().end_us, Some(8 * SECOND));
        assert!(tail.transmux_video && tail.transmux_audio);
    }

    #[test]
    fn test_head_weight_uses_media_duration() {
        let plan = |trim_end_us| TrimPlan {
            trim_start_us: 2 * SECOND,
            trim_end_us,
            boundary_us: 3_500_000,
            duration_us: 10 * SECOND,
            video_format: Format::video("video/avc", 1920, 1080),
            audio_format: None,
        };
        assert!((plan(Some(8 * SECOND)).head_weight() - 0.15).abs() < 1e-9);
        assert!((plan(None).head_weight() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_gap_within_one_access_unit_widens_clip() {
        let decision = decide(
            &composition(),
            &info(SyncBoundary::At(2_050_000)),
            &ExportOptions::default(),
        )
        .unwrap();
        let TrimDecision::Abandon {
            reason,
            composition: widened,
        } = decision
        else {
            panic!("expected abandonment");
        };
        assert_eq!(
            reason,
            OptimizationResult::AbandonedKeyframePlacementOptimalForTrim
        );
        let clip = widened.first_item().unwrap().clip();
        assert_eq!(clip.start_us, 2_050_000);
        assert!(clip.starts_at_keyframe);
    }

    #[test]
    fn test_access_unit_threshold_is_tunable() {
        let options = ExportOptions {
            audio_access_unit_samples: 256,
            ..ExportOptions::default()
        };
        let decision = decide(&composition(), &info(SyncBoundary::At(2_050_000)), &options).unwrap();
        assert_eq!(reason(&decision), None);
    }

    #[test]
    fn test_missing_or_late_boundary_abandons() {
        for boundary in [
            SyncBoundary::None,
            SyncBoundary::EndOfSource,
            SyncBoundary::At(9 * SECOND),
        ] {
            let decision = decide(&composition(), &info(boundary), &ExportOptions::default()).unwrap();
            assert_eq!(
                reason(&decision),
                Some(OptimizationResult::AbandonedNoOptimalKeyframe)
            );
        }
    }

    #[test]
    fn test_edit_list_start_keeps_clip() {
        let mut probed = info(SyncBoundary::At(3 * SECOND));
        probed.first_video_sample_us = Some(3 * SECOND);
        let decision = decide(&composition(), &probed, &ExportOptions::default()).unwrap();
        let TrimDecision::Abandon {
            reason,
            composition: marked,
        } = decision
        else {
            panic!("expected abandonment");
        };
        assert_eq!(
            reason,
            OptimizationResult::AbandonedKeyframePlacementOptimalForTrim
        );
        let clip = marked.first_item().unwrap().clip();
        assert_eq!(clip.start_us, 2 * SECOND);
        assert!(clip.starts_at_keyframe);
    }

    #[test]
    fn test_sync_sample_right_after_start_widens() {
        let mut probed = info(SyncBoundary::At(3 * SECOND));
        probed.first_sample_after_start_is_sync = true;
        let decision = decide(&composition(), &probed, &ExportOptions::default()).unwrap();
        assert_eq!(
            reason(&decision),
            Some(OptimizationResult::AbandonedKeyframePlacementOptimalForTrim)
        );
    }

    #[test]
    fn test_requested_transcode_abandons() {
        let options = ExportOptions {
            transformation: TransformationRequest {
                video_mime: Some("video/hevc".to_string()),
                ..TransformationRequest::default()
            },
            ..ExportOptions::default()
        };
        let decision = decide(&composition(), &info(SyncBoundary::At(4 * SECOND)), &options).unwrap();
        assert_eq!(
            reason(&decision),
            Some(OptimizationResult::AbandonedTranscodingRequested)
        );

        let mut with_effect = composition();
        with_effect.effects.video.push(Effect {
            name: "hflip".to_string(),
            params: serde_json::Value::Null,
        });
        let decision = decide(
            &with_effect,
            &info(SyncBoundary::At(4 * SECOND)),
            &ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(
            reason(&decision),
            Some(OptimizationResult::AbandonedTranscodingRequested)
        );
    }

    proptest! {
        #[test]
        fn prop_abandoned_composition_keeps_semantic_content(
            start in 0u64..5 * SECOND,
            len in SECOND..20 * SECOND,
            gap in 0u64..3 * SECOND,
            edit_list in any::<bool>(),
            sync_after_start in any::<bool>(),
        ) {
            let original = Composition::single(
                EditedItem::new("/media/in.mp4").with_clip(start, Some(start + len)),
            );
            let boundary = start + gap;
            let probed = TrimInfo {
                next_sync: SyncBoundary::At(boundary),
                duration_us: start + len + SECOND,
                first_video_sample_us: Some(if edit_list { boundary } else { 0 }),
                first_sample_after_start_is_sync: sync_after_start,
                video_format: Some(Format::video("video/avc", 640, 480)),
                audio_format: Some(Format::audio("audio/mp4a-latm", 10_240, 1)),
            };
            let decision = decide(&original, &probed, &ExportOptions::default()).unwrap();
            if let TrimDecision::Abandon { composition, .. } = decision {
                prop_assert_eq!(composition.uris(), original.uris());
                prop_assert_eq!(composition.sequence_count(), original.sequence_count());
                prop_assert_eq!(
                    composition.first_item().unwrap().clip().end_us,
                    original.first_item().unwrap().clip().end_us
                );
                prop_assert_eq!(&composition.effects, &original.effects);
            }
        }
    }
}
