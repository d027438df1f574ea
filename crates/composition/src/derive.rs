//! Compositions derived from a caller's composition for the individual
//! phases of an optimized export.
//!
//! Every derivation leaves the source composition untouched and returns a new
//! value, so the original stays available for a fallback to a full export.

use splice_common::error::{SpliceError, SpliceResult};

use crate::composition::{Clipping, Composition, EditedItem, Sequence};
use crate::format::TrackType;

impl Composition {
    /// Copy of this single-asset composition with its only item clipped to
    /// `[start_us, end_us)`.
    pub fn trim_optimized(
        &self,
        start_us: u64,
        end_us: Option<u64>,
        media_duration_us: u64,
        starts_at_keyframe: bool,
        clear_video_effects: bool,
    ) -> SpliceResult<Composition> {
        self.require_single_asset("trim optimization")?;
        let mut derived = self.clone();
        let item = &mut derived.sequences[0].items[0];
        item.source.clip = Clipping {
            start_us,
            end_us,
            starts_at_keyframe,
        };
        item.duration_us = Some(media_duration_us);
        if clear_video_effects {
            item.effects.video.clear();
            derived.effects.video.clear();
        }
        Ok(derived)
    }

    /// Copy of this composition whose first item starts at `start_us`.
    ///
    /// Used when the nearest sync sample is so close to the requested start
    /// that transcoding the gap separately would save nothing.
    pub fn with_clip_start_at_keyframe(&self, start_us: u64) -> SpliceResult<Composition> {
        self.require_single_asset("clip widening")?;
        let mut derived = self.clone();
        let clip = &mut derived.sequences[0].items[0].source.clip;
        clip.start_us = start_us;
        clip.starts_at_keyframe = true;
        Ok(derived)
    }

    /// Video-only composition that copies the video of an existing file up
    /// to `clip_end_us` without re-encoding.
    pub fn video_only_from_file(uri: impl Into<String>, clip_end_us: u64) -> Composition {
        let mut item = EditedItem::new(uri).with_clip(0, Some(clip_end_us));
        item.remove_audio = true;
        let mut composition = Composition::new(vec![
            Sequence::new(vec![item]).with_track_types(vec![TrackType::Video])
        ]);
        composition.transmux_video = true;
        composition
    }

    /// Video-only copy of this composition that starts `resume_from_us` into
    /// the clip. Already-written output covers everything before that point.
    pub fn resume_video_tail(&self, resume_from_us: u64) -> SpliceResult<Composition> {
        self.require_single_asset("resume")?;
        let mut derived = self.clone();
        let sequence = &mut derived.sequences[0];
        sequence.track_types = vec![TrackType::Video];
        let item = &mut sequence.items[0];
        item.remove_audio = true;
        item.effects.audio.clear();
        item.source.clip.start_us = item.source.clip.start_us.saturating_add(resume_from_us);
        item.source.clip.starts_at_keyframe = true;
        derived.effects.audio.clear();
        Ok(derived)
    }

    /// Composition that re-encodes this composition's audio while copying
    /// the video of `video_only_uri`, producing one interleaved file.
    pub fn audio_transcode_video_transmux(
        &self,
        video_only_uri: impl Into<String>,
    ) -> SpliceResult<Composition> {
        self.require_single_asset("resume")?;
        let mut audio_sequence = self.sequences[0].clone();
        audio_sequence.track_types = vec![TrackType::Audio];
        for item in &mut audio_sequence.items {
            item.remove_video = true;
            item.effects.video.clear();
        }

        let mut video_item = EditedItem::new(video_only_uri);
        video_item.remove_audio = true;
        let video_sequence = Sequence::new(vec![video_item]).with_track_types(vec![TrackType::Video]);

        let mut derived = Composition::new(vec![audio_sequence, video_sequence]);
        derived.effects.audio = self.effects.audio.clone();
        derived.hdr_mode = self.hdr_mode;
        derived.transmux_video = true;
        Ok(derived)
    }

    /// Mark the composition as copy-only for the given track types.
    pub fn with_transmux(mut self, audio: bool, video: bool) -> Self {
        self.transmux_audio = audio;
        self.transmux_video = video;
        self
    }

    fn require_single_asset(&self, purpose: &str) -> SpliceResult<()> {
        if self.is_single_asset() {
            Ok(())
        } else {
            Err(SpliceError::composition(format!(
                "{purpose} requires a single-sequence, single-item composition (got {} sequences)",
                self.sequences.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Effect;
    use proptest::prelude::*;

    fn base() -> Composition {
        let mut item = EditedItem::new("/media/in.mp4").with_clip(2_000_000, Some(9_000_000));
        item.effects.video.push(Effect {
            name: "rotate".to_string(),
            params: serde_json::json!(90),
        });
        item.effects.audio.push(Effect {
            name: "gain".to_string(),
            params: serde_json::json!(0.5),
        });
        Composition::single(item)
    }

    #[test]
    fn test_trim_head_clears_video_effects_only() {
        let head = base()
            .trim_optimized(2_000_000, Some(3_500_000), 10_000_000, false, true)
            .unwrap();
        let item = head.first_item().unwrap();
        assert_eq!(item.clip().start_us, 2_000_000);
        assert_eq!(item.clip().end_us, Some(3_500_000));
        assert!(item.effects.video.is_empty());
        assert_eq!(item.effects.audio.len(), 1);
        assert_eq!(item.duration_us, Some(10_000_000));
        // Source composition untouched.
        assert_eq!(base().first_item().unwrap().effects.video.len(), 1);
    }

    #[test]
    fn test_derivations_reject_multi_asset() {
        let mut multi = base();
        multi.sequences.push(Sequence::new(vec![EditedItem::new("b.mp4")]));
        assert!(multi.trim_optimized(0, None, 1, true, false).is_err());
        assert!(multi.resume_video_tail(1).is_err());
        assert!(multi.audio_transcode_video_transmux("v.mp4").is_err());
    }

    #[test]
    fn test_video_only_from_file() {
        let remux = Composition::video_only_from_file("/tmp/old.mp4", 4_000_000);
        assert!(remux.transmux_video);
        let item = remux.first_item().unwrap();
        assert!(item.remove_audio);
        assert_eq!(item.clip().end_us, Some(4_000_000));
        assert!(!remux.sequences[0].contributes(TrackType::Audio));
    }

    #[test]
    fn test_resume_video_tail_offsets_clip_start() {
        let tail = base().resume_video_tail(3_000_000).unwrap();
        let item = tail.first_item().unwrap();
        assert_eq!(item.clip().start_us, 5_000_000);
        assert_eq!(item.clip().end_us, Some(9_000_000));
        assert!(item.remove_audio);
        assert_eq!(tail.sequences[0].track_types, vec![TrackType::Video]);
    }

    #[test]
    fn test_audio_transcode_video_transmux_layout() {
        let derived = base().audio_transcode_video_transmux("/tmp/video.mp4").unwrap();
        assert_eq!(derived.sequences.len(), 2);
        assert_eq!(derived.sequences[0].track_types, vec![TrackType::Audio]);
        assert!(derived.sequences[0].items[0].remove_video);
        assert_eq!(derived.sequences[1].items[0].source.uri, "/tmp/video.mp4");
        assert!(derived.transmux_video);
        assert!(!derived.transmux_audio);
    }

    proptest! {
        #[test]
        fn prop_widening_keeps_semantic_content(
            start in 0u64..5_000_000,
            gap in 0u64..1_000_000,
            len in 1_000_000u64..50_000_000,
        ) {
            let original = Composition::single(
                EditedItem::new("/media/in.mp4").with_clip(start, Some(start + len)),
            );
            let widened = original.with_clip_start_at_keyframe(start + gap.min(len - 1)).unwrap();
            prop_assert_eq!(widened.uris(), original.uris());
            prop_assert_eq!(widened.sequence_count(), original.sequence_count());
            prop_assert_eq!(
                widened.clip_boundaries()[0].end_us,
                original.clip_boundaries()[0].end_us
            );
            prop_assert_eq!(&widened.effects, &original.effects);
        }
    }
}
