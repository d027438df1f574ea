//! Composition types: what an export job turns into one output file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};

use crate::format::TrackType;

/// Top-level composition (`composition.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Parallel sequences. The output interleaves one track per type.
    pub sequences: Vec<Sequence>,

    /// Effects applied to the whole output.
    #[serde(default)]
    pub effects: Effects,

    /// How HDR input is handled.
    #[serde(default)]
    pub hdr_mode: HdrMode,

    /// Copy encoded audio samples instead of re-encoding them.
    #[serde(default)]
    pub transmux_audio: bool,

    /// Copy encoded video samples instead of re-encoding them.
    #[serde(default)]
    pub transmux_video: bool,
}

/// An ordered list of media items played back to back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub items: Vec<EditedItem>,

    /// Track types this sequence contributes. Empty means every track type
    /// found in its items.
    #[serde(default)]
    pub track_types: Vec<TrackType>,
}

/// A clipped media source with its per-item edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditedItem {
    pub source: MediaSource,

    #[serde(default)]
    pub remove_audio: bool,

    #[serde(default)]
    pub remove_video: bool,

    #[serde(default)]
    pub effects: Effects,

    /// Known duration of the underlying media, if already probed.
    #[serde(default)]
    pub duration_us: Option<u64>,
}

/// Location of the media plus the span of it to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    /// File path or URI.
    pub uri: String,

    #[serde(default)]
    pub clip: Clipping,
}

/// Clip window inside a media source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clipping {
    #[serde(default)]
    pub start_us: u64,

    /// `None` runs to the end of the source.
    #[serde(default)]
    pub end_us: Option<u64>,

    /// The start position is known to fall on a sync sample.
    #[serde(default)]
    pub starts_at_keyframe: bool,
}

/// Ordered effect descriptors. The export engine treats these as opaque and
/// only checks whether any are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    #[serde(default)]
    pub video: Vec<Effect>,
    #[serde(default)]
    pub audio: Vec<Effect>,
}

/// One effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// HDR handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HdrMode {
    #[default]
    KeepHdr,
    ToneMapHdrToSdr,
    ForceInterpretHdrAsSdr,
}

/// Span of one item on its source timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipBoundary {
    pub start_us: u64,
    pub end_us: Option<u64>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

impl Clipping {
    pub fn new(start_us: u64, end_us: Option<u64>) -> Self {
        Self {
            start_us,
            end_us,
            starts_at_keyframe: false,
        }
    }
}

impl EditedItem {
    /// An item covering the whole of `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            source: MediaSource {
                uri: uri.into(),
                clip: Clipping::default(),
            },
            remove_audio: false,
            remove_video: false,
            effects: Effects::default(),
            duration_us: None,
        }
    }

    pub fn with_clip(mut self, start_us: u64, end_us: Option<u64>) -> Self {
        self.source.clip = Clipping::new(start_us, end_us);
        self
    }

    pub fn clip(&self) -> &Clipping {
        &self.source.clip
    }
}

impl Sequence {
    pub fn new(items: Vec<EditedItem>) -> Self {
        Self {
            items,
            track_types: Vec::new(),
        }
    }

    pub fn with_track_types(mut self, track_types: Vec<TrackType>) -> Self {
        self.track_types = track_types;
        self
    }

    /// Whether this sequence contributes a track of `track_type`.
    pub fn contributes(&self, track_type: TrackType) -> bool {
        self.track_types.is_empty() || self.track_types.contains(&track_type)
    }
}

impl Composition {
    pub fn new(sequences: Vec<Sequence>) -> Self {
        Self {
            sequences,
            effects: Effects::default(),
            hdr_mode: HdrMode::default(),
            transmux_audio: false,
            transmux_video: false,
        }
    }

    /// A composition of one sequence holding one item.
    pub fn single(item: EditedItem) -> Self {
        Self::new(vec![Sequence::new(vec![item])])
    }

    /// Load a composition from a JSON file.
    pub fn load(path: &Path) -> SpliceResult<Self> {
        if !path.exists() {
            return Err(SpliceError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let composition: Composition = serde_json::from_str(&content)?;
        let problems = composition.validate();
        if !problems.is_empty() {
            return Err(SpliceError::composition(problems.join("; ")));
        }
        tracing::debug!(
            path = %path.display(),
            sequences = composition.sequence_count(),
            "Loaded composition"
        );
        Ok(composition)
    }

    /// Check structural invariants; returns a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.sequences.is_empty() {
            problems.push("Composition has no sequences".to_string());
        }
        for (s, sequence) in self.sequences.iter().enumerate() {
            if sequence.items.is_empty() {
                problems.push(format!("Sequence {s} has no items"));
            }
            for (i, item) in sequence.items.iter().enumerate() {
                if item.source.uri.trim().is_empty() {
                    problems.push(format!("Sequence {s} item {i} has an empty uri"));
                }
                if let Some(end) = item.source.clip.end_us {
                    if end <= item.source.clip.start_us {
                        problems.push(format!(
                            "Sequence {s} item {i} clip ends ({end}us) before it starts ({}us)",
                            item.source.clip.start_us
                        ));
                    }
                }
                if item.remove_audio && item.remove_video {
                    problems.push(format!("Sequence {s} item {i} removes every track"));
                }
            }
        }
        problems
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Exactly one sequence holding exactly one item.
    pub fn is_single_asset(&self) -> bool {
        self.sequences.len() == 1 && self.sequences[0].items.len() == 1
    }

    /// The first item of the first sequence.
    pub fn first_item(&self) -> Option<&EditedItem> {
        self.sequences.first().and_then(|s| s.items.first())
    }

    /// Clip boundaries of every item, sequence by sequence.
    pub fn clip_boundaries(&self) -> Vec<ClipBoundary> {
        self.sequences
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|item| ClipBoundary {
                start_us: item.source.clip.start_us,
                end_us: item.source.clip.end_us,
            })
            .collect()
    }

    /// Source uris in playback order.
    pub fn uris(&self) -> Vec<&str> {
        self.sequences
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|item| item.source.uri.as_str())
            .collect()
    }

    /// Whether any video effect applies (per item or global).
    pub fn has_video_effects(&self) -> bool {
        !self.effects.video.is_empty()
            || self
                .sequences
                .iter()
                .flat_map(|s| s.items.iter())
                .any(|item| !item.effects.video.is_empty())
    }

    /// Whether any audio effect applies (per item or global).
    pub fn has_audio_effects(&self) -> bool {
        !self.effects.audio.is_empty()
            || self
                .sequences
                .iter()
                .flat_map(|s| s.items.iter())
                .any(|item| !item.effects.audio.is_empty())
    }
}
