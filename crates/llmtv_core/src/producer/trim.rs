//! Trimming a generated clip to its segment.

use serde::{Deserialize, Serialize};

pub use crate::models::DURATION_EPSILON;
use crate::models::{Segment, TrimmedClip, VideoClip};
use crate::orchestrator::{StageError, StageResult};

/// Which part of a longer clip is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimAnchor {
    /// Keep the beginning of the clip.
    #[default]
    Start,
    /// Keep the end of the clip.
    End,
    /// Keep the middle of the clip.
    Center,
}

impl TrimAnchor {
    /// Offset into a clip of `native` seconds where a `required`-second window starts.
    pub fn offset(self, native: f64, required: f64) -> f64 {
        let slack = (native - required).max(0.0);
        match self {
            TrimAnchor::Start => 0.0,
            TrimAnchor::End => slack,
            TrimAnchor::Center => slack / 2.0,
        }
    }
}

impl std::fmt::Display for TrimAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrimAnchor::Start => "start",
            TrimAnchor::End => "end",
            TrimAnchor::Center => "center",
        };
        f.write_str(name)
    }
}

/// Cut `clip` down to `segment`'s duration.
///
/// Clips are never extended: a clip shorter than its segment is a
/// [`StageError::ClipTooShort`].
pub fn trim_clip(clip: &VideoClip, segment: &Segment, anchor: TrimAnchor) -> StageResult<TrimmedClip> {
    if clip.segment_index != segment.index {
        return Err(StageError::invalid_output(format!(
            "clip for segment {} delivered for segment {}",
            clip.segment_index, segment.index
        )));
    }

    let required = segment.duration();
    let native = clip.native_duration_secs;

    if !native.is_finite() || native + DURATION_EPSILON < required {
        return Err(StageError::ClipTooShort {
            segment_index: segment.index,
            native_secs: native,
            required_secs: required,
        });
    }

    Ok(TrimmedClip {
        segment_index: segment.index,
        source: clip.path.clone(),
        offset_secs: anchor.offset(native, required),
        duration_secs: required,
    })
}
