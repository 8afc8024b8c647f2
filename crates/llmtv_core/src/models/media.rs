//! Audio and video assets moving through the pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The generated song: one continuous audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Location of the audio file.
    pub path: PathBuf,
    /// Total duration in seconds.
    pub duration_secs: f64,
}

impl AudioTrack {
    pub fn new(path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            duration_secs,
        }
    }

    /// Whether the duration is usable for alignment.
    pub fn has_valid_duration(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs > 0.0
    }
}

/// A clip as delivered by the video service, bound to one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    /// Index of the segment this clip was generated for.
    pub segment_index: usize,
    /// Location of the downloaded clip.
    pub path: PathBuf,
    /// Duration of the clip as produced, in seconds.
    pub native_duration_secs: f64,
}

/// A clip cut down to its segment's duration.
///
/// Trimming is recorded as a window into the source clip; the assembler
/// applies it while encoding so the downloaded clip is never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimmedClip {
    pub segment_index: usize,
    /// Source clip file.
    pub source: PathBuf,
    /// Offset into the source clip where the kept window starts.
    pub offset_secs: f64,
    /// Length of the kept window.
    pub duration_secs: f64,
}

impl TrimmedClip {
    /// End of the kept window within the source clip.
    pub fn end_secs(&self) -> f64 {
        self.offset_secs + self.duration_secs
    }
}

/// The finished music video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVideo {
    /// Location of the encoded video.
    pub path: PathBuf,
    /// Audio track muxed into the video.
    pub audio_path: PathBuf,
    /// Duration of the encoded video in seconds.
    pub duration_secs: f64,
    /// Times at which one segment's footage hands over to the next,
    /// starting at 0 and ending at the total duration.
    pub segment_boundaries: Vec<f64>,
}

impl FinalVideo {
    /// Number of clips the video was assembled from.
    pub fn segment_count(&self) -> usize {
        self.segment_boundaries.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_duration_validity() {
        assert!(AudioTrack::new("a.mp3", 20.0).has_valid_duration());
        assert!(!AudioTrack::new("a.mp3", 0.0).has_valid_duration());
        assert!(!AudioTrack::new("a.mp3", -1.0).has_valid_duration());
        assert!(!AudioTrack::new("a.mp3", f64::NAN).has_valid_duration());
    }

    #[test]
    fn final_video_counts_segments_from_boundaries() {
        let video = FinalVideo {
            path: "out.mp4".into(),
            audio_path: "song.mp3".into(),
            duration_secs: 20.0,
            segment_boundaries: vec![0.0, 8.0, 16.0, 20.0],
        };
        assert_eq!(video.segment_count(), 3);
    }
}
