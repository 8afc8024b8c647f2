//! Time segments and the content descriptors sent for each.

use serde::{Deserialize, Serialize};

/// Native length of a generated clip and upper bound on a segment, in seconds.
pub const MAX_SEGMENT_DURATION: f64 = 8.0;

/// Native durations this close to the required duration count as equal.
pub const DURATION_EPSILON: f64 = 1e-6;

/// A window `[start, end)` of the song driven by one generated clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(index: usize, start: f64, end: f64) -> Self {
        Self { index, start, end }
    }

    /// Required footage length for this segment.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "segment {} ({:.2}s - {:.2}s)",
            self.index, self.start, self.end
        )
    }
}

/// What the video service is asked to show for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    pub segment_index: usize,
    /// Seconds of footage the segment needs.
    pub required_secs: f64,
    /// Lyrics sung during the segment.
    pub lyrics: String,
    /// Musical style, reused as the visual genre.
    pub style: Option<String>,
}

impl ClipDescriptor {
    /// Whether a clip of `native_secs` can cover the segment.
    pub fn is_long_enough(&self, native_secs: f64) -> bool {
        native_secs.is_finite() && native_secs + DURATION_EPSILON >= self.required_secs
    }

    /// Text prompt for the video generation service.
    pub fn prompt_text(&self) -> String {
        match self.style.as_deref() {
            Some(style) if !style.is_empty() => format!(
                "create a short music video with this genre: {} visualizing these lyrics: {}",
                style, self.lyrics
            ),
            _ => format!(
                "create a short music video visualizing these lyrics: {}",
                self.lyrics
            ),
        }
    }
}
