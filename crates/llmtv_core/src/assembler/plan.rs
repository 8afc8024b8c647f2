//! What the encoder is asked to render.

use serde::{Deserialize, Serialize};

use crate::models::{AudioTrack, TrimmedClip};

/// Ordered clip windows plus the single audio track that replaces their sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyPlan {
    /// Clips in ascending segment order.
    pub clips: Vec<TrimmedClip>,
    pub audio: AudioTrack,
}

impl AssemblyPlan {
    /// Sum of the kept clip windows.
    pub fn total_clip_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration_secs).sum()
    }

    /// Hand-over times between clips, from 0 to the total duration.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut boundaries = Vec::with_capacity(self.clips.len() + 1);
        let mut t = 0.0;
        boundaries.push(t);
        for clip in &self.clips {
            t += clip.duration_secs;
            boundaries.push(t);
        }
        boundaries
    }
}
