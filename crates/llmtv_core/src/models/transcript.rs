//! Timestamped transcript of the generated song.
//!
//! The transcription service returns loosely structured chunks. They are
//! normalised into a [`Transcript`] whose spans cover the whole track with
//! no gap and no overlap.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How far past the track end a chunk may reach before the transcript is
/// rejected. Ends within this slack are clamped to the track duration.
pub const END_SLACK_SECS: f64 = 0.05;

/// One chunk as reported by the transcription service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    pub text: String,
    /// `(start, end)`; either side may be missing.
    pub timestamp: (Option<f64>, Option<f64>),
}

/// Transcription service output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTranscription {
    /// Full transcribed text.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chunks: Vec<RawChunk>,
}

/// Errors from transcript normalisation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptError {
    #[error("Track duration {0} is not a positive number of seconds")]
    InvalidDuration(f64),

    #[error("Span '{text}' ends at {end:.3}s, past the track end at {duration:.3}s")]
    ExceedsDuration {
        text: String,
        end: f64,
        duration: f64,
    },

    #[error("Span '{text}' ends ({end:.3}s) before it starts ({start:.3}s)")]
    Reversed { text: String, start: f64, end: f64 },
}

/// A text span with its time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Spans covering `[0, duration]` contiguously.
///
/// Silent stretches are represented by spans with empty text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    text: String,
    spans: Vec<TranscriptSpan>,
}

impl Transcript {
    /// Normalise raw service output against the track duration.
    pub fn from_raw(raw: &RawTranscription, duration: f64) -> Result<Self, TranscriptError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TranscriptError::InvalidDuration(duration));
        }

        let mut timed = Vec::new();
        for chunk in &raw.chunks {
            // Chunks without both timestamps cannot be placed
            let (Some(start), Some(end)) = chunk.timestamp else {
                continue;
            };
            if !start.is_finite() || !end.is_finite() {
                continue;
            }
            if end < start {
                return Err(TranscriptError::Reversed {
                    text: chunk.text.trim().to_string(),
                    start,
                    end,
                });
            }
            if end > duration + END_SLACK_SECS {
                return Err(TranscriptError::ExceedsDuration {
                    text: chunk.text.trim().to_string(),
                    end,
                    duration,
                });
            }
            timed.push((start.max(0.0), end.min(duration), chunk.text.trim()));
        }

        timed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut spans = Vec::with_capacity(timed.len() * 2 + 1);
        let mut cursor = 0.0_f64;

        for (start, end, text) in timed {
            let start = start.max(cursor);
            if end <= start {
                continue;
            }
            if start > cursor {
                spans.push(TranscriptSpan {
                    text: String::new(),
                    start: cursor,
                    end: start,
                });
            }
            spans.push(TranscriptSpan {
                text: text.to_string(),
                start,
                end,
            });
            cursor = end;
        }

        if cursor < duration {
            spans.push(TranscriptSpan {
                text: String::new(),
                start: cursor,
                end: duration,
            });
        }

        Ok(Self {
            text: raw.text.trim().to_string(),
            spans,
        })
    }

    /// Full transcribed text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[TranscriptSpan] {
        &self.spans
    }

    /// End of the last span.
    pub fn duration(&self) -> f64 {
        self.spans.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Whether spans start at zero and follow each other without gap or overlap.
    pub fn is_contiguous(&self) -> bool {
        match self.spans.first() {
            Some(first) if first.start == 0.0 => self
                .spans
                .windows(2)
                .all(|w| w[0].end == w[1].start && w[0].start <= w[0].end),
            _ => false,
        }
    }

    /// Lyrics sung during `[start, end)`.
    ///
    /// Falls back to the whole transcript text when nothing was sung in the window.
    pub fn text_in(&self, start: f64, end: f64) -> String {
        let joined = self
            .spans
            .iter()
            .filter(|s| !s.text.is_empty() && s.start < end && s.end > start)
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            self.text.clone()
        } else {
            joined
        }
    }
}
