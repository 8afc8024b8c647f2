//! Data model shared by every pipeline stage.
//!
//! Each type is the artifact of one stage and is never mutated after the
//! stage that produced it completes.

mod lyrics;
mod media;
mod prompt;
mod segment;
mod transcript;

pub use lyrics::{LyricLine, LyricsDocument, SectionRole};
pub use media::{AudioTrack, FinalVideo, TrimmedClip, VideoClip};
pub use prompt::{Prompt, PromptError, DEFAULT_STYLE};
pub use segment::{ClipDescriptor, Segment, DURATION_EPSILON, MAX_SEGMENT_DURATION};
pub use transcript::{RawChunk, RawTranscription, Transcript, TranscriptError, TranscriptSpan};
