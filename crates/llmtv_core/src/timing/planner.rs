//! Content descriptors for each segment.

use crate::models::{ClipDescriptor, Segment, Transcript};

/// Build one descriptor per segment from the lyrics sung in its window.
///
/// Segments without overlapping lyrics (instrumental stretches) fall back
/// to the whole song text, so every clip still gets a meaningful prompt.
pub fn plan_segments(
    segments: &[Segment],
    transcript: &Transcript,
    style: Option<&str>,
) -> Vec<ClipDescriptor> {
    let style = style.map(str::to_string);

    segments
        .iter()
        .map(|segment| ClipDescriptor {
            segment_index: segment.index,
            required_secs: segment.duration(),
            lyrics: transcript.text_in(segment.start, segment.end),
            style: style.clone(),
        })
        .collect()
}
