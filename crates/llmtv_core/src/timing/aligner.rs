//! Fixed-length partition of the song into clip segments.

use crate::models::Segment;
use crate::orchestrator::{StageError, StageResult};

/// Split `[0, duration)` into consecutive segments of `max_segment` seconds.
///
/// The final segment covers whatever remains and may be shorter. When the
/// duration is an exact multiple of `max_segment` no empty trailing
/// segment is produced. Boundaries are computed as `i * max_segment`
/// rather than accumulated, and the last segment ends exactly at
/// `duration`.
pub fn align(duration: f64, max_segment: f64) -> StageResult<Vec<Segment>> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(StageError::input(format!(
            "audio duration must be a positive number of seconds, got {}",
            duration
        )));
    }
    if !max_segment.is_finite() || max_segment <= 0.0 {
        return Err(StageError::input(format!(
            "maximum segment duration must be positive, got {}",
            max_segment
        )));
    }

    let full = (duration / max_segment).floor() as usize;
    let remainder = duration - full as f64 * max_segment;
    // Any leftover, however small, gets its own segment
    let count = if remainder > 0.0 { full + 1 } else { full };

    let segments = (0..count)
        .map(|i| {
            let start = i as f64 * max_segment;
            let end = if i + 1 == count {
                duration
            } else {
                (i + 1) as f64 * max_segment
            };
            Segment::new(i, start, end)
        })
        .collect();

    Ok(segments)
}

/// Whether `segments` partition `[0, duration]` exactly.
pub fn is_partition(segments: &[Segment], duration: f64, max_segment: f64) -> bool {
    let Some(first) = segments.first() else {
        return false;
    };
    let Some(last) = segments.last() else {
        return false;
    };

    first.start == 0.0
        && last.end == duration
        && segments
            .iter()
            .enumerate()
            .all(|(i, s)| s.index == i && s.end > s.start && s.duration() <= max_segment + 1e-9)
        && segments.windows(2).all(|pair| pair[0].end == pair[1].start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_SEGMENT_DURATION;

    fn lengths(segments: &[Segment]) -> Vec<f64> {
        segments.iter().map(Segment::duration).collect()
    }

    #[test]
    fn exact_multiple_has_no_trailing_segment() {
        let segments = align(8.0, MAX_SEGMENT_DURATION).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(lengths(&segments), vec![8.0]);

        let segments = align(24.0, MAX_SEGMENT_DURATION).unwrap();
        assert_eq!(lengths(&segments), vec![8.0, 8.0, 8.0]);
    }

    #[test]
    fn twenty_seconds_is_eight_eight_four() {
        let segments = align(20.0, MAX_SEGMENT_DURATION).unwrap();
        assert_eq!(lengths(&segments), vec![8.0, 8.0, 4.0]);
        assert_eq!(segments[2].start, 16.0);
        assert_eq!(segments[2].end, 20.0);
    }

    #[test]
    fn short_song_is_one_short_segment() {
        let segments = align(3.25, MAX_SEGMENT_DURATION).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, 3.25);
    }

    #[test]
    fn non_positive_duration_is_input_error() {
        for bad in [0.0, -4.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                align(bad, MAX_SEGMENT_DURATION),
                Err(StageError::Input(_))
            ));
        }
        assert!(matches!(align(10.0, 0.0), Err(StageError::Input(_))));
    }

    #[test]
    fn partitions_every_duration_in_sweep() {
        // Deterministic sweep across fractional, exact and long durations
        let mut duration = 0.001;
        while duration < 400.0 {
            let segments = align(duration, MAX_SEGMENT_DURATION).unwrap();

            assert!(
                is_partition(&segments, duration, MAX_SEGMENT_DURATION),
                "not a partition for {}",
                duration
            );
            let total: f64 = lengths(&segments).iter().sum();
            assert!((total - duration).abs() < 1e-9, "sum mismatch for {}", duration);
            assert_eq!(
                segments.len(),
                (duration / MAX_SEGMENT_DURATION).ceil() as usize,
                "count mismatch for {}",
                duration
            );

            duration += 0.737;
        }
    }

    #[test]
    fn tiny_remainder_still_gets_a_segment() {
        let duration = 16.0 + 1e-12;
        let segments = align(duration, MAX_SEGMENT_DURATION).unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].end, 16.0);
        assert!(segments.iter().all(|s| s.duration() <= MAX_SEGMENT_DURATION));
        assert!(is_partition(&segments, duration, MAX_SEGMENT_DURATION));
    }

    #[test]
    fn respects_custom_segment_length() {
        let segments = align(10.0, 4.0).unwrap();
        assert_eq!(lengths(&segments), vec![4.0, 4.0, 2.0]);
    }
}
