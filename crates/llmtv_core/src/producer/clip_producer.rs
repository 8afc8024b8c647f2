//! Concurrent, retrying clip production.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{ClipSettings, RetryPolicy};
use crate::models::{ClipDescriptor, Segment, TrimmedClip};
use crate::orchestrator::{StageError, StageResult};
use crate::services::{retry_with_backoff, RetryEvent, VideoClipService};

use super::progress::{SegmentEvent, SegmentProgress, SegmentProgressCallback};
use super::trim::{trim_clip, TrimAnchor};

/// Produces one trimmed clip per segment.
///
/// Segments are independent: each runs its own retry loop, and up to
/// `max_concurrent` requests are in flight at once. The first segment to
/// fail for good stops the rest.
pub struct ClipProducer {
    service: Arc<dyn VideoClipService>,
    clips_dir: PathBuf,
    policy: RetryPolicy,
    max_concurrent: usize,
    anchor: TrimAnchor,
    progress: Option<SegmentProgressCallback>,
}

impl ClipProducer {
    pub fn new(
        service: Arc<dyn VideoClipService>,
        clips_dir: impl Into<PathBuf>,
        policy: RetryPolicy,
        max_concurrent: usize,
        anchor: TrimAnchor,
    ) -> Self {
        Self {
            service,
            clips_dir: clips_dir.into(),
            policy,
            max_concurrent: max_concurrent.max(1),
            anchor,
            progress: None,
        }
    }

    /// Build from the `[clips]` settings.
    pub fn from_settings(
        service: Arc<dyn VideoClipService>,
        clips_dir: impl Into<PathBuf>,
        settings: &ClipSettings,
    ) -> Self {
        Self::new(
            service,
            clips_dir,
            settings.retry_policy(),
            settings.max_concurrent,
            settings.trim_anchor,
        )
    }

    pub fn with_progress(mut self, callback: SegmentProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn clips_dir(&self) -> &Path {
        &self.clips_dir
    }

    /// Where the clip for a segment is downloaded.
    pub fn clip_path(&self, segment_index: usize) -> PathBuf {
        self.clips_dir
            .join(format!("segment_{:03}.mp4", segment_index))
    }

    fn report(&self, segment_index: usize, event: SegmentEvent) {
        if let Some(ref callback) = self.progress {
            callback(&SegmentProgress {
                segment_index,
                event,
            });
        }
    }

    /// Produce the trimmed clip for one segment.
    ///
    /// Retryable service failures are retried within the policy; fatal
    /// failures and short clips are not. Errors are tagged with the
    /// segment index.
    pub async fn produce(
        &self,
        segment: &Segment,
        descriptor: &ClipDescriptor,
        cancel: &CancellationToken,
    ) -> StageResult<TrimmedClip> {
        let index = segment.index;
        let result = self.produce_untagged(segment, descriptor, cancel).await;

        match result {
            Ok(clip) => {
                self.report(
                    index,
                    SegmentEvent::Completed {
                        duration_secs: clip.duration_secs,
                    },
                );
                Ok(clip)
            }
            Err(e) => {
                if !e.is_cancelled() {
                    self.report(
                        index,
                        SegmentEvent::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(StageError::for_segment(index, e))
            }
        }
    }

    async fn produce_untagged(
        &self,
        segment: &Segment,
        descriptor: &ClipDescriptor,
        cancel: &CancellationToken,
    ) -> StageResult<TrimmedClip> {
        let index = segment.index;
        if descriptor.segment_index != index {
            return Err(StageError::input(format!(
                "descriptor for segment {} paired with segment {}",
                descriptor.segment_index, index
            )));
        }

        let dest = self.clip_path(index);
        let dest_path = dest.as_path();
        let service: &dyn VideoClipService = self.service.as_ref();

        let clip = retry_with_backoff(
            &self.policy,
            cancel,
            service.name(),
            |event| match event {
                RetryEvent::AttemptStarted {
                    attempt,
                    max_attempts,
                } => self.report(
                    index,
                    SegmentEvent::AttemptStarted {
                        attempt,
                        max_attempts,
                    },
                ),
                RetryEvent::Retrying {
                    attempt,
                    error,
                    delay,
                } => self.report(
                    index,
                    SegmentEvent::Retrying {
                        attempt,
                        delay,
                        reason: error.to_string(),
                    },
                ),
            },
            move |_attempt| service.generate(descriptor, dest_path, cancel.clone()),
        )
        .await?;

        trim_clip(&clip, segment, self.anchor)
    }

    /// Produce clips for every `(segment, descriptor)` pair.
    ///
    /// Returns the clips sorted by segment index, whatever order they
    /// finished in. Once any segment fails, or `cancel` fires, no new
    /// requests are issued and in-flight ones are abandoned.
    pub async fn produce_all(
        &self,
        plans: &[(Segment, ClipDescriptor)],
        cancel: &CancellationToken,
    ) -> StageResult<Vec<TrimmedClip>> {
        tokio::fs::create_dir_all(&self.clips_dir)
            .await
            .map_err(|e| StageError::io_error("creating clips directory", e))?;

        let stop = cancel.child_token();
        let semaphore = Semaphore::new(self.max_concurrent);

        for (segment, _) in plans {
            self.report(segment.index, SegmentEvent::Queued);
        }

        let mut pending: FuturesUnordered<_> = plans
            .iter()
            .map(|(segment, descriptor)| {
                let stop = &stop;
                let semaphore = &semaphore;
                async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = stop.cancelled() => {
                            return Err(StageError::for_segment(segment.index, StageError::Cancelled));
                        }
                        permit = semaphore.acquire() => permit.map_err(|_| {
                            StageError::for_segment(segment.index, StageError::Cancelled)
                        })?,
                    };
                    self.produce(segment, descriptor, stop).await
                }
            })
            .collect();

        let mut clips = Vec::with_capacity(plans.len());
        let mut failure: Option<StageError> = None;

        while let Some(result) = pending.next().await {
            match result {
                Ok(clip) => clips.push(clip),
                Err(e) => {
                    stop.cancel();
                    // Keep the first real failure over knock-on cancellations
                    let replace = match &failure {
                        None => true,
                        Some(existing) => existing.is_cancelled() && !e.is_cancelled(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            if e.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            return Err(e);
        }

        clips.sort_by_key(|c| c.segment_index);
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::stub::StubVideoClipService;
    use crate::services::ServiceError;
    use crate::timing::align;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn plans(duration: f64) -> Vec<(Segment, ClipDescriptor)> {
        align(duration, 8.0)
            .unwrap()
            .into_iter()
            .map(|s| {
                let d = ClipDescriptor {
                    segment_index: s.index,
                    required_secs: s.duration(),
                    lyrics: format!("line {}", s.index),
                    style: None,
                };
                (s, d)
            })
            .collect()
    }

    fn producer(
        service: Arc<StubVideoClipService>,
        dir: &Path,
        attempts: u32,
        concurrency: usize,
    ) -> ClipProducer {
        ClipProducer::new(service, dir, policy(attempts), concurrency, TrimAnchor::Start)
    }

    #[tokio::test]
    async fn produces_sorted_trimmed_clips() {
        let dir = tempdir().unwrap();
        let service = Arc::new(StubVideoClipService::new(8.0).with_delay(Duration::from_millis(5)));
        let producer = producer(service.clone(), dir.path(), 3, 2);

        let clips = producer
            .produce_all(&plans(20.0), &CancellationToken::new())
            .await
            .unwrap();

        let indices: Vec<usize> = clips.iter().map(|c| c.segment_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let durations: Vec<f64> = clips.iter().map(|c| c.duration_secs).collect();
        assert_eq!(durations, vec![8.0, 8.0, 4.0]);
        assert!(clips[2].source.ends_with("segment_002.mp4"));
        assert!(clips[2].source.exists());
    }

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let dir = tempdir().unwrap();
        let service = Arc::new(StubVideoClipService::new(8.0).with_delay(Duration::from_millis(20)));
        let producer = producer(service.clone(), dir.path(), 1, 2);

        producer
            .produce_all(&plans(60.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(service.calls(), 8);
        assert!(service.max_in_flight() <= 2);
        assert!(service.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn short_clip_fails_without_retry() {
        let dir = tempdir().unwrap();
        let service = Arc::new(StubVideoClipService::new(8.0).with_duration_for(1, 5.0));
        let producer = producer(service.clone(), dir.path(), 3, 1);

        let plans = plans(16.0);
        let err = producer
            .produce(&plans[1].0, &plans[1].1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::ClipTooShort { segment_index: 1, .. }));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let dir = tempdir().unwrap();
        let service = Arc::new(
            StubVideoClipService::new(8.0)
                .fail_segment(0, ServiceError::timeout("stub-video", 600))
                .fail_segment(0, ServiceError::unavailable("stub-video", "503")),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let producer = producer(service.clone(), dir.path(), 3, 1).with_progress(Arc::new(
            move |p: &SegmentProgress| sink.lock().push(p.event.clone()),
        ));

        let plans = plans(8.0);
        let clip = producer
            .produce(&plans[0].0, &plans[0].1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(clip.duration_secs, 8.0);
        assert_eq!(service.calls(), 3);
        let events = events.lock();
        let retries = events
            .iter()
            .filter(|e| matches!(e, SegmentEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 2);
        assert!(matches!(events.last(), Some(SegmentEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let dir = tempdir().unwrap();
        let service = Arc::new(
            StubVideoClipService::new(8.0)
                .fail_segment(0, ServiceError::content_policy("stub-video", "blocked")),
        );
        let producer = producer(service.clone(), dir.path(), 3, 1);

        let plans = plans(8.0);
        let err = producer
            .produce(&plans[0].0, &plans[0].1, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.segment_index(), Some(0));
        assert_eq!(service.calls(), 1);
        match err {
            StageError::Segment { source, .. } => assert!(matches!(*source, StageError::Fatal(_))),
            other => panic!("expected tagged fatal error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_batch() {
        let dir = tempdir().unwrap();
        let service = Arc::new(
            StubVideoClipService::new(8.0)
                .fail_segment(2, ServiceError::rate_limited("stub-video"))
                .fail_segment(2, ServiceError::rate_limited("stub-video")),
        );
        let producer = producer(service, dir.path(), 2, 4);

        let err = producer
            .produce_all(&plans(20.0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.segment_index(), Some(2));
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_token_issues_no_requests() {
        let dir = tempdir().unwrap();
        let service = Arc::new(StubVideoClipService::new(8.0));
        let producer = producer(service.clone(), dir.path(), 3, 2);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = producer.produce_all(&plans(20.0), &cancel).await.unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
        assert_eq!(service.calls(), 0);
    }
}
