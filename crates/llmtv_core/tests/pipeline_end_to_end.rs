//! End-to-end runs of the standard pipeline against stub collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::tempdir;

use llmtv_core::cache::ArtifactCache;
use llmtv_core::config::Settings;
use llmtv_core::models::Prompt;
use llmtv_core::orchestrator::{
    PipelineError, RunCallbacks, RunProcessor, RunState, StageError, RUN_STATE_FILE,
};
use llmtv_core::producer::{SegmentEvent, SegmentProgress};
use llmtv_core::services::stub::{StubAssemblyEngine, StubServices, StubVideoClipService};
use llmtv_core::services::ServiceError;

fn settings_in(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.output_folder = root.join("downloads").to_string_lossy().to_string();
    settings.paths.temp_root = root.join("temp").to_string_lossy().to_string();
    settings.paths.logs_folder = root.join("logs").to_string_lossy().to_string();
    settings.paths.cache_folder = root.join("cache").to_string_lossy().to_string();
    settings.clips.initial_backoff_secs = 0;
    settings.services.initial_backoff_secs = 0;
    settings
}

fn prompt() -> Prompt {
    Prompt::new("neon cats riding a night train", Some("synthwave".to_string())).unwrap()
}

#[tokio::test]
async fn twenty_second_song_yields_three_segments() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0);
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let outcome = processor.run(prompt()).await;
    let video = outcome.result.as_ref().unwrap();

    assert_eq!(video.segment_boundaries, vec![0.0, 8.0, 16.0, 20.0]);
    assert_eq!(video.segment_count(), 3);
    assert!((video.duration_secs - 20.0).abs() < 1e-9);
    assert!(video.path.exists());
    assert!(video.audio_path.exists());

    let plans = stubs.assembly.plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].audio.duration_secs, 20.0);
    let windows: Vec<(usize, f64)> = plans[0]
        .clips
        .iter()
        .map(|c| (c.segment_index, c.duration_secs))
        .collect();
    assert_eq!(windows, vec![(0, 8.0), (1, 8.0), (2, 4.0)]);

    assert_eq!(stubs.video.calls(), 3);
    assert!(stubs
        .video
        .prompts()
        .iter()
        .all(|p| p.contains("synthwave")));

    // Intermediates are removed after success by default
    assert!(!outcome.work_dir.exists());
    assert!(outcome.log_path.as_ref().unwrap().exists());
}

#[tokio::test]
async fn exact_multiple_has_no_trailing_segment() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(8.0);
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let video = processor.run(prompt()).await.result.unwrap();
    assert_eq!(video.segment_boundaries, vec![0.0, 8.0]);
    assert_eq!(stubs.video.calls(), 1);
}

#[tokio::test]
async fn short_clip_fails_the_clips_stage_with_its_segment() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0)
        .with_video(StubVideoClipService::new(8.0).with_duration_for(1, 6.5));
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let outcome = processor.run(prompt()).await;

    match &outcome.result {
        Err(PipelineError::StageFailed {
            stage_name,
            segment,
            source,
            ..
        }) => {
            assert_eq!(stage_name, "Clips");
            assert_eq!(*segment, Some(1));
            assert!(matches!(source, StageError::ClipTooShort { .. }));
        }
        other => panic!("expected ClipTooShort at Clips, got {:?}", other),
    }

    // No final artifact, working directory kept for inspection
    assert!(stubs.assembly.plans().is_empty());
    assert!(outcome.work_dir.exists());
    let state = RunState::load(&outcome.work_dir.join(RUN_STATE_FILE)).unwrap();
    assert_eq!(state.segments.as_ref().map(Vec::len), Some(3));
    assert!(state.clips.is_none());
}

#[tokio::test]
async fn rerun_after_short_clip_asks_for_a_new_clip() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(dir.path().join("cache")));

    let failing = StubServices::standard(20.0)
        .with_video(StubVideoClipService::new(8.0).with_duration_for(1, 6.5));
    let mut settings = settings_in(dir.path());
    settings.clips.max_concurrent = 1;
    let processor = RunProcessor::new(
        settings.clone(),
        failing.services().with_cache(Arc::clone(&cache)),
    );
    assert!(!processor.run(prompt()).await.is_success());

    let healthy = StubServices::standard(20.0);
    let processor = RunProcessor::new(settings, healthy.services().with_cache(cache));
    let outcome = processor.run(prompt()).await;

    assert!(outcome.is_success(), "{:?}", outcome.result);
    // Segment 0 comes from the cache; segment 1 is generated again and 2 for the first time
    assert_eq!(healthy.video.calls(), 2);
    assert_eq!(healthy.lyrics.calls(), 0);
}

#[tokio::test]
async fn transient_clip_failures_are_retried() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0).with_video(
        StubVideoClipService::new(8.0)
            .fail_segment(2, ServiceError::rate_limited("stub-video"))
            .fail_segment(2, ServiceError::timeout("stub-video", 1)),
    );
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let outcome = processor.run(prompt()).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(stubs.video.calls(), 5);
}

#[tokio::test]
async fn fatal_clip_failure_is_not_retried() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0).with_video(
        StubVideoClipService::new(8.0)
            .fail_segment(0, ServiceError::content_policy("stub-video", "blocked")),
    );
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let outcome = processor.run(prompt()).await;
    match outcome.result {
        Err(PipelineError::StageFailed {
            ref stage_name,
            segment,
            ..
        }) => {
            assert_eq!(stage_name, "Clips");
            assert_eq!(segment, Some(0));
        }
        ref other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn rendered_duration_mismatch_aborts_without_output() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0)
        .with_assembly(StubAssemblyEngine::new().with_rendered_duration(19.0));
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let outcome = processor.run(prompt()).await;
    let err = outcome.result.unwrap_err();
    assert_eq!(err.stage_name(), Some("Assemble"));
    assert!(matches!(
        err,
        PipelineError::StageFailed {
            source: StageError::DurationMismatch { .. },
            ..
        }
    ));

    let final_path = Path::new(&processor.settings().paths.output_folder)
        .join(&outcome.run_id)
        .join(&processor.settings().assembly.final_file_name);
    assert!(!final_path.exists());
}

#[tokio::test]
async fn failed_run_replays_recent_tool_output() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0)
        .with_assembly(StubAssemblyEngine::new().with_rendered_duration(19.0));
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let callbacks = RunCallbacks {
        log: Some(Box::new(move |line: &str| sink.lock().push(line.to_string()))),
        ..Default::default()
    };

    let outcome = processor.run_with_callbacks(prompt(), callbacks).await;
    assert!(!outcome.is_success());

    let lines = lines.lock();
    assert!(lines.iter().any(|l| l.contains("$ stub-assembly 3 clips")));
    let header = lines
        .iter()
        .position(|l| l.ends_with("[Recent service output/tail]"))
        .expect("tail shown after failure");
    assert!(lines[header..].iter().any(|l| l.contains("19.000s")));
}

#[tokio::test]
async fn cancellation_before_start_produces_nothing() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0);
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    processor.cancel_handle().cancel();
    let outcome = processor.run(prompt()).await;

    assert!(matches!(outcome.result, Err(PipelineError::Cancelled { .. })));
    assert_eq!(stubs.lyrics.calls(), 0);
}

#[tokio::test]
async fn cancellation_during_clips_stops_new_requests() {
    let dir = tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    settings.clips.max_concurrent = 1;

    let stubs = StubServices::standard(40.0)
        .with_video(StubVideoClipService::new(8.0).with_delay(Duration::from_millis(200)));
    let processor = RunProcessor::new(settings, stubs.services());
    let handle = processor.cancel_handle();

    let callbacks = RunCallbacks {
        segment: Some(Arc::new(move |progress: &SegmentProgress| {
            if matches!(progress.event, SegmentEvent::AttemptStarted { .. }) {
                handle.cancel();
            }
        })),
        ..Default::default()
    };

    let outcome = processor.run_with_callbacks(prompt(), callbacks).await;

    assert!(matches!(outcome.result, Err(PipelineError::Cancelled { .. })));
    assert!(stubs.video.calls() <= 1);
    assert!(stubs.assembly.plans().is_empty());
}

#[tokio::test]
async fn progress_reaches_every_stage() {
    let dir = tempdir().unwrap();
    let stubs = StubServices::standard(20.0);
    let processor = RunProcessor::new(settings_in(dir.path()), stubs.services());

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stages);
    let callbacks = RunCallbacks {
        progress: Some(Box::new(move |stage: &str, _percent: u32, _msg: &str| {
            seen.lock().push(stage.to_string());
        })),
        ..Default::default()
    };

    assert!(processor
        .run_with_callbacks(prompt(), callbacks)
        .await
        .is_success());
    assert_eq!(
        *stages.lock(),
        vec!["Lyrics", "Music", "Transcribe", "Align", "Clips", "Assemble", "Complete"]
    );
}

#[tokio::test]
async fn keep_intermediates_preserves_work_dir() {
    let dir = tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    settings.paths.keep_intermediates = true;
    let stubs = StubServices::standard(12.0);
    let processor = RunProcessor::new(settings, stubs.services());

    let outcome = processor.run(prompt()).await;
    assert!(outcome.is_success());
    assert!(outcome.work_dir.join("clips").join("segment_001.mp4").exists());

    let state = RunState::load(&outcome.work_dir.join(RUN_STATE_FILE)).unwrap();
    assert_eq!(state.style.as_deref(), Some("synthwave"));
    assert!(state.final_video.is_some());
}
