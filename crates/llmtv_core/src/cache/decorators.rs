//! Service wrappers that consult the artifact cache first.
//!
//! Keys combine a kind tag, the request, and the wrapped service's name,
//! so switching models never returns another model's output. A failed
//! cache write is logged and the fresh result is returned anyway.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::models::{AudioTrack, ClipDescriptor, LyricsDocument, Prompt, RawTranscription, VideoClip};
use crate::services::{
    LyricsService, MusicService, ServiceResult, TranscriptionService, VideoClipService,
};

use super::store::{ArtifactCache, CacheResult};

/// Sidecar stored next to a cached media file.
#[derive(Debug, Serialize, Deserialize)]
struct MediaEntry {
    duration_secs: f64,
}

fn warn_on_write_failure(kind: &str, result: CacheResult<()>) {
    if let Err(e) = result {
        tracing::warn!("Could not cache {}: {}", kind, e);
    }
}

/// Store a media file plus its duration sidecar.
fn store_media(cache: &ArtifactCache, key: &str, ext: &str, src: &Path, duration_secs: f64) -> CacheResult<()> {
    cache.put_file(key, ext, src)?;
    cache.put_json(key, &MediaEntry { duration_secs })
}

/// Copy a cached media file to `dest`, returning its duration on a hit.
fn restore_media(cache: &ArtifactCache, key: &str, ext: &str, dest: &Path) -> Option<f64> {
    let entry: MediaEntry = cache.get_json(key)?;
    match cache.restore_file(key, ext, dest) {
        Ok(true) => Some(entry.duration_secs),
        Ok(false) => None,
        Err(e) => {
            tracing::warn!("Ignoring cache entry {}: {}", key, e);
            None
        }
    }
}

pub struct CachedLyricsService {
    inner: Arc<dyn LyricsService>,
    cache: Arc<ArtifactCache>,
}

impl CachedLyricsService {
    pub fn new(inner: Arc<dyn LyricsService>, cache: Arc<ArtifactCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LyricsService for CachedLyricsService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &Prompt) -> ServiceResult<LyricsDocument> {
        let key = ArtifactCache::key(&[json!("lyrics"), json!(prompt.concept()), json!(self.inner.name())]);
        if let Some(document) = self.cache.get_json::<LyricsDocument>(&key) {
            tracing::info!("Lyrics cache hit ({})", key);
            return Ok(document);
        }

        let document = self.inner.generate(prompt).await?;
        warn_on_write_failure("lyrics", self.cache.put_json(&key, &document));
        Ok(document)
    }
}

pub struct CachedMusicService {
    inner: Arc<dyn MusicService>,
    cache: Arc<ArtifactCache>,
}

impl CachedMusicService {
    pub fn new(inner: Arc<dyn MusicService>, cache: Arc<ArtifactCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl MusicService for CachedMusicService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        lyrics: &LyricsDocument,
        style: &str,
        dest: &Path,
    ) -> ServiceResult<AudioTrack> {
        let key = ArtifactCache::key(&[
            json!("music"),
            json!(lyrics.to_tagged_text()),
            json!(style),
            json!(self.inner.name()),
        ]);
        if let Some(duration) = restore_media(&self.cache, &key, "mp3", dest) {
            tracing::info!("Music cache hit ({})", key);
            return Ok(AudioTrack::new(dest, duration));
        }

        let track = self.inner.generate(lyrics, style, dest).await?;
        warn_on_write_failure(
            "song",
            store_media(&self.cache, &key, "mp3", &track.path, track.duration_secs),
        );
        Ok(track)
    }
}

/// Keyed by the audio content, so a regenerated song is transcribed again.
pub struct CachedTranscriptionService {
    inner: Arc<dyn TranscriptionService>,
    cache: Arc<ArtifactCache>,
}

impl CachedTranscriptionService {
    pub fn new(inner: Arc<dyn TranscriptionService>, cache: Arc<ArtifactCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl TranscriptionService for CachedTranscriptionService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn transcribe(&self, audio: &AudioTrack) -> ServiceResult<RawTranscription> {
        let key = match ArtifactCache::file_digest(&audio.path) {
            Ok(digest) => Some(ArtifactCache::key(&[
                json!("transcription"),
                json!(digest),
                json!(self.inner.name()),
            ])),
            Err(e) => {
                tracing::debug!("Not caching transcription: {}", e);
                None
            }
        };

        if let Some(raw) = key.as_deref().and_then(|k| self.cache.get_json::<RawTranscription>(k)) {
            tracing::info!("Transcription cache hit");
            return Ok(raw);
        }

        let raw = self.inner.transcribe(audio).await?;
        if let Some(key) = key {
            warn_on_write_failure("transcription", self.cache.put_json(&key, &raw));
        }
        Ok(raw)
    }
}

/// Only clips long enough for their segment are stored or served.
pub struct CachedVideoClipService {
    inner: Arc<dyn VideoClipService>,
    cache: Arc<ArtifactCache>,
}

impl CachedVideoClipService {
    pub fn new(inner: Arc<dyn VideoClipService>, cache: Arc<ArtifactCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl VideoClipService for CachedVideoClipService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        descriptor: &ClipDescriptor,
        dest: &Path,
        cancel: CancellationToken,
    ) -> ServiceResult<VideoClip> {
        let key = ArtifactCache::key(&[
            json!("video"),
            json!(descriptor.prompt_text()),
            json!(descriptor.segment_index),
            json!(self.inner.name()),
        ]);
        match restore_media(&self.cache, &key, "mp4", dest) {
            Some(duration) if descriptor.is_long_enough(duration) => {
                tracing::info!("Clip cache hit for segment {}", descriptor.segment_index);
                return Ok(VideoClip {
                    segment_index: descriptor.segment_index,
                    path: dest.to_path_buf(),
                    native_duration_secs: duration,
                });
            }
            Some(duration) => tracing::info!(
                "Ignoring cached {:.3}s clip for segment {}",
                duration,
                descriptor.segment_index
            ),
            None => {}
        }

        let clip = self.inner.generate(descriptor, dest, cancel).await?;
        // A short clip fails the segment and must not come back on a rerun
        if descriptor.is_long_enough(clip.native_duration_secs) {
            warn_on_write_failure(
                "clip",
                store_media(&self.cache, &key, "mp4", &clip.path, clip.native_duration_secs),
            );
        }
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawChunk;
    use crate::services::stub::{
        sample_lyrics, StubLyricsService, StubMusicService, StubTranscriptionService,
        StubVideoClipService,
    };
    use crate::services::ServiceError;
    use tempfile::tempdir;

    fn cache_in(dir: &Path) -> Arc<ArtifactCache> {
        Arc::new(ArtifactCache::new(dir.join("cache")))
    }

    #[tokio::test]
    async fn lyrics_are_served_from_cache_on_second_call() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubLyricsService::new(sample_lyrics()));
        let cached = CachedLyricsService::new(stub.clone(), cache_in(dir.path()));
        let prompt = Prompt::new("neon cats", None).unwrap();

        let first = cached.generate(&prompt).await.unwrap();
        let second = cached.generate(&prompt).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(
            StubLyricsService::new(sample_lyrics())
                .fail_with(ServiceError::rate_limited("stub-lyrics")),
        );
        let cached = CachedLyricsService::new(stub.clone(), cache_in(dir.path()));
        let prompt = Prompt::new("neon cats", None).unwrap();

        assert!(cached.generate(&prompt).await.is_err());
        assert!(cached.generate(&prompt).await.is_ok());
        assert!(cached.generate(&prompt).await.is_ok());
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn music_hit_restores_file_and_duration() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubMusicService::new(42.5));
        let cached = CachedMusicService::new(stub.clone(), cache_in(dir.path()));
        let lyrics = sample_lyrics();

        let first_dest = dir.path().join("run1").join("song.mp3");
        cached.generate(&lyrics, "synthwave", &first_dest).await.unwrap();

        let second_dest = dir.path().join("run2").join("song.mp3");
        let track = cached.generate(&lyrics, "synthwave", &second_dest).await.unwrap();

        assert_eq!(stub.calls(), 1);
        assert_eq!(track.duration_secs, 42.5);
        assert_eq!(track.path, second_dest);
        assert_eq!(
            std::fs::read(&first_dest).unwrap(),
            std::fs::read(&second_dest).unwrap()
        );

        // Different style is a different song
        cached.generate(&lyrics, "polka", &second_dest).await.unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn transcription_is_keyed_by_audio_content() {
        let dir = tempdir().unwrap();
        let raw = RawTranscription {
            text: "hello".to_string(),
            chunks: vec![RawChunk {
                text: "hello".to_string(),
                timestamp: (Some(0.0), Some(1.0)),
            }],
        };
        let stub = Arc::new(StubTranscriptionService::new(raw.clone()));
        let cached = CachedTranscriptionService::new(stub.clone(), cache_in(dir.path()));

        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.mp3");
        let c = dir.path().join("c.mp3");
        std::fs::write(&a, b"song one").unwrap();
        std::fs::write(&b, b"song one").unwrap();
        std::fs::write(&c, b"song two").unwrap();

        assert_eq!(cached.transcribe(&AudioTrack::new(&a, 1.0)).await.unwrap(), raw);
        cached.transcribe(&AudioTrack::new(&b, 1.0)).await.unwrap();
        assert_eq!(stub.calls(), 1);

        cached.transcribe(&AudioTrack::new(&c, 1.0)).await.unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn clips_are_keyed_by_prompt_and_segment() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubVideoClipService::new(8.0));
        let cached = CachedVideoClipService::new(stub.clone(), cache_in(dir.path()));
        let descriptor = ClipDescriptor {
            segment_index: 0,
            required_secs: 8.0,
            lyrics: "neon cats".to_string(),
            style: Some("synthwave".to_string()),
        };

        let dest = dir.path().join("clips").join("segment_000.mp4");
        cached.generate(&descriptor, &dest, CancellationToken::new()).await.unwrap();
        std::fs::remove_file(&dest).unwrap();

        let clip = cached.generate(&descriptor, &dest, CancellationToken::new()).await.unwrap();
        assert_eq!(stub.calls(), 1);
        assert!(dest.exists());
        assert_eq!(clip.native_duration_secs, 8.0);

        let other = ClipDescriptor {
            segment_index: 1,
            ..descriptor
        };
        cached
            .generate(&other, &dir.path().join("clips").join("segment_001.mp4"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn short_clips_are_never_cached() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let descriptor = ClipDescriptor {
            segment_index: 1,
            required_secs: 8.0,
            lyrics: "neon cats".to_string(),
            style: None,
        };
        let dest = dir.path().join("clips").join("segment_001.mp4");

        let short = Arc::new(StubVideoClipService::new(8.0).with_duration_for(1, 6.5));
        let cached = CachedVideoClipService::new(short.clone(), Arc::clone(&cache));
        let clip = cached.generate(&descriptor, &dest, CancellationToken::new()).await.unwrap();
        assert_eq!(clip.native_duration_secs, 6.5);

        let healthy = Arc::new(StubVideoClipService::new(8.0));
        let cached = CachedVideoClipService::new(healthy.clone(), cache);
        let clip = cached.generate(&descriptor, &dest, CancellationToken::new()).await.unwrap();
        assert_eq!(healthy.calls(), 1);
        assert_eq!(clip.native_duration_secs, 8.0);
    }

    #[tokio::test]
    async fn stale_short_entry_is_regenerated() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let stub = Arc::new(StubVideoClipService::new(8.0));
        let descriptor = ClipDescriptor {
            segment_index: 0,
            required_secs: 8.0,
            lyrics: "neon cats".to_string(),
            style: None,
        };
        let key = ArtifactCache::key(&[
            json!("video"),
            json!(descriptor.prompt_text()),
            json!(0),
            json!(stub.name()),
        ]);
        let stale = dir.path().join("stale.mp4");
        std::fs::write(&stale, b"short").unwrap();
        store_media(&cache, &key, "mp4", &stale, 7.0).unwrap();

        let cached = CachedVideoClipService::new(stub.clone(), cache);
        let dest = dir.path().join("clips").join("segment_000.mp4");
        let clip = cached.generate(&descriptor, &dest, CancellationToken::new()).await.unwrap();

        assert_eq!(stub.calls(), 1);
        assert_eq!(clip.native_duration_secs, 8.0);
    }
}
