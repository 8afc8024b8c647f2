//! Content-addressed reuse of generated artifacts across runs.
//!
//! - **store**: `ArtifactCache`, JSON values and media files under MD5 keys
//! - **decorators**: service wrappers that check the cache before calling out

mod decorators;
mod store;

pub use decorators::{
    CachedLyricsService, CachedMusicService, CachedTranscriptionService, CachedVideoClipService,
};
pub use store::{ArtifactCache, CacheError, CacheResult};
