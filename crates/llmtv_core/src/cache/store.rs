//! On-disk artifact store keyed by MD5.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors from cache writes and maintenance.
///
/// Reads never fail; an unreadable entry is a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Directory of cached JSON values and files.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// MD5 of the JSON array of `parts`.
    pub fn key(parts: &[Value]) -> String {
        let json = Value::Array(parts.to_vec()).to_string();
        format!("{:x}", md5::compute(json.as_bytes()))
    }

    /// MD5 of a file's contents.
    pub fn file_digest(path: &Path) -> CacheResult<String> {
        let bytes =
            fs::read(path).map_err(|e| CacheError::io(format!("reading {}", path.display()), e))?;
        Ok(format!("{:x}", md5::compute(&bytes)))
    }

    fn entry_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ext))
    }

    /// Cached JSON value, or `None` when absent or unreadable.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key, "json");
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let content = serde_json::to_string(value)?;
        self.write_atomic(&self.entry_path(key, "json"), content.as_bytes())
    }

    /// Path of a cached file, if present.
    pub fn get_file(&self, key: &str, ext: &str) -> Option<PathBuf> {
        let path = self.entry_path(key, ext);
        path.is_file().then_some(path)
    }

    /// Copy `src` into the cache.
    pub fn put_file(&self, key: &str, ext: &str, src: &Path) -> CacheResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.entry_path(key, ext);
        let temp = path.with_extension(format!("{}.tmp", ext));
        fs::copy(src, &temp)
            .map_err(|e| CacheError::io(format!("copying {} into cache", src.display()), e))?;
        fs::rename(&temp, &path)
            .map_err(|e| CacheError::io(format!("publishing {}", path.display()), e))?;
        Ok(path)
    }

    /// Copy a cached file to `dest`. Returns false on a miss.
    pub fn restore_file(&self, key: &str, ext: &str, dest: &Path) -> CacheResult<bool> {
        let Some(cached) = self.get_file(key, ext) else {
            return Ok(false);
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::copy(&cached, dest)
            .map_err(|e| CacheError::io(format!("restoring {}", dest.display()), e))?;
        Ok(true)
    }

    /// Remove every entry. Returns the number of files removed.
    pub fn clear(&self) -> CacheResult<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries =
            fs::read_dir(&self.dir).map_err(|e| CacheError::io("listing cache", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io("listing cache", e))?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path)
                    .map_err(|e| CacheError::io(format!("removing {}", path.display()), e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn ensure_dir(&self) -> CacheResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| CacheError::io(format!("creating {}", self.dir.display()), e))
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> CacheResult<()> {
        self.ensure_dir()?;
        let temp = path.with_extension("tmp");
        fs::write(&temp, content)
            .map_err(|e| CacheError::io(format!("writing {}", temp.display()), e))?;
        fs::rename(&temp, path)
            .map_err(|e| CacheError::io(format!("publishing {}", path.display()), e))
    }
}
