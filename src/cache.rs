use anyhow::Context;
use sha256::digest;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Finished transcripts on disk, addressed by a digest of the audio they came from.
#[derive(Debug, Clone)]
pub struct TranscriptCache {
    dir: PathBuf,
}

impl TranscriptCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for `audio` transcribed with `model`.
    pub async fn key_for(audio: &Path, model: &str) -> std::io::Result<String> {
        let bytes = tokio::fs::read(audio).await?;
        Ok(format!("{model}-{}", digest(bytes)))
    }

    fn entry(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entry = self.entry(key);
        if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
            return Ok(None);
        }
        let transcript = tokio::fs::read_to_string(&entry)
            .await
            .with_context(|| format!("read transcript cache from '{}'", entry.display()))?;
        Ok(Some(transcript))
    }

    pub async fn put(&self, key: &str, transcript: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create cache directory '{}'", self.dir.display()))?;
        let entry = self.entry(key);
        tokio::fs::write(&entry, transcript)
            .await
            .with_context(|| format!("write out transcript cache to '{}'", entry.display()))
    }

    /// Returns the cached transcript for `key`, or runs `on_miss` and remembers its result.
    ///
    /// Failures of `on_miss` are never cached. A cache that cannot be read or
    /// written only costs a warning.
    pub async fn with_cache<F, FF, E>(&self, key: &str, on_miss: F) -> Result<Cached, E>
    where
        F: FnOnce() -> FF,
        FF: Future<Output = Result<String, E>>,
    {
        match self.get(key).await {
            Ok(Some(transcript)) => {
                log::info!("satisfied with cache hit for {key}");
                return Ok(Cached::Hit(transcript));
            }
            Ok(None) => log::debug!("cache miss for {key}"),
            Err(e) => log::warn!("ignoring unreadable cache entry: {e:#}"),
        }
        let transcript = on_miss().await?;
        if let Err(e) = self.put(key, &transcript).await {
            log::warn!("could not cache transcript: {e:#}");
        }
        Ok(Cached::Miss(transcript))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached {
    Hit(String),
    Miss(String),
}

impl Cached {
    pub fn is_hit(&self) -> bool {
        matches!(self, Cached::Hit(_))
    }

    pub fn into_inner(self) -> String {
        match self {
            Cached::Hit(s) | Cached::Miss(s) => s,
        }
    }
}
