use crate::audio::AudioFile;
use crate::cache::{Cached, TranscriptCache};
use crate::config::Config;
use crate::credential::{ApiKey, CredentialStore, API_KEY, SEEN_WELCOME};
use crate::error::TranscribeError;
use crate::progress::{IncrementSource, ProgressSink, ProgressTicker, RandomIncrement};
use crate::whisper::{Transcriber, WhisperClient};
use std::sync::Arc;

/// Builds a client handle from a credential.
pub type Connector<T> = Box<dyn Fn(ApiKey) -> Result<T, TranscribeError> + Send + Sync>;

/// Everything that outlives a single transcription: the stored credential,
/// the client built from it, and the transcript cache.
///
/// The client exists exactly while a valid credential is known. Transcribing
/// needs `&mut self`, so only one attempt can be in flight per session.
pub struct Session<S, T = WhisperClient> {
    store: S,
    config: Config,
    connect: Connector<T>,
    client: Option<T>,
    cache: Option<TranscriptCache>,
}

impl<S: CredentialStore> Session<S, WhisperClient> {
    pub fn whisper(store: S, config: Config) -> Self {
        let client_config = config.clone();
        Self::new(
            store,
            config,
            Box::new(move |key| WhisperClient::new(key, &client_config)),
        )
    }
}

impl<S, T> Session<S, T>
where
    S: CredentialStore,
    T: Transcriber,
{
    pub fn new(store: S, config: Config, connect: Connector<T>) -> Self {
        Self {
            store,
            config,
            connect,
            client: None,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: TranscriptCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Builds the client from `override_key` if given, else from the stored key.
    ///
    /// An override is used as is and never persisted.
    pub fn load(&mut self, override_key: Option<&str>) -> Result<bool, TranscribeError> {
        let raw = match override_key {
            Some(key) => Some(key.to_string()),
            None => self.store.get(API_KEY),
        };
        let Some(raw) = raw else {
            self.client = None;
            return Ok(false);
        };
        let key = ApiKey::parse(&raw)?;
        self.client = Some((self.connect)(key)?);
        Ok(true)
    }

    pub fn stored_key(&self) -> Option<ApiKey> {
        self.store
            .get(API_KEY)
            .and_then(|raw| ApiKey::parse(&raw).ok())
    }

    /// Validates and saves a new key, replacing the current client.
    pub fn set_credential(&mut self, raw: &str) -> anyhow::Result<ApiKey> {
        let key = ApiKey::parse(raw)?;
        let client = (self.connect)(key.clone())?;
        self.store.set(API_KEY, key.expose())?;
        self.client = Some(client);
        Ok(key)
    }

    /// Forgets the stored key and destroys the client built from it.
    pub fn remove_credential(&mut self) -> anyhow::Result<()> {
        self.store.remove(API_KEY)?;
        self.client = None;
        Ok(())
    }

    /// `true` the first time it is called for a given store.
    ///
    /// A store that cannot be written only costs a warning; the welcome is
    /// then shown again next time.
    pub fn first_run(&mut self) -> bool {
        if self.store.get(SEEN_WELCOME).as_deref() == Some("true") {
            return false;
        }
        if let Err(e) = self.store.set(SEEN_WELCOME, "true") {
            log::warn!("could not remember the welcome notice: {e:#}");
        }
        true
    }

    pub async fn transcribe(
        &mut self,
        audio: &AudioFile,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Cached, TranscribeError> {
        self.transcribe_with(audio, sink, RandomIncrement::new())
            .await
    }

    /// Transcribes `audio`, reporting synthetic progress to `sink` while the
    /// request is out.
    ///
    /// The progress ticker is stopped on every way out of here, including the
    /// returned future being dropped.
    pub async fn transcribe_with<I>(
        &mut self,
        audio: &AudioFile,
        sink: Arc<dyn ProgressSink>,
        increments: I,
    ) -> Result<Cached, TranscribeError>
    where
        I: IncrementSource + 'static,
    {
        let client = self.client.as_ref().ok_or(TranscribeError::NotConfigured)?;
        let period = self.config.tick_interval();
        let attempt = move || async move {
            let ticker = ProgressTicker::start(period, increments, sink);
            match client.transcribe(audio).await {
                Ok(transcript) => {
                    ticker.complete();
                    Ok(transcript)
                }
                Err(e) => {
                    ticker.cancel();
                    Err(e)
                }
            }
        };

        match &self.cache {
            Some(cache) => {
                let key = TranscriptCache::key_for(&audio.path, &self.config.model).await?;
                cache.with_cache(&key, attempt).await
            }
            None => attempt().await.map(Cached::Miss),
        }
    }
}
