use crate::audio::AudioFile;
use crate::config::Config;
use crate::credential::ApiKey;
use crate::error::TranscribeError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use tokio_util::codec::{BytesCodec, FramedRead};

pub const GENERIC_FAILURE: &str =
    "Error transcribing audio. Please check your API key and try again.";

/// Turns an audio file into a transcript. There is no partial result.
pub trait Transcriber {
    fn transcribe(
        &self,
        audio: &AudioFile,
    ) -> impl Future<Output = Result<String, TranscribeError>> + Send;
}

#[derive(Deserialize, Debug)]
struct WhisperTranscribeResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct WhisperErrorResponse {
    error: WhisperErrorDetail,
}

#[derive(Deserialize, Debug)]
struct WhisperErrorDetail {
    message: String,
    // NOTE: ignoring type, param and code
}

/// Best human-readable message in an error response body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<WhisperErrorResponse>(body) {
        Ok(res) if !res.error.message.trim().is_empty() => res.error.message,
        _ => String::from(GENERIC_FAILURE),
    }
}

/// Handle to the transcription endpoint, bound to one API key.
#[derive(Debug, Clone)]
pub struct WhisperClient {
    http: reqwest::Client,
    api_key: ApiKey,
    endpoint: String,
    model: String,
}

impl WhisperClient {
    pub fn new(api_key: ApiKey, config: &Config) -> Result<Self, TranscribeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }
}

impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &AudioFile) -> Result<String, TranscribeError> {
        let file = tokio::fs::File::open(&audio.path).await?;
        let part = Part::stream_with_length(
            reqwest::Body::wrap_stream(FramedRead::new(file, BytesCodec::new())),
            audio.size_bytes,
        )
        .file_name(audio.name.clone())
        .mime_str(audio.mime_type)?;

        log::debug!(
            "posting {} ({} bytes) to {} as {}",
            audio.name,
            audio.size_bytes,
            self.endpoint,
            self.model
        );
        let res = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .header("Accept", "application/json")
            .multipart(
                Form::new()
                    .part("file", part)
                    .text("model", self.model.clone()),
            )
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| String::from("<failed to read>"));
            log::debug!("transcription failed with {status}: {body}");
            return Err(TranscribeError::Remote {
                status,
                message: error_message(&body),
            });
        }

        let res: WhisperTranscribeResponse = res.json().await?;
        Ok(res.text)
    }
}
