use thiserror::Error;

/// Problems detected before anything is sent to the transcription service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a valid OpenAI API key starting with 'sk-'")]
    InvalidApiKey,

    #[error("File is too large ({size} bytes). Maximum size is {} MB.", .limit / (1024 * 1024))]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Please upload an audio file (got {mime})")]
    NotAudio { mime: String },
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("no API key configured; run `whisper-captions key set <KEY>` or set OPENAI_API_KEY")]
    NotConfigured,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service answered, but not with a transcript.
    #[error("{message} (HTTP status: {status})")]
    Remote {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("issue transcribe request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("read audio: {0}")]
    Io(#[from] std::io::Error),
}
