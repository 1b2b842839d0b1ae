use crate::error::{TranscribeError, ValidationError};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// The transcription endpoint rejects uploads larger than this.
pub const MAX_FILE_SIZE_BYTES: u64 = 25 * 1024 * 1024;

pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// An audio file that is about to be uploaded.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: &'static str,
    pub duration: Option<Duration>,
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" | "mpga" | "mpeg" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "aac" => "audio/aac",
        "mp4" => "video/mp4",
        _ => UNKNOWN_MIME,
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(mime_for_extension)
        .unwrap_or(UNKNOWN_MIME)
}

pub fn is_audio_mime(mime: &str) -> bool {
    mime.starts_with("audio/")
}

/// Type first, then size.
pub fn validate(size_bytes: u64, mime: &str, limit: u64) -> Result<(), ValidationError> {
    if !is_audio_mime(mime) {
        return Err(ValidationError::NotAudio {
            mime: mime.to_string(),
        });
    }
    if size_bytes > limit {
        return Err(ValidationError::FileTooLarge {
            size: size_bytes,
            limit,
        });
    }
    Ok(())
}

/// Size in MB with two decimals, as shown next to the file name.
pub fn describe_size(size_bytes: u64) -> String {
    format!("{:.2} MB", size_bytes as f64 / (1024.0 * 1024.0))
}

impl AudioFile {
    pub fn open(path: &Path, limit: u64) -> Result<Self, TranscribeError> {
        let size_bytes = std::fs::metadata(path)?.len();
        let mime_type = mime_for_path(path);
        validate(size_bytes, mime_type, limit)?;

        let duration = match read_duration(path) {
            Ok(duration) => duration,
            Err(e) => {
                log::warn!("could not read the duration of '{}': {e:#}", path.display());
                None
            }
        };

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size_bytes,
            mime_type,
            duration,
        })
    }

    /// File name without its extension, used to name the exported files.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("transcription"))
    }
}

fn read_duration(path: &Path) -> anyhow::Result<Option<Duration>> {
    let src = std::fs::File::open(path).context("failed to open media")?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let media = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .context("unsupported format")?;
    let Some(track) = media.format.default_track() else {
        return Ok(None);
    };
    let (Some(time_base), Some(n_frames)) =
        (track.codec_params.time_base, track.codec_params.n_frames)
    else {
        return Ok(None);
    };
    let length = time_base.calc_time(n_frames);
    Ok(Some(
        Duration::from_secs(length.seconds) + Duration::from_secs_f64(length.frac),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(sample_rate: u32, seconds: u32) -> Vec<u8> {
        let data_len = sample_rate * 2 * seconds;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        bytes
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for_path(Path::new("talk.MP3")), "audio/mpeg");
        assert_eq!(mime_for_path(Path::new("talk.m4a")), "audio/mp4");
        assert_eq!(mime_for_path(Path::new("notes.txt")), UNKNOWN_MIME);
        assert_eq!(mime_for_path(Path::new("noext")), UNKNOWN_MIME);
        assert!(!is_audio_mime(mime_for_path(Path::new("clip.mp4"))));
    }

    #[test]
    fn validation_order() {
        assert_eq!(validate(10, "audio/wav", MAX_FILE_SIZE_BYTES), Ok(()));
        assert_eq!(
            validate(MAX_FILE_SIZE_BYTES, "audio/wav", MAX_FILE_SIZE_BYTES),
            Ok(())
        );
        assert_eq!(
            validate(MAX_FILE_SIZE_BYTES + 1, "audio/wav", MAX_FILE_SIZE_BYTES),
            Err(ValidationError::FileTooLarge {
                size: MAX_FILE_SIZE_BYTES + 1,
                limit: MAX_FILE_SIZE_BYTES
            })
        );
        assert_eq!(
            validate(MAX_FILE_SIZE_BYTES + 1, "text/plain", MAX_FILE_SIZE_BYTES),
            Err(ValidationError::NotAudio {
                mime: String::from("text/plain")
            })
        );
    }

    #[test]
    fn too_large_message() {
        let e = validate(30 * 1024 * 1024, "audio/mpeg", MAX_FILE_SIZE_BYTES).unwrap_err();
        assert!(e.to_string().contains("Maximum size is 25 MB"));
    }

    #[test]
    fn sizes() {
        assert_eq!(describe_size(0), "0.00 MB");
        assert_eq!(describe_size(1024 * 1024 * 3 / 2), "1.50 MB");
    }

    #[test]
    fn open_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.wav");
        std::fs::write(&path, wav(8000, 2)).unwrap();

        let audio = AudioFile::open(&path, MAX_FILE_SIZE_BYTES).unwrap();
        assert_eq!(audio.name, "meeting.wav");
        assert_eq!(audio.stem(), "meeting");
        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(audio.size_bytes, 44 + 32_000);
        let duration = audio.duration.expect("wav has a known length");
        assert!((duration.as_secs_f64() - 2.0).abs() < 0.01);
    }

    #[test]
    fn unreadable_audio_still_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp3");
        std::fs::write(&path, b"definitely not mpeg").unwrap();
        let audio = AudioFile::open(&path, MAX_FILE_SIZE_BYTES).unwrap();
        assert_eq!(audio.duration, None);
    }

    #[test]
    fn rejects_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(matches!(
            AudioFile::open(&path, MAX_FILE_SIZE_BYTES),
            Err(TranscribeError::Validation(ValidationError::NotAudio { .. }))
        ));

        let path = dir.path().join("long.flac");
        std::fs::File::create(&path)
            .unwrap()
            .set_len(2048)
            .unwrap();
        assert!(matches!(
            AudioFile::open(&path, 1024),
            Err(TranscribeError::Validation(ValidationError::FileTooLarge { .. }))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            AudioFile::open(Path::new("/definitely/not/here.mp3"), MAX_FILE_SIZE_BYTES),
            Err(TranscribeError::Io(_))
        ));
    }
}
