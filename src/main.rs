use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;
use whisper_captions::audio::{self, describe_size, AudioFile};
use whisper_captions::cache::TranscriptCache;
use whisper_captions::config::{self, Config};
use whisper_captions::credential::FileCredentialStore;
use whisper_captions::cue::ExportFormat;
use whisper_captions::error::TranscribeError;
use whisper_captions::export::write_export;
use whisper_captions::progress::{ProgressSink, ProgressSnapshot};
use whisper_captions::session::Session;

const WELCOME: &str = "\
Welcome! This tool turns your audio into transcriptions using OpenAI's Whisper model.

  1. Save your OpenAI API key (required only once): whisper-captions key set sk-...
  2. Transcribe a file or a directory:              whisper-captions transcribe talk.mp3
  3. Pick your formats:                             --format txt,srt,vtt

Your API key is stored locally and only ever sent to OpenAI.
";

/// Transcribe audio with the OpenAI Whisper API and export text, SRT or WebVTT.
#[derive(Parser)]
#[command(name = "whisper-captions", version)]
struct Cli {
    /// Configuration file (defaults to whisper-captions/config.toml in the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the stored OpenAI API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Transcribe an audio file, or every audio file under a directory.
    Transcribe {
        path: PathBuf,

        #[command(flatten)]
        export: ExportArgs,

        /// Always call the service, even if this audio was transcribed before.
        #[arg(long)]
        no_cache: bool,
    },

    /// Turn an existing transcript into subtitles without calling the service.
    Convert {
        /// Transcript text file (stdin if omitted).
        input: Option<PathBuf>,

        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Validate and store a key (it must start with "sk-").
    Set { key: String },
    /// Forget the stored key.
    Remove,
    /// Show whether a key is configured.
    Status,
}

#[derive(Args)]
struct ExportArgs {
    /// Formats to write (comma-separated).
    #[arg(short, long = "format", value_enum, value_delimiter = ',', default_value = "txt")]
    formats: Vec<ExportFormat>,

    /// Output directory. Defaults to the audio file's directory; `convert` prints to stdout.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Length of every subtitle cue in seconds.
    #[arg(long)]
    seconds_per_cue: Option<f64>,
}

struct BarSink(ProgressBar);

impl ProgressSink for BarSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        self.0.set_position(snapshot.percent.round() as u64);
        match snapshot.remaining {
            Some(remaining) => self.0.set_message(format!("Estimated time: {remaining}")),
            None => self.0.set_message(""),
        }
    }
}

fn progress_bar(name: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template(" .. {prefix} [{bar:30}] {pos:>3}% {msg}")
            .expect("progress template is valid")
            .progress_chars("=> "),
    );
    pb.set_prefix(name.to_string());
    pb
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())
        .await
        .context("load config")?;
    match &cli.command {
        Command::Transcribe {
            export, no_cache, ..
        } => {
            apply_overrides(&mut config, export)?;
            if *no_cache {
                config.cache = false;
            }
        }
        Command::Convert { export, .. } => apply_overrides(&mut config, export)?,
        Command::Key { .. } => {}
    }

    let store = FileCredentialStore::open(config::credentials_path()?)
        .context("open credential store")?;
    log::debug!("credentials at '{}'", store.path().display());
    let mut session = Session::whisper(store, config.clone());
    if config.cache {
        session = session.with_cache(TranscriptCache::new(config::cache_dir()?));
    }

    if session.first_run() {
        eprintln!("{WELCOME}");
    }

    let env_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());

    match cli.command {
        Command::Key { action } => match action {
            KeyAction::Set { key } => {
                let key = session.set_credential(&key).context("save API key")?;
                println!(" -> saved API key {key}");
            }
            KeyAction::Remove => {
                session.remove_credential().context("remove API key")?;
                println!(" -> removed API key");
            }
            KeyAction::Status => match (session.stored_key(), env_key) {
                (_, Some(_)) => println!(" -> using OPENAI_API_KEY from the environment"),
                (Some(key), None) => println!(" -> API key {key} is configured"),
                (None, None) => println!(" -> no API key stored"),
            },
        },
        Command::Transcribe { path, export, .. } => {
            session
                .load(env_key.as_deref())
                .context("load API key")?;
            if !session.is_configured() {
                return Err(TranscribeError::NotConfigured.into());
            }
            transcribe(&mut session, &path, &export).await?;
        }
        Command::Convert { input, export } => {
            convert(input.as_deref(), &export, config.seconds_per_cue).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, export: &ExportArgs) -> anyhow::Result<()> {
    if let Some(seconds) = export.seconds_per_cue {
        config.seconds_per_cue = seconds;
    }
    config.validate().context("invalid options")
}

fn find_audio(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).same_file_system(true).sort_by_file_name() {
        let entry = entry.context("walk dir")?;
        if entry.file_type().is_file() && audio::is_audio_mime(audio::mime_for_path(entry.path()))
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn transcribe(
    session: &mut Session<FileCredentialStore>,
    path: &Path,
    export: &ExportArgs,
) -> anyhow::Result<()> {
    if !path.is_dir() {
        return transcribe_one(session, path, export).await;
    }
    println!("==> finding audio files");
    let files = find_audio(path)?;
    println!(" -> found {} audio files", files.len());

    let mut failed = 0;
    for file in &files {
        if let Err(e) = transcribe_one(session, file, export).await {
            eprintln!(" -> failed: {e:#}");
            failed += 1;
        }
    }
    anyhow::ensure!(failed == 0, "{failed} of {} files failed", files.len());
    eprintln!("==> all transcription completed");
    Ok(())
}

async fn transcribe_one(
    session: &mut Session<FileCredentialStore>,
    path: &Path,
    export: &ExportArgs,
) -> anyhow::Result<()> {
    let audio = AudioFile::open(path, session.config().max_file_size_bytes)
        .with_context(|| format!("open '{}'", path.display()))?;
    println!(
        " -> transcribing {} ({}{})",
        audio.name,
        describe_size(audio.size_bytes),
        audio
            .duration
            .map(|d| format!(", {:?}", std::time::Duration::from_secs(d.as_secs())))
            .unwrap_or_default()
    );

    let pb = progress_bar(&audio.name);
    let res = session
        .transcribe(&audio, Arc::new(BarSink(pb.clone())))
        .await;
    pb.finish_and_clear();
    let transcript = res.with_context(|| format!("while transcribing {}", audio.name))?;
    if transcript.is_hit() {
        println!(" .. satisfied with cache hit");
    }
    let transcript = transcript.into_inner();

    let dir = match &export.output_dir {
        Some(dir) => dir.clone(),
        None => audio
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    for &format in &export.formats {
        let content = format.render(&transcript, session.config().seconds_per_cue);
        let out = write_export(&dir, &audio.stem(), format, &content).await?;
        println!(" .. wrote {}", out.display());
    }
    Ok(())
}

async fn convert(
    input: Option<&Path>,
    export: &ExportArgs,
    seconds_per_cue: f64,
) -> anyhow::Result<()> {
    let (transcript, stem) = match input {
        Some(path) => {
            let transcript = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("read transcript from '{}'", path.display()))?;
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| String::from("transcription"));
            (transcript, stem)
        }
        None => {
            let mut transcript = String::new();
            tokio::io::stdin()
                .read_to_string(&mut transcript)
                .await
                .context("read transcript from stdin")?;
            (transcript, String::from("transcription"))
        }
    };

    for &format in &export.formats {
        let content = format.render(&transcript, seconds_per_cue);
        match &export.output_dir {
            Some(dir) => {
                let out = write_export(dir, &stem, format, &content).await?;
                println!(" .. wrote {}", out.display());
            }
            None => print!("{content}"),
        }
    }
    Ok(())
}
