use crate::segment::{segment, CaptionUnit};

pub const DEFAULT_SECONDS_PER_CUE: f64 = 5.0;

/// Longest cue accepted; at this length `u32::MAX` cues still end within `u64` milliseconds.
pub const MAX_SECONDS_PER_CUE: f64 = 86_400.0;

pub const SRT_SEPARATOR: char = ',';
pub const VTT_SEPARATOR: char = '.';

/// A point in time split into the fields subtitle timestamps are written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub millis: u64,
}

impl Timestamp {
    pub fn from_seconds(fracs: f64) -> Self {
        assert!(
            fracs.is_finite() && fracs >= 0.0,
            "bad timestamp: {fracs}"
        );
        Self {
            hours: (fracs / 3600.0).floor() as u64,
            minutes: ((fracs % 3600.0) / 60.0).floor() as u64,
            seconds: (fracs % 60.0).floor() as u64,
            // float error can push `frac * 1000` up to 1000
            millis: (((fracs % 1.0) * 1000.0).floor() as u64).min(999),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self {
            hours: ms / 3_600_000,
            minutes: (ms % 3_600_000) / 60_000,
            seconds: (ms % 60_000) / 1_000,
            millis: ms % 1_000,
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.hours * 3_600_000 + self.minutes * 60_000 + self.seconds * 1_000 + self.millis
    }

    pub fn render(&self, separator: char) -> String {
        format!(
            "{:02}:{:02}:{:02}{separator}{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }
}

/// Renders `seconds` as `HH:MM:SS<separator>mmm`, truncating sub-millisecond precision.
pub fn format_time(seconds: f64, separator: char) -> String {
    Timestamp::from_seconds(seconds).render(separator)
}

/// Parses a timestamp written by [`format_time`] (either separator) back into milliseconds.
pub fn parse_timestamp(s: &str) -> Option<u64> {
    let (hms, millis) = s.split_once([SRT_SEPARATOR, VTT_SEPARATOR])?;
    let mut fields = hms.splitn(3, ':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds: u64 = fields.next()?.parse().ok()?;
    if millis.len() != 3 || minutes >= 60 || seconds >= 60 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    Some(
        Timestamp {
            hours,
            minutes,
            seconds,
            millis,
        }
        .as_millis(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub sequence_number: usize,
    pub start_millis: u64,
    pub end_millis: u64,
    pub text: String,
}

/// Gives every caption unit the same slot length, back to back, starting at zero.
///
/// Unit `i` covers `[i * seconds_per_unit, (i + 1) * seconds_per_unit)`. The
/// slot length is rounded to whole milliseconds so that neighbouring cues
/// share their boundary exactly.
///
/// # Panics
///
/// If `seconds_per_unit` is not between one millisecond and
/// [`MAX_SECONDS_PER_CUE`], or if a cue would end past `u64::MAX` milliseconds.
pub fn time_cues(units: &[CaptionUnit], seconds_per_unit: f64) -> Vec<Cue> {
    let step = (seconds_per_unit * 1000.0).round();
    assert!(
        step.is_finite() && step >= 1.0,
        "cue length must be a positive number of seconds, got {seconds_per_unit}"
    );
    assert!(
        seconds_per_unit <= MAX_SECONDS_PER_CUE,
        "cue length must be at most {MAX_SECONDS_PER_CUE} seconds, got {seconds_per_unit}"
    );
    let step = step as u64;
    units
        .iter()
        .map(|unit| {
            let i = unit.index as u64;
            let bounds = i
                .checked_mul(step)
                .zip(i.checked_add(1).and_then(|n| n.checked_mul(step)));
            let Some((start_millis, end_millis)) = bounds else {
                panic!("cue {} overflows u64 milliseconds", unit.index + 1);
            };
            Cue {
                sequence_number: unit.index + 1,
                start_millis,
                end_millis,
                text: unit.text.clone(),
            }
        })
        .collect()
}

pub fn render_srt(cues: &[Cue]) -> String {
    let mut srt = String::new();
    for cue in cues {
        srt.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.sequence_number,
            Timestamp::from_millis(cue.start_millis).render(SRT_SEPARATOR),
            Timestamp::from_millis(cue.end_millis).render(SRT_SEPARATOR),
            cue.text,
        ));
    }
    srt
}

pub fn render_vtt(cues: &[Cue]) -> String {
    let mut vtt = String::from("WEBVTT\n\n");
    for cue in cues {
        vtt.push_str(&format!(
            "{} --> {}\n{}\n\n",
            Timestamp::from_millis(cue.start_millis).render(VTT_SEPARATOR),
            Timestamp::from_millis(cue.end_millis).render(VTT_SEPARATOR),
            cue.text,
        ));
    }
    vtt
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Txt,
    Srt,
    Vtt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Srt => "srt",
            ExportFormat::Vtt => "vtt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain",
            ExportFormat::Srt => "application/x-subrip",
            ExportFormat::Vtt => "text/vtt",
        }
    }

    pub fn render(self, transcript: &str, seconds_per_unit: f64) -> String {
        match self {
            ExportFormat::Txt => transcript.to_string(),
            ExportFormat::Srt => render_srt(&time_cues(&segment(transcript), seconds_per_unit)),
            ExportFormat::Vtt => render_vtt(&time_cues(&segment(transcript), seconds_per_unit)),
        }
    }
}
