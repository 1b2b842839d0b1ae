/// One sentence-bounded fragment of a transcript, destined to become a cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionUnit {
    pub index: usize,
    pub text: String,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Splits a transcript at runs of `.`, `!` and `?`.
///
/// Fragments that are empty once trimmed are dropped and do not consume an
/// index, so `index` is always the position in the returned vector. There
/// is no timing information in a plain transcript, so sentence boundaries
/// stand in for cue boundaries.
pub fn segment(transcript: &str) -> Vec<CaptionUnit> {
    transcript
        .split(is_terminator)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .enumerate()
        .map(|(index, text)| CaptionUnit {
            index,
            text: text.to_string(),
        })
        .collect()
}
