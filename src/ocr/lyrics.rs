//! Lyric-sheet heuristics for OCR output.
//!
//! Recognized text from a photographed song sheet is noisy: Windows line
//! endings, ragged trailing spaces, big vertical gaps, and chord lines
//! sitting above the words. These helpers normalize it for storage.

use regex::Regex;
use std::sync::OnceLock;

fn chord_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Root, accidental, quality, extension, suspension/add, slash bass.
        Regex::new(
            r"^\(?[A-G][#b]?(?:maj|min|m|dim|aug|\+|°)?\d{0,2}(?:(?:sus|add)\d{0,2})?(?:/[A-G][#b]?)?\)?$",
        )
        .expect("chord regex is valid")
    })
}

fn blank_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("blank-run regex is valid"))
}

/// Normalize recognized lyrics.
///
/// CRLF/CR become LF, trailing whitespace is dropped from every line, runs
/// of blank lines collapse to a single stanza break, and leading/trailing
/// blank lines are removed.
pub fn clean_lyrics(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed: Vec<&str> = unified.lines().map(str::trim_end).collect();
    let joined = trimmed.join("\n");
    blank_run()
        .replace_all(&joined, "\n\n")
        .trim_matches('\n')
        .to_string()
}

/// Returns true if every token on the line is a chord symbol.
///
/// `|` bar markers and `-` ties are ignored. A line needs at least one
/// chord; a lone `A` is still treated as lyrics, since it is more often an
/// article than a chord.
pub fn is_chord_line(line: &str) -> bool {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .filter(|t| !matches!(*t, "|" | "||" | "-" | "/"))
        .collect();
    match tokens.as_slice() {
        [] => false,
        ["A"] => false,
        tokens => tokens.iter().all(|t| chord_token().is_match(t)),
    }
}

/// Returns true if the text looks like a chord sheet (two or more chord
/// lines).
pub fn detect_chord_sheet(text: &str) -> bool {
    text.lines().filter(|l| is_chord_line(l)).count() >= 2
}

/// Drop chord lines, keeping the words.
pub fn strip_chord_lines(text: &str) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !is_chord_line(l)).collect();
    clean_lyrics(&kept.join("\n"))
}

/// Split cleaned lyrics into stanzas on blank lines.
pub fn split_stanzas(text: &str) -> Vec<String> {
    clean_lyrics(text)
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_normalizes_endings_and_gaps() {
        let raw = "\r\n\r\nAmazing grace   \r\nhow sweet the sound\r\n\r\n\r\n\r\nThat saved a wretch\n\n";
        assert_eq!(
            clean_lyrics(raw),
            "Amazing grace\nhow sweet the sound\n\nThat saved a wretch"
        );
    }

    #[test]
    fn chord_lines_are_recognized() {
        for line in [
            "G  D  Em  C",
            "Am7   Dsus4  D",
            "C/E | F | G",
            "Bbmaj7 F#m  (E)",
            "Csus2 Gadd9",
        ] {
            assert!(is_chord_line(line), "{:?}", line);
        }
    }

    #[test]
    fn lyric_lines_are_not_chords() {
        for line in [
            "Amazing grace how sweet the sound",
            "A",
            "",
            "Glory to God",
            "Be still my soul",
        ] {
            assert!(!is_chord_line(line), "{:?}", line);
        }
    }

    #[test]
    fn strip_keeps_only_words() {
        let sheet = "G       C      G\nAmazing grace how sweet\n   D\nthe sound";
        assert!(detect_chord_sheet(sheet));
        assert_eq!(strip_chord_lines(sheet), "Amazing grace how sweet\nthe sound");
    }

    #[test]
    fn stanzas_split_on_blank_lines() {
        let text = "Verse one line\nline two\n\n\n\nChorus\n  \nVerse two";
        assert_eq!(
            split_stanzas(text),
            vec!["Verse one line\nline two", "Chorus", "Verse two"]
        );
    }
}
