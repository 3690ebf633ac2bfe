//! Text normalization applied to generated output before it reaches a client.
//!
//! Engines interleave narrative text with tool activity and tend to emit
//! stray leading newlines and long runs of blank lines. The same primitives
//! clean up both the streamed chunks and the buffered final text.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

static EXCESS_NEWLINES: OnceLock<Regex> = OnceLock::new();

fn excess_newlines() -> &'static Regex {
    EXCESS_NEWLINES.get_or_init(|| Regex::new(r"\n{3,}").expect("static pattern is valid"))
}

/// Remove every `\n` at the start of `text`.
///
/// Only line feeds are stripped; other leading whitespace is preserved.
pub fn strip_leading_newlines(text: &str) -> &str {
    text.trim_start_matches('\n')
}

/// Replace each run of three or more consecutive `\n` with exactly two.
pub fn collapse_excess_blank_lines(text: &str) -> Cow<'_, str> {
    excess_newlines().replace_all(text, "\n\n")
}

/// True when `text` is empty or consists only of whitespace.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_leading_line_feeds() {
        assert_eq!(strip_leading_newlines("\n\n\nhello\n"), "hello\n");
        assert_eq!(strip_leading_newlines("  \nhello"), "  \nhello");
        assert_eq!(strip_leading_newlines("\n\n"), "");
        assert_eq!(strip_leading_newlines(""), "");
    }

    #[test]
    fn collapses_long_newline_runs() {
        assert_eq!(collapse_excess_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_excess_blank_lines("a\n\n\nb\n\n\n\n\nc"), "a\n\nb\n\nc");
        assert_eq!(collapse_excess_blank_lines("\n\n\n"), "\n\n");
    }

    #[test]
    fn leaves_short_runs_untouched() {
        assert_eq!(collapse_excess_blank_lines("a\nb\n\nc"), "a\nb\n\nc");
        assert!(matches!(
            collapse_excess_blank_lines("no breaks"),
            Cow::Borrowed("no breaks")
        ));
        assert_eq!(collapse_excess_blank_lines(""), "");
    }

    #[test]
    fn collapse_is_idempotent_and_bounded() {
        let samples = [
            "",
            "\n",
            "\n\n\n\n\n\n\n",
            "x\n\n\ny\n\n\n\n\n\nz\n\n\n",
            "\r\n\r\n\r\n",
            "para one\n\n\n\npara two\n\n",
        ];
        for sample in samples {
            let once = collapse_excess_blank_lines(sample).into_owned();
            let twice = collapse_excess_blank_lines(&once).into_owned();
            assert_eq!(once, twice, "not idempotent for {sample:?}");
            assert!(!once.contains("\n\n\n"), "run survived for {sample:?}");
        }
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t\n"));
        assert!(!is_blank(" a "));
    }
}
