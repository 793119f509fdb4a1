//! Post-processing for raw model output.
//!
//! LLaMA-family models emit SentencePiece artifacts when decoded naively:
//! the `▁` word-boundary glyph and byte tokens such as `<0x0A>`. This module
//! turns that raw text into something printable. Pure string-in, string-out;
//! no state, no I/O.

use regex::Regex;
use std::sync::OnceLock;

/// Substrings a line must contain to survive the answer filter.
pub const DEFAULT_ANSWER_KEYWORDS: [&str; 2] = ["capital", "Paris"];

/// SentencePiece word-boundary marker.
const SPACE_MARKER: char = '▁';
/// Byte token for a newline.
const NEWLINE_TOKEN: &str = "<0x0A>";

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").unwrap())
}

/// Clean raw model output with the default answer keywords.
pub fn clean_model_output(text: &str) -> String {
    clean_model_output_with_keywords(text, &DEFAULT_ANSWER_KEYWORDS)
}

/// Full cleanup pipeline:
/// 1. replace the `▁` marker with a space and `<0x0A>` with a newline,
/// 2. collapse runs of spaces,
/// 3. trim lines and drop empty ones,
/// 4. keep only keyword-matching lines when any line matches (all lines
///    otherwise, in original order).
pub fn clean_model_output_with_keywords(text: &str, keywords: &[&str]) -> String {
    let text = text.replace(SPACE_MARKER, " ");
    let text = text.replace(NEWLINE_TOKEN, "\n");
    let text = space_runs().replace_all(&text, " ");

    let lines: Vec<&str> = text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let answer_lines: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| keywords.iter().any(|kw| line.contains(kw)))
        .collect();

    if answer_lines.is_empty() {
        lines.join("\n")
    } else {
        answer_lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_and_space_runs() {
        assert_eq!(clean_model_output("A▁B<0x0A>C   D"), "A B\nC D");
    }

    #[test]
    fn test_idempotent_on_clean_input() {
        let raw = "▁The▁answer:<0x0A><0x0A>Madrid  is   nice";
        let once = clean_model_output(raw);
        let twice = clean_model_output(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_keyword_lines_win() {
        let raw = "Let me think.<0x0A>Paris is the answer.<0x0A>Hope that helps.";
        assert_eq!(clean_model_output(raw), "Paris is the answer.");
    }

    #[test]
    fn test_all_lines_kept_when_no_keyword_matches() {
        let raw = "  first line <0x0A>second line<0x0A><0x0A>  third  ";
        assert_eq!(clean_model_output(raw), "first line\nsecond line\nthird");
    }

    #[test]
    fn test_custom_keywords() {
        let raw = "warranty: two years<0x0A>shipping: three days";
        assert_eq!(
            clean_model_output_with_keywords(raw, &["warranty"]),
            "warranty: two years"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_model_output(""), "");
        assert_eq!(clean_model_output("<0x0A>   <0x0A>"), "");
    }
}
