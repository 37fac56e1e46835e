//! Tokenization and grammar heuristics.
//!
//! A [`Parser`] turns raw text into [`Morpheme`]s and decides which tokens may
//! start or end a generated line. Three implementations are provided:
//!
//! - [`SimpleParser`]: a built-in character-class tokenizer for space
//!   separated scripts. It needs no external tools.
//! - [`MecabParser`]: runs the MeCab morphological analyzer per call.
//! - [`JumanParser`]: keeps a JUMAN (or Juman++) process alive across calls
//!   and respawns it after a configurable amount of input.
//!
//! Every parser appends the [`LINE_BREAK`] pseudo-token after each input line,
//! so multi-line text is learned as one token stream.

mod juman;
mod mecab;
mod simple;

use chain_core::{Morpheme, Token};

pub use chain_core::LINE_BREAK;
pub use juman::{DEFAULT_RESPAWN_THRESHOLD, JumanParser, PIPE_BUF};
pub use mecab::MecabParser;
pub use simple::SimpleParser;

/// Tokenizer plus language-specific grammar rules.
pub trait Parser: Send {
    /// Tokenize `text` one line at a time, appending a line-break morpheme
    /// after each line. Lines the analyzer cannot handle are skipped and
    /// logged, never reported as errors.
    fn parse(&mut self, text: &str) -> Vec<Morpheme>;

    /// Whether the morpheme may start a generated unit.
    fn is_entry(&self, morpheme: &Morpheme) -> bool;

    /// Whether the morpheme may end a generated unit.
    fn is_end(&self, morpheme: &Morpheme) -> bool;

    /// Parser-specific structural check, e.g. rejecting brackets that are
    /// unlikely to balance after a random walk.
    fn validate_hook(&self, _parsed: &[Morpheme]) -> bool {
        true
    }

    /// First morpheme is an entry, last is an end, and the hook passes.
    /// Empty input is invalid.
    fn validate(&self, parsed: &[Morpheme]) -> bool {
        let (Some(first), Some(last)) = (parsed.first(), parsed.last()) else {
            return false;
        };
        self.is_entry(first) && self.is_end(last) && self.validate_hook(parsed)
    }

    /// Tokens eligible to start a walk.
    fn entrypoints(&self, parsed: &[Morpheme]) -> Vec<Token> {
        parsed
            .iter()
            .filter(|m| self.is_entry(m))
            .map(|m| m.token.clone())
            .collect()
    }

    /// Trim leading and trailing blank morphemes (line breaks included).
    fn strip<'a>(&self, parsed: &'a [Morpheme]) -> &'a [Morpheme] {
        let start = parsed
            .iter()
            .position(|m| !m.is_blank())
            .unwrap_or(parsed.len());
        let end = parsed
            .iter()
            .rposition(|m| !m.is_blank())
            .map_or(start, |i| i + 1);
        &parsed[start..end]
    }

    /// Split at line breaks, dropping empty lines.
    fn split<'a>(&self, parsed: &'a [Morpheme]) -> Vec<&'a [Morpheme]> {
        parsed
            .split(|m| m.is_line_break())
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Render a token walk as text. Plain concatenation by default, which
    /// suits scripts written without spaces.
    fn join(&self, tokens: &[Token]) -> String {
        tokens.concat()
    }
}

/// Write a shell script standing in for an analyzer. Tests run it as
/// `sh <script>` so the file is never executed while still open.
#[cfg(all(test, unix))]
pub(crate) fn fake_analyzer(name: &str, body: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("babble_{}_{name}.sh", std::process::id()));
    std::fs::write(&path, body).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    use chain_core::Tag;

    /// Accepts anything except `x` as entry and `y` as end.
    struct Letters;

    impl Parser for Letters {
        fn parse(&mut self, text: &str) -> Vec<Morpheme> {
            let mut out = Vec::new();
            for line in text.lines() {
                for c in line.chars() {
                    out.push(Morpheme::new(c.to_string(), Tag::new(["letter"])));
                }
                out.push(Morpheme::new(LINE_BREAK, Tag::new(["newline"])));
            }
            out
        }

        fn is_entry(&self, m: &Morpheme) -> bool {
            m.token != "x" && !m.is_blank()
        }

        fn is_end(&self, m: &Morpheme) -> bool {
            m.token != "y" && !m.is_blank()
        }

        fn validate_hook(&self, parsed: &[Morpheme]) -> bool {
            !parsed.iter().any(|m| m.token == "(")
        }
    }

    fn tokens(parsed: &[Morpheme]) -> Vec<&str> {
        parsed.iter().map(|m| m.token.as_str()).collect()
    }

    #[test]
    fn validate_checks_ends_and_hook() {
        let mut p = Letters;
        let ok = p.parse("abc");
        assert!(p.validate(p.strip(&ok)));

        let bad_start = p.parse("xbc");
        assert!(!p.validate(p.strip(&bad_start)));

        let bad_end = p.parse("aby");
        assert!(!p.validate(p.strip(&bad_end)));

        let bracket = p.parse("a(c");
        assert!(!p.validate(p.strip(&bracket)));
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(!Letters.validate(&[]));
    }

    #[test]
    fn strip_trims_blank_ends() {
        let mut p = Letters;
        let parsed = p.parse(" ab \n\ncd");
        assert_eq!(tokens(p.strip(&parsed)), vec!["a", "b", " ", "\n", "\n", "c", "d"]);
    }

    #[test]
    fn strip_all_blank_is_empty() {
        let mut p = Letters;
        let parsed = p.parse("  \n ");
        assert!(p.strip(&parsed).is_empty());
    }

    #[test]
    fn split_drops_empty_lines() {
        let mut p = Letters;
        let parsed = p.parse("ab\n\ncd");
        let lines = p.split(&parsed);
        assert_eq!(lines.len(), 2);
        assert_eq!(tokens(lines[0]), vec!["a", "b"]);
        assert_eq!(tokens(lines[1]), vec!["c", "d"]);
    }

    #[test]
    fn entrypoints_filters_by_is_entry() {
        let mut p = Letters;
        let parsed = p.parse("axb");
        assert_eq!(p.entrypoints(&parsed), vec!["a", "b"]);
    }

    #[test]
    fn default_join_concatenates() {
        let toks: Vec<Token> = vec!["猫".into(), "が".into(), "\n".into(), "鳴く".into()];
        assert_eq!(Letters.join(&toks), "猫が\n鳴く");
    }
}
