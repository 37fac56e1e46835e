//! Built-in tokenizer for space-separated scripts.
//!
//! Splits each line into words (letters, with apostrophes kept inside
//! contractions), numbers and punctuation; whitespace is dropped. Runs of
//! sentence-terminal punctuation (`...`, `?!`) stay together as one token.
//!
//! Tags have one or two fields: `word`, `number`, or `punct` followed by
//! `terminal`, `comma`, `open`, `close` or `other`.

use chain_core::{LINE_BREAK, Morpheme, Tag, Token};

use crate::Parser;

const OPEN: &[char] = &['(', '[', '{', '<', '「', '『', '（', '“', '‘'];
const CLOSE: &[char] = &[')', ']', '}', '>', '」', '』', '）', '”', '’'];
const TERMINAL: &[char] = &['.', '!', '?', '。', '！', '？'];
const COMMA: &[char] = &[',', ';', ':', '、'];

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleParser;

impl SimpleParser {
    pub fn new() -> Self {
        SimpleParser
    }
}

/// Tag a single token the way [`SimpleParser::parse`] would.
pub(crate) fn classify(token: &str) -> Tag {
    let Some(first) = token.chars().next() else {
        return Tag::new(["punct", "other"]);
    };
    if token == LINE_BREAK {
        Tag::new(["punct", "newline"])
    } else if first.is_alphabetic() {
        Tag::new(["word"])
    } else if first.is_numeric() {
        Tag::new(["number"])
    } else if TERMINAL.contains(&first) {
        Tag::new(["punct", "terminal"])
    } else if COMMA.contains(&first) {
        Tag::new(["punct", "comma"])
    } else if OPEN.contains(&first) {
        Tag::new(["punct", "open"])
    } else if CLOSE.contains(&first) {
        Tag::new(["punct", "close"])
    } else {
        Tag::new(["punct", "other"])
    }
}

/// Split one line into tokens.
fn tokenize(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_alphabetic() {
            pos += 1;
            while pos < chars.len() {
                let cur = chars[pos];
                // Apostrophe rule: keep contractions together.
                let apostrophe = cur == '\''
                    && pos + 1 < chars.len()
                    && chars[pos + 1].is_alphabetic();
                if cur.is_alphabetic() || apostrophe {
                    pos += 1;
                } else {
                    break;
                }
            }
        } else if c.is_numeric() {
            while pos < chars.len() && chars[pos].is_numeric() {
                pos += 1;
            }
        } else if TERMINAL.contains(&c) {
            while pos < chars.len() && TERMINAL.contains(&chars[pos]) {
                pos += 1;
            }
        } else {
            pos += 1;
        }

        tokens.push(chars[start..pos].iter().collect());
    }

    tokens
}

impl Parser for SimpleParser {
    fn parse(&mut self, text: &str) -> Vec<Morpheme> {
        let mut result = Vec::new();
        for line in text.lines() {
            for token in tokenize(line) {
                let tag = classify(&token);
                result.push(Morpheme::new(token, tag));
            }
            result.push(Morpheme::new(LINE_BREAK, classify(LINE_BREAK)));
        }
        result
    }

    fn is_entry(&self, morpheme: &Morpheme) -> bool {
        matches!(morpheme.tag.word_class(), "word" | "number")
    }

    fn is_end(&self, morpheme: &Morpheme) -> bool {
        match morpheme.tag.word_class() {
            "word" | "number" => true,
            "punct" => morpheme.tag.field(1) == Some("terminal"),
            _ => false,
        }
    }

    fn validate_hook(&self, parsed: &[Morpheme]) -> bool {
        !parsed
            .iter()
            .any(|m| matches!(m.tag.field(1), Some("open" | "close")))
    }

    /// Words are separated by single spaces; punctuation that closes or
    /// continues a phrase attaches to the previous token, and nothing is
    /// inserted around line breaks or after an opening bracket.
    fn join(&self, tokens: &[Token]) -> String {
        let mut out = String::new();
        let mut prev: Option<Tag> = None;

        for token in tokens {
            let tag = classify(token);
            let attach = token == LINE_BREAK
                || matches!(tag.field(1), Some("terminal" | "comma" | "close"));
            let after_open = prev
                .as_ref()
                .is_some_and(|p| matches!(p.field(1), Some("open" | "newline")));

            if prev.is_some() && !attach && !after_open {
                out.push(' ');
            }
            out.push_str(token);
            prev = Some(tag);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        SimpleParser
            .parse(text)
            .into_iter()
            .map(|m| m.token)
            .collect()
    }

    #[test]
    fn splits_words_and_punctuation() {
        assert_eq!(
            tokens("Don't you think so?"),
            vec!["Don't", "you", "think", "so", "?", "\n"]
        );
    }

    #[test]
    fn groups_terminal_runs() {
        assert_eq!(tokens("wait... what?!"), vec!["wait", "...", "what", "?!", "\n"]);
    }

    #[test]
    fn digits_split_from_words() {
        assert_eq!(tokens("abc123 def"), vec!["abc", "123", "def", "\n"]);
    }

    #[test]
    fn trailing_apostrophe_is_separate() {
        assert_eq!(tokens("dogs' bone"), vec!["dogs", "'", "bone", "\n"]);
    }

    #[test]
    fn one_line_break_per_line() {
        assert_eq!(tokens("a\nb"), vec!["a", "\n", "b", "\n"]);
        assert!(tokens("").is_empty());
    }

    #[test]
    fn tags() {
        assert_eq!(classify("cat").word_class(), "word");
        assert_eq!(classify("42").word_class(), "number");
        assert_eq!(classify("!").field(1), Some("terminal"));
        assert_eq!(classify(",").field(1), Some("comma"));
        assert_eq!(classify("(").field(1), Some("open"));
        assert_eq!(classify(")").field(1), Some("close"));
        assert_eq!(classify("\n").field(1), Some("newline"));
        assert_eq!(classify("-").field(1), Some("other"));
    }

    #[test]
    fn entry_and_end_rules() {
        let p = SimpleParser;
        let word = Morpheme::new("cat", classify("cat"));
        let stop = Morpheme::new(".", classify("."));
        let comma = Morpheme::new(",", classify(","));
        assert!(p.is_entry(&word));
        assert!(!p.is_entry(&stop));
        assert!(p.is_end(&word));
        assert!(p.is_end(&stop));
        assert!(!p.is_end(&comma));
    }

    #[test]
    fn validate_rejects_brackets() {
        let mut p = SimpleParser;
        let parsed = p.parse("the cat (sat) down");
        assert!(!p.validate(p.strip(&parsed)));
        let parsed = p.parse("the cat sat down.");
        assert!(p.validate(p.strip(&parsed)));
        let parsed = p.parse("the cat sat,");
        assert!(!p.validate(p.strip(&parsed)));
    }

    #[test]
    fn join_restores_spacing() {
        let mut p = SimpleParser;
        for text in ["the cat sat on the mat.", "well, (maybe) not!", "one\ntwo three"] {
            let parsed = p.parse(text);
            let toks: Vec<Token> = p.strip(&parsed).iter().map(|m| m.token.clone()).collect();
            assert_eq!(p.join(&toks), text);
        }
    }
}
