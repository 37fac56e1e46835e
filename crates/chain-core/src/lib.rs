//! Core token types shared by the chain store, the parsers and the generator.
//!
//! A [`Token`] is an opaque string. Parsers attach a [`Tag`] to each token,
//! producing a [`Morpheme`]; tags drive grammar checks and novelty scoring but
//! are never persisted. The chain itself is keyed by [`NgramKey`], a fixed-width
//! window of consecutive tokens.

use serde::{Deserialize, Serialize};

/// An atomic unit of learned or generated text.
pub type Token = String;

/// Pseudo-token inserted between lines so multi-line input can be chained
/// like any other token.
pub const LINE_BREAK: &str = "\n";

/// Classification vector attached to a token by a parser.
///
/// The first field is the word class; the remaining fields are
/// parser-specific (sub-class, conjugation type, conjugation form, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Build a tag from its fields, word class first.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(fields.into_iter().map(Into::into).collect())
    }

    /// The word class (first field), or `""` for an empty tag.
    pub fn word_class(&self) -> &str {
        self.field(0).unwrap_or("")
    }

    /// Field at `index`, if present.
    #[inline]
    pub fn field(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// All fields in order.
    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A token paired with the tag its parser assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Morpheme {
    pub token: Token,
    pub tag: Tag,
}

impl Morpheme {
    pub fn new(token: impl Into<Token>, tag: Tag) -> Self {
        Morpheme {
            token: token.into(),
            tag,
        }
    }

    /// Whether this is the line-break pseudo-token.
    #[inline]
    pub fn is_line_break(&self) -> bool {
        self.token == LINE_BREAK
    }

    /// Whether the token is whitespace only (line breaks included).
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.token.trim().is_empty()
    }
}

/// Ordered window of `level` consecutive tokens used as a chain lookup key.
///
/// Serializes as a plain JSON array, e.g. `["the","cat"]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NgramKey(Vec<Token>);

impl NgramKey {
    pub fn new(tokens: Vec<Token>) -> Self {
        NgramKey(tokens)
    }

    /// First token of the window; the entrypoint table is keyed by it.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    #[inline]
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every slot holds a real token, i.e. the window no longer
    /// contains any of the empty placeholders used at stream start.
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|t| !t.is_empty())
    }
}

impl From<Vec<Token>> for NgramKey {
    fn from(tokens: Vec<Token>) -> Self {
        NgramKey(tokens)
    }
}

impl<const N: usize> From<[&str; N]> for NgramKey {
    fn from(tokens: [&str; N]) -> Self {
        NgramKey(tokens.iter().map(|t| t.to_string()).collect())
    }
}
