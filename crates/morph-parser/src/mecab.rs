//! MeCab wrapper (IPA dictionary feature layout).
//!
//! Each call to [`Parser::parse`] runs the analyzer once over all input lines.
//! MeCab answers every input line with `surface\tfeature,feature,...` rows
//! followed by `EOS`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use chain_core::{LINE_BREAK, Morpheme, Tag};

use crate::Parser;

/// Word classes (and sub-classes) that may start a generated line.
const ENTRY_CLASSES: &[(&str, &[&str])] = &[
    ("連体詞", &["*"]),
    ("接頭詞", &["形容詞接続", "数接続", "動詞接続", "名詞接続"]),
    (
        "名詞",
        &[
            "引用文字列",
            "サ変接続",
            "ナイ形容詞語幹",
            "形容動詞語幹",
            "動詞非自立的",
            "副詞可能",
            "一般",
            "数",
            "固有名詞",
            "代名詞",
        ],
    ),
    ("動詞", &["自立"]),
    ("形容詞", &["自立"]),
    ("副詞", &["一般", "助詞類接続"]),
    ("接続詞", &["*"]),
    ("感動詞", &["*"]),
    ("フィラー", &["*"]),
    ("未知語", &["*"]),
];

/// Word classes (and sub-classes) that may end a generated line.
const END_CLASSES: &[(&str, &[&str])] = &[
    ("名詞", &["接尾", "非自立"]),
    ("動詞", &["自立", "接尾", "非自立"]),
    ("形容詞", &["自立", "接尾", "非自立"]),
    ("助詞", &["終助詞", "特殊", "副助詞", "並立助詞"]),
    ("助動詞", &["*"]),
    ("感動詞", &["*"]),
    ("記号", &["句点", "一般"]),
];

pub(crate) fn class_matches(table: &[(&str, &[&str])], tag: &Tag) -> bool {
    let sub = tag.field(1).unwrap_or("");
    table
        .iter()
        .any(|(class, subs)| *class == tag.word_class() && subs.contains(&sub))
}

fn line_break() -> Morpheme {
    Morpheme::new(
        LINE_BREAK,
        Tag::new(["記号", "改行", "*", "*", "*", "*", "\n", "\n", "\n"]),
    )
}

/// Parse one `surface\tfeatures` row. `None` for malformed rows.
fn parse_row(row: &str) -> Option<Morpheme> {
    let (surface, features) = row.split_once('\t')?;
    let features = features.trim_matches([' ', '\t', '\r', '\n']);
    if features.is_empty() {
        return None;
    }
    Some(Morpheme::new(surface, Tag::new(features.split(','))))
}

#[derive(Debug, Clone)]
pub struct MecabParser {
    path: PathBuf,
    args: Vec<String>,
}

impl MecabParser {
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        MecabParser {
            path: path.into(),
            args,
        }
    }

    /// Feed `input` to a fresh analyzer and collect its stdout.
    fn analyze(&self, input: String) -> io::Result<String> {
        let mut child = Command::new(&self.path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Write from another thread so a full stdout pipe cannot deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("analyzer stdin unavailable"))?;
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| io::Error::other("analyzer writer panicked"))??;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "analyzer exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for MecabParser {
    fn default() -> Self {
        MecabParser::new("mecab", Vec::new())
    }
}

impl Parser for MecabParser {
    fn parse(&mut self, text: &str) -> Vec<Morpheme> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_matches(['\t', '\r', '\n']))
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut input = lines.join("\n");
        input.push('\n');
        let output = match self.analyze(input) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "mecab failed, skipping input");
                return Vec::new();
            }
        };

        let mut result = Vec::new();
        let mut rows = output.lines();
        for _ in &lines {
            for row in rows.by_ref() {
                let row = row.trim_matches(['\t', '\r', '\n']);
                if row.is_empty() || row == "EOS" {
                    break;
                }
                match parse_row(row) {
                    Some(m) => result.push(m),
                    None => tracing::warn!(row, "skipping malformed mecab row"),
                }
            }
            result.push(line_break());
        }
        result
    }

    /// Entry table match, and the token must have a known reading.
    fn is_entry(&self, morpheme: &Morpheme) -> bool {
        class_matches(ENTRY_CLASSES, &morpheme.tag)
            && morpheme.tag.fields().last().is_some_and(|f| f != "*")
    }

    /// End table match, excluding irrealis and continuative forms.
    fn is_end(&self, morpheme: &Morpheme) -> bool {
        let form = morpheme.tag.field(5).unwrap_or("");
        class_matches(END_CLASSES, &morpheme.tag)
            && !form.starts_with("未然")
            && !form.starts_with("連用")
    }

    fn validate_hook(&self, parsed: &[Morpheme]) -> bool {
        !parsed.iter().any(|m| {
            m.tag.word_class() == "記号" && matches!(m.tag.field(1), Some("括弧開" | "括弧閉"))
        })
    }
}
