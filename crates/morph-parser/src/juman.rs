//! JUMAN / Juman++ wrapper.
//!
//! One analyzer process is kept alive and fed a line at a time. The process is
//! restarted once the cumulative input passes `respawn_threshold` bytes, which
//! bounds the memory a long-lived analyzer accumulates.
//!
//! Output rows look like
//! `surface reading base pos pos_id sub sub_id ctype ctype_id cform cform_id info`,
//! where the first three fields escape spaces and backslashes with `\`.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use chain_core::{LINE_BREAK, Morpheme, Tag};

use crate::Parser;
use crate::mecab::class_matches;

/// Lines longer than this many bytes are skipped (POSIX `PIPE_BUF` minimum).
pub const PIPE_BUF: usize = 512;

/// Default respawn threshold: 256 MiB of input.
pub const DEFAULT_RESPAWN_THRESHOLD: usize = 1 << 28;

const ENTRY_CLASSES: &[(&str, &[&str])] = &[
    ("形容詞", &["*"]),
    ("連体詞", &["*"]),
    ("接続詞", &["*"]),
    (
        "指示詞",
        &["名詞形態指示詞", "連体詞形態指示詞", "副詞形態指示詞"],
    ),
    ("感動詞", &["*"]),
    (
        "名詞",
        &[
            "普通名詞",
            "固有名詞",
            "組織名",
            "地名",
            "人名",
            "サ変名詞",
            "数詞",
            "時相名詞",
        ],
    ),
    ("接頭辞", &["名詞接頭辞", "動詞接頭辞", "ナ形容詞接頭辞"]),
    ("未定義語", &["カタカナ", "アルファベット"]),
];

const END_CLASSES: &[(&str, &[&str])] = &[
    ("形容詞", &["*"]),
    ("判定詞", &["*"]),
    ("助動詞", &["*"]),
    ("指示詞", &["名詞形態指示詞"]),
    ("感動詞", &["*"]),
    ("名詞", &["形式名詞"]),
    ("動詞", &["*"]),
    ("助詞", &["終助詞"]),
    (
        "接尾辞",
        &["形容詞性述語接尾辞", "形容詞性名詞接尾辞", "動詞性接尾辞"],
    ),
    ("特殊", &["句点", "記号"]),
];

fn line_break() -> Morpheme {
    Morpheme::new(LINE_BREAK, Tag::new(["特殊", "改行", "*", "*", "NIL"]))
}

/// Split the escaped `surface reading base` prefix off an output row.
fn split_words(row: &str, jumanpp: bool) -> Option<(Vec<String>, &str)> {
    if jumanpp && row.starts_with(r"\ \ \ \ \ \ ") {
        return Some((vec![" \\".to_string(); 3], &row[12..]));
    }
    if !jumanpp && row.starts_with(r"  \  \  ") {
        return Some((vec![" ".to_string(); 3], &row[8..]));
    }
    if row.starts_with(r"\ \ \ ") {
        return Some((vec!["\\".to_string(); 3], &row[6..]));
    }

    let mut words = Vec::with_capacity(3);
    let mut current = String::new();
    let mut escape = false;
    let mut rest = None;

    for (i, c) in row.char_indices() {
        if c == '\\' && !escape {
            escape = true;
        } else if c == ' ' && !escape {
            words.push(std::mem::take(&mut current));
            if words.len() == 3 {
                rest = Some(&row[i + 1..]);
                break;
            }
        } else {
            escape = false;
            current.push(c);
        }
    }

    Some((words, rest?))
}

/// Whitespace split honouring double quotes, like a POSIX shell.
fn split_fields(s: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_field = false;
    let mut quoted = false;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_field = true;
            }
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_field {
                    fields.push(std::mem::take(&mut current));
                    in_field = false;
                }
            }
            c => {
                current.push(c);
                in_field = true;
            }
        }
    }
    if in_field {
        fields.push(current);
    }
    fields
}

/// Parse one analyzer row. `None` for malformed rows and for rows that do
/// not have exactly nine feature fields (e.g. ambiguous `@` alternatives).
fn parse_row(row: &str, jumanpp: bool) -> Option<Morpheme> {
    let (words, rest) = split_words(row, jumanpp)?;
    let info = split_fields(rest);
    if info.len() != 9 {
        return None;
    }
    let surface = words.into_iter().next()?;
    Some(Morpheme::new(
        surface,
        Tag::new([&info[0], &info[2], &info[4], &info[6], &info[8]]),
    ))
}

struct Analyzer {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Analyzer {
    fn spawn(path: &Path, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("analyzer stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("analyzer stdout unavailable"))?;
        Ok(Analyzer {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one newline-terminated line and collect rows up to `EOS`.
    fn analyze(&mut self, line: &str) -> io::Result<Vec<String>> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;

        let mut rows = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.stdout.read_line(&mut buf)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "analyzer closed its output",
                ));
            }
            let row = buf.trim_end_matches(['\t', '\r', '\n']);
            if row.is_empty() || row == "EOS" {
                return Ok(rows);
            }
            rows.push(row.to_string());
        }
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

pub struct JumanParser {
    path: PathBuf,
    args: Vec<String>,
    jumanpp: bool,
    respawn_threshold: usize,
    analyzer: Option<Analyzer>,
    size: usize,
}

impl JumanParser {
    /// `jumanpp` output conventions are used when the executable is named
    /// `jumanpp`.
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let path = path.into();
        let jumanpp = path.file_name().is_some_and(|name| name == "jumanpp");
        JumanParser {
            path,
            args,
            jumanpp,
            respawn_threshold: DEFAULT_RESPAWN_THRESHOLD,
            analyzer: None,
            size: 0,
        }
    }

    pub fn with_respawn_threshold(mut self, bytes: usize) -> Self {
        self.respawn_threshold = bytes;
        self
    }

    /// The running analyzer, (re)spawned when absent or past the threshold.
    fn analyzer(&mut self, input_len: usize) -> io::Result<&mut Analyzer> {
        self.size += input_len;

        let expired = self.size >= self.respawn_threshold;
        if expired && self.analyzer.is_some() {
            tracing::info!(bytes = self.size, "respawning juman");
            self.analyzer = None;
        }

        if self.analyzer.is_none() {
            self.analyzer = Some(Analyzer::spawn(&self.path, &self.args)?);
            self.size = 0;
        }
        self.analyzer
            .as_mut()
            .ok_or_else(|| io::Error::other("analyzer not running"))
    }
}

impl Default for JumanParser {
    fn default() -> Self {
        JumanParser::new("juman", Vec::new())
    }
}

impl Parser for JumanParser {
    fn parse(&mut self, text: &str) -> Vec<Morpheme> {
        let mut result = Vec::new();

        for line in text.lines() {
            let line = line.trim_matches(['\t', '\r', '\n']);
            if self.jumanpp && line.starts_with('#') {
                continue;
            }
            let input = format!("{line}\n");
            if input.len() > PIPE_BUF {
                tracing::warn!(bytes = input.len(), "skipping overlong line");
                continue;
            }

            let jumanpp = self.jumanpp;
            let rows = match self.analyzer(input.len()).and_then(|a| a.analyze(&input)) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "juman failed, skipping line");
                    // Start over with a fresh process next time.
                    self.analyzer = None;
                    continue;
                }
            };

            for row in &rows {
                match parse_row(row, jumanpp) {
                    Some(m) => result.push(m),
                    None => tracing::debug!(row = row.as_str(), "skipping juman row"),
                }
            }
            result.push(line_break());
        }

        result
    }

    fn is_entry(&self, morpheme: &Morpheme) -> bool {
        class_matches(ENTRY_CLASSES, &morpheme.tag)
    }

    /// End table match, excluding na-adjectives and continuative forms.
    fn is_end(&self, morpheme: &Morpheme) -> bool {
        class_matches(END_CLASSES, &morpheme.tag)
            && morpheme.tag.field(2) != Some("ナ形容詞")
            && !morpheme.tag.field(3).unwrap_or("").contains("連用")
    }

    fn validate_hook(&self, parsed: &[Morpheme]) -> bool {
        !parsed.iter().any(|m| {
            m.tag.word_class() == "特殊" && matches!(m.tag.field(1), Some("括弧始" | "括弧終"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_row() {
        let m = parse_row(
            r#"猫 ねこ 猫 名詞 6 普通名詞 1 * 0 * 0 "代表表記:猫/ねこ カテゴリ:動物""#,
            false,
        )
        .unwrap();
        assert_eq!(m.token, "猫");
        assert_eq!(m.tag.fields(), ["名詞", "普通名詞", "*", "*", "代表表記:猫/ねこ カテゴリ:動物"]);
    }

    #[test]
    fn parses_escaped_space_rows() {
        let m = parse_row(r#"\  \  \  特殊 1 空白 6 * 0 * 0 NIL"#, false).unwrap();
        assert_eq!(m.token, " ");
        assert_eq!(m.tag.word_class(), "特殊");

        let m = parse_row(r#"\ \ \ 特殊 1 記号 5 * 0 * 0 NIL"#, false).unwrap();
        assert_eq!(m.token, "\\");
    }

    #[test]
    fn rejects_rows_with_wrong_field_count() {
        assert!(parse_row("@ 猫 ねこ 猫 名詞 6 普通名詞 1", false).is_none());
        assert!(parse_row("truncated", false).is_none());
    }

    #[test]
    fn split_fields_honours_quotes() {
        assert_eq!(split_fields(r#"a  b "c d" e"#), vec!["a", "b", "c d", "e"]);
        assert_eq!(split_fields(r#""""#), vec![""]);
        assert!(split_fields("   ").is_empty());
    }

    #[test]
    fn entry_and_end_rules() {
        let p = JumanParser::default();
        let noun = Morpheme::new("猫", Tag::new(["名詞", "普通名詞", "*", "*", "NIL"]));
        let period = Morpheme::new("。", Tag::new(["特殊", "句点", "*", "*", "NIL"]));
        let verb_cont = Morpheme::new("走り", Tag::new(["動詞", "*", "子音動詞ラ行", "基本連用形", "NIL"]));
        let na_adj = Morpheme::new("静かだ", Tag::new(["形容詞", "*", "ナ形容詞", "基本形", "NIL"]));

        assert!(p.is_entry(&noun));
        assert!(!p.is_entry(&period));
        assert!(p.is_end(&period));
        assert!(!p.is_end(&noun));
        assert!(!p.is_end(&verb_cont));
        assert!(!p.is_end(&na_adj));
    }

    #[test]
    fn hook_rejects_brackets() {
        let p = JumanParser::default();
        let open = Morpheme::new("「", Tag::new(["特殊", "括弧始", "*", "*", "NIL"]));
        assert!(!p.validate_hook(&[open]));
    }

    #[test]
    fn detects_jumanpp() {
        assert!(JumanParser::new("/usr/local/bin/jumanpp", Vec::new()).jumanpp);
        assert!(!JumanParser::new("/usr/bin/juman", Vec::new()).jumanpp);
    }

    #[test]
    fn missing_binary_skips_lines() {
        let mut p = JumanParser::new("/nonexistent/juman", Vec::new());
        assert!(p.parse("猫が鳴く\n犬が吠える").is_empty());
    }

    #[test]
    fn overlong_line_is_skipped() {
        let mut p = JumanParser::new("/nonexistent/juman", Vec::new());
        let long = "あ".repeat(PIPE_BUF);
        assert!(p.parse(&long).is_empty());
        assert_eq!(p.size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn reads_rows_until_eos_and_respawns() {
        let spawns = std::env::temp_dir().join(format!("babble_{}_juman_spawns", std::process::id()));
        std::fs::remove_file(&spawns).ok();
        // Logs each start to the file named by its first argument, then
        // answers every line with one noun row.
        let script = crate::fake_analyzer(
            "juman",
            r#"echo spawn >> "$1"
while IFS= read -r line; do
  printf '%s %s %s 名詞 6 普通名詞 1 * 0 * 0 NIL\n' "$line" "$line" "$line"
  echo EOS
done
"#,
        );
        let args = vec![
            script.to_string_lossy().into_owned(),
            spawns.to_string_lossy().into_owned(),
        ];
        let mut p = JumanParser::new("sh", args).with_respawn_threshold(10);

        let parsed = p.parse("abc\ndefgh\nijklmnop");
        let tokens: Vec<&str> = parsed.iter().map(|m| m.token.as_str()).collect();
        assert_eq!(tokens, ["abc", "\n", "defgh", "\n", "ijklmnop", "\n"]);
        assert_eq!(parsed[0].tag.fields(), ["名詞", "普通名詞", "*", "*", "NIL"]);

        // The third line pushes the running process past 10 bytes.
        drop(p);
        let log = std::fs::read_to_string(&spawns).unwrap();
        assert_eq!(log.lines().count(), 2);

        std::fs::remove_file(&spawns).ok();
        std::fs::remove_file(&script).ok();
    }

    #[test]
    fn respawn_threshold_is_configurable() {
        let p = JumanParser::default().with_respawn_threshold(1024);
        assert_eq!(p.respawn_threshold, 1024);
    }
}
