//! Line generation with grammar and novelty filtering.
//!
//! [`TextGenerator`] sits between a [`Parser`] and a [`MarkovTable`]:
//!
//! 1. **Learn**: parse and strip the input, feed its tokens to the chain,
//!    remember its entrypoint tokens, the text as the parser renders it and
//!    the word-class shape of each of its lines.
//! 2. **Run**: walk the chain, render the walk, then reject candidates that
//!    are empty, already seen verbatim, or grammatically invalid.
//! 3. **Score** survivors by how different their word-class shape is from
//!    recent shapes, and accept only those scoring at least the adaptive
//!    threshold.
//!
//! All histories are fixed-capacity ring buffers; the oldest entry is
//! dropped on overflow.

use chain_core::{Morpheme, Token};
use chain_store::StoreError;
use circular_queue::CircularQueue;
use markov_table::MarkovTable;
use morph_parser::Parser;
use rand::Rng;
use rand::seq::IteratorRandom;

/// Word classes of one parsed line.
pub type WordClasses = Vec<String>;

/// Generator tunables.
#[derive(Debug, Clone)]
pub struct TextGenConfig {
    /// Walk attempts per [`TextGenerator::run`] call.
    pub nr_retry: usize,
    /// Texts remembered for the duplicate check.
    pub nr_history: usize,
    /// Word-class shapes remembered for scoring.
    pub nr_wordclass: usize,
    /// Entrypoint tokens remembered as walk starts.
    pub nr_entrypoint: usize,
    /// Starting acceptance threshold.
    pub score_threshold: f64,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        TextGenConfig {
            nr_retry: 50,
            nr_history: 50,
            nr_wordclass: 100,
            nr_entrypoint: 100,
            score_threshold: 0.0,
        }
    }
}

/// Outcome of [`TextGenerator::run`]. Both fields are `None` when every
/// attempt was rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generated {
    pub text: Option<String>,
    pub score: Option<f64>,
}

impl Generated {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
    }
}

pub struct TextGenerator<R: Rng> {
    parser: Box<dyn Parser>,
    markov: MarkovTable,
    /// Picks walk starts from the entrypoint history.
    rng: R,
    nr_retry: usize,
    score_threshold: f64,
    /// Learned and accepted texts, rendered with [`Parser::join`] so both
    /// compare alike.
    history: CircularQueue<String>,
    /// Word-class shapes of learned and accepted lines.
    wordclass: CircularQueue<WordClasses>,
    /// Tokens that passed [`Parser::is_entry`] in learned input.
    entrypoint: CircularQueue<Token>,
}

impl<R: Rng> TextGenerator<R> {
    /// History capacities below 1 are raised to 1.
    pub fn new(parser: Box<dyn Parser>, markov: MarkovTable, config: TextGenConfig, rng: R) -> Self {
        TextGenerator {
            parser,
            markov,
            rng,
            nr_retry: config.nr_retry,
            score_threshold: config.score_threshold,
            history: CircularQueue::with_capacity(config.nr_history.max(1)),
            wordclass: CircularQueue::with_capacity(config.nr_wordclass.max(1)),
            entrypoint: CircularQueue::with_capacity(config.nr_entrypoint.max(1)),
        }
    }

    /// Learn one piece of text, possibly spanning several lines.
    ///
    /// Input with no more tokens than the chain level is ignored. Only
    /// backend failures are reported; analyzer trouble just shortens the
    /// parse.
    pub fn learn(&mut self, text: &str) -> Result<(), StoreError> {
        let parsed = self.parser.parse(text);
        let parsed = self.parser.strip(&parsed);
        if parsed.len() <= self.markov.level() {
            tracing::debug!(tokens = parsed.len(), "input too short, not learned");
            return Ok(());
        }

        let tokens: Vec<Token> = parsed.iter().map(|m| m.token.clone()).collect();
        self.markov.learn(&tokens)?;

        for token in self.parser.entrypoints(parsed) {
            self.entrypoint.push(token);
        }
        self.history.push(self.parser.join(&tokens).trim().to_string());

        for line in self.parser.split(parsed) {
            let classes = word_classes(line);
            let score = self.score(&classes);
            self.update_threshold(score);
            self.wordclass.push(classes);
        }

        tracing::debug!(tokens = tokens.len(), threshold = self.score_threshold, "learned");
        Ok(())
    }

    /// Try up to `nr_retry` walks and return the first acceptable one.
    ///
    /// With `entrypoint` every walk starts there; otherwise each attempt
    /// starts from a random remembered entrypoint token, or anywhere when
    /// none are remembered. Backend failures consume an attempt.
    pub fn run(&mut self, entrypoint: Option<&str>) -> Generated {
        for attempt in 0..self.nr_retry {
            let start = match entrypoint {
                Some(token) => Some(token.to_string()),
                None => self.entrypoint.iter().choose(&mut self.rng).cloned(),
            };

            let walk = match self.markov.run(start.as_deref()) {
                Ok(walk) => walk,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "walk failed");
                    continue;
                }
            };

            let text = self.parser.join(&walk).trim().to_string();
            if text.is_empty() || self.history_contains(&text) {
                continue;
            }

            let Some(lines) = self.shape(&text) else {
                continue;
            };
            let score = self.text_score(&lines);
            self.update_threshold(score);
            if score < self.score_threshold {
                tracing::trace!(attempt, score, threshold = self.score_threshold, "below threshold");
                continue;
            }

            tracing::debug!(attempt, score, "generated");
            self.history.push(text.clone());
            for classes in lines {
                self.wordclass.push(classes);
            }
            return Generated {
                text: Some(text),
                score: Some(score),
            };
        }

        Generated::default()
    }

    /// Word-class shape of each line of a candidate, or `None` if it fails
    /// validation.
    fn shape(&mut self, text: &str) -> Option<Vec<WordClasses>> {
        let parsed = self.parser.parse(text);
        let parsed = self.parser.strip(&parsed);
        if !self.parser.validate(parsed) {
            return None;
        }
        let lines: Vec<WordClasses> = self
            .parser
            .split(parsed)
            .into_iter()
            .map(word_classes)
            .collect();
        (!lines.is_empty()).then_some(lines)
    }

    /// Mean line score of a multi-line candidate.
    fn text_score(&self, lines: &[WordClasses]) -> f64 {
        let total: f64 = lines.iter().map(|line| self.score(line)).sum();
        total / lines.len() as f64
    }

    /// Novelty of one shape against the word-class history.
    ///
    /// 1.0 while the history holds at most one shape, otherwise the
    /// reciprocal of the mean edit distance. A shape identical to every
    /// remembered one scores 0.0.
    pub fn score(&self, classes: &[String]) -> f64 {
        if self.wordclass.len() <= 1 {
            return 1.0;
        }
        let total: usize = self
            .wordclass
            .iter()
            .map(|seen| distance(classes, seen))
            .sum();
        if total == 0 {
            return 0.0;
        }
        self.wordclass.len() as f64 / total as f64
    }

    /// Move the threshold halfway towards `score`.
    pub fn update_threshold(&mut self, score: f64) {
        self.score_threshold = (self.score_threshold + score) / 2.0;
    }

    /// Whether `text` occurs inside any remembered text.
    pub fn history_contains(&self, text: &str) -> bool {
        self.history.iter().any(|seen| seen.contains(text))
    }

    pub fn threshold(&self) -> f64 {
        self.score_threshold
    }

    /// Remembered texts, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.history.asc_iter().map(String::as_str)
    }

    /// Remembered entrypoint tokens, oldest first.
    pub fn entrypoints(&self) -> impl Iterator<Item = &str> {
        self.entrypoint.asc_iter().map(String::as_str)
    }

    pub fn markov(&self) -> &MarkovTable {
        &self.markov
    }

    pub fn markov_mut(&mut self) -> &mut MarkovTable {
        &mut self.markov
    }
}

fn word_classes(line: &[Morpheme]) -> WordClasses {
    line.iter().map(|m| m.tag.word_class().to_string()).collect()
}

/// Levenshtein distance with unit costs.
pub fn distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(x != y);
            cur[j + 1] = substitute.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    use chain_core::NgramKey;
    use chain_store::{FileStore, Table};
    use morph_parser::SimpleParser;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn generator(config: TextGenConfig) -> TextGenerator<SmallRng> {
        let markov = MarkovTable::new(
            Table::new(Box::new(FileStore::in_memory(SmallRng::seed_from_u64(1)))),
            Table::new(Box::new(FileStore::in_memory(SmallRng::seed_from_u64(2)))),
            2,
            50,
        );
        TextGenerator::new(
            Box::new(SimpleParser::new()),
            markov,
            config,
            SmallRng::seed_from_u64(42),
        )
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn classes(words: &[&str]) -> WordClasses {
        words.iter().map(|w| w.to_string()).collect()
    }

    // --- distance ---

    #[test]
    fn distance_classic_cases() {
        assert_eq!(distance(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(distance(&chars("flaw"), &chars("lawn")), 2);
        assert_eq!(distance(&chars(""), &chars("abc")), 3);
        assert_eq!(distance(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = chars("sunday");
        let b = chars("saturday");
        assert_eq!(distance(&a, &b), distance(&b, &a));
    }

    #[test]
    fn distance_at_least_length_difference() {
        let pairs = [("a", "abcdef"), ("xyz", "x"), ("hello", "help me out")];
        for (a, b) in pairs {
            let (a, b) = (chars(a), chars(b));
            assert!(distance(&a, &b) >= a.len().abs_diff(b.len()));
        }
    }

    // --- scoring ---

    #[test]
    fn score_defaults_with_short_history() {
        let mut tg = generator(TextGenConfig::default());
        let shape = classes(&["word", "word"]);
        assert_eq!(tg.score(&shape), 1.0);
        tg.wordclass.push(shape.clone());
        assert_eq!(tg.score(&shape), 1.0);
    }

    #[test]
    fn score_is_reciprocal_mean_distance() {
        let mut tg = generator(TextGenConfig::default());
        tg.wordclass.push(classes(&["word"]));
        tg.wordclass.push(classes(&["word", "word", "word"]));
        // Distances 1 and 1 from ["word", "word"].
        assert_eq!(tg.score(&classes(&["word", "word"])), 1.0);
        // Distances 0 and 2.
        assert_eq!(tg.score(&classes(&["word"])), 1.0);
        // Distances 4 and 4.
        let far = classes(&["number", "punct", "number", "punct"]);
        assert_eq!(tg.score(&far), 0.25);
    }

    #[test]
    fn repeated_shape_scores_zero() {
        let mut tg = generator(TextGenConfig::default());
        let shape = classes(&["word", "word"]);
        tg.wordclass.push(shape.clone());
        tg.wordclass.push(shape.clone());
        assert_eq!(tg.score(&shape), 0.0);
    }

    #[test]
    fn threshold_converges() {
        let mut tg = generator(TextGenConfig {
            score_threshold: 10.0,
            ..TextGenConfig::default()
        });
        for _ in 0..60 {
            tg.update_threshold(0.25);
        }
        assert!((tg.threshold() - 0.25).abs() < 1e-12);
    }

    // --- learning ---

    #[test]
    fn learn_fills_histories() {
        let mut tg = generator(TextGenConfig::default());
        tg.learn("the cat sat").unwrap();

        assert_eq!(tg.recent().collect::<Vec<_>>(), vec!["the cat sat"]);
        assert_eq!(tg.entrypoints().collect::<Vec<_>>(), vec!["the", "cat", "sat"]);
        assert_eq!(tg.threshold(), 0.5);
        assert_eq!(
            tg.markov_mut()
                .values(&NgramKey::from(["the", "cat"]))
                .unwrap(),
            vec!["sat"]
        );
    }

    #[test]
    fn multi_line_input_scores_each_line() {
        let mut tg = generator(TextGenConfig::default());
        tg.learn("the cat sat\nthe dog ran").unwrap();
        assert_eq!(tg.wordclass.len(), 2);
        // Two events scored 1.0 each from 0.0.
        assert_eq!(tg.threshold(), 0.75);
    }

    #[test]
    fn history_is_bounded() {
        let mut tg = generator(TextGenConfig {
            nr_history: 2,
            nr_entrypoint: 3,
            ..TextGenConfig::default()
        });
        tg.learn("one two three").unwrap();
        tg.learn("four five six").unwrap();
        tg.learn("seven eight nine").unwrap();
        assert_eq!(
            tg.recent().collect::<Vec<_>>(),
            vec!["four five six", "seven eight nine"]
        );
        assert_eq!(
            tg.entrypoints().collect::<Vec<_>>(),
            vec!["seven", "eight", "nine"]
        );
    }

    #[test]
    fn short_lines_learn_nothing() {
        let mut tg = generator(TextGenConfig::default());
        for line in ["hi", "ok then", "yo!"] {
            tg.learn(line).unwrap();
        }
        assert_eq!(tg.markov_mut().chain_len().unwrap(), 0);
        assert_eq!(tg.markov_mut().entrypoint_len().unwrap(), 0);
        assert_eq!(tg.recent().count(), 0);
        assert!(tg.run(None).is_empty());
    }

    // --- generation ---

    #[test]
    fn empty_tables_give_nothing() {
        for nr_retry in [0, 1, 10] {
            let mut tg = generator(TextGenConfig {
                nr_retry,
                ..TextGenConfig::default()
            });
            assert_eq!(tg.run(None), Generated::default());
            assert_eq!(tg.run(Some("the")), Generated::default());
        }
    }

    #[test]
    fn verbatim_repeat_is_rejected() {
        let mut tg = generator(TextGenConfig {
            nr_retry: 10,
            ..TextGenConfig::default()
        });
        tg.learn("the cat sat").unwrap();
        // The only possible walk is the learned line itself.
        assert!(tg.run(Some("the")).is_empty());
        assert!(tg.history_contains("cat sat"));
    }

    #[test]
    fn learned_text_is_remembered_as_rendered() {
        let mut tg = generator(TextGenConfig {
            nr_retry: 20,
            ..TextGenConfig::default()
        });
        tg.learn("the cat sat on  the mat").unwrap();
        tg.learn("a dog , ran home").unwrap();

        assert_eq!(
            tg.recent().collect::<Vec<_>>(),
            vec!["the cat sat on the mat", "a dog, ran home"]
        );
        // Each chain only reproduces its learned line.
        assert!(tg.run(Some("the")).is_empty());
        assert!(tg.run(Some("a")).is_empty());
    }

    #[test]
    fn generates_novel_text() {
        let mut tg = generator(TextGenConfig {
            nr_retry: 200,
            ..TextGenConfig::default()
        });
        let learned = "the cat sat on the mat and the cat ran off";
        tg.learn(learned).unwrap();

        let generated = tg.run(Some("the"));
        let text = generated.text.expect("a looping walk is novel");
        assert!(text.starts_with("the cat sat on the mat and the cat sat"));
        assert!(!learned.contains(&text));
        assert_eq!(generated.score, Some(1.0));
        assert_eq!(tg.recent().last(), Some(text.as_str()));
    }
}
