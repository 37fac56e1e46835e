//! Markov chain chat line generator.
//!
//! [`Babble`] is the unit a front-end holds: it learns chat lines and
//! produces new ones that look grammatical and differ from what it has seen
//! recently. Storage and tokenization are chosen per instance from a flat
//! settings map (see [`config`]).
//!
//! ```no_run
//! use babble::{Babble, ConfigMap};
//!
//! let mut bot = Babble::from_config(&ConfigMap::new())?;
//! bot.learn("the cat sat on the mat and the cat ran off")?;
//! if let Some(text) = bot.run(Some("the")).text {
//!     println!("{text}");
//! }
//! # Ok::<(), babble::Error>(())
//! ```

pub mod config;
mod error;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chain_store::Table;
use markov_table::MarkovTable;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use textgen::TextGenerator;

pub use chain_core::{NgramKey, Token};
pub use config::{ConfigError, ConfigMap, InstanceConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use textgen::Generated;

/// Summary counters for an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Current acceptance threshold.
    pub threshold: f64,
    /// N-gram width.
    pub level: usize,
    /// Current walk length bound.
    pub maxchain: usize,
    /// Keys in the chain table.
    pub keys: usize,
    /// Keys in the entrypoint table.
    pub entrypoints: usize,
}

/// One chatbot instance.
pub struct Babble {
    generator: TextGenerator<SmallRng>,
}

impl Babble {
    /// Build an instance from a settings map.
    pub fn from_config(map: &ConfigMap) -> Result<Self> {
        Babble::new(&InstanceConfig::from_map(map)?)
    }

    /// Build an instance, opening both tables and the parser.
    pub fn new(config: &InstanceConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        let chain = Table::new(config.markov_store.open("markov", SmallRng::from_rng(&mut rng))?);
        let entrypoints = Table::new(
            config
                .entrypoint_store
                .open("entrypoint", SmallRng::from_rng(&mut rng))?,
        );
        let markov = MarkovTable::new(chain, entrypoints, config.level, config.maxchain);

        let generator = TextGenerator::new(config.parser.build(), markov, config.textgen.clone(), rng);
        tracing::info!(level = config.level, parser = ?config.parser, "instance ready");
        Ok(Babble { generator })
    }

    /// Learn a chat line (or several, newline separated).
    pub fn learn(&mut self, text: &str) -> Result<()> {
        Ok(self.generator.learn(text)?)
    }

    /// Learn every non-empty line of a file. Returns the number of lines fed.
    pub fn learn_file(&mut self, path: &Path) -> Result<usize> {
        let io_err = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(io_err)?;
        file.lock_shared().map_err(io_err)?;
        let lines: Vec<String> = BufReader::new(&file)
            .lines()
            .collect::<std::io::Result<_>>()
            .map_err(io_err)?;
        file.unlock().map_err(io_err)?;

        let mut count = 0;
        for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            self.learn(line)?;
            count += 1;
        }
        tracing::info!(path = %path.display(), lines = count, "learned file");
        Ok(count)
    }

    /// Generate a line, optionally starting at `entrypoint`.
    pub fn run(&mut self, entrypoint: Option<&str>) -> Generated {
        self.generator.run(entrypoint)
    }

    /// Every n-gram key in the chain table.
    pub fn keys(&mut self) -> Result<Vec<NgramKey>> {
        Ok(self.generator.markov_mut().keys()?)
    }

    /// Successors stored under `key`.
    pub fn values(&mut self, key: &NgramKey) -> Result<Vec<Token>> {
        Ok(self.generator.markov_mut().values(key)?)
    }

    /// Tokens in the entrypoint table.
    pub fn entrypoints(&mut self) -> Result<Vec<Token>> {
        Ok(self.generator.markov_mut().entrypoint_tokens()?)
    }

    /// Recently learned and generated texts, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.generator.recent().map(str::to_string).collect()
    }

    /// Entrypoint tokens remembered from recent input, oldest first. Walks
    /// without an explicit start pick from these.
    pub fn recent_entrypoints(&self) -> Vec<Token> {
        self.generator.entrypoints().map(str::to_string).collect()
    }

    pub fn stats(&mut self) -> Result<Stats> {
        let threshold = self.generator.threshold();
        let markov = self.generator.markov_mut();
        Ok(Stats {
            threshold,
            level: markov.level(),
            maxchain: markov.maxchain(),
            keys: markov.chain_len()?,
            entrypoints: markov.entrypoint_len()?,
        })
    }

    /// Persist buffered table state.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.generator.markov_mut().flush()?)
    }
}
