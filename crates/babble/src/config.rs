//! Instance configuration.
//!
//! An instance is described by a flat string map, usually read from a
//! `key = value` file with [`load_config`] and adjusted on the command line.
//! [`InstanceConfig::from_map`] validates it once; the typed result then
//! builds the parser and both tables.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chain_store::{Database, FileStore, RedisStore, SqlStore, StoreError};
use morph_parser::{JumanParser, MecabParser, Parser, SimpleParser};
use rand::rngs::SmallRng;
use textgen::TextGenConfig;
use thiserror::Error;

/// Flat settings map.
pub type ConfigMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend `{name}` for the {table} table")]
    UnknownBackend { table: String, name: String },

    #[error("unknown parser `{0}`")]
    UnknownParser(String),

    #[error("missing required setting `{0}`")]
    Missing(String),

    #[error("invalid value `{value}` for `{key}`: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("line {line}: expected `key = value`, got `{text}`")]
    Syntax { line: usize, text: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which analyzer tokenizes text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserConfig {
    Simple,
    Mecab {
        path: PathBuf,
        args: Vec<String>,
    },
    Juman {
        path: PathBuf,
        args: Vec<String>,
        respawn_threshold: usize,
    },
}

impl ParserConfig {
    pub fn build(&self) -> Box<dyn Parser> {
        match self {
            ParserConfig::Simple => Box::new(SimpleParser::new()),
            ParserConfig::Mecab { path, args } => Box::new(MecabParser::new(path, args.clone())),
            ParserConfig::Juman {
                path,
                args,
                respawn_threshold,
            } => Box::new(JumanParser::new(path, args.clone()).with_respawn_threshold(*respawn_threshold)),
        }
    }
}

/// Where one table lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    /// JSON file, or memory only without a path.
    File { path: Option<PathBuf> },
    Redis { url: String, db: i64 },
    /// SQLite database file, `:memory:` for a private in-memory database.
    Sql { path: String },
}

impl StoreConfig {
    /// Open the backend. `name` distinguishes tables sharing one SQL file;
    /// `rng` drives the file store's random picks.
    pub fn open(&self, name: &str, rng: SmallRng) -> Result<Box<dyn Database>, StoreError> {
        let db: Box<dyn Database> = match self {
            StoreConfig::File { path: Some(path) } => Box::new(FileStore::open(path.clone(), rng)?),
            StoreConfig::File { path: None } => Box::new(FileStore::in_memory(rng)),
            StoreConfig::Redis { url, db } => Box::new(RedisStore::open(url, *db)?),
            StoreConfig::Sql { path } => Box::new(SqlStore::open(path, name)?),
        };
        Ok(db)
    }
}

/// Validated settings for one instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub parser: ParserConfig,
    pub markov_store: StoreConfig,
    pub entrypoint_store: StoreConfig,
    /// N-gram width.
    pub level: usize,
    /// Initial walk length bound.
    pub maxchain: usize,
    pub textgen: TextGenConfig,
    /// Fixed seed for reproducible runs; entropy otherwise.
    pub seed: Option<u64>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig {
            parser: ParserConfig::Simple,
            markov_store: StoreConfig::File { path: None },
            entrypoint_store: StoreConfig::File { path: None },
            level: 2,
            maxchain: 50,
            textgen: TextGenConfig::default(),
            seed: None,
        }
    }
}

impl InstanceConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let defaults = InstanceConfig::default();
        let textgen_defaults = defaults.textgen;

        let level = number(map, "markov.level", defaults.level)?;
        if level == 0 {
            return Err(invalid(map, "markov.level", "must be at least 1"));
        }

        let textgen = TextGenConfig {
            nr_retry: number(map, "textgen.nr_retry", textgen_defaults.nr_retry)?,
            nr_history: capacity(map, "textgen.nr_history", textgen_defaults.nr_history)?,
            nr_wordclass: capacity(map, "textgen.nr_wordclass", textgen_defaults.nr_wordclass)?,
            nr_entrypoint: capacity(map, "textgen.nr_entrypoint", textgen_defaults.nr_entrypoint)?,
            score_threshold: number(map, "textgen.score_threshold", textgen_defaults.score_threshold)?,
        };

        Ok(InstanceConfig {
            parser: parser(map)?,
            markov_store: store(map, "markov", 0)?,
            entrypoint_store: store(map, "entrypoint", 1)?,
            level,
            maxchain: number(map, "markov.maxchain", defaults.maxchain)?,
            textgen,
            seed: get(map, "seed").map(|_| number(map, "seed", 0)).transpose()?,
        })
    }
}

/// Non-empty, trimmed value of `key`.
fn get<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a str> {
    map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn invalid(map: &ConfigMap, key: &str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: map.get(key).cloned().unwrap_or_default(),
        reason: reason.to_string(),
    }
}

fn number<T>(map: &ConfigMap, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(map, key) {
        Some(raw) => raw.parse().map_err(|e| invalid(map, key, e)),
        None => Ok(default),
    }
}

/// Ring buffer size; zero is rejected.
fn capacity(map: &ConfigMap, key: &str, default: usize) -> Result<usize, ConfigError> {
    match number(map, key, default)? {
        0 => Err(invalid(map, key, "must be at least 1")),
        n => Ok(n),
    }
}

fn parser(map: &ConfigMap) -> Result<ParserConfig, ConfigError> {
    let args = || -> Vec<String> {
        get(map, "parser.args")
            .map(|a| a.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    };
    let path = |default: &str| PathBuf::from(get(map, "parser.path").unwrap_or(default));

    match get(map, "parser.type").unwrap_or("simple") {
        "simple" => Ok(ParserConfig::Simple),
        "mecab" => Ok(ParserConfig::Mecab {
            path: path("mecab"),
            args: args(),
        }),
        "juman" => Ok(ParserConfig::Juman {
            path: path("juman"),
            args: args(),
            respawn_threshold: number(
                map,
                "parser.respawn_threshold",
                morph_parser::DEFAULT_RESPAWN_THRESHOLD,
            )?,
        }),
        other => Err(ConfigError::UnknownParser(other.to_string())),
    }
}

fn store(map: &ConfigMap, table: &str, default_db: i64) -> Result<StoreConfig, ConfigError> {
    let key = |field: &str| format!("db.{table}.{field}");

    match get(map, &key("type")).unwrap_or("file") {
        "file" => Ok(StoreConfig::File {
            path: get(map, &key("path")).map(PathBuf::from),
        }),
        "redis" => {
            let url = get(map, &key("url")).ok_or_else(|| ConfigError::Missing(key("url")))?;
            Ok(StoreConfig::Redis {
                url: url.to_string(),
                db: number(map, &key("db"), default_db)?,
            })
        }
        "sql" => Ok(StoreConfig::Sql {
            path: get(map, &key("path")).unwrap_or(":memory:").to_string(),
        }),
        other => Err(ConfigError::UnknownBackend {
            table: table.to_string(),
            name: other.to_string(),
        }),
    }
}

/// Parse `key = value` lines. Blank lines and `#` comments are skipped.
pub fn parse_config(text: &str) -> Result<ConfigMap, ConfigError> {
    let mut map = ConfigMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax {
                line: index + 1,
                text: line.to_string(),
            });
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Read a settings file, see [`parse_config`].
pub fn load_config(path: &Path) -> Result<ConfigMap, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}
