//! N-gram chain over a pluggable store.
//!
//! [`MarkovTable`] keeps two tables:
//! - the **chain table**, mapping each window of `level` consecutive tokens to
//!   the bag of tokens observed right after it;
//! - the **entrypoint table**, mapping a token to the windows that opened a
//!   learned input with it, so walks can restart at natural phrase boundaries.
//!
//! Walks pick successors uniformly from the stored bag, so duplicate
//! successors carry their frequency into the walk.

use std::collections::VecDeque;

use chain_core::{NgramKey, Token};
use chain_store::{Result, Table};

pub use chain_store::StoreError;

/// Window -> successor tokens.
pub type ChainTable = Table<NgramKey, Token>;

/// First token -> windows starting with it.
pub type EntrypointTable = Table<Token, NgramKey>;

pub struct MarkovTable {
    level: usize,
    maxchain: usize,
    chain: ChainTable,
    entrypoints: EntrypointTable,
}

impl MarkovTable {
    /// `level` is the n-gram width; `maxchain` seeds the walk length bound.
    pub fn new(chain: ChainTable, entrypoints: EntrypointTable, level: usize, maxchain: usize) -> Self {
        MarkovTable {
            level,
            maxchain,
            chain,
            entrypoints,
        }
    }

    #[inline]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Current walk length bound.
    #[inline]
    pub fn maxchain(&self) -> usize {
        self.maxchain
    }

    /// Learn a token sequence.
    ///
    /// A window of width `level`, seeded with empty placeholders, slides over
    /// the tokens; each fully populated window is stored with the token that
    /// follows it. The first such window is registered under its first token
    /// in the entrypoint table. Afterwards `maxchain` moves halfway towards the
    /// length of this input.
    ///
    /// Sequences of `level` tokens or fewer have no window with a successor
    /// and are ignored entirely.
    pub fn learn(&mut self, tokens: &[Token]) -> Result<()> {
        if tokens.len() <= self.level {
            return Ok(());
        }

        let mut window: VecDeque<Token> = VecDeque::from(vec![Token::new(); self.level]);
        let mut entrypoint: Option<NgramKey> = None;

        self.chain.transaction(|chain| {
            for token in tokens {
                let key = NgramKey::new(window.iter().cloned().collect());
                if key.is_complete() {
                    chain.append(&key, token)?;
                    if entrypoint.is_none() {
                        entrypoint = Some(key);
                    }
                }
                window.pop_front();
                window.push_back(token.clone());
            }
            Ok(())
        })?;

        if let Some(key) = entrypoint
            && let Some(first) = key.first().map(str::to_string)
        {
            self.entrypoints.transaction(|t| t.append(&first, &key))?;
        }

        self.maxchain = (self.maxchain + tokens.len()) / 2;
        tracing::debug!(tokens = tokens.len(), maxchain = self.maxchain, "learned sequence");
        Ok(())
    }

    /// Walk the chain.
    ///
    /// Starts from a random window registered under `entrypoint`, or from a
    /// random window anywhere when `None`. Returns an empty vec when no
    /// starting window exists. Otherwise takes up to `maxchain` steps, stopping
    /// early at a window without successors; the result includes the starting
    /// window's tokens.
    pub fn run(&mut self, entrypoint: Option<&str>) -> Result<Vec<Token>> {
        let start = self.entrypoints.transaction(|t| match entrypoint {
            Some(token) => t.get_random(&token.to_string()),
            None => t.get_random_any(),
        })?;
        let Some(start) = start else {
            return Ok(Vec::new());
        };

        let mut window: VecDeque<Token> = start.tokens().iter().cloned().collect();
        let mut walk = start.into_tokens();
        let maxchain = self.maxchain;

        self.chain.transaction(|chain| {
            for _ in 0..maxchain {
                let key = NgramKey::new(window.iter().cloned().collect());
                let Some(next) = chain.get_random(&key)? else {
                    break;
                };
                walk.push(next.clone());
                window.pop_front();
                window.push_back(next);
            }
            Ok(())
        })?;

        Ok(walk)
    }

    /// Every window in the chain table.
    pub fn keys(&mut self) -> Result<Vec<NgramKey>> {
        self.chain.transaction(|t| t.keys())
    }

    /// Successors stored under `key`, duplicates included.
    pub fn values(&mut self, key: &NgramKey) -> Result<Vec<Token>> {
        self.chain.transaction(|t| t.get(key))
    }

    /// Tokens registered in the entrypoint table.
    pub fn entrypoint_tokens(&mut self) -> Result<Vec<Token>> {
        self.entrypoints.transaction(|t| t.keys())
    }

    /// Windows registered under `token` in the entrypoint table.
    pub fn entrypoint_keys(&mut self, token: &str) -> Result<Vec<NgramKey>> {
        self.entrypoints.transaction(|t| t.get(&token.to_string()))
    }

    pub fn chain_len(&mut self) -> Result<usize> {
        self.chain.transaction(|t| t.len())
    }

    pub fn entrypoint_len(&mut self) -> Result<usize> {
        self.entrypoints.transaction(|t| t.len())
    }

    /// Persist both tables.
    pub fn flush(&mut self) -> Result<()> {
        self.chain.flush()?;
        self.entrypoints.flush()
    }
}
