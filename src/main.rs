//! babble console: learn chat lines and generate new ones interactively.
//!
//! Thin wrapper over the `babble` library crate. Plain input lines are
//! learned; lines starting with `/` are commands (see `/help`).

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use babble::{Babble, ConfigMap, NgramKey, load_config};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// babble, a Markov chain chat line generator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file with `key = value` lines.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override one setting, e.g. `--set markov.level=3`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_setting)]
    settings: Vec<(String, String)>,

    /// PRNG seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Learn every line of this file before reading input.
    #[arg(long)]
    train: Option<PathBuf>,
}

fn parse_setting(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

const HELP: &str = "\
/print [token]   generate a line (/p)
/learn <file>    learn every line of a file (/l)
/maps <k1> ..    successors of an n-gram key (/m)
/keys            all n-gram keys (/k)
/entrypoints     entrypoint tokens (/e)
/recent          recently learned and generated lines (/r)
/rentry          recently learned entrypoint tokens
/stat            instance statistics (/s)
/help            this text (/h)
/quit            leave (/q)
anything else is learned";

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("babble: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut settings = match &args.config {
        Some(path) => load_config(path)?,
        None => ConfigMap::new(),
    };
    settings.extend(args.settings);
    if let Some(seed) = args.seed {
        settings.insert("seed".into(), seed.to_string());
    }

    let mut bot = Babble::from_config(&settings)?;

    if let Some(ref path) = args.train {
        eprintln!("Training from {}...", path.display());
        let lines = bot.learn_file(path)?;
        eprintln!("Training complete ({lines} lines).");
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(command) = trimmed.strip_prefix('/') else {
            if let Err(e) = bot.learn(trimmed) {
                writeln!(stdout, "[failed: {e}]")?;
            }
            continue;
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or("");
        let rest: Vec<&str> = words.collect();

        if matches!(name, "quit" | "q") {
            break;
        }
        if let Err(e) = dispatch(&mut bot, name, &rest, &mut stdout) {
            writeln!(stdout, "[failed: {e}]")?;
        }
        stdout.flush()?;
    }

    bot.flush()?;
    Ok(())
}

fn dispatch(bot: &mut Babble, name: &str, args: &[&str], out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    match name {
        "print" | "p" => {
            let generated = bot.run(args.first().copied());
            match (generated.text, generated.score) {
                (Some(text), Some(score)) => writeln!(out, "{text} [{score:.6}]")?,
                _ => writeln!(out, "[nothing to say]")?,
            }
        }
        "learn" | "l" => match args.first() {
            Some(path) => {
                let lines = bot.learn_file(Path::new(path))?;
                writeln!(out, "[success: {lines} lines]")?;
            }
            None => writeln!(out, "syntax: /learn <file>")?,
        },
        "maps" | "m" => {
            if args.is_empty() {
                writeln!(out, "syntax: /maps <key1> <key2> ...")?;
                return Ok(());
            }
            let key = NgramKey::new(args.iter().map(|a| a.to_string()).collect());
            for value in bot.values(&key)? {
                writeln!(out, "{value}")?;
            }
        }
        "keys" | "k" => {
            for key in bot.keys()? {
                writeln!(out, "{}", serde_json::to_string(&key)?)?;
            }
        }
        "entrypoints" | "e" => {
            for token in bot.entrypoints()? {
                writeln!(out, "{token}")?;
            }
        }
        "recent" | "r" => {
            for text in bot.recent() {
                writeln!(out, "{text}")?;
            }
        }
        "rentry" => {
            for token in bot.recent_entrypoints() {
                writeln!(out, "{token}")?;
            }
        }
        "stat" | "s" => {
            let stats = bot.stats()?;
            writeln!(out, "score threshold: {:.6}", stats.threshold)?;
            writeln!(out, "level:           {}", stats.level)?;
            writeln!(out, "maxchain:        {}", stats.maxchain)?;
            writeln!(out, "markov keys:     {}", stats.keys)?;
            writeln!(out, "entrypoints:     {}", stats.entrypoints)?;
        }
        "help" | "h" => writeln!(out, "{HELP}")?,
        other => writeln!(out, "command not found: /{other}")?,
    }
    Ok(())
}
