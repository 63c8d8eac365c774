//! Command-line argument parsing.
//!
//! Usage:
//!   omega [--config FILE] [--db FILE.json] [--template-dir DIR] [--log-dir DIR]
//!         [--fmt NAME] [-p KEY=VALUE]... [-e KEY=VALUE]...

use std::path::PathBuf;

use clap::Parser;
use directories::ProjectDirs;

use crate::config::Config;
use crate::request::Request;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "omega", version, about = "Render an OmegaScript search-results page")]
pub struct CliArgs {
    /// Configuration file (`key value` lines).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON document collection to search, instead of resolving `DB` under
    /// `database_dir`.
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Override the configured template directory.
    #[arg(long, value_name = "DIR")]
    pub template_dir: Option<PathBuf>,

    /// Override the configured log directory.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Template to render (same as `-p FMT=NAME`).
    #[arg(long, value_name = "NAME")]
    pub fmt: Option<String>,

    /// Request parameter; repeat for multiple values.
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub params: Vec<(String, String)>,

    /// Environment entry, on top of the process environment.
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub env: Vec<(String, String)>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`, exiting with usage on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[&str]) -> Result<CliArgs, clap::Error> {
    CliArgs::try_parse_from(std::iter::once("omega").chain(argv.iter().copied()))
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}'"))
}

impl CliArgs {
    /// Apply directory overrides to a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(d) = &self.template_dir {
            config.template_dir = d.clone();
        }
        if let Some(d) = &self.log_dir {
            config.log_dir = d.clone();
        }
    }

    /// The request described by `-p`, `-e` and `--fmt`.
    pub fn request(&self) -> Request {
        let mut request = Request::with_process_env();
        for (k, v) in &self.params {
            request.add(k, v);
        }
        if let Some(fmt) = &self.fmt {
            request.add("FMT", fmt);
        }
        for (k, v) in &self.env {
            request.set_env(k, v);
        }
        request
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Locate the configuration file.
///
/// Priority: `--config` → `OMEGA_CONFIG` env var → `omega.conf` in the
/// platform config directory → `./omega.conf`.  Returns `None` if nothing
/// on that list exists.
pub fn find_config(cli_override: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = cli_override {
        return Some(p.clone());
    }
    if let Ok(p) = std::env::var("OMEGA_CONFIG") {
        return Some(PathBuf::from(p));
    }
    ProjectDirs::from("org", "omega", "omega")
        .map(|dirs| dirs.config_dir().join("omega.conf"))
        .into_iter()
        .chain(std::iter::once(PathBuf::from("omega.conf")))
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
