//! `omega.conf` configuration file parser.
//!
//! | Line | Action |
//! |------|--------|
//! | `template_dir <dir>` | where `$include` and the page template are read from |
//! | `log_dir <dir>` | where `$log` appends |
//! | `database_dir <dir>` | where database names resolve to `<dir>/<name>.json` |
//! | `default_template <name>` | template used when `FMT` is absent |
//! | `default_db <name>` | database used when `DB` is absent |
//! | `<key> <value>` | any other key is copied into the option table |
//! | Lines starting with `#` | comment, ignored |

use std::path::{Path, PathBuf};

use crate::options::OptionTable;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Where things live, plus any extra options the file declares.
#[derive(Debug, Clone)]
pub struct Config {
    pub template_dir: PathBuf,
    pub log_dir: PathBuf,
    pub database_dir: PathBuf,
    pub default_template: String,
    pub default_db: String,
    pub options: OptionTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            log_dir: PathBuf::from("log"),
            database_dir: PathBuf::from("data"),
            default_template: "query".to_owned(),
            default_db: "default".to_owned(),
            options: OptionTable::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any lines that could not be used.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(|c: char| c.is_ascii_whitespace()) else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("`{line}' has no value"),
                });
                continue;
            };
            let value = value.trim();

            match key {
                "template_dir" => config.template_dir = PathBuf::from(value),
                "log_dir" => config.log_dir = PathBuf::from(value),
                "database_dir" => config.database_dir = PathBuf::from(value),
                "default_template" => config.default_template = value.to_owned(),
                "default_db" => config.default_db = value.to_owned(),
                _ => config.options.set(key, value),
            }
        }

        (config, errors)
    }

    /// The collection file for database `name`, or `None` if the name is
    /// empty or would leave `database_dir`.
    pub fn database_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains("..") || name.contains(['/', '\\']) {
            return None;
        }
        Some(self.database_dir.join(format!("{name}.json")))
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
