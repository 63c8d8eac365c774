//! The option table.
//!
//! A string-keyed, string-valued store read by most directives and written by
//! `$set` / `$setmap`.  Missing keys read as the empty string.  Keys are kept
//! ordered so that `prefix,` ranges can be scanned.

use std::collections::BTreeMap;

/// Mutable option store for one render.
#[derive(Debug, Clone)]
pub struct OptionTable {
    opts: BTreeMap<String, String>,
}

impl Default for OptionTable {
    fn default() -> Self {
        let mut table = Self { opts: BTreeMap::new() };
        table.set("stemmer", "english");
        table.set("thousand", ",");
        table.set("stem_all", "false");
        table
    }
}

impl OptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) an option.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.opts.insert(name.into(), value.into());
    }

    /// Set `base,key` for every `key, value` pair, as `$setmap` does.
    pub fn set_map<'a, I>(&mut self, base: &str, pairs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            self.set(format!("{base},{key}"), value);
        }
    }

    /// Get an option, or `""` if unset.
    pub fn get(&self, name: &str) -> &str {
        self.opts.get(name).map(String::as_str).unwrap_or("")
    }

    /// Get `base,key`.
    pub fn get_keyed(&self, base: &str, key: &str) -> &str {
        self.get(&format!("{base},{key}"))
    }

    /// Iterate over `(key, value)` for every option named `base,key`.
    pub fn with_prefix<'a>(&'a self, base: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
        let start = format!("{base},");
        let len = start.len();
        self.opts
            .range(start.clone()..)
            .take_while(move |(k, _)| k.starts_with(&start))
            .map(move |(k, v)| (&k[len..], v.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.opts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.opts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opts.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
