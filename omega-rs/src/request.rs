//! Incoming request: already-decoded parameters plus an environment snapshot.
//!
//! Parameters are multi-valued and keep the order their values arrived in.
//! Decoding the raw query string is the caller's job.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Request {
    params: BTreeMap<String, Vec<String>>,
    env: BTreeMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the process environment.
    pub fn with_process_env() -> Self {
        Self { params: BTreeMap::new(), env: std::env::vars().collect() }
    }

    /// Append a value for `name`.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.entry(name.into()).or_default().push(value.into());
    }

    /// Builder form of [`add`](Self::add).
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.env.insert(name.into(), value.into());
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values for `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.params.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

/// Parse a leading decimal integer the way C's `atol` does: optional
/// whitespace and sign, then digits; anything else stops the scan.
pub fn parse_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut n: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        n = n.wrapping_mul(10).wrapping_add(i64::from(b - b'0'));
    }
    if neg { n.wrapping_neg() } else { n }
}
