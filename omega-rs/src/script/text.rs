//! Text helpers shared by the builtins: lists, integers and escaping.

use std::sync::OnceLock;

use aho_corasick::AhoCorasick;

/// Separator between list items.
pub const LIST_SEP: char = '\t';

/// Split a list; the empty string is a one-item list holding `""`.
pub fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(LIST_SEP)
}

/// Join items into a list.
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            out.push(LIST_SEP);
        }
        out.push_str(item.as_ref());
    }
    out
}

/// Template truthiness.
pub fn truth(b: bool) -> String {
    if b { "true".to_owned() } else { String::new() }
}

// ── Numbers ───────────────────────────────────────────────────────────────────

/// Group the characters of `digits` in threes from the right.
pub fn nice(digits: &str, thousand: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        out.push(*c);
        let left = chars.len() - i - 1;
        if left > 0 && left % 3 == 0 {
            out.push_str(thousand);
        }
    }
    out
}

/// Human-scaled byte count: `N bytes`, `NK`, `NM` or `NG`.
pub fn filesize(size: i64) -> String {
    const K: i64 = 1024;
    if size != 0 && size < K {
        format!("{size} bytes")
    } else if size < K * K {
        format!("{}K", size / K)
    } else if size < K * K * K {
        format!("{}M", size / K / K)
    } else {
        format!("{}G", size / K / K / K)
    }
}

// ── Escaping ──────────────────────────────────────────────────────────────────

fn html_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| AhoCorasick::new(["<", ">", "&", "\""]))
}

/// Escape `<`, `>`, `&` and `"`.
pub fn html_escape(s: &str) -> String {
    html_matcher().replace_all(s, &["&lt;", "&gt;", "&amp;", "&quot;"])
}

/// Drop everything from each `<` up to the next `>`.
pub fn html_strip(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Percent-encode controls, space, non-ASCII and URL punctuation.
pub fn url_encode(s: &str) -> String {
    const UNSAFE: &[u8] = b"#%&,/:;<=>?@[\\]^_{|}";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b <= b' ' || b >= 0x7f || UNSAFE.contains(&b) {
            out.push_str(&format!("%{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// Host part of a URL: no scheme, path, credentials or port.
pub fn hostname(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url,
    };
    let host = rest.split('/').next().unwrap_or("");
    let host = host.split_once('@').map_or(host, |(_, h)| h);
    host.split(':').next().unwrap_or("")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
