//! Query-term highlighting for result snippets.
//!
//! The text is tokenised the same way documents are indexed, with accents
//! folded for comparison only: the output always carries the original
//! characters, HTML-escaped, with matching tokens wrapped in markup.
//!
//! Tokens, tried in order at each word start:
//!
//! - acronyms such as `U.S.A.`: an uppercase letter followed by `.`+uppercase
//!   pairs, at least two letters, not followed by an alphanumeric;
//! - words: an alphanumeric run which may absorb `&` between alphanumerics
//!   (`AT&T`) and a trailing run of `#` or of `+`/`-` (`c#`, `c++`) when no
//!   alphanumeric follows.
//!
//! A token matches if its stem is in the term list, or, for tokens starting
//! with an uppercase letter or a digit, if its `R`-prefixed raw form is.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::backend::Stemmer;
use crate::script::text::{html_escape, split_list};

/// Default opening markup.
pub const DEFAULT_OPEN: &str = "<strong>";

/// Closing tag matching an opening tag: `<span class=x>` → `</span>`.
pub fn close_tag_for(open: &str) -> String {
    let name: String = open
        .chars()
        .skip(1)
        .enumerate()
        .take_while(|&(i, c)| i == 0 || c.is_ascii_alphanumeric() || c == '.' || c == '-')
        .map(|(_, c)| c)
        .collect();
    format!("</{name}>")
}

fn fold(c: char) -> char {
    if c.is_ascii() {
        c
    } else {
        c.nfd().next().unwrap_or(c)
    }
}

/// Wrap the words of `text` matching `terms` (a tab-separated list) in
/// `open`/`close`, HTML-escaping everything else.
pub fn highlight(text: &str, terms: &str, open: &str, close: &str, stemmer: &dyn Stemmer) -> String {
    let wanted: HashSet<&str> = split_list(terms).collect();
    let chars: Vec<(usize, char)> = text.char_indices().map(|(i, c)| (i, fold(c))).collect();
    let n = chars.len();
    let offset = |i: usize| chars.get(i).map_or(text.len(), |&(o, _)| o);
    let ch = |i: usize| chars[i].1;
    let alnum = |i: usize| i < n && ch(i).is_alphanumeric();

    let mut out = String::with_capacity(text.len());
    let mut j = 0;
    loop {
        let mut first = j;
        while first < n && !ch(first).is_alphanumeric() {
            first += 1;
        }
        if first == n {
            break;
        }
        let start = j;

        let mut term = String::new();
        let mut last = first;
        if ch(first).is_uppercase() {
            let mut k = first;
            term.push(ch(k));
            loop {
                k += 1;
                if k >= n || ch(k) != '.' {
                    break;
                }
                k += 1;
                if k >= n || !ch(k).is_uppercase() {
                    break;
                }
                term.push(ch(k));
            }
            if term.chars().count() < 2 || alnum(k) {
                term.clear();
            }
            last = k;
        }

        if term.is_empty() {
            let mut k = first;
            while alnum(k) {
                term.push(ch(k));
                k += 1;
                if k < n && ch(k) == '&' {
                    if !alnum(k + 1) {
                        break;
                    }
                    term.push('&');
                    k += 1;
                }
            }
            last = k;
            if k < n && matches!(ch(k), '#' | '+' | '-') {
                let len = term.len();
                if ch(k) == '#' {
                    term.push('#');
                    while k < n && ch(k) == '#' {
                        k += 1;
                    }
                } else {
                    while k < n && matches!(ch(k), '+' | '-') {
                        term.push(ch(k));
                        k += 1;
                    }
                }
                if alnum(k) {
                    term.truncate(len);
                } else {
                    last = k;
                }
            }
        }
        j = last;

        let lower = term.to_lowercase();
        let leading = ch(first);
        let matched = ((leading.is_uppercase() || leading.is_ascii_digit())
            && wanted.contains(format!("R{lower}").as_str()))
            || wanted.contains(stemmer.stem(&lower).as_str());

        if matched {
            out.push_str(&html_escape(&text[offset(start)..offset(first)]));
            out.push_str(open);
            out.push_str(&html_escape(&text[offset(first)..offset(j)]));
            out.push_str(close);
        } else {
            out.push_str(&html_escape(&text[offset(start)..offset(j)]));
        }
    }
    out.push_str(&html_escape(&text[offset(j)..]));
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoStemmer;
    use crate::memory::SuffixStemmer;

    fn hl(text: &str, terms: &str) -> String {
        highlight(text, terms, "<b>", "</b>", &NoStemmer)
    }

    #[test]
    fn close_tags() {
        assert_eq!(close_tag_for("<strong>"), "</strong>");
        assert_eq!(close_tag_for("<span class=\"hit\">"), "</span>");
        assert_eq!(close_tag_for("<b>"), "</b>");
    }

    #[test]
    fn plain_word() {
        assert_eq!(hl("I like rust a lot", "rust"), "I like <b>rust</b> a lot");
    }

    #[test]
    fn escapes_everything_else() {
        assert_eq!(hl("<rust> & \"x\"", "rust"), "&lt;<b>rust</b>&gt; &amp; &quot;x&quot;");
    }

    #[test]
    fn stemmed_match() {
        let out = highlight("Parsing queries", "query", "<b>", "</b>", &SuffixStemmer);
        assert_eq!(out, "Parsing <b>queries</b>");
    }

    #[test]
    fn raw_form_for_capitals() {
        assert_eq!(hl("Rust and rust", "Rrust"), "<b>Rust</b> and rust");
    }

    #[test]
    fn acronyms() {
        assert_eq!(hl("the U.S.A. today", "Rusa"), "the <b>U.S.A.</b> today");
        assert_eq!(hl("U.Sx", "Rus"), "U.Sx");
    }

    #[test]
    fn ampersand_and_suffixes() {
        assert_eq!(hl("AT&T rocks", "Rat&t"), "<b>AT&amp;T</b> rocks");
        assert_eq!(hl("c++ and c# code", "c++\tc#"), "<b>c++</b> and <b>c#</b> code");
        assert_eq!(hl("a+b", "a+"), "a+b");
        assert_eq!(hl("rock& roll", "rock"), "<b>rock</b>&amp; roll");
    }

    #[test]
    fn accents_fold_for_matching_only() {
        assert_eq!(hl("café noir", "cafe"), "<b>café</b> noir");
    }

    #[test]
    fn no_words() {
        assert_eq!(hl("", "x"), "");
        assert_eq!(hl(" -- <> ", "x"), " -- &lt;&gt; ");
    }
}
