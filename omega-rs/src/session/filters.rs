//! Boolean filter terms from `B` parameters.
//!
//! Terms are grouped by prefix: terms sharing a prefix are alternatives
//! (OR), distinct prefixes must all match (AND).  So `B=X1&B=X2&B=Y1`
//! restricts to `(X1 OR X2) AND Y1`.

use std::collections::BTreeMap;

use crate::backend::{DefaultOp, Query};

use super::daterange::DateRange;

/// Separator between fields of the filter fingerprint.
pub const FILTER_SEP: char = '~';

/// The prefix grouping key of a boolean term.
///
/// `X`-terms use `X` plus the following uppercase run (and a `:` if one
/// follows); anything else groups on its first character.
pub fn term_prefix(term: &str) -> &str {
    let mut chars = term.char_indices();
    match chars.next() {
        None => "",
        Some((_, 'X')) => {
            let mut end = 1;
            for (i, c) in chars {
                if c.is_ascii_uppercase() {
                    end = i + 1;
                } else {
                    if c == ':' {
                        end = i + 1;
                    }
                    break;
                }
            }
            &term[..end]
        }
        Some((_, c)) => &term[..c.len_utf8()],
    }
}

/// Filter terms grouped by prefix, in prefix order then arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterMap {
    groups: BTreeMap<String, Vec<String>>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `B` value.  Empty values are ignored.
    pub fn add(&mut self, term: &str) {
        if term.is_empty() {
            return;
        }
        self.groups.entry(term_prefix(term).to_owned()).or_default().push(term.to_owned());
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every term, grouped by prefix.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.groups.values().flatten().map(String::as_str)
    }

    /// AND of per-prefix ORs.
    pub fn to_query(&self) -> Query {
        Query::and(
            self.groups
                .values()
                .map(|terms| Query::or(terms.iter().map(|t| Query::term(t.as_str())).collect()))
                .collect(),
        )
    }

    /// Stable string form of the filters, date range and default operator,
    /// used to notice a changed filter set between pages.
    pub fn fingerprint(&self, dates: &DateRange, op: DefaultOp) -> String {
        let mut out = String::new();
        for term in self.terms() {
            out.push_str(term);
            out.push(FILTER_SEP);
        }
        out.push_str(&dates.start);
        out.push(FILTER_SEP);
        out.push_str(&dates.end);
        out.push(FILTER_SEP);
        out.push_str(&dates.span);
        out.push(op.tag());
        out
    }
}

impl<'a> FromIterator<&'a str> for FilterMap {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut map = FilterMap::new();
        for t in iter {
            map.add(t);
        }
        map
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
