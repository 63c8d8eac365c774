//! Page-continuity classification.
//!
//! Decides whether this request repeats, extends, or replaces the query of
//! the page the user came from, by comparing the freshly parsed terms with
//! the `.`-separated term list the previous page handed back to us.
//!
//! Known blind spots are kept as-is because templates rely on them: adding a
//! term that is already present, or only adding phrase quotes, still reads
//! as the same query.

use std::collections::HashSet;

/// Relationship between this request's query and the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Entirely new query.
    New,
    /// Unchanged query.
    Same,
    /// Previous terms all present, plus more.
    Extended,
    /// The query failed to parse.
    Bad,
}

/// Query terms in first-seen order, each stored once.
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl TermSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `term`; returns `false` if it was already present.
    pub fn insert(&mut self, term: &str) -> bool {
        if self.seen.contains(term) {
            return false;
        }
        self.seen.insert(term.to_owned());
        self.order.push(term.to_owned());
        true
    }

    pub fn contains(&self, term: &str) -> bool {
        self.seen.contains(term)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for TermSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = TermSet::new();
        for t in iter {
            set.insert(t);
        }
        set
    }
}

/// Classify the current query against the previous page's `token`.
///
/// `emitted` is how many terms the parser produced, repeats included;
/// `terms` is the de-duplicated set.  An empty token means the client sent
/// no history, so only an empty query counts as unchanged.
pub fn classify(token: &str, query_text: &str, emitted: usize, terms: &TermSet) -> QueryKind {
    if token.is_empty() {
        return if query_text.is_empty() { QueryKind::Same } else { QueryKind::New };
    }

    let old_terms: Vec<&str> = token.split_terminator('.').collect();
    let n_old = token.matches('.').count();

    if emitted < n_old {
        return QueryKind::New;
    }

    // Only `.`-terminated entries count; a trailing fragment is ignored.
    let complete = if token.ends_with('.') { old_terms.len() } else { old_terms.len() - 1 };
    if old_terms[..complete].iter().any(|t| !terms.contains(t)) {
        return QueryKind::New;
    }

    if terms.len() > n_old {
        QueryKind::Extended
    } else {
        QueryKind::Same
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
