//! The search engine seam.
//!
//! Query parsing, ranking, term expansion and document storage live behind
//! [`SearchBackend`].  The session and the builtins only ever talk to the
//! engine through this trait; [`crate::memory::MemoryBackend`] is the
//! in-process implementation used by the binary and the tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub type DocId = u32;

// ── Query ─────────────────────────────────────────────────────────────────────

/// A structured query as produced by the parser and combined with filters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Query {
    #[default]
    Empty,
    Term(String),
    And(Vec<Query>),
    Or(Vec<Query>),
    /// Left side ranks; right side must match but contributes no weight.
    Filter(Box<Query>, Box<Query>),
    AndNot(Box<Query>, Box<Query>),
}

impl Query {
    pub fn term(t: impl Into<String>) -> Self {
        Query::Term(t.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Query::Empty)
    }

    /// OR `subqueries` together, collapsing the single-element case.
    pub fn or(mut subqueries: Vec<Query>) -> Self {
        match subqueries.len() {
            0 => Query::Empty,
            1 => subqueries.remove(0),
            _ => Query::Or(subqueries),
        }
    }

    /// AND `subqueries` together, collapsing the single-element case.
    pub fn and(mut subqueries: Vec<Query>) -> Self {
        match subqueries.len() {
            0 => Query::Empty,
            1 => subqueries.remove(0),
            _ => Query::And(subqueries),
        }
    }

    pub fn filter(self, filter: Query) -> Self {
        Query::Filter(Box::new(self), Box::new(filter))
    }

    /// Human-readable form used by `$querydescription`.
    pub fn description(&self) -> String {
        format!("Query({self})")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, qs: &[Query], op: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, q) in qs.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{q}")?;
            }
            f.write_str(")")
        }
        match self {
            Query::Empty => Ok(()),
            Query::Term(t) => f.write_str(t),
            Query::And(qs) => join(f, qs, "AND"),
            Query::Or(qs) => join(f, qs, "OR"),
            Query::Filter(a, b) => write!(f, "({a} FILTER {b})"),
            Query::AndNot(a, b) => write!(f, "({a} AND_NOT {b})"),
        }
    }
}

/// Default operator joining bare query words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultOp {
    And,
    #[default]
    Or,
}

impl DefaultOp {
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultOp::And => "and",
            DefaultOp::Or => "or",
        }
    }

    /// One-character tag used in the filter fingerprint.
    pub fn tag(self) -> char {
        match self {
            DefaultOp::And => 'A',
            DefaultOp::Or => 'O',
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Settings handed to the query grammar.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    pub stemmer: String,
    pub stem_all: bool,
    pub default_op: DefaultOp,
    /// User-visible field name → term prefix.
    pub prefixes: BTreeMap<String, String>,
}

/// Result of a successful parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub query: Query,
    /// Terms in emission order; may contain repeats.
    pub terms: Vec<String>,
    /// Term → the query words which produced it.
    pub unstem: HashMap<String, Vec<String>>,
}

// ── Stemming and stopwords ────────────────────────────────────────────────────

pub trait Stemmer {
    fn stem(&self, word: &str) -> String;
}

/// Stemmer that leaves every word alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStemmer;

impl Stemmer for NoStemmer {
    fn stem(&self, word: &str) -> String {
        word.to_owned()
    }
}

/// The fixed English stopword list used for parsing and term expansion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopper;

impl Stopper {
    const WORDS: &'static [&'static str] = &[
        "a", "about", "an", "and", "are", "as", "at", "be", "by", "en", "for", "from", "how",
        "i", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what",
        "when", "where", "which", "who", "why", "will", "with",
    ];

    pub fn is_stopword(&self, word: &str) -> bool {
        Self::WORDS.binary_search(&word).is_ok()
    }
}

// ── Documents and matching ────────────────────────────────────────────────────

/// A stored document as the engine returns it.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Record text: `key=value` lines plus free text.
    pub data: String,
    pub values: BTreeMap<u32, String>,
    /// Every term indexing the document, sorted.
    pub terms: Vec<String>,
}

/// Parameters of one match run.
#[derive(Debug, Clone, Default)]
pub struct MatchRequest {
    pub first: u32,
    pub max_items: u32,
    /// Examine at least this many results so the bounds are meaningful.
    /// Advisory: an engine that always scores every match may ignore it.
    pub check_at_least: u32,
    /// Documents judged relevant; their terms weigh more in the ranking.
    pub rset: BTreeSet<DocId>,
    /// Rank purely by boolean match (all scores equal).
    pub bool_weight: bool,
    /// Drop results scoring below this percentage.
    pub cutoff_percent: u32,
    /// `(weight, half-life seconds)` recency bias.
    pub bias: Option<(f64, i64)>,
    pub sort_key: Option<u32>,
    pub collapse_key: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MSetItem {
    pub docid: DocId,
    pub percent: u32,
    pub collapse_count: u32,
}

/// A window of ranked results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MSet {
    pub first: u32,
    pub items: Vec<MSetItem>,
    pub matches_lower_bound: u32,
    pub matches_estimated: u32,
    pub matches_upper_bound: u32,
}

impl MSet {
    pub fn get(&self, index: u32) -> Option<&MSetItem> {
        index
            .checked_sub(self.first)
            .and_then(|i| self.items.get(i as usize))
    }
}

// ── SearchBackend ─────────────────────────────────────────────────────────────

/// Everything the template layer needs from the search engine.
pub trait SearchBackend {
    fn doc_count(&self) -> u32;

    fn document(&self, id: DocId) -> Option<Document>;

    fn term_exists(&self, term: &str) -> bool;

    fn term_freq(&self, term: &str) -> u32;

    /// Parse `text`, or return the grammar's error message.
    fn parse_query(&self, text: &str, config: &ParserConfig) -> Result<ParsedQuery, String>;

    fn stemmer(&self, language: &str) -> Box<dyn Stemmer>;

    fn run_match(&self, query: &Query, request: &MatchRequest) -> MSet;

    /// Up to `count` expansion terms drawn from `rset`, best first, each
    /// accepted by `decider`.
    fn expand(&self, rset: &BTreeSet<DocId>, count: usize, decider: &dyn Fn(&str) -> bool)
        -> Vec<String>;

    /// Terms of `query` which index document `id`, in query order.
    fn matching_terms(&self, query: &Query, id: DocId) -> Vec<String>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
