//! In-memory search engine.
//!
//! Holds a small document collection, answers the [`SearchBackend`] calls
//! with a tf·idf ranking, and understands a compact query grammar:
//!
//! | Input | Meaning |
//! |-------|---------|
//! | `word` | stemmed term; capitalised words search the raw `R` form |
//! | `field:word` | prefixed term, for fields declared in the parser config |
//! | `-word` | exclude documents containing `word` |
//! | `a AND b`, `a OR b`, `a NOT b` | explicit operators |
//!
//! Documents load from JSON (see [`SourceDocument`]).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::backend::{
    DefaultOp, DocId, Document, MSet, MSetItem, MatchRequest, NoStemmer, ParsedQuery,
    ParserConfig, Query, SearchBackend, Stemmer, Stopper,
};

// ── Source documents ──────────────────────────────────────────────────────────

/// A document as supplied to the indexer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceDocument {
    /// Record text returned by `$record` and parsed into `$field`s.
    pub data: String,
    /// Free text to index.
    pub text: String,
    /// Boolean terms added verbatim (e.g. `Hexample.org`, `XAUTHORsmith`).
    pub terms: Vec<String>,
    pub values: BTreeMap<u32, String>,
    /// `YYYYMMDD`; indexed as `D`, `M` and `Y` terms.
    pub date: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    data: String,
    values: BTreeMap<u32, String>,
    /// term → within-document frequency
    terms: BTreeMap<String, u32>,
    timestamp: Option<i64>,
}

// ── Stemmer ───────────────────────────────────────────────────────────────────

/// A light English suffix stripper.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixStemmer;

impl Stemmer for SuffixStemmer {
    fn stem(&self, word: &str) -> String {
        if !word.chars().all(|c| c.is_ascii_lowercase()) {
            return word.to_owned();
        }
        for (suffix, replacement) in [("ies", "y"), ("ing", ""), ("ed", ""), ("es", ""), ("s", "")] {
            if let Some(base) = word.strip_suffix(suffix) {
                if base.len() >= 3 && !base.ends_with('s') {
                    return format!("{base}{replacement}");
                }
            }
        }
        word.to_owned()
    }
}

fn stemmer_for(language: &str) -> Box<dyn Stemmer> {
    match language {
        "english" | "en" | "porter" => Box::new(SuffixStemmer),
        _ => Box::new(NoStemmer),
    }
}

/// Split `text` into alphanumeric words.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

// ── MemoryBackend ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    docs: Vec<StoredDoc>,
    /// term → documents containing it
    postings: HashMap<String, BTreeSet<DocId>>,
    stemmer_language: String,
}

impl MemoryBackend {
    /// Index `docs`; document ids start at 1 in input order.
    pub fn from_documents(docs: Vec<SourceDocument>) -> Self {
        let mut backend = Self { stemmer_language: "english".to_owned(), ..Self::default() };
        for doc in docs {
            backend.add(doc);
        }
        backend
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let docs: Vec<SourceDocument> =
            serde_json::from_str(s).context("database is not a JSON array of documents")?;
        Ok(Self::from_documents(docs))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading database {}", path.display()))?;
        Self::from_json_str(&s)
    }

    fn add(&mut self, src: SourceDocument) {
        let stemmer = stemmer_for(&self.stemmer_language);
        let mut terms: BTreeMap<String, u32> = BTreeMap::new();
        for word in words(&src.text) {
            let lower = word.to_lowercase();
            *terms.entry(format!("R{lower}")).or_default() += 1;
            *terms.entry(stemmer.stem(&lower)).or_default() += 1;
        }
        for t in src.terms {
            *terms.entry(t).or_default() += 1;
        }
        let mut timestamp = None;
        if let Some(date) = src.date.as_deref().filter(|d| d.len() == 8) {
            terms.insert(format!("D{date}"), 1);
            terms.insert(format!("M{}", &date[..6]), 1);
            terms.insert(format!("Y{}", &date[..4]), 1);
            timestamp = chrono::NaiveDate::parse_from_str(date, "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp());
        }

        let id = self.docs.len() as DocId + 1;
        for term in terms.keys() {
            self.postings.entry(term.clone()).or_default().insert(id);
        }
        self.docs.push(StoredDoc { data: src.data, values: src.values, terms, timestamp });
    }

    fn stored(&self, id: DocId) -> Option<&StoredDoc> {
        id.checked_sub(1).and_then(|i| self.docs.get(i as usize))
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.term_freq(term) as f64;
        if df == 0.0 {
            return 0.0;
        }
        (1.0 + self.docs.len() as f64 / df).ln()
    }

    fn matches(&self, query: &Query, doc: &StoredDoc) -> bool {
        match query {
            Query::Empty => false,
            Query::Term(t) => doc.terms.contains_key(t),
            Query::And(qs) => qs.iter().all(|q| self.matches(q, doc)),
            Query::Or(qs) => qs.iter().any(|q| self.matches(q, doc)),
            Query::Filter(a, b) => self.matches(a, doc) && self.matches(b, doc),
            Query::AndNot(a, b) => self.matches(a, doc) && !self.matches(b, doc),
        }
    }

    /// Weight from the ranked parts of `query` only.
    /// Up to twice the plain weight for a term every relevant document has.
    fn relevance_factor(&self, term: &str, rset: &BTreeSet<DocId>) -> f64 {
        if rset.is_empty() {
            return 1.0;
        }
        let hits = rset
            .iter()
            .filter_map(|&id| self.stored(id))
            .filter(|d| d.terms.contains_key(term))
            .count();
        1.0 + hits as f64 / rset.len() as f64
    }

    fn weight(&self, query: &Query, doc: &StoredDoc, rset: &BTreeSet<DocId>) -> f64 {
        match query {
            Query::Empty => 0.0,
            Query::Term(t) => match doc.terms.get(t) {
                Some(&wdf) => {
                    (1.0 + (wdf as f64).ln()) * self.idf(t) * self.relevance_factor(t, rset)
                }
                None => 0.0,
            },
            Query::And(qs) | Query::Or(qs) => qs.iter().map(|q| self.weight(q, doc, rset)).sum(),
            Query::Filter(a, _) | Query::AndNot(a, _) => self.weight(a, doc, rset),
        }
    }
}

fn percentage(ratio: f64) -> u32 {
    ((100.0 * ratio + 0.5) as i64).clamp(1, 100) as u32
}

fn ordered_terms<'a>(query: &'a Query, out: &mut Vec<&'a str>) {
    match query {
        Query::Empty => {}
        Query::Term(t) => {
            if !out.contains(&t.as_str()) {
                out.push(t);
            }
        }
        Query::And(qs) | Query::Or(qs) => qs.iter().for_each(|q| ordered_terms(q, out)),
        Query::Filter(a, b) | Query::AndNot(a, b) => {
            ordered_terms(a, out);
            ordered_terms(b, out);
        }
    }
}

impl SearchBackend for MemoryBackend {
    fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    fn document(&self, id: DocId) -> Option<Document> {
        self.stored(id).map(|d| Document {
            data: d.data.clone(),
            values: d.values.clone(),
            terms: d.terms.keys().cloned().collect(),
        })
    }

    fn term_exists(&self, term: &str) -> bool {
        self.postings.contains_key(term)
    }

    fn term_freq(&self, term: &str) -> u32 {
        self.postings.get(term).map(|p| p.len() as u32).unwrap_or(0)
    }

    fn parse_query(&self, text: &str, config: &ParserConfig) -> Result<ParsedQuery, String> {
        let stemmer = stemmer_for(&config.stemmer);
        QueryParser { config, stemmer: stemmer.as_ref(), out: ParsedQuery::default() }.parse(text)
    }

    fn stemmer(&self, language: &str) -> Box<dyn Stemmer> {
        stemmer_for(language)
    }

    fn run_match(&self, query: &Query, request: &MatchRequest) -> MSet {
        let now = chrono::Utc::now().timestamp();
        let mut ranked: Vec<(DocId, f64)> = Vec::new();
        for (i, doc) in self.docs.iter().enumerate() {
            if !self.matches(query, doc) {
                continue;
            }
            let mut w = if request.bool_weight { 0.0 } else { self.weight(query, doc, &request.rset) };
            if let (Some((bias, half_life)), Some(ts)) = (request.bias, doc.timestamp) {
                if half_life > 0 {
                    let age = (now - ts).max(0) as f64;
                    w += bias * 0.5f64.powf(age / half_life as f64);
                }
            }
            ranked.push((i as DocId + 1, w));
        }

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        if let Some(slot) = request.sort_key {
            let key = |id: DocId| self.stored(id).and_then(|d| d.values.get(&slot)).cloned();
            ranked.sort_by(|a, b| key(a.0).cmp(&key(b.0)));
        }

        let top = ranked.first().map(|r| r.1).unwrap_or(0.0);
        let mut items: Vec<MSetItem> = ranked
            .iter()
            .map(|&(docid, w)| MSetItem {
                docid,
                percent: if request.bool_weight || top <= 0.0 { 100 } else { percentage(w / top) },
                collapse_count: 0,
            })
            .filter(|item| item.percent >= request.cutoff_percent)
            .collect();

        if let Some(slot) = request.collapse_key {
            let mut seen: HashMap<String, usize> = HashMap::new();
            let mut kept: Vec<MSetItem> = Vec::new();
            for item in items {
                let value = self
                    .stored(item.docid)
                    .and_then(|d| d.values.get(&slot))
                    .cloned()
                    .unwrap_or_default();
                if value.is_empty() {
                    kept.push(item);
                    continue;
                }
                match seen.get(&value) {
                    Some(&pos) => kept[pos].collapse_count += 1,
                    None => {
                        seen.insert(value, kept.len());
                        kept.push(item);
                    }
                }
            }
            items = kept;
        }

        let total = items.len() as u32;
        let window: Vec<MSetItem> = items
            .into_iter()
            .skip(request.first as usize)
            .take(request.max_items as usize)
            .collect();
        MSet {
            first: request.first,
            items: window,
            matches_lower_bound: total,
            matches_estimated: total,
            matches_upper_bound: total,
        }
    }

    fn expand(
        &self,
        rset: &BTreeSet<DocId>,
        count: usize,
        decider: &dyn Fn(&str) -> bool,
    ) -> Vec<String> {
        let mut scores: BTreeMap<&str, f64> = BTreeMap::new();
        for doc in rset.iter().filter_map(|&id| self.stored(id)) {
            for term in doc.terms.keys() {
                *scores.entry(term).or_default() += self.idf(term);
            }
        }
        let mut candidates: Vec<(&str, f64)> =
            scores.into_iter().filter(|(t, _)| decider(t)).collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        candidates.into_iter().take(count).map(|(t, _)| t.to_owned()).collect()
    }

    fn matching_terms(&self, query: &Query, id: DocId) -> Vec<String> {
        let Some(doc) = self.stored(id) else { return Vec::new() };
        let mut all = Vec::new();
        ordered_terms(query, &mut all);
        all.into_iter()
            .filter(|t| doc.terms.contains_key(*t))
            .map(str::to_owned)
            .collect()
    }
}

// ── Query parser ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word { text: String, negated: bool },
    And,
    Or,
    Not,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for raw in text.split_whitespace() {
        match raw {
            "AND" => tokens.push(Token::And),
            "OR" => tokens.push(Token::Or),
            "NOT" => tokens.push(Token::Not),
            _ => {
                let (negated, body) = match raw.strip_prefix('-') {
                    Some(rest) if !rest.is_empty() => (true, rest),
                    _ => (false, raw.strip_prefix('+').unwrap_or(raw)),
                };
                let body = body.trim_matches('"');
                if !body.is_empty() {
                    tokens.push(Token::Word { text: body.to_owned(), negated });
                }
            }
        }
    }
    tokens
}

struct QueryParser<'a> {
    config: &'a ParserConfig,
    stemmer: &'a dyn Stemmer,
    out: ParsedQuery,
}

impl QueryParser<'_> {
    fn parse(mut self, text: &str) -> Result<ParsedQuery, String> {
        let tokens = tokenize(text);
        let mut pos = 0;
        let query = self.parse_or(&tokens, &mut pos)?;
        if pos < tokens.len() {
            return Err(syntax_error(&tokens[pos]));
        }
        self.out.query = query;
        Ok(self.out)
    }

    fn parse_or(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Query, String> {
        let start = *pos;
        let mut parts = vec![self.parse_and(tokens, pos)?];
        while tokens.get(*pos) == Some(&Token::Or) {
            if *pos == start {
                return Err(syntax_error(&Token::Or));
            }
            *pos += 1;
            parts.push(self.operand(tokens, pos, &Token::Or, Self::parse_and)?);
        }
        Ok(Query::or(parts.into_iter().filter(|q| !q.is_empty()).collect()))
    }

    fn parse_and(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Query, String> {
        let start = *pos;
        let mut parts = vec![self.parse_not(tokens, pos)?];
        while tokens.get(*pos) == Some(&Token::And) {
            if *pos == start {
                return Err(syntax_error(&Token::And));
            }
            *pos += 1;
            parts.push(self.operand(tokens, pos, &Token::And, Self::parse_not)?);
        }
        Ok(Query::and(parts.into_iter().filter(|q| !q.is_empty()).collect()))
    }

    fn parse_not(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Query, String> {
        let start = *pos;
        let mut left = self.parse_seq(tokens, pos)?;
        while tokens.get(*pos) == Some(&Token::Not) {
            if *pos == start {
                return Err(syntax_error(&Token::Not));
            }
            *pos += 1;
            let right = self.operand(tokens, pos, &Token::Not, Self::parse_seq)?;
            if !right.is_empty() {
                left = Query::AndNot(Box::new(left), Box::new(right));
            }
        }
        Ok(left)
    }

    /// Right-hand operand of a binary operator; an empty operand is a syntax error.
    fn operand(
        &mut self,
        tokens: &[Token],
        pos: &mut usize,
        op: &Token,
        next: fn(&mut Self, &[Token], &mut usize) -> Result<Query, String>,
    ) -> Result<Query, String> {
        let start = *pos;
        let q = next(self, tokens, pos)?;
        if *pos == start {
            return Err(syntax_error(op));
        }
        Ok(q)
    }

    fn parse_seq(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Query, String> {
        let mut plain = Vec::new();
        let mut excluded = Vec::new();
        while let Some(Token::Word { text, negated }) = tokens.get(*pos) {
            *pos += 1;
            for term in self.word_terms(text) {
                if *negated {
                    excluded.push(Query::Term(term));
                } else {
                    plain.push(Query::Term(term));
                }
            }
        }
        let base = match self.config.default_op {
            DefaultOp::And => Query::and(plain),
            DefaultOp::Or => Query::or(plain),
        };
        if excluded.is_empty() || base.is_empty() {
            return Ok(base);
        }
        Ok(Query::AndNot(Box::new(base), Box::new(Query::or(excluded))))
    }

    /// Terms for one whitespace-delimited query word, recording them.
    fn word_terms(&mut self, text: &str) -> Vec<String> {
        let (prefix, body) = match text.split_once(':') {
            Some((field, rest)) => match self.config.prefixes.get(field) {
                Some(p) => (p.clone(), rest),
                None => (String::new(), text),
            },
            None => (String::new(), text),
        };

        let mut terms = Vec::new();
        for word in words(body) {
            let lower = word.to_lowercase();
            if prefix.is_empty() && Stopper.is_stopword(&lower) {
                continue;
            }
            let capitalised = word.chars().next().is_some_and(char::is_uppercase);
            let term = if prefix.is_empty() && capitalised && !self.config.stem_all {
                format!("R{lower}")
            } else {
                format!("{prefix}{}", self.stemmer.stem(&lower))
            };
            let originals = self.out.unstem.entry(term.clone()).or_default();
            if !originals.contains(&lower) {
                originals.push(lower);
            }
            self.out.terms.push(term.clone());
            terms.push(term);
        }
        terms
    }
}

fn syntax_error(op: &Token) -> String {
    let name = match op {
        Token::And => "AND",
        Token::Or => "OR",
        Token::Not => "NOT",
        Token::Word { text, .. } => return format!("Syntax: unexpected `{text}'"),
    };
    format!("Syntax: <expression> {name} <expression>")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
