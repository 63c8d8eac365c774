//! Per-request query session.
//!
//! A [`QuerySession`] starts `Unparsed`.  The first directive that needs the
//! parsed query moves it to `Parsed` (parse, classify, resolve paging and
//! relevance judgements); the first directive that needs results moves it to
//! `Matched`.  Each transition happens at most once and never goes back.
//!
//! # Request parameters
//!
//! | Name | Meaning |
//! |------|---------|
//! | `P` | query text |
//! | `DB` | database name (default from config) |
//! | `HITSPERPAGE` | page size, 0 → 10, capped at 1000 |
//! | `DEFAULTOP` | `and` or `or` |
//! | `B` | boolean filter term, repeatable |
//! | `DATE1` `DATE2` `DAYSMINUS` | date range |
//! | `TOPDOC` `>` `<` `[` `#` | paging |
//! | `RAWSEARCH` `RAW_SEARCH` | don't snap `TOPDOC` to a page boundary |
//! | `R` | `.`-separated relevant docids, repeatable |
//! | `xP` `OLDP` | previous page's term fingerprint |
//! | `xDB` `xFILTERS` | previous page's database and filters |
//! | `xB` `xDATE1` `xDATE2` `xDAYSMINUS` `xDEFAULTOP` | older spelling of `xFILTERS` |
//! | `THRESHOLD` `MINHITS` `SORT` `COLLAPSE` | match tuning |
//! | `bias_weight` `bias_halflife` | recency bias |

pub mod classify;
pub mod daterange;
pub mod filters;
pub mod hit;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::backend::{
    DefaultOp, DocId, MSet, MatchRequest, ParserConfig, Query, SearchBackend, Stemmer, Stopper,
};
use crate::error::TemplateError;
use crate::options::OptionTable;
use crate::request::{parse_int, Request};

pub use classify::{classify, QueryKind, TermSet};
pub use daterange::DateRange;
pub use filters::{FilterMap, FILTER_SEP};
pub use hit::Hit;

const DEFAULT_HITS_PER_PAGE: u32 = 10;
const MAX_HITS_PER_PAGE: u32 = 1000;
const DEFAULT_BIAS_HALF_LIFE: i64 = 2 * 24 * 60 * 60;
/// Hits used as a stand-in relevance set for `$topterms` when none is marked.
const PSEUDO_RSET_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Unparsed,
    Parsed,
    Matched,
}

pub struct QuerySession<'a> {
    backend: &'a dyn SearchBackend,
    request: &'a Request,
    stage: Stage,

    query_text: String,
    dbname: String,
    default_op: DefaultOp,
    filters: FilterMap,
    dates: DateRange,
    hits_per_page: u32,
    topdoc: u32,
    last: u32,

    query: Query,
    unstem: BTreeMap<String, Vec<String>>,
    termset: TermSet,
    kind: Option<QueryKind>,
    error: Option<TemplateError>,

    ticked: BTreeMap<DocId, bool>,
    rset: BTreeSet<DocId>,
    mset: MSet,
    elapsed: Option<Duration>,
}

impl<'a> QuerySession<'a> {
    /// Read the request-level settings; nothing is parsed or matched yet.
    pub fn new(backend: &'a dyn SearchBackend, request: &'a Request, default_db: &str) -> Self {
        let hits_per_page = match parse_int(request.get("HITSPERPAGE").unwrap_or("")) {
            n if n <= 0 => DEFAULT_HITS_PER_PAGE,
            n => n.min(i64::from(MAX_HITS_PER_PAGE)) as u32,
        };
        let default_op = match request.get("DEFAULTOP") {
            Some(op) if op.eq_ignore_ascii_case("and") => DefaultOp::And,
            _ => DefaultOp::Or,
        };
        Self {
            backend,
            request,
            stage: Stage::Unparsed,
            query_text: request.get("P").unwrap_or("").to_owned(),
            dbname: request.get("DB").unwrap_or(default_db).to_owned(),
            default_op,
            filters: request.get_all("B").iter().map(String::as_str).collect(),
            dates: DateRange::from_request(request),
            hits_per_page,
            topdoc: 0,
            last: 0,
            query: Query::Empty,
            unstem: BTreeMap::new(),
            termset: TermSet::new(),
            kind: None,
            error: None,
            ticked: BTreeMap::new(),
            rset: BTreeSet::new(),
            mset: MSet::default(),
            elapsed: None,
        }
    }

    pub fn backend(&self) -> &'a dyn SearchBackend {
        self.backend
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    /// Unparsed → Parsed.  No-op once parsed.
    pub fn ensure_parsed(&mut self, options: &OptionTable) {
        if self.stage >= Stage::Parsed {
            return;
        }
        self.stage = Stage::Parsed;

        let request = self.request;
        let (token, mut discard_rset, mut force_first_page) =
            match request.get("xP").or_else(|| request.get("OLDP")) {
                Some(t) => (t, true, true),
                None => ("", false, false),
            };

        let kind = self.parse_probabilistic(token, options);
        self.kind = Some(kind);

        if matches!(kind, QueryKind::Same | QueryKind::Extended) {
            let same_db = request.get("xDB").map_or(true, |db| db == self.dbname);
            if same_db {
                if kind == QueryKind::Same && force_first_page {
                    force_first_page = self.previous_filters() != self.filters_fingerprint();
                }
                discard_rset = false;
            }
        }
        debug!(?kind, discard_rset, force_first_page, "query classified");

        if !force_first_page {
            self.topdoc = self.requested_topdoc();
        }
        if !discard_rset {
            for list in request.get_all("R") {
                for id in list.split('.').map(parse_int) {
                    if id > 0 {
                        self.mark_relevant(id as DocId);
                    }
                }
            }
        }
    }

    /// Parsed → Matched, parsing first if needed.  No-op once matched.
    pub fn ensure_matched(&mut self, options: &OptionTable) {
        self.ensure_parsed(options);
        if self.stage >= Stage::Matched {
            return;
        }
        self.stage = Stage::Matched;
        self.run_query(chrono::Local::now().date_naive());

        self.last = self.mset.matches_lower_bound;
        if self.last == 0 {
            self.topdoc = 0;
        } else {
            if self.topdoc >= self.last {
                self.topdoc = (self.last - 1) / self.hits_per_page * self.hits_per_page;
            }
            if self.topdoc.saturating_add(self.hits_per_page) < self.last {
                self.last = self.topdoc + self.hits_per_page;
            }
        }
        debug!(topdoc = self.topdoc, last = self.last, "matched");
    }

    fn parse_probabilistic(&mut self, token: &str, options: &OptionTable) -> QueryKind {
        let config = ParserConfig {
            stemmer: options.get("stemmer").to_owned(),
            stem_all: options.get("stem_all") == "true",
            default_op: self.default_op,
            prefixes: options
                .with_prefix("prefix")
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        };
        let parsed = match self.backend.parse_query(&self.query_text, &config) {
            Ok(p) => p,
            Err(msg) => {
                debug!(%msg, "query parse failed");
                self.error = Some(TemplateError::query_parse(msg));
                return QueryKind::Bad;
            }
        };

        for term in &parsed.terms {
            self.termset.insert(term);
        }
        self.unstem = parsed.unstem.into_iter().collect();
        self.query = parsed.query;
        classify(token, &self.query_text, parsed.terms.len(), &self.termset)
    }

    /// The previous page's filter fingerprint, rebuilt from the older
    /// per-field parameters when `xFILTERS` is absent.
    fn previous_filters(&self) -> String {
        if let Some(f) = self.request.get("xFILTERS") {
            return f.to_owned();
        }
        let mut prev = String::new();
        if let Some(b) = self.request.get("xB") {
            prev.push_str(b);
            prev.push(FILTER_SEP);
        }
        for name in ["xDATE1", "xDATE2", "xDAYSMINUS"] {
            prev.push_str(self.request.get(name).unwrap_or(""));
            prev.push(FILTER_SEP);
        }
        let op = self.request.get("xDEFAULTOP");
        if op.is_none() && prev.len() == 3 * FILTER_SEP.len_utf8() {
            // Nothing was sent, so nothing can have changed.
            return self.filters_fingerprint();
        }
        prev.pop();
        prev.push(if op == Some("and") { DefaultOp::And.tag() } else { DefaultOp::Or.tag() });
        prev
    }

    fn requested_topdoc(&self) -> u32 {
        let hpp = i64::from(self.hits_per_page);
        let mut topdoc = self.request.get("TOPDOC").map(parse_int).unwrap_or(0);
        if self.request.has(">") {
            topdoc = topdoc.saturating_add(hpp);
        } else if self.request.has("<") {
            topdoc = topdoc.saturating_sub(hpp).max(0);
        } else if let Some(page) = self.request.get("[").or_else(|| self.request.get("#")) {
            topdoc = parse_int(page).saturating_sub(1).saturating_mul(hpp);
        }
        let raw = self
            .request
            .get("RAWSEARCH")
            .or_else(|| self.request.get("RAW_SEARCH"))
            .is_some_and(|v| parse_int(v) != 0);
        let topdoc = topdoc.clamp(0, i64::from(u32::MAX));
        let topdoc = if raw { topdoc } else { topdoc / hpp * hpp };
        topdoc as u32
    }

    fn run_query(&mut self, today: chrono::NaiveDate) {
        let mut query = std::mem::take(&mut self.query);
        let mut bool_weight = false;

        if !self.filters.is_empty() {
            let filter = self.filters.to_query();
            if query.is_empty() {
                query = filter;
                bool_weight = true;
            } else {
                query = query.filter(filter);
            }
        }
        if self.dates.is_set() {
            let range = self.dates.to_query(today);
            let latest = Query::term("Dlatest");
            let dates = if range.is_empty() { latest } else { Query::Or(vec![range, latest]) };
            query = if query.is_empty() { dates } else { query.filter(dates) };
        }
        self.query = query;

        if self.error.is_some() {
            return;
        }

        let param = |name: &str| self.request.get(name);
        let bias = param("bias_weight").map(|w| {
            let half_life = param("bias_halflife").map(parse_int).unwrap_or(DEFAULT_BIAS_HALF_LIFE);
            (w.trim().parse::<f64>().unwrap_or(0.0), half_life)
        });
        let slot = |name: &str| param(name).filter(|v| !v.is_empty()).map(|v| parse_int(v) as u32);
        let min_hits = param("MINHITS").map(parse_int).unwrap_or(0).max(0) as u32;
        let request = MatchRequest {
            first: 0,
            max_items: self.topdoc.saturating_add(self.hits_per_page),
            check_at_least: self.topdoc.saturating_add((self.hits_per_page + 1).max(min_hits)),
            rset: self.rset.clone(),
            bool_weight,
            cutoff_percent: param("THRESHOLD").map(parse_int).unwrap_or(0).clamp(0, 100) as u32,
            bias,
            sort_key: slot("SORT"),
            collapse_key: slot("COLLAPSE"),
        };

        let started = Instant::now();
        if !self.query.is_empty() {
            self.mset = self.backend.run_match(&self.query, &request);
        }
        self.elapsed = Some(started.elapsed());
    }

    // ── Relevance judgements ──────────────────────────────────────────────────

    fn mark_relevant(&mut self, id: DocId) {
        self.rset.insert(id);
        self.ticked.insert(id, true);
    }

    /// `id` if it was ever marked relevant, however often it is asked.
    /// Unticks it, so a later [`relevants`](Self::relevants) no longer lists it.
    pub fn relevant(&mut self, id: DocId) -> Option<DocId> {
        match self.ticked.get_mut(&id) {
            Some(ticked) => {
                *ticked = false;
                Some(id)
            }
            None => None,
        }
    }

    /// Still-ticked relevant documents, ascending.
    pub fn relevants(&self) -> impl Iterator<Item = DocId> + '_ {
        self.ticked.iter().filter(|(_, &t)| t).map(|(&id, _)| id)
    }

    /// Mark every non-zero id in a digit-run-separated list relevant.
    pub fn set_relevant(&mut self, ids: &str) {
        for run in ids.split(|c: char| !c.is_ascii_digit()) {
            if let Ok(id) = run.parse::<DocId>() {
                if id != 0 {
                    self.mark_relevant(id);
                }
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn default_op(&self) -> DefaultOp {
        self.default_op
    }

    pub fn hits_per_page(&self) -> u32 {
        self.hits_per_page
    }

    pub fn topdoc(&self) -> u32 {
        self.topdoc
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    pub fn kind(&self) -> Option<QueryKind> {
        self.kind
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn termset(&self) -> &TermSet {
        &self.termset
    }

    pub fn mset(&self) -> &MSet {
        &self.mset
    }

    pub fn error(&self) -> Option<&TemplateError> {
        self.error.as_ref()
    }

    /// Match time as `seconds.microseconds`, if a match was attempted.
    pub fn elapsed(&self) -> Option<String> {
        self.elapsed.map(|d| format!("{}.{:06}", d.as_secs(), d.subsec_micros()))
    }

    pub fn filters_fingerprint(&self) -> String {
        self.filters.fingerprint(&self.dates, self.default_op)
    }

    pub fn unstem(&self, term: &str) -> &[String] {
        self.unstem.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A term as a user would type it.
    ///
    /// `R`-terms are capitalised; otherwise the query word which produced
    /// it is preferred.  A `.` is appended when the bare word would not
    /// search for the same term.
    pub fn pretty_term(&self, term: &str, stemmer: &dyn Stemmer) -> String {
        if term.is_empty() {
            return String::new();
        }
        if let Some(rest) = term.strip_prefix('R').filter(|r| !r.is_empty()) {
            let mut chars = rest.chars();
            return chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
        }
        if let Some(original) = self.unstem(term).first() {
            return original.clone();
        }
        if !self.backend.term_exists(&format!("R{term}")) || stemmer.stem(term) != term {
            return format!("{term}.");
        }
        term.to_owned()
    }

    /// Up to `howmany` expansion terms, skipping stopwords and anything
    /// that stems to a term already in the query.
    pub fn top_terms(&self, howmany: usize, stemmer: &dyn Stemmer) -> Vec<String> {
        if howmany == 0 {
            return Vec::new();
        }
        let rset: BTreeSet<DocId> = if !self.rset.is_empty() {
            self.rset.clone()
        } else {
            self.mset.items.iter().take(PSEUDO_RSET_SIZE).map(|i| i.docid).collect()
        };
        if rset.is_empty() {
            return Vec::new();
        }

        let normalise = |term: &str| match term.strip_prefix('R') {
            Some(raw) => stemmer.stem(raw),
            None => term.to_owned(),
        };
        let mut seen: HashSet<String> = self.termset.iter().map(|t| normalise(t)).collect();

        let mut out = Vec::new();
        for term in self.backend.expand(&rset, howmany.saturating_mul(2), &expandable) {
            let bare = term.strip_prefix('R').unwrap_or(&term);
            if Stopper.is_stopword(bare) {
                continue;
            }
            if seen.insert(normalise(&term)) {
                out.push(term);
                if out.len() == howmany {
                    break;
                }
            }
        }
        out
    }
}

/// Plain lowercase terms and `R`-terms make useful suggestions; other
/// prefixed terms are filters or metadata.
fn expandable(term: &str) -> bool {
    let mut chars = term.chars();
    match chars.next() {
        Some('R') => chars.next().is_some_and(|c| c.is_lowercase() || c.is_ascii_digit()),
        Some(c) => c.is_lowercase() || c.is_ascii_digit(),
        None => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
