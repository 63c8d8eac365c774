//! Builtin directives.
//!
//! Each builtin receives its arguments already split and, up to the
//! descriptor's `eval_args`, already evaluated.  Anything left raw (the
//! branches of `$if`, the pattern of `$map`, the operands of `$and`/`$or`)
//! is evaluated here, only when needed.

use std::fmt::Write as _;
use std::io::Write as _;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

use crate::backend::DocId;
use crate::error::TemplateError;
use crate::highlight::{close_tag_for, highlight, DEFAULT_OPEN};
use crate::request::parse_int;
use crate::session::Hit;

use super::eval::{open_append, split_top_level, vet_filename, Evaluator};
use super::registry::Builtin;
use super::text::{
    filesize, hostname, html_escape, html_strip, join_list, nice, split_list, truth, url_encode,
};

/// Request log line used when `$log` is given no format.
pub const DEFAULT_LOG_ENTRY: &str = concat!(
    "$or{$env{REMOTE_HOST},$env{REMOTE_ADDR},-}\t",
    "[$date{$now,%d/%b/%Y:%H:%M:%S} +0000]\t",
    "$if{$cgi{X},add,$if{$cgi{MORELIKE},morelike,query}}\t",
    "$dbname\t",
    "$query\t",
    "$msize$if{$env{HTTP_REFERER},\t$env{HTTP_REFERER}}",
);

const FREQS_TEMPLATE: &str = "$map{$queryterms,$_:&nbsp;$nice{$freq{$_}}}";
const DEFAULT_TOPTERMS: i64 = 16;
const DIVIDE_BY_ZERO: &str = "divide by 0";

fn int(s: &str) -> i64 {
    parse_int(s)
}

fn arg(args: &[String], i: usize) -> &str {
    args.get(i).map(String::as_str).unwrap_or("")
}

impl Evaluator<'_> {
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        name: &str,
        args: Vec<String>,
        params: &[String],
    ) -> Result<String, TemplateError> {
        let a0 = arg(&args, 0);
        let value = match builtin {
            Builtin::Comment => String::new(),

            // ── Arithmetic ────────────────────────────────────────────────────
            Builtin::Add => args.iter().fold(0i64, |acc, a| acc.wrapping_add(int(a))).to_string(),
            Builtin::Sub => int(a0).wrapping_sub(int(arg(&args, 1))).to_string(),
            Builtin::Mul => args.iter().skip(1).fold(int(a0), |acc, a| acc.wrapping_mul(int(a))).to_string(),
            Builtin::Div | Builtin::Mod => {
                let denom = int(arg(&args, 1));
                if denom == 0 {
                    DIVIDE_BY_ZERO.to_owned()
                } else if builtin == Builtin::Div {
                    int(a0).wrapping_div(denom).to_string()
                } else {
                    int(a0).wrapping_rem(denom).to_string()
                }
            }
            Builtin::Max => args.iter().map(|a| int(a)).max().unwrap_or(0).to_string(),
            Builtin::Min => args.iter().map(|a| int(a)).min().unwrap_or(0).to_string(),

            // ── Comparison ────────────────────────────────────────────────────
            Builtin::Eq => truth(a0 == arg(&args, 1)),
            Builtin::Ne => truth(a0 != arg(&args, 1)),
            Builtin::Lt => truth(int(a0) < int(arg(&args, 1))),
            Builtin::Le => truth(int(a0) <= int(arg(&args, 1))),
            Builtin::Gt => truth(int(a0) > int(arg(&args, 1))),
            Builtin::Ge => truth(int(a0) >= int(arg(&args, 1))),

            // ── Logic ─────────────────────────────────────────────────────────
            Builtin::And => {
                if args.is_empty() {
                    return Err(TemplateError::too_few_args(name));
                }
                let mut value = "true".to_owned();
                for operand in split_top_level(a0) {
                    if self.evaluate(operand, params)?.is_empty() {
                        value.clear();
                        break;
                    }
                }
                value
            }
            Builtin::Or => {
                if args.is_empty() {
                    return Err(TemplateError::too_few_args(name));
                }
                let mut value = String::new();
                for operand in split_top_level(a0) {
                    value = self.evaluate(operand, params)?;
                    if !value.is_empty() {
                        break;
                    }
                }
                value
            }
            Builtin::Not => truth(a0.is_empty()),
            Builtin::If => {
                if !a0.is_empty() {
                    self.evaluate(arg(&args, 1), params)?
                } else if let Some(otherwise) = args.get(2) {
                    self.evaluate(otherwise, params)?
                } else {
                    String::new()
                }
            }

            // ── Lists ─────────────────────────────────────────────────────────
            Builtin::Range => {
                let (start, end) = (int(a0), int(arg(&args, 1)));
                if start > end {
                    String::new()
                } else {
                    join_list((start..=end).map(|i| i.to_string()))
                }
            }
            Builtin::List => list(&args),
            Builtin::Slice => {
                let items: Vec<&str> = split_list(a0).collect();
                join_list(split_list(arg(&args, 1)).filter_map(|pos| {
                    usize::try_from(int(pos)).ok().and_then(|i| items.get(i).copied())
                }))
            }
            Builtin::Uniq => {
                if a0.is_empty() {
                    String::new()
                } else {
                    let mut items: Vec<&str> = split_list(a0).collect();
                    items.dedup();
                    join_list(items)
                }
            }
            Builtin::Map => {
                if a0.is_empty() {
                    String::new()
                } else {
                    let pattern = arg(&args, 1);
                    let mut item_params = params.to_vec();
                    if item_params.is_empty() {
                        item_params.push(String::new());
                    }
                    let mut out = Vec::new();
                    for item in split_list(a0) {
                        item_params[0] = item.to_owned();
                        out.push(self.evaluate(pattern, &item_params)?);
                    }
                    join_list(out)
                }
            }

            // ── Options ───────────────────────────────────────────────────────
            Builtin::Set => {
                self.options.set(a0, arg(&args, 1));
                String::new()
            }
            Builtin::Setmap => {
                let pairs = args[1..].chunks_exact(2).map(|kv| (kv[0].as_str(), kv[1].as_str()));
                self.options.set_map(a0, pairs);
                String::new()
            }
            Builtin::Opt => match args.get(1) {
                Some(key) => self.options.get_keyed(a0, key).to_owned(),
                None => self.options.get(a0).to_owned(),
            },
            Builtin::Def => {
                self.registry.define(a0, arg(&args, 1));
                String::new()
            }

            // ── Formatting ────────────────────────────────────────────────────
            Builtin::Nice => nice(a0, self.options.get("thousand")),
            Builtin::Filesize => filesize(int(a0)),
            Builtin::Date => format_date(a0, args.get(1).map(String::as_str)),
            Builtin::Url => url_encode(a0),
            Builtin::Html => html_escape(a0),
            Builtin::Htmlstrip => html_strip(a0),
            Builtin::Hostname => hostname(a0).to_owned(),
            Builtin::Transform => transform(a0, arg(&args, 1), arg(&args, 2)),
            Builtin::Highlight => {
                let open = args.get(2).map_or(DEFAULT_OPEN, String::as_str);
                let close = args.get(3).cloned().unwrap_or_else(|| close_tag_for(open));
                let stemmer = self.stemmer();
                highlight(a0, arg(&args, 1), open, &close, stemmer.as_ref())
            }

            // ── Request ───────────────────────────────────────────────────────
            Builtin::Cgi => self.request.get(a0).unwrap_or("").to_owned(),
            Builtin::Cgilist => join_list(self.request.get_all(a0)),
            Builtin::Env => self.request.env(a0).unwrap_or("").to_owned(),
            Builtin::Httpheader => {
                if a0.eq_ignore_ascii_case("Content-Type") {
                    self.content_type_set = true;
                }
                self.headers.push((a0.to_owned(), arg(&args, 1).to_owned()));
                String::new()
            }
            Builtin::Now => Utc::now().timestamp().to_string(),
            Builtin::Version => concat!("Omega ", env!("CARGO_PKG_VERSION")).to_owned(),
            Builtin::Fmt => self.fmt.clone(),

            // ── Session ───────────────────────────────────────────────────────
            Builtin::Dbname => self.session.dbname().to_owned(),
            Builtin::Dbsize => self.session.backend().doc_count().to_string(),
            Builtin::Defaultop => self.session.default_op().as_str().to_owned(),
            Builtin::Filters => self.session.filters_fingerprint(),
            Builtin::Hitsperpage => self.session.hits_per_page().to_string(),
            Builtin::Error => self.session.error().map(|e| e.message().to_owned()).unwrap_or_default(),
            Builtin::Query => self.session.query_text().to_owned(),
            Builtin::Querydescription => self.session.query().description(),
            Builtin::Queryterms => join_list(self.session.termset().iter()),
            Builtin::Topdoc => self.session.topdoc().to_string(),
            Builtin::Last => self.session.last().to_string(),
            Builtin::Thispage => (self.session.topdoc() / self.session.hits_per_page() + 1).to_string(),
            Builtin::Lastpage => {
                let estimated = self.session.mset().matches_estimated;
                let hpp = self.session.hits_per_page();
                let pages = if estimated > 0 { (estimated - 1) / hpp + 1 } else { 0 };
                pages.to_string()
            }
            Builtin::Msize => self.session.mset().matches_estimated.to_string(),
            Builtin::Msizeexact => {
                let mset = self.session.mset();
                truth(mset.matches_lower_bound == mset.matches_upper_bound)
            }
            Builtin::Time => self.session.elapsed().unwrap_or_default(),
            Builtin::Freq => self.session.backend().term_freq(a0).to_string(),
            Builtin::Freqs => self.evaluate(FREQS_TEMPLATE, params)?,
            Builtin::Unstem => join_list(self.session.unstem(a0)),
            Builtin::Prettyterm => {
                let stemmer = self.stemmer();
                self.session.pretty_term(a0, stemmer.as_ref())
            }

            // ── Relevance feedback ────────────────────────────────────────────
            Builtin::Relevant => match self.doc_arg(args.first()) {
                Some(id) => self.session.relevant(id).map(|id| id.to_string()).unwrap_or_default(),
                None => String::new(),
            },
            Builtin::Relevants => join_list(self.session.relevants().map(|id| id.to_string())),
            Builtin::Setrelevant => {
                self.session.set_relevant(a0);
                String::new()
            }
            Builtin::Topterms => {
                let howmany = args.first().map_or(DEFAULT_TOPTERMS, |a| int(a)).max(0);
                let stemmer = self.stemmer();
                join_list(self.session.top_terms(howmany as usize, stemmer.as_ref()))
            }

            // ── Hits ──────────────────────────────────────────────────────────
            Builtin::Hitlist => self.hitlist(a0, params)?,
            Builtin::Hit => self.hit.as_ref().map(|h| h.index.to_string()).unwrap_or_default(),
            Builtin::Id => self.hit.as_ref().map(|h| h.docid.to_string()).unwrap_or_default(),
            Builtin::Percentage => self.hit.as_ref().map(|h| h.percent.to_string()).unwrap_or_default(),
            Builtin::Score => self.hit.as_ref().map(|h| (h.percent / 10).to_string()).unwrap_or_default(),
            Builtin::Collapsed => {
                self.hit.as_ref().map(|h| h.collapse_count.to_string()).unwrap_or_default()
            }
            Builtin::Field => self.hit.as_ref().map(|h| h.field(a0).to_owned()).unwrap_or_default(),
            Builtin::Terms => match &self.hit {
                Some(hit) => {
                    let termset = self.session.termset();
                    let matching = self.session.backend().matching_terms(self.session.query(), hit.docid);
                    join_list(matching.iter().filter(|t| termset.contains(t)))
                }
                None => String::new(),
            },
            Builtin::Record => self
                .doc_arg(args.first())
                .and_then(|id| self.session.backend().document(id))
                .map(|d| d.data)
                .unwrap_or_default(),
            Builtin::Value => {
                let slot = u32::try_from(int(a0)).ok();
                self.doc_arg(args.get(1))
                    .and_then(|id| self.session.backend().document(id))
                    .and_then(|d| slot.and_then(|s| d.values.get(&s).cloned()))
                    .unwrap_or_default()
            }
            Builtin::Allterms => self
                .doc_arg(args.first())
                .and_then(|id| self.session.backend().document(id))
                .map(|d| join_list(d.terms))
                .unwrap_or_default(),

            // ── Files ─────────────────────────────────────────────────────────
            Builtin::Include => self.eval_file(a0)?,
            Builtin::Log => {
                self.log(a0, args.get(1).map(String::as_str))?;
                String::new()
            }
        };
        Ok(value)
    }

    /// An explicit docid argument, else the current hit's.
    fn doc_arg(&self, explicit: Option<&String>) -> Option<DocId> {
        match explicit {
            Some(a) => DocId::try_from(int(a)).ok().filter(|&id| id != 0),
            None => self.hit.as_ref().map(|h| h.docid),
        }
    }

    fn hitlist(&mut self, fmt: &str, params: &[String]) -> Result<String, TemplateError> {
        let backend = self.session.backend();
        let outer = self.hit.take();
        let mut out = String::new();
        let mut result = Ok(());
        for index in self.session.topdoc()..self.session.last() {
            let Some(item) = self.session.mset().get(index).cloned() else { break };
            let doc = backend.document(item.docid);
            self.hit = Some(Hit::new(index, &item, doc.as_ref()));
            match self.evaluate(fmt, params) {
                Ok(s) => out.push_str(&s),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.hit = outer;
        result.map(|()| out)
    }

    /// Append one evaluated line to the log file `name`.  Failures to open
    /// or write the file are logged and otherwise ignored.
    fn log(&mut self, name: &str, format: Option<&str>) -> Result<(), TemplateError> {
        if !vet_filename(name) {
            warn!(file = name, "refusing log file name containing `..'");
            return Ok(());
        }
        let path = self.log_path(name);
        let mut file = match open_append(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open log file");
                return Ok(());
            }
        };
        let mut line = self.evaluate(format.unwrap_or(DEFAULT_LOG_ENTRY), &[String::new()])?;
        line.push('\n');
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(path = %path.display(), error = %e, "cannot write log file");
        }
        Ok(())
    }
}

/// `$list{list,[pre,]inter[,last][,post]}`.
fn list(args: &[String]) -> String {
    let items = arg(args, 0);
    if items.is_empty() {
        return String::new();
    }
    let (pre, inter, last, post) = match args.len() {
        2 => ("", arg(args, 1), arg(args, 1), ""),
        3 => ("", arg(args, 1), arg(args, 2), ""),
        4 => (arg(args, 1), arg(args, 2), arg(args, 2), arg(args, 3)),
        _ => (arg(args, 1), arg(args, 2), arg(args, 3), arg(args, 4)),
    };
    let items: Vec<&str> = split_list(items).collect();
    let mut out = String::from(pre);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(if i + 1 == items.len() { last } else { inter });
        }
        out.push_str(item);
    }
    out.push_str(post);
    out
}

/// Format a Unix time with a strftime pattern (default `%Y-%m-%d`), in UTC.
fn format_date(value: &str, format: Option<&str>) -> String {
    if value.is_empty() {
        return String::new();
    }
    let secs = int(value);
    if secs == -1 {
        return String::new();
    }
    let Some(when) = DateTime::<Utc>::from_timestamp(secs, 0) else {
        return String::new();
    };
    let mut out = String::new();
    match write!(out, "{}", when.format(format.unwrap_or("%Y-%m-%d"))) {
        Ok(()) => out,
        Err(_) => String::new(),
    }
}

/// Replace the first match of `pattern` in `text`.  `\0`..`\9` in
/// `replacement` insert capture groups; `\` before anything else quotes it.
fn transform(pattern: &str, replacement: &str, text: &str) -> String {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(pattern, error = %e, "bad regex in $transform");
            return text.to_owned();
        }
    };
    let Some(caps) = re.captures(text) else {
        return text.to_owned();
    };
    let Some(whole) = caps.get(0) else {
        return text.to_owned();
    };

    let mut out = String::from(&text[..whole.start()]);
    let mut chars = replacement.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d) if d.is_ascii_digit() && (d as usize - '0' as usize) < caps.len() => {
                if let Some(m) = caps.get(d as usize - '0' as usize) {
                    out.push_str(m.as_str());
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out.push_str(&text[whole.end()..]);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
