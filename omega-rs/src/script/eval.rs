//! The directive evaluator.
//!
//! | Sequence | Result |
//! |----------|--------|
//! | `$$` `$(` `$)` `$.` | `$` `{` `}` `,` |
//! | `$0`…`$9`, `$_` | positional parameter (`$_` is `$0`); missing ones are empty |
//! | `$name` | directive with no arguments |
//! | `$name{a,b,...}` | directive with arguments; braces nest |
//! | `${...}` | comment |
//!
//! Arguments are split on top-level commas before anything is evaluated, so
//! a literal comma inside an argument has to be written `$.`.

use std::path::{Path, PathBuf};

use crate::backend::{SearchBackend, Stemmer};
use crate::config::Config;
use crate::error::TemplateError;
use crate::options::OptionTable;
use crate::request::Request;
use crate::session::{Hit, QuerySession};

use super::registry::{FunctionId, Gate, Registry};

/// Deepest nesting of evaluations before giving up.
pub const MAX_DEPTH: usize = 256;

/// Evaluates templates for one request.
pub struct Evaluator<'a> {
    pub(super) registry: Registry,
    pub(super) options: OptionTable,
    pub(super) session: QuerySession<'a>,
    pub(super) request: &'a Request,
    /// Set while `$hitlist` is iterating.
    pub(super) hit: Option<Hit>,
    pub(super) headers: Vec<(String, String)>,
    pub(super) content_type_set: bool,
    pub(super) template_dir: PathBuf,
    pub(super) log_dir: PathBuf,
    pub(super) fmt: String,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(backend: &'a dyn SearchBackend, request: &'a Request, config: &Config) -> Self {
        let fmt = match request.get("FMT") {
            Some(f) if !f.is_empty() => f.to_owned(),
            _ => config.default_template.clone(),
        };
        Self {
            registry: Registry::new(),
            options: config.options.clone(),
            session: QuerySession::new(backend, request, &config.default_db),
            request,
            hit: None,
            headers: Vec::new(),
            content_type_set: false,
            template_dir: config.template_dir.clone(),
            log_dir: config.log_dir.clone(),
            fmt,
            depth: 0,
        }
    }

    /// Evaluate `template` with positional `params`.
    pub fn evaluate(&mut self, template: &str, params: &[String]) -> Result<String, TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(TemplateError::recursion_limit(MAX_DEPTH));
        }
        self.depth += 1;
        let result = self.scan(template, params);
        self.depth -= 1;
        result
    }

    /// Read `name` from the template directory and evaluate it.
    pub fn eval_file(&mut self, name: &str) -> Result<String, TemplateError> {
        if !vet_filename(name) {
            return Err(TemplateError::include_failed(name, "name contains `..'"));
        }
        let path = self.template_dir.join(name);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| TemplateError::include_failed(name, &e.to_string()))?;
        self.evaluate(&text, &[String::new()])
    }

    /// The active template name.
    pub fn fmt(&self) -> &str {
        &self.fmt
    }

    pub fn options(&self) -> &OptionTable {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut OptionTable {
        &mut self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session(&self) -> &QuerySession<'a> {
        &self.session
    }

    /// Headers added with `$httpheader`, in order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type_set(&self) -> bool {
        self.content_type_set
    }

    pub(super) fn log_path(&self, name: &str) -> PathBuf {
        self.log_dir.join(name)
    }

    pub(super) fn stemmer(&self) -> Box<dyn Stemmer> {
        self.session.backend().stemmer(self.options.get("stemmer"))
    }

    fn scan(&mut self, fmt: &str, params: &[String]) -> Result<String, TemplateError> {
        let bytes = fmt.as_bytes();
        let mut out = String::with_capacity(fmt.len());
        let mut p = 0;

        while let Some(offset) = fmt[p..].find('$') {
            let code_start = p + offset;
            out.push_str(&fmt[p..code_start]);
            let q = code_start + 1;
            let Some(&c) = bytes.get(q) else {
                // A lone trailing `$` produces nothing.
                p = fmt.len();
                break;
            };

            match c {
                b'$' | b'(' | b')' | b'.' => {
                    out.push(match c {
                        b'(' => '{',
                        b')' => '}',
                        b'.' => ',',
                        _ => '$',
                    });
                    p = q + 1;
                    continue;
                }
                b'_' | b'0'..=b'9' => {
                    let index = if c == b'_' { 0 } else { usize::from(c - b'0') };
                    if let Some(value) = params.get(index) {
                        out.push_str(value);
                    }
                    p = q + 1;
                    continue;
                }
                b'{' => {}
                c if c.is_ascii_alphabetic() => {}
                _ => return Err(TemplateError::bad_escape(&fmt[q..])),
            }

            let name_end = fmt[q..]
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .map_or(fmt.len(), |i| q + i);
            let name = &fmt[q..name_end];
            let (id, desc) = self
                .registry
                .lookup(name)
                .ok_or_else(|| TemplateError::unknown_function(name))?;

            p = name_end;
            let mut args = Vec::new();
            if bytes.get(p) == Some(&b'{') {
                let (split, end) = split_args(fmt, p, desc.splits_args())
                    .ok_or_else(|| TemplateError::unterminated(&fmt[code_start..]))?;
                args = split.into_iter().map(str::to_owned).collect();
                p = end;
            }

            if let Some(min) = desc.min_args {
                if args.len() < min {
                    return Err(TemplateError::too_few_args(name));
                }
                if desc.max_args.is_some_and(|max| args.len() > max) {
                    return Err(TemplateError::too_many_args(name));
                }
                let eager = desc.eval_args.unwrap_or(args.len()).min(args.len());
                for arg in &mut args[..eager] {
                    *arg = self.evaluate(arg, params)?;
                }
            }

            match desc.gate {
                Gate::None => {}
                Gate::ParsedQuery => self.session.ensure_parsed(&self.options),
                Gate::Match => self.session.ensure_matched(&self.options),
            }

            let value = match id {
                FunctionId::Builtin(builtin) => self.call_builtin(builtin, name, args, params)?,
                FunctionId::Macro(index) => {
                    let body = self.registry.macro_body(index).unwrap_or("").to_owned();
                    let mut macro_params = Vec::with_capacity(args.len() + 1);
                    macro_params.push(params.first().cloned().unwrap_or_default());
                    macro_params.extend(args);
                    self.evaluate(&body, &macro_params)?
                }
            };
            out.push_str(&value);
        }

        out.push_str(&fmt[p..]);
        Ok(out)
    }
}

/// Split the brace-delimited argument list opening at `open`.
///
/// Returns the arguments and the index just past the closing brace, or
/// `None` if the braces never balance.  Without `split` the whole
/// inner text is one argument.
pub(super) fn split_args(fmt: &str, open: usize, split: bool) -> Option<(Vec<&str>, usize)> {
    let bytes = fmt.as_bytes();
    let mut args = Vec::new();
    let mut start = open + 1;
    let mut nest = 1;
    let mut pos = open;
    loop {
        pos = pos + 1 + fmt[pos + 1..].find(|c| matches!(c, ',' | '{' | '}'))?;
        match bytes[pos] {
            b'{' => nest += 1,
            c => {
                if nest == 1 && split {
                    args.push(&fmt[start..pos]);
                    start = pos + 1;
                }
                if c == b'}' {
                    nest -= 1;
                    if nest == 0 {
                        break;
                    }
                }
            }
        }
    }
    if !split {
        args.push(&fmt[start..pos]);
    }
    Some((args, pos + 1))
}

/// Split raw argument text on commas outside nested braces.
pub(super) fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut nest = 0usize;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '{' => nest += 1,
            '}' => nest = nest.saturating_sub(1),
            ',' if nest == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Reject file names that could climb out of their directory.
pub fn vet_filename(name: &str) -> bool {
    !name.contains("..")
}

/// Open `path` for appending, creating it if needed.
pub(super) fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::MemoryBackend;

    fn eval(template: &str) -> Result<String, TemplateError> {
        let backend = MemoryBackend::default();
        let request = Request::new();
        let mut ev = Evaluator::new(&backend, &request, &Config::default());
        ev.evaluate(template, &[])
    }

    fn eval_with(template: &str, params: &[&str]) -> String {
        let backend = MemoryBackend::default();
        let request = Request::new();
        let mut ev = Evaluator::new(&backend, &request, &Config::default());
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        ev.evaluate(template, &params).unwrap()
    }

    #[test]
    fn literal_text_passes_through() {
        assert_eq!(eval("plain text, no directives").unwrap(), "plain text, no directives");
    }

    #[test]
    fn escapes() {
        assert_eq!(eval("$$ $( $) $.").unwrap(), "$ { } ,");
    }

    #[test]
    fn trailing_dollar_dropped() {
        assert_eq!(eval("cost: 5$").unwrap(), "cost: 5");
    }

    #[test]
    fn positional_params() {
        assert_eq!(eval_with("[$_|$0|$1|$2|$9]", &["zero", "one"]), "[zero|zero|one||]");
    }

    #[test]
    fn bad_escape() {
        let err = eval("x $% y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEscape);
    }

    #[test]
    fn unknown_function() {
        let err = eval("$nosuch").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFunction);
        assert_eq!(err.message(), "Unknown function `nosuch'");
    }

    #[test]
    fn unterminated_brace() {
        let err = eval("$add{1,2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnterminatedBrace);
        assert_eq!(err.message(), "missing } in $add{1,2");
    }

    #[test]
    fn arity_checked() {
        assert_eq!(eval("$not").unwrap_err().kind(), ErrorKind::ArityError);
        assert_eq!(eval("$not{a,b}").unwrap_err().message(), "too many arguments to $not");
        assert_eq!(eval("$if{x}").unwrap_err().message(), "too few arguments to $if");
    }

    #[test]
    fn comment_swallows_everything() {
        assert_eq!(eval("a${ $nosuch{1,2} }b").unwrap(), "ab");
    }

    #[test]
    fn nested_arguments() {
        assert_eq!(eval("$add{$add{1,2},$sub{10,4}}").unwrap(), "9");
    }

    #[test]
    fn name_stops_at_non_identifier() {
        assert_eq!(eval("$dbname.x").unwrap(), "default.x");
    }

    #[test]
    fn split_args_rules() {
        assert_eq!(split_args("{a,b}", 0, true), Some((vec!["a", "b"], 5)));
        assert_eq!(split_args("{a,{b,c}}x", 0, true), Some((vec!["a", "{b,c}"], 9)));
        assert_eq!(split_args("{a,b}", 0, false), Some((vec!["a,b"], 5)));
        assert_eq!(split_args("{}", 0, true), Some((vec![""], 2)));
        assert_eq!(split_args("{a,b", 0, true), None);
    }

    #[test]
    fn top_level_split() {
        assert_eq!(split_top_level("a,$f{b,c},d"), vec!["a", "$f{b,c}", "d"]);
        assert_eq!(split_top_level(""), vec![""]);
    }

    #[test]
    fn macro_params() {
        assert_eq!(eval("$def{pair,<$1|$2>}$pair{a,b}$pair{x}").unwrap(), "<a|b><x|>");
    }

    #[test]
    fn macro_recursion_is_bounded() {
        let err = eval("$def{loop,$loop}$loop").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecursionLimit);
    }

    #[test]
    fn vetting() {
        assert!(vet_filename("query"));
        assert!(!vet_filename("../etc/passwd"));
        assert!(!vet_filename("a..b"));
    }
}
