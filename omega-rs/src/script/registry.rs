//! Directive lookup: the builtin table plus per-render macros.
//!
//! Each render gets its own [`Registry`], so macros defined with `$def`
//! vanish with it.  A macro shadows any builtin of the same name, and a
//! redefinition shadows the earlier macro for every later call.

use std::collections::HashMap;

/// Session transition a directive needs before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    None,
    /// Query parsed, paging and relevance resolved.
    ParsedQuery,
    /// Match run (implies parsed).
    Match,
}

/// How a directive takes its arguments.
///
/// `None` in `min_args` means the argument text is passed through whole,
/// unsplit and unevaluated; `None` in `max_args` means no upper limit;
/// `None` in `eval_args` means every argument is evaluated before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub min_args: Option<usize>,
    pub max_args: Option<usize>,
    pub eval_args: Option<usize>,
    pub gate: Gate,
}

impl FunctionDescriptor {
    const fn new(min: Option<usize>, max: Option<usize>, eval: Option<usize>, gate: Gate) -> Self {
        Self { min_args: min, max_args: max, eval_args: eval, gate }
    }

    /// Whether top-level commas split the argument text.
    pub fn splits_args(&self) -> bool {
        self.min_args.is_some()
    }
}

/// Every macro: up to nine arguments are addressable, all evaluated first.
pub const MACRO_DESCRIPTOR: FunctionDescriptor =
    FunctionDescriptor::new(Some(0), None, None, Gate::None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Comment,
    Add,
    Allterms,
    And,
    Cgi,
    Cgilist,
    Collapsed,
    Date,
    Dbname,
    Dbsize,
    Def,
    Defaultop,
    Div,
    Env,
    Eq,
    Error,
    Field,
    Filesize,
    Filters,
    Fmt,
    Freq,
    Freqs,
    Ge,
    Gt,
    Highlight,
    Hit,
    Hitlist,
    Hitsperpage,
    Hostname,
    Html,
    Htmlstrip,
    Httpheader,
    Id,
    If,
    Include,
    Last,
    Lastpage,
    Le,
    List,
    Log,
    Lt,
    Map,
    Max,
    Min,
    Mod,
    Msize,
    Msizeexact,
    Mul,
    Ne,
    Nice,
    Not,
    Now,
    Opt,
    Or,
    Percentage,
    Prettyterm,
    Query,
    Querydescription,
    Queryterms,
    Range,
    Record,
    Relevant,
    Relevants,
    Score,
    Set,
    Setmap,
    Setrelevant,
    Slice,
    Sub,
    Terms,
    Thispage,
    Time,
    Topdoc,
    Topterms,
    Transform,
    Uniq,
    Unstem,
    Url,
    Value,
    Version,
}

const N: Option<usize> = None;
const fn n(v: usize) -> Option<usize> {
    Some(v)
}

macro_rules! table {
    ($( $name:literal => $id:ident ($min:expr, $max:expr, $eval:expr, $gate:ident) ),* $(,)?) => {
        &[ $( ($name, Builtin::$id, FunctionDescriptor::new($min, $max, $eval, Gate::$gate)) ),* ]
    };
}

/// Builtins sorted by name.
static BUILTINS: &[(&str, Builtin, FunctionDescriptor)] = table! {
    ""                 => Comment(N, N, n(0), None),
    "add"              => Add(n(0), N, N, None),
    "allterms"         => Allterms(n(0), n(1), N, None),
    "and"              => And(N, N, n(0), None),
    "cgi"              => Cgi(n(1), n(1), N, None),
    "cgilist"          => Cgilist(n(1), n(1), N, None),
    "collapsed"        => Collapsed(n(0), n(0), N, None),
    "date"             => Date(n(1), n(2), N, None),
    "dbname"           => Dbname(n(0), n(0), N, None),
    "dbsize"           => Dbsize(n(0), n(0), N, None),
    "def"              => Def(n(2), n(2), n(1), None),
    "defaultop"        => Defaultop(n(0), n(0), N, None),
    "div"              => Div(n(2), n(2), N, None),
    "env"              => Env(n(1), n(1), N, None),
    "eq"               => Eq(n(2), n(2), N, None),
    "error"            => Error(n(0), n(0), N, ParsedQuery),
    "field"            => Field(n(1), n(1), N, None),
    "filesize"         => Filesize(n(1), n(1), N, None),
    "filters"          => Filters(n(0), n(0), N, None),
    "fmt"              => Fmt(n(0), n(0), N, None),
    "freq"             => Freq(n(1), n(1), N, None),
    "freqs"            => Freqs(n(0), n(0), N, Match),
    "ge"               => Ge(n(2), n(2), N, None),
    "gt"               => Gt(n(2), n(2), N, None),
    "highlight"        => Highlight(n(2), n(4), N, None),
    "hit"              => Hit(n(0), n(0), N, None),
    "hitlist"          => Hitlist(n(1), n(1), n(0), Match),
    "hitsperpage"      => Hitsperpage(n(0), n(0), N, None),
    "hostname"         => Hostname(n(1), n(1), N, None),
    "html"             => Html(n(1), n(1), N, None),
    "htmlstrip"        => Htmlstrip(n(1), n(1), N, None),
    "httpheader"       => Httpheader(n(2), n(2), N, None),
    "id"               => Id(n(0), n(0), N, None),
    "if"               => If(n(2), n(3), n(1), None),
    "include"          => Include(n(1), n(1), n(1), None),
    "last"             => Last(n(0), n(0), N, Match),
    "lastpage"         => Lastpage(n(0), n(0), N, Match),
    "le"               => Le(n(2), n(2), N, None),
    "list"             => List(n(2), n(5), N, None),
    "log"              => Log(n(1), n(2), n(1), None),
    "lt"               => Lt(n(2), n(2), N, None),
    "map"              => Map(n(1), n(2), n(1), None),
    "max"              => Max(n(1), N, N, None),
    "min"              => Min(n(1), N, N, None),
    "mod"              => Mod(n(2), n(2), N, None),
    "msize"            => Msize(n(0), n(0), N, Match),
    "msizeexact"       => Msizeexact(n(0), n(0), N, Match),
    "mul"              => Mul(n(2), N, N, None),
    "ne"               => Ne(n(2), n(2), N, None),
    "nice"             => Nice(n(1), n(1), N, None),
    "not"              => Not(n(1), n(1), N, None),
    "now"              => Now(n(0), n(0), N, None),
    "opt"              => Opt(n(1), n(2), N, None),
    "or"               => Or(N, N, n(0), None),
    "percentage"       => Percentage(n(0), n(0), N, None),
    "prettyterm"       => Prettyterm(n(1), n(1), N, ParsedQuery),
    "query"            => Query(n(0), n(0), N, ParsedQuery),
    "querydescription" => Querydescription(n(0), n(0), N, ParsedQuery),
    "queryterms"       => Queryterms(n(0), n(0), N, ParsedQuery),
    "range"            => Range(n(2), n(2), N, None),
    "record"           => Record(n(0), n(1), N, None),
    "relevant"         => Relevant(n(0), n(1), N, ParsedQuery),
    "relevants"        => Relevants(n(0), n(0), N, ParsedQuery),
    "score"            => Score(n(0), n(0), N, None),
    "set"              => Set(n(2), n(2), N, None),
    "setmap"           => Setmap(n(1), N, N, None),
    "setrelevant"      => Setrelevant(n(0), n(1), N, ParsedQuery),
    "slice"            => Slice(n(2), n(2), N, None),
    "sub"              => Sub(n(2), n(2), N, None),
    "terms"            => Terms(n(0), n(0), N, Match),
    "thispage"         => Thispage(n(0), n(0), N, Match),
    "time"             => Time(n(0), n(0), N, Match),
    "topdoc"           => Topdoc(n(0), n(0), N, Match),
    "topterms"         => Topterms(n(0), n(1), N, Match),
    "transform"        => Transform(n(3), n(3), N, None),
    "uniq"             => Uniq(n(1), n(1), N, None),
    "unstem"           => Unstem(n(1), n(1), N, ParsedQuery),
    "url"              => Url(n(1), n(1), N, None),
    "value"            => Value(n(1), n(2), N, None),
    "version"          => Version(n(0), n(0), N, None),
};

/// What a directive name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionId {
    Builtin(Builtin),
    /// Index into the registry's macro bodies.
    Macro(usize),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    bodies: Vec<String>,
    macros: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name`, macros first.
    pub fn lookup(&self, name: &str) -> Option<(FunctionId, FunctionDescriptor)> {
        if let Some(&index) = self.macros.get(name) {
            return Some((FunctionId::Macro(index), MACRO_DESCRIPTOR));
        }
        builtin(name).map(|(b, d)| (FunctionId::Builtin(b), d))
    }

    /// Define a macro, or replace the body of an existing one in place.
    pub fn define(&mut self, name: &str, body: &str) -> usize {
        if let Some(&index) = self.macros.get(name) {
            self.bodies[index] = body.to_owned();
            return index;
        }
        let index = self.bodies.len();
        self.bodies.push(body.to_owned());
        self.macros.insert(name.to_owned(), index);
        index
    }

    pub fn macro_body(&self, index: usize) -> Option<&str> {
        self.bodies.get(index).map(String::as_str)
    }

    pub fn macro_count(&self) -> usize {
        self.macros.len()
    }
}

/// Look up a builtin by name.
pub fn builtin(name: &str) -> Option<(Builtin, FunctionDescriptor)> {
    BUILTINS
        .binary_search_by(|(n, _, _)| n.cmp(&name))
        .ok()
        .map(|i| (BUILTINS[i].1, BUILTINS[i].2))
}

/// Every builtin name, sorted.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(n, _, _)| *n)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_unique() {
        let names: Vec<_> = builtin_names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn descriptors() {
        let (b, d) = builtin("if").unwrap();
        assert_eq!(b, Builtin::If);
        assert_eq!((d.min_args, d.max_args, d.eval_args), (Some(2), Some(3), Some(1)));

        let (_, d) = builtin("and").unwrap();
        assert!(!d.splits_args());

        let (_, d) = builtin("hitlist").unwrap();
        assert_eq!(d.gate, Gate::Match);

        assert!(builtin("nosuch").is_none());
    }

    #[test]
    fn empty_name_is_comment() {
        assert_eq!(builtin("").map(|(b, _)| b), Some(Builtin::Comment));
    }

    #[test]
    fn macros_shadow_builtins() {
        let mut reg = Registry::new();
        assert!(matches!(reg.lookup("html"), Some((FunctionId::Builtin(Builtin::Html), _))));
        let i = reg.define("html", "mine");
        assert_eq!(reg.lookup("html"), Some((FunctionId::Macro(i), MACRO_DESCRIPTOR)));
        assert_eq!(reg.macro_body(i), Some("mine"));
    }

    #[test]
    fn redefinition_replaces() {
        let mut reg = Registry::new();
        let first = reg.define("foo", "bar");
        let second = reg.define("foo", "baz");
        assert_eq!(first, second);
        assert_eq!(reg.lookup("foo").map(|(id, _)| id), Some(FunctionId::Macro(second)));
        assert_eq!(reg.macro_body(first), Some("baz"));
        assert_eq!(reg.macro_count(), 1);
    }

    #[test]
    fn redefinition_does_not_grow_storage() {
        let mut reg = Registry::new();
        reg.define("a", "1");
        for i in 0..1000 {
            reg.define("b", &i.to_string());
        }
        assert_eq!(reg.macro_body(2), None);
        assert_eq!(reg.macro_body(1), Some("999"));
        assert_eq!(reg.macro_body(0), Some("1"));
    }
}
