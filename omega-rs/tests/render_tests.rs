/// End-to-end rendering tests: templates on disk, an in-memory collection,
/// and requests shaped like real page-to-page navigation.
///
/// The last test drives the `omega` binary itself.
use std::path::Path;
use std::process::Command;

use omega::config::Config;
use omega::memory::{MemoryBackend, SourceDocument};
use omega::render::render_page;
use omega::request::Request;
use omega::script::Evaluator;
use omega::ErrorKind;

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Site {
    dir: tempfile::TempDir,
    config: Config,
}

impl Site {
    fn new(templates: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tdir = dir.path().join("templates");
        let ldir = dir.path().join("log");
        std::fs::create_dir_all(&tdir).unwrap();
        std::fs::create_dir_all(&ldir).unwrap();
        for (name, body) in templates {
            std::fs::write(tdir.join(name), body).unwrap();
        }
        let config = Config { template_dir: tdir, log_dir: ldir, ..Config::default() };
        Site { dir, config }
    }

    fn render(&self, backend: &MemoryBackend, request: &Request) -> String {
        let mut ev = Evaluator::new(backend, request, &self.config);
        render_page(&mut ev).unwrap().body
    }

    fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }
}

fn corpus(n: usize) -> MemoryBackend {
    let docs = (1..=n)
        .map(|i| SourceDocument {
            data: format!("caption=Rust page {i}\nurl=http://example.org/{i}"),
            text: format!("rust tools page{i}"),
            ..Default::default()
        })
        .collect();
    MemoryBackend::from_documents(docs)
}

// ── Paging and continuity ─────────────────────────────────────────────────────

const PAGER: &str = "$topdoc-$last/$msize";

#[test]
fn first_page_by_default() {
    let site = Site::new(&[("query", PAGER)]);
    let req = Request::new().param("P", "rust");
    assert_eq!(site.render(&corpus(25), &req), "0-10/25");
}

#[test]
fn same_query_keeps_requested_page() {
    let site = Site::new(&[("query", PAGER)]);
    let req = Request::new().param("P", "rust").param("xP", "rust.").param("TOPDOC", "10");
    assert_eq!(site.render(&corpus(25), &req), "10-20/25");
}

#[test]
fn next_page_signal() {
    let site = Site::new(&[("query", PAGER)]);
    let req = Request::new()
        .param("P", "rust")
        .param("xP", "rust.")
        .param("TOPDOC", "10")
        .param(">", "");
    assert_eq!(site.render(&corpus(25), &req), "20-25/25");
}

#[test]
fn extended_query_returns_to_first_page() {
    let site = Site::new(&[("query", PAGER)]);
    let req = Request::new().param("P", "rust tools").param("xP", "rust.").param("TOPDOC", "10");
    assert_eq!(site.render(&corpus(25), &req), "0-10/25");
}

#[test]
fn new_query_drops_relevance_judgements() {
    let site = Site::new(&[("query", "[$relevants]")]);
    let req = Request::new().param("P", "tools").param("xP", "rust.").param("R", "3.4");
    assert_eq!(site.render(&corpus(5), &req), "[]");

    let req = Request::new().param("P", "rust").param("xP", "rust.").param("R", "3.4");
    assert_eq!(site.render(&corpus(5), &req), "[3\t4]");
}

#[test]
fn changed_filters_force_first_page() {
    let site = Site::new(&[("query", PAGER)]);
    let req = Request::new()
        .param("P", "rust")
        .param("xP", "rust.")
        .param("TOPDOC", "10")
        .param("xFILTERS", "Hother.org~~~~O");
    assert_eq!(site.render(&corpus(25), &req), "0-10/25");
}

// ── Filters and dates ─────────────────────────────────────────────────────────

fn sited_corpus() -> MemoryBackend {
    let doc = |text: &str, site: &str, date: &str| SourceDocument {
        data: format!("caption={text}"),
        text: text.to_owned(),
        terms: vec![format!("H{site}")],
        date: Some(date.to_owned()),
        ..Default::default()
    };
    MemoryBackend::from_documents(vec![
        doc("rust news", "a.org", "20050301"),
        doc("rust blog", "b.org", "20061115"),
        doc("rust wiki", "c.org", "20050720"),
        doc("python news", "a.org", "20050302"),
    ])
}

#[test]
fn filters_restrict_query() {
    let site = Site::new(&[("query", "$hitlist{$id;}")]);
    let req = Request::new().param("P", "rust").param("B", "Ha.org").param("B", "Hc.org");
    assert_eq!(site.render(&sited_corpus(), &req), "1;3;");
}

#[test]
fn filter_alone_becomes_the_query() {
    let site = Site::new(&[("query", "$hitlist{$id@$percentage;}")]);
    let req = Request::new().param("B", "Ha.org");
    assert_eq!(site.render(&sited_corpus(), &req), "1@100;4@100;");
}

#[test]
fn date_range_restricts_query() {
    let site = Site::new(&[("query", "$hitlist{$id;}|$filters")]);
    let req = Request::new()
        .param("P", "rust")
        .param("DATE1", "20050101")
        .param("DATE2", "20051231");
    assert_eq!(site.render(&sited_corpus(), &req), "1;3;|20050101~20051231~O");
}

// ── Includes, logging, headers ────────────────────────────────────────────────

#[test]
fn include_shares_macros_and_options() {
    let site = Site::new(&[
        ("query", "$include{inc}[$greet{world}|$opt{colour}]"),
        ("inc", "$def{greet,hello $1}$set{colour,blue}"),
    ]);
    assert_eq!(site.render(&corpus(1), &Request::new()), "[hello world|blue]");
}

#[test]
fn include_failure_is_fatal() {
    let site = Site::new(&[("query", "before$include{missing}after")]);
    let backend = corpus(1);
    let req = Request::new();
    let mut ev = Evaluator::new(&backend, &req, &site.config);
    let err = render_page(&mut ev).unwrap_err();
    assert_eq!(err.source.kind(), ErrorKind::IoFailure);
    assert!(err.source.message().contains("missing"));
}

#[test]
fn log_appends_default_entry() {
    let site = Site::new(&[("query", "$log{query.log}$log{query.log}done")]);
    let mut req = Request::new().param("P", "rust");
    req.set_env("REMOTE_ADDR", "10.0.0.1");
    assert_eq!(site.render(&corpus(3), &req), "done");

    let log = std::fs::read_to_string(site.log_dir().join("query.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("10.0.0.1\t["), "{log}");
    assert!(lines[0].ends_with("+0000]\tquery\tdefault\trust\t3"), "{log}");
}

#[test]
fn log_custom_format() {
    let site = Site::new(&[("query", "$log{custom.log,$query $msize}")]);
    site.render(&corpus(2), &Request::new().param("P", "rust"));
    let log = std::fs::read_to_string(site.log_dir().join("custom.log")).unwrap();
    assert_eq!(log, "rust 2\n");
}

#[test]
fn log_to_missing_directory_is_silent() {
    let mut site = Site::new(&[("query", "$log{x.log}ok")]);
    site.config.log_dir = site.dir.path().join("no/such/dir");
    assert_eq!(site.render(&corpus(1), &Request::new()), "ok");
}

#[test]
fn highlight_in_hitlist() {
    let site = Site::new(&[("query", "$hitlist{$highlight{$field{caption},$queryterms}|}")]);
    let req = Request::new().param("P", "rust").param("HITSPERPAGE", "2");
    assert_eq!(
        site.render(&corpus(3), &req),
        "<strong>Rust</strong> page 1|<strong>Rust</strong> page 2|"
    );
}

#[test]
fn query_error_does_not_stop_render() {
    let site = Site::new(&[("query", "$if{$error,oops: $error,fine} $msize")]);
    let req = Request::new().param("P", "AND rust");
    let out = site.render(&corpus(3), &req);
    assert!(out.starts_with("oops: Syntax:"), "{out}");
    assert!(out.ends_with(" 0"), "{out}");
}

#[test]
fn fmt_selects_template() {
    let site = Site::new(&[("query", "html"), ("xml", "<r>$query</r>")]);
    let req = Request::new().param("P", "a&b").param("FMT", "xml");
    assert_eq!(site.render(&corpus(1), &req), "<r>a&b</r>");
}

#[test]
fn fmt_cannot_escape_template_dir() {
    let site = Site::new(&[("query", "ok")]);
    let backend = corpus(1);
    let req = Request::new().param("FMT", "../log/x");
    let mut ev = Evaluator::new(&backend, &req, &site.config);
    assert_eq!(render_page(&mut ev).unwrap_err().source.kind(), ErrorKind::IoFailure);
}

// ── Binary ────────────────────────────────────────────────────────────────────

#[test]
fn binary_renders_page() {
    let site = Site::new(&[("query", "$msize hits for $html{$query}")]);
    let db = site.dir.path().join("db.json");
    std::fs::write(
        &db,
        r#"[{"text": "rust one"}, {"text": "rust two"}, {"text": "python"}]"#,
    )
    .unwrap();
    let conf = site.dir.path().join("omega.conf");
    std::fs::write(&conf, format!("template_dir {}\n", site.config.template_dir.display())).unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_omega"))
        .arg("--config")
        .arg(&conf)
        .arg("--db")
        .arg(&db)
        .args(["-p", "P=rust<"])
        .env("OMEGA_LOG", "off")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "Content-Type: text/html\n\n2 hits for rust&lt;"
    );
}

#[test]
fn binary_resolves_db_name_under_database_dir() {
    let site = Site::new(&[("query", "$dbname: $msize")]);
    let data = site.dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("default.json"), r#"[{"text": "rust"}]"#).unwrap();
    std::fs::write(data.join("other.json"), r#"[{"text": "rust"}, {"text": "rust too"}]"#)
        .unwrap();
    let conf = site.dir.path().join("omega.conf");
    std::fs::write(
        &conf,
        format!(
            "template_dir {}\ndatabase_dir {}\n",
            site.config.template_dir.display(),
            data.display()
        ),
    )
    .unwrap();

    let run = |params: &[&str]| {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_omega"));
        cmd.arg("--config").arg(&conf).env("OMEGA_LOG", "off");
        for p in params {
            cmd.args(["-p", p]);
        }
        cmd.output().unwrap()
    };

    let out = run(&["P=rust"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "Content-Type: text/html\n\ndefault: 1");

    let out = run(&["P=rust", "DB=other"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "Content-Type: text/html\n\nother: 2");

    let out = run(&["P=rust", "DB=missing"]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}
