//! Whole-page rendering.
//!
//! The output is a header preamble (every `$httpheader`, plus a default
//! `Content-Type` if the template never set one), a blank line, then the
//! evaluated body.  The preamble is built even when evaluation fails so a
//! caller can always emit a well-formed response.

use std::io;

use crate::error::TemplateError;
use crate::script::Evaluator;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// A rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Header lines and the terminating blank line.
    pub preamble: String,
    pub body: String,
}

impl Page {
    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.preamble.as_bytes())?;
        out.write_all(self.body.as_bytes())?;
        out.flush()
    }
}

/// A fatal template error, with the preamble that should still be sent.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct RenderError {
    pub preamble: String,
    #[source]
    pub source: TemplateError,
}

/// Evaluate the evaluator's active template and assemble the page.
pub fn render_page(ev: &mut Evaluator<'_>) -> Result<Page, RenderError> {
    let name = ev.fmt().to_owned();
    tracing::debug!(template = %name, "rendering");
    let result = ev.eval_file(&name);
    let preamble = preamble(ev);
    match result {
        Ok(body) => Ok(Page { preamble, body }),
        Err(source) => Err(RenderError { preamble, source }),
    }
}

fn preamble(ev: &Evaluator<'_>) -> String {
    let mut out = String::new();
    for (name, value) in ev.headers() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    if !ev.content_type_set() {
        out.push_str("Content-Type: ");
        out.push_str(DEFAULT_CONTENT_TYPE);
        out.push('\n');
    }
    out.push('\n');
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::memory::MemoryBackend;
    use crate::request::Request;

    fn config_with(template: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("query"), template).unwrap();
        let config = Config { template_dir: dir.path().to_path_buf(), ..Config::default() };
        (dir, config)
    }

    #[test]
    fn default_content_type() {
        let (_dir, config) = config_with("hello");
        let backend = MemoryBackend::default();
        let req = Request::new();
        let mut ev = Evaluator::new(&backend, &req, &config);
        let page = render_page(&mut ev).unwrap();
        assert_eq!(page.preamble, "Content-Type: text/html\n\n");
        assert_eq!(page.body, "hello");
    }

    #[test]
    fn template_headers_replace_default() {
        let (_dir, config) = config_with("$httpheader{Content-Type,text/plain}$httpheader{X-A,b}ok");
        let backend = MemoryBackend::default();
        let req = Request::new();
        let mut ev = Evaluator::new(&backend, &req, &config);
        let page = render_page(&mut ev).unwrap();
        assert_eq!(page.preamble, "Content-Type: text/plain\nX-A: b\n\n");

        let mut buf = Vec::new();
        page.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Content-Type: text/plain\nX-A: b\n\nok");
    }

    #[test]
    fn preamble_survives_errors() {
        let (_dir, config) = config_with("$httpheader{X-A,b}$nosuch");
        let backend = MemoryBackend::default();
        let req = Request::new();
        let mut ev = Evaluator::new(&backend, &req, &config);
        let err = render_page(&mut ev).unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::UnknownFunction);
        assert_eq!(err.preamble, "X-A: b\nContent-Type: text/html\n\n");
    }

    #[test]
    fn missing_template_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { template_dir: dir.path().to_path_buf(), ..Config::default() };
        let backend = MemoryBackend::default();
        let req = Request::new();
        let mut ev = Evaluator::new(&backend, &req, &config);
        let err = render_page(&mut ev).unwrap_err();
        assert_eq!(err.source.kind(), ErrorKind::IoFailure);
    }
}
