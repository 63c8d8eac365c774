//! Omega: the OmegaScript template language for search-result pages.
//!
//! A request is rendered by an [`Evaluator`](script::Evaluator), which scans
//! a template for `$`-directives and answers them from a
//! [`QuerySession`](session::QuerySession) wrapped around a
//! [`SearchBackend`](backend::SearchBackend).  The session parses and runs
//! the query lazily, the first time a template asks for something that
//! needs it.
//!
//! ```rust
//! use omega::config::Config;
//! use omega::memory::{MemoryBackend, SourceDocument};
//! use omega::request::Request;
//! use omega::script::Evaluator;
//!
//! let docs = vec![SourceDocument { text: "rust templates".into(), ..Default::default() }];
//! let backend = MemoryBackend::from_documents(docs);
//! let request = Request::new().param("P", "rust");
//! let mut ev = Evaluator::new(&backend, &request, &Config::default());
//! assert_eq!(ev.evaluate("$msize match", &[]).unwrap(), "1 match");
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod highlight;
pub mod memory;
pub mod options;
pub mod render;
pub mod request;
pub mod script;
pub mod session;

pub use error::{ErrorKind, TemplateError};
pub use render::{render_page, Page, RenderError};
