//! The OmegaScript template language.
//!
//! Templates are plain text with `$`-directives embedded in them:
//!
//! - escapes and positional parameters (`$$`, `$.`, `$1`, `$_`, …)
//! - builtins (`$if{...}`, `$hitlist{...}`, `$html{...}`, ~80 in all)
//! - per-render macros defined with `$def{name,body}`
//! - lists, which are plain strings with tab-separated items
//!
//! Directives that touch the search session run the parse or match stage
//! on first use; everything else is pure text processing.
//!
//! # Quick start
//!
//! ```rust
//! use omega::config::Config;
//! use omega::memory::MemoryBackend;
//! use omega::request::Request;
//! use omega::script::Evaluator;
//!
//! let backend = MemoryBackend::default();
//! let request = Request::new();
//! let mut ev = Evaluator::new(&backend, &request, &Config::default());
//! let out = ev.evaluate("$list{$range{1,3},$. , and }", &[]).unwrap();
//! assert_eq!(out, "1, 2 and 3");
//! ```

pub mod builtins;
pub mod eval;
pub mod registry;
pub mod text;

pub use builtins::DEFAULT_LOG_ENTRY;
pub use eval::{vet_filename, Evaluator, MAX_DEPTH};
pub use registry::{builtin, builtin_names, Builtin, FunctionDescriptor, FunctionId, Gate, Registry};
