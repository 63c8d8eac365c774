use proptest::prelude::*;

use omega::config::Config;
use omega::memory::{MemoryBackend, SourceDocument};
use omega::request::Request;
use omega::script::Evaluator;
use omega::session::{classify, QueryKind, TermSet};

fn fingerprint(terms: &[String]) -> String {
    terms.iter().map(|t| format!("{t}.")).collect()
}

fn term_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,6}", 1..6).prop_map(|mut v| {
        v.sort();
        v.dedup();
        v
    })
}

proptest! {
    /// Evaluation never panics on arbitrary template text; it returns Ok or Err.
    #[test]
    fn evaluator_does_not_panic(s in "\\PC*") {
        let backend = MemoryBackend::default();
        let request = Request::new().param("P", "rust");
        let mut ev = Evaluator::new(&backend, &request, &Config::default());
        let _ = ev.evaluate(&s, &[]);
    }
}

proptest! {
    /// Directive-shaped input exercises the argument splitter harder.
    #[test]
    fn directive_soup_does_not_panic(s in "(\\$[a-z]{0,5}|[{},.$()_0-9]|[a-z ]){0,40}") {
        let backend = MemoryBackend::from_documents(vec![SourceDocument {
            text: "rust".into(),
            ..Default::default()
        }]);
        let request = Request::new();
        let mut ev = Evaluator::new(&backend, &request, &Config::default());
        let _ = ev.evaluate(&s, &["p0".to_owned()]);
    }
}

proptest! {
    /// Text with no `$` is copied verbatim.
    #[test]
    fn plain_text_is_identity(s in "[^$]*") {
        let backend = MemoryBackend::default();
        let request = Request::new();
        let mut ev = Evaluator::new(&backend, &request, &Config::default());
        prop_assert_eq!(ev.evaluate(&s, &[]).unwrap(), s);
    }
}

proptest! {
    /// Identical term sets classify as Same.
    #[test]
    fn same_terms_are_same(prev in term_list()) {
        let current: TermSet = prev.iter().map(String::as_str).collect();
        let kind = classify(&fingerprint(&prev), "q", prev.len(), &current);
        prop_assert_eq!(kind, QueryKind::Same);
    }

    /// A strict superset classifies as Extended.
    #[test]
    fn superset_is_extended(prev in term_list(), extra in "[A-Z]{1,4}") {
        let mut current: TermSet = prev.iter().map(String::as_str).collect();
        current.insert(&extra);
        let kind = classify(&fingerprint(&prev), "q", current.len(), &current);
        prop_assert_eq!(kind, QueryKind::Extended);
    }

    /// Losing any previous term classifies as New.
    #[test]
    fn missing_term_is_new(prev in term_list(), drop in any::<prop::sample::Index>()) {
        let gone = drop.index(prev.len());
        let mut current: TermSet =
            prev.iter().enumerate().filter(|&(i, _)| i != gone).map(|(_, t)| t.as_str()).collect();
        current.insert("ZZreplacement");
        let kind = classify(&fingerprint(&prev), "q", current.len(), &current);
        prop_assert_eq!(kind, QueryKind::New);
    }

    /// Fewer emitted terms than before classifies as New without looking further.
    #[test]
    fn fewer_terms_is_new(prev in term_list()) {
        let current: TermSet = prev.iter().map(String::as_str).collect();
        let kind = classify(&fingerprint(&prev), "q", prev.len() - 1, &current);
        prop_assert_eq!(kind, QueryKind::New);
    }
}
