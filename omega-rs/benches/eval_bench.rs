use criterion::{black_box, criterion_group, criterion_main, Criterion};

use omega::config::Config;
use omega::highlight::highlight;
use omega::memory::{MemoryBackend, SourceDocument, SuffixStemmer};
use omega::request::Request;
use omega::script::Evaluator;

const RESULTS_PAGE: &str = "\
$def{pager,$if{$ne{$thispage,1},<a>prev</a>}$thispage/$lastpage}\
<h1>$html{$query}</h1><p>$nice{$msize} results</p>\
<ol>$hitlist{<li>$percentage% $highlight{$field{caption},$queryterms} $field{url}</li>}</ol>\
$pager";

fn corpus(n: usize) -> MemoryBackend {
    let docs = (1..=n)
        .map(|i| SourceDocument {
            data: format!("caption=Rust search result number {i}\nurl=http://example.org/{i}"),
            text: format!("rust search engine templates result {i} tools parsing"),
            ..Default::default()
        })
        .collect();
    MemoryBackend::from_documents(docs)
}

fn make_text(repeats: usize) -> String {
    let chunk = "The quick Rust parser jumps over the lazy C++ lexer & AT&T. ";
    chunk.repeat(repeats)
}

fn bench_eval(c: &mut Criterion) {
    let backend = corpus(200);
    let request = Request::new().param("P", "rust templates").param("HITSPERPAGE", "20");
    let config = Config::default();

    let mut g = c.benchmark_group("evaluate");

    g.bench_function("results_page", |b| {
        b.iter(|| {
            let mut ev = Evaluator::new(&backend, &request, &config);
            ev.evaluate(black_box(RESULTS_PAGE), &[]).unwrap()
        })
    });

    g.bench_function("list_builtins", |b| {
        let plain = Request::new();
        b.iter(|| {
            let mut ev = Evaluator::new(&backend, &plain, &config);
            ev.evaluate(black_box("$list{$map{$range{1,500},$mul{$_,$_}},$.}"), &[]).unwrap()
        })
    });

    g.finish();

    let mut g = c.benchmark_group("highlight");
    for (label, repeats) in [("small", 10), ("med", 100), ("large", 1000)] {
        let text = make_text(repeats);
        g.bench_function(label, |b| {
            b.iter(|| highlight(black_box(&text), "rust\tRat&t\tc++", "<b>", "</b>", &SuffixStemmer))
        });
    }
    g.finish();
}

criterion_group!(benches, bench_eval);
criterion_main!(benches);
