use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use openerp_search::{
    Case, Document, FieldMapping, FieldValue, Matcher, Page, Query, SearchEngine, TantivyEngine,
};

const ACCOUNTS: &[FieldMapping] = &[
    FieldMapping::text("login", &[Matcher::Exact(Case::Sensitive), Matcher::Substring]),
    FieldMapping::text("email", &[Matcher::Exact(Case::Insensitive), Matcher::Substring]),
    FieldMapping::text_list("aliases", &[Matcher::Exact(Case::Insensitive)]),
    FieldMapping::flag("active"),
];

fn account(i: u64) -> Document {
    Document::new(format!("acc-{:08}", i))
        .with("login", FieldValue::Text(format!("login-{}", i)))
        .with("email", FieldValue::Text(format!("User{}@Corp.com", i)))
        .with(
            "aliases",
            FieldValue::TextList(vec![format!("alias-{}", i), format!("A{}", i)]),
        )
        .with("active", FieldValue::Flag(i % 3 != 0))
}

fn bench_put_batch(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let engine = TantivyEngine::open(tmp.path()).unwrap();
    engine.define("accounts", ACCOUNTS).unwrap();

    c.bench_function("tantivy_put_batch_100", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let docs: Vec<Document> = (i..i + 100).map(account).collect();
            engine
                .put_documents(black_box("accounts"), black_box(&docs))
                .unwrap();
            i += 100;
        });
    });
}

fn populated() -> TantivyEngine {
    let engine = TantivyEngine::open_in_memory();
    engine.define("accounts", ACCOUNTS).unwrap();
    let docs: Vec<Document> = (0..1000).map(account).collect();
    engine.put_documents("accounts", &docs).unwrap();
    engine
}

fn bench_exact_lookup(c: &mut Criterion) {
    let engine = populated();
    let query = Query::And(vec![
        Query::flag("active", true),
        Query::Or(vec![
            Query::term("login", "login-500"),
            Query::term("email", "user500@corp.com"),
            Query::term("aliases", "ALIAS-500"),
        ]),
    ]);

    c.bench_function("tantivy_exact_lookup", |b| {
        b.iter(|| {
            let page = engine
                .search(black_box("accounts"), black_box(&query), Page::first(3))
                .unwrap();
            assert!(page.documents.len() <= 3);
        });
    });
}

fn bench_substring_search(c: &mut Criterion) {
    let engine = populated();
    let query = Query::Or(vec![
        Query::contains("login", "in-5"),
        Query::contains("email", "R5"),
    ]);

    c.bench_function("tantivy_substring_search", |b| {
        b.iter(|| {
            let page = engine
                .search(black_box("accounts"), black_box(&query), Page::first(10))
                .unwrap();
            assert!(page.total > 0);
        });
    });
}

criterion_group!(benches, bench_put_batch, bench_exact_lookup, bench_substring_search);
criterion_main!(benches);
