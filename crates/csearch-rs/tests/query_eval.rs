mod common;

use common::build_index;
use csearch_rs::index::Index;
use csearch_rs::query::{plan, Query};

const CORPUS: &[(&str, &str)] = &[
    ("src/alpha.rs", "fn alpha() { println!(\"hello world\"); }\n"),
    ("src/beta.rs", "fn beta() { let beta = 42; }\n"),
    ("src/gamma.rs", "struct Gamma;\nimpl Gamma { fn hello(&self) {} }\n"),
    ("src/delta.txt", "delta delta delta\nhello\n"),
    ("README", "alpha beta gamma delta\n"),
];

fn candidates(ix: &Index, pattern: &str) -> Vec<String> {
    let q = plan(pattern).unwrap();
    let post = ix.posting_query(&q).unwrap();
    post.iter().map(|&id| ix.name(id).unwrap()).collect()
}

/// Every file whose contents match the regex must appear among the
/// candidates; false positives are allowed, false negatives are not.
fn check_no_false_negatives(ix: &Index, pattern: &str) {
    let re = regex::Regex::new(pattern).unwrap();
    let got = candidates(ix, pattern);
    for (name, contents) in CORPUS {
        if re.is_match(contents) {
            assert!(
                got.iter().any(|n| n == name),
                "pattern {:?}: matching file {} not in candidates {:?}",
                pattern,
                name,
                got
            );
        }
    }
}

#[test]
fn query_soundness_over_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], CORPUS);
    let ix = Index::open(&out).unwrap();

    for pattern in [
        "hello world",
        "hello",
        "alpha|beta",
        "he(llo)+",
        "Gamma",
        "(?i)gamma",
        "del+a",
        "a.pha",
        ".",
        "zebra",
    ] {
        check_no_false_negatives(&ix, pattern);
    }
}

#[test]
fn literal_query_prunes_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], CORPUS);
    let ix = Index::open(&out).unwrap();

    let got = candidates(&ix, "hello world");
    assert_eq!(got, vec!["src/alpha.rs"]);

    let got = candidates(&ix, "zebra");
    assert_eq!(got, Vec::<String>::new());
}

#[test]
fn all_query_returns_whole_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], CORPUS);
    let ix = Index::open(&out).unwrap();

    let post = ix.posting_query(&Query::all()).unwrap();
    assert_eq!(post, (0..ix.num_names()).collect::<Vec<u32>>());
    let post = ix.posting_query(&Query::none()).unwrap();
    assert_eq!(post, Vec::<u32>::new());
}

#[test]
fn and_query_with_subqueries_restricts() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], CORPUS);
    let ix = Index::open(&out).unwrap();

    // "hello" AND "world" should only keep alpha.rs, while each side on
    // its own is broader.
    let hello = plan("hello").unwrap();
    let world = plan("world").unwrap();
    let both = hello.clone().and(world);
    let post = ix.posting_query(&both).unwrap();
    let names: Vec<String> = post.iter().map(|&id| ix.name(id).unwrap()).collect();
    assert_eq!(names, vec!["src/alpha.rs"]);

    let hello_only = ix.posting_query(&hello).unwrap();
    assert!(hello_only.len() > post.len());
}
