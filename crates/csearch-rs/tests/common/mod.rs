// Not every test binary uses every helper.
#![allow(dead_code)]

use std::path::Path;

use csearch_rs::index::IndexWriter;

/// Build an index at out covering the given root paths and (name,
/// contents) pairs. Names are fed in sorted order, the way the production
/// walker does.
pub fn build_index(out: &Path, paths: &[&str], files: &[(&str, &str)]) {
    build_index_with(out, paths, files, |_| {});
}

pub fn build_index_with(
    out: &Path,
    paths: &[&str],
    files: &[(&str, &str)],
    configure: impl FnOnce(&mut IndexWriter),
) {
    let mut w = IndexWriter::create(out).expect("create index writer");
    configure(&mut w);
    w.add_paths(paths.iter().map(|s| s.to_string()));
    let mut files: Vec<(&str, &str)> = files.to_vec();
    files.sort();
    for (name, contents) in files {
        w.add(name, contents.as_bytes()).expect("add file");
    }
    w.flush().expect("flush index");
}

/// Pack three bytes into a trigram value.
pub fn tri(x: u8, y: u8, z: u8) -> u32 {
    u32::from(x) << 16 | u32::from(y) << 8 | u32::from(z)
}

/// Trigram value for a 3-byte string literal.
#[allow(dead_code)]
pub fn tri_str(s: &str) -> u32 {
    let b = s.as_bytes();
    assert_eq!(b.len(), 3);
    tri(b[0], b[1], b[2])
}
