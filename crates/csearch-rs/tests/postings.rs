mod common;

use common::{build_index, tri};
use csearch_rs::index::Index;
use csearch_rs::Error;

const POST_FILES: &[(&str, &str)] = &[
    ("file0", ""),
    ("file1", "Google Code Search"),
    ("file2", "Google Code Project Hosting"),
    ("file3", "Google Web Search"),
];

#[test]
fn trivial_posting() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], POST_FILES);
    let ix = Index::open(&out).unwrap();

    assert_eq!(
        ix.posting_list(tri(b'S', b'e', b'a'), None).unwrap(),
        vec![1, 3]
    );
    assert_eq!(
        ix.posting_list(tri(b'G', b'o', b'o'), None).unwrap(),
        vec![1, 2, 3]
    );
    assert_eq!(
        ix.posting_and(&[1, 3], tri(b'G', b'o', b'o'), None).unwrap(),
        vec![1, 3]
    );
    assert_eq!(
        ix.posting_and(&[1, 2, 3], tri(b'S', b'e', b'a'), None)
            .unwrap(),
        vec![1, 3]
    );
    assert_eq!(
        ix.posting_or(&[1, 3], tri(b'G', b'o', b'o'), None).unwrap(),
        vec![1, 2, 3]
    );
    assert_eq!(
        ix.posting_or(&[1, 2, 3], tri(b'S', b'e', b'a'), None)
            .unwrap(),
        vec![1, 2, 3]
    );
    // Absent trigram: empty list, intersection empty, union unchanged.
    assert_eq!(ix.posting_list(tri(b'z', b'z', b'z'), None).unwrap(), vec![]);
    assert_eq!(
        ix.posting_and(&[1, 3], tri(b'z', b'z', b'z'), None).unwrap(),
        vec![]
    );
    assert_eq!(
        ix.posting_or(&[1, 3], tri(b'z', b'z', b'z'), None).unwrap(),
        vec![1, 3]
    );
}

#[test]
fn posting_list_under_restrict() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], POST_FILES);
    let ix = Index::open(&out).unwrap();

    let goo = tri(b'G', b'o', b'o');
    assert_eq!(ix.posting_list(goo, Some(&[2])).unwrap(), vec![2]);
    assert_eq!(ix.posting_list(goo, Some(&[0])).unwrap(), vec![]);
    assert_eq!(ix.posting_list(goo, Some(&[0, 2, 3])).unwrap(), vec![2, 3]);
    assert_eq!(ix.posting_list(goo, Some(&[])).unwrap(), vec![]);
}

#[test]
fn names_round_trip_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &["/tmp/corpus"], POST_FILES);
    let ix = Index::open(&out).unwrap();

    assert_eq!(ix.num_names(), 4);
    assert_eq!(ix.names().unwrap(), vec!["file0", "file1", "file2", "file3"]);
    assert_eq!(ix.name(2).unwrap(), "file2");
    assert_eq!(ix.paths().unwrap(), vec!["/tmp/corpus"]);
    let names = ix.names().unwrap();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn posting_lists_strictly_increase() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], POST_FILES);
    let ix = Index::open(&out).unwrap();

    for t in [tri(b'G', b'o', b'o'), tri(b'S', b'e', b'a'), tri(b'o', b'o', b'g')] {
        let l = ix.posting_list(t, None).unwrap();
        assert!(l.windows(2).all(|w| w[0] < w[1]), "not increasing: {:?}", l);
    }
}

#[test]
fn corrupt_trailer_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], POST_FILES);

    let mut bytes = std::fs::read(&out).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x20;
    let bad = dir.path().join("index-bad");
    std::fs::write(&bad, &bytes).unwrap();

    match Index::open(&bad) {
        Err(Error::Corrupt(_)) => {}
        other => panic!("expected Corrupt, got {:?}", other.map(|_| "ok")),
    }
}

#[test]
fn truncated_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    std::fs::write(&out, b"short").unwrap();
    assert!(matches!(Index::open(&out), Err(Error::Corrupt(_))));
}

#[test]
fn missing_list_terminator_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], POST_FILES);

    let mut bytes = std::fs::read(&out).unwrap();

    // Locate the posting list for "Goo" through the trailer offsets and
    // the posting-list index, then overwrite its zero terminator.
    let trailer = bytes.len() - 16 - 20;
    let be32 = |d: &[u8], o: usize| u32::from_be_bytes(d[o..o + 4].try_into().unwrap());
    let post_data = be32(&bytes, trailer + 8) as usize;
    let post_index = be32(&bytes, trailer + 16) as usize;
    let num_post = (trailer - post_index) / 11;

    let goo = tri(b'G', b'o', b'o');
    let mut found = None;
    for i in 0..num_post {
        let e = post_index + i * 11;
        let t = u32::from(bytes[e]) << 16 | u32::from(bytes[e + 1]) << 8 | u32::from(bytes[e + 2]);
        if t == goo {
            let count = be32(&bytes, e + 3) as usize;
            let offset = be32(&bytes, e + 7) as usize;
            found = Some((count, offset));
            break;
        }
    }
    let (count, offset) = found.expect("Goo posting list present");
    assert_eq!(count, 3);

    // Skip the trigram header and the three varint deltas (all < 0x80
    // in this corpus), landing on the terminator byte.
    let term = post_data + offset + 3 + count;
    assert_eq!(bytes[term], 0);
    bytes[term] = 1;

    let bad = dir.path().join("index-bad");
    std::fs::write(&bad, &bytes).unwrap();
    let ix = Index::open(&bad).unwrap();
    assert!(matches!(
        ix.posting_list(goo, None),
        Err(Error::Corrupt(_))
    ));
}

#[test]
fn empty_index_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("index");
    build_index(&out, &[], &[]);
    let ix = Index::open(&out).unwrap();
    assert_eq!(ix.num_names(), 0);
    assert_eq!(ix.names().unwrap(), Vec::<String>::new());
    assert_eq!(ix.posting_list(tri(b'a', b'b', b'c'), None).unwrap(), vec![]);
}
