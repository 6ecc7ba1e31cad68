use std::path::Path;

use csearch_rs::index::search_path;
use csearch_rs::walk::{default_skip, files};

fn write(root: &Path, rel: &str, contents: &str) {
    let p = root.join(rel);
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(p, contents).unwrap();
}

#[test]
fn default_skip_rules() {
    assert!(default_skip(Path::new("/x/.git")));
    assert!(default_skip(Path::new("/x/#scratch#")));
    assert!(default_skip(Path::new("/x/~lock")));
    assert!(default_skip(Path::new("/x/save.txt~")));
    assert!(!default_skip(Path::new("/x/main.rs")));
    assert!(!default_skip(Path::new(".")));
}

#[test]
fn walker_skips_hidden_temp_and_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "a.txt", "a");
    write(root, "sub/z.txt", "z");
    write(root, ".hidden", "no");
    write(root, "b.txt~", "no");
    write(root, "#c#", "no");
    write(root, ".gitignore", "ignored.txt\n");
    write(root, "ignored.txt", "no");
    write(root, ".secret/inner.txt", "no");

    let got: Vec<String> = files(root)
        .into_iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(got, vec!["a.txt", "sub/z.txt"]);
}

#[test]
fn walker_accepts_single_file_root() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "only.rs", "fn main() {}\n");
    let root = dir.path().join("only.rs");
    let got = files(&root);
    assert_eq!(got, vec![root]);
}

#[test]
fn search_path_prefers_environment() {
    // Serialized in one test: the variable is process-global.
    std::env::set_var("CSEARCHINDEX", "/tmp/some.index");
    assert_eq!(search_path(), Path::new("/tmp/some.index"));
    std::env::remove_var("CSEARCHINDEX");
    let fallback = search_path();
    assert!(fallback.ends_with(".csearchindex"), "got {:?}", fallback);
}
