//! Gitignore-aware traversal yielding the regular files under a root.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use log::warn;

/// Entries the indexer never wants: dotfiles, editor scratch and backup
/// names. Applies to directories too, pruning whole subtrees.
pub fn default_skip(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(base) if !base.is_empty() => {
            base.starts_with('.')
                || base.starts_with('#')
                || base.starts_with('~')
                || base.ends_with('~')
        }
        _ => false,
    }
}

/// Walk root, honoring .gitignore files, and return its regular files in
/// deterministic sorted order. Unreadable entries are logged and skipped.
pub fn files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut builder = WalkBuilder::new(root);
    builder
        .follow_links(false)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_name(std::cmp::Ord::cmp)
        .filter_entry(|e| !default_skip(e.path()));
    for result in builder.build() {
        match result {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_file()) {
                    out.push(entry.into_path());
                }
            }
            Err(err) => warn!("{}", err),
        }
    }
    out.sort();
    out
}
