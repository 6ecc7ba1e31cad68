// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! On-disk trigram index: writer, memory-mapped reader, and two-way merge.
//!
//! The file layout is, in order: a 16-byte magic, the NUL-terminated sorted
//! path list (ending with an empty entry), the NUL-terminated sorted name
//! list (one per file ID, ending with an empty entry), the posting lists,
//! the name index, the posting-list index, and a trailer holding the five
//! region offsets followed by the 16-byte trailer magic.
//!
//! Each posting list is a 3-byte trigram followed by varint-encoded deltas
//! between successive file IDs and a terminating zero delta. The delta
//! decoder is seeded with `0xFFFFFFFF`, so the first stored delta is the
//! first file ID plus one. Posting data ends with a pseudo-list for the
//! sentinel trigram `0xFFFFFF`, which is not recorded in the posting-list
//! index. All fixed-width integers in the indexes and trailer are
//! big-endian; offsets are 32 bits, capping an index at 4 GiB.

use std::env;
use std::fs;
use std::path::PathBuf;

pub(crate) mod buf;
pub(crate) mod codec;
mod merge;
mod reader;
mod writer;

pub use merge::merge;
pub use reader::Index;
pub use writer::IndexWriter;

pub const MAGIC: &str = "csearch index 1\n";
pub const TRAILER_MAGIC: &str = "\ncsearch trailr\n";

/// Size of one posting-list index entry: trigram, count, offset.
pub(crate) const POST_ENTRY_SIZE: usize = 3 + 4 + 4;

/// Reserved trigram marking the end of posting data.
pub(crate) const SENTINEL_TRIGRAM: u32 = (1 << 24) - 1;

/// The index file to use: `$CSEARCHINDEX`, else the nearest ancestor of
/// the working directory holding a `.csearchindex`, else
/// `$HOME/.csearchindex`.
pub fn search_path() -> PathBuf {
    if let Some(f) = env::var_os("CSEARCHINDEX") {
        if !f.is_empty() {
            return PathBuf::from(f);
        }
    }

    if let Ok(mut dir) = env::current_dir() {
        loop {
            let f = dir.join(".csearchindex");
            if fs::symlink_metadata(&f).is_ok() {
                return f;
            }
            if !dir.pop() {
                break;
            }
        }
    }

    let home = env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default();
    home.join(".csearchindex")
}
