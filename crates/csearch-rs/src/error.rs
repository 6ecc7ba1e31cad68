// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

/// Typed errors surfaced by index reading, writing and merging.
///
/// Files rejected by the text heuristics during ingestion are not errors;
/// the writer skips them (optionally logging why) and carries on.
#[derive(Debug)]
pub enum Error {
    /// Underlying filesystem error (open/read/write/mmap).
    Io(io::Error),
    /// Structural violation while reading an index: bad magic, offset out
    /// of range, malformed varint, missing posting-list terminator. The
    /// index file is unusable and should be removed.
    Corrupt(PathBuf),
    /// The index grew past the 32-bit offset space the format can address.
    TooLarge(PathBuf),
    /// Merge invariants violated (shadow gaps, colliding file IDs). This
    /// indicates corrupted or mismatched inputs, not a user mistake.
    Inconsistent(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::Corrupt(path) => write!(f, "corrupt index: remove {}", path.display()),
            Error::TooLarge(path) => write!(f, "index too large: {}", path.display()),
            Error::Inconsistent(what) => write!(f, "inconsistent index: {}", what),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
