// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Code search over a trigram inverted index.
//!
//! An index maps every 3-byte substring of the indexed files to the sorted
//! list of files containing it. A regular expression is planned into a
//! boolean combination of required trigrams, the posting lists prune the
//! corpus down to candidate files, and only those candidates are actually
//! run through the regex engine.

pub mod error;
pub mod index;
pub mod query;
pub mod sparse;
pub mod walk;

pub use crate::error::{Error, Result};
pub use crate::index::{merge, Index, IndexWriter};
pub use crate::query::{regexp_query, Query, QueryOp};
