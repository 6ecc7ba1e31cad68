// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Boolean trigram queries.
//!
//! A `Query` is a conservative approximation of a regex: any text the
//! regex matches also satisfies the query, while the reverse need not
//! hold. Evaluating the query against the posting lists prunes the corpus
//! to candidate files, which are then re-checked with the real regex.

use std::fmt;

mod plan;
pub use plan::{plan, regexp_query};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Matches any file.
    All,
    /// Matches no file.
    None,
    /// Every trigram and every subquery must match.
    And,
    /// Any trigram or subquery suffices.
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub op: QueryOp,
    /// Sorted, deduplicated trigram operands.
    pub trigram: Vec<[u8; 3]>,
    pub sub: Vec<Query>,
}

impl Query {
    pub fn all() -> Query {
        Query {
            op: QueryOp::All,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    pub fn none() -> Query {
        Query {
            op: QueryOp::None,
            trigram: Vec::new(),
            sub: Vec::new(),
        }
    }

    pub fn and(self, r: Query) -> Query {
        self.and_or(r, QueryOp::And)
    }

    pub fn or(self, r: Query) -> Query {
        self.and_or(r, QueryOp::Or)
    }

    /// Combine two queries under op, simplifying as it goes: single-child
    /// wrappers collapse, implications absorb (q AND r == q when q implies
    /// r; q OR r == r likewise), same-op nodes flatten, and trigram sets
    /// merge deduplicated.
    fn and_or(self, other: Query, op: QueryOp) -> Query {
        let mut q = self;
        let mut r = other;
        if q.trigram.is_empty() && q.sub.len() == 1 {
            let s = q.sub.pop().expect("just checked");
            q = s;
        }
        if r.trigram.is_empty() && r.sub.len() == 1 {
            let s = r.sub.pop().expect("just checked");
            r = s;
        }

        if q.implies(&r) {
            return if op == QueryOp::And { q } else { r };
        }
        if r.implies(&q) {
            return if op == QueryOp::And { r } else { q };
        }

        // Both q and r are And or Or nodes by now; merge when the
        // operations line up.
        let q_atom = q.trigram.len() == 1 && q.sub.is_empty();
        let r_atom = r.trigram.len() == 1 && r.sub.is_empty();
        if q.op == op && (r.op == op || r_atom) {
            q.trigram.extend(r.trigram);
            q.trigram.sort();
            q.trigram.dedup();
            q.sub.extend(r.sub);
            return q;
        }
        if r.op == op && q_atom {
            r.trigram.extend(q.trigram);
            r.trigram.sort();
            r.trigram.dedup();
            return r;
        }
        if q_atom && r_atom {
            let mut trigram = q.trigram;
            trigram.extend(r.trigram);
            trigram.sort();
            trigram.dedup();
            return Query {
                op,
                trigram,
                sub: Vec::new(),
            };
        }
        if q.op == op {
            q.sub.push(r);
            return q;
        }
        if r.op == op {
            r.sub.push(q);
            return r;
        }
        Query {
            op,
            trigram: Vec::new(),
            sub: vec![q, r],
        }
    }

    /// Whether every match of self necessarily matches r.
    fn implies(&self, r: &Query) -> bool {
        if self.op == QueryOp::None || r.op == QueryOp::All {
            return true;
        }
        if self.op == QueryOp::All || r.op == QueryOp::None {
            return false;
        }
        if self.op == QueryOp::And
            || (self.op == QueryOp::Or && self.trigram.len() == 1 && self.sub.is_empty())
        {
            return trigrams_imply(&self.trigram, r);
        }
        if self.op == QueryOp::Or
            && r.op == QueryOp::Or
            && !self.trigram.is_empty()
            && self.sub.is_empty()
            && is_subset(&self.trigram, &r.trigram)
        {
            return true;
        }
        false
    }
}

/// Whether requiring all trigrams in t guarantees that q matches.
fn trigrams_imply(t: &[[u8; 3]], q: &Query) -> bool {
    match q.op {
        QueryOp::Or => {
            if q.sub.iter().any(|qq| trigrams_imply(t, qq)) {
                return true;
            }
            t.iter().any(|tt| q.trigram.binary_search(tt).is_ok())
        }
        QueryOp::And => {
            if !q.sub.iter().all(|qq| trigrams_imply(t, qq)) {
                return false;
            }
            is_subset(&q.trigram, t)
        }
        _ => false,
    }
}

/// Whether sorted a is a subset of sorted b.
fn is_subset(a: &[[u8; 3]], b: &[[u8; 3]]) -> bool {
    let mut i = 0;
    for x in a {
        while i < b.len() && b[i] < *x {
            i += 1;
        }
        if i >= b.len() || b[i] != *x {
            return false;
        }
        i += 1;
    }
    true
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            QueryOp::None => return f.write_str("-"),
            QueryOp::All => return f.write_str("+"),
            _ => {}
        }
        if self.sub.is_empty() && self.trigram.len() == 1 {
            return write!(f, "{:?}", String::from_utf8_lossy(&self.trigram[0]));
        }
        let (tjoin, sjoin, open, close) = if self.op == QueryOp::And {
            (" ", " ", "(", ")")
        } else {
            ("|", "|", "(", ")")
        };
        for (i, t) in self.trigram.iter().enumerate() {
            if i > 0 {
                f.write_str(tjoin)?;
            }
            write!(f, "{:?}", String::from_utf8_lossy(t))?;
        }
        if !self.sub.is_empty() {
            if !self.trigram.is_empty() {
                f.write_str(sjoin)?;
            }
            for (i, q) in self.sub.iter().enumerate() {
                if i > 0 {
                    f.write_str(sjoin)?;
                }
                f.write_str(open)?;
                write!(f, "{}", q)?;
                f.write_str(close)?;
            }
        }
        Ok(())
    }
}
