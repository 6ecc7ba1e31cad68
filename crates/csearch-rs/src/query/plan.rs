//! Regex analysis: compute the trigram query a regex imposes.
//!
//! Each HIR node is summarized as a `RegexInfo`: whether it can match the
//! empty string, a bounded set of exact match strings when one exists,
//! bounded sets of possible match prefixes and suffixes, and the trigram
//! query accumulated so far. Concatenation crosses the neighboring sets
//! (recovering trigrams that straddle the boundary), alternation unions
//! them, and repetition collapses to prefix/suffix knowledge. Whenever a
//! set outgrows its cap, its trigrams are folded into the query and the
//! set is widened, which only ever makes the final query more permissive.

use regex_syntax::hir::{self, Hir, HirKind};

use super::{Query, QueryOp};

// Bounds on the literal sets carried while walking the regex. Documented
// tunables: larger values extract more trigrams from pathological
// patterns at the cost of planning time.
const MAX_EXACT: usize = 7;
const MAX_SET: usize = 20;
// Character classes larger than this carry no useful literal information.
const MAX_CLASS: usize = 4;

/// Literal byte strings, kept sorted and deduplicated.
type StringSet = Vec<Vec<u8>>;

fn clean(s: &mut StringSet) {
    s.sort();
    s.dedup();
}

fn min_len(s: &StringSet) -> usize {
    s.iter().map(Vec::len).min().unwrap_or(0)
}

/// All pairwise concatenations of a and b.
fn cross(a: &StringSet, b: &StringSet) -> StringSet {
    let mut out = Vec::with_capacity(a.len() * b.len());
    for x in a {
        for y in b {
            let mut v = x.clone();
            v.extend_from_slice(y);
            out.push(v);
        }
    }
    clean(&mut out);
    out
}

fn union(a: StringSet, b: StringSet) -> StringSet {
    let mut out = a;
    out.extend(b);
    clean(&mut out);
    out
}

/// What the planner knows about one regex subexpression.
struct RegexInfo {
    /// The subexpression can match the empty string.
    can_empty: bool,
    /// The exact set of strings it matches, when bounded; None otherwise.
    exact: Option<StringSet>,
    /// Possible literal prefixes of any match.
    prefix: StringSet,
    /// Possible literal suffixes of any match.
    suffix: StringSet,
    /// Trigram requirement accumulated so far.
    query: Query,
}

impl RegexInfo {
    fn have_exact(&self) -> bool {
        self.exact.as_ref().is_some_and(|s| !s.is_empty())
    }
}

fn no_match() -> RegexInfo {
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::none(),
    }
}

fn empty_string() -> RegexInfo {
    RegexInfo {
        can_empty: true,
        exact: Some(vec![Vec::new()]),
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::all(),
    }
}

fn any_char() -> RegexInfo {
    RegexInfo {
        can_empty: false,
        exact: None,
        prefix: vec![Vec::new()],
        suffix: vec![Vec::new()],
        query: Query::all(),
    }
}

fn any_match() -> RegexInfo {
    RegexInfo {
        can_empty: true,
        exact: None,
        prefix: vec![Vec::new()],
        suffix: vec![Vec::new()],
        query: Query::all(),
    }
}

/// Parse a regex and compute its trigram query.
pub fn plan(pattern: &str) -> Result<Query, Box<regex_syntax::Error>> {
    let hir = regex_syntax::Parser::new()
        .parse(pattern)
        .map_err(Box::new)?;
    Ok(regexp_query(&hir))
}

/// The trigram query any text matching the regex must satisfy.
pub fn regexp_query(hir: &Hir) -> Query {
    let mut info = analyze(hir);
    simplify(&mut info, true);
    add_exact(&mut info);
    info.query
}

fn analyze(h: &Hir) -> RegexInfo {
    let mut info = match h.kind() {
        HirKind::Empty => empty_string(),
        // Anchors and word boundaries match the empty string at a
        // position; conservatively they contribute nothing.
        HirKind::Anchor(_) | HirKind::WordBoundary(_) => empty_string(),
        HirKind::Literal(lit) => {
            let mut s = Vec::new();
            match lit {
                hir::Literal::Unicode(c) => {
                    let mut b = [0u8; 4];
                    s.extend_from_slice(c.encode_utf8(&mut b).as_bytes());
                }
                hir::Literal::Byte(b) => s.push(*b),
            }
            RegexInfo {
                can_empty: false,
                exact: Some(vec![s]),
                prefix: Vec::new(),
                suffix: Vec::new(),
                query: Query::all(),
            }
        }
        HirKind::Class(class) => analyze_class(class),
        HirKind::Group(g) => analyze(&g.hir),
        HirKind::Concat(subs) => match subs.len() {
            0 => empty_string(),
            1 => analyze(&subs[0]),
            _ => {
                let mut info = concat(analyze(&subs[0]), analyze(&subs[1]));
                for sub in &subs[2..] {
                    info = concat(info, analyze(sub));
                }
                info
            }
        },
        HirKind::Alternation(subs) => match subs.len() {
            0 => no_match(),
            1 => analyze(&subs[0]),
            _ => {
                let mut info = alternate(analyze(&subs[0]), analyze(&subs[1]));
                for sub in &subs[2..] {
                    info = alternate(info, analyze(sub));
                }
                info
            }
        },
        HirKind::Repetition(rep) => match &rep.kind {
            hir::RepetitionKind::ZeroOrOne => alternate(analyze(&rep.hir), empty_string()),
            // Zero occurrences are allowed, so nothing is required.
            hir::RepetitionKind::ZeroOrMore => any_match(),
            hir::RepetitionKind::OneOrMore => one_or_more(analyze(&rep.hir)),
            hir::RepetitionKind::Range(range) => {
                let min = match range {
                    hir::RepetitionRange::Exactly(n) => *n,
                    hir::RepetitionRange::AtLeast(n) => *n,
                    hir::RepetitionRange::Bounded(m, _) => *m,
                };
                if min == 0 {
                    any_match()
                } else {
                    one_or_more(analyze(&rep.hir))
                }
            }
        },
    };
    simplify(&mut info, false);
    info
}

/// x+ matches x followed by x*: exact knowledge degrades to prefix and
/// suffix knowledge.
fn one_or_more(mut x: RegexInfo) -> RegexInfo {
    if x.have_exact() {
        let e = x.exact.take().expect("have_exact");
        x.prefix = e.clone();
        x.suffix = e;
    }
    x
}

fn analyze_class(class: &hir::Class) -> RegexInfo {
    let mut exact: StringSet = Vec::new();
    match class {
        hir::Class::Unicode(cls) => {
            let mut count: usize = 0;
            for r in cls.iter() {
                count += (r.end() as u32 - r.start() as u32) as usize + 1;
                if count > MAX_CLASS {
                    return any_char();
                }
            }
            if count == 0 {
                return no_match();
            }
            for r in cls.iter() {
                for c in (r.start() as u32)..=(r.end() as u32) {
                    if let Some(c) = char::from_u32(c) {
                        let mut b = [0u8; 4];
                        exact.push(c.encode_utf8(&mut b).as_bytes().to_vec());
                    }
                }
            }
        }
        hir::Class::Bytes(cls) => {
            let mut count: usize = 0;
            for r in cls.iter() {
                count += (r.end() - r.start()) as usize + 1;
                if count > MAX_CLASS {
                    return any_char();
                }
            }
            if count == 0 {
                return no_match();
            }
            for r in cls.iter() {
                for b in r.start()..=r.end() {
                    exact.push(vec![b]);
                }
            }
        }
    }
    clean(&mut exact);
    RegexInfo {
        can_empty: false,
        exact: Some(exact),
        prefix: Vec::new(),
        suffix: Vec::new(),
        query: Query::all(),
    }
}

fn concat(x: RegexInfo, y: RegexInfo) -> RegexInfo {
    let mut query = x.query.and(y.query);
    let mut exact = None;
    let mut prefix: StringSet = Vec::new();
    let mut suffix: StringSet = Vec::new();
    let x_have = x.exact.as_ref().is_some_and(|s| !s.is_empty());
    let y_have = y.exact.as_ref().is_some_and(|s| !s.is_empty());

    if x_have && y_have {
        exact = Some(cross(
            x.exact.as_ref().expect("x_have"),
            y.exact.as_ref().expect("y_have"),
        ));
    } else {
        if x_have {
            prefix = cross(x.exact.as_ref().expect("x_have"), &y.prefix);
        } else {
            prefix = x.prefix.clone();
            if x.can_empty {
                prefix = union(prefix, y.prefix.clone());
            }
        }
        if y_have {
            suffix = cross(&x.suffix, y.exact.as_ref().expect("y_have"));
        } else {
            suffix = y.suffix.clone();
            if y.can_empty {
                suffix = union(suffix, x.suffix.clone());
            }
        }
    }

    // A trigram lying across the boundary is required even though it
    // appears in neither side's sets. Only bother when both sides are
    // small enough and together long enough to guarantee one.
    if !x_have
        && !y_have
        && x.suffix.len() <= MAX_SET
        && y.prefix.len() <= MAX_SET
        && min_len(&x.suffix) + min_len(&y.prefix) >= 3
    {
        query = and_trigrams(query, &cross(&x.suffix, &y.prefix));
    }

    let mut info = RegexInfo {
        can_empty: x.can_empty && y.can_empty,
        exact,
        prefix,
        suffix,
        query,
    };
    simplify(&mut info, false);
    info
}

fn alternate(mut x: RegexInfo, mut y: RegexInfo) -> RegexInfo {
    let mut exact = None;
    let mut prefix: StringSet = Vec::new();
    let mut suffix: StringSet = Vec::new();
    let x_have = x.have_exact();
    let y_have = y.have_exact();

    if x_have && y_have {
        exact = Some(union(
            x.exact.take().expect("x_have"),
            y.exact.take().expect("y_have"),
        ));
    } else if x_have {
        let e = x.exact.take().expect("x_have");
        prefix = union(e.clone(), std::mem::take(&mut y.prefix));
        suffix = union(e.clone(), std::mem::take(&mut y.suffix));
        x.query = and_trigrams(x.query, &e);
    } else if y_have {
        let e = y.exact.take().expect("y_have");
        prefix = union(std::mem::take(&mut x.prefix), e.clone());
        suffix = union(std::mem::take(&mut x.suffix), e.clone());
        y.query = and_trigrams(y.query, &e);
    } else {
        prefix = union(std::mem::take(&mut x.prefix), std::mem::take(&mut y.prefix));
        suffix = union(std::mem::take(&mut x.suffix), std::mem::take(&mut y.suffix));
    }

    let mut info = RegexInfo {
        can_empty: x.can_empty || y.can_empty,
        exact,
        prefix,
        suffix,
        query: x.query.or(y.query),
    };
    simplify(&mut info, false);
    info
}

/// Fold the exact set's trigrams into the query.
fn add_exact(info: &mut RegexInfo) {
    if info.have_exact() {
        let e = info.exact.take().expect("have_exact");
        let q = std::mem::replace(&mut info.query, Query::none());
        info.query = and_trigrams(q, &e);
    }
}

/// Keep the carried sets within bounds. When the exact set has grown too
/// big, or its strings too long (always under force), its trigrams move
/// into the query and only two-byte prefix/suffix stubs survive.
fn simplify(info: &mut RegexInfo, force: bool) {
    let fold = match &mut info.exact {
        Some(exact) => {
            clean(exact);
            let ml = min_len(exact);
            exact.len() > MAX_EXACT || (ml >= 3 && force) || ml >= 4
        }
        None => false,
    };
    if fold {
        let exact = info.exact.take().expect("checked above");
        for s in &exact {
            let n = s.len();
            if n < 3 {
                info.prefix.push(s.clone());
                info.suffix.push(s.clone());
            } else {
                info.prefix.push(s[..2].to_vec());
                info.suffix.push(s[n - 2..].to_vec());
            }
        }
        let q = std::mem::replace(&mut info.query, Query::none());
        info.query = and_trigrams(q, &exact);
    }
    if !info.have_exact() {
        simplify_set(info, true);
        simplify_set(info, false);
    }
}

/// Add the set's trigrams to the query, then trim the strings so the set
/// stays small: prefixes keep their leading bytes, suffixes their
/// trailing ones, and strings subsumed by a shorter neighbor are dropped.
fn simplify_set(info: &mut RegexInfo, is_prefix: bool) {
    let mut t = std::mem::take(if is_prefix {
        &mut info.prefix
    } else {
        &mut info.suffix
    });
    clean(&mut t);

    let q = std::mem::replace(&mut info.query, Query::none());
    info.query = and_trigrams(q, &t);

    let mut n = 3usize;
    loop {
        if !(n == 3 || t.len() > MAX_SET) {
            break;
        }
        let mut w: StringSet = Vec::with_capacity(t.len());
        for s in &t {
            let mut s = s.clone();
            if n > 0 && s.len() >= n {
                if is_prefix {
                    s.truncate(n - 1);
                } else {
                    s = s[s.len() - (n - 1)..].to_vec();
                }
            }
            if w.last() != Some(&s) {
                w.push(s);
            }
        }
        t = w;
        clean(&mut t);
        if n == 0 {
            break;
        }
        n -= 1;
    }

    // Strings with a kept neighbor as prefix (suffix) add nothing.
    let mut w: StringSet = Vec::new();
    for s in t {
        let redundant = w.last().is_some_and(|last: &Vec<u8>| {
            if is_prefix {
                s.starts_with(last)
            } else {
                s.ends_with(last)
            }
        });
        if !redundant {
            w.push(s);
        }
    }
    *(if is_prefix {
        &mut info.prefix
    } else {
        &mut info.suffix
    }) = w;
}

/// AND the query with the requirement that one of the strings in t is
/// present, each expressed as the AND of its trigrams. A string shorter
/// than three bytes guarantees nothing, making the whole set moot.
fn and_trigrams(q: Query, t: &StringSet) -> Query {
    if min_len(t) < 3 {
        return q;
    }
    let mut or = Query::none();
    for s in t {
        let mut trigram: Vec<[u8; 3]> = Vec::new();
        for w in s.windows(3) {
            trigram.push([w[0], w[1], w[2]]);
        }
        trigram.sort();
        trigram.dedup();
        or = or.or(Query {
            op: QueryOp::And,
            trigram,
            sub: Vec::new(),
        });
    }
    q.and(or)
}
