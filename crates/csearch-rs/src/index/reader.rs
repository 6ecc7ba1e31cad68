use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::query::{Query, QueryOp};

use super::codec::uvarint;
use super::{POST_ENTRY_SIZE, TRAILER_MAGIC};

/// Read-only access to a trigram index through a private memory mapping.
///
/// Construction validates the trailer and derives the region offsets; every
/// accessor afterwards bounds-checks against the mapping and reports
/// structural damage as `Error::Corrupt`. Slices handed to internal cursors
/// borrow from the mapping and cannot outlive the reader; the public
/// accessors return owned copies.
pub struct Index {
    pub verbose: bool,
    path: PathBuf,
    data: Mmap,
    path_data: u32,
    name_data: u32,
    post_data: u32,
    name_index: u32,
    post_index: u32,
    num_name: u32,
    num_post: u32,
}

fn be32(d: &[u8], o: usize) -> Option<u32> {
    let s = d.get(o..o.checked_add(4)?)?;
    Some(u32::from_be_bytes(s.try_into().ok()?))
}

impl Index {
    pub fn open(path: impl AsRef<Path>) -> Result<Index> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let tm = TRAILER_MAGIC.as_bytes();
        if len < (5 * 4 + tm.len()) as u64 {
            return Err(Error::Corrupt(path));
        }
        if len > u64::from(u32::MAX) {
            return Err(Error::TooLarge(path));
        }
        let data = unsafe { Mmap::map(&file)? };
        if &data[data.len() - tm.len()..] != tm {
            return Err(Error::Corrupt(path));
        }

        let n = data.len() - tm.len() - 5 * 4;
        let corrupt = |path: &PathBuf| Error::Corrupt(path.clone());
        let path_data = be32(&data, n).ok_or_else(|| corrupt(&path))?;
        let name_data = be32(&data, n + 4).ok_or_else(|| corrupt(&path))?;
        let post_data = be32(&data, n + 8).ok_or_else(|| corrupt(&path))?;
        let name_index = be32(&data, n + 12).ok_or_else(|| corrupt(&path))?;
        let post_index = be32(&data, n + 16).ok_or_else(|| corrupt(&path))?;

        // Derived counts; a negative count means the offsets are garbage.
        let num_name = post_index
            .checked_sub(name_index)
            .map(|d| d / 4)
            .and_then(|c| c.checked_sub(1))
            .ok_or_else(|| corrupt(&path))?;
        let num_post = (n as u32)
            .checked_sub(post_index)
            .map(|d| d / POST_ENTRY_SIZE as u32)
            .ok_or_else(|| corrupt(&path))?;

        Ok(Index {
            verbose: false,
            path,
            data,
            path_data,
            name_data,
            post_data,
            name_index,
            post_index,
            num_name,
            num_post,
        })
    }

    pub(crate) fn corrupt(&self) -> Error {
        Error::Corrupt(self.path.clone())
    }

    /// Slice of index data starting at off, with an exact length when given.
    fn slice(&self, off: u32, n: Option<usize>) -> Result<&[u8]> {
        let o = off as usize;
        let d = match n {
            Some(n) => o.checked_add(n).and_then(|end| self.data.get(o..end)),
            None => self.data.get(o..),
        };
        d.ok_or_else(|| self.corrupt())
    }

    fn uint32(&self, off: u32) -> Result<u32> {
        be32(&self.data, off as usize).ok_or_else(|| self.corrupt())
    }

    /// NUL-terminated byte string at the given offset.
    fn str_at(&self, off: u32) -> Result<&[u8]> {
        let d = self.slice(off, None)?;
        match d.iter().position(|&b| b == 0) {
            Some(i) => Ok(&d[..i]),
            None => Err(self.corrupt()),
        }
    }

    /// The list of indexed root paths.
    pub fn paths(&self) -> Result<Vec<String>> {
        let mut off = self.path_data;
        let mut out = Vec::new();
        loop {
            let s = self.str_at(off)?;
            if s.is_empty() {
                break;
            }
            out.push(String::from_utf8_lossy(s).into_owned());
            off += s.len() as u32 + 1;
        }
        Ok(out)
    }

    pub fn num_names(&self) -> u32 {
        self.num_name
    }

    /// Raw name bytes for a file ID, borrowed from the mapping.
    pub fn name_bytes(&self, file_id: u32) -> Result<&[u8]> {
        if file_id > self.num_name {
            return Err(self.corrupt());
        }
        let off = self.uint32(self.name_index + 4 * file_id)?;
        self.str_at(
            self.name_data
                .checked_add(off)
                .ok_or_else(|| self.corrupt())?,
        )
    }

    /// The name corresponding to a file ID.
    pub fn name(&self, file_id: u32) -> Result<String> {
        Ok(String::from_utf8_lossy(self.name_bytes(file_id)?).into_owned())
    }

    /// All file names, in file ID order.
    pub fn names(&self) -> Result<Vec<String>> {
        (0..self.num_name).map(|i| self.name(i)).collect()
    }

    pub(crate) fn num_posts(&self) -> u32 {
        self.num_post
    }

    /// Posting-list index entry number i: (trigram, count, offset).
    pub(crate) fn list_at(&self, i: u32) -> Result<(u32, u32, u32)> {
        let off = self
            .post_index
            .checked_add(i * POST_ENTRY_SIZE as u32)
            .ok_or_else(|| self.corrupt())?;
        let d = self.slice(off, Some(POST_ENTRY_SIZE))?;
        let trigram = u32::from(d[0]) << 16 | u32::from(d[1]) << 8 | u32::from(d[2]);
        let count = u32::from_be_bytes(d[3..7].try_into().unwrap());
        let offset = u32::from_be_bytes(d[7..11].try_into().unwrap());
        Ok((trigram, count, offset))
    }

    /// The delta bytes of the posting list starting at the given offset
    /// within the posting region (past the 3-byte trigram header).
    pub(crate) fn post_list_deltas(&self, offset: u32) -> Result<&[u8]> {
        let off = self
            .post_data
            .checked_add(offset)
            .and_then(|o| o.checked_add(3))
            .ok_or_else(|| self.corrupt())?;
        self.slice(off, None)
    }

    /// Binary search the posting-list index. Returns (count, offset),
    /// with count 0 when the trigram has no posting list.
    pub fn find_list(&self, trigram: u32) -> Result<(u32, u32)> {
        let n = self.num_post as usize;
        let d = self.slice(self.post_index, Some(POST_ENTRY_SIZE * n))?;
        let tri_at = |i: usize| -> u32 {
            let j = i * POST_ENTRY_SIZE;
            u32::from(d[j]) << 16 | u32::from(d[j + 1]) << 8 | u32::from(d[j + 2])
        };
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if tri_at(mid) < trigram {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo >= n || tri_at(lo) != trigram {
            return Ok((0, 0));
        }
        let j = lo * POST_ENTRY_SIZE;
        let count = u32::from_be_bytes(d[j + 3..j + 7].try_into().unwrap());
        let offset = u32::from_be_bytes(d[j + 7..j + 11].try_into().unwrap());
        Ok((count, offset))
    }

    /// The sorted file IDs containing the trigram, optionally pruned to a
    /// sorted restrict set.
    pub fn posting_list(&self, trigram: u32, restrict: Option<&[u32]>) -> Result<Vec<u32>> {
        let mut r = PostReader::new(self, trigram, restrict)?;
        let mut x = Vec::with_capacity(r.max());
        while r.next()? {
            x.push(r.file_id);
        }
        Ok(x)
    }

    /// Intersect a sorted file ID list with the trigram's posting list.
    pub fn posting_and(
        &self,
        list: &[u32],
        trigram: u32,
        restrict: Option<&[u32]>,
    ) -> Result<Vec<u32>> {
        let mut r = PostReader::new(self, trigram, restrict)?;
        let mut x = Vec::with_capacity(list.len());
        let mut i = 0;
        while r.next()? {
            let file_id = r.file_id;
            while i < list.len() && list[i] < file_id {
                i += 1;
            }
            if i < list.len() && list[i] == file_id {
                x.push(file_id);
                i += 1;
            }
        }
        Ok(x)
    }

    /// Union a sorted file ID list with the trigram's posting list.
    pub fn posting_or(
        &self,
        list: &[u32],
        trigram: u32,
        restrict: Option<&[u32]>,
    ) -> Result<Vec<u32>> {
        let mut r = PostReader::new(self, trigram, restrict)?;
        let mut x = Vec::with_capacity(list.len() + r.max());
        let mut i = 0;
        while r.next()? {
            let file_id = r.file_id;
            while i < list.len() && list[i] < file_id {
                x.push(list[i]);
                i += 1;
            }
            x.push(file_id);
            if i < list.len() && list[i] == file_id {
                i += 1;
            }
        }
        x.extend_from_slice(&list[i..]);
        Ok(x)
    }

    /// Evaluate a planned query to the sorted set of candidate file IDs.
    pub fn posting_query(&self, q: &Query) -> Result<Vec<u32>> {
        self.posting_query_restrict(q, None)
    }

    fn posting_query_restrict(&self, q: &Query, restrict: Option<&[u32]>) -> Result<Vec<u32>> {
        match q.op {
            QueryOp::None => Ok(Vec::new()),
            QueryOp::All => Ok(match restrict {
                Some(r) => r.to_vec(),
                None => (0..self.num_name).collect(),
            }),
            QueryOp::And => {
                let mut list: Option<Vec<u32>> = None;
                for t in &q.trigram {
                    let tri = tri32(t);
                    let next = match &list {
                        None => self.posting_list(tri, restrict)?,
                        Some(l) => self.posting_and(l, tri, restrict)?,
                    };
                    if next.is_empty() {
                        return Ok(Vec::new());
                    }
                    list = Some(next);
                }
                for sub in &q.sub {
                    let next = match &list {
                        Some(l) => self.posting_query_restrict(sub, Some(l))?,
                        None => self.posting_query_restrict(sub, restrict)?,
                    };
                    if next.is_empty() {
                        return Ok(Vec::new());
                    }
                    list = Some(next);
                }
                Ok(list.unwrap_or_default())
            }
            QueryOp::Or => {
                let mut list: Option<Vec<u32>> = None;
                for t in &q.trigram {
                    let tri = tri32(t);
                    let next = match &list {
                        None => self.posting_list(tri, restrict)?,
                        Some(l) => self.posting_or(l, tri, restrict)?,
                    };
                    list = Some(next);
                }
                for sub in &q.sub {
                    let l1 = self.posting_query_restrict(sub, restrict)?;
                    list = Some(match list {
                        None => l1,
                        Some(l) => merge_or(&l, &l1),
                    });
                }
                Ok(list.unwrap_or_default())
            }
        }
    }
}

fn tri32(t: &[u8; 3]) -> u32 {
    u32::from(t[0]) << 16 | u32::from(t[1]) << 8 | u32::from(t[2])
}

fn merge_or(l1: &[u32], l2: &[u32]) -> Vec<u32> {
    let mut l = Vec::with_capacity(l1.len() + l2.len());
    let mut i = 0;
    let mut j = 0;
    while i < l1.len() || j < l2.len() {
        if j == l2.len() || (i < l1.len() && l1[i] < l2[j]) {
            l.push(l1[i]);
            i += 1;
        } else if i == l1.len() || l1[i] > l2[j] {
            l.push(l2[j]);
            j += 1;
        } else {
            l.push(l1[i]);
            i += 1;
            j += 1;
        }
    }
    l
}

/// Delta-decoding cursor over one posting list.
///
/// State is (count, previous file ID, remaining delta bytes, restrict).
/// The previous-ID seed is `0xFFFFFFFF`; each varint delta must be
/// non-zero while count entries remain, and the byte after the last entry
/// must be the zero terminator.
struct PostReader<'a> {
    ix: &'a Index,
    count: u32,
    file_id: u32,
    d: Option<&'a [u8]>,
    restrict: Option<&'a [u32]>,
}

impl<'a> PostReader<'a> {
    fn new(ix: &'a Index, trigram: u32, restrict: Option<&'a [u32]>) -> Result<PostReader<'a>> {
        let (count, offset) = ix.find_list(trigram)?;
        let d = if count == 0 {
            None
        } else {
            Some(ix.post_list_deltas(offset)?)
        };
        Ok(PostReader {
            ix,
            count,
            file_id: u32::MAX,
            d,
            restrict,
        })
    }

    fn max(&self) -> usize {
        self.count as usize
    }

    fn next(&mut self) -> Result<bool> {
        while self.count > 0 {
            self.count -= 1;
            let d = self.d.unwrap_or(&[]);
            let (delta, n) = match uvarint(d) {
                Some((delta, n)) if delta != 0 => (delta, n),
                _ => return Err(self.ix.corrupt()),
            };
            self.d = Some(&d[n..]);
            self.file_id = self.file_id.wrapping_add(delta);
            if let Some(restrict) = &mut self.restrict {
                let mut i = 0;
                while i < restrict.len() && restrict[i] < self.file_id {
                    i += 1;
                }
                *restrict = &restrict[i..];
                if restrict.first() != Some(&self.file_id) {
                    continue;
                }
            }
            return Ok(true);
        }
        // The list must end with the zero-delta terminator.
        if let Some(d) = self.d {
            if d.first() != Some(&0) {
                return Err(self.ix.corrupt());
            }
        }
        self.file_id = u32::MAX;
        Ok(false)
    }
}
