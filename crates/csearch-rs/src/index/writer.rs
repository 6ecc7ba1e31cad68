use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use log::info;
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::sparse::SparseSet;

use super::buf::BufFile;
use super::{MAGIC, SENTINEL_TRIGRAM, TRAILER_MAGIC};

// Tuning constants for detecting text files. A file is dropped if it
// contains a byte pair no valid UTF-8 stream can produce, if it is longer
// than MAX_FILE_LEN bytes, if it has a line longer than MAX_LINE_LEN
// bytes, or if it has more than MAX_TEXT_TRIGRAMS distinct trigrams.
const MAX_FILE_LEN: u64 = 1 << 30;
const MAX_LINE_LEN: usize = 2000;
const MAX_TEXT_TRIGRAMS: usize = 20_000;

// 64 MiB worth of in-memory post entries between external flushes.
const NPOST: usize = (64 << 20) / 8;

const SORT_K: u32 = 12;

/// Packed (trigram, file ID) pair; plain u64 order sorts by trigram, then
/// by file ID.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PostEntry(u64);

impl PostEntry {
    fn new(trigram: u32, file_id: u32) -> PostEntry {
        PostEntry(u64::from(trigram) << 32 | u64::from(file_id))
    }

    fn trigram(self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn file_id(self) -> u32 {
        self.0 as u32
    }
}

/// Streaming builder for an on-disk index.
///
/// Files are fed one at a time; each contributes its distinct trigrams as
/// packed (trigram, file ID) pairs. When the in-memory pair buffer hits
/// its budget, it is radix-sorted and spilled to an unnamed temp file.
/// `flush` lays out the final file, merging the spilled runs and the
/// remaining buffer heap-wise into posting lists.
pub struct IndexWriter {
    /// Log a line for every file rejected by the text heuristics.
    pub log_skip: bool,
    /// Log per-file and flush progress.
    pub verbose: bool,

    trigram: SparseSet,
    paths: Vec<String>,

    name_data: BufFile,
    name_index: BufFile,
    num_name: u32,
    total_bytes: u64,

    post: Vec<PostEntry>,
    max_post: usize,
    post_files: Vec<File>,
    post_index: BufFile,

    sort_tmp: Vec<PostEntry>,
    sort_n: Vec<usize>,

    main: BufFile,
}

impl IndexWriter {
    /// Start writing an index to the given file.
    pub fn create(path: impl AsRef<Path>) -> Result<IndexWriter> {
        Ok(IndexWriter {
            log_skip: false,
            verbose: false,
            trigram: SparseSet::new(1 << 24),
            paths: Vec::new(),
            name_data: BufFile::temp()?,
            name_index: BufFile::temp()?,
            num_name: 0,
            total_bytes: 0,
            post: Vec::new(),
            max_post: NPOST,
            post_files: Vec::new(),
            post_index: BufFile::temp()?,
            sort_tmp: Vec::new(),
            sort_n: vec![0; 1 << SORT_K],
            main: BufFile::create(path.as_ref())?,
        })
    }

    /// Cap the in-memory posting buffer at n entries. Only useful for
    /// exercising the external merge on small inputs.
    pub fn set_max_post(&mut self, n: usize) {
        self.max_post = n.max(1);
    }

    /// Record the root paths this index covers.
    pub fn add_paths<I>(&mut self, paths: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
    }

    /// Open the named file and index its contents.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let f = File::open(path.as_ref())?;
        let name = path.as_ref().to_string_lossy().into_owned();
        self.add(&name, f)
    }

    /// Index the contents of one file, read from r, under the given name.
    /// Files failing the text heuristics are silently dropped; that is not
    /// an error.
    pub fn add(&mut self, name: &str, mut r: impl Read) -> Result<()> {
        self.trigram.reset();
        let mut buf = [0u8; 16384];
        let mut tv: u32 = 0;
        let mut n: u64 = 0;
        let mut line_len: usize = 0;
        let mut line_num: u64 = 1;
        loop {
            let nr = r.read(&mut buf)?;
            if nr == 0 {
                break;
            }
            for &c in &buf[..nr] {
                tv = (tv << 8) & ((1 << 24) - 1) | u32::from(c);
                n += 1;
                if n >= 3 {
                    self.trigram.add(tv);
                }
                if !valid_utf8_pair((tv >> 8) & 0xff, tv & 0xff) {
                    if self.log_skip {
                        info!("{}:{}: invalid UTF-8, ignoring", name, line_num);
                    }
                    return Ok(());
                }
                if n > MAX_FILE_LEN {
                    if self.log_skip {
                        info!("{}: file too long, ignoring", name);
                    }
                    return Ok(());
                }
                line_len += 1;
                if line_len > MAX_LINE_LEN {
                    if self.log_skip {
                        info!("{}:{}: line too long, ignoring", name, line_num);
                    }
                    return Ok(());
                }
                if c == b'\n' {
                    line_len = 0;
                    line_num += 1;
                }
            }
        }
        if self.trigram.len() > MAX_TEXT_TRIGRAMS {
            if self.log_skip {
                info!(
                    "{}: too many trigrams ({}), probably not text, ignoring",
                    name,
                    self.trigram.len()
                );
            }
            return Ok(());
        }
        self.total_bytes += n;

        if self.verbose {
            info!("{} {} {}", n, self.trigram.len(), name);
        }

        let file_id = self.add_name(name)?;
        for i in 0..self.trigram.len() {
            if self.post.len() >= self.max_post {
                self.flush_post()?;
            }
            let t = self.trigram.dense()[i];
            self.post.push(PostEntry::new(t, file_id));
        }
        Ok(())
    }

    fn add_name(&mut self, name: &str) -> Result<u32> {
        if name.as_bytes().contains(&0) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?}: file has NUL byte in name", name),
            )));
        }
        let off = self.name_data.offset()?;
        self.name_index.write_u32(off)?;
        self.name_data.write(name.as_bytes())?;
        self.name_data.write_u8(0)?;
        let id = self.num_name;
        self.num_name += 1;
        Ok(id)
    }

    /// Write the final index layout. The temp files backing the name, name
    /// index and posting regions are reclaimed when the writer drops.
    pub fn flush(mut self) -> Result<()> {
        self.add_name("")?;

        let mut off = [0u32; 5];
        self.main.write(MAGIC.as_bytes())?;
        off[0] = self.main.offset()?;
        for p in &self.paths {
            self.main.write(p.as_bytes())?;
            self.main.write_u8(0)?;
        }
        self.main.write_u8(0)?;
        off[1] = self.main.offset()?;
        self.main.copy_from(&mut self.name_data)?;
        off[2] = self.main.offset()?;
        self.merge_post()?;
        off[3] = self.main.offset()?;
        self.main.copy_from(&mut self.name_index)?;
        off[4] = self.main.offset()?;
        self.main.copy_from(&mut self.post_index)?;
        for v in off {
            self.main.write_u32(v)?;
        }
        self.main.write(TRAILER_MAGIC.as_bytes())?;

        info!(
            "{} data bytes, {} index bytes",
            self.total_bytes,
            self.main.offset()?
        );
        self.main.flush()
    }

    /// Sort the in-memory buffer and spill it to a fresh temp file.
    fn flush_post(&mut self) -> Result<()> {
        let mut f = tempfile::tempfile()?;
        if self.verbose {
            info!("flush {} entries to temp file", self.post.len());
        }
        self.sort_post();

        // Raw native-order entries; the same process reads them back.
        {
            let mut w = BufWriter::with_capacity(1 << 16, &mut f);
            for p in &self.post {
                w.write_all(&p.0.to_ne_bytes())?;
            }
            w.flush()?;
        }

        self.post.clear();
        self.post_files.push(f);
        Ok(())
    }

    // Radix sort on the 24-bit trigram key: two 12-bit counting passes.
    // The low 32 bits (file IDs) arrive in increasing order and counting
    // sort is stable, so entries stay sorted within a trigram. The scratch
    // buffer belongs to the writer and is reused across flushes.
    fn sort_post(&mut self) {
        let IndexWriter {
            post,
            sort_tmp,
            sort_n,
            ..
        } = self;
        let n = post.len();
        if sort_tmp.len() < n {
            sort_tmp.resize(n, PostEntry(0));
        }
        let tmp = &mut sort_tmp[..n];
        let mask = (1u64 << SORT_K) - 1;

        sort_n.iter_mut().for_each(|c| *c = 0);
        for p in post.iter() {
            sort_n[((p.0 >> 32) & mask) as usize] += 1;
        }
        let mut tot = 0;
        for c in sort_n.iter_mut() {
            let v = *c;
            *c = tot;
            tot += v;
        }
        for p in post.iter() {
            let r = ((p.0 >> 32) & mask) as usize;
            tmp[sort_n[r]] = *p;
            sort_n[r] += 1;
        }

        sort_n.iter_mut().for_each(|c| *c = 0);
        for p in tmp.iter() {
            sort_n[((p.0 >> (32 + SORT_K)) & mask) as usize] += 1;
        }
        let mut tot = 0;
        for c in sort_n.iter_mut() {
            let v = *c;
            *c = tot;
            tot += v;
        }
        for p in tmp.iter() {
            let r = ((p.0 >> (32 + SORT_K)) & mask) as usize;
            post[sort_n[r]] = *p;
            sort_n[r] += 1;
        }
    }

    /// Merge the spilled runs plus the in-memory tail into posting lists on
    /// the main file, building the posting-list index alongside.
    fn merge_post(&mut self) -> Result<()> {
        info!("merge {} files + mem", self.post_files.len());
        self.sort_post();

        let IndexWriter {
            post,
            post_files,
            post_index,
            main,
            ..
        } = self;

        let mut maps: Vec<Mmap> = Vec::with_capacity(post_files.len());
        for f in post_files.iter() {
            maps.push(unsafe { Mmap::map(f)? });
        }

        let mut heap: BinaryHeap<Reverse<PostChunk>> = BinaryHeap::new();
        for m in &maps {
            let mut src = PostSource::File(&m[..]);
            if let Some(e) = src.next() {
                heap.push(Reverse(PostChunk { e, src }));
            }
        }
        let mut src = PostSource::Mem(&post[..]);
        if let Some(e) = src.next() {
            heap.push(Reverse(PostChunk { e, src }));
        }

        let offset0 = main.offset()?;
        let mut e = heap_next(&mut heap);
        loop {
            let offset = main.offset()? - offset0;
            let trigram = e.trigram();

            // Posting list: trigram header, deltas, zero terminator.
            let mut file_id = u32::MAX;
            let mut nfile: u32 = 0;
            main.write_trigram(trigram)?;
            while e.trigram() == trigram && trigram != SENTINEL_TRIGRAM {
                main.write_uvarint(e.file_id().wrapping_sub(file_id))?;
                file_id = e.file_id();
                nfile += 1;
                e = heap_next(&mut heap);
            }
            main.write_uvarint(0)?;

            // The sentinel list closes the region and gets no index entry.
            if trigram == SENTINEL_TRIGRAM {
                break;
            }
            post_index.write_trigram(trigram)?;
            post_index.write_u32(nfile)?;
            post_index.write_u32(offset)?;
        }
        Ok(())
    }
}

/// One sorted run of post entries: a mapped temp file or the in-memory
/// tail.
enum PostSource<'a> {
    File(&'a [u8]),
    Mem(&'a [PostEntry]),
}

impl PostSource<'_> {
    fn next(&mut self) -> Option<PostEntry> {
        match self {
            PostSource::File(d) => {
                if d.len() < 8 {
                    return None;
                }
                let (head, rest) = d.split_at(8);
                *d = rest;
                Some(PostEntry(u64::from_ne_bytes(head.try_into().ok()?)))
            }
            PostSource::Mem(m) => {
                let (&head, rest) = m.split_first()?;
                *m = rest;
                Some(head)
            }
        }
    }
}

struct PostChunk<'a> {
    e: PostEntry,
    src: PostSource<'a>,
}

impl PartialEq for PostChunk<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.e == other.e
    }
}

impl Eq for PostChunk<'_> {}

impl PartialOrd for PostChunk<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PostChunk<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.e.cmp(&other.e)
    }
}

/// Pop the smallest entry across all runs; the sentinel when none remain.
fn heap_next(heap: &mut BinaryHeap<Reverse<PostChunk<'_>>>) -> PostEntry {
    match heap.pop() {
        None => PostEntry::new(SENTINEL_TRIGRAM, 0),
        Some(Reverse(mut ch)) => {
            let e = ch.e;
            if let Some(next) = ch.src.next() {
                ch.e = next;
                heap.push(Reverse(ch));
            }
            e
        }
    }
}

/// Whether the byte pair can appear in a valid UTF-8 stream.
fn valid_utf8_pair(c1: u32, c2: u32) -> bool {
    if c1 < 0x80 {
        // ASCII, must be followed by ASCII or the start of a multi-byte rune.
        c2 < 0x80 || (0xc0..0xf8).contains(&c2)
    } else if c1 < 0xc0 {
        // Continuation byte, can be followed by nearly anything.
        c2 < 0xf8
    } else if c1 < 0xf8 {
        // Start of a multi-byte rune, must be followed by a continuation.
        (0x80..0xc0).contains(&c2)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_entry_packs_trigram_high() {
        let e = PostEntry::new(0x616263, 7);
        assert_eq!(e.trigram(), 0x616263);
        assert_eq!(e.file_id(), 7);
        assert!(PostEntry::new(1, u32::MAX) < PostEntry::new(2, 0));
    }

    #[test]
    fn utf8_pair_table() {
        assert!(valid_utf8_pair(b'a'.into(), b'b'.into()));
        assert!(valid_utf8_pair(b'a'.into(), 0xc3));
        assert!(valid_utf8_pair(0xc3, 0xa9));
        assert!(!valid_utf8_pair(0xc3, b'x'.into()));
        assert!(!valid_utf8_pair(b'a'.into(), 0x80));
        assert!(!valid_utf8_pair(0xf8, b'a'.into()));
        assert!(!valid_utf8_pair(0xff, 0x80));
    }

    #[test]
    fn radix_sort_orders_and_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = IndexWriter::create(dir.path().join("index")).unwrap();
        w.post = vec![
            PostEntry::new(0xfffffe, 1),
            PostEntry::new(0x000001, 4),
            PostEntry::new(0xabcdef, 2),
            PostEntry::new(0x000001, 9),
            PostEntry::new(0xabcdef, 3),
        ];
        w.sort_post();
        let got: Vec<(u32, u32)> = w.post.iter().map(|p| (p.trigram(), p.file_id())).collect();
        assert_eq!(
            got,
            vec![
                (0x000001, 4),
                (0x000001, 9),
                (0xabcdef, 2),
                (0xabcdef, 3),
                (0xfffffe, 1),
            ]
        );
    }
}
