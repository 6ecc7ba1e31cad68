use std::path::Path;

use crate::error::{Error, Result};

use super::buf::BufFile;
use super::codec::uvarint;
use super::reader::Index;
use super::{MAGIC, SENTINEL_TRIGRAM, TRAILER_MAGIC};

// Merging two indexes src1 and src2 (newer) into dst:
//
// Walk src2's path list and work out, for each path, the range of src1
// file IDs it shadows. The surviving ranges from both sides, laid end to
// end, define the mapping from old file IDs onto the dense new ID space.
// The path lists merge-sort together, dropping any path that has an
// already-kept path as a prefix. The name lists interleave in new-ID
// order while the name index is accumulated in a temp region, and the
// posting lists merge trigram-at-a-time with every file ID translated
// through the range table. Finally the two index regions are spliced in
// and the trailer written.

/// Half-open interval [lo, hi) of old file IDs mapping to
/// [new, new + hi - lo).
#[derive(Clone, Copy)]
struct IdRange {
    lo: u32,
    hi: u32,
    new: u32,
}

/// Create dst by merging the indexes src1 and src2. When both claim
/// responsibility for a path, src2 is assumed newer and wins.
pub fn merge(dst: impl AsRef<Path>, src1: impl AsRef<Path>, src2: impl AsRef<Path>) -> Result<()> {
    let ix1 = Index::open(src1)?;
    let ix2 = Index::open(src2)?;
    let paths1 = ix1.paths()?;
    let paths2 = ix2.paths()?;

    // Build the file ID maps.
    let mut i1: u32 = 0;
    let mut i2: u32 = 0;
    let mut new: u32 = 0;
    let mut map1: Vec<IdRange> = Vec::new();
    let mut map2: Vec<IdRange> = Vec::new();
    for path in &paths2 {
        let path = path.as_bytes();

        // Names from src1 sorting before this path are preserved.
        let old = i1;
        while i1 < ix1.num_names() && ix1.name_bytes(i1)? < path {
            i1 += 1;
        }
        let lo = i1;

        // The range claimed by the path ends at the successor of its last
        // byte.
        let mut limit = path.to_vec();
        if let Some(last) = limit.last_mut() {
            *last = last.wrapping_add(1);
        }
        while i1 < ix1.num_names() && ix1.name_bytes(i1)? < &limit[..] {
            i1 += 1;
        }

        if old < lo {
            map1.push(IdRange { lo: old, hi: lo, new });
            new += lo - old;
        }

        // src2's own names for this path must start exactly at i2; the
        // path walk leaves no gaps.
        if i2 < ix2.num_names() && ix2.name_bytes(i2)? < path {
            return Err(Error::Inconsistent("name before its claiming path"));
        }
        let lo2 = i2;
        while i2 < ix2.num_names() && ix2.name_bytes(i2)? < &limit[..] {
            i2 += 1;
        }
        let hi2 = i2;
        if lo2 < hi2 {
            map2.push(IdRange {
                lo: lo2,
                hi: hi2,
                new,
            });
            new += hi2 - lo2;
        }
    }
    if i1 < ix1.num_names() {
        map1.push(IdRange {
            lo: i1,
            hi: ix1.num_names(),
            new,
        });
        new += ix1.num_names() - i1;
    }
    if i2 < ix2.num_names() {
        return Err(Error::Inconsistent("names outside any claimed path"));
    }
    let num_name = new;

    let mut ix3 = BufFile::create(dst.as_ref())?;
    ix3.write(MAGIC.as_bytes())?;

    // Merged list of paths.
    let path_data = ix3.offset()?;
    let mut mi1 = 0;
    let mut mi2 = 0;
    let mut last: Vec<u8> = vec![0]; // not a prefix of anything
    while mi1 < paths1.len() || mi2 < paths2.len() {
        let p = if mi2 >= paths2.len() || (mi1 < paths1.len() && paths1[mi1] <= paths2[mi2]) {
            mi1 += 1;
            paths1[mi1 - 1].as_bytes()
        } else {
            mi2 += 1;
            paths2[mi2 - 1].as_bytes()
        };
        if p.starts_with(&last) {
            continue;
        }
        last = p.to_vec();
        ix3.write(p)?;
        ix3.write_u8(0)?;
    }
    ix3.write_u8(0)?;

    // Merged list of names, interleaved in new file ID order.
    let name_data = ix3.offset()?;
    let mut name_index_file = BufFile::temp()?;
    let mut new = 0u32;
    let mut mi1 = 0usize;
    let mut mi2 = 0usize;
    while new < num_name {
        if mi1 < map1.len() && map1[mi1].new == new {
            for i in map1[mi1].lo..map1[mi1].hi {
                name_index_file.write_u32(ix3.offset()? - name_data)?;
                ix3.write(ix1.name_bytes(i)?)?;
                ix3.write_u8(0)?;
                new += 1;
            }
            mi1 += 1;
        } else if mi2 < map2.len() && map2[mi2].new == new {
            for i in map2[mi2].lo..map2[mi2].hi {
                name_index_file.write_u32(ix3.offset()? - name_data)?;
                ix3.write(ix2.name_bytes(i)?)?;
                ix3.write_u8(0)?;
                new += 1;
            }
            mi2 += 1;
        } else {
            return Err(Error::Inconsistent("gap in merged file ID ranges"));
        }
    }
    if new * 4 != name_index_file.offset()? {
        return Err(Error::Inconsistent("name index does not match name count"));
    }
    name_index_file.write_u32(ix3.offset()? - name_data)?;
    ix3.write_u8(0)?; // name list ends with an empty name

    // Merged posting lists.
    let post_data = ix3.offset()?;
    let mut r1 = PostMapReader::new(&ix1, map1)?;
    let mut r2 = PostMapReader::new(&ix2, map2)?;
    let mut w = PostDataWriter::new(&mut ix3)?;
    loop {
        if r1.trigram < r2.trigram {
            w.trigram(r1.trigram)?;
            while r1.next_id()? {
                w.file_id(r1.file_id)?;
            }
            r1.next_trigram()?;
            w.end_trigram()?;
        } else if r2.trigram < r1.trigram {
            w.trigram(r2.trigram)?;
            while r2.next_id()? {
                w.file_id(r2.file_id)?;
            }
            r2.next_trigram()?;
            w.end_trigram()?;
        } else {
            if r1.trigram == u32::MAX {
                break;
            }
            w.trigram(r1.trigram)?;
            r1.next_id()?;
            r2.next_id()?;
            while r1.file_id < u32::MAX || r2.file_id < u32::MAX {
                if r1.file_id < r2.file_id {
                    w.file_id(r1.file_id)?;
                    r1.next_id()?;
                } else if r2.file_id < r1.file_id {
                    w.file_id(r2.file_id)?;
                    r2.next_id()?;
                } else {
                    return Err(Error::Inconsistent("file ID mapped from both inputs"));
                }
            }
            r1.next_trigram()?;
            r2.next_trigram()?;
            w.end_trigram()?;
        }
    }
    // Posting data ends with the sentinel trigram and an empty delta list.
    w.out.write_trigram(SENTINEL_TRIGRAM)?;
    w.out.write_uvarint(0)?;
    let mut post_index_file = w.post_index_file;

    // Splice in the name index and posting-list index, then the trailer.
    let name_index = ix3.offset()?;
    ix3.copy_from(&mut name_index_file)?;
    let post_index = ix3.offset()?;
    ix3.copy_from(&mut post_index_file)?;
    for v in [path_data, name_data, post_data, name_index, post_index] {
        ix3.write_u32(v)?;
    }
    ix3.write(TRAILER_MAGIC.as_bytes())?;
    ix3.flush()
}

/// Walks one index's posting lists in trigram order, translating old file
/// IDs through the range table and dropping IDs that fall in a shadowed
/// gap. `trigram == u32::MAX` means the index is exhausted.
struct PostMapReader<'a> {
    ix: &'a Index,
    id_map: Vec<IdRange>,
    tri_num: u32,
    trigram: u32,
    count: u32,
    d: &'a [u8],
    old_id: u32,
    file_id: u32,
    i: usize,
}

impl<'a> PostMapReader<'a> {
    fn new(ix: &'a Index, id_map: Vec<IdRange>) -> Result<PostMapReader<'a>> {
        let mut r = PostMapReader {
            ix,
            id_map,
            tri_num: 0,
            trigram: u32::MAX,
            count: 0,
            d: &[],
            old_id: u32::MAX,
            file_id: u32::MAX,
            i: 0,
        };
        r.load()?;
        Ok(r)
    }

    fn next_trigram(&mut self) -> Result<()> {
        self.tri_num += 1;
        self.load()
    }

    fn load(&mut self) -> Result<()> {
        if self.tri_num >= self.ix.num_posts() {
            self.trigram = u32::MAX;
            self.count = 0;
            self.file_id = u32::MAX;
            return Ok(());
        }
        let (trigram, count, offset) = self.ix.list_at(self.tri_num)?;
        self.trigram = trigram;
        self.count = count;
        if count == 0 {
            self.file_id = u32::MAX;
            return Ok(());
        }
        self.d = self.ix.post_list_deltas(offset)?;
        self.old_id = u32::MAX;
        self.i = 0;
        Ok(())
    }

    fn next_id(&mut self) -> Result<bool> {
        while self.count > 0 {
            self.count -= 1;
            let (delta, n) = match uvarint(self.d) {
                Some((delta, n)) if delta != 0 => (delta, n),
                _ => return Err(self.ix.corrupt()),
            };
            self.d = &self.d[n..];
            self.old_id = self.old_id.wrapping_add(delta);
            while self.i < self.id_map.len() && self.id_map[self.i].hi <= self.old_id {
                self.i += 1;
            }
            if self.i >= self.id_map.len() {
                self.count = 0;
                break;
            }
            if self.old_id < self.id_map[self.i].lo {
                continue;
            }
            self.file_id = self.id_map[self.i].new + self.old_id - self.id_map[self.i].lo;
            return Ok(true);
        }
        self.file_id = u32::MAX;
        Ok(false)
    }
}

/// Emits posting lists lazily: the trigram header is only written once the
/// list turns out to be non-empty, and empty lists get no index entry.
struct PostDataWriter<'a> {
    out: &'a mut BufFile,
    post_index_file: BufFile,
    base: u32,
    count: u32,
    offset: u32,
    last: u32,
    t: u32,
}

impl<'a> PostDataWriter<'a> {
    fn new(out: &'a mut BufFile) -> Result<PostDataWriter<'a>> {
        let base = out.offset()?;
        Ok(PostDataWriter {
            out,
            post_index_file: BufFile::temp()?,
            base,
            count: 0,
            offset: 0,
            last: u32::MAX,
            t: 0,
        })
    }

    fn trigram(&mut self, t: u32) -> Result<()> {
        self.offset = self.out.offset()?;
        self.count = 0;
        self.t = t;
        self.last = u32::MAX;
        Ok(())
    }

    fn file_id(&mut self, id: u32) -> Result<()> {
        if self.count == 0 {
            self.out.write_trigram(self.t)?;
        }
        self.out.write_uvarint(id.wrapping_sub(self.last))?;
        self.last = id;
        self.count += 1;
        Ok(())
    }

    fn end_trigram(&mut self) -> Result<()> {
        if self.count == 0 {
            return Ok(());
        }
        self.out.write_uvarint(0)?;
        self.post_index_file.write_trigram(self.t)?;
        self.post_index_file.write_u32(self.count)?;
        self.post_index_file.write_u32(self.offset - self.base)?;
        Ok(())
    }
}
