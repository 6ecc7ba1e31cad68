use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::codec::put_uvarint;

const BUF_CAP: usize = 256 << 10;

/// Buffered writer over a file that knows its current byte offset.
///
/// Offsets are u32 on purpose: the on-disk format cannot address past
/// 4 GiB, and crossing that line surfaces as `Error::TooLarge` at the next
/// region boundary. Scratch regions (`temp`) use unnamed temp files that
/// the OS reclaims when the handle drops, on success and error paths alike.
pub(crate) struct BufFile {
    name: PathBuf,
    file: File,
    buf: Vec<u8>,
    written: u64,
}

impl BufFile {
    pub fn create(path: &Path) -> Result<BufFile> {
        let file = File::create(path)?;
        Ok(BufFile {
            name: path.to_path_buf(),
            file,
            buf: Vec::with_capacity(BUF_CAP),
            written: 0,
        })
    }

    pub fn temp() -> Result<BufFile> {
        let file = tempfile::tempfile()?;
        Ok(BufFile {
            name: PathBuf::from("<temp>"),
            file,
            buf: Vec::with_capacity(BUF_CAP),
            written: 0,
        })
    }

    pub fn write(&mut self, x: &[u8]) -> Result<()> {
        if self.buf.len() + x.len() > BUF_CAP {
            self.flush()?;
            if x.len() >= BUF_CAP {
                self.file.write_all(x)?;
                self.written += x.len() as u64;
                return Ok(());
            }
        }
        self.buf.extend_from_slice(x);
        Ok(())
    }

    pub fn write_u8(&mut self, x: u8) -> Result<()> {
        if self.buf.len() >= BUF_CAP {
            self.flush()?;
        }
        self.buf.push(x);
        Ok(())
    }

    /// Write a 4-byte big-endian value.
    pub fn write_u32(&mut self, x: u32) -> Result<()> {
        self.write(&x.to_be_bytes())
    }

    /// Write the low 24 bits as three big-endian bytes.
    pub fn write_trigram(&mut self, t: u32) -> Result<()> {
        self.write(&[(t >> 16) as u8, (t >> 8) as u8, t as u8])
    }

    pub fn write_uvarint(&mut self, x: u32) -> Result<()> {
        let mut tmp = [0u8; 5];
        let n = put_uvarint(&mut tmp, x);
        self.write(&tmp[..n])
    }

    /// Current logical write offset.
    pub fn offset(&self) -> Result<u32> {
        let off = self.written + self.buf.len() as u64;
        u32::try_from(off).map_err(|_| Error::TooLarge(self.name.clone()))
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buf)?;
        self.written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Flush src and append its full contents here.
    pub fn copy_from(&mut self, src: &mut BufFile) -> Result<()> {
        self.flush()?;
        src.flush()?;
        src.file.seek(SeekFrom::Start(0))?;
        let n = io::copy(&mut src.file, &mut self.file)?;
        self.written += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_tracks_buffered_and_flushed_bytes() {
        let mut b = BufFile::temp().unwrap();
        assert_eq!(b.offset().unwrap(), 0);
        b.write(b"csearch").unwrap();
        assert_eq!(b.offset().unwrap(), 7);
        b.flush().unwrap();
        b.write_u32(0xdead_beef).unwrap();
        b.write_u8(0).unwrap();
        assert_eq!(b.offset().unwrap(), 12);
    }

    #[test]
    fn copy_from_appends_whole_region() {
        let mut a = BufFile::temp().unwrap();
        let mut b = BufFile::temp().unwrap();
        a.write(b"abc").unwrap();
        b.write(b"defg").unwrap();
        a.copy_from(&mut b).unwrap();
        assert_eq!(a.offset().unwrap(), 7);
    }
}
