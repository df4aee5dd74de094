use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::{MinnowError, Result};
use crate::format::{FileHeader, TailIndex, FILE_HEADER_SIZE};

/// Random-access reader for minnow files.
///
/// # Open sequence
/// 1. Read the 40-byte file header (magic, version, counts, `tail_start`).
/// 2. Seek to `tail_start` and load the tail index and every group trailer.
/// 3. Recover the group count from the trailer sizes, keeping the first
///    candidate whose header and group ranges lie inside the data region.
///
/// # Access pattern
/// [`read_header`](Self::read_header) and
/// [`read_group_data`](Self::read_group_data) seek straight to the recorded
/// offset; nothing else in the file is touched. Turning group bytes back into
/// values is the job of the group's decoder, selected by
/// [`group_type`](Self::group_type).
pub struct Reader<R: Read + Seek> {
    inner: R,
    origin: u64,
    header: FileHeader,
    index: TailIndex,
    /// Offset of each group trailer, relative to the start of the file.
    trailer_offsets: Vec<u64>,
}

impl Reader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Read a minnow file starting at the current position of `inner`.
    pub fn new(mut inner: R) -> Result<Self> {
        let origin = inner.stream_position()?;

        // ── Read and validate header ────────────────────────────────────────
        let mut header_buf = [0u8; FILE_HEADER_SIZE as usize];
        inner.read_exact(&mut header_buf)?;
        let header = FileHeader::from_bytes(&header_buf);
        header.validate()?;

        // ── Load tail index and trailers ────────────────────────────────────
        let end = inner.seek(SeekFrom::End(0))?;
        let file_len = end.saturating_sub(origin);
        if header.tail_start > file_len {
            return Err(MinnowError::Format(format!(
                "tail_start {} is past the end of the file ({} bytes)",
                header.tail_start, file_len
            )));
        }
        inner.seek(SeekFrom::Start(origin + header.tail_start))?;
        let mut tail = Vec::with_capacity((file_len - header.tail_start) as usize);
        inner.read_to_end(&mut tail)?;

        let index = TailIndex::parse(&tail, &header)?;

        let mut trailer_offsets = Vec::with_capacity(index.group_count());
        let mut at = header.tail_start + index.encoded_len();
        for &size in &index.group_tail_sizes {
            trailer_offsets.push(at);
            at += size;
        }

        debug!(
            "opened minnow file: {} headers, {} groups, {} blocks",
            header.header_count,
            index.group_count(),
            header.block_count
        );
        Ok(Self {
            inner,
            origin,
            header,
            index,
            trailer_offsets,
        })
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.header
    }

    pub fn index(&self) -> &TailIndex {
        &self.index
    }

    pub fn header_count(&self) -> u64 {
        self.header.header_count
    }

    pub fn block_count(&self) -> u64 {
        self.header.block_count
    }

    pub fn group_count(&self) -> u64 {
        self.index.group_count() as u64
    }

    /// Read the raw bytes of header record `i`.
    pub fn read_header(&mut self, i: u64) -> Result<Vec<u8>> {
        let i = self.check("header", i, self.header_count())?;
        let start = self.index.header_start(i);
        let size = self.index.header_sizes[i];
        self.read_at(start, size)
    }

    /// Type tag of group `i`.
    pub fn group_type(&self, i: u64) -> Result<u64> {
        let i = self.check("group", i, self.group_count())?;
        Ok(self.index.group_types[i])
    }

    /// Read the data region of group `i` (every block, back to back).
    pub fn read_group_data(&mut self, i: u64) -> Result<Vec<u8>> {
        let i = self.check("group", i, self.group_count())?;
        let (start, size) = (self.index.group_offsets[i], self.index.group_data_sizes[i]);
        self.read_at(start, size)
    }

    /// Read `len` bytes starting `start` bytes into the data region of group `i`.
    pub fn read_group_range(&mut self, i: u64, start: u64, len: u64) -> Result<Vec<u8>> {
        let i = self.check("group", i, self.group_count())?;
        let size = self.index.group_data_sizes[i];
        if start.checked_add(len).map_or(true, |end| end > size) {
            return Err(MinnowError::OutOfRange {
                kind: "group byte",
                index: start.saturating_add(len),
                count: size,
            });
        }
        self.read_at(self.index.group_offsets[i] + start, len)
    }

    /// Read the trailer group `i` emitted at close.
    pub fn read_group_trailer(&mut self, i: u64) -> Result<Vec<u8>> {
        let i = self.check("group", i, self.group_count())?;
        let (start, size) = (self.trailer_offsets[i], self.index.group_tail_sizes[i]);
        self.read_at(start, size)
    }

    fn check(&self, kind: &'static str, index: u64, count: u64) -> Result<usize> {
        if index >= count {
            return Err(MinnowError::OutOfRange { kind, index, count });
        }
        Ok(index as usize)
    }

    fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(self.origin + offset))?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}
