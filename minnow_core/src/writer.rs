use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, trace, warn};

use crate::error::{MinnowError, Result, UsageError};
use crate::format::{FileHeader, TailIndex, FILE_HEADER_SIZE};
use crate::group::Group;
use crate::value::{Block, HeaderRecord};

/// Sequential writer for minnow files.
///
/// # Write contract
/// Call [`write_header`](Self::write_header) for metadata records and
/// [`open_group`](Self::open_group) followed by
/// [`write_data`](Self::write_data) for typed blocks, in any order. Data
/// always goes to the most recently opened group. Call
/// [`close`](Self::close) to append the tail index and group trailers and to
/// write back the final file header.
///
/// # Format layout written
/// ```text
/// [FILE HEADER: 40 bytes placeholder]
/// [HEADER 0] [HEADER 1] ...                ← verbatim records
/// [GROUP 0 BLOCKS] [GROUP 1 BLOCKS] ...    ← layout decided by each group
/// [TAIL INDEX: 6 u64 columns]
/// [GROUP 0 TRAILER] [GROUP 1 TRAILER] ...
/// ← seek back to 0, overwrite header with real values
/// ```
///
/// All offsets are relative to the stream position at construction, so a
/// file can be embedded in a larger stream.
pub struct Writer<W: Write + Seek> {
    out: W,
    /// Stream position of the file header.
    origin: u64,
    /// Current write position relative to `origin` (mirrors the stream cursor).
    position: u64,
    header_offsets: Vec<u64>,
    header_sizes: Vec<u64>,
    groups: Vec<Box<dyn Group>>,
    group_offsets: Vec<u64>,
    group_blocks: Vec<u64>,
    blocks: u64,
    /// Set after any I/O failure; the file is unrecoverable from then on.
    poisoned: bool,
    scratch: Vec<u8>,
}

impl Writer<BufWriter<File>> {
    /// Create a new minnow file at `path`, overwriting any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!("creating minnow file {}", path.display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Start a file at the current position of `out` by reserving the file
    /// header with a zero placeholder.
    pub fn new(mut out: W) -> Result<Self> {
        let origin = out.stream_position()?;
        // Placeholder header (overwritten in close())
        out.write_all(&FileHeader::placeholder().to_bytes())?;
        Ok(Self {
            out,
            origin,
            position: FILE_HEADER_SIZE,
            header_offsets: Vec::new(),
            header_sizes: Vec::new(),
            groups: Vec::new(),
            group_offsets: Vec::new(),
            group_blocks: Vec::new(),
            blocks: 0,
            poisoned: false,
            scratch: Vec::new(),
        })
    }

    pub fn header_count(&self) -> u64 {
        self.header_offsets.len() as u64
    }

    /// Total data blocks written across every group.
    pub fn block_count(&self) -> u64 {
        self.blocks
    }

    pub fn group_count(&self) -> u64 {
        self.groups.len() as u64
    }

    /// Current write position relative to the start of the file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Blocks written so far into each group, in group order.
    pub fn group_blocks(&self) -> &[u64] {
        &self.group_blocks
    }

    /// Append a header record and return its zero-based header index.
    pub fn write_header<R: HeaderRecord + ?Sized>(&mut self, record: &R) -> Result<u64> {
        self.check_usable()?;
        self.scratch.clear();
        record.encode(&mut self.scratch);

        let written = self.out.write_all(&self.scratch);
        self.io(written)?;
        let size = self.scratch.len() as u64;
        self.position += size;

        // The index records where each header ends, not where it starts.
        self.header_offsets.push(self.position);
        self.header_sizes.push(size);
        trace!("header {}: {} bytes ending at {}", self.header_offsets.len() - 1, size, self.position);
        Ok(self.header_count() - 1)
    }

    /// Start a new group at the current position and make it the target of
    /// subsequent [`write_data`](Self::write_data) calls. Returns the group index.
    pub fn open_group(&mut self, group: Box<dyn Group>) -> Result<u64> {
        self.check_usable()?;
        debug!(
            "opening group {} ({}, type {}) at offset {}, first block {}",
            self.groups.len(),
            group.name(),
            group.group_type(),
            self.position,
            self.blocks
        );
        self.groups.push(group);
        self.group_blocks.push(0);
        self.group_offsets.push(self.position);
        Ok(self.group_count() - 1)
    }

    /// Write one block into the current group and return its global block index.
    pub fn write_data<'a>(&mut self, block: impl Into<Block<'a>>) -> Result<u64> {
        self.check_usable()?;
        let block = block.into();
        let group_idx = self.groups.len().checked_sub(1).ok_or(UsageError::NoGroupOpen)?;
        let group = &mut self.groups[group_idx];

        let before = group.data_bytes();
        let mut counter = CountingWriter::new(&mut self.out);
        let result = group.write_data(&mut counter, block);
        let emitted = counter.written;

        let reported = match result {
            Ok(n) => n,
            Err(MinnowError::Io(e)) => return Err(self.poison(e)),
            Err(e) => {
                if emitted > 0 {
                    self.poisoned = true;
                    warn!("group {} failed after emitting {} bytes; writer poisoned", group_idx, emitted);
                }
                return Err(e);
            }
        };
        if reported != emitted || group.data_bytes() != before + emitted {
            self.poisoned = true;
            return Err(MinnowError::Contract(format!(
                "{} group {} reported {} bytes (data_bytes {} -> {}) but emitted {}",
                group.name(),
                group_idx,
                reported,
                before,
                group.data_bytes(),
                emitted
            )));
        }

        self.position += emitted;
        self.group_blocks[group_idx] += 1;
        self.blocks += 1;
        trace!("block {} in group {}: {} bytes", self.blocks - 1, group_idx, emitted);
        Ok(self.blocks - 1)
    }

    /// Write the tail index and group trailers, then seal the file by
    /// writing the final header.
    ///
    /// Returns the header that was written.
    pub fn close(self) -> Result<FileHeader> {
        self.finish().map(|(header, _)| header)
    }

    /// Like [`close`](Self::close) but hands back the underlying stream,
    /// positioned just past the last trailer byte.
    pub fn finish(mut self) -> Result<(FileHeader, W)> {
        self.check_usable()?;

        // ── Tail index ─────────────────────────────────────────────────────
        let tail_start = self.position;
        let index = TailIndex {
            header_offsets: std::mem::take(&mut self.header_offsets),
            header_sizes: std::mem::take(&mut self.header_sizes),
            group_offsets: std::mem::take(&mut self.group_offsets),
            group_data_sizes: self.groups.iter().map(|g| g.data_bytes()).collect(),
            group_tail_sizes: self.groups.iter().map(|g| g.tail_bytes()).collect(),
            group_types: self.groups.iter().map(|g| g.group_type()).collect(),
        };
        let header_count = index.header_count() as u64;
        self.out.write_all(&index.to_bytes())?;
        self.position += index.encoded_len();

        // ── Group trailers, in group order ─────────────────────────────────
        for (i, group) in self.groups.iter_mut().enumerate() {
            let expected = index.group_tail_sizes[i];
            let mut counter = CountingWriter::new(&mut self.out);
            group.write_tail(&mut counter)?;
            if counter.written != expected {
                return Err(MinnowError::Contract(format!(
                    "{} group {} declared a {}-byte trailer but wrote {}",
                    group.name(),
                    i,
                    expected,
                    counter.written
                )));
            }
            self.position += expected;
        }

        // ── Seek back to the origin and write the real header ──────────────
        let header = FileHeader::finished(header_count, self.blocks, tail_start);
        self.out.seek(SeekFrom::Start(self.origin))?;
        self.out.write_all(&header.to_bytes())?;
        self.out.seek(SeekFrom::Start(self.origin + self.position))?;
        self.out.flush()?;

        debug!(
            "closed minnow file: {} headers, {} groups, {} blocks, tail at {}, {} bytes total",
            header.header_count,
            index.group_count(),
            header.block_count,
            tail_start,
            self.position
        );
        Ok((header, self.out))
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(UsageError::Poisoned.into());
        }
        Ok(())
    }

    fn io<T>(&mut self, result: io::Result<T>) -> Result<T> {
        result.map_err(|e| self.poison(e))
    }

    fn poison(&mut self, e: io::Error) -> MinnowError {
        warn!("minnow writer poisoned by I/O failure: {}", e);
        self.poisoned = true;
        MinnowError::Io(e)
    }
}

/// The write surface shared by [`Writer`] and
/// [`StreamWriter`](crate::stream::StreamWriter), so group helpers and
/// tools can drive either one.
pub trait MinnowSink {
    fn header_count(&self) -> u64;

    fn block_count(&self) -> u64;

    fn write_header<R: HeaderRecord + ?Sized>(&mut self, record: &R) -> Result<u64>;

    fn open_group(&mut self, group: Box<dyn Group>) -> Result<u64>;

    fn write_data<'a>(&mut self, block: impl Into<Block<'a>>) -> Result<u64>;
}

impl<W: Write + Seek> MinnowSink for Writer<W> {
    fn header_count(&self) -> u64 {
        Writer::header_count(self)
    }

    fn block_count(&self) -> u64 {
        Writer::block_count(self)
    }

    fn write_header<R: HeaderRecord + ?Sized>(&mut self, record: &R) -> Result<u64> {
        Writer::write_header(self, record)
    }

    fn open_group(&mut self, group: Box<dyn Group>) -> Result<u64> {
        Writer::open_group(self, group)
    }

    fn write_data<'a>(&mut self, block: impl Into<Block<'a>>) -> Result<u64> {
        Writer::write_data(self, block)
    }
}

/// Counts the bytes a group actually pushes through to the stream.
struct CountingWriter<'w, W: Write> {
    inner: &'w mut W,
    written: u64,
}

impl<'w, W: Write> CountingWriter<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
