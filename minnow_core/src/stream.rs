use std::io::{Cursor, Write};

use log::debug;

use crate::error::Result;
use crate::format::FileHeader;
use crate::group::Group;
use crate::value::{Block, HeaderRecord};
use crate::writer::{MinnowSink, Writer};

/// Writer for targets that cannot seek (pipes, sockets, stdout).
///
/// The file is staged in memory and emitted to the sink in one pass at
/// [`close`](Self::close), so the file header is written exactly once at the
/// true start instead of being patched afterwards.
pub struct StreamWriter<W: Write> {
    staged: Writer<Cursor<Vec<u8>>>,
    sink: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(sink: W) -> Result<Self> {
        Ok(Self {
            staged: Writer::new(Cursor::new(Vec::new()))?,
            sink,
        })
    }

    pub fn header_count(&self) -> u64 {
        self.staged.header_count()
    }

    pub fn block_count(&self) -> u64 {
        self.staged.block_count()
    }

    pub fn group_count(&self) -> u64 {
        self.staged.group_count()
    }

    /// Bytes staged so far.
    pub fn position(&self) -> u64 {
        self.staged.position()
    }

    pub fn write_header<R: HeaderRecord + ?Sized>(&mut self, record: &R) -> Result<u64> {
        self.staged.write_header(record)
    }

    pub fn open_group(&mut self, group: Box<dyn Group>) -> Result<u64> {
        self.staged.open_group(group)
    }

    pub fn write_data<'a>(&mut self, block: impl Into<Block<'a>>) -> Result<u64> {
        self.staged.write_data(block)
    }

    /// Finalize the staged file and copy it to the sink.
    pub fn close(self) -> Result<FileHeader> {
        self.finish().map(|(header, _)| header)
    }

    /// Like [`close`](Self::close) but hands back the sink.
    pub fn finish(mut self) -> Result<(FileHeader, W)> {
        let (header, staged) = self.staged.finish()?;
        let bytes = staged.into_inner();
        self.sink.write_all(&bytes)?;
        self.sink.flush()?;
        debug!("streamed {} staged bytes to sink", bytes.len());
        Ok((header, self.sink))
    }
}

impl<W: Write> MinnowSink for StreamWriter<W> {
    fn header_count(&self) -> u64 {
        StreamWriter::header_count(self)
    }

    fn block_count(&self) -> u64 {
        StreamWriter::block_count(self)
    }

    fn write_header<R: HeaderRecord + ?Sized>(&mut self, record: &R) -> Result<u64> {
        StreamWriter::write_header(self, record)
    }

    fn open_group(&mut self, group: Box<dyn Group>) -> Result<u64> {
        StreamWriter::open_group(self, group)
    }

    fn write_data<'a>(&mut self, block: impl Into<Block<'a>>) -> Result<u64> {
        StreamWriter::write_data(self, block)
    }
}
