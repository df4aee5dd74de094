use std::io::Write;

use crate::error::Result;
use crate::value::Block;

/// One column-like series of data blocks sharing a binary layout.
///
/// Each `Group` implementation:
/// - Is identified by a stable numeric `group_type()` stored in the tail index;
///   readers pick the decoder from this tag alone and reject files carrying a
///   tag outside the released tag space (see `format::is_known_group_type`).
/// - Validates every block against its layout *before* writing anything. A
///   rejected block must leave both the stream and `data_bytes()` untouched.
/// - May accumulate per-block state (minimums, bit widths, statistics) in
///   `write_data` and emit it as a trailer from `write_tail`.
pub trait Group {
    /// Stable group type tag stored in the tail index.
    fn group_type(&self) -> u64;

    /// Human-readable variant name for logs and CLI display.
    fn name(&self) -> &'static str;

    /// Encode one block onto `out` and return the number of bytes written.
    fn write_data(&mut self, out: &mut dyn Write, block: Block<'_>) -> Result<u64>;

    /// Total bytes written by `write_data` so far.
    fn data_bytes(&self) -> u64;

    /// Exact size of the trailer `write_tail` will emit.
    fn tail_bytes(&self) -> u64;

    /// Emit exactly `tail_bytes()` bytes of group-specific metadata.
    fn write_tail(&mut self, out: &mut dyn Write) -> Result<()>;
}
