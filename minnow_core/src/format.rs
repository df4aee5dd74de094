use crate::error::{MinnowError, Result};

/// Format identifier stored in the first eight bytes of every finished file.
pub const MAGIC: u64 = 0xacedad;

/// Current on-disk format version.
pub const VERSION: u64 = 1;

/// Fixed size of the minnow file header in bytes.
///   magic:u64 + version:u64 + header_count:u64 + block_count:u64 + tail_start:u64
///   = 5 × 8 = 40
pub const FILE_HEADER_SIZE: u64 = 40;

/// Number of u64 sequences in the tail index.
pub const TAIL_COLUMNS: usize = 6;

// ── Group type tags ─────────────────────────────────────────────────────────
//
// The tag space is stable: readers dispatch on these values, so a tag is never
// reassigned once released.

pub const GROUP_INT64: u64 = 0;
pub const GROUP_INT32: u64 = 1;
pub const GROUP_INT16: u64 = 2;
pub const GROUP_INT8: u64 = 3;
pub const GROUP_UINT64: u64 = 4;
pub const GROUP_UINT32: u64 = 5;
pub const GROUP_UINT16: u64 = 6;
pub const GROUP_UINT8: u64 = 7;
pub const GROUP_FLOAT64: u64 = 8;
pub const GROUP_FLOAT32: u64 = 9;
/// Bit-packed int64 blocks with per-block minimums stored in the trailer.
pub const GROUP_INT: u64 = 10;
/// Quantized float blocks. Reserved; no bundled variant writes it yet.
pub const GROUP_FLOAT: u64 = 11;

/// Whether `tag` belongs to the released tag space.
pub fn is_known_group_type(tag: u64) -> bool {
    tag <= GROUP_FLOAT
}

// ── File header ─────────────────────────────────────────────────────────────

/// Decoded representation of the 40-byte file header.
///
/// The writer emits an all-zero placeholder when the file is created and
/// overwrites it in place at close, so both writes go through the same
/// fixed-size [`to_bytes`](Self::to_bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u64,
    pub version: u64,
    pub header_count: u64,
    pub block_count: u64,
    /// Absolute offset of the tail index (relative to the start of the file).
    pub tail_start: u64,
}

const _: () = assert!(FILE_HEADER_SIZE as usize == 5 * std::mem::size_of::<u64>());

impl FileHeader {
    /// The zero-valued header reserved at file creation.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// The header written at close.
    pub fn finished(header_count: u64, block_count: u64, tail_start: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            header_count,
            block_count,
            tail_start,
        }
    }

    /// Serialize to exactly `FILE_HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.header_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.block_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.tail_start.to_le_bytes());
        buf
    }

    /// Deserialize from `FILE_HEADER_SIZE` bytes without validating any field.
    pub fn from_bytes(buf: &[u8; FILE_HEADER_SIZE as usize]) -> Self {
        Self {
            magic: read_u64(buf, 0),
            version: read_u64(buf, 8),
            header_count: read_u64(buf, 16),
            block_count: read_u64(buf, 24),
            tail_start: read_u64(buf, 32),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }

    /// Check the magic and version of a header read back from disk.
    pub fn validate(&self) -> Result<()> {
        if self.is_placeholder() {
            return Err(MinnowError::Format(
                "file header is still the zero placeholder; the writer never closed".into(),
            ));
        }
        if self.magic != MAGIC {
            return Err(MinnowError::Format(format!(
                "bad magic 0x{:x}, expected 0x{:x}",
                self.magic, MAGIC
            )));
        }
        if self.version != VERSION {
            return Err(MinnowError::Format(format!(
                "unsupported version {} (only version {} is supported)",
                self.version, VERSION
            )));
        }
        if self.tail_start < FILE_HEADER_SIZE {
            return Err(MinnowError::Format(format!(
                "tail_start {} points inside the file header",
                self.tail_start
            )));
        }
        Ok(())
    }
}

// ── Tail index ──────────────────────────────────────────────────────────────

/// The six parallel sequences written at `tail_start`.
///
/// On disk they appear in field order, each as a run of little-endian u64s
/// with no length prefix: the header columns are `header_count` long (from the
/// file header) and the group columns share a length the reader recovers from
/// the trailer sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailIndex {
    /// End-of-write offset of each header record.
    pub header_offsets: Vec<u64>,
    pub header_sizes: Vec<u64>,
    /// Offset of the first data block of each group.
    pub group_offsets: Vec<u64>,
    pub group_data_sizes: Vec<u64>,
    pub group_tail_sizes: Vec<u64>,
    pub group_types: Vec<u64>,
}

impl TailIndex {
    pub fn header_count(&self) -> usize {
        self.header_offsets.len()
    }

    pub fn group_count(&self) -> usize {
        self.group_offsets.len()
    }

    /// Start offset of header record `i`.
    pub fn header_start(&self, i: usize) -> u64 {
        self.header_offsets[i] - self.header_sizes[i]
    }

    /// Bytes the index occupies on disk.
    pub fn encoded_len(&self) -> u64 {
        8 * (2 * self.header_count() as u64 + 4 * self.group_count() as u64)
    }

    /// Total bytes of every group trailer following the index.
    pub fn trailer_bytes(&self) -> u64 {
        self.group_tail_sizes.iter().sum()
    }

    /// Serialize the six columns back to back.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        for column in self.columns() {
            for v in column {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }

    fn columns(&self) -> [&[u64]; TAIL_COLUMNS] {
        [
            &self.header_offsets,
            &self.header_sizes,
            &self.group_offsets,
            &self.group_data_sizes,
            &self.group_tail_sizes,
            &self.group_types,
        ]
    }

    /// Parse the index from everything between `tail_start` and the end of
    /// the file (index followed by the group trailers).
    ///
    /// The group count is not stored, so every `G` for which the index plus
    /// the trailer sizes it declares exactly fill `buf` is a candidate. A
    /// column can satisfy that sum by coincidence, so the first candidate
    /// whose index also passes [`validate`](Self::validate) wins.
    pub fn parse(buf: &[u8], header: &FileHeader) -> Result<Self> {
        let header_bytes = header
            .header_count
            .checked_mul(16)
            .filter(|&n| n <= buf.len() as u64)
            .ok_or_else(|| {
                MinnowError::Format(format!(
                    "tail region of {} bytes cannot hold {} header entries",
                    buf.len(),
                    header.header_count
                ))
            })? as usize;
        let rest = (buf.len() - header_bytes) as u64;

        let mut rejected = None;
        for g in 0..=rest / 32 {
            let tails = read_u64s(buf, header_bytes + 16 * g as usize, g as usize);
            let fills = tails
                .iter()
                .try_fold(32 * g, |acc, &t| acc.checked_add(t))
                .is_some_and(|total| total == rest);
            if !fills {
                continue;
            }
            let index = Self::read_columns(buf, header.header_count as usize, g as usize);
            match index.validate(header) {
                Ok(()) => return Ok(index),
                Err(e) => rejected = Some(e),
            }
        }
        Err(rejected.unwrap_or_else(|| {
            MinnowError::Format("no group count makes the tail index and trailers fill the file".into())
        }))
    }

    fn read_columns(buf: &[u8], h: usize, g: usize) -> Self {
        let groups_at = 16 * h;
        Self {
            header_offsets: read_u64s(buf, 0, h),
            header_sizes: read_u64s(buf, 8 * h, h),
            group_offsets: read_u64s(buf, groups_at, g),
            group_data_sizes: read_u64s(buf, groups_at + 8 * g, g),
            group_tail_sizes: read_u64s(buf, groups_at + 16 * g, g),
            group_types: read_u64s(buf, groups_at + 24 * g, g),
        }
    }

    /// Check that every recorded range lies between the file header and
    /// `tail_start`, that groups do not overlap and carry released type tags,
    /// and that headers plus group data account for every byte before the
    /// tail.
    pub fn validate(&self, header: &FileHeader) -> Result<()> {
        let tail_start = header.tail_start;
        for i in 0..self.header_count() {
            let (end, size) = (self.header_offsets[i], self.header_sizes[i]);
            if size > end || end - size < FILE_HEADER_SIZE || end > tail_start {
                return Err(MinnowError::Format(format!(
                    "header {} range [{}, {}) lies outside the data region",
                    i,
                    end.saturating_sub(size),
                    end
                )));
            }
        }
        for i in 0..self.group_count() {
            let start = self.group_offsets[i];
            let limit = self.group_offsets.get(i + 1).copied().unwrap_or(tail_start);
            let end = start.checked_add(self.group_data_sizes[i]);
            if start < FILE_HEADER_SIZE || start > limit || end.map_or(true, |e| e > limit) {
                return Err(MinnowError::Format(format!(
                    "group {} at offset {} with {} data bytes overruns the next boundary {}",
                    i, start, self.group_data_sizes[i], limit
                )));
            }
            if !is_known_group_type(self.group_types[i]) {
                return Err(MinnowError::Format(format!(
                    "group {} has unknown type tag {}",
                    i, self.group_types[i]
                )));
            }
        }

        // The writer emits nothing but header records and group data between
        // the file header and the tail, so their sizes add up exactly.
        let accounted = self
            .header_sizes
            .iter()
            .chain(&self.group_data_sizes)
            .try_fold(FILE_HEADER_SIZE, |acc, &n| acc.checked_add(n));
        if accounted != Some(tail_start) {
            return Err(MinnowError::Format(format!(
                "headers and group data do not account for the {} bytes before the tail",
                tail_start
            )));
        }
        Ok(())
    }
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}

fn read_u64s(buf: &[u8], at: usize, n: usize) -> Vec<u64> {
    (0..n).map(|i| read_u64(buf, at + 8 * i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> TailIndex {
        TailIndex {
            header_offsets: vec![56, 64],
            header_sizes: vec![16, 8],
            group_offsets: vec![64, 128],
            group_data_sizes: vec![64, 32],
            group_tail_sizes: vec![0, 24],
            group_types: vec![GROUP_INT64, GROUP_INT],
        }
    }

    #[test]
    fn test_file_header_layout() {
        let header = FileHeader::finished(3, 7, 1000);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[8..16], &VERSION.to_le_bytes());
        assert_eq!(&bytes[16..24], &3u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &7u64.to_le_bytes());
        assert_eq!(&bytes[32..40], &1000u64.to_le_bytes());
        assert_eq!(FileHeader::from_bytes(&bytes), header);
        header.validate().unwrap();
    }

    #[test]
    fn test_placeholder_is_rejected() {
        let header = FileHeader::from_bytes(&FileHeader::placeholder().to_bytes());
        assert!(header.is_placeholder());
        let err = header.validate().unwrap_err().to_string();
        assert!(err.contains("placeholder"), "got: {err}");
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut header = FileHeader::finished(0, 0, 40);
        header.magic = 0xdead;
        assert!(matches!(header.validate(), Err(MinnowError::Format(_))));
    }

    #[test]
    fn test_tail_index_column_order() {
        let index = sample_index();
        let bytes = index.to_bytes();
        assert_eq!(bytes.len() as u64, index.encoded_len());
        let words = read_u64s(&bytes, 0, bytes.len() / 8);
        assert_eq!(words, vec![56, 64, 16, 8, 64, 128, 64, 32, 0, 24, GROUP_INT64, GROUP_INT]);
    }

    #[test]
    fn test_tail_index_recovers_group_count() {
        let index = sample_index();
        let mut tail = index.to_bytes();
        tail.extend_from_slice(&[0xAB; 24]);
        let parsed = TailIndex::parse(&tail, &FileHeader::finished(2, 3, 160)).unwrap();
        assert_eq!(parsed, index);
        assert_eq!(parsed.trailer_bytes(), 24);
    }

    #[test]
    fn test_tail_index_without_groups() {
        let index = TailIndex {
            header_offsets: vec![48],
            header_sizes: vec![8],
            ..Default::default()
        };
        let parsed = TailIndex::parse(&index.to_bytes(), &FileHeader::finished(1, 0, 48)).unwrap();
        assert_eq!(parsed.group_count(), 0);
        assert_eq!(parsed.header_start(0), 40);
    }

    #[test]
    fn test_tail_index_rejects_truncation() {
        let mut tail = sample_index().to_bytes();
        tail.extend_from_slice(&[0u8; 10]);
        assert!(TailIndex::parse(&tail, &FileHeader::finished(2, 3, 160)).is_err());
        assert!(TailIndex::parse(&[0u8; 8], &FileHeader::finished(1, 0, 48)).is_err());
    }

    #[test]
    fn test_validate_catches_overlapping_groups() {
        let header = FileHeader::finished(2, 3, 160);
        let mut index = sample_index();
        index.validate(&header).unwrap();
        index.group_data_sizes[0] = 65;
        assert!(index.validate(&header).is_err());
    }

    #[test]
    fn test_coincidental_group_count_is_skipped() {
        // Two 32-byte groups. Read as one group, the data-size column looks
        // like a 32-byte trailer and the sizes fill the tail exactly.
        let index = TailIndex {
            group_offsets: vec![40, 72],
            group_data_sizes: vec![32, 32],
            group_tail_sizes: vec![0, 0],
            group_types: vec![GROUP_INT64, GROUP_INT64],
            ..Default::default()
        };
        let header = FileHeader::finished(0, 2, 104);
        let parsed = TailIndex::parse(&index.to_bytes(), &header).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_validate_rejects_unknown_tags() {
        let header = FileHeader::finished(2, 3, 160);
        let mut index = sample_index();
        index.group_types[1] = 4242;
        let err = index.validate(&header).unwrap_err().to_string();
        assert!(err.contains("4242"), "got: {err}");
    }

    #[test]
    fn test_validate_requires_exact_byte_accounting() {
        let mut index = sample_index();
        index.group_data_sizes[1] = 16;
        // Fits inside every boundary but leaves 16 bytes unaccounted for.
        assert!(index.validate(&FileHeader::finished(2, 3, 160)).is_err());
        index.validate(&FileHeader::finished(2, 3, 144)).unwrap();
    }
}
