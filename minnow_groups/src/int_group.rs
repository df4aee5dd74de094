use std::io::Write;

use log::debug;
use minnow_core::format::GROUP_INT;
use minnow_core::{Block, Group, MinnowError, Result, Values};

use crate::bit;
use crate::decode::GroupDecoder;

/// Bytes of the fixed trailer prefix: width, start_block, blocks.
const TAIL_PREFIX: u64 = 24;
/// Bytes in front of each packed trailer column: base, bits.
const COLUMN_PREFIX: u64 = 16;

/// Group of int64 blocks stored as bit-packed offsets from the block minimum.
///
/// Each block of `width` values costs `ceil(bits * width / 8)` bytes where
/// `bits` is the precision needed for `max - min` of that block. The per-block
/// minimums and bit widths go into the trailer:
///
/// ```text
/// [width:u64][start_block:u64][blocks:u64]
/// [mins column: base:i64, bits:u64, packed (min - base) values]
/// [bits column: base:i64, bits:u64, packed (bits - base) values]
/// ```
pub struct IntGroup {
    start_block: u64,
    width: usize,
    mins: Vec<i64>,
    bits: Vec<i64>,
    data_bytes: u64,
    scratch: Vec<u64>,
    buf: Vec<u8>,
}

impl IntGroup {
    pub fn new(start_block: u64, width: usize) -> Self {
        Self {
            start_block,
            width,
            mins: Vec::new(),
            bits: Vec::new(),
            data_bytes: 0,
            scratch: Vec::with_capacity(width),
            buf: Vec::new(),
        }
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn blocks(&self) -> u64 {
        self.mins.len() as u64
    }
}

impl Group for IntGroup {
    fn group_type(&self) -> u64 {
        GROUP_INT
    }

    fn name(&self) -> &'static str {
        "int"
    }

    fn write_data(&mut self, out: &mut dyn Write, block: Block<'_>) -> Result<u64> {
        let Block::I64(values) = block else {
            return Err(MinnowError::Encoding(format!(
                "int group cannot store a {} block",
                block.kind()
            )));
        };
        if values.len() != self.width {
            return Err(MinnowError::Encoding(format!(
                "block has {} elements but this int group stores {} per block",
                values.len(),
                self.width
            )));
        }

        let (min, bits) = column_params(values);
        self.scratch.clear();
        self.scratch
            .extend(values.iter().map(|&x| x.wrapping_sub(min) as u64));
        self.buf.clear();
        bit::pack(bits, &self.scratch, &mut self.buf);
        out.write_all(&self.buf)?;

        let n = self.buf.len() as u64;
        self.mins.push(min);
        self.bits.push(bits as i64);
        self.data_bytes += n;
        Ok(n)
    }

    fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    fn tail_bytes(&self) -> u64 {
        TAIL_PREFIX + column_bytes(&self.mins) + column_bytes(&self.bits)
    }

    fn write_tail(&mut self, out: &mut dyn Write) -> Result<()> {
        let mut buf = Vec::with_capacity(self.tail_bytes() as usize);
        buf.extend_from_slice(&(self.width as u64).to_le_bytes());
        buf.extend_from_slice(&self.start_block.to_le_bytes());
        buf.extend_from_slice(&self.blocks().to_le_bytes());
        put_column(&self.mins, &mut buf);
        put_column(&self.bits, &mut buf);
        debug!(
            "int group trailer: {} blocks from {}, {} bytes",
            self.blocks(),
            self.start_block,
            buf.len()
        );
        out.write_all(&buf)?;
        Ok(())
    }
}

/// Minimum of `values` and the bits needed for `max - min`.
fn column_params(values: &[i64]) -> (i64, u32) {
    let min = values.iter().copied().min().unwrap_or(0);
    let max = values.iter().copied().max().unwrap_or(0);
    (min, bit::precision_needed(max.wrapping_sub(min) as u64))
}

fn column_bytes(values: &[i64]) -> u64 {
    let (_, bits) = column_params(values);
    COLUMN_PREFIX + bit::array_bytes(bits, values.len() as u64)
}

fn put_column(values: &[i64], out: &mut Vec<u8>) {
    let (base, bits) = column_params(values);
    out.extend_from_slice(&base.to_le_bytes());
    out.extend_from_slice(&(bits as u64).to_le_bytes());
    let offsets: Vec<u64> = values.iter().map(|&x| x.wrapping_sub(base) as u64).collect();
    bit::pack(bits, &offsets, out);
}

/// Read a packed column of `n` values; returns the values and bytes consumed.
fn read_column(bytes: &[u8], n: u64) -> Result<(Vec<i64>, usize)> {
    if (bytes.len() as u64) < COLUMN_PREFIX {
        return Err(MinnowError::Format("int group trailer column is truncated".into()));
    }
    let base = read_u64(bytes, 0) as i64;
    let bits = u32::try_from(read_u64(bytes, 8))
        .map_err(|_| MinnowError::Format("int group column bit width out of range".into()))?;
    let packed = &bytes[COLUMN_PREFIX as usize..];
    let used = COLUMN_PREFIX + bit::checked_array_bytes(bits, n)?;
    let values = bit::unpack(bits, n, packed)?
        .into_iter()
        .map(|v| (v as i64).wrapping_add(base))
        .collect();
    Ok((values, used as usize))
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Decoder rebuilt from an int group's trailer.
#[derive(Debug, Clone)]
pub struct IntGroupDecoder {
    width: u64,
    start_block: u64,
    mins: Vec<i64>,
    bits: Vec<u32>,
    /// Byte offset of each block inside the group's data region, plus the end.
    offsets: Vec<u64>,
}

impl IntGroupDecoder {
    /// Rebuild the block layout from `trailer`. `file_blocks` is the block
    /// count of the whole file; the group's blocks must fit inside it.
    pub fn from_trailer(trailer: &[u8], file_blocks: u64) -> Result<Self> {
        if (trailer.len() as u64) < TAIL_PREFIX {
            return Err(MinnowError::Format(format!(
                "int group trailer is {} bytes, need at least {}",
                trailer.len(),
                TAIL_PREFIX
            )));
        }
        let width = read_u64(trailer, 0);
        let start_block = read_u64(trailer, 8);
        let blocks = read_u64(trailer, 16);
        if start_block.checked_add(blocks).map_or(true, |end| end > file_blocks) {
            return Err(MinnowError::Format(format!(
                "int group claims blocks {}..{}+{} but the file holds {}",
                start_block, start_block, blocks, file_blocks
            )));
        }

        let mut at = TAIL_PREFIX as usize;
        let (mins, used) = read_column(&trailer[at..], blocks)?;
        at += used;
        let (raw_bits, used) = read_column(&trailer[at..], blocks)?;
        at += used;
        if at != trailer.len() {
            return Err(MinnowError::Format(format!(
                "int group trailer has {} unexpected bytes",
                trailer.len() - at
            )));
        }

        let bits = raw_bits
            .into_iter()
            .map(|b| u32::try_from(b).ok().filter(|&b| b <= 64))
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(|| MinnowError::Format("int group block bit width out of range".into()))?;

        let mut offsets = Vec::with_capacity(bits.len() + 1);
        let mut total = 0u64;
        offsets.push(0);
        for &b in &bits {
            total = bit::checked_array_bytes(b, width)?
                .checked_add(total)
                .ok_or_else(|| MinnowError::Format("int group data size overflows".into()))?;
            offsets.push(total);
        }

        Ok(Self {
            width,
            start_block,
            mins,
            bits,
            offsets,
        })
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    /// Global index of the group's first block.
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// Byte range of block `local` inside the group's data region.
    pub fn block_span(&self, local: u64) -> Result<(u64, u64)> {
        let i = local as usize;
        if local >= self.mins.len() as u64 {
            return Err(MinnowError::OutOfRange {
                kind: "block",
                index: local,
                count: self.mins.len() as u64,
            });
        }
        Ok((self.offsets[i], self.offsets[i + 1] - self.offsets[i]))
    }

    /// Decode one block from exactly its own bytes.
    pub fn decode_block_bytes(&self, local: u64, bytes: &[u8]) -> Result<Vec<i64>> {
        let (_, len) = self.block_span(local)?;
        if bytes.len() as u64 != len {
            return Err(MinnowError::Format(format!(
                "int block {} is {} bytes, expected {}",
                local,
                bytes.len(),
                len
            )));
        }
        let i = local as usize;
        let min = self.mins[i];
        Ok(bit::unpack(self.bits[i], self.width, bytes)?
            .into_iter()
            .map(|v| (v as i64).wrapping_add(min))
            .collect())
    }

    fn data_len(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }
}

impl GroupDecoder for IntGroupDecoder {
    fn group_type(&self) -> u64 {
        GROUP_INT
    }

    fn name(&self) -> &'static str {
        "int"
    }

    fn block_count(&self) -> Option<u64> {
        Some(self.mins.len() as u64)
    }

    fn decode(&self, data: &[u8]) -> Result<Values> {
        if data.len() as u64 != self.data_len() {
            return Err(MinnowError::Format(format!(
                "int group data is {} bytes but its trailer describes {}",
                data.len(),
                self.data_len()
            )));
        }
        let mut values = Vec::new();
        (self.mins.len() as u64)
            .checked_mul(self.width)
            .and_then(|n| usize::try_from(n).ok())
            .and_then(|n| values.try_reserve_exact(n).ok())
            .ok_or_else(|| {
                MinnowError::Format(format!(
                    "{} blocks of {} values cannot be decoded in memory",
                    self.mins.len(),
                    self.width
                ))
            })?;
        for local in 0..self.mins.len() as u64 {
            let (start, len) = self.block_span(local)?;
            let bytes = &data[start as usize..(start + len) as usize];
            values.extend(self.decode_block_bytes(local, bytes)?);
        }
        Ok(Values::I64(values))
    }

    fn decode_block(&self, data: &[u8], local: u64) -> Result<Values> {
        let (start, len) = self.block_span(local)?;
        let bytes = data
            .get(start as usize..(start + len) as usize)
            .ok_or_else(|| MinnowError::Format(format!("int block {} lies past the group data", local)))?;
        Ok(Values::I64(self.decode_block_bytes(local, bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_blocks(g: &mut IntGroup, blocks: &[&[i64]]) -> Vec<u8> {
        let mut out = Vec::new();
        for b in blocks {
            g.write_data(&mut out, Block::I64(b)).unwrap();
        }
        out
    }

    #[test]
    fn test_packs_offsets_from_block_minimum() {
        let mut g = IntGroup::new(0, 4);
        let data = write_blocks(&mut g, &[&[100, 101, 102, 103]]);
        // range 3 → 2 bits × 4 values = 1 byte
        assert_eq!(data, vec![0b11_10_01_00]);
        assert_eq!(g.data_bytes(), 1);
    }

    #[test]
    fn test_constant_block_costs_nothing() {
        let mut g = IntGroup::new(0, 3);
        let data = write_blocks(&mut g, &[&[7, 7, 7]]);
        assert!(data.is_empty());
        assert_eq!(g.blocks(), 1);
    }

    #[test]
    fn test_trailer_size_is_exact_and_decodes() {
        let blocks: [&[i64]; 3] = [&[-5, 0, 5], &[i64::MIN, i64::MAX, 0], &[42, 42, 43]];
        let mut g = IntGroup::new(9, 3);
        let data = write_blocks(&mut g, &blocks);

        let mut trailer = Vec::new();
        g.write_tail(&mut trailer).unwrap();
        assert_eq!(trailer.len() as u64, g.tail_bytes());

        let decoder = IntGroupDecoder::from_trailer(&trailer, 12).unwrap();
        assert_eq!(decoder.start_block(), 9);
        assert_eq!(decoder.block_count(), Some(3));
        let expected: Vec<i64> = blocks.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(decoder.decode(&data).unwrap(), Values::I64(expected));
        assert_eq!(decoder.decode_block(&data, 1).unwrap(), Values::I64(vec![i64::MIN, i64::MAX, 0]));
        assert!(decoder.decode_block(&data, 3).is_err());
    }

    #[test]
    fn test_empty_group_trailer() {
        let mut g = IntGroup::new(0, 8);
        let mut trailer = Vec::new();
        g.write_tail(&mut trailer).unwrap();
        assert_eq!(trailer.len() as u64, TAIL_PREFIX + 2 * COLUMN_PREFIX);
        let decoder = IntGroupDecoder::from_trailer(&trailer, 0).unwrap();
        assert_eq!(decoder.decode(&[]).unwrap(), Values::I64(vec![]));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let mut g = IntGroup::new(0, 2);
        let mut out = Vec::new();
        assert!(matches!(
            g.write_data(&mut out, Block::I64(&[1, 2, 3])),
            Err(MinnowError::Encoding(_))
        ));
        assert!(matches!(
            g.write_data(&mut out, Block::U64(&[1, 2])),
            Err(MinnowError::Encoding(_))
        ));
        assert!(out.is_empty());
        assert_eq!(g.data_bytes(), 0);
    }

    #[test]
    fn test_truncated_trailer_rejected() {
        let mut g = IntGroup::new(0, 2);
        write_blocks(&mut g, &[&[1, 9]]);
        let mut trailer = Vec::new();
        g.write_tail(&mut trailer).unwrap();
        assert!(IntGroupDecoder::from_trailer(&trailer[..trailer.len() - 1], 1).is_err());
        assert!(IntGroupDecoder::from_trailer(&trailer[..10], 1).is_err());
    }

    /// Trailer with the given prefix and two empty-payload columns.
    fn raw_trailer(width: u64, start: u64, blocks: u64, column_bits: u64) -> Vec<u8> {
        let mut t = Vec::new();
        for v in [width, start, blocks, 0, column_bits, 0, column_bits] {
            t.extend_from_slice(&v.to_le_bytes());
        }
        t
    }

    #[test]
    fn test_malformed_trailer_is_format_error() {
        // More blocks than the file holds.
        let err = IntGroupDecoder::from_trailer(&raw_trailer(4, 0, 1 << 60, 0), 100).unwrap_err();
        assert!(matches!(err, MinnowError::Format(_)), "got {err:?}");
        // Block range past the end of the global index space.
        assert!(IntGroupDecoder::from_trailer(&raw_trailer(4, 2, u64::MAX, 0), u64::MAX).is_err());
        // Zero-bit columns cannot be materialized for that many blocks.
        let err = IntGroupDecoder::from_trailer(&raw_trailer(4, 0, 1 << 60, 0), u64::MAX).unwrap_err();
        assert!(matches!(err, MinnowError::Format(_)), "got {err:?}");
        // Packed column size overflows.
        let err = IntGroupDecoder::from_trailer(&raw_trailer(4, 0, u64::MAX, 64), u64::MAX).unwrap_err();
        assert!(matches!(err, MinnowError::Format(_)), "got {err:?}");
    }

    #[test]
    fn test_huge_width_is_format_error() {
        // One constant block claiming u64::MAX values: the data region is
        // empty, but the values cannot be decoded in memory.
        let decoder = IntGroupDecoder::from_trailer(&raw_trailer(u64::MAX, 0, 1, 0), 1).unwrap();
        assert!(matches!(decoder.decode(&[]), Err(MinnowError::Format(_))));
        assert!(matches!(decoder.decode_block(&[], 0), Err(MinnowError::Format(_))));
    }
}
