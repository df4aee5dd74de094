use std::io::Write;
use std::marker::PhantomData;

use minnow_core::{Block, Element, ElementKind, Group, MinnowError, Result, Values};

use crate::decode::GroupDecoder;

/// Group whose blocks are exactly `width` little-endian elements of `T`.
///
/// The layout is fully determined by the element type and width, so the
/// group emits no trailer. `start_block` is therefore not persisted: it is
/// kept for the caller that opened the group, and a reader derives a fixed
/// group's blocks from its data size and element width instead.
pub struct FixedWidthGroup<T: Element> {
    start_block: u64,
    width: usize,
    blocks: u64,
    data_bytes: u64,
    buf: Vec<u8>,
    _element: PhantomData<T>,
}

/// The reference variant: blocks of `N` int64 values.
pub type Int64Group = FixedWidthGroup<i64>;

impl<T: Element> FixedWidthGroup<T> {
    /// `start_block` is the global index the group's first block will get.
    pub fn new(start_block: u64, width: usize) -> Self {
        Self {
            start_block,
            width,
            blocks: 0,
            data_bytes: 0,
            buf: Vec::with_capacity(width * T::KIND.width()),
            _element: PhantomData,
        }
    }

    /// Global index of the group's first block, as given at construction.
    /// In-memory bookkeeping only; nothing in the file records it.
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// Elements per block.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    fn block_bytes(&self) -> u64 {
        (self.width * T::KIND.width()) as u64
    }
}

impl<T: Element> Group for FixedWidthGroup<T> {
    fn group_type(&self) -> u64 {
        T::KIND.group_type()
    }

    fn name(&self) -> &'static str {
        T::KIND.name()
    }

    fn write_data(&mut self, out: &mut dyn Write, block: Block<'_>) -> Result<u64> {
        let values = T::from_block(&block).ok_or_else(|| {
            MinnowError::Encoding(format!(
                "{} group cannot store a {} block",
                T::KIND,
                block.kind()
            ))
        })?;
        if values.len() != self.width {
            return Err(MinnowError::Encoding(format!(
                "block has {} elements but this {} group stores {} per block",
                values.len(),
                T::KIND,
                self.width
            )));
        }

        self.buf.clear();
        for &x in values {
            x.put_le(&mut self.buf);
        }
        out.write_all(&self.buf)?;

        let n = self.block_bytes();
        self.data_bytes += n;
        self.blocks += 1;
        Ok(n)
    }

    fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    fn tail_bytes(&self) -> u64 {
        0
    }

    fn write_tail(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

/// Decoder for every fixed-width group type.
///
/// Without a trailer the block boundaries are not recorded, so the group's
/// data decodes as one flat run of elements.
pub struct FixedWidthDecoder {
    kind: ElementKind,
}

impl FixedWidthDecoder {
    pub fn new(kind: ElementKind) -> Self {
        Self { kind }
    }

    fn decode_as<T: Element>(data: &[u8]) -> Values {
        let width = T::KIND.width();
        T::into_values(data.chunks_exact(width).map(T::get_le).collect())
    }
}

impl GroupDecoder for FixedWidthDecoder {
    fn group_type(&self) -> u64 {
        self.kind.group_type()
    }

    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn block_count(&self) -> Option<u64> {
        None
    }

    fn decode(&self, data: &[u8]) -> Result<Values> {
        if data.len() % self.kind.width() != 0 {
            return Err(MinnowError::Format(format!(
                "{} group holds {} bytes, not a whole number of {}-byte elements",
                self.kind,
                data.len(),
                self.kind.width()
            )));
        }
        Ok(match self.kind {
            ElementKind::I64 => Self::decode_as::<i64>(data),
            ElementKind::I32 => Self::decode_as::<i32>(data),
            ElementKind::I16 => Self::decode_as::<i16>(data),
            ElementKind::I8 => Self::decode_as::<i8>(data),
            ElementKind::U64 => Self::decode_as::<u64>(data),
            ElementKind::U32 => Self::decode_as::<u32>(data),
            ElementKind::U16 => Self::decode_as::<u16>(data),
            ElementKind::U8 => Self::decode_as::<u8>(data),
            ElementKind::F64 => Self::decode_as::<f64>(data),
            ElementKind::F32 => Self::decode_as::<f32>(data),
        })
    }

    fn decode_block(&self, _data: &[u8], local: u64) -> Result<Values> {
        Err(MinnowError::Format(format!(
            "{} groups do not record block boundaries (asked for block {})",
            self.kind, local
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int64_block_layout() {
        let mut g = Int64Group::new(0, 2);
        let mut out = Vec::new();
        assert_eq!(g.write_data(&mut out, Block::from(&[1i64, -2])).unwrap(), 16);
        assert_eq!(&out[..8], &1i64.to_le_bytes());
        assert_eq!(&out[8..], &(-2i64).to_le_bytes());
        assert_eq!(g.data_bytes(), 16);
        assert_eq!(g.tail_bytes(), 0);
        assert_eq!(g.group_type(), minnow_core::format::GROUP_INT64);
    }

    #[test]
    fn test_start_block_stays_out_of_the_file() {
        let mut g = FixedWidthGroup::<u8>::new(41, 2);
        let mut out = Vec::new();
        g.write_data(&mut out, Block::from(&[1u8, 2])).unwrap();
        assert_eq!(g.start_block(), 41);
        assert_eq!(out, vec![1, 2]);
        let mut trailer = Vec::new();
        g.write_tail(&mut trailer).unwrap();
        assert!(trailer.is_empty());
    }

    #[test]
    fn test_wrong_length_rejected_without_writing() {
        let mut g = FixedWidthGroup::<u16>::new(5, 3);
        let mut out = Vec::new();
        let err = g.write_data(&mut out, Block::from(&[1u16, 2])).unwrap_err();
        assert!(matches!(err, MinnowError::Encoding(_)));
        assert!(out.is_empty());
        assert_eq!(g.data_bytes(), 0);
        assert_eq!(g.blocks(), 0);
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut g = FixedWidthGroup::<f32>::new(0, 1);
        let mut out = Vec::new();
        let err = g.write_data(&mut out, Block::from(&[1.0f64])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("float32") && msg.contains("float64"), "got: {msg}");
        assert!(out.is_empty());
    }

    #[test]
    fn test_decoder_reads_every_element() {
        let mut g = FixedWidthGroup::<i16>::new(0, 2);
        let mut out = Vec::new();
        g.write_data(&mut out, Block::from(&[-3i16, 4])).unwrap();
        g.write_data(&mut out, Block::from(&[5i16, -6])).unwrap();

        let decoder = FixedWidthDecoder::new(ElementKind::I16);
        assert_eq!(decoder.decode(&out).unwrap(), Values::I16(vec![-3, 4, 5, -6]));
        assert!(decoder.decode(&out[..3]).is_err());
        assert!(decoder.decode_block(&out, 0).is_err());
    }
}
