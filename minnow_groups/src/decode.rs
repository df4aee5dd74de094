use minnow_core::format::{GROUP_FLOAT, GROUP_INT};
use minnow_core::{ElementKind, MinnowError, Result, Values};

use crate::fixed::FixedWidthDecoder;
use crate::int_group::IntGroupDecoder;

/// Turns a group's data region back into typed values.
pub trait GroupDecoder {
    fn group_type(&self) -> u64;

    fn name(&self) -> &'static str;

    /// Number of blocks, when the group records its block boundaries.
    fn block_count(&self) -> Option<u64>;

    /// Decode every block in `data` (the group's whole data region).
    fn decode(&self, data: &[u8]) -> Result<Values>;

    /// Decode block `local` (zero-based within the group) out of the whole
    /// data region.
    fn decode_block(&self, data: &[u8], local: u64) -> Result<Values>;
}

/// Resolve a decoder from a group's on-disk type tag and trailer.
///
/// Called by tools opening an existing file, so each group is decoded by the
/// variant that wrote it. `file_blocks` is the block count from the file
/// header and bounds any block count a trailer declares.
pub fn decoder_for(
    group_type: u64,
    trailer: &[u8],
    file_blocks: u64,
) -> Result<Box<dyn GroupDecoder>> {
    if let Some(kind) = ElementKind::from_group_type(group_type) {
        if !trailer.is_empty() {
            return Err(MinnowError::Format(format!(
                "{} group carries a {}-byte trailer; fixed-width groups have none",
                kind,
                trailer.len()
            )));
        }
        return Ok(Box::new(FixedWidthDecoder::new(kind)));
    }
    match group_type {
        GROUP_INT => Ok(Box::new(IntGroupDecoder::from_trailer(trailer, file_blocks)?)),
        GROUP_FLOAT => Err(MinnowError::Format(
            "quantized float groups are not supported by this release".into(),
        )),
        other => Err(MinnowError::Format(format!("unknown group type {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minnow_core::format::{GROUP_FLOAT32, GROUP_UINT8};

    #[test]
    fn test_fixed_tags_resolve() {
        let d = decoder_for(GROUP_FLOAT32, &[], 0).unwrap();
        assert_eq!(d.name(), "float32");
        assert_eq!(d.block_count(), None);
        let d = decoder_for(GROUP_UINT8, &[], 0).unwrap();
        assert_eq!(d.decode(&[1, 2]).unwrap(), Values::U8(vec![1, 2]));
    }

    #[test]
    fn test_unknown_and_reserved_tags() {
        assert!(decoder_for(GROUP_FLOAT, &[], 0).is_err());
        assert!(decoder_for(1234, &[], 0).is_err());
        assert!(decoder_for(GROUP_UINT8, &[0], 0).is_err());
    }

    #[test]
    fn test_int_trailer_bounded_by_file_blocks() {
        let mut trailer = Vec::new();
        for v in [2u64, 0, 3, 0, 0, 0, 0] {
            trailer.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decoder_for(GROUP_INT, &trailer, 3).unwrap().block_count(), Some(3));
        assert!(matches!(decoder_for(GROUP_INT, &trailer, 2), Err(MinnowError::Format(_))));
    }
}
