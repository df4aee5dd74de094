//! Fixed-width bit packing shared by the integer group and its trailer.
//!
//! Values are packed least-significant bit first into a little-endian bit
//! stream: value `i` occupies bits `[i*bits, (i+1)*bits)` of the output.

use minnow_core::{MinnowError, Result};

/// Bits needed to represent every value in `0..=max`.
pub fn precision_needed(max: u64) -> u32 {
    u64::BITS - max.leading_zeros()
}

/// Bytes occupied by `n` values packed at `bits` bits each.
///
/// For arrays already held in memory. Sizes taken from a file go through
/// [`checked_array_bytes`].
pub fn array_bytes(bits: u32, n: u64) -> u64 {
    (bits as u64 * n).div_ceil(8)
}

/// [`array_bytes`] for untrusted `bits` and `n`.
pub fn checked_array_bytes(bits: u32, n: u64) -> Result<u64> {
    (bits as u64)
        .checked_mul(n)
        .map(|total| total.div_ceil(8))
        .ok_or_else(|| {
            MinnowError::Format(format!("{n} values at {bits} bits overflow a byte count"))
        })
}

/// Append `values` packed at `bits` bits each. Values must fit in `bits`.
pub fn pack(bits: u32, values: &[u64], out: &mut Vec<u8>) {
    debug_assert!(bits <= 64);
    if bits == 0 {
        return;
    }
    let mask = mask(bits);
    let mut acc: u128 = 0;
    let mut filled = 0u32;
    for &v in values {
        debug_assert!(v <= mask, "value {v} does not fit in {bits} bits");
        acc |= ((v & mask) as u128) << filled;
        filled += bits;
        while filled >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            filled -= 8;
        }
    }
    if filled > 0 {
        out.push(acc as u8);
    }
}

/// Decode `n` values packed at `bits` bits each from the front of `bytes`.
pub fn unpack(bits: u32, n: u64, bytes: &[u8]) -> Result<Vec<u64>> {
    if bits > 64 {
        return Err(MinnowError::Format(format!("bit width {bits} exceeds 64")));
    }
    let needed = checked_array_bytes(bits, n)?;
    if (bytes.len() as u64) < needed {
        return Err(MinnowError::Format(format!(
            "packed array of {} {}-bit values needs {} bytes, found {}",
            n,
            bits,
            needed,
            bytes.len()
        )));
    }
    let mut values = Vec::new();
    usize::try_from(n)
        .ok()
        .and_then(|n| values.try_reserve_exact(n).ok())
        .ok_or_else(|| MinnowError::Format(format!("cannot hold {n} unpacked values")))?;
    if bits == 0 {
        values.resize(n as usize, 0);
        return Ok(values);
    }

    let mask = mask(bits);
    let mut acc: u128 = 0;
    let mut filled = 0u32;
    let mut next = bytes.iter();
    for _ in 0..n {
        while filled < bits {
            // Length was checked above, so the stream never runs dry here.
            let byte = next.next().copied().unwrap_or(0);
            acc |= (byte as u128) << filled;
            filled += 8;
        }
        values.push((acc as u64) & mask);
        acc >>= bits;
        filled -= bits;
    }
    Ok(values)
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_needed() {
        assert_eq!(precision_needed(0), 0);
        assert_eq!(precision_needed(1), 1);
        assert_eq!(precision_needed(2), 2);
        assert_eq!(precision_needed(255), 8);
        assert_eq!(precision_needed(256), 9);
        assert_eq!(precision_needed(u64::MAX), 64);
    }

    #[test]
    fn test_array_bytes_rounds_up() {
        assert_eq!(array_bytes(0, 100), 0);
        assert_eq!(array_bytes(3, 3), 2);
        assert_eq!(array_bytes(8, 4), 4);
        assert_eq!(array_bytes(64, 2), 16);
    }

    #[test]
    fn test_pack_is_lsb_first() {
        let mut out = Vec::new();
        pack(3, &[0b101, 0b011, 0b111], &mut out);
        // 101 | 011 << 3 | 111 << 6 = 0b1_1101_1101
        assert_eq!(out, vec![0b1101_1101, 0b1]);
        assert_eq!(unpack(3, 3, &out).unwrap(), vec![0b101, 0b011, 0b111]);
    }

    #[test]
    fn test_full_width_values() {
        let values = [u64::MAX, 0, 1 << 63, 12345];
        let mut out = Vec::new();
        pack(64, &values, &mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(unpack(64, 4, &out).unwrap(), values);
    }

    #[test]
    fn test_odd_widths() {
        for bits in [1u32, 7, 13, 33, 63] {
            let max = mask(bits);
            let values: Vec<u64> = (0..37u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15) & max).collect();
            let mut out = Vec::new();
            pack(bits, &values, &mut out);
            assert_eq!(out.len() as u64, array_bytes(bits, values.len() as u64));
            assert_eq!(unpack(bits, values.len() as u64, &out).unwrap(), values, "bits={bits}");
        }
    }

    #[test]
    fn test_unpack_rejects_short_input() {
        assert!(unpack(8, 3, &[1, 2]).is_err());
        assert_eq!(unpack(0, 3, &[]).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_oversized_counts_are_errors() {
        assert!(checked_array_bytes(64, u64::MAX).is_err());
        assert_eq!(checked_array_bytes(13, 5).unwrap(), array_bytes(13, 5));
        assert!(matches!(unpack(64, u64::MAX, &[0; 16]), Err(MinnowError::Format(_))));
        assert!(matches!(unpack(0, 1 << 60, &[]), Err(MinnowError::Format(_))));
    }
}
