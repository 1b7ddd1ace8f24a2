//! SSH `mpint` helpers.
//!
//! An `mpint` is a non-negative integer carried inside a length-prefixed
//! string: leading zero bytes are stripped, and a single `0x00` is prepended
//! when the high bit of the first remaining byte is set, so the value never
//! reads as negative. Zero is the empty string.

use ssh_encoding::{Decode, Encode, Reader, Writer};

use super::error::{ProtoError, ProtoResult};

/// Strip leading zero bytes from an unsigned big-endian magnitude.
fn magnitude(value: &[u8]) -> &[u8] {
    let first = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    &value[first..]
}

/// Number of bytes [`encode`] will produce for `value`, including the
/// length prefix.
pub fn encoded_len(value: &[u8]) -> usize {
    let digits = magnitude(value);
    let pad = usize::from(digits.first().is_some_and(|&b| b & 0x80 != 0));
    4 + pad + digits.len()
}

/// Write `value` (unsigned, big-endian) as an `mpint`.
pub fn encode(writer: &mut impl Writer, value: &[u8]) -> ssh_encoding::Result<()> {
    let digits = magnitude(value);
    let pad = digits.first().is_some_and(|&b| b & 0x80 != 0);

    ((digits.len() + usize::from(pad)) as u32).encode(writer)?;
    if pad {
        writer.write(&[0x00])?;
    }
    writer.write(digits)
}

/// Read an `mpint` payload. The returned bytes are exactly the string
/// content and may still carry the sign-padding `0x00`.
pub fn decode(reader: &mut impl Reader) -> ProtoResult<Vec<u8>> {
    Ok(Vec::decode(reader)?)
}

/// Normalize an `mpint` payload to a fixed-width big-endian integer:
/// strip at most one leading sign-padding zero, then left-pad with zeros
/// to `width` bytes.
pub fn to_fixed(payload: &[u8], width: usize) -> ProtoResult<Vec<u8>> {
    let digits = match payload.split_first() {
        Some((0x00, rest)) => rest,
        _ => payload,
    };

    if digits.len() > width {
        return Err(ProtoError::InvalidFormat("integer wider than expected"));
    }

    let mut fixed = vec![0u8; width];
    fixed[width - digits.len()..].copy_from_slice(digits);
    Ok(fixed)
}
