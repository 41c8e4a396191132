//! Payload encoding for halo messages.
//!
//! Buffers are `f64` slices sent as raw native-endian bytes; both ends of an
//! exchange run the same build, so no header or byte swapping is carried.

use crate::mesh_error::MeshError;

pub fn cast_slice(v: &[f64]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Number of bytes carrying `n` values.
#[inline]
pub fn byte_len(n: usize) -> usize {
    n * std::mem::size_of::<f64>()
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Copy a received payload into `out`.
///
/// Received byte vectors carry no alignment guarantee, so the copy goes
/// through the destination's byte view instead of casting the source.
pub fn copy_into(neighbor: usize, bytes: &[u8], out: &mut [f64]) -> Result<(), MeshError> {
    expect_exact_len(bytes.len(), byte_len(out.len())).map_err(|e| MeshError::comm(neighbor, e))?;
    bytemuck::cast_slice_mut::<f64, u8>(out).copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip_through_unaligned_storage() {
        let v = [1.5f64, -2.0, 1e300];
        let mut raw = vec![0u8; 1];
        raw.extend_from_slice(cast_slice(&v));
        let mut out = [0.0; 3];
        copy_into(0, &raw[1..], &mut out).unwrap();
        assert_eq!(out, v);
    }

    #[test]
    fn short_payload_is_a_comm_error() {
        let mut out = [0.0; 2];
        let err = copy_into(3, &[0u8; 8], &mut out).unwrap_err();
        assert!(matches!(err, MeshError::CommError { neighbor: 3, .. }));
    }
}
