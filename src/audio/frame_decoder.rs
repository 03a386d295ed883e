//! Decoding of raw bus payloads into linear samples.

/// Bytes per encoded sample (IEEE-754 single precision).
pub const BYTES_PER_SAMPLE: usize = 4;

/// An ordered run of samples decoded from one payload.
pub type SampleFrame = Vec<f32>;

/// Reinterprets each little-endian 4-byte group of `payload` as an `f32`.
///
/// A trailing remainder of 1-3 bytes is dropped. Bit patterns are not
/// validated, so NaN and infinities come through untouched.
pub fn decode(payload: &[u8]) -> SampleFrame {
    payload
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|group| f32::from_bits(u32::from_le_bytes([group[0], group[1], group[2], group[3]])))
        .collect()
}

/// Inverse of [`decode`], used to build payloads for loopback and tests.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_bits().to_le_bytes());
    }
    out
}
