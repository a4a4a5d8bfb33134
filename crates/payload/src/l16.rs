//! L16 linear PCM, big-endian on the wire (RFC 3551 §4.5.14).
//!
//! Host PCM is accepted/produced as little-endian signed 16-bit, matching
//! the native sample representation `i16::to_le_bytes` / `from_le_bytes`
//! would use on every architecture this crate targets.

/// Encodes little-endian host PCM samples to big-endian wire bytes.
pub fn encode(pcm_le: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm_le.len());
    for chunk in pcm_le.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        out.extend_from_slice(&sample.to_be_bytes());
    }
    out
}

/// Decodes big-endian wire bytes to little-endian host PCM samples.
pub fn decode(wire_be: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(wire_be.len());
    for chunk in wire_be.chunks_exact(2) {
        let sample = i16::from_be_bytes([chunk[0], chunk[1]]);
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exactly() {
        let samples: Vec<i16> = (-500..500).collect();
        let mut pcm = Vec::new();
        for s in &samples {
            pcm.extend_from_slice(&s.to_le_bytes());
        }

        let wire = encode(&pcm);
        let decoded = decode(&wire);
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn byteswaps_on_the_wire() {
        let pcm = 1i16.to_le_bytes();
        let wire = encode(&pcm);
        assert_eq!(wire, 1i16.to_be_bytes());
    }
}
