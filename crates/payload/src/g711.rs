//! G.711 μ-law (PCMU) and A-law (PCMA) companding, RFC 3551 §4.1.
//!
//! Encoding runs the compression formula directly; decoding is served from a
//! precomputed 256-entry table built once per process, since a decoder sees
//! every one of the 256 possible octets and a table lookup is cheaper than
//! recomputing the expansion on every sample.

use std::sync::OnceLock;

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;

fn ulaw_table() -> &'static [i16; 256] {
    static TABLE: OnceLock<[i16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0i16; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = decode_ulaw_uncached(i as u8);
        }
        table
    })
}

fn alaw_table() -> &'static [i16; 256] {
    static TABLE: OnceLock<[i16; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0i16; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = decode_alaw_uncached(i as u8);
        }
        table
    })
}

/// Encodes one linear PCM sample to μ-law.
pub fn encode_ulaw(sample: i16) -> u8 {
    let mut sample = sample;

    let sign = if sample < 0 {
        sample = sample.saturating_neg();
        0x80
    } else {
        0x00
    };

    if sample > CLIP {
        sample = CLIP;
    }

    sample += BIAS;

    let exponent = (8i32 - sample.leading_zeros() as i32).clamp(0, 7) as u8;
    let mantissa = ((sample >> (exponent + 3)) & 0x0F) as u8;
    let ulaw = sign | (exponent << 4) | mantissa;

    !ulaw
}

/// Decodes one μ-law octet to linear PCM via the precomputed table.
pub fn decode_ulaw(ulaw: u8) -> i16 {
    ulaw_table()[ulaw as usize]
}

fn decode_ulaw_uncached(ulaw: u8) -> i16 {
    let ulaw = !ulaw;
    let sign = (ulaw & 0x80) != 0;
    let exponent = ((ulaw >> 4) & 0x07) as u32;
    let mantissa = (ulaw & 0x0F) as i16;

    let sample = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign { -sample } else { sample }
}

/// Encodes one linear PCM sample to A-law.
pub fn encode_alaw(sample: i16) -> u8 {
    let mut sample = sample;

    let sign = if sample < 0 {
        sample = sample.saturating_neg();
        0x00
    } else {
        0x80
    };

    if sample > CLIP {
        sample = CLIP;
    }

    let alaw = if sample < 256 {
        (sample >> 4) as u8
    } else {
        let exponent = (8i32 - sample.leading_zeros() as i32).clamp(0, 7) as u8;
        let mantissa = ((sample >> (exponent + 3)) & 0x0F) as u8;
        (exponent << 4) | mantissa
    };

    sign | (alaw ^ 0x55)
}

/// Decodes one A-law octet to linear PCM via the precomputed table.
pub fn decode_alaw(alaw: u8) -> i16 {
    alaw_table()[alaw as usize]
}

fn decode_alaw_uncached(alaw: u8) -> i16 {
    let alaw = alaw ^ 0x55;
    let sign = (alaw & 0x80) != 0;
    let exponent = ((alaw >> 4) & 0x07) as u32;
    let mantissa = (alaw & 0x0F) as i16;

    let sample = if exponent == 0 {
        (mantissa << 4) + 8
    } else {
        ((mantissa << 4) + 0x108) << (exponent - 1)
    };

    if sign { sample } else { -sample }
}

/// Quantization bound for a µ-/A-law round trip at a given linear sample,
/// following the piecewise-linear companding curve's step size at that
/// magnitude. Used by property tests, not by the codec itself.
pub fn quantization_bound(sample: i16) -> i16 {
    let magnitude = sample.unsigned_abs();
    let step_exponent = 15 - magnitude.leading_zeros().min(14);
    (1i32 << step_exponent.max(4)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_round_trips_within_quantization_bound() {
        for sample in (-16384i32..16384).step_by(37) {
            let sample = sample as i16;
            let decoded = decode_ulaw(encode_ulaw(sample));
            assert!(
                (decoded as i32 - sample as i32).unsigned_abs() as i16
                    <= quantization_bound(sample) * 2,
                "sample={sample} decoded={decoded}"
            );
        }
    }

    #[test]
    fn alaw_round_trips_within_quantization_bound() {
        for sample in (-16384i32..16384).step_by(37) {
            let sample = sample as i16;
            let decoded = decode_alaw(encode_alaw(sample));
            assert!(
                (decoded as i32 - sample as i32).unsigned_abs() as i16
                    <= quantization_bound(sample) * 2,
                "sample={sample} decoded={decoded}"
            );
        }
    }

    #[test]
    fn silence_round_trips_to_near_zero() {
        assert!(decode_ulaw(encode_ulaw(0)).abs() <= 8);
        assert!(decode_alaw(encode_alaw(0)).abs() <= 8);
    }
}
