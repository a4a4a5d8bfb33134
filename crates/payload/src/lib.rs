//! Codec registry and payload transforms for narrowband voice.
//!
//! A [`Registry`] maps an RTP payload type to a [`Codec`] capability —
//! clock rate, channel count, and encode/decode closures. [`Registry::default_table`]
//! builds the process-wide default (PCMU, PCMA, L16); a session clones it once at
//! construction and may add a dynamic Opus registration on top, so tests can
//! install alternate tables on fresh registries without any global state.

pub mod g711;
pub mod l16;
#[cfg(feature = "opus")]
pub mod opus;

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "opus")]
use std::sync::Arc;

use thiserror::Error;

pub const PT_PCMU: u8 = 0;
pub const PT_PCMA: u8 = 8;
pub const PT_L16_MONO: u8 = 11;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("no codec registered for payload type {0}")]
    UnknownPayloadType(u8),
    #[error("frame size is not a multiple of the codec's sample width")]
    BadFrameSize,
}

#[derive(Clone)]
enum Transform {
    Pcmu,
    Pcma,
    L16,
    #[cfg(feature = "opus")]
    Opus(Arc<opus::OpusCodec>),
}

// Manual impl: `audiopus`'s encoder/decoder types don't implement `Debug`,
// so deriving it would block the `opus` feature from compiling.
impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pcmu => write!(f, "Pcmu"),
            Self::Pcma => write!(f, "Pcma"),
            Self::L16 => write!(f, "L16"),
            #[cfg(feature = "opus")]
            Self::Opus(codec) => write!(f, "Opus({})", codec.payload_type()),
        }
    }
}

/// A registered codec capability: sample rate, channel count, a hint at the
/// wall-clock frame duration it is normally packetized at, and the
/// encode/decode transform itself.
///
/// Not `Copy` — the optional Opus variant owns a stateful encoder/decoder
/// pair behind an `Arc`, so registering it means cloning a handle rather
/// than a plain value.
#[derive(Debug, Clone)]
pub struct Codec {
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u8,
    pub frame_duration_hint: Duration,
    transform: Transform,
}

impl Codec {
    fn new(payload_type: u8, clock_rate: u32, channels: u8, transform: Transform) -> Self {
        Self {
            payload_type,
            clock_rate,
            channels,
            frame_duration_hint: Duration::from_millis(20),
            transform,
        }
    }

    pub fn pcmu() -> Self {
        Self::new(PT_PCMU, 8000, 1, Transform::Pcmu)
    }

    pub fn pcma() -> Self {
        Self::new(PT_PCMA, 8000, 1, Transform::Pcma)
    }

    /// L16 mono registered at the given clock rate — the rate is
    /// codec-fixed per registration, not implied by the payload type.
    pub fn l16_mono(payload_type: u8, clock_rate: u32) -> Self {
        Self::new(payload_type, clock_rate, 1, Transform::L16)
    }

    /// Opus mono at 48 kHz, registered on a dynamic payload type. Opus is a
    /// collaborator, invoked through the same `Codec` capability as the
    /// built-in transforms, never special-cased by the session.
    #[cfg(feature = "opus")]
    pub fn opus(payload_type: u8) -> Result<Self, CodecError> {
        let codec = opus::OpusCodec::new(payload_type)?;
        Ok(Self::new(payload_type, 48_000, 1, Transform::Opus(Arc::new(codec))))
    }

    /// Number of samples a frame of `frame_duration_hint` contains.
    pub fn frame_samples(&self) -> u32 {
        (self.clock_rate as u64 * self.frame_duration_hint.as_millis() as u64 / 1000) as u32
    }

    /// Encodes host little-endian s16 PCM into this codec's wire payload.
    pub fn encode(&self, pcm_s16le: &[u8]) -> Result<Vec<u8>, CodecError> {
        if pcm_s16le.len() % 2 != 0 {
            return Err(CodecError::BadFrameSize);
        }

        match &self.transform {
            Transform::Pcmu => Ok(pcm_s16le
                .chunks_exact(2)
                .map(|c| g711::encode_ulaw(i16::from_le_bytes([c[0], c[1]])))
                .collect()),
            Transform::Pcma => Ok(pcm_s16le
                .chunks_exact(2)
                .map(|c| g711::encode_alaw(i16::from_le_bytes([c[0], c[1]])))
                .collect()),
            Transform::L16 => Ok(l16::encode(pcm_s16le)),
            #[cfg(feature = "opus")]
            Transform::Opus(codec) => codec.encode(pcm_s16le),
        }
    }

    /// Decodes this codec's wire payload into host little-endian s16 PCM.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        match &self.transform {
            Transform::Pcmu => {
                let mut out = Vec::with_capacity(payload.len() * 2);
                for &byte in payload {
                    out.extend_from_slice(&g711::decode_ulaw(byte).to_le_bytes());
                }
                Ok(out)
            }
            Transform::Pcma => {
                let mut out = Vec::with_capacity(payload.len() * 2);
                for &byte in payload {
                    out.extend_from_slice(&g711::decode_alaw(byte).to_le_bytes());
                }
                Ok(out)
            }
            Transform::L16 => {
                if payload.len() % 2 != 0 {
                    return Err(CodecError::BadFrameSize);
                }
                Ok(l16::decode(payload))
            }
            #[cfg(feature = "opus")]
            Transform::Opus(codec) => codec.decode(payload),
        }
    }
}

/// A process-wide default table of payload-type -> codec, frozen after
/// construction and cloned per session.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    codecs: HashMap<u8, Codec>,
}

impl Registry {
    /// Empty registry, for tests that want full control over what is
    /// registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// PCMU (PT=0), PCMA (PT=8), L16 mono (PT=11, 44100 Hz) — the default
    /// static payload-type table this transport starts every session with.
    pub fn default_table() -> Self {
        let mut registry = Self::empty();
        registry.register(Codec::pcmu());
        registry.register(Codec::pcma());
        registry.register(Codec::l16_mono(PT_L16_MONO, 44_100));
        registry
    }

    pub fn register(&mut self, codec: Codec) {
        self.codecs.insert(codec.payload_type, codec);
    }

    pub fn get(&self, payload_type: u8) -> Option<&Codec> {
        self.codecs.get(&payload_type)
    }

    pub fn encode(&self, payload_type: u8, pcm_s16le: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.get(payload_type)
            .ok_or(CodecError::UnknownPayloadType(payload_type))?
            .encode(pcm_s16le)
    }

    pub fn decode(&self, payload_type: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.get(payload_type)
            .ok_or(CodecError::UnknownPayloadType(payload_type))?
            .decode(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_the_three_static_codecs() {
        let registry = Registry::default_table();
        assert!(registry.get(PT_PCMU).is_some());
        assert!(registry.get(PT_PCMA).is_some());
        assert!(registry.get(PT_L16_MONO).is_some());
        assert!(registry.get(99).is_none());
    }

    #[test]
    fn unknown_payload_type_is_an_error() {
        let registry = Registry::default_table();
        assert_eq!(
            registry.encode(99, &[0, 0]),
            Err(CodecError::UnknownPayloadType(99))
        );
    }

    #[test]
    fn pcmu_frame_is_160_bytes_at_20ms() {
        let codec = Codec::pcmu();
        assert_eq!(codec.frame_samples(), 160);
    }

    #[cfg(feature = "opus")]
    #[test]
    fn opus_registers_as_an_ordinary_codec() {
        let mut registry = Registry::default_table();
        registry.register(Codec::opus(96).unwrap());

        let pcm = vec![0u8; 960 * 2]; // 20ms mono @ 48kHz, silence
        let encoded = registry.encode(96, &pcm).unwrap();
        let decoded = registry.decode(96, &encoded).unwrap();
        assert_eq!(decoded.len(), pcm.len());
    }
}
