//! Opus as an external collaborator, registered as an ordinary
//! [`Codec`](crate::Codec)-shaped entry rather than a special case in the
//! session. This module only exists when the `opus` feature is enabled.

use std::sync::Mutex;

use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::{Application, Channels, SampleRate};

use crate::CodecError;

/// Wraps `audiopus`'s stateful encoder/decoder behind the stateless
/// encode/decode shape the rest of the registry expects. Opus frames are
/// opaque on the wire; this collaborator owns their internal framing.
pub struct OpusCodec {
    payload_type: u8,
    encoder: Mutex<OpusEncoder>,
    decoder: Mutex<OpusDecoder>,
    frame_samples: usize,
}

impl OpusCodec {
    pub fn new(payload_type: u8) -> Result<Self, CodecError> {
        let encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|_| CodecError::BadFrameSize)?;
        let decoder =
            OpusDecoder::new(SampleRate::Hz48000, Channels::Mono).map_err(|_| CodecError::BadFrameSize)?;

        Ok(Self {
            payload_type,
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            // 20ms @ 48kHz mono
            frame_samples: 960,
        })
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn encode(&self, pcm_s16le: &[u8]) -> Result<Vec<u8>, CodecError> {
        if pcm_s16le.len() % 2 != 0 {
            return Err(CodecError::BadFrameSize);
        }

        let samples: Vec<i16> = pcm_s16le
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        let mut out = vec![0u8; 4000];
        let written = self
            .encoder
            .lock()
            .unwrap()
            .encode(&samples, &mut out)
            .map_err(|_| CodecError::BadFrameSize)?;

        out.truncate(written);
        Ok(out)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut samples = vec![0i16; self.frame_samples];
        let decoded = self
            .decoder
            .lock()
            .unwrap()
            .decode(Some(payload), &mut samples, false)
            .map_err(|_| CodecError::BadFrameSize)?;

        samples.truncate(decoded);

        let mut out = Vec::with_capacity(decoded * 2);
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}
