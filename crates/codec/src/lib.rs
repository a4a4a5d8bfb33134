//! ## RTP: A Transport Protocol for Real-Time Applications
//!
//! Bit-exact parsing and serialization of RTP and RTCP datagrams per
//! [RFC 3550], plus RFC 4733 telephone-event framing. This crate is the wire
//! layer only: it has no notion of sockets, sessions, or sequencing policy.
//!
//! [RFC 3550]: https://www.rfc-editor.org/rfc/rfc3550

pub mod dtmf;
pub mod rtcp;
pub mod rtp;

pub use rtcp::RtcpPacket;
pub use rtp::RtpPacket;

use thiserror::Error;

/// Errors surfaced while parsing an inbound datagram.
///
/// Per the transport's error policy, these are expected to be counted and
/// dropped by callers rather than propagated — a lossy or hostile network
/// produces them routinely.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer shorter than the minimum header size")]
    TooShort,
    #[error("RTP version field is not 2")]
    BadVersion,
    #[error("padding length byte exceeds the remaining buffer")]
    InconsistentPadding,
    #[error("extension length-in-words exceeds the remaining buffer")]
    ExtensionOverrun,
    #[error("RTCP sub-packet length field is inconsistent with the buffer")]
    BadLength,
}

/// Demultiplex a datagram as RTP or RTCP.
///
/// A datagram is RTCP iff its second byte's payload-type field lies in
/// 192-223, the convention this transport uses to keep that range out of its
/// RTP dynamic payload type space.
pub fn is_rtcp(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && (192..=223).contains(&bytes[1])
}

pub(crate) fn round_up_to_word(len: usize) -> usize {
    (len + 3) & !3
}
