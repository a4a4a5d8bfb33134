//! Unified error type for the session layer.
//!
//! Parse errors from [`voxrtp_codec`] never escape the receive path — they
//! are counted and dropped inside [`crate::session::Session`] — so this enum
//! only needs to carry [`voxrtp_codec::ParseError`] for the rare caller that
//! decodes packets directly. Codec and session errors propagate to callers
//! because a failure to encode or an operation on a closed session is
//! actionable; I/O errors from the datagram channel are wrapped so callers
//! can match on them without depending on `std::io` directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("packet parse error: {0}")]
    Parse(#[from] voxrtp_codec::ParseError),

    #[error("codec error: {0}")]
    Codec(#[from] voxrtp_payload::CodecError),

    #[error("dtmf error: {0}")]
    Dtmf(#[from] crate::dtmf::DtmfError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is not bound to a datagram channel")]
    NotBound,
    #[error("session is already closed")]
    AlreadyClosed,
    #[error("remote ssrc collided with our local ssrc")]
    SsrcCollision,
}

pub type Result<T> = std::result::Result<T, Error>;
