//! A plain RTP/RTCP transport core for telephony and VoIP: packet codec,
//! jitter buffer, DTMF assembly, RTCP scheduling, and the session state
//! machine that binds them to a datagram channel.
//!
//! No SRTP, ICE, DTLS, or SIP signaling lives here — this is the substrate
//! a user-agent or media gateway sits on top of, the same way `turn_rs`'s
//! `Service`/`Processor` pair is the substrate `turn-server` wires a socket
//! loop around.

pub mod config;
pub mod dtmf;
pub mod error;
pub mod jitter;
pub mod rtcp_scheduler;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Phase, RtcpEvent, Session, SessionOptions};
pub use transport::{DatagramChannel, UdpChannel};

pub use voxrtp_codec as codec;
pub use voxrtp_payload as payload;
