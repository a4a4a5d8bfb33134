//! Process configuration, loaded either from the CLI demo's
//! `--config <path>` flag or constructed with
//! [`Config::default`] by a library caller that embeds a session directly.
//!
//! Follows `turn-server/src/config.rs`'s convention of a free function per
//! field passed to `#[serde(default = "...")]`, rather than a blanket
//! `#[derive(Default)]`, so every default is documented next to its field.

use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Jitter {
    /// Ring buffer size in slots; recommended power of two.
    #[serde(default = "Jitter::capacity")]
    pub capacity: usize,

    /// Frames to accumulate before the buffer starts emitting ("priming").
    #[serde(default = "Jitter::prefetch")]
    pub prefetch: usize,
}

impl Jitter {
    fn capacity() -> usize {
        128
    }

    fn prefetch() -> usize {
        3
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            capacity: Self::capacity(),
            prefetch: Self::prefetch(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Rtcp {
    /// Session bandwidth in bits/s RTCP interval computation is derived
    /// from (RFC 3550 §6.2); default is a narrowband-voice-sized guess.
    #[serde(default = "Rtcp::bandwidth_bps")]
    pub bandwidth_bps: u32,

    /// SDES CNAME advertised in every compound report.
    #[serde(default = "Rtcp::cname")]
    pub cname: String,
}

impl Rtcp {
    fn bandwidth_bps() -> u32 {
        64_000
    }

    fn cname() -> String {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        format!("user@{host}")
    }
}

impl Default for Rtcp {
    fn default() -> Self {
        Self {
            bandwidth_bps: Self::bandwidth_bps(),
            cname: Self::cname(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Session {
    /// Initial outbound payload type; PCMU by default.
    #[serde(default = "Session::payload_type")]
    pub payload_type: u8,

    /// Payload type the RFC 4733 telephone-event assembler listens on.
    #[serde(default = "Session::dtmf_payload_type")]
    pub dtmf_payload_type: u8,

    /// Grace period `close()` waits for in-flight sends to drain before
    /// transitioning `Draining -> Closed`.
    #[serde(default = "Session::close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Session {
    fn payload_type() -> u8 {
        voxrtp_payload::PT_PCMU
    }

    fn dtmf_payload_type() -> u8 {
        101
    }

    fn close_grace_ms() -> u64 {
        250
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            payload_type: Self::payload_type(),
            dtmf_payload_type: Self::dtmf_payload_type(),
            close_grace_ms: Self::close_grace_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    /// Local bind address; `None` lets the OS pick an ephemeral port.
    pub local_addr: Option<SocketAddr>,

    /// Remote peer address; required before the first send.
    pub remote_addr: Option<SocketAddr>,

    #[serde(default)]
    pub jitter: Jitter,
    #[serde(default)]
    pub rtcp: Rtcp,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// Path to a TOML configuration file; defaults are used for anything
    /// absent or if no file is given.
    #[arg(long)]
    config: Option<String>,

    /// Local bind address, overriding the config file.
    #[arg(long)]
    local_addr: Option<SocketAddr>,

    /// Remote peer address, overriding the config file.
    #[arg(long)]
    remote_addr: Option<SocketAddr>,
}

impl Config {
    /// Parses CLI flags, reads the `--config` file if given, and applies
    /// CLI address overrides on top, mirroring `turn-server/src/config.rs`'s
    /// `Config::load`.
    pub fn load() -> anyhow::Result<Self> {
        let cli = Cli::parse();
        let body = cli
            .config
            .as_ref()
            .map(std::fs::read_to_string)
            .transpose()?
            .unwrap_or_default();

        let mut config: Config = toml::from_str(&body)?;
        if cli.local_addr.is_some() {
            config.local_addr = cli.local_addr;
        }
        if cli.remote_addr.is_some() {
            config.remote_addr = cli.remote_addr;
        }

        Ok(config)
    }
}
