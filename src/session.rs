//! The session state machine: binds a codec registry, jitter buffer, DTMF
//! assembler, and RTCP scheduler to one [`DatagramChannel`] and exposes the
//! send/receive API a SIP user-agent or media gateway would drive directly.
//!
//! Mutable session state lives behind a `parking_lot::Mutex` shared by the
//! public handle and the three background tasks (`fork_socket`-equivalent
//! receive loop, RTCP timer, DTMF expiry sweep), the same
//! `Arc<Mutex<...>>` sharing `turn-server/src/monitor.rs` uses for its
//! cross-task counters — locks are held only across synchronous state
//! mutation, never across an `.await`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use voxrtp_codec::dtmf::TelephoneEventPayload;
use voxrtp_codec::rtcp::RtcpPacket;
use voxrtp_codec::{is_rtcp, rtcp, RtpPacket};
use voxrtp_payload::Registry;

use crate::dtmf::{self, Assembler, DtmfEvent};
use crate::error::{Error, Result, SessionError};
use crate::jitter::{Classification, Frame, JitterBuffer};
use crate::rtcp_scheduler::{build_compound, ReportInput, RtcpScheduler};
use crate::transport::DatagramChannel;

const DTMF_VOLUME: u8 = 10;
/// Samples per NTP-timestamp unit pair; NTP epoch starts 1900-01-01, 70
/// years before the Unix epoch (including 17 leap days).
const NTP_UNIX_EPOCH_OFFSET: u64 = 2_208_988_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Bound,
    Active,
    Draining,
    Closed,
}

/// Fired on `on_rtcp`: either a parsed inbound compound packet, or an
/// informational record for an event the session handled internally, such
/// as a local SSRC collision.
#[derive(Debug, Clone)]
pub enum RtcpEvent {
    Received(Vec<RtcpPacket>),
    SsrcCollision,
}

pub struct SessionOptions {
    pub jitter_capacity: usize,
    pub jitter_prefetch: usize,
    pub rtcp_bandwidth_bps: u32,
    pub dtmf_payload_type: u8,
    pub cname: String,
    pub close_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            jitter_capacity: 128,
            jitter_prefetch: 3,
            rtcp_bandwidth_bps: 64_000,
            dtmf_payload_type: 101,
            cname: "user@localhost".to_string(),
            close_grace: Duration::from_millis(250),
        }
    }
}

/// RFC 3550 Appendix A.1-style 32-bit cycle/seq tracker, used both for the
/// RTCP extended highest sequence number and for loss accounting.
struct LossTracker {
    first_seq: Option<u16>,
    cycles: u16,
    highest_seq: u16,
    received_total: u64,
    expected_at_last_report: i64,
    received_at_last_report: u64,
}

impl LossTracker {
    fn new() -> Self {
        Self {
            first_seq: None,
            cycles: 0,
            highest_seq: 0,
            received_total: 0,
            expected_at_last_report: 0,
            received_at_last_report: 0,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn on_packet(&mut self, seq: u16) {
        match self.first_seq {
            None => {
                self.first_seq = Some(seq);
                self.highest_seq = seq;
            }
            Some(_) => {
                let delta = (seq.wrapping_sub(self.highest_seq) as i16) as i32;
                if delta > 0 {
                    if seq < self.highest_seq {
                        self.cycles = self.cycles.wrapping_add(1);
                    }
                    self.highest_seq = seq;
                }
            }
        }
        self.received_total += 1;
    }

    fn extended_highest_sequence(&self) -> u32 {
        ((self.cycles as u32) << 16) | self.highest_seq as u32
    }

    fn expected_total(&self) -> i64 {
        let first = self.first_seq.unwrap_or(0) as i64;
        self.extended_highest_sequence() as i64 - first + 1
    }

    /// Computes `(fraction_lost, cumulative_lost)` for the interval since
    /// the last report and resets the interval counters.
    fn report_and_reset(&mut self) -> (u8, i32) {
        let expected = self.expected_total();
        let expected_interval = expected - self.expected_at_last_report;
        let received_interval = self.received_total as i64 - self.received_at_last_report as i64;
        let lost_interval = (expected_interval - received_interval).max(0);

        let fraction = if expected_interval <= 0 || lost_interval <= 0 {
            0u8
        } else {
            ((lost_interval * 256) / expected_interval).min(255) as u8
        };

        let cumulative = (expected - self.received_total as i64).clamp(-(1 << 23), (1 << 23) - 1) as i32;

        self.expected_at_last_report = expected;
        self.received_at_last_report = self.received_total;
        (fraction, cumulative)
    }
}

/// RFC 3550 Appendix A.8 interarrival jitter estimator.
struct JitterEstimator {
    prev_transit: Option<i64>,
    jitter: f64,
}

impl JitterEstimator {
    fn new() -> Self {
        Self {
            prev_transit: None,
            jitter: 0.0,
        }
    }

    fn reset(&mut self) {
        self.prev_transit = None;
        self.jitter = 0.0;
    }

    fn update(&mut self, rtp_timestamp: u32, arrival_units: u32) -> u32 {
        let transit = arrival_units as i64 - rtp_timestamp as i64;
        if let Some(prev) = self.prev_transit {
            let d = (transit - prev).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.prev_transit = Some(transit);
        self.jitter as u32
    }
}

struct SessionState {
    phase: Phase,
    local_ssrc: u32,
    remote_ssrc: Option<u32>,
    out_sequence: u16,
    out_timestamp: u32,
    out_payload_type: u8,
    dtmf_payload_type: u8,
    packets_sent: u32,
    octets_sent: u32,
    sent_since_last_report: bool,
    loss: LossTracker,
    jitter_estimator: JitterEstimator,
    jitter_buffer: JitterBuffer,
    dtmf_assembler: Assembler,
    scheduler: RtcpScheduler,
    cname: String,
    last_sr_received: Option<(u32, Instant)>,
    created_at: Instant,
    callbacks: Callbacks,
}

#[derive(Default)]
struct Callbacks {
    on_audio: Option<Box<dyn FnMut(Vec<u8>, u32) + Send>>,
    on_dtmf: Option<Box<dyn FnMut(char, u16) + Send>>,
    on_rtcp: Option<Box<dyn FnMut(RtcpEvent) + Send>>,
}

fn now_ntp() -> (u32, u32) {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = since_epoch.as_secs() + NTP_UNIX_EPOCH_OFFSET;
    let fraction = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (seconds as u32, fraction as u32)
}

/// A bound RTP/RTCP flow over one [`DatagramChannel`].
///
/// Cloning a `Session` yields another handle to the same underlying state;
/// the background receive and RTCP-timer tasks hold their own handle so the
/// session stays alive as long as either the caller or a task needs it.
pub struct Session<C: DatagramChannel + 'static> {
    channel: Arc<C>,
    remote_addr: SocketAddr,
    registry: Arc<Registry>,
    state: Arc<Mutex<SessionState>>,
    close_grace: Duration,
    recv_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    rtcp_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    dtmf_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<C: DatagramChannel + 'static> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            remote_addr: self.remote_addr,
            registry: self.registry.clone(),
            state: self.state.clone(),
            close_grace: self.close_grace,
            recv_task: self.recv_task.clone(),
            rtcp_task: self.rtcp_task.clone(),
            dtmf_task: self.dtmf_task.clone(),
        }
    }
}

/// How often the DTMF expiry sweep runs; well under `GROUP_TIMEOUT` so a
/// stalled digit's end event fires close to the deadline rather than late.
const DTMF_EXPIRE_TICK: Duration = Duration::from_millis(50);

impl<C: DatagramChannel + 'static> Session<C> {
    /// Binds `local_addr`, starts the receive task, RTCP timer, and DTMF
    /// expiry sweep, and returns a ready-to-use session.
    pub async fn create(
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        payload_type: u8,
        options: SessionOptions,
    ) -> Result<Self> {
        let channel = Arc::new(C::bind(local_addr).await?);
        let local_ssrc: u32 = rand::random::<u32>().max(1);

        let state = Arc::new(Mutex::new(SessionState {
            phase: Phase::Bound,
            local_ssrc,
            remote_ssrc: None,
            out_sequence: rand::random(),
            out_timestamp: rand::random(),
            out_payload_type: payload_type,
            dtmf_payload_type: options.dtmf_payload_type,
            packets_sent: 0,
            octets_sent: 0,
            sent_since_last_report: false,
            loss: LossTracker::new(),
            jitter_estimator: JitterEstimator::new(),
            jitter_buffer: JitterBuffer::new(options.jitter_capacity, options.jitter_prefetch),
            dtmf_assembler: Assembler::new(),
            scheduler: RtcpScheduler::new(options.rtcp_bandwidth_bps),
            cname: options.cname,
            last_sr_received: None,
            created_at: Instant::now(),
            callbacks: Callbacks::default(),
        }));

        let registry = Arc::new(Registry::default_table());

        state.lock().phase = Phase::Active;

        let recv_handle = tokio::spawn(Self::recv_loop(
            channel.clone(),
            state.clone(),
            registry.clone(),
        ));
        let rtcp_handle = tokio::spawn(Self::rtcp_loop(
            channel.clone(),
            state.clone(),
            remote_addr,
        ));
        let dtmf_handle = tokio::spawn(Self::dtmf_expire_loop(state.clone()));

        Ok(Self {
            channel,
            remote_addr,
            registry,
            state,
            close_grace: options.close_grace,
            recv_task: Arc::new(Mutex::new(Some(recv_handle))),
            rtcp_task: Arc::new(Mutex::new(Some(rtcp_handle))),
            dtmf_task: Arc::new(Mutex::new(Some(dtmf_handle))),
        })
    }

    pub fn on_audio(&self, callback: impl FnMut(Vec<u8>, u32) + Send + 'static) {
        self.state.lock().callbacks.on_audio = Some(Box::new(callback));
    }

    pub fn on_dtmf(&self, callback: impl FnMut(char, u16) + Send + 'static) {
        self.state.lock().callbacks.on_dtmf = Some(Box::new(callback));
    }

    pub fn on_rtcp(&self, callback: impl FnMut(RtcpEvent) + Send + 'static) {
        self.state.lock().callbacks.on_rtcp = Some(Box::new(callback));
    }

    /// Encodes `pcm_bytes` (host little-endian s16) with the session's
    /// payload type and sends it. `timestamp` advances automatically by
    /// the sample count of `pcm_bytes` when omitted.
    pub async fn send_audio_pcm(&self, pcm_bytes: &[u8], timestamp: Option<u32>) -> Result<()> {
        let payload_type = { self.state.lock().out_payload_type };
        let encoded = self.registry.encode(payload_type, pcm_bytes)?;
        let samples = (pcm_bytes.len() / 2) as u32;
        self.send_audio_encoded(&encoded, timestamp, None, Some(samples))
            .await
    }

    /// Sends an already-encoded payload without re-encoding.
    pub async fn send_audio_encoded(
        &self,
        payload_bytes: &[u8],
        timestamp: Option<u32>,
        marker: Option<bool>,
        advance_samples: Option<u32>,
    ) -> Result<()> {
        let bytes = {
            let mut state = self.state.lock();
            if state.phase == Phase::Closed {
                return Err(Error::Session(SessionError::AlreadyClosed));
            }

            let sequence_number = state.out_sequence;
            state.out_sequence = state.out_sequence.wrapping_add(1);

            let ts = timestamp.unwrap_or(state.out_timestamp);
            if timestamp.is_none() {
                state.out_timestamp = state
                    .out_timestamp
                    .wrapping_add(advance_samples.unwrap_or(0));
            }

            let packet = RtpPacket {
                padding: false,
                extension: false,
                marker: marker.unwrap_or(false),
                payload_type: state.out_payload_type,
                sequence_number,
                timestamp: ts,
                ssrc: state.local_ssrc,
                csrc: vec![],
                extension_profile: None,
                extension_value: vec![],
                payload: payload_bytes.to_vec(),
                padding_len: 0,
            };

            state.packets_sent += 1;
            state.octets_sent += payload_bytes.len() as u32;
            state.sent_since_last_report = true;

            packet.serialize()
        };

        self.channel.send_to(&bytes, self.remote_addr).await?;
        Ok(())
    }

    /// Sends one DTMF digit as an RFC 4733 telephone-event packet train.
    /// Non-end packets are paced 20 ms apart; the three end packets are
    /// sent back-to-back.
    pub async fn send_dtmf(&self, digit: char, duration_ms: u32, timestamp: Option<u32>) -> Result<()> {
        let plan = dtmf::send_plan(digit, duration_ms, DTMF_VOLUME)?;

        let (ts, dtmf_pt) = {
            let state = self.state.lock();
            (timestamp.unwrap_or(state.out_timestamp), state.dtmf_payload_type)
        };

        for (index, event) in plan.iter().enumerate() {
            let bytes = {
                let mut state = self.state.lock();
                if state.phase == Phase::Closed {
                    return Err(Error::Session(SessionError::AlreadyClosed));
                }

                let sequence_number = state.out_sequence;
                state.out_sequence = state.out_sequence.wrapping_add(1);

                let packet = RtpPacket {
                    padding: false,
                    extension: false,
                    marker: event.marker,
                    payload_type: dtmf_pt,
                    sequence_number,
                    timestamp: ts,
                    ssrc: state.local_ssrc,
                    csrc: vec![],
                    extension_profile: None,
                    extension_value: vec![],
                    payload: event.payload.serialize().to_vec(),
                    padding_len: 0,
                };

                state.packets_sent += 1;
                state.octets_sent += packet.payload.len() as u32;
                state.sent_since_last_report = true;

                packet.serialize()
            };

            self.channel.send_to(&bytes, self.remote_addr).await?;

            let is_last = index + 1 == plan.len();
            if !event.payload.end && !is_last {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        Ok(())
    }

    /// Schedules a BYE, waits the configured grace period for in-flight
    /// sends to settle, then tears down the background tasks. Idempotent.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Draining || state.phase == Phase::Closed {
                return Ok(());
            }
            state.phase = Phase::Draining;
        }

        let bye_bytes = {
            let mut state = self.state.lock();
            let input = Self::report_input(&mut state);
            let packets = build_compound(&input, &state.cname, Some("session closed"));
            rtcp::serialize_compound(&packets)
        };
        self.channel.send_to(&bye_bytes, self.remote_addr).await?;

        tokio::time::sleep(self.close_grace).await;

        if let Some(handle) = self.recv_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.rtcp_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.dtmf_task.lock().take() {
            handle.abort();
        }
        self.channel.close();

        self.state.lock().phase = Phase::Closed;
        Ok(())
    }

    /// Builds the `ReportInput` for the next compound packet, rotating the
    /// loss tracker's per-interval counters in the process.
    fn report_input(state: &mut SessionState) -> ReportInput {
        let (ntp_seconds, ntp_fraction) = now_ntp();
        let (fraction_lost, cumulative_lost) = state.loss.report_and_reset();

        let (last_sr_timestamp, delay_since_last_sr) = match state.last_sr_received {
            Some((lsr, arrival)) => {
                let delay = (arrival.elapsed().as_secs_f64() * 65536.0) as u32;
                (lsr, delay)
            }
            None => (0, 0),
        };

        ReportInput {
            local_ssrc: state.local_ssrc,
            remote_ssrc: state.remote_ssrc,
            sent_since_last_report: state.sent_since_last_report,
            ntp_seconds,
            ntp_fraction,
            rtp_timestamp: state.out_timestamp,
            packet_count: state.packets_sent,
            octet_count: state.octets_sent,
            fraction_lost,
            cumulative_lost,
            extended_highest_sequence: state.loss.extended_highest_sequence(),
            jitter: state.jitter_estimator.jitter as u32,
            last_sr_timestamp,
            delay_since_last_sr,
        }
    }

    async fn recv_loop(channel: Arc<C>, state: Arc<Mutex<SessionState>>, registry: Arc<Registry>) {
        let mut buf = vec![0u8; 2048];

        loop {
            let (size, _addr) = match channel.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("voxrtp session receive error: {e}");
                    continue;
                }
            };

            if size < 4 {
                continue;
            }

            let datagram = &buf[..size];
            if is_rtcp(datagram) {
                Self::handle_rtcp(&state, datagram);
            } else {
                Self::handle_rtp(&state, &registry, datagram);
            }
        }
    }

    fn handle_rtp(state: &Arc<Mutex<SessionState>>, registry: &Arc<Registry>, datagram: &[u8]) {
        let packet = match RtpPacket::parse(datagram) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("voxrtp dropping unparseable RTP datagram: {e}");
                return;
            }
        };

        let mut state = state.lock();

        if state.remote_ssrc == Some(state.local_ssrc) {
            state.local_ssrc = rand::random::<u32>().max(1);
            if let Some(on_rtcp) = state.callbacks.on_rtcp.as_mut() {
                on_rtcp(RtcpEvent::SsrcCollision);
            }
        }

        if state.remote_ssrc.is_none() {
            state.remote_ssrc = Some(packet.ssrc);
        } else if state.remote_ssrc != Some(packet.ssrc) {
            state.remote_ssrc = Some(packet.ssrc);
            state.loss.reset();
            state.jitter_estimator.reset();
        }

        state.loss.on_packet(packet.sequence_number);

        let clock_rate = registry
            .get(packet.payload_type)
            .map(|c| c.clock_rate)
            .unwrap_or(8000);
        let arrival_units =
            ((state.created_at.elapsed().as_secs_f64()) * clock_rate as f64) as u32;
        state.jitter_estimator.update(packet.timestamp, arrival_units);

        let remote_ssrc = state.remote_ssrc.unwrap_or(packet.ssrc);
        let dtmf_pt = state.dtmf_payload_type;

        if packet.payload_type == dtmf_pt {
            if let Ok(event_payload) = TelephoneEventPayload::parse(&packet.payload) {
                if let Some(DtmfEvent { digit, duration, .. }) =
                    state.dtmf_assembler.on_packet(packet.timestamp, event_payload)
                {
                    if let Some(on_dtmf) = state.callbacks.on_dtmf.as_mut() {
                        on_dtmf(digit, duration);
                    }
                }
            }
            return;
        }

        match state.jitter_buffer.add(&packet, remote_ssrc) {
            Classification::Accepted | Classification::Displaced(_) => {}
            Classification::Duplicate | Classification::TooLate => return,
        }

        // Drain every contiguous frame that is actually present; stop at
        // the first gap rather than skipping it, since a later sequence
        // number having already arrived doesn't prove this one is lost —
        // it may simply still be in flight.
        // A still-open gap just leaves the read cursor where it is until a
        // fill arrives on a future packet.
        while let Some(Frame::Present(entry)) = state.jitter_buffer.peek() {
            state.jitter_buffer.advance();
            if let Ok(pcm) = registry.decode(entry.payload_type, &entry.payload) {
                if let Some(on_audio) = state.callbacks.on_audio.as_mut() {
                    on_audio(pcm, entry.timestamp);
                }
            }
        }
    }

    fn handle_rtcp(state: &Arc<Mutex<SessionState>>, datagram: &[u8]) {
        let packets = match rtcp::parse_compound(datagram) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("voxrtp dropping unparseable RTCP datagram: {e}");
                return;
            }
        };

        let mut state = state.lock();
        for packet in &packets {
            if let RtcpPacket::SenderReport(sr) = packet {
                state.last_sr_received = Some((sr.ntp_middle_bits(), Instant::now()));
            }
        }

        if let Some(on_rtcp) = state.callbacks.on_rtcp.as_mut() {
            on_rtcp(RtcpEvent::Received(packets));
        }
    }

    /// Periodically sweeps the DTMF assembler for groups that stalled
    /// without an end packet.
    async fn dtmf_expire_loop(state: Arc<Mutex<SessionState>>) {
        loop {
            tokio::time::sleep(DTMF_EXPIRE_TICK).await;

            let mut state = state.lock();
            if state.phase == Phase::Closed {
                return;
            }

            let expired = state.dtmf_assembler.expire(Instant::now());
            for DtmfEvent { digit, duration, .. } in expired {
                if let Some(on_dtmf) = state.callbacks.on_dtmf.as_mut() {
                    on_dtmf(digit, duration);
                }
            }
        }
    }

    async fn rtcp_loop(channel: Arc<C>, state: Arc<Mutex<SessionState>>, remote_addr: SocketAddr) {
        loop {
            let interval = {
                let mut state = state.lock();
                if state.phase == Phase::Closed {
                    return;
                }
                let is_sender = state.sent_since_last_report;
                state.scheduler.next_interval(is_sender)
            };

            tokio::time::sleep(interval).await;

            let bytes = {
                let mut state = state.lock();
                if state.phase == Phase::Closed {
                    return;
                }

                let input = Self::report_input(&mut state);
                let packets = build_compound(&input, &state.cname, None);
                let bytes = rtcp::serialize_compound(&packets);
                state.scheduler.record_packet_size(bytes.len());
                state.sent_since_last_report = false;
                bytes
            };

            if let Err(e) = channel.send_to(&bytes, remote_addr).await {
                log::warn!("voxrtp rtcp send error: {e}");
            }
        }
    }
}
