//! RTCP report interval scheduling (RFC 3550 §6.3) and compound-packet
//! construction.
//!
//! The interval formula and the `n/2` BYE reconsideration rule come
//! straight from RFC 3550; the random component reuses the same `rand`
//! crate `crates/service/src/session/ports.rs` already pulls in for its own
//! randomized allocation, so this module doesn't introduce a new
//! dependency to the stack.

use std::time::Duration;

use rand::Rng;
use voxrtp_codec::rtcp::{sdes_with_cname, Bye, ReceiverReport, ReportBlock, RtcpPacket, SenderReport};

/// Minimum interval enforced once the first report has been sent.
const MIN_INTERVAL: Duration = Duration::from_secs(5);
/// Fraction of RTCP bandwidth allotted to senders vs receivers (RFC 3550
/// §6.2: senders get 25%, receivers share the remaining 75%).
const SENDER_BANDWIDTH_FRACTION: f64 = 0.25;
const RECEIVER_BANDWIDTH_FRACTION: f64 = 0.75;
/// EWMA weight for the average compound packet size (RFC 3550 §6.3.3).
const AVG_SIZE_WEIGHT: f64 = 1.0 / 16.0;

pub struct RtcpScheduler {
    rtcp_bandwidth_bps: u32,
    avg_packet_size: f64,
    members: f64,
    first_report_sent: bool,
}

impl RtcpScheduler {
    pub fn new(rtcp_bandwidth_bps: u32) -> Self {
        Self {
            rtcp_bandwidth_bps,
            // Seeded with a plausible SDES+RR size so the very first
            // interval isn't computed against a zero average.
            avg_packet_size: 80.0,
            members: 2.0,
            first_report_sent: false,
        }
    }

    /// Folds the size of a just-sent or just-received compound packet into
    /// the running EWMA (RFC 3550 §6.3.3).
    pub fn record_packet_size(&mut self, size: usize) {
        self.avg_packet_size += (size as f64 - self.avg_packet_size) * AVG_SIZE_WEIGHT;
    }

    fn nominal_interval(&self, is_sender: bool, members: f64) -> f64 {
        let fraction = if is_sender {
            SENDER_BANDWIDTH_FRACTION
        } else {
            RECEIVER_BANDWIDTH_FRACTION
        };

        let rtcp_bandwidth_bytes = self.rtcp_bandwidth_bps as f64 / 8.0;
        let effective_bandwidth = (rtcp_bandwidth_bytes * fraction).max(1.0);
        let nominal = (self.avg_packet_size * members) / effective_bandwidth;

        if self.first_report_sent {
            nominal
        } else {
            // RFC 3550's "initial half": halve the computed interval for
            // the very first report so peers learn about each other fast.
            nominal / 2.0
        }
    }

    /// Randomizes `nominal` by a factor in [0.5, 1.5] and, once the first
    /// report has gone out, floors the *randomized* result at `MIN_INTERVAL`
    /// — flooring `nominal` beforehand would still let the 0.5 factor pull
    /// the result back under the minimum.
    fn randomized(&self, nominal: f64, apply_floor: bool) -> Duration {
        let factor = rand::rng().random_range(0.5..=1.5);
        let interval = (nominal * factor).max(0.0);
        let interval = if apply_floor {
            interval.max(MIN_INTERVAL.as_secs_f64())
        } else {
            interval
        };
        Duration::from_secs_f64(interval)
    }

    /// The next scheduled interval for an ordinary (non-BYE) report.
    pub fn next_interval(&mut self, is_sender: bool) -> Duration {
        let apply_floor = self.first_report_sent;
        let nominal = self.nominal_interval(is_sender, self.members);
        self.first_report_sent = true;
        self.randomized(nominal, apply_floor)
    }

    /// Interval reconsideration on BYE (RFC 3550 §6.3.7): recompute with
    /// half the member count so the goodbye gets out promptly without
    /// flooding a large session.
    pub fn next_interval_on_bye(&mut self, is_sender: bool) -> Duration {
        let apply_floor = self.first_report_sent;
        let members = (self.members / 2.0).max(1.0);
        let nominal = self.nominal_interval(is_sender, members);
        self.randomized(nominal, apply_floor)
    }
}

/// Everything [`build_compound`] needs from session state to build one
/// report; kept as a plain data bag so the scheduler has no dependency on
/// `Session` itself.
pub struct ReportInput {
    pub local_ssrc: u32,
    pub remote_ssrc: Option<u32>,
    pub sent_since_last_report: bool,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
    pub extended_highest_sequence: u32,
    pub jitter: u32,
    pub last_sr_timestamp: u32,
    pub delay_since_last_sr: u32,
}

/// Builds one compound RTCP datagram's worth of packets. On close,
/// `bye_reason` is `Some` and the BYE replaces SR/RR entirely rather than
/// being appended alongside it.
pub fn build_compound(input: &ReportInput, cname: &str, bye_reason: Option<&str>) -> Vec<RtcpPacket> {
    let mut packets = Vec::new();

    let report_block = input.remote_ssrc.map(|ssrc| ReportBlock {
        ssrc,
        fraction_lost: input.fraction_lost,
        cumulative_lost: input.cumulative_lost,
        extended_highest_sequence: input.extended_highest_sequence,
        jitter: input.jitter,
        last_sr_timestamp: input.last_sr_timestamp,
        delay_since_last_sr: input.delay_since_last_sr,
    });
    let reports: Vec<ReportBlock> = report_block.into_iter().collect();

    if let Some(reason) = bye_reason {
        packets.push(RtcpPacket::Bye(Bye {
            sources: vec![input.local_ssrc],
            reason: Some(reason.to_string()),
        }));
    } else if input.sent_since_last_report {
        packets.push(RtcpPacket::SenderReport(SenderReport {
            ssrc: input.local_ssrc,
            ntp_seconds: input.ntp_seconds,
            ntp_fraction: input.ntp_fraction,
            rtp_timestamp: input.rtp_timestamp,
            packet_count: input.packet_count,
            octet_count: input.octet_count,
            reports,
        }));
    } else {
        packets.push(RtcpPacket::ReceiverReport(ReceiverReport {
            ssrc: input.local_ssrc,
            reports,
        }));
    }

    packets.push(RtcpPacket::Sdes(sdes_with_cname(input.local_ssrc, cname)));
    packets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_never_falls_below_minimum_after_first_report() {
        let mut scheduler = RtcpScheduler::new(64_000);
        scheduler.next_interval(false); // consumes the halved initial interval

        for _ in 0..200 {
            assert!(scheduler.next_interval(false) >= MIN_INTERVAL);
        }
    }

    #[test]
    fn silence_produces_receiver_report_with_cname() {
        let input = ReportInput {
            local_ssrc: 0xC0FFEE,
            remote_ssrc: Some(0xBEEF),
            sent_since_last_report: false,
            ntp_seconds: 0,
            ntp_fraction: 0,
            rtp_timestamp: 0,
            packet_count: 0,
            octet_count: 0,
            fraction_lost: 0,
            cumulative_lost: 0,
            extended_highest_sequence: 0,
            jitter: 0,
            last_sr_timestamp: 0,
            delay_since_last_sr: 0,
        };

        let packets = build_compound(&input, "user@host", None);
        assert!(matches!(packets[0], RtcpPacket::ReceiverReport(_)));
        assert!(matches!(packets[1], RtcpPacket::Sdes(_)));
    }

    #[test]
    fn close_replaces_sr_rr_with_bye() {
        let input = ReportInput {
            local_ssrc: 1,
            remote_ssrc: None,
            sent_since_last_report: true,
            ntp_seconds: 0,
            ntp_fraction: 0,
            rtp_timestamp: 0,
            packet_count: 0,
            octet_count: 0,
            fraction_lost: 0,
            cumulative_lost: 0,
            extended_highest_sequence: 0,
            jitter: 0,
            last_sr_timestamp: 0,
            delay_since_last_sr: 0,
        };

        let packets = build_compound(&input, "user@host", Some("session ended"));
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[0], RtcpPacket::Bye(_)));
    }
}
