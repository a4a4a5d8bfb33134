use bytes::{BufMut, BytesMut};

use crate::ParseError;

use super::pad_body;

const REPORT_BLOCK_LEN: usize = 24;

/// One reception report block (RFC 3550 §6.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    /// Signed 24-bit cumulative packet loss count.
    pub cumulative_lost: i32,
    /// Sequence cycle count in the top 16 bits, highest sequence seen in the
    /// low 16 bits.
    pub extended_highest_sequence: u32,
    pub jitter: u32,
    /// Middle 32 bits of the remote's last SR NTP timestamp, 0 if none seen.
    pub last_sr_timestamp: u32,
    /// Delay since the last SR, in 1/65536 s units.
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u32(self.ssrc);

        let lost = (self.cumulative_lost as u32) & 0x00FF_FFFF;
        out.put_u8(self.fraction_lost);
        out.put_u8(((lost >> 16) & 0xff) as u8);
        out.put_u8(((lost >> 8) & 0xff) as u8);
        out.put_u8((lost & 0xff) as u8);

        out.put_u32(self.extended_highest_sequence);
        out.put_u32(self.jitter);
        out.put_u32(self.last_sr_timestamp);
        out.put_u32(self.delay_since_last_sr);
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < REPORT_BLOCK_LEN {
            return Err(ParseError::TooShort);
        }

        let ssrc = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let fraction_lost = bytes[4];
        let raw_lost = ((bytes[5] as u32) << 16) | ((bytes[6] as u32) << 8) | (bytes[7] as u32);
        // sign-extend the 24-bit two's complement value
        let cumulative_lost = if raw_lost & 0x0080_0000 != 0 {
            (raw_lost | 0xFF00_0000) as i32
        } else {
            raw_lost as i32
        };

        let extended_highest_sequence = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let jitter = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
        let last_sr_timestamp = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let delay_since_last_sr = u32::from_be_bytes(bytes[20..24].try_into().unwrap());

        Ok(Self {
            ssrc,
            fraction_lost,
            cumulative_lost,
            extended_highest_sequence,
            jitter,
            last_sr_timestamp,
            delay_since_last_sr,
        })
    }
}

fn decode_reports(bytes: &[u8], count: u8) -> Result<Vec<ReportBlock>, ParseError> {
    let mut reports = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let off = i * REPORT_BLOCK_LEN;
        let end = off + REPORT_BLOCK_LEN;
        if end > bytes.len() {
            return Err(ParseError::TooShort);
        }
        reports.push(ReportBlock::decode(&bytes[off..end])?);
    }
    Ok(reports)
}

/// RTCP Sender Report (PT=200, RFC 3550 §6.4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReportBlock>,
}

impl SenderReport {
    pub(crate) fn decode_body(body: &[u8], count: u8) -> Result<Self, ParseError> {
        if body.len() < 24 {
            return Err(ParseError::TooShort);
        }

        Ok(Self {
            ssrc: u32::from_be_bytes(body[0..4].try_into().unwrap()),
            ntp_seconds: u32::from_be_bytes(body[4..8].try_into().unwrap()),
            ntp_fraction: u32::from_be_bytes(body[8..12].try_into().unwrap()),
            rtp_timestamp: u32::from_be_bytes(body[12..16].try_into().unwrap()),
            packet_count: u32::from_be_bytes(body[16..20].try_into().unwrap()),
            octet_count: u32::from_be_bytes(body[20..24].try_into().unwrap()),
            reports: decode_reports(&body[24..], count)?,
        })
    }

    pub(crate) fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        body.put_u32(self.ssrc);
        body.put_u32(self.ntp_seconds);
        body.put_u32(self.ntp_fraction);
        body.put_u32(self.rtp_timestamp);
        body.put_u32(self.packet_count);
        body.put_u32(self.octet_count);
        for report in &self.reports {
            report.encode(&mut body);
        }
        pad_body(&mut body);

        super::put_header(
            out,
            self.reports.len() as u8,
            super::PT_SR,
            (body.len() / 4) as u16,
        );
        out.extend_from_slice(&body);
    }

    /// Middle 32 bits of the NTP timestamp, as used in report blocks' LSR field.
    pub fn ntp_middle_bits(&self) -> u32 {
        ((self.ntp_seconds as u64) << 16 | (self.ntp_fraction as u64) >> 16) as u32
    }
}

/// RTCP Receiver Report (PT=201, RFC 3550 §6.4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl ReceiverReport {
    pub(crate) fn decode_body(body: &[u8], count: u8) -> Result<Self, ParseError> {
        if body.len() < 4 {
            return Err(ParseError::TooShort);
        }

        Ok(Self {
            ssrc: u32::from_be_bytes(body[0..4].try_into().unwrap()),
            reports: decode_reports(&body[4..], count)?,
        })
    }

    pub(crate) fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        body.put_u32(self.ssrc);
        for report in &self.reports {
            report.encode(&mut body);
        }
        pad_body(&mut body);

        super::put_header(
            out,
            self.reports.len() as u8,
            super::PT_RR,
            (body.len() / 4) as u16,
        );
        out.extend_from_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_block_round_trips_negative_loss() {
        let block = ReportBlock {
            ssrc: 1,
            fraction_lost: 12,
            cumulative_lost: -5,
            extended_highest_sequence: 65537,
            jitter: 42,
            last_sr_timestamp: 0,
            delay_since_last_sr: 0,
        };

        let mut out = BytesMut::new();
        block.encode(&mut out);
        let decoded = ReportBlock::decode(&out).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn sender_report_round_trips() {
        let sr = SenderReport {
            ssrc: 1,
            ntp_seconds: 123,
            ntp_fraction: 456,
            rtp_timestamp: 789,
            packet_count: 10,
            octet_count: 1600,
            reports: vec![ReportBlock {
                ssrc: 2,
                fraction_lost: 0,
                cumulative_lost: 0,
                extended_highest_sequence: 5,
                jitter: 0,
                last_sr_timestamp: 0,
                delay_since_last_sr: 0,
            }],
        };

        let mut out = BytesMut::new();
        sr.encode(&mut out);
        let decoded = SenderReport::decode_body(&out[4..], 1).unwrap();
        assert_eq!(decoded, sr);
    }
}
