mod bye;
mod report;
mod sdes;

pub use bye::Bye;
pub use report::{ReceiverReport, ReportBlock, SenderReport};
pub use sdes::{Sdes, SdesChunk, SdesItem, SdesItemKind};

use bytes::{BufMut, BytesMut};

use crate::ParseError;

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;

const RTCP_VERSION: u8 = 2;
const HEADER_LEN: usize = 4;

/// One packet of an RTCP compound datagram (RFC 3550 §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    Sdes(sdes::Sdes),
    Bye(Bye),
    App(App),
}

/// An opaque application-defined RTCP packet (RFC 3550 §6.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub subtype: u8,
    pub ssrc: u32,
    pub name: [u8; 4],
    pub data: Vec<u8>,
}

struct Header {
    padding: bool,
    count: u8,
    packet_type: u8,
    body_len: usize,
}

fn parse_header(bytes: &[u8]) -> Result<Header, ParseError> {
    if bytes.len() < HEADER_LEN {
        return Err(ParseError::TooShort);
    }

    let b0 = bytes[0];
    if (b0 >> 6) != RTCP_VERSION {
        return Err(ParseError::BadVersion);
    }

    let padding = (b0 & 0b0010_0000) != 0;
    let count = b0 & 0b0001_1111;
    let packet_type = bytes[1];
    let words = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let body_len = (words + 1) * 4;

    if body_len > bytes.len() {
        return Err(ParseError::BadLength);
    }

    Ok(Header {
        padding,
        count,
        packet_type,
        body_len,
    })
}

fn put_header(out: &mut BytesMut, count: u8, packet_type: u8, body_words: u16) {
    out.put_u8((RTCP_VERSION << 6) | (count & 0b0001_1111));
    out.put_u8(packet_type);
    out.put_u16(body_words);
}

/// Parses a compound RTCP datagram into its constituent sub-packets.
///
/// Each sub-packet's own length field is authoritative; the parser stops
/// at the end of the buffer or on `BadLength`.
///
/// ```
/// use voxrtp_codec::rtcp::{RtcpPacket, ReceiverReport, SdesChunk, SdesItem, SdesItemKind, serialize_compound};
///
/// let packets = vec![
///     RtcpPacket::ReceiverReport(ReceiverReport { ssrc: 1, reports: vec![] }),
///     RtcpPacket::Sdes(voxrtp_codec::rtcp::sdes_with_cname(1, "user@host")),
/// ];
///
/// let bytes = serialize_compound(&packets);
/// let parsed = voxrtp_codec::rtcp::parse_compound(&bytes).unwrap();
/// assert_eq!(parsed, packets);
/// ```
pub fn parse_compound(bytes: &[u8]) -> Result<Vec<RtcpPacket>, ParseError> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LEN <= bytes.len() {
        let chunk = &bytes[offset..];
        let header = parse_header(chunk)?;
        let body = &chunk[HEADER_LEN..header.body_len];
        let body = strip_padding(body, header.padding)?;

        let packet = match header.packet_type {
            PT_SR => RtcpPacket::SenderReport(SenderReport::decode_body(body, header.count)?),
            PT_RR => RtcpPacket::ReceiverReport(ReceiverReport::decode_body(body, header.count)?),
            PT_SDES => RtcpPacket::Sdes(sdes::Sdes::decode_body(body, header.count)?),
            PT_BYE => RtcpPacket::Bye(Bye::decode_body(body, header.count)?),
            PT_APP => RtcpPacket::App(decode_app(body, header.count)?),
            _ => return Err(ParseError::BadLength),
        };

        packets.push(packet);
        offset += header.body_len;
    }

    Ok(packets)
}

fn strip_padding(body: &[u8], padding: bool) -> Result<&[u8], ParseError> {
    if !padding {
        return Ok(body);
    }

    let pad_len = *body.last().ok_or(ParseError::InconsistentPadding)? as usize;
    if pad_len == 0 || pad_len > body.len() {
        return Err(ParseError::InconsistentPadding);
    }

    Ok(&body[..body.len() - pad_len])
}

fn decode_app(body: &[u8], subtype: u8) -> Result<App, ParseError> {
    if body.len() < 8 {
        return Err(ParseError::TooShort);
    }

    let ssrc = u32::from_be_bytes(body[0..4].try_into().unwrap());
    let name = [body[4], body[5], body[6], body[7]];
    Ok(App {
        subtype,
        ssrc,
        name,
        data: body[8..].to_vec(),
    })
}

fn encode_app(out: &mut BytesMut, app: &App) {
    let mut body = BytesMut::new();
    body.put_u32(app.ssrc);
    body.extend_from_slice(&app.name);
    body.extend_from_slice(&app.data);
    pad_body(&mut body);

    put_header(out, app.subtype, PT_APP, (body.len() / 4) as u16);
    out.extend_from_slice(&body);
}

/// Pads `body` to a 4-byte boundary with zero bytes, matching the header's
/// word-count convention. RTCP sub-packets within a compound datagram are
/// always word-aligned so a caller never needs to set the padding bit.
pub(crate) fn pad_body(body: &mut BytesMut) {
    while body.len() % 4 != 0 {
        body.put_u8(0);
    }
}

/// Serializes a sequence of RTCP sub-packets into one compound datagram.
pub fn serialize_compound(packets: &[RtcpPacket]) -> Vec<u8> {
    let mut out = BytesMut::new();

    for packet in packets {
        match packet {
            RtcpPacket::SenderReport(sr) => sr.encode(&mut out),
            RtcpPacket::ReceiverReport(rr) => rr.encode(&mut out),
            RtcpPacket::Sdes(sdes) => sdes.encode(&mut out),
            RtcpPacket::Bye(bye) => bye.encode(&mut out),
            RtcpPacket::App(app) => encode_app(&mut out, app),
        }
    }

    out.to_vec()
}

/// Convenience constructor for an SDES packet carrying a single chunk with
/// just a CNAME item, the minimum compound RTCP requires.
pub fn sdes_with_cname(ssrc: u32, cname: &str) -> sdes::Sdes {
    sdes::Sdes {
        chunks: vec![SdesChunk {
            ssrc,
            items: vec![SdesItem {
                kind: SdesItemKind::Cname,
                value: cname.to_string(),
            }],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_requires_sr_or_rr_first_by_convention() {
        let packets = vec![
            RtcpPacket::ReceiverReport(ReceiverReport {
                ssrc: 7,
                reports: vec![],
            }),
            RtcpPacket::Sdes(sdes_with_cname(7, "alice@example.com")),
        ];

        let bytes = serialize_compound(&packets);
        let parsed = parse_compound(&bytes).unwrap();
        assert_eq!(parsed, packets);
    }

    #[test]
    fn bad_length_stops_parsing() {
        let mut bytes = vec![0x80, PT_RR, 0xff, 0xff]; // claims a huge length
        bytes.extend_from_slice(&[0u8; 4]);
        assert_eq!(parse_compound(&bytes), Err(ParseError::BadLength));
    }

    #[test]
    fn app_packet_round_trips() {
        let packets = vec![RtcpPacket::App(App {
            subtype: 0,
            ssrc: 99,
            name: *b"VOXR",
            data: vec![1, 2, 3, 4],
        })];

        let bytes = serialize_compound(&packets);
        assert_eq!(parse_compound(&bytes).unwrap(), packets);
    }
}
