use bytes::{BufMut, BytesMut};

use crate::{ParseError, round_up_to_word};

const VERSION_MASK: u8 = 0b1100_0000;
const PADDING_BIT: u8 = 0b0010_0000;
const EXTENSION_BIT: u8 = 0b0001_0000;
const CSRC_COUNT_MASK: u8 = 0b0000_1111;
const MARKER_BIT: u8 = 0b1000_0000;
const PAYLOAD_TYPE_MASK: u8 = 0b0111_1111;

const FIXED_HEADER_LEN: usize = 12;
const RTP_VERSION: u8 = 2;

/// A parsed or to-be-serialized RTP packet (RFC 3550 §5.1).
///
/// ```text
///   0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `payload` never includes trailing padding: on parse the padding is
/// stripped and its length kept in `padding_len`; on serialize, when
/// `padding` is true, the encoder writes `padding_len` zero bytes followed
/// by a final byte holding `padding_len` itself, exactly the RFC 3550
/// convention. Callers that want 4-byte-aligned padding should set
/// `padding_len` via [`RtpPacket::pad_to_word`] before serializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: Option<u16>,
    pub extension_value: Vec<u8>,
    pub payload: Vec<u8>,
    /// Total padding octet count written on serialize, including the
    /// trailing length byte itself. Ignored unless `padding` is set.
    pub padding_len: u8,
}

impl RtpPacket {
    /// Sets `padding` and `padding_len` so that, once serialized, the packet
    /// occupies a multiple of 4 bytes — the convention used when a caller has
    /// no opinion on the exact padding length.
    pub fn pad_to_word(&mut self) {
        let unpadded = FIXED_HEADER_LEN
            + self.csrc.len() * 4
            + self.extension_header_len()
            + self.payload.len();

        let padded = round_up_to_word(unpadded + 1).max(unpadded + 1);
        let pad_len = padded - unpadded;
        self.padding = pad_len > 0;
        self.padding_len = pad_len as u8;
    }

    fn extension_header_len(&self) -> usize {
        if self.extension {
            4 + self.extension_value.len()
        } else {
            0
        }
    }

    /// Parses an RTP packet from a wire datagram.
    ///
    /// ```
    /// use voxrtp_codec::RtpPacket;
    ///
    /// let bytes = [
    ///     0x80, 0x00, 0x00, 0x01, // V=2,no pad/ext/csrc, M=0 PT=0, seq=1
    ///     0x00, 0x00, 0x00, 0xa0, // timestamp = 160
    ///     0x00, 0x00, 0x00, 0x2a, // ssrc = 42
    ///     0xff, 0xff, 0xff, 0xff, // payload
    /// ];
    ///
    /// let packet = RtpPacket::parse(&bytes).unwrap();
    /// assert_eq!(packet.sequence_number, 1);
    /// assert_eq!(packet.timestamp, 160);
    /// assert_eq!(packet.ssrc, 42);
    /// assert_eq!(packet.payload, vec![0xff; 4]);
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(ParseError::TooShort);
        }

        let b0 = bytes[0];
        let version = (b0 & VERSION_MASK) >> 6;
        if version != RTP_VERSION {
            return Err(ParseError::BadVersion);
        }

        let padding = (b0 & PADDING_BIT) != 0;
        let extension = (b0 & EXTENSION_BIT) != 0;
        let cc = (b0 & CSRC_COUNT_MASK) as usize;

        let b1 = bytes[1];
        let marker = (b1 & MARKER_BIT) != 0;
        let payload_type = b1 & PAYLOAD_TYPE_MASK;

        let sequence_number = u16::from_be_bytes([bytes[2], bytes[3]]);
        let timestamp = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let ssrc = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        let csrc_end = FIXED_HEADER_LEN + cc * 4;
        if csrc_end > bytes.len() {
            return Err(ParseError::TooShort);
        }

        let mut csrc = Vec::with_capacity(cc);
        for i in 0..cc {
            let off = FIXED_HEADER_LEN + i * 4;
            csrc.push(u32::from_be_bytes([
                bytes[off],
                bytes[off + 1],
                bytes[off + 2],
                bytes[off + 3],
            ]));
        }

        let mut cursor = csrc_end;
        let (extension_profile, extension_value) = if extension {
            if cursor + 4 > bytes.len() {
                return Err(ParseError::ExtensionOverrun);
            }

            let profile = u16::from_be_bytes([bytes[cursor], bytes[cursor + 1]]);
            let words = u16::from_be_bytes([bytes[cursor + 2], bytes[cursor + 3]]) as usize;
            let value_start = cursor + 4;
            let value_end = value_start + words * 4;
            if value_end > bytes.len() {
                return Err(ParseError::ExtensionOverrun);
            }

            cursor = value_end;
            (Some(profile), bytes[value_start..value_end].to_vec())
        } else {
            (None, Vec::new())
        };

        let (payload_end, padding_len) = if padding {
            if cursor >= bytes.len() {
                return Err(ParseError::InconsistentPadding);
            }

            let pad_len = *bytes.last().unwrap() as usize;
            if pad_len == 0 || cursor + pad_len > bytes.len() {
                return Err(ParseError::InconsistentPadding);
            }

            (bytes.len() - pad_len, pad_len as u8)
        } else {
            (bytes.len(), 0)
        };

        Ok(RtpPacket {
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extension_value,
            payload: bytes[cursor..payload_end].to_vec(),
            padding_len,
        })
    }

    /// Serializes this packet to wire format, the inverse of [`Self::parse`].
    ///
    /// ```
    /// use voxrtp_codec::RtpPacket;
    ///
    /// let bytes = [
    ///     0x80, 0x00, 0x00, 0x01,
    ///     0x00, 0x00, 0x00, 0xa0,
    ///     0x00, 0x00, 0x00, 0x2a,
    ///     0xff, 0xff, 0xff, 0xff,
    /// ];
    ///
    /// let packet = RtpPacket::parse(&bytes).unwrap();
    /// assert_eq!(packet.serialize(), bytes.to_vec());
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(
            FIXED_HEADER_LEN
                + self.csrc.len() * 4
                + self.extension_header_len()
                + self.payload.len()
                + self.padding_len as usize,
        );

        let mut b0 = RTP_VERSION << 6;
        if self.padding {
            b0 |= PADDING_BIT;
        }
        if self.extension {
            b0 |= EXTENSION_BIT;
        }
        b0 |= (self.csrc.len() as u8) & CSRC_COUNT_MASK;
        out.put_u8(b0);

        let mut b1 = self.payload_type & PAYLOAD_TYPE_MASK;
        if self.marker {
            b1 |= MARKER_BIT;
        }
        out.put_u8(b1);

        out.put_u16(self.sequence_number);
        out.put_u32(self.timestamp);
        out.put_u32(self.ssrc);

        for csrc in &self.csrc {
            out.put_u32(*csrc);
        }

        if self.extension {
            let profile = self.extension_profile.unwrap_or_default();
            out.put_u16(profile);
            out.put_u16((self.extension_value.len() / 4) as u16);
            out.extend_from_slice(&self.extension_value);
        }

        out.extend_from_slice(&self.payload);

        if self.padding && self.padding_len > 0 {
            out.resize(out.len() + self.padding_len as usize - 1, 0);
            out.put_u8(self.padding_len);
        }

        out.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_short_buffer() {
        assert_eq!(RtpPacket::parse(&[0u8; 4]), Err(ParseError::TooShort));
    }

    #[test]
    fn parse_rejects_bad_version() {
        let mut bytes = vec![0u8; 12];
        bytes[0] = 0b0100_0000; // version 1
        assert_eq!(RtpPacket::parse(&bytes), Err(ParseError::BadVersion));
    }

    #[test]
    fn round_trips_with_csrc_and_extension() {
        let packet = RtpPacket {
            padding: false,
            extension: true,
            marker: true,
            payload_type: 0,
            sequence_number: 9001,
            timestamp: 160_000,
            ssrc: 0xdead_beef,
            csrc: vec![1, 2, 3],
            extension_profile: Some(0xBEDE),
            extension_value: vec![1, 2, 3, 4, 5, 6, 7, 8],
            payload: vec![0xaa; 160],
            padding_len: 0,
        };

        let bytes = packet.serialize();
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn round_trips_with_padding() {
        let mut packet = RtpPacket {
            padding: false,
            extension: false,
            marker: false,
            payload_type: 0,
            sequence_number: 1,
            timestamp: 160,
            ssrc: 1,
            csrc: vec![],
            extension_profile: None,
            extension_value: vec![],
            payload: vec![1, 2, 3],
            padding_len: 0,
        };

        packet.pad_to_word();
        let bytes = packet.serialize();
        assert_eq!(bytes.len() % 4, 0);

        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.payload, vec![1, 2, 3]);
        assert_eq!(parsed.padding_len, packet.padding_len);
    }

    #[test]
    fn rejects_inconsistent_padding() {
        let mut bytes = vec![0x80, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes[0] |= 0b0010_0000; // padding bit
        bytes.push(0); // pad count byte says 0, which is invalid
        assert_eq!(
            RtpPacket::parse(&bytes),
            Err(ParseError::InconsistentPadding)
        );
    }

    #[test]
    fn rejects_extension_overrun() {
        let mut bytes = vec![0u8; 12];
        bytes[0] |= 0b0001_0000; // extension bit
        bytes.extend_from_slice(&[0, 0, 0, 5]); // claims 5 words, none present
        assert_eq!(RtpPacket::parse(&bytes), Err(ParseError::ExtensionOverrun));
    }
}
