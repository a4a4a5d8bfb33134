use bytes::{BufMut, BytesMut};

use crate::ParseError;

use super::pad_body;

/// SDES item type codes (RFC 3550 §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdesItemKind {
    Cname,
    Name,
    Email,
    Phone,
    Loc,
    Tool,
    Note,
    Priv,
    Other(u8),
}

impl SdesItemKind {
    fn code(self) -> u8 {
        match self {
            Self::Cname => 1,
            Self::Name => 2,
            Self::Email => 3,
            Self::Phone => 4,
            Self::Loc => 5,
            Self::Tool => 6,
            Self::Note => 7,
            Self::Priv => 8,
            Self::Other(code) => code,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Cname,
            2 => Self::Name,
            3 => Self::Email,
            4 => Self::Phone,
            5 => Self::Loc,
            6 => Self::Tool,
            7 => Self::Note,
            8 => Self::Priv,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub kind: SdesItemKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub items: Vec<SdesItem>,
}

/// RTCP Source Description (PT=202, RFC 3550 §6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl Sdes {
    pub fn cname(&self, ssrc: u32) -> Option<&str> {
        self.chunks
            .iter()
            .find(|c| c.ssrc == ssrc)
            .and_then(|c| c.items.iter().find(|i| i.kind == SdesItemKind::Cname))
            .map(|i| i.value.as_str())
    }

    pub(crate) fn decode_body(body: &[u8], count: u8) -> Result<Self, ParseError> {
        let mut chunks = Vec::with_capacity(count as usize);
        let mut offset = 0;

        for _ in 0..count {
            if offset + 4 > body.len() {
                return Err(ParseError::TooShort);
            }

            let ssrc = u32::from_be_bytes(body[offset..offset + 4].try_into().unwrap());
            offset += 4;

            let chunk_start = offset;
            let mut items = Vec::new();
            loop {
                if offset >= body.len() {
                    return Err(ParseError::TooShort);
                }

                let type_code = body[offset];
                if type_code == 0 {
                    offset += 1;
                    break;
                }

                if offset + 2 > body.len() {
                    return Err(ParseError::TooShort);
                }

                let len = body[offset + 1] as usize;
                let value_start = offset + 2;
                let value_end = value_start + len;
                if value_end > body.len() {
                    return Err(ParseError::TooShort);
                }

                let value = std::str::from_utf8(&body[value_start..value_end])
                    .map_err(|_| ParseError::BadLength)?
                    .to_string();

                items.push(SdesItem {
                    kind: SdesItemKind::from_code(type_code),
                    value,
                });

                offset = value_end;
            }

            // chunks are padded to a 32-bit boundary, measured from the chunk start
            let consumed = offset - chunk_start;
            let pad = (4 - (consumed % 4)) % 4;
            offset += pad.min(body.len() - offset);

            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(Self { chunks })
    }

    pub(crate) fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();

        for chunk in &self.chunks {
            let chunk_start = body.len();
            body.put_u32(chunk.ssrc);

            for item in &chunk.items {
                body.put_u8(item.kind.code());
                body.put_u8(item.value.len() as u8);
                body.extend_from_slice(item.value.as_bytes());
            }

            body.put_u8(0); // terminator

            let consumed = body.len() - chunk_start - 4;
            let pad = (4 - (consumed % 4)) % 4;
            for _ in 0..pad {
                body.put_u8(0);
            }
        }

        pad_body(&mut body);

        super::put_header(
            out,
            self.chunks.len() as u8,
            super::PT_SDES,
            (body.len() / 4) as u16,
        );
        out.extend_from_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cname_round_trips() {
        let sdes = super::super::sdes_with_cname(42, "alice@example.com");
        let mut out = BytesMut::new();
        sdes.encode(&mut out);

        let decoded = Sdes::decode_body(&out[4..], 1).unwrap();
        assert_eq!(decoded.cname(42), Some("alice@example.com"));
    }

    #[test]
    fn multiple_items_round_trip() {
        let sdes = Sdes {
            chunks: vec![SdesChunk {
                ssrc: 1,
                items: vec![
                    SdesItem {
                        kind: SdesItemKind::Cname,
                        value: "a@b".to_string(),
                    },
                    SdesItem {
                        kind: SdesItemKind::Tool,
                        value: "voxrtp".to_string(),
                    },
                ],
            }],
        };

        let mut out = BytesMut::new();
        sdes.encode(&mut out);
        let decoded = Sdes::decode_body(&out[4..], 1).unwrap();
        assert_eq!(decoded, sdes);
    }
}
