use bytes::{BufMut, BytesMut};

use crate::ParseError;

use super::pad_body;

/// RTCP Goodbye (PT=203, RFC 3550 §6.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    pub sources: Vec<u32>,
    pub reason: Option<String>,
}

impl Bye {
    pub(crate) fn decode_body(body: &[u8], count: u8) -> Result<Self, ParseError> {
        let sources_len = count as usize * 4;
        if sources_len > body.len() {
            return Err(ParseError::TooShort);
        }

        let mut sources = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let off = i * 4;
            sources.push(u32::from_be_bytes(body[off..off + 4].try_into().unwrap()));
        }

        let rest = &body[sources_len..];
        let reason = if let Some(&len) = rest.first() {
            let len = len as usize;
            if 1 + len > rest.len() {
                return Err(ParseError::TooShort);
            }
            Some(
                std::str::from_utf8(&rest[1..1 + len])
                    .map_err(|_| ParseError::BadLength)?
                    .to_string(),
            )
        } else {
            None
        };

        Ok(Self { sources, reason })
    }

    pub(crate) fn encode(&self, out: &mut BytesMut) {
        let mut body = BytesMut::new();
        for ssrc in &self.sources {
            body.put_u32(*ssrc);
        }

        if let Some(reason) = &self.reason {
            body.put_u8(reason.len() as u8);
            body.extend_from_slice(reason.as_bytes());
        }

        pad_body(&mut body);

        super::put_header(
            out,
            self.sources.len() as u8,
            super::PT_BYE,
            (body.len() / 4) as u16,
        );
        out.extend_from_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_reason() {
        let bye = Bye {
            sources: vec![1, 2],
            reason: Some("closing".to_string()),
        };

        let mut out = BytesMut::new();
        bye.encode(&mut out);
        let decoded = Bye::decode_body(&out[4..], 2).unwrap();
        assert_eq!(decoded, bye);
    }

    #[test]
    fn round_trips_without_reason() {
        let bye = Bye {
            sources: vec![7],
            reason: None,
        };

        let mut out = BytesMut::new();
        bye.encode(&mut out);
        let decoded = Bye::decode_body(&out[4..], 1).unwrap();
        assert_eq!(decoded, bye);
    }
}
