//! TLV tokenizer
//!
//! A resumable tag-length-value scanner fed arbitrary byte chunks. It
//! parses one header at a time and, for primitive elements, accumulates
//! the announced number of content octets. Nesting is not its concern:
//! constructed elements produce a header event and the scanner moves on
//! to the tags inside, leaving boundary tracking to the decoding
//! container.

use std::mem;

/// Scanner position inside the current TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokState {
    /// Expecting a tag octet.
    Tag,
    /// Expecting the first length octet.
    LenFirst,
    /// Expecting `remaining` more long-form length octets.
    LenMore { remaining: u8 },
    /// Accumulating primitive content.
    Value { remaining: u64 },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TokEvent {
    /// A complete tag + length header. For constructed elements this is
    /// the only event; content is delivered as nested TLVs.
    Header {
        tag: u8,
        constructed: bool,
        len: u64,
        header_len: u8,
    },
    /// The complete content of a primitive element whose header was
    /// already delivered.
    Value { tag: u8, content: Vec<u8> },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TokError {
    /// High-tag-number form; LDAP never uses tag numbers above 30.
    HighTagNumber(u8),
    /// Indefinite length (0) or a long form wider than four octets.
    BadLength(u64),
}

#[derive(Debug)]
pub(crate) struct TlvTokenizer {
    state: TokState,
    tag: u8,
    constructed: bool,
    len: u64,
    header_len: u8,
    value: Vec<u8>,
}

// cap for upfront content reservation, so a lying length octet cannot
// trigger a huge allocation before the container rejects it
const MAX_PREALLOC: u64 = 64 * 1024;

impl TlvTokenizer {
    pub(crate) fn new() -> Self {
        TlvTokenizer {
            state: TokState::Tag,
            tag: 0,
            constructed: false,
            len: 0,
            header_len: 0,
            value: Vec::new(),
        }
    }

    /// True when the scanner sits between two TLVs.
    pub(crate) fn at_tag_boundary(&self) -> bool {
        self.state == TokState::Tag
    }

    /// Consume bytes from `input` starting at `*pos`, advancing `*pos`.
    ///
    /// Returns the next event, or `None` once the input is exhausted
    /// mid-TLV. Callers loop until `None` and dispatch each event before
    /// the next call, so boundary violations are detected before any
    /// content is buffered.
    pub(crate) fn advance(
        &mut self,
        input: &[u8],
        pos: &mut usize,
    ) -> Result<Option<TokEvent>, TokError> {
        loop {
            match self.state {
                TokState::Tag => {
                    let b = match input.get(*pos) {
                        Some(b) => *b,
                        None => return Ok(None),
                    };
                    *pos += 1;
                    if b & 0x1f == 0x1f {
                        return Err(TokError::HighTagNumber(b));
                    }
                    self.tag = b;
                    self.constructed = b & 0x20 != 0;
                    self.len = 0;
                    self.header_len = 1;
                    self.state = TokState::LenFirst;
                }
                TokState::LenFirst => {
                    let b = match input.get(*pos) {
                        Some(b) => *b,
                        None => return Ok(None),
                    };
                    *pos += 1;
                    self.header_len += 1;
                    if b & 0x80 == 0 {
                        self.len = u64::from(b);
                        return Ok(Some(self.finish_header()));
                    }
                    let n = b & 0x7f;
                    if n == 0 || n > 4 {
                        return Err(TokError::BadLength(u64::from(n)));
                    }
                    self.state = TokState::LenMore { remaining: n };
                }
                TokState::LenMore { remaining } => {
                    let b = match input.get(*pos) {
                        Some(b) => *b,
                        None => return Ok(None),
                    };
                    *pos += 1;
                    self.header_len += 1;
                    self.len = (self.len << 8) | u64::from(b);
                    if remaining == 1 {
                        return Ok(Some(self.finish_header()));
                    }
                    self.state = TokState::LenMore {
                        remaining: remaining - 1,
                    };
                }
                TokState::Value { remaining } => {
                    if remaining == 0 {
                        self.state = TokState::Tag;
                        return Ok(Some(TokEvent::Value {
                            tag: self.tag,
                            content: mem::take(&mut self.value),
                        }));
                    }
                    let avail = input.len() - *pos;
                    if avail == 0 {
                        return Ok(None);
                    }
                    let take = remaining.min(avail as u64) as usize;
                    self.value.extend_from_slice(&input[*pos..*pos + take]);
                    *pos += take;
                    self.state = TokState::Value {
                        remaining: remaining - take as u64,
                    };
                }
            }
        }
    }

    fn finish_header(&mut self) -> TokEvent {
        if self.constructed {
            self.state = TokState::Tag;
        } else {
            self.state = TokState::Value {
                remaining: self.len,
            };
            self.value = Vec::with_capacity(self.len.min(MAX_PREALLOC) as usize);
        }
        TokEvent::Header {
            tag: self.tag,
            constructed: self.constructed,
            len: self.len,
            header_len: self.header_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn drain(tok: &mut TlvTokenizer, input: &[u8]) -> Vec<TokEvent> {
        let mut pos = 0;
        let mut out = Vec::new();
        while let Some(ev) = tok.advance(input, &mut pos).expect("tokenizer failed") {
            out.push(ev);
        }
        assert_eq!(pos, input.len());
        out
    }

    #[test]
    fn test_primitive_whole() {
        let mut tok = TlvTokenizer::new();
        let evs = drain(&mut tok, &hex!("02 02 ff 7f"));
        assert_eq!(
            evs,
            vec![
                TokEvent::Header {
                    tag: 0x02,
                    constructed: false,
                    len: 2,
                    header_len: 2
                },
                TokEvent::Value {
                    tag: 0x02,
                    content: vec![0xff, 0x7f]
                },
            ]
        );
        assert!(tok.at_tag_boundary());
    }

    #[test]
    fn test_constructed_header_only() {
        let mut tok = TlvTokenizer::new();
        let evs = drain(&mut tok, &hex!("30 03 04 01 61"));
        assert_eq!(evs.len(), 3);
        assert_eq!(
            evs[0],
            TokEvent::Header {
                tag: 0x30,
                constructed: true,
                len: 3,
                header_len: 2
            }
        );
    }

    #[test]
    fn test_byte_at_a_time() {
        let data = hex!("04 82 01 00");
        let payload = vec![0xabu8; 0x100];
        let mut whole = data.to_vec();
        whole.extend_from_slice(&payload);

        let mut tok = TlvTokenizer::new();
        let mut evs = Vec::new();
        for b in &whole {
            let mut pos = 0;
            while let Some(ev) = tok
                .advance(std::slice::from_ref(b), &mut pos)
                .expect("tokenizer failed")
            {
                evs.push(ev);
            }
        }
        assert_eq!(evs.len(), 2);
        assert_eq!(
            evs[0],
            TokEvent::Header {
                tag: 0x04,
                constructed: false,
                len: 0x100,
                header_len: 4
            }
        );
        match &evs[1] {
            TokEvent::Value { tag: 0x04, content } => assert_eq!(content, &payload),
            ev => panic!("unexpected event {:?}", ev),
        }
    }

    #[test]
    fn test_zero_length_primitive() {
        let mut tok = TlvTokenizer::new();
        let evs = drain(&mut tok, &hex!("04 00"));
        assert_eq!(evs.len(), 2);
        assert_eq!(
            evs[1],
            TokEvent::Value {
                tag: 0x04,
                content: vec![]
            }
        );
    }

    #[test]
    fn test_indefinite_rejected() {
        let mut tok = TlvTokenizer::new();
        let mut pos = 0;
        assert_eq!(
            tok.advance(&hex!("30 80"), &mut pos),
            Err(TokError::BadLength(0))
        );
    }

    #[test]
    fn test_wide_length_rejected() {
        let mut tok = TlvTokenizer::new();
        let mut pos = 0;
        assert_eq!(
            tok.advance(&hex!("30 85 01 02 03 04 05"), &mut pos),
            Err(TokError::BadLength(5))
        );
    }

    #[test]
    fn test_high_tag_rejected() {
        let mut tok = TlvTokenizer::new();
        let mut pos = 0;
        assert_eq!(
            tok.advance(&hex!("bf 87 68 00"), &mut pos),
            Err(TokError::HighTagNumber(0xbf))
        );
    }
}
