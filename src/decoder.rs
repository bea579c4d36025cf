//! Decoding container
//!
//! One [`Decoder`] per byte stream. It owns the TLV tokenizer, a stack
//! of pending container boundaries, the message under construction and
//! a queue of completed messages. Bytes go in through [`Decoder::feed`]
//! in chunks of any size; messages come out through
//! [`Decoder::next_message`] in the order their final byte arrived.
//!
//! Fatal errors poison the container: the same error is reported from
//! then on, and the only recovery is to drop the container (and close
//! the transport, if any). Nothing else needs cleaning up.

use crate::error::DecoderError;
use crate::filter::AttributeValue;
use crate::grammar::{DecoderState, FilterAssembler, FrameKind, PendingOp};
use crate::ldap::{Control, LdapMessage, LdapString, MessageID, ProtocolOp};
use crate::options::CodecOptions;
use crate::tlv::{TlvTokenizer, TokError, TokEvent};

use log::{debug, trace};
use std::collections::VecDeque;

/// A pending container boundary: the stream offset where the element
/// must end, its opening tag (for diagnostics) and what it delimits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub(crate) end: u64,
    pub(crate) tag: u8,
    pub(crate) kind: FrameKind,
}

/// Streaming LDAP message decoder.
///
/// Not `Sync`: one decoder serves exactly one stream. Independent
/// decoders may run on independent threads.
#[derive(Debug)]
pub struct Decoder {
    pub(crate) opts: CodecOptions,
    tok: TlvTokenizer,
    /// Total bytes consumed from the stream since creation.
    consumed: u64,
    pub(crate) frames: Vec<Frame>,
    pub(crate) state: DecoderState,
    // message under construction
    pub(crate) message_id: MessageID,
    pub(crate) seen_id: bool,
    pub(crate) op: Option<ProtocolOp>,
    pub(crate) pending: PendingOp,
    pub(crate) controls: Option<Vec<Control>>,
    pub(crate) control: Option<Control>,
    pub(crate) attr_type: LdapString,
    pub(crate) attr_vals: Vec<AttributeValue>,
    pub(crate) ava_attr: LdapString,
    pub(crate) ava_value: Vec<u8>,
    pub(crate) filter: FilterAssembler,
    // results
    ready: VecDeque<LdapMessage>,
    poison: Option<DecoderError>,
    failed_id: Option<MessageID>,
    /// True whenever the stream sits on a message boundary.
    end_allowed: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Decoder::with_options(CodecOptions::default())
    }

    pub fn with_options(opts: CodecOptions) -> Self {
        Decoder {
            opts,
            tok: TlvTokenizer::new(),
            consumed: 0,
            frames: Vec::new(),
            state: DecoderState::Start,
            message_id: MessageID(0),
            seen_id: false,
            op: None,
            pending: PendingOp::Idle,
            controls: None,
            control: None,
            attr_type: LdapString(String::new()),
            attr_vals: Vec::new(),
            ava_attr: LdapString(String::new()),
            ava_value: Vec::new(),
            filter: FilterAssembler::default(),
            ready: VecDeque::new(),
            poison: None,
            failed_id: None,
            end_allowed: true,
        }
    }

    /// Feed a chunk of bytes into the decoder.
    ///
    /// Chunks may split PDUs, headers, and even single length fields at
    /// any byte boundary. Returns the number of messages ready for
    /// [`Decoder::next_message`], or the stream's fatal error.
    pub fn feed(&mut self, input: &[u8]) -> Result<usize, DecoderError> {
        if let Some(err) = &self.poison {
            return Err(err.clone());
        }
        let mut pos = 0;
        loop {
            let before = pos;
            let step = self.tok.advance(input, &mut pos);
            self.consumed += (pos - before) as u64;
            match step {
                Ok(Some(ev)) => {
                    if let Err(err) = self.dispatch(ev) {
                        return Err(self.poison(err));
                    }
                }
                Ok(None) => break,
                Err(TokError::HighTagNumber(tag)) => {
                    let err = DecoderError::UnexpectedTag {
                        state: self.state,
                        tag,
                    };
                    return Err(self.poison(err));
                }
                Err(TokError::BadLength(l)) => {
                    return Err(self.poison(DecoderError::LengthOutOfRange(l)));
                }
            }
        }
        Ok(self.ready.len())
    }

    /// Take the next completed message, in arrival order.
    ///
    /// Messages completed before a stream failure are still delivered;
    /// once drained, the failure is reported on every call.
    pub fn next_message(&mut self) -> Result<Option<LdapMessage>, DecoderError> {
        if let Some(msg) = self.ready.pop_front() {
            return Ok(Some(msg));
        }
        match &self.poison {
            Some(err) => Err(err.clone()),
            None => Ok(None),
        }
    }

    /// Check that the stream ended on a message boundary.
    pub fn finish(&self) -> Result<(), DecoderError> {
        if let Some(err) = &self.poison {
            return Err(err.clone());
        }
        if self.end_allowed && self.frames.is_empty() && self.tok.at_tag_boundary() {
            Ok(())
        } else {
            Err(DecoderError::TruncatedInput)
        }
    }

    /// The message id of the PDU that killed the stream, when one had
    /// been parsed before the failure.
    pub fn failed_message_id(&self) -> Option<MessageID> {
        self.failed_id
    }

    fn poison(&mut self, err: DecoderError) -> DecoderError {
        debug!("decoder poisoned: {}", err);
        if self.seen_id {
            self.failed_id = Some(self.message_id);
        }
        self.poison = Some(err.clone());
        err
    }

    fn dispatch(&mut self, ev: TokEvent) -> Result<(), DecoderError> {
        match ev {
            TokEvent::Header {
                tag,
                constructed,
                len,
                header_len,
            } => {
                trace!(
                    "tlv header: tag {:#04x} len {} at offset {}",
                    tag,
                    len,
                    self.consumed
                );
                match self.frames.last() {
                    None => {
                        // only a message SEQUENCE may open at top level
                        if self.state != DecoderState::Start || tag != 0x30 || !constructed {
                            return Err(DecoderError::UnexpectedTag {
                                state: self.state,
                                tag,
                            });
                        }
                        let total = u64::from(header_len) + len;
                        if total > u64::from(self.opts.max_pdu_size) {
                            return Err(DecoderError::MaxPduExceeded(total));
                        }
                        self.end_allowed = false;
                        self.frames.push(Frame {
                            end: self.consumed + len,
                            tag,
                            kind: FrameKind::Message,
                        });
                        self.state = DecoderState::MessageId;
                        Ok(())
                    }
                    Some(parent) => {
                        let end = self.consumed + len;
                        if end > parent.end {
                            return Err(DecoderError::TruncatedContainer);
                        }
                        if constructed {
                            self.on_constructed(tag, end)?;
                            self.pop_finished_frames()
                        } else {
                            // content follows; the action fires on the
                            // value event
                            Ok(())
                        }
                    }
                }
            }
            TokEvent::Value { tag, content } => {
                self.on_value(tag, content)?;
                self.pop_finished_frames()
            }
        }
    }

    fn pop_finished_frames(&mut self) -> Result<(), DecoderError> {
        while let Some(top) = self.frames.last() {
            if self.consumed < top.end {
                break;
            }
            if self.consumed > top.end {
                return Err(DecoderError::TruncatedContainer);
            }
            let frame = match self.frames.pop() {
                Some(f) => f,
                None => break,
            };
            self.on_frame_end(frame)?;
        }
        Ok(())
    }

    /// Called by the grammar when the message frame closes cleanly.
    pub(crate) fn finish_message(&mut self) -> Result<(), DecoderError> {
        let op = match self.op.take() {
            Some(op) => op,
            None => {
                return Err(DecoderError::GrammarError {
                    state: self.state,
                    tag: 0x30,
                })
            }
        };
        let msg = LdapMessage {
            message_id: self.message_id,
            protocol_op: op,
            controls: self.controls.take(),
        };
        debug!("decoded message {}", msg.message_id.0);
        self.ready.push_back(msg);
        self.seen_id = false;
        self.message_id = MessageID(0);
        self.state = DecoderState::Start;
        self.end_allowed = true;
        Ok(())
    }
}

/// Decode a single message from a complete byte slice.
///
/// Returns `TruncatedInput` if the slice does not hold a full PDU.
pub fn decode(input: &[u8]) -> Result<LdapMessage, DecoderError> {
    let mut decoder = Decoder::new();
    decoder.feed(input)?;
    match decoder.next_message()? {
        Some(msg) => Ok(msg),
        None => Err(DecoderError::TruncatedInput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const UNBIND: &[u8] = &hex!("30 05 02 01 03 42 00");

    #[test]
    fn test_poisoned_stream_replays_error() {
        let mut decoder = Decoder::new();
        // first length octet announces indefinite form
        let err = decoder.feed(&hex!("30 80")).expect_err("expected error");
        assert_eq!(err, DecoderError::LengthOutOfRange(0));
        assert_eq!(decoder.feed(UNBIND), Err(err.clone()));
        assert_eq!(decoder.next_message(), Err(err));
    }

    #[test]
    fn test_failed_message_id_reported() {
        let mut decoder = Decoder::new();
        // valid envelope and id, unknown protocol op [APPLICATION 21]
        let err = decoder
            .feed(&hex!("30 06 02 01 07 75 01 00"))
            .expect_err("expected error");
        assert_eq!(err, DecoderError::UnsupportedChoice(0x75));
        assert_eq!(decoder.failed_message_id(), Some(MessageID(7)));
    }

    #[test]
    fn test_max_pdu_size_enforced() {
        let opts = CodecOptions::default().max_pdu_size(16);
        let mut decoder = Decoder::with_options(opts);
        let err = decoder
            .feed(&hex!("30 82 01 00 02 01 01"))
            .expect_err("expected error");
        assert_eq!(err, DecoderError::MaxPduExceeded(0x104));
    }

    #[test]
    fn test_messages_before_failure_are_delivered() {
        let mut input = UNBIND.to_vec();
        input.extend_from_slice(&hex!("30 80"));
        let mut decoder = Decoder::new();
        let err = decoder.feed(&input).expect_err("expected error");
        // the unbind decoded before the stream died
        let msg = decoder.next_message().expect("queued message").expect("one message");
        assert_eq!(msg.protocol_op, ProtocolOp::UnbindRequest);
        assert_eq!(decoder.next_message(), Err(err));
    }

    #[test]
    fn test_finish_mid_pdu() {
        let mut decoder = Decoder::new();
        decoder.feed(&UNBIND[..3]).expect("feed failed");
        assert_eq!(decoder.finish(), Err(DecoderError::TruncatedInput));
        decoder.feed(&UNBIND[3..]).expect("feed failed");
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_decode_one_shot_truncated() {
        assert_eq!(decode(&UNBIND[..5]), Err(DecoderError::TruncatedInput));
    }
}
