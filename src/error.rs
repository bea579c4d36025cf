//! LDAP codec errors

use crate::grammar::DecoderState;

/// An error raised while encoding a message into a PDU.
///
/// Both fallible variants carry the id of the message being encoded so
/// the caller can correlate the failure with an outstanding operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncoderError {
    /// The output buffer is too small for the PDU.
    #[error("output buffer too small while encoding message {message_id}")]
    Overflow { message_id: i32 },

    /// The message violates a structural invariant and has no valid
    /// encoding, or the precomputed lengths do not match the message.
    #[error("message {message_id} is not encodable: {detail}")]
    InvalidState {
        message_id: i32,
        detail: &'static str,
    },

    /// The operation discriminant has no entry in the dispatch tables.
    #[error("no encoding for protocol operation {tag}")]
    UnknownOp { tag: u32 },
}

/// An error raised while decoding a byte stream.
///
/// `TruncatedInput` only signals that more bytes are needed and leaves
/// the stream usable. Every other variant is fatal: the container is
/// poisoned and keeps returning the same error, and the caller's only
/// recovery is to drop it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecoderError {
    /// The input ends in the middle of a PDU. Not fatal.
    #[error("input ends inside a PDU, more bytes needed")]
    TruncatedInput,

    /// An element announces content extending past the end of its
    /// enclosing container.
    #[error("element extends past the end of its container")]
    TruncatedContainer,

    /// A tag that is known to the grammar but not valid in the current
    /// state.
    #[error("unexpected tag {tag:#04x} in state {state:?}")]
    UnexpectedTag { state: DecoderState, tag: u8 },

    /// A length octet sequence the codec does not accept: indefinite
    /// form, or a long form wider than four bytes, or a content length
    /// a primitive cannot have.
    #[error("length out of range: {0}")]
    LengthOutOfRange(u64),

    /// INTEGER content empty or wider than 32 bits, or an integer field
    /// whose value lies outside its permitted range.
    #[error("INTEGER content out of range")]
    IntegerOutOfRange,

    /// A string-typed field holds invalid UTF-8 and strict validation
    /// is enabled.
    #[error("string value is not valid UTF-8")]
    InvalidUtf8,

    /// Two controls of one message carry the same OID.
    #[error("duplicate control OID {0}")]
    DuplicateControlOid(String),

    /// The PDU announced by the outer header exceeds the configured
    /// maximum size.
    #[error("PDU of {0} bytes exceeds the configured maximum")]
    MaxPduExceeded(u64),

    /// A structurally malformed element: a mandatory component missing
    /// at the end of its container, or a list arity violation.
    #[error("malformed element in state {state:?} (tag {tag:#04x})")]
    GrammarError { state: DecoderState, tag: u8 },

    /// A CHOICE arm or enumerator value the protocol does not define.
    #[error("unsupported choice {0}")]
    UnsupportedChoice(u32),
}

impl DecoderError {
    /// True when the error merely asks for more input.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecoderError::TruncatedInput)
    }
}
