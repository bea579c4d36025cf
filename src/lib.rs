//! # LDAP Codec
//!
//! A streaming BER codec for the Lightweight Directory Access Protocol
//! ([RFC4511]), written in pure Rust.
//!
//! The crate is organized as five cooperating layers:
//!
//! * [`ber`]: BER primitive helpers (tags, lengths, INTEGER, BOOLEAN,
//!   OCTET STRING),
//! * [`ldap`] and [`filter`]: the message model, one owned data object
//!   per protocol operation, plus the search filter tree,
//! * `length`/`encoder`: a two-pass writer; the first pass computes the
//!   length of every constructed element, the second writes the PDU in a
//!   single forward sweep,
//! * `tlv`, `grammar` and [`decoder`]: a grammar-driven streaming
//!   decoder that tolerates arbitrary fragmentation of its input,
//! * [`controls`] and [`exop`]: pluggable control and extended-operation
//!   payload codecs.
//!
//! A lot of care is taken to ensure safety of the decoder: bounded
//! filter recursion, a configurable maximum PDU size, defensive handling
//! of malformed lengths, and no panics outside of tests.
//!
//! Encoding:
//!
//! ```rust
//! use ldap_codec::encode;
//! use ldap_codec::ldap::{LdapMessage, MessageID, ProtocolOp};
//!
//! let msg = LdapMessage {
//!     message_id: MessageID(3),
//!     protocol_op: ProtocolOp::UnbindRequest,
//!     controls: None,
//! };
//! let pdu = encode(&msg).expect("encoding failed");
//! assert_eq!(&pdu, &[0x30, 0x05, 0x02, 0x01, 0x03, 0x42, 0x00]);
//! ```
//!
//! Decoding a byte stream:
//!
//! ```rust
//! use ldap_codec::Decoder;
//!
//! let pdu = [0x30, 0x05, 0x02, 0x01, 0x03, 0x42, 0x00];
//! let mut decoder = Decoder::new();
//! // bytes may arrive in arbitrary chunks
//! decoder.feed(&pdu[..4]).expect("feed failed");
//! assert!(decoder.next_message().expect("stream failed").is_none());
//! decoder.feed(&pdu[4..]).expect("feed failed");
//! let msg = decoder.next_message().expect("stream failed").expect("message");
//! assert_eq!(msg.message_id.0, 3);
//! ```
//!
//! [RFC4511]: https://www.rfc-editor.org/rfc/rfc4511

#![deny(unstable_features, unused_import_braces, unused_qualifications)]
#![warn(missing_debug_implementations, unreachable_pub)]
#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ber;
pub mod controls;
pub mod decoder;
mod encoder;
pub mod error;
pub mod exop;
pub mod filter;
pub mod filter_parser;
mod grammar;
pub mod ldap;
mod length;
pub mod options;
mod tlv;

pub use controls::register_control;
pub use decoder::{decode, Decoder};
pub use encoder::{encode, encode_into, encode_with_options};
pub use error::{DecoderError, EncoderError};
pub use grammar::DecoderState;
pub use options::CodecOptions;
