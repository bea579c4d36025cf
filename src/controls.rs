//! Control payload codecs
//!
//! Controls travel as `(oid, criticality, value)` triplets; the value
//! is an opaque OCTET STRING that the message codec round-trips
//! untouched. This module adds the optional second layer: a
//! process-wide registry mapping control OIDs to payload codecs, so
//! known controls can be parsed into structured values and serialized
//! back. Unknown OIDs simply stay opaque.
//!
//! The registry is meant to be populated once at startup and read
//! concurrently afterwards.

use crate::ber;
use crate::error::DecoderError;
use crate::ldap::Control;

use lazy_static::lazy_static;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A structured control payload that knows its own encoding.
pub trait ControlValue: fmt::Debug + Send + Sync {
    /// Size of the encoded payload in bytes.
    fn compute_length(&self) -> usize;
    /// Append the encoded payload to a buffer.
    fn encode(&self, buf: &mut Vec<u8>);
    /// Downcasting hook for registry consumers.
    fn as_any(&self) -> &dyn Any;
}

/// Decoder for one control OID's payload.
pub trait ControlCodec: Send + Sync {
    fn parse(&self, value: &[u8]) -> Result<Box<dyn ControlValue>, DecoderError>;
}

lazy_static! {
    static ref REGISTRY: RwLock<HashMap<String, Arc<dyn ControlCodec>>> =
        RwLock::new(HashMap::new());
}

/// Register a payload codec for a control OID.
///
/// Later registrations replace earlier ones. Call during process
/// startup; the registry is never locked for writing by the codec
/// itself.
pub fn register_control(oid: &str, codec: Arc<dyn ControlCodec>) {
    if let Ok(mut registry) = REGISTRY.write() {
        registry.insert(oid.to_string(), codec);
    }
}

/// Look up the payload codec registered for an OID.
pub fn registered_codec(oid: &str) -> Option<Arc<dyn ControlCodec>> {
    REGISTRY.read().ok().and_then(|r| r.get(oid).cloned())
}

impl Control {
    /// Parse the control value through the registry.
    ///
    /// `None` when no codec is registered for the OID or the control
    /// carries no value; the parse error otherwise.
    pub fn decode_value(&self) -> Option<Result<Box<dyn ControlValue>, DecoderError>> {
        let codec = registered_codec(&self.control_type.0)?;
        let value = self.control_value.as_deref()?;
        Some(codec.parse(value))
    }

    /// Build a control around a structured payload.
    pub fn from_value(oid: &str, value: &dyn ControlValue) -> Control {
        let mut buf = Vec::with_capacity(value.compute_length());
        value.encode(&mut buf);
        Control::new(oid, Some(buf))
    }
}

/// Paged Results control ([RFC 2696](https://tools.ietf.org/html/rfc2696)).
///
/// Used both in requests and responses, although `size` means different
/// things in each case: the desired page size on the way in, the
/// server's estimate of the result set size on the way out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PagedResults {
    pub size: i32,
    /// Paging cookie; empty on the first request and after the last
    /// page.
    pub cookie: Vec<u8>,
}

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

impl PagedResults {
    // realSearchControlValue ::= SEQUENCE {
    //      size            INTEGER (0..maxInt),
    //      cookie          OCTET STRING }
    pub fn parse(value: &[u8]) -> Result<PagedResults, DecoderError> {
        let mut outer = ber::Reader::new(value);
        let content = outer.read_expecting(ber::TAG_SEQUENCE)?;
        let mut inner = ber::Reader::new(content);
        let size = ber::parse_int(inner.read_expecting(ber::TAG_INTEGER)?)?;
        let cookie = inner.read_expecting(ber::TAG_OCTET_STRING)?.to_vec();
        Ok(PagedResults { size, cookie })
    }

    fn content_length(&self) -> usize {
        ber::int_tlv_len(self.size) + ber::tlv_len(self.cookie.len())
    }
}

impl ControlValue for PagedResults {
    fn compute_length(&self) -> usize {
        ber::tlv_len(self.content_length())
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(ber::TAG_SEQUENCE);
        ber::push_len(buf, self.content_length());
        ber::push_int_tlv(buf, ber::TAG_INTEGER, self.size);
        ber::push_tlv(buf, ber::TAG_OCTET_STRING, &self.cookie);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry adapter for [`PagedResults`].
#[derive(Debug)]
pub struct PagedResultsCodec;

impl ControlCodec for PagedResultsCodec {
    fn parse(&self, value: &[u8]) -> Result<Box<dyn ControlValue>, DecoderError> {
        Ok(Box::new(PagedResults::parse(value)?))
    }
}

/// Register the payload codecs shipped with this crate.
pub fn register_builtin_controls() {
    register_control(PAGED_RESULTS_OID, Arc::new(PagedResultsCodec));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_paged_results_round_trip() {
        let pr = PagedResults {
            size: 500,
            cookie: b"opaque".to_vec(),
        };
        let mut buf = Vec::new();
        pr.encode(&mut buf);
        assert_eq!(buf.len(), pr.compute_length());
        assert_eq!(PagedResults::parse(&buf), Ok(pr));
    }

    #[test]
    fn test_paged_results_wire_form() {
        let pr = PagedResults {
            size: 100,
            cookie: Vec::new(),
        };
        let mut buf = Vec::new();
        pr.encode(&mut buf);
        assert_eq!(buf, hex!("30 05 02 01 64 04 00"));
    }

    #[test]
    fn test_paged_results_rejects_garbage() {
        assert!(PagedResults::parse(&hex!("04 00")).is_err());
        assert!(PagedResults::parse(&hex!("30 03 02 01")).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        register_builtin_controls();
        let control = Control::from_value(
            PAGED_RESULTS_OID,
            &PagedResults {
                size: 7,
                cookie: vec![0xde, 0xad],
            },
        );
        let parsed = control
            .decode_value()
            .expect("codec registered")
            .expect("parse failed");
        let pr = parsed
            .as_any()
            .downcast_ref::<PagedResults>()
            .expect("paged results payload");
        assert_eq!(pr.size, 7);
        assert_eq!(pr.cookie, vec![0xde, 0xad]);
    }

    #[test]
    fn test_unknown_oid_stays_opaque() {
        let control = Control::new("1.2.3.4.5.6", Some(vec![0x01]));
        assert!(control.decode_value().is_none());
    }
}
