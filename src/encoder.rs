//! Forward-pass PDU writer
//!
//! Consumes the length arena produced by the `length` module and writes
//! the PDU in one sweep. Functions here mirror their counterparts in
//! `length` node for node; a mismatch between the two traversals
//! surfaces as `InvalidState`, never as a malformed PDU.

use crate::ber;
use crate::error::EncoderError;
use crate::filter::*;
use crate::ldap::*;
use crate::length::{self, matched_dn, op_tag_byte, Lengths};
use crate::options::CodecOptions;

use log::trace;

/// Encode a message into a freshly allocated, exactly sized buffer.
///
/// Runs the length pass and the write pass back to back; mutating the
/// message in between is therefore impossible.
pub fn encode(msg: &LdapMessage) -> Result<Vec<u8>, EncoderError> {
    encode_with_options(msg, &CodecOptions::default())
}

/// [`encode`] with explicit options.
pub fn encode_with_options(
    msg: &LdapMessage,
    opts: &CodecOptions,
) -> Result<Vec<u8>, EncoderError> {
    trace!("encoding message {}", msg.message_id.0);
    let (lens, total) = length::compute(msg, opts)?;
    let mut out = vec![0u8; total];
    write_pdu(msg, opts, &lens, &mut out)?;
    Ok(out)
}

/// Encode a message into a caller-provided buffer.
///
/// Returns the number of bytes written, or `Overflow` when the buffer
/// is too small for the PDU.
pub fn encode_into(msg: &LdapMessage, buf: &mut [u8]) -> Result<usize, EncoderError> {
    let opts = CodecOptions::default();
    let (lens, total) = length::compute(msg, &opts)?;
    if buf.len() < total {
        return Err(EncoderError::Overflow {
            message_id: msg.message_id.0,
        });
    }
    write_pdu(msg, &opts, &lens, buf)?;
    Ok(total)
}

fn write_pdu(
    msg: &LdapMessage,
    opts: &CodecOptions,
    lens: &Lengths,
    buf: &mut [u8],
) -> Result<(), EncoderError> {
    let mut w = Writer {
        buf,
        pos: 0,
        lens: lens.as_slice(),
        cursor: 0,
    };
    let result = write_message(msg, opts, &mut w);
    match result {
        Ok(()) if w.cursor == w.lens.len() => Ok(()),
        Ok(()) => Err(EncoderError::InvalidState {
            message_id: msg.message_id.0,
            detail: "length table mismatch",
        }),
        Err(Fail::Overflow) => Err(EncoderError::Overflow {
            message_id: msg.message_id.0,
        }),
        Err(Fail::Lengths) => Err(EncoderError::InvalidState {
            message_id: msg.message_id.0,
            detail: "length table mismatch",
        }),
    }
}

enum Fail {
    Overflow,
    Lengths,
}

/// Bounded cursor over the output buffer plus the length arena.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
    lens: &'a [usize],
    cursor: usize,
}

impl Writer<'_> {
    /// Next precomputed content length.
    fn next_len(&mut self) -> Result<usize, Fail> {
        let len = *self.lens.get(self.cursor).ok_or(Fail::Lengths)?;
        self.cursor += 1;
        Ok(len)
    }

    fn put_u8(&mut self, b: u8) -> Result<(), Fail> {
        match self.buf.get_mut(self.pos) {
            Some(slot) => {
                *slot = b;
                self.pos += 1;
                Ok(())
            }
            None => Err(Fail::Overflow),
        }
    }

    fn put_slice(&mut self, s: &[u8]) -> Result<(), Fail> {
        let end = self.pos.checked_add(s.len()).ok_or(Fail::Overflow)?;
        match self.buf.get_mut(self.pos..end) {
            Some(dst) => {
                dst.copy_from_slice(s);
                self.pos = end;
                Ok(())
            }
            None => Err(Fail::Overflow),
        }
    }

    fn put_len(&mut self, len: usize) -> Result<(), Fail> {
        match ber::nb_length_bytes(len) {
            1 => self.put_u8(len as u8),
            n => {
                self.put_u8(0x80 | (n - 1) as u8)?;
                for i in (0..n - 1).rev() {
                    self.put_u8((len >> (8 * i)) as u8)?;
                }
                Ok(())
            }
        }
    }

    /// Tag + length from the arena; returns the content length.
    fn open(&mut self, tag: u8) -> Result<usize, Fail> {
        let len = self.next_len()?;
        self.put_u8(tag)?;
        self.put_len(len)?;
        Ok(len)
    }

    fn put_int_tlv(&mut self, tag: u8, value: i32) -> Result<(), Fail> {
        let n = ber::int_nb_bytes(value);
        self.put_u8(tag)?;
        self.put_u8(n as u8)?;
        let b = value.to_be_bytes();
        self.put_slice(&b[4 - n..])
    }

    fn put_str_tlv(&mut self, tag: u8, content: &[u8]) -> Result<(), Fail> {
        self.put_u8(tag)?;
        self.put_len(content.len())?;
        self.put_slice(content)
    }

    fn put_bool_tlv(&mut self, tag: u8, value: bool) -> Result<(), Fail> {
        self.put_u8(tag)?;
        self.put_u8(1)?;
        self.put_u8(if value { 0xff } else { 0x00 })
    }
}

fn write_message(msg: &LdapMessage, opts: &CodecOptions, w: &mut Writer) -> Result<(), Fail> {
    w.open(ber::TAG_SEQUENCE)?;
    w.put_int_tlv(ber::TAG_INTEGER, msg.message_id.0)?;
    write_op(&msg.protocol_op, opts, w)?;
    if let Some(controls) = &msg.controls {
        write_controls(controls, w)?;
    }
    Ok(())
}

fn write_op(op: &ProtocolOp, opts: &CodecOptions, w: &mut Writer) -> Result<(), Fail> {
    let tag = op_tag_byte(op.tag()).map_err(|_| Fail::Lengths)?;
    w.open(tag)?;
    match op {
        ProtocolOp::BindRequest(req) => {
            w.put_int_tlv(ber::TAG_INTEGER, i32::from(req.version))?;
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.name.0.as_bytes())?;
            match &req.authentication {
                // simple                  [0] OCTET STRING
                AuthenticationChoice::Simple(creds) => {
                    w.put_str_tlv(ber::context(0), creds)?;
                }
                // sasl                    [3] SaslCredentials
                AuthenticationChoice::Sasl(sasl) => {
                    w.open(ber::context_constructed(3))?;
                    w.put_str_tlv(ber::TAG_OCTET_STRING, sasl.mechanism.0.as_bytes())?;
                    if let Some(creds) = &sasl.credentials {
                        w.put_str_tlv(ber::TAG_OCTET_STRING, creds)?;
                    }
                }
            }
        }
        ProtocolOp::BindResponse(resp) => {
            write_result(&resp.result, opts, w)?;
            if let Some(creds) = &resp.server_sasl_creds {
                // serverSaslCreds    [7] OCTET STRING OPTIONAL
                w.put_str_tlv(ber::context(7), creds)?;
            }
        }
        ProtocolOp::UnbindRequest => {}
        ProtocolOp::SearchRequest(req) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.base_object.0.as_bytes())?;
            w.put_int_tlv(ber::TAG_ENUMERATED, req.scope.0 as i32)?;
            w.put_int_tlv(ber::TAG_ENUMERATED, req.deref_aliases.0 as i32)?;
            w.put_int_tlv(ber::TAG_INTEGER, req.size_limit as i32)?;
            w.put_int_tlv(ber::TAG_INTEGER, req.time_limit as i32)?;
            w.put_bool_tlv(ber::TAG_BOOLEAN, req.types_only)?;
            write_filter(&req.filter, w)?;
            w.open(ber::TAG_SEQUENCE)?;
            for attr in &req.attributes {
                w.put_str_tlv(ber::TAG_OCTET_STRING, attr.0.as_bytes())?;
            }
        }
        ProtocolOp::SearchResultEntry(entry) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, entry.object_name.0.as_bytes())?;
            w.open(ber::TAG_SEQUENCE)?;
            for attr in &entry.attributes {
                write_attribute(&attr.attr_type.0, &attr.attr_vals, w)?;
            }
        }
        ProtocolOp::SearchResultDone(result)
        | ProtocolOp::AddResponse(result)
        | ProtocolOp::DelResponse(result)
        | ProtocolOp::ModDnResponse(result)
        | ProtocolOp::CompareResponse(result) => write_result(result, opts, w)?,
        ProtocolOp::SearchResultReference(uris) => {
            for uri in uris {
                w.put_str_tlv(ber::TAG_OCTET_STRING, uri.0.as_bytes())?;
            }
        }
        ProtocolOp::ModifyRequest(req) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.object.0.as_bytes())?;
            w.open(ber::TAG_SEQUENCE)?;
            for change in &req.changes {
                w.open(ber::TAG_SEQUENCE)?;
                w.put_int_tlv(ber::TAG_ENUMERATED, change.operation.0 as i32)?;
                write_attribute(
                    &change.modification.attr_type.0,
                    &change.modification.attr_vals,
                    w,
                )?;
            }
        }
        ProtocolOp::ModifyResponse(resp) => write_result(&resp.result, opts, w)?,
        ProtocolOp::AddRequest(req) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.entry.0.as_bytes())?;
            w.open(ber::TAG_SEQUENCE)?;
            for attr in &req.attributes {
                write_attribute(&attr.attr_type.0, &attr.attr_vals, w)?;
            }
        }
        ProtocolOp::DelRequest(dn) => {
            w.put_slice(dn.0.as_bytes())?;
        }
        ProtocolOp::ModDnRequest(req) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.entry.0.as_bytes())?;
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.newrdn.0.as_bytes())?;
            w.put_bool_tlv(ber::TAG_BOOLEAN, req.deleteoldrdn)?;
            if let Some(sup) = &req.newsuperior {
                // newSuperior     [0] LDAPDN OPTIONAL
                w.put_str_tlv(ber::context(0), sup.0.as_bytes())?;
            }
        }
        ProtocolOp::CompareRequest(req) => {
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.entry.0.as_bytes())?;
            w.open(ber::TAG_SEQUENCE)?;
            w.put_str_tlv(ber::TAG_OCTET_STRING, req.ava.attribute_desc.0.as_bytes())?;
            w.put_str_tlv(ber::TAG_OCTET_STRING, &req.ava.assertion_value)?;
        }
        ProtocolOp::AbandonRequest(id) => {
            let n = ber::int_nb_bytes(id.0);
            let b = id.0.to_be_bytes();
            w.put_slice(&b[4 - n..])?;
        }
        ProtocolOp::ExtendedRequest(req) => {
            // requestName      [0] LDAPOID
            w.put_str_tlv(ber::context(0), req.request_name.0.as_bytes())?;
            if let Some(value) = &req.request_value {
                // requestValue     [1] OCTET STRING OPTIONAL
                w.put_str_tlv(ber::context(1), value)?;
            }
        }
        ProtocolOp::ExtendedResponse(resp) => {
            write_result(&resp.result, opts, w)?;
            if let Some(name) = &resp.response_name {
                // responseName     [10] LDAPOID OPTIONAL
                w.put_str_tlv(ber::context(10), name.0.as_bytes())?;
            }
            if let Some(value) = &resp.response_value {
                // responseValue    [11] OCTET STRING OPTIONAL
                w.put_str_tlv(ber::context(11), value)?;
            }
        }
        ProtocolOp::IntermediateResponse(resp) => {
            if let Some(name) = &resp.response_name {
                w.put_str_tlv(ber::context(0), name.0.as_bytes())?;
            }
            if let Some(value) = &resp.response_value {
                w.put_str_tlv(ber::context(1), value)?;
            }
        }
    }
    Ok(())
}

fn write_result(result: &LdapResult, opts: &CodecOptions, w: &mut Writer) -> Result<(), Fail> {
    w.put_int_tlv(ber::TAG_ENUMERATED, result.result_code.0 as i32)?;
    w.put_str_tlv(ber::TAG_OCTET_STRING, matched_dn(result, opts).as_bytes())?;
    w.put_str_tlv(
        ber::TAG_OCTET_STRING,
        result.diagnostic_message.0.as_bytes(),
    )?;
    if let Some(uris) = &result.referral {
        // referral           [3] Referral OPTIONAL
        w.open(ber::context_constructed(3))?;
        for uri in uris {
            w.put_str_tlv(ber::TAG_OCTET_STRING, uri.0.as_bytes())?;
        }
    }
    Ok(())
}

fn write_attribute(attr_type: &str, vals: &[AttributeValue], w: &mut Writer) -> Result<(), Fail> {
    w.open(ber::TAG_SEQUENCE)?;
    w.put_str_tlv(ber::TAG_OCTET_STRING, attr_type.as_bytes())?;
    w.open(ber::TAG_SET)?;
    for val in vals {
        w.put_str_tlv(ber::TAG_OCTET_STRING, &val.0)?;
    }
    Ok(())
}

fn write_filter(filter: &Filter, w: &mut Writer) -> Result<(), Fail> {
    match filter {
        Filter::And(children) => {
            w.open(ber::context_constructed(0))?;
            for child in children {
                write_filter(child, w)?;
            }
        }
        Filter::Or(children) => {
            w.open(ber::context_constructed(1))?;
            for child in children {
                write_filter(child, w)?;
            }
        }
        Filter::Not(child) => {
            w.open(ber::context_constructed(2))?;
            write_filter(child, w)?;
        }
        Filter::EqualityMatch(ava) => write_ava_filter(3, ava, w)?,
        Filter::Substrings(sf) => {
            w.open(ber::context_constructed(4))?;
            w.put_str_tlv(ber::TAG_OCTET_STRING, sf.filter_type.0.as_bytes())?;
            w.open(ber::TAG_SEQUENCE)?;
            for piece in &sf.substrings {
                match piece {
                    Substring::Initial(v) => w.put_str_tlv(ber::context(0), v)?,
                    Substring::Any(v) => w.put_str_tlv(ber::context(1), v)?,
                    Substring::Final(v) => w.put_str_tlv(ber::context(2), v)?,
                }
            }
        }
        Filter::GreaterOrEqual(ava) => write_ava_filter(5, ava, w)?,
        Filter::LessOrEqual(ava) => write_ava_filter(6, ava, w)?,
        Filter::Present(attr) => {
            // present         [7] AttributeDescription
            w.put_str_tlv(ber::context(7), attr.0.as_bytes())?;
        }
        Filter::ApproxMatch(ava) => write_ava_filter(8, ava, w)?,
        Filter::ExtensibleMatch(mra) => {
            w.open(ber::context_constructed(9))?;
            if let Some(rule) = &mra.matching_rule {
                w.put_str_tlv(ber::context(1), rule.0.as_bytes())?;
            }
            if let Some(rule_type) = &mra.rule_type {
                w.put_str_tlv(ber::context(2), rule_type.0.as_bytes())?;
            }
            w.put_str_tlv(ber::context(3), &mra.assertion_value)?;
            if mra.dn_attributes {
                w.put_bool_tlv(ber::context(4), true)?;
            }
        }
    }
    Ok(())
}

fn write_ava_filter(tag_nr: u8, ava: &AttributeValueAssertion, w: &mut Writer) -> Result<(), Fail> {
    w.open(ber::context_constructed(tag_nr))?;
    w.put_str_tlv(ber::TAG_OCTET_STRING, ava.attribute_desc.0.as_bytes())?;
    w.put_str_tlv(ber::TAG_OCTET_STRING, &ava.assertion_value)
}

fn write_controls(controls: &[Control], w: &mut Writer) -> Result<(), Fail> {
    // controls       [0] Controls OPTIONAL
    w.open(ber::context_constructed(0))?;
    for control in controls {
        w.open(ber::TAG_SEQUENCE)?;
        w.put_str_tlv(ber::TAG_OCTET_STRING, control.control_type.0.as_bytes())?;
        if control.criticality {
            w.put_bool_tlv(ber::TAG_BOOLEAN, true)?;
        }
        if let Some(value) = &control.control_value {
            w.put_str_tlv(ber::TAG_OCTET_STRING, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_encode_anonymous_bind() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::BindRequest(BindRequest {
                version: 3,
                name: LdapDN(String::new()),
                authentication: AuthenticationChoice::Simple(Vec::new()),
            }),
            controls: None,
        };
        let pdu = encode(&msg).expect("encoding failed");
        assert_eq!(pdu, hex!("30 0c 02 01 01 60 07 02 01 03 04 00 80 00"));
    }

    #[test]
    fn test_encode_bind_response_success() {
        let msg = LdapMessage {
            message_id: MessageID(1),
            protocol_op: ProtocolOp::BindResponse(BindResponse {
                result: LdapResult::success(),
                server_sasl_creds: None,
            }),
            controls: None,
        };
        let pdu = encode(&msg).expect("encoding failed");
        assert_eq!(pdu, hex!("30 0c 02 01 01 61 07 0a 01 00 04 00 04 00"));
    }

    #[test]
    fn test_encode_unbind() {
        let msg = LdapMessage {
            message_id: MessageID(3),
            protocol_op: ProtocolOp::UnbindRequest,
            controls: None,
        };
        let pdu = encode(&msg).expect("encoding failed");
        assert_eq!(pdu, hex!("30 05 02 01 03 42 00"));
    }

    #[test]
    fn test_encode_search_result_entry() {
        let msg = LdapMessage {
            message_id: MessageID(2),
            protocol_op: ProtocolOp::SearchResultEntry(SearchResultEntry {
                object_name: LdapDN("dc=example,dc=com".to_string()),
                attributes: vec![PartialAttribute {
                    attr_type: LdapString("objectClass".to_string()),
                    attr_vals: vec![AttributeValue(b"domain".to_vec())],
                }],
            }),
            controls: None,
        };
        let pdu = encode(&msg).expect("encoding failed");
        let expected = hex!(
            "30 33 02 01 02"
            // [APPLICATION 4], objectName
            "64 2e 04 11 64 63 3d 65 78 61 6d 70 6c 65 2c 64 63 3d 63 6f 6d"
            // partialAttributeList with one attribute SEQUENCE
            "30 19 30 17 04 0b 6f 62 6a 65 63 74 43 6c 61 73 73"
            // SET OF one value
            "31 08 04 06 64 6f 6d 61 69 6e"
        );
        assert_eq!(pdu, expected);
    }

    #[test]
    fn test_encode_into_overflow() {
        let msg = LdapMessage {
            message_id: MessageID(3),
            protocol_op: ProtocolOp::UnbindRequest,
            controls: None,
        };
        let mut small = [0u8; 4];
        assert_eq!(
            encode_into(&msg, &mut small),
            Err(EncoderError::Overflow { message_id: 3 })
        );
        let mut big = [0u8; 32];
        assert_eq!(encode_into(&msg, &mut big), Ok(7));
        assert_eq!(&big[..7], &hex!("30 05 02 01 03 42 00"));
    }

    #[test]
    fn test_matched_dn_trimming() {
        let result = LdapResult {
            result_code: ResultCode::NoSuchObject,
            matched_dn: LdapDN("  dc=example".to_string()),
            diagnostic_message: LdapString(String::new()),
            referral: None,
        };
        let msg = LdapMessage {
            message_id: MessageID(9),
            protocol_op: ProtocolOp::SearchResultDone(result),
            controls: None,
        };
        let trimmed = encode(&msg).expect("encoding failed");
        let kept = encode_with_options(&msg, &CodecOptions::default().trim_matched_dn(false))
            .expect("encoding failed");
        assert_eq!(kept.len(), trimmed.len() + 2);
        assert!(trimmed.windows(10).any(|win| win == b"dc=example"));
        assert!(kept.windows(12).any(|win| win == b"  dc=example"));
    }
}
