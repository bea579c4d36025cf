//! Length computation pass
//!
//! BER requires every definite length to precede its content, so the
//! writer needs the size of each constructed element before emitting a
//! single byte. This module walks a message bottom-up, records the
//! content length of every constructed node in a flat arena, and
//! returns the total PDU size. The writer then replays the identical
//! traversal, consuming the arena front to back: every function here
//! has a mirror image in the `encoder` module, and the two must visit
//! constructed nodes in the same order.
//!
//! All structural validation happens in this pass. A message that
//! survives it can only fail to encode by running out of buffer.

use crate::ber;
use crate::error::EncoderError;
use crate::filter::*;
use crate::ldap::*;
use crate::options::CodecOptions;

/// Arena of content lengths for constructed nodes, in the order the
/// writer will need them.
#[derive(Debug, Default)]
pub(crate) struct Lengths {
    v: Vec<usize>,
}

impl Lengths {
    /// Claim the next slot before descending into children.
    fn reserve(&mut self) -> usize {
        self.v.push(0);
        self.v.len() - 1
    }

    fn set(&mut self, slot: usize, len: usize) {
        self.v[slot] = len;
    }

    pub(crate) fn as_slice(&self) -> &[usize] {
        &self.v
    }
}

/// Run the length pass over a message.
///
/// Returns the filled arena and the total PDU size in bytes.
pub(crate) fn compute(
    msg: &LdapMessage,
    opts: &CodecOptions,
) -> Result<(Lengths, usize), EncoderError> {
    // resolve the operation tag first, so an op the dispatch tables do
    // not know surfaces as UnknownOp rather than a bad length
    op_tag_byte(msg.protocol_op.tag())?;
    let mut lens = Lengths::default();
    match message_length(msg, opts, &mut lens) {
        Ok(total) => Ok((lens, total)),
        Err(detail) => Err(EncoderError::InvalidState {
            message_id: msg.message_id.0,
            detail,
        }),
    }
}

/// The operation's application tag byte, class and constructed bits
/// included.
pub(crate) fn op_tag_byte(tag: ProtocolOpTag) -> Result<u8, EncoderError> {
    let byte = match tag {
        ProtocolOpTag::BindRequest => 0x60,
        ProtocolOpTag::BindResponse => 0x61,
        ProtocolOpTag::UnbindRequest => 0x42,
        ProtocolOpTag::SearchRequest => 0x63,
        ProtocolOpTag::SearchResultEntry => 0x64,
        ProtocolOpTag::SearchResultDone => 0x65,
        ProtocolOpTag::ModifyRequest => 0x66,
        ProtocolOpTag::ModifyResponse => 0x67,
        ProtocolOpTag::AddRequest => 0x68,
        ProtocolOpTag::AddResponse => 0x69,
        ProtocolOpTag::DelRequest => 0x4a,
        ProtocolOpTag::DelResponse => 0x6b,
        ProtocolOpTag::ModDnRequest => 0x6c,
        ProtocolOpTag::ModDnResponse => 0x6d,
        ProtocolOpTag::CompareRequest => 0x6e,
        ProtocolOpTag::CompareResponse => 0x6f,
        ProtocolOpTag::AbandonRequest => 0x50,
        ProtocolOpTag::SearchResultReference => 0x73,
        ProtocolOpTag::ExtendedRequest => 0x77,
        ProtocolOpTag::ExtendedResponse => 0x78,
        ProtocolOpTag::IntermediateResponse => 0x79,
        _ => return Err(EncoderError::UnknownOp { tag: tag.0 }),
    };
    Ok(byte)
}

/// matchedDN as written to the wire.
pub(crate) fn matched_dn<'a>(result: &'a LdapResult, opts: &CodecOptions) -> &'a str {
    if opts.trim_matched_dn {
        result.matched_dn.0.trim_start()
    } else {
        &result.matched_dn.0
    }
}

#[inline]
fn str_tlv_len(s: &str) -> usize {
    ber::tlv_len(s.len())
}

#[inline]
fn bytes_tlv_len(b: &[u8]) -> usize {
    ber::tlv_len(b.len())
}

fn message_length(
    msg: &LdapMessage,
    opts: &CodecOptions,
    lens: &mut Lengths,
) -> Result<usize, &'static str> {
    let id = msg.message_id.0;
    if id < 0 {
        return Err("negative message id");
    }
    if id == 0 && !matches!(msg.protocol_op, ProtocolOp::ExtendedResponse(_)) {
        // zero is reserved for unsolicited notifications
        return Err("message id 0 outside an unsolicited notification");
    }
    let slot = lens.reserve();
    let mut content = ber::int_tlv_len(id);
    content += op_length(&msg.protocol_op, opts, lens)?;
    if let Some(controls) = &msg.controls {
        content += controls_length(controls, lens)?;
    }
    lens.set(slot, content);
    Ok(ber::tlv_len(content))
}

fn op_length(
    op: &ProtocolOp,
    opts: &CodecOptions,
    lens: &mut Lengths,
) -> Result<usize, &'static str> {
    let slot = lens.reserve();
    let content = match op {
        ProtocolOp::BindRequest(req) => {
            if !(1..=127).contains(&req.version) {
                return Err("bind version out of range");
            }
            let mut n = ber::int_tlv_len(i32::from(req.version));
            n += str_tlv_len(&req.name.0);
            n += match &req.authentication {
                AuthenticationChoice::Simple(creds) => bytes_tlv_len(creds),
                AuthenticationChoice::Sasl(sasl) => {
                    let sasl_slot = lens.reserve();
                    let mut s = str_tlv_len(&sasl.mechanism.0);
                    if let Some(creds) = &sasl.credentials {
                        s += bytes_tlv_len(creds);
                    }
                    lens.set(sasl_slot, s);
                    ber::tlv_len(s)
                }
            };
            n
        }
        ProtocolOp::BindResponse(resp) => {
            let mut n = result_length(&resp.result, opts, lens)?;
            if let Some(creds) = &resp.server_sasl_creds {
                n += bytes_tlv_len(creds);
            }
            n
        }
        ProtocolOp::UnbindRequest => 0,
        ProtocolOp::SearchRequest(req) => {
            if req.scope.0 > 2 {
                return Err("invalid search scope");
            }
            if req.deref_aliases.0 > 3 {
                return Err("invalid alias dereferencing policy");
            }
            if req.size_limit > i32::MAX as u32 || req.time_limit > i32::MAX as u32 {
                return Err("search limit out of range");
            }
            let mut n = str_tlv_len(&req.base_object.0);
            n += ber::int_tlv_len(req.scope.0 as i32);
            n += ber::int_tlv_len(req.deref_aliases.0 as i32);
            n += ber::int_tlv_len(req.size_limit as i32);
            n += ber::int_tlv_len(req.time_limit as i32);
            n += 3; // typesOnly BOOLEAN
            n += filter_length(&req.filter, lens)?;
            let attrs_slot = lens.reserve();
            let attrs: usize = req.attributes.iter().map(|a| str_tlv_len(&a.0)).sum();
            lens.set(attrs_slot, attrs);
            n += ber::tlv_len(attrs);
            n
        }
        ProtocolOp::SearchResultEntry(entry) => {
            let mut n = str_tlv_len(&entry.object_name.0);
            let list_slot = lens.reserve();
            let mut list = 0;
            for (i, attr) in entry.attributes.iter().enumerate() {
                if entry.attributes[..i]
                    .iter()
                    .any(|a| a.attr_type == attr.attr_type)
                {
                    return Err("duplicate attribute type in entry");
                }
                list += attribute_length(&attr.attr_type.0, &attr.attr_vals, lens);
            }
            lens.set(list_slot, list);
            n += ber::tlv_len(list);
            n
        }
        ProtocolOp::SearchResultDone(result)
        | ProtocolOp::AddResponse(result)
        | ProtocolOp::DelResponse(result)
        | ProtocolOp::ModDnResponse(result)
        | ProtocolOp::CompareResponse(result) => result_length(result, opts, lens)?,
        ProtocolOp::SearchResultReference(uris) => {
            if uris.is_empty() {
                return Err("empty search result reference");
            }
            uris.iter().map(|u| str_tlv_len(&u.0)).sum()
        }
        ProtocolOp::ModifyRequest(req) => {
            let mut n = str_tlv_len(&req.object.0);
            let changes_slot = lens.reserve();
            let mut changes = 0;
            for change in &req.changes {
                if change.operation.0 > 3 {
                    return Err("invalid modify operation");
                }
                let change_slot = lens.reserve();
                let mut c = ber::int_tlv_len(change.operation.0 as i32);
                c += attribute_length(
                    &change.modification.attr_type.0,
                    &change.modification.attr_vals,
                    lens,
                );
                lens.set(change_slot, c);
                changes += ber::tlv_len(c);
            }
            lens.set(changes_slot, changes);
            n += ber::tlv_len(changes);
            n
        }
        ProtocolOp::ModifyResponse(resp) => result_length(&resp.result, opts, lens)?,
        ProtocolOp::AddRequest(req) => {
            let mut n = str_tlv_len(&req.entry.0);
            let list_slot = lens.reserve();
            let mut list = 0;
            for (i, attr) in req.attributes.iter().enumerate() {
                if req.attributes[..i]
                    .iter()
                    .any(|a| a.attr_type == attr.attr_type)
                {
                    return Err("duplicate attribute type in entry");
                }
                if attr.attr_vals.is_empty() {
                    return Err("attribute without values");
                }
                list += attribute_length(&attr.attr_type.0, &attr.attr_vals, lens);
            }
            lens.set(list_slot, list);
            n += ber::tlv_len(list);
            n
        }
        ProtocolOp::DelRequest(dn) => dn.0.len(),
        ProtocolOp::ModDnRequest(req) => {
            let mut n = str_tlv_len(&req.entry.0);
            n += str_tlv_len(&req.newrdn.0);
            n += 3; // deleteoldrdn BOOLEAN
            if let Some(sup) = &req.newsuperior {
                n += str_tlv_len(&sup.0);
            }
            n
        }
        ProtocolOp::CompareRequest(req) => {
            let mut n = str_tlv_len(&req.entry.0);
            let ava_slot = lens.reserve();
            let ava = str_tlv_len(&req.ava.attribute_desc.0)
                + bytes_tlv_len(&req.ava.assertion_value);
            lens.set(ava_slot, ava);
            n += ber::tlv_len(ava);
            n
        }
        ProtocolOp::AbandonRequest(id) => {
            if id.0 < 0 {
                return Err("negative message id");
            }
            ber::int_nb_bytes(id.0)
        }
        ProtocolOp::ExtendedRequest(req) => {
            let mut n = str_tlv_len(&req.request_name.0);
            if let Some(value) = &req.request_value {
                n += bytes_tlv_len(value);
            }
            n
        }
        ProtocolOp::ExtendedResponse(resp) => {
            let mut n = result_length(&resp.result, opts, lens)?;
            if let Some(name) = &resp.response_name {
                n += str_tlv_len(&name.0);
            }
            if let Some(value) = &resp.response_value {
                n += bytes_tlv_len(value);
            }
            n
        }
        ProtocolOp::IntermediateResponse(resp) => {
            let mut n = 0;
            if let Some(name) = &resp.response_name {
                n += str_tlv_len(&name.0);
            }
            if let Some(value) = &resp.response_value {
                n += bytes_tlv_len(value);
            }
            n
        }
    };
    lens.set(slot, content);
    Ok(ber::tlv_len(content))
}

/// Content length of the LDAPResult components, referral included.
fn result_length(
    result: &LdapResult,
    opts: &CodecOptions,
    lens: &mut Lengths,
) -> Result<usize, &'static str> {
    if result.result_code.0 > i32::MAX as u32 {
        return Err("result code out of range");
    }
    let mut n = ber::int_tlv_len(result.result_code.0 as i32);
    n += str_tlv_len(matched_dn(result, opts));
    n += str_tlv_len(&result.diagnostic_message.0);
    if let Some(uris) = &result.referral {
        if uris.is_empty() {
            return Err("empty referral");
        }
        let slot = lens.reserve();
        let r: usize = uris.iter().map(|u| str_tlv_len(&u.0)).sum();
        lens.set(slot, r);
        n += ber::tlv_len(r);
    }
    Ok(n)
}

/// TLV length of one attribute SEQUENCE (type + SET OF values).
fn attribute_length(attr_type: &str, vals: &[AttributeValue], lens: &mut Lengths) -> usize {
    let attr_slot = lens.reserve();
    let mut content = str_tlv_len(attr_type);
    let set_slot = lens.reserve();
    let set: usize = vals.iter().map(|v| bytes_tlv_len(&v.0)).sum();
    lens.set(set_slot, set);
    content += ber::tlv_len(set);
    lens.set(attr_slot, content);
    ber::tlv_len(content)
}

/// TLV length of a filter subtree.
fn filter_length(filter: &Filter, lens: &mut Lengths) -> Result<usize, &'static str> {
    let content = match filter {
        Filter::And(children) | Filter::Or(children) => {
            let slot = lens.reserve();
            let mut n = 0;
            for child in children {
                n += filter_length(child, lens)?;
            }
            lens.set(slot, n);
            n
        }
        Filter::Not(child) => {
            let slot = lens.reserve();
            let n = filter_length(child, lens)?;
            lens.set(slot, n);
            n
        }
        Filter::EqualityMatch(ava)
        | Filter::GreaterOrEqual(ava)
        | Filter::LessOrEqual(ava)
        | Filter::ApproxMatch(ava) => {
            let slot = lens.reserve();
            let n = str_tlv_len(&ava.attribute_desc.0) + bytes_tlv_len(&ava.assertion_value);
            lens.set(slot, n);
            n
        }
        Filter::Substrings(sf) => {
            validate_substrings(&sf.substrings)?;
            let slot = lens.reserve();
            let mut n = str_tlv_len(&sf.filter_type.0);
            let seq_slot = lens.reserve();
            let seq: usize = sf
                .substrings
                .iter()
                .map(|s| match s {
                    Substring::Initial(v) | Substring::Any(v) | Substring::Final(v) => {
                        bytes_tlv_len(v)
                    }
                })
                .sum();
            lens.set(seq_slot, seq);
            n += ber::tlv_len(seq);
            lens.set(slot, n);
            n
        }
        Filter::Present(attr) => return Ok(str_tlv_len(&attr.0)),
        Filter::ExtensibleMatch(mra) => {
            let slot = lens.reserve();
            let mut n = 0;
            if let Some(rule) = &mra.matching_rule {
                n += str_tlv_len(&rule.0);
            }
            if let Some(rule_type) = &mra.rule_type {
                n += str_tlv_len(&rule_type.0);
            }
            n += bytes_tlv_len(&mra.assertion_value);
            if mra.dn_attributes {
                n += 3; // dnAttributes BOOLEAN, omitted when false
            }
            lens.set(slot, n);
            n
        }
    };
    Ok(ber::tlv_len(content))
}

fn validate_substrings(substrings: &[Substring]) -> Result<(), &'static str> {
    if substrings.is_empty() {
        return Err("empty substring filter");
    }
    let last = substrings.len() - 1;
    for (i, piece) in substrings.iter().enumerate() {
        match piece {
            Substring::Initial(_) if i != 0 => {
                return Err("substring initial must come first");
            }
            Substring::Final(_) if i != last => {
                return Err("substring final must come last");
            }
            _ => {}
        }
    }
    Ok(())
}

fn controls_length(controls: &[Control], lens: &mut Lengths) -> Result<usize, &'static str> {
    let slot = lens.reserve();
    let mut n = 0;
    for control in controls {
        let ctl_slot = lens.reserve();
        let mut c = str_tlv_len(&control.control_type.0);
        if control.criticality {
            c += 3; // criticality BOOLEAN, omitted when false
        }
        if let Some(value) = &control.control_value {
            c += bytes_tlv_len(value);
        }
        lens.set(ctl_slot, c);
        n += ber::tlv_len(c);
    }
    lens.set(slot, n);
    Ok(ber::tlv_len(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbind(id: i32) -> LdapMessage {
        LdapMessage {
            message_id: MessageID(id),
            protocol_op: ProtocolOp::UnbindRequest,
            controls: None,
        }
    }

    #[test]
    fn test_unbind_total() {
        let (lens, total) = compute(&unbind(3), &CodecOptions::default()).expect("length pass");
        assert_eq!(total, 7);
        // message content, op content
        assert_eq!(lens.as_slice(), &[5, 0]);
    }

    #[test]
    fn test_idempotent() {
        let msg = unbind(7);
        let opts = CodecOptions::default();
        let (lens1, total1) = compute(&msg, &opts).expect("length pass");
        let (lens2, total2) = compute(&msg, &opts).expect("length pass");
        assert_eq!(lens1.as_slice(), lens2.as_slice());
        assert_eq!(total1, total2);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let err = compute(&unbind(-1), &CodecOptions::default()).expect_err("expected error");
        assert!(matches!(err, EncoderError::InvalidState { message_id: -1, .. }));
        let err = compute(&unbind(0), &CodecOptions::default()).expect_err("expected error");
        assert!(matches!(err, EncoderError::InvalidState { message_id: 0, .. }));
    }

    #[test]
    fn test_unsolicited_notification_id_zero() {
        let msg = LdapMessage {
            message_id: MessageID(0),
            protocol_op: ProtocolOp::ExtendedResponse(ExtendedResponse {
                result: LdapResult {
                    result_code: ResultCode::UnwillingToPerform,
                    matched_dn: LdapDN(String::new()),
                    diagnostic_message: LdapString(String::new()),
                    referral: None,
                },
                response_name: Some(LdapOID("1.3.6.1.4.1.1466.20036".to_string())),
                response_value: None,
            }),
            controls: None,
        };
        assert!(compute(&msg, &CodecOptions::default()).is_ok());
    }
}
