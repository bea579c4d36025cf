use hex_literal::hex;
use ldap_codec::filter::*;
use ldap_codec::ldap::*;
use ldap_codec::{decode, encode, CodecOptions, Decoder, DecoderError};

const BIND_REQUEST: &[u8] = &hex!("30 0c 02 01 01 60 07 02 01 03 04 00 80 00");
const BIND_RESPONSE: &[u8] = &hex!("30 0c 02 01 01 61 07 0a 01 00 04 00 04 00");
const UNBIND: &[u8] = &hex!("30 05 02 01 03 42 00");
const SEARCH_REQUEST: &[u8] = &hex!(
    "30 2e 02 01 02 63 29"
    "04 00"          // baseObject ""
    "0a 01 00"       // scope baseObject
    "0a 01 00"       // derefAliases neverDerefAliases
    "02 01 00"       // sizeLimit 0
    "02 01 00"       // timeLimit 0
    "01 01 00"       // typesOnly FALSE
    "a0 14 a3 12 04 0b 6f 62 6a 65 63 74 43 6c 61 73 73 04 03 74 6f 70"
    "30 00"          // attributes
);

#[test]
fn test_decode_anonymous_bind() {
    let msg = decode(BIND_REQUEST).expect("decoding failed");
    assert_eq!(msg.message_id, MessageID(1));
    match &msg.protocol_op {
        ProtocolOp::BindRequest(req) => {
            assert_eq!(req.version, 3);
            assert_eq!(req.name.0, "");
            assert_eq!(req.authentication, AuthenticationChoice::Simple(vec![]));
        }
        op => panic!("unexpected operation {:?}", op),
    }
    assert!(msg.controls.is_none());
    assert_eq!(encode(&msg).expect("encoding failed"), BIND_REQUEST);
}

#[test]
fn test_decode_bind_response() {
    let msg = decode(BIND_RESPONSE).expect("decoding failed");
    assert_eq!(msg.message_id, MessageID(1));
    match &msg.protocol_op {
        ProtocolOp::BindResponse(resp) => {
            assert_eq!(resp.result.result_code, ResultCode::Success);
            assert_eq!(resp.result.matched_dn.0, "");
            assert_eq!(resp.result.diagnostic_message.0, "");
            assert!(resp.result.referral.is_none());
            assert!(resp.server_sasl_creds.is_none());
        }
        op => panic!("unexpected operation {:?}", op),
    }
    assert_eq!(encode(&msg).expect("encoding failed"), BIND_RESPONSE);
}

#[test]
fn test_decode_search_request() {
    let msg = decode(SEARCH_REQUEST).expect("decoding failed");
    assert_eq!(msg.message_id, MessageID(2));
    match &msg.protocol_op {
        ProtocolOp::SearchRequest(req) => {
            assert_eq!(req.base_object.0, "");
            assert_eq!(req.scope, SearchScope::BaseObject);
            assert_eq!(req.deref_aliases, DerefAliases::NeverDerefAliases);
            assert_eq!(req.size_limit, 0);
            assert_eq!(req.time_limit, 0);
            assert!(!req.types_only);
            assert_eq!(
                req.filter,
                Filter::And(vec![Filter::equals("objectClass", b"top")])
            );
            assert!(req.attributes.is_empty());
        }
        op => panic!("unexpected operation {:?}", op),
    }
    assert_eq!(encode(&msg).expect("encoding failed"), SEARCH_REQUEST);
}

#[test]
fn test_decode_unbind() {
    let msg = decode(UNBIND).expect("decoding failed");
    assert_eq!(msg.message_id, MessageID(3));
    assert_eq!(msg.protocol_op, ProtocolOp::UnbindRequest);
    assert_eq!(encode(&msg).expect("encoding failed"), UNBIND);
}

#[test]
fn test_truncated_then_completed() {
    let mut decoder = Decoder::new();
    decoder.feed(&SEARCH_REQUEST[..6]).expect("feed failed");
    assert_eq!(decoder.next_message().expect("stream alive"), None);
    decoder.feed(&SEARCH_REQUEST[6..]).expect("feed failed");
    let msg = decoder
        .next_message()
        .expect("stream alive")
        .expect("one message");
    assert!(matches!(msg.protocol_op, ProtocolOp::SearchRequest(_)));
    assert_eq!(decoder.next_message().expect("stream alive"), None);
}

#[test]
fn test_inner_element_crossing_outer_end() {
    // the outer SEQUENCE announces 20 bytes, the operation would need 30
    let data = hex!("30 14 02 01 01 60 1e 02 01 03 04 00 80 00");
    let mut decoder = Decoder::new();
    let err = decoder.feed(&data).expect_err("expected error");
    assert_eq!(err, DecoderError::TruncatedContainer);
}

#[test]
fn test_zero_length_message_id() {
    let data = hex!("30 04 02 00 42 00");
    assert_eq!(decode(&data), Err(DecoderError::IntegerOutOfRange));
}

#[test]
fn test_sasl_bind() {
    // GSSAPI bind with credentials "cred"
    let data = hex!(
        "30 1c 02 01 01 60 17 02 01 03 04 00"
        "a3 10 04 06 47 53 53 41 50 49 04 06 63 72 65 64 65 64"
    );
    let msg = decode(&data).expect("decoding failed");
    match &msg.protocol_op {
        ProtocolOp::BindRequest(req) => match &req.authentication {
            AuthenticationChoice::Sasl(sasl) => {
                assert_eq!(sasl.mechanism.0, "GSSAPI");
                assert_eq!(sasl.credentials.as_deref(), Some(&b"creded"[..]));
            }
            auth => panic!("unexpected authentication {:?}", auth),
        },
        op => panic!("unexpected operation {:?}", op),
    }
    assert_eq!(encode(&msg).expect("encoding failed"), data);
}

#[test]
fn test_reserved_authentication_choice() {
    let data = hex!("30 0c 02 01 01 60 07 02 01 03 04 00 81 00");
    assert_eq!(decode(&data), Err(DecoderError::UnsupportedChoice(0x81)));
}

#[test]
fn test_search_result_done_with_referral() {
    let data = hex!(
        "30 2e 02 01 02 65 29 0a 01 0a 04 00 04 00"
        "a3 20 04 1e 6c 64 61 70 3a 2f 2f 6c 64 61 70 2e 65 78 61 6d 70 6c 65"
        "2e 63 6f 6d 2f 64 63 3d 63 6f 6d"
    );
    let msg = decode(&data).expect("decoding failed");
    match &msg.protocol_op {
        ProtocolOp::SearchResultDone(result) => {
            assert_eq!(result.result_code, ResultCode::Referral);
            let uris = result.referral.as_ref().expect("referral");
            assert_eq!(uris.len(), 1);
            assert_eq!(uris[0].0, "ldap://ldap.example.com/dc=com");
        }
        op => panic!("unexpected operation {:?}", op),
    }
    assert_eq!(encode(&msg).expect("encoding failed"), data);
}

#[test]
fn test_modify_with_increment() {
    let data = hex!(
        "30 29 02 01 04 66 24 04 0f 75 69 64 3d 6a 64 6f 65 2c 64 63 3d 63 6f 6d"
        "30 11 30 0f 0a 01 03 30 0a 04 03 75 69 64 31 03 04 01 31"
    );
    let msg = decode(&data).expect("decoding failed");
    match &msg.protocol_op {
        ProtocolOp::ModifyRequest(req) => {
            assert_eq!(req.object.0, "uid=jdoe,dc=com");
            assert_eq!(req.changes.len(), 1);
            assert_eq!(req.changes[0].operation, Operation::Increment);
            assert_eq!(req.changes[0].modification.attr_type.0, "uid");
            assert_eq!(
                req.changes[0].modification.attr_vals,
                vec![AttributeValue(b"1".to_vec())]
            );
        }
        op => panic!("unexpected operation {:?}", op),
    }
    assert_eq!(encode(&msg).expect("encoding failed"), data);
}

#[test]
fn test_abandon_and_delete() {
    let abandon = hex!("30 06 02 01 05 50 01 03");
    let msg = decode(&abandon).expect("decoding failed");
    assert_eq!(msg.protocol_op, ProtocolOp::AbandonRequest(MessageID(3)));
    assert_eq!(encode(&msg).expect("encoding failed"), abandon);

    let del = hex!("30 10 02 01 06 4a 0b 64 63 3d 65 78 61 6d 70 6c 65 73");
    let msg = decode(&del).expect("decoding failed");
    assert_eq!(
        msg.protocol_op,
        ProtocolOp::DelRequest(LdapDN("dc=examples".to_string()))
    );
    assert_eq!(encode(&msg).expect("encoding failed"), del);
}

#[test]
fn test_duplicate_control_oid() {
    // two controls, both 1.2.3.4
    let data = hex!(
        "30 1d 02 01 03 42 00"
        "a0 16 30 09 04 07 31 2e 32 2e 33 2e 34 30 09 04 07 31 2e 32 2e 33 2e 34"
    );
    assert_eq!(
        decode(&data),
        Err(DecoderError::DuplicateControlOid("1.2.3.4".to_string()))
    );
}

#[test]
fn test_controls_survive_round_trip() {
    // critical control with value attached to an unbind
    let data = hex!(
        "30 19 02 01 03 42 00"
        "a0 12 30 10 04 07 31 2e 32 2e 33 2e 34 01 01 ff 04 02 ab cd"
    );
    let msg = decode(&data).expect("decoding failed");
    assert!(msg.control("1.2.3.4").is_some());
    assert!(msg.control("1.2.3.5").is_none());
    let controls = msg.controls.as_ref().expect("controls");
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].control_type.0, "1.2.3.4");
    assert!(controls[0].criticality);
    assert_eq!(controls[0].control_value.as_deref(), Some(&[0xab, 0xcd][..]));
    assert_eq!(encode(&msg).expect("encoding failed"), data);
}

#[test]
fn test_unknown_filter_choice() {
    // context tag [10] is not a filter kind
    let data = hex!(
        "30 1a 02 01 02 63 15"
        "04 00 0a 01 00 0a 01 00 02 01 00 02 01 00 01 01 00"
        "8a 00 30 00"
    );
    assert_eq!(decode(&data), Err(DecoderError::UnsupportedChoice(0x8a)));
}

#[test]
fn test_not_filter_takes_exactly_one_child() {
    // (!(a=b)(c=d)) is not a valid filter
    let data = hex!(
        "30 2e 02 01 02 63 29"
        "04 00 0a 01 00 0a 01 00 02 01 00 02 01 00 01 01 00"
        "a2 14 a3 08 04 01 61 04 03 62 62 62 a3 08 04 01 63 04 03 64 64 64"
        "30 00"
    );
    let err = decode(&data).expect_err("expected error");
    assert!(matches!(err, DecoderError::GrammarError { .. }));
}

#[test]
fn test_multiple_messages_in_one_chunk() {
    let mut input = Vec::new();
    input.extend_from_slice(UNBIND);
    input.extend_from_slice(BIND_REQUEST);
    input.extend_from_slice(BIND_RESPONSE);
    let mut decoder = Decoder::new();
    let ready = decoder.feed(&input).expect("feed failed");
    assert_eq!(ready, 3);
    let first = decoder.next_message().expect("stream alive").expect("msg");
    assert_eq!(first.protocol_op, ProtocolOp::UnbindRequest);
    let second = decoder.next_message().expect("stream alive").expect("msg");
    assert!(matches!(second.protocol_op, ProtocolOp::BindRequest(_)));
    let third = decoder.next_message().expect("stream alive").expect("msg");
    assert!(matches!(third.protocol_op, ProtocolOp::BindResponse(_)));
    assert!(decoder.finish().is_ok());
}

#[test]
fn test_strict_string_validation() {
    // diagnosticMessage carrying invalid UTF-8
    let data = hex!("30 0d 02 01 01 61 08 0a 01 00 04 00 04 01 ff");
    let msg = decode(&data).expect("lenient decoding failed");
    match &msg.protocol_op {
        ProtocolOp::BindResponse(resp) => {
            assert_eq!(resp.result.diagnostic_message.0, "\u{fffd}");
        }
        op => panic!("unexpected operation {:?}", op),
    }

    let opts = CodecOptions::default().strict_string_validation(true);
    let mut decoder = Decoder::with_options(opts);
    assert_eq!(decoder.feed(&data), Err(DecoderError::InvalidUtf8));
}

#[test]
fn test_binary_attribute_option_stripping() {
    // one attribute typed userCertificate;binary
    let data = hex!(
        "30 30 02 01 02 64 2b 04 05 64 63 3d 63 61"
        "30 22 30 20 04 16 75 73 65 72 43 65 72 74 69 66 69 63 61 74 65 3b 62 69 6e 61 72 79"
        "31 06 04 04 de ad be ef"
    );
    let msg = decode(&data).expect("decoding failed");
    match &msg.protocol_op {
        ProtocolOp::SearchResultEntry(entry) => {
            assert_eq!(entry.attributes[0].attr_type.0, "userCertificate;binary");
        }
        op => panic!("unexpected operation {:?}", op),
    }

    let opts = CodecOptions::default().allow_binary_attribute_option(false);
    let mut decoder = Decoder::with_options(opts);
    decoder.feed(&data).expect("feed failed");
    let msg = decoder.next_message().expect("stream alive").expect("msg");
    match &msg.protocol_op {
        ProtocolOp::SearchResultEntry(entry) => {
            assert_eq!(entry.attributes[0].attr_type.0, "userCertificate");
        }
        op => panic!("unexpected operation {:?}", op),
    }
}
