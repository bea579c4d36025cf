//! Extended operation payloads
//!
//! Helpers for the operations carried inside `ExtendedRequest` /
//! `ExtendedResponse` envelopes: each operation is a plain struct that
//! converts into an [`ExtendedRequest`], and response payloads are
//! parsed with [`ExopParser`]. The codec itself treats requestValue and
//! responseValue as opaque octets; everything here is layered on top.

use crate::ber;
use crate::error::DecoderError;
use crate::ldap::{ExtendedRequest, LdapOID};

/// A generic extended operation: name plus optional raw value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Exop {
    pub name: String,
    pub val: Option<Vec<u8>>,
}

impl From<Exop> for ExtendedRequest {
    fn from(exop: Exop) -> ExtendedRequest {
        ExtendedRequest {
            request_name: LdapOID(exop.name),
            request_value: exop.val,
        }
    }
}

/// Parse a response payload into a typed value.
pub trait ExopParser: Sized {
    fn parse(val: &[u8]) -> Result<Self, DecoderError>;
}

pub const STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";

/// StartTLS ([RFC 4511, section 4.14](https://www.rfc-editor.org/rfc/rfc4511#section-4.14)).
///
/// Carries no value in either direction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StartTLS;

impl From<StartTLS> for ExtendedRequest {
    fn from(_: StartTLS) -> ExtendedRequest {
        ExtendedRequest {
            request_name: LdapOID(STARTTLS_OID.to_string()),
            request_value: None,
        }
    }
}

pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Who Am I? ([RFC 4532](https://tools.ietf.org/html/rfc4532)).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WhoAmI;

/// Who Am I? response: the authorization identity of the connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WhoAmIResp {
    pub authzid: String,
}

impl From<WhoAmI> for ExtendedRequest {
    fn from(_: WhoAmI) -> ExtendedRequest {
        ExtendedRequest {
            request_name: LdapOID(WHOAMI_OID.to_string()),
            request_value: None,
        }
    }
}

impl ExopParser for WhoAmIResp {
    fn parse(val: &[u8]) -> Result<WhoAmIResp, DecoderError> {
        // the response value is the bare authzId, no BER wrapping
        let authzid = ber::string_value(val.to_vec(), true)?;
        Ok(WhoAmIResp { authzid })
    }
}

pub const PASSMOD_OID: &str = "1.3.6.1.4.1.4203.1.11.1";

/// Password Modify extended operation ([RFC 3062](https://tools.ietf.org/html/rfc3062)).
///
/// The precise semantics of a present or absent field depend on the
/// receiving server; the RFC prescribes the general rules:
///
/// * `user_id` names the entry whose password changes, not necessarily
///   a DN; when absent, the identity of the connection is used.
/// * A present `old_pass` must match the existing password.
/// * When `new_pass` is absent, the server may generate one and return
///   it in the response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PasswordModify<'a> {
    pub user_id: Option<&'a str>,
    pub old_pass: Option<&'a str>,
    pub new_pass: Option<&'a str>,
}

/// Password Modify response, carrying a generated password.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PasswordModifyResp {
    pub gen_pass: String,
}

impl<'a> From<PasswordModify<'a>> for ExtendedRequest {
    // PasswdModifyRequestValue ::= SEQUENCE {
    //      userIdentity    [0]  OCTET STRING OPTIONAL,
    //      oldPasswd       [1]  OCTET STRING OPTIONAL,
    //      newPasswd       [2]  OCTET STRING OPTIONAL }
    fn from(pm: PasswordModify<'a>) -> ExtendedRequest {
        let fields = [
            (0u8, pm.user_id),
            (1u8, pm.old_pass),
            (2u8, pm.new_pass),
        ];
        let content_len: usize = fields
            .iter()
            .filter_map(|&(_, f)| f.map(|s| ber::tlv_len(s.len())))
            .sum();
        let value = if content_len == 0 {
            None
        } else {
            let mut buf = Vec::with_capacity(ber::tlv_len(content_len));
            buf.push(ber::TAG_SEQUENCE);
            ber::push_len(&mut buf, content_len);
            for (nr, field) in &fields {
                if let Some(s) = field {
                    ber::push_tlv(&mut buf, ber::context(*nr), s.as_bytes());
                }
            }
            Some(buf)
        };
        ExtendedRequest {
            request_name: LdapOID(PASSMOD_OID.to_string()),
            request_value: value,
        }
    }
}

impl ExopParser for PasswordModifyResp {
    // PasswdModifyResponseValue ::= SEQUENCE {
    //      genPasswd       [0]     OCTET STRING OPTIONAL }
    fn parse(val: &[u8]) -> Result<PasswordModifyResp, DecoderError> {
        let mut outer = ber::Reader::new(val);
        let content = outer.read_expecting(ber::TAG_SEQUENCE)?;
        let mut inner = ber::Reader::new(content);
        let gen_pass = inner.read_expecting(ber::context(0))?;
        let gen_pass = ber::string_value(gen_pass.to_vec(), true)?;
        Ok(PasswordModifyResp { gen_pass })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_whoami_request_shape() {
        let req: ExtendedRequest = WhoAmI.into();
        assert_eq!(req.request_name.0, WHOAMI_OID);
        assert!(req.request_value.is_none());
    }

    #[test]
    fn test_whoami_response() {
        let resp = WhoAmIResp::parse(b"dn:cn=admin,dc=example,dc=com").expect("parse failed");
        assert_eq!(resp.authzid, "dn:cn=admin,dc=example,dc=com");
    }

    #[test]
    fn test_passmod_request_value() {
        let req: ExtendedRequest = PasswordModify {
            user_id: Some("u"),
            old_pass: Some("old"),
            new_pass: None,
        }
        .into();
        assert_eq!(req.request_name.0, PASSMOD_OID);
        assert_eq!(
            req.request_value.expect("value"),
            hex!("30 08 80 01 75 81 03 6f 6c 64")
        );
    }

    #[test]
    fn test_passmod_empty_request_has_no_value() {
        let req: ExtendedRequest = PasswordModify::default().into();
        assert!(req.request_value.is_none());
    }

    #[test]
    fn test_passmod_response() {
        let resp =
            PasswordModifyResp::parse(&hex!("30 08 80 06 73 33 63 72 33 74")).expect("parse");
        assert_eq!(resp.gen_pass, "s3cr3t");
    }
}
