//! Decode grammar
//!
//! The transition table of the streaming decoder: a flat state enum and
//! a `match (state, tag)` dispatch, which the compiler lowers to jump
//! tables. Each arm is an action on the decoding container: it converts
//! the current TLV content, mutates the partially built message, and
//! moves to the next state. Container nesting is tracked by the frame
//! stack owned by [`Decoder`]; popping a frame fires the end-of-container
//! arms below.

use crate::ber;
use crate::decoder::{Decoder, Frame};
use crate::error::DecoderError;
use crate::filter::*;
use crate::ldap::*;

use log::trace;
use std::mem;

// and/or nesting deeper than this is rejected
const MAX_FILTER_DEPTH: usize = 128;

/// Position of the decoder inside the message grammar.
///
/// Carried by [`DecoderError::UnexpectedTag`] and
/// [`DecoderError::GrammarError`] for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Start,
    MessageId,
    ProtocolOp,
    /// Operation complete, controls or end of message may follow.
    AfterOp,
    /// Controls complete, only the end of the message may follow.
    AfterControls,
    /// Inside an operation whose last component was read.
    OpEnd,
    // BindRequest
    BindVersion,
    BindName,
    BindAuth,
    SaslMechanism,
    SaslCredentials,
    SaslEnd,
    // LDAPResult, shared by every response carrying one
    ResultCode,
    ResultMatchedDn,
    ResultDiagnostic,
    /// After diagnosticMessage: referral or trailing fields or end.
    ResultTail,
    /// After the referral: trailing fields or end.
    ResultExtra,
    ReferralUri,
    /// ExtendedResponse after responseName.
    ExtRespValue,
    // SearchRequest
    SearchBase,
    SearchScope,
    SearchDeref,
    SearchSizeLimit,
    SearchTimeLimit,
    SearchTypesOnly,
    /// Expecting a filter element.
    FilterItem,
    AvaDesc,
    AvaValue,
    AvaEnd,
    SubstringsType,
    SubstringsSeqHeader,
    SubstringsItem,
    SubstringsEnd,
    MatchingRuleStart,
    MatchingRuleType,
    MatchingRuleValue,
    MatchingRuleDnAttrs,
    MatchingRuleEnd,
    SearchAttributes,
    SearchAttributeItem,
    // SearchResultEntry / AddRequest attribute lists
    EntryName,
    AttrList,
    AttrListItem,
    AttrType,
    AttrValues,
    AttrValueItem,
    AttrEnd,
    // ModifyRequest
    ModifyObject,
    ChangeList,
    ChangeItem,
    ChangeOperation,
    ChangeModification,
    ChangeEnd,
    // ModifyDNRequest
    ModDnEntry,
    ModDnNewRdn,
    ModDnDeleteOld,
    ModDnNewSuperior,
    // CompareRequest
    CompareEntry,
    CompareAva,
    // SearchResultReference
    ReferenceUri,
    // ExtendedRequest
    ExtReqName,
    ExtReqValue,
    // IntermediateResponse
    IntermediateStart,
    IntermediateValue,
    // Controls
    ControlList,
    ControlOid,
    ControlCrit,
    ControlValue,
    ControlEnd,
}

/// What a pending frame on the container stack delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Message,
    Op,
    Sasl,
    Referral,
    Controls,
    Control,
    AttrList,
    Attr,
    ValSet,
    ChangeList,
    Change,
    CompareAva,
    SearchAttrs,
    FilterBranch,
    FilterAva(AvaKind),
    Substrings,
    SubstringSeq,
    MatchingRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AvaKind {
    Equality,
    GreaterOrEqual,
    LessOrEqual,
    Approx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchKind {
    And,
    Or,
    Not,
}

/// The operation being assembled while its TLVs arrive.
///
/// Every response embedding an LDAPResult shares one variant; the
/// application tag recorded at the opening header picks the final
/// `ProtocolOp` shape when the operation frame closes.
#[derive(Debug)]
pub(crate) enum PendingOp {
    Idle,
    Bind {
        version: u8,
        name: LdapDN,
        auth: Option<AuthenticationChoice>,
    },
    Search {
        base_object: LdapDN,
        scope: SearchScope,
        deref_aliases: DerefAliases,
        size_limit: u32,
        time_limit: u32,
        types_only: bool,
        attributes: Vec<LdapString>,
    },
    Entry {
        object_name: LdapDN,
        attributes: Vec<PartialAttribute>,
    },
    Add {
        entry: LdapDN,
        attributes: Vec<Attribute>,
    },
    Modify {
        object: LdapDN,
        changes: Vec<Change>,
        operation: Operation,
    },
    ModDn {
        entry: LdapDN,
        newrdn: RelativeLdapDN,
        deleteoldrdn: bool,
        newsuperior: Option<LdapDN>,
    },
    Compare {
        entry: LdapDN,
        ava: Option<AttributeValueAssertion>,
    },
    ExtendedReq {
        request_name: LdapOID,
        request_value: Option<Vec<u8>>,
    },
    Response {
        tag: u32,
        result: LdapResult,
        server_sasl_creds: Option<Vec<u8>>,
        response_name: Option<LdapOID>,
        response_value: Option<Vec<u8>>,
    },
    Intermediate {
        response_name: Option<LdapOID>,
        response_value: Option<Vec<u8>>,
    },
    Reference {
        uris: Vec<LdapString>,
    },
}

impl PendingOp {
    fn response(tag: u32) -> Self {
        PendingOp::Response {
            tag,
            result: LdapResult {
                result_code: ResultCode(0),
                matched_dn: LdapDN(String::new()),
                diagnostic_message: LdapString(String::new()),
                referral: None,
            },
            server_sasl_creds: None,
            response_name: None,
            response_value: None,
        }
    }
}

/// Bottom-up assembly of the filter tree.
///
/// Branch nodes live on an explicit stack while their children arrive;
/// completed subtrees are attached to the innermost branch, or become
/// the root once the stack is empty.
#[derive(Debug, Default)]
pub(crate) struct FilterAssembler {
    stack: Vec<(BranchKind, Vec<Filter>)>,
    pub(crate) root: Option<Filter>,
    // leaf scratch
    pub(crate) substr_type: String,
    pub(crate) substrings: Vec<Substring>,
    pub(crate) matching_rule: Option<LdapString>,
    pub(crate) rule_type: Option<LdapString>,
    pub(crate) match_value: Vec<u8>,
    pub(crate) dn_attributes: bool,
}

impl FilterAssembler {
    fn open_branch(&mut self, kind: BranchKind) -> Result<(), ()> {
        if self.stack.len() >= MAX_FILTER_DEPTH {
            return Err(());
        }
        self.stack.push((kind, Vec::new()));
        Ok(())
    }

    /// Attach a completed subtree; true when the whole filter is done.
    fn attach(&mut self, filter: Filter) -> Result<bool, ()> {
        match self.stack.last_mut() {
            Some((BranchKind::Not, children)) if !children.is_empty() => Err(()),
            Some((_, children)) => {
                children.push(filter);
                Ok(false)
            }
            None => {
                self.root = Some(filter);
                Ok(true)
            }
        }
    }

    /// Close the innermost branch and attach it one level up.
    fn close_branch(&mut self) -> Result<bool, ()> {
        let (kind, mut children) = self.stack.pop().ok_or(())?;
        let node = match kind {
            BranchKind::And => Filter::And(children),
            BranchKind::Or => Filter::Or(children),
            BranchKind::Not => {
                if children.len() != 1 {
                    return Err(());
                }
                Filter::Not(Box::new(children.remove(0)))
            }
        };
        self.attach(node)
    }

    fn reset_matching_rule(&mut self) {
        self.matching_rule = None;
        self.rule_type = None;
        self.match_value.clear();
        self.dn_attributes = false;
    }
}

impl Decoder {
    fn unexpected(&self, tag: u8) -> DecoderError {
        DecoderError::UnexpectedTag {
            state: self.state,
            tag,
        }
    }

    fn malformed(&self, tag: u8) -> DecoderError {
        DecoderError::GrammarError {
            state: self.state,
            tag,
        }
    }

    fn set_state(&mut self, next: DecoderState) {
        trace!("grammar: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn push_frame(&mut self, end: u64, tag: u8, kind: FrameKind) {
        self.frames.push(Frame { end, tag, kind });
    }

    /// Convert string content honoring the strictness option.
    fn utf8(&self, content: Vec<u8>) -> Result<String, DecoderError> {
        ber::string_value(content, self.opts.strict_string_validation)
    }

    /// Convert an attribute description, stripping options such as
    /// `;binary` when they are not allowed.
    fn attr_desc(&self, content: Vec<u8>) -> Result<LdapString, DecoderError> {
        let mut s = self.utf8(content)?;
        if !self.opts.allow_binary_attribute_option {
            if let Some(semi) = s.find(';') {
                s.truncate(semi);
            }
        }
        Ok(LdapString(s))
    }

    fn result_mut(&mut self) -> Result<&mut LdapResult, DecoderError> {
        let state = self.state;
        match &mut self.pending {
            PendingOp::Response { result, .. } => Ok(result),
            _ => Err(DecoderError::GrammarError { state, tag: 0 }),
        }
    }

    /// Transition on a completed filter subtree.
    fn filter_attached(&mut self, complete: bool) {
        if complete {
            self.set_state(DecoderState::SearchAttributes);
        } else {
            self.set_state(DecoderState::FilterItem);
        }
    }

    /// A constructed header was read and its bounds were validated.
    pub(crate) fn on_constructed(&mut self, tag: u8, end: u64) -> Result<(), DecoderError> {
        use DecoderState as S;
        match (self.state, tag) {
            // protocolOp      CHOICE { ... }
            (S::ProtocolOp, 0x60) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Bind {
                    version: 0,
                    name: LdapDN(String::new()),
                    auth: None,
                };
                self.set_state(S::BindVersion);
            }
            (S::ProtocolOp, 0x61) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(1);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x63) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Search {
                    base_object: LdapDN(String::new()),
                    scope: SearchScope(0),
                    deref_aliases: DerefAliases(0),
                    size_limit: 0,
                    time_limit: 0,
                    types_only: false,
                    attributes: Vec::new(),
                };
                self.set_state(S::SearchBase);
            }
            (S::ProtocolOp, 0x64) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Entry {
                    object_name: LdapDN(String::new()),
                    attributes: Vec::new(),
                };
                self.set_state(S::EntryName);
            }
            (S::ProtocolOp, 0x65) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(5);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x66) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Modify {
                    object: LdapDN(String::new()),
                    changes: Vec::new(),
                    operation: Operation(0),
                };
                self.set_state(S::ModifyObject);
            }
            (S::ProtocolOp, 0x67) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(7);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x68) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Add {
                    entry: LdapDN(String::new()),
                    attributes: Vec::new(),
                };
                self.set_state(S::EntryName);
            }
            (S::ProtocolOp, 0x69) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(9);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x6b) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(11);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x6c) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::ModDn {
                    entry: LdapDN(String::new()),
                    newrdn: RelativeLdapDN(String::new()),
                    deleteoldrdn: false,
                    newsuperior: None,
                };
                self.set_state(S::ModDnEntry);
            }
            (S::ProtocolOp, 0x6d) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(13);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x6e) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Compare {
                    entry: LdapDN(String::new()),
                    ava: None,
                };
                self.set_state(S::CompareEntry);
            }
            (S::ProtocolOp, 0x6f) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(15);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x73) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Reference { uris: Vec::new() };
                self.set_state(S::ReferenceUri);
            }
            (S::ProtocolOp, 0x77) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::ExtendedReq {
                    request_name: LdapOID(String::new()),
                    request_value: None,
                };
                self.set_state(S::ExtReqName);
            }
            (S::ProtocolOp, 0x78) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::response(24);
                self.set_state(S::ResultCode);
            }
            (S::ProtocolOp, 0x79) => {
                self.push_frame(end, tag, FrameKind::Op);
                self.pending = PendingOp::Intermediate {
                    response_name: None,
                    response_value: None,
                };
                self.set_state(S::IntermediateStart);
            }
            (S::ProtocolOp, t) if t & 0xc0 == 0x40 => {
                // application-class tag outside the CHOICE
                return Err(DecoderError::UnsupportedChoice(u32::from(t)));
            }

            // authentication          AuthenticationChoice
            // sasl                    [3] SaslCredentials
            (S::BindAuth, 0xa3) => {
                self.push_frame(end, tag, FrameKind::Sasl);
                self.set_state(S::SaslMechanism);
            }

            // referral           [3] Referral OPTIONAL
            (S::ResultTail, 0xa3) => {
                self.result_mut()?.referral = Some(Vec::new());
                self.push_frame(end, tag, FrameKind::Referral);
                self.set_state(S::ReferralUri);
            }

            // Filter ::= CHOICE { ... }
            (S::FilterItem, 0xa0) | (S::FilterItem, 0xa1) | (S::FilterItem, 0xa2) => {
                let kind = match tag {
                    0xa0 => BranchKind::And,
                    0xa1 => BranchKind::Or,
                    _ => BranchKind::Not,
                };
                self.filter
                    .open_branch(kind)
                    .map_err(|_| self.malformed(tag))?;
                self.push_frame(end, tag, FrameKind::FilterBranch);
            }
            (S::FilterItem, 0xa3) => {
                self.push_frame(end, tag, FrameKind::FilterAva(AvaKind::Equality));
                self.set_state(S::AvaDesc);
            }
            (S::FilterItem, 0xa4) => {
                self.push_frame(end, tag, FrameKind::Substrings);
                self.filter.substr_type.clear();
                self.filter.substrings.clear();
                self.set_state(S::SubstringsType);
            }
            (S::FilterItem, 0xa5) => {
                self.push_frame(end, tag, FrameKind::FilterAva(AvaKind::GreaterOrEqual));
                self.set_state(S::AvaDesc);
            }
            (S::FilterItem, 0xa6) => {
                self.push_frame(end, tag, FrameKind::FilterAva(AvaKind::LessOrEqual));
                self.set_state(S::AvaDesc);
            }
            (S::FilterItem, 0xa8) => {
                self.push_frame(end, tag, FrameKind::FilterAva(AvaKind::Approx));
                self.set_state(S::AvaDesc);
            }
            (S::FilterItem, 0xa9) => {
                self.push_frame(end, tag, FrameKind::MatchingRule);
                self.filter.reset_matching_rule();
                self.set_state(S::MatchingRuleStart);
            }
            (S::FilterItem, t) if t & 0xc0 == 0x80 => {
                return Err(DecoderError::UnsupportedChoice(u32::from(t)));
            }

            // substrings     SEQUENCE SIZE (1..MAX) OF substring
            (S::SubstringsSeqHeader, 0x30) => {
                self.push_frame(end, tag, FrameKind::SubstringSeq);
                self.set_state(S::SubstringsItem);
            }

            // attributes      AttributeSelection
            (S::SearchAttributes, 0x30) => {
                self.push_frame(end, tag, FrameKind::SearchAttrs);
                self.set_state(S::SearchAttributeItem);
            }

            // PartialAttributeList / AttributeList
            (S::AttrList, 0x30) => {
                self.push_frame(end, tag, FrameKind::AttrList);
                self.set_state(S::AttrListItem);
            }
            (S::AttrListItem, 0x30) => {
                self.push_frame(end, tag, FrameKind::Attr);
                self.attr_type = LdapString(String::new());
                self.attr_vals = Vec::new();
                self.set_state(S::AttrType);
            }
            // vals       SET OF value AttributeValue
            (S::AttrValues, 0x31) => {
                self.push_frame(end, tag, FrameKind::ValSet);
                self.set_state(S::AttrValueItem);
            }

            // changes         SEQUENCE OF change SEQUENCE
            (S::ChangeList, 0x30) => {
                self.push_frame(end, tag, FrameKind::ChangeList);
                self.set_state(S::ChangeItem);
            }
            (S::ChangeItem, 0x30) => {
                self.push_frame(end, tag, FrameKind::Change);
                self.set_state(S::ChangeOperation);
            }
            // modification    PartialAttribute
            (S::ChangeModification, 0x30) => {
                self.push_frame(end, tag, FrameKind::Attr);
                self.attr_type = LdapString(String::new());
                self.attr_vals = Vec::new();
                self.set_state(S::AttrType);
            }

            // ava             AttributeValueAssertion
            (S::CompareAva, 0x30) => {
                self.push_frame(end, tag, FrameKind::CompareAva);
                self.set_state(S::AvaDesc);
            }

            // controls       [0] Controls OPTIONAL
            (S::AfterOp, 0xa0) => {
                self.controls = Some(Vec::new());
                self.push_frame(end, tag, FrameKind::Controls);
                self.set_state(S::ControlList);
            }
            // Control ::= SEQUENCE { ... }
            (S::ControlList, 0x30) => {
                self.push_frame(end, tag, FrameKind::Control);
                self.control = None;
                self.set_state(S::ControlOid);
            }

            (_, t) => return Err(self.unexpected(t)),
        }
        Ok(())
    }

    /// A primitive element completed with its content.
    pub(crate) fn on_value(&mut self, tag: u8, content: Vec<u8>) -> Result<(), DecoderError> {
        use DecoderState as S;
        match (self.state, tag) {
            // messageID       MessageID
            (S::MessageId, 0x02) => {
                let id = ber::parse_nonneg_int(&content)? as i32;
                self.message_id = MessageID(id);
                self.seen_id = true;
                self.set_state(S::ProtocolOp);
            }

            // UnbindRequest ::= [APPLICATION 2] NULL
            (S::ProtocolOp, 0x42) => {
                if !content.is_empty() {
                    return Err(self.malformed(tag));
                }
                self.op = Some(ProtocolOp::UnbindRequest);
                self.set_state(S::AfterOp);
            }
            // DelRequest ::= [APPLICATION 10] LDAPDN
            (S::ProtocolOp, 0x4a) => {
                let dn = LdapDN(self.utf8(content)?);
                self.op = Some(ProtocolOp::DelRequest(dn));
                self.set_state(S::AfterOp);
            }
            // AbandonRequest ::= [APPLICATION 16] MessageID
            (S::ProtocolOp, 0x50) => {
                let id = ber::parse_nonneg_int(&content)? as i32;
                self.op = Some(ProtocolOp::AbandonRequest(MessageID(id)));
                self.set_state(S::AfterOp);
            }
            (S::ProtocolOp, t) if t & 0xc0 == 0x40 => {
                // application-class tag outside the CHOICE
                return Err(DecoderError::UnsupportedChoice(u32::from(t)));
            }

            // version                 INTEGER (1 ..  127)
            (S::BindVersion, 0x02) => {
                let v = ber::parse_int(&content)?;
                if !(1..=127).contains(&v) {
                    return Err(DecoderError::IntegerOutOfRange);
                }
                match &mut self.pending {
                    PendingOp::Bind { version, .. } => *version = v as u8,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::BindName);
            }
            (S::BindName, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Bind { name, .. } => *name = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::BindAuth);
            }
            // simple                  [0] OCTET STRING
            (S::BindAuth, 0x80) => {
                match &mut self.pending {
                    PendingOp::Bind { auth, .. } => {
                        *auth = Some(AuthenticationChoice::Simple(content))
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::OpEnd);
            }
            // 1 and 2 are reserved authentication choices
            (S::BindAuth, 0x81) | (S::BindAuth, 0x82) => {
                return Err(DecoderError::UnsupportedChoice(u32::from(tag)));
            }
            // mechanism               LDAPString
            (S::SaslMechanism, 0x04) => {
                let mechanism = LdapString(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Bind { auth, .. } => {
                        *auth = Some(AuthenticationChoice::Sasl(SaslCredentials {
                            mechanism,
                            credentials: None,
                        }))
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SaslCredentials);
            }
            // credentials             OCTET STRING OPTIONAL
            (S::SaslCredentials, 0x04) => {
                match &mut self.pending {
                    PendingOp::Bind {
                        auth: Some(AuthenticationChoice::Sasl(creds)),
                        ..
                    } => creds.credentials = Some(content),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SaslEnd);
            }

            // resultCode         ENUMERATED
            (S::ResultCode, 0x0a) => {
                let code = ber::parse_nonneg_int(&content)?;
                self.result_mut()?.result_code = ResultCode(code);
                self.set_state(S::ResultMatchedDn);
            }
            (S::ResultMatchedDn, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                self.result_mut()?.matched_dn = dn;
                self.set_state(S::ResultDiagnostic);
            }
            (S::ResultDiagnostic, 0x04) => {
                let msg = LdapString(self.utf8(content)?);
                self.result_mut()?.diagnostic_message = msg;
                self.set_state(S::ResultTail);
            }
            // uri URI, inside the referral
            (S::ReferralUri, 0x04) => {
                let uri = LdapString(self.utf8(content)?);
                match self.result_mut()?.referral.as_mut() {
                    Some(uris) => uris.push(uri),
                    None => return Err(self.malformed(tag)),
                }
            }
            // serverSaslCreds    [7] OCTET STRING OPTIONAL
            (S::ResultTail, 0x87) | (S::ResultExtra, 0x87) => {
                match &mut self.pending {
                    PendingOp::Response {
                        tag: 1,
                        server_sasl_creds,
                        ..
                    } => *server_sasl_creds = Some(content),
                    _ => return Err(self.unexpected(tag)),
                }
                self.set_state(S::OpEnd);
            }
            // responseName     [10] LDAPOID OPTIONAL
            (S::ResultTail, 0x8a) | (S::ResultExtra, 0x8a) => {
                let name = LdapOID(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Response {
                        tag: 24,
                        response_name,
                        ..
                    } => *response_name = Some(name),
                    _ => return Err(self.unexpected(tag)),
                }
                self.set_state(S::ExtRespValue);
            }
            // responseValue    [11] OCTET STRING OPTIONAL
            (S::ResultTail, 0x8b) | (S::ResultExtra, 0x8b) | (S::ExtRespValue, 0x8b) => {
                match &mut self.pending {
                    PendingOp::Response {
                        tag: 24,
                        response_value,
                        ..
                    } => *response_value = Some(content),
                    _ => return Err(self.unexpected(tag)),
                }
                self.set_state(S::OpEnd);
            }

            // baseObject      LDAPDN
            (S::SearchBase, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Search { base_object, .. } => *base_object = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SearchScope);
            }
            // scope           ENUMERATED { baseObject (0), singleLevel (1), wholeSubtree (2) }
            (S::SearchScope, 0x0a) => {
                let v = ber::parse_nonneg_int(&content)?;
                if v > 2 {
                    return Err(DecoderError::UnsupportedChoice(v));
                }
                match &mut self.pending {
                    PendingOp::Search { scope, .. } => *scope = SearchScope(v),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SearchDeref);
            }
            // derefAliases    ENUMERATED { ... (0..3) }
            (S::SearchDeref, 0x0a) => {
                let v = ber::parse_nonneg_int(&content)?;
                if v > 3 {
                    return Err(DecoderError::UnsupportedChoice(v));
                }
                match &mut self.pending {
                    PendingOp::Search { deref_aliases, .. } => *deref_aliases = DerefAliases(v),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SearchSizeLimit);
            }
            // sizeLimit       INTEGER (0 ..  maxInt)
            (S::SearchSizeLimit, 0x02) => {
                let v = ber::parse_nonneg_int(&content)?;
                match &mut self.pending {
                    PendingOp::Search { size_limit, .. } => *size_limit = v,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SearchTimeLimit);
            }
            // timeLimit       INTEGER (0 ..  maxInt)
            (S::SearchTimeLimit, 0x02) => {
                let v = ber::parse_nonneg_int(&content)?;
                match &mut self.pending {
                    PendingOp::Search { time_limit, .. } => *time_limit = v,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::SearchTypesOnly);
            }
            // typesOnly       BOOLEAN
            (S::SearchTypesOnly, 0x01) => {
                let v = ber::parse_bool(&content)?;
                match &mut self.pending {
                    PendingOp::Search { types_only, .. } => *types_only = v,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::FilterItem);
            }

            // present         [7] AttributeDescription
            (S::FilterItem, 0x87) => {
                let attr = self.attr_desc(content)?;
                let complete = self
                    .filter
                    .attach(Filter::Present(attr))
                    .map_err(|_| self.malformed(tag))?;
                self.filter_attached(complete);
            }
            (S::FilterItem, t) if t & 0xc0 == 0x80 => {
                return Err(DecoderError::UnsupportedChoice(u32::from(t)));
            }

            // attributeDesc   AttributeDescription
            (S::AvaDesc, 0x04) => {
                self.ava_attr = self.attr_desc(content)?;
                self.set_state(S::AvaValue);
            }
            // assertionValue  AssertionValue
            (S::AvaValue, 0x04) => {
                self.ava_value = content;
                self.set_state(S::AvaEnd);
            }

            // type           AttributeDescription (substring filter)
            (S::SubstringsType, 0x04) => {
                self.filter.substr_type = self.attr_desc(content)?.0;
                self.set_state(S::SubstringsSeqHeader);
            }
            // initial [0] AssertionValue -- can occur at most once, first
            (S::SubstringsItem, 0x80) => {
                if !self.filter.substrings.is_empty() {
                    return Err(self.malformed(tag));
                }
                self.filter.substrings.push(Substring::Initial(content));
            }
            // any     [1] AssertionValue
            (S::SubstringsItem, 0x81) => {
                if matches!(self.filter.substrings.last(), Some(Substring::Final(_))) {
                    return Err(self.malformed(tag));
                }
                self.filter.substrings.push(Substring::Any(content));
            }
            // final   [2] AssertionValue -- can occur at most once, last
            (S::SubstringsItem, 0x82) => {
                if matches!(self.filter.substrings.last(), Some(Substring::Final(_))) {
                    return Err(self.malformed(tag));
                }
                self.filter.substrings.push(Substring::Final(content));
            }

            // matchingRule    [1] MatchingRuleId OPTIONAL
            (S::MatchingRuleStart, 0x81) => {
                self.filter.matching_rule = Some(LdapString(self.utf8(content)?));
                self.set_state(S::MatchingRuleType);
            }
            // type            [2] AttributeDescription OPTIONAL
            (S::MatchingRuleStart, 0x82) | (S::MatchingRuleType, 0x82) => {
                self.filter.rule_type = Some(self.attr_desc(content)?);
                self.set_state(S::MatchingRuleValue);
            }
            // matchValue      [3] AssertionValue
            (S::MatchingRuleStart, 0x83)
            | (S::MatchingRuleType, 0x83)
            | (S::MatchingRuleValue, 0x83) => {
                self.filter.match_value = content;
                self.set_state(S::MatchingRuleDnAttrs);
            }
            // dnAttributes    [4] BOOLEAN DEFAULT FALSE
            (S::MatchingRuleDnAttrs, 0x84) => {
                self.filter.dn_attributes = ber::parse_bool(&content)?;
                self.set_state(S::MatchingRuleEnd);
            }

            // selector LDAPString
            (S::SearchAttributeItem, 0x04) => {
                let attr = LdapString(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Search { attributes, .. } => attributes.push(attr),
                    _ => return Err(self.malformed(tag)),
                }
            }

            // objectName LDAPDN (entry) / entry LDAPDN (add)
            (S::EntryName, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Entry { object_name, .. } => *object_name = dn,
                    PendingOp::Add { entry, .. } => *entry = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::AttrList);
            }
            // type       AttributeDescription
            (S::AttrType, 0x04) => {
                self.attr_type = self.attr_desc(content)?;
                self.set_state(S::AttrValues);
            }
            // value AttributeValue
            (S::AttrValueItem, 0x04) => {
                self.attr_vals.push(AttributeValue(content));
            }

            // object          LDAPDN
            (S::ModifyObject, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Modify { object, .. } => *object = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ChangeList);
            }
            // operation       ENUMERATED { add (0), delete (1), replace (2), increment (3) }
            (S::ChangeOperation, 0x0a) => {
                let v = ber::parse_nonneg_int(&content)?;
                if v > 3 {
                    return Err(DecoderError::UnsupportedChoice(v));
                }
                match &mut self.pending {
                    PendingOp::Modify { operation, .. } => *operation = Operation(v),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ChangeModification);
            }

            // entry           LDAPDN
            (S::ModDnEntry, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::ModDn { entry, .. } => *entry = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ModDnNewRdn);
            }
            // newrdn          RelativeLDAPDN
            (S::ModDnNewRdn, 0x04) => {
                let rdn = RelativeLdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::ModDn { newrdn, .. } => *newrdn = rdn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ModDnDeleteOld);
            }
            // deleteoldrdn    BOOLEAN
            (S::ModDnDeleteOld, 0x01) => {
                let v = ber::parse_bool(&content)?;
                match &mut self.pending {
                    PendingOp::ModDn { deleteoldrdn, .. } => *deleteoldrdn = v,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ModDnNewSuperior);
            }
            // newSuperior     [0] LDAPDN OPTIONAL
            (S::ModDnNewSuperior, 0x80) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::ModDn { newsuperior, .. } => *newsuperior = Some(dn),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::OpEnd);
            }

            // entry           LDAPDN (compare)
            (S::CompareEntry, 0x04) => {
                let dn = LdapDN(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Compare { entry, .. } => *entry = dn,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::CompareAva);
            }

            // uri URI (search result reference)
            (S::ReferenceUri, 0x04) => {
                let uri = LdapString(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Reference { uris } => uris.push(uri),
                    _ => return Err(self.malformed(tag)),
                }
            }

            // requestName      [0] LDAPOID
            (S::ExtReqName, 0x80) => {
                let name = LdapOID(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::ExtendedReq { request_name, .. } => *request_name = name,
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ExtReqValue);
            }
            // requestValue     [1] OCTET STRING OPTIONAL
            (S::ExtReqValue, 0x81) => {
                match &mut self.pending {
                    PendingOp::ExtendedReq { request_value, .. } => {
                        *request_value = Some(content)
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::OpEnd);
            }

            // responseName     [0] LDAPOID OPTIONAL
            (S::IntermediateStart, 0x80) => {
                let name = LdapOID(self.utf8(content)?);
                match &mut self.pending {
                    PendingOp::Intermediate { response_name, .. } => {
                        *response_name = Some(name)
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::IntermediateValue);
            }
            // responseValue    [1] OCTET STRING OPTIONAL
            (S::IntermediateStart, 0x81) | (S::IntermediateValue, 0x81) => {
                match &mut self.pending {
                    PendingOp::Intermediate { response_value, .. } => {
                        *response_value = Some(content)
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::OpEnd);
            }

            // controlType             LDAPOID
            (S::ControlOid, 0x04) => {
                let oid = LdapOID(self.utf8(content)?);
                let duplicate = self
                    .controls
                    .as_ref()
                    .map(|ctls| ctls.iter().any(|c| c.control_type == oid))
                    .unwrap_or(false);
                if duplicate {
                    return Err(DecoderError::DuplicateControlOid(oid.0));
                }
                self.control = Some(Control {
                    control_type: oid,
                    criticality: false,
                    control_value: None,
                });
                self.set_state(S::ControlCrit);
            }
            // criticality             BOOLEAN DEFAULT FALSE
            (S::ControlCrit, 0x01) => {
                let v = ber::parse_bool(&content)?;
                match self.control.as_mut() {
                    Some(c) => c.criticality = v,
                    None => return Err(self.malformed(tag)),
                }
                self.set_state(S::ControlValue);
            }
            // controlValue            OCTET STRING OPTIONAL
            (S::ControlCrit, 0x04) | (S::ControlValue, 0x04) => {
                match self.control.as_mut() {
                    Some(c) => c.control_value = Some(content),
                    None => return Err(self.malformed(tag)),
                }
                self.set_state(S::ControlEnd);
            }

            (_, t) => return Err(self.unexpected(t)),
        }
        Ok(())
    }

    /// A container frame closed at its announced end offset.
    pub(crate) fn on_frame_end(&mut self, frame: Frame) -> Result<(), DecoderError> {
        use DecoderState as S;
        match frame.kind {
            FrameKind::Message => match self.state {
                S::AfterOp | S::AfterControls => self.finish_message(),
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Op => self.finish_op(frame.tag),
            FrameKind::Sasl => match self.state {
                S::SaslCredentials | S::SaslEnd => {
                    self.set_state(S::OpEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Referral => match self.state {
                S::ReferralUri => {
                    let empty = self
                        .result_mut()?
                        .referral
                        .as_ref()
                        .map(Vec::is_empty)
                        .unwrap_or(true);
                    if empty {
                        // Referral ::= SEQUENCE SIZE (1..MAX) OF uri
                        return Err(self.malformed(frame.tag));
                    }
                    self.set_state(S::ResultExtra);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Controls => match self.state {
                S::ControlList => {
                    self.set_state(S::AfterControls);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Control => match self.state {
                S::ControlCrit | S::ControlValue | S::ControlEnd => {
                    let control = self.control.take().ok_or_else(|| self.malformed(frame.tag))?;
                    match self.controls.as_mut() {
                        Some(ctls) => ctls.push(control),
                        None => return Err(self.malformed(frame.tag)),
                    }
                    self.set_state(S::ControlList);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::AttrList => match self.state {
                S::AttrListItem => {
                    self.set_state(S::OpEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Attr => match self.state {
                S::AttrEnd => self.finish_attribute(frame.tag),
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::ValSet => match self.state {
                S::AttrValueItem => {
                    // Attribute ::= PartialAttribute(WITH COMPONENTS { ..., vals (SIZE(1..MAX)) })
                    if self.attr_vals.is_empty() && matches!(self.pending, PendingOp::Add { .. })
                    {
                        return Err(self.malformed(frame.tag));
                    }
                    self.set_state(S::AttrEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::ChangeList => match self.state {
                S::ChangeItem => {
                    self.set_state(S::OpEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Change => match self.state {
                S::ChangeEnd => {
                    self.set_state(S::ChangeItem);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::CompareAva => match self.state {
                S::AvaEnd => {
                    let ava = AttributeValueAssertion {
                        attribute_desc: mem::replace(
                            &mut self.ava_attr,
                            LdapString(String::new()),
                        ),
                        assertion_value: mem::take(&mut self.ava_value),
                    };
                    match &mut self.pending {
                        PendingOp::Compare { ava: slot, .. } => *slot = Some(ava),
                        _ => return Err(self.malformed(frame.tag)),
                    }
                    self.set_state(S::OpEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::SearchAttrs => match self.state {
                S::SearchAttributeItem => {
                    self.set_state(S::OpEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::FilterBranch => match self.state {
                S::FilterItem => {
                    let complete = self
                        .filter
                        .close_branch()
                        .map_err(|_| self.malformed(frame.tag))?;
                    self.filter_attached(complete);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::FilterAva(kind) => match self.state {
                S::AvaEnd => {
                    let ava = AttributeValueAssertion {
                        attribute_desc: mem::replace(
                            &mut self.ava_attr,
                            LdapString(String::new()),
                        ),
                        assertion_value: mem::take(&mut self.ava_value),
                    };
                    let leaf = match kind {
                        AvaKind::Equality => Filter::EqualityMatch(ava),
                        AvaKind::GreaterOrEqual => Filter::GreaterOrEqual(ava),
                        AvaKind::LessOrEqual => Filter::LessOrEqual(ava),
                        AvaKind::Approx => Filter::ApproxMatch(ava),
                    };
                    let complete = self
                        .filter
                        .attach(leaf)
                        .map_err(|_| self.malformed(frame.tag))?;
                    self.filter_attached(complete);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::Substrings => match self.state {
                S::SubstringsEnd => {
                    let leaf = Filter::Substrings(SubstringFilter {
                        filter_type: LdapString(mem::take(&mut self.filter.substr_type)),
                        substrings: mem::take(&mut self.filter.substrings),
                    });
                    let complete = self
                        .filter
                        .attach(leaf)
                        .map_err(|_| self.malformed(frame.tag))?;
                    self.filter_attached(complete);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::SubstringSeq => match self.state {
                S::SubstringsItem => {
                    if self.filter.substrings.is_empty() {
                        // SEQUENCE SIZE (1..MAX) OF substring
                        return Err(self.malformed(frame.tag));
                    }
                    self.set_state(S::SubstringsEnd);
                    Ok(())
                }
                _ => Err(self.malformed(frame.tag)),
            },
            FrameKind::MatchingRule => match self.state {
                S::MatchingRuleDnAttrs | S::MatchingRuleEnd => {
                    let leaf = Filter::ExtensibleMatch(MatchingRuleAssertion {
                        matching_rule: self.filter.matching_rule.take(),
                        rule_type: self.filter.rule_type.take(),
                        assertion_value: mem::take(&mut self.filter.match_value),
                        dn_attributes: self.filter.dn_attributes,
                    });
                    let complete = self
                        .filter
                        .attach(leaf)
                        .map_err(|_| self.malformed(frame.tag))?;
                    self.filter_attached(complete);
                    Ok(())
                }
                // matchValue is mandatory
                _ => Err(self.malformed(frame.tag)),
            },
        }
    }

    /// Attach a finished attribute to the operation that collects it.
    fn finish_attribute(&mut self, tag: u8) -> Result<(), DecoderError> {
        use DecoderState as S;
        let attr_type = mem::replace(&mut self.attr_type, LdapString(String::new()));
        let attr_vals = mem::take(&mut self.attr_vals);
        let parent = self.frames.last().map(|f| f.kind);
        match parent {
            Some(FrameKind::AttrList) => {
                match &mut self.pending {
                    PendingOp::Entry { attributes, .. } => {
                        // one list entry per attribute type
                        if attributes.iter().any(|a| a.attr_type == attr_type) {
                            return Err(self.malformed(tag));
                        }
                        attributes.push(PartialAttribute {
                            attr_type,
                            attr_vals,
                        });
                    }
                    PendingOp::Add { attributes, .. } => {
                        if attributes.iter().any(|a| a.attr_type == attr_type) {
                            return Err(self.malformed(tag));
                        }
                        attributes.push(Attribute {
                            attr_type,
                            attr_vals,
                        });
                    }
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::AttrListItem);
                Ok(())
            }
            Some(FrameKind::Change) => {
                match &mut self.pending {
                    PendingOp::Modify {
                        changes, operation, ..
                    } => changes.push(Change {
                        operation: *operation,
                        modification: PartialAttribute {
                            attr_type,
                            attr_vals,
                        },
                    }),
                    _ => return Err(self.malformed(tag)),
                }
                self.set_state(S::ChangeEnd);
                Ok(())
            }
            _ => Err(self.malformed(tag)),
        }
    }

    /// Close the operation frame and materialize the `ProtocolOp`.
    fn finish_op(&mut self, tag: u8) -> Result<(), DecoderError> {
        use DecoderState as S;
        let pending = mem::replace(&mut self.pending, PendingOp::Idle);
        let op = match pending {
            PendingOp::Bind {
                version,
                name,
                auth,
            } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                let authentication = auth.ok_or_else(|| self.malformed(tag))?;
                ProtocolOp::BindRequest(BindRequest {
                    version,
                    name,
                    authentication,
                })
            }
            PendingOp::Search {
                base_object,
                scope,
                deref_aliases,
                size_limit,
                time_limit,
                types_only,
                attributes,
            } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                let filter = self.filter.root.take().ok_or_else(|| self.malformed(tag))?;
                ProtocolOp::SearchRequest(SearchRequest {
                    base_object,
                    scope,
                    deref_aliases,
                    size_limit,
                    time_limit,
                    types_only,
                    filter,
                    attributes,
                })
            }
            PendingOp::Entry {
                object_name,
                attributes,
            } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::SearchResultEntry(SearchResultEntry {
                    object_name,
                    attributes,
                })
            }
            PendingOp::Add { entry, attributes } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::AddRequest(AddRequest { entry, attributes })
            }
            PendingOp::Modify {
                object, changes, ..
            } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::ModifyRequest(ModifyRequest { object, changes })
            }
            PendingOp::ModDn {
                entry,
                newrdn,
                deleteoldrdn,
                newsuperior,
            } => {
                // newSuperior is optional
                if !matches!(self.state, S::ModDnNewSuperior | S::OpEnd) {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::ModDnRequest(ModDnRequest {
                    entry,
                    newrdn,
                    deleteoldrdn,
                    newsuperior,
                })
            }
            PendingOp::Compare { entry, ava } => {
                if self.state != S::OpEnd {
                    return Err(self.malformed(tag));
                }
                let ava = ava.ok_or_else(|| self.malformed(tag))?;
                ProtocolOp::CompareRequest(CompareRequest { entry, ava })
            }
            PendingOp::ExtendedReq {
                request_name,
                request_value,
            } => {
                // requestValue is optional
                if !matches!(self.state, S::ExtReqValue | S::OpEnd) {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::ExtendedRequest(ExtendedRequest {
                    request_name,
                    request_value,
                })
            }
            PendingOp::Intermediate {
                response_name,
                response_value,
            } => {
                // both components are optional
                if !matches!(
                    self.state,
                    S::IntermediateStart | S::IntermediateValue | S::OpEnd
                ) {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::IntermediateResponse(IntermediateResponse {
                    response_name,
                    response_value,
                })
            }
            PendingOp::Reference { uris } => {
                // SEQUENCE SIZE (1..MAX) OF uri URI
                if self.state != S::ReferenceUri || uris.is_empty() {
                    return Err(self.malformed(tag));
                }
                ProtocolOp::SearchResultReference(uris)
            }
            PendingOp::Response {
                tag: op_tag,
                result,
                server_sasl_creds,
                response_name,
                response_value,
            } => {
                if !matches!(
                    self.state,
                    S::ResultTail | S::ResultExtra | S::ExtRespValue | S::OpEnd
                ) {
                    return Err(self.malformed(tag));
                }
                match op_tag {
                    1 => ProtocolOp::BindResponse(BindResponse {
                        result,
                        server_sasl_creds,
                    }),
                    5 => ProtocolOp::SearchResultDone(result),
                    7 => ProtocolOp::ModifyResponse(ModifyResponse { result }),
                    9 => ProtocolOp::AddResponse(result),
                    11 => ProtocolOp::DelResponse(result),
                    13 => ProtocolOp::ModDnResponse(result),
                    15 => ProtocolOp::CompareResponse(result),
                    24 => ProtocolOp::ExtendedResponse(ExtendedResponse {
                        result,
                        response_name,
                        response_value,
                    }),
                    _ => return Err(self.malformed(tag)),
                }
            }
            PendingOp::Idle => return Err(self.malformed(tag)),
        };
        self.op = Some(op);
        self.set_state(S::AfterOp);
        Ok(())
    }
}
