//! String representation of search filters
//!
//! Parses the RFC 4515 textual form (`(&(objectClass=person)(cn=a*b))`)
//! into the [`Filter`] tree used by search requests. Values may carry
//! `\xx` hex escapes; escaped bytes go into the assertion value
//! verbatim, so binary assertions round-trip through the string form.
//!
//! Empty `and`/`or` sets are accepted as the absolute true/false
//! filters of RFC 4526.

use crate::filter::*;
use crate::ldap::LdapString;

/// An error raised while parsing the string form of a filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
    #[error("unexpected end of filter")]
    UnexpectedEnd,
    #[error("unexpected character at offset {0}")]
    UnexpectedChar(usize),
    #[error("invalid escape sequence at offset {0}")]
    BadEscape(usize),
    #[error("trailing characters after filter")]
    TrailingCharacters,
}

/// Parse the RFC 4515 string representation of a filter.
///
/// ```rust
/// use ldap_codec::filter::Filter;
/// use ldap_codec::filter_parser::parse_filter;
///
/// let filter = parse_filter("(&(objectClass=top)(cn=admin))").expect("filter");
/// match filter {
///     Filter::And(children) => assert_eq!(children.len(), 2),
///     _ => panic!("expected a conjunction"),
/// }
/// ```
pub fn parse_filter(input: &str) -> Result<Filter, FilterParseError> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };
    let filter = if parser.peek() == Some(b'(') {
        parser.parse_parenthesized()?
    } else {
        // a bare item is tolerated at top level
        parser.parse_item()?
    };
    if parser.pos != parser.input.len() {
        return Err(FilterParseError::TrailingCharacters);
    }
    Ok(filter)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, FilterParseError> {
        let b = self.peek().ok_or(FilterParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, byte: u8) -> Result<(), FilterParseError> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(FilterParseError::UnexpectedChar(self.pos)),
            None => Err(FilterParseError::UnexpectedEnd),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Filter, FilterParseError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_parenthesized()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(FilterParseError::UnexpectedEnd),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, FilterParseError> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.parse_parenthesized()?);
        }
        Ok(filters)
    }

    /// attr chars run until an operator, a colon or a delimiter.
    fn read_attr(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'~' | b'<' | b'>' | b':' | b'(' | b')' | b'*' | b'\\') {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// An assertion value with `\xx` unescaping. `stop_star` makes an
    /// unescaped `*` terminate the segment (substring splitting).
    fn read_value(&mut self, stop_star: bool) -> Result<Vec<u8>, FilterParseError> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => return Err(FilterParseError::UnexpectedEnd),
                Some(b')') => break,
                Some(b'*') if stop_star => break,
                Some(b'(') => return Err(FilterParseError::UnexpectedChar(self.pos)),
                Some(b'\\') => {
                    let at = self.pos;
                    self.pos += 1;
                    let hi = hex_digit(self.bump().map_err(|_| FilterParseError::BadEscape(at))?)
                        .ok_or(FilterParseError::BadEscape(at))?;
                    let lo = hex_digit(self.bump().map_err(|_| FilterParseError::BadEscape(at))?)
                        .ok_or(FilterParseError::BadEscape(at))?;
                    out.push(hi << 4 | lo);
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        Ok(out)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterParseError> {
        let attr = self.read_attr();
        match self.peek() {
            Some(b':') => self.parse_extensible(attr),
            Some(b'~') => {
                self.pos += 1;
                self.expect(b'=')?;
                self.simple(attr, Filter::ApproxMatch)
            }
            Some(b'>') => {
                self.pos += 1;
                self.expect(b'=')?;
                self.simple(attr, Filter::GreaterOrEqual)
            }
            Some(b'<') => {
                self.pos += 1;
                self.expect(b'=')?;
                self.simple(attr, Filter::LessOrEqual)
            }
            Some(b'=') if !attr.is_empty() => {
                self.pos += 1;
                self.parse_equality_or_substring(attr)
            }
            Some(_) => Err(FilterParseError::UnexpectedChar(self.pos)),
            None => Err(FilterParseError::UnexpectedEnd),
        }
    }

    fn simple<F>(&mut self, attr: String, build: F) -> Result<Filter, FilterParseError>
    where
        F: FnOnce(AttributeValueAssertion) -> Filter,
    {
        if attr.is_empty() {
            return Err(FilterParseError::UnexpectedChar(self.pos));
        }
        let value = self.read_value(false)?;
        Ok(build(AttributeValueAssertion {
            attribute_desc: LdapString(attr),
            assertion_value: value,
        }))
    }

    fn parse_equality_or_substring(&mut self, attr: String) -> Result<Filter, FilterParseError> {
        let mut segments = vec![self.read_value(true)?];
        while self.peek() == Some(b'*') {
            self.pos += 1;
            segments.push(self.read_value(true)?);
        }
        if segments.len() == 1 {
            let value = segments.pop().unwrap_or_default();
            return Ok(Filter::EqualityMatch(AttributeValueAssertion {
                attribute_desc: LdapString(attr),
                assertion_value: value,
            }));
        }
        if segments.len() == 2 && segments[0].is_empty() && segments[1].is_empty() {
            // attr=* is a presence test
            return Ok(Filter::Present(LdapString(attr)));
        }
        let last = segments.len() - 1;
        let mut substrings = Vec::new();
        for (i, segment) in segments.into_iter().enumerate() {
            if segment.is_empty() {
                continue;
            }
            let piece = if i == 0 {
                Substring::Initial(segment)
            } else if i == last {
                Substring::Final(segment)
            } else {
                Substring::Any(segment)
            };
            substrings.push(piece);
        }
        if substrings.is_empty() {
            return Err(FilterParseError::UnexpectedChar(self.pos));
        }
        Ok(Filter::Substrings(SubstringFilter {
            filter_type: LdapString(attr),
            substrings,
        }))
    }

    // extensible = attr [dnattrs] [matchingrule] ":=" assertionvalue
    //            / [dnattrs] matchingrule ":=" assertionvalue
    fn parse_extensible(&mut self, attr: String) -> Result<Filter, FilterParseError> {
        let mut dn_attributes = false;
        let mut matching_rule: Option<String> = None;
        loop {
            self.expect(b':')?;
            if self.peek() == Some(b'=') {
                self.pos += 1;
                break;
            }
            let token = self.read_attr();
            if token.is_empty() {
                return Err(FilterParseError::UnexpectedChar(self.pos));
            }
            if token.eq_ignore_ascii_case("dn") {
                dn_attributes = true;
            } else {
                matching_rule = Some(token);
            }
        }
        if attr.is_empty() && matching_rule.is_none() {
            return Err(FilterParseError::UnexpectedChar(self.pos));
        }
        let value = self.read_value(false)?;
        Ok(Filter::ExtensibleMatch(MatchingRuleAssertion {
            matching_rule: matching_rule.map(LdapString),
            rule_type: if attr.is_empty() {
                None
            } else {
                Some(LdapString(attr))
            },
            assertion_value: value,
            dn_attributes,
        }))
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence() {
        assert_eq!(
            parse_filter("(objectClass=*)"),
            Ok(Filter::present("objectClass"))
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(
            parse_filter("(cn=Babs Jensen)"),
            Ok(Filter::equals("cn", b"Babs Jensen"))
        );
    }

    #[test]
    fn test_escapes() {
        assert_eq!(
            parse_filter(r"(o=Parens R Us \28for all your parenthetical needs\29)"),
            Ok(Filter::equals(
                "o",
                b"Parens R Us (for all your parenthetical needs)"
            ))
        );
        assert_eq!(
            parse_filter(r"(cn=\2a)"),
            Ok(Filter::equals("cn", b"*"))
        );
        assert_eq!(
            parse_filter(r"(bin=\00\ff)"),
            Ok(Filter::equals("bin", &[0x00, 0xff]))
        );
    }

    #[test]
    fn test_boolean_nesting() {
        let filter = parse_filter("(&(objectClass=person)(!(cn=admin)))").expect("filter");
        match filter {
            Filter::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Filter::Not(_)));
            }
            f => panic!("unexpected filter {:?}", f),
        }
    }

    #[test]
    fn test_empty_and_is_absolute_true() {
        assert_eq!(parse_filter("(&)"), Ok(Filter::And(vec![])));
        assert_eq!(parse_filter("(|)"), Ok(Filter::Or(vec![])));
    }

    #[test]
    fn test_orderings() {
        let ge = parse_filter("(uidNumber>=1000)").expect("filter");
        assert!(matches!(ge, Filter::GreaterOrEqual(_)));
        let le = parse_filter("(uidNumber<=2000)").expect("filter");
        assert!(matches!(le, Filter::LessOrEqual(_)));
        let approx = parse_filter("(cn~=jensen)").expect("filter");
        assert!(matches!(approx, Filter::ApproxMatch(_)));
    }

    #[test]
    fn test_substrings() {
        let filter = parse_filter("(cn=ab*cd*ef)").expect("filter");
        assert_eq!(
            filter,
            Filter::Substrings(SubstringFilter {
                filter_type: LdapString("cn".to_string()),
                substrings: vec![
                    Substring::Initial(b"ab".to_vec()),
                    Substring::Any(b"cd".to_vec()),
                    Substring::Final(b"ef".to_vec()),
                ],
            })
        );
        let trailing = parse_filter("(cn=ab*)").expect("filter");
        assert_eq!(
            trailing,
            Filter::Substrings(SubstringFilter {
                filter_type: LdapString("cn".to_string()),
                substrings: vec![Substring::Initial(b"ab".to_vec())],
            })
        );
        let leading = parse_filter("(cn=*ab)").expect("filter");
        assert_eq!(
            leading,
            Filter::Substrings(SubstringFilter {
                filter_type: LdapString("cn".to_string()),
                substrings: vec![Substring::Final(b"ab".to_vec())],
            })
        );
    }

    #[test]
    fn test_extensible() {
        let with_rule = parse_filter("(cn:caseExactMatch:=Fred Flintstone)").expect("filter");
        assert_eq!(
            with_rule,
            Filter::ExtensibleMatch(MatchingRuleAssertion {
                matching_rule: Some(LdapString("caseExactMatch".to_string())),
                rule_type: Some(LdapString("cn".to_string())),
                assertion_value: b"Fred Flintstone".to_vec(),
                dn_attributes: false,
            })
        );
        let dn_only = parse_filter("(ou:dn:=Engineering)").expect("filter");
        assert_eq!(
            dn_only,
            Filter::ExtensibleMatch(MatchingRuleAssertion {
                matching_rule: None,
                rule_type: Some(LdapString("ou".to_string())),
                assertion_value: b"Engineering".to_vec(),
                dn_attributes: true,
            })
        );
        let no_type = parse_filter("(:1.2.3:=Wilma)").expect("filter");
        assert_eq!(
            no_type,
            Filter::ExtensibleMatch(MatchingRuleAssertion {
                matching_rule: Some(LdapString("1.2.3".to_string())),
                rule_type: None,
                assertion_value: b"Wilma".to_vec(),
                dn_attributes: false,
            })
        );
    }

    #[test]
    fn test_malformed() {
        assert!(parse_filter("(cn=admin").is_err());
        assert!(parse_filter("(cn=admin))").is_err());
        assert!(parse_filter("(=value)").is_err());
        assert!(parse_filter(r"(cn=\zz)").is_err());
        assert!(parse_filter("(:=x)").is_err());
    }
}
