//! Minimal RFC 8941 ("Structured Field Values for HTTP") Dictionary parser,
//! just capable enough to read the `UCP-Agent` header (§9 Design Notes):
//!
//! ```text
//! UCP-Agent: profile="https://agent.example/profile"
//! ```
//!
//! The header is a Structured-Fields *Dictionary* whose `profile` member
//! must be a quoted string. Implementations must tolerate parameters on
//! that member, escaped quotes/backslashes inside the string, and extra
//! dictionary members (ignored). No existing crate in this codebase's
//! dependency stack implements RFC 8941, so this is a small hand-rolled
//! parser rather than an ambient-stack dependency.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

/// Failure parsing a Structured-Fields Dictionary or extracting the
/// `profile` member from it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HeaderError {
    /// The header value was empty or contained only whitespace.
    #[error("empty structured field value")]
    Empty,
    /// A dictionary key was malformed.
    #[error("invalid dictionary key at byte {0}")]
    InvalidKey(usize),
    /// A bare item (string, token, number, boolean, byte sequence) was
    /// malformed.
    #[error("invalid item at byte {0}")]
    InvalidItem(usize),
    /// A quoted string was never closed.
    #[error("unterminated quoted string")]
    UnterminatedString,
    /// Trailing bytes remained after a complete dictionary was parsed.
    #[error("trailing data at byte {0}")]
    TrailingData(usize),
    /// The dictionary had no `profile` member.
    #[error("missing required 'profile' member")]
    MissingProfile,
    /// The `profile` member was present but not a quoted string.
    #[error("'profile' member is not a string")]
    ProfileNotAString,
}

/// A Structured-Fields bare item (RFC 8941 §3.3), restricted to the types
/// needed to represent a `UCP-Agent` header and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BareItem {
    /// A quoted string, already unescaped.
    String(String),
    /// An unquoted token (e.g. a bare identifier).
    Token(String),
    /// An integer.
    Integer(i64),
    /// A decimal number.
    Decimal(f64),
    /// A boolean (`?0` / `?1`).
    Boolean(bool),
    /// A byte sequence, left base64-encoded (`:...:`- delimited).
    ByteSequence(String),
}

impl fmt::Display for BareItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Token(t) => write!(f, "{t}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Boolean(b) => write!(f, "?{}", u8::from(*b)),
            Self::ByteSequence(b) => write!(f, ":{b}:"),
        }
    }
}

/// A single dictionary member: its value and any parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// The member's value.
    pub value: BareItem,
    /// Parameters attached to the value; order is not significant and is
    /// not preserved.
    pub params: BTreeMap<String, BareItem>,
}

/// A parsed Structured-Fields Dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(BTreeMap<String, Member>);

impl Dictionary {
    /// Look up a member by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Member> {
        self.0.get(key)
    }
}

/// Parse a Structured-Fields Dictionary header value.
///
/// # Errors
///
/// Returns [`HeaderError`] if the value is empty or does not conform to
/// the RFC 8941 Dictionary grammar (restricted to the item types above).
pub fn parse_dictionary(input: &str) -> Result<Dictionary, HeaderError> {
    let mut p = Parser::new(input);
    p.skip_ows();
    if p.eof() {
        return Err(HeaderError::Empty);
    }
    let mut map = BTreeMap::new();
    loop {
        let key = p.parse_key()?;
        p.skip_ows_no_newline();
        let member = if p.peek() == Some(b'=') {
            p.bump();
            p.skip_ows_no_newline();
            p.parse_member_value()?
        } else {
            Member {
                value: BareItem::Boolean(true),
                params: BTreeMap::new(),
            }
        };
        map.insert(key, member);

        p.skip_ows_no_newline();
        if p.peek() == Some(b',') {
            p.bump();
            p.skip_ows();
            if p.eof() {
                return Err(HeaderError::TrailingData(p.pos));
            }
            continue;
        }
        break;
    }
    p.skip_ows();
    if !p.eof() {
        return Err(HeaderError::TrailingData(p.pos));
    }
    Ok(Dictionary(map))
}

/// Parse a `UCP-Agent` header value and return the `profile` member's URL.
///
/// # Errors
///
/// Returns [`HeaderError::MissingProfile`] if no `profile` member is
/// present, [`HeaderError::ProfileNotAString`] if it is present but not a
/// quoted string, or any dictionary-parsing error.
pub fn parse_ucp_agent_profile(header_value: &str) -> Result<String, HeaderError> {
    let dict = parse_dictionary(header_value)?;
    match dict.get("profile") {
        None => Err(HeaderError::MissingProfile),
        Some(Member {
            value: BareItem::String(s),
            ..
        }) => Ok(s.clone()),
        Some(_) => Err(HeaderError::ProfileNotAString),
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    /// Skip optional whitespace (SP / HTAB), including around commas.
    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    /// Same as `skip_ows`; kept as a distinct call site for readability
    /// where newlines are never legal (mid-member).
    fn skip_ows_no_newline(&mut self) {
        self.skip_ows();
    }

    fn parse_key(&mut self) -> Result<String, HeaderError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_lowercase() || b == b'*' => {
                self.pos += 1;
            }
            _ => return Err(HeaderError::InvalidKey(start)),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.' | b'*') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn parse_member_value(&mut self) -> Result<Member, HeaderError> {
        if self.peek() == Some(b'(') {
            // Inner list: consume structurally but collapse to a token
            // summary since the UCP-Agent header never needs one.
            self.skip_inner_list()?;
            let params = self.parse_params()?;
            return Ok(Member {
                value: BareItem::Token("(inner-list)".to_string()),
                params,
            });
        }
        let value = self.parse_bare_item()?;
        let params = self.parse_params()?;
        Ok(Member { value, params })
    }

    fn skip_inner_list(&mut self) -> Result<(), HeaderError> {
        let start = self.pos;
        if self.bump() != Some(b'(') {
            return Err(HeaderError::InvalidItem(start));
        }
        loop {
            self.skip_ows();
            match self.peek() {
                Some(b')') => {
                    self.bump();
                    return Ok(());
                }
                None => return Err(HeaderError::InvalidItem(start)),
                _ => {
                    self.parse_bare_item()?;
                    self.parse_params()?;
                }
            }
        }
    }

    fn parse_params(&mut self) -> Result<BTreeMap<String, BareItem>, HeaderError> {
        let mut params = BTreeMap::new();
        while self.peek() == Some(b';') {
            self.bump();
            self.skip_ows();
            let key = self.parse_key()?;
            let value = if self.peek() == Some(b'=') {
                self.bump();
                self.parse_bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            params.insert(key, value);
        }
        Ok(params)
    }

    fn parse_bare_item(&mut self) -> Result<BareItem, HeaderError> {
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(b':') => self.parse_byte_sequence(),
            Some(b'?') => self.parse_boolean(),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_number(),
            Some(b) if b.is_ascii_alphabetic() || b == b'*' => self.parse_token(),
            _ => Err(HeaderError::InvalidItem(self.pos)),
        }
    }

    fn parse_string(&mut self) -> Result<BareItem, HeaderError> {
        let start = self.pos;
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(HeaderError::UnterminatedString),
                Some(b'"') => return Ok(BareItem::String(out)),
                Some(b'\\') => match self.bump() {
                    Some(b @ b'"') | Some(b @ b'\\') => out.push(b as char),
                    _ => return Err(HeaderError::InvalidItem(start)),
                },
                Some(b) if b < 0x20 || b == 0x7f => return Err(HeaderError::InvalidItem(start)),
                Some(b) => out.push(b as char),
            }
        }
    }

    fn parse_byte_sequence(&mut self) -> Result<BareItem, HeaderError> {
        let start = self.pos;
        self.bump(); // opening colon
        let data_start = self.pos;
        loop {
            match self.bump() {
                None => return Err(HeaderError::InvalidItem(start)),
                Some(b':') => {
                    let s = String::from_utf8_lossy(&self.bytes[data_start..self.pos - 1]).into_owned();
                    return Ok(BareItem::ByteSequence(s));
                }
                Some(_) => {}
            }
        }
    }

    fn parse_boolean(&mut self) -> Result<BareItem, HeaderError> {
        let start = self.pos;
        self.bump(); // '?'
        match self.bump() {
            Some(b'0') => Ok(BareItem::Boolean(false)),
            Some(b'1') => Ok(BareItem::Boolean(true)),
            _ => Err(HeaderError::InvalidItem(start)),
        }
    }

    fn parse_token(&mut self) -> Result<BareItem, HeaderError> {
        let start = self.pos;
        self.bump();
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b':' | b'/' | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~'
                )
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(BareItem::Token(
            String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned(),
        ))
    }

    fn parse_number(&mut self) -> Result<BareItem, HeaderError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let digits_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(HeaderError::InvalidItem(start));
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            let frac_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == frac_start {
                return Err(HeaderError::InvalidItem(start));
            }
            let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("0");
            let v: f64 = text.parse().map_err(|_| HeaderError::InvalidItem(start))?;
            return Ok(BareItem::Decimal(v));
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("0");
        let v: i64 = text.parse().map_err(|_| HeaderError::InvalidItem(start))?;
        Ok(BareItem::Integer(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_profile_member() {
        let url = parse_ucp_agent_profile(r#"profile="https://agent.example/profile""#).unwrap();
        assert_eq!(url, "https://agent.example/profile");
    }

    #[test]
    fn parses_profile_with_extra_members_ignored() {
        let url = parse_ucp_agent_profile(
            r#"profile="https://agent.example/profile", build=42, sandbox"#,
        )
        .unwrap();
        assert_eq!(url, "https://agent.example/profile");
    }

    #[test]
    fn parses_profile_member_with_parameters() {
        let url = parse_ucp_agent_profile(r#"profile="https://agent.example/profile";ver=1"#).unwrap();
        assert_eq!(url, "https://agent.example/profile");
    }

    #[test]
    fn handles_escaped_quote_and_backslash() {
        let url = parse_ucp_agent_profile(r#"profile="https://agent.example/p\"a\\th""#).unwrap();
        assert_eq!(url, r#"https://agent.example/p"a\th"#);
    }

    #[test]
    fn missing_profile_member_is_an_error() {
        let err = parse_ucp_agent_profile("build=42").unwrap_err();
        assert_eq!(err, HeaderError::MissingProfile);
    }

    #[test]
    fn non_string_profile_member_is_an_error() {
        let err = parse_ucp_agent_profile("profile=42").unwrap_err();
        assert_eq!(err, HeaderError::ProfileNotAString);
    }

    #[test]
    fn empty_header_is_an_error() {
        assert_eq!(parse_dictionary("").unwrap_err(), HeaderError::Empty);
        assert_eq!(parse_dictionary("   ").unwrap_err(), HeaderError::Empty);
    }

    #[test]
    fn bare_boolean_member() {
        let dict = parse_dictionary("sandbox").unwrap();
        assert_eq!(dict.get("sandbox").unwrap().value, BareItem::Boolean(true));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = parse_dictionary(r#"profile="https://unterminated"#).unwrap_err();
        assert_eq!(err, HeaderError::UnterminatedString);
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let err = parse_dictionary(r#"profile="a" garbage"#).unwrap_err();
        matches!(err, HeaderError::TrailingData(_));
    }
}
