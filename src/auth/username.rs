//! Username extraction from parsed Digest credentials.
//!
//! RFC 7616 gives a client three ways to name itself: the plain `username`
//! parameter, the same parameter carrying `H(username:realm)` when
//! `userhash=true`, and the RFC 5987 extended `username*` notation for
//! non-ASCII names. The combinations are mutually exclusive; anything
//! ambiguous is invalid rather than guessed at.

use crate::auth::params::{DigestParams, RawValue};

/// Minimum length of an extended value: `UTF-8''` with an empty body.
const EXT_MIN_LEN: usize = 7;

/// Borrowed username classification used by the validator.
#[derive(Debug)]
pub(crate) enum UsernameInfo<'h> {
    /// Clear-text `username`.
    Standard(RawValue<'h>),
    /// `username` carries the hex userhash.
    Userhash(RawValue<'h>),
    /// `username*`, decoded to clear text.
    Extended(String),
    Missing,
    Invalid,
}

/// Owned username record for applications, see
/// [`Daemon::digest_auth_username`](crate::daemon::Daemon::digest_auth_username).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestUsername {
    /// Clear-text username bytes as sent; not guaranteed to be UTF-8.
    Standard { username: Vec<u8> },
    /// Hex userhash, plus its binary form when the hex is well-formed.
    Userhash { hex: String, bin: Option<Vec<u8>> },
    /// Decoded extended (RFC 5987) username.
    Extended { username: String },
}

pub(crate) fn classify<'h>(params: &DigestParams<'h>) -> UsernameInfo<'h> {
    match (&params.username, &params.username_ext) {
        (Some(_), Some(_)) => UsernameInfo::Invalid,
        (None, None) => UsernameInfo::Missing,
        (Some(u), None) => {
            if params.userhash {
                UsernameInfo::Userhash(*u)
            } else {
                UsernameInfo::Standard(*u)
            }
        }
        (None, Some(ext)) => {
            if ext.escaped || params.userhash || ext.bytes.len() < EXT_MIN_LEN {
                return UsernameInfo::Invalid;
            }
            match decode_extended(ext.bytes) {
                Some(s) => UsernameInfo::Extended(s),
                None => UsernameInfo::Invalid,
            }
        }
    }
}

/// Owned variant of [`classify`] for the public accessor.
pub(crate) fn extract(params: &DigestParams<'_>) -> Option<DigestUsername> {
    match classify(params) {
        UsernameInfo::Standard(u) => Some(DigestUsername::Standard {
            username: u.unescaped().collect(),
        }),
        UsernameInfo::Userhash(u) => {
            let hex = String::from_utf8(u.unescaped().collect()).ok()?;
            let bin = hex::decode(&hex).ok();
            Some(DigestUsername::Userhash { hex, bin })
        }
        UsernameInfo::Extended(username) => Some(DigestUsername::Extended { username }),
        UsernameInfo::Missing | UsernameInfo::Invalid => None,
    }
}

/// Decode `UTF-8'<lang-tag>'<pct-encoded>`.
///
/// The charset must be UTF-8, the language tag must be free of whitespace,
/// quotes, commas and semicolons, and every percent triplet in the body
/// must be well-formed.
fn decode_extended(bytes: &[u8]) -> Option<String> {
    let first = bytes.iter().position(|&b| b == b'\'')?;
    let charset = &bytes[..first];
    if !charset.eq_ignore_ascii_case(b"UTF-8") {
        return None;
    }
    let rest = &bytes[first + 1..];
    let second = rest.iter().position(|&b| b == b'\'')?;
    let lang = &rest[..second];
    if lang
        .iter()
        .any(|&b| matches!(b, b' ' | b'\t' | b'"' | b',' | b';'))
    {
        return None;
    }
    let body = &rest[second + 1..];
    let decoded = pct_decode_strict(body)?;
    String::from_utf8(decoded).ok()
}

fn pct_decode_strict(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0usize;
    while i < body.len() {
        if body[i] == b'%' {
            let hi = hex_digit(*body.get(i + 1)?)?;
            let lo = hex_digit(*body.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(body[i]);
            i += 1;
        }
    }
    Some(out)
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
    use crate::auth::params::parse;

    fn classify_header(header: &[u8]) -> UsernameInfo<'_> {
        let params = parse(header).unwrap();
        classify(&params)
    }

    #[test]
    fn test_standard_username() {
        let p = parse(br#"username="Mufasa""#).unwrap();
        match classify(&p) {
            UsernameInfo::Standard(u) => assert!(u.eq_bytes(b"Mufasa")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_userhash_username() {
        let p = parse(br#"username="488869477bf257147b804c45308cd62ac4e25eb717b12b298c79e62dcea254ec", userhash=true"#).unwrap();
        assert!(matches!(classify(&p), UsernameInfo::Userhash(_)));
    }

    #[test]
    fn test_extended_username() {
        // RFC 7616 example: Jäsøn Doe.
        let p = parse(b"username*=UTF-8''J%C3%A4s%C3%B8n%20Doe").unwrap();
        match classify(&p) {
            UsernameInfo::Extended(s) => assert_eq!(s, "J\u{e4}s\u{f8}n Doe"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_both_forms_is_invalid() {
        assert!(matches!(
            classify_header(br#"username="a", username*=UTF-8''b"#),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_neither_form_is_missing() {
        assert!(matches!(
            classify_header(br#"realm="r""#),
            UsernameInfo::Missing
        ));
    }

    #[test]
    fn test_extended_with_userhash_is_invalid() {
        assert!(matches!(
            classify_header(b"username*=UTF-8''abc, userhash=true"),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_extended_wrong_charset_is_invalid() {
        assert!(matches!(
            classify_header(b"username*=ISO-8859-1''abc"),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_extended_bad_triplet_is_invalid() {
        assert!(matches!(
            classify_header(b"username*=UTF-8''bad%zz"),
            UsernameInfo::Invalid
        ));
        assert!(matches!(
            classify_header(b"username*=UTF-8''trunc%4"),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_extended_too_short_is_invalid() {
        assert!(matches!(
            classify_header(b"username*=UTF-8"),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_extended_bad_lang_tag_is_invalid() {
        assert!(matches!(
            classify_header(b"username*=UTF-8'a b'x"),
            UsernameInfo::Invalid
        ));
    }

    #[test]
    fn test_extended_lang_tag_is_ignored() {
        match classify_header(b"username*=UTF-8'en'Jason") {
            UsernameInfo::Extended(s) => assert_eq!(s, "Jason"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extract_userhash_bin() {
        let p = parse(br#"username="00ff", userhash=true"#).unwrap();
        match extract(&p) {
            Some(DigestUsername::Userhash { hex, bin }) => {
                assert_eq!(hex, "00ff");
                assert_eq!(bin, Some(vec![0x00, 0xff]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extract_invalid_is_none() {
        let p = parse(br#"username="a", username*=UTF-8''b"#).unwrap();
        assert!(extract(&p).is_none());
    }
}
