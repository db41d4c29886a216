//! Parser for the `Authorization: Digest …` credential header.
//!
//! The input is hostile: values may be tokens or quoted strings, quoted
//! strings may carry backslash escapes, parameter names are
//! case-insensitive and unknown parameters must be skipped without
//! confusing the quoting state. Recognised values are kept as slices into
//! the original header buffer; unescaping is deferred until a consumer
//! actually needs the semantic bytes.

use std::borrow::Cow;

use crate::hash::Algo;

/// Upper bound for a single quoted parameter value.
pub const MAX_QUOTED_PARAM_LEN: usize = 64 * 1024;

/// Parse failure for the credentials header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsError {
    /// Syntax the grammar cannot digest.
    Broken,
    /// A quoted value above [`MAX_QUOTED_PARAM_LEN`].
    TooLarge,
}

/// A parameter value as it appeared on the wire.
///
/// `escaped` is set only when the quoted string contained backslash
/// escapes; a value that was merely surrounded by quotes keeps it false
/// and its bytes are already the semantic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawValue<'h> {
    pub bytes: &'h [u8],
    pub escaped: bool,
}

/// Iterator over the semantic bytes of a [`RawValue`], with backslash
/// escapes collapsed.
pub struct Unescaped<'h> {
    rest: &'h [u8],
}

impl Iterator for Unescaped<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        match self.rest {
            [] => None,
            [b'\\', x, rest @ ..] => {
                self.rest = rest;
                Some(*x)
            }
            [x, rest @ ..] => {
                self.rest = rest;
                Some(*x)
            }
        }
    }
}

impl<'h> RawValue<'h> {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn unescaped(&self) -> Unescaped<'h> {
        Unescaped { rest: self.bytes }
    }

    pub fn unescaped_len(&self) -> usize {
        if self.escaped {
            self.unescaped().count()
        } else {
            self.bytes.len()
        }
    }

    /// Semantic bytes, borrowing when no escapes are present.
    pub fn to_cow(&self) -> Cow<'h, [u8]> {
        if self.escaped {
            Cow::Owned(self.unescaped().collect())
        } else {
            Cow::Borrowed(self.bytes)
        }
    }

    /// Escape-aware byte equality without allocating.
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        if !self.escaped {
            return self.bytes == other;
        }
        self.unescaped().eq(other.iter().copied())
    }

    /// Escape-aware ASCII-case-insensitive equality.
    pub fn eq_ignore_ascii_case(&self, other: &[u8]) -> bool {
        if !self.escaped && self.bytes.len() != other.len() {
            return false;
        }
        self.unescaped()
            .map(|b| b.to_ascii_lowercase())
            .eq(other.iter().map(|b| b.to_ascii_lowercase()))
    }
}

/// `algorithm` parameter after token decoding.
///
/// The `-sess` variants are recognised so they can be rejected with a
/// precise reason instead of a parse error. Quoted and unquoted tokens go
/// through the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsedAlgo {
    #[default]
    Md5,
    Sha256,
    Sha512Trunc256,
    Md5Sess,
    Sha256Sess,
    Sha512Trunc256Sess,
    Invalid,
}

impl ParsedAlgo {
    /// The non-session algorithm, if this token names one.
    pub fn base(self) -> Option<Algo> {
        match self {
            ParsedAlgo::Md5 => Some(Algo::Md5),
            ParsedAlgo::Sha256 => Some(Algo::Sha256),
            ParsedAlgo::Sha512Trunc256 => Some(Algo::Sha512Trunc256),
            _ => None,
        }
    }

    pub fn is_session(self) -> bool {
        matches!(
            self,
            ParsedAlgo::Md5Sess | ParsedAlgo::Sha256Sess | ParsedAlgo::Sha512Trunc256Sess
        )
    }
}

/// `qop` parameter after token decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsedQop {
    /// Parameter absent: the RFC 2069 construction.
    #[default]
    None,
    Auth,
    AuthInt,
    Invalid,
}

/// `nc` parameter after hex decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcValue {
    /// Parameter absent.
    None,
    Valid(u32),
    /// More hex digits than any supported counter width.
    TooLong,
    /// Does not fit in 32 bits.
    TooLarge,
    /// Not hex, empty, or zero.
    Broken,
}

/// Typed record of the recognised Digest parameters.
///
/// Raw fields borrow the header buffer and live as long as the request.
/// `algo`, `qop` and `userhash` are decoded eagerly because every consumer
/// needs them.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DigestParams<'h> {
    pub nonce: Option<RawValue<'h>>,
    pub opaque: Option<RawValue<'h>>,
    pub algorithm: Option<RawValue<'h>>,
    pub response: Option<RawValue<'h>>,
    pub username: Option<RawValue<'h>>,
    pub username_ext: Option<RawValue<'h>>,
    pub realm: Option<RawValue<'h>>,
    pub uri: Option<RawValue<'h>>,
    pub qop_raw: Option<RawValue<'h>>,
    pub cnonce: Option<RawValue<'h>>,
    pub nc: Option<RawValue<'h>>,
    pub userhash_raw: Option<RawValue<'h>>,
    /// Decoded `userhash=true` flag.
    pub userhash: bool,
    /// Decoded algorithm; MD5 when the parameter is absent.
    pub algo: ParsedAlgo,
    /// Decoded quality of protection.
    pub qop: ParsedQop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Nonce,
    Opaque,
    Algorithm,
    Response,
    Username,
    UsernameExt,
    Realm,
    Uri,
    Qop,
    Cnonce,
    Nc,
    Userhash,
}

const KEYS: &[(&[u8], Key)] = &[
    (b"nonce", Key::Nonce),
    (b"opaque", Key::Opaque),
    (b"algorithm", Key::Algorithm),
    (b"response", Key::Response),
    (b"username", Key::Username),
    (b"username*", Key::UsernameExt),
    (b"realm", Key::Realm),
    (b"uri", Key::Uri),
    (b"qop", Key::Qop),
    (b"cnonce", Key::Cnonce),
    (b"nc", Key::Nc),
    (b"userhash", Key::Userhash),
];

fn lookup_key(name: &[u8]) -> Option<Key> {
    KEYS.iter()
        .find(|(n, _)| name.eq_ignore_ascii_case(n))
        .map(|(_, k)| *k)
}

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Parse the text following the `Digest ` scheme prefix.
pub fn parse(header: &[u8]) -> Result<DigestParams<'_>, ParamsError> {
    let mut params = DigestParams::default();
    let len = header.len();
    let mut pos = 0usize;

    while pos < len {
        while pos < len && is_ws(header[pos]) {
            pos += 1;
        }
        if pos >= len {
            break;
        }
        // An empty list element is tolerated, a bare '=' is not.
        if header[pos] == b',' {
            pos += 1;
            continue;
        }
        if header[pos] == b'=' {
            return Err(ParamsError::Broken);
        }

        let name_start = pos;
        while pos < len && !matches!(header[pos], b'=' | b' ' | b'\t' | b',' | b';') {
            pos += 1;
        }
        let name = &header[name_start..pos];

        let Some(key) = lookup_key(name) else {
            skip_unknown(header, &mut pos);
            continue;
        };

        while pos < len && is_ws(header[pos]) {
            pos += 1;
        }
        if pos >= len || header[pos] != b'=' {
            return Err(ParamsError::Broken);
        }
        pos += 1;
        while pos < len && is_ws(header[pos]) {
            pos += 1;
        }

        let value = if pos < len && header[pos] == b'"' {
            read_quoted(header, &mut pos)?
        } else {
            read_token(header, &mut pos)?
        };

        while pos < len && is_ws(header[pos]) {
            pos += 1;
        }
        if pos < len {
            if header[pos] != b',' {
                return Err(ParamsError::Broken);
            }
            pos += 1;
        }

        params.set(key, value);
    }

    params.userhash = params
        .userhash_raw
        .as_ref()
        .is_some_and(|v| v.eq_ignore_ascii_case(b"true"));
    params.algo = match &params.algorithm {
        None => ParsedAlgo::Md5,
        Some(v) => decode_algo(v),
    };
    params.qop = match &params.qop_raw {
        None => ParsedQop::None,
        Some(v) => decode_qop(v),
    };
    Ok(params)
}

fn read_quoted<'h>(header: &'h [u8], pos: &mut usize) -> Result<RawValue<'h>, ParamsError> {
    *pos += 1;
    let start = *pos;
    let mut escaped = false;
    loop {
        if *pos >= header.len() {
            // Unterminated quoted string.
            return Err(ParamsError::Broken);
        }
        match header[*pos] {
            0 => return Err(ParamsError::Broken),
            b'"' => break,
            b'\\' => {
                if *pos + 1 >= header.len() || header[*pos + 1] == 0 {
                    return Err(ParamsError::Broken);
                }
                escaped = true;
                *pos += 2;
            }
            _ => *pos += 1,
        }
    }
    let bytes = &header[start..*pos];
    *pos += 1;
    if bytes.len() > MAX_QUOTED_PARAM_LEN {
        return Err(ParamsError::TooLarge);
    }
    Ok(RawValue { bytes, escaped })
}

fn read_token<'h>(header: &'h [u8], pos: &mut usize) -> Result<RawValue<'h>, ParamsError> {
    let start = *pos;
    while *pos < header.len() {
        match header[*pos] {
            b',' | b' ' | b'\t' => break,
            b';' | 0 => return Err(ParamsError::Broken),
            _ => *pos += 1,
        }
    }
    Ok(RawValue {
        bytes: &header[start..*pos],
        escaped: false,
    })
}

/// Skip an unrecognised parameter up to the next top-level comma,
/// honouring quoting so a comma inside a quoted value does not split it.
fn skip_unknown(header: &[u8], pos: &mut usize) {
    let mut in_quotes = false;
    while *pos < header.len() {
        match header[*pos] {
            b'"' => {
                in_quotes = !in_quotes;
                *pos += 1;
            }
            b'\\' if in_quotes => {
                *pos += if *pos + 1 < header.len() { 2 } else { 1 };
            }
            b',' if !in_quotes => {
                *pos += 1;
                return;
            }
            _ => *pos += 1,
        }
    }
}

fn decode_algo(v: &RawValue<'_>) -> ParsedAlgo {
    const TOKENS: &[(&[u8], ParsedAlgo)] = &[
        (b"MD5", ParsedAlgo::Md5),
        (b"SHA-256", ParsedAlgo::Sha256),
        (b"SHA-512-256", ParsedAlgo::Sha512Trunc256),
        (b"MD5-sess", ParsedAlgo::Md5Sess),
        (b"SHA-256-sess", ParsedAlgo::Sha256Sess),
        (b"SHA-512-256-sess", ParsedAlgo::Sha512Trunc256Sess),
    ];
    TOKENS
        .iter()
        .find(|(t, _)| v.eq_ignore_ascii_case(t))
        .map(|(_, a)| *a)
        .unwrap_or(ParsedAlgo::Invalid)
}

fn decode_qop(v: &RawValue<'_>) -> ParsedQop {
    if v.eq_ignore_ascii_case(b"auth") {
        ParsedQop::Auth
    } else if v.eq_ignore_ascii_case(b"auth-int") {
        ParsedQop::AuthInt
    } else {
        ParsedQop::Invalid
    }
}

/// Decode the `nc` parameter: full-width hex, 32 bits, non-zero.
pub fn nc_value(v: Option<&RawValue<'_>>) -> NcValue {
    let Some(v) = v else {
        return NcValue::None;
    };
    let mut n: u64 = 0;
    let mut digits = 0usize;
    for b in v.unescaped() {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return NcValue::Broken,
        };
        digits += 1;
        if digits > 16 {
            return NcValue::TooLong;
        }
        n = n << 4 | u64::from(d);
    }
    if digits == 0 || n == 0 {
        return NcValue::Broken;
    }
    if n > u64::from(u32::MAX) {
        return NcValue::TooLarge;
    }
    NcValue::Valid(n as u32)
}

impl<'h> DigestParams<'h> {
    fn set(&mut self, key: Key, value: RawValue<'h>) {
        let slot = match key {
            Key::Nonce => &mut self.nonce,
            Key::Opaque => &mut self.opaque,
            Key::Algorithm => &mut self.algorithm,
            Key::Response => &mut self.response,
            Key::Username => &mut self.username,
            Key::UsernameExt => &mut self.username_ext,
            Key::Realm => &mut self.realm,
            Key::Uri => &mut self.uri,
            Key::Qop => &mut self.qop_raw,
            Key::Cnonce => &mut self.cnonce,
            Key::Nc => &mut self.nc,
            Key::Userhash => &mut self.userhash_raw,
        };
        *slot = Some(value);
    }
}
