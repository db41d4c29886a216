//! Per-connection request state consumed by the authentication engine.
//!
//! The host server's HTTP parser owns the real request lifecycle; the
//! engine only needs the pieces assembled here: the method, the decoded
//! URL path, the parsed GET arguments and the raw `Authorization` header
//! value. The record is built once per request and dropped with it.

use std::net::IpAddr;

use http::Method;
use percent_encoding::percent_decode;

/// One GET argument: name plus optional value, both percent-decoded.
pub type QueryArg = (String, Option<String>);

/// Request data the digest-auth engine reads.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    query_args: Vec<QueryArg>,
    authorization: Option<Vec<u8>>,
    remote_addr: Option<IpAddr>,
}

impl Request {
    /// Build from a method and the request-target as it appeared in the
    /// request line, e.g. `/dir/index.html?x=1`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.find('?') {
            Some(i) => (&target[..i], Some(&target[i + 1..])),
            None => (target, None),
        };
        Self {
            method,
            url: decode_component(path.as_bytes()),
            query_args: query.map_or_else(Vec::new, |q| parse_query_args(q.as_bytes())),
            authorization: None,
            remote_addr: None,
        }
    }

    /// Attach the raw `Authorization` header value.
    pub fn with_authorization(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Percent-decoded URL path.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_args(&self) -> &[QueryArg] {
        &self.query_args
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// The credentials text following the `Digest` scheme, or `None` when
    /// the request carries no Digest authorization at all.
    pub(crate) fn digest_auth_payload(&self) -> Option<&[u8]> {
        let value = self.authorization.as_deref()?;
        let value = trim_ws(value);
        if value.len() < 6 || !value[..6].eq_ignore_ascii_case(b"digest") {
            return None;
        }
        let rest = &value[6..];
        match rest.first() {
            // "DigestX ..." is some other scheme.
            Some(b) if *b != b' ' && *b != b'\t' => None,
            _ => Some(trim_ws(rest)),
        }
    }
}

fn trim_ws(mut b: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = b {
        b = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = b {
        b = rest;
    }
    b
}

/// Split a query string into GET arguments with lenient percent-decoding;
/// malformed escape sequences pass through as literals.
pub(crate) fn parse_query_args(query: &[u8]) -> Vec<QueryArg> {
    query
        .split(|&b| b == b'&')
        .filter(|seg| !seg.is_empty())
        .map(|seg| match seg.iter().position(|&b| b == b'=') {
            Some(i) => (
                decode_component(&seg[..i]),
                Some(decode_component(&seg[i + 1..])),
            ),
            None => (decode_component(seg), None),
        })
        .collect()
}

fn decode_component(bytes: &[u8]) -> String {
    percent_decode(bytes).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_split_and_decode() {
        let req = Request::new(Method::GET, "/a%20dir/index.html?x=1&flag&y=a%26b");
        assert_eq!(req.url(), "/a dir/index.html");
        assert_eq!(
            req.query_args(),
            &[
                ("x".to_string(), Some("1".to_string())),
                ("flag".to_string(), None),
                ("y".to_string(), Some("a&b".to_string())),
            ]
        );
    }

    #[test]
    fn test_plain_target_has_no_args() {
        let req = Request::new(Method::GET, "/index.html");
        assert_eq!(req.url(), "/index.html");
        assert!(req.query_args().is_empty());
    }

    #[test]
    fn test_lenient_decoding_keeps_bad_escapes() {
        let req = Request::new(Method::GET, "/bad%zzpath");
        assert_eq!(req.url(), "/bad%zzpath");
    }

    #[test]
    fn test_digest_payload_extraction() {
        let req = Request::new(Method::GET, "/")
            .with_authorization(&b"Digest realm=\"r\", nonce=\"n\""[..]);
        assert_eq!(
            req.digest_auth_payload().unwrap(),
            b"realm=\"r\", nonce=\"n\""
        );
    }

    #[test]
    fn test_digest_scheme_is_case_insensitive() {
        let req = Request::new(Method::GET, "/").with_authorization(&b"dIgEsT realm=\"r\""[..]);
        assert_eq!(req.digest_auth_payload().unwrap(), b"realm=\"r\"");
    }

    #[test]
    fn test_other_scheme_is_not_digest() {
        let req = Request::new(Method::GET, "/").with_authorization(&b"Basic dXNlcjpwdw=="[..]);
        assert!(req.digest_auth_payload().is_none());
        let req = Request::new(Method::GET, "/").with_authorization(&b"DigestX y"[..]);
        assert!(req.digest_auth_payload().is_none());
    }

    #[test]
    fn test_missing_header() {
        let req = Request::new(Method::GET, "/");
        assert!(req.digest_auth_payload().is_none());
    }

    #[test]
    fn test_bare_scheme_yields_empty_payload() {
        let req = Request::new(Method::GET, "/").with_authorization(&b"Digest"[..]);
        assert_eq!(req.digest_auth_payload().unwrap(), b"");
    }
}
