//! `WWW-Authenticate: Digest` challenge construction.
//!
//! Challenge headers are baked once into an owned byte string with a
//! 72-character run of ASCII zeros where the nonce belongs. The sending
//! layer patches a freshly issued nonce into that run just before the
//! response hits the wire; the replacement is length-preserving so no
//! offset ever shifts. One header is built per offered algorithm, in
//! canonical order.

use bytes::{BufMut, BytesMut};

use crate::auth::noncestore::NONCE_HEX_LEN;
use crate::auth::{AlgoMask, QopMask};
use crate::base::error::ServerError;
use crate::hash::Algo;

/// A pre-baked challenge header owned by a response.
#[derive(Debug, Clone)]
pub struct DigestChallengeHeader {
    bytes: BytesMut,
    nonce_offset: usize,
    algo: Algo,
}

impl DigestChallengeHeader {
    pub fn algo(&self) -> Algo {
        self.algo
    }

    /// Complete header line including the trailing CRLF.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte position of the 72-character nonce placeholder.
    pub fn nonce_offset(&self) -> usize {
        self.nonce_offset
    }

    /// Overwrite the placeholder with a freshly issued wire nonce.
    pub(crate) fn patch_nonce(&mut self, nonce_hex: &[u8]) {
        debug_assert_eq!(nonce_hex.len(), NONCE_HEX_LEN);
        self.bytes[self.nonce_offset..self.nonce_offset + NONCE_HEX_LEN]
            .copy_from_slice(nonce_hex);
    }
}

/// Inputs for one `add_challenge` call.
pub(crate) struct ChallengeSpec<'a> {
    pub realm: &'a str,
    pub opaque: Option<&'a str>,
    pub domain: Option<&'a str>,
    pub stale: bool,
    pub qop_mask: QopMask,
    pub algo_mask: AlgoMask,
    pub userhash_support: bool,
    pub prefer_utf8: bool,
}

pub(crate) fn build_challenges(
    spec: &ChallengeSpec<'_>,
    enabled: AlgoMask,
) -> Result<Vec<DigestChallengeHeader>, ServerError> {
    if spec.realm.is_empty() {
        return Err(ServerError::EmptyRealm);
    }
    if has_crlf(spec.realm) {
        return Err(ServerError::InvalidRealm);
    }
    if spec.opaque.is_some_and(has_crlf) {
        return Err(ServerError::InvalidOpaque);
    }
    if spec
        .domain
        .is_some_and(|d| has_crlf(d) || d.contains('"'))
    {
        return Err(ServerError::InvalidDomain);
    }
    let algos = spec.algo_mask & enabled;
    if algos.is_empty() {
        return Err(ServerError::NoUsableAlgorithm);
    }
    if !spec.qop_mask.intersects(QopMask::NONE | QopMask::AUTH) {
        return Err(ServerError::NoUsableQop);
    }
    // Without qop=auth the challenge degrades to the RFC 2069 form.
    let qop_none = !spec.qop_mask.contains(QopMask::AUTH);

    Ok(algos
        .iter_algos()
        .map(|algo| build_one(spec, algo, qop_none))
        .collect())
}

fn build_one(spec: &ChallengeSpec<'_>, algo: Algo, qop_none: bool) -> DigestChallengeHeader {
    let mut b = BytesMut::with_capacity(160 + spec.realm.len());
    b.put_slice(b"WWW-Authenticate: Digest realm=\"");
    put_quoted(&mut b, spec.realm);
    b.put_u8(b'"');
    if !qop_none {
        b.put_slice(b", qop=\"auth\"");
    }
    // MD5 is the implied default in the RFC 2069 form.
    if !(qop_none && algo == Algo::Md5) {
        b.put_slice(b", algorithm=");
        b.put_slice(algo.token().as_bytes());
    }
    b.put_slice(b", nonce=\"");
    let nonce_offset = b.len();
    b.put_bytes(b'0', NONCE_HEX_LEN);
    b.put_u8(b'"');
    if let Some(opaque) = spec.opaque {
        b.put_slice(b", opaque=\"");
        put_quoted(&mut b, opaque);
        b.put_u8(b'"');
    }
    if let Some(domain) = spec.domain {
        b.put_slice(b", domain=\"");
        b.put_slice(domain.as_bytes());
        b.put_u8(b'"');
    }
    if spec.stale {
        b.put_slice(b", stale=true");
    }
    if spec.prefer_utf8 && !qop_none {
        b.put_slice(b", charset=UTF-8");
    }
    if spec.userhash_support && !qop_none {
        b.put_slice(b", userhash=true");
    }
    b.put_slice(b"\r\n");
    DigestChallengeHeader {
        bytes: b,
        nonce_offset,
        algo,
    }
}

fn put_quoted(b: &mut BytesMut, s: &str) {
    for &c in s.as_bytes() {
        if c == b'"' || c == b'\\' {
            b.put_u8(b'\\');
        }
        b.put_u8(c);
    }
}

fn has_crlf(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}
