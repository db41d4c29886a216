//! Digest hash backends.
//!
//! A uniform init / update / finish / reset surface over the algorithms the
//! authentication engine can negotiate. All hashing in the engine goes
//! through [`DigestCtx`]; nothing else touches the backend crates.
//!
//! A context that has been finished must be reset before the next update.
//! Forgetting the reset is a programming error and trips a debug assertion;
//! release builds keep working because the backends reset on finish.

use digest::Digest;
use md5::Md5;
use sha2::{Sha256, Sha512_256};

/// Largest digest size any supported algorithm produces, in bytes.
pub const MAX_DIGEST_LEN: usize = 32;

/// Digest algorithm identifier.
///
/// The set is closed: RFC 7616 names exactly these three non-session
/// algorithms for HTTP Digest authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algo {
    Md5,
    Sha256,
    Sha512Trunc256,
}

impl Algo {
    /// Digest size in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Algo::Md5 => 16,
            Algo::Sha256 => 32,
            Algo::Sha512Trunc256 => 32,
        }
    }

    /// Algorithm token as it appears on the wire.
    pub fn token(self) -> &'static str {
        match self {
            Algo::Md5 => "MD5",
            Algo::Sha256 => "SHA-256",
            Algo::Sha512Trunc256 => "SHA-512-256",
        }
    }
}

/// A computed digest value with its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestValue {
    len: u8,
    bytes: [u8; MAX_DIGEST_LEN],
}

impl DigestValue {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Lowercase hex encoding of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }
}

impl AsRef<[u8]> for DigestValue {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

enum CtxInner {
    Md5(Md5),
    Sha256(Sha256),
    Sha512Trunc256(Sha512_256),
}

/// Hashing context valued over the supported algorithms.
pub struct DigestCtx {
    algo: Algo,
    inner: CtxInner,
    finished: bool,
}

impl DigestCtx {
    pub fn new(algo: Algo) -> Self {
        let inner = match algo {
            Algo::Md5 => CtxInner::Md5(Md5::new()),
            Algo::Sha256 => CtxInner::Sha256(Sha256::new()),
            Algo::Sha512Trunc256 => CtxInner::Sha512Trunc256(Sha512_256::new()),
        };
        Self {
            algo,
            inner,
            finished: false,
        }
    }

    pub fn algo(&self) -> Algo {
        self.algo
    }

    pub fn digest_len(&self) -> usize {
        self.algo.digest_len()
    }

    pub fn update(&mut self, data: &[u8]) {
        debug_assert!(!self.finished, "update on a finished, unreset context");
        match &mut self.inner {
            CtxInner::Md5(h) => h.update(data),
            CtxInner::Sha256(h) => h.update(data),
            CtxInner::Sha512Trunc256(h) => h.update(data),
        }
    }

    /// Feed the single `:` separator used throughout the digest grammar.
    pub fn update_colon(&mut self) {
        self.update(b":");
    }

    /// Produce the digest. The context must be [`reset`](Self::reset)
    /// before it is updated again.
    pub fn finish(&mut self) -> DigestValue {
        debug_assert!(!self.finished, "finish on a finished, unreset context");
        self.finished = true;
        let mut out = DigestValue {
            len: self.digest_len() as u8,
            bytes: [0u8; MAX_DIGEST_LEN],
        };
        match &mut self.inner {
            CtxInner::Md5(h) => out.bytes[..16].copy_from_slice(h.finalize_reset().as_slice()),
            CtxInner::Sha256(h) => out.bytes[..32].copy_from_slice(h.finalize_reset().as_slice()),
            CtxInner::Sha512Trunc256(h) => {
                out.bytes[..32].copy_from_slice(h.finalize_reset().as_slice())
            }
        }
        out
    }

    /// Make the context reusable after [`finish`](Self::finish).
    pub fn reset(&mut self) {
        self.finished = false;
    }

    /// Whether the backend reported a failure. The software backends in
    /// this build cannot fail; accelerated backends may.
    pub fn has_error(&self) -> bool {
        false
    }
}

/// Hash of `user:realm:password`, the `H(A1)` building block.
///
/// Does not reset the context; callers that reuse it must call
/// [`DigestCtx::reset`] first.
pub fn calc_userdigest(
    ctx: &mut DigestCtx,
    username: &[u8],
    realm: &[u8],
    password: &[u8],
) -> DigestValue {
    ctx.update(username);
    ctx.update_colon();
    ctx.update(realm);
    ctx.update_colon();
    ctx.update(password);
    ctx.finish()
}

/// Hash of `user:realm` for the RFC 7616 userhash mechanism.
///
/// Note the absence of a trailing password. Does not reset the context.
pub fn calc_userhash(ctx: &mut DigestCtx, username: &[u8], realm: &[u8]) -> DigestValue {
    ctx.update(username);
    ctx.update_colon();
    ctx.update(realm);
    ctx.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_once(algo: Algo, data: &[u8]) -> String {
        let mut ctx = DigestCtx::new(algo);
        ctx.update(data);
        ctx.finish().to_hex()
    }

    #[test]
    fn test_md5_vector() {
        assert_eq!(
            hash_once(Algo::Md5, b"test"),
            "098f6bcd4621d373cade4e832627b4f6"
        );
    }

    #[test]
    fn test_sha256_vector() {
        assert_eq!(
            hash_once(Algo::Sha256, b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_sha512_256_vector() {
        // SHA-512/256("abc"), FIPS 180-4 example value.
        assert_eq!(
            hash_once(Algo::Sha512Trunc256, b"abc"),
            "53048e2681941ef99b2e29b76b4c7dabe4c2d0c634fc6d46e0e2f13107e7af23"
        );
    }

    #[test]
    fn test_digest_sizes() {
        assert_eq!(Algo::Md5.digest_len(), 16);
        assert_eq!(Algo::Sha256.digest_len(), 32);
        assert_eq!(Algo::Sha512Trunc256.digest_len(), 32);
    }

    #[test]
    fn test_update_colon_equals_literal() {
        let mut a = DigestCtx::new(Algo::Sha256);
        a.update(b"left");
        a.update_colon();
        a.update(b"right");
        assert_eq!(a.finish().to_hex(), hash_once(Algo::Sha256, b"left:right"));
    }

    #[test]
    fn test_reset_allows_reuse() {
        let mut ctx = DigestCtx::new(Algo::Md5);
        ctx.update(b"first");
        let first = ctx.finish();
        ctx.reset();
        ctx.update(b"first");
        assert_eq!(ctx.finish(), first);
    }

    #[test]
    fn test_userdigest_matches_manual_concat() {
        let mut ctx = DigestCtx::new(Algo::Md5);
        let d = calc_userdigest(&mut ctx, b"Mufasa", b"test", b"Circle Of Life");
        assert_eq!(
            d.to_hex(),
            hash_once(Algo::Md5, b"Mufasa:test:Circle Of Life")
        );
    }

    #[test]
    fn test_userhash_has_no_password() {
        let mut ctx = DigestCtx::new(Algo::Sha256);
        let d = calc_userhash(&mut ctx, b"Mufasa", b"test");
        assert_eq!(d.to_hex(), hash_once(Algo::Sha256, b"Mufasa:test"));
    }
}
