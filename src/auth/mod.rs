//! HTTP Digest authentication (RFC 7616), server side.
//!
//! The engine validates `Authorization: Digest` credentials and produces
//! `WWW-Authenticate: Digest` challenges:
//! - [`params`]: parser for the hostile request header
//! - [`noncestore`]: slotted nonce table with replay tracking
//! - [`validator`]: ordered credential checks and response recomputation
//! - [`challenge`]: pre-baked challenge headers with a nonce placeholder
//!
//! Entry points live on [`Daemon`](crate::daemon::Daemon):
//! `check_password`, `check_digest`, `add_challenge` and
//! `digest_auth_username`.

pub mod challenge;
pub mod noncestore;
pub mod params;
pub mod username;
pub(crate) mod validator;

use crate::hash::{calc_userdigest, calc_userhash, Algo, DigestCtx};

// Re-exports for convenience
pub use challenge::DigestChallengeHeader;
pub use noncestore::{NonceCheck, NONCE_HEX_LEN};
pub use username::DigestUsername;

bitflags::bitflags! {
    /// Quality-of-protection policy set.
    ///
    /// `NONE` stands for the RFC 2069 mode without a `qop` parameter.
    /// `AUTH_INT` can be named in a mask but never validates; it exists so
    /// policy sets round-trip, not because the engine supports it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QopMask: u8 {
        const NONE = 1 << 0;
        const AUTH = 1 << 1;
        const AUTH_INT = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Digest algorithm policy set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlgoMask: u8 {
        const MD5 = 1 << 0;
        const SHA256 = 1 << 1;
        const SHA512_256 = 1 << 2;
    }
}

impl AlgoMask {
    /// Canonical challenge order: MD5 first, then the SHA family.
    pub const CANONICAL: [Algo; 3] = [Algo::Md5, Algo::Sha256, Algo::Sha512Trunc256];

    pub fn flag_for(algo: Algo) -> AlgoMask {
        match algo {
            Algo::Md5 => AlgoMask::MD5,
            Algo::Sha256 => AlgoMask::SHA256,
            Algo::Sha512Trunc256 => AlgoMask::SHA512_256,
        }
    }

    pub fn contains_algo(self, algo: Algo) -> bool {
        self.contains(Self::flag_for(algo))
    }

    /// Enabled algorithms in canonical order.
    pub fn iter_algos(self) -> impl Iterator<Item = Algo> {
        Self::CANONICAL
            .into_iter()
            .filter(move |a| self.contains_algo(*a))
    }

    /// The strongest enabled algorithm; used for nonce generation.
    pub(crate) fn strongest(self) -> Option<Algo> {
        [Algo::Sha512Trunc256, Algo::Sha256, Algo::Md5]
            .into_iter()
            .find(|a| self.contains_algo(*a))
    }
}

/// Outcome of a digest authentication check.
///
/// Every failing check returns its own reason; the only catch-all is
/// [`Error`](Self::Error), reserved for mutex poisoning and hash-backend
/// faults. The caller maps [`NonceStale`](Self::NonceStale) to a 401 with
/// `stale=true`, any other non-[`Ok`](Self::Ok) value to a plain 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAuthResult {
    /// Credentials are valid; continue processing the request.
    Ok,
    /// No `Authorization: Digest` header on the request.
    HeaderMissing,
    /// The header did not parse, or a required parameter is absent.
    HeaderBroken,
    /// Algorithm outside the policy mask for this check.
    WrongAlgo,
    /// A `-sess` variant, or an algorithm this daemon does not enable.
    UnsupportedAlgo,
    /// QOP outside the policy mask for this check.
    WrongQop,
    /// `auth-int` was requested.
    UnsupportedQop,
    /// Realm mismatch.
    WrongRealm,
    /// Username or userhash mismatch.
    WrongUsername,
    /// Request-URI or GET-argument mismatch.
    WrongUri,
    /// The nonce was never issued by this daemon.
    NonceWrong,
    /// The nonce expired, was overwritten, or its nc was already used.
    NonceStale,
    /// The recomputed response digest differs from the client's.
    ResponseWrong,
    /// A header parameter exceeds the size limit.
    TooLarge,
    /// Mutex failure or hash-backend error.
    Error,
}

impl DigestAuthResult {
    pub fn is_ok(self) -> bool {
        self == DigestAuthResult::Ok
    }

    /// Whether the follow-up challenge should carry `stale=true`.
    pub fn wants_stale_challenge(self) -> bool {
        self == DigestAuthResult::NonceStale
    }
}

/// Hex `H(username:realm:password)` for offline credential storage.
///
/// Applications that refuse to keep clear-text passwords store this value
/// and authenticate through
/// [`Daemon::check_digest`](crate::daemon::Daemon::check_digest).
pub fn calc_userdigest_hex(algo: Algo, username: &str, realm: &str, password: &str) -> String {
    let mut ctx = DigestCtx::new(algo);
    calc_userdigest(
        &mut ctx,
        username.as_bytes(),
        realm.as_bytes(),
        password.as_bytes(),
    )
    .to_hex()
}

/// Hex `H(username:realm)`, the RFC 7616 userhash.
///
/// This is the value a privacy-conscious client sends in place of its
/// username when the challenge advertised `userhash=true`.
pub fn calc_userhash_hex(algo: Algo, username: &str, realm: &str) -> String {
    let mut ctx = DigestCtx::new(algo);
    calc_userhash(&mut ctx, username.as_bytes(), realm.as_bytes()).to_hex()
}
