//! The daemon context owning the authentication engine's shared state.
//!
//! One [`Daemon`] lives for the whole server: it holds the immutable
//! configuration, the monotonic clock every nonce timestamp is measured
//! against, and the nonce table. All public digest-auth entry points hang
//! off it and are safe to call from any request thread.

use std::net::IpAddr;
use std::time::Instant;

use crate::auth::challenge::{build_challenges, ChallengeSpec};
use crate::auth::noncestore::{NonceStore, NONCE_BIN_LEN};
use crate::auth::params;
use crate::auth::username::{self, DigestUsername};
use crate::auth::validator::{self, Credential};
use crate::auth::{AlgoMask, DigestAuthResult, QopMask};
use crate::base::config::DaemonConfig;
use crate::base::error::ServerError;
use crate::http::request::Request;
use crate::http::response::Response;

#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    store: NonceStore,
    started: Instant,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let gen_algo = config
            .algos
            .strongest()
            .ok_or(ServerError::NoAlgorithmEnabled)?;
        let store = NonceStore::new(
            config.nonces_num,
            config.nonce_tmout,
            &config.entropy,
            gen_algo,
        );
        Ok(Self {
            config,
            store,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Milliseconds since daemon start; the epoch of all nonce timestamps.
    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub(crate) fn enabled_algos(&self) -> AlgoMask {
        self.config.algos
    }

    pub(crate) fn def_max_nc(&self) -> u32 {
        self.config.def_max_nc
    }

    pub(crate) fn nonce_store(&self) -> &NonceStore {
        &self.store
    }

    /// Draw a fresh nonce, optionally bound to the client's address.
    ///
    /// Returns the binary nonce and its expiry in monotonic milliseconds.
    pub fn issue_nonce(&self, remote: Option<IpAddr>) -> ([u8; NONCE_BIN_LEN], u64) {
        self.store.issue(remote, self.now_ms())
    }

    /// Validate Digest credentials against a clear-text password.
    #[allow(clippy::too_many_arguments)]
    pub fn check_password(
        &self,
        request: &Request,
        realm: &str,
        username: &str,
        password: &str,
        max_nc: u32,
        qop_mask: QopMask,
        algo_mask: AlgoMask,
    ) -> DigestAuthResult {
        validator::check(
            self,
            request,
            realm,
            username,
            Credential::Password(password),
            max_nc,
            qop_mask,
            algo_mask,
        )
    }

    /// Validate Digest credentials against a precomputed
    /// `H(username:realm:password)`, see
    /// [`calc_userdigest_hex`](crate::auth::calc_userdigest_hex).
    #[allow(clippy::too_many_arguments)]
    pub fn check_digest(
        &self,
        request: &Request,
        realm: &str,
        username: &str,
        user_digest: &[u8],
        max_nc: u32,
        qop_mask: QopMask,
        algo_mask: AlgoMask,
    ) -> DigestAuthResult {
        validator::check(
            self,
            request,
            realm,
            username,
            Credential::UserDigest(user_digest),
            max_nc,
            qop_mask,
            algo_mask,
        )
    }

    /// Attach one `WWW-Authenticate: Digest` header per offered algorithm
    /// to the response. The nonce is patched in when the response is
    /// prepared for sending.
    #[allow(clippy::too_many_arguments)]
    pub fn add_challenge(
        &self,
        response: &mut Response,
        realm: &str,
        opaque: Option<&str>,
        domain: Option<&str>,
        stale: bool,
        qop_mask: QopMask,
        algo_mask: AlgoMask,
        userhash_support: bool,
        prefer_utf8: bool,
    ) -> Result<(), ServerError> {
        let spec = ChallengeSpec {
            realm,
            opaque,
            domain,
            stale,
            qop_mask,
            algo_mask,
            userhash_support,
            prefer_utf8,
        };
        let headers = build_challenges(&spec, self.enabled_algos())?;
        response.push_challenges(headers);
        Ok(())
    }

    /// Extract the username information from a request without validating
    /// anything, so the application can look up per-user secrets first.
    /// `None` when the header is absent, unparsable, or names no user.
    pub fn digest_auth_username(&self, request: &Request) -> Option<DigestUsername> {
        let payload = request.digest_auth_payload()?;
        let params = params::parse(payload).ok()?;
        username::extract(&params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn daemon() -> Daemon {
        Daemon::new(DaemonConfig::new([3u8; 32])).unwrap()
    }

    #[test]
    fn test_construction_validates_config() {
        let bad = DaemonConfig::new([3u8; 32]).with_nonces_num(0);
        assert_eq!(
            Daemon::new(bad).unwrap_err(),
            ServerError::InvalidNonceTableSize
        );
    }

    #[test]
    fn test_issue_nonce_expiry_tracks_timeout() {
        let d = Daemon::new(DaemonConfig::new([3u8; 32]).with_nonce_tmout(60)).unwrap();
        let now = d.now_ms();
        let (_nonce, expiry) = d.issue_nonce(None);
        assert!(expiry >= now + 60_000);
    }

    #[test]
    fn test_missing_header_outcome() {
        let d = daemon();
        let req = Request::new(Method::GET, "/");
        let out = d.check_password(
            &req,
            "realm",
            "user",
            "pw",
            0,
            QopMask::AUTH,
            AlgoMask::all(),
        );
        assert_eq!(out, DigestAuthResult::HeaderMissing);
    }

    #[test]
    fn test_username_accessor() {
        let d = daemon();
        let req = Request::new(Method::GET, "/")
            .with_authorization(&br#"Digest username="Mufasa", realm="r""#[..]);
        assert_eq!(
            d.digest_auth_username(&req),
            Some(DigestUsername::Standard {
                username: b"Mufasa".to_vec()
            })
        );
        assert_eq!(d.digest_auth_username(&Request::new(Method::GET, "/")), None);
    }

    #[test]
    fn test_add_challenge_attaches_headers() {
        let d = daemon();
        let mut resp = Response::unauthorized();
        d.add_challenge(
            &mut resp,
            "test",
            None,
            None,
            false,
            QopMask::AUTH,
            AlgoMask::all(),
            false,
            false,
        )
        .unwrap();
        assert_eq!(resp.challenges().len(), 3);
    }

    #[test]
    fn test_prepare_for_send_patches_real_nonces() {
        let d = daemon();
        let mut resp = Response::unauthorized();
        d.add_challenge(
            &mut resp,
            "test",
            None,
            None,
            false,
            QopMask::AUTH,
            AlgoMask::SHA256,
            false,
            false,
        )
        .unwrap();
        let bytes = resp.prepare_for_send(&d, None);
        let text = String::from_utf8(bytes).unwrap();
        // The zero placeholder is gone.
        assert!(!text.contains("nonce=\"000000000000"));
        let nonce_hex = text
            .split("nonce=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert_eq!(nonce_hex.len(), crate::auth::NONCE_HEX_LEN);
        assert!(nonce_hex.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
