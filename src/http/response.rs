//! Response object carrying pre-baked authentication challenges.
//!
//! Challenge headers attached by
//! [`Daemon::add_challenge`](crate::daemon::Daemon::add_challenge) keep a
//! placeholder where the nonce belongs; [`Response::prepare_for_send`] is
//! the sending-layer hook that patches fresh nonces in and renders the
//! header block. Nonce placement failures never block the send: the worst
//! case is a client retry against a `stale=true` follow-up.

use std::net::IpAddr;

use http::StatusCode;

use crate::auth::challenge::DigestChallengeHeader;
use crate::daemon::Daemon;

/// HTTP response under construction.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    challenges: Vec<DigestChallengeHeader>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            challenges: Vec::new(),
        }
    }

    /// The usual carrier for a digest challenge.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Challenge headers in insertion order.
    pub fn challenges(&self) -> &[DigestChallengeHeader] {
        &self.challenges
    }

    pub(crate) fn push_challenges(&mut self, headers: Vec<DigestChallengeHeader>) {
        self.challenges.extend(headers);
    }

    /// Patch a fresh nonce into every pending challenge and render the
    /// complete header block, terminating blank line included.
    pub fn prepare_for_send(&mut self, daemon: &Daemon, remote: Option<IpAddr>) -> Vec<u8> {
        for challenge in &mut self.challenges {
            let (nonce, _expiry) = daemon.issue_nonce(remote);
            challenge.patch_nonce(hex::encode(nonce).as_bytes());
        }

        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(b"HTTP/1.1 ");
        out.extend_from_slice(self.status.as_str().as_bytes());
        if let Some(reason) = self.status.canonical_reason() {
            out.push(b' ');
            out.extend_from_slice(reason.as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        for challenge in &self.challenges {
            out.extend_from_slice(challenge.as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}
