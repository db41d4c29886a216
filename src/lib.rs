//! # embedhttp
//!
//! An embeddable HTTP/1.1 server library for Rust.
//!
//! This crate provides the server-side HTTP Digest authentication engine
//! defined by RFC 7616: nonce issuance with anti-replay tracking, parsing
//! of the hostile `Authorization: Digest` request header, cryptographic
//! validation of client responses, and bit-exact construction of
//! `WWW-Authenticate` challenges.
//!
//! ## Features
//!
//! - **Three algorithms**: MD5, SHA-256 and SHA-512-256, selectable per
//!   daemon and per check
//! - **Replay protection**: slotted nonce table with a 64-entry sliding
//!   nonce-count window, safe under concurrent request threads
//! - **Tolerant parsing**: quoted strings, backslash escapes, unknown
//!   parameters, RFC 5987 extended usernames and RFC 7616 userhashes
//! - **Pre-baked challenges**: headers are built once and a fresh nonce is
//!   patched in place at send time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use embedhttp::auth::{AlgoMask, QopMask};
//! use embedhttp::base::config::DaemonConfig;
//! use embedhttp::daemon::Daemon;
//! use embedhttp::http::{Request, Response};
//!
//! let daemon = Daemon::new(DaemonConfig::new(entropy)).unwrap();
//! let outcome = daemon.check_password(
//!     &request, "realm", "user", "password",
//!     0, QopMask::AUTH, AlgoMask::all(),
//! );
//! if !outcome.is_ok() {
//!     let mut resp = Response::unauthorized();
//!     daemon
//!         .add_challenge(
//!             &mut resp, "realm", None, None,
//!             outcome.wants_stale_challenge(),
//!             QopMask::AUTH, AlgoMask::all(), false, true,
//!         )
//!         .unwrap();
//!     let bytes = resp.prepare_for_send(&daemon, request.remote_addr());
//!     // hand `bytes` to the connection's send path
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Configuration and error definitions
//! - [`hash`] - Uniform facade over the digest algorithm backends
//! - [`auth`] - Nonce store, header parser, validator and challenge builder
//! - [`http`] - Request and response collaborator records
//! - [`daemon`] - The context owning shared engine state
//!
//! ## Security
//!
//! Nonces embed their expiry and are bound to the daemon's entropy seed, a
//! monotonic counter and optionally the client address; response digests
//! are compared in constant time; uppercase wire nonces are rejected
//! outright since this engine never emits them.

pub mod auth;
pub mod base;
pub mod daemon;
pub mod hash;
pub mod http;

pub use auth::{AlgoMask, DigestAuthResult, QopMask};
pub use base::config::DaemonConfig;
pub use base::error::ServerError;
pub use daemon::Daemon;
