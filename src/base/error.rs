use thiserror::Error;

/// Library error type for daemon construction and challenge generation.
///
/// Credential validation does not use this type; every failed check maps to
/// a [`DigestAuthResult`](crate::auth::DigestAuthResult) code instead so the
/// caller can pick the right 401 flavour. `ServerError` is reserved for
/// conditions the application must fix: bad configuration or malformed
/// challenge inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    // Daemon configuration
    #[error("nonce table size must be at least 1")]
    InvalidNonceTableSize,
    #[error("nonce timeout must be positive")]
    InvalidNonceTimeout,
    #[error("default nonce-count ceiling must be positive")]
    InvalidMaxNonceCount,
    #[error("entropy seed is empty")]
    EmptyEntropy,
    #[error("no digest algorithm enabled")]
    NoAlgorithmEnabled,

    // Challenge generation
    #[error("realm is empty")]
    EmptyRealm,
    #[error("realm contains CR or LF")]
    InvalidRealm,
    #[error("opaque value contains CR or LF")]
    InvalidOpaque,
    #[error("domain contains CR, LF or a quote character")]
    InvalidDomain,
    #[error("no requested digest algorithm is enabled on this daemon")]
    NoUsableAlgorithm,
    #[error("challenge needs qop=auth or the RFC 2069 mode enabled")]
    NoUsableQop,
}
