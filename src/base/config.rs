//! Daemon-level configuration.
//!
//! All values are fixed at daemon construction and immutable afterwards;
//! the engine never re-reads configuration at request time.

use crate::auth::AlgoMask;
use crate::base::error::ServerError;

/// Recommended minimum length of the entropy seed, in bytes.
pub const RECOMMENDED_ENTROPY_LEN: usize = 32;

/// Configuration for a [`Daemon`](crate::daemon::Daemon).
///
/// The defaults mirror what a small embedded deployment wants: a nonce
/// table of 128 slots, five-minute nonce validity and a per-nonce request
/// ceiling of 1000. The entropy seed has no default; nonce unpredictability
/// rests entirely on it, so the application must supply one.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Number of slots in the nonce table. Each slot tracks one live nonce.
    pub nonces_num: usize,
    /// Nonce validity window in seconds.
    pub nonce_tmout: u32,
    /// Ceiling applied to the client's `nc` value when a check passes 0.
    pub def_max_nc: u32,
    /// Seed mixed into every generated nonce.
    pub entropy: Vec<u8>,
    /// Digest algorithms this daemon supports. Requests naming an
    /// algorithm outside this set fail with `UnsupportedAlgo` even when
    /// the per-check policy mask would allow it.
    pub algos: AlgoMask,
}

impl DaemonConfig {
    pub fn new(entropy: impl Into<Vec<u8>>) -> Self {
        Self {
            nonces_num: 128,
            nonce_tmout: 300,
            def_max_nc: 1000,
            entropy: entropy.into(),
            algos: AlgoMask::all(),
        }
    }

    pub fn with_nonces_num(mut self, nonces_num: usize) -> Self {
        self.nonces_num = nonces_num;
        self
    }

    pub fn with_nonce_tmout(mut self, seconds: u32) -> Self {
        self.nonce_tmout = seconds;
        self
    }

    pub fn with_def_max_nc(mut self, def_max_nc: u32) -> Self {
        self.def_max_nc = def_max_nc;
        self
    }

    pub fn with_algos(mut self, algos: AlgoMask) -> Self {
        self.algos = algos;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ServerError> {
        if self.nonces_num < 1 {
            return Err(ServerError::InvalidNonceTableSize);
        }
        if self.nonce_tmout == 0 {
            return Err(ServerError::InvalidNonceTimeout);
        }
        if self.def_max_nc == 0 {
            return Err(ServerError::InvalidMaxNonceCount);
        }
        if self.entropy.is_empty() {
            return Err(ServerError::EmptyEntropy);
        }
        if self.algos.is_empty() {
            return Err(ServerError::NoAlgorithmEnabled);
        }
        if self.entropy.len() < RECOMMENDED_ENTROPY_LEN {
            tracing::warn!(
                len = self.entropy.len(),
                "entropy seed shorter than the recommended {} bytes",
                RECOMMENDED_ENTROPY_LEN
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = DaemonConfig::new([7u8; 32]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.nonces_num, 128);
        assert_eq!(cfg.nonce_tmout, 300);
        assert_eq!(cfg.def_max_nc, 1000);
    }

    #[test]
    fn test_rejects_zero_table() {
        let cfg = DaemonConfig::new([7u8; 32]).with_nonces_num(0);
        assert_eq!(cfg.validate(), Err(ServerError::InvalidNonceTableSize));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let cfg = DaemonConfig::new([7u8; 32]).with_nonce_tmout(0);
        assert_eq!(cfg.validate(), Err(ServerError::InvalidNonceTimeout));
    }

    #[test]
    fn test_rejects_empty_entropy() {
        let cfg = DaemonConfig::new(Vec::new());
        assert_eq!(cfg.validate(), Err(ServerError::EmptyEntropy));
    }

    #[test]
    fn test_rejects_empty_algo_set() {
        let cfg = DaemonConfig::new([7u8; 32]).with_algos(AlgoMask::empty());
        assert_eq!(cfg.validate(), Err(ServerError::NoAlgorithmEnabled));
    }

    #[test]
    fn test_short_entropy_is_accepted() {
        // Warned about, not rejected.
        let cfg = DaemonConfig::new([7u8; 8]);
        assert!(cfg.validate().is_ok());
    }
}
