//! Slotted nonce table with sliding-window replay tracking.
//!
//! Every nonce this daemon hands out is 36 bytes: a 32-byte pseudo-random
//! prefix followed by the nonce's expiry second as a little-endian `u32`.
//! On the wire that is 72 lowercase hex characters. Each nonce lives in one
//! slot of a fixed-size table chosen by a non-cryptographic mixing hash;
//! the slot remembers the highest nonce-count seen plus a 64-bit bitmask of
//! the counts immediately below it, so out-of-order requests inside the
//! window pass while any replay is flagged stale.
//!
//! One mutex guards the table. It is held only for O(1) slot updates; no
//! allocation or hashing happens under it.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::hash::{Algo, DigestCtx};

/// Binary nonce length: 32 random bytes plus a 4-byte timestamp.
pub const NONCE_BIN_LEN: usize = 36;
/// Wire nonce length in hex characters.
pub const NONCE_HEX_LEN: usize = 2 * NONCE_BIN_LEN;

const NONCE_RAND_LEN: usize = 32;
const PLACE_RETRIES: u32 = 3;

/// Replay window width: how far behind the highest seen nc a late request
/// may trail and still be accepted once.
const NC_WINDOW: u32 = 64;

/// Per-chunk mixing constants for the slot-selection hash.
const MIX: [u64; 5] = [
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
    0x2545_f491_4f6c_dd1d,
    0xff51_afd7_ed55_8ccd,
];

/// Result of checking a submitted nonce against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceCheck {
    /// Nonce is live and this nc value was not seen before.
    Ok,
    /// Nonce expired, was overwritten, or the nc value was already used.
    /// The client recovers by answering the next challenge's fresh nonce.
    Stale,
    /// The nonce cannot have been issued by this daemon.
    Wrong,
}

/// Nonce-table mutex was poisoned; surfaced as the `Error` outcome.
#[derive(Debug, thiserror::Error)]
#[error("nonce table mutex poisoned")]
pub struct TablePoisoned;

#[derive(Debug, Clone, Copy)]
struct NonceSlot {
    nonce: [u8; NONCE_BIN_LEN],
    valid_time: u32,
    max_recvd_nc: u32,
    nc_mask: u64,
}

impl NonceSlot {
    const EMPTY: NonceSlot = NonceSlot {
        nonce: [0u8; NONCE_BIN_LEN],
        valid_time: 0,
        max_recvd_nc: 0,
        nc_mask: 0,
    };

    /// Zero-filled slots have never held a nonce.
    fn is_empty(&self) -> bool {
        self.valid_time == 0 && self.nonce == [0u8; NONCE_BIN_LEN]
    }
}

enum Placement {
    Stored,
    /// Identical nonce with identical expiry already present.
    Duplicate,
    /// Identical nonce with a different expiry; the caller retries.
    Conflict,
}

/// Fixed-size table of live nonces owned by the daemon.
#[derive(Debug)]
pub struct NonceStore {
    slots: Mutex<Box<[NonceSlot]>>,
    counter: AtomicU64,
    entropy: Box<[u8]>,
    tmout_s: u32,
    gen_algo: Algo,
}

/// True when `a` is strictly later than `b` on the wrapping 32-bit
/// timestamp circle.
fn ts_newer(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000_0000
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        // Uppercase is rejected: this engine only ever emits lowercase,
        // so an uppercase nonce was not issued here.
        _ => None,
    }
}

/// Strict lowercase-hex decode of a wire nonce.
fn decode_nonce_hex(hex: &[u8]) -> Option<[u8; NONCE_BIN_LEN]> {
    if hex.len() != NONCE_HEX_LEN {
        return None;
    }
    let mut out = [0u8; NONCE_BIN_LEN];
    for (i, pair) in hex.chunks_exact(2).enumerate() {
        out[i] = hex_val(pair[0])? << 4 | hex_val(pair[1])?;
    }
    Some(out)
}

fn nonce_timestamp(nonce: &[u8; NONCE_BIN_LEN]) -> u32 {
    u32::from_le_bytes([nonce[32], nonce[33], nonce[34], nonce[35]])
}

/// Slot-selection hash: 8 bytes at a time, XOR-rotate, one mixing constant
/// per chunk. Distributes load only; carries no security weight.
fn fold_nonce(nonce: &[u8; NONCE_BIN_LEN]) -> u64 {
    let mut acc: u64 = 0;
    for (chunk, k) in nonce.chunks(8).zip(MIX) {
        let mut w = [0u8; 8];
        w[..chunk.len()].copy_from_slice(chunk);
        acc = acc.rotate_left(23) ^ u64::from_le_bytes(w) ^ k;
    }
    acc
}

impl NonceStore {
    pub fn new(slots: usize, tmout_s: u32, entropy: &[u8], gen_algo: Algo) -> Self {
        Self {
            slots: Mutex::new(vec![NonceSlot::EMPTY; slots].into_boxed_slice()),
            counter: AtomicU64::new(0),
            entropy: entropy.into(),
            tmout_s,
            gen_algo,
        }
    }

    pub fn timeout_s(&self) -> u32 {
        self.tmout_s
    }

    /// Issue a fresh nonce.
    ///
    /// Returns the 36 binary nonce bytes and the expiry in monotonic
    /// milliseconds. Placement conflicts are retried with new random
    /// prefixes; if every retry collides the last nonce is handed out
    /// anyway and the eventual validation reports it stale, which makes
    /// the client fetch a fresh one.
    pub fn issue(&self, remote: Option<IpAddr>, now_ms: u64) -> ([u8; NONCE_BIN_LEN], u64) {
        let expiry_ms = now_ms + u64::from(self.tmout_s) * 1000;
        let mut nonce = [0u8; NONCE_BIN_LEN];
        for attempt in 0..PLACE_RETRIES {
            nonce = self.generate(remote, expiry_ms);
            match self.place(&nonce) {
                Placement::Stored | Placement::Duplicate => return (nonce, expiry_ms),
                Placement::Conflict => {
                    tracing::debug!(attempt, "nonce slot conflict, regenerating")
                }
            }
        }
        (nonce, expiry_ms)
    }

    fn generate(&self, remote: Option<IpAddr>, expiry_ms: u64) -> [u8; NONCE_BIN_LEN] {
        let mut nonce = [0u8; NONCE_BIN_LEN];
        let mut ctx = DigestCtx::new(self.gen_algo);
        if ctx.digest_len() >= NONCE_RAND_LEN {
            self.hash_round(&mut ctx, remote, expiry_ms, &mut nonce[..NONCE_RAND_LEN]);
        } else {
            // Short primary digest (MD5-only build): two independent
            // hashings with distinct counter values, concatenated.
            let half = NONCE_RAND_LEN / 2;
            self.hash_round(&mut ctx, remote, expiry_ms, &mut nonce[..half]);
            ctx.reset();
            self.hash_round(&mut ctx, remote, expiry_ms, &mut nonce[half..NONCE_RAND_LEN]);
        }
        let t = (expiry_ms / 1000) as u32;
        nonce[NONCE_RAND_LEN..].copy_from_slice(&t.to_le_bytes());
        nonce
    }

    fn hash_round(
        &self,
        ctx: &mut DigestCtx,
        remote: Option<IpAddr>,
        expiry_ms: u64,
        out: &mut [u8],
    ) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        ctx.update(&self.entropy);
        ctx.update(&counter.to_le_bytes());
        match remote {
            Some(IpAddr::V4(a)) => ctx.update(&a.octets()),
            Some(IpAddr::V6(a)) => ctx.update(&a.octets()),
            None => {}
        }
        ctx.update(&expiry_ms.to_le_bytes());
        let digest = ctx.finish();
        out.copy_from_slice(&digest.as_slice()[..out.len()]);
    }

    fn place(&self, nonce: &[u8; NONCE_BIN_LEN]) -> Placement {
        let t = nonce_timestamp(nonce);
        // Slot data is plain old data updated in straight-line code, so a
        // poisoned lock cannot hold a torn slot; keep issuing.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = (fold_nonce(nonce) % slots.len() as u64) as usize;
        let slot = &mut slots[idx];
        if slot.is_empty() || slot.nonce[..NONCE_RAND_LEN] != nonce[..NONCE_RAND_LEN] {
            *slot = NonceSlot {
                nonce: *nonce,
                valid_time: t,
                max_recvd_nc: 0,
                nc_mask: 0,
            };
            Placement::Stored
        } else if slot.valid_time == t {
            // Same nonce reissued inside the same second.
            Placement::Duplicate
        } else {
            // Random prefix collided with a live nonce of another
            // generation; the caller regenerates.
            Placement::Conflict
        }
    }

    /// Check a wire nonce and its nonce-count against the table.
    ///
    /// `nc` is 0 for the RFC 2069 mode, which carries no count; the nonce
    /// must still be live but no window is tracked for it. `now_s` is the
    /// caller's monotonic second.
    pub fn check(&self, nonce_hex: &[u8], nc: u32, now_s: u32) -> Result<NonceCheck, TablePoisoned> {
        let Some(nonce) = decode_nonce_hex(nonce_hex) else {
            return Ok(NonceCheck::Wrong);
        };
        let t = nonce_timestamp(&nonce);
        let mut slots = self.slots.lock().map_err(|_| TablePoisoned)?;
        let idx = (fold_nonce(&nonce) % slots.len() as u64) as usize;
        let slot = &mut slots[idx];

        if slot.nonce[..NONCE_RAND_LEN] == nonce[..NONCE_RAND_LEN] && slot.valid_time == t {
            if ts_newer(now_s, t) {
                return Ok(NonceCheck::Stale);
            }
            return Ok(Self::track_nc(slot, nc));
        }

        // Slot miss: empty, a different nonce, or the same prefix under a
        // different generation.
        let future_limit = now_s.wrapping_add(self.tmout_s);
        if !slot.is_empty() && ts_newer(t, slot.valid_time) {
            // Issued here, then lost to an overwrite before it was stored.
            Ok(NonceCheck::Stale)
        } else if ts_newer(t, future_limit) {
            // No nonce with an expiry this far out was ever handed out.
            Ok(NonceCheck::Wrong)
        } else {
            Ok(NonceCheck::Stale)
        }
    }

    /// Sliding-window nc bookkeeping for a live nonce.
    ///
    /// `nc_mask` bit `i` records that count `max_recvd_nc - i - 1` was
    /// seen. Advancing the maximum shifts the mask; trailing counts inside
    /// the window are accepted exactly once.
    fn track_nc(slot: &mut NonceSlot, nc: u32) -> NonceCheck {
        if nc == 0 {
            // RFC 2069 mode: no count to track.
            return NonceCheck::Ok;
        }
        if nc > slot.max_recvd_nc {
            let shift = nc - slot.max_recvd_nc;
            slot.nc_mask = if shift > NC_WINDOW {
                0
            } else if shift == NC_WINDOW {
                1u64 << 63
            } else {
                (slot.nc_mask << shift) | (1u64 << (shift - 1))
            };
            slot.max_recvd_nc = nc;
            NonceCheck::Ok
        } else if nc == slot.max_recvd_nc {
            NonceCheck::Stale
        } else {
            let d = slot.max_recvd_nc - nc;
            if d <= NC_WINDOW && slot.nc_mask & (1u64 << (d - 1)) == 0 {
                slot.nc_mask |= 1u64 << (d - 1);
                NonceCheck::Ok
            } else {
                NonceCheck::Stale
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(slots: usize) -> NonceStore {
        NonceStore::new(slots, 300, b"0123456789abcdef0123456789abcdef", Algo::Sha256)
    }

    fn hex(nonce: &[u8; NONCE_BIN_LEN]) -> Vec<u8> {
        hex::encode(nonce).into_bytes()
    }

    #[test]
    fn test_issue_and_check_ok() {
        let s = store(16);
        let (nonce, expiry) = s.issue(None, 0);
        assert_eq!(expiry, 300_000);
        assert_eq!(nonce_timestamp(&nonce), 300);
        assert_eq!(s.check(&hex(&nonce), 1, 0).unwrap(), NonceCheck::Ok);
    }

    #[test]
    fn test_replay_same_nc_is_stale() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let h = hex(&nonce);
        assert_eq!(s.check(&h, 1, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 1, 0).unwrap(), NonceCheck::Stale);
        assert_eq!(s.check(&h, 2, 0).unwrap(), NonceCheck::Ok);
    }

    #[test]
    fn test_out_of_order_within_window() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let h = hex(&nonce);
        assert_eq!(s.check(&h, 5, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 3, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 3, 0).unwrap(), NonceCheck::Stale);
        assert_eq!(s.check(&h, 4, 0).unwrap(), NonceCheck::Ok);
    }

    #[test]
    fn test_beyond_window_is_stale() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let h = hex(&nonce);
        assert_eq!(s.check(&h, 200, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 100, 0).unwrap(), NonceCheck::Stale);
        // Exactly 64 behind is the last value still inside the window.
        assert_eq!(s.check(&h, 136, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 135, 0).unwrap(), NonceCheck::Stale);
    }

    #[test]
    fn test_advance_by_window_keeps_previous_max() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let h = hex(&nonce);
        assert_eq!(s.check(&h, 1, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 65, 0).unwrap(), NonceCheck::Ok);
        // nc=1 sits exactly 64 behind and was recorded by the shift.
        assert_eq!(s.check(&h, 1, 0).unwrap(), NonceCheck::Stale);
        assert_eq!(s.check(&h, 2, 0).unwrap(), NonceCheck::Ok);
    }

    #[test]
    fn test_expired_nonce_is_stale() {
        let s = NonceStore::new(16, 1, b"0123456789abcdef0123456789abcdef", Algo::Sha256);
        let (nonce, _) = s.issue(None, 0);
        // Expiry second is 1; two seconds later the nonce is dead.
        assert_eq!(s.check(&hex(&nonce), 1, 2).unwrap(), NonceCheck::Stale);
    }

    #[test]
    fn test_unknown_nonce_with_future_expiry_is_wrong() {
        let s = store(16);
        let mut fabricated = [0x5au8; NONCE_BIN_LEN];
        // Expiry far beyond anything this store would issue at now=100.
        fabricated[32..].copy_from_slice(&10_000u32.to_le_bytes());
        assert_eq!(
            s.check(&hex(&fabricated), 1, 100).unwrap(),
            NonceCheck::Wrong
        );
    }

    #[test]
    fn test_unknown_nonce_with_plausible_expiry_is_stale() {
        // A client presenting a nonce from before a daemon restart gets
        // stale, so it silently re-authenticates with a fresh nonce.
        let s = store(16);
        let mut fabricated = [0x5au8; NONCE_BIN_LEN];
        fabricated[32..].copy_from_slice(&120u32.to_le_bytes());
        assert_eq!(
            s.check(&hex(&fabricated), 1, 100).unwrap(),
            NonceCheck::Stale
        );
    }

    #[test]
    fn test_uppercase_hex_is_wrong() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let upper = hex::encode_upper(nonce).into_bytes();
        assert_eq!(s.check(&upper, 1, 0).unwrap(), NonceCheck::Wrong);
    }

    #[test]
    fn test_bad_length_is_wrong() {
        let s = store(16);
        assert_eq!(s.check(b"deadbeef", 1, 0).unwrap(), NonceCheck::Wrong);
        assert_eq!(s.check(&[b'a'; 73], 1, 0).unwrap(), NonceCheck::Wrong);
    }

    #[test]
    fn test_single_slot_overwrite_marks_old_nonce_stale() {
        let s = store(1);
        let (first, _) = s.issue(None, 0);
        let (second, _) = s.issue(None, 5_000);
        assert_ne!(first, second);
        // The newer nonce owns the slot; the older one is gone.
        assert_eq!(s.check(&hex(&second), 1, 5).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&hex(&first), 1, 5).unwrap(), NonceCheck::Stale);
    }

    #[test]
    fn test_nonces_are_distinct_per_issue() {
        let s = store(64);
        let (a, _) = s.issue(None, 0);
        let (b, _) = s.issue(None, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_remote_addr_feeds_generation() {
        let s = store(64);
        let (a, _) = s.issue(Some("192.0.2.1".parse().unwrap()), 0);
        let (b, _) = s.issue(Some("192.0.2.2".parse().unwrap()), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rfc2069_mode_skips_window() {
        let s = store(16);
        let (nonce, _) = s.issue(None, 0);
        let h = hex(&nonce);
        assert_eq!(s.check(&h, 0, 0).unwrap(), NonceCheck::Ok);
        assert_eq!(s.check(&h, 0, 0).unwrap(), NonceCheck::Ok);
    }

    #[test]
    fn test_fold_is_deterministic() {
        let n = [0xabu8; NONCE_BIN_LEN];
        assert_eq!(fold_nonce(&n), fold_nonce(&n));
        let mut m = n;
        m[0] ^= 1;
        assert_ne!(fold_nonce(&n), fold_nonce(&m));
    }

    #[test]
    fn test_ts_newer_wraps() {
        assert!(ts_newer(5, 1));
        assert!(!ts_newer(1, 5));
        assert!(!ts_newer(3, 3));
        // Across the 32-bit wrap.
        assert!(ts_newer(2, u32::MAX - 2));
        assert!(!ts_newer(u32::MAX - 2, 2));
    }
}
