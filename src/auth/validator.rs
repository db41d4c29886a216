//! Credential validation for Digest authentication.
//!
//! Checks run in a fixed order and the first failure wins, so a caller
//! always gets the most specific reason: policy first, then header
//! structure, then identity, then nonce freshness, and only at the end the
//! expensive response recomputation.

use subtle::ConstantTimeEq;

use crate::auth::noncestore::NonceCheck;
use crate::auth::params::{self, NcValue, ParamsError, ParsedAlgo, ParsedQop, RawValue};
use crate::auth::username::{self, UsernameInfo};
use crate::auth::{calc_userhash_hex, AlgoMask, DigestAuthResult, QopMask};
use crate::daemon::Daemon;
use crate::hash::{calc_userdigest, DigestCtx, MAX_DIGEST_LEN};
use crate::http::request::{parse_query_args, QueryArg, Request};

/// Longest nonce the structural pass lets through to the store.
const MAX_NONCE_LEN: usize = 144;

const SCRATCH_LEN: usize = 128;

/// Secret the application supplied for this check.
pub(crate) enum Credential<'a> {
    Password(&'a str),
    UserDigest(&'a [u8]),
}

/// Unquoting buffer: small in-stack storage with a retained heap fallback
/// grown on demand, freed when the check returns.
struct Scratch {
    inline: [u8; SCRATCH_LEN],
    heap: Vec<u8>,
}

impl Scratch {
    fn new() -> Self {
        Scratch {
            inline: [0u8; SCRATCH_LEN],
            heap: Vec::new(),
        }
    }

    fn unquote(&mut self, v: &RawValue<'_>) -> &[u8] {
        let n = v.unescaped_len();
        if n <= SCRATCH_LEN {
            for (dst, b) in self.inline[..n].iter_mut().zip(v.unescaped()) {
                *dst = b;
            }
            &self.inline[..n]
        } else {
            self.heap.clear();
            self.heap.extend(v.unescaped());
            &self.heap
        }
    }
}

pub(crate) fn check(
    daemon: &Daemon,
    request: &Request,
    realm: &str,
    username: &str,
    credential: Credential<'_>,
    max_nc: u32,
    qop_mask: QopMask,
    algo_mask: AlgoMask,
) -> DigestAuthResult {
    let Some(payload) = request.digest_auth_payload() else {
        return DigestAuthResult::HeaderMissing;
    };
    let params = match params::parse(payload) {
        Ok(p) => p,
        Err(ParamsError::Broken) => return DigestAuthResult::HeaderBroken,
        Err(ParamsError::TooLarge) => return DigestAuthResult::TooLarge,
    };

    // 1. Algorithm policy.
    let algo = match params.algo {
        ParsedAlgo::Invalid => return DigestAuthResult::HeaderBroken,
        a if a.is_session() => return DigestAuthResult::UnsupportedAlgo,
        a => match a.base() {
            Some(algo) => algo,
            None => return DigestAuthResult::HeaderBroken,
        },
    };
    if !daemon.enabled_algos().contains_algo(algo) {
        return DigestAuthResult::UnsupportedAlgo;
    }
    if !algo_mask.contains_algo(algo) {
        return DigestAuthResult::WrongAlgo;
    }

    // 2. QOP policy.
    let qop_flag = match params.qop {
        ParsedQop::Invalid => return DigestAuthResult::HeaderBroken,
        ParsedQop::AuthInt => return DigestAuthResult::UnsupportedQop,
        ParsedQop::Auth => QopMask::AUTH,
        ParsedQop::None => QopMask::NONE,
    };
    if !qop_mask.contains(qop_flag) {
        return DigestAuthResult::WrongQop;
    }

    // 3. Structural presence.
    let uname = username::classify(&params);
    if matches!(uname, UsernameInfo::Missing | UsernameInfo::Invalid) {
        return DigestAuthResult::HeaderBroken;
    }
    let (Some(realm_param), Some(nonce_param), Some(uri_param), Some(response_param)) =
        (&params.realm, &params.nonce, &params.uri, &params.response)
    else {
        return DigestAuthResult::HeaderBroken;
    };
    if realm_param.is_empty()
        || nonce_param.is_empty()
        || uri_param.is_empty()
        || response_param.is_empty()
    {
        return DigestAuthResult::HeaderBroken;
    }
    if params.qop == ParsedQop::Auth {
        let nc_ok = params.nc.as_ref().is_some_and(|v| !v.is_empty());
        let cnonce_ok = params.cnonce.as_ref().is_some_and(|v| !v.is_empty());
        if !nc_ok || !cnonce_ok {
            return DigestAuthResult::HeaderBroken;
        }
    }
    if nonce_param.unescaped_len() > MAX_NONCE_LEN {
        return DigestAuthResult::HeaderBroken;
    }
    if response_param.unescaped_len() > 4 * algo.digest_len() {
        return DigestAuthResult::HeaderBroken;
    }

    // 4. Realm match, quoted-aware.
    if !realm_param.eq_bytes(realm.as_bytes()) {
        return DigestAuthResult::WrongRealm;
    }

    // 5. Username match.
    match &uname {
        UsernameInfo::Standard(u) => {
            if !u.eq_bytes(username.as_bytes()) {
                return DigestAuthResult::WrongUsername;
            }
        }
        UsernameInfo::Extended(decoded) => {
            if decoded != username {
                return DigestAuthResult::WrongUsername;
            }
        }
        UsernameInfo::Userhash(u) => {
            let expected = calc_userhash_hex(algo, username, realm);
            if !u.eq_ignore_ascii_case(expected.as_bytes()) {
                return DigestAuthResult::WrongUsername;
            }
        }
        UsernameInfo::Missing | UsernameInfo::Invalid => {
            return DigestAuthResult::HeaderBroken;
        }
    }

    // 6. nc range.
    let mut nc_num = 0u32;
    if params.qop == ParsedQop::Auth {
        match params::nc_value(params.nc.as_ref()) {
            NcValue::Valid(v) => {
                let limit = if max_nc == 0 {
                    daemon.def_max_nc()
                } else {
                    max_nc
                };
                if v > limit {
                    // Counter exhausted for this nonce; force a fresh one.
                    return DigestAuthResult::NonceStale;
                }
                nc_num = v;
            }
            NcValue::TooLong | NcValue::TooLarge => return DigestAuthResult::NonceStale,
            NcValue::None | NcValue::Broken => return DigestAuthResult::HeaderBroken,
        }
    }

    // 7. Nonce freshness and nc uniqueness.
    let nonce_cow = nonce_param.to_cow();
    let now_s = (daemon.now_ms() / 1000) as u32;
    match daemon.nonce_store().check(&nonce_cow, nc_num, now_s) {
        Ok(NonceCheck::Ok) => {}
        Ok(NonceCheck::Stale) => return DigestAuthResult::NonceStale,
        Ok(NonceCheck::Wrong) => return DigestAuthResult::NonceWrong,
        Err(e) => {
            tracing::error!(error = %e, "nonce table unavailable");
            return DigestAuthResult::Error;
        }
    }

    // 8. URI match against the request line.
    let mut scratch = Scratch::new();
    let uri_bytes = scratch.unquote(uri_param);
    if !uri_matches(uri_bytes, request) {
        return DigestAuthResult::WrongUri;
    }

    // 9. Response recomputation.
    let resp_cow = response_param.to_cow();
    let mut client_response = [0u8; MAX_DIGEST_LEN];
    if !decode_response_hex(&resp_cow, &mut client_response[..algo.digest_len()]) {
        return DigestAuthResult::ResponseWrong;
    }

    let mut ctx = DigestCtx::new(algo);
    let ha1_hex = match credential {
        Credential::Password(password) => {
            let d = calc_userdigest(
                &mut ctx,
                username.as_bytes(),
                realm.as_bytes(),
                password.as_bytes(),
            )
            .to_hex();
            ctx.reset();
            d
        }
        Credential::UserDigest(digest) => {
            if digest.len() != algo.digest_len() {
                return DigestAuthResult::WrongAlgo;
            }
            hex::encode(digest)
        }
    };

    ctx.update(request.method().as_str().as_bytes());
    ctx.update_colon();
    ctx.update(uri_bytes);
    let ha2_hex = ctx.finish().to_hex();
    ctx.reset();

    ctx.update(ha1_hex.as_bytes());
    ctx.update_colon();
    ctx.update(&nonce_cow);
    ctx.update_colon();
    if params.qop == ParsedQop::Auth {
        // Raw client fields enter the hash exactly as received.
        let (Some(nc_param), Some(cnonce_param), Some(qop_param)) =
            (&params.nc, &params.cnonce, &params.qop_raw)
        else {
            return DigestAuthResult::HeaderBroken;
        };
        ctx.update(&nc_param.to_cow());
        ctx.update_colon();
        ctx.update(&cnonce_param.to_cow());
        ctx.update_colon();
        ctx.update(&qop_param.to_cow());
        ctx.update_colon();
    }
    ctx.update(ha2_hex.as_bytes());
    let expected = ctx.finish();
    if ctx.has_error() {
        return DigestAuthResult::Error;
    }

    if bool::from(expected.as_slice().ct_eq(&client_response[..algo.digest_len()])) {
        DigestAuthResult::Ok
    } else {
        tracing::debug!(username, "digest response mismatch");
        DigestAuthResult::ResponseWrong
    }
}

/// Hex decode of the client response; tolerant of case, strict on length.
fn decode_response_hex(hex: &[u8], out: &mut [u8]) -> bool {
    if hex.len() != out.len() * 2 {
        return false;
    }
    for (i, pair) in hex.chunks_exact(2).enumerate() {
        let (Some(hi), Some(lo)) = (hex_digit(pair[0]), hex_digit(pair[1])) else {
            return false;
        };
        out[i] = hi << 4 | lo;
    }
    true
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Compare the `uri` parameter against the request's URL and GET
/// arguments: path by decoded byte equality, arguments by multiset
/// equality over name/value pairs.
fn uri_matches(uri: &[u8], request: &Request) -> bool {
    let (path, query) = match uri.iter().position(|&b| b == b'?') {
        Some(i) => (&uri[..i], Some(&uri[i + 1..])),
        None => (uri, None),
    };
    let decoded: Vec<u8> = percent_encoding::percent_decode(path).collect();
    if String::from_utf8_lossy(&decoded) != request.url() {
        return false;
    }

    let digest_args = match query {
        Some(q) => parse_query_args(q),
        None => Vec::new(),
    };
    args_match(&digest_args, request.query_args())
}

fn args_match(offered: &[QueryArg], expected: &[QueryArg]) -> bool {
    if offered.len() != expected.len() {
        return false;
    }
    let mut used = vec![false; expected.len()];
    'outer: for arg in offered {
        for (i, want) in expected.iter().enumerate() {
            if !used[i] && want == arg {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}
