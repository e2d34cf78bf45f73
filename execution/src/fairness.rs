//! Commit-reveal fairness for crash points.
//!
//! Before betting opens only `SHA256(server_seed)` is published. The crash point is a
//! pure function of `(server_seed, client_seed, nonce)` and the [Policy], so anyone
//! holding the revealed seed can recompute it after the round crashes.

use commonware_cryptography::{sha256::Digest, Hasher, Sha256};
use commonware_utils::hex;
use liftoff_types::crash::{
    Multiplier, CLIENT_SEED_BYTES, DEFAULT_HOUSE_EDGE, MAX_CRASH_POINT, SERVER_SEED_BYTES,
};
use rand::{CryptoRng, Rng};

/// 2^32, the range of the 32-bit sample drawn from the round hash.
const SAMPLE_RANGE: f64 = 4_294_967_296.0;

/// How the uniform sample is mapped to a crash point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Distribution {
    /// `1 / (u * (1 - edge))`, the published formula.
    #[default]
    Inverse,
    /// `(1 - edge) / (1 - u)`, which retains exactly `edge` for any cash-out target.
    Edge,
}

/// Parameters that, together with the seeds, fully determine a crash point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Policy {
    pub house_edge: f64,
    pub cap: Multiplier,
    pub distribution: Distribution,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            house_edge: DEFAULT_HOUSE_EDGE,
            cap: MAX_CRASH_POINT,
            distribution: Distribution::Inverse,
        }
    }
}

/// Seeds fixed for a round before any bet is accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    pub server_seed: String,
    pub server_seed_hash: Digest,
    pub client_seed: String,
    pub nonce: u64,
}

impl Commitment {
    /// Draw a fresh server seed (and a client seed, if none was supplied).
    pub fn generate<R: Rng + CryptoRng>(
        rng: &mut R,
        nonce: u64,
        client_seed: Option<String>,
    ) -> Self {
        let mut server = [0u8; SERVER_SEED_BYTES];
        rng.fill_bytes(&mut server);
        let server_seed = hex(&server);
        let client_seed = client_seed.unwrap_or_else(|| {
            let mut client = [0u8; CLIENT_SEED_BYTES];
            rng.fill_bytes(&mut client);
            hex(&client)
        });
        Self {
            server_seed_hash: hash_seed(&server_seed),
            server_seed,
            client_seed,
            nonce,
        }
    }

    pub fn crash_point(&self, policy: &Policy) -> Multiplier {
        compute_crash_point(&self.server_seed, &self.client_seed, self.nonce, policy)
    }

    pub fn matches(&self, server_seed_hash: &Digest) -> bool {
        matches_commitment(&self.server_seed, server_seed_hash)
    }
}

/// Commitment published for a server seed.
pub fn hash_seed(server_seed: &str) -> Digest {
    Sha256::hash(server_seed.as_bytes())
}

/// Whether a revealed seed matches the commitment published before the round.
pub fn matches_commitment(server_seed: &str, server_seed_hash: &Digest) -> bool {
    hash_seed(server_seed) == *server_seed_hash
}

/// Uniform sample in `[0, 1)` from the first 32 bits of
/// `SHA256(server_seed ":" client_seed ":" nonce)`.
pub fn uniform(server_seed: &str, client_seed: &str, nonce: u64) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hasher.update(b":");
    hasher.update(client_seed.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_string().as_bytes());
    let digest = hasher.finalize();
    let bytes: &[u8] = digest.as_ref();
    let bits = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    bits as f64 / SAMPLE_RANGE
}

/// Crash point for the given seeds, rounded to two decimal places and clamped
/// to `[1.00x, cap]`.
pub fn compute_crash_point(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    policy: &Policy,
) -> Multiplier {
    let u = uniform(server_seed, client_seed, nonce);
    let raw = match policy.distribution {
        Distribution::Inverse => {
            let adjusted = u * (1.0 - policy.house_edge);
            if adjusted <= 0.0 {
                f64::INFINITY
            } else {
                1.0 / adjusted
            }
        }
        Distribution::Edge => (1.0 - policy.house_edge) / (1.0 - u),
    };
    Multiplier::round(raw.max(1.0))
        .min(policy.cap)
        .max(Multiplier::ONE)
}

/// Recompute the crash point and compare it with a claimed value.
pub fn verify(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    claimed: Multiplier,
    policy: &Policy,
) -> bool {
    compute_crash_point(server_seed, client_seed, nonce, policy) == claimed
}
