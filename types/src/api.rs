//! Responses returned by the engine to the API layer.

use commonware_cryptography::sha256::Digest;

use crate::crash::{Multiplier, Phase};

/// Published when a round opens for betting. The crash point is not included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundStarted {
    pub round_id: u64,
    pub server_seed_hash: Digest,
    pub client_seed: String,
    pub nonce: u64,
    /// Unix timestamp (milliseconds) after which bets are rejected
    pub betting_deadline_ms: u64,
}

/// Result of a successful cash-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payout {
    pub multiplier: Multiplier,
    pub payout: u64,
}

/// Read-only view of a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundStatus {
    pub round_id: u64,
    pub phase: Phase,
    /// Milliseconds since the flight started (zero before launch)
    pub elapsed_ms: u64,
    /// Present while flying, and equal to the crash point once crashed
    pub current_multiplier: Option<Multiplier>,
    pub total_staked: u64,
    pub total_paid_out: u64,
    /// Crash points of the most recent completed rounds, newest first
    pub recent_crashes: Vec<Multiplier>,
}

/// Everything needed to check a completed round independently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verification {
    pub round_id: u64,
    pub server_seed: String,
    pub server_seed_hash: Digest,
    pub client_seed: String,
    pub nonce: u64,
    pub crash_point: Multiplier,
    pub recomputed_crash_point: Multiplier,
    /// Whether the revealed seed hashes to the published commitment
    pub commitment_valid: bool,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.commitment_valid && self.crash_point == self.recomputed_crash_point
    }
}
