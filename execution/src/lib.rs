//! Deterministic round logic for liftoff: provably fair crash points, the flight
//! curve, the bet ledger and its settlement rules, and the bounded round history.
//!
//! Nothing in this crate performs I/O or reads a clock; callers pass `now` in and
//! are responsible for serializing mutations of a [Round].

pub mod clock;
pub mod fairness;
pub mod history;
pub mod resolver;
pub mod round;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use clock::MultiplierClock;
pub use fairness::{Commitment, Distribution, Policy};
pub use history::RoundHistory;
pub use resolver::{advance, cash_out, Advance, Loss, Settlement};
pub use round::Round;

use liftoff_types::crash::{Multiplier, Phase};
use thiserror::Error;

/// Reasons a bet or cash-out is rejected by a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("not allowed while round is {0:?}")]
    InvalidTiming(Phase),
    #[error("participant already has a bet in this round")]
    DuplicateBet,
    #[error("bet already resolved")]
    AlreadyResolved,
    #[error("participant has no bet in this round")]
    BetNotFound,
    #[error("stake must be greater than zero")]
    InvalidStake,
    #[error("auto cash-out must exceed 1.00x (got {0})")]
    InvalidAutoCashout(Multiplier),
}
