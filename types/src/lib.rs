//! Types shared by the liftoff execution logic, the engine and its callers.

pub mod api;
pub mod crash;

pub use crash::{Bet, BetStatus, Multiplier, Phase, RoundSummary};
