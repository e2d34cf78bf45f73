//! Settlement rules for bets in flight.
//!
//! Every function here mutates a [Round] and must be called while holding
//! whatever lock serializes access to it. A bet is resolved at most once: the
//! first caller to find it `Active` settles it, everyone after sees
//! [RoundError::AlreadyResolved].

use crate::{round::Round, MultiplierClock, RoundError};
use commonware_cryptography::ed25519::PublicKey;
use liftoff_types::{
    api::Payout,
    crash::{BetStatus, Multiplier, Phase, RoundSummary},
};
use std::time::SystemTime;
use tracing::debug;

/// A bet that was cashed out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub round_id: u64,
    pub bet_id: u64,
    pub participant: PublicKey,
    pub stake: u64,
    pub multiplier: Multiplier,
    pub payout: u64,
    /// Settled by the auto cash-out threshold rather than a request
    pub automatic: bool,
}

impl Settlement {
    pub fn as_payout(&self) -> Payout {
        Payout {
            multiplier: self.multiplier,
            payout: self.payout,
        }
    }
}

/// A bet that was still active when the round crashed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loss {
    pub bet_id: u64,
    pub participant: PublicKey,
    pub stake: u64,
}

/// Outcome of advancing a flying round to `now`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Still below the crash point.
    Flying {
        multiplier: Multiplier,
        settled: Vec<Settlement>,
    },
    /// The crash point was reached and the round is finalized.
    Crashed {
        settled: Vec<Settlement>,
        lost: Vec<Loss>,
        summary: RoundSummary,
    },
}

fn settle(
    round: &mut Round,
    participant: &PublicKey,
    multiplier: Multiplier,
    automatic: bool,
) -> Result<Settlement, RoundError> {
    debug_assert!(multiplier < round.crash_point);
    let bet = round
        .bets
        .get_mut(participant)
        .ok_or(RoundError::BetNotFound)?;
    if !bet.is_active() {
        return Err(RoundError::AlreadyResolved);
    }
    let payout = multiplier.payout(bet.stake);
    bet.status = BetStatus::CashedOut(multiplier);
    bet.payout = payout;
    let settlement = Settlement {
        round_id: round.id,
        bet_id: bet.id,
        participant: participant.clone(),
        stake: bet.stake,
        multiplier,
        payout,
        automatic,
    };
    round.total_paid_out = round.total_paid_out.saturating_add(payout);
    Ok(settlement)
}

/// Cash out `participant` at the multiplier reached at `now`.
///
/// A bet whose auto threshold has already been passed settles at the threshold.
/// If the curve has reached the crash point the round is logically over and the
/// request is rejected; the next tick finalizes it.
pub fn cash_out(
    round: &mut Round,
    participant: &PublicKey,
    now: SystemTime,
    clock: &MultiplierClock,
) -> Result<Settlement, RoundError> {
    if round.phase != Phase::Flying {
        return Err(RoundError::InvalidTiming(round.phase));
    }
    let bet = round.bets.get(participant).ok_or(RoundError::BetNotFound)?;
    if !bet.is_active() {
        return Err(RoundError::AlreadyResolved);
    }
    let threshold = bet.auto_cashout;

    let current = round.multiplier(now, clock);
    if let Some(threshold) = threshold {
        if threshold <= current && threshold < round.crash_point {
            return settle(round, participant, threshold, true);
        }
    }
    if current >= round.crash_point {
        return Err(RoundError::InvalidTiming(Phase::Crashed));
    }
    round.observed = round.observed.max(current);
    settle(round, participant, current, false)
}

/// Advance a flying round to `now`: settle every auto cash-out that has been
/// reached and, once the crash point is reached, finalize the round.
pub fn advance(
    round: &mut Round,
    now: SystemTime,
    clock: &MultiplierClock,
) -> Result<Advance, RoundError> {
    if round.phase != Phase::Flying {
        return Err(RoundError::InvalidTiming(round.phase));
    }
    let current = round.multiplier(now, clock);
    let crashed = current >= round.crash_point;
    let reached = current.min(round.crash_point);

    // Auto cash-outs strictly below the crash point win even if the tick that
    // observes them is late.
    let crash_point = round.crash_point;
    let due: Vec<(PublicKey, Multiplier)> = round
        .bets
        .iter()
        .filter(|(_, bet)| bet.is_active())
        .filter_map(|(participant, bet)| {
            bet.auto_cashout
                .filter(|threshold| *threshold <= reached && *threshold < crash_point)
                .map(|threshold| (participant.clone(), threshold))
        })
        .collect();
    let mut settled = Vec::with_capacity(due.len());
    for (participant, threshold) in due {
        settled.push(settle(round, &participant, threshold, true)?);
    }

    if !crashed {
        let multiplier = round.observe(now, clock);
        return Ok(Advance::Flying {
            multiplier,
            settled,
        });
    }

    let mut lost = Vec::new();
    for bet in round.bets.values_mut().filter(|bet| bet.is_active()) {
        bet.status = BetStatus::Crashed;
        bet.payout = 0;
        lost.push(Loss {
            bet_id: bet.id,
            participant: bet.participant.clone(),
            stake: bet.stake,
        });
    }
    round.phase = Phase::Crashed;
    round.crashed_at = Some(now);
    round.observed = round.crash_point;
    debug!(
        round = round.id,
        crash_point = %round.crash_point,
        settled = settled.len(),
        lost = lost.len(),
        "round crashed"
    );
    let summary = round
        .summary()
        .ok_or(RoundError::InvalidTiming(round.phase))?;
    Ok(Advance::Crashed {
        settled,
        lost,
        summary,
    })
}
