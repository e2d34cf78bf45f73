use crate::{
    fairness::{Commitment, Policy},
    MultiplierClock, RoundError,
};
use commonware_cryptography::ed25519::PublicKey;
use liftoff_types::{
    api::{RoundStarted, RoundStatus},
    crash::{Bet, Multiplier, Phase, RoundSummary},
};
use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Milliseconds since the Unix epoch (zero for times before it).
pub fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// A single round and its bet ledger.
///
/// The crash point is fixed when the round is opened and is only exposed
/// through [Round::summary] once the round has crashed.
#[derive(Clone, Debug)]
pub struct Round {
    pub(crate) id: u64,
    pub(crate) commitment: Commitment,
    pub(crate) crash_point: Multiplier,
    pub(crate) phase: Phase,
    pub(crate) betting_deadline: SystemTime,
    pub(crate) flight_start: Option<SystemTime>,
    pub(crate) crashed_at: Option<SystemTime>,
    pub(crate) bets: BTreeMap<PublicKey, Bet>,
    pub(crate) total_staked: u64,
    pub(crate) total_paid_out: u64,
    pub(crate) observed: Multiplier,
}

impl Round {
    /// Open a round for betting until `now + window`.
    pub fn open(
        id: u64,
        commitment: Commitment,
        policy: &Policy,
        now: SystemTime,
        window: Duration,
    ) -> Self {
        let crash_point = commitment.crash_point(policy);
        Self::build(id, commitment, crash_point, now, window)
    }

    /// Open a round with an explicit crash point, bypassing the seeds.
    #[cfg(any(test, feature = "mocks"))]
    pub fn with_crash_point(
        id: u64,
        commitment: Commitment,
        crash_point: Multiplier,
        now: SystemTime,
        window: Duration,
    ) -> Self {
        Self::build(id, commitment, crash_point, now, window)
    }

    fn build(
        id: u64,
        commitment: Commitment,
        crash_point: Multiplier,
        now: SystemTime,
        window: Duration,
    ) -> Self {
        Self {
            id,
            commitment,
            crash_point,
            phase: Phase::Betting,
            betting_deadline: now + window,
            flight_start: None,
            crashed_at: None,
            bets: BTreeMap::new(),
            total_staked: 0,
            total_paid_out: 0,
            observed: Multiplier::ONE,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn nonce(&self) -> u64 {
        self.commitment.nonce
    }

    pub fn betting_deadline(&self) -> SystemTime {
        self.betting_deadline
    }

    pub fn flight_start(&self) -> Option<SystemTime> {
        self.flight_start
    }

    pub fn total_staked(&self) -> u64 {
        self.total_staked
    }

    pub fn total_paid_out(&self) -> u64 {
        self.total_paid_out
    }

    pub fn bet(&self, participant: &PublicKey) -> Option<&Bet> {
        self.bets.get(participant)
    }

    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    pub fn bet_count(&self) -> usize {
        self.bets.len()
    }

    /// Crash point, only once it has been revealed.
    pub fn revealed_crash_point(&self) -> Option<Multiplier> {
        (self.phase == Phase::Crashed).then_some(self.crash_point)
    }

    /// Crash point regardless of phase. Test-only: this is the round's secret.
    #[cfg(any(test, feature = "mocks"))]
    pub fn crash_point(&self) -> Multiplier {
        self.crash_point
    }

    /// What is published when the round opens.
    pub fn started(&self) -> RoundStarted {
        RoundStarted {
            round_id: self.id,
            server_seed_hash: self.commitment.server_seed_hash,
            client_seed: self.commitment.client_seed.clone(),
            nonce: self.commitment.nonce,
            betting_deadline_ms: unix_ms(self.betting_deadline),
        }
    }

    /// Whether a bet could be accepted at `now` (before any funds move).
    pub fn check_bet(
        &self,
        participant: &PublicKey,
        stake: u64,
        auto_cashout: Option<Multiplier>,
        now: SystemTime,
    ) -> Result<(), RoundError> {
        if stake == 0 {
            return Err(RoundError::InvalidStake);
        }
        if let Some(threshold) = auto_cashout {
            if threshold <= Multiplier::ONE {
                return Err(RoundError::InvalidAutoCashout(threshold));
            }
        }
        if !self.accepting_bets(now) {
            return Err(RoundError::InvalidTiming(self.phase));
        }
        if self.bets.contains_key(participant) {
            return Err(RoundError::DuplicateBet);
        }
        Ok(())
    }

    /// Record a bet whose stake has already been collected.
    pub fn place_bet(
        &mut self,
        id: u64,
        participant: PublicKey,
        stake: u64,
        auto_cashout: Option<Multiplier>,
        now: SystemTime,
    ) -> Result<&Bet, RoundError> {
        self.check_bet(&participant, stake, auto_cashout, now)?;
        self.total_staked = self.total_staked.saturating_add(stake);
        let bet = Bet::new(id, participant.clone(), stake, auto_cashout);
        Ok(self.bets.entry(participant).or_insert(bet))
    }

    pub fn accepting_bets(&self, now: SystemTime) -> bool {
        self.phase == Phase::Betting && now < self.betting_deadline
    }

    /// Whether the betting window is over and the round should launch (or be skipped).
    pub fn betting_closed(&self, now: SystemTime) -> bool {
        self.phase == Phase::Betting && now >= self.betting_deadline
    }

    /// Start the flight at `now`.
    pub fn launch(&mut self, now: SystemTime) -> Result<(), RoundError> {
        if self.phase != Phase::Betting {
            return Err(RoundError::InvalidTiming(self.phase));
        }
        self.phase = Phase::Flying;
        self.flight_start = Some(now);
        Ok(())
    }

    /// Time spent in flight (frozen at the crash).
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        let Some(start) = self.flight_start else {
            return Duration::ZERO;
        };
        let end = self.crashed_at.unwrap_or(now);
        end.duration_since(start).unwrap_or_default()
    }

    /// Multiplier on the curve at `now`, ignoring the crash point.
    pub fn multiplier(&self, now: SystemTime, clock: &MultiplierClock) -> Multiplier {
        clock.multiplier_at(self.elapsed(now))
    }

    /// Sample the curve and remember the highest value reported, so reads never
    /// go backwards even if `now` does.
    pub(crate) fn observe(&mut self, now: SystemTime, clock: &MultiplierClock) -> Multiplier {
        let current = self.multiplier(now, clock).min(self.crash_point);
        self.observed = self.observed.max(current);
        self.observed
    }

    pub fn status(
        &mut self,
        now: SystemTime,
        clock: &MultiplierClock,
        recent_crashes: Vec<Multiplier>,
    ) -> RoundStatus {
        let current_multiplier = match self.phase {
            Phase::Flying => Some(self.observe(now, clock)),
            Phase::Crashed => Some(self.crash_point),
            Phase::Waiting | Phase::Betting => None,
        };
        RoundStatus {
            round_id: self.id,
            phase: self.phase,
            elapsed_ms: self.elapsed(now).as_millis() as u64,
            current_multiplier,
            total_staked: self.total_staked,
            total_paid_out: self.total_paid_out,
            recent_crashes,
        }
    }

    /// Immutable record of the round, available once it has crashed.
    pub fn summary(&self) -> Option<RoundSummary> {
        if self.phase != Phase::Crashed {
            return None;
        }
        let cashed_out = self
            .bets
            .values()
            .filter(|bet| bet.cashout_multiplier().is_some())
            .count();
        Some(RoundSummary {
            round_id: self.id,
            nonce: self.commitment.nonce,
            server_seed: self.commitment.server_seed.clone(),
            server_seed_hash: self.commitment.server_seed_hash,
            client_seed: self.commitment.client_seed.clone(),
            crash_point: self.crash_point,
            crashed_at_ms: self.crashed_at.map(unix_ms).unwrap_or(0),
            total_staked: self.total_staked,
            total_paid_out: self.total_paid_out,
            bets: self.bets.len() as u32,
            cashed_out: cashed_out as u32,
        })
    }
}
