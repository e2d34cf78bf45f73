use crate::{journal::Journal, wallet::Wallet, Error};
use commonware_cryptography::ed25519::PublicKey;
use commonware_runtime::{Clock, Metrics, Spawner};
use liftoff_execution::{
    fairness::{compute_crash_point, matches_commitment, Commitment, Policy},
    resolver::{self, Advance, Loss, Settlement},
    MultiplierClock, Round, RoundError, RoundHistory,
};
use liftoff_types::{
    api::{Payout, RoundStarted, RoundStatus, Verification},
    crash::{Bet, BetStatus, Multiplier, Phase, RoundSummary, RECENT_CRASHES},
};
use prometheus_client::metrics::counter::Counter;
use rand::{CryptoRng, Rng};
use std::{
    sync::{atomic::AtomicU64, Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};
use tracing::{debug, info, warn};

/// Delay between attempts to credit a participant after the wallet fails.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Configuration for the [Engine].
pub struct Config<W: Wallet, J: Journal> {
    pub wallet: W,
    pub journal: J,

    pub policy: Policy,
    pub clock: MultiplierClock,
    /// Client seed used for every round (a random one is drawn per round if unset)
    pub client_seed: Option<String>,

    pub betting_window: Duration,
    pub cooldown: Duration,
    pub history_capacity: usize,
    /// Open a new round automatically after one is skipped for lack of bets
    pub auto_restart: bool,
}

/// What a call to [Engine::tick] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// No round is open and none will be until [Engine::start_new_round] is called.
    Idle,
    Started(RoundStarted),
    /// Betting is still open.
    Waiting,
    Launched(u64),
    /// The betting window closed without bets and the round was discarded.
    Skipped(u64),
    Flying(Multiplier),
    Crashed(RoundSummary),
    Cooldown,
}

enum Step {
    Idle,
    Start,
    Wait,
    Cooldown,
    Skipped(u64),
    Launched(u64),
    Flying(Multiplier, Vec<Settlement>),
    Crashed {
        settled: Vec<Settlement>,
        lost: Vec<Loss>,
        summary: RoundSummary,
    },
}

struct Shared {
    round: Option<Round>,
    history: RoundHistory,
    /// Last nonce handed out. Round ids double as nonces.
    nonce: u64,
    next_bet: u64,
    idle: bool,
    resume_at: Option<SystemTime>,
}

/// Error for a round id that is not the current round.
fn missing(history: &RoundHistory, round_id: u64) -> Error {
    if history.get(round_id).is_some() {
        return RoundError::InvalidTiming(Phase::Crashed).into();
    }
    Error::RoundNotFound(round_id)
}

impl Shared {
    fn round(&self, round_id: u64) -> Result<&Round, Error> {
        match &self.round {
            Some(round) if round.id() == round_id => Ok(round),
            _ => Err(missing(&self.history, round_id)),
        }
    }

    fn round_mut(&mut self, round_id: u64) -> Result<&mut Round, Error> {
        match &mut self.round {
            Some(round) if round.id() == round_id => Ok(round),
            _ => Err(missing(&self.history, round_id)),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Default)]
struct Counters {
    rounds_started: Counter<u64, AtomicU64>,
    rounds_skipped: Counter<u64, AtomicU64>,
    rounds_crashed: Counter<u64, AtomicU64>,
    bets_placed: Counter<u64, AtomicU64>,
    cash_outs: Counter<u64, AtomicU64>,
    bets_lost: Counter<u64, AtomicU64>,
    credit_retries: Counter<u64, AtomicU64>,
    refunds: Counter<u64, AtomicU64>,
}

impl Counters {
    fn register(context: &impl Metrics) -> Self {
        let counters = Self::default();
        context.register(
            "rounds_started",
            "Number of rounds opened for betting",
            counters.rounds_started.clone(),
        );
        context.register(
            "rounds_skipped",
            "Number of rounds discarded because no bets were placed",
            counters.rounds_skipped.clone(),
        );
        context.register(
            "rounds_crashed",
            "Number of rounds that flew and crashed",
            counters.rounds_crashed.clone(),
        );
        context.register(
            "bets_placed",
            "Number of bets accepted",
            counters.bets_placed.clone(),
        );
        context.register(
            "cash_outs",
            "Number of bets cashed out (manually or automatically)",
            counters.cash_outs.clone(),
        );
        context.register(
            "bets_lost",
            "Number of bets still active when their round crashed",
            counters.bets_lost.clone(),
        );
        context.register(
            "credit_retries",
            "Number of failed wallet credits that were retried",
            counters.credit_retries.clone(),
        );
        context.register(
            "refunds",
            "Number of stakes refunded from rounds left open by a restart",
            counters.refunds.clone(),
        );
        counters
    }
}

/// Handle to the round engine.
///
/// Clones share one round, one history and one lock. The lock is only ever held
/// for synchronous reads and mutations; wallet and journal calls happen after it
/// is released, with the bet status already committed.
#[derive(Clone)]
pub struct Engine<E: Clock + Spawner + Metrics + Rng + CryptoRng, W: Wallet, J: Journal> {
    context: E,
    wallet: W,
    journal: J,

    policy: Policy,
    clock: MultiplierClock,
    client_seed: Option<String>,
    betting_window: Duration,
    cooldown: Duration,
    auto_restart: bool,

    shared: Arc<Mutex<Shared>>,
    counters: Counters,
}

impl<E: Clock + Spawner + Metrics + Rng + CryptoRng, W: Wallet, J: Journal> Engine<E, W, J> {
    pub fn new(context: E, cfg: Config<W, J>) -> Self {
        let counters = Counters::register(&context);
        Self {
            context,
            wallet: cfg.wallet,
            journal: cfg.journal,
            policy: cfg.policy,
            clock: cfg.clock,
            client_seed: cfg.client_seed,
            betting_window: cfg.betting_window,
            cooldown: cfg.cooldown,
            auto_restart: cfg.auto_restart,
            shared: Arc::new(Mutex::new(Shared {
                round: None,
                history: RoundHistory::new(cfg.history_capacity),
                nonce: 0,
                next_bet: 0,
                idle: false,
                resume_at: None,
            })),
            counters,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn clock(&self) -> &MultiplierClock {
        &self.clock
    }

    /// Open a new round for betting. Fails if a round is already betting or flying.
    pub async fn start_new_round(&mut self) -> Result<RoundStarted, Error> {
        let now = self.context.current();
        let started = {
            let mut shared = lock(&self.shared);
            if let Some(round) = &shared.round {
                if round.phase() != Phase::Crashed {
                    return Err(RoundError::InvalidTiming(round.phase()).into());
                }
            }
            shared.nonce += 1;
            let commitment =
                Commitment::generate(&mut self.context, shared.nonce, self.client_seed.clone());
            let round = Round::open(
                shared.nonce,
                commitment,
                &self.policy,
                now,
                self.betting_window,
            );
            let started = round.started();
            shared.round = Some(round);
            shared.idle = false;
            shared.resume_at = None;
            started
        };
        self.journal.opened(started.clone()).await;
        self.counters.rounds_started.inc();
        info!(
            round = started.round_id,
            commitment = ?started.server_seed_hash,
            client_seed = started.client_seed,
            "opened round"
        );
        Ok(started)
    }

    /// Place a bet in the round that is currently betting, returning the bet id.
    pub async fn place_bet(
        &self,
        round_id: u64,
        participant: PublicKey,
        stake: u64,
        auto_cashout: Option<Multiplier>,
    ) -> Result<u64, Error> {
        // Reject what we can before moving funds
        {
            let now = self.context.current();
            let shared = lock(&self.shared);
            shared
                .round(round_id)?
                .check_bet(&participant, stake, auto_cashout, now)?;
        }
        let debited = self
            .wallet
            .debit(participant.clone(), stake)
            .await
            .map_err(|e| Error::Wallet(e.to_string()))?;
        if !debited {
            return Err(Error::InsufficientFunds);
        }

        // The round may have moved on while the wallet was busy
        let placed = {
            let now = self.context.current();
            let mut shared = lock(&self.shared);
            shared.next_bet += 1;
            let bet_id = shared.next_bet;
            shared.round_mut(round_id).and_then(|round| {
                Ok(round
                    .place_bet(bet_id, participant.clone(), stake, auto_cashout, now)?
                    .clone())
            })
        };
        let bet = match placed {
            Ok(bet) => bet,
            Err(e) => {
                debug!(?e, round = round_id, stake, "returning stake of rejected bet");
                self.pay(participant, stake).await;
                return Err(e);
            }
        };
        self.journal.bet_placed(round_id, bet.clone()).await;
        self.counters.bets_placed.inc();
        debug!(round = round_id, bet = bet.id, stake, "placed bet");
        Ok(bet.id)
    }

    /// Cash out a participant's bet at the current multiplier.
    pub async fn cash_out(&self, round_id: u64, participant: PublicKey) -> Result<Payout, Error> {
        let settlement = {
            let now = self.context.current();
            let mut shared = lock(&self.shared);
            let round = shared.round_mut(round_id)?;
            resolver::cash_out(round, &participant, now, &self.clock)?
        };
        let payout = settlement.as_payout();
        self.record_settlement(settlement).await;
        Ok(payout)
    }

    /// Status of the given round, or of the current one if `round_id` is `None`.
    pub fn get_round_status(&self, round_id: Option<u64>) -> Result<RoundStatus, Error> {
        let now = self.context.current();
        let mut guard = lock(&self.shared);
        let shared = &mut *guard;
        let recent = shared.history.crash_points(RECENT_CRASHES);
        match (round_id, shared.round.as_mut()) {
            (None, Some(round)) => Ok(round.status(now, &self.clock, recent)),
            (Some(id), Some(round)) if round.id() == id => {
                Ok(round.status(now, &self.clock, recent))
            }
            (None, None) => Ok(RoundStatus {
                round_id: shared.nonce + 1,
                phase: Phase::Waiting,
                elapsed_ms: 0,
                current_multiplier: None,
                total_staked: 0,
                total_paid_out: 0,
                recent_crashes: recent,
            }),
            (Some(id), _) => {
                let summary = shared.history.get(id).ok_or(Error::RoundNotFound(id))?;
                Ok(RoundStatus {
                    round_id: id,
                    phase: Phase::Crashed,
                    elapsed_ms: self.clock.elapsed_until(summary.crash_point).as_millis() as u64,
                    current_multiplier: Some(summary.crash_point),
                    total_staked: summary.total_staked,
                    total_paid_out: summary.total_paid_out,
                    recent_crashes: recent,
                })
            }
        }
    }

    /// Reveal a crashed round and recompute its crash point.
    pub fn verify_round(&self, round_id: u64) -> Result<Verification, Error> {
        let shared = lock(&self.shared);
        if let Some(summary) = shared.history.get(round_id) {
            return Ok(Verification {
                round_id,
                server_seed: summary.server_seed.clone(),
                server_seed_hash: summary.server_seed_hash,
                client_seed: summary.client_seed.clone(),
                nonce: summary.nonce,
                crash_point: summary.crash_point,
                recomputed_crash_point: compute_crash_point(
                    &summary.server_seed,
                    &summary.client_seed,
                    summary.nonce,
                    &self.policy,
                ),
                commitment_valid: matches_commitment(
                    &summary.server_seed,
                    &summary.server_seed_hash,
                ),
            });
        }
        let round = shared.round(round_id)?;
        Err(RoundError::InvalidTiming(round.phase()).into())
    }

    /// Up to `n` completed rounds, newest first.
    pub fn recent_rounds(&self, n: usize) -> Vec<RoundSummary> {
        lock(&self.shared).history.recent(n)
    }

    /// A participant's bet in the current round.
    pub fn bet(&self, participant: &PublicKey) -> Option<Bet> {
        lock(&self.shared)
            .round
            .as_ref()
            .and_then(|round| round.bet(participant).cloned())
    }

    /// Advance the round lifecycle to the current time.
    pub async fn tick(&mut self) -> Tick {
        let now = self.context.current();
        let step = {
            let mut guard = lock(&self.shared);
            let shared = &mut *guard;
            match shared.round.as_mut() {
                None if shared.idle => Step::Idle,
                None => Step::Start,
                Some(round) => match round.phase() {
                    Phase::Betting if round.betting_closed(now) => {
                        let round_id = round.id();
                        if round.bet_count() == 0 {
                            shared.round = None;
                            shared.idle = !self.auto_restart;
                            Step::Skipped(round_id)
                        } else if let Err(e) = round.launch(now) {
                            warn!(?e, round = round_id, "failed to launch round");
                            Step::Wait
                        } else {
                            Step::Launched(round_id)
                        }
                    }
                    Phase::Waiting | Phase::Betting => Step::Wait,
                    Phase::Flying => match resolver::advance(round, now, &self.clock) {
                        Ok(Advance::Flying {
                            multiplier,
                            settled,
                        }) => Step::Flying(multiplier, settled),
                        Ok(Advance::Crashed {
                            settled,
                            lost,
                            summary,
                        }) => {
                            shared.history.record(summary.clone());
                            shared.resume_at = Some(now + self.cooldown);
                            Step::Crashed {
                                settled,
                                lost,
                                summary,
                            }
                        }
                        Err(e) => {
                            warn!(?e, round = round.id(), "failed to advance round");
                            Step::Wait
                        }
                    },
                    Phase::Crashed => match shared.resume_at {
                        Some(at) if now < at => Step::Cooldown,
                        _ => Step::Start,
                    },
                },
            }
        };

        match step {
            Step::Idle => Tick::Idle,
            Step::Wait => Tick::Waiting,
            Step::Cooldown => Tick::Cooldown,
            Step::Start => match self.start_new_round().await {
                Ok(started) => Tick::Started(started),
                Err(e) => {
                    debug!(?e, "round already open");
                    Tick::Waiting
                }
            },
            Step::Skipped(round_id) => {
                self.journal.closed(round_id).await;
                self.counters.rounds_skipped.inc();
                info!(round = round_id, "no bets placed, skipping round");
                Tick::Skipped(round_id)
            }
            Step::Launched(round_id) => {
                info!(round = round_id, "round launched");
                Tick::Launched(round_id)
            }
            Step::Flying(multiplier, settled) => {
                for settlement in settled {
                    self.record_settlement(settlement).await;
                }
                Tick::Flying(multiplier)
            }
            Step::Crashed {
                settled,
                lost,
                summary,
            } => {
                for settlement in settled {
                    self.record_settlement(settlement).await;
                }
                for loss in lost {
                    self.journal
                        .bet_resolved(summary.round_id, loss.participant, BetStatus::Crashed, 0)
                        .await;
                    self.counters.bets_lost.inc();
                }
                self.journal.closed(summary.round_id).await;
                self.counters.rounds_crashed.inc();
                info!(
                    round = summary.round_id,
                    crash_point = %summary.crash_point,
                    server_seed = summary.server_seed,
                    staked = summary.total_staked,
                    paid_out = summary.total_paid_out,
                    "round crashed"
                );
                Tick::Crashed(summary)
            }
        }
    }

    /// Refund every unresolved bet of rounds left open by a previous run and close
    /// those rounds. Returns the number of refunds issued.
    pub async fn recover(&self) -> usize {
        let mut refunds = 0;
        for pending in self.journal.pending().await {
            let count = pending.unresolved.len();
            for bet in pending.unresolved {
                // Once marked, the bet no longer shows up in `pending`
                self.journal
                    .bet_resolved(
                        pending.round_id,
                        bet.participant.clone(),
                        BetStatus::Refunded,
                        bet.stake,
                    )
                    .await;
                self.pay(bet.participant, bet.stake).await;
                self.counters.refunds.inc();
            }
            self.journal.closed(pending.round_id).await;
            refunds += count;
            warn!(round = pending.round_id, refunds = count, "refunded unfinished round");
        }
        if let Some(last) = self.journal.last_round().await {
            let mut shared = lock(&self.shared);
            shared.nonce = shared.nonce.max(last);
        }
        refunds
    }

    async fn record_settlement(&self, settlement: Settlement) {
        self.counters.cash_outs.inc();
        debug!(
            round = settlement.round_id,
            bet = settlement.bet_id,
            multiplier = %settlement.multiplier,
            payout = settlement.payout,
            automatic = settlement.automatic,
            "cashed out"
        );
        self.journal
            .bet_resolved(
                settlement.round_id,
                settlement.participant.clone(),
                BetStatus::CashedOut(settlement.multiplier),
                settlement.payout,
            )
            .await;
        self.pay(settlement.participant, settlement.payout).await;
    }

    /// Credit a participant, retrying in the background until the wallet accepts.
    async fn pay(&self, participant: PublicKey, amount: u64) {
        if amount == 0 {
            return;
        }
        let Err(e) = self.wallet.credit(participant.clone(), amount).await else {
            return;
        };
        warn!(?e, amount, "failed to credit participant");
        self.counters.credit_retries.inc();

        self.context.with_label("credit").spawn({
            let wallet = self.wallet.clone();
            let retries = self.counters.credit_retries.clone();
            move |context| async move {
                let mut attempts = 2;
                loop {
                    context.sleep(RETRY_DELAY).await;
                    let Err(e) = wallet.credit(participant.clone(), amount).await else {
                        break;
                    };
                    warn!(?e, attempts, amount, "failed to credit participant");
                    retries.inc();
                    attempts += 1;
                }
                debug!(amount, attempts, "credited participant");
            }
        });
    }
}
