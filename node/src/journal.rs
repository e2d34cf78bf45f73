//! Record of rounds that have not been closed yet.
//!
//! The engine writes every state change that moves funds (bets placed, bets
//! resolved) and closes a round once all of its payouts have been handed to the
//! wallet. After a restart, any round still open is refunded.

use commonware_cryptography::ed25519::PublicKey;
use liftoff_types::{
    api::RoundStarted,
    crash::{Bet, BetStatus},
};
use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

/// A round that was opened but never closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pending {
    pub round_id: u64,
    /// Bets that never reached a final status
    pub unresolved: Vec<Bet>,
}

/// Implementations are expected to log (not surface) their own storage errors.
pub trait Journal: Clone + Send + Sync + 'static {
    fn opened(&self, round: RoundStarted) -> impl Future<Output = ()> + Send;

    fn bet_placed(&self, round_id: u64, bet: Bet) -> impl Future<Output = ()> + Send;

    fn bet_resolved(
        &self,
        round_id: u64,
        participant: PublicKey,
        status: BetStatus,
        payout: u64,
    ) -> impl Future<Output = ()> + Send;

    fn closed(&self, round_id: u64) -> impl Future<Output = ()> + Send;

    /// Rounds opened but not closed, oldest first. Bets marked `Refunded` are
    /// resolved and never listed.
    fn pending(&self) -> impl Future<Output = Vec<Pending>> + Send;

    /// Highest round id ever opened.
    fn last_round(&self) -> impl Future<Output = Option<u64>> + Send;
}

#[derive(Default)]
struct Entries {
    open: BTreeMap<u64, BTreeMap<PublicKey, Bet>>,
    last_round: Option<u64>,
}

/// In-memory journal. Clones share the same entries, so a fresh engine built
/// over a clone sees what a previous engine left behind.
#[derive(Clone, Default)]
pub struct Memory {
    entries: Arc<Mutex<Entries>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_rounds(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open
            .len()
    }
}

impl Journal for Memory {
    async fn opened(&self, round: RoundStarted) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.last_round = entries.last_round.max(Some(round.round_id));
        entries.open.entry(round.round_id).or_default();
    }

    async fn bet_placed(&self, round_id: u64, bet: Bet) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // A round closed before this write landed stays closed
        let Some(bets) = entries.open.get_mut(&round_id) else {
            return;
        };
        bets.insert(bet.participant.clone(), bet);
    }

    async fn bet_resolved(
        &self,
        round_id: u64,
        participant: PublicKey,
        status: BetStatus,
        payout: u64,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bet) = entries
            .open
            .get_mut(&round_id)
            .and_then(|bets| bets.get_mut(&participant))
        else {
            return;
        };
        bet.status = status;
        bet.payout = payout;
    }

    async fn closed(&self, round_id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.open.remove(&round_id);
    }

    async fn pending(&self) -> Vec<Pending> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .open
            .iter()
            .map(|(round_id, bets)| Pending {
                round_id: *round_id,
                unresolved: bets.values().filter(|bet| bet.is_active()).cloned().collect(),
            })
            .collect()
    }

    async fn last_round(&self) -> Option<u64> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_round
    }
}
