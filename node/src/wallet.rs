use commonware_cryptography::ed25519::PublicKey;
use std::{
    collections::HashMap,
    convert::Infallible,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for interacting with the ledger that holds participant balances.
pub trait Wallet: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Remove `amount` from a participant's balance. Returns `false` (and leaves
    /// the balance untouched) if the balance is too low.
    fn debit(
        &self,
        participant: PublicKey,
        amount: u64,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Add `amount` to a participant's balance.
    fn credit(
        &self,
        participant: PublicKey,
        amount: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// In-memory balances.
#[derive(Clone, Default)]
pub struct Memory {
    balances: Arc<Mutex<HashMap<PublicKey, u64>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, participant: PublicKey, amount: u64) {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.entry(participant).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, participant: &PublicKey) -> u64 {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(participant)
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every balance.
    pub fn total(&self) -> u64 {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl Wallet for Memory {
    type Error = Infallible;

    async fn debit(&self, participant: PublicKey, amount: u64) -> Result<bool, Self::Error> {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.entry(participant).or_default();
        if *balance < amount {
            return Ok(false);
        }
        *balance -= amount;
        Ok(true)
    }

    async fn credit(&self, participant: PublicKey, amount: u64) -> Result<(), Self::Error> {
        self.fund(participant, amount);
        Ok(())
    }
}

/// A wallet that rejects the first `failures` credits.
#[cfg(test)]
#[derive(Clone)]
pub struct Mock {
    pub inner: Memory,
    pub failures: Arc<AtomicUsize>,
    pub credit_attempts: Arc<AtomicUsize>,
}

#[cfg(test)]
impl Mock {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: Memory::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
            credit_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[cfg(test)]
impl Wallet for Mock {
    type Error = std::io::Error;

    async fn debit(&self, participant: PublicKey, amount: u64) -> Result<bool, Self::Error> {
        let debited = self.inner.debit(participant, amount).await;
        Ok(debited.unwrap_or_else(|never| match never {}))
    }

    async fn credit(&self, participant: PublicKey, amount: u64) -> Result<(), Self::Error> {
        self.credit_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(std::io::Error::other("ledger unavailable"));
        }
        self.inner.fund(participant, amount);
        Ok(())
    }
}
