use liftoff_types::crash::{Multiplier, RoundSummary};
use std::collections::VecDeque;

/// Bounded record of completed rounds. The oldest summary is evicted once
/// `capacity` is exceeded.
#[derive(Clone, Debug)]
pub struct RoundHistory {
    capacity: usize,
    rounds: VecDeque<RoundSummary>,
}

impl RoundHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            rounds: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a completed round, returning the evicted summary (if any).
    pub fn record(&mut self, summary: RoundSummary) -> Option<RoundSummary> {
        let evicted = if self.rounds.len() == self.capacity {
            self.rounds.pop_front()
        } else {
            None
        };
        self.rounds.push_back(summary);
        evicted
    }

    /// Up to `n` summaries, newest first.
    pub fn recent(&self, n: usize) -> Vec<RoundSummary> {
        self.rounds.iter().rev().take(n).cloned().collect()
    }

    /// Crash points of up to `n` rounds, newest first.
    pub fn crash_points(&self, n: usize) -> Vec<Multiplier> {
        self.rounds
            .iter()
            .rev()
            .take(n)
            .map(|summary| summary.crash_point)
            .collect()
    }

    pub fn get(&self, round_id: u64) -> Option<&RoundSummary> {
        self.rounds
            .iter()
            .rev()
            .find(|summary| summary.round_id == round_id)
    }

    pub fn latest(&self) -> Option<&RoundSummary> {
        self.rounds.back()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
