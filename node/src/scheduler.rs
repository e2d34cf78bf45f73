use crate::{
    engine::{Engine, Tick},
    journal::Journal,
    wallet::Wallet,
};
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use rand::{CryptoRng, Rng};
use std::time::Duration;
use tracing::{debug, info};

/// Default interval between lifecycle ticks (~60Hz).
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Background task that drives the round lifecycle of an [Engine].
pub struct Scheduler<E: Clock + Spawner + Metrics + Rng + CryptoRng, W: Wallet, J: Journal> {
    context: E,
    engine: Engine<E, W, J>,
    tick: Duration,
}

impl<E: Clock + Spawner + Metrics + Rng + CryptoRng, W: Wallet, J: Journal> Scheduler<E, W, J> {
    pub fn new(context: E, engine: Engine<E, W, J>, tick: Duration) -> Self {
        Self {
            context,
            engine,
            tick,
        }
    }

    pub fn start(mut self) -> Handle<()> {
        self.context.spawn_ref()(self.run())
    }

    async fn run(mut self) {
        // Settle whatever a previous run left behind before opening anything new
        let refunds = self.engine.recover().await;
        info!(refunds, "recovered journal");

        loop {
            match self.engine.tick().await {
                Tick::Idle | Tick::Waiting | Tick::Cooldown => {}
                Tick::Flying(multiplier) => debug!(%multiplier, "flying"),
                Tick::Started(started) => debug!(round = started.round_id, "tick opened round"),
                Tick::Launched(round) => debug!(round, "tick launched round"),
                Tick::Skipped(round) => debug!(round, "tick skipped round"),
                Tick::Crashed(summary) => debug!(round = summary.round_id, "tick crashed round"),
            }
            self.context.sleep(self.tick).await;
        }
    }
}
