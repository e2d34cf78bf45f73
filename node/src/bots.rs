//! Simulated bettors that exercise the engine through its public operations.

use crate::{engine::Engine, journal::Journal, wallet};
use commonware_cryptography::{ed25519::PrivateKey, PrivateKeyExt, Signer};
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use liftoff_types::crash::{Multiplier, Phase};
use rand::{CryptoRng, Rng};
use std::time::Duration;
use tracing::debug;

/// Configuration for [spawn].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub count: usize,
    /// Balance each bot starts with
    pub funding: u64,
    pub max_stake: u64,
    /// Upper bound of the random cash-out target, in hundredths
    pub max_target: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: 8,
            funding: 10_000,
            max_stake: 500,
            max_target: 500,
        }
    }
}

/// Spawn `config.count` bots that fund themselves from `wallet` and play every round.
pub fn spawn<E, J>(
    context: E,
    engine: Engine<E, wallet::Memory, J>,
    wallet: wallet::Memory,
    config: Config,
) -> Vec<Handle<()>>
where
    E: Clock + Spawner + Metrics + Rng + CryptoRng,
    J: Journal,
{
    (0..config.count)
        .map(|index| {
            let engine = engine.clone();
            let wallet = wallet.clone();
            context
                .with_label(&format!("bot_{index}"))
                .spawn(move |context| play(context, engine, wallet, config))
        })
        .collect()
}

async fn play<E, J>(
    mut context: E,
    engine: Engine<E, wallet::Memory, J>,
    wallet: wallet::Memory,
    config: Config,
) where
    E: Clock + Spawner + Metrics + Rng + CryptoRng,
    J: Journal,
{
    let participant = PrivateKey::from_rng(&mut context).public_key();
    wallet.fund(participant.clone(), config.funding);

    let mut last_round = 0;
    let mut target = Multiplier::ONE;
    loop {
        let delay = Duration::from_millis(context.gen_range(50..400));
        context.sleep(delay).await;
        let Ok(status) = engine.get_round_status(None) else {
            continue;
        };

        match status.phase {
            Phase::Betting if status.round_id != last_round => {
                last_round = status.round_id;
                let balance = wallet.balance(&participant);
                if balance == 0 {
                    continue;
                }
                let stake = context.gen_range(1..=config.max_stake.min(balance).max(1));
                target = Multiplier::from_hundredths(
                    context.gen_range(101..=config.max_target.max(101)),
                );
                let auto_cashout = context.gen_bool(0.3).then_some(target);
                match engine
                    .place_bet(status.round_id, participant.clone(), stake, auto_cashout)
                    .await
                {
                    Ok(bet) => debug!(round = status.round_id, bet, stake, "bot placed bet"),
                    Err(e) => debug!(?e, round = status.round_id, "bot bet rejected"),
                }
            }
            Phase::Flying if status.round_id == last_round => {
                let reached = status
                    .current_multiplier
                    .is_some_and(|current| current >= target);
                let active = engine.bet(&participant).is_some_and(|bet| bet.is_active());
                if !reached || !active {
                    continue;
                }
                match engine.cash_out(status.round_id, participant.clone()).await {
                    Ok(payout) => debug!(
                        round = status.round_id,
                        multiplier = %payout.multiplier,
                        payout = payout.payout,
                        "bot cashed out"
                    ),
                    Err(e) => debug!(?e, round = status.round_id, "bot cash-out rejected"),
                }
            }
            _ => {}
        }
    }
}
