use super::*;
use commonware_macros::test_traced;
use commonware_runtime::{
    deterministic::{self, Runner},
    Clock, Metrics, Runner as _,
};
use engine::{Engine, Tick, RETRY_DELAY};
use futures::future::join;
use journal::Journal;
use liftoff_execution::{
    fairness::{hash_seed, verify},
    mocks::create_participant,
};
use liftoff_types::{
    api::RoundStarted,
    crash::{Bet, BetStatus, Phase, RoundSummary},
};
use scheduler::Scheduler;
use std::{sync::atomic::Ordering, time::Duration};
use wallet::Wallet;

const WINDOW: Duration = Duration::from_secs(15);
const TICK: Duration = Duration::from_millis(16);
const COOLDOWN: Duration = Duration::from_secs(3);

fn engine_config<W: Wallet, J: Journal>(wallet: W, journal: J) -> engine::Config<W, J> {
    engine::Config {
        wallet,
        journal,
        // Keep flights short in simulated time
        policy: Policy {
            cap: Multiplier::from_hundredths(2_000),
            ..Policy::default()
        },
        clock: MultiplierClock::default(),
        client_seed: None,
        betting_window: WINDOW,
        cooldown: COOLDOWN,
        history_capacity: 100,
        auto_restart: true,
    }
}

/// Opens a round, places a 100 chip bet for each participant and launches it.
async fn launch_with_bets<W: Wallet, J: Journal>(
    context: &deterministic::Context,
    engine: &mut Engine<deterministic::Context, W, J>,
    participants: &[commonware_cryptography::ed25519::PublicKey],
) -> u64 {
    let started = engine.start_new_round().await.unwrap();
    for participant in participants {
        engine
            .place_bet(started.round_id, participant.clone(), 100, None)
            .await
            .unwrap();
    }
    context.sleep(WINDOW).await;
    assert_eq!(engine.tick().await, Tick::Launched(started.round_id));
    started.round_id
}

async fn run_until_crash<W: Wallet, J: Journal>(
    context: &deterministic::Context,
    engine: &mut Engine<deterministic::Context, W, J>,
) -> RoundSummary {
    loop {
        if let Tick::Crashed(summary) = engine.tick().await {
            return summary;
        }
        context.sleep(TICK).await;
    }
}

#[test_traced]
fn test_round_lifecycle() {
    let executor = Runner::timed(Duration::from_secs(120));
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let journal = journal::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal.clone()),
        );
        let participants: Vec<_> = (1..=4).map(create_participant).collect();
        for participant in &participants {
            wallet.fund(participant.clone(), 1_000);
        }

        // Open
        let Tick::Started(started) = engine.tick().await else {
            panic!("expected a new round");
        };
        assert_eq!(started.round_id, 1);
        assert_eq!(started.nonce, 1);
        assert_eq!(engine.tick().await, Tick::Waiting);

        // Bet (half with an auto cash-out at the lowest possible target)
        let auto = Multiplier::from_hundredths(101);
        for (i, participant) in participants.iter().enumerate() {
            let threshold = (i % 2 == 0).then_some(auto);
            engine
                .place_bet(started.round_id, participant.clone(), 100, threshold)
                .await
                .unwrap();
        }
        let status = engine.get_round_status(None).unwrap();
        assert_eq!(status.phase, Phase::Betting);
        assert_eq!(status.total_staked, 400);
        assert_eq!(status.current_multiplier, None);
        assert_eq!(wallet.total(), 3_600);

        // Fly
        context.sleep(WINDOW).await;
        assert_eq!(engine.tick().await, Tick::Launched(1));
        let summary = run_until_crash(&context, &mut engine).await;
        assert_eq!(summary.round_id, 1);
        assert_eq!(summary.bets, 4);
        assert_eq!(summary.total_staked, 400);

        // Every bet is resolved and the bound holds
        for (i, participant) in participants.iter().enumerate() {
            let bet = engine.bet(participant).unwrap();
            match bet.status {
                BetStatus::Active | BetStatus::Refunded => panic!("bet not settled: {bet:?}"),
                BetStatus::CashedOut(multiplier) => {
                    assert_eq!(multiplier, auto);
                    assert!(multiplier < summary.crash_point);
                    assert_eq!(bet.payout, 101);
                }
                BetStatus::Crashed => {
                    assert!(i % 2 == 1 || summary.crash_point <= auto);
                    assert_eq!(bet.payout, 0);
                }
            }
        }
        assert_eq!(
            wallet.total(),
            4_000 - summary.total_staked + summary.total_paid_out
        );
        assert_eq!(journal.open_rounds(), 0);

        // Crashed status reports the crash point
        let status = engine.get_round_status(Some(1)).unwrap();
        assert_eq!(status.phase, Phase::Crashed);
        assert_eq!(status.current_multiplier, Some(summary.crash_point));
        assert_eq!(status.recent_crashes, vec![summary.crash_point]);

        // Cool down, then the next round opens
        assert_eq!(engine.tick().await, Tick::Cooldown);
        context.sleep(COOLDOWN).await;
        let Tick::Started(next) = engine.tick().await else {
            panic!("expected a new round");
        };
        assert_eq!(next.round_id, 2);
        assert_ne!(next.server_seed_hash, started.server_seed_hash);
        assert_eq!(engine.recent_rounds(10).len(), 1);
    });
}

#[test_traced]
fn test_concurrent_cash_out_resolves_once() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let alice = create_participant(1);
        wallet.fund(alice.clone(), 1_000);
        let round = launch_with_bets(&context, &mut engine, &[alice.clone()]).await;

        // Two requests race for the same bet at the same instant
        let (first, second) = join(
            engine.cash_out(round, alice.clone()),
            engine.cash_out(round, alice.clone()),
        )
        .await;
        let results = [first, second];
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results.contains(&Err(Error::Round(RoundError::AlreadyResolved))));

        // No time has passed since launch, so the bet settles at 1.00x
        let payout = results
            .iter()
            .find_map(|result| result.as_ref().ok().copied())
            .unwrap();
        assert_eq!(payout.multiplier, Multiplier::ONE);
        assert_eq!(payout.payout, 100);
        assert_eq!(wallet.balance(&alice), 1_000);
        assert_eq!(
            engine.get_round_status(None).unwrap().total_paid_out,
            100
        );
    });
}

#[test_traced]
fn test_status_never_decreases() {
    let executor = Runner::timed(Duration::from_secs(120));
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let alice = create_participant(1);
        wallet.fund(alice.clone(), 1_000);
        let round = launch_with_bets(&context, &mut engine, &[alice]).await;

        let mut last = Multiplier::ONE;
        loop {
            let status = engine.get_round_status(Some(round)).unwrap();
            let current = status.current_multiplier.unwrap();
            assert!(current >= last);

            // Reads at the same instant agree
            let again = engine.get_round_status(None).unwrap();
            assert_eq!(again.current_multiplier, Some(current));
            last = current;

            if status.phase == Phase::Crashed {
                break;
            }
            engine.tick().await;
            context.sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(last, engine.verify_round(round).unwrap().crash_point);
    });
}

#[test_traced]
fn test_empty_round_skipped() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let journal = journal::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine::Config {
                auto_restart: false,
                ..engine_config(wallet::Memory::new(), journal.clone())
            },
        );

        let Tick::Started(started) = engine.tick().await else {
            panic!("expected a new round");
        };
        context.sleep(WINDOW).await;
        assert_eq!(engine.tick().await, Tick::Skipped(started.round_id));
        assert_eq!(engine.tick().await, Tick::Idle);
        assert_eq!(journal.open_rounds(), 0);

        // The skipped round never flew and left nothing behind
        let status = engine.get_round_status(None).unwrap();
        assert_eq!(status.phase, Phase::Waiting);
        assert_eq!(status.round_id, 2);
        assert_eq!(
            engine.get_round_status(Some(1)),
            Err(Error::RoundNotFound(1))
        );
        assert_eq!(engine.verify_round(1), Err(Error::RoundNotFound(1)));
        assert!(engine.recent_rounds(10).is_empty());

        // Its nonce is not reused
        let next = engine.start_new_round().await.unwrap();
        assert_eq!(next.round_id, 2);
        assert_eq!(next.nonce, 2);
        assert_eq!(engine.tick().await, Tick::Waiting);
    });
}

#[test_traced]
fn test_empty_round_restarts() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet::Memory::new(), journal::Memory::new()),
        );
        assert!(matches!(engine.tick().await, Tick::Started(_)));
        context.sleep(WINDOW).await;
        assert_eq!(engine.tick().await, Tick::Skipped(1));
        let Tick::Started(next) = engine.tick().await else {
            panic!("expected a new round");
        };
        assert_eq!(next.round_id, 2);
    });
}

#[test_traced]
fn test_place_bet_rejections() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let alice = create_participant(1);
        let bob = create_participant(2);
        let carol = create_participant(3);
        wallet.fund(alice.clone(), 100);
        wallet.fund(carol.clone(), 100);

        assert_eq!(
            engine.place_bet(1, alice.clone(), 10, None).await,
            Err(Error::RoundNotFound(1))
        );
        let round = engine.start_new_round().await.unwrap().round_id;
        assert_eq!(
            engine.start_new_round().await,
            Err(Error::Round(RoundError::InvalidTiming(Phase::Betting)))
        );

        assert_eq!(
            engine.place_bet(round, bob.clone(), 10, None).await,
            Err(Error::InsufficientFunds)
        );
        assert!(engine.bet(&bob).is_none());
        assert_eq!(
            engine.place_bet(round, alice.clone(), 0, None).await,
            Err(Error::Round(RoundError::InvalidStake))
        );
        assert_eq!(
            engine
                .place_bet(round, alice.clone(), 10, Some(Multiplier::ONE))
                .await,
            Err(Error::Round(RoundError::InvalidAutoCashout(Multiplier::ONE)))
        );
        assert_eq!(
            engine.place_bet(round + 1, alice.clone(), 10, None).await,
            Err(Error::RoundNotFound(round + 1))
        );

        engine.place_bet(round, alice.clone(), 60, None).await.unwrap();
        assert_eq!(wallet.balance(&alice), 40);
        assert_eq!(
            engine.place_bet(round, alice.clone(), 10, None).await,
            Err(Error::Round(RoundError::DuplicateBet))
        );
        assert_eq!(wallet.balance(&alice), 40);

        // The deadline is enforced even before the scheduler launches the round
        context.sleep(WINDOW).await;
        assert_eq!(
            engine.place_bet(round, carol.clone(), 10, None).await,
            Err(Error::Round(RoundError::InvalidTiming(Phase::Betting)))
        );
        assert_eq!(wallet.balance(&carol), 100);
        assert_eq!(
            engine.cash_out(round, alice.clone()).await,
            Err(Error::Round(RoundError::InvalidTiming(Phase::Betting)))
        );

        engine.tick().await;
        assert_eq!(
            engine.cash_out(round, carol).await,
            Err(Error::Round(RoundError::BetNotFound))
        );
    });
}

#[test_traced]
fn test_verify_round() {
    let executor = Runner::timed(Duration::from_secs(120));
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let alice = create_participant(1);
        wallet.fund(alice.clone(), 1_000);

        let started = engine.start_new_round().await.unwrap();
        assert_eq!(
            engine.verify_round(started.round_id),
            Err(Error::Round(RoundError::InvalidTiming(Phase::Betting)))
        );
        engine
            .place_bet(started.round_id, alice, 100, None)
            .await
            .unwrap();
        context.sleep(WINDOW).await;
        engine.tick().await;
        assert_eq!(
            engine.verify_round(started.round_id),
            Err(Error::Round(RoundError::InvalidTiming(Phase::Flying)))
        );

        let summary = run_until_crash(&context, &mut engine).await;
        let verification = engine.verify_round(started.round_id).unwrap();
        assert!(verification.is_valid());
        assert_eq!(verification.server_seed_hash, started.server_seed_hash);
        assert_eq!(verification.client_seed, started.client_seed);
        assert_eq!(verification.nonce, started.nonce);
        assert_eq!(verification.crash_point, summary.crash_point);
        assert!(verify(
            &verification.server_seed,
            &verification.client_seed,
            verification.nonce,
            verification.crash_point,
            engine.policy()
        ));
        assert_eq!(engine.verify_round(99), Err(Error::RoundNotFound(99)));

        // Once the next round opens, the archived round is only reachable as crashed
        context.sleep(COOLDOWN).await;
        let Tick::Started(next) = engine.tick().await else {
            panic!("next round not started");
        };
        assert_eq!(next.round_id, started.round_id + 1);
        assert_eq!(
            engine.cash_out(started.round_id, create_participant(1)).await,
            Err(Error::Round(RoundError::InvalidTiming(Phase::Crashed)))
        );
        assert_eq!(
            engine.cash_out(99, create_participant(1)).await,
            Err(Error::RoundNotFound(99))
        );
        assert!(engine.verify_round(started.round_id).unwrap().is_valid());
    });
}

#[test_traced]
fn test_recovery_refunds_open_rounds() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let journal = journal::Memory::new();
        let alice = create_participant(1);
        let bob = create_participant(2);
        wallet.fund(alice.clone(), 1_000);
        wallet.fund(bob.clone(), 1_000);

        // Alice cashes out, then the engine goes away mid-flight
        {
            let mut engine = Engine::new(
                context.with_label("first"),
                engine_config(wallet.clone(), journal.clone()),
            );
            let round =
                launch_with_bets(&context, &mut engine, &[alice.clone(), bob.clone()]).await;
            engine.cash_out(round, alice.clone()).await.unwrap();
        }
        assert_eq!(wallet.balance(&alice), 1_000);
        assert_eq!(wallet.balance(&bob), 900);
        assert_eq!(journal.open_rounds(), 1);

        // Only the unresolved stake is returned
        let mut engine = Engine::new(
            context.with_label("second"),
            engine_config(wallet.clone(), journal.clone()),
        );
        assert_eq!(engine.recover().await, 1);
        assert_eq!(wallet.balance(&alice), 1_000);
        assert_eq!(wallet.balance(&bob), 1_000);
        assert_eq!(journal.open_rounds(), 0);
        assert_eq!(engine.recover().await, 0);
        assert_eq!(wallet.balance(&bob), 1_000);

        // Round ids continue past the recovered round
        let started = engine.start_new_round().await.unwrap();
        assert_eq!(started.round_id, 2);
    });
}

#[test_traced]
fn test_recovery_skips_refunded_bets() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let journal = journal::Memory::new();
        let alice = create_participant(1);
        let bob = create_participant(2);

        // A previous recovery refunded bob and stopped before reaching alice
        journal
            .opened(RoundStarted {
                round_id: 5,
                server_seed_hash: hash_seed("abc"),
                client_seed: "xyz".to_string(),
                nonce: 5,
                betting_deadline_ms: 15_000,
            })
            .await;
        journal.bet_placed(5, Bet::new(1, alice.clone(), 100, None)).await;
        journal.bet_placed(5, Bet::new(2, bob.clone(), 250, None)).await;
        journal
            .bet_resolved(5, bob.clone(), BetStatus::Refunded, 250)
            .await;
        wallet.fund(bob.clone(), 250);

        let engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal.clone()),
        );
        assert_eq!(engine.recover().await, 1);
        assert_eq!(wallet.balance(&alice), 100);
        assert_eq!(wallet.balance(&bob), 250);
        assert_eq!(journal.open_rounds(), 0);

        // Nothing is returned twice
        assert_eq!(engine.recover().await, 0);
        assert_eq!(wallet.balance(&alice), 100);
        assert_eq!(wallet.balance(&bob), 250);
    });
}

#[test_traced]
fn test_recovery_marks_refunds_before_closing() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let journal = journal::Memory::new();
        let alice = create_participant(1);
        wallet.fund(alice.clone(), 1_000);

        {
            let mut engine = Engine::new(
                context.with_label("first"),
                engine_config(wallet.clone(), journal.clone()),
            );
            launch_with_bets(&context, &mut engine, &[alice.clone()]).await;
        }
        let pending = journal.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].unresolved.len(), 1);

        let engine = Engine::new(
            context.with_label("second"),
            engine_config(wallet.clone(), journal.clone()),
        );
        assert_eq!(engine.recover().await, 1);
        assert_eq!(wallet.balance(&alice), 1_000);
        assert!(journal.pending().await.is_empty());
    });
}

#[test_traced]
fn test_credit_retried_until_accepted() {
    let executor = Runner::default();
    executor.start(|context| async move {
        let wallet = wallet::Mock::new(2);
        let mut engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let alice = create_participant(1);
        wallet.inner.fund(alice.clone(), 100);
        let round = launch_with_bets(&context, &mut engine, &[alice.clone()]).await;

        // The settlement stands even though the wallet is down
        let payout = engine.cash_out(round, alice.clone()).await.unwrap();
        assert_eq!(payout.payout, 100);
        assert_eq!(wallet.inner.balance(&alice), 0);
        assert_eq!(
            engine.bet(&alice).unwrap().status,
            BetStatus::CashedOut(Multiplier::ONE)
        );

        context.sleep(RETRY_DELAY + Duration::from_secs(1)).await;
        assert_eq!(wallet.inner.balance(&alice), 0);

        context.sleep(RETRY_DELAY).await;
        assert_eq!(wallet.inner.balance(&alice), 100);
        assert_eq!(wallet.credit_attempts.load(Ordering::SeqCst), 3);

        // Nothing further is credited
        context.sleep(RETRY_DELAY * 3).await;
        assert_eq!(wallet.inner.balance(&alice), 100);
    });
}

#[test_traced("INFO")]
fn test_scheduler_with_bots() {
    let executor = Runner::timed(Duration::from_secs(600));
    executor.start(|context| async move {
        let wallet = wallet::Memory::new();
        let engine = Engine::new(
            context.with_label("engine"),
            engine_config(wallet.clone(), journal::Memory::new()),
        );
        let count = 5;
        bots::spawn(
            context.with_label("bots"),
            engine.clone(),
            wallet.clone(),
            bots::Config {
                count,
                funding: 1_000,
                max_stake: 100,
                max_target: 300,
            },
        );
        Scheduler::new(context.with_label("scheduler"), engine.clone(), TICK).start();
        context.sleep(Duration::from_secs(300)).await;

        let rounds = engine.recent_rounds(100);
        assert!(!rounds.is_empty());
        for summary in &rounds {
            assert!(engine.verify_round(summary.round_id).unwrap().is_valid());
            assert!(summary.cashed_out <= summary.bets);
            assert!(summary.bets > 0);
        }
        for pair in rounds.windows(2) {
            assert!(pair[0].nonce > pair[1].nonce);
        }

        // Chips only move between bots and the rounds
        let status = engine.get_round_status(None).unwrap();
        let mut held: i128 = rounds
            .iter()
            .map(|summary| summary.total_staked as i128 - summary.total_paid_out as i128)
            .sum();
        if status.phase != Phase::Crashed {
            held += status.total_staked as i128 - status.total_paid_out as i128;
        }
        assert_eq!(wallet.total() as i128 + held, count as i128 * 1_000);
    });
}

fn parse(yaml: &str) -> Config {
    serde_yaml::from_str(yaml).unwrap()
}

const MINIMAL: &str = "log_level: info\nmetrics_port: 9090\nworker_threads: 2\n";

#[test]
fn test_config_defaults() {
    let config = parse(MINIMAL).validate().unwrap();
    assert_eq!(config.log_level, Level::INFO);
    assert_eq!(config.policy, Policy::default());
    assert_eq!(config.clock, MultiplierClock::default());
    assert_eq!(config.betting_window, Duration::from_secs(15));
    assert_eq!(config.tick, Duration::from_millis(16));
    assert_eq!(config.cooldown, Duration::from_secs(3));
    assert_eq!(config.history_capacity, 100);
    assert!(config.auto_restart);
    assert_eq!(config.bots, 0);
    assert_eq!(config.client_seed, None);
}

#[test]
fn test_config_overrides() {
    let yaml = format!(
        "{MINIMAL}house_edge: 0.02\nmax_crash_point: 50.5\ndistribution: Edge\nclient_seed: lucky\n"
    );
    let config = parse(&yaml).validate().unwrap();
    assert_eq!(config.policy.house_edge, 0.02);
    assert_eq!(config.policy.cap, Multiplier::from_hundredths(5_050));
    assert_eq!(config.policy.distribution, Distribution::Edge);
    assert_eq!(config.client_seed.as_deref(), Some("lucky"));
}

#[test]
fn test_config_rejects_invalid() {
    let invalid = |extra: &str| parse(&format!("{MINIMAL}{extra}")).validate().err();

    assert!(matches!(
        parse("log_level: loud\nmetrics_port: 9090\nworker_threads: 2\n").validate(),
        Err(ConfigError::InvalidLogLevel { .. })
    ));
    assert!(matches!(
        invalid("house_edge: 1.0\n"),
        Some(ConfigError::InvalidHouseEdge { .. })
    ));
    assert!(matches!(
        invalid("house_edge: -0.1\n"),
        Some(ConfigError::InvalidHouseEdge { .. })
    ));
    assert!(matches!(
        invalid("max_crash_point: 1.0\n"),
        Some(ConfigError::InvalidMaxCrashPoint { .. })
    ));
    assert!(matches!(
        invalid("growth: 0.0\n"),
        Some(ConfigError::InvalidGrowth { .. })
    ));
    assert!(matches!(
        invalid("distribution: uniform\n"),
        Some(ConfigError::InvalidDistribution { .. })
    ));
    assert!(matches!(
        invalid("tick_ms: 0\n"),
        Some(ConfigError::InvalidNonZero {
            field: "tick_ms",
            ..
        })
    ));
    assert!(matches!(
        invalid("history_capacity: 0\n"),
        Some(ConfigError::InvalidNonZero {
            field: "history_capacity",
            ..
        })
    ));
    assert!(matches!(
        invalid(&format!("betting_window_ms: {}\n", u64::MAX)),
        Some(ConfigError::TooLarge {
            field: "betting_window_ms",
            ..
        })
    ));
    assert!(matches!(
        invalid(&format!("cooldown_ms: {}\n", MAX_DURATION_MS + 1)),
        Some(ConfigError::TooLarge {
            field: "cooldown_ms",
            ..
        })
    ));
    assert!(parse(&format!("{MINIMAL}betting_window_ms: {MAX_DURATION_MS}\n"))
        .validate()
        .is_ok());
    assert!(matches!(
        invalid(&format!("client_seed: {}\n", "x".repeat(129))),
        Some(ConfigError::InvalidClientSeed { len: 129, .. })
    ));
}
