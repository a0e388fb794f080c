//! End-to-end tests driving real engine processes.
//!
//! The opponent is the bundled `bot-random` binary, whose `--mode` flag
//! makes it hang, crash or answer with nonsense.

use sprt_arena::board::GameBoard;
use sprt_arena::config::{ConfigError, EngineHandle, MatchSettings};
use sprt_arena::engine::{preflight, DriverError, EngineDriver};
use sprt_arena::game_runner::{play_game, Outcome, Termination, Verdict};
use sprt_arena::openings::{load_openings, Opening};
use sprt_arena::scheduler::{GameTask, RunStatus, Scheduler};
use sprt_arena::sprt::{MatchDecision, Sprt, SprtConfig};
use std::time::{Duration, Instant};

fn bot(name: &str, mode: &str) -> EngineHandle {
    let mut handle = EngineHandle::new(name, env!("CARGO_BIN_EXE_bot-random"));
    handle.args = vec!["--mode".to_string(), mode.to_string()];
    handle
}

fn fast_settings() -> MatchSettings {
    MatchSettings {
        movetime: Duration::from_millis(20),
        timeout_margin: Duration::from_millis(500),
        handshake_timeout: Duration::from_secs(5),
        max_plies: 60,
        ..MatchSettings::default()
    }
}

fn first_game() -> GameTask {
    GameTask {
        index: 0,
        opening_index: 0,
        engine_a_white: true,
    }
}

#[tokio::test]
async fn test_driver_handshake_and_move() {
    let mut driver = EngineDriver::start(&bot("Random", "random")).unwrap();
    driver.handshake(Duration::from_secs(5)).await.unwrap();
    assert_eq!(driver.id_name(), Some("RandomBot"));
    assert!(driver.supports_option("Hash"));
    assert!(driver.supports_option("threads"));

    driver.new_game(Duration::from_secs(5)).await.unwrap();
    driver.set_position(&Opening::startpos(), &[]).await.unwrap();
    let reply = driver
        .request_move(Duration::from_millis(50), Duration::from_secs(2))
        .await
        .unwrap();

    let mv = reply.mv.expect("random bot always has a move from startpos");
    assert!(GameBoard::default().play_uci(&mv).is_ok(), "{} is not legal", mv);
    assert_eq!(reply.info.and_then(|i| i.depth), Some(1));
    driver.shutdown().await;
}

#[tokio::test]
async fn test_engine_exiting_at_once_is_a_crash_not_a_hang() {
    let mut driver = EngineDriver::start(&bot("Silent", "silent")).unwrap();
    let started = Instant::now();
    let result = driver
        .request_move(Duration::from_millis(100), Duration::from_secs(10))
        .await;
    assert!(matches!(result, Err(DriverError::Crash(_))), "{:?}", result);
    assert!(started.elapsed() < Duration::from_secs(5));
    driver.shutdown().await;
}

#[tokio::test]
async fn test_hanging_engine_times_out_within_margin() {
    let settings = MatchSettings {
        movetime: Duration::from_millis(100),
        timeout_margin: Duration::from_millis(200),
        ..fast_settings()
    };
    let started = Instant::now();
    let record = play_game(
        &first_game(),
        &Opening::startpos(),
        &bot("Random", "random"),
        &bot("Hang", "hang"),
        &settings,
    )
    .await;

    assert_eq!(record.termination, Termination::Timeout);
    assert_eq!(record.verdict(), Verdict::AWin);
    assert_eq!(record.plies, 1);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_misbehaving_engines_lose() {
    let cases = [
        ("crash", Termination::Crash),
        ("illegal", Termination::IllegalMove),
        ("garbage", Termination::IllegalMove),
        ("silent", Termination::Crash),
    ];
    for (mode, expected) in cases {
        // EngineA plays Black here, so the misbehaving side moves first
        let task = GameTask {
            index: 1,
            opening_index: 0,
            engine_a_white: false,
        };
        let record = play_game(
            &task,
            &Opening::startpos(),
            &bot("Random", "random"),
            &bot("Bad", mode),
            &fast_settings(),
        )
        .await;
        assert_eq!(record.termination, expected, "mode {}", mode);
        assert_eq!(record.verdict(), Verdict::AWin, "mode {}", mode);
        assert_eq!(record.plies, 0, "mode {}", mode);
    }
}

#[tokio::test]
async fn test_random_game_ends_by_rule_or_length_limit() {
    let record = play_game(
        &first_game(),
        &Opening::startpos(),
        &bot("A", "random"),
        &bot("B", "greedy"),
        &fast_settings(),
    )
    .await;
    assert!(record.plies <= 60);
    assert!(
        !matches!(
            record.termination,
            Termination::Timeout | Termination::Crash | Termination::IllegalMove
        ),
        "unexpected {:?}",
        record.termination
    );
}

#[tokio::test]
async fn test_length_limit_adjudicates_draw() {
    let settings = MatchSettings {
        max_plies: 2,
        ..fast_settings()
    };
    let record = play_game(
        &first_game(),
        &Opening::startpos(),
        &bot("A", "random"),
        &bot("B", "random"),
        &settings,
    )
    .await;
    assert_eq!(record.outcome, Outcome::Draw);
    assert_eq!(record.termination, Termination::LengthLimit);
    assert_eq!(record.plies, 2);
}

#[tokio::test]
async fn test_non_utf8_output_is_ignored() {
    let mut driver = EngineDriver::start(&bot("Noisy", "noisy")).unwrap();
    driver.handshake(Duration::from_secs(5)).await.unwrap();
    driver.set_position(&Opening::startpos(), &[]).await.unwrap();
    let reply = driver
        .request_move(Duration::from_millis(20), Duration::from_secs(2))
        .await
        .unwrap();
    let mv = reply.mv.expect("noisy bot still plays a move");
    assert!(GameBoard::default().play_uci(&mv).is_ok(), "{} is not legal", mv);
    driver.shutdown().await;

    let settings = MatchSettings {
        max_plies: 10,
        ..fast_settings()
    };
    let record = play_game(
        &first_game(),
        &Opening::startpos(),
        &bot("A", "random"),
        &bot("Noisy", "noisy"),
        &settings,
    )
    .await;
    assert!(
        !matches!(
            record.termination,
            Termination::Timeout | Termination::Crash | Termination::IllegalMove
        ),
        "unexpected {:?}",
        record.termination
    );
}

#[tokio::test]
async fn test_match_against_crashing_engine_accepts_h1_early() {
    let sprt = Sprt::new(SprtConfig {
        elo0: 0.0,
        elo1: 50.0,
        alpha: 0.05,
        beta: 0.05,
    })
    .unwrap();
    let settings = MatchSettings {
        games: 40,
        concurrency: 2,
        report_every: 2,
        ..fast_settings()
    };
    let scheduler = Scheduler::new(
        bot("Random", "random"),
        bot("Crash", "crash"),
        vec![Opening::startpos()],
        settings,
        sprt,
    )
    .unwrap();

    let mut progress_reports = 0;
    let outcome = scheduler.run(|_| progress_reports += 1).await;

    assert_eq!(outcome.status, RunStatus::Decided(MatchDecision::AcceptH1));
    assert!(outcome.dispatched < 40);
    assert_eq!(outcome.tally.games(), outcome.dispatched);
    assert_eq!(outcome.tally.a_wins, outcome.dispatched);
    assert_eq!(
        outcome.tally.terminations.get(Termination::Crash),
        outcome.dispatched
    );
    assert!(progress_reports >= 3);
}

#[tokio::test]
async fn test_budget_exhausted_is_inconclusive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("openings.epd");
    std::fs::write(
        &path,
        "startpos moves e2e4\n# comment\nnot a position\nstartpos moves d2d4 d7d5\n",
    )
    .unwrap();
    let openings = load_openings(&path).unwrap();
    assert_eq!(openings.len(), 2);

    let settings = MatchSettings {
        games: 4,
        max_plies: 30,
        concurrency: 2,
        ..fast_settings()
    };
    let scheduler = Scheduler::new(
        bot("A", "random"),
        bot("B", "random"),
        openings,
        settings,
        Sprt::new(SprtConfig::default()).unwrap(),
    )
    .unwrap();
    let outcome = scheduler.run(|_| {}).await;

    assert_eq!(outcome.status, RunStatus::Inconclusive);
    assert_eq!(outcome.dispatched, 4);
    assert_eq!(outcome.tally.games(), 4);
    assert_eq!(outcome.tally.lengths.iter().sum::<u32>(), 4);
}

#[tokio::test]
async fn test_empty_openings_file_rejected_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.epd");
    std::fs::write(&path, "\n# only comments\n; and more\n").unwrap();
    assert!(matches!(
        load_openings(&path),
        Err(ConfigError::NoOpenings(_))
    ));
}

#[tokio::test]
async fn test_preflight_reports_missing_binary() {
    assert!(preflight(&bot("Random", "random")).await.is_ok());
    let missing = EngineHandle::new("Ghost", "/nonexistent/engine");
    assert!(matches!(
        preflight(&missing).await,
        Err(DriverError::Spawn { .. })
    ));
}
