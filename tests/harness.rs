#![cfg(unix)]

use std::{
    fs,
    path::PathBuf,
    sync::mpsc,
    time::{Duration, Instant},
};

use chess_harness::{
    error::HarnessError,
    match_runner::{rating_run, MatchScore},
    prelude::*,
};
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

struct CustomLevelFilter;
impl<S> Filter<S> for CustomLevelFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::DEBUG
    }
}

fn init_debug_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_test_writer()
            .with_filter(CustomLevelFilter),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

fn fake_engine(script: &str) -> EngineProcess {
    let path = format!("{}/tests/fake_engines/{script}", env!("CARGO_MANIFEST_DIR"));
    EngineProcess::new(script, EngineCommand::new("sh").with_args([path]))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chess_harness_it_{}_{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(name: &str) -> Configuration {
    Configuration::new()
        .with_verbose(false)
        .with_exit_on_completion(true)
        .with_result_log(scratch_dir(name).join("output.txt"))
}

#[test]
fn self_play_checkmate_is_logged() {
    init_debug_logger();
    let config = config("checkmate");
    let mut self_play = SelfPlay::new(&config, fake_engine("mate_in_one.sh"), fake_engine("mate_in_one.sh"));

    let (sender, receiver) = mpsc::channel();
    let state = self_play.play(Some(sender)).unwrap();
    assert_eq!(state, GameState::Checkmate(Color::White));

    let events: Vec<SessionEvent> = receiver.iter().collect();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        SessionEvent::MovePlayed { ply: 1, side: Color::White, .. }
    ));
    assert_eq!(events[1], SessionEvent::Finished(GameState::Checkmate(Color::White)));

    let log = fs::read_to_string(config.result_log_path()).unwrap();
    assert_eq!(log, "mate_in_one.sh VS mate_in_one.sh Result= 1\n");
}

#[test]
fn self_play_results_are_appended() {
    init_debug_logger();
    let config = config("append");
    SelfPlay::new(&config, fake_engine("shuffle.sh"), fake_engine("shuffle.sh"))
        .play(None)
        .unwrap();
    let state = SelfPlay::new(&config, fake_engine("stalemate.sh"), fake_engine("shuffle.sh"))
        .play(None)
        .unwrap();
    assert_eq!(state, GameState::Stalemate);

    let log = fs::read_to_string(config.result_log_path()).unwrap();
    assert_eq!(
        log,
        "shuffle.sh VS shuffle.sh Result= 0.5\nstalemate.sh VS shuffle.sh Result= 0.5\n"
    );
}

#[test]
fn repetition_ends_the_game() {
    init_debug_logger();
    let mut session = GameSession::new(encode(&Position::starting()), Color::White);
    let state = session
        .play(&mut fake_engine("shuffle.sh"), &mut fake_engine("shuffle.sh"))
        .unwrap();
    assert_eq!(state, GameState::DrawByRepetition);
    assert_eq!(session.history().len(), 7);
}

#[test]
fn garbage_reply_aborts_without_logging() {
    init_debug_logger();
    let config = config("garbage");
    let err = SelfPlay::new(&config, fake_engine("garbage.sh"), fake_engine("shuffle.sh"))
        .play(None)
        .unwrap_err();
    match err.downcast_ref::<HarnessError>() {
        Some(HarnessError::ProtocolViolation { engine, reply }) => {
            assert_eq!(engine, "garbage.sh");
            assert_eq!(reply.trim(), "e2e4");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!config.result_log_path().exists());
}

#[test]
fn slow_engine_is_killed() {
    init_debug_logger();
    let engine = fake_engine("slow.sh").with_timeout(Some(Duration::from_millis(200)));
    let start = Instant::now();
    let err = engine
        .request_move(&encode(&Position::starting()), Color::White)
        .unwrap_err();
    assert!(matches!(err, HarnessError::EngineTimeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[test]
fn rating_run_through_batch_tool() {
    init_debug_logger();
    let dir = scratch_dir("rating");
    let tool_path = format!("{}/tests/fake_engines/cutechess.sh", env!("CARGO_MANIFEST_DIR"));
    let config = Configuration::new()
        .with_verbose(false)
        .with_batch_tool(tool_path)
        .with_match_log_dir(dir.join("Logs"))
        .with_store_path(dir.join("DataBase.json"));
    let roster = Roster::from_toml("[[opponent]]\nname = \"O\"\nelo = 2100\n").unwrap();

    let mut store = RatingStore::new(config.store_path());
    let mut runner = MatchRunner::new("E", roster, CutechessTool::from_config(&config));
    let score = runner.run_next(&mut store).unwrap();
    assert_eq!(
        score,
        MatchScore {
            wins: 3,
            losses: 1,
            draws: 1
        }
    );
    assert!(dir.join("Logs").join("match_0.txt").exists());

    let store = RatingStore::load(config.store_path()).unwrap();
    let entry = store.entry("E", "O").unwrap();
    assert_eq!(entry.final_rating().unwrap(), EloDelta::Finite(2247));

    store.write_report(dir.join("EloTables.txt")).unwrap();
    let report = fs::read_to_string(dir.join("EloTables.txt")).unwrap();
    assert!(report.contains("2247"));
}

fn rating_config(name: &str, tool: &str) -> Configuration {
    let dir = scratch_dir(name);
    let _ = fs::remove_file(dir.join("EloTables.txt"));
    fs::write(dir.join("DataBase.json"), "{}").unwrap();
    Configuration::new()
        .with_verbose(false)
        .with_batch_tool(format!("{}/tests/fake_engines/{tool}", env!("CARGO_MANIFEST_DIR")))
        .with_match_log_dir(dir.join("Logs"))
        .with_store_path(dir.join("DataBase.json"))
        .with_report_path(dir.join("EloTables.txt"))
        .with_max_rounds(Some(1))
}

#[test]
fn completed_rating_run_writes_tables() {
    init_debug_logger();
    let config = rating_config("rating_ok", "cutechess.sh");
    let roster = Roster::from_toml("[[opponent]]\nname = \"O\"\nelo = 2100\n").unwrap();

    rating_run(&config, "E", roster).unwrap();

    let report = fs::read_to_string(config.report_path()).unwrap();
    assert!(report.contains("2247"));
}

#[test]
fn failed_rating_run_writes_no_tables() {
    init_debug_logger();
    let config = rating_config("rating_crashed", "crashed_tool.sh");
    let roster = Roster::from_toml("[[opponent]]\nname = \"O\"\nelo = 2100\n").unwrap();

    let err = rating_run(&config, "E", roster).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HarnessError>(),
        Some(HarnessError::MalformedSummary(_))
    ));
    assert!(!config.report_path().exists());
    assert!(RatingStore::load(config.store_path()).unwrap().entry("E", "O").is_none());
}
