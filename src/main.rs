//! Chess harness CLI
//!
//! Self-play between two engines, unattended rating runs, and Elo reports.

use std::{
    env, io,
    process::ExitCode,
    sync::mpsc,
    thread,
};

use anyhow::{bail, Context};
use chess_harness::{
    board_codec::Position,
    configuration::Configuration,
    game_session::SessionEvent,
    logger::init_logger,
    match_runner::{rating_run, Roster},
    rating_store::RatingStore,
    self_play::SelfPlay,
};
use tracing::error;

fn print_usage() {
    println!("Chess harness");
    println!();
    println!("Usage:");
    println!("  chess-harness selfplay <engineA> <engineB> [exit-flag]");
    println!("  chess-harness rate <engine> <roster.toml>");
    println!("  chess-harness report");
    println!();
    println!("Engine A plays white. With any non-empty exit flag, self-play returns as soon as the");
    println!("result is logged instead of waiting for Enter.");
    println!("Everything else is configured through HARNESS_* environment variables.");
}

fn run_self_play(config: Configuration, args: &[String]) -> anyhow::Result<()> {
    let [engine_a, engine_b, rest @ ..] = args else {
        bail!("selfplay requires two engine executables");
    };
    let config = config.with_exit_on_completion(exit_flag(rest));

    let (sender, receiver) = mpsc::channel();
    let verbose = config.verbose();
    let presenter = thread::spawn(move || {
        let mut last = None;
        for event in receiver {
            match event {
                SessionEvent::MovePlayed {
                    ply,
                    side,
                    position,
                } => {
                    if verbose {
                        println!("ply {ply}: {side} moved");
                        match Position::decode(&position) {
                            Ok(board) => println!("{board}"),
                            Err(_) => println!("{position}"),
                        }
                    }
                    last = Some(position);
                }
                SessionEvent::Finished(state) => {
                    if verbose {
                        println!("{state}");
                    }
                }
            }
        }
        last
    });

    let mut self_play = SelfPlay::from_paths(&config, engine_a, engine_b);
    let result = self_play.play(Some(sender));
    let last = presenter.join().ok().flatten();
    let state = result?;
    println!("{engine_a} VS {engine_b}: {state}");

    if !config.exit_on_completion() {
        if let Some(board) = last.as_deref().and_then(|p| Position::decode(p).ok()) {
            println!("{board}");
        }
        println!("Press Enter to exit");
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
    }
    Ok(())
}

/// Any non-empty third argument asks self-play to exit once the result is logged.
fn exit_flag(rest: &[String]) -> bool {
    rest.first().is_some_and(|flag| !flag.is_empty())
}

fn run_rating(config: Configuration, args: &[String]) -> anyhow::Result<()> {
    let [engine, roster_path, ..] = args else {
        bail!("rate requires an engine and a roster file");
    };
    let roster = Roster::load(roster_path)?;
    rating_run(&config, engine, roster)
}

fn run_report(config: Configuration) -> anyhow::Result<()> {
    let store = RatingStore::load(config.store_path())?;
    store
        .write_report(config.report_path())
        .context("could not write the Elo tables")?;
    if config.verbose() {
        print!("{}", store.generate_report());
    }
    Ok(())
}

fn run(args: &[String]) -> anyhow::Result<()> {
    let config = Configuration::from_env();
    if config.log() {
        init_logger()?;
    }

    match args.first().map(String::as_str) {
        Some("selfplay") => run_self_play(config, &args[1..]),
        Some("rate") => run_rating(config, &args[1..]),
        Some("report") => run_report(config),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
