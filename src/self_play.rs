//! One game between two engine executables, appended to the result log.
//!
//! Engine A always plays white. The logged score is from engine A's point of view:
//!
//! ```text
//! engines/a VS engines/b Result= 0.5
//! ```

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
    sync::mpsc::Sender,
};

use anyhow::Context;
use tracing::{info, instrument};

use crate::{
    board_codec::{decode_fen, encode, Color, Position},
    configuration::Configuration,
    engine_process::{EngineCommand, EngineProcess},
    game_session::{GameSession, GameState, SessionEvent},
};

pub struct SelfPlay {
    engine_a: EngineProcess,
    engine_b: EngineProcess,
    start_fen: Option<String>,
    result_log: std::path::PathBuf,
}

impl SelfPlay {
    /// `engine_a` plays white. The configured move timeout is applied to both engines.
    pub fn new(config: &Configuration, engine_a: EngineProcess, engine_b: EngineProcess) -> Self {
        Self {
            engine_a: engine_a.with_timeout(config.move_timeout),
            engine_b: engine_b.with_timeout(config.move_timeout),
            start_fen: config.start_fen.clone(),
            result_log: config.result_log.clone(),
        }
    }

    /// Engines given as executable paths, named after those paths.
    pub fn from_paths(config: &Configuration, engine_a: &str, engine_b: &str) -> Self {
        Self::new(
            config,
            EngineProcess::new(engine_a, EngineCommand::new(engine_a)),
            EngineProcess::new(engine_b, EngineCommand::new(engine_b)),
        )
    }

    /// Serialized starting position and the side to move in it.
    pub fn start_position(&self) -> anyhow::Result<(String, Color)> {
        let position = match &self.start_fen {
            Some(fen) => decode_fen(fen).context("invalid starting FEN")?,
            None => Position::starting(),
        };
        Ok((encode(&position), position.side_to_move))
    }

    /// Play one game to the end and log its result.
    ///
    /// Nothing is logged if the game does not reach a terminal state.
    #[instrument(skip_all, fields(white = self.engine_a.name(), black = self.engine_b.name()))]
    pub fn play(&mut self, events: Option<Sender<SessionEvent>>) -> anyhow::Result<GameState> {
        let (position, side) = self.start_position()?;
        let mut session = GameSession::new(position, side);
        if let Some(events) = events {
            session = session.with_events(events);
        }

        let state = session
            .play(&mut self.engine_a, &mut self.engine_b)
            .context("game aborted")?;

        log_result(
            &self.result_log,
            self.engine_a.name(),
            self.engine_b.name(),
            state.score(Color::White),
        )?;
        info!(%state, "result logged");
        Ok(state)
    }
}

/// `<engine_a> VS <engine_b> Result= <score>`
pub fn result_line(engine_a: &str, engine_b: &str, score: f64) -> String {
    format!("{engine_a} VS {engine_b} Result= {score}")
}

/// Append one result line to `path`, creating it if needed.
pub fn log_result(path: &Path, engine_a: &str, engine_b: &str, score: f64) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open result log '{}'", path.display()))?;
    writeln!(file, "{}", result_line(engine_a, engine_b, score))
        .with_context(|| format!("could not write result log '{}'", path.display()))
}
