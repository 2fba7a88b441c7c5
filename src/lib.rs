//! # Chess Harness
//!
//! Tooling around chess engines that are shipped as plain executables.
//!
//! It provides:
//! - A compact 136 character board serialization and a FEN converter (`board_codec`)
//! - A one-shot engine protocol: spawn, read one reply, reap (`engine_process`)
//! - Game arbitration with repetition detection (`game_session`, `self_play`)
//! - A JSON store of match results with Elo estimates and text reports (`rating_store`)
//! - An unattended rating loop driving an external batch match tool (`match_runner`)
//!
//! # Engine Protocol
//!
//! An engine is started once per move with two extra arguments: the serialized position and the
//! side to move (`0` white, `1` black). It prints a single reply on stdout and exits:
//!
//! - `NEWBOARD=<position>`: the position after its move
//! - `CHECKMATE`: the side to move is mated
//! - `STALEMATE`: the side to move has no legal move and is not in check
//!
//! # Usage Example
//!
//! ```no_run
//! use chess_harness::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_exit_on_completion(true);
//!     let mut self_play = SelfPlay::from_paths(&config, "engines/alpha", "engines/beta");
//!     let state = self_play.play(None)?;
//!     println!("{state}");
//!     Ok(())
//! }
//! ```

pub use anyhow;
pub mod board_codec;
pub mod configuration;
pub mod engine_process;
pub mod error;
pub mod game_session;
pub mod logger;
pub mod match_runner;
pub mod rating_store;
pub mod self_play;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use chess_harness::prelude::*;
/// ```
pub mod prelude {
    pub use crate::board_codec::{decode_fen, encode, Color, Position};
    pub use crate::configuration::Configuration;
    pub use crate::engine_process::{EngineCommand, EngineProcess, EngineReply};
    pub use crate::error::HarnessError;
    pub use crate::game_session::{GameSession, GameState, MoveOracle, SessionEvent};
    pub use crate::match_runner::{CutechessTool, MatchRunner, MatchTool, Roster};
    pub use crate::rating_store::{EloDelta, RatingStore};
    pub use crate::self_play::SelfPlay;
}
