//! Error taxonomy shared by the harness core.
//!
//! Every variant is fatal where it is detected: nothing in the harness retries a misbehaving
//! engine or a corrupt store.

use std::{path::PathBuf, time::Duration};

/// Errors raised by the codec, the engine protocol, the rating store and the match runner.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A FEN or serialized position could not be converted.
    #[error("malformed position: {0}")]
    Format(String),

    /// An engine terminated without any recognized sentinel in its output.
    #[error("engine '{engine}' violated the protocol, reply was: {reply:?}")]
    ProtocolViolation {
        /// Display name of the engine.
        engine: String,
        /// Everything the engine printed.
        reply: String,
    },

    /// The engine executable could not be launched.
    #[error("could not launch engine '{program}'")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The engine did not terminate before the configured move timeout.
    #[error("engine '{engine}' did not reply within {timeout:?}")]
    EngineTimeout {
        /// Display name of the engine.
        engine: String,
        /// Timeout that expired.
        timeout: Duration,
    },

    /// The rating store file is missing or not well-formed.
    #[error("rating store '{}' is unreadable: {reason}", path.display())]
    StoreUnreadable {
        /// Path of the store.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An Elo difference was requested for a record with no games.
    #[error("cannot compute an Elo difference from zero games")]
    DivideByZero,

    /// A cumulative win, loss or draw count no longer fits in the store.
    #[error("game counts of '{engine}' against '{opponent}' overflow")]
    CountOverflow {
        /// Engine under test.
        engine: String,
        /// Opponent whose entry overflowed.
        opponent: String,
    },

    /// The batch-match tool printed no parsable summary line.
    #[error("malformed match summary: {0:?}")]
    MalformedSummary(String),

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for the harness core.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
