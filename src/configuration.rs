//! Config for the harness behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] and the `with_*`
//! methods, or by reading environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive; set them to `"true"` to enable them.
//!
//! - `HARNESS_VERBOSE`: Print progress to stdout (default: `true`)
//! - `HARNESS_LOG`: Write a tracing log file (default: `false`)
//! - `HARNESS_MOVE_TIMEOUT_MS`: Kill an engine that thinks longer than this (default: no limit)
//! - `HARNESS_RESULT_LOG`: Self-play result log (default: `output.txt`)
//! - `HARNESS_STORE`: Rating store (default: `DataBase.json`)
//! - `HARNESS_REPORT`: Elo tables (default: `EloTables.txt`)
//! - `HARNESS_START_FEN`: Self-play starting position (default: the standard initial position)
//! - `HARNESS_BATCH_TOOL`: Batch match program (default: `cutechess-cli`)
//! - `HARNESS_GAMES`: Games per rating match (default: `10`)
//! - `HARNESS_CONCURRENCY`: Concurrent games in a rating match (default: physical CPU count)
//! - `HARNESS_ENGINE_DIR`: Working directory handed to the batch tool for every engine
//! - `HARNESS_BOOK`: Opening book for rating matches (default: none)
//! - `HARNESS_MATCH_LOGS`: Where raw batch tool output is kept (default: `Logs`)
//! - `HARNESS_ROUNDS`: Passes over the roster before stopping (default: run until stopped)

use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Configuration for harness behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) exit_on_completion: bool,
    pub(crate) move_timeout: Option<Duration>,
    pub(crate) result_log: PathBuf,
    pub(crate) store_path: PathBuf,
    pub(crate) report_path: PathBuf,
    pub(crate) start_fen: Option<String>,
    pub(crate) batch_tool: String,
    pub(crate) games_per_match: u32,
    pub(crate) concurrency: usize,
    pub(crate) engine_dir: Option<PathBuf>,
    pub(crate) opening_book: Option<PathBuf>,
    pub(crate) match_log_dir: PathBuf,
    pub(crate) max_rounds: Option<usize>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Progress is printed to stdout, no log file is written.
    /// - The harness does not exit right after a self-play game.
    /// - Engines may think for as long as they like.
    /// - Results go to `output.txt`, ratings to `DataBase.json`, tables to `EloTables.txt`.
    /// - Rating matches are 10 games on every physical CPU, forever.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            exit_on_completion: false,
            move_timeout: None,
            result_log: PathBuf::from("output.txt"),
            store_path: PathBuf::from("DataBase.json"),
            report_path: PathBuf::from("EloTables.txt"),
            start_fen: None,
            batch_tool: "cutechess-cli".to_string(),
            games_per_match: 10,
            concurrency: num_cpus::get_physical(),
            engine_dir: None,
            opening_book: None,
            match_log_dir: PathBuf::from("Logs"),
            max_rounds: None,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    ///
    /// Unset or unparsable variables leave the default value in place.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn parse<T: FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.parse().ok()
        }

        let default = Self::new();
        Self {
            verbose: get_env_flag("HARNESS_VERBOSE", default.verbose),
            log: get_env_flag("HARNESS_LOG", default.log),
            exit_on_completion: default.exit_on_completion,
            move_timeout: parse("HARNESS_MOVE_TIMEOUT_MS").map(Duration::from_millis),
            result_log: parse("HARNESS_RESULT_LOG").unwrap_or(default.result_log),
            store_path: parse("HARNESS_STORE").unwrap_or(default.store_path),
            report_path: parse("HARNESS_REPORT").unwrap_or(default.report_path),
            start_fen: env::var("HARNESS_START_FEN").ok(),
            batch_tool: env::var("HARNESS_BATCH_TOOL").unwrap_or(default.batch_tool),
            games_per_match: parse("HARNESS_GAMES").unwrap_or(default.games_per_match),
            concurrency: parse("HARNESS_CONCURRENCY").unwrap_or(default.concurrency),
            engine_dir: parse("HARNESS_ENGINE_DIR"),
            opening_book: parse("HARNESS_BOOK"),
            match_log_dir: parse("HARNESS_MATCH_LOGS").unwrap_or(default.match_log_dir),
            max_rounds: parse("HARNESS_ROUNDS"),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Exit as soon as a self-play game has been logged.
    pub fn with_exit_on_completion(mut self, value: bool) -> Self {
        self.exit_on_completion = value;
        self
    }

    /// Kill engines that have not answered after `timeout`. `None` disables the limit.
    pub fn with_move_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.move_timeout = timeout;
        self
    }

    pub fn with_result_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_log = path.into();
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Start self-play games from this FEN instead of the initial position.
    pub fn with_start_fen(mut self, fen: Option<String>) -> Self {
        self.start_fen = fen;
        self
    }

    pub fn with_batch_tool(mut self, program: impl Into<String>) -> Self {
        self.batch_tool = program.into();
        self
    }

    pub fn with_games_per_match(mut self, games: u32) -> Self {
        self.games_per_match = games;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_engine_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.engine_dir = dir;
        self
    }

    pub fn with_opening_book(mut self, book: Option<PathBuf>) -> Self {
        self.opening_book = book;
        self
    }

    pub fn with_match_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.match_log_dir = dir.into();
        self
    }

    /// Stop after this many passes over the roster. `None` runs until an error.
    pub fn with_max_rounds(mut self, rounds: Option<usize>) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn log(&self) -> bool {
        self.log
    }

    pub fn exit_on_completion(&self) -> bool {
        self.exit_on_completion
    }

    pub fn move_timeout(&self) -> Option<Duration> {
        self.move_timeout
    }

    pub fn result_log_path(&self) -> &std::path::Path {
        &self.result_log
    }

    pub fn store_path(&self) -> &std::path::Path {
        &self.store_path
    }

    pub fn report_path(&self) -> &std::path::Path {
        &self.report_path
    }

    pub fn max_rounds(&self) -> Option<usize> {
        self.max_rounds
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
