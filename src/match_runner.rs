//! Rating runs: the engine under test plays batch matches against a roster of rated opponents.
//!
//! The games themselves are played by an external batch tool (cutechess-cli style). Only its
//! summary line is read back:
//!
//! ```text
//! Score of MyEngine vs Glass1.3.exe: 3 - 1 - 1  [0.700] 5
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::{
    configuration::Configuration,
    error::{HarnessError, Result},
    rating_store::RatingStore,
};

const SUMMARY_PREFIX: &str = "Score of";

/// A rated opponent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Opponent {
    /// Key in the rating store.
    pub name: String,
    /// Command handed to the batch tool. Defaults to `name`.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Nominal rating.
    pub elo: i32,
}

fn default_protocol() -> String {
    "uci".to_string()
}

impl Opponent {
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }
}

/// Opponents, in the order they are played.
///
/// ```toml
/// [[opponent]]
/// name = "Glass1.3.exe"
/// elo = 2358
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Roster {
    #[serde(rename = "opponent", default)]
    pub opponents: Vec<Opponent>,
}

impl Roster {
    pub fn new(opponents: Vec<Opponent>) -> Self {
        Self { opponents }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Roster> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read roster '{}'", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid roster '{}'", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Roster> {
        Ok(toml::from_str(contents)?)
    }
}

/// Wins, losses and draws of the engine under test in one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchScore {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

/// Read the counts out of the last `Score of ...` line of a batch tool's output.
///
/// # Errors
/// [`HarnessError::MalformedSummary`] when no such line exists or its counts do not parse.
pub fn parse_summary(output: &str) -> Result<MatchScore> {
    let line = output
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with(SUMMARY_PREFIX))
        .ok_or_else(|| {
            HarnessError::MalformedSummary(output.lines().last().unwrap_or_default().to_string())
        })?;
    let malformed = || HarnessError::MalformedSummary(line.to_string());

    let (_, counts) = line.rsplit_once(':').ok_or_else(malformed)?;
    let counts: String = counts
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace('[', "-");
    let mut fields = counts.split('-').map(str::parse::<u32>);
    let (Some(Ok(wins)), Some(Ok(losses)), Some(Ok(draws))) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };
    Ok(MatchScore {
        wins,
        losses,
        draws,
    })
}

/// Plays one batch match and returns the tool's raw output.
pub trait MatchTool {
    fn play(&mut self, engine: &str, opponent: &Opponent) -> anyhow::Result<String>;
}

/// Runs `cutechess-cli` (or anything accepting its arguments).
#[derive(Debug, Clone)]
pub struct CutechessTool {
    program: String,
    games: u32,
    concurrency: usize,
    engine_dir: Option<PathBuf>,
    opening_book: Option<PathBuf>,
    log_dir: PathBuf,
    match_number: usize,
}

impl CutechessTool {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            program: config.batch_tool.clone(),
            games: config.games_per_match,
            concurrency: config.concurrency,
            engine_dir: config.engine_dir.clone(),
            opening_book: config.opening_book.clone(),
            log_dir: config.match_log_dir.clone(),
            match_number: 0,
        }
    }

    fn arguments(&self, engine: &str, opponent: &Opponent) -> Vec<String> {
        let mut args = vec![
            "-engine".to_string(),
            format!("cmd={engine}"),
            "proto=uci".to_string(),
            "-engine".to_string(),
            format!("cmd={}", opponent.command()),
            format!("proto={}", opponent.protocol),
            "-each".to_string(),
            "restart=on".to_string(),
        ];
        if let Some(dir) = &self.engine_dir {
            args.push(format!("dir={}", dir.display()));
        }
        args.extend([
            "tc=40/10".to_string(),
            "-games".to_string(),
            self.games.to_string(),
            "-concurrency".to_string(),
            self.concurrency.to_string(),
            "-recover".to_string(),
            "-wait".to_string(),
            "200".to_string(),
        ]);
        if let Some(book) = &self.opening_book {
            args.extend([
                "-openings".to_string(),
                format!("file={}", book.display()),
                "order=random".to_string(),
                "plies=16".to_string(),
            ]);
        }
        args
    }
}

impl MatchTool for CutechessTool {
    #[instrument(skip(self, opponent), fields(opponent = %opponent.name))]
    fn play(&mut self, engine: &str, opponent: &Opponent) -> anyhow::Result<String> {
        let args = self.arguments(engine, opponent);
        info!(program = %self.program, ?args, "launching batch match");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("could not launch '{}'", self.program))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("could not create '{}'", self.log_dir.display()))?;
        let log_file = self.log_dir.join(format!("match_{}.txt", self.match_number));
        self.match_number += 1;
        fs::write(&log_file, &stdout)
            .with_context(|| format!("could not write '{}'", log_file.display()))?;

        Ok(stdout)
    }
}

/// Round-robin over the roster, recording every match in the rating store.
pub struct MatchRunner<T: MatchTool> {
    engine: String,
    roster: Roster,
    tool: T,
    next: usize,
    verbose: bool,
}

impl<T: MatchTool> MatchRunner<T> {
    pub fn new(engine: impl Into<String>, roster: Roster, tool: T) -> Self {
        Self {
            engine: engine.into(),
            roster,
            tool,
            next: 0,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Play the next opponent, record the result and persist the store.
    ///
    /// Nothing is recorded when the summary is malformed.
    pub fn run_next(&mut self, store: &mut RatingStore) -> anyhow::Result<MatchScore> {
        if self.roster.opponents.is_empty() {
            bail!("the opponent roster is empty");
        }
        let opponent = &self.roster.opponents[self.next];
        self.next = (self.next + 1) % self.roster.opponents.len();

        let output = self.tool.play(&self.engine, opponent)?;
        let score = parse_summary(&output).inspect_err(|e| error!("{e}"))?;

        store.add_game_results(
            &self.engine,
            &opponent.name,
            opponent.elo,
            score.wins,
            score.losses,
            score.draws,
        )?;
        store
            .persist()
            .with_context(|| format!("could not persist '{}'", store.path().display()))?;

        if self.verbose {
            println!(
                "{} VS {}: {}-{}-{}",
                self.engine, opponent.name, score.wins, score.losses, score.draws
            );
        }
        Ok(score)
    }

    /// Cycle through the roster `max_rounds` times, or forever when `None`.
    #[instrument(skip_all, fields(engine = %self.engine))]
    pub fn run(&mut self, store: &mut RatingStore, max_rounds: Option<usize>) -> anyhow::Result<()> {
        let mut round = 0;
        while max_rounds.map_or(true, |max| round < max) {
            info!("round {}", round + 1);
            for _ in 0..self.roster.opponents.len().max(1) {
                self.run_next(store)?;
            }
            round += 1;
        }
        Ok(())
    }
}

/// Full rating run for `engine`: load the store, play the roster, then write the Elo tables.
///
/// The tables are only written when every match went through. After a failure the store still
/// holds every match recorded before it.
pub fn rating_run(config: &Configuration, engine: &str, roster: Roster) -> anyhow::Result<()> {
    let mut store =
        RatingStore::load(config.store_path()).context("refusing to start the rating run")?;
    let tool = CutechessTool::from_config(config);
    let mut runner = MatchRunner::new(engine, roster, tool).with_verbose(config.verbose());
    runner.run(&mut store, config.max_rounds())?;

    store
        .write_report(config.report_path())
        .context("could not write the Elo tables")
}
