//! Persistent engine → opponent → results mapping, and the Elo tables derived from it.
//!
//! The backing file is a single JSON object:
//!
//! ```json
//! { "MyEngine": { "Glass1.3.exe": { "ELO": "2358", "Wins": "3", "Losses": "1", "Draws": "1" } } }
//! ```
//!
//! All values are strings of integers.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{HarnessError, Result};

/// Cumulative results of one engine against one opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingEntry {
    /// Nominal rating of the opponent.
    #[serde(rename = "ELO", with = "int_string")]
    pub opponent_elo: i32,
    #[serde(rename = "Wins", with = "int_string")]
    pub wins: u32,
    #[serde(rename = "Losses", with = "int_string")]
    pub losses: u32,
    #[serde(rename = "Draws", with = "int_string")]
    pub draws: u32,
}

impl RatingEntry {
    pub fn new(opponent_elo: i32) -> Self {
        Self {
            opponent_elo,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }

    pub fn games(&self) -> u64 {
        self.wins as u64 + self.losses as u64 + self.draws as u64
    }

    /// Elo difference implied by this record. Fails on an empty record.
    pub fn elo_delta(&self) -> Result<EloDelta> {
        elo_delta(self.wins, self.losses, self.draws)
    }

    /// Opponent rating plus [`Self::elo_delta`]. Infinite deltas stay infinite.
    pub fn final_rating(&self) -> Result<EloDelta> {
        Ok(match self.elo_delta()? {
            EloDelta::Finite(diff) => EloDelta::Finite(self.opponent_elo.saturating_add(diff)),
            infinite => infinite,
        })
    }
}

/// Rating difference implied by a score.
///
/// A perfect or a null score has no finite Elo difference; those are reported as infinities.
/// Variants are ordered, so `NegInfinity < Finite(_) < PosInfinity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EloDelta {
    NegInfinity,
    Finite(i32),
    PosInfinity,
}

impl EloDelta {
    pub fn finite(self) -> Option<i32> {
        match self {
            EloDelta::Finite(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for EloDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EloDelta::NegInfinity => f.pad("-inf"),
            EloDelta::Finite(value) => f.pad(&value.to_string()),
            EloDelta::PosInfinity => f.pad("+inf"),
        }
    }
}

/// `round(-400 * log10(1 / score - 1))` with `score = (wins + draws / 2) / games`.
///
/// # Errors
/// [`HarnessError::DivideByZero`] when no game was played.
pub fn elo_delta(wins: u32, losses: u32, draws: u32) -> Result<EloDelta> {
    let games = wins as u64 + losses as u64 + draws as u64;
    if games == 0 {
        return Err(HarnessError::DivideByZero);
    }
    let score = (wins as f64 + 0.5 * draws as f64) / games as f64;
    if score <= 0.0 {
        return Ok(EloDelta::NegInfinity);
    }
    if score >= 1.0 {
        return Ok(EloDelta::PosInfinity);
    }
    let diff = -400.0 * (1.0 / score - 1.0).log10();
    Ok(EloDelta::Finite(diff.round() as i32))
}

/// The rating store, bound to its backing file.
#[derive(Debug, Clone)]
pub struct RatingStore {
    path: PathBuf,
    engines: BTreeMap<String, BTreeMap<String, RatingEntry>>,
}

impl RatingStore {
    /// An empty store that will be persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            engines: BTreeMap::new(),
        }
    }

    /// Read an existing store.
    ///
    /// # Errors
    /// [`HarnessError::StoreUnreadable`] when the file is missing or not a well-formed store.
    /// There is no fallback to an empty store.
    #[instrument]
    pub fn load(path: impl AsRef<Path> + fmt::Debug) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |reason: String| HarnessError::StoreUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let engines = serde_json::from_str(&contents).map_err(|e| unreadable(e.to_string()))?;
        info!("loaded rating store");
        Ok(Self {
            path: path.to_path_buf(),
            engines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, engine: &str, opponent: &str) -> Option<&RatingEntry> {
        self.engines.get(engine)?.get(opponent)
    }

    /// Engines in name order, each with its opponents in name order.
    pub fn engines(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, RatingEntry>)> {
        self.engines
            .iter()
            .map(|(name, opponents)| (name.as_str(), opponents))
    }

    /// Add a batch of results, creating the engine and the opponent on first sight.
    ///
    /// An existing opponent keeps the rating it was created with.
    ///
    /// # Errors
    /// [`HarnessError::CountOverflow`] when a total no longer fits; the entry is left unchanged.
    pub fn add_game_results(
        &mut self,
        engine: &str,
        opponent: &str,
        opponent_elo: i32,
        wins: u32,
        losses: u32,
        draws: u32,
    ) -> Result<()> {
        let opponents = self.engines.entry(engine.to_string()).or_insert_with(|| {
            info!("added engine {engine}");
            BTreeMap::new()
        });
        let entry = opponents.entry(opponent.to_string()).or_insert_with(|| {
            info!("added opponent {opponent} ({opponent_elo}) for {engine}");
            RatingEntry::new(opponent_elo)
        });
        let (Some(total_wins), Some(total_losses), Some(total_draws)) = (
            entry.wins.checked_add(wins),
            entry.losses.checked_add(losses),
            entry.draws.checked_add(draws),
        ) else {
            return Err(HarnessError::CountOverflow {
                engine: engine.to_string(),
                opponent: opponent.to_string(),
            });
        };
        entry.wins = total_wins;
        entry.losses = total_losses;
        entry.draws = total_draws;
        info!("added games {engine} VS {opponent}: {wins}-{losses}-{draws}");
        Ok(())
    }

    /// Replace the backing file with the current mapping.
    ///
    /// The previous file is copied aside first, then the new content is written to a sibling
    /// temporary file and renamed over the store, so the store on disk is always complete.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.engines).map_err(std::io::Error::from)?;

        if self.path.exists() {
            fs::copy(&self.path, sibling(&self.path, "bak"))?;
        }

        let tmp = sibling(&self.path, "tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("rating store persisted");
        Ok(())
    }

    /// Fixed-column Elo tables, one block per engine.
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        for (engine, opponents) in &self.engines {
            report.push_str(&row(engine, ["Win", "Loss", "Draw", "Elo", "Diff", "Final"]));

            let (mut wins, mut losses, mut draws) = (0, 0, 0);
            let mut finals = vec![];
            for (opponent, entry) in opponents {
                wins += entry.wins;
                losses += entry.losses;
                draws += entry.draws;

                // zero-game rows have no Elo difference
                let (diff, final_rating) = match (entry.elo_delta(), entry.final_rating()) {
                    (Ok(diff), Ok(final_rating)) => {
                        if let Some(value) = final_rating.finite() {
                            finals.push(value);
                        }
                        (diff.to_string(), final_rating.to_string())
                    }
                    _ => ("-".to_string(), "-".to_string()),
                };
                report.push_str(&row(
                    opponent,
                    [
                        &entry.wins.to_string(),
                        &entry.losses.to_string(),
                        &entry.draws.to_string(),
                        &entry.opponent_elo.to_string(),
                        &diff,
                        &final_rating,
                    ],
                ));
            }

            let average = if finals.is_empty() {
                "-".to_string()
            } else {
                let sum: i64 = finals.iter().map(|&f| f as i64).sum();
                ((sum as f64 / finals.len() as f64).round() as i64).to_string()
            };
            report.push_str(&row(
                "Average",
                [
                    &wins.to_string(),
                    &losses.to_string(),
                    &draws.to_string(),
                    "",
                    "",
                    &average,
                ],
            ));
            report.push('\n');
        }
        report
    }

    /// Write [`Self::generate_report`] to `path`.
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.generate_report())?;
        Ok(())
    }
}

fn row(name: &str, cells: [&str; 6]) -> String {
    let [win, loss, draw, elo, diff, final_rating] = cells;
    format!("{name:30}; {win:>4}; {loss:>4}; {draw:>4}; {elo:>5}; {diff:>5}; {final_rating:>7};\n")
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ratings".to_string());
    path.with_file_name(format!("{name}.{extension}"))
}

/// Integers stored as JSON strings.
mod int_string {
    use std::{fmt::Display, str::FromStr};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chess_harness_{}_{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join("DataBase.json")
    }

    #[test]
    fn test_elo_delta_reference_values() {
        assert_eq!(elo_delta(3, 1, 1).unwrap(), EloDelta::Finite(147));
        assert_eq!(elo_delta(5, 5, 0).unwrap(), EloDelta::Finite(0));
        assert_eq!(elo_delta(0, 0, 4).unwrap(), EloDelta::Finite(0));
        assert_eq!(elo_delta(1, 3, 1).unwrap(), EloDelta::Finite(-147));
    }

    #[test]
    fn test_elo_delta_extremes() {
        assert_eq!(elo_delta(4, 0, 0).unwrap(), EloDelta::PosInfinity);
        assert_eq!(elo_delta(0, 4, 0).unwrap(), EloDelta::NegInfinity);
        assert!(matches!(elo_delta(0, 0, 0), Err(HarnessError::DivideByZero)));
    }

    #[test]
    fn test_elo_delta_monotonic_in_wins() {
        for (losses, draws) in [(0, 0), (3, 0), (2, 5), (10, 1)] {
            let deltas: Vec<_> = (0..20)
                .filter(|wins| wins + losses + draws > 0)
                .map(|wins| elo_delta(wins, losses, draws).unwrap())
                .collect();
            assert!(deltas.windows(2).all(|w| w[0] <= w[1]), "{deltas:?}");
        }
    }

    #[test]
    fn test_add_game_results_accumulates() {
        let mut store = RatingStore::new("unused.json");
        store.add_game_results("E", "O", 2100, 3, 1, 1).unwrap();
        store.add_game_results("E", "O", 2300, 3, 1, 1).unwrap();

        assert_eq!(store.engines().count(), 1);
        let entry = store.entry("E", "O").unwrap();
        assert_eq!(
            *entry,
            RatingEntry {
                opponent_elo: 2100,
                wins: 6,
                losses: 2,
                draws: 2,
            }
        );
    }

    #[test]
    fn test_counts_near_the_limit() {
        let path = temp_path("huge");
        fs::write(
            &path,
            r#"{"E": {"O": {"ELO": "2100", "Wins": "4294967295", "Losses": "1", "Draws": "0"}}}"#,
        )
        .unwrap();
        let mut store = RatingStore::load(&path).unwrap();

        let entry = *store.entry("E", "O").unwrap();
        assert_eq!(entry.games(), 4_294_967_296);
        assert_eq!(entry.elo_delta().unwrap(), EloDelta::Finite(3853));
        let report = store.generate_report();
        assert!(report.lines().nth(1).unwrap().contains("4294967295"));

        assert!(matches!(
            store.add_game_results("E", "O", 2100, 1, 0, 0),
            Err(HarnessError::CountOverflow { .. })
        ));
        assert_eq!(*store.entry("E", "O").unwrap(), entry);
    }

    #[test]
    fn test_final_rating() {
        let mut store = RatingStore::new("unused.json");
        store.add_game_results("E", "O", 2100, 3, 1, 1).unwrap();
        let entry = store.entry("E", "O").unwrap();
        assert_eq!(entry.elo_delta().unwrap(), EloDelta::Finite(147));
        assert_eq!(entry.final_rating().unwrap(), EloDelta::Finite(2247));
    }

    #[test]
    fn test_report() {
        let mut store = RatingStore::new("unused.json");
        store.add_game_results("E", "Zeta", 2000, 2, 2, 0).unwrap();
        store.add_game_results("E", "Alpha", 2100, 3, 1, 1).unwrap();
        store.add_game_results("E", "Empty", 1900, 0, 0, 0).unwrap();
        store.add_game_results("E", "Crushed", 1500, 5, 0, 0).unwrap();

        let report = store.generate_report();
        let lines: Vec<_> = report.lines().collect();
        assert!(lines[0].starts_with("E "));
        assert!(lines[0].contains("Final"));
        assert!(lines[1].starts_with("Alpha"));
        assert!(lines[1].contains(" 147;") && lines[1].contains(" 2247;"));
        assert!(lines[2].starts_with("Crushed") && lines[2].contains("+inf"));
        assert!(lines[3].starts_with("Empty") && lines[3].contains("    -;"));
        assert!(lines[4].starts_with("Zeta") && lines[4].contains(" 2000;"));
        // (2247 + 2000) / 2
        assert!(lines[5].starts_with("Average") && lines[5].ends_with("   2124;"));
    }

    #[test]
    fn test_persist_and_load() {
        let path = temp_path("persist");
        let mut store = RatingStore::new(&path);
        store.add_game_results("E", "O", 2100, 3, 1, 1).unwrap();
        store.persist().unwrap();
        store.add_game_results("E", "O", 2100, 1, 0, 0).unwrap();
        store.persist().unwrap();

        let loaded = RatingStore::load(&path).unwrap();
        assert_eq!(loaded.entry("E", "O").unwrap().wins, 4);
        assert!(!sibling(&path, "tmp").exists());
        let backup = RatingStore::load(sibling(&path, "bak")).unwrap();
        assert_eq!(backup.entry("E", "O").unwrap().wins, 3);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["E"]["O"]["ELO"], "2100");
        assert_eq!(raw["E"]["O"]["Draws"], "1");
    }

    #[test]
    fn test_load_failures() {
        let path = temp_path("corrupt");
        assert!(matches!(
            RatingStore::load(path.with_file_name("missing.json")),
            Err(HarnessError::StoreUnreadable { .. })
        ));
        fs::write(&path, "{\"E\": {\"O\": {\"ELO\": \"abc\"}}}").unwrap();
        assert!(matches!(
            RatingStore::load(&path),
            Err(HarnessError::StoreUnreadable { .. })
        ));
    }
}
