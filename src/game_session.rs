//! Game state machine driving two engine oracles to a terminal state.
//!
//! The session only knows serialized positions; it never inspects the board. Legality, mate and
//! stalemate detection are the engines' business. The session owns the move history and the
//! draw-by-repetition rule.

use std::{collections::HashMap, fmt, sync::mpsc::Sender};

use tracing::{debug, info, instrument, trace};

use crate::{
    board_codec::Color,
    engine_process::EngineReply,
    error::{HarnessError, Result},
};

/// Number of occurrences of one (position, side to move) pair that ends the game.
pub const REPETITION_LIMIT: usize = 4;

/// Anything that can answer "what do you play here?".
pub trait MoveOracle {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Answer for `side` in the serialized `position`.
    ///
    /// Implementations should not return [`EngineReply::Malformed`], but the session treats it as
    /// a protocol violation if they do.
    fn request_move(&mut self, position: &str, side: Color) -> Result<EngineReply>;
}

/// State of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Ongoing,
    /// Holds the winner.
    Checkmate(Color),
    Stalemate,
    DrawByRepetition,
}

impl GameState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameState::Ongoing)
    }

    /// Points earned by `color`: 1 for a win, 0.5 for a draw, 0 for a loss.
    ///
    /// An ongoing game is scored as a draw.
    pub fn score(&self, color: Color) -> f64 {
        match self {
            GameState::Checkmate(winner) if *winner == color => 1.0,
            GameState::Checkmate(_) => 0.0,
            _ => 0.5,
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameState::Ongoing => write!(f, "ongoing"),
            GameState::Checkmate(winner) => write!(f, "checkmate, {winner} wins"),
            GameState::Stalemate => write!(f, "stalemate"),
            GameState::DrawByRepetition => write!(f, "draw by repetition"),
        }
    }
}

/// Transitions published to whoever presents the game.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// `side` moved, leading to `position`.
    MovePlayed {
        ply: usize,
        side: Color,
        position: String,
    },
    Finished(GameState),
}

/// Positions visited during a game, each paired with the side to move.
#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    entries: Vec<(String, Color)>,
}

impl GameRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, position: String, side_to_move: Color) {
        self.entries.push((position, side_to_move));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when any entry occurs at least `limit` times.
    pub fn has_repetition(&self, limit: usize) -> bool {
        let mut counts: HashMap<(&str, Color), usize> = HashMap::new();
        for (position, side) in &self.entries {
            let count = counts.entry((position.as_str(), *side)).or_default();
            *count += 1;
            if *count >= limit {
                return true;
            }
        }
        false
    }
}

/// One game between two oracles.
pub struct GameSession {
    position: String,
    side_to_move: Color,
    state: GameState,
    history: GameRecord,
    events: Option<Sender<SessionEvent>>,
}

impl GameSession {
    pub fn new(start_position: impl Into<String>, side_to_move: Color) -> Self {
        Self {
            position: start_position.into(),
            side_to_move,
            state: GameState::Ongoing,
            history: GameRecord::new(),
            events: None,
        }
    }

    /// Publish every transition on `events`. A dropped receiver is ignored.
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn position(&self) -> &str {
        &self.position
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn history(&self) -> &GameRecord {
        &self.history
    }

    /// Advance by at most one ply, asking `oracle` for the side to move.
    ///
    /// The repetition rule is checked before the oracle is consulted. A terminal session is
    /// returned as is.
    ///
    /// # Errors
    /// Oracle failures are passed through; a [`EngineReply::Malformed`] reply becomes
    /// [`HarnessError::ProtocolViolation`]. The session is left unchanged in both cases.
    pub fn step(&mut self, oracle: &mut dyn MoveOracle) -> Result<GameState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }

        if self.history.has_repetition(REPETITION_LIMIT) {
            debug!("position repeated {REPETITION_LIMIT} times");
            return Ok(self.finish(GameState::DrawByRepetition));
        }

        let side = self.side_to_move;
        trace!(engine = oracle.name(), %side, "requesting move");
        match oracle.request_move(&self.position, side)? {
            EngineReply::Checkmate => Ok(self.finish(GameState::Checkmate(side.other()))),
            EngineReply::Stalemate => Ok(self.finish(GameState::Stalemate)),
            EngineReply::Move(next) => {
                self.side_to_move = side.other();
                self.position = next;
                self.history.push(self.position.clone(), self.side_to_move);
                self.publish(SessionEvent::MovePlayed {
                    ply: self.history.len(),
                    side,
                    position: self.position.clone(),
                });
                Ok(self.state)
            }
            EngineReply::Malformed(reply) => Err(HarnessError::ProtocolViolation {
                engine: oracle.name().to_string(),
                reply,
            }),
        }
    }

    /// Play until a terminal state, `white` and `black` answering for their side.
    #[instrument(skip_all, fields(white = white.name(), black = black.name()))]
    pub fn play(
        &mut self,
        white: &mut dyn MoveOracle,
        black: &mut dyn MoveOracle,
    ) -> Result<GameState> {
        while !self.state.is_terminal() {
            match self.side_to_move {
                Color::White => self.step(white)?,
                Color::Black => self.step(black)?,
            };
        }
        info!(plies = self.history.len(), result = %self.state, "game over");
        Ok(self.state)
    }

    fn finish(&mut self, state: GameState) -> GameState {
        self.state = state;
        self.publish(SessionEvent::Finished(state));
        state
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::mpsc};

    use super::*;

    /// Replays canned replies and records what it was asked.
    struct Scripted {
        name: String,
        replies: VecDeque<EngineReply>,
        asked: Vec<(String, Color)>,
    }

    impl Scripted {
        fn new(name: &str, replies: Vec<EngineReply>) -> Self {
            Self {
                name: name.to_string(),
                replies: replies.into(),
                asked: vec![],
            }
        }
    }

    impl MoveOracle for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn request_move(&mut self, position: &str, side: Color) -> Result<EngineReply> {
            self.asked.push((position.to_string(), side));
            Ok(self
                .replies
                .pop_front()
                .expect("scripted oracle ran out of replies"))
        }
    }

    fn mv(position: &str) -> EngineReply {
        EngineReply::Move(position.to_string())
    }

    #[test]
    fn test_move_then_checkmate() {
        let mut white = Scripted::new("white", vec![mv("pos2")]);
        let mut black = Scripted::new("black", vec![EngineReply::Checkmate]);
        let mut session = GameSession::new("pos1", Color::White);

        let state = session.play(&mut white, &mut black).unwrap();

        assert_eq!(state, GameState::Checkmate(Color::White));
        assert_eq!(state.score(Color::White), 1.0);
        assert_eq!(state.score(Color::Black), 0.0);
        assert_eq!(white.asked, vec![("pos1".to_string(), Color::White)]);
        assert_eq!(black.asked, vec![("pos2".to_string(), Color::Black)]);
    }

    #[test]
    fn test_stalemate_is_a_draw() {
        let mut white = Scripted::new("white", vec![EngineReply::Stalemate]);
        let mut black = Scripted::new("black", vec![]);
        let mut session = GameSession::new("pos1", Color::White);

        let state = session.play(&mut white, &mut black).unwrap();
        assert_eq!(state, GameState::Stalemate);
        assert_eq!(state.score(Color::White), 0.5);
        assert_eq!(state.score(Color::Black), 0.5);
    }

    #[test]
    fn test_black_starts() {
        let mut white = Scripted::new("white", vec![EngineReply::Checkmate]);
        let mut black = Scripted::new("black", vec![mv("pos2")]);
        let mut session = GameSession::new("pos1", Color::Black);

        let state = session.play(&mut white, &mut black).unwrap();
        assert_eq!(state, GameState::Checkmate(Color::Black));
    }

    #[test]
    fn test_repetition_threshold() {
        let mut record = GameRecord::new();
        for _ in 0..3 {
            record.push("a".to_string(), Color::White);
            record.push("b".to_string(), Color::Black);
        }
        assert!(!record.has_repetition(REPETITION_LIMIT));
        // same board, other side to move: a different entry
        record.push("a".to_string(), Color::Black);
        assert!(!record.has_repetition(REPETITION_LIMIT));
        record.push("a".to_string(), Color::White);
        assert!(record.has_repetition(REPETITION_LIMIT));
    }

    #[test]
    fn test_draw_by_repetition_skips_pending_reply() {
        // a shuffles to b and back; after the fourth arrival at "b" the game is drawn
        let mut white = Scripted::new("white", vec![mv("b"); 4]);
        let mut black = Scripted::new("black", vec![mv("a"); 3]);
        let mut session = GameSession::new("a", Color::White);

        let state = session.play(&mut white, &mut black).unwrap();

        assert_eq!(state, GameState::DrawByRepetition);
        assert_eq!(session.history().len(), 7);
        assert_eq!(black.asked.len(), 3);
        assert!(black.replies.is_empty());
        assert_eq!(session.side_to_move(), Color::Black);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut white = Scripted::new("white", vec![EngineReply::Checkmate]);
        let mut session = GameSession::new("pos1", Color::White);
        assert_eq!(
            session.step(&mut white).unwrap(),
            GameState::Checkmate(Color::Black)
        );
        assert_eq!(
            session.step(&mut white).unwrap(),
            GameState::Checkmate(Color::Black)
        );
        assert_eq!(white.asked.len(), 1);
    }

    #[test]
    fn test_malformed_reply_is_fatal() {
        let mut white = Scripted::new("white", vec![EngineReply::Malformed("??".to_string())]);
        let mut session = GameSession::new("pos1", Color::White);
        let err = session.step(&mut white).unwrap_err();
        assert!(matches!(err, HarnessError::ProtocolViolation { .. }));
        assert_eq!(session.state(), GameState::Ongoing);
        assert_eq!(session.position(), "pos1");
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_events_are_published() {
        let (tx, rx) = mpsc::channel();
        let mut white = Scripted::new("white", vec![mv("pos2")]);
        let mut black = Scripted::new("black", vec![EngineReply::Checkmate]);
        let mut session = GameSession::new("pos1", Color::White).with_events(tx);
        session.play(&mut white, &mut black).unwrap();
        drop(session);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::MovePlayed {
                    ply: 1,
                    side: Color::White,
                    position: "pos2".to_string(),
                },
                SessionEvent::Finished(GameState::Checkmate(Color::White)),
            ]
        );
    }
}
