//! The rule-engine boundary. Card legality, pool physics, and every other
//! per-game ruleset live outside this crate; the hub and session manager
//! depend only on this trait, keeping them game-agnostic.

use serde_json::Value;
use wager_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Winner(i64),
    Draw,
}

#[derive(Debug, Clone)]
pub struct EngineError(pub String);

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::validation(e.0)
    }
}

/// A pluggable game ruleset. `state` is an opaque JSON blob the engine owns
/// the shape of; the hub never inspects it except to hand it back.
pub trait RuleEngine: Send + Sync {
    fn init_state(&self, player1_id: i64, player2_id: i64) -> Value;

    fn apply_move(
        &self,
        state: &Value,
        player_id: i64,
        move_type: &str,
        data: Value,
    ) -> Result<Value, EngineError>;

    fn is_terminal(&self, state: &Value) -> Outcome;

    /// Projects the shared state down to what `player_id` is allowed to see
    /// (hides the opponent's hand, private cards, etc).
    fn project_for(&self, state: &Value, player_id: i64) -> Value {
        let _ = player_id;
        state.clone()
    }
}
