//! Game database models.

use sqlx::FromRow;

/// One game of a tournament round.
#[derive(Debug, Clone, FromRow)]
pub struct GameDbModel {
    pub id: String,
    pub tournament_id: String,
    pub round: i64,
    /// Empty until fetched. Never empty when `status` is success.
    pub pgn: String,
    /// Status: not_asked, success, error
    pub status: String,
    /// Durable failures, incremented once per exhausted local retry budget.
    pub retries: i64,
    pub updated_at: i64,
}

impl GameDbModel {
    pub fn status(&self) -> Option<GameStatus> {
        GameStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    NotAsked,
    Success,
    Error,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAsked => "not_asked",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_asked" => Some(Self::NotAsked),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tournament game counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct GameCounts {
    pub not_asked: i64,
    pub success: i64,
    /// Errors with retry budget left.
    pub error: i64,
    /// Errors that reached the durable retry ceiling.
    pub exhausted: i64,
}

impl GameCounts {
    pub fn total(&self) -> i64 {
        self.not_asked + self.success + self.error + self.exhausted
    }

    /// Games that can still be fetched.
    pub fn live(&self) -> i64 {
        self.not_asked + self.error
    }
}
