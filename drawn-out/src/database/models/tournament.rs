use sqlx::FromRow;

/// Round discovery progress of one tournament.
#[derive(Debug, Clone, FromRow)]
pub struct TournamentDbModel {
    pub id: String,
    /// Rounds whose listing has been discovered and persisted. Never decreases.
    pub rounds_fetched: i64,
}

/// Result of persisting one round's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRecord {
    /// Game rows that did not exist before.
    pub inserted: u64,
    /// Whether `rounds_fetched` moved forward. False when the round had
    /// already been recorded.
    pub advanced: bool,
}
