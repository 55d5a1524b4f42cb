//! Database row models.

pub mod game;
pub mod job;
pub mod summary;
pub mod tournament;

pub use game::{GameCounts, GameDbModel, GameStatus};
pub use job::{JobCounts, JobDbModel, JobStatus};
pub use summary::{SummaryDbModel, SummaryTotals, UnprocessedGame};
pub use tournament::{RoundRecord, TournamentDbModel};
