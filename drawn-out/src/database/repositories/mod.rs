//! Repository layer.

pub mod game;
pub mod job;
pub mod summary;
pub mod tournament;

pub use game::{GameRepository, SqlxGameRepository};
pub use job::{JobRepository, SqlxJobRepository};
pub use summary::{SqlxSummaryRepository, SummaryRepository};
pub use tournament::{SqlxTournamentRepository, TournamentRepository};

use std::sync::Arc;

use crate::database::DbPool;

/// The repositories the pipeline works against.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub tournaments: Arc<dyn TournamentRepository>,
    pub games: Arc<dyn GameRepository>,
    pub summaries: Arc<dyn SummaryRepository>,
}

impl Repositories {
    /// SQLx-backed repositories sharing one pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            jobs: Arc::new(SqlxJobRepository::new(pool.clone())),
            tournaments: Arc::new(SqlxTournamentRepository::new(pool.clone())),
            games: Arc::new(SqlxGameRepository::new(pool.clone())),
            summaries: Arc::new(SqlxSummaryRepository::new(pool)),
        }
    }
}
