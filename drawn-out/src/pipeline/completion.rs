use std::sync::Arc;

use tracing::{debug, info};

use crate::Result;
use crate::database::repositories::{GameRepository, JobRepository, TournamentRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCheck {
    /// The job was moved to `complete` by this check.
    Completed,
    /// The job was already `complete`.
    AlreadyComplete,
    /// Not done yet; the job stays `pending`.
    Pending { rounds_fetched: u32, live_games: i64 },
}

/// Marks a job complete once enough rounds are discovered and every game is
/// either fetched or out of retries. Never moves a job back to `pending`.
pub struct CompletionDetector {
    jobs: Arc<dyn JobRepository>,
    tournaments: Arc<dyn TournamentRepository>,
    games: Arc<dyn GameRepository>,
    min_rounds: u32,
    max_retries: u32,
}

impl CompletionDetector {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        tournaments: Arc<dyn TournamentRepository>,
        games: Arc<dyn GameRepository>,
        min_rounds: u32,
        max_retries: u32,
    ) -> Self {
        Self {
            jobs,
            tournaments,
            games,
            min_rounds,
            max_retries,
        }
    }

    pub async fn check(&self, tournament_id: &str) -> Result<CompletionCheck> {
        let rounds_fetched = self.tournaments.rounds_fetched(tournament_id).await?;
        let live_games = self
            .games
            .count_live(tournament_id, self.max_retries)
            .await?;

        if rounds_fetched < self.min_rounds || live_games > 0 {
            debug!(
                tournament_id,
                rounds_fetched, live_games, "job not complete yet"
            );
            return Ok(CompletionCheck::Pending {
                rounds_fetched,
                live_games,
            });
        }

        if self.jobs.mark_complete(tournament_id).await? {
            info!(tournament_id, rounds_fetched, "job completed");
            Ok(CompletionCheck::Completed)
        } else {
            Ok(CompletionCheck::AlreadyComplete)
        }
    }
}
