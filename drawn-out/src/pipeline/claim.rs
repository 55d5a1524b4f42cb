use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::database::repositories::{JobRepository, TournamentRepository};

/// Hands out one job at a time.
pub struct JobClaimer {
    jobs: Arc<dyn JobRepository>,
    tournaments: Arc<dyn TournamentRepository>,
}

impl JobClaimer {
    pub fn new(jobs: Arc<dyn JobRepository>, tournaments: Arc<dyn TournamentRepository>) -> Self {
        Self { jobs, tournaments }
    }

    /// Resume a job left `pending`, else claim a `not_asked` one. `None`
    /// means there is no work left.
    ///
    /// The tournament row is created on claim so discovered games always
    /// have a parent.
    pub async fn claim_job(&self) -> Result<Option<String>> {
        let tournament_id = match self.jobs.find_pending().await? {
            Some(id) => {
                info!(tournament_id = %id, "resuming pending job");
                id
            }
            None => match self.jobs.claim_next().await? {
                Some(id) => {
                    info!(tournament_id = %id, "claimed job");
                    id
                }
                None => return Ok(None),
            },
        };

        self.tournaments.ensure(&tournament_id).await?;
        Ok(Some(tournament_id))
    }
}
