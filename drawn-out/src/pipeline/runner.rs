//! Top-level scrape loop.
//!
//! claim -> populate rounds -> drain games -> completion check, repeated
//! until no job is left, the token is cancelled, or one job keeps failing.

use std::sync::Arc;

use chesscom_extractor::{ListingSource, PgnSource};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::claim::JobClaimer;
use super::completion::{CompletionCheck, CompletionDetector};
use super::games::{DrainReport, GameFetcher};
use super::retry_policy::LocalRetryPolicy;
use super::rounds::{PopulateOutcome, RoundPopulator};
use super::session_pool::SessionPool;
use crate::Result;
use crate::config::PipelineConfig;
use crate::database::repositories::Repositories;

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// No `pending` or `not_asked` job remains.
    NoJobs,
    Interrupted,
    /// The same job failed to make progress too many passes in a row; it is
    /// left `pending` for a later run.
    Stalled { tournament_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u32,
    pub jobs_completed: u32,
    pub games_fetched: u64,
    pub games_failed: u64,
    pub stop: StopReason,
}

/// Result of one claim/populate/drain/check pass.
#[derive(Debug)]
enum PassOutcome {
    NoJob,
    Interrupted { drained: DrainReport },
    Done {
        tournament_id: String,
        /// Population aborted or the job is still pending after a full pass.
        stuck: bool,
        completed: bool,
        drained: DrainReport,
    },
}

pub struct Pipeline<L, P: PgnSource> {
    claimer: JobClaimer,
    populator: RoundPopulator<L>,
    fetcher: GameFetcher<P>,
    completion: CompletionDetector,
    config: PipelineConfig,
}

impl<L: ListingSource, P: PgnSource> Pipeline<L, P> {
    pub fn new(
        repos: &Repositories,
        listings: Arc<L>,
        source: Arc<P>,
        pool: SessionPool<P::Session>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            claimer: JobClaimer::new(repos.jobs.clone(), repos.tournaments.clone()),
            populator: RoundPopulator::new(listings, repos.tournaments.clone(), config.total_rounds),
            fetcher: GameFetcher::new(
                source,
                pool,
                repos.games.clone(),
                LocalRetryPolicy::from_config(&config),
                config.batch_size,
                config.max_retries,
            ),
            completion: CompletionDetector::new(
                repos.jobs.clone(),
                repos.tournaments.clone(),
                repos.games.clone(),
                config.min_rounds_for_completion,
                config.max_retries,
            ),
            config,
        })
    }

    /// Run until there is no work left.
    ///
    /// Store errors end the run with `Err`. Cancelling `token` stops the
    /// in-flight pass; its fetch tasks are aborted and every session is back
    /// in the pool by the time this returns.
    pub async fn run(&self, token: CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary {
            passes: 0,
            jobs_completed: 0,
            games_fetched: 0,
            games_failed: 0,
            stop: StopReason::NoJobs,
        };
        let mut stuck_job: Option<(String, u32)> = None;
        let backoff = LocalRetryPolicy::from_config(&self.config);

        loop {
            if token.is_cancelled() {
                summary.stop = StopReason::Interrupted;
                break;
            }

            let (tournament_id, stuck, completed, drained) = match self.pass(&token).await? {
                PassOutcome::NoJob => {
                    summary.stop = StopReason::NoJobs;
                    break;
                }
                PassOutcome::Interrupted { drained } => {
                    summary.games_fetched += drained.fetched;
                    summary.games_failed += drained.failed;
                    summary.stop = StopReason::Interrupted;
                    break;
                }
                PassOutcome::Done {
                    tournament_id,
                    stuck,
                    completed,
                    drained,
                } => (tournament_id, stuck, completed, drained),
            };

            summary.passes += 1;
            summary.games_fetched += drained.fetched;
            summary.games_failed += drained.failed;
            if completed {
                summary.jobs_completed += 1;
            }

            if !stuck {
                stuck_job = None;
                continue;
            }

            let failures = match &mut stuck_job {
                Some((id, count)) if *id == tournament_id => {
                    *count += 1;
                    *count
                }
                _ => {
                    stuck_job = Some((tournament_id.clone(), 1));
                    1
                }
            };

            if failures >= self.config.max_population_failures {
                warn!(
                    tournament_id = %tournament_id,
                    failures,
                    "job made no progress in consecutive passes; stopping run"
                );
                summary.stop = StopReason::Stalled { tournament_id };
                break;
            }

            let delay = backoff.delay_for_attempt(failures);
            info!(
                tournament_id = %tournament_id,
                failures,
                delay_ms = delay.as_millis() as u64,
                "retrying job after backoff"
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    summary.stop = StopReason::Interrupted;
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(
            passes = summary.passes,
            jobs_completed = summary.jobs_completed,
            games_fetched = summary.games_fetched,
            games_failed = summary.games_failed,
            stop = ?summary.stop,
            "pipeline finished"
        );
        Ok(summary)
    }

    async fn pass(&self, token: &CancellationToken) -> Result<PassOutcome> {
        let Some(tournament_id) = self.claimer.claim_job().await? else {
            return Ok(PassOutcome::NoJob);
        };

        // Population holds no sessions, so it is simply dropped on cancel.
        let populated = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Ok(PassOutcome::Interrupted { drained: DrainReport::default() });
            }
            populated = self.populator.populate(&tournament_id) => populated?,
        };

        let drained = self.fetcher.drain(&tournament_id, token).await?;
        if drained.interrupted {
            return Ok(PassOutcome::Interrupted { drained });
        }

        let (stuck, completed) = match populated {
            PopulateOutcome::Aborted { round, .. } => {
                info!(
                    tournament_id = %tournament_id,
                    round,
                    "population incomplete; skipping completion check"
                );
                (true, false)
            }
            PopulateOutcome::Complete { .. } => {
                match self.completion.check(&tournament_id).await? {
                    CompletionCheck::Completed | CompletionCheck::AlreadyComplete => {
                        (false, true)
                    }
                    CompletionCheck::Pending { .. } => (true, false),
                }
            }
        };

        Ok(PassOutcome::Done {
            tournament_id,
            stuck,
            completed,
            drained,
        })
    }
}
