//! Game fetch orchestration.
//!
//! Fetchable games of a job are drained batch by batch. Each game in a batch
//! runs as its own task and checks a session out of the pool per attempt.
//! Failed attempts are retried locally with backoff; once the local budget
//! is spent the failure is recorded durably by bumping `retries`.

use std::sync::Arc;

use chesscom_extractor::{PgnFetch, PgnSource};
use dashmap::DashMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry_policy::LocalRetryPolicy;
use super::session_pool::SessionPool;
use crate::database::repositories::GameRepository;
use crate::{Error, Result};

/// Terminal result of one game's task within a batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Fetched,
    /// Local attempts ran out. `retries` is the new durable count, `None` if
    /// the game had meanwhile been fetched elsewhere.
    Exhausted { retries: Option<i64> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: u32,
    pub fetched: u64,
    pub failed: u64,
    /// Cancelled before every fetchable game was attempted.
    pub interrupted: bool,
}

struct FetchContext<P: PgnSource> {
    source: Arc<P>,
    pool: SessionPool<P::Session>,
    games: Arc<dyn GameRepository>,
    policy: LocalRetryPolicy,
    /// Failed local attempts per game id, for games in the current batch.
    local_attempts: DashMap<String, u32>,
}

pub struct GameFetcher<P: PgnSource> {
    ctx: Arc<FetchContext<P>>,
    batch_size: u32,
    max_retries: u32,
}

impl<P: PgnSource> GameFetcher<P> {
    pub fn new(
        source: Arc<P>,
        pool: SessionPool<P::Session>,
        games: Arc<dyn GameRepository>,
        policy: LocalRetryPolicy,
        batch_size: u32,
        max_retries: u32,
    ) -> Self {
        Self {
            ctx: Arc::new(FetchContext {
                source,
                pool,
                games,
                policy,
                local_attempts: DashMap::new(),
            }),
            batch_size,
            max_retries,
        }
    }

    /// Games with local attempts still being tracked.
    pub fn tracked_games(&self) -> usize {
        self.ctx.local_attempts.len()
    }

    /// Fetch until no game of the job is fetchable or `token` is cancelled.
    ///
    /// A store error in any task fails the drain once the rest of its batch
    /// has finished. On cancellation the batch's tasks are aborted and awaited,
    /// so every session they held is back in the pool when this returns.
    pub async fn drain(
        &self,
        tournament_id: &str,
        token: &CancellationToken,
    ) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        loop {
            if token.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let remaining = self
                .ctx
                .games
                .count_fetchable(tournament_id, self.max_retries)
                .await?;
            if remaining == 0 {
                break;
            }

            let batch = self
                .ctx
                .games
                .select_batch(tournament_id, self.max_retries, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            report.batches += 1;
            debug!(
                tournament_id,
                batch = report.batches,
                size = batch.len(),
                remaining,
                "dispatching batch"
            );

            let mut tasks = JoinSet::new();
            for game_id in batch.iter().cloned() {
                tasks.spawn(process_game(Arc::clone(&self.ctx), game_id));
            }

            let mut first_error = None;
            let (mut fetched, mut failed) = (0u64, 0u64);
            loop {
                let joined = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tasks.shutdown().await;
                        report.interrupted = true;
                        break;
                    }
                    joined = tasks.join_next() => joined,
                };
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok(Ok(GameOutcome::Fetched)) => fetched += 1,
                    Ok(Ok(GameOutcome::Exhausted { .. })) => failed += 1,
                    Ok(Err(e)) => {
                        error!(tournament_id, error = %e, "game task failed");
                        first_error.get_or_insert(e);
                    }
                    Err(join_err) => {
                        error!(tournament_id, error = %join_err, "game task panicked");
                        first_error
                            .get_or_insert(Error::Other(format!("game task failed: {join_err}")));
                    }
                }
            }

            for game_id in &batch {
                self.ctx.local_attempts.remove(game_id);
            }
            if let Some(e) = first_error {
                return Err(e);
            }

            report.fetched += fetched;
            report.failed += failed;
            if report.interrupted {
                info!(tournament_id, fetched, failed, "drain interrupted");
                break;
            }
            info!(
                tournament_id,
                batch = report.batches,
                fetched,
                failed,
                "batch drained"
            );
        }

        Ok(report)
    }
}

/// Fetch one game, retrying locally, and persist the outcome.
async fn process_game<P: PgnSource>(
    ctx: Arc<FetchContext<P>>,
    game_id: String,
) -> Result<GameOutcome> {
    loop {
        let attempts = ctx.local_attempts.get(&game_id).map_or(0, |a| *a);
        if !ctx.policy.should_retry(attempts) {
            break;
        }

        let fetch = {
            let mut pooled = ctx.pool.acquire().await?;
            let first_launch = pooled.first_launch();
            ctx.source
                .fetch_pgn(pooled.session_mut(), &game_id, first_launch)
                .await
        };

        match fetch {
            PgnFetch::Success(pgn) => {
                ctx.games.mark_success(&game_id, &pgn).await?;
                ctx.local_attempts.remove(&game_id);
                debug!(game_id = %game_id, attempt = attempts + 1, "game fetched");
                return Ok(GameOutcome::Fetched);
            }
            PgnFetch::Failure(failure) => {
                let attempts = {
                    let mut entry = ctx.local_attempts.entry(game_id.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                warn!(
                    game_id = %game_id,
                    attempt = attempts,
                    stage = %failure.stage,
                    reason = %failure.reason,
                    "game fetch failed"
                );
                if ctx.policy.should_retry(attempts) {
                    tokio::time::sleep(ctx.policy.delay_for_attempt(attempts)).await;
                }
            }
        }
    }

    ctx.local_attempts.remove(&game_id);
    let retries = ctx.games.mark_failed(&game_id).await?;
    warn!(game_id = %game_id, ?retries, "local retries exhausted");
    Ok(GameOutcome::Exhausted { retries })
}
