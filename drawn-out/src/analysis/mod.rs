//! Endgame analysis over fetched games.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::database::models::{SummaryDbModel, SummaryTotals, UnprocessedGame};
use crate::database::repositories::SummaryRepository;
use crate::database::time::now_ms;
use crate::{Error, Result};

pub const DEFAULT_ANALYSIS_BATCH: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub batches: u32,
    pub inserted: u64,
    pub failed: u64,
    pub totals: SummaryTotals,
}

/// Summarizes every fetched game that has no summary yet.
pub struct AnalysisRunner {
    summaries: Arc<dyn SummaryRepository>,
    batch_size: u32,
}

impl AnalysisRunner {
    pub fn new(summaries: Arc<dyn SummaryRepository>) -> Self {
        Self::with_batch_size(summaries, DEFAULT_ANALYSIS_BATCH)
    }

    pub fn with_batch_size(summaries: Arc<dyn SummaryRepository>, batch_size: u32) -> Self {
        Self {
            summaries,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> Result<AnalysisReport> {
        let mut report = AnalysisReport::default();

        loop {
            let games = self.summaries.unprocessed(self.batch_size).await?;
            if games.is_empty() {
                break;
            }
            let selected = games.len();

            let rows = tokio::task::spawn_blocking(move || summarize_batch(games))
                .await
                .map_err(|e| Error::Other(format!("analysis task failed: {e}")))?;

            report.failed += rows.iter().filter(|r| r.error.is_some()).count() as u64;
            report.inserted += self.summaries.insert_many(&rows).await?;
            report.batches += 1;
            debug!(batch = report.batches, games = selected, "analysis batch stored");

            if selected < self.batch_size as usize {
                break;
            }
        }

        report.totals = self.summaries.totals().await?;
        info!(
            inserted = report.inserted,
            failed = report.failed,
            rook_endgames = report.totals.rook_endgames,
            "analysis finished"
        );
        Ok(report)
    }
}

fn summarize_batch(games: Vec<UnprocessedGame>) -> Vec<SummaryDbModel> {
    let analyzed_at = now_ms();
    games
        .into_iter()
        .map(|game| match endgame::summarize(&game.pgn) {
            Ok(summary) => SummaryDbModel::from_summary(game.id, summary, analyzed_at),
            Err(e) => {
                warn!(game_id = %game.id, error = %e, "could not analyze game");
                SummaryDbModel::from_error(game.id, e, analyzed_at)
            }
        })
        .collect()
}
