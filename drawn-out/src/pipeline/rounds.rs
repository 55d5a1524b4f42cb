//! Round-by-round game discovery.

use std::collections::BTreeSet;
use std::sync::Arc;

use chesscom_extractor::{ExtractorError, ListingSource, PageCount};
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::repositories::TournamentRepository;

/// Result of one population pass over a job.
#[derive(Debug)]
pub enum PopulateOutcome {
    /// Every round has been discovered.
    Complete { rounds_fetched: u32 },
    /// A listing fetch failed; `round` was not recorded.
    Aborted { round: u32, error: ExtractorError },
}

pub struct RoundPopulator<L> {
    listings: Arc<L>,
    tournaments: Arc<dyn TournamentRepository>,
    total_rounds: u32,
}

impl<L: ListingSource> RoundPopulator<L> {
    pub fn new(
        listings: Arc<L>,
        tournaments: Arc<dyn TournamentRepository>,
        total_rounds: u32,
    ) -> Self {
        Self {
            listings,
            tournaments,
            total_rounds,
        }
    }

    /// Discover and record every round not yet fetched.
    ///
    /// Store errors are returned; listing failures end the pass with
    /// [`PopulateOutcome::Aborted`] and leave `rounds_fetched` untouched.
    pub async fn populate(&self, tournament_id: &str) -> Result<PopulateOutcome> {
        loop {
            let rounds_fetched = self.tournaments.rounds_fetched(tournament_id).await?;
            if rounds_fetched >= self.total_rounds {
                return Ok(PopulateOutcome::Complete { rounds_fetched });
            }

            let round = rounds_fetched + 1;
            let game_ids = match self.discover_round(tournament_id, round).await {
                Ok(ids) => ids,
                Err(error) => {
                    warn!(
                        tournament_id,
                        round,
                        error = %error,
                        "listing fetch failed; aborting round population"
                    );
                    return Ok(PopulateOutcome::Aborted { round, error });
                }
            };

            let record = self
                .tournaments
                .record_round(tournament_id, round, &game_ids)
                .await?;

            if record.advanced {
                info!(
                    tournament_id,
                    round,
                    games = game_ids.len(),
                    new_games = record.inserted,
                    "round populated"
                );
            } else {
                warn!(tournament_id, round, "round was already recorded elsewhere");
            }
        }
    }

    /// Game ids of one round across all of its listing pages, deduplicated.
    async fn discover_round(
        &self,
        tournament_id: &str,
        round: u32,
    ) -> std::result::Result<Vec<String>, ExtractorError> {
        let first = self.listings.fetch_listing(tournament_id, round, 1).await?;

        match &first.pages {
            PageCount::Known(0) => {
                warn!(tournament_id, round, "listing reports zero pages; using one")
            }
            PageCount::Known(_) => {}
            PageCount::Missing => {
                debug!(tournament_id, round, "no pagination metadata; single page")
            }
            PageCount::Malformed(raw) => warn!(
                tournament_id,
                round,
                raw = %raw,
                "malformed pagination metadata; assuming a single page"
            ),
        }

        let pages = first.pages.or_single();
        let mut game_ids: BTreeSet<String> = first.game_ids;
        for page in 2..=pages {
            let listing = self
                .listings
                .fetch_listing(tournament_id, round, page)
                .await?;
            game_ids.extend(listing.game_ids);
        }

        debug!(tournament_id, round, pages, games = game_ids.len(), "round discovered");
        Ok(game_ids.into_iter().collect())
    }
}
