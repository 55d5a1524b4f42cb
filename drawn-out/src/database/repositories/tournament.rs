//! Tournament repository.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::RoundRecord;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Rows per multi-row game insert; three binds each.
const GAME_INSERT_CHUNK: usize = 200;

#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Create the tournament row with `rounds_fetched = 0` if it is missing.
    async fn ensure(&self, tournament_id: &str) -> Result<()>;
    async fn rounds_fetched(&self, tournament_id: &str) -> Result<u32>;
    /// Insert a round's games (duplicates ignored) and advance
    /// `rounds_fetched` from `round - 1` to `round`, in one transaction.
    async fn record_round(
        &self,
        tournament_id: &str,
        round: u32,
        game_ids: &[String],
    ) -> Result<RoundRecord>;
}

pub struct SqlxTournamentRepository {
    pool: SqlitePool,
}

impl SqlxTournamentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TournamentRepository for SqlxTournamentRepository {
    async fn ensure(&self, tournament_id: &str) -> Result<()> {
        retry_on_sqlite_busy("ensure_tournament", || async {
            sqlx::query("INSERT OR IGNORE INTO tournament (id, rounds_fetched) VALUES (?, 0)")
                .bind(tournament_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn rounds_fetched(&self, tournament_id: &str) -> Result<u32> {
        let rounds = sqlx::query_scalar::<_, i64>(
            "SELECT rounds_fetched FROM tournament WHERE id = ?",
        )
        .bind(tournament_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Tournament", tournament_id))?;
        Ok(u32::try_from(rounds).unwrap_or(0))
    }

    async fn record_round(
        &self,
        tournament_id: &str,
        round: u32,
        game_ids: &[String],
    ) -> Result<RoundRecord> {
        retry_on_sqlite_busy("record_round", || async {
            let now = now_ms();
            let mut tx = self.pool.begin().await?;

            let mut inserted = 0;
            for chunk in game_ids.chunks(GAME_INSERT_CHUNK) {
                let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                    "INSERT INTO game (id, tournament_id, round, updated_at) ",
                );
                builder.push_values(chunk, |mut b, id| {
                    b.push_bind(id)
                        .push_bind(tournament_id)
                        .push_bind(i64::from(round))
                        .push_bind(now);
                });
                builder.push(" ON CONFLICT (id) DO NOTHING");
                inserted += builder.build().execute(&mut *tx).await?.rows_affected();
            }

            let advanced = sqlx::query(
                "UPDATE tournament SET rounds_fetched = rounds_fetched + 1 WHERE id = ? AND rounds_fetched = ?",
            )
            .bind(tournament_id)
            .bind(i64::from(round) - 1)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            tx.commit().await?;
            Ok(RoundRecord { inserted, advanced })
        })
        .await
    }
}
