//! Game repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{GameCounts, GameDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Game repository trait.
///
/// A game is fetchable while its status is `not_asked` or `error` and its
/// durable `retries` is below `max_retries`.
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn count_fetchable(&self, tournament_id: &str, max_retries: u32) -> Result<i64>;
    async fn select_batch(
        &self,
        tournament_id: &str,
        max_retries: u32,
        limit: u32,
    ) -> Result<Vec<String>>;
    async fn mark_success(&self, game_id: &str, pgn: &str) -> Result<()>;
    /// Record one exhausted local retry budget. Returns the new `retries`,
    /// or `None` when the game had already been fetched.
    async fn mark_failed(&self, game_id: &str) -> Result<Option<i64>>;
    /// Games that are neither fetched nor out of retries.
    async fn count_live(&self, tournament_id: &str, max_retries: u32) -> Result<i64>;
    async fn counts_for(&self, tournament_id: &str, max_retries: u32) -> Result<GameCounts>;
    async fn get_game(&self, game_id: &str) -> Result<GameDbModel>;
}

pub struct SqlxGameRepository {
    pool: SqlitePool,
}

impl SqlxGameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameRepository for SqlxGameRepository {
    async fn count_fetchable(&self, tournament_id: &str, max_retries: u32) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM game
            WHERE tournament_id = ? AND status IN ('not_asked', 'error') AND retries < ?
            "#,
        )
        .bind(tournament_id)
        .bind(i64::from(max_retries))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn select_batch(
        &self,
        tournament_id: &str,
        max_retries: u32,
        limit: u32,
    ) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM game
            WHERE tournament_id = ? AND status IN ('not_asked', 'error') AND retries < ?
            ORDER BY retries, round, id
            LIMIT ?
            "#,
        )
        .bind(tournament_id)
        .bind(i64::from(max_retries))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn mark_success(&self, game_id: &str, pgn: &str) -> Result<()> {
        if pgn.trim().is_empty() {
            return Err(Error::Other(format!(
                "refusing to mark game {game_id} successful with an empty pgn"
            )));
        }

        retry_on_sqlite_busy("mark_game_success", || async {
            let done = sqlx::query(
                "UPDATE game SET status = 'success', pgn = ?, updated_at = ? WHERE id = ?",
            )
            .bind(pgn)
            .bind(now_ms())
            .bind(game_id)
            .execute(&self.pool)
            .await?;
            if done.rows_affected() == 0 {
                return Err(Error::not_found("Game", game_id));
            }
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, game_id: &str) -> Result<Option<i64>> {
        retry_on_sqlite_busy("mark_game_failed", || async {
            let retries = sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE game SET status = 'error', retries = retries + 1, updated_at = ?
                WHERE id = ? AND status != 'success'
                RETURNING retries
                "#,
            )
            .bind(now_ms())
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(retries)
        })
        .await
    }

    async fn count_live(&self, tournament_id: &str, max_retries: u32) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM game
            WHERE tournament_id = ?
              AND NOT (status = 'success' OR (status = 'error' AND retries >= ?))
            "#,
        )
        .bind(tournament_id)
        .bind(i64::from(max_retries))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn counts_for(&self, tournament_id: &str, max_retries: u32) -> Result<GameCounts> {
        let counts = sqlx::query_as::<_, GameCounts>(
            r#"
            SELECT
                COALESCE(SUM(status = 'not_asked'), 0) AS not_asked,
                COALESCE(SUM(status = 'success'), 0) AS success,
                COALESCE(SUM(status = 'error' AND retries < ?1), 0) AS error,
                COALESCE(SUM(status = 'error' AND retries >= ?1), 0) AS exhausted
            FROM game
            WHERE tournament_id = ?2
            "#,
        )
        .bind(i64::from(max_retries))
        .bind(tournament_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn get_game(&self, game_id: &str) -> Result<GameDbModel> {
        sqlx::query_as::<_, GameDbModel>("SELECT * FROM game WHERE id = ?")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Game", game_id))
    }
}
