//! Summary repository.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::{SummaryDbModel, SummaryTotals, UnprocessedGame};
use crate::database::retry::retry_on_sqlite_busy;
use crate::Result;

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Successfully fetched games without a summary row.
    async fn unprocessed(&self, limit: u32) -> Result<Vec<UnprocessedGame>>;
    /// Insert summaries in one multi-row statement. Returns rows inserted.
    async fn insert_many(&self, summaries: &[SummaryDbModel]) -> Result<u64>;
    async fn totals(&self) -> Result<SummaryTotals>;
}

pub struct SqlxSummaryRepository {
    pool: SqlitePool,
}

impl SqlxSummaryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryRepository for SqlxSummaryRepository {
    async fn unprocessed(&self, limit: u32) -> Result<Vec<UnprocessedGame>> {
        let games = sqlx::query_as::<_, UnprocessedGame>(
            r#"
            SELECT g.id, g.pgn
            FROM game AS g
            LEFT JOIN summary AS s ON s.game_id = g.id
            WHERE g.status = 'success' AND s.game_id IS NULL
            ORDER BY g.id
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(games)
    }

    async fn insert_many(&self, summaries: &[SummaryDbModel]) -> Result<u64> {
        if summaries.is_empty() {
            return Ok(0);
        }

        retry_on_sqlite_busy("insert_summaries", || async {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"
                INSERT INTO summary (
                    game_id, rook_endgame, played_out, winner, outcome, result,
                    termination, white_elo, black_elo, t_5men, t_4men, t_3men,
                    endgame_sequence, end_piece_count, error, analyzed_at
                ) "#,
            );
            builder.push_values(summaries, |mut b, s| {
                b.push_bind(&s.game_id)
                    .push_bind(s.rook_endgame)
                    .push_bind(s.played_out)
                    .push_bind(&s.winner)
                    .push_bind(&s.outcome)
                    .push_bind(&s.result)
                    .push_bind(&s.termination)
                    .push_bind(s.white_elo)
                    .push_bind(s.black_elo)
                    .push_bind(&s.t_5men)
                    .push_bind(&s.t_4men)
                    .push_bind(&s.t_3men)
                    .push_bind(&s.endgame_sequence)
                    .push_bind(s.end_piece_count)
                    .push_bind(&s.error)
                    .push_bind(s.analyzed_at);
            });
            builder.push(" ON CONFLICT (game_id) DO NOTHING");
            let done = builder.build().execute(&self.pool).await?;
            Ok(done.rows_affected())
        })
        .await
    }

    async fn totals(&self) -> Result<SummaryTotals> {
        let totals = sqlx::query_as::<_, SummaryTotals>(
            r#"
            SELECT
                COUNT(*) AS analyzed,
                COALESCE(SUM(rook_endgame), 0) AS rook_endgames,
                COALESCE(SUM(error IS NOT NULL), 0) AS errors
            FROM summary
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}
