use endgame::GameSummary;
use sqlx::FromRow;

/// A fetched game that has no summary yet.
#[derive(Debug, Clone, FromRow)]
pub struct UnprocessedGame {
    pub id: String,
    pub pgn: String,
}

/// Analysis result row.
#[derive(Debug, Clone, Default, FromRow)]
pub struct SummaryDbModel {
    pub game_id: String,
    pub rook_endgame: bool,
    pub played_out: i64,
    /// `w`, `b` or NULL.
    pub winner: Option<String>,
    pub outcome: Option<String>,
    pub result: Option<String>,
    pub termination: Option<String>,
    pub white_elo: Option<i64>,
    pub black_elo: Option<i64>,
    pub t_5men: Option<String>,
    pub t_4men: Option<String>,
    pub t_3men: Option<String>,
    pub endgame_sequence: String,
    pub end_piece_count: i64,
    /// Parse failure. Recorded so the game is not selected again.
    pub error: Option<String>,
    pub analyzed_at: i64,
}

impl SummaryDbModel {
    pub fn from_summary(game_id: impl Into<String>, summary: GameSummary, analyzed_at: i64) -> Self {
        Self {
            game_id: game_id.into(),
            rook_endgame: summary.rook_endgame,
            played_out: i64::from(summary.played_out),
            winner: summary.winner_tag(),
            outcome: summary.outcome.map(|o| o.as_str().to_string()),
            result: summary.result,
            termination: summary.termination,
            white_elo: summary.white_elo.map(i64::from),
            black_elo: summary.black_elo.map(i64::from),
            t_5men: summary.t_5men,
            t_4men: summary.t_4men,
            t_3men: summary.t_3men,
            endgame_sequence: summary.endgame_sequence,
            end_piece_count: i64::from(summary.end_piece_count),
            error: None,
            analyzed_at,
        }
    }

    pub fn from_error(game_id: impl Into<String>, error: impl ToString, analyzed_at: i64) -> Self {
        Self {
            game_id: game_id.into(),
            error: Some(error.to_string()),
            analyzed_at,
            ..Default::default()
        }
    }
}

/// Totals over the summary table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct SummaryTotals {
    pub analyzed: i64,
    pub rook_endgames: i64,
    pub errors: i64,
}
