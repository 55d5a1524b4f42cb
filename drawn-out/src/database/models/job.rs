//! Job database models.

use sqlx::FromRow;

/// One tournament's scrape lifecycle.
#[derive(Debug, Clone, FromRow)]
pub struct JobDbModel {
    pub id: i64,
    /// External tournament key, e.g. `titled-tuesday-blitz-october-14-2025-5796135`.
    pub tournament_id: String,
    /// Status: not_asked, pending, complete
    pub status: String,
    /// Unix epoch milliseconds of the last status change.
    pub updated_at: i64,
}

impl JobDbModel {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// Job status values.
///
/// `not_asked -> pending` on claim, `pending -> complete` once every round is
/// discovered and every game is resolved. `complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    NotAsked,
    Pending,
    Complete,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [Self::NotAsked, Self::Pending, Self::Complete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAsked => "not_asked",
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_asked" => Some(Self::NotAsked),
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub not_asked: i64,
    pub pending: i64,
    pub complete: i64,
}
