use std::fmt;

use async_trait::async_trait;

use crate::error::ExtractorError;
use crate::listing::ListingPage;

/// Source of tournament round listings.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch and parse one page (1-based) of a round's pairings.
    async fn fetch_listing(
        &self,
        tournament_id: &str,
        round: u32,
        page: u32,
    ) -> Result<ListingPage, ExtractorError>;
}

/// Step of the game-page interaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Navigate,
    CookieBanner,
    GameOverModal,
    SharePanel,
    PgnTab,
    Timestamps,
    ReadPgn,
}

impl FetchStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::CookieBanner => "cookie_banner",
            Self::GameOverModal => "game_over_modal",
            Self::SharePanel => "share_panel",
            Self::PgnTab => "pgn_tab",
            Self::Timestamps => "timestamps",
            Self::ReadPgn => "read_pgn",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub stage: FetchStage,
    pub reason: String,
}

impl FetchFailure {
    pub fn new(stage: FetchStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.reason)
    }
}

/// Outcome of one attempt at reading a game's PGN.
///
/// A transient automation failure is a value, not an error: the caller
/// decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgnFetch {
    Success(String),
    Failure(FetchFailure),
}

impl PgnFetch {
    /// Wrap a PGN read from the page. An empty transcript is a failure.
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            Self::Failure(FetchFailure::new(FetchStage::ReadPgn, "empty pgn"))
        } else {
            Self::Success(text)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Source of game transcripts, driven through reusable sessions.
#[async_trait]
pub trait PgnSource: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Open a new session (a browser tab).
    async fn open_session(&self) -> Result<Self::Session, ExtractorError>;

    /// Close a session. Called once per opened session.
    async fn close_session(&self, session: Self::Session) -> Result<(), ExtractorError>;

    /// Read one game's PGN using `session`. `first_launch` is true the first
    /// time the session is used.
    async fn fetch_pgn(
        &self,
        session: &mut Self::Session,
        game_id: &str,
        first_launch: bool,
    ) -> PgnFetch;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pgn_is_failure() {
        assert_eq!(
            PgnFetch::from_text("  \n".to_string()),
            PgnFetch::Failure(FetchFailure::new(FetchStage::ReadPgn, "empty pgn"))
        );
        assert!(PgnFetch::from_text("1. e4 e5 *".to_string()).is_success());
    }

    #[test]
    fn test_failure_display() {
        let failure = FetchFailure::new(FetchStage::GameOverModal, "timed out");
        assert_eq!(failure.to_string(), "game_over_modal: timed out");
    }
}
