//! Endgame analysis over finished games.

pub mod classify;
pub mod error;
pub mod summary;

pub use classify::{EndgameClass, Material, classify, endgame_tag};
pub use error::AnalysisError;
pub use summary::{BoardOutcome, GameSummary, SummaryVisitor, summarize};
