//! drawn-out: tournament PGN scraper and rook endgame analysis.

pub mod analysis;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use error::{Error, Result};
