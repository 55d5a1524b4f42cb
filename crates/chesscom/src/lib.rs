//! Page extraction for chess.com tournaments.
//!
//! Round listings are fetched over HTTP and parsed with `scraper`; game
//! transcripts are read from the rendered game page through `chromiumoxide`.

pub mod browser;
pub mod client;
pub mod error;
pub mod listing;
pub mod source;

pub use browser::{BrowserSettings, BrowserTab, ChessBrowser};
pub use client::{DEFAULT_HOST, ListingClient, default_client, install_rustls_provider};
pub use error::ExtractorError;
pub use listing::{ListingPage, PageCount, game_id_from_href, parse_listing, round_listing_url};
pub use source::{FetchFailure, FetchStage, ListingSource, PgnFetch, PgnSource};
