//! Parsing of a tournament round's pairings listing.
//!
//! A round's pairings are paginated. Every page carries the game links for
//! its slice of the pairings table, and the bottom paginator carries the
//! total page count in a `data-total-pages` attribute.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use scraper::{Html, Selector};
use url::Url;

const GAME_LINK_SELECTOR: &str = "table.tournaments-live-view-pairings-table > tbody > tr > td > a";
const PAGINATION_SELECTOR: &str = "#pairings .index-pagination #pairings-pagination-bottom";
const TOTAL_PAGES_ATTR: &str = "data-total-pages";

fn game_link_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse(GAME_LINK_SELECTOR).expect("static pairings link selector is valid")
    })
}

fn pagination_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse(PAGINATION_SELECTOR).expect("static pagination selector is valid")
    })
}

/// Page count advertised by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCount {
    /// The paginator was present and parsed.
    Known(u32),
    /// No paginator on the page; the round fits on one page.
    Missing,
    /// A paginator was present but its count could not be read.
    Malformed(String),
}

impl PageCount {
    /// Number of pages to walk. Anything but a known count of at least one
    /// page means a single page.
    pub fn or_single(&self) -> u32 {
        match self {
            Self::Known(n) if *n >= 1 => *n,
            _ => 1,
        }
    }
}

/// One parsed page of a round's pairings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// Game identifiers linked from this page, deduplicated.
    pub game_ids: BTreeSet<String>,
    pub pages: PageCount,
}

/// Parse a pairings listing page. `base` resolves relative game links.
pub fn parse_listing(html: &str, base: &Url) -> ListingPage {
    let document = Html::parse_document(html);

    let game_ids = document
        .select(game_link_selector())
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| game_id_from_href(href, base))
        .collect();

    ListingPage {
        game_ids,
        pages: total_pages(&document),
    }
}

fn total_pages(document: &Html) -> PageCount {
    let Some(paginator) = document.select(pagination_selector()).next() else {
        return PageCount::Missing;
    };

    match paginator.value().attr(TOTAL_PAGES_ATTR) {
        None => PageCount::Missing,
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(n) => PageCount::Known(n),
            Err(_) => PageCount::Malformed(raw.to_string()),
        },
    }
}

/// The game identifier is the last path segment of the game link,
/// e.g. `https://www.chess.com/game/live/131234567` -> `131234567`.
pub fn game_id_from_href(href: &str, base: &Url) -> Option<String> {
    let url = base.join(href).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

/// URL of one page of a round's pairings listing.
pub fn round_listing_url(
    base: &Url,
    tournament_id: &str,
    round: u32,
    page: u32,
) -> Result<Url, crate::ExtractorError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| crate::ExtractorError::InvalidUrl(base.to_string()))?
        .clear()
        .extend(["tournament", "live", tournament_id]);
    url.query_pairs_mut()
        .clear()
        .append_pair("round", &round.to_string())
        .append_pair("pairings", &page.to_string());
    Ok(url)
}
