use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::ExtractorError;
use crate::listing::{ListingPage, parse_listing, round_listing_url};
use crate::source::ListingSource;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub const DEFAULT_HOST: &str = "https://www.chess.com";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

pub fn default_client(timeout: Duration) -> Result<Client, ExtractorError> {
    install_rustls_provider();

    Ok(Client::builder()
        .user_agent(DEFAULT_UA)
        .timeout(timeout)
        .build()?)
}

/// Fetches pairings listings over plain HTTP. The pairings table is server
/// rendered, so no browser is needed for discovery.
#[derive(Debug, Clone)]
pub struct ListingClient {
    client: Client,
    base: Url,
}

impl ListingClient {
    pub fn new(client: Client, host: &str) -> Result<Self, ExtractorError> {
        let base = Url::parse(host).map_err(|e| ExtractorError::InvalidUrl(format!("{host}: {e}")))?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl ListingSource for ListingClient {
    async fn fetch_listing(
        &self,
        tournament_id: &str,
        round: u32,
        page: u32,
    ) -> Result<ListingPage, ExtractorError> {
        let url = round_listing_url(&self.base, tournament_id, round, page)?;
        debug!(%url, "fetching round listing");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractorError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(parse_listing(&body, &self.base))
    }
}
