use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("browser error: {0}")]
    BrowserError(String),
}

impl From<chromiumoxide::error::CdpError> for ExtractorError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::BrowserError(err.to_string())
    }
}
