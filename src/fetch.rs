use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::AstroError;

/// Status and full body of a completed request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Blocking GET capability used by every crawl stage.
///
/// Implementations return `Err` only for transport failures; any HTTP status, successful or
/// not, is reported through [`FetchResponse::status`].
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<FetchResponse, AstroError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn get(&self, url: &str) -> Result<FetchResponse, AstroError> {
        (**self).get(url)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AstroError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("astro-dataset-builder/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AstroError::Network(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| AstroError::Network(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<FetchResponse, AstroError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| AstroError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| AstroError::Network(err.to_string()))?;
        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Fetches `url` and fails unless the status is a success.
pub fn get_success(fetcher: &dyn Fetcher, url: &str) -> Result<FetchResponse, AstroError> {
    let response = fetcher.get(url)?;
    if !response.is_success() {
        return Err(AstroError::HttpStatus {
            status: response.status,
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Resolves `href` against the page it was found on. Absolute hrefs come back unchanged.
pub fn resolve_href(base: &str, href: &str) -> Result<String, AstroError> {
    let base = Url::parse(base).map_err(|err| AstroError::InvalidUrl(format!("{base}: {err}")))?;
    base.join(href)
        .map(|url| url.to_string())
        .map_err(|err| AstroError::InvalidUrl(format!("{href}: {err}")))
}
