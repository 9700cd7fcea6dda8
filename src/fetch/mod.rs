//! HTTP transport for remote CSV sources.
//!
//! The loader talks to the network only through [`HttpClient`], so tests and
//! callers with their own middleware can swap the transport.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Request, Response};
use tracing::debug;

/// Sends one request and returns the raw response.
///
/// Status handling lives in [`fetch_bytes`], not in implementations.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Plain [`reqwest::Client`] with library defaults. No retries, no custom timeout.
#[derive(Default)]
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.0.execute(req).await
    }
}

/// Issues a single GET for `url` and returns the response body.
///
/// # Errors
///
/// Fails if the URL does not parse, the request cannot be sent, or the
/// server answers with a non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid URL '{url}'"))?,
    );

    let resp = client
        .execute(req)
        .await
        .with_context(|| format!("request to '{url}' failed"))?;

    let status = resp.status();
    if !status.is_success() {
        bail!("GET '{url}' returned status {status}");
    }

    let bytes = resp.bytes().await?.to_vec();
    debug!(url, bytes = bytes.len(), "Fetched source");
    Ok(bytes)
}
