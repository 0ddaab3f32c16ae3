//! HTTP collaborator used by the client to issue GET requests.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use url::Url;

use super::error::TransportError;
use super::response::RawResponse;

/// Issues a GET for `url` and hands back whatever the server answered.
///
/// Non-200 statuses are still `Ok`; only failures to get a response at all are
/// a [`TransportError`].
pub trait Fetch: Send + Sync {
  fn fetch(&self, url: &Url) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

impl<T: Fetch> Fetch for Arc<T> {
  fn fetch(&self, url: &Url) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
    (**self).fetch(url)
  }
}

/// [`Fetch`] implementation backed by reqwest.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("clicky-popular-posts/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetch for ReqwestFetcher {
  async fn fetch(&self, url: &Url) -> Result<RawResponse, TransportError> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
      })
      .collect();

    let body = response
      .text()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    Ok(RawResponse {
      status,
      headers,
      body,
    })
  }
}
