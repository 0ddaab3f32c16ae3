use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::cache::OptionStore;

use super::cache::CacheStore;
use super::error::ApiError;
use super::http::Fetch;
use super::request::{build_url, redact, OutputFormat, QueryArgs};
use super::response::{Decoder, Decoders, Payload};

/// Stats endpoint used unless the client is pointed elsewhere.
pub const DEFAULT_ENDPOINT: &str = "http://api.getclicky.com/api/stats/4/";

/// Header carrying the API's explanation for a failed request.
const ERROR_MESSAGE_HEADER: &str = "X-Application-Error-Message";

/// Site credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
  pub site_id: String,
  pub site_key: String,
}

impl Credentials {
  pub fn new(site_id: impl Into<String>, site_key: impl Into<String>) -> Self {
    Self {
      site_id: site_id.into(),
      site_key: site_key.into(),
    }
  }
}

/// Clicky API client with a durable per-site report cache.
///
/// The cache is loaded once on construction and written back after every
/// successful fetch. Lookups are keyed by report type only, so a cached report
/// is returned even when it was fetched with different arguments.
pub struct ClickyClient<F, S> {
  credentials: Credentials,
  fetcher: F,
  store: S,
  cache: CacheStore,
  endpoint: Url,
  secure: bool,
  decoders: Decoders,
}

impl<F: Fetch, S: OptionStore> ClickyClient<F, S> {
  /// Create a client, loading the report cache from `store`.
  pub fn new(credentials: Credentials, fetcher: F, store: S) -> Self {
    let cache = CacheStore::load(&store);
    let endpoint = Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL");

    Self {
      credentials,
      fetcher,
      store,
      cache,
      endpoint,
      secure: false,
      decoders: Decoders::default(),
    }
  }

  /// Send requests to another stats endpoint.
  pub fn with_endpoint(mut self, endpoint: Url) -> Self {
    self.endpoint = endpoint;
    self
  }

  /// Whether the calling context is secure; upgrades requests to https.
  pub fn with_secure(mut self, secure: bool) -> Self {
    self.secure = secure;
    self
  }

  /// Replace the decoder for one output format.
  pub fn with_decoder(mut self, format: OutputFormat, decoder: Box<dyn Decoder>) -> Self {
    self.decoders.register(format, decoder);
    self
  }

  pub fn credentials(&self) -> &Credentials {
    &self.credentials
  }

  /// Cached report for this site, if any.
  pub fn cached(&self, report_type: &str) -> Option<&Payload> {
    self.cache.get(&self.credentials.site_id, report_type)
  }

  /// URL that [`get`](Self::get) would request on a cache miss.
  pub fn request_url(&self, report_type: &str, args: &QueryArgs) -> Url {
    build_url(
      &self.endpoint,
      self.secure,
      &self.credentials,
      report_type,
      args,
    )
  }

  /// Fetch a report, serving it from the cache when present.
  pub async fn get(&mut self, report_type: &str, args: &QueryArgs) -> Result<Payload, ApiError> {
    if let Some(cached) = self.cached(report_type) {
      debug!(site_id = %self.credentials.site_id, report_type, "Report cache hit");
      return Ok(cached.clone());
    }

    let url = self.request_url(report_type, args);
    debug!(url = %redact(&url), "Requesting report");

    let response = self.fetcher.fetch(&url).await?;

    if response.status != 200 {
      let message = response
        .header(ERROR_MESSAGE_HEADER)
        .unwrap_or_default()
        .to_string();
      return Err(ApiError::RequestFailed { message, response });
    }

    let Some(format) = OutputFormat::from_arg(args.output()) else {
      return Err(ApiError::UnsupportedOutput {
        output: args.output().unwrap_or_default().to_string(),
        response,
      });
    };

    let payload = match self.decoders.decode(format, &response.body) {
      Ok(payload) => payload,
      Err(message) => {
        return Err(ApiError::OutputDecode {
          format,
          message,
          response,
        })
      }
    };

    self
      .cache
      .insert(&self.credentials.site_id, report_type, payload.clone());
    if let Err(e) = self.cache.persist(&self.store) {
      warn!(error = %e, report_type, "Failed to persist report cache");
    }

    Ok(payload)
  }

  /// Drop every cached report of this site and persist.
  ///
  /// Returns whether the cache was written back.
  pub fn flush_cache(&mut self) -> bool {
    self.cache.flush_site(&self.credentials.site_id);

    match self.cache.persist(&self.store) {
      Ok(()) => true,
      Err(e) => {
        warn!(error = %e, site_id = %self.credentials.site_id, "Failed to persist flushed cache");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStorage, SqliteStorage};
  use crate::clicky::http::testing::ScriptedFetcher;
  use crate::clicky::response::RawResponse;
  use crate::clicky::CACHE_OPTION;
  use color_eyre::{eyre::eyre, Result};
  use serde_json::{json, Value};
  use std::sync::Arc;

  type TestClient = ClickyClient<Arc<ScriptedFetcher>, Arc<MemoryStorage>>;

  fn client(site_id: &str, fetcher: &Arc<ScriptedFetcher>, store: &Arc<MemoryStorage>) -> TestClient {
    ClickyClient::new(
      Credentials::new(site_id, "key"),
      fetcher.clone(),
      store.clone(),
    )
  }

  fn json_args() -> QueryArgs {
    QueryArgs::new().with("output", "json")
  }

  #[tokio::test]
  async fn test_json_response_is_decoded_and_cached() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, r#"{"a":1}"#));

    let mut client = client("123", &fetcher, &store);
    let payload = client.get("pages", &json_args()).await.unwrap();

    assert_eq!(payload, Payload::Json(json!({"a": 1})));
    assert_eq!(client.cached("pages"), Some(&payload));

    let stored = store.load(CACHE_OPTION).unwrap().unwrap();
    assert_eq!(stored["123"]["pages"]["value"], json!({"a": 1}));
  }

  #[tokio::test]
  async fn test_cache_hit_ignores_args() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, r#"[1,2]"#));

    let mut client = client("123", &fetcher, &store);
    let first = client.get("pages", &json_args()).await.unwrap();

    let other_args = QueryArgs::new()
      .with("limit", 99)
      .with("date", "today")
      .with("output", "yaml");
    let second = client.get("pages", &other_args).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.call_count(), 1);
  }

  #[tokio::test]
  async fn test_cache_survives_new_client() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "<xml/>"));

    client("123", &fetcher, &store)
      .get("visitors", &QueryArgs::new())
      .await
      .unwrap();

    let mut again = client("123", &fetcher, &store);
    let payload = again.get("visitors", &QueryArgs::new()).await.unwrap();

    assert_eq!(payload, Payload::Text("<xml/>".to_string()));
    assert_eq!(fetcher.call_count(), 1);
  }

  #[tokio::test]
  async fn test_default_output_is_raw_body() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "<response status=\"ok\"/>"));

    let payload = client("123", &fetcher, &store)
      .get("pages", &QueryArgs::new())
      .await
      .unwrap();

    assert_eq!(payload.as_text(), Some("<response status=\"ok\"/>"));
  }

  #[tokio::test]
  async fn test_request_failed_uses_error_header() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(
      RawResponse::new(404, "").with_header("X-Application-Error-Message", "bad site"),
    );

    let mut client = client("123", &fetcher, &store);
    let err = client.get("pages", &json_args()).await.unwrap_err();

    match err {
      ApiError::RequestFailed { message, response } => {
        assert_eq!(message, "bad site");
        assert_eq!(response.status, 404);
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.cached("pages").is_none());
    assert!(store.load(CACHE_OPTION).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_request_failed_without_header_has_empty_message() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(500, "oops"));

    let err = client("123", &fetcher, &store)
      .get("pages", &json_args())
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::RequestFailed { ref message, .. } if message.is_empty()));
  }

  #[tokio::test]
  async fn test_unsupported_output_is_not_cached() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "a: 1"));

    let mut client = client("123", &fetcher, &store);
    let err = client
      .get("pages", &QueryArgs::new().with("output", "yaml"))
      .await
      .unwrap_err();

    match err {
      ApiError::UnsupportedOutput { output, response } => {
        assert_eq!(output, "yaml");
        assert_eq!(response.body, "a: 1");
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.cached("pages").is_none());
  }

  #[tokio::test]
  async fn test_malformed_json_is_decode_error() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "{broken"));

    let mut client = client("123", &fetcher, &store);
    let err = client.get("pages", &json_args()).await.unwrap_err();

    assert!(matches!(
      err,
      ApiError::OutputDecode {
        format: OutputFormat::Json,
        ..
      }
    ));
    assert_eq!(err.response().map(|r| r.body.as_str()), Some("{broken"));
    assert!(client.cached("pages").is_none());
  }

  #[tokio::test]
  async fn test_transport_error_propagates() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.fail("connection refused");

    let err = client("123", &fetcher, &store)
      .get("pages", &json_args())
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Transport(ref e) if e.0 == "connection refused"));
  }

  #[tokio::test]
  async fn test_flush_only_touches_own_site() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher
      .respond(RawResponse::new(200, "1"))
      .respond(RawResponse::new(200, "2"))
      .respond(RawResponse::new(200, "3"));

    let mut site_a = client("a", &fetcher, &store);
    site_a.get("pages", &json_args()).await.unwrap();
    site_a.get("visitors", &json_args()).await.unwrap();

    let mut site_b = client("b", &fetcher, &store);
    site_b.get("pages", &json_args()).await.unwrap();

    let mut site_a = client("a", &fetcher, &store);
    assert!(site_a.flush_cache());
    assert!(site_a.cached("pages").is_none());
    assert!(site_a.cached("visitors").is_none());

    let reloaded = CacheStore::load(&store);
    assert!(reloaded.site("a").is_none());
    assert_eq!(reloaded.get("b", "pages"), Some(&Payload::Json(json!(3))));
  }

  #[tokio::test]
  async fn test_flush_then_refetch_costs_one_request() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher
      .respond(RawResponse::new(200, r#"{"v":1}"#))
      .respond(RawResponse::new(200, r#"{"v":2}"#));

    let mut client = client("123", &fetcher, &store);
    client.get("pages", &json_args()).await.unwrap();
    client.get("pages", &json_args()).await.unwrap();
    assert_eq!(fetcher.call_count(), 1);

    client.flush_cache();
    let payload = client.get("pages", &json_args()).await.unwrap();
    client.get("pages", &json_args()).await.unwrap();

    assert_eq!(payload, Payload::Json(json!({"v": 2})));
    assert_eq!(fetcher.call_count(), 2);
  }

  #[tokio::test]
  async fn test_secure_request_url() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "[]"));

    let mut client = ClickyClient::new(Credentials::new("123", "abc"), fetcher.clone(), store)
      .with_secure(true);
    let args = QueryArgs::new()
      .with("limit", 20)
      .with("date", "last-30-days")
      .with("output", "json");
    client.get("pages", &args).await.unwrap();

    let calls = fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].scheme(), "https");
    assert!(calls[0]
      .as_str()
      .contains("type=pages&limit=20&date=last-30-days&site_id=123&sitekey=abc"));
  }

  #[tokio::test]
  async fn test_custom_endpoint_gets_trailing_slash() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());

    let client = client("123", &fetcher, &store)
      .with_endpoint(Url::parse("http://localhost:8080/stats").unwrap());
    let url = client.request_url("pages", &QueryArgs::new());

    assert_eq!(
      url.as_str(),
      "http://localhost:8080/stats/?type=pages&site_id=123&sitekey=key"
    );
  }

  struct Upper;

  impl Decoder for Upper {
    fn decode(&self, body: &str) -> std::result::Result<Payload, String> {
      Ok(Payload::Text(body.to_uppercase()))
    }
  }

  #[tokio::test]
  async fn test_custom_decoder() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let store = Arc::new(MemoryStorage::new());
    fetcher.respond(RawResponse::new(200, "a,b"));

    let mut client =
      client("123", &fetcher, &store).with_decoder(OutputFormat::Csv, Box::new(Upper));
    let payload = client
      .get("pages", &QueryArgs::new().with("output", "csv"))
      .await
      .unwrap();

    assert_eq!(payload.as_text(), Some("A,B"));
  }

  /// Store whose writes always fail.
  struct ReadOnlyStore;

  impl OptionStore for ReadOnlyStore {
    fn load(&self, _key: &str) -> Result<Option<Value>> {
      Ok(None)
    }

    fn save(&self, _key: &str, _value: &Value) -> Result<()> {
      Err(eyre!("read-only"))
    }
  }

  #[tokio::test]
  async fn test_persist_failure_still_returns_payload() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond(RawResponse::new(200, "[]"));

    let mut client = ClickyClient::new(Credentials::new("1", "k"), fetcher.clone(), ReadOnlyStore);
    let payload = client.get("pages", &json_args()).await.unwrap();

    assert_eq!(payload, Payload::Json(json!([])));
    assert!(!client.flush_cache());
  }

  #[tokio::test]
  async fn test_sqlite_backed_cache() {
    let fetcher = Arc::new(ScriptedFetcher::new());
    let storage = SqliteStorage::open_in_memory().unwrap();
    fetcher.respond(RawResponse::new(200, r#"{"a":1}"#));

    let mut first = ClickyClient::new(Credentials::new("1", "k"), fetcher.clone(), storage.clone());
    first.get("pages", &json_args()).await.unwrap();

    let second = ClickyClient::new(Credentials::new("1", "k"), fetcher.clone(), storage);
    assert_eq!(second.cached("pages"), Some(&Payload::Json(json!({"a": 1}))));
  }
}
