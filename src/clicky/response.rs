//! Raw responses, decoded payloads and the per-format decoders.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::request::OutputFormat;

/// Response as handed back by the HTTP collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
  pub status: u16,
  /// Header names are stored lower-cased
  pub headers: BTreeMap<String, String>,
  pub body: String,
}

impl RawResponse {
  pub fn new(status: u16, body: impl Into<String>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.into());
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }
}

/// Decoded response body, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
  Json(Value),
  Text(String),
}

impl Payload {
  pub fn as_json(&self) -> Option<&Value> {
    match self {
      Self::Json(v) => Some(v),
      Self::Text(_) => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Json(_) => None,
      Self::Text(s) => Some(s),
    }
  }
}

/// Turns a response body into a payload for one output format.
pub trait Decoder: Send + Sync {
  /// Decode `body`, or describe why it is malformed.
  fn decode(&self, body: &str) -> Result<Payload, String>;
}

/// Parses the body as JSON.
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
  fn decode(&self, body: &str) -> Result<Payload, String> {
    serde_json::from_str(body)
      .map(Payload::Json)
      .map_err(|e| e.to_string())
  }
}

/// Returns the body unchanged.
pub struct Passthrough;

impl Decoder for Passthrough {
  fn decode(&self, body: &str) -> Result<Payload, String> {
    Ok(Payload::Text(body.to_string()))
  }
}

/// Decoder registry keyed by output format.
pub struct Decoders {
  by_format: HashMap<OutputFormat, Box<dyn Decoder>>,
}

impl Default for Decoders {
  fn default() -> Self {
    let mut decoders = Self {
      by_format: HashMap::new(),
    };
    decoders.register(OutputFormat::Json, Box::new(JsonDecoder));
    // No native PHP unserializer here, hand back the raw text
    decoders.register(OutputFormat::Php, Box::new(Passthrough));
    decoders.register(OutputFormat::Xml, Box::new(Passthrough));
    decoders.register(OutputFormat::Csv, Box::new(Passthrough));
    decoders.register(OutputFormat::Default, Box::new(Passthrough));
    decoders
  }
}

impl Decoders {
  /// Replace the decoder used for `format`.
  pub fn register(&mut self, format: OutputFormat, decoder: Box<dyn Decoder>) {
    self.by_format.insert(format, decoder);
  }

  pub fn decode(&self, format: OutputFormat, body: &str) -> Result<Payload, String> {
    match self.by_format.get(&format) {
      Some(decoder) => decoder.decode(body),
      None => Passthrough.decode(body),
    }
  }
}
