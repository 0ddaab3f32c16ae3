//! Client for the Clicky stats API.
//!
//! Requests are signed with the site credentials, decoded according to the
//! requested output format and cached per `(site_id, report_type)`.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod response;

pub use cache::{CacheStore, CACHE_OPTION};
pub use client::{ClickyClient, Credentials, DEFAULT_ENDPOINT};
pub use error::{ApiError, TransportError};
pub use http::{Fetch, ReqwestFetcher};
pub use request::{OutputFormat, QueryArgs};
pub use response::{Decoder, Decoders, Payload, RawResponse};
