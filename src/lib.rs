//! Clicky stats API client and a popular posts widget built on it.
//!
//! - [`clicky`]: signed report requests with a durable per-site cache
//! - [`widget`]: the most visited posts rendered as an HTML list
//! - [`cache`]: the storage collaborators both of them persist through

pub mod cache;
pub mod clicky;
pub mod config;
pub mod logging;
pub mod widget;
