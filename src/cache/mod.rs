//! Durable storage collaborators for the API client and the widget.
//!
//! Two kinds of storage are modelled here:
//! - options: opaque JSON blobs under a fixed name, no expiry
//! - transients: strings under a name that expire after a time-to-live

mod storage;
mod traits;

pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{OptionStore, TransientStore};
