//! Popular posts widget rendered from the Clicky "pages" report.

pub mod content;
pub mod html;
pub mod instance;
pub mod render;

pub use content::{ContentItem, ContentResolver, StaticResolver};
pub use instance::{DateRange, WidgetForm, WidgetInstance};
pub use render::{PopularPostsWidget, WidgetChrome};
