//! Small text helpers shared by ingestion and subscription management.

mod text;

pub use text::{normalize_category, strip_control_chars, truncate_chars};
