//! Three-layer news duplicate detector: canonical URL, body hash, and
//! category-windowed fuzzy title matching, backed by a SQLite store that
//! survives restarts. See spec.md §4.3.

pub mod db;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod types;

pub use engine::{ConflictChecker, DedupEngine};
pub use error::{DedupError, Result};
pub use types::NewsItem;
