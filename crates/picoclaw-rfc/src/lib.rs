//! RFC cache codec — the inter-skill data bus.
//!
//! A dated append-only plaintext file under the briefing composer's
//! workspace. Records are tagged with a stable ID derived from a canonical
//! URL; files expire by TTL in their header. See spec.md §4.1.

pub mod file;
pub mod record;
pub mod url;

pub use file::{parse_file, write_file};
pub use record::{encode_record, parse_record, RfcRecord};
pub use url::{canonical_url, id12};
