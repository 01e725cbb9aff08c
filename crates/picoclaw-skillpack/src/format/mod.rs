//! Shared parsers for the flat-file mirrors the skills read and write
//! alongside their CalDAV/HTTP round trips. Consolidated here instead of
//! duplicated per skill (spec.md §9 REDESIGN FLAGS).

pub mod ics_xml;
pub mod opml;

pub use ics_xml::{parse_mirror, parse_mirror_str, write_mirror, MirrorEntry};
pub use opml::{parse_opml, OpmlFeed};
