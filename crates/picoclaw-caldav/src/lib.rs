//! A minimal CalDAV client: PROPFIND/GET/PUT/DELETE against a Nextcloud-style
//! WebDAV calendar collection. See spec.md §4.2.

pub mod client;
pub mod error;
pub mod ics;
pub mod types;

pub use client::CalDavClient;
pub use error::{CalDavError, Result};
pub use types::{CalDavItem, IcsDateTime, ItemKind, TaskStatus};
