use regex::Regex;
use tracing::debug;

use crate::error::{CalDavError, Result};
use crate::ics::{emit_item, parse_item};
use crate::types::CalDavItem;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getetag/>
  </d:prop>
</d:propfind>"#;

/// A CalDAV collection client scoped to one WebDAV collection URL (tasks,
/// calendar, ...). See spec.md §4.2. Cheap to clone: `reqwest::Client` is
/// itself an `Arc` handle, so sharing one collection client across skills
/// (task/deadline/habit all talk to the tasks collection) costs nothing.
#[derive(Clone)]
pub struct CalDavClient {
    client: reqwest::Client,
    collection_url: String,
    username: String,
    password: String,
}

impl CalDavClient {
    pub fn new(collection_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_timeout(collection_url, username, password, DEFAULT_TIMEOUT_SECONDS)
    }

    pub fn with_timeout(
        collection_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_default();
        Self {
            client,
            collection_url: collection_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    fn item_url(&self, filename: &str) -> String {
        format!("{}/{}", self.collection_url.trim_end_matches('/'), filename)
    }

    /// PROPFIND depth:1 the collection and scan the response body for
    /// `.ics` hrefs. Tolerant to namespace-prefix variance across server
    /// implementations — regex scan rather than a full XML parse
    /// (spec.md §4.2).
    pub async fn list(&self) -> Result<Vec<String>> {
        let resp = self
            .auth(self.client.request(
                reqwest::Method::from_bytes(b"PROPFIND").unwrap(),
                &self.collection_url,
            ))
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() && status.as_u16() != 207 {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalDavError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        Ok(extract_ics_hrefs(&body))
    }

    /// GET and parse a single item by filename (`<uid>.ics`).
    pub async fn get(&self, filename: &str) -> Result<CalDavItem> {
        let url = self.item_url(filename);
        let resp = self.auth(self.client.get(&url)).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(CalDavError::NotFound(filename.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalDavError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        let text = resp.text().await?;
        parse_item(&text)
    }

    /// PUT an item, synthesizing its ICS envelope. Success is 201 (created)
    /// or 204 (replaced).
    pub async fn put(&self, item: &CalDavItem) -> Result<()> {
        let url = self.item_url(&item.filename());
        let body = emit_item(item);
        let resp = self
            .auth(self.client.put(&url))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if status.as_u16() == 201 || status.as_u16() == 204 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CalDavError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    /// DELETE an item. Success is 200 or 204; a missing item is treated as
    /// already-deleted.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let url = self.item_url(filename);
        let resp = self.auth(self.client.delete(&url)).send().await?;
        let status = resp.status();
        if status.as_u16() == 200 || status.as_u16() == 204 || status.as_u16() == 404 {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CalDavError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    /// GET the existing item, apply `overlay`, PUT the result back,
    /// preserving the UID. If the item does not yet exist, it is created.
    pub async fn merge<F>(&self, filename: &str, overlay: F) -> Result<CalDavItem>
    where
        F: FnOnce(&mut CalDavItem),
    {
        let mut item = match self.get(filename).await {
            Ok(item) => item,
            Err(CalDavError::NotFound(_)) => {
                debug!(filename, "merge target missing, creating new item");
                let uid = filename.trim_end_matches(".ics").to_string();
                let mut item = CalDavItem::new_todo(String::new());
                item.uid = uid;
                item
            }
            Err(e) => return Err(e),
        };
        overlay(&mut item);
        self.put(&item).await?;
        Ok(item)
    }
}

fn extract_ics_hrefs(body: &str) -> Vec<String> {
    let re = Regex::new(r"(?i)<[a-z0-9]*:?href[^>]*>([^<]+)</[a-z0-9]*:?href>").unwrap();
    re.captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|href| href.to_lowercase().ends_with(".ics"))
        .filter_map(|href| href.rsplit('/').next().map(|s| s.to_string()))
        .map(|filename| urlencoding::decode(&filename).map(|s| s.to_string()).unwrap_or(filename))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ics_hrefs_case_insensitive() {
        let body = r#"<d:multistatus xmlns:d="DAV:">
            <d:response><d:href>/dav/calendars/user/tasks/abc-123.ICS</d:href></d:response>
            <d:response><D:HREF>/dav/calendars/user/tasks/def-456.ics</D:HREF></d:response>
            <d:response><d:href>/dav/calendars/user/tasks/</d:href></d:response>
        </d:multistatus>"#;
        let hrefs = extract_ics_hrefs(body);
        assert_eq!(hrefs, vec!["abc-123.ICS", "def-456.ics"]);
    }

    #[test]
    fn extracts_ics_hrefs_without_namespace_prefix() {
        let body = r#"<multistatus><response><href>/tasks/xyz.ics</href></response></multistatus>"#;
        let hrefs = extract_ics_hrefs(body);
        assert_eq!(hrefs, vec!["xyz.ics"]);
    }

    #[test]
    fn item_url_joins_collection_and_filename() {
        let client = CalDavClient::new("https://cloud.example.com/dav/tasks/", "u", "p");
        assert_eq!(
            client.item_url("abc.ics"),
            "https://cloud.example.com/dav/tasks/abc.ics"
        );
    }
}
