use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped by [`canonical_url`] — the fixed tracking-param
/// set from spec.md §4.1.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "ref",
    "context",
    "source",
    "fbclid",
    "gclid",
];

/// Remove the known tracking query parameters and the fragment, re-emitting
/// the URL with the remaining query parameters in their original order.
///
/// On parse failure the input is returned unchanged (spec.md §4.1).
/// Idempotent: `canonical_url(canonical_url(u)) == canonical_url(u)`.
pub fn canonical_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&kept);
    }
    url.set_fragment(None);

    url.to_string()
}

/// First 12 hex characters of SHA-256 over the canonicalized URL.
///
/// The 48-bit space gives a birthday collision at ~1.7e7 entries —
/// acceptable for the per-day caches bounded to <=100 records (spec.md §4.1).
pub fn id12(raw_url: &str) -> String {
    let canon = canonical_url(raw_url);
    let digest = Sha256::digest(canon.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let u = "https://reuters.com/story/abc?utm_source=rss&id=9#section-2";
        assert_eq!(canonical_url(u), "https://reuters.com/story/abc?id=9");
    }

    #[test]
    fn preserves_non_tracking_query_order() {
        let u = "https://example.com/a?z=1&a=2&utm_medium=email";
        assert_eq!(canonical_url(u), "https://example.com/a?z=1&a=2");
    }

    #[test]
    fn passthrough_on_parse_failure() {
        let u = "not a url at all";
        assert_eq!(canonical_url(u), u);
    }

    #[test]
    fn idempotent() {
        let u = "https://a.example.com/x?utm_source=rss&gclid=zzz&y=1#f";
        let once = canonical_url(u);
        let twice = canonical_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn id12_is_deterministic_function_of_canonical_url() {
        let a = "https://reuters.com/story/abc?utm_source=rss";
        let b = "https://reuters.com/story/abc?utm_source=twitter";
        assert_eq!(id12(a), id12(b));
    }

    #[test]
    fn id12_is_12_hex_chars() {
        let id = id12("https://example.com/x");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
