use quick_xml::events::Event;
use quick_xml::reader::Reader;

use picoclaw_core::error::{PicoclawError, Result};

/// One `<outline>` leaf from an OPML feed list — the news skill's config
/// fallback when feeds aren't listed directly in `monitor.feeds` (spec.md
/// §4.4 "Feed source list").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlFeed {
    pub name: String,
    pub xml_url: String,
    pub category: Option<String>,
}

/// Parse an OPML document, collecting every `<outline>` element that
/// carries an `xmlUrl` attribute (folder-only outlines, used purely for
/// grouping, are skipped since they have no feed URL of their own).
pub fn parse_opml(text: &str) -> Result<Vec<OpmlFeed>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();
    // Current ambient category, one slot per open `<outline>` depth; `None`
    // means that depth introduced no new category.
    let mut category_stack: Vec<Option<String>> = Vec::new();
    let current_category = |stack: &[Option<String>]| stack.iter().rev().find_map(|c| c.clone());

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() != b"outline" {
                    continue;
                }
                let (name, xml_url, category) = read_outline_attrs(&e)?;
                match xml_url {
                    Some(url) => {
                        let category = category.or_else(|| current_category(&category_stack));
                        feeds.push(OpmlFeed { name, xml_url: url, category });
                        category_stack.push(None);
                    }
                    None => {
                        // Folder outline: its name becomes the ambient
                        // category for nested outlines until its End.
                        let label = if name.is_empty() { None } else { Some(name) };
                        category_stack.push(label);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() != b"outline" {
                    continue;
                }
                let (name, xml_url, category) = read_outline_attrs(&e)?;
                if let Some(url) = xml_url {
                    let category = category.or_else(|| current_category(&category_stack));
                    feeds.push(OpmlFeed { name, xml_url: url, category });
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"outline" {
                    category_stack.pop();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PicoclawError::Parse(e.to_string())),
            _ => {}
        }
    }

    Ok(feeds)
}

fn read_outline_attrs(e: &quick_xml::events::BytesStart) -> Result<(String, Option<String>, Option<String>)> {
    let mut name = String::new();
    let mut xml_url = None;
    let mut category = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().map_err(|err| PicoclawError::Parse(err.to_string()))?.into_owned();
        match attr.key.as_ref() {
            b"text" => name = value,
            b"title" if name.is_empty() => name = value,
            b"xmlUrl" => xml_url = Some(value),
            b"category" => category = Some(value),
            _ => {}
        }
    }
    Ok((name, xml_url, category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_feed_list() {
        let xml = r#"<opml version="2.0">
<body>
<outline text="BBC World" xmlUrl="https://bbc.example/world.xml" category="world"/>
<outline text="Hacker News" xmlUrl="https://hn.example/rss"/>
</body>
</opml>"#;
        let feeds = parse_opml(xml).unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "BBC World");
        assert_eq!(feeds[0].category.as_deref(), Some("world"));
        assert_eq!(feeds[1].category, None);
    }

    #[test]
    fn skips_folder_outlines_without_xml_url() {
        let xml = r#"<opml><body>
<outline text="Tech"></outline>
</body></opml>"#;
        let feeds = parse_opml(xml).unwrap();
        assert!(feeds.is_empty());
    }

    #[test]
    fn empty_document_parses_as_empty_list() {
        let feeds = parse_opml("<opml><body></body></opml>").unwrap();
        assert!(feeds.is_empty());
    }
}
