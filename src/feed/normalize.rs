//! Maps RSS 2.0 and Atom element trees onto the canonical [`Feed`] model.
//!
//! Every canonical field is resolved through a short fallback chain of raw
//! shapes (element text, CDATA, attribute). The first shape present wins.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use super::model::{Feed, Item};
use super::xml::{parse_document, Element, Node};

/// First `src="..."` inside an HTML fragment.
static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)src="([^"\s]+)""#).expect("valid src pattern"));

/// Errors for XML that cannot be read as a feed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not well-formed XML
    #[error("XML parse error: {0}")]
    Xml(String),
    /// Well-formed XML, but neither an RSS channel nor an Atom feed
    #[error("Not an RSS or Atom document: {0}")]
    UnrecognizedFormat(String),
    /// The feed element has no `title` child
    #[error("Feed has no title element")]
    MissingTitle,
}

/// One raw representation of a value inside the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawField<'a> {
    TextNode(&'a str),
    AttributeRef(&'a str),
    CdataNode(&'a str),
    Missing,
}

impl<'a> RawField<'a> {
    fn text(el: Option<&'a Element>) -> Self {
        el.and_then(|e| e.text.as_deref())
            .map_or(RawField::Missing, RawField::TextNode)
    }

    fn cdata(el: Option<&'a Element>) -> Self {
        el.and_then(|e| e.cdata.as_deref())
            .map_or(RawField::Missing, RawField::CdataNode)
    }

    fn attr(el: Option<&'a Element>, name: &str) -> Self {
        el.and_then(|e| e.attr(name))
            .map_or(RawField::Missing, RawField::AttributeRef)
    }

    fn value(self) -> Option<&'a str> {
        match self {
            RawField::TextNode(v) | RawField::AttributeRef(v) | RawField::CdataNode(v) => Some(v),
            RawField::Missing => None,
        }
    }
}

/// Returns the first present value of the chain.
fn resolve<'a>(chain: impl IntoIterator<Item = RawField<'a>>) -> Option<String> {
    chain
        .into_iter()
        .find_map(RawField::value)
        .map(str::to_owned)
}

/// Text, else CDATA.
fn text_or_cdata(el: Option<&Element>) -> [RawField<'_>; 2] {
    [RawField::text(el), RawField::cdata(el)]
}

/// CDATA, else text. Used where sources usually wrap values in CDATA.
fn literal(el: Option<&Element>) -> [RawField<'_>; 2] {
    [RawField::cdata(el), RawField::text(el)]
}

fn related<'a>(links: &[&'a Element], rel: &str) -> Option<&'a Element> {
    links.iter().copied().find(|l| l.attr("rel") == Some(rel))
}

/// Parses raw feed text and normalizes it in one step.
pub fn parse_feed(text: &str, source: &str, item_limit: Option<usize>) -> Result<Feed, ParseError> {
    let root = parse_document(text)?;
    normalize(&root, source, item_limit)
}

/// Normalizes a parsed document into a [`Feed`].
///
/// The root must be an Atom `feed`, an RSS `rss` wrapping a `channel`, or a
/// bare `channel`. With `item_limit`, only the first N entries are kept.
///
/// # Errors
///
/// - [`ParseError::UnrecognizedFormat`] for any other root
/// - [`ParseError::MissingTitle`] when the feed has no `title` element
pub fn normalize(
    root: &Element,
    source: &str,
    item_limit: Option<usize>,
) -> Result<Feed, ParseError> {
    let data = feed_element(root)?;

    let title = data.child("title").ok_or(ParseError::MissingTitle)?;
    let links = data.node("link").all();
    let author = data.child("author");

    let entries = match data.node("item") {
        Node::Missing => data.node("entry"),
        found => found,
    };

    // A lone entry is not a collection; the list is reported as unreadable
    // instead of being wrapped.
    let items = match entries {
        Node::Many(entries) => Some(
            entries
                .into_iter()
                .take(item_limit.unwrap_or(usize::MAX))
                .map(normalize_item)
                .collect(),
        ),
        Node::One(_) | Node::Missing => None,
    };

    Ok(Feed {
        title: resolve(text_or_cdata(Some(title))),
        link: resolve([
            RawField::text(links.first().copied()),
            RawField::attr(related(&links, "alternate"), "href"),
        ]),
        self_url: resolve([RawField::attr(related(&links, "self"), "href")]),
        author: resolve([
            RawField::text(author),
            RawField::text(author.and_then(|a| a.child("name"))),
        ]),
        description: resolve([RawField::text(data.child("description"))]),
        image: resolve([RawField::text(
            data.child("image").and_then(|i| i.child("url")),
        )]),
        source: source.to_owned(),
        items,
    })
}

fn feed_element(root: &Element) -> Result<&Element, ParseError> {
    match root.name.as_str() {
        "feed" | "channel" => Ok(root),
        "rss" => root
            .child("channel")
            .ok_or_else(|| ParseError::UnrecognizedFormat("<rss> without <channel>".to_owned())),
        other => Err(ParseError::UnrecognizedFormat(format!(
            "unexpected root element <{}>",
            other
        ))),
    }
}

fn normalize_item(entry: &Element) -> Item {
    let group = entry.child("media:group");

    Item {
        title: resolve(text_or_cdata(entry.child("title"))),
        published_at: resolve([
            RawField::text(entry.child("pubDate")),
            RawField::text(entry.child("published")),
            RawField::text(entry.child("updated")),
            RawField::text(entry.child("dc:date")),
        ]),
        link: item_link(entry),
        guid: resolve([
            RawField::text(entry.child("guid")),
            RawField::text(entry.child("id")),
        ]),
        author: item_author(entry),
        thumbnail: item_thumbnail(entry, group),
        description: resolve(
            text_or_cdata(entry.child("description"))
                .into_iter()
                .chain(text_or_cdata(entry.child("summary")))
                .chain([RawField::text(
                    group.and_then(|g| g.child("media:description")),
                )]),
        ),
        content: resolve(
            text_or_cdata(entry.child("content:encoded"))
                .into_iter()
                .chain(text_or_cdata(entry.child("content"))),
        ),
        categories: item_categories(entry),
    }
}

fn item_link(entry: &Element) -> Option<String> {
    match entry.node("link") {
        Node::Missing => None,
        Node::One(link) => resolve([
            RawField::attr(Some(link), "href"),
            RawField::text(Some(link)),
        ]),
        Node::Many(links) => resolve([RawField::attr(related(&links, "alternate"), "href")]),
    }
}

fn item_author(entry: &Element) -> Option<String> {
    let author = entry.child("author");
    resolve(
        [
            RawField::text(author.and_then(|a| a.child("name"))),
            RawField::text(author),
        ]
        .into_iter()
        .chain(literal(entry.child("dc:author")))
        .chain(literal(entry.child("dc:creator"))),
    )
}

fn item_thumbnail(entry: &Element, group: Option<&Element>) -> Option<String> {
    let media_content = entry
        .node("media:content")
        .all()
        .into_iter()
        .find(|c| c.attr("url").is_some());

    resolve([
        RawField::attr(group.and_then(|g| g.child("media:thumbnail")), "url"),
        RawField::attr(entry.child("media:thumbnail"), "url"),
        RawField::attr(media_content, "url"),
    ])
    .or_else(|| {
        let html = resolve(literal(entry.child("content:encoded")))?;
        first_src(&html)
    })
}

fn first_src(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

fn item_categories(entry: &Element) -> Vec<String> {
    let category = |el: &Element| {
        resolve(
            literal(Some(el))
                .into_iter()
                .chain([RawField::attr(Some(el), "term")]),
        )
    };

    match entry.node("category") {
        Node::Missing => Vec::new(),
        Node::One(el) => category(el).into_iter().collect(),
        Node::Many(els) => els.into_iter().filter_map(category).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "https://example.com/feed";

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"
     xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:media="http://search.yahoo.com/mrss/"
     xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <author>Jane Doe</author>
    <item>
        <title>First post</title>
        <link>https://example.com/posts/1</link>
        <guid>post-1</guid>
        <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
        <author>Jane Doe</author>
        <media:thumbnail url="https://example.com/img/1.jpg"/>
        <description>Short summary</description>
        <content:encoded><![CDATA[<p>Full body</p>]]></content:encoded>
        <category>rust</category>
        <category>feeds</category>
    </item>
    <item>
        <title>Second post</title>
        <link>https://example.com/posts/2</link>
        <guid>post-2</guid>
        <pubDate>Tue, 07 Jan 2025 10:00:00 GMT</pubDate>
        <author>Jane Doe</author>
        <description>Another summary</description>
    </item>
</channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:media="http://search.yahoo.com/mrss/">
    <title>Example Blog</title>
    <link rel="alternate" href="https://example.com/"/>
    <author><name>Jane Doe</name></author>
    <entry>
        <title>First post</title>
        <link rel="alternate" href="https://example.com/posts/1"/>
        <id>post-1</id>
        <published>Mon, 06 Jan 2025 10:00:00 GMT</published>
        <author><name>Jane Doe</name></author>
        <media:thumbnail url="https://example.com/img/1.jpg"/>
        <summary>Short summary</summary>
        <content type="html">&lt;p&gt;Full body&lt;/p&gt;</content>
        <category term="rust"/>
        <category term="feeds"/>
    </entry>
    <entry>
        <title>Second post</title>
        <link rel="alternate" href="https://example.com/posts/2"/>
        <id>post-2</id>
        <published>Tue, 07 Jan 2025 10:00:00 GMT</published>
        <author><name>Jane Doe</name></author>
        <summary>Another summary</summary>
    </entry>
</feed>"#;

    fn rss_with_items(items: &str) -> String {
        format!(
            "<rss><channel><title>T</title><link>https://example.com/</link>{}</channel></rss>",
            items
        )
    }

    fn items_of(feed: &Feed) -> &[Item] {
        feed.items.as_deref().expect("feed should have items")
    }

    #[test]
    fn test_rss_channel_fields() {
        let xml = r#"<rss version="2.0"><channel>
            <title>Example</title>
            <link>https://example.com/</link>
            <description>About things</description>
            <image><url>https://example.com/logo.png</url><title>Logo</title></image>
            <item><title>a</title><link>https://example.com/a</link></item>
            <item><title>b</title><link>https://example.com/b</link></item>
        </channel></rss>"#;

        let feed = parse_feed(xml, SOURCE, None).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example"));
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        assert_eq!(feed.self_url, None);
        assert_eq!(feed.description.as_deref(), Some("About things"));
        assert_eq!(feed.image.as_deref(), Some("https://example.com/logo.png"));
        assert_eq!(feed.source, SOURCE);
        assert_eq!(items_of(&feed).len(), 2);
    }

    #[test]
    fn test_atom_links_and_self_url() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <title>Atom</title>
            <link rel="self" href="https://example.com/atom.xml"/>
            <link rel="alternate" href="https://example.com/"/>
            <entry><title>a</title><link href="https://example.com/a"/></entry>
            <entry><title>b</title><link href="https://example.com/b"/></entry>
        </feed>"#;

        let feed = parse_feed(xml, SOURCE, None).unwrap();
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        assert_eq!(feed.self_url.as_deref(), Some("https://example.com/atom.xml"));
        let links: Vec<_> = items_of(&feed).iter().map(|i| i.link.as_deref()).collect();
        assert_eq!(
            links,
            vec![Some("https://example.com/a"), Some("https://example.com/b")]
        );
    }

    #[test]
    fn test_rss_and_atom_normalize_identically() {
        let rss = parse_feed(RSS, SOURCE, None).unwrap();
        let atom = parse_feed(ATOM, SOURCE, None).unwrap();

        assert_eq!(rss, atom);

        let first = &items_of(&rss)[0];
        assert_eq!(first.guid.as_deref(), Some("post-1"));
        assert_eq!(first.content.as_deref(), Some("<p>Full body</p>"));
        assert_eq!(first.categories, vec!["rust", "feeds"]);
        assert_eq!(
            first.thumbnail.as_deref(),
            Some("https://example.com/img/1.jpg")
        );
    }

    #[test]
    fn test_single_or_zero_entries_yield_null_items() {
        let single = rss_with_items("<item><title>only</title></item>");
        let feed = parse_feed(&single, SOURCE, None).unwrap();
        assert_eq!(feed.items, None);
        assert_eq!(feed.title.as_deref(), Some("T"));

        let none = rss_with_items("");
        assert_eq!(parse_feed(&none, SOURCE, None).unwrap().items, None);
    }

    #[test]
    fn test_item_limit_keeps_first_entries_in_order() {
        let xml = rss_with_items(
            "<item><link>https://e.com/1</link></item>\
             <item><link>https://e.com/2</link></item>\
             <item><link>https://e.com/3</link></item>",
        );
        let feed = parse_feed(&xml, SOURCE, Some(2)).unwrap();
        let links: Vec<_> = items_of(&feed).iter().map(|i| i.link.clone()).collect();
        assert_eq!(
            links,
            vec![Some("https://e.com/1".to_owned()), Some("https://e.com/2".to_owned())]
        );
    }

    #[test]
    fn test_html_entities_do_not_reject_feed() {
        let xml = "<rss><channel><title>T&nbsp;x</title>\
                   <item><title>A&mdash;B</title><link>https://e.com/1</link></item>\
                   <item><title>C</title><link>https://e.com/2</link></item>\
                   </channel></rss>";
        let feed = parse_feed(xml, SOURCE, None).unwrap();
        assert_eq!(feed.title.as_deref(), Some("T\u{a0}x"));
        assert_eq!(items_of(&feed)[0].title.as_deref(), Some("A\u{2014}B"));
    }

    #[test]
    fn test_missing_title_is_structural_error() {
        let xml = "<rss><channel><link>https://e.com/</link></channel></rss>";
        assert_eq!(parse_feed(xml, SOURCE, None), Err(ParseError::MissingTitle));
    }

    #[test]
    fn test_unrecognized_root_is_error() {
        let result = parse_feed("<html><body/></html>", SOURCE, None);
        assert!(matches!(result, Err(ParseError::UnrecognizedFormat(_))));

        let result = parse_feed("<rss version=\"2.0\"/>", SOURCE, None);
        assert!(matches!(result, Err(ParseError::UnrecognizedFormat(_))));
    }

    #[test]
    fn test_thumbnail_fallback_chain() {
        let xml = rss_with_items(
            r#"<item>
                <media:group>
                    <media:thumbnail url="https://img/group.jpg"/>
                    <media:description>From group</media:description>
                </media:group>
                <media:thumbnail url="https://img/direct.jpg"/>
            </item>
            <item>
                <media:thumbnail url="https://img/direct.jpg"/>
                <media:content url="https://img/content.jpg"/>
            </item>
            <item>
                <media:content medium="video"/>
                <media:content url="https://img/content.jpg"/>
            </item>
            <item>
                <content:encoded><![CDATA[<p><img SRC="https://img/encoded.png" alt="x"></p>]]></content:encoded>
            </item>
            <item><title>none</title></item>"#,
        );
        let feed = parse_feed(&xml, SOURCE, None).unwrap();
        let thumbs: Vec<_> = items_of(&feed)
            .iter()
            .map(|i| i.thumbnail.as_deref())
            .collect();
        assert_eq!(
            thumbs,
            vec![
                Some("https://img/group.jpg"),
                Some("https://img/direct.jpg"),
                Some("https://img/content.jpg"),
                Some("https://img/encoded.png"),
                None,
            ]
        );
        assert_eq!(
            items_of(&feed)[0].description.as_deref(),
            Some("From group")
        );
    }

    #[test]
    fn test_multi_link_item_uses_its_own_alternate() {
        let xml = r#"<feed>
            <title>Atom</title>
            <link rel="alternate" href="https://example.com/"/>
            <entry>
                <title>a</title>
                <link rel="replies" href="https://example.com/a/comments"/>
                <link rel="alternate" href="https://example.com/a"/>
            </entry>
            <entry>
                <title>b</title>
                <link rel="enclosure" href="https://example.com/b.mp3"/>
                <link rel="replies" href="https://example.com/b/comments"/>
            </entry>
        </feed>"#;

        let feed = parse_feed(xml, SOURCE, None).unwrap();
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        let items = items_of(&feed);
        assert_eq!(items[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(items[1].link, None);
    }

    #[test]
    fn test_title_cdata_and_namespaced_author() {
        let xml = rss_with_items(
            r#"<item>
                <title><![CDATA[Tom & Jerry]]></title>
                <dc:author><![CDATA[Alice]]></dc:author>
            </item>
            <item>
                <title>Plain</title>
                <dc:creator>Bob</dc:creator>
            </item>"#,
        );
        let feed = parse_feed(&xml, SOURCE, None).unwrap();
        let items = items_of(&feed);
        assert_eq!(items[0].title.as_deref(), Some("Tom & Jerry"));
        assert_eq!(items[0].author.as_deref(), Some("Alice"));
        assert_eq!(items[1].author.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_categories_single_list_and_absent() {
        let xml = rss_with_items(
            r#"<item><category>solo</category></item>
            <item>
                <category><![CDATA[first]]></category>
                <category>second</category>
            </item>
            <item><title>no categories</title></item>"#,
        );
        let feed = parse_feed(&xml, SOURCE, None).unwrap();
        let items = items_of(&feed);
        assert_eq!(items[0].categories, vec!["solo"]);
        assert_eq!(items[1].categories, vec!["first", "second"]);
        assert!(items[2].categories.is_empty());
    }

    #[test]
    fn test_guid_is_not_synthesized_from_link() {
        let xml = rss_with_items(
            "<item><link>https://e.com/1</link></item>\
             <item><guid>g2</guid><link>https://e.com/2</link></item>",
        );
        let feed = parse_feed(&xml, SOURCE, None).unwrap();
        let items = items_of(&feed);
        assert_eq!(items[0].guid, None);
        assert_eq!(items[1].guid.as_deref(), Some("g2"));
    }

    #[test]
    fn test_description_and_content_are_independent() {
        let xml = rss_with_items(
            r#"<item><content:encoded>body only</content:encoded></item>
            <item><description><![CDATA[<b>summary only</b>]]></description></item>"#,
        );
        let feed = parse_feed(&xml, SOURCE, None).unwrap();
        let items = items_of(&feed);
        assert_eq!(items[0].description, None);
        assert_eq!(items[0].content.as_deref(), Some("body only"));
        assert_eq!(items[1].description.as_deref(), Some("<b>summary only</b>"));
        assert_eq!(items[1].content, None);
    }
}
