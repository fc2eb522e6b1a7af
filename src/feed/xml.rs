//! Generic element tree built from raw feed XML.
//!
//! The normalizer never looks at XML tokens directly. It works on this tree,
//! where every element exposes its text, its CDATA, its attributes and its
//! children by (qualified) tag name. A child name that occurs more than once
//! is seen as a list, the way compact XML-to-object converters present it.

use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use super::normalize::ParseError;

/// One XML element with everything the normalizer can ask about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Qualified name, namespace prefix included (`media:thumbnail`).
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Unescaped character data, all text segments concatenated.
    pub text: Option<String>,
    /// CDATA sections, concatenated.
    pub cdata: Option<String>,
    pub children: Vec<Element>,
}

/// Result of looking up a child by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<'a> {
    Missing,
    One(&'a Element),
    Many(Vec<&'a Element>),
}

impl<'a> Node<'a> {
    /// First element of the node, whichever shape it has.
    pub fn first(&self) -> Option<&'a Element> {
        match self {
            Node::Missing => None,
            Node::One(el) => Some(*el),
            Node::Many(els) => els.first().copied(),
        }
    }

    /// All elements of the node in document order.
    pub fn all(&self) -> Vec<&'a Element> {
        match self {
            Node::Missing => Vec::new(),
            Node::One(el) => vec![*el],
            Node::Many(els) => els.clone(),
        }
    }
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Looks up children with the given qualified name.
    pub fn node(&self, name: &str) -> Node<'_> {
        let mut found: Vec<&Element> = self.children.iter().filter(|c| c.name == name).collect();
        match found.len() {
            0 => Node::Missing,
            1 => Node::One(found.remove(0)),
            _ => Node::Many(found),
        }
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn push_text(&mut self, segment: &str) {
        if segment.is_empty() {
            return;
        }
        self.text.get_or_insert_with(String::new).push_str(segment);
    }

    fn push_cdata(&mut self, segment: &str) {
        self.cdata.get_or_insert_with(String::new).push_str(segment);
    }
}

/// Parses a full XML document and returns its root element.
///
/// Declarations, comments, processing instructions and doctypes are skipped.
/// Entity declarations are never expanded (see SEC-002 in `Cargo.toml`).
/// HTML named entities such as `&nbsp;` are resolved; any other unknown
/// entity reference is a parse error.
pub fn parse_document(text: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    // Open elements, innermost last.
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(open_element(&e, &reader)?);
            }
            Ok(Event::Empty(e)) => {
                let el = open_element(&e, &reader)?;
                close_into(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unexpected closing tag".to_owned()))?;
                close_into(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(e)) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = e
                        .unescape_with(resolve_entity)
                        .map_err(|e| ParseError::Xml(e.to_string()))?;
                    current.push_text(&unescaped);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(current) = stack.last_mut() {
                    current.push_cdata(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| ParseError::Xml("document has no root element".to_owned()))
}

fn open_element(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut el = Element::new(name);

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(element = %el.name, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value_with(reader.decoder(), resolve_entity)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        el.attributes.insert(key, value.into_owned());
    }

    Ok(el)
}

/// XML's five predefined entities, then the HTML5 named set.
fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
}

fn close_into(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(ParseError::Xml("multiple root elements".to_owned())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_cdata_and_attributes() {
        let doc = parse_document(
            r#"<?xml version="1.0"?>
<item>
    <title><![CDATA[Hello <b>world</b>]]></title>
    <link href="https://example.com/a" rel="alternate"/>
    <description>Fish &amp; chips</description>
</item>"#,
        )
        .unwrap();

        assert_eq!(doc.name, "item");
        let title = doc.child("title").unwrap();
        assert_eq!(title.cdata.as_deref(), Some("Hello <b>world</b>"));
        assert_eq!(title.text, None);

        let link = doc.child("link").unwrap();
        assert_eq!(link.attr("href"), Some("https://example.com/a"));
        assert_eq!(link.attr("rel"), Some("alternate"));

        assert_eq!(
            doc.child("description").unwrap().text.as_deref(),
            Some("Fish & chips")
        );
    }

    #[test]
    fn test_repeated_children_become_many() {
        let doc = parse_document("<c><item>1</item><item>2</item><one>x</one></c>").unwrap();

        match doc.node("item") {
            Node::Many(items) => {
                let texts: Vec<_> = items.iter().map(|i| i.text.as_deref()).collect();
                assert_eq!(texts, vec![Some("1"), Some("2")]);
            }
            other => panic!("Expected Many, got {:?}", other),
        }
        assert!(matches!(doc.node("one"), Node::One(_)));
        assert_eq!(doc.node("missing"), Node::Missing);
    }

    #[test]
    fn test_namespaced_names_are_kept() {
        let doc = parse_document(
            r#"<entry xmlns:media="http://search.yahoo.com/mrss/">
<media:thumbnail url="https://img.example.com/t.jpg"/></entry>"#,
        )
        .unwrap();
        let thumb = doc.child("media:thumbnail").unwrap();
        assert_eq!(thumb.attr("url"), Some("https://img.example.com/t.jpg"));
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(matches!(
            parse_document("<rss><channel></rss>"),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(parse_document("<rss>"), Err(ParseError::Xml(_))));
        assert!(matches!(parse_document(""), Err(ParseError::Xml(_))));
    }

    #[test]
    fn test_html_entities_in_text_and_attributes() {
        let doc = parse_document(
            r#"<item><title>Caf&eacute;&nbsp;news &amp; more&hellip;</title><link href="https://e.com/?a=1&amp;b=&copy;"/></item>"#,
        )
        .unwrap();
        assert_eq!(
            doc.child("title").unwrap().text.as_deref(),
            Some("Caf\u{e9}\u{a0}news & more\u{2026}")
        );
        assert_eq!(
            doc.child("link").unwrap().attr("href"),
            Some("https://e.com/?a=1&b=\u{a9}")
        );
    }

    #[test]
    fn test_unknown_entity_is_error() {
        assert!(matches!(
            parse_document("<t>&notarealentity;</t>"),
            Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_node_first_and_all() {
        let doc = parse_document("<c><a>1</a><a>2</a></c>").unwrap();
        let node = doc.node("a");
        assert_eq!(node.first().unwrap().text.as_deref(), Some("1"));
        assert_eq!(node.all().len(), 2);
        assert!(Node::Missing.first().is_none());
    }
}
