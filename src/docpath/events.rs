//! Event sources
//!
//! Adapters turning an XML document into start-element / end-element /
//! characters calls on a [`ContentHandler`]: a streaming one over quick-xml
//! and a tree one over roxmltree. Both resolve namespaces, expand empty
//! elements and drop namespace declarations from the attribute list.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

use crate::error::{Error, Result};
use crate::namespaces::QName;

use super::finder::PathFinder;

/// A resolved attribute of a start-element event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified attribute name
    pub name: QName,
    /// Unescaped value
    pub value: String,
}

impl Attribute {
    /// Create a new attribute
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Receiver of document events
pub trait ContentHandler {
    /// An element was opened
    fn start_element(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()>;

    /// An element was closed
    fn end_element(&mut self, name: &QName) -> Result<()>;

    /// Text or CDATA content
    fn characters(&mut self, text: &str) -> Result<()>;

    /// The document ended
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ContentHandler for PathFinder {
    fn start_element(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()> {
        PathFinder::start_element(self, name, attributes)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        PathFinder::end_element(self, name)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        PathFinder::characters(self, text)
    }

    fn end_document(&mut self) -> Result<()> {
        PathFinder::end_document(self)
    }
}

/// Stream an XML string into a handler
pub fn read_str<H: ContentHandler + ?Sized>(xml: &str, handler: &mut H) -> Result<()> {
    read(NsReader::from_reader(xml.as_bytes()), handler)
}

/// Stream an XML file into a handler
pub fn read_file<H: ContentHandler + ?Sized>(path: impl AsRef<Path>, handler: &mut H) -> Result<()> {
    let file = File::open(path.as_ref())?;
    read(NsReader::from_reader(BufReader::new(file)), handler)
}

fn read<R: BufRead, H: ContentHandler + ?Sized>(mut reader: NsReader<R>, handler: &mut H) -> Result<()> {
    reader.trim_text(true);
    reader.expand_empty_elements(true);

    let mut buf = Vec::new();
    loop {
        let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok(pair) => pair,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "Error parsing XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };
        let namespace = namespace_of(resolved)?;

        match event {
            Event::Start(e) => {
                let name = QName::new(namespace, utf8(e.local_name().as_ref())?);
                let attributes = attributes(&reader, &e)?;
                handler.start_element(&name, &attributes)?;
            }
            Event::End(e) => {
                let name = QName::new(namespace, utf8(e.local_name().as_ref())?);
                handler.end_element(&name)?;
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                handler.characters(&text)?;
            }
            Event::CData(e) => {
                let bytes = e.into_inner();
                handler.characters(utf8(&bytes)?)?;
            }
            Event::Eof => break,
            _ => {} // declarations, comments, processing instructions, doctype
        }
        buf.clear();
    }
    handler.end_document()
}

fn attributes<R>(reader: &NsReader<R>, start: &BytesStart<'_>) -> Result<Vec<Attribute>> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let name = QName::new(namespace_of(resolved)?, utf8(local.as_ref())?);
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?;
        attributes.push(Attribute::new(name, value));
    }
    Ok(attributes)
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => Ok(Some(utf8(ns)?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::Xml(format!(
            "Unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::Xml(format!("Invalid UTF-8: {}", e)))
}

/// Parse an XML string with roxmltree and walk it into a handler
pub fn walk_str<H: ContentHandler + ?Sized>(xml: &str, handler: &mut H) -> Result<()> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|e| Error::Xml(format!("Failed to parse XML: {}", e)))?;
    walk_dom(&document, handler)
}

/// Walk a parsed document tree into a handler
pub fn walk_dom<H: ContentHandler + ?Sized>(document: &roxmltree::Document<'_>, handler: &mut H) -> Result<()> {
    for node in document.root().children() {
        walk_node(node, handler)?;
    }
    handler.end_document()
}

fn walk_node<H: ContentHandler + ?Sized>(node: roxmltree::Node<'_, '_>, handler: &mut H) -> Result<()> {
    if node.is_element() {
        let tag = node.tag_name();
        let name = QName::new(tag.namespace(), tag.name());
        let attributes: Vec<Attribute> = node
            .attributes()
            .map(|attr| Attribute::new(QName::new(attr.namespace(), attr.name()), attr.value()))
            .collect();
        handler.start_element(&name, &attributes)?;
        for child in node.children() {
            walk_node(child, handler)?;
        }
        handler.end_element(&name)?;
    } else if node.is_text() {
        if let Some(text) = node.text() {
            let text = text.trim();
            if !text.is_empty() {
                handler.characters(text)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::XSI_NAMESPACE;

    /// Records events as strings
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ContentHandler for Recorder {
        fn start_element(&mut self, name: &QName, attributes: &[Attribute]) -> Result<()> {
            let attrs: Vec<String> = attributes
                .iter()
                .map(|a| format!("{}={}", a.name, a.value))
                .collect();
            self.events.push(format!("start {} [{}]", name, attrs.join(" ")));
            Ok(())
        }

        fn end_element(&mut self, name: &QName) -> Result<()> {
            self.events.push(format!("end {}", name));
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("text {}", text));
            Ok(())
        }

        fn end_document(&mut self) -> Result<()> {
            self.events.push("eof".to_string());
            Ok(())
        }
    }

    const DOC: &str = r#"<?xml version="1.0"?>
<r:root xmlns:r="urn:test" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <!-- comment -->
  <r:item id="1">one &amp; two</r:item>
  <r:empty xsi:nil="true"/>
  <plain><![CDATA[<raw>]]></plain>
</r:root>"#;

    #[test]
    fn test_stream_and_tree_agree() {
        let mut streamed = Recorder::default();
        read_str(DOC, &mut streamed).unwrap();
        let mut walked = Recorder::default();
        walk_str(DOC, &mut walked).unwrap();

        let nil = format!("{{{}}}nil=true", XSI_NAMESPACE);
        let expected = vec![
            "start {urn:test}root []".to_string(),
            "start {urn:test}item [id=1]".to_string(),
            "text one & two".to_string(),
            "end {urn:test}item".to_string(),
            format!("start {{urn:test}}empty [{}]", nil),
            "end {urn:test}empty".to_string(),
            "start plain []".to_string(),
            "text <raw>".to_string(),
            "end plain".to_string(),
            "end {urn:test}root".to_string(),
            "eof".to_string(),
        ];
        assert_eq!(streamed.events, expected);
        assert_eq!(walked.events, expected);
    }

    #[test]
    fn test_malformed_xml() {
        let mut recorder = Recorder::default();
        assert!(matches!(read_str("<a><b></a>", &mut recorder), Err(Error::Xml(_))));
        assert!(matches!(walk_str("<a><b></a>", &mut recorder), Err(Error::Xml(_))));
    }

    #[test]
    fn test_unknown_prefix() {
        let mut recorder = Recorder::default();
        assert!(matches!(read_str("<x:a/>", &mut recorder), Err(Error::Xml(_))));
    }
}
