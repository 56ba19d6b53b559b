use super::{AtomError, ATOM_NAMESPACE};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

/// Maximum element nesting accepted from a server document.
pub const MAX_DEPTH: usize = 64;

/// Minimal element tree keyed by local name, with each element's resolved
/// namespace URI kept alongside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    /// `None` for elements outside any declared namespace.
    pub namespace: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Character data before the first child element.
    pub text: String,
    /// Character data between this element's end tag and the next sibling.
    pub tail: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.text.trim().to_string())
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// Atom elements only: `sc:id` or `scp:author` never stand in for the
    /// Atom element of the same local name.
    pub fn atom_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children_named(name)
            .filter(|c| c.namespace.is_none() || c.in_namespace(ATOM_NAMESPACE))
    }

    pub fn atom_child<'a>(&'a self, name: &'a str) -> Option<&'a Element> {
        self.atom_children(name).next()
    }

    pub fn atom_child_text(&self, name: &str) -> Option<String> {
        self.atom_child(name).map(|c| c.text.trim().to_string())
    }

    /// Text of this element and all descendants, in document order,
    /// including whitespace between child elements.
    pub fn deep_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.deep_text());
            out.push_str(&child.tail);
        }
        out
    }
}

/// Parses `bytes` into an element tree rooted at the document element.
///
/// quick-xml 0.37 resolves only the five predefined entities; documents
/// declaring their own entities fail to unescape rather than expand.
pub(crate) fn parse_tree(bytes: &[u8]) -> Result<Element, AtomError> {
    let content = std::str::from_utf8(bytes).map_err(|_| AtomError::Encoding)?;
    // Whitespace is kept: it separates words in mixed xhtml content.
    let mut reader = NsReader::from_str(content);
    let decoder = reader.decoder();

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| AtomError::Xml(e.to_string()))?;
        let namespace = namespace_uri(&resolved);

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(AtomError::MaxDepthExceeded(MAX_DEPTH));
                }
                stack.push(element_from(&e, namespace, decoder)?);
            }
            Event::Empty(e) => {
                let element = element_from(&e, namespace, decoder)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape().map_err(|e| AtomError::Xml(e.to_string()))?;
                    push_text(top, &text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    push_text(top, &String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(AtomError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or(AtomError::Empty)
}

fn namespace_uri(resolved: &ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn element_from(
    e: &BytesStart<'_>,
    namespace: Option<String>,
    decoder: Decoder,
) -> Result<Element, AtomError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| AtomError::Xml(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }

    Ok(Element {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        namespace,
        attrs,
        children: Vec::new(),
        text: String::new(),
        tail: String::new(),
    })
}

fn push_text(parent: &mut Element, text: &str) {
    match parent.children.last_mut() {
        Some(last) => last.tail.push_str(text),
        None => parent.text.push_str(text),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree_with_local_names() {
        let xml = br#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005">
            <title type="text">Contacts &amp; friends</title>
            <gd:who rel="organizer" email="a@b.c"/>
        </feed>"#;
        let root = parse_tree(xml).unwrap();

        assert_eq!(root.name, "feed");
        assert!(root.attrs.is_empty());
        assert_eq!(root.child_text("title").as_deref(), Some("Contacts & friends"));
        assert_eq!(root.child("title").unwrap().attr("type"), Some("text"));
        assert_eq!(root.child("who").unwrap().attr("email"), Some("a@b.c"));
    }

    #[test]
    fn test_namespaces_resolved() {
        let xml = br#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:sc="http://schemas.google.com/structuredcontent/2009">
            <sc:id>sku-1</sc:id>
            <id>tag:example.com,2011:1</id>
            <plain xmlns="">x</plain>
        </entry>"#;
        let root = parse_tree(xml).unwrap();

        assert!(root.in_namespace(ATOM_NAMESPACE));
        assert_eq!(root.child_text("id").as_deref(), Some("sku-1"));
        assert_eq!(root.atom_child_text("id").as_deref(), Some("tag:example.com,2011:1"));
        assert_eq!(root.child("plain").unwrap().namespace, None);
    }

    #[test]
    fn test_cdata_kept() {
        let root = parse_tree(b"<content><![CDATA[<b>bold</b>]]></content>").unwrap();
        assert_eq!(root.text, "<b>bold</b>");
    }

    #[test]
    fn test_mixed_content_keeps_word_spacing() {
        let root = parse_tree(b"<div><b>hello</b> <i>world</i>!</div>").unwrap();
        assert_eq!(root.deep_text(), "hello world!");
        assert_eq!(root.children[0].tail, " ");
        assert_eq!(root.text, "");
    }

    #[test]
    fn test_depth_limit() {
        let mut xml = String::new();
        for _ in 0..=MAX_DEPTH {
            xml.push_str("<a>");
        }
        for _ in 0..=MAX_DEPTH {
            xml.push_str("</a>");
        }
        let err = parse_tree(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, AtomError::MaxDepthExceeded(MAX_DEPTH)));
    }

    #[test]
    fn test_depth_at_limit_ok() {
        let mut xml = String::new();
        for _ in 0..MAX_DEPTH {
            xml.push_str("<a>");
        }
        for _ in 0..MAX_DEPTH {
            xml.push_str("</a>");
        }
        assert!(parse_tree(xml.as_bytes()).is_ok());
    }

    #[test]
    fn test_custom_entity_rejected() {
        let xml = br#"<!DOCTYPE feed [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><feed><title>&xxe;</title></feed>"#;
        assert!(parse_tree(xml).is_err());
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(matches!(parse_tree(b"").unwrap_err(), AtomError::Empty));
        assert!(matches!(parse_tree(&[0xff, 0xfe]).unwrap_err(), AtomError::Encoding));
        assert!(parse_tree(b"<feed><title></feed>").is_err());
    }
}
