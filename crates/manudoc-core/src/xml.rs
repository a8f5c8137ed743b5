//! Mutable XML tree for WordprocessingML parts
//!
//! Parts are read with `quick-xml` into a small owned tree, edited in place and
//! written back. Qualified names are kept as written (`w:p`, `wp:inline`); no
//! namespace resolution is done, matching how Word itself prefixes its parts.

use crate::error::Result;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;

/// A node in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Element with attributes and children
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    /// CDATA section
    CData(String),
    /// Comment body
    Comment(String),
}

impl XmlNode {
    /// The element, if this node is one
    #[inline]
    #[must_use = "returns the element view of the node"]
    pub const fn as_element(&self) -> Option<&XmlElement> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Mutable element, if this node is one
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this node is an element with the given qualified name
    #[inline]
    #[must_use = "checks the node name"]
    pub fn is_element(&self, name: &str) -> bool {
        self.as_element().is_some_and(|e| e.name == name)
    }
}

impl From<XmlElement> for XmlNode {
    #[inline]
    fn from(element: XmlElement) -> Self {
        Self::Element(element)
    }
}

/// An element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name, e.g. `w:r`
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    /// Child nodes
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an empty element
    #[inline]
    #[must_use = "creates an element"]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute
    #[inline]
    #[must_use = "returns the element with the attribute added"]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder: add a child element
    #[inline]
    #[must_use = "returns the element with the child added"]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder: add a text child
    #[inline]
    #[must_use = "returns the element with the text added"]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Whether the element has the given qualified name
    #[inline]
    #[must_use = "checks the element name"]
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Attribute value by qualified name
    #[must_use = "returns the attribute value"]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.attributes.push((key, value));
        }
    }

    /// Remove an attribute, returning whether it was present
    pub fn remove_attr(&mut self, key: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| k != key);
        before != self.attributes.len()
    }

    /// Child elements
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// Mutable child elements
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Self> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    /// First child element with the given name
    #[must_use = "returns the matching child"]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.elements().find(|e| e.name == name)
    }

    /// First mutable child element with the given name
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Self> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Remove all child elements with the given name
    pub fn remove_children(&mut self, name: &str) {
        self.children.retain(|c| !c.is_element(name));
    }

    /// Concatenated text of every descendant text node
    #[must_use = "returns the element's text"]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
                XmlNode::Comment(_) => {}
            }
        }
    }

    /// Depth-first visit of this element and all descendant elements
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        for child in self.elements() {
            child.walk(visit);
        }
    }

    /// Depth-first mutable visit of this element and all descendant elements
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut Self)) {
        visit(self);
        for child in self.elements_mut() {
            child.walk_mut(visit);
        }
    }
}

/// XML declaration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// `version` pseudo-attribute
    pub version: String,
    /// `encoding` pseudo-attribute
    pub encoding: Option<String>,
    /// `standalone` pseudo-attribute
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A parsed XML part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Declaration, if the source had one
    pub declaration: Option<Declaration>,
    /// Root element
    pub root: XmlElement,
}

impl XmlDocument {
    /// Parse a complete XML document
    ///
    /// # Errors
    ///
    /// Returns `Xml` if the content is malformed, or `InvalidTemplate` if it
    /// has no root element.
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(false);

        let mut declaration = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Decl(d) => {
                    declaration = Some(read_declaration(&d)?);
                }
                Event::Start(e) => {
                    stack.push(read_element(&e)?);
                }
                Event::Empty(e) => {
                    let element = read_element(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(t.unescape()?.into_owned()));
                    }
                }
                Event::CData(t) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8(t.into_inner().into_owned())?;
                        parent.children.push(XmlNode::CData(text));
                    }
                }
                Event::Comment(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Comment(String::from_utf8_lossy(&t).into_owned()));
                    }
                }
                Event::Eof => break,
                Event::PI(_) | Event::DocType(_) => {}
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| {
            crate::error::ManudocError::InvalidTemplate("XML part has no root element".to_string())
        })?;
        Ok(Self { declaration, root })
    }

    /// Serialise the document
    ///
    /// # Errors
    ///
    /// Returns `Xml` if writing fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        if let Some(decl) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
            writer.get_mut().extend_from_slice(b"\r\n");
        }
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }

    /// Serialise the document to a string
    ///
    /// # Errors
    ///
    /// Returns `Xml` if writing fails.
    pub fn to_xml_string(&self) -> Result<String> {
        Ok(String::from_utf8(self.to_bytes()?)?)
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    }
}

fn read_element(start: &BytesStart) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn read_declaration(decl: &BytesDecl) -> Result<Declaration> {
    let version = String::from_utf8_lossy(&decl.version()?).into_owned();
    let encoding = match decl.encoding() {
        Some(enc) => Some(String::from_utf8_lossy(&enc?).into_owned()),
        None => None,
    };
    let standalone = match decl.standalone() {
        Some(sa) => Some(String::from_utf8_lossy(&sa?).into_owned()),
        None => None,
    };
    Ok(Declaration {
        version,
        encoding,
        standalone,
    })
}

/// Whether `c` may appear in XML 1.0 character data
#[inline]
#[must_use = "checks whether the character is allowed"]
pub const fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// `text` without the characters XML 1.0 forbids
#[must_use = "returns the cleaned text"]
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| is_xml_char(c)).collect())
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        let value = xml_safe(value);
        start.push_attribute((key.as_str(), value.as_ref()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(&xml_safe(t))))?,
            XmlNode::CData(t) => writer.write_event(Event::CData(BytesCData::new(t.as_str())))?,
            XmlNode::Comment(t) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
