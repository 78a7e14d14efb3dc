//! Mutable XML element tree backed by `quick-xml`.
//!
//! The project file is parsed into an owned [`Element`] tree, edited in place and
//! written back out. Text, CDATA and comments inside the root element survive the
//! round-trip; the prolog is replaced by a fresh UTF-8 declaration on output.

use std::fmt;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

const INDENT_WIDTH: usize = 2;
const BYTE_ORDER_MARK: char = '\u{feff}';

/// A child of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
  Element(Element),
  Text(String),
  CData(String),
  Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
  pub name: String,
  pub attributes: Vec<(String, String)>,
  pub children: Vec<Node>,
}

impl Element {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      attributes: Vec::new(),
      children: Vec::new(),
    }
  }

  /// Creates a leaf element holding `text`.
  pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
    let mut element = Self::new(name);
    element.set_text(text);
    element
  }

  pub fn attribute(&self, key: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Direct child elements in document order.
  pub fn elements(&self) -> impl Iterator<Item = &Element> {
    self.children.iter().filter_map(|node| match node {
      Node::Element(element) => Some(element),
      _ => None,
    })
  }

  /// Direct child elements named `tag`, paired with their position in `children`.
  pub fn positions_of<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = (usize, &'a Element)> {
    self
      .children
      .iter()
      .enumerate()
      .filter_map(move |(position, node)| match node {
        Node::Element(element) if element.name == tag => Some((position, element)),
        _ => None,
      })
  }

  pub fn child(&self, tag: &str) -> Option<&Element> {
    self.elements().find(|element| element.name == tag)
  }

  pub fn child_mut(&mut self, tag: &str) -> Option<&mut Element> {
    self.children.iter_mut().find_map(|node| match node {
      Node::Element(element) if element.name == tag => Some(element),
      _ => None,
    })
  }

  /// The element stored at `position` in `children`, if that node is an element.
  pub fn element_at_mut(&mut self, position: usize) -> Option<&mut Element> {
    match self.children.get_mut(position) {
      Some(Node::Element(element)) => Some(element),
      _ => None,
    }
  }

  /// Leading text and CDATA of this element, up to its first child element.
  pub fn text(&self) -> String {
    self
      .children
      .iter()
      .take_while(|node| !matches!(node, Node::Element(_)))
      .filter_map(|node| match node {
        Node::Text(text) | Node::CData(text) => Some(text.as_str()),
        _ => None,
      })
      .collect()
  }

  /// Replaces the leading text of this element with `text`. Child elements and the
  /// text after them are kept.
  pub fn set_text(&mut self, text: impl Into<String>) {
    let first_element = self
      .children
      .iter()
      .position(|node| matches!(node, Node::Element(_)))
      .unwrap_or(self.children.len());
    let mut position = 0;
    self.children.retain(|node| {
      let leading = position < first_element;
      position += 1;
      !(leading && matches!(node, Node::Text(_) | Node::CData(_)))
    });
    let text = text.into();
    if !text.is_empty() {
      self.children.insert(0, Node::Text(text));
    }
  }

  /// Text of the first child named `tag`, or `None` when there is no such child.
  pub fn child_text(&self, tag: &str) -> Option<String> {
    self.child(tag).map(Element::text)
  }

  /// Sets the text of the first child named `tag`, appending the child if missing.
  pub fn set_child_text(&mut self, tag: &str, text: impl Into<String>) {
    match self.child_mut(tag) {
      Some(child) => child.set_text(text),
      None => {
        self.push_element(Element::with_text(tag, text));
      }
    }
  }

  /// Appends `element` and returns its position in `children`.
  pub fn push_element(&mut self, element: Element) -> usize {
    self.children.push(Node::Element(element));
    self.children.len() - 1
  }

  /// Removes every direct child element named `tag` and returns how many went.
  pub fn remove_elements(&mut self, tag: &str) -> usize {
    let before = self.children.len();
    self
      .children
      .retain(|node| !matches!(node, Node::Element(element) if element.name == tag));
    before - self.children.len()
  }

  /// Finds the first descendant reached by following `path` one child tag per step.
  ///
  /// When several siblings carry a step's tag, later siblings are searched too, so the
  /// result is the first match in document order.
  pub fn find_path_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Element> {
    let trail = self.locate(path)?;
    let mut current = self;
    for position in trail {
      current = current.element_at_mut(position)?;
    }
    Some(current)
  }

  fn locate<S: AsRef<str>>(&self, path: &[S]) -> Option<Vec<usize>> {
    let Some((head, rest)) = path.split_first() else {
      return Some(Vec::new());
    };

    self
      .positions_of(head.as_ref())
      .find_map(|(position, child)| {
        child.locate(rest).map(|mut trail| {
          trail.insert(0, position);
          trail
        })
      })
  }

  fn is_whitespace_text(node: &Node) -> bool {
    matches!(node, Node::Text(text) if text.trim().is_empty())
  }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub root: Element,
}

impl Document {
  /// Serializes the document with an XML declaration.
  ///
  /// With `pretty` set, whitespace-only text is dropped and the tree is indented;
  /// otherwise text is written back exactly as held in the tree.
  pub fn to_xml(&self, pretty: bool) -> Result<String, XmlError> {
    let mut writer = if pretty {
      Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH)
    } else {
      Writer::new(Vec::new())
    };

    write_event(
      &mut writer,
      Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;
    if !pretty {
      write_event(&mut writer, Event::Text(BytesText::from_escaped("\n")))?;
    }

    write_element(&mut writer, &self.root, pretty)?;

    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
  }
}

impl TryFrom<&str> for Document {
  type Error = XmlError;

  fn try_from(s: &str) -> Result<Self, Self::Error> {
    #[cfg(feature = "tracing")]
    debug!("Parsing XML document of {} bytes", s.len());

    let s = s.strip_prefix(BYTE_ORDER_MARK).unwrap_or(s);
    let mut reader = Reader::from_str(s);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    let parse_error =
      |reader: &Reader<&[u8]>, e: &dyn fmt::Display| XmlError::Parse {
        position: reader.buffer_position() as u64,
        message: e.to_string(),
      };

    loop {
      let event = reader.read_event().map_err(|e| parse_error(&reader, &e))?;
      match event {
        Event::Start(e) => {
          stack.push(start_element(&e).map_err(|e| parse_error(&reader, &e))?);
        }
        Event::Empty(e) => {
          let element = start_element(&e).map_err(|e| parse_error(&reader, &e))?;
          attach(&mut stack, &mut root, element);
        }
        Event::End(_) => {
          if let Some(element) = stack.pop() {
            attach(&mut stack, &mut root, element);
          }
        }
        Event::Text(e) => {
          if let Some(parent) = stack.last_mut() {
            let text = e.unescape().map_err(|e| parse_error(&reader, &e))?;
            parent.children.push(Node::Text(text.into_owned()));
          }
        }
        Event::CData(e) => {
          if let Some(parent) = stack.last_mut() {
            let text = String::from_utf8_lossy(&e).into_owned();
            parent.children.push(Node::CData(text));
          }
        }
        Event::Comment(e) => {
          if let Some(parent) = stack.last_mut() {
            let text = String::from_utf8_lossy(&e).into_owned();
            parent.children.push(Node::Comment(text));
          }
        }
        Event::Eof => break,
        // Declaration, doctype and processing instructions are not kept
        _ => {}
      }
    }

    let root = root.ok_or(XmlError::NoRoot)?;

    #[cfg(feature = "tracing")]
    trace!("Parsed root element <{}>", root.name);

    Ok(Self { root })
  }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, quick_xml::Error> {
  let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
  for attr in start.attributes() {
    let attr = attr?;
    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
    let value = attr.unescape_value()?.into_owned();
    element.attributes.push((key, value));
  }
  Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
  match stack.last_mut() {
    Some(parent) => parent.children.push(Node::Element(element)),
    None => {
      if root.is_none() {
        *root = Some(element);
      }
    }
  }
}

fn write_event<'a>(writer: &mut Writer<Vec<u8>>, event: Event<'a>) -> Result<(), XmlError> {
  writer
    .write_event(event)
    .map_err(|e| XmlError::Write(e.to_string()))
}

fn write_element(
  writer: &mut Writer<Vec<u8>>,
  element: &Element,
  pretty: bool,
) -> Result<(), XmlError> {
  let mut start = BytesStart::new(element.name.as_str());
  for (key, value) in &element.attributes {
    start.push_attribute((key.as_str(), value.as_str()));
  }

  let children: Vec<&Node> = element
    .children
    .iter()
    .filter(|node| !(pretty && Element::is_whitespace_text(node)))
    .collect();

  if children.is_empty() {
    return write_event(writer, Event::Empty(start));
  }

  write_event(writer, Event::Start(start))?;
  for node in children {
    match node {
      Node::Element(child) => write_element(writer, child, pretty)?,
      Node::Text(text) => {
        let escaped = partial_escape(text.as_str());
        write_event(writer, Event::Text(BytesText::from_escaped(escaped)))?;
      }
      Node::CData(text) => write_event(writer, Event::CData(BytesCData::new(text.as_str())))?,
      Node::Comment(text) => {
        write_event(writer, Event::Comment(BytesText::from_escaped(text.as_str())))?
      }
    }
  }
  write_event(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
  #[error("XML parse error at byte {position}: {message}")]
  Parse { position: u64, message: String },
  #[error("No root element found in XML")]
  NoRoot,
  #[error("XML write error: {0}")]
  Write(String),
}
