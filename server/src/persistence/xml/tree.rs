//! Minimal in-memory XML element tree on top of quick-xml.
//!
//! Parsing is strict: a document is accepted only if it is well-formed XML
//! with exactly one root element. The character encoding comes from a byte
//! order mark, the UTF-16 signature of `<?`, or the `encoding` label of the
//! XML declaration, in that order; UTF-8 otherwise.

use std::borrow::Cow;

use encoding_rs::{Encoding, REPLACEMENT, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("failed to serialize XML: {0}")]
    Write(String),
}

fn malformed(message: impl Into<String>) -> XmlError {
    XmlError::Malformed(message.into())
}

/// An XML element with its attributes, direct text and child elements.
///
/// `text` is the character data before the first child element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first direct child named `name`, if that child exists.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Every element below this one named `name`, in document order.
    /// The element itself is not included.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in &self.children {
            collect_named(child, name, &mut found);
        }
        found
    }
}

fn collect_named<'a>(element: &'a Element, name: &str, found: &mut Vec<&'a Element>) {
    if element.name == name {
        found.push(element);
    }
    for child in &element.children {
        collect_named(child, name, found);
    }
}

/// Parse a complete document into its root element.
pub fn parse(input: &[u8]) -> Result<Element, XmlError> {
    let text = decode(input)?;
    if let Some(c) = text.chars().find(|c| !is_xml_char(*c)) {
        return Err(malformed(format!(
            "character U+{:04X} is not allowed in XML",
            u32::from(c)
        )));
    }

    let mut reader = Reader::from_str(&text);
    reader.config_mut().check_comments = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut seen_doctype = false;
    let mut at_start = true;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("{e} (at byte {})", reader.buffer_position())))?;
        match event {
            Event::Start(start) => {
                ensure_single_root(&root)?;
                stack.push(open_element(&start)?);
            }
            Event::Empty(start) => {
                ensure_single_root(&root)?;
                let element = open_element(&start)?;
                close_element(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag"))?;
                close_element(element, &mut stack, &mut root);
            }
            Event::Text(t) => {
                if t.windows(3).any(|w| w == b"]]>") {
                    return Err(malformed("']]>' is not allowed in character data"));
                }
                if stack.is_empty() {
                    if !t.iter().all(|b| is_xml_whitespace(*b)) {
                        return Err(malformed("text outside of the root element"));
                    }
                } else {
                    let value = t.unescape().map_err(|e| malformed(e.to_string()))?;
                    if let Some(c) = value.chars().find(|c| !is_xml_char(*c)) {
                        return Err(malformed(format!(
                            "reference to U+{:04X} is not allowed in XML",
                            u32::from(c)
                        )));
                    }
                    append_text(&mut stack, &value);
                }
            }
            Event::CData(c) => {
                if stack.is_empty() {
                    return Err(malformed("CDATA section outside of the root element"));
                }
                let bytes = c.into_inner();
                let value = std::str::from_utf8(&bytes).map_err(|e| malformed(e.to_string()))?;
                append_text(&mut stack, value);
            }
            Event::Decl(decl) => {
                if !at_start {
                    return Err(malformed(
                        "XML declaration is only allowed at the start of the document",
                    ));
                }
                check_declaration(&decl)?;
            }
            Event::PI(pi) => {
                let target = String::from_utf8_lossy(pi.target());
                if target.eq_ignore_ascii_case("xml") || !is_xml_name(&target) {
                    return Err(malformed(format!(
                        "invalid processing instruction target '{target}'"
                    )));
                }
            }
            Event::DocType(_) => {
                if seen_doctype || root.is_some() || !stack.is_empty() {
                    return Err(malformed(
                        "document type declaration must come once, before the root element",
                    ));
                }
                seen_doctype = true;
            }
            // Comments carry no grade data; `check_comments` already
            // rejects `--` inside them.
            Event::Comment(_) => {}
            Event::Eof => break,
        }
        at_start = false;
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| malformed("no element found"))
}

/// Turn raw document bytes into text.
fn decode(input: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    let (encoding, body) = match Encoding::for_bom(input) {
        Some((encoding, bom_len)) => (encoding, &input[bom_len..]),
        None => (sniff_encoding(input)?, input),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| malformed(format!("document is not valid {}", encoding.name())))
}

fn sniff_encoding(input: &[u8]) -> Result<&'static Encoding, XmlError> {
    if input.starts_with(&[0x3C, 0x00, 0x3F, 0x00]) {
        return Ok(UTF_16LE);
    }
    if input.starts_with(&[0x00, 0x3C, 0x00, 0x3F]) {
        return Ok(UTF_16BE);
    }
    let Some(label) = declared_encoding(input) else {
        return Ok(UTF_8);
    };
    match Encoding::for_label(label) {
        Some(encoding) if encoding == UTF_16LE || encoding == UTF_16BE => Err(malformed(
            "document declares UTF-16 but is not encoded as UTF-16",
        )),
        Some(encoding) if encoding != REPLACEMENT => Ok(encoding),
        _ => Err(malformed(format!(
            "unsupported encoding '{}'",
            String::from_utf8_lossy(label)
        ))),
    }
}

/// The `encoding` pseudo-attribute of a leading `<?xml ... ?>`, read as
/// ASCII before the document is decoded.
fn declared_encoding(input: &[u8]) -> Option<&[u8]> {
    let rest = input.strip_prefix(b"<?xml")?;
    if !rest.first().is_some_and(|b| is_xml_whitespace(*b)) {
        return None;
    }
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let decl = &rest[..end];
    let at = decl.windows(8).position(|w| w == b"encoding")?;
    let value = trim_whitespace_start(&decl[at + 8..]).strip_prefix(b"=")?;
    let (&quote, value) = trim_whitespace_start(value).split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let close = value.iter().position(|&b| b == quote)?;
    Some(&value[..close])
}

fn trim_whitespace_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| is_xml_whitespace(**b)).count();
    &bytes[skip..]
}

fn check_declaration(decl: &BytesDecl<'_>) -> Result<(), XmlError> {
    let version = decl.version().map_err(|e| malformed(e.to_string()))?;
    let valid = version
        .strip_prefix(b"1.")
        .is_some_and(|minor| !minor.is_empty() && minor.iter().all(u8::is_ascii_digit));
    if !valid {
        return Err(malformed(format!(
            "unsupported XML version '{}'",
            String::from_utf8_lossy(&version)
        )));
    }
    Ok(())
}

fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// The `Char` production of XML 1.0. Surrogates cannot occur in a `char`.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}'
    )
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}'
            | '\u{203F}'..='\u{2040}'
        )
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

fn ensure_single_root(root: &Option<Element>) -> Result<(), XmlError> {
    if root.is_some() {
        return Err(malformed("junk after document element"));
    }
    Ok(())
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    if !is_xml_name(&name) {
        return Err(malformed(format!("invalid element name '{name}'")));
    }

    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if !is_xml_name(&key) {
            return Err(malformed(format!("invalid attribute name '{key}'")));
        }
        if attr.value.contains(&b'<') {
            return Err(malformed(format!(
                "'<' is not allowed in the value of attribute '{key}'"
            )));
        }
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        if value.chars().any(|c| !is_xml_char(c)) {
            return Err(malformed(format!(
                "attribute '{key}' refers to a character not allowed in XML"
            )));
        }
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Text after the first child element is mixed content and is dropped.
fn append_text(stack: &mut [Element], value: &str) {
    if let Some(current) = stack.last_mut() {
        if current.children.is_empty() {
            current.text.push_str(value);
        }
    }
}

/// Serialize `root` as a UTF-8 document with an XML declaration.
pub fn to_bytes(root: &Element) -> Result<Vec<u8>, XmlError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    // Whitespace between child elements is layout, not content.
    let text = if element.children.is_empty() || !element.text.trim().is_empty() {
        element.text.as_str()
    } else {
        ""
    };

    if text.is_empty() && element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Write(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Write(e.to_string()))?;
    if !text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| XmlError::Write(e.to_string()))
}
