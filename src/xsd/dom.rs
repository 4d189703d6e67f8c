//! Minimal namespace-aware element tree used for both schema documents and
//! instance documents.

use std::collections::BTreeMap;
use std::rc::Rc;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Expanded name: namespace URI (empty for none) plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub ns: String,
    pub local: String,
}

impl QName {
    pub fn new(ns: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            local: local.into(),
        }
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ns.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.ns, self.local)
        }
    }
}

type Scope = Rc<BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct XmlAttr {
    pub name: QName,
    pub raw: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: QName,
    /// Name as written, prefix included.
    pub raw: String,
    pub attrs: Vec<XmlAttr>,
    pub children: Vec<XmlNode>,
    pub text: String,
    scope: Scope,
}

impl XmlNode {
    /// Unqualified attribute value.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.ns.is_empty() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Resolve a `prefix:local` value against this element's in-scope
    /// namespaces. Unprefixed values take the default namespace.
    pub fn resolve_qname(&self, value: &str) -> Option<QName> {
        let value = value.trim();
        match value.split_once(':') {
            Some((prefix, local)) => self
                .lookup(prefix)
                .map(|ns| QName::new(ns, local)),
            None => Some(QName::new(
                self.scope.get("").cloned().unwrap_or_default(),
                value,
            )),
        }
    }

    fn lookup(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        self.scope.get(prefix).cloned()
    }

    /// Child elements in `ns` with the given local name.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children
            .iter()
            .filter(move |c| c.name.ns == ns && c.name.local == local)
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DomError(pub String);

impl From<quick_xml::Error> for DomError {
    fn from(e: quick_xml::Error) -> Self {
        Self(e.to_string())
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(bytes: &[u8]) -> Result<XmlNode, DomError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let root_scope: Scope = Rc::new(BTreeMap::new());
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let parent = stack.last().map(|n| n.scope.clone()).unwrap_or_else(|| root_scope.clone());
                stack.push(open_element(&e, parent)?);
            }
            Event::Empty(e) => {
                let parent = stack.last().map(|n| n.scope.clone()).unwrap_or_else(|| root_scope.clone());
                let node = open_element(&e, parent)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| DomError("unexpected end tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&t.unescape()?);
                } else if !t.unescape()?.trim().is_empty() {
                    return Err(DomError("text outside the root element".into()));
                }
            }
            Event::CData(t) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DomError(format!("element '{}' is not closed", open.raw)));
    }
    root.ok_or_else(|| DomError("document has no root element".into()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), DomError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(DomError("document has more than one root element".into())),
    }
    Ok(())
}

fn open_element(e: &BytesStart<'_>, parent: Scope) -> Result<XmlNode, DomError> {
    let raw = String::from_utf8_lossy(e.name().as_ref()).into_owned();

    let mut declared = Vec::new();
    let mut plain = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DomError(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            declared.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((prefix.to_string(), value));
        } else {
            plain.push((key, value));
        }
    }

    let scope = if declared.is_empty() {
        parent
    } else {
        let mut map = (*parent).clone();
        map.extend(declared);
        Rc::new(map)
    };

    let mut node = XmlNode {
        name: QName::new("", ""),
        raw: raw.clone(),
        attrs: Vec::with_capacity(plain.len()),
        children: Vec::new(),
        text: String::new(),
        scope,
    };

    node.name = match raw.split_once(':') {
        Some((prefix, local)) => {
            let ns = node
                .lookup(prefix)
                .ok_or_else(|| DomError(format!("unbound namespace prefix '{prefix}' on '{raw}'")))?;
            QName::new(ns, local)
        }
        None => QName::new(node.scope.get("").cloned().unwrap_or_default(), raw.as_str()),
    };

    for (key, value) in plain {
        let name = match key.split_once(':') {
            Some((prefix, local)) => {
                let ns = node.lookup(prefix).ok_or_else(|| {
                    DomError(format!("unbound namespace prefix '{prefix}' on attribute '{key}'"))
                })?;
                QName::new(ns, local)
            }
            None => QName::new("", key.as_str()),
        };
        node.attrs.push(XmlAttr {
            name,
            raw: key,
            value,
        });
    }
    Ok(node)
}
