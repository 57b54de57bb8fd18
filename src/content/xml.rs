//! XML payload decoding into the normalized `serde_json::Value` shape.
//!
//! Mapping rules:
//! - The document root's name is dropped; the result is the root's content.
//! - A text-only element with no attributes becomes a string.
//! - Repeated sibling elements of the same name collapse into an array.
//! - Element attributes surface as an `attribute` key holding an array of
//!   attribute bags, so `attribute.<N>.<name>` dot-paths address them; the
//!   element's own text then lives under `value`.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

#[derive(Default)]
struct Node {
    children: Map<String, Value>,
    attrs: Map<String, Value>,
    text: String,
}

impl Node {
    fn finalize(self) -> Value {
        let text = self.text.trim().to_string();
        if self.children.is_empty() && self.attrs.is_empty() {
            return Value::String(text);
        }
        let mut map = Map::new();
        if !self.attrs.is_empty() {
            map.insert(
                "attribute".to_string(),
                Value::Array(vec![Value::Object(self.attrs)]),
            );
        }
        if !text.is_empty() {
            map.insert("value".to_string(), Value::String(text));
        }
        for (name, value) in self.children {
            map.insert(name, value);
        }
        Value::Object(map)
    }

    fn insert_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            None => {
                self.children.insert(name, value);
            }
            Some(Value::Array(siblings)) => siblings.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
}

/// Parse an XML document into a `Value`.
pub fn xml_to_value(input: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    // Slot 0 is the synthetic document node the root element lands in.
    let mut stack: Vec<(String, Node)> = vec![(String::new(), Node::default())];

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let mut node = Node::default();
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
                    node.attrs.insert(key, Value::String(value));
                }
                stack.push((name, node));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let mut node = Node::default();
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
                    node.attrs.insert(key, Value::String(value));
                }
                let value = node.finalize();
                if let Some((_, parent)) = stack.last_mut() {
                    parent.insert_child(name, value);
                }
            }
            Event::Text(text) => {
                let decoded = text.unescape().map_err(|e| e.to_string())?;
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&decoded);
                }
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::End(_) => {
                let (name, node) = match stack.pop() {
                    Some(frame) => frame,
                    None => return Err("unbalanced closing tag".to_string()),
                };
                if stack.is_empty() {
                    return Err("unbalanced closing tag".to_string());
                }
                let value = node.finalize();
                if let Some((_, parent)) = stack.last_mut() {
                    parent.insert_child(name, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err("unclosed element at end of document".to_string());
    }
    let document = match stack.pop() {
        Some((_, node)) => node,
        None => return Err("empty document".to_string()),
    };
    if document.children.len() == 1 {
        match document.children.into_iter().next() {
            Some((_, root)) => Ok(root),
            None => Err("empty document".to_string()),
        }
    } else {
        Ok(Value::Object(document.children))
    }
}
