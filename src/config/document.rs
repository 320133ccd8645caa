//! Structured in-memory representation of a pipeline configuration
//!
//! A [`Document`] is an ordered sequence of [`Section`]s. Order is significant and
//! sections of the same kind are never merged, so the model stays faithful to
//! what the agent actually reads.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    /// Interpret a raw classic-format token.
    ///
    /// Only canonical integers and `true`/`false` are promoted so that
    /// rendering the value again yields the same token.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => Value::Int(n),
            _ => Value::String(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value switches a feature on (`on`, `true`, `yes`, `1`)
    pub fn is_enabled(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n == 1,
            Value::String(s) => {
                matches!(s.to_ascii_lowercase().as_str(), "on" | "true" | "yes" | "1")
            }
            _ => false,
        }
    }

    /// Interpret the value as a TCP/UDP port number
    pub fn as_port(&self) -> Option<u16> {
        match self {
            Value::Int(n) => u16::try_from(*n).ok().filter(|p| *p != 0),
            Value::String(s) => s.trim().parse::<u16>().ok().filter(|p| *p != 0),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Value::UInt(n), Value::Int)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// A single `key value` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

/// Ordered property list. Keys may repeat.
///
/// Serialized as a map whose entries keep their original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<Property>);

impl Properties {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.push(Property {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Builder form of [`Properties::push`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`, compared case-insensitively
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| &p.value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.push(k, v);
        }
        props
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for prop in &self.0 {
            map.serialize_entry(&prop.key, &prop.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of property names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Properties, A::Error> {
                let mut props = Properties::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    props.push(key, value);
                }
                Ok(props)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

/// A named block of properties, optionally holding nested sub-sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Section>,
    /// Written as a bare mapping rather than as a list entry (YAML/JSON only)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mapping: bool,
}

impl Section {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: Properties::new(),
            children: Vec::new(),
            mapping: false,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(key, value);
        self
    }

    pub fn with_child(mut self, child: Section) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Plugin name (`Name` property)
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }
}

/// A top-level variable or include
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveKind {
    /// `@SET key=value` / an `env:` entry
    Set { key: String, value: Value },
    /// `@INCLUDE path` / an `includes:` entry
    Include(String),
}

/// A directive pinned between top-level sections
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Number of top-level sections written before it
    pub position: usize,
}

/// A parsed pipeline configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Directives in source order
    pub directives: Vec<Directive>,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section at the end of the document.
    ///
    /// Existing sections of the same kind are left untouched: calling this
    /// twice with the same arguments yields two sections.
    pub fn add_section(
        &mut self,
        kind: impl Into<String>,
        properties: Properties,
    ) -> &mut Section {
        let mut section = Section::new(kind);
        section.properties = properties;
        self.sections.push(section);
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Record a variable after the sections added so far
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.push_directive(DirectiveKind::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Record an include after the sections added so far
    pub fn include(&mut self, path: impl Into<String>) {
        self.push_directive(DirectiveKind::Include(path.into()));
    }

    fn push_directive(&mut self, kind: DirectiveKind) {
        self.directives.push(Directive {
            kind,
            position: self.sections.len(),
        });
    }

    /// All variables, in source order
    pub fn env(&self) -> Properties {
        self.directives
            .iter()
            .filter_map(|d| match &d.kind {
                DirectiveKind::Set { key, value } => Some((key.clone(), value.clone())),
                DirectiveKind::Include(_) => None,
            })
            .collect()
    }

    /// All included paths, in source order
    pub fn includes(&self) -> Vec<&str> {
        self.directives
            .iter()
            .filter_map(|d| match &d.kind {
                DirectiveKind::Include(path) => Some(path.as_str()),
                DirectiveKind::Set { .. } => None,
            })
            .collect()
    }

    /// Sections of the given kind, in document order
    pub fn sections_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections.iter().filter(move |s| s.is_kind(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_values() {
        assert_eq!(Value::infer("9200"), Value::Int(9200));
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("On"), Value::String("On".to_string()));
        assert_eq!(Value::infer("007"), Value::String("007".to_string()));
        assert_eq!(Value::infer("+5"), Value::String("+5".to_string()));
        assert_eq!(Value::infer("1.0"), Value::String("1.0".to_string()));
    }

    #[test]
    fn test_value_as_port() {
        assert_eq!(Value::Int(9200).as_port(), Some(9200));
        assert_eq!(Value::from("24224").as_port(), Some(24224));
        assert_eq!(Value::Int(0).as_port(), None);
        assert_eq!(Value::Int(70000).as_port(), None);
        assert_eq!(Value::from("auto").as_port(), None);
    }

    #[test]
    fn test_value_is_enabled() {
        assert!(Value::from("On").is_enabled());
        assert!(Value::Bool(true).is_enabled());
        assert!(Value::Int(1).is_enabled());
        assert!(!Value::from("off").is_enabled());
    }

    #[test]
    fn test_properties_lookup_is_case_insensitive() {
        let props = Properties::new().with("Name", "tail").with("Path", "/var/log/*.log");
        assert_eq!(props.get("name"), Some(&Value::from("tail")));
        assert_eq!(props.get("PATH"), Some(&Value::from("/var/log/*.log")));
        assert!(props.get("tag").is_none());
    }

    #[test]
    fn test_properties_keep_duplicates_in_order() {
        let json = r#"{"Name": "modify", "Add": "a 1", "Add": "b 2"}"#;
        let props: Properties = serde_json::from_str(json).unwrap();

        let keys: Vec<_> = props.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["Name", "Add", "Add"]);
        assert_eq!(props.get("add"), Some(&Value::from("a 1")));
    }

    #[test]
    fn test_properties_serialize_in_order() {
        let props = Properties::new().with("zeta", 1i64).with("alpha", true);
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":true}"#);
    }

    #[test]
    fn test_add_section_appends_without_dedup() {
        let mut doc =
            Document::new().with_section(Section::new("OUTPUT").with_property("Name", "stdout"));
        let props = Properties::new().with("Name", "dummy");

        doc.add_section("INPUT", props.clone());
        doc.add_section("INPUT", props);

        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections_of("input").count(), 2);
        assert!(doc.sections[0].is_kind("OUTPUT"));
    }

    #[test]
    fn test_directives_remember_their_position() {
        let mut doc = Document::new();
        doc.set_var("region", "eu");
        doc.add_section("INPUT", Properties::new().with("Name", "dummy"));
        doc.include("outputs.conf");

        assert_eq!(doc.directives[0].position, 0);
        assert_eq!(doc.directives[1].position, 1);
        assert_eq!(doc.env().get("region"), Some(&Value::from("eu")));
        assert_eq!(doc.includes(), vec!["outputs.conf"]);
    }

    #[test]
    fn test_large_unsigned_stays_integral() {
        assert_eq!(Value::from(u64::MAX), Value::UInt(u64::MAX));
        assert_eq!(Value::from(42u64), Value::Int(42));
        assert_eq!(Value::UInt(u64::MAX).to_string(), "18446744073709551615");
    }
}
