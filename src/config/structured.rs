//! YAML and JSON configuration formats
//!
//! Both formats share one tree layout:
//!
//! ```yaml
//! env:
//!   region: eu-west-1
//! includes:
//!   - outputs.yaml
//! service:
//!   flush: 1
//! pipeline:
//!   inputs:
//!     - name: tail
//!       processors:
//!         - name: content_modifier
//!   outputs:
//!     - name: es
//!       port: 9200
//! parsers:
//!   - name: json
//! ```
//!
//! Sections are grouped by kind and groups are written in order of first
//! appearance. A document parsed from YAML or JSON dumps back in its own
//! order; a section appended later joins the existing group of its kind, so
//! it lands after that group's last member rather than at the very end.
//! A block given as a single mapping (such as `processors: {logs: [...]}`)
//! is written back as a mapping. JSON is decoded straight into the ordered
//! YAML value tree.

use serde_yaml::{Mapping, Number, Value as Node};

use super::document::{DirectiveKind, Document, Section, Value};
use super::{ConfigCodec, ConfigFormat, ParseError, SerializeError};

const ENV_KEY: &str = "env";
const INCLUDES_KEY: &str = "includes";
const SERVICE_KEY: &str = "service";
const PIPELINE_KEY: &str = "pipeline";

/// Kinds that have no place in the structured layout
pub const RESERVED_KINDS: [&str; 3] = ["PIPELINE", "ENV", "INCLUDES"];

/// Codec for `yaml`
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

/// Codec for `json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ConfigCodec for YamlCodec {
    fn format(&self) -> ConfigFormat {
        ConfigFormat::Yaml
    }

    fn parse(&self, raw: &str) -> Result<Document, ParseError> {
        if raw.trim().is_empty() {
            return Ok(Document::new());
        }
        let tree: Node = serde_yaml::from_str(raw).map_err(|e| ParseError::Decode {
            format: ConfigFormat::Yaml,
            message: e.to_string(),
        })?;
        document_from_tree(&tree)
    }

    fn dump(&self, doc: &Document) -> Result<String, SerializeError> {
        let tree = document_to_tree(doc, ConfigFormat::Yaml)?;
        serde_yaml::to_string(&tree).map_err(|e| SerializeError::Encode {
            format: ConfigFormat::Yaml,
            message: e.to_string(),
        })
    }
}

impl ConfigCodec for JsonCodec {
    fn format(&self) -> ConfigFormat {
        ConfigFormat::Json
    }

    fn parse(&self, raw: &str) -> Result<Document, ParseError> {
        let tree: Node = serde_json::from_str(raw).map_err(|e| ParseError::Decode {
            format: ConfigFormat::Json,
            message: e.to_string(),
        })?;
        document_from_tree(&tree)
    }

    fn dump(&self, doc: &Document) -> Result<String, SerializeError> {
        let tree = document_to_tree(doc, ConfigFormat::Json)?;
        serde_json::to_string_pretty(&tree).map_err(|e| SerializeError::Encode {
            format: ConfigFormat::Json,
            message: e.to_string(),
        })
    }
}

/// Where a section kind lives in the tree
#[derive(Debug, Clone, PartialEq)]
enum Placement {
    Service,
    Pipeline(&'static str),
    TopLevel(String),
}

fn placement(kind: &str) -> Placement {
    match kind.to_ascii_uppercase().as_str() {
        "SERVICE" => Placement::Service,
        "INPUT" => Placement::Pipeline("inputs"),
        "FILTER" => Placement::Pipeline("filters"),
        "OUTPUT" => Placement::Pipeline("outputs"),
        "CUSTOM" => Placement::TopLevel("customs".to_string()),
        "PARSER" => Placement::TopLevel("parsers".to_string()),
        "MULTILINE_PARSER" => Placement::TopLevel("multiline_parsers".to_string()),
        other => Placement::TopLevel(other.to_ascii_lowercase()),
    }
}

fn top_level_kind(key: &str) -> String {
    match key {
        "customs" => "CUSTOM".to_string(),
        "parsers" => "PARSER".to_string(),
        "multiline_parsers" => "MULTILINE_PARSER".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

fn pipeline_kind(key: &str) -> Option<&'static str> {
    match key {
        "inputs" => Some("INPUT"),
        "filters" => Some("FILTER"),
        "outputs" => Some("OUTPUT"),
        _ => None,
    }
}

// ============================================================================
// Tree -> Document
// ============================================================================

fn document_from_tree(tree: &Node) -> Result<Document, ParseError> {
    let mut doc = Document::new();
    let root = match tree {
        Node::Null => return Ok(doc),
        Node::Mapping(root) => root,
        _ => return Err(invalid("document root must be a mapping")),
    };

    for (key, value) in root {
        let key = key_str(key)?;
        match key {
            ENV_KEY => env_from_node(value, &mut doc)?,
            INCLUDES_KEY => includes_from_node(value, &mut doc)?,
            PIPELINE_KEY => {
                let Node::Mapping(groups) = value else {
                    return Err(invalid(
                        "'pipeline' must be a mapping of inputs, filters and outputs",
                    ));
                };
                for (group, sections) in groups {
                    let group = key_str(group)?;
                    let kind = pipeline_kind(group)
                        .ok_or_else(|| invalid(format!("unknown pipeline group '{}'", group)))?;
                    doc.sections.extend(sections_from_node(kind, sections)?);
                }
            }
            SERVICE_KEY => doc.sections.extend(sections_from_node("SERVICE", value)?),
            other => {
                let kind = top_level_kind(other);
                doc.sections.extend(sections_from_node(&kind, value)?);
            }
        }
    }

    Ok(doc)
}

/// A mapping is one section, a sequence of mappings is several
fn sections_from_node(kind: &str, node: &Node) -> Result<Vec<Section>, ParseError> {
    match node {
        Node::Null => Ok(Vec::new()),
        Node::Mapping(map) => {
            let mut section = section_from_mapping(kind, map)?;
            section.mapping = true;
            Ok(vec![section])
        }
        Node::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Node::Mapping(map) => section_from_mapping(kind, map),
                _ => Err(invalid(format!(
                    "entries of '{}' must be mappings",
                    kind.to_ascii_lowercase()
                ))),
            })
            .collect(),
        _ => Err(invalid(format!(
            "'{}' must be a mapping or a list",
            kind.to_ascii_lowercase()
        ))),
    }
}

fn section_from_mapping(kind: &str, map: &Mapping) -> Result<Section, ParseError> {
    let mut section = Section::new(kind);

    for (key, value) in map {
        let key = key_str(key)?;
        match value {
            Node::Mapping(child) => {
                let mut child = section_from_mapping(&key.to_ascii_uppercase(), child)?;
                child.mapping = true;
                section.children.push(child);
            }
            Node::Sequence(items) if !items.is_empty() && items.iter().all(Node::is_mapping) => {
                section
                    .children
                    .extend(sections_from_node(&key.to_ascii_uppercase(), value)?);
            }
            Node::Sequence(items) => {
                let values = items
                    .iter()
                    .map(|item| scalar_from_node(item, key))
                    .collect::<Result<Vec<_>, _>>()?;
                section.properties.push(key, Value::List(values));
            }
            other => section.properties.push(key, scalar_from_node(other, key)?),
        }
    }

    Ok(section)
}

fn scalar_from_node(node: &Node, key: &str) -> Result<Value, ParseError> {
    match node {
        Node::Null => Ok(Value::String(String::new())),
        Node::Bool(b) => Ok(Value::Bool(*b)),
        Node::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::UInt(u))
            } else {
                n.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| invalid(format!("unsupported number under '{}'", key)))
            }
        }
        Node::String(s) => Ok(Value::String(s.clone())),
        Node::Sequence(_) | Node::Mapping(_) => Err(ParseError::InvalidNesting {
            line: 0,
            reason: format!("'{}' mixes nested sections and plain values", key),
        }),
        Node::Tagged(_) => Err(invalid(format!(
            "tagged values are not supported under '{}'",
            key
        ))),
    }
}

fn env_from_node(node: &Node, doc: &mut Document) -> Result<(), ParseError> {
    match node {
        Node::Null => Ok(()),
        Node::Mapping(map) => {
            for (key, value) in map {
                let key = key_str(key)?;
                doc.set_var(key, scalar_from_node(value, key)?);
            }
            Ok(())
        }
        _ => Err(invalid("'env' must be a mapping")),
    }
}

fn includes_from_node(node: &Node, doc: &mut Document) -> Result<(), ParseError> {
    match node {
        Node::Null => Ok(()),
        Node::String(path) => {
            doc.include(path.as_str());
            Ok(())
        }
        Node::Sequence(items) => {
            for item in items {
                let Node::String(path) = item else {
                    return Err(invalid("'includes' entries must be strings"));
                };
                doc.include(path.as_str());
            }
            Ok(())
        }
        _ => Err(invalid("'includes' must be a list of paths")),
    }
}

fn key_str(key: &Node) -> Result<&str, ParseError> {
    key.as_str().ok_or_else(|| invalid("mapping keys must be strings"))
}

fn invalid(reason: impl Into<String>) -> ParseError {
    ParseError::InvalidStructure(reason.into())
}

// ============================================================================
// Document -> Tree
// ============================================================================

fn document_to_tree(doc: &Document, format: ConfigFormat) -> Result<Node, SerializeError> {
    let mut root = Mapping::new();

    let mut groups: Vec<(Placement, usize, Vec<&Section>)> = Vec::new();
    for (index, section) in doc.sections.iter().enumerate() {
        let upper = section.kind.to_ascii_uppercase();
        if section.kind.is_empty() || RESERVED_KINDS.contains(&upper.as_str()) {
            return Err(SerializeError::Unrepresentable {
                format,
                reason: format!("section kind '{}' is reserved", section.kind),
            });
        }
        let place = placement(&section.kind);
        match groups.iter_mut().find(|(p, _, _)| *p == place) {
            Some((_, _, members)) => members.push(section),
            None => groups.push((place, index, vec![section])),
        }
    }

    let mut pending = directive_nodes(doc).into_iter().peekable();
    for (place, first, members) in groups {
        while let Some((_, key, node)) = pending.next_if(|(position, _, _)| *position <= first) {
            root.insert(Node::from(key), node);
        }

        let nodes = members
            .iter()
            .map(|s| section_to_node(s, format))
            .collect::<Result<Vec<_>, _>>()?;

        match place {
            Placement::Service => {
                let value = if nodes.len() == 1 {
                    nodes.into_iter().next().unwrap_or(Node::Null)
                } else {
                    Node::Sequence(nodes)
                };
                root.insert(Node::from(SERVICE_KEY), value);
            }
            Placement::Pipeline(group) => {
                if !root.contains_key(PIPELINE_KEY) {
                    root.insert(Node::from(PIPELINE_KEY), Node::Mapping(Mapping::new()));
                }
                if let Some(Node::Mapping(pipeline)) = root.get_mut(PIPELINE_KEY) {
                    pipeline.insert(Node::from(group), group_node(&members, nodes));
                }
            }
            Placement::TopLevel(key) => {
                root.insert(Node::from(key), group_node(&members, nodes));
            }
        }
    }
    for (_, key, node) in pending {
        root.insert(Node::from(key), node);
    }

    Ok(Node::Mapping(root))
}

/// The `env` and `includes` nodes, each keyed by the position of its first directive
fn directive_nodes(doc: &Document) -> Vec<(usize, &'static str, Node)> {
    let mut env: Option<(usize, Mapping)> = None;
    let mut includes: Option<(usize, Vec<Node>)> = None;
    let mut order = Vec::new();

    for directive in &doc.directives {
        match &directive.kind {
            DirectiveKind::Set { key, value } => {
                let (_, map) = env.get_or_insert_with(|| {
                    order.push(ENV_KEY);
                    (directive.position, Mapping::new())
                });
                map.insert(Node::from(key.clone()), value_to_node(value));
            }
            DirectiveKind::Include(path) => {
                let (_, paths) = includes.get_or_insert_with(|| {
                    order.push(INCLUDES_KEY);
                    (directive.position, Vec::new())
                });
                paths.push(Node::from(path.clone()));
            }
        }
    }

    let mut nodes: Vec<_> = order
        .into_iter()
        .filter_map(|key| match key {
            ENV_KEY => env
                .take()
                .map(|(position, map)| (position, key, Node::Mapping(map))),
            _ => includes
                .take()
                .map(|(position, paths)| (position, key, Node::Sequence(paths))),
        })
        .collect();
    nodes.sort_by_key(|(position, _, _)| *position);
    nodes
}

/// A lone section that was read as a bare mapping is written back as one
fn group_node(members: &[&Section], mut nodes: Vec<Node>) -> Node {
    match members {
        [only] if only.mapping && nodes.len() == 1 => nodes.pop().unwrap_or(Node::Null),
        _ => Node::Sequence(nodes),
    }
}

fn section_to_node(section: &Section, format: ConfigFormat) -> Result<Node, SerializeError> {
    let mut map = Mapping::new();

    // Repeated keys fold into one sequence at the first occurrence
    for prop in &section.properties {
        let key = Node::from(prop.key.clone());
        let value = value_to_node(&prop.value);
        match map.get_mut(&key) {
            Some(Node::Sequence(existing)) => match value {
                Node::Sequence(more) => existing.extend(more),
                single => existing.push(single),
            },
            Some(existing) => {
                let first = std::mem::replace(existing, Node::Null);
                let mut items = vec![first];
                match value {
                    Node::Sequence(more) => items.extend(more),
                    single => items.push(single),
                }
                *existing = Node::Sequence(items);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    let mut child_groups: Vec<(String, Vec<&Section>)> = Vec::new();
    for child in &section.children {
        let key = child.kind.to_ascii_lowercase();
        match child_groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(child),
            None => child_groups.push((key, vec![child])),
        }
    }
    for (key, members) in child_groups {
        if map.contains_key(key.as_str()) {
            return Err(SerializeError::Unrepresentable {
                format,
                reason: format!(
                    "nested [{}] collides with property '{}' in [{}]",
                    key.to_ascii_uppercase(),
                    key,
                    section.kind
                ),
            });
        }
        let nodes = members
            .iter()
            .map(|child| section_to_node(child, format))
            .collect::<Result<Vec<_>, _>>()?;
        map.insert(Node::from(key), group_node(&members, nodes));
    }

    Ok(Node::Mapping(map))
}

fn value_to_node(value: &Value) -> Node {
    match value {
        Value::Bool(b) => Node::Bool(*b),
        Value::Int(n) => Node::Number(Number::from(*n)),
        Value::UInt(n) => Node::Number(Number::from(*n)),
        Value::Float(x) => Node::Number(Number::from(*x)),
        Value::String(s) => Node::String(s.clone()),
        Value::List(items) => Node::Sequence(items.iter().map(value_to_node).collect()),
    }
}
