//! Classic (INI-like) configuration format
//!
//! ```text
//! @SET region=eu-west-1
//! @INCLUDE outputs.conf
//!
//! [INPUT]
//!     Name  tail
//!     Path  /var/log/*.log
//!     [PROCESSORS]
//!         Name  content_modifier
//! ```
//!
//! Section headers open at column zero; properties and nested headers are
//! indented beneath them and must share one indentation level per section.

use super::document::{DirectiveKind, Document, Section, Value};
use super::{ConfigCodec, ConfigFormat, ParseError, SerializeError};

/// Spaces per nesting level when dumping
const INDENT_WIDTH: usize = 4;

/// Codec for the classic format
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicCodec;

/// A section still receiving lines
struct Frame {
    indent: usize,
    child_indent: Option<usize>,
    section: Section,
}

impl ConfigCodec for ClassicCodec {
    fn format(&self) -> ConfigFormat {
        ConfigFormat::Classic
    }

    fn parse(&self, raw: &str) -> Result<Document, ParseError> {
        let mut doc = Document::new();
        let mut stack: Vec<Frame> = Vec::new();

        for (idx, line) in raw.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = line.len() - line.trim_start().len();

            if trimmed.starts_with('@') {
                if indent != 0 {
                    return Err(ParseError::InvalidNesting {
                        line: line_no,
                        reason: "directives must start at column zero".to_string(),
                    });
                }
                close_all(&mut stack, &mut doc);
                parse_directive(trimmed, line_no, &mut doc)?;
                continue;
            }

            if trimmed.starts_with('[') {
                let kind = parse_header(trimmed, line_no)?.to_ascii_uppercase();
                if indent == 0 {
                    close_all(&mut stack, &mut doc);
                } else if !enter_parent(&mut stack, &mut doc, indent, line_no)? {
                    return Err(ParseError::InvalidNesting {
                        line: line_no,
                        reason: format!("nested section [{}] has no parent section", kind),
                    });
                }
                stack.push(Frame {
                    indent,
                    child_indent: None,
                    section: Section::new(kind),
                });
                continue;
            }

            let had_open = !stack.is_empty();
            if !enter_parent(&mut stack, &mut doc, indent, line_no)? {
                if had_open {
                    return Err(ParseError::InvalidNesting {
                        line: line_no,
                        reason: "property must be indented under its section".to_string(),
                    });
                }
                return Err(ParseError::PropertyOutsideSection { line: line_no });
            }

            let (key, value) = split_property(trimmed, line_no)?;
            if let Some(frame) = stack.last_mut() {
                frame.section.properties.push(key, Value::infer(value));
            }
        }

        close_all(&mut stack, &mut doc);
        Ok(doc)
    }

    fn dump(&self, doc: &Document) -> Result<String, SerializeError> {
        let mut output = String::new();
        let total = doc.sections.len();

        // Directives past the last section are written at the end
        for slot in 0..=total {
            let mut run = doc
                .directives
                .iter()
                .filter(|d| d.position.min(total) == slot)
                .peekable();
            if run.peek().is_some() && !output.is_empty() {
                output.push('\n');
            }
            for directive in run {
                write_directive(&mut output, &directive.kind)?;
            }

            if let Some(section) = doc.sections.get(slot) {
                if !output.is_empty() {
                    output.push('\n');
                }
                write_section(&mut output, section, 0)?;
            }
        }

        Ok(output)
    }
}

/// Pop frames the line at `indent` is not nested in, then register `indent`
/// as the child indentation of the remaining top frame.
///
/// Returns `false` when no enclosing section remains.
fn enter_parent(
    stack: &mut Vec<Frame>,
    doc: &mut Document,
    indent: usize,
    line: usize,
) -> Result<bool, ParseError> {
    while stack.last().is_some_and(|frame| indent <= frame.indent) {
        close_top(stack, doc);
    }

    let Some(frame) = stack.last_mut() else {
        return Ok(false);
    };

    match frame.child_indent {
        None => frame.child_indent = Some(indent),
        Some(expected) if expected != indent => {
            return Err(ParseError::InvalidNesting {
                line,
                reason: format!(
                    "inconsistent indentation in [{}]: expected {} columns, found {}",
                    frame.section.kind, expected, indent
                ),
            });
        }
        Some(_) => {}
    }
    Ok(true)
}

fn close_top(stack: &mut Vec<Frame>, doc: &mut Document) {
    if let Some(frame) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.section.children.push(frame.section),
            None => doc.sections.push(frame.section),
        }
    }
}

fn close_all(stack: &mut Vec<Frame>, doc: &mut Document) {
    while !stack.is_empty() {
        close_top(stack, doc);
    }
}

fn parse_header(trimmed: &str, line: usize) -> Result<&str, ParseError> {
    if trimmed.len() < 2 || !trimmed.ends_with(']') {
        return Err(ParseError::UnterminatedSection { line });
    }
    let name = trimmed[1..trimmed.len() - 1].trim();
    if !is_kind(name) {
        return Err(ParseError::InvalidSectionName {
            line,
            name: name.to_string(),
        });
    }
    Ok(name)
}

fn parse_directive(trimmed: &str, line: usize, doc: &mut Document) -> Result<(), ParseError> {
    let (command, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((trimmed, ""));

    let invalid = || ParseError::InvalidDirective {
        line,
        directive: trimmed.to_string(),
    };

    if command.eq_ignore_ascii_case("@SET") {
        let (key, value) = rest.split_once('=').ok_or_else(invalid)?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(invalid());
        }
        doc.set_var(key, Value::infer(value));
        Ok(())
    } else if command.eq_ignore_ascii_case("@INCLUDE") {
        if rest.is_empty() {
            return Err(invalid());
        }
        doc.include(rest);
        Ok(())
    } else {
        Err(invalid())
    }
}

fn split_property(trimmed: &str, line: usize) -> Result<(&str, &str), ParseError> {
    match trimmed.split_once(char::is_whitespace) {
        Some((key, value)) if !value.trim().is_empty() => Ok((key, value.trim())),
        Some((key, _)) => Err(ParseError::MissingValue {
            line,
            key: key.to_string(),
        }),
        None => Err(ParseError::MissingValue {
            line,
            key: trimmed.to_string(),
        }),
    }
}

fn write_directive(output: &mut String, directive: &DirectiveKind) -> Result<(), SerializeError> {
    match directive {
        DirectiveKind::Set { key, value } => {
            if !is_token(key) || key.contains('=') {
                return Err(unrepresentable(format!("variable name '{}'", key)));
            }
            let value = render_scalar(value, key)?;
            output.push_str(&format!("@SET {}={}\n", key, value));
        }
        DirectiveKind::Include(path) => {
            if path.trim().is_empty() || path.contains('\n') || path.trim() != path {
                return Err(unrepresentable(format!("include path '{}'", path)));
            }
            output.push_str(&format!("@INCLUDE {}\n", path));
        }
    }
    Ok(())
}

fn write_section(
    output: &mut String,
    section: &Section,
    depth: usize,
) -> Result<(), SerializeError> {
    if !is_kind(&section.kind) {
        return Err(unrepresentable(format!("section kind '{}'", section.kind)));
    }

    let pad = " ".repeat(depth * INDENT_WIDTH);
    let prop_pad = " ".repeat((depth + 1) * INDENT_WIDTH);
    output.push_str(&format!("{}[{}]\n", pad, section.kind));

    let width = section
        .properties
        .iter()
        .map(|p| p.key.len())
        .max()
        .unwrap_or(0);

    for prop in &section.properties {
        if !is_token(&prop.key) {
            return Err(unrepresentable(format!("property key '{}'", prop.key)));
        }
        let values: Vec<&Value> = match &prop.value {
            Value::List(items) if items.is_empty() => {
                return Err(unrepresentable(format!("empty list under '{}'", prop.key)));
            }
            Value::List(items) => items.iter().collect(),
            value => vec![value],
        };
        for value in values {
            let text = render_scalar(value, &prop.key)?;
            output.push_str(&format!(
                "{}{:<width$} {}\n",
                prop_pad,
                prop.key,
                text,
                width = width
            ));
        }
    }

    for child in &section.children {
        write_section(output, child, depth + 1)?;
    }
    Ok(())
}

fn render_scalar(value: &Value, key: &str) -> Result<String, SerializeError> {
    if !value.is_scalar() {
        return Err(unrepresentable(format!("nested list under '{}'", key)));
    }
    let text = value.to_string();
    if text.is_empty() || text.contains('\n') || text.trim() != text {
        return Err(unrepresentable(format!(
            "value {:?} under '{}' (must be a non-empty single line without surrounding whitespace)",
            text, key
        )));
    }
    Ok(text)
}

fn is_kind(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '[' || c == ']')
}

fn is_token(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(['#', '@', '['])
        && !key.chars().any(char::is_whitespace)
}

fn unrepresentable(reason: String) -> SerializeError {
    SerializeError::Unrepresentable {
        format: ConfigFormat::Classic,
        reason,
    }
}
