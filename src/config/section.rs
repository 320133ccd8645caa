//! Declarative config sections queued for injection into a pipeline config

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::document::{Document, Properties, Value};
use super::structured::RESERVED_KINDS;

static KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid kind pattern"));

/// Validation failures for a declarative section
#[derive(Error, Debug, PartialEq)]
pub enum SectionError {
    #[error("Invalid section kind: '{0}'")]
    InvalidKind(String),

    #[error("Section kind '{0}' is reserved")]
    ReservedKind(String),

    #[error("Invalid property key '{key}' in section '{kind}'")]
    InvalidKey { kind: String, key: String },

    #[error("Invalid value for '{key}' in section '{kind}': {reason}")]
    InvalidValue {
        kind: String,
        key: String,
        reason: String,
    },
}

/// A caller-supplied section, always appended after the existing ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSection {
    pub kind: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ConfigSection {
    pub fn new(kind: impl Into<String>, properties: Properties) -> Self {
        Self {
            kind: kind.into(),
            properties,
        }
    }

    /// Check that the section can be written in every config format
    pub fn validate(&self) -> Result<(), SectionError> {
        if !KIND_PATTERN.is_match(&self.kind) {
            return Err(SectionError::InvalidKind(self.kind.clone()));
        }
        let upper = self.kind.to_ascii_uppercase();
        if RESERVED_KINDS.contains(&upper.as_str()) {
            return Err(SectionError::ReservedKind(self.kind.clone()));
        }

        for prop in &self.properties {
            if prop.key.is_empty()
                || prop.key.starts_with(['#', '@', '['])
                || prop.key.chars().any(char::is_whitespace)
            {
                return Err(SectionError::InvalidKey {
                    kind: self.kind.clone(),
                    key: prop.key.clone(),
                });
            }
            self.validate_value(&prop.key, &prop.value)?;
        }
        Ok(())
    }

    fn validate_value(&self, key: &str, value: &Value) -> Result<(), SectionError> {
        let fail = |reason: &str| SectionError::InvalidValue {
            kind: self.kind.clone(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        match value {
            Value::String(s) if s.trim().is_empty() => Err(fail("value is empty")),
            Value::String(s) if s.contains('\n') => Err(fail("value spans multiple lines")),
            Value::String(s) if s.trim() != s => Err(fail("value has surrounding whitespace")),
            Value::List(items) if items.is_empty() => Err(fail("list is empty")),
            Value::List(items) => items.iter().try_for_each(|item| {
                if item.is_scalar() {
                    self.validate_value(key, item)
                } else {
                    Err(fail("lists cannot be nested"))
                }
            }),
            _ => Ok(()),
        }
    }

    /// Append this section to `doc`
    pub fn apply_to(&self, doc: &mut Document) {
        doc.add_section(self.kind.clone(), self.properties.clone());
    }
}
