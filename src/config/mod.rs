pub mod classic;
pub mod document;
pub mod format;
pub mod section;
pub mod structured;

pub use classic::ClassicCodec;
pub use document::{Directive, DirectiveKind, Document, Properties, Property, Section, Value};
pub use format::ConfigFormat;
pub use section::{ConfigSection, SectionError};
pub use structured::{JsonCodec, YamlCodec};

use std::path::Path;

use thiserror::Error;

/// Errors raised while turning raw text into a [`Document`]
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unterminated section header")]
    UnterminatedSection { line: usize },

    #[error("line {line}: invalid section name '{name}'")]
    InvalidSectionName { line: usize, name: String },

    #[error("line {line}: invalid nesting: {reason}")]
    InvalidNesting { line: usize, reason: String },

    #[error("line {line}: property '{key}' has no value")]
    MissingValue { line: usize, key: String },

    #[error("line {line}: property outside of a section")]
    PropertyOutsideSection { line: usize },

    #[error("line {line}: invalid directive '{directive}'")]
    InvalidDirective { line: usize, directive: String },

    #[error("{format} decode error: {message}")]
    Decode { format: ConfigFormat, message: String },

    #[error("invalid structure: {0}")]
    InvalidStructure(String),
}

/// A [`Document`] that cannot be written in the requested format.
///
/// Documents built by the parser or by section injection never trigger this;
/// seeing it means a document was assembled in an unrepresentable state.
#[derive(Error, Debug, PartialEq)]
pub enum SerializeError {
    #[error("cannot represent document as {format}: {reason}")]
    Unrepresentable { format: ConfigFormat, reason: String },

    #[error("{format} encode error: {message}")]
    Encode { format: ConfigFormat, message: String },
}

/// Errors for file I/O and format selection (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown config format: '{0}'")]
    UnknownFormat(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Serialize error: {0}")]
    Serialize(#[from] SerializeError),
}

/// One parse/dump strategy per [`ConfigFormat`]
pub trait ConfigCodec {
    fn format(&self) -> ConfigFormat;

    /// Parse raw text. All-or-nothing: no partial document on failure.
    fn parse(&self, raw: &str) -> Result<Document, ParseError>;

    fn dump(&self, doc: &Document) -> Result<String, SerializeError>;
}

impl ConfigFormat {
    /// The codec implementing this format
    pub fn codec(&self) -> &'static dyn ConfigCodec {
        match self {
            ConfigFormat::Classic => &ClassicCodec,
            ConfigFormat::Yaml => &YamlCodec,
            ConfigFormat::Json => &JsonCodec,
        }
    }
}

// ============================================================================
// SBIO: Pure transform functions (no I/O)
// ============================================================================

/// Parse raw configuration text in the given format
pub fn parse_as(raw: &str, format: ConfigFormat) -> Result<Document, ParseError> {
    format.codec().parse(raw)
}

/// Serialize a document in the given format
pub fn dump_as(doc: &Document, format: ConfigFormat) -> Result<String, SerializeError> {
    format.codec().dump(doc)
}

/// Re-encode raw configuration text from one format into another
pub fn convert(raw: &str, from: ConfigFormat, to: ConfigFormat) -> Result<String, ConfigError> {
    let doc = parse_as(raw, from)?;
    Ok(dump_as(&doc, to)?)
}

/// Parse `raw`, append every section in order, and dump it back in the same format
pub fn inject_sections(
    raw: &str,
    format: ConfigFormat,
    sections: &[ConfigSection],
) -> Result<String, ConfigError> {
    let mut doc = parse_as(raw, format)?;
    for section in sections {
        section.apply_to(&mut doc);
    }
    Ok(dump_as(&doc, format)?)
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// A configuration file read from disk
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub raw: String,
    pub format: ConfigFormat,
    pub document: Document,
}

/// Load and parse a configuration file.
///
/// The format is `format` when given, otherwise inferred from the file
/// extension, otherwise `fallback`.
pub fn load_config_file(
    path: &Path,
    format: Option<ConfigFormat>,
    fallback: ConfigFormat,
) -> Result<LoadedConfig, ConfigError> {
    let format = format
        .or_else(|| ConfigFormat::from_path(path))
        .unwrap_or(fallback);
    let raw = std::fs::read_to_string(path)?;
    let document = parse_as(&raw, format)?;
    Ok(LoadedConfig {
        raw,
        format,
        document,
    })
}
