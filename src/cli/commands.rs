//! Command implementations for the CLI
//!
//! SBIO pattern: Commands return Results, printing is handled by the caller

use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::{Cli, Commands};
use crate::config::{
    convert, inject_sections, load_config_file, ConfigError, ConfigFormat, ConfigSection,
    LoadedConfig, Properties, SectionError, Value,
};
use crate::pipeline::{diff_by_identity, ConfigEndpoints, UpdatedPipeline};
use crate::settings::{serialize_settings, Settings, SettingsError};

use super::display::{format_endpoints, format_update_diff, format_validation};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid section: {0}")]
    Section(#[from] SectionError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Summary of a parsed config file
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub format: ConfigFormat,
    /// Section kinds with their count, in order of first appearance
    pub sections: Vec<(String, usize)>,
    pub env: usize,
    pub includes: usize,
    pub endpoints: ConfigEndpoints,
}

// ============================================================================
// Config Commands
// ============================================================================

fn load(
    path: &Path,
    format: Option<ConfigFormat>,
    settings: &Settings,
) -> CommandResult<LoadedConfig> {
    Ok(load_config_file(path, format, settings.default_format)?)
}

/// Parse a config file and summarize what it contains
pub fn validate(
    path: &Path,
    format: Option<ConfigFormat>,
    settings: &Settings,
) -> CommandResult<ValidationResult> {
    let loaded = load(path, format, settings)?;

    let mut sections: Vec<(String, usize)> = Vec::new();
    for section in &loaded.document.sections {
        match sections.iter_mut().find(|(kind, _)| section.is_kind(kind)) {
            Some((_, count)) => *count += 1,
            None => sections.push((section.kind.clone(), 1)),
        }
    }

    Ok(ValidationResult {
        format: loaded.format,
        sections,
        env: loaded.document.env().len(),
        includes: loaded.document.includes().len(),
        endpoints: ConfigEndpoints::from_document(&loaded.document),
    })
}

/// Re-encode a config file in another format
pub fn convert_file(
    path: &Path,
    format: Option<ConfigFormat>,
    to: ConfigFormat,
    settings: &Settings,
) -> CommandResult<String> {
    let loaded = load(path, format, settings)?;
    Ok(convert(&loaded.raw, loaded.format, to)?)
}

/// Append one section to a config file, keeping its format
pub fn inject_file(
    path: &Path,
    format: Option<ConfigFormat>,
    kind: &str,
    properties: &[(String, String)],
    settings: &Settings,
) -> CommandResult<String> {
    let section = ConfigSection::new(
        kind,
        properties
            .iter()
            .map(|(key, value)| (key.clone(), Value::infer(value)))
            .collect::<Properties>(),
    );
    section.validate()?;

    let loaded = load(path, format, settings)?;
    Ok(inject_sections(&loaded.raw, loaded.format, &[section])?)
}

/// Ports and checks implied by a config file
pub fn endpoints(
    path: &Path,
    format: Option<ConfigFormat>,
    settings: &Settings,
) -> CommandResult<ConfigEndpoints> {
    let loaded = load(path, format, settings)?;
    Ok(ConfigEndpoints::from_document(&loaded.document))
}

/// Ports and checks added or removed going from `before` to `after`
pub fn diff_files(
    before: &Path,
    after: &Path,
    format: Option<ConfigFormat>,
    settings: &Settings,
) -> CommandResult<UpdatedPipeline> {
    let before = endpoints(before, format, settings)?;
    let after = endpoints(after, format, settings)?;

    Ok(UpdatedPipeline::from_diffs(
        diff_by_identity(&before.ports, &after.ports),
        diff_by_identity(&before.checks, &after.checks),
    ))
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run a parsed command line and return what should be printed
pub fn execute(cli: &Cli, settings: &Settings) -> CommandResult<String> {
    let format = cli.format;
    match &cli.command {
        Commands::Validate(args) => {
            let result = validate(&args.file, format, settings)?;
            Ok(format_validation(&args.file, &result))
        }
        Commands::Convert(args) => {
            let output = convert_file(&args.file, format, args.to, settings)?;
            write_or_return(args.output.as_deref(), output)
        }
        Commands::Inject(args) => {
            let output = inject_file(&args.file, format, &args.kind, &args.properties, settings)?;
            write_or_return(args.output.as_deref(), output)
        }
        Commands::Endpoints(args) => {
            let endpoints = endpoints(&args.file, format, settings)?;
            Ok(format_endpoints(&endpoints))
        }
        Commands::Diff(args) => {
            let diff = diff_files(&args.before, &args.after, format, settings)?;
            Ok(format_update_diff(&diff))
        }
        Commands::Settings => Ok(serialize_settings(settings)?),
    }
}

fn write_or_return(output: Option<&Path>, content: String) -> CommandResult<String> {
    match output {
        Some(path) => {
            std::fs::write(path, &content)?;
            info!("Wrote {} bytes to {}", content.len(), path.display());
            Ok(String::new())
        }
        None => Ok(content),
    }
}
