//! CLI module for fleetconf
//!
//! Offline subcommands over pipeline config files:
//! - `fleetconf validate` - Parse a config and summarize it
//! - `fleetconf convert` - Re-encode a config in another format
//! - `fleetconf inject` - Append a section to a config
//! - `fleetconf endpoints` - List the ports and checks a config implies
//! - `fleetconf diff` - Compare the ports and checks of two configs
//! - `fleetconf settings` - Show the effective settings

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigFormat;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "fleetconf")]
#[command(about = "Transform pipeline configs and diff the endpoints they expose")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to settings file (default: ~/.fleetconf/config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Input format (ini, yaml, json); inferred from the file extension when omitted
    #[arg(short, long, global = true, env = "FLEETCONF_FORMAT")]
    pub format: Option<ConfigFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a config file and summarize it
    Validate(ValidateArgs),

    /// Convert a config file to another format
    Convert(ConvertArgs),

    /// Append a section to a config file
    Inject(InjectArgs),

    /// List the ports and health checks a config implies
    Endpoints(EndpointsArgs),

    /// Show ports and checks added or removed between two configs
    Diff(DiffArgs),

    /// Show the effective settings
    Settings,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the config file
    pub file: PathBuf,
}

/// Arguments for the convert command
#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Path to the config file
    pub file: PathBuf,

    /// Target format
    #[arg(long)]
    pub to: ConfigFormat,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the inject command
#[derive(Parser, Debug)]
pub struct InjectArgs {
    /// Path to the config file
    pub file: PathBuf,

    /// Section kind (e.g. INPUT, FILTER, OUTPUT)
    #[arg(short, long)]
    pub kind: String,

    /// Section property, repeatable (e.g. --set Name=dummy)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub properties: Vec<(String, String)>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the endpoints command
#[derive(Parser, Debug)]
pub struct EndpointsArgs {
    /// Path to the config file
    pub file: PathBuf,
}

/// Arguments for the diff command
#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// Config before the change
    pub before: PathBuf,

    /// Config after the change
    pub after: PathBuf,
}

/// Parse a `KEY=VALUE` pair; the value may itself contain `=`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from(["fleetconf", "validate", "fluent-bit.conf"]);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.file, PathBuf::from("fluent-bit.conf"));
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::parse_from([
            "fleetconf", "convert", "in.conf", "--to", "yaml", "-o", "out.yaml",
        ]);
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.to, ConfigFormat::Yaml);
                assert_eq!(args.output, Some(PathBuf::from("out.yaml")));
            }
            _ => panic!("Expected Convert command"),
        }
    }

    #[test]
    fn test_parse_inject() {
        let cli = Cli::parse_from([
            "fleetconf",
            "inject",
            "in.conf",
            "--kind",
            "INPUT",
            "--set",
            "Name=dummy",
            "--set",
            "Dummy={\"a\"=1}",
        ]);
        match cli.command {
            Commands::Inject(args) => {
                assert_eq!(args.kind, "INPUT");
                assert_eq!(
                    args.properties,
                    vec![
                        ("Name".to_string(), "dummy".to_string()),
                        ("Dummy".to_string(), "{\"a\"=1}".to_string()),
                    ]
                );
            }
            _ => panic!("Expected Inject command"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["fleetconf", "-vv", "--format", "json", "endpoints", "p.txt"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, Some(ConfigFormat::Json));
    }

    #[test]
    fn test_parse_unknown_format() {
        let result = Cli::try_parse_from(["fleetconf", "convert", "in.conf", "--to", "toml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("Match=*").unwrap(),
            ("Match".to_string(), "*".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
