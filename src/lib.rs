//! fleetconf - pipeline config transforms, endpoint diffs and config history
//!
//! Pipelines carry a raw configuration in one of three formats (classic,
//! YAML, JSON). This crate parses and re-encodes those configs, injects
//! declarative sections, derives the ports and health checks a config
//! implies, and keeps an append-only history of every committed config.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod settings;
