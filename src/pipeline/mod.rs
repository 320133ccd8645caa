//! Pipelines and their derived state
//!
//! This module ties the config transforms to pipeline lifecycle:
//! - `model`: the Pipeline resource and its request/response payloads
//! - `endpoints`: ports and health checks derived from a config
//! - `diff`: set-membership diff used to report endpoint changes
//! - `history`: append-only config versions with cursor pagination
//! - `service`: create / update / read / delete orchestration

pub mod diff;
pub mod endpoints;
pub mod history;
pub mod model;
pub mod service;

pub use diff::{diff, diff_by_identity, Diff, Identify};
pub use endpoints::{
    extract_checks, extract_ports, CheckProtocol, CheckStatus, ConfigEndpoints, PipelineCheck,
    PipelinePort, PortProtocol,
};
pub use history::{
    HistoryError, HistoryStore, PipelineConfigHistory, PipelineConfigHistoryParams,
    PipelineConfigVersion,
};
pub use model::{
    CreatePipeline, CreatedPipeline, Pipeline, PipelineConfig, PipelineKind, PipelineParams,
    PipelineStatus, PipelineStatusKind, PipelinesParams, ResourceProfile, UpdatePipeline,
    UpdatedPipeline,
};
pub use service::{PipelineError, PipelineService};

/// HTTP port of the built-in server used by health-check pipelines
pub const DEFAULT_HEALTH_CHECK_PIPELINE_PORT: u16 = 2020;
