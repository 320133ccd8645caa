//! Pipeline Service - create, update, read and delete pipelines
//!
//! The service owns every pipeline, its config history and the resource
//! profiles pipelines can reference. An update runs against a copy of the
//! pipeline while the map entry stays locked, so mutations of one pipeline
//! are serialized and a failed update commits nothing.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::diff::{diff_by_identity, Diff, Identify};
use super::endpoints::{extract_checks, extract_ports};
use super::history::{
    HistoryError, HistoryStore, PipelineConfigHistory, PipelineConfigHistoryParams,
};
use super::model::{
    CreatePipeline, CreatedPipeline, Pipeline, PipelineConfig, PipelineParams, PipelineStatusKind,
    PipelinesParams, ResourceProfile, UpdatePipeline, UpdatedPipeline,
};
use crate::config::{
    convert, dump_as, parse_as, ConfigError, ConfigFormat, Document, ParseError, SectionError,
    SerializeError, Section,
};
use crate::settings::Settings;

/// Errors returned by pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline '{0}' not found")]
    NotFound(Uuid),

    #[error("Pipeline '{0}' already exists")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid config section: {0}")]
    InvalidSection(#[from] SectionError),

    #[error("Invalid config: {0}")]
    Parse(#[from] ParseError),

    /// A parsed document could not be written back; this is a bug, not bad input
    #[error("Internal error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

/// Map a config transform failure, logging the ones that should never happen
fn config_failure(pipeline: &str, err: ConfigError) -> PipelineError {
    match err {
        ConfigError::Parse(e) => PipelineError::Parse(e),
        ConfigError::Serialize(e) => {
            error!("Failed to serialize config of pipeline '{}': {}", pipeline, e);
            PipelineError::Serialize(e)
        }
        other => PipelineError::Validation(other.to_string()),
    }
}

/// Owns pipelines, their history and the resource profiles they use
#[derive(Clone)]
pub struct PipelineService {
    /// Pipelines indexed by id
    pipelines: Arc<DashMap<Uuid, Pipeline>>,

    /// Pipeline ids indexed by (core instance, name)
    names: Arc<DashMap<(Uuid, String), Uuid>>,

    history: Arc<HistoryStore>,

    /// Resource profiles indexed by name
    resource_profiles: Arc<DashMap<String, ResourceProfile>>,

    settings: Arc<Settings>,
}

impl Default for PipelineService {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineService {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let history = match settings.history_page_limit {
            Some(limit) => HistoryStore::with_default_limit(limit),
            None => HistoryStore::new(),
        };
        let service = Self {
            pipelines: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            history: Arc::new(history),
            resource_profiles: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        };

        for profile in ResourceProfile::defaults() {
            service.register_resource_profile(profile);
        }

        service
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================================
    // Resource Profiles
    // =========================================================================

    /// Add or replace a resource profile
    pub fn register_resource_profile(&self, profile: ResourceProfile) {
        debug!("Registering resource profile '{}'", profile.name);
        self.resource_profiles.insert(profile.name.clone(), profile);
    }

    pub fn resource_profile(&self, name: &str) -> Option<ResourceProfile> {
        self.resource_profiles.get(name).map(|p| p.clone())
    }

    fn resolve_resource_profile(
        &self,
        name: Option<&str>,
    ) -> Result<ResourceProfile, PipelineError> {
        let name = name.unwrap_or(&self.settings.default_resource_profile);
        self.resource_profile(name).ok_or_else(|| {
            PipelineError::Validation(format!("resource profile '{}' not found", name))
        })
    }

    // =========================================================================
    // Pipeline Management
    // =========================================================================

    /// Create a pipeline and record its initial config version
    pub fn create_pipeline(
        &self,
        core_instance_id: Uuid,
        payload: CreatePipeline,
    ) -> Result<CreatedPipeline, PipelineError> {
        let name = payload.name.trim().to_string();
        if name.is_empty() {
            return Err(PipelineError::Validation("pipeline name is required".to_string()));
        }
        if payload.raw_config.trim().is_empty() {
            return Err(PipelineError::Validation("raw config is required".to_string()));
        }
        let resource_profile =
            self.resolve_resource_profile(payload.resource_profile_name.as_deref())?;

        let document = derive_document(
            &name,
            &payload.raw_config,
            payload.config_format,
            payload.skip_config_validation,
        )?;

        let mut pipeline = Pipeline::new(
            core_instance_id,
            name.clone(),
            PipelineConfig::new(payload.raw_config.clone(), payload.config_format),
        );
        pipeline.kind = payload.kind;
        pipeline.replicas_count = payload.replicas_count;
        pipeline.image = payload.image.clone();
        pipeline.resource_profile = resource_profile;
        pipeline.wait_for_checks_before_deploying = payload.wait_for_checks_before_deploying;
        pipeline.tags = payload.tags.clone();
        pipeline.status.status = payload.status().unwrap_or_default();
        pipeline.set_internal(payload.internal());
        if let Some(doc) = &document {
            if !payload.no_auto_create_endpoints_from_config {
                pipeline.ports = extract_ports(doc);
            }
            if !payload.no_auto_create_checks_from_config {
                pipeline.checks = extract_checks(doc);
            }
        }

        let id = pipeline.id;
        match self.names.entry((core_instance_id, name.clone())) {
            Entry::Occupied(_) => return Err(PipelineError::AlreadyExists(name)),
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        if let Err(e) = self.history.init(id, &pipeline.config.raw_config) {
            self.names.remove(&(core_instance_id, name));
            return Err(e.into());
        }

        let created = CreatedPipeline::from(&pipeline);
        self.pipelines.insert(id, pipeline);

        info!(
            "Created pipeline '{}' ({}) with {} port(s) and {} check(s)",
            created.name,
            id,
            created.ports.len(),
            created.checks.len()
        );
        Ok(created)
    }

    /// Create the internal pipeline that serves the core instance health endpoint
    pub fn create_health_check_pipeline(
        &self,
        core_instance_id: Uuid,
    ) -> Result<CreatedPipeline, PipelineError> {
        let port = self.settings.health_check_port;
        let doc = Document::new()
            .with_section(
                Section::new("SERVICE")
                    .with_property("HTTP_Server", "On")
                    .with_property("HTTP_Listen", "0.0.0.0")
                    .with_property("HTTP_Port", i64::from(port)),
            )
            .with_section(Section::new("INPUT").with_property("Name", "dummy"))
            .with_section(
                Section::new("OUTPUT")
                    .with_property("Name", "null")
                    .with_property("Match", "*"),
            );
        let raw = dump_as(&doc, ConfigFormat::Classic)
            .map_err(|e| config_failure("health-check", e.into()))?;

        let suffix = Uuid::new_v4().simple().to_string();
        let mut payload = CreatePipeline::new(
            format!("health-check-{}", &suffix[..8]),
            raw,
            ConfigFormat::Classic,
        );
        payload.set_internal(true);
        payload.set_status(PipelineStatusKind::Starting);

        self.create_pipeline(core_instance_id, payload)
    }

    /// Get a pipeline, optionally with its config re-encoded in another format
    pub fn pipeline(&self, id: Uuid, params: &PipelineParams) -> Result<Pipeline, PipelineError> {
        let mut pipeline = self
            .pipelines
            .get(&id)
            .map(|p| p.clone())
            .ok_or(PipelineError::NotFound(id))?;

        if let Some(format) = params.config_format {
            if format != pipeline.config.config_format {
                let raw = convert(
                    &pipeline.config.raw_config,
                    pipeline.config.config_format,
                    format,
                )
                .map_err(|e| config_failure(&pipeline.name, e))?;
                pipeline.config = PipelineConfig::new(raw, format);
                pipeline.status.config = pipeline.config.clone();
            }
        }
        Ok(pipeline)
    }

    /// Pipelines of a core instance, newest first
    pub fn pipelines(
        &self,
        core_instance_id: Uuid,
        params: &PipelinesParams,
    ) -> Result<Vec<Pipeline>, PipelineError> {
        if params.last == Some(0) {
            return Err(PipelineError::Validation("last must be greater than zero".to_string()));
        }
        let tags = params.tags();

        let mut pipelines: Vec<Pipeline> = self
            .pipelines
            .iter()
            .filter(|p| p.core_instance_id == core_instance_id)
            .filter(|p| params.name.as_ref().map_or(true, |name| &p.name == name))
            .filter(|p| p.has_tags(&tags))
            .map(|p| p.clone())
            .collect();

        pipelines.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
        if let Some(last) = params.last {
            pipelines.truncate(last);
        }
        Ok(pipelines)
    }

    /// Number of user pipelines on a core instance (internal ones excluded)
    pub fn count_pipelines(&self, core_instance_id: Uuid) -> usize {
        self.pipelines
            .iter()
            .filter(|p| p.core_instance_id == core_instance_id && !p.is_internal())
            .count()
    }

    /// Update a pipeline and report which ports and checks appeared or disappeared.
    ///
    /// The new raw config is, in order: `raw_config` when given, otherwise the
    /// current config re-encoded in `config_format` when that changes, otherwise
    /// the current config; then every queued section is appended. A new history
    /// version is recorded only when the raw config changed.
    pub fn update_pipeline(
        &self,
        id: Uuid,
        payload: UpdatePipeline,
    ) -> Result<UpdatedPipeline, PipelineError> {
        for section in &payload.config_sections {
            section.validate()?;
        }
        let name = match payload.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(PipelineError::Validation("pipeline name cannot be empty".to_string()))
            }
            name => name.map(String::from),
        };
        let resource_profile = payload
            .resource_profile_name
            .as_deref()
            .map(|profile| self.resolve_resource_profile(Some(profile)))
            .transpose()?;

        let mut entry = self.pipelines.get_mut(&id).ok_or(PipelineError::NotFound(id))?;
        let current = entry.value();
        let mut next = current.clone();

        if payload.touches_config() {
            let current_format = current.config.config_format;
            let target_format = payload.config_format.unwrap_or(current_format);

            next.config = match &payload.raw_config {
                Some(raw) => PipelineConfig::new(raw.clone(), target_format),
                None if target_format != current_format => {
                    let raw = convert(&current.config.raw_config, current_format, target_format)
                        .map_err(|e| config_failure(&current.name, e))?;
                    PipelineConfig::new(raw, target_format)
                }
                None => current.config.clone(),
            };
            next.config_sections = payload.config_sections.clone();
            next.apply_config_sections()
                .map_err(|e| config_failure(&current.name, e))?;
            next.config_sections.clear();
            next.status.config = next.config.clone();
        }

        let config_changed = next.config != current.config;
        let mut ports = Diff::default();
        let mut checks = Diff::default();

        if config_changed {
            let skip = payload.skip_config_validation;
            let before = current.document().ok();
            let after = derive_document(
                &current.name,
                &next.config.raw_config,
                next.config.config_format,
                skip,
            )?;

            if !payload.no_auto_create_endpoints_from_config {
                let (diff, after_ports) =
                    diff_derived(before.as_ref(), after.as_ref(), extract_ports);
                ports = diff;
                next.ports = after_ports;
            }
            if !payload.no_auto_create_checks_from_config {
                let (diff, after_checks) =
                    diff_derived(before.as_ref(), after.as_ref(), extract_checks);
                checks = diff;
                next.checks = after_checks;
            }
        }

        if let Some(kind) = payload.kind {
            next.kind = kind;
        }
        if let Some(replicas) = payload.replicas_count {
            next.replicas_count = replicas;
        }
        if let Some(image) = &payload.image {
            next.image = Some(image.clone());
        }
        if let Some(tags) = &payload.tags {
            next.tags = tags.clone();
        }
        if let Some(wait) = payload.wait_for_checks_before_deploying {
            next.wait_for_checks_before_deploying = wait;
        }
        if let Some(profile) = resource_profile {
            next.resource_profile = profile;
        }
        let now = Utc::now();
        if let Some(status) = payload.status {
            next.status.status = status;
            next.status.updated_at = now;
        }
        next.updated_at = now;

        let renamed = name.filter(|n| *n != current.name);
        if let Some(new_name) = &renamed {
            match self.names.entry((current.core_instance_id, new_name.clone())) {
                Entry::Occupied(_) => return Err(PipelineError::AlreadyExists(new_name.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            next.name = new_name.clone();
        }

        if config_changed {
            if let Err(e) = self.history.record_version(id, &next.config.raw_config) {
                if let Some(new_name) = renamed {
                    self.names.remove(&(current.core_instance_id, new_name));
                }
                return Err(e.into());
            }
        }

        let old_name = (current.core_instance_id, current.name.clone());
        *entry = next;
        drop(entry);

        if renamed.is_some() {
            self.names.remove(&old_name);
        }

        let result = UpdatedPipeline::from_diffs(ports, checks);
        info!(
            "Updated pipeline {} (config changed: {}, +{}/-{} ports, +{}/-{} checks)",
            id,
            config_changed,
            result.added_ports.len(),
            result.removed_ports.len(),
            result.added_checks.len(),
            result.removed_checks.len()
        );
        Ok(result)
    }

    /// Delete a pipeline together with its history
    pub fn delete_pipeline(&self, id: Uuid) -> Result<(), PipelineError> {
        let (_, pipeline) = self.pipelines.remove(&id).ok_or(PipelineError::NotFound(id))?;
        self.names.remove(&(pipeline.core_instance_id, pipeline.name.clone()));
        let versions = self.history.remove(id);
        info!(
            "Deleted pipeline '{}' ({}) and {} config version(s)",
            pipeline.name, id, versions
        );
        Ok(())
    }

    /// Config versions of a pipeline, newest first
    pub fn pipeline_config_history(
        &self,
        id: Uuid,
        params: &PipelineConfigHistoryParams,
    ) -> Result<PipelineConfigHistory, PipelineError> {
        if !self.pipelines.contains_key(&id) {
            return Err(PipelineError::NotFound(id));
        }
        Ok(self.history.list_versions(id, params)?)
    }
}

/// Parse a raw config for endpoint extraction.
///
/// With `skip_validation` an unparsable config is accepted and yields `None`.
fn derive_document(
    pipeline: &str,
    raw: &str,
    format: ConfigFormat,
    skip_validation: bool,
) -> Result<Option<Document>, PipelineError> {
    match parse_as(raw, format) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) if skip_validation => {
            warn!(
                "Config of pipeline '{}' does not parse as {}, skipping endpoints: {}",
                pipeline, format, e
            );
            Ok(None)
        }
        Err(e) => Err(PipelineError::Parse(e)),
    }
}

/// Extract a derived view before and after, and diff them
fn diff_derived<T, F>(
    before: Option<&Document>,
    after: Option<&Document>,
    extract: F,
) -> (Diff<T>, Vec<T>)
where
    T: Identify + Clone,
    F: Fn(&Document) -> Vec<T>,
{
    let before = before.map(&extract).unwrap_or_default();
    let after = after.map(&extract).unwrap_or_default();
    (diff_by_identity(&before, &after), after)
}
