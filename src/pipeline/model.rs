//! Pipeline resource and its request/response payloads
//!
//! A Pipeline owns one raw configuration (text plus format), the ports and
//! checks derived from it, and the declarative sections queued for injection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diff::Diff;
use super::endpoints::{PipelineCheck, PipelinePort};
use crate::config::{
    inject_sections, parse_as, ConfigError, ConfigFormat, ConfigSection, Document, ParseError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineKind {
    DaemonSet,
    #[default]
    Deployment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatusKind {
    #[default]
    New,
    Failed,
    Starting,
    Started,
    Scaling,
    ChecksOk,
    ChecksFailed,
}

/// Raw configuration text and the format it is written in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub raw_config: String,
    #[serde(default)]
    pub config_format: ConfigFormat,
}

impl PipelineConfig {
    pub fn new(raw_config: impl Into<String>, config_format: ConfigFormat) -> Self {
        Self {
            raw_config: raw_config.into(),
            config_format,
        }
    }

    pub fn document(&self) -> Result<Document, ParseError> {
        parse_as(&self.raw_config, self.config_format)
    }
}

/// Last reported state, mirroring the config it was reported for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub config: PipelineConfig,
    pub status: PipelineStatusKind,
    pub updated_at: DateTime<Utc>,
}

/// Resource allocation used when a pipeline is deployed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProfile {
    pub name: String,
    pub storage_max_chunks_up: u32,
    pub storage_sync_full: bool,
    pub storage_backlog_mem_limit: String,
    pub cpu_buffer_workers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
}

impl ResourceProfile {
    pub const HIGH_PERFORMANCE_GUARANTEED_DELIVERY: &'static str =
        "high-performance-guaranteed-delivery";
    pub const HIGH_PERFORMANCE_OPTIMAL_THROUGHPUT: &'static str =
        "high-performance-optimal-throughput";
    pub const BEST_EFFORT_LOW_RESOURCE: &'static str = "best-effort-low-resource";

    /// The profiles every core instance starts with
    pub fn defaults() -> Vec<ResourceProfile> {
        vec![
            ResourceProfile {
                name: Self::HIGH_PERFORMANCE_GUARANTEED_DELIVERY.to_string(),
                storage_max_chunks_up: 128,
                storage_sync_full: true,
                storage_backlog_mem_limit: "900M".to_string(),
                cpu_buffer_workers: 4,
                cpu_limit: None,
                memory_limit: None,
            },
            ResourceProfile {
                name: Self::HIGH_PERFORMANCE_OPTIMAL_THROUGHPUT.to_string(),
                storage_max_chunks_up: 128,
                storage_sync_full: false,
                storage_backlog_mem_limit: "900M".to_string(),
                cpu_buffer_workers: 4,
                cpu_limit: None,
                memory_limit: None,
            },
            Self::best_effort_low_resource(),
        ]
    }

    pub fn best_effort_low_resource() -> Self {
        ResourceProfile {
            name: Self::BEST_EFFORT_LOW_RESOURCE.to_string(),
            storage_max_chunks_up: 32,
            storage_sync_full: false,
            storage_backlog_mem_limit: "100M".to_string(),
            cpu_buffer_workers: 1,
            cpu_limit: Some("500m".to_string()),
            memory_limit: Some("256Mi".to_string()),
        }
    }
}

/// A deployable pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: Uuid,
    pub core_instance_id: Uuid,
    pub name: String,
    pub kind: PipelineKind,
    pub config: PipelineConfig,
    /// Sections waiting to be injected into `config`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_sections: Vec<ConfigSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub status: PipelineStatus,
    pub resource_profile: ResourceProfile,
    pub wait_for_checks_before_deploying: bool,
    pub replicas_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PipelinePort>,
    #[serde(default)]
    pub checks: Vec<PipelineCheck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    internal: bool,
}

impl Pipeline {
    pub fn new(core_instance_id: Uuid, name: impl Into<String>, config: PipelineConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            core_instance_id,
            name: name.into(),
            kind: PipelineKind::default(),
            status: PipelineStatus {
                config: config.clone(),
                status: PipelineStatusKind::New,
                updated_at: now,
            },
            config,
            config_sections: Vec::new(),
            image: None,
            resource_profile: ResourceProfile::best_effort_low_resource(),
            wait_for_checks_before_deploying: false,
            replicas_count: 1,
            tags: Vec::new(),
            ports: Vec::new(),
            checks: Vec::new(),
            created_at: now,
            updated_at: now,
            internal: false,
        }
    }

    pub fn with_config_section(mut self, section: ConfigSection) -> Self {
        self.config_sections.push(section);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Inject every queued section into the raw config.
    ///
    /// No-op when nothing is queued. Otherwise the config is parsed in its own
    /// format, sections are appended in queue order, and the result is dumped
    /// back in the same format. The raw config and its status mirror are only
    /// overwritten once every step succeeded. The queue itself is left as is.
    pub fn apply_config_sections(&mut self) -> Result<(), ConfigError> {
        if self.config_sections.is_empty() {
            return Ok(());
        }

        let raw = inject_sections(
            &self.config.raw_config,
            self.config.config_format,
            &self.config_sections,
        )?;
        self.config.raw_config = raw;
        self.status.config = self.config.clone();
        Ok(())
    }

    /// Parse the current raw config
    pub fn document(&self) -> Result<Document, ParseError> {
        self.config.document()
    }

    /// Internal pipelines are managed by the service and hidden from counts
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }

    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.contains(tag))
    }
}

fn default_replicas() -> u32 {
    1
}

/// Request payload for creating a pipeline.
///
/// `status` and `internal` are not part of the public request shape; only
/// the service sets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipeline {
    pub name: String,
    #[serde(default)]
    pub kind: PipelineKind,
    #[serde(default = "default_replicas")]
    pub replicas_count: u32,
    pub raw_config: String,
    #[serde(default)]
    pub config_format: ConfigFormat,
    /// Resource profile name; the service default applies when absent
    #[serde(rename = "resourceProfile", default, skip_serializing_if = "Option::is_none")]
    pub resource_profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub skip_config_validation: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub no_auto_create_endpoints_from_config: bool,
    #[serde(default)]
    pub no_auto_create_checks_from_config: bool,
    /// Stored as given. Deployment does not block on checks either way.
    #[serde(default)]
    pub wait_for_checks_before_deploying: bool,

    #[serde(skip)]
    status: Option<PipelineStatusKind>,
    #[serde(skip)]
    internal: bool,
}

impl CreatePipeline {
    pub fn new(
        name: impl Into<String>,
        raw_config: impl Into<String>,
        config_format: ConfigFormat,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PipelineKind::default(),
            replicas_count: default_replicas(),
            raw_config: raw_config.into(),
            config_format,
            resource_profile_name: None,
            image: None,
            skip_config_validation: false,
            tags: Vec::new(),
            no_auto_create_endpoints_from_config: false,
            no_auto_create_checks_from_config: false,
            wait_for_checks_before_deploying: false,
            status: None,
            internal: false,
        }
    }

    pub fn with_kind(mut self, kind: PipelineKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas_count = replicas;
        self
    }

    pub fn with_resource_profile(mut self, name: impl Into<String>) -> Self {
        self.resource_profile_name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn skip_config_validation(mut self) -> Self {
        self.skip_config_validation = true;
        self
    }

    pub fn without_auto_endpoints(mut self) -> Self {
        self.no_auto_create_endpoints_from_config = true;
        self
    }

    pub fn without_auto_checks(mut self) -> Self {
        self.no_auto_create_checks_from_config = true;
        self
    }

    pub fn wait_for_checks(mut self, wait: bool) -> Self {
        self.wait_for_checks_before_deploying = wait;
        self
    }

    pub fn status(&self) -> Option<PipelineStatusKind> {
        self.status
    }

    pub fn internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn set_status(&mut self, status: PipelineStatusKind) {
        self.status = Some(status);
    }

    pub(crate) fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }
}

/// Response to a successful create
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPipeline {
    pub id: Uuid,
    pub name: String,
    pub config: PipelineConfig,
    pub resource_profile: ResourceProfile,
    pub ports: Vec<PipelinePort>,
    pub checks: Vec<PipelineCheck>,
    pub replicas_count: u32,
    pub wait_for_checks_before_deploying: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Pipeline> for CreatedPipeline {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name.clone(),
            config: pipeline.config.clone(),
            resource_profile: pipeline.resource_profile.clone(),
            ports: pipeline.ports.clone(),
            checks: pipeline.checks.clone(),
            replicas_count: pipeline.replicas_count,
            wait_for_checks_before_deploying: pipeline.wait_for_checks_before_deploying,
            created_at: pipeline.created_at,
        }
    }
}

/// Request payload for updating a pipeline. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PipelineKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PipelineStatusKind>,
    /// New format. Without `raw_config`, the current config is re-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_format: Option<ConfigFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_config: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_sections: Vec<ConfigSection>,
    #[serde(rename = "resourceProfile", default, skip_serializing_if = "Option::is_none")]
    pub resource_profile_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub no_auto_create_endpoints_from_config: bool,
    #[serde(default)]
    pub no_auto_create_checks_from_config: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_checks_before_deploying: Option<bool>,
    #[serde(default)]
    pub skip_config_validation: bool,
}

impl UpdatePipeline {
    pub fn with_raw_config(mut self, raw_config: impl Into<String>) -> Self {
        self.raw_config = Some(raw_config.into());
        self
    }

    pub fn with_config_format(mut self, format: ConfigFormat) -> Self {
        self.config_format = Some(format);
        self
    }

    pub fn with_section(mut self, section: ConfigSection) -> Self {
        self.config_sections.push(section);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_resource_profile(mut self, name: impl Into<String>) -> Self {
        self.resource_profile_name = Some(name.into());
        self
    }

    /// True when the update may change the raw config
    pub fn touches_config(&self) -> bool {
        self.raw_config.is_some()
            || self.config_format.is_some()
            || !self.config_sections.is_empty()
    }
}

/// Ports and checks that appeared or disappeared with an update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedPipeline {
    pub added_ports: Vec<PipelinePort>,
    pub removed_ports: Vec<PipelinePort>,
    pub added_checks: Vec<PipelineCheck>,
    pub removed_checks: Vec<PipelineCheck>,
}

impl UpdatedPipeline {
    pub fn from_diffs(ports: Diff<PipelinePort>, checks: Diff<PipelineCheck>) -> Self {
        Self {
            added_ports: ports.added,
            removed_ports: ports.removed,
            added_checks: checks.added,
            removed_checks: checks.removed,
        }
    }
}

/// Options for reading a single pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineParams {
    /// Re-encode the returned raw config in this format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_format: Option<ConfigFormat>,
}

/// Filters for listing pipelines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinesParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tags joined by ` AND `, e.g. `env=prod AND team=core`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_query: Option<String>,
}

impl PipelinesParams {
    /// Individual tags of `tags_query`
    pub fn tags(&self) -> Vec<String> {
        self.tags_query
            .as_deref()
            .map(|query| {
                query
                    .split(" AND ")
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;

    const CLASSIC: &str = "[OUTPUT]\n    Name  es\n    Port  9200\n";

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Uuid::new_v4(),
            "logs",
            PipelineConfig::new(CLASSIC, ConfigFormat::Classic),
        )
    }

    #[test]
    fn test_apply_without_sections_is_noop() {
        let mut p = pipeline();
        p.apply_config_sections().unwrap();
        assert_eq!(p.config.raw_config, CLASSIC);
    }

    #[test]
    fn test_apply_sections_rewrites_config_and_status() {
        let mut p = pipeline().with_config_section(ConfigSection::new(
            "INPUT",
            Properties::new().with("Name", "dummy"),
        ));
        p.apply_config_sections().unwrap();

        assert_eq!(p.config, p.status.config);
        let doc = p.document().unwrap();
        let kinds: Vec<_> = doc.sections.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["OUTPUT", "INPUT"]);
        assert_eq!(doc.sections[1].name(), Some("dummy"));
    }

    #[test]
    fn test_apply_sections_keeps_yaml_format() {
        let yaml = "pipeline:\n  outputs:\n    - name: stdout\n      match: '*'\n";
        let grep = ConfigSection::new("FILTER", Properties::new().with("Name", "grep"));
        let mut p = Pipeline::new(
            Uuid::new_v4(),
            "yaml",
            PipelineConfig::new(yaml, ConfigFormat::Yaml),
        )
        .with_config_section(grep);
        p.apply_config_sections().unwrap();

        assert!(p.config.raw_config.contains("filters:"));
        assert_eq!(p.document().unwrap().sections.len(), 2);
    }

    #[test]
    fn test_apply_sections_on_broken_config_leaves_it_untouched() {
        let mut p = Pipeline::new(
            Uuid::new_v4(),
            "broken",
            PipelineConfig::new("[OUTPUT\n", ConfigFormat::Classic),
        )
        .with_config_section(ConfigSection::new("INPUT", Properties::new().with("Name", "dummy")));

        assert!(p.apply_config_sections().is_err());
        assert_eq!(p.config.raw_config, "[OUTPUT\n");
        assert_eq!(p.status.config.raw_config, "[OUTPUT\n");
    }

    #[test]
    fn test_create_payload_hides_privileged_fields() {
        let mut payload = CreatePipeline::new("p", CLASSIC, ConfigFormat::Classic);
        payload.set_internal(true);
        payload.set_status(PipelineStatusKind::Started);

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("internal").is_none());
        assert!(json.get("status").is_none());
        assert_eq!(json["configFormat"], "ini");
        assert!(payload.internal());
    }

    #[test]
    fn test_create_payload_defaults() {
        let json = r#"{"name": "p", "rawConfig": "[INPUT]\n    Name dummy\n"}"#;
        let payload: CreatePipeline = serde_json::from_str(json).unwrap();
        assert_eq!(payload.replicas_count, 1);
        assert_eq!(payload.kind, PipelineKind::Deployment);
        assert_eq!(payload.config_format, ConfigFormat::Classic);
        assert!(payload.resource_profile_name.is_none());
        assert!(!payload.internal());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&PipelineKind::DaemonSet).unwrap(), "\"daemonSet\"");
        assert_eq!(
            serde_json::to_string(&PipelineStatusKind::ChecksOk).unwrap(),
            "\"CHECKS_OK\""
        );
    }

    #[test]
    fn test_tags_query() {
        let params = PipelinesParams {
            tags_query: Some("env=prod AND team=core".to_string()),
            ..Default::default()
        };
        assert_eq!(params.tags(), vec!["env=prod", "team=core"]);
        assert!(PipelinesParams::default().tags().is_empty());
    }

    #[test]
    fn test_default_resource_profiles() {
        let names: Vec<_> = ResourceProfile::defaults().into_iter().map(|p| p.name).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&ResourceProfile::BEST_EFFORT_LOW_RESOURCE.to_string()));
    }
}
