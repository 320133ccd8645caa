//! Ports and health checks implied by a pipeline config
//!
//! Ports are the listening endpoints a pipeline exposes (server-type inputs,
//! exporter outputs, the built-in HTTP server). Checks are connectivity probes
//! towards the remote hosts that outputs ship to. Both are pure functions of a
//! [`Document`] and keep the document's section order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::diff::Identify;
use super::DEFAULT_HEALTH_CHECK_PIPELINE_PORT;
use crate::config::{Document, Section, Value};

/// Listen address used when a plugin does not set one
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0";

/// Default number of probe attempts for derived checks
pub const DEFAULT_CHECK_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => f.write_str("tcp"),
            PortProtocol::Udp => f.write_str("udp"),
        }
    }
}

/// A listening endpoint exposed by a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePort {
    pub protocol: PortProtocol,
    pub frontend_port: u16,
    pub backend_port: u16,
    /// Listen address
    pub endpoint: String,
    /// Section kind the port comes from
    pub kind: String,
    pub plugin_id: String,
    pub plugin_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_alias: Option<String>,
}

impl Identify for PipelinePort {
    type Key = (PortProtocol, String, u16);

    fn identity(&self) -> Self::Key {
        (self.protocol, self.endpoint.clone(), self.backend_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckProtocol {
    Tcp,
    Http,
}

impl fmt::Display for CheckProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckProtocol::Tcp => f.write_str("tcp"),
            CheckProtocol::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    New,
    Running,
    Ok,
    Failed,
}

/// A health probe derived from an output's remote target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCheck {
    pub protocol: CheckProtocol,
    pub host: String,
    pub port: u16,
    pub retries: u32,
    pub status: CheckStatus,
    pub plugin_id: String,
}

impl Identify for PipelineCheck {
    type Key = (CheckProtocol, String, u16);

    fn identity(&self) -> Self::Key {
        (self.protocol, self.host.clone(), self.port)
    }
}

/// Ports and checks extracted from one config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigEndpoints {
    pub ports: Vec<PipelinePort>,
    pub checks: Vec<PipelineCheck>,
}

impl ConfigEndpoints {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            ports: extract_ports(doc),
            checks: extract_checks(doc),
        }
    }
}

/// A plugin that listens on a port by default
struct ServerPlugin {
    name: &'static str,
    protocol: PortProtocol,
    port: u16,
}

impl ServerPlugin {
    const fn tcp(name: &'static str, port: u16) -> Self {
        Self {
            name,
            protocol: PortProtocol::Tcp,
            port,
        }
    }

    const fn udp(name: &'static str, port: u16) -> Self {
        Self {
            name,
            protocol: PortProtocol::Udp,
            port,
        }
    }
}

const INPUT_SERVERS: &[ServerPlugin] = &[
    ServerPlugin::udp("collectd", 25826),
    ServerPlugin::tcp("elasticsearch", 9200),
    ServerPlugin::tcp("forward", 24224),
    ServerPlugin::tcp("http", 9880),
    ServerPlugin::tcp("mqtt", 1883),
    ServerPlugin::tcp("opentelemetry", 4318),
    ServerPlugin::tcp("prometheus_remote_write", 8080),
    ServerPlugin::tcp("splunk", 8088),
    ServerPlugin::udp("statsd", 8125),
    ServerPlugin::tcp("tcp", 5170),
    ServerPlugin::udp("udp", 5170),
];

const OUTPUT_SERVERS: &[ServerPlugin] = &[ServerPlugin::tcp("prometheus_exporter", 2021)];

const SYSLOG_DEFAULT_PORT: u16 = 5140;

/// Outputs whose remote target can be probed, with their default port
const CHECKED_OUTPUTS: &[(&str, CheckProtocol, u16)] = &[
    ("es", CheckProtocol::Http, 9200),
    ("opensearch", CheckProtocol::Http, 9200),
    ("http", CheckProtocol::Http, 80),
    ("splunk", CheckProtocol::Http, 8088),
    ("loki", CheckProtocol::Http, 3100),
    ("influxdb", CheckProtocol::Http, 8086),
    ("forward", CheckProtocol::Tcp, 24224),
    ("tcp", CheckProtocol::Tcp, 5170),
    ("gelf", CheckProtocol::Tcp, 12201),
    ("syslog", CheckProtocol::Tcp, 514),
];

/// Listening ports, in section order
pub fn extract_ports(doc: &Document) -> Vec<PipelinePort> {
    plugins(doc)
        .into_iter()
        .filter_map(|(section, plugin_id)| port_for(section, plugin_id))
        .collect()
}

/// Health checks for outputs with a remote host, in section order
pub fn extract_checks(doc: &Document) -> Vec<PipelineCheck> {
    plugins(doc)
        .into_iter()
        .filter_map(|(section, plugin_id)| check_for(section, plugin_id))
        .collect()
}

/// Top-level sections paired with a `name.N` id, numbered per kind and name
fn plugins(doc: &Document) -> Vec<(&Section, String)> {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    doc.sections
        .iter()
        .map(|section| {
            let name = section
                .name()
                .unwrap_or(&section.kind)
                .to_ascii_lowercase();
            let counter = seen
                .entry((section.kind.to_ascii_uppercase(), name.clone()))
                .or_insert(0);
            let plugin_id = format!("{}.{}", name, counter);
            *counter += 1;
            (section, plugin_id)
        })
        .collect()
}

fn port_for(section: &Section, plugin_id: String) -> Option<PipelinePort> {
    if section.is_kind("SERVICE") {
        if !section.get("http_server").is_some_and(Value::is_enabled) {
            return None;
        }
        let port = configured_port(section, "http_port", &plugin_id)
            .unwrap_or(Some(DEFAULT_HEALTH_CHECK_PIPELINE_PORT))?;
        return Some(PipelinePort {
            protocol: PortProtocol::Tcp,
            frontend_port: port,
            backend_port: port,
            endpoint: text(section, "http_listen")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            kind: section.kind.clone(),
            plugin_id,
            plugin_name: "service".to_string(),
            plugin_alias: None,
        });
    }

    let name = section.name()?.to_ascii_lowercase();
    let (protocol, default_port) = if section.is_kind("INPUT") {
        if name == "syslog" {
            let mode = text(section, "mode").unwrap_or_default().to_ascii_lowercase();
            match mode.as_str() {
                "tcp" => (PortProtocol::Tcp, Some(SYSLOG_DEFAULT_PORT)),
                "udp" => (PortProtocol::Udp, Some(SYSLOG_DEFAULT_PORT)),
                _ => return None,
            }
        } else if let Some(server) = INPUT_SERVERS.iter().find(|s| s.name == name) {
            (server.protocol, Some(server.port))
        } else if section.get("port").is_some() {
            (PortProtocol::Tcp, None)
        } else {
            return None;
        }
    } else if section.is_kind("OUTPUT") {
        let server = OUTPUT_SERVERS.iter().find(|s| s.name == name)?;
        (server.protocol, Some(server.port))
    } else {
        return None;
    };

    let port = match configured_port(section, "port", &plugin_id) {
        Some(port) => port?,
        None => default_port?,
    };

    Some(PipelinePort {
        protocol,
        frontend_port: port,
        backend_port: port,
        endpoint: text(section, "listen").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        kind: section.kind.clone(),
        plugin_id,
        plugin_name: name,
        plugin_alias: text(section, "alias"),
    })
}

fn check_for(section: &Section, plugin_id: String) -> Option<PipelineCheck> {
    if !section.is_kind("OUTPUT") {
        return None;
    }
    let host = text(section, "host").filter(|h| !h.is_empty())?;
    let name = section.name()?.to_ascii_lowercase();

    let (protocol, default_port) = CHECKED_OUTPUTS
        .iter()
        .find(|(plugin, _, _)| *plugin == name)
        .map(|(_, protocol, port)| (*protocol, Some(*port)))
        .unwrap_or((CheckProtocol::Tcp, None));

    let port = match configured_port(section, "port", &plugin_id) {
        Some(port) => port?,
        None => match default_port {
            Some(port) => port,
            None => {
                debug!("Skipping check for {}: no port for host {}", plugin_id, host);
                return None;
            }
        },
    };

    Some(PipelineCheck {
        protocol,
        host,
        port,
        retries: DEFAULT_CHECK_RETRIES,
        status: CheckStatus::New,
        plugin_id,
    })
}

/// `None` when the key is absent, `Some(None)` when it is present but not a valid port
fn configured_port(section: &Section, key: &str, plugin_id: &str) -> Option<Option<u16>> {
    let value = section.get(key)?;
    let port = value.as_port();
    if port.is_none() {
        debug!("Ignoring {}: invalid {} '{}'", plugin_id, key, value);
    }
    Some(port)
}

fn text(section: &Section, key: &str) -> Option<String> {
    section.get(key).map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_as, ConfigFormat};

    fn classic(raw: &str) -> Document {
        parse_as(raw, ConfigFormat::Classic).unwrap()
    }

    #[test]
    fn test_server_inputs_expose_ports() {
        let doc = classic(
            "[INPUT]\n    Name forward\n\n[INPUT]\n    Name  http\n    Port  8888\n    Listen 127.0.0.1\n\n[INPUT]\n    Name statsd\n",
        );
        let ports = extract_ports(&doc);

        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].protocol, PortProtocol::Tcp);
        assert_eq!(ports[0].backend_port, 24224);
        assert_eq!(ports[0].plugin_id, "forward.0");
        assert_eq!(ports[1].backend_port, 8888);
        assert_eq!(ports[1].endpoint, "127.0.0.1");
        assert_eq!(ports[2].protocol, PortProtocol::Udp);
        assert_eq!(ports[2].backend_port, 8125);
    }

    #[test]
    fn test_client_inputs_and_outputs_have_no_ports() {
        let doc = classic(
            "[INPUT]\n    Name tail\n    Path /var/log/*.log\n\n[OUTPUT]\n    Name es\n    Host es\n    Port 9200\n",
        );
        assert!(extract_ports(&doc).is_empty());
    }

    #[test]
    fn test_unknown_input_with_port() {
        let doc = classic("[INPUT]\n    Name  custom_listener\n    Port  7000\n");
        let ports = extract_ports(&doc);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].protocol, PortProtocol::Tcp);
        assert_eq!(ports[0].backend_port, 7000);
    }

    #[test]
    fn test_syslog_mode() {
        let doc = classic(
            "[INPUT]\n    Name syslog\n    Mode udp\n\n[INPUT]\n    Name syslog\n    Mode unix_udp\n",
        );
        let ports = extract_ports(&doc);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].protocol, PortProtocol::Udp);
        assert_eq!(ports[0].backend_port, SYSLOG_DEFAULT_PORT);
    }

    #[test]
    fn test_service_http_server_and_exporter() {
        let doc = classic(
            "[SERVICE]\n    HTTP_Server On\n\n[OUTPUT]\n    Name  prometheus_exporter\n    Alias metrics\n",
        );
        let ports = extract_ports(&doc);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].backend_port, DEFAULT_HEALTH_CHECK_PIPELINE_PORT);
        assert_eq!(ports[0].plugin_name, "service");
        assert_eq!(ports[1].backend_port, 2021);
        assert_eq!(ports[1].plugin_alias.as_deref(), Some("metrics"));
    }

    #[test]
    fn test_invalid_port_is_skipped() {
        let doc = classic("[INPUT]\n    Name forward\n    Port not-a-port\n");
        assert!(extract_ports(&doc).is_empty());
    }

    #[test]
    fn test_plugin_ids_count_per_name() {
        let doc = classic(
            "[INPUT]\n    Name tcp\n    Port 5170\n\n[INPUT]\n    Name tcp\n    Port 5171\n",
        );
        let ids: Vec<_> = extract_ports(&doc).into_iter().map(|p| p.plugin_id).collect();
        assert_eq!(ids, vec!["tcp.0", "tcp.1"]);
    }

    #[test]
    fn test_checks_from_outputs() {
        let doc = classic(
            "[OUTPUT]\n    Name es\n    Host es.internal\n\n[OUTPUT]\n    Name forward\n    Host agg\n    Port 24225\n\n[OUTPUT]\n    Name stdout\n",
        );
        let checks = extract_checks(&doc);

        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].protocol, CheckProtocol::Http);
        assert_eq!(checks[0].host, "es.internal");
        assert_eq!(checks[0].port, 9200);
        assert_eq!(checks[0].retries, DEFAULT_CHECK_RETRIES);
        assert_eq!(checks[1].protocol, CheckProtocol::Tcp);
        assert_eq!(checks[1].port, 24225);
    }

    #[test]
    fn test_unknown_output_needs_explicit_port() {
        let doc = classic("[OUTPUT]\n    Name mystery\n    Host somewhere\n");
        assert!(extract_checks(&doc).is_empty());

        let doc = classic(
            "[OUTPUT]\n    Name mystery\n    Host somewhere\n    Port 4000\n",
        );
        assert_eq!(extract_checks(&doc).len(), 1);
    }

    #[test]
    fn test_extraction_works_on_yaml() {
        let doc = parse_as(
            "pipeline:\n  inputs:\n    - name: opentelemetry\n  outputs:\n    - name: loki\n      host: loki\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        let endpoints = ConfigEndpoints::from_document(&doc);
        assert_eq!(endpoints.ports[0].backend_port, 4318);
        assert_eq!(endpoints.checks[0].port, 3100);
    }
}
