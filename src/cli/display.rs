//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use std::path::Path;

use super::commands::ValidationResult;
use crate::pipeline::{ConfigEndpoints, PipelineCheck, PipelinePort, UpdatedPipeline};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Lay out endpoint rows under their headers.
///
/// Every row has one cell per header. Columns are padded to their widest
/// cell; the last one is left unpadded.
pub fn format_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    if rows.is_empty() {
        return "None.\n".to_string();
    }

    let headers = headers.map(str::to_string);
    let mut widths = headers.each_ref().map(String::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: &[String; N]| {
        let mut line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:width$}", cell))
            .collect::<Vec<_>>()
            .join(COLUMN_GAP);
        line.truncate(line.trim_end().len());
        line.push('\n');
        line
    };

    std::iter::once(&headers).chain(rows).map(render).collect()
}

const COLUMN_GAP: &str = "   ";

// ============================================================================
// Endpoint display
// ============================================================================

/// Format ports as a table
pub fn format_ports(ports: &[PipelinePort]) -> String {
    let headers = ["PROTOCOL", "ENDPOINT", "PORT", "KIND", "PLUGIN"];
    let rows: Vec<[String; 5]> = ports
        .iter()
        .map(|p| {
            let plugin = match &p.plugin_alias {
                Some(alias) => format!("{} ({})", p.plugin_id, alias),
                None => p.plugin_id.clone(),
            };
            [
                p.protocol.to_string(),
                p.endpoint.clone(),
                p.backend_port.to_string(),
                p.kind.clone(),
                plugin,
            ]
        })
        .collect();

    format_table(headers, &rows)
}

/// Format checks as a table
pub fn format_checks(checks: &[PipelineCheck]) -> String {
    let headers = ["PROTOCOL", "HOST", "PORT", "RETRIES", "PLUGIN"];
    let rows: Vec<[String; 5]> = checks
        .iter()
        .map(|c| {
            [
                c.protocol.to_string(),
                c.host.clone(),
                c.port.to_string(),
                c.retries.to_string(),
                c.plugin_id.clone(),
            ]
        })
        .collect();

    format_table(headers, &rows)
}

pub fn format_endpoints(endpoints: &ConfigEndpoints) -> String {
    format!(
        "Ports:\n{}\nChecks:\n{}",
        format_ports(&endpoints.ports),
        format_checks(&endpoints.checks)
    )
}

/// Format the result of an update (or a file diff)
pub fn format_update_diff(diff: &UpdatedPipeline) -> String {
    if diff.added_ports.is_empty()
        && diff.removed_ports.is_empty()
        && diff.added_checks.is_empty()
        && diff.removed_checks.is_empty()
    {
        return "No port or check changes.\n".to_string();
    }

    let mut output = String::new();
    for (title, ports) in [
        ("Added ports", &diff.added_ports),
        ("Removed ports", &diff.removed_ports),
    ] {
        if !ports.is_empty() {
            output.push_str(&format!("{}:\n{}\n", title, format_ports(ports)));
        }
    }
    for (title, checks) in [
        ("Added checks", &diff.added_checks),
        ("Removed checks", &diff.removed_checks),
    ] {
        if !checks.is_empty() {
            output.push_str(&format!("{}:\n{}\n", title, format_checks(checks)));
        }
    }
    output
}

// ============================================================================
// Validation display
// ============================================================================

/// Format a validation summary
pub fn format_validation(path: &Path, result: &ValidationResult) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "✓ {} is a valid {} config\n\n",
        path.display(),
        result.format
    ));

    if !result.sections.is_empty() {
        output.push_str("Sections:\n");
        for (kind, count) in &result.sections {
            output.push_str(&format!("  {:<18} {}\n", kind, count));
        }
    }
    if result.env > 0 {
        output.push_str(&format!("Variables: {}\n", result.env));
    }
    if result.includes > 0 {
        output.push_str(&format!("Includes:  {}\n", result.includes));
    }

    output.push_str(&format!(
        "Ports: {}   Checks: {}\n",
        result.endpoints.ports.len(),
        result.endpoints.checks.len()
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use crate::pipeline::{CheckProtocol, CheckStatus, PortProtocol};

    fn port(port: u16) -> PipelinePort {
        PipelinePort {
            protocol: PortProtocol::Tcp,
            frontend_port: port,
            backend_port: port,
            endpoint: "0.0.0.0".to_string(),
            kind: "INPUT".to_string(),
            plugin_id: "forward.0".to_string(),
            plugin_name: "forward".to_string(),
            plugin_alias: None,
        }
    }

    #[test]
    fn test_format_table() {
        let rows = [
            ["forward.0".to_string(), "24224".to_string()],
            ["http.0".to_string(), "9880".to_string()],
        ];
        let output = format_table(["PLUGIN", "PORT"], &rows);
        assert_eq!(
            output,
            "PLUGIN      PORT\nforward.0   24224\nhttp.0      9880\n"
        );
    }

    #[test]
    fn test_format_empty_table() {
        let output = format_table(["A", "B"], &[]);
        assert_eq!(output, "None.\n");
    }

    #[test]
    fn test_format_ports_with_alias() {
        let mut p = port(24224);
        p.plugin_alias = Some("ingest".to_string());
        let output = format_ports(&[p]);
        assert!(output.contains("forward.0 (ingest)"));
        assert!(output.contains("tcp"));
    }

    #[test]
    fn test_format_update_diff() {
        let diff = UpdatedPipeline {
            added_ports: vec![port(9880)],
            removed_checks: vec![PipelineCheck {
                protocol: CheckProtocol::Http,
                host: "es".to_string(),
                port: 9200,
                retries: 3,
                status: CheckStatus::New,
                plugin_id: "es.0".to_string(),
            }],
            ..Default::default()
        };
        let output = format_update_diff(&diff);
        assert!(output.contains("Added ports:"));
        assert!(output.contains("Removed checks:"));
        assert!(!output.contains("Removed ports:"));

        assert_eq!(
            format_update_diff(&UpdatedPipeline::default()),
            "No port or check changes.\n"
        );
    }

    #[test]
    fn test_format_validation() {
        let result = ValidationResult {
            format: ConfigFormat::Yaml,
            sections: vec![("INPUT".to_string(), 2)],
            env: 0,
            includes: 1,
            endpoints: ConfigEndpoints::default(),
        };
        let output = format_validation(Path::new("p.yaml"), &result);
        assert!(output.contains("valid yaml config"));
        assert!(output.contains("INPUT"));
        assert!(output.contains("Includes:  1"));
        assert!(!output.contains("Variables"));
    }
}
