//! Integration tests for the pipeline update workflow
//!
//! These drive `PipelineService` through create, update, history and
//! delete, including concurrent updates of the same pipeline.

use std::thread;

use uuid::Uuid;

use fleetconf::config::{parse_as, ConfigFormat, ConfigSection, Properties};
use fleetconf::pipeline::{
    CreatePipeline, PipelineConfigHistoryParams, PipelineError, PipelineParams, PipelineService,
    PortProtocol, UpdatePipeline,
};
use fleetconf::settings::Settings;

const ES_OUTPUT: &str =
    "[OUTPUT]\n    Name  es\n    Match *\n    Host  es.internal\n    Port  9200\n";

fn service_with_pipeline(raw: &str) -> (PipelineService, Uuid) {
    let service = PipelineService::new();
    let created = service
        .create_pipeline(
            Uuid::new_v4(),
            CreatePipeline::new("logs", raw, ConfigFormat::Classic),
        )
        .unwrap();
    (service, created.id)
}

#[test]
fn test_inject_input_into_classic_pipeline() {
    let (service, id) = service_with_pipeline(ES_OUTPUT);

    let updated = service
        .update_pipeline(
            id,
            UpdatePipeline::default().with_section(ConfigSection::new(
                "INPUT",
                Properties::new().with("Name", "dummy"),
            )),
        )
        .unwrap();

    assert!(updated.added_ports.is_empty());
    assert!(updated.removed_ports.is_empty());

    let pipeline = service.pipeline(id, &PipelineParams::default()).unwrap();
    assert_eq!(pipeline.config.config_format, ConfigFormat::Classic);
    assert_eq!(pipeline.status.config.raw_config, pipeline.config.raw_config);

    let doc = parse_as(&pipeline.config.raw_config, ConfigFormat::Classic).unwrap();
    assert_eq!(doc.sections.len(), 2);
    assert!(doc.sections[0].is_kind("OUTPUT"));
    assert_eq!(doc.sections[0].name(), Some("es"));
    assert!(doc.sections[1].is_kind("INPUT"));
    assert_eq!(doc.sections[1].name(), Some("dummy"));

    let history = service
        .pipeline_config_history(id, &PipelineConfigHistoryParams::default())
        .unwrap();
    assert_eq!(history.items.len(), 2);
    assert_eq!(history.items[0].raw_config(), pipeline.config.raw_config);
    assert_eq!(history.items[1].raw_config(), ES_OUTPUT);
}

#[test]
fn test_injecting_the_same_section_twice() {
    let (service, id) = service_with_pipeline(ES_OUTPUT);
    let section = ConfigSection::new(
        "FILTER",
        Properties::new()
            .with("Name", "grep")
            .with("Regex", "log error"),
    );

    for _ in 0..2 {
        service
            .update_pipeline(id, UpdatePipeline::default().with_section(section.clone()))
            .unwrap();
    }

    let doc = service
        .pipeline(id, &PipelineParams::default())
        .unwrap()
        .document()
        .unwrap();
    assert_eq!(doc.sections_of("FILTER").count(), 2);
}

#[test]
fn test_port_diff_across_updates() {
    let (service, id) = service_with_pipeline(ES_OUTPUT);

    let updated = service
        .update_pipeline(
            id,
            UpdatePipeline::default().with_section(ConfigSection::new(
                "INPUT",
                Properties::new().with("Name", "syslog").with("Mode", "udp").with("Port", 5140i64),
            )),
        )
        .unwrap();
    assert_eq!(updated.added_ports.len(), 1);
    assert_eq!(updated.added_ports[0].protocol, PortProtocol::Udp);
    assert_eq!(updated.added_ports[0].backend_port, 5140);

    let updated = service
        .update_pipeline(id, UpdatePipeline::default().with_raw_config(ES_OUTPUT))
        .unwrap();
    assert!(updated.added_ports.is_empty());
    assert_eq!(updated.removed_ports.len(), 1);
    assert_eq!(updated.removed_ports[0].backend_port, 5140);
}

#[test]
fn test_history_pagination_after_updates() {
    let (service, id) = service_with_pipeline("[INPUT]\n    Name dummy\n");
    for n in 1..=4 {
        service
            .update_pipeline(
                id,
                UpdatePipeline::default()
                    .with_raw_config(format!("[INPUT]\n    Name dummy\n    Rate {}\n", n)),
            )
            .unwrap();
    }

    let first = service
        .pipeline_config_history(id, &PipelineConfigHistoryParams::default().last(1))
        .unwrap();
    assert_eq!(first.items.len(), 1);
    assert!(first.items[0].raw_config().contains("Rate 4"));
    let mut cursor = first.end_cursor.clone();
    assert!(cursor.is_some());

    let mut seen = vec![first.items[0].raw_config().to_string()];
    while let Some(before) = cursor {
        let page = service
            .pipeline_config_history(
                id,
                &PipelineConfigHistoryParams::default().last(2).before(before),
            )
            .unwrap();
        seen.extend(page.items.iter().map(|v| v.raw_config().to_string()));
        cursor = page.end_cursor;
    }

    assert_eq!(seen.len(), 5);
    assert_eq!(seen.last().map(String::as_str), Some("[INPUT]\n    Name dummy\n"));
}

#[test]
fn test_history_respects_settings_page_limit() {
    let service = PipelineService::with_settings(Settings {
        history_page_limit: Some(2),
        ..Default::default()
    });
    let id = service
        .create_pipeline(
            Uuid::new_v4(),
            CreatePipeline::new("logs", "[INPUT]\n    Name dummy\n", ConfigFormat::Classic),
        )
        .unwrap()
        .id;
    for n in 0..3 {
        service
            .update_pipeline(
                id,
                UpdatePipeline::default()
                    .with_raw_config(format!("[INPUT]\n    Name dummy\n    Tag t{}\n", n)),
            )
            .unwrap();
    }

    let page = service
        .pipeline_config_history(id, &PipelineConfigHistoryParams::default())
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.end_cursor.is_some());
}

#[test]
fn test_failed_injection_keeps_committed_state() {
    let service = PipelineService::new();
    let id = service
        .create_pipeline(
            Uuid::new_v4(),
            CreatePipeline::new("broken", "[INPUT\n", ConfigFormat::Classic)
                .skip_config_validation(),
        )
        .unwrap()
        .id;

    let result = service.update_pipeline(
        id,
        UpdatePipeline::default().with_section(ConfigSection::new(
            "OUTPUT",
            Properties::new().with("Name", "stdout"),
        )),
    );
    assert!(matches!(result, Err(PipelineError::Parse(_))));

    let pipeline = service.pipeline(id, &PipelineParams::default()).unwrap();
    assert_eq!(pipeline.config.raw_config, "[INPUT\n");
    let history = service
        .pipeline_config_history(id, &PipelineConfigHistoryParams::default())
        .unwrap();
    assert_eq!(history.items.len(), 1);
}

#[test]
fn test_concurrent_updates_are_serialized() {
    let (service, id) = service_with_pipeline(ES_OUTPUT);
    let workers = 8;
    let updates_per_worker = 5;

    thread::scope(|scope| {
        for worker in 0..workers {
            let service = service.clone();
            scope.spawn(move || {
                for n in 0..updates_per_worker {
                    let section = ConfigSection::new(
                        "FILTER",
                        Properties::new()
                            .with("Name", "record_modifier")
                            .with("Record", format!("worker{} {}", worker, n)),
                    );
                    service
                        .update_pipeline(id, UpdatePipeline::default().with_section(section))
                        .unwrap();
                }
            });
        }
    });

    let pipeline = service.pipeline(id, &PipelineParams::default()).unwrap();
    let doc = pipeline.document().unwrap();
    assert_eq!(doc.sections_of("FILTER").count(), workers * updates_per_worker);

    let history = service
        .pipeline_config_history(id, &PipelineConfigHistoryParams::default())
        .unwrap();
    assert_eq!(history.items.len(), workers * updates_per_worker + 1);
    assert_eq!(history.items[0].raw_config(), pipeline.config.raw_config);

    // every version extends the one before it by exactly one section
    for pair in history.items.windows(2) {
        let newer = parse_as(pair[0].raw_config(), ConfigFormat::Classic).unwrap();
        let older = parse_as(pair[1].raw_config(), ConfigFormat::Classic).unwrap();
        assert_eq!(newer.sections.len(), older.sections.len() + 1);
        assert_eq!(newer.sections[..older.sections.len()], older.sections[..]);
        assert!(pair[0].created_at() >= pair[1].created_at());
    }
}

#[test]
fn test_delete_removes_history() {
    let (service, id) = service_with_pipeline(ES_OUTPUT);
    service.delete_pipeline(id).unwrap();

    let result = service.pipeline_config_history(id, &PipelineConfigHistoryParams::default());
    assert!(matches!(result, Err(PipelineError::NotFound(_))));
}
