//! Controller identity and session statistics.

use serde::Serialize;

use intellicenter_core::{ConnectionMetrics, Controller};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct InfoReport {
    name: String,
    version: String,
    units: &'static str,
    unique_id: String,
    system_object: String,
    objects: usize,
    host: String,
    port: u16,
    connected_since: Option<String>,
    requests_sent: u64,
    requests_completed: u64,
    requests_failed: u64,
    average_response_ms: Option<u64>,
}

pub async fn handle(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let info = controller.system_info().ok_or(CliError::ConnectionLost)?;
    let metrics = controller.metrics().await;
    let config = controller.config();

    let report = InfoReport {
        name: info.prop_name,
        version: info.sw_version,
        units: if info.uses_metric { "metric" } else { "english" },
        unique_id: info.unique_id,
        system_object: info.objnam,
        objects: controller.model().len(),
        host: config.host.clone(),
        port: config.port,
        connected_since: connected_since(&metrics),
        requests_sent: metrics.requests_sent,
        requests_completed: metrics.requests_completed,
        requests_failed: metrics.requests_failed,
        average_response_ms: metrics
            .average_response_time
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
    };

    let out = output::render_single(&global.output, &report, detail, |r| r.unique_id.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

fn connected_since(metrics: &ConnectionMetrics) -> Option<String> {
    metrics
        .connected_since
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn detail(r: &InfoReport) -> String {
    output::detail_lines([
        ("Name", r.name.clone()),
        ("Firmware", r.version.clone()),
        ("Units", r.units.to_owned()),
        ("Unique ID", r.unique_id.clone()),
        ("System object", r.system_object.clone()),
        ("Objects", r.objects.to_string()),
        ("Address", format!("{}:{}", r.host, r.port)),
        (
            "Connected since",
            r.connected_since.clone().unwrap_or_else(|| "-".into()),
        ),
        (
            "Requests",
            format!(
                "{} sent, {} completed, {} failed",
                r.requests_sent, r.requests_completed, r.requests_failed
            ),
        ),
        (
            "Avg response",
            r.average_response_ms
                .map_or_else(|| "-".into(), |ms| format!("{ms} ms")),
        ),
    ])
}
