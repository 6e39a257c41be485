use crate::domain::model::RunReport;
use crate::domain::ports::ReportStorage;
use crate::utils::error::{MulticamError, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    run_id: &'a str,
    stream_type: &'a str,
    run_mode: &'a str,
    meas_type: &'a str,
    camera: &'a str,
    url: &'a str,
    connected: bool,
    total_frames: u64,
    read_fps: Option<String>,
    display_frames: u64,
    display_fps: Option<String>,
    mean_latency_ms: Option<String>,
    error: Option<&'a str>,
}

fn fixed(value: Option<f64>, digits: usize) -> Option<String> {
    value.map(|v| format!("{:.*}", digits, v))
}

pub fn render_json(report: &RunReport) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(report)?)
}

/// One row per camera, with the run's settings repeated on every row.
pub fn render_csv(report: &RunReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for camera in &report.cameras {
        writer.serialize(CsvRow {
            run_id: &report.run_id,
            stream_type: report.stream_type.as_str(),
            run_mode: report.run_mode.as_str(),
            meas_type: report.meas_type.as_str(),
            camera: &camera.name,
            url: &camera.url,
            connected: camera.connected,
            total_frames: camera.total_frames,
            read_fps: fixed(camera.read_fps, 2),
            display_frames: camera.display_frames,
            display_fps: fixed(camera.display_fps, 2),
            mean_latency_ms: fixed(camera.mean_latency_ms, 1),
            error: camera.error.as_deref(),
        })?;
    }
    writer
        .into_inner()
        .map_err(|e| MulticamError::ProcessingError {
            message: format!("CSV flush failed: {}", e),
        })
}

pub fn report_file_name(report: &RunReport, format: &str) -> String {
    format!("multicam_report_{}.{}", report.run_id, format)
}

/// Writes the report once per requested format and returns the stored paths.
pub async fn persist_report<S: ReportStorage>(
    storage: &S,
    report: &RunReport,
    formats: &[String],
) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let bytes = match format.as_str() {
            "json" => render_json(report)?,
            "csv" => render_csv(report)?,
            other => {
                return Err(MulticamError::InvalidConfigValueError {
                    field: "report.formats".to_string(),
                    value: other.to_string(),
                    reason: "Unsupported format".to_string(),
                })
            }
        };
        let path = storage
            .write_file(&report_file_name(report, format), &bytes)
            .await?;
        tracing::debug!("Report written: {}", path);
        written.push(path);
    }
    Ok(written)
}
