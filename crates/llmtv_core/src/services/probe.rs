//! Media duration probing using ffprobe.

use std::path::Path;

use tokio::process::Command;

use super::error::{ServiceError, ServiceResult};

/// Duration of a media file in seconds, as reported by ffprobe.
pub async fn probe_duration(ffprobe: &str, path: &Path) -> ServiceResult<f64> {
    if !path.exists() {
        return Err(ServiceError::failed(
            "ffprobe",
            format!("file not found: {}", path.display()),
        ));
    }

    tracing::debug!("Probing duration: {}", path.display());

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| ServiceError::failed("ffprobe", format!("failed to run {}: {}", ffprobe, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ServiceError::failed(
            "ffprobe",
            format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(stdout: &str) -> ServiceResult<f64> {
    let value = stdout.lines().next().unwrap_or("").trim();
    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(ServiceError::malformed(
            "ffprobe",
            format!("unusable duration '{}'", value),
        )),
    }
}
