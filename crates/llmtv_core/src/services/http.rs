//! Shared HTTP plumbing for the hosted adapters.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::error::{ServiceError, ServiceResult};

/// Read a credential from the named environment variable.
pub(crate) fn env_credential(service: &str, var: &str) -> ServiceResult<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ServiceError::authentication(
            service,
            format!("environment variable {} is not set", var),
        )),
    }
}

/// Send a request and turn non-success statuses into service errors.
pub(crate) async fn send(service: &str, request: RequestBuilder) -> ServiceResult<Response> {
    let response = request.send().await.map_err(|e| relabel(service, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::from_status(service, status.as_u16(), truncate(&body, 300)))
}

/// Send a request and decode a JSON body.
pub(crate) async fn send_json(service: &str, request: RequestBuilder) -> ServiceResult<Value> {
    let response = send(service, request).await?;
    response
        .json::<Value>()
        .await
        .map_err(|e| ServiceError::malformed(service, e.to_string()))
}

/// Stream a response body into `dest`, creating parent directories.
pub(crate) async fn download_to(
    service: &str,
    request: RequestBuilder,
    dest: &Path,
) -> ServiceResult<u64> {
    let response = send(service, request).await?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ServiceError::failed(service, format!("create {}: {}", parent.display(), e)))?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ServiceError::failed(service, format!("create {}: {}", dest.display(), e)))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| relabel(service, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ServiceError::failed(service, format!("write {}: {}", dest.display(), e)))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| ServiceError::failed(service, format!("flush {}: {}", dest.display(), e)))?;

    if written == 0 {
        return Err(ServiceError::malformed(service, "downloaded file is empty"));
    }

    Ok(written)
}

/// Convert a transport error, naming the adapter instead of the host.
fn relabel(service: &str, e: reqwest::Error) -> ServiceError {
    match ServiceError::from(e) {
        ServiceError::Timeout { secs, .. } => ServiceError::timeout(service, secs),
        ServiceError::RateLimited { .. } => ServiceError::rate_limited(service),
        ServiceError::Unavailable { message, .. } => ServiceError::unavailable(service, message),
        ServiceError::MalformedResponse { message, .. } => ServiceError::malformed(service, message),
        ServiceError::Authentication { message, .. } => ServiceError::authentication(service, message),
        ServiceError::ContentPolicy { message, .. } => ServiceError::content_policy(service, message),
        ServiceError::Failed { message, .. } => ServiceError::failed(service, message),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_authentication_error() {
        let err = env_credential("veo", "LLMTV_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, ServiceError::Authentication { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
