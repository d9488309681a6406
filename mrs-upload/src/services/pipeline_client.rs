//! Processing/classifier service client
//!
//! Thin `reqwest` wrapper over the service's HTTP endpoints. No retries: a
//! failed request is reported once and the caller decides what to do.

use crate::models::responses::RemoteErrorBody;
use crate::models::{
    normalize_user_folder, server_user_folder, AnalysisPlotsResponse, ClassifierResponse,
    ProcessingResponse, SecondClassifierResponse,
};
use crate::services::classifier_upload::ClassifierUpload;
use crate::services::upload_assembler::UploadPlan;
use mrs_common::{EventBus, MrsEvent};
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("mrs-upload/", env!("CARGO_PKG_VERSION"));

pub const RUN_PROCESSING_PATH: &str = "/run-processing";
pub const RUN_CLASSIFIER_PATH: &str = "/run-classifier";
pub const RUN_SECOND_CLASSIFIER_PATH: &str = "/run-second-classifier";
pub const ANALYSIS_PLOTS_PATH: &str = "/analysis-plots";
pub const CLEANUP_PATH: &str = "/cleanup";

/// Service client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection failure, timeout, or body transfer error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Service answered with a non-success status
    #[error("Remote error {status}: {message}")]
    RemoteError {
        status: u16,
        message: String,
        /// Pipeline logs attached to the error body, if any
        logs: Option<String>,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Reading a local payload failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct UserFolderRequest<'a> {
    user_folder: &'a str,
}

#[derive(Serialize)]
struct SecondClassifierRequest<'a> {
    user_folder: &'a str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Processing/classifier service client
#[derive(Clone)]
pub struct PipelineClient {
    http_client: reqwest::Client,
    base_url: String,
    event_bus: Option<EventBus>,
}

impl PipelineClient {
    /// Create a client for the service at `base_url`
    ///
    /// `timeout` bounds each whole request; processing runs can take minutes.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            base_url,
            event_bus: None,
        })
    }

    /// Publish upload progress on `event_bus`
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a service path (`/x` or `x`)
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST /run-processing`
    pub async fn run_processing(&self, plan: UploadPlan) -> Result<ProcessingResponse, ClientError> {
        let file_count = plan.file_count();
        self.emit_started(RUN_PROCESSING_PATH, file_count);

        let result: Result<ProcessingResponse, ClientError> = match plan.into_form().await {
            Ok(form) => self.post_multipart(RUN_PROCESSING_PATH, form).await,
            Err(e) => Err(ClientError::from(e)),
        };

        self.emit_finished(RUN_PROCESSING_PATH, &result, |r| r.user_folder());

        if let Ok(response) = &result {
            tracing::info!(
                user_folder = ?response.user_folder(),
                pdfs = response.pdf_paths().count(),
                lcmodel_files = response.lcmodel_files.len(),
                "Processing completed"
            );
        }
        result
    }

    /// `POST /run-classifier`
    pub async fn run_classifier(
        &self,
        upload: ClassifierUpload,
    ) -> Result<ClassifierResponse, ClientError> {
        self.emit_started(RUN_CLASSIFIER_PATH, upload.file_count());

        let result: Result<ClassifierResponse, ClientError> = match upload.into_form().await {
            Ok(form) => self.post_multipart(RUN_CLASSIFIER_PATH, form).await,
            Err(e) => Err(ClientError::from(e)),
        };

        self.emit_finished(RUN_CLASSIFIER_PATH, &result, |r| r.user_folder());
        result
    }

    /// `POST /run-second-classifier` (1p/19q codeletion, IDH-mutant cases)
    pub async fn run_second_classifier(
        &self,
        user_folder: &str,
    ) -> Result<SecondClassifierResponse, ClientError> {
        let user_folder = normalize_user_folder(user_folder);
        let body = SecondClassifierRequest {
            user_folder: &user_folder,
            timestamp: chrono::Utc::now(),
        };
        self.post_json(RUN_SECOND_CLASSIFIER_PATH, &body).await
    }

    /// `GET /list-sd-plots/<user_folder>`
    pub async fn list_sd_plots(&self, user_folder: &str) -> Result<Vec<String>, ClientError> {
        let path = format!("/list-sd-plots/{}", normalize_user_folder(user_folder));
        let response = self.send(self.http_client.get(self.url(&path)), &path).await?;
        decode(&path, response).await
    }

    /// `POST /analysis-plots`
    pub async fn analysis_plots(
        &self,
        user_folder: &str,
    ) -> Result<AnalysisPlotsResponse, ClientError> {
        let user_folder = normalize_user_folder(user_folder);
        self.post_json(
            ANALYSIS_PLOTS_PATH,
            &UserFolderRequest {
                user_folder: &user_folder,
            },
        )
        .await
    }

    /// Prediction CSV from a run's `diagnostics/` folder
    ///
    /// `file` may be a bare name or a path that already contains
    /// `diagnostics/` (as returned in `predictions_csv`).
    pub async fn fetch_prediction_csv(
        &self,
        user_folder: &str,
        file: &str,
    ) -> Result<String, ClientError> {
        let path = prediction_csv_path(user_folder, file);
        let bytes = self.fetch_resource(&path).await?;
        String::from_utf8(bytes).map_err(|e| ClientError::ParseError(e.to_string()))
    }

    /// Any file the service serves (PDFs, report, plots)
    pub async fn fetch_resource(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let response = self.send(self.http_client.get(self.url(path)), path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(remote_error(path, status, response.text().await.unwrap_or_default()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        tracing::debug!(path, bytes = bytes.len(), "Fetched resource");
        Ok(bytes.to_vec())
    }

    /// `POST /cleanup`
    ///
    /// The service deletes the folder relative to its working directory, so
    /// the body always carries the `users/` form.
    pub async fn cleanup(&self, user_folder: &str) -> Result<(), ClientError> {
        let user_folder = server_user_folder(user_folder);
        let _: serde_json::Value = self
            .post_json(
                CLEANUP_PATH,
                &UserFolderRequest {
                    user_folder: &user_folder,
                },
            )
            .await?;
        tracing::info!(user_folder = %user_folder, "Cleaned up server folder");
        Ok(())
    }

    async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
    ) -> Result<T, ClientError> {
        let response = self
            .send(self.http_client.post(self.url(endpoint)).multipart(form), endpoint)
            .await?;
        decode(endpoint, response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .send(self.http_client.post(self.url(endpoint)).json(body), endpoint)
            .await?;
        decode(endpoint, response).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(endpoint, "Sending request");
        request.send().await.map_err(|e| {
            tracing::warn!(endpoint, error = %e, "Request failed");
            ClientError::NetworkError(e.to_string())
        })
    }

    fn emit_started(&self, endpoint: &str, file_count: usize) {
        tracing::info!(endpoint, file_count, url = %self.url(endpoint), "Uploading");
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(MrsEvent::UploadStarted {
                endpoint: endpoint.to_string(),
                file_count,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn emit_finished<T, F>(&self, endpoint: &str, result: &Result<T, ClientError>, user_folder: F)
    where
        F: FnOnce(&T) -> Option<String>,
    {
        let Some(bus) = &self.event_bus else {
            return;
        };
        let event = match result {
            Ok(response) => MrsEvent::UploadCompleted {
                endpoint: endpoint.to_string(),
                user_folder: user_folder(response),
                timestamp: chrono::Utc::now(),
            },
            Err(e) => MrsEvent::UploadFailed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
                timestamp: chrono::Utc::now(),
            },
        };
        bus.emit_lossy(event);
    }
}

/// Service path of a prediction CSV
pub fn prediction_csv_path(user_folder: &str, file: &str) -> String {
    if file.contains("diagnostics/") {
        return format!("/users/{}", file.trim_start_matches('/'));
    }
    let user_folder = normalize_user_folder(user_folder);
    let user_folder = user_folder
        .trim_end_matches('/')
        .trim_end_matches("/diagnostics");
    format!("/users/{}/diagnostics/{}", user_folder, file)
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        return Err(remote_error(endpoint, status, text));
    }

    serde_json::from_str(&text).map_err(|e| {
        tracing::warn!(endpoint, error = %e, "Unexpected response body");
        ClientError::ParseError(e.to_string())
    })
}

fn remote_error(endpoint: &str, status: reqwest::StatusCode, text: String) -> ClientError {
    let body: RemoteErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let message = body
        .message
        .or(body.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                text.clone()
            }
        });

    tracing::warn!(endpoint, status = status.as_u16(), message = %message, "Service returned an error");

    ClientError::RemoteError {
        status: status.as_u16(),
        message,
        logs: body.logs.or(body.details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = PipelineClient::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();

        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("/run-processing"), "http://localhost:5000/run-processing");
        assert_eq!(client.url("pdfs/mega_off/a.pdf"), "http://localhost:5000/pdfs/mega_off/a.pdf");
    }

    #[test]
    fn test_prediction_csv_path() {
        assert_eq!(
            prediction_csv_path("users/abc", "predictions_mega_off.csv"),
            "/users/abc/diagnostics/predictions_mega_off.csv"
        );
        assert_eq!(
            prediction_csv_path("abc/diagnostics", "predictions_mega_off.csv"),
            "/users/abc/diagnostics/predictions_mega_off.csv"
        );
        assert_eq!(
            prediction_csv_path("abc", "abc/diagnostics/predictions_1p_19q_codeletion_mega_off.csv"),
            "/users/abc/diagnostics/predictions_1p_19q_codeletion_mega_off.csv"
        );
    }

    #[test]
    fn test_remote_error_prefers_message_then_error() {
        let err = remote_error(
            "/run-processing",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"status":"error","message":"pipeline exploded","logs":"trace"}"#.to_string(),
        );
        match err {
            ClientError::RemoteError { status, message, logs } => {
                assert_eq!(status, 500);
                assert_eq!(message, "pipeline exploded");
                assert_eq!(logs.as_deref(), Some("trace"));
            }
            other => panic!("Expected remote error, got {:?}", other),
        }

        let err = remote_error(
            "/run-second-classifier",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"no csv","details":"stdout"}"#.to_string(),
        );
        assert!(matches!(
            err,
            ClientError::RemoteError { ref message, ref logs, .. }
                if message == "no csv" && logs.as_deref() == Some("stdout")
        ));
    }

    #[test]
    fn test_remote_error_falls_back_to_raw_text() {
        let err = remote_error(
            "/cleanup",
            reqwest::StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>".to_string(),
        );
        assert!(matches!(
            err,
            ClientError::RemoteError { status: 502, ref message, logs: None }
                if message == "<html>bad gateway</html>"
        ));

        let err = remote_error("/cleanup", reqwest::StatusCode::NOT_FOUND, String::new());
        assert!(matches!(
            err,
            ClientError::RemoteError { ref message, .. } if message == "Not Found"
        ));
    }
}
