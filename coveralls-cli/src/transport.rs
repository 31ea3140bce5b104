//! Report delivery: writing to disk and submitting to the Coveralls API.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use coveralls_core::{CoverageReport, CoverallsError, FileSystem, Result, render_json};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Default Coveralls host.
pub(crate) const DEFAULT_HOST: &str = "https://coveralls.io";
const JOBS_PATH: &str = "/api/v1/jobs";
const FORM_FIELD: &str = "json_file";

/// Acknowledgement returned by the jobs endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobResponse {
    pub(crate) message: String,
    pub(crate) url: String,
}

/// Submits a serialized report to the remote API.
pub(crate) trait JobSubmitter {
    fn submit<'a>(
        &'a self,
        json: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobResponse>> + Send + 'a>>;
}

/// Reqwest-backed submitter.
pub(crate) struct ReqwestSubmitter {
    client: Client,
    endpoint: String,
}

impl ReqwestSubmitter {
    /// Build a submitter for `host` with a request timeout.
    pub(crate) fn new(host: &str, timeout: Duration) -> Result<Self> {
        let host = normalize_host(host)?;
        let client = Client::builder()
            .user_agent(concat!("coveralls-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| CoverallsError::transport(format!("http client setup failed: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{host}{JOBS_PATH}"),
        })
    }
}

impl JobSubmitter for ReqwestSubmitter {
    fn submit<'a>(
        &'a self,
        json: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobResponse>> + Send + 'a>> {
        Box::pin(post_job(&self.client, &self.endpoint, json))
    }
}

/// Serialize the report and write it verbatim to `path`.
pub(crate) fn write_report<F: FileSystem>(
    fs: &F,
    path: &Path,
    report: &CoverageReport,
) -> Result<()> {
    let json = serialize_report(report)?;
    fs.write(path, &json)
}

/// Serialize a report for upload or writing.
pub(crate) fn serialize_report(report: &CoverageReport) -> Result<String> {
    render_json(report)
        .map_err(|err| CoverallsError::Unexpected(format!("report serialization failed: {err}")))
}

fn normalize_host(host: &str) -> Result<String> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(CoverallsError::Configuration(
            "coveralls host is required".to_string(),
        ));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// POST the report as multipart form data.
async fn post_job(client: &Client, endpoint: &str, json: &str) -> Result<JobResponse> {
    let part = Part::text(json.to_string())
        .file_name(FORM_FIELD)
        .mime_str("application/json")
        .map_err(|err| CoverallsError::Unexpected(format!("invalid mime type: {err}")))?;
    let form = Form::new().part(FORM_FIELD, part);

    log::debug!("posting {} bytes to {endpoint}", json.len());
    let response = client
        .post(endpoint)
        .multipart(form)
        .send()
        .await
        .map_err(|err| CoverallsError::transport(format!("coveralls request failed: {err}")))?;
    let status = response.status();
    let body = response.text().await.map_err(|err| {
        CoverallsError::transport(format!("coveralls response read failed: {err}"))
    })?;
    parse_job_response(status, &body)
}

/// Interpret the jobs endpoint response.
///
/// Rejections (non-2xx, undecodable body, `"error": true`) are transport
/// errors. A successful body lacking `message` or `url` is unexpected.
fn parse_job_response(status: StatusCode, body: &str) -> Result<JobResponse> {
    if !status.is_success() {
        return Err(CoverallsError::transport_with_response(
            format!("coveralls api error ({status})"),
            body,
        ));
    }
    let value: Value = serde_json::from_str(body).map_err(|err| {
        CoverallsError::transport_with_response(
            format!("coveralls response decode failed: {err}"),
            body,
        )
    })?;
    if value.get("error").and_then(Value::as_bool).unwrap_or(false) {
        return Err(CoverallsError::transport_with_response(
            "coveralls rejected the job",
            body,
        ));
    }
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CoverallsError::Unexpected(format!("coveralls response missing `{key}`: {body}"))
            })
    };
    Ok(JobResponse {
        message: field("message")?,
        url: field("url")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[test]
    fn normalize_host_trims_trailing_slash() {
        assert_eq!(
            normalize_host("https://coveralls.io/").expect("host"),
            "https://coveralls.io"
        );
        let err = normalize_host("  ").unwrap_err();
        assert!(err.to_string().contains("host is required"));
    }

    #[test]
    fn parses_successful_response() {
        let response = parse_job_response(
            StatusCode::OK,
            r#"{"message": "Job #1", "url": "https://x/jobs/1"}"#,
        )
        .expect("response");
        assert_eq!(
            response,
            JobResponse {
                message: "Job #1".to_string(),
                url: "https://x/jobs/1".to_string(),
            }
        );
    }

    #[test]
    fn non_success_status_keeps_response_text() {
        let err = parse_job_response(StatusCode::UNPROCESSABLE_ENTITY, "Couldn't find a repository")
            .unwrap_err();
        match err {
            CoverallsError::Transport { message, response } => {
                assert!(message.contains("422"));
                assert_eq!(response.as_deref(), Some("Couldn't find a repository"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn error_flag_is_a_transport_error() {
        let err = parse_job_response(
            StatusCode::OK,
            r#"{"message": "Bad token", "error": true}"#,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn undecodable_body_is_a_transport_error() {
        let err = parse_job_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, CoverallsError::Transport { .. }));
    }

    #[test]
    fn missing_url_is_unexpected() {
        let err = parse_job_response(StatusCode::OK, r#"{"message": "Job #1"}"#).unwrap_err();
        assert!(matches!(err, CoverallsError::Unexpected(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn submits_report_as_multipart_json_file() {
        let server = MockServer::start_async().await;
        let jobs = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/jobs")
                    .body_contains("name=\"json_file\"")
                    .body_contains("{\"source_files\":[]}");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "message": "Job #38.1",
                        "url": "https://coveralls.io/jobs/92059"
                    }));
            })
            .await;

        let submitter =
            ReqwestSubmitter::new(&server.base_url(), Duration::from_secs(5)).expect("client");
        let response = submitter
            .submit("{\"source_files\":[]}")
            .await
            .expect("submit");
        assert_eq!(response.message, "Job #38.1");
        assert_eq!(response.url, "https://coveralls.io/jobs/92059");
        jobs.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_surfaces_body() {
        let server = MockServer::start_async().await;
        let jobs = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/jobs");
                then.status(500).body("upstream down");
            })
            .await;

        let submitter =
            ReqwestSubmitter::new(&server.base_url(), Duration::from_secs(5)).expect("client");
        let err = submitter.submit("{}").await.unwrap_err();
        match err {
            CoverallsError::Transport { response, .. } => {
                assert_eq!(response.as_deref(), Some("upstream down"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        jobs.assert_async().await;
    }
}
