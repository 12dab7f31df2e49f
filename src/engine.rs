//! Remote execution engine.
//!
//! A work item bundles the source model, the assignment configuration and
//! an output slot with the activity that processes them. The
//! [`ExecutionEngine`] trait is the seam between the job orchestrator and
//! the Design Automation style HTTP API, so the poll loop can be driven by
//! a scripted engine in tests.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "activityId": "nick.TypeParametersActivity2024+prod",
//!   "arguments": {
//!     "rvtFile":    { "url": "...", "verb": "get", "localName": "input.rvt" },
//!     "configJson": { "url": "data:application/json,[...]", "verb": "get", "localName": "revit_type_params.json" },
//!     "result":     { "url": ".../Model_1a2b3c4d.rvt", "verb": "put", "localName": "result.rvt" }
//!   },
//!   "signatures": { "activityId": "<signature>" }
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::activity::ActivitySignature;
use crate::config::AutomationConfig;
use crate::error::{Error, Result};
use crate::models::{JobHandle, JobRequest, JobStatus, StatusReport};

pub const INPUT_FILE_PARAM: &str = "rvtFile";
pub const INPUT_CONFIG_PARAM: &str = "configJson";
pub const OUTPUT_PARAM: &str = "result";
pub const CONFIG_LOCAL_NAME: &str = "revit_type_params.json";

const DEFAULT_EXTENSION: &str = "rvt";

/// Executes work items remotely.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submits a work item and returns its handle.
    async fn submit(&self, work: &WorkItem) -> Result<JobHandle>;

    /// Fetches the current status of a submitted work item.
    async fn status(&self, handle: &JobHandle) -> Result<StatusReport>;

    /// Materializes the output of a successful work item and returns where
    /// it now lives.
    async fn finalize(&self, output: &OutputDescriptor) -> Result<String>;
}

/// The source model, read by the activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFileRef {
    pub url: String,
    pub local_name: String,
}

/// The assignment document handed to the activity inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    pub request: JobRequest,
}

impl InputConfig {
    /// `data:` URL carrying the compact JSON document.
    pub fn data_url(&self) -> Result<String> {
        Ok(format!(
            "data:application/json,{}",
            serde_json::to_string(&self.request)?
        ))
    }
}

/// Where the activity writes its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    /// Destination folder or bucket URL.
    pub destination: String,
    /// Generated output file name, e.g. `Model_1a2b3c4d.rvt`.
    pub file_name: String,
    pub local_name: String,
}

impl OutputDescriptor {
    pub fn url(&self) -> String {
        format!("{}/{}", self.destination.trim_end_matches('/'), self.file_name)
    }
}

/// Everything needed to submit one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub activity: ActivitySignature,
    pub input_file: InputFileRef,
    pub input_config: InputConfig,
    pub output: OutputDescriptor,
}

impl WorkItem {
    /// Assembles a work item for the model `display_name` stored at
    /// `input_url`, writing the result under `output_destination`.
    pub fn new(
        activity: ActivitySignature,
        request: JobRequest,
        input_url: &str,
        display_name: &str,
        output_destination: &str,
    ) -> Self {
        let ext = extension(display_name);
        Self {
            activity,
            input_file: InputFileRef {
                url: input_url.to_string(),
                local_name: format!("input.{}", ext),
            },
            input_config: InputConfig { request },
            output: OutputDescriptor {
                destination: output_destination.to_string(),
                file_name: output_file_name(display_name),
                local_name: format!("result.{}", ext),
            },
        }
    }

    /// Request body for `POST /workitems`.
    pub fn to_body(&self) -> Result<Value> {
        let mut arguments = serde_json::Map::new();
        arguments.insert(
            INPUT_FILE_PARAM.to_string(),
            json!({
                "url": self.input_file.url,
                "verb": "get",
                "localName": self.input_file.local_name,
            }),
        );
        arguments.insert(
            INPUT_CONFIG_PARAM.to_string(),
            json!({
                "url": self.input_config.data_url()?,
                "verb": "get",
                "localName": CONFIG_LOCAL_NAME,
            }),
        );
        arguments.insert(
            OUTPUT_PARAM.to_string(),
            json!({
                "url": self.output.url(),
                "verb": "put",
                "localName": self.output.local_name,
            }),
        );

        Ok(json!({
            "activityId": self.activity.activity_alias,
            "arguments": arguments,
            "signatures": { "activityId": self.activity.signature },
        }))
    }
}

fn split_name(display_name: &str) -> (&str, Option<&str>) {
    match display_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (display_name, None),
    }
}

fn extension(display_name: &str) -> &str {
    split_name(display_name).1.unwrap_or(DEFAULT_EXTENSION)
}

/// Output file name: `{stem}_{8 hex}.{ext}`.
///
/// The extension defaults to `rvt` when the display name has none.
pub fn output_file_name(display_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let (stem, ext) = split_name(display_name);
    format!("{}_{}.{}", stem, &id[..8], ext.unwrap_or(DEFAULT_EXTENSION))
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: Option<String>,
    #[serde(default)]
    report_url: Option<String>,
}

/// Design Automation v3 style engine over HTTP.
///
/// API calls are bounded by the request timeout. Output downloads use a
/// separate client where only connecting is bounded, unless
/// [`with_download_timeout`](Self::with_download_timeout) sets a limit.
pub struct HttpExecutionEngine {
    client: Client,
    download_client: Client,
    timeout: Duration,
    base_url: String,
    token: String,
    output_dir: PathBuf,
}

impl HttpExecutionEngine {
    pub fn new(
        base_url: &str,
        token: &str,
        output_dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let download_client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            download_client,
            timeout,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            output_dir,
        })
    }

    /// Limits the whole output download to `limit`. `None` keeps it open-ended.
    pub fn with_download_timeout(mut self, limit: Option<Duration>) -> Result<Self> {
        if let Some(limit) = limit {
            self.download_client = Client::builder()
                .connect_timeout(self.timeout)
                .timeout(limit)
                .build()?;
        }
        Ok(self)
    }

    pub fn from_config(config: &AutomationConfig, token: &str, timeout: Duration) -> Result<Self> {
        Self::new(&config.base_url, token, config.output_dir.clone(), timeout)?
            .with_download_timeout(config.download_timeout())
    }
}

/// Streams the response body into a fresh file at `path`.
async fn write_body(resp: &mut reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl ExecutionEngine for HttpExecutionEngine {
    async fn submit(&self, work: &WorkItem) -> Result<JobHandle> {
        let url = format!("{}/workitems", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&work.to_body()?)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::http(status, &text));
        }

        let parsed: SubmitResponse = serde_json::from_str(&text)?;
        let id = parsed
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidResponse("work item response has no id".to_string()))?;

        tracing::info!(
            job_id = %id,
            activity = %work.activity.activity_alias,
            output = %work.output.file_name,
            "work item submitted"
        );
        Ok(JobHandle::new(id))
    }

    async fn status(&self, handle: &JobHandle) -> Result<StatusReport> {
        let url = format!("{}/workitems/{}", self.base_url, handle);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::http(status, &text));
        }

        let parsed: StatusResponse = serde_json::from_str(&text)?;
        let label = parsed
            .status
            .ok_or_else(|| Error::InvalidResponse("work item status missing".to_string()))?;
        Ok(StatusReport {
            status: JobStatus::parse(&label),
            report_url: parsed.report_url,
        })
    }

    async fn finalize(&self, output: &OutputDescriptor) -> Result<String> {
        let mut resp = self
            .download_client
            .get(output.url())
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::http(status, &text));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(&output.file_name);
        let partial = self.output_dir.join(format!("{}.part", output.file_name));

        let bytes = match write_body(&mut resp, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, &path).await?;

        tracing::info!(path = %path.display(), bytes, "output downloaded");
        Ok(path.display().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParameterEntry, Target};

    fn activity() -> ActivitySignature {
        ActivitySignature {
            version: "2024".into(),
            signature: "sig".into(),
            activity_alias: "nick.TypeParametersActivity2024+prod".into(),
        }
    }

    fn request() -> JobRequest {
        JobRequest {
            entries: vec![ParameterEntry {
                parameter_name: "Cost".into(),
                parameter_group: "PG_DATA".into(),
                targets: vec![Target {
                    type_name: "T".into(),
                    family_name: "F".into(),
                    value: "10".into(),
                }],
            }],
        }
    }

    #[test]
    fn output_name_keeps_stem_and_extension() {
        let name = output_file_name("Tower.A.rvt");
        assert!(name.starts_with("Tower.A_"));
        assert!(name.ends_with(".rvt"));
        let hex = &name["Tower.A_".len()..name.len() - ".rvt".len()];
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        let bare = output_file_name("Model");
        assert!(bare.starts_with("Model_") && bare.ends_with(".rvt"));
    }

    #[test]
    fn body_has_arguments_and_signature() {
        let work = WorkItem::new(
            activity(),
            request(),
            "https://storage.example.com/in/Model.rvt",
            "Model.rvt",
            "https://storage.example.com/out/",
        );
        let body = work.to_body().unwrap();

        assert_eq!(body["activityId"], "nick.TypeParametersActivity2024+prod");
        assert_eq!(body["signatures"]["activityId"], "sig");
        assert_eq!(body["arguments"]["rvtFile"]["verb"], "get");
        assert_eq!(body["arguments"]["rvtFile"]["localName"], "input.rvt");
        assert_eq!(body["arguments"]["configJson"]["verb"], "get");
        assert_eq!(body["arguments"]["configJson"]["localName"], "revit_type_params.json");
        assert_eq!(body["arguments"]["result"]["verb"], "put");

        let result_url = body["arguments"]["result"]["url"].as_str().unwrap();
        assert!(result_url.starts_with("https://storage.example.com/out/Model_"));
        assert!(!result_url.contains("out//"));

        let config_url = body["arguments"]["configJson"]["url"].as_str().unwrap();
        let document = config_url.strip_prefix("data:application/json,").unwrap();
        let parsed: JobRequest = serde_json::from_str(document).unwrap();
        assert_eq!(parsed, request());
    }

    #[test]
    fn local_names_follow_extension() {
        let work = WorkItem::new(activity(), request(), "u", "Door.rfa", "d");
        assert_eq!(work.input_file.local_name, "input.rfa");
        assert_eq!(work.output.local_name, "result.rfa");
        assert!(work.output.file_name.ends_with(".rfa"));
    }
}
