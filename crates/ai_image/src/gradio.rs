//! Gradio Space job client
//!
//! Speaks the Gradio HTTP API used by Hugging Face Spaces:
//!
//! 1. `POST {space}/gradio_api/call/{api}` with `{"data": [...]}` returns an
//!    `event_id`
//! 2. `GET {space}/gradio_api/call/{api}/{event_id}` streams server-sent
//!    events until `complete` (outputs) or `error`
//!
//! File outputs come back as `FileData` records. They are downloaded into the
//! caller's scratch directory and their `path` is rewritten to the local copy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use crate::error::{MAX_PAYLOAD_CHARS, ProviderError, truncate};
use crate::output::Artifacts;
use crate::ports::{SpaceCall, SpaceClient, SpaceOutput};

/// Gradio job client with an optional Hugging Face token
#[derive(Debug, Clone)]
pub struct GradioClient {
    client: Client,
    token: Option<SecretString>,
    download_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    data: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    event_id: String,
}

/// A parsed server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Result of one terminal event
#[derive(Debug)]
enum JobEvent {
    Complete(Vec<Value>),
    Failed(String),
}

impl GradioClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(
        token: Option<SecretString>,
        download_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().build().map_err(|e| {
            ProviderError::Configuration(format!("Failed to create HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            token,
            download_timeout,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn call_url(space_url: &str, api_name: &str) -> String {
        format!(
            "{}/gradio_api/call/{}",
            space_url.trim_end_matches('/'),
            api_name.trim_start_matches('/')
        )
    }

    async fn submit(&self, call: &SpaceCall) -> Result<String, ProviderError> {
        let url = Self::call_url(&call.space_url, &call.api_name);
        debug!(url = %url, inputs = call.data.len(), "Submitting Gradio job");

        let response = self
            .authorized(self.client.post(&url))
            .json(&SubmitRequest { data: &call.data })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("Gradio submit", status, &body));
        }

        let body = response.text().await?;
        let submitted: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::parse(format!("Invalid Gradio submit response: {e}"), &body))?;
        Ok(submitted.event_id)
    }

    async fn await_result(
        &self,
        call: &SpaceCall,
        event_id: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let url = format!(
            "{}/{event_id}",
            Self::call_url(&call.space_url, &call.api_name)
        );
        let response = self.authorized(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("Gradio result stream", status, &body));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for event in drain_events(&mut buffer) {
                trace!(event = %event.event, "Gradio event");
                if let Some(outcome) = interpret(&event)? {
                    return match outcome {
                        JobEvent::Complete(outputs) => Ok(outputs),
                        JobEvent::Failed(message) => Err(ProviderError::Remote(message)),
                    };
                }
            }
        }

        // The server may close without a trailing blank line
        buffer.push_str("\n\n");
        for event in drain_events(&mut buffer) {
            if let Some(outcome) = interpret(&event)? {
                return match outcome {
                    JobEvent::Complete(outputs) => Ok(outputs),
                    JobEvent::Failed(message) => Err(ProviderError::Remote(message)),
                };
            }
        }

        Err(ProviderError::Remote(
            "Gradio stream ended without a result".to_string(),
        ))
    }

    /// Download every `FileData` record into `scratch`, rewriting its `path`
    async fn localize_files(
        &self,
        space_url: &str,
        outputs: &mut [Value],
        scratch: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<(), ProviderError> {
        let mut pointers = Vec::new();
        for (idx, output) in outputs.iter().enumerate() {
            collect_file_pointers(output, format!("/{idx}"), &mut pointers);
        }

        let mut root = Value::Array(outputs.to_vec());
        for pointer in pointers {
            let Some(record) = root.pointer_mut(&pointer) else {
                continue;
            };
            let Some(source) = file_source(space_url, record) else {
                continue;
            };
            let target = scratch.join(local_file_name(record));

            let data = self.fetch_file(&source).await?;
            tokio::fs::write(&target, &data).await.map_err(|e| {
                ProviderError::Remote(format!(
                    "Failed to write {}: {e}",
                    target.display()
                ))
            })?;
            written.push(target.clone());
            debug!(source = %source, path = %target.display(), bytes = data.len(), "Downloaded Gradio file");

            if let Some(fields) = record.as_object_mut() {
                fields.insert(
                    "path".to_string(),
                    Value::String(target.to_string_lossy().into_owned()),
                );
            }
        }

        if let Value::Array(items) = root {
            for (slot, item) in outputs.iter_mut().zip(items) {
                *slot = item;
            }
        }
        Ok(())
    }

    async fn fetch_file(&self, url: &str) -> Result<bytes::Bytes, ProviderError> {
        let response = self
            .authorized(self.client.get(url))
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("Gradio file download", status, &body));
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl SpaceClient for GradioClient {
    #[instrument(skip(self, call, scratch), fields(space = %call.space_url, api = %call.api_name))]
    async fn run(&self, call: SpaceCall, scratch: &Path) -> Result<SpaceOutput, ProviderError> {
        let timeout = call.timeout;
        let mut files = Vec::new();

        let job = async {
            let event_id = self.submit(&call).await?;
            debug!(event_id = %event_id, "Gradio job queued");
            let mut outputs = self.await_result(&call, &event_id).await?;
            self.localize_files(&call.space_url, &mut outputs, scratch, &mut files)
                .await?;
            Ok::<_, ProviderError>(outputs)
        };

        let result = tokio::time::timeout(timeout, job).await;
        match result {
            Ok(Ok(data)) => Ok(SpaceOutput { data, files }),
            Ok(Err(e)) => {
                discard(files);
                Err(e)
            },
            Err(_) => {
                warn!(timeout = ?timeout, "Gradio job abandoned");
                discard(files);
                Err(ProviderError::Timeout(format!(
                    "no result from {} within {}s",
                    call.api_name,
                    timeout.as_secs_f64()
                )))
            },
        }
    }
}

/// Remove files written before the job failed
fn discard(files: Vec<PathBuf>) {
    let mut stale = Artifacts::new();
    stale.track(files);
}

/// Split complete events (terminated by a blank line) off the front of `buffer`
fn drain_events(buffer: &mut String) -> Vec<SseEvent> {
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }

    let mut events = Vec::new();
    while let Some(end) = buffer.find("\n\n") {
        let block: String = buffer.drain(..end + 2).collect();
        let mut event = String::from("message");
        let mut data: Vec<&str> = Vec::new();

        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        if !data.is_empty() || event != "message" {
            events.push(SseEvent {
                event,
                data: data.join("\n"),
            });
        }
    }
    events
}

/// Map a terminal event to its outcome; `None` for progress and heartbeats
fn interpret(event: &SseEvent) -> Result<Option<JobEvent>, ProviderError> {
    match event.event.as_str() {
        "complete" => {
            let value: Value = serde_json::from_str(&event.data).map_err(|e| {
                ProviderError::parse(format!("Invalid Gradio output: {e}"), &event.data)
            })?;
            match value {
                Value::Array(items) => Ok(Some(JobEvent::Complete(items))),
                other => Ok(Some(JobEvent::Complete(vec![other]))),
            }
        },
        "error" => {
            let message = match serde_json::from_str::<Value>(&event.data) {
                Ok(Value::String(text)) => text,
                Ok(Value::Null) | Err(_) if event.data.trim().is_empty() || event.data.trim() == "null" => {
                    "Gradio job failed without a message".to_string()
                },
                _ => event.data.trim().to_string(),
            };
            Ok(Some(JobEvent::Failed(format!(
                "Gradio job failed: {}",
                truncate(&message, MAX_PAYLOAD_CHARS)
            ))))
        },
        _ => Ok(None),
    }
}

fn is_file_data(value: &Value) -> bool {
    let Some(fields) = value.as_object() else {
        return false;
    };
    let tagged = fields
        .get("meta")
        .and_then(|meta| meta.get("_type"))
        .and_then(Value::as_str)
        == Some("gradio.FileData");
    tagged || (fields.contains_key("path") && fields.contains_key("orig_name"))
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn collect_file_pointers(value: &Value, pointer: String, found: &mut Vec<String>) {
    if is_file_data(value) {
        found.push(pointer);
        return;
    }
    match value {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                collect_file_pointers(item, format!("{pointer}/{idx}"), found);
            }
        },
        Value::Object(fields) => {
            for (key, item) in fields {
                collect_file_pointers(
                    item,
                    format!("{pointer}/{}", escape_pointer_token(key)),
                    found,
                );
            }
        },
        _ => {},
    }
}

/// Where to fetch a file record from: its `url`, else the Space file route
fn file_source(space_url: &str, record: &Value) -> Option<String> {
    if let Some(url) = record.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    record
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(|path| {
            format!(
                "{}/gradio_api/file={path}",
                space_url.trim_end_matches('/')
            )
        })
}

fn local_file_name(record: &Value) -> String {
    let extension = ["orig_name", "path"]
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find_map(|name| Path::new(name).extension().and_then(|ext| ext.to_str()))
        .filter(|ext| ext.len() <= 5 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or("bin");
    format!("{}.{extension}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn call(server: &MockServer, api: &str, timeout: Duration) -> SpaceCall {
        SpaceCall {
            space_url: server.uri(),
            api_name: api.to_string(),
            data: vec![json!("a red cube"), json!(42)],
            timeout,
        }
    }

    fn client(token: Option<&str>) -> GradioClient {
        GradioClient::new(token.map(SecretString::from), Duration::from_secs(5)).unwrap()
    }

    mod sse {
        use super::*;

        #[test]
        fn parses_complete_event() {
            let mut buffer =
                "event: generating\ndata: null\n\nevent: complete\ndata: [\"x\", 1]\n\n".to_string();
            let events = drain_events(&mut buffer);

            assert_eq!(events.len(), 2);
            assert_eq!(events[1].event, "complete");
            assert_eq!(events[1].data, "[\"x\", 1]");
            assert!(buffer.is_empty());
        }

        #[test]
        fn keeps_partial_event_in_buffer() {
            let mut buffer = "event: heartbeat\ndata: null\n\nevent: compl".to_string();
            let events = drain_events(&mut buffer);

            assert_eq!(events.len(), 1);
            assert_eq!(buffer, "event: compl");
        }

        #[test]
        fn handles_crlf_line_endings() {
            let mut buffer = "event: complete\r\ndata: [1]\r\n\r\n".to_string();
            let events = drain_events(&mut buffer);
            assert_eq!(events[0].data, "[1]");
        }

        #[test]
        fn error_event_becomes_failure() {
            let event = SseEvent {
                event: "error".to_string(),
                data: "\"GPU quota exceeded\"".to_string(),
            };
            match interpret(&event).unwrap() {
                Some(JobEvent::Failed(message)) => {
                    assert_eq!(message, "Gradio job failed: GPU quota exceeded");
                },
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn null_error_event_has_generic_message() {
            let event = SseEvent {
                event: "error".to_string(),
                data: "null".to_string(),
            };
            assert!(matches!(
                interpret(&event).unwrap(),
                Some(JobEvent::Failed(message)) if message.contains("without a message")
            ));
        }

        #[test]
        fn heartbeat_is_not_terminal() {
            let event = SseEvent {
                event: "heartbeat".to_string(),
                data: "null".to_string(),
            };
            assert!(interpret(&event).unwrap().is_none());
        }
    }

    mod files {
        use super::*;

        #[test]
        fn finds_nested_file_records() {
            let output = json!([
                [{"image": {"path": "/tmp/a.webp", "url": "http://x/a.webp", "meta": {"_type": "gradio.FileData"}}, "caption": null}],
                "seed"
            ]);
            let mut found = Vec::new();
            collect_file_pointers(&output, String::new(), &mut found);
            assert_eq!(found, vec!["/0/0/image".to_string()]);
        }

        #[test]
        fn file_source_prefers_url() {
            let record = json!({"path": "/tmp/a.png", "url": "https://cdn/a.png"});
            assert_eq!(
                file_source("https://space", &record).as_deref(),
                Some("https://cdn/a.png")
            );

            let record = json!({"path": "/tmp/a.png", "url": null});
            assert_eq!(
                file_source("https://space/", &record).as_deref(),
                Some("https://space/gradio_api/file=/tmp/a.png")
            );
        }

        #[test]
        fn local_name_keeps_extension() {
            let name = local_file_name(&json!({"path": "/tmp/gradio/abc/image.webp"}));
            assert!(name.ends_with(".webp"));
            let name = local_file_name(&json!({"path": "/tmp/noext"}));
            assert!(name.ends_with(".bin"));
        }
    }

    #[tokio::test]
    async fn run_returns_outputs_and_downloads_files() {
        let server = MockServer::start().await;
        let file_url = format!("{}/files/out.png", server.uri());

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/infer"))
            .and(header("authorization", "Bearer hf_test"))
            .and(body_json(json!({"data": ["a red cube", 42]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "evt-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let stream = format!(
            "event: generating\ndata: null\n\nevent: complete\ndata: [{{\"path\": \"/remote/out.png\", \"url\": \"{file_url}\", \"orig_name\": \"out.png\", \"meta\": {{\"_type\": \"gradio.FileData\"}}}}, 7]\n\n"
        );
        Mock::given(method("GET"))
            .and(path("/gradio_api/call/infer/evt-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(stream),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/files/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG image".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let output = client(Some("hf_test"))
            .run(call(&server, "infer", Duration::from_secs(5)), scratch.path())
            .await
            .unwrap();

        assert_eq!(output.files.len(), 1);
        let local = &output.files[0];
        assert!(local.starts_with(scratch.path()));
        assert_eq!(std::fs::read(local).unwrap(), b"\x89PNG image");
        assert_eq!(
            output.data[0]["path"].as_str(),
            Some(local.to_string_lossy().as_ref())
        );
        assert_eq!(output.data[1], json!(7));
    }

    #[tokio::test]
    async fn run_reports_error_event() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/predict"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "evt-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gradio_api/call/predict/evt-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("event: error\ndata: \"ZeroGPU quota exceeded\"\n\n"),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let err = client(None)
            .run(call(&server, "predict", Duration::from_secs(5)), scratch.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Remote(_)));
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn run_fails_on_submit_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/run"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Space is sleeping"))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let err = client(None)
            .run(call(&server, "run", Duration::from_secs(5)), scratch.path())
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("Space is sleeping"));
    }

    #[tokio::test]
    async fn run_times_out_when_result_is_slow() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "slow"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gradio_api/call/run/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string("event: complete\ndata: [\"/tmp/x.png\"]\n\n"),
            )
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let err = client(None)
            .run(call(&server, "run", Duration::from_millis(200)), scratch.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn run_rejects_stream_without_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "e"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gradio_api/call/run/e"))
            .respond_with(ResponseTemplate::new(200).set_body_string("event: heartbeat\ndata: null\n\n"))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let err = client(None)
            .run(call(&server, "run", Duration::from_secs(5)), scratch.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ended without a result"));
    }

    #[tokio::test]
    async fn run_removes_downloaded_files_when_a_later_download_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gradio_api/call/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "two"})))
            .mount(&server)
            .await;
        let record = |name: &str| {
            json!({
                "path": format!("/remote/{name}"),
                "url": format!("{}/files/{name}", server.uri()),
                "meta": {"_type": "gradio.FileData"}
            })
        };
        let stream = format!(
            "event: complete\ndata: {}\n\n",
            json!([record("first.png"), record("second.png")])
        );
        Mock::given(method("GET"))
            .and(path("/gradio_api/call/generate/two"))
            .respond_with(ResponseTemplate::new(200).set_body_string(stream))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/first.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG first".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/second.png"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let scratch = tempfile::tempdir().unwrap();
        let err = client(None)
            .run(call(&server, "generate", Duration::from_secs(5)), scratch.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("404"));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
