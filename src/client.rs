use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use reqwest::multipart;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::app::BackendStatus;
use crate::config::Config;
use crate::stream::{LineFramer, StreamEvent, decode_frame};
use crate::tui::AppEvent;

/// Health probe schedule: a cold backend gets a few chances to wake up
/// before the client gives up on it.
const PROBE_ATTEMPTS: u32 = 5;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_PAUSE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_url(),
            api_key: config.api_key(),
        }
    }

    /// Open the chat stream for one question and forward decoded events into
    /// the app event channel until the transport closes.
    ///
    /// A malformed frame is logged and skipped; it never aborts the stream.
    /// Any transport-level error surfaces as `Err`, and the caller turns
    /// that into a `StreamEvent::Failed`.
    pub async fn stream_chat(&self, question: &str, tx: &UnboundedSender<AppEvent>) -> Result<()> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .context("failed to open chat stream")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let mut body = response.bytes_stream();
        let mut framer = LineFramer::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("failed to read stream chunk")?;
            for line in framer.push(&chunk) {
                forward_frame(&line, tx);
            }
        }
        // The transport may close without a trailing newline on the last
        // frame.
        if let Some(line) = framer.finish() {
            forward_frame(&line, tx);
        }

        let _ = tx.send(AppEvent::Stream(StreamEvent::Done));
        Ok(())
    }

    /// Upload one document to the ingestion endpoint. Returns how many
    /// chunks the backend stored.
    pub async fn ingest(&self, path: &Path) -> Result<u64> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.pdf")
            .to_string();

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        let url = format!("{}/api/ingest", self.base_url);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.context("failed to upload document")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "ingest request failed with status: {}",
                response.status()
            ));
        }

        let body: Value = response.json().await.context("invalid ingest response")?;
        Ok(chunks_stored(&body))
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("health check returned {}", response.status()))
        }
    }

    /// Poll the health endpoint until the backend answers or the attempts
    /// run out, reporting progress into the event channel.
    pub async fn wait_until_ready(&self, tx: &UnboundedSender<AppEvent>) {
        for attempt in 1..=PROBE_ATTEMPTS {
            match self.health().await {
                Ok(()) => {
                    info!(attempt, "backend is ready");
                    let _ = tx.send(AppEvent::Backend(BackendStatus::Online));
                    return;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "backend not ready yet");
                    let _ = tx.send(AppEvent::Backend(BackendStatus::Waking));
                    tokio::time::sleep(PROBE_PAUSE).await;
                }
            }
        }
        warn!("backend did not come up after {PROBE_ATTEMPTS} attempts");
        let _ = tx.send(AppEvent::Backend(BackendStatus::Offline));
    }
}

fn forward_frame(line: &str, tx: &UnboundedSender<AppEvent>) {
    match decode_frame(line) {
        Ok(Some(delta)) if delta.is_empty() => {
            debug!("stream frame carried no recognized fields");
        }
        Ok(Some(delta)) => {
            let _ = tx.send(AppEvent::Stream(StreamEvent::Delta(delta)));
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = %err, "skipping malformed stream frame");
        }
    }
}

/// Pull `chunks_stored` out of the ingest response; a missing or malformed
/// count reads as zero.
fn chunks_stored(body: &Value) -> u64 {
    body.get("chunks_stored").and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_chunks_stored_present() {
        assert_eq!(chunks_stored(&json!({"chunks_stored": 17})), 17);
    }

    #[test]
    fn test_chunks_stored_missing_or_wrong_type() {
        assert_eq!(chunks_stored(&json!({})), 0);
        assert_eq!(chunks_stored(&json!({"chunks_stored": "many"})), 0);
    }

    #[test]
    fn test_forward_frame_skips_malformed_and_keeps_going() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_frame("data: {broken", &tx);
        forward_frame(r#"data: {"answer":"ok"}"#, &tx);
        forward_frame("event: ping", &tx);

        let event = rx.try_recv().unwrap();
        match event {
            AppEvent::Stream(StreamEvent::Delta(delta)) => {
                assert_eq!(delta.answer.as_deref(), Some("ok"));
            }
            other => panic!("expected a delta, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
