//! Newline-delimited bulk document sink.
//!
//! Each committed batch is rendered in the bulk wire format: an action line
//! `{"index":{"_index":..,"_type":..}}` followed by the document source line,
//! for every request. The whole batch is written with a single write so
//! concurrent commits never interleave their lines.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use ironlog_core::config::SinkConfig;
use ironlog_syslog::sink::{BulkItemResponse, BulkRequest, BulkResponse, DocumentSink, SinkError};

enum Output {
    Stdout(Stdout),
    File { path: PathBuf, file: File },
}

impl Output {
    async fn write_batch(&mut self, body: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout(out) => {
                out.write_all(body).await?;
                out.flush().await
            }
            Self::File { file, .. } => {
                file.write_all(body).await?;
                file.flush().await
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Stdout(_) => "stdout".to_owned(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }
}

/// Document sink writing newline-delimited bulk requests to stdout or a file.
pub struct NdjsonSink {
    output: Mutex<Output>,
}

impl NdjsonSink {
    /// Sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self {
            output: Mutex::new(Output::Stdout(tokio::io::stdout())),
        }
    }

    /// Sink appending to `path`, creating the file if needed.
    pub async fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            output: Mutex::new(Output::File { path, file }),
        })
    }

    /// Build the sink described by the `[sink]` section.
    pub async fn from_config(config: &SinkConfig) -> Result<Self> {
        let sink = match config.kind.as_str() {
            "stdout" => Self::stdout(),
            "file" => Self::file(&config.path).await.map_err(|e| {
                anyhow::anyhow!("failed to open sink file {}: {}", config.path, e)
            })?,
            other => return Err(anyhow::anyhow!("unknown sink kind '{}'", other)),
        };
        tracing::info!(target_output = %sink.output.lock().await.describe(), "document sink ready");
        Ok(sink)
    }

    /// Render a batch as newline-delimited action/source pairs.
    pub fn render(request: &BulkRequest) -> String {
        let mut body = String::with_capacity(
            usize::try_from(request.estimated_size_bytes).unwrap_or(0) + request.len(),
        );
        for item in &request.requests {
            let action = json!({ "index": { "_index": item.index, "_type": item.doc_type } });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&item.source);
            body.push('\n');
        }
        body
    }
}

impl DocumentSink for NdjsonSink {
    async fn commit(&self, request: BulkRequest) -> Result<BulkResponse, SinkError> {
        let started = Instant::now();
        let body = Self::render(&request);

        self.output.lock().await.write_batch(body.as_bytes()).await?;

        Ok(BulkResponse {
            items: request.requests.iter().map(BulkItemResponse::success).collect(),
            took: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironlog_syslog::sink::IndexRequest;

    fn bulk(id: u64, docs: &[&str]) -> BulkRequest {
        let requests: Vec<IndexRequest> = docs
            .iter()
            .map(|doc| IndexRequest::new("syslog-2024.01.02", "syslog", *doc))
            .collect();
        let estimated_size_bytes = requests.iter().map(IndexRequest::estimated_size_bytes).sum();
        BulkRequest {
            execution_id: id,
            requests,
            estimated_size_bytes,
        }
    }

    #[test]
    fn render_pairs_action_and_source() {
        let body = NdjsonSink::render(&bulk(1, &[r#"{"message":"a"}"#, r#"{"message":"b"}"#]));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            r#"{"index":{"_index":"syslog-2024.01.02","_type":"syslog"}}"#
        );
        assert_eq!(lines[1], r#"{"message":"a"}"#);
        assert_eq!(lines[3], r#"{"message":"b"}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn render_escapes_index_names() {
        let mut request = bulk(1, &["{}"]);
        request.requests[0].index = "we\"ird".to_owned();
        let body = NdjsonSink::render(&request);
        let action: serde_json::Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert_eq!(action["index"]["_index"], "we\"ird");
    }

    #[tokio::test]
    async fn file_sink_appends_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulk.ndjson");
        let sink = NdjsonSink::file(&path).await.unwrap();

        let response = sink.commit(bulk(1, &[r#"{"n":1}"#])).await.unwrap();
        assert!(!response.has_failures());
        assert_eq!(response.items.len(), 1);
        sink.commit(bulk(2, &[r#"{"n":2}"#, r#"{"n":3}"#])).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 6);
        assert_eq!(content.lines().nth(5), Some(r#"{"n":3}"#));

        // reopening appends after the existing content
        drop(sink);
        let sink = NdjsonSink::file(&path).await.unwrap();
        sink.commit(bulk(3, &[r#"{"n":4}"#])).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 8);
    }

    #[tokio::test]
    async fn from_config_selects_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            kind: "file".to_owned(),
            path: dir.path().join("out.ndjson").display().to_string(),
        };
        assert!(NdjsonSink::from_config(&config).await.is_ok());

        let config = SinkConfig {
            kind: "kafka".to_owned(),
            path: String::new(),
        };
        assert!(NdjsonSink::from_config(&config).await.is_err());

        let config = SinkConfig {
            kind: "file".to_owned(),
            path: dir.path().join("missing").join("out.ndjson").display().to_string(),
        };
        assert!(NdjsonSink::from_config(&config).await.is_err());
    }
}
