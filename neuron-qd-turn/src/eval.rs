//! Eval records and the abstract sink they're appended to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One completed turn's outcome, in the on-disk eval-record schema (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    /// When the turn completed.
    pub ts: DateTime<Utc>,
    /// The task this turn belongs to.
    pub task_id: String,
    /// The module that served the turn.
    pub module_id: String,
    /// The sub-agent profile in force, if any.
    pub profile: Option<String>,
    /// The task type/mode the turn ran under.
    pub task_type: String,
    /// Names of tools dispatched during the turn.
    pub tools_used: Vec<String>,
    /// Whether the turn completed successfully.
    pub ok: bool,
    /// The composite score (§4.E).
    pub score: f64,
    /// Wall-clock time for the turn.
    pub elapsed_ms: u64,
    /// Total cost across every sender call the turn made.
    pub cost: Decimal,
}

/// Errors appending to an [`EvalSink`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvalSinkError {
    /// The underlying sink I/O failed.
    #[error("eval sink write failed: {0}")]
    Io(String),
}

/// The abstract append-only destination for eval records. The orchestration
/// loop depends only on this trait; callers choose the concrete format
/// (JSON lines, a database table, an in-memory buffer for tests).
#[async_trait]
pub trait EvalSink: Send + Sync {
    /// Append one eval record.
    async fn record(&self, record: &EvalRecord) -> Result<(), EvalSinkError>;
}

/// The default, non-mandatory [`EvalSink`]: one JSON object per line,
/// append-only, never rewritten.
pub struct JsonLinesEvalSink<W> {
    writer: Mutex<W>,
}

impl<W: tokio::io::AsyncWrite + Unpin + Send> JsonLinesEvalSink<W> {
    /// Wrap an async writer as a JSON-lines eval sink.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W: tokio::io::AsyncWrite + Unpin + Send> EvalSink for JsonLinesEvalSink<W> {
    async fn record(&self, record: &EvalRecord) -> Result<(), EvalSinkError> {
        let mut line = serde_json::to_string(record).map_err(|e| EvalSinkError::Io(e.to_string()))?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EvalSinkError::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| EvalSinkError::Io(e.to_string()))
    }
}

/// An in-memory eval sink, useful for tests that want to assert on what was
/// recorded without touching the filesystem.
#[derive(Default)]
pub struct MemoryEvalSink {
    records: Mutex<Vec<EvalRecord>>,
}

impl MemoryEvalSink {
    /// Construct an empty in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every record appended so far.
    pub async fn records(&self) -> Vec<EvalRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl EvalSink for MemoryEvalSink {
    async fn record(&self, record: &EvalRecord) -> Result<(), EvalSinkError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(score: f64) -> EvalRecord {
        EvalRecord {
            ts: Utc::now(),
            task_id: "t1".into(),
            module_id: "Predict/summarize".into(),
            profile: None,
            task_type: "ask".into(),
            tools_used: vec![],
            ok: true,
            score,
            elapsed_ms: 10,
            cost: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn memory_sink_accumulates_in_order() {
        let sink = MemoryEvalSink::new();
        sink.record(&sample(1.0)).await.unwrap();
        sink.record(&sample(2.0)).await.unwrap();
        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, 1.0);
        assert_eq!(records[1].score, 2.0);
    }

    #[tokio::test]
    async fn json_lines_sink_writes_newline_delimited_records() {
        let buf: Vec<u8> = Vec::new();
        let sink = JsonLinesEvalSink::new(buf);
        sink.record(&sample(3.0)).await.unwrap();
        sink.record(&sample(4.0)).await.unwrap();
        let inner = sink.writer.into_inner();
        let text = String::from_utf8(inner).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: EvalRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.score, 3.0);
    }
}
