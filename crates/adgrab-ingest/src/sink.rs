//! Output sinks for ingested records.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::error::IngestError;
use crate::types::IngestResult;

/// Receives each record's result in the order records were fetched.
pub trait IngestSink: Send + Sync {
    /// # Errors
    ///
    /// A sink error is fatal to the run: losing output defeats the point.
    fn emit(&self, result: &IngestResult) -> Result<(), IngestError>;

    /// Flushes buffered output. Called once after the last emit.
    ///
    /// # Errors
    ///
    /// See [`IngestSink::emit`].
    fn finish(&self) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Writes one JSON object per line. The buffered writer keeps per-record
/// syscall overhead down; `finish` flushes it.
pub struct JsonlSink {
    writer: Mutex<std::io::BufWriter<std::fs::File>>,
}

impl JsonlSink {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Sink`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(IngestError::Sink)?;
        }
        let file = std::fs::File::create(path).map_err(IngestError::Sink)?;
        Ok(Self {
            writer: Mutex::new(std::io::BufWriter::new(file)),
        })
    }

    /// Opens the output file for appending, creating it if absent. A
    /// resumed run uses this so the records ingested before the
    /// interruption are kept.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Sink`] if the file cannot be opened.
    pub fn append(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(IngestError::Sink)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(IngestError::Sink)?;
        Ok(Self {
            writer: Mutex::new(std::io::BufWriter::new(file)),
        })
    }
}

impl IngestSink for JsonlSink {
    fn emit(&self, result: &IngestResult) -> Result<(), IngestError> {
        let line = serde_json::to_string(result)
            .map_err(|e| IngestError::Sink(std::io::Error::other(e)))?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writer.write_all(line.as_bytes()).map_err(IngestError::Sink)?;
        writer.write_all(b"\n").map_err(IngestError::Sink)
    }

    fn finish(&self) -> Result<(), IngestError> {
        self.writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .flush()
            .map_err(IngestError::Sink)
    }
}

/// In-memory sink for tests and the record-count dry path.
#[derive(Debug, Default)]
pub struct VecSink {
    results: Mutex<Vec<IngestResult>>,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> Vec<IngestResult> {
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl IngestSink for VecSink {
    fn emit(&self, result: &IngestResult) -> Result<(), IngestError> {
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgrab_client::AdRecord;

    fn result_for(id: &str) -> IngestResult {
        IngestResult::new(
            AdRecord {
                id: id.to_owned(),
                payload: serde_json::json!({ "id": id }),
            },
            Vec::new(),
        )
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("ads.jsonl");
        let sink = JsonlSink::create(&path).unwrap();

        sink.emit(&result_for("1")).unwrap();
        sink.emit(&result_for("2")).unwrap();
        sink.finish().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["record"]["id"], "1");
    }

    #[test]
    fn append_keeps_records_from_an_earlier_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ads.jsonl");

        let sink = JsonlSink::create(&path).unwrap();
        for id in ["1", "2", "3"] {
            sink.emit(&result_for(id)).unwrap();
        }
        sink.finish().unwrap();
        drop(sink);

        let sink = JsonlSink::append(&path).unwrap();
        for id in ["4", "5", "6"] {
            sink.emit(&result_for(id)).unwrap();
        }
        sink.finish().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = raw
            .lines()
            .map(|line| {
                serde_json::from_str::<serde_json::Value>(line).unwrap()["record"]["id"]
                    .as_str()
                    .unwrap()
                    .to_owned()
            })
            .collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5", "6"]);
    }

    #[test]
    fn vec_sink_preserves_emit_order() {
        let sink = VecSink::new();
        sink.emit(&result_for("a")).unwrap();
        sink.emit(&result_for("b")).unwrap();
        let results = sink.results();
        assert_eq!(results[0].record.id, "a");
        assert_eq!(results[1].record.id, "b");
    }
}
