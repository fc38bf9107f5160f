//! JSON Lines export sink
//!
//! Writes one JSON object per line into `edges.jsonl`, `profiles.jsonl` and
//! `posts.jsonl` under the export directory.

use crate::api::EntityId;
use crate::output::traits::{ExportRecord, ExportSink, OutputError, OutputResult};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Export sink appending to per-stream `.jsonl` files
pub struct JsonlSink {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Creates the sink, creating `directory` if needed
    ///
    /// # Arguments
    ///
    /// * `directory` - Directory holding the export files
    ///
    /// # Returns
    ///
    /// * `Ok(JsonlSink)` - Directory exists and is ready
    /// * `Err(OutputError)` - Directory could not be created
    pub fn new(directory: &Path) -> OutputResult<Self> {
        fs::create_dir_all(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the file backing `stream`
    pub fn stream_path(&self, stream: &str) -> PathBuf {
        self.directory.join(format!("{}.jsonl", stream))
    }
}

impl ExportSink for JsonlSink {
    fn append(&self, entity: EntityId, records: &[ExportRecord]) -> OutputResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Serialize everything before touching the files
        let mut buffers: BTreeMap<&'static str, String> = BTreeMap::new();
        for record in records {
            let buffer = buffers.entry(record.stream()).or_default();
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| OutputError::Write("export lock poisoned".to_string()))?;

        for (stream, buffer) in &buffers {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.stream_path(stream))?;
            file.write_all(buffer.as_bytes())?;
        }

        tracing::debug!("Exported {} records for {}", records.len(), entity);
        Ok(())
    }
}
