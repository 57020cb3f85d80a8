//! JSONL export tap for materialized rows
//!
//! Optional side channel: every unit that inserts or updates a row also
//! appends the row it produced as one JSON line. Downstream training jobs
//! can consume the file without touching the SQLite store. Append-only,
//! so re-runs append duplicates; the store stays the source of truth.

use crate::records::MaterializedFeatureRecord;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serialization(err)
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "IO error: {}", e),
            ExportError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

pub struct JsonlExporter {
    writer: BufWriter<std::fs::File>,
    path: PathBuf,
    last_flush: Instant,
}

impl JsonlExporter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("📝 Exporting materialized rows to: {}", path.display());

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_flush: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &MaterializedFeatureRecord) -> Result<(), ExportError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;

        // Flush every 5 seconds
        if self.last_flush.elapsed() > Duration::from_secs(5) {
            self.flush()?;
            self.last_flush = Instant::now();
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlExporter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
