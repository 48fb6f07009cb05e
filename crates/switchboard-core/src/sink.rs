//! CSV persistence for task outcomes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use switchboard_orchestrator::{OUTCOME_COLUMNS, OrchestrationError, OutcomeSink, TaskOutcome};
use tracing::debug;

/// Appends one CSV row per outcome.
///
/// The file is truncated and the header written when the sink is created, so each
/// server run starts a fresh log.
#[derive(Debug)]
pub struct CsvOutcomeSink {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvOutcomeSink {
    /// Create (or truncate) `path` and write the header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the header cannot be written.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OrchestrationError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(OUTCOME_COLUMNS).map_err(csv_error)?;
        writer.flush()?;

        debug!(path = %path.display(), "Outcome log initialized");
        Ok(Self { path, writer: Mutex::new(writer) })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutcomeSink for CsvOutcomeSink {
    fn record(&self, outcome: &TaskOutcome) -> Result<(), OrchestrationError> {
        let mut writer = self.writer.lock().map_err(|e| OrchestrationError::Sink(e.to_string()))?;
        writer.write_record(outcome.to_row()).map_err(csv_error)?;
        // Rows must be on disk as soon as the task finishes.
        writer.flush()?;
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> OrchestrationError {
    OrchestrationError::Sink(format!("CSV write failed: {}", e))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchboard_abstraction::GenerateResponse;
    use switchboard_orchestrator::{ResourceSnapshot, Task};

    use super::*;

    fn read_rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
        reader.records().map(Result::unwrap).collect()
    }

    #[test]
    fn test_create_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = CsvOutcomeSink::create(&path).unwrap();

        let rows = read_rows(sink.path());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iter().collect::<Vec<_>>(), OUTCOME_COLUMNS.to_vec());
    }

    #[test]
    fn test_create_truncates_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        std::fs::write(&path, "stale,data\n1,2\n3,4\n").unwrap();

        CsvOutcomeSink::create(&path).unwrap();
        assert_eq!(read_rows(&path).len(), 1);
    }

    #[test]
    fn test_record_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sink = CsvOutcomeSink::create(&path).unwrap();

        // Commas and quotes in free-text fields must survive the round trip.
        let task = Task::try_new("summarize", "llama3", "a, \"quoted\" prompt").unwrap();
        let response = GenerateResponse {
            response: Some("done".to_string()),
            eval_count: Some(50),
            eval_duration: Some(1_000_000_000),
            ..Default::default()
        };
        let ok = TaskOutcome::succeeded(
            &task,
            Duration::from_millis(250),
            Duration::from_millis(900),
            &response,
            ResourceSnapshot::sanitized(10.0, 20.0, 0.5),
        );
        let failed = TaskOutcome::load_failed(&task, Duration::ZERO, ResourceSnapshot::default());
        sink.record(&ok).unwrap();
        sink.record(&failed).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][3], "a, \"quoted\" prompt");
        assert_eq!(&rows[1][5], "250000000");
        assert_eq!(&rows[1][6], "done");
        assert_eq!(&rows[1][7], "Success");
        assert_eq!(&rows[1][15], "50");
        assert_eq!(&rows[2][4], "0");
        assert_eq!(&rows[2][6], "N/A");
        assert_eq!(&rows[2][7], "Model Load Failed");
        assert_eq!(&rows[2][8], "Failed");
        assert!(rows.iter().all(|r| r.len() == OUTCOME_COLUMNS.len()));
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = CsvOutcomeSink::create(dir.path().join("missing").join("metrics.csv"));
        assert!(matches!(result, Err(OrchestrationError::Io(_))));
    }
}
