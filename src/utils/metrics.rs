use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub start_time: DateTime<Utc>,
    pub questions_asked: u64,
    pub documents_processed: u64,
    pub total_chunks: u64,
    pub average_response_time: f64,
    pub response_times: Vec<f64>,
    pub errors: u64,
}

impl SessionMetrics {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            questions_asked: 0,
            documents_processed: 0,
            total_chunks: 0,
            average_response_time: 0.0,
            response_times: Vec::new(),
            errors: 0,
        }
    }
}

/// Session counters, rewritten to a JSON file after every update.
pub struct MetricsCollector {
    path: PathBuf,
    metrics: Mutex<SessionMetrics>,
}

impl MetricsCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Metrics directory {} unavailable: {}", parent.display(), e);
                }
            }
        }
        Self {
            path,
            metrics: Mutex::new(SessionMetrics::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records one answered (or failed) question. The running average
    /// covers every recorded sample, failures included.
    pub fn log_question(&self, question: &str, response_time: f64, success: bool) {
        let snapshot = {
            let mut metrics = self.metrics.lock();
            metrics.questions_asked += 1;
            metrics.response_times.push(response_time);
            if !success {
                metrics.errors += 1;
            }
            let total: f64 = metrics.response_times.iter().sum();
            metrics.average_response_time = total / metrics.response_times.len() as f64;
            metrics.clone()
        };
        debug!(
            "Question logged ({:.2}s, success={}): {}",
            response_time,
            success,
            question.chars().take(80).collect::<String>()
        );
        self.save(&snapshot);
    }

    pub fn log_document_processed(&self, filename: &str, chunk_count: usize) {
        let snapshot = {
            let mut metrics = self.metrics.lock();
            metrics.documents_processed += 1;
            metrics.total_chunks += chunk_count as u64;
            metrics.clone()
        };
        debug!("Document logged: {} ({} chunks)", filename, chunk_count);
        self.save(&snapshot);
    }

    pub fn snapshot(&self) -> SessionMetrics {
        self.metrics.lock().clone()
    }

    fn save(&self, metrics: &SessionMetrics) {
        let result = serde_json::to_string_pretty(metrics)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&self.path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Metrics save error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (tempfile::TempDir, MetricsCollector) {
        let dir = tempfile::tempdir().unwrap();
        let metrics = MetricsCollector::new(dir.path().join("logs").join("metrics.json"));
        (dir, metrics)
    }

    #[test]
    fn average_is_mean_of_all_samples() {
        let (_dir, metrics) = collector();
        metrics.log_question("a", 1.0, true);
        metrics.log_question("b", 2.0, true);
        metrics.log_question("c", 6.0, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_asked, 3);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.response_times, vec![1.0, 2.0, 6.0]);
        assert!((snapshot.average_response_time - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn documents_accumulate_chunks() {
        let (_dir, metrics) = collector();
        metrics.log_document_processed("a.pdf", 12);
        metrics.log_document_processed("b.pdf", 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.total_chunks, 15);
    }

    #[test]
    fn every_update_is_persisted() {
        let (_dir, metrics) = collector();
        metrics.log_question("what is this?", 0.5, true);

        let saved: SessionMetrics =
            serde_json::from_str(&fs::read_to_string(metrics.path()).unwrap()).unwrap();
        assert_eq!(saved, metrics.snapshot());

        metrics.log_document_processed("a.pdf", 4);
        let saved: SessionMetrics =
            serde_json::from_str(&fs::read_to_string(metrics.path()).unwrap()).unwrap();
        assert_eq!(saved.documents_processed, 1);
        assert_eq!(saved.questions_asked, 1);
    }

    #[test]
    fn counters_never_decrease() {
        let (_dir, metrics) = collector();
        let mut previous = metrics.snapshot();
        for i in 0..10 {
            if i % 3 == 0 {
                metrics.log_document_processed("doc.pdf", i);
            } else {
                metrics.log_question("q", i as f64 / 10.0, i % 2 == 0);
            }
            let current = metrics.snapshot();
            assert!(current.questions_asked >= previous.questions_asked);
            assert!(current.documents_processed >= previous.documents_processed);
            assert!(current.total_chunks >= previous.total_chunks);
            assert!(current.errors >= previous.errors);
            assert!(current.response_times.len() >= previous.response_times.len());
            previous = current;
        }
    }

    #[test]
    fn unwritable_metrics_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // the path is a directory, so every save fails
        let metrics = MetricsCollector::new(dir.path());
        metrics.log_question("q", 1.0, true);
        assert_eq!(metrics.snapshot().questions_asked, 1);
    }
}
