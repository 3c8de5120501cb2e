//! Job record store: `{jobs_dir}/{job_id}.json`

use super::{file_error, state_file_name};
use crate::error::StoreError;
use crate::job::BatchJob;
use batchpipe_common::fs::{read_json_opt, write_json_atomic};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", state_file_name(job_id)))
    }

    /// Write the whole record atomically
    pub fn save(&self, job: &BatchJob) -> Result<(), StoreError> {
        let path = self.path_for(&job.job_id);
        write_json_atomic(&path, job).map_err(|e| file_error(&path, e))?;
        debug!(job_id = %job.job_id, status = %job.status, "Job record saved");
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<BatchJob>, StoreError> {
        let path = self.path_for(job_id);
        read_json_opt(&path).map_err(|e| file_error(&path, e))
    }

    pub fn load(&self, job_id: &str) -> Result<BatchJob, StoreError> {
        self.get(job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }

    /// Every readable record, oldest first
    ///
    /// Unreadable files are logged and skipped so one bad record does not
    /// hide the others.
    pub fn list(&self) -> Result<Vec<BatchJob>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(file_error(&self.dir, err.into())),
        };

        let mut jobs = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| file_error(&self.dir, e.into()))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_opt::<BatchJob>(&path) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {},
                Err(err) => warn!(path = %path.display(), error = %err, "Skipping unreadable job record"),
            }
        }

        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(jobs)
    }

    /// Jobs `check-outputs` still has work for: unfinished, or completed
    /// without downloaded results
    pub fn outstanding(&self) -> Result<Vec<BatchJob>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|job| !job.is_terminal() || job.awaiting_download())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    fn job(id: &str, created: i64) -> BatchJob {
        BatchJob::pending(
            id,
            "news",
            "gpt-4.1-nano-2025-04-14",
            3,
            "file-1",
            DateTime::from_timestamp(created, 0).unwrap(),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path().join("jobs"));
        let record = job("batch_1", 100);
        store.save(&record).unwrap();
        assert_eq!(store.load("batch_1").unwrap(), record);
        assert!(store.get("batch_2").unwrap().is_none());
        assert!(matches!(store.load("batch_2"), Err(StoreError::JobNotFound(_))));
    }

    #[test]
    fn test_list_filters() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());

        let mut done = job("batch_b", 200);
        done.transition(JobStatus::Completed);
        store.save(&done).unwrap();
        store.save(&job("batch_a", 100)).unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"[").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec!["batch_a", "batch_b"]);

        let mut collected = job("batch_c", 300);
        collected.transition(JobStatus::Completed);
        collected.downloaded_at = Some(DateTime::from_timestamp(400, 0).unwrap());
        store.save(&collected).unwrap();
        let mut failed = job("batch_d", 400);
        failed.transition(JobStatus::Failed);
        store.save(&failed).unwrap();

        let outstanding: Vec<_> = store.outstanding().unwrap().into_iter().map(|j| j.job_id).collect();
        assert_eq!(outstanding, vec!["batch_a", "batch_b"]);
    }

    #[test]
    fn test_save_overwrites_status() {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(dir.path());
        let mut record = job("batch_1", 100);
        store.save(&record).unwrap();
        record.transition(JobStatus::InProgress);
        store.save(&record).unwrap();
        assert_eq!(store.load("batch_1").unwrap().status, JobStatus::InProgress);
    }
}
