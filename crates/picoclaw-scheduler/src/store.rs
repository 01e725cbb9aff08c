use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Result;
use crate::types::Job;

/// A JSON-backed job list under the orchestrator workspace (spec.md §3
/// "Scheduled job"). Atomic write (temp file + rename), same convention
/// as `picoclaw-rfc`'s cache files.
pub struct JobStore {
    path: PathBuf,
    jobs: RwLock<Vec<Job>>,
}

impl JobStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, jobs: RwLock::new(jobs) })
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.read().unwrap().clone()
    }

    pub fn add(&self, job: Job) -> Result<()> {
        self.jobs.write().unwrap().push(job);
        self.persist()
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() != before;
        drop(jobs);
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Record `last_run` for `id` and persist, so a restart never re-fires
    /// the same scheduled instant (spec.md §3 invariant).
    pub fn mark_run(&self, id: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        {
            let mut jobs = self.jobs.write().unwrap();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.last_run = Some(at);
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let jobs = self.jobs.read().unwrap();
        let text = serde_json::to_string_pretty(&*jobs)?;
        write_atomic(&self.path, &text)
    }
}

fn write_atomic(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use picoclaw_core::types::ChannelOrigin;

    #[test]
    fn add_then_reopen_persists_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        {
            let store = JobStore::open(&path).unwrap();
            store
                .add(Job::new_cron("nightly", "0 3 * * *", "do the thing", ChannelOrigin::internal()))
                .unwrap();
        }

        let store = JobStore::open(&path).unwrap();
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn mark_run_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JobStore::open(&path).unwrap();
        let job = Job::new_cron("nightly", "0 3 * * *", "do the thing", ChannelOrigin::internal());
        let id = job.id.clone();
        store.add(job).unwrap();
        store.mark_run(&id, chrono::Utc::now()).unwrap();

        let reopened = JobStore::open(&path).unwrap();
        let jobs = reopened.list();
        assert!(jobs[0].last_run.is_some());
    }

    #[test]
    fn remove_missing_job_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path().join("jobs.json")).unwrap();
        assert!(!store.remove("nonexistent").unwrap());
    }
}
