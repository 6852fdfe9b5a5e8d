//! In-memory [`BatchApi`] used by the pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use gembatch_shared::{
    BatchApi, BatchDestination, BatchJob, GembatchError, InlinedResponse, JobState, Result,
    SubmissionPayload, UploadedFile,
};

pub(crate) const FAKE_JOB: &str = "batches/fake-1";
pub(crate) const FAKE_UPLOAD: &str = "files/fake-upload";

/// Scripted provider: `get_job` walks through `progression`, repeating the
/// last snapshot once the script runs out.
#[derive(Default)]
pub(crate) struct FakeBatchApi {
    progression: Mutex<VecDeque<BatchJob>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    create_error: Option<String>,
    pub get_calls: AtomicUsize,
    pub created: Mutex<Vec<SubmissionPayload>>,
    pub uploads: Mutex<Vec<PathBuf>>,
    pub cancelled: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeBatchApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progression(self, jobs: Vec<BatchJob>) -> Self {
        *self.progression.lock().unwrap() = jobs.into();
        self
    }

    /// `running` RUNNING snapshots followed by `last`.
    pub fn running_then(self, running: usize, last: BatchJob) -> Self {
        let mut jobs: Vec<BatchJob> = (0..running).map(|_| job(JobState::Running)).collect();
        jobs.push(last);
        self.with_progression(jobs)
    }

    pub fn with_file(self, name: &str, bytes: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn job(state: JobState) -> BatchJob {
    BatchJob::new(FAKE_JOB, state)
}

pub(crate) fn succeeded_inline(entries: Vec<InlinedResponse>) -> BatchJob {
    let mut job = job(JobState::Succeeded);
    job.dest = Some(BatchDestination::Inline(entries));
    job
}

pub(crate) fn succeeded_file(file: &str) -> BatchJob {
    let mut job = job(JobState::Succeeded);
    job.dest = Some(BatchDestination::File(file.to_string()));
    job
}

#[async_trait]
impl BatchApi for FakeBatchApi {
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: Option<&str>,
    ) -> Result<UploadedFile> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        Ok(UploadedFile {
            name: FAKE_UPLOAD.to_string(),
            uri: None,
            mime_type: Some(mime_type.to_string()),
            display_name: display_name.map(str::to_string),
            size_bytes: None,
        })
    }

    async fn create_job(&self, payload: &SubmissionPayload) -> Result<BatchJob> {
        if let Some(message) = &self.create_error {
            return Err(GembatchError::remote("create_job", message.clone()));
        }
        self.created.lock().unwrap().push(payload.clone());
        Ok(job(JobState::Pending))
    }

    async fn get_job(&self, name: &str) -> Result<BatchJob> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut progression = self.progression.lock().unwrap();
        let next = if progression.len() > 1 {
            progression.pop_front()
        } else {
            progression.front().cloned()
        };
        next.ok_or_else(|| GembatchError::remote("get_job", format!("{name} not found")))
    }

    async fn cancel_job(&self, name: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn download_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GembatchError::remote("download_file", format!("{name} not found")))
    }
}

pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
