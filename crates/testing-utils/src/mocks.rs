//! Mock implementations for the repository and context ports
//!
//! In-memory implementations used across the workspace for unit and
//! integration testing, no database or external services required.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sysjob_domain::{
    ApplicationContext, ExecutionLogRepository, JobDefinition, JobExecutionLog, JobFilter,
    JobLogFilter, JobRepository, SchedulerError, SchedulerResult,
};

/// In-memory implementation of JobRepository for testing
#[derive(Clone)]
pub struct MemoryJobRepository {
    jobs: Arc<Mutex<HashMap<i64, JobDefinition>>>,
    next_id: Arc<Mutex<i64>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pre-populate the repository keeping the ids of the given jobs
    pub fn seed(&self, jobs: Vec<JobDefinition>) {
        let mut map = self.jobs.lock().unwrap();
        let mut max_id = *self.next_id.lock().unwrap() - 1;
        for job in jobs {
            max_id = max_id.max(job.job_id);
            map.insert(job.job_id, job);
        }
        *self.next_id.lock().unwrap() = max_id + 1;
    }

    /// Make every write operation fail with a database error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn find(&self, job_id: i64) -> Option<JobDefinition> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
        *self.next_id.lock().unwrap() = 1;
    }

    fn check_writable(&self) -> SchedulerResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SchedulerError::database_error(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn list_all(&self) -> SchedulerResult<Vec<JobDefinition>> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.job_id);
        Ok(jobs)
    }

    async fn list_matching(&self, filter: &JobFilter) -> SchedulerResult<Vec<JobDefinition>> {
        let jobs = self.jobs.lock().unwrap();
        let mut matched: Vec<_> = jobs
            .values()
            .filter(|job| {
                filter
                    .job_name
                    .as_ref()
                    .is_none_or(|name| job.job_name.contains(name))
                    && filter
                        .job_group
                        .as_ref()
                        .is_none_or(|group| &job.job_group == group)
                    && filter.status.is_none_or(|status| job.status == status)
            })
            .cloned()
            .collect();
        matched.sort_by_key(|j| j.job_id);
        Ok(matched)
    }

    async fn get_by_id(&self, job_id: i64) -> SchedulerResult<Option<JobDefinition>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn create(&self, job: &JobDefinition) -> SchedulerResult<JobDefinition> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap();
        let duplicate = jobs
            .values()
            .any(|j| j.job_name == job.job_name && j.job_group == job.job_group);
        if duplicate {
            return Err(SchedulerError::database_error(format!(
                "job ({}, {}) already exists",
                job.job_name, job.job_group
            )));
        }

        let mut next_id = self.next_id.lock().unwrap();
        let mut created = job.clone();
        created.job_id = *next_id;
        *next_id += 1;
        jobs.insert(created.job_id, created.clone());
        Ok(created)
    }

    async fn update(&self, job: &JobDefinition) -> SchedulerResult<u64> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&job.job_id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_by_id(&self, job_id: i64) -> SchedulerResult<u64> {
        self.check_writable()?;
        Ok(self.jobs.lock().unwrap().remove(&job_id).map_or(0, |_| 1))
    }

    async fn delete_by_ids(&self, job_ids: &[i64]) -> SchedulerResult<u64> {
        self.check_writable()?;
        let mut jobs = self.jobs.lock().unwrap();
        let mut removed = 0;
        for job_id in job_ids {
            if jobs.remove(job_id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// In-memory implementation of ExecutionLogRepository for testing
#[derive(Clone)]
pub struct MemoryExecutionLogRepository {
    logs: Arc<Mutex<Vec<JobExecutionLog>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MemoryExecutionLogRepository {
    pub fn new() -> Self {
        Self {
            logs: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

impl Default for MemoryExecutionLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionLogRepository for MemoryExecutionLogRepository {
    async fn insert(&self, log: &JobExecutionLog) -> SchedulerResult<JobExecutionLog> {
        let mut next_id = self.next_id.lock().unwrap();
        let mut created = log.clone();
        created.job_log_id = *next_id;
        *next_id += 1;
        self.logs.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn list_matching(&self, filter: &JobLogFilter) -> SchedulerResult<Vec<JobExecutionLog>> {
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                filter
                    .job_name
                    .as_ref()
                    .is_none_or(|name| log.job_name.contains(name))
                    && filter
                        .job_group
                        .as_ref()
                        .is_none_or(|group| &log.job_group == group)
                    && filter.status.is_none_or(|status| log.status == status)
            })
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, job_log_id: i64) -> SchedulerResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|log| log.job_log_id != job_log_id);
        Ok((before - logs.len()) as u64)
    }

    async fn delete_by_ids(&self, job_log_ids: &[i64]) -> SchedulerResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|log| !job_log_ids.contains(&log.job_log_id));
        Ok((before - logs.len()) as u64)
    }

    async fn clear_all(&self) -> SchedulerResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let removed = logs.len() as u64;
        logs.clear();
        Ok(removed)
    }
}

/// Fixed application context for tests
pub struct StaticApplicationContext {
    environment: String,
}

impl StaticApplicationContext {
    pub fn new(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
        }
    }
}

impl ApplicationContext for StaticApplicationContext {
    fn environment(&self) -> &str {
        &self.environment
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
