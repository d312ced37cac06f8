//! Test data builders
//!
//! Builder helpers that create test entities with sensible defaults and
//! easy per-field customization.

use sysjob_domain::{
    ConcurrencyPolicy, JobDefinition, JobStatus, MisfirePolicy,
};

/// Builder for creating test JobDefinition entities
pub struct JobDefinitionBuilder {
    job: JobDefinition,
}

impl JobDefinitionBuilder {
    pub fn new() -> Self {
        Self {
            job: JobDefinition::new("test_job", "DEFAULT", "tasks.demo.run", "0 0 2 * * *"),
        }
    }

    pub fn with_id(mut self, job_id: i64) -> Self {
        self.job.job_id = job_id;
        self
    }

    pub fn with_name(mut self, job_name: &str) -> Self {
        self.job.job_name = job_name.to_string();
        self
    }

    pub fn with_group(mut self, job_group: &str) -> Self {
        self.job.job_group = job_group.to_string();
        self
    }

    pub fn with_invoke_target(mut self, invoke_target: &str) -> Self {
        self.job.invoke_target = invoke_target.to_string();
        self
    }

    pub fn with_cron(mut self, cron_expression: &str) -> Self {
        self.job.cron_expression = cron_expression.to_string();
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_misfire_policy(mut self, misfire_policy: MisfirePolicy) -> Self {
        self.job.misfire_policy = misfire_policy;
        self
    }

    pub fn with_concurrent(mut self, concurrent: ConcurrencyPolicy) -> Self {
        self.job.concurrent = concurrent;
        self
    }

    pub fn with_remark(mut self, remark: &str) -> Self {
        self.job.remark = remark.to_string();
        self
    }

    pub fn build(self) -> JobDefinition {
        self.job
    }
}

impl Default for JobDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
