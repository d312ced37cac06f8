//! 运行态任务存储
//!
//! 调度器的共享可变状态只有这一份注册表，注册/暂停/恢复/移除与
//! 调度循环的到期扫描全部串行在同一把锁上。运行态任务由任务定义
//! 在注册时派生，从不落库。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use sysjob_domain::{InvokeTarget, JobKey, SchedulerError, SchedulerResult, TargetValue};

use crate::cron_utils::CronTrigger;
use crate::handlers::JobHandler;
use crate::policies::MisfireBehavior;

/// 运行态任务
pub struct LiveJob {
    pub key: JobKey,
    pub job_name: String,
    pub target: InvokeTarget,
    pub handler: Arc<dyn JobHandler>,
    pub trigger: CronTrigger,
    pub misfire: MisfireBehavior,
    pub max_instances: usize,
    pub paused: bool,
    pub next_fire_time: Option<DateTime<Utc>>,
    /// 正在运行的实例数，执行任务的工作协程持有同一份计数
    pub running: Arc<AtomicUsize>,
}

impl LiveJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: JobKey,
        job_name: String,
        target: InvokeTarget,
        handler: Arc<dyn JobHandler>,
        trigger: CronTrigger,
        misfire: MisfireBehavior,
        max_instances: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let next_fire_time = trigger.next_fire_time(now);
        Self {
            key,
            job_name,
            target,
            handler,
            trigger,
            misfire,
            max_instances,
            paused: false,
            next_fire_time,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// 一次到期扫描产出的触发决定
pub struct FireDecision {
    pub key: JobKey,
    pub job_name: String,
    pub invoke_target: String,
    pub args: Vec<TargetValue>,
    pub kwargs: Vec<(String, TargetValue)>,
    pub handler: Arc<dyn JobHandler>,
    pub scheduled_time: DateTime<Utc>,
    /// 迟到超过宽限期，本次触发应被放弃
    pub missed: bool,
    pub max_instances: usize,
    pub running: Arc<AtomicUsize>,
}

/// 运行态任务状态快照，用于服务层与测试观察
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveJobState {
    pub paused: bool,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub running_instances: usize,
    pub max_instances: usize,
}

/// 运行态任务注册表
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobKey, LiveJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册任务
    ///
    /// `replace_existing` 为 false 且键已存在时返回 `JobConflict`。
    pub async fn insert(&self, job: LiveJob, replace_existing: bool) -> SchedulerResult<()> {
        let mut jobs = self.jobs.lock().await;
        if !replace_existing && jobs.contains_key(&job.key) {
            return Err(SchedulerError::JobConflict {
                key: job.key.to_string(),
            });
        }
        jobs.insert(job.key.clone(), job);
        Ok(())
    }

    /// 暂停任务，幂等；任务缺失时返回 false
    pub async fn pause(&self, key: &JobKey) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(key) {
            Some(job) => {
                job.paused = true;
                true
            }
            None => false,
        }
    }

    /// 恢复任务，重新从当前时间计算下次触发
    ///
    /// 任务缺失时返回 false，由调用方决定是否整体重建。
    pub async fn resume(&self, key: &JobKey) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(key) {
            Some(job) => {
                job.paused = false;
                job.next_fire_time = job.trigger.next_fire_time(Utc::now());
                true
            }
            None => false,
        }
    }

    /// 立即触发
    ///
    /// 取消暂停并把下次触发时间拨到当前时刻；给了新触发器就先替换，
    /// 本次执行之后按触发器正常推进，持久化的计划不受影响。
    pub async fn nudge(&self, key: &JobKey, new_trigger: Option<CronTrigger>) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(key) {
            Some(job) => {
                if let Some(trigger) = new_trigger {
                    job.trigger = trigger;
                }
                job.paused = false;
                job.next_fire_time = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// 移除任务，返回被移除的运行态任务
    pub async fn remove(&self, key: &JobKey) -> Option<LiveJob> {
        self.jobs.lock().await.remove(key)
    }

    pub async fn contains(&self, key: &JobKey) -> bool {
        self.jobs.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.jobs.lock().await.clear();
    }

    pub async fn job_keys(&self) -> Vec<JobKey> {
        self.jobs.lock().await.keys().cloned().collect()
    }

    /// 任务状态快照
    pub async fn state(&self, key: &JobKey) -> Option<LiveJobState> {
        let jobs = self.jobs.lock().await;
        jobs.get(key).map(|job| LiveJobState {
            paused: job.paused,
            next_fire_time: job.next_fire_time,
            running_instances: job.running.load(Ordering::SeqCst),
            max_instances: job.max_instances,
        })
    }

    /// 扫描到期任务并产出触发决定
    ///
    /// 在同一把锁内完成：积压的触发时间合并为最近一次（coalesce），
    /// 迟到超过宽限期的标记为 missed，`next_fire_time` 严格推进到
    /// `now` 之后。按计划触发时间排序返回；不同任务之间没有更强的
    /// 顺序保证。
    pub async fn collect_due(&self, now: DateTime<Utc>) -> Vec<FireDecision> {
        let mut jobs = self.jobs.lock().await;
        let mut decisions = Vec::new();

        for job in jobs.values_mut() {
            if job.paused {
                continue;
            }
            let Some(next_fire) = job.next_fire_time else {
                continue;
            };
            if next_fire > now {
                continue;
            }

            // 合并积压：只保留最近一次应触发的时间
            let backlog = job.trigger.fires_between(next_fire, now);
            let effective = backlog.last().copied().unwrap_or(next_fire);
            if backlog.len() > 1 {
                debug!(
                    "任务 {} 合并了 {} 次积压触发",
                    job.key,
                    backlog.len() - 1
                );
            }
            job.next_fire_time = job.trigger.next_fire_time(now);

            let lateness = now - effective;
            let missed = job
                .misfire
                .grace_period
                .is_some_and(|grace| lateness > grace);

            decisions.push(FireDecision {
                key: job.key.clone(),
                job_name: job.job_name.clone(),
                invoke_target: job.target.to_string(),
                args: job.target.args.clone(),
                kwargs: job.target.kwargs.clone(),
                handler: Arc::clone(&job.handler),
                scheduled_time: effective,
                missed,
                max_instances: job.max_instances,
                running: Arc::clone(&job.running),
            });
        }

        decisions.sort_by_key(|d| d.scheduled_time);
        decisions
    }

    /// 测试辅助：直接改写下次触发时间
    #[cfg(test)]
    pub async fn set_next_fire_time(&self, key: &JobKey, at: Option<DateTime<Utc>>) {
        if let Some(job) = self.jobs.lock().await.get_mut(key) {
            job.next_fire_time = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{resolve_misfire, MisfireBehavior};
    use crate::test_utils::handlers::NoopHandler;
    use chrono::Duration;
    use sysjob_domain::MisfirePolicy;

    fn live_job(id: i64, cron: &str, misfire: MisfireBehavior) -> LiveJob {
        let target = InvokeTarget::parse("tasks.demo.run").unwrap();
        LiveJob::new(
            JobKey::new(id, "DEFAULT"),
            format!("job-{id}"),
            target,
            Arc::new(NoopHandler::new("tasks.demo.run")),
            CronTrigger::parse(cron).unwrap(),
            misfire,
            1,
            Utc::now(),
        )
    }

    fn default_behavior() -> MisfireBehavior {
        resolve_misfire(MisfirePolicy::Default)
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        store
            .insert(live_job(1, "0 * * * * *", default_behavior()), true)
            .await
            .unwrap();
        let err = store
            .insert(live_job(1, "0 * * * * *", default_behavior()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::JobConflict { .. }));
        // 允许覆盖时注册成功
        store
            .insert(live_job(1, "0 * * * * *", default_behavior()), true)
            .await
            .unwrap();
        assert!(store.contains(&key).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        store
            .insert(live_job(1, "0 * * * * *", default_behavior()), true)
            .await
            .unwrap();

        assert!(store.pause(&key).await);
        assert!(store.pause(&key).await);
        let state = store.state(&key).await.unwrap();
        assert!(state.paused);
    }

    #[tokio::test]
    async fn test_resume_missing_returns_false() {
        let store = JobStore::new();
        assert!(!store.resume(&JobKey::new(42, "DEFAULT")).await);
        assert!(!store.pause(&JobKey::new(42, "DEFAULT")).await);
        assert!(!store.nudge(&JobKey::new(42, "DEFAULT"), None).await);
    }

    #[tokio::test]
    async fn test_nudge_fires_now_and_unpauses() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        // 一个几乎不会自然触发的计划
        store
            .insert(live_job(1, "0 0 3 1 1 *", default_behavior()), true)
            .await
            .unwrap();
        store.pause(&key).await;

        assert!(store.nudge(&key, None).await);
        let state = store.state(&key).await.unwrap();
        assert!(!state.paused);
        assert!(state.next_fire_time.unwrap() <= Utc::now());

        let decisions = store.collect_due(Utc::now()).await;
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].missed);
    }

    #[tokio::test]
    async fn test_collect_due_skips_paused() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        store
            .insert(live_job(1, "* * * * * *", default_behavior()), true)
            .await
            .unwrap();
        store.pause(&key).await;
        store
            .set_next_fire_time(&key, Some(Utc::now() - Duration::seconds(5)))
            .await;

        assert!(store.collect_due(Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_collect_due_coalesces_backlog() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        store
            .insert(live_job(1, "* * * * * *", default_behavior()), true)
            .await
            .unwrap();
        let now = Utc::now();
        store
            .set_next_fire_time(&key, Some(now - Duration::seconds(10)))
            .await;

        let decisions = store.collect_due(now).await;
        // 10 秒积压只产出一次触发
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].missed);

        let state = store.state(&key).await.unwrap();
        assert!(state.next_fire_time.unwrap() > now);
    }

    #[tokio::test]
    async fn test_collect_due_marks_missed_beyond_grace() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        let behavior = resolve_misfire(MisfirePolicy::FireAndProceed);
        // 年度计划：没有积压可以合并，迟到时长就是与计划时间的差
        store
            .insert(live_job(1, "0 0 3 1 1 *", behavior), true)
            .await
            .unwrap();
        let now = Utc::now();
        store
            .set_next_fire_time(&key, Some(now - Duration::minutes(10)))
            .await;

        let decisions = store.collect_due(now).await;
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].missed);
    }

    #[tokio::test]
    async fn test_collect_due_without_grace_never_misses() {
        let store = JobStore::new();
        let key = JobKey::new(1, "DEFAULT");
        store
            .insert(live_job(1, "0 0 3 1 1 *", default_behavior()), true)
            .await
            .unwrap();
        let now = Utc::now();
        store
            .set_next_fire_time(&key, Some(now - Duration::days(2)))
            .await;

        let decisions = store.collect_due(now).await;
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].missed);
    }
}
