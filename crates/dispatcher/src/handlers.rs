//! 任务处理器与注册表
//!
//! 存储中的调用目标是一个字符串，天然是任意代码调用面。这里不做
//! 任何语言级的动态加载：宿主在启动时把允许被调度的能力注册进
//! [`HandlerRegistry`]，调用目标只能解析到已注册的处理器（封闭
//! 世界）。白名单前缀校验作为第二道闸门保留，两道校验都在任务
//! 创建/注册时执行，而不是等到触发时。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use sysjob_domain::{
    ApplicationContext, InvokeTarget, JobKey, SchedulerError, SchedulerResult, TargetValue,
};

/// 任务体使用的工作池类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// 普通任务池
    Default,
    /// 重型任务专用池
    Heavy,
}

/// 任务执行上下文
///
/// 携带任务标识、解析后的参数以及宿主注入的应用上下文。
#[derive(Clone)]
pub struct JobContext {
    pub key: JobKey,
    pub job_name: String,
    pub args: Vec<TargetValue>,
    pub kwargs: Vec<(String, TargetValue)>,
    pub app_context: Arc<dyn ApplicationContext>,
}

impl JobContext {
    /// 按名称取关键字参数
    pub fn kwarg(&self, key: &str) -> Option<&TargetValue> {
        self.kwargs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }
}

/// 任务处理器接口
///
/// 实现方声明自己服务的调用目标全路径（`module.method`），
/// 并在 `execute` 中完成任务体。返回的消息会出现在执行成功事件里。
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 执行任务体
    async fn execute(&self, ctx: JobContext) -> SchedulerResult<Option<String>>;

    /// 处理器名称，必须与调用目标的 `module.method` 全路径一致
    fn name(&self) -> &str;

    /// 任务体运行的工作池，重型任务应返回 Heavy
    fn pool(&self) -> PoolKind {
        PoolKind::Default
    }
}

/// 任务处理器注册表
///
/// 进程内唯一的调用目标解析入口。
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    allowed_prefixes: Vec<String>,
}

impl HandlerRegistry {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            allowed_prefixes,
        }
    }

    /// 注册处理器，同名注册会覆盖并告警
    pub async fn register(&self, handler: Arc<dyn JobHandler>) {
        let name = handler.name().to_string();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(name.clone(), handler).is_some() {
            warn!("任务处理器 {} 被重复注册，旧实现已被覆盖", name);
        } else {
            info!("注册任务处理器: {}", name);
        }
    }

    /// 解析调用目标
    ///
    /// 先过白名单，再查注册表；两步都失败即拒绝，调用方应在任务
    /// 创建时调用本方法，让非法目标尽早暴露。
    pub async fn resolve(&self, target: &InvokeTarget) -> SchedulerResult<Arc<dyn JobHandler>> {
        if !target.is_allowed(&self.allowed_prefixes) {
            return Err(SchedulerError::TargetNotAllowed(target.to_string()));
        }
        let handlers = self.handlers.read().await;
        handlers
            .get(&target.handler_name())
            .cloned()
            .ok_or_else(|| SchedulerError::TargetNotRegistered(target.to_string()))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.handlers.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    pub async fn handler_names(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }

    pub fn allowed_prefixes(&self) -> &[String] {
        &self.allowed_prefixes
    }
}
