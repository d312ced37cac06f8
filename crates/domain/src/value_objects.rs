use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 运行态任务的复合标识
///
/// 事件与运行态存储始终携带结构化的 `(job_id, job_group)`，
/// `Display` 输出的 `"{job_id}_{job_group}"` 仅用于日志展示，
/// 任何组件都不允许把它重新拆分回来。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub job_id: i64,
    pub job_group: String,
}

impl JobKey {
    pub fn new(job_id: i64, job_group: impl Into<String>) -> Self {
        Self {
            job_id,
            job_group: job_group.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.job_id, self.job_group)
    }
}

/// 调用目标参数值
///
/// 字符串与数值在解析/反解析之间保持可区分：字符串总是带引号输出。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TargetValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetValue::Str(s) => write!(f, "'{s}'"),
            TargetValue::Int(v) => write!(f, "{v}"),
            TargetValue::Float(v) => write!(f, "{v:?}"),
            TargetValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// 调用目标
///
/// 文法：`<module>(.<submodule>)*.<method>(\(<params>\))?`，
/// 参数为逗号分隔的裸值（位置参数）或 `key=value`（关键字参数），
/// 值可使用单引号或双引号。关键字参数之后不允许再出现位置参数。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvokeTarget {
    pub module_path: String,
    pub method: String,
    pub args: Vec<TargetValue>,
    pub kwargs: Vec<(String, TargetValue)>,
}

impl InvokeTarget {
    /// 解析调用目标字符串
    pub fn parse(raw: &str) -> SchedulerResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SchedulerError::invalid_target("调用目标为空"));
        }

        let (path_part, params_part) = match raw.find('(') {
            Some(open) => {
                if !raw.ends_with(')') {
                    return Err(SchedulerError::invalid_target(format!(
                        "缺少右括号: {raw}"
                    )));
                }
                (&raw[..open], Some(&raw[open + 1..raw.len() - 1]))
            }
            None => (raw, None),
        };

        let segments: Vec<&str> = path_part.split('.').collect();
        if segments.len() < 2 {
            return Err(SchedulerError::invalid_target(format!(
                "调用目标至少需要模块和方法两段: {raw}"
            )));
        }
        for segment in &segments {
            if !is_identifier(segment) {
                return Err(SchedulerError::invalid_target(format!(
                    "非法的路径段 '{segment}': {raw}"
                )));
            }
        }

        let method = segments[segments.len() - 1].to_string();
        let module_path = segments[..segments.len() - 1].join(".");

        let mut args = Vec::new();
        let mut kwargs: Vec<(String, TargetValue)> = Vec::new();

        if let Some(params) = params_part {
            for token in split_params(params)? {
                let token = token.trim();
                if token.is_empty() {
                    return Err(SchedulerError::invalid_target(format!(
                        "参数列表存在空项: {raw}"
                    )));
                }
                match split_kwarg(token) {
                    Some((key, value)) => {
                        if !is_identifier(key) {
                            return Err(SchedulerError::invalid_target(format!(
                                "非法的关键字参数名 '{key}': {raw}"
                            )));
                        }
                        kwargs.push((key.to_string(), parse_value(value.trim())?));
                    }
                    None => {
                        if !kwargs.is_empty() {
                            return Err(SchedulerError::invalid_target(format!(
                                "关键字参数之后不允许位置参数: {raw}"
                            )));
                        }
                        args.push(parse_value(token)?);
                    }
                }
            }
        }

        Ok(Self {
            module_path,
            method,
            args,
            kwargs,
        })
    }

    /// 注册表查找键
    pub fn handler_name(&self) -> String {
        format!("{}.{}", self.module_path, self.method)
    }

    /// 白名单前缀校验
    ///
    /// 模块路径必须等于某个允许前缀，或位于其点号分隔的子路径下。
    pub fn is_allowed(&self, prefixes: &[String]) -> bool {
        prefixes.iter().any(|prefix| {
            self.module_path == *prefix
                || self
                    .module_path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

impl fmt::Display for InvokeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module_path, self.method)?;
        if self.args.is_empty() && self.kwargs.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        let mut first = true;
        for value in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        for (key, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        write!(f, ")")
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// 按顶层逗号切分参数，引号内的逗号不算分隔符
fn split_params(params: &str) -> SchedulerResult<Vec<&str>> {
    let trimmed = params.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, c) in params.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ',' => {
                    tokens.push(&params[start..idx]);
                    start = idx + 1;
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return Err(SchedulerError::invalid_target(format!(
            "引号未闭合: {params}"
        )));
    }
    tokens.push(&params[start..]);
    Ok(tokens)
}

/// 在引号外查找 `=`，找到则拆成关键字参数
fn split_kwarg(token: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (idx, c) in token.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '=' => return Some((token[..idx].trim(), &token[idx + 1..])),
                _ => {}
            },
        }
    }
    None
}

fn parse_value(token: &str) -> SchedulerResult<TargetValue> {
    if let Some(first) = token.chars().next() {
        if first == '\'' || first == '"' {
            if token.len() >= 2 && token.ends_with(first) {
                let inner = &token[1..token.len() - 1];
                if inner.contains(first) {
                    return Err(SchedulerError::invalid_target(format!(
                        "字符串参数中不允许出现引号: {token}"
                    )));
                }
                return Ok(TargetValue::Str(inner.to_string()));
            }
            return Err(SchedulerError::invalid_target(format!(
                "引号未闭合: {token}"
            )));
        }
    }
    match token {
        "true" => return Ok(TargetValue::Bool(true)),
        "false" => return Ok(TargetValue::Bool(false)),
        _ => {}
    }
    if let Ok(v) = token.parse::<i64>() {
        return Ok(TargetValue::Int(v));
    }
    if let Ok(v) = token.parse::<f64>() {
        return Ok(TargetValue::Float(v));
    }
    // 裸标识符按字符串处理，其余一律拒绝
    if !is_identifier(token) {
        return Err(SchedulerError::invalid_target(format!(
            "非法的参数值: {token}"
        )));
    }
    Ok(TargetValue::Str(token.to_string()))
}
