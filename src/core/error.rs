//! 错误类型、失败分类与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 Failure 与当前预算决定 RecoverThenRetry / Retry / Proceed / Abort。

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::join::PartialFailure;
use crate::robot::RobotError;

/// 编排器 / 任务服务层面的错误
#[derive(Error, Debug)]
pub enum ManipError {
    #[error("Task cancelled")]
    Cancelled,

    #[error("Robot error: {0}")]
    Robot(#[from] RobotError),

    #[error("Unknown object id: {0}")]
    UnknownObject(i64),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task server closed")]
    ServerClosed,
}

/// 抓取失败的具体原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PickFailure {
    /// 抓取校验未通过
    NotHeld,
    /// 感知汇合部分失败（与抓取失败同样计入预算）
    Estimates { detail: PartialFailure },
}

/// 失败分类
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// 可恢复：对准失败
    Alignment,
    /// 可恢复：抓取失败
    Pick(PickFailure),
    /// 外部抢占：无视剩余预算立即终止
    Cancelled,
    /// 放置失败：无重试策略，照常进入 Complete
    Placement(String),
    /// 协作方故障：不可重试
    Fault(String),
}

/// 恢复引擎给出的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 先执行对准纠正动作，再重试
    RecoverThenRetry,
    /// 直接重试（从预抓取位姿重新开始）
    Retry,
    /// 忽略失败继续推进
    Proceed,
    /// 终止当前执行
    Abort,
}
