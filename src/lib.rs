//! Manip - 移动机械臂抓取 / 放置任务编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与校验
//! - **core**: 重试预算、状态机、感知汇合、恢复策略、主控循环、优雅关闭
//! - **observability**: 日志初始化
//! - **robot**: 协作方接口（对准 / 操作 / 感知 / 收臂）与仿真实现
//! - **server**: 任务服务（目标抢占、反馈与结果投递）

pub mod config;
pub mod core;
pub mod observability;
pub mod robot;
pub mod server;

pub use crate::core::{TaskFeedback, TaskGoal, TaskResult, TaskState};
pub use crate::server::{GoalHandle, TaskServer};
