//! 错误恢复引擎
//!
//! 按失败类别与对应预算返回 RecoveryAction；纯函数，预算的递增由调用方完成。

use crate::core::budget::AttemptBudgets;
use crate::core::{Failure, RecoveryAction};

/// 将失败映射为可执行动作（纠正后重试 / 重试 / 继续 / 终止）
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, failure: &Failure, budgets: &AttemptBudgets) -> RecoveryAction {
        match failure {
            Failure::Alignment if budgets.alignment.should_abort() => RecoveryAction::Abort,
            Failure::Alignment => RecoveryAction::RecoverThenRetry,
            Failure::Pick(_) if budgets.pick.should_abort() => RecoveryAction::Abort,
            Failure::Pick(_) => RecoveryAction::Retry,
            Failure::Placement(_) => RecoveryAction::Proceed,
            Failure::Cancelled | Failure::Fault(_) => RecoveryAction::Abort,
        }
    }
}
