//! 重试预算：按失败类别计数，达到上限即放弃
//!
//! 纯记账，无副作用；每次任务执行开始时清零，仅在对应类别的可恢复失败时递增。

use serde::Serialize;

use crate::config::ManipConfig;

/// 单个失败类别的尝试计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptCounter {
    pub attempted: u32,
    pub allowed: u32,
}

impl AttemptCounter {
    pub fn new(allowed: u32) -> Self {
        Self {
            attempted: 0,
            allowed,
        }
    }

    /// attempted ≥ allowed 时应放弃
    pub fn should_abort(&self) -> bool {
        self.attempted >= self.allowed
    }

    /// 记一次失败，返回新计数（不超过 allowed）
    #[must_use]
    pub fn increment(self) -> Self {
        Self {
            attempted: self.attempted.saturating_add(1).min(self.allowed),
            allowed: self.allowed,
        }
    }

    /// 清零已尝试次数，上限保持不变
    #[must_use]
    pub fn cleared(self) -> Self {
        Self::new(self.allowed)
    }
}

/// 一次任务执行拥有的两份独立预算（对准、抓取），互不共享
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptBudgets {
    pub alignment: AttemptCounter,
    pub pick: AttemptCounter,
}

impl AttemptBudgets {
    pub fn from_config(cfg: &ManipConfig) -> Self {
        Self {
            alignment: AttemptCounter::new(cfg.max_alignment_attempts),
            pick: AttemptCounter::new(cfg.max_pick_attempts),
        }
    }

    #[must_use]
    pub fn cleared(self) -> Self {
        Self {
            alignment: self.alignment.cleared(),
            pick: self.pick.cleared(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_counter_does_not_abort() {
        let c = AttemptCounter::new(3);
        assert_eq!(c.attempted, 0);
        assert!(!c.should_abort());
    }

    #[test]
    fn test_abort_after_ceiling_reached() {
        let mut c = AttemptCounter::new(3);
        for expected in 1..=3 {
            assert!(!c.should_abort());
            c = c.increment();
            assert_eq!(c.attempted, expected);
        }
        assert!(c.should_abort());
    }

    #[test]
    fn test_increment_never_exceeds_ceiling() {
        let c = AttemptCounter::new(1).increment().increment().increment();
        assert_eq!(c.attempted, 1);
        assert!(c.should_abort());
    }

    #[test]
    fn test_budgets_are_independent() {
        let budgets = AttemptBudgets {
            alignment: AttemptCounter::new(2),
            pick: AttemptCounter::new(5),
        };
        let bumped = AttemptBudgets {
            alignment: budgets.alignment.increment(),
            ..budgets
        };
        assert_eq!(bumped.alignment.attempted, 1);
        assert_eq!(bumped.pick.attempted, 0);

        let cleared = bumped.cleared();
        assert_eq!(cleared, budgets);
    }
}
