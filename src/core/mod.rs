//! 核心编排层：重试预算、状态与上下文、感知汇合、几何推导、错误与恢复、状态迁移、主控循环、优雅关闭

pub mod budget;
pub mod builder;
pub mod error;
pub mod geometry;
pub mod join;
pub mod orchestrator;
pub mod recovery;
pub mod shutdown;
pub mod state;
pub mod transition;

pub use budget::{AttemptBudgets, AttemptCounter};
pub use builder::RuntimeBuilder;
pub use error::{Failure, ManipError, PickFailure, RecoveryAction};
pub use geometry::PlacementTarget;
pub use join::{EstimateJoin, FailureReason, JoinError, PartialFailure, Side};
pub use orchestrator::{FeedbackSender, Orchestrator};
pub use recovery::RecoveryEngine;
pub use shutdown::{run_with_graceful_shutdown, ShutdownManager, ShutdownReason};
pub use state::{ExecutionContext, TaskFeedback, TaskGoal, TaskResult, TaskState};
pub use transition::{transition, Effect, Event, Transition};
