//! 状态定义：任务目标 / 状态 / 反馈 / 结果，以及单次执行的上下文
//!
//! ExecutionContext 由编排器独占；每次执行开始与结束都经过 `reset()`，
//! 保证计数器与感知结果不会泄漏到下一次执行。

use serde::{Deserialize, Serialize};

use crate::config::ManipConfig;
use crate::core::budget::AttemptBudgets;
use crate::robot::{GraspEstimate, PlaneEstimate};

/// 任务目标：一次执行期间不可变
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskGoal {
    pub object_id: i64,
    pub is_pick: bool,
    /// 仅放置时使用：来自此前抓取结果的物体高度
    #[serde(default)]
    pub height_of_object: f64,
}

impl TaskGoal {
    pub fn pick(object_id: i64) -> Self {
        Self {
            object_id,
            is_pick: true,
            height_of_object: 0.0,
        }
    }

    pub fn place(object_id: i64, height_of_object: f64) -> Self {
        Self {
            object_id,
            is_pick: false,
            height_of_object,
        }
    }
}

/// 编排器状态（同一时刻仅一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Aligning,
    Picking,
    AwaitingGraspAndPlane,
    AwaitingGrasp,
    AwaitingPlane,
    Placing,
    Complete,
}

impl TaskState {
    /// 反馈中使用的数值编码（Idle=0 … Complete=7）
    pub fn code(self) -> u8 {
        match self {
            TaskState::Idle => 0,
            TaskState::Aligning => 1,
            TaskState::Picking => 2,
            TaskState::AwaitingGraspAndPlane => 3,
            TaskState::AwaitingGrasp => 4,
            TaskState::AwaitingPlane => 5,
            TaskState::Placing => 6,
            TaskState::Complete => 7,
        }
    }

    /// 是否处于等待感知结果汇合的阶段
    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            TaskState::AwaitingGraspAndPlane | TaskState::AwaitingGrasp | TaskState::AwaitingPlane
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Idle => "idle",
            TaskState::Aligning => "aligning",
            TaskState::Picking => "picking",
            TaskState::AwaitingGraspAndPlane => "awaiting_grasp_and_plane",
            TaskState::AwaitingGrasp => "awaiting_grasp",
            TaskState::AwaitingPlane => "awaiting_plane",
            TaskState::Placing => "placing",
            TaskState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// 每次状态迁移发出一条反馈；只发送不保留
#[derive(Debug, Clone, Serialize)]
pub struct TaskFeedback {
    pub state: TaskState,
    pub state_code: u8,
    /// 结构化信息，至少包含 `msg`
    pub info: serde_json::Value,
    /// 毫秒时间戳
    pub stamp_ms: i64,
}

impl TaskFeedback {
    pub fn new(state: TaskState, info: serde_json::Value) -> Self {
        Self {
            state,
            state_code: state.code(),
            info,
            stamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn msg(&self) -> &str {
        self.info.get("msg").and_then(|m| m.as_str()).unwrap_or("")
    }
}

/// 任务结果：每次执行恰好发出一次
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub height_of_object: f64,
}

impl TaskResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            height_of_object: 0.0,
        }
    }

    pub fn succeeded(height_of_object: f64) -> Self {
        Self {
            success: true,
            height_of_object,
        }
    }
}

/// 单次执行的内部上下文
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub state: TaskState,
    pub goal: Option<TaskGoal>,
    pub budgets: AttemptBudgets,
    pub grasp: Option<GraspEstimate>,
    pub plane: Option<PlaneEstimate>,
    pub height_of_object: Option<f64>,
}

impl ExecutionContext {
    pub fn new(cfg: &ManipConfig) -> Self {
        Self {
            state: TaskState::Idle,
            goal: None,
            budgets: AttemptBudgets::from_config(cfg),
            grasp: None,
            plane: None,
            height_of_object: None,
        }
    }

    /// 回到 Idle 并清空目标、感知结果、物体高度与尝试计数；重复调用结果相同
    pub fn reset(&mut self) {
        self.state = TaskState::Idle;
        self.goal = None;
        self.budgets = self.budgets.cleared();
        self.grasp = None;
        self.plane = None;
        self.height_of_object = None;
    }

    /// 开始一次新执行：先 reset，再记录目标
    pub fn begin(&mut self, goal: TaskGoal) {
        self.reset();
        self.goal = Some(goal);
    }

    pub fn clear_estimates(&mut self) {
        self.grasp = None;
        self.plane = None;
    }

    pub fn is_clean(&self) -> bool {
        self.state == TaskState::Idle
            && self.goal.is_none()
            && self.grasp.is_none()
            && self.plane.is_none()
            && self.height_of_object.is_none()
            && self.budgets.alignment.attempted == 0
            && self.budgets.pick.attempted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::robot::{PlaneBounds, Point3};

    fn cfg() -> ManipConfig {
        let mut app = AppConfig::default();
        app.object_detection.class_list = vec!["cup".into()];
        ManipConfig::from_app_config(&app).unwrap()
    }

    fn dirty(cfg: &ManipConfig) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(cfg);
        ctx.begin(TaskGoal::pick(0));
        ctx.state = TaskState::AwaitingPlane;
        ctx.budgets.pick = ctx.budgets.pick.increment();
        ctx.grasp = Some(GraspEstimate {
            center: Point3::new(0.5, 0.0, 0.8),
            yaw: 0.0,
        });
        ctx.plane = Some(PlaneEstimate {
            height: 0.75,
            bounds: PlaneBounds {
                xmin: 0.0,
                xmax: 1.0,
                ymin: 0.0,
                ymax: 1.0,
            },
        });
        ctx.height_of_object = Some(0.05);
        ctx
    }

    #[test]
    fn test_reset_clears_everything() {
        let cfg = cfg();
        let mut ctx = dirty(&cfg);
        ctx.reset();
        assert!(ctx.is_clean());
        assert_eq!(ctx, ExecutionContext::new(&cfg));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let cfg = cfg();
        let mut once = dirty(&cfg);
        once.reset();
        let mut twice = dirty(&cfg);
        twice.reset();
        twice.reset();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_state_codes_are_stable() {
        assert_eq!(TaskState::Idle.code(), 0);
        assert_eq!(TaskState::AwaitingGraspAndPlane.code(), 3);
        assert_eq!(TaskState::Complete.code(), 7);
        assert_eq!(TaskState::AwaitingPlane.to_string(), "awaiting_plane");
    }

    #[test]
    fn test_feedback_msg() {
        let fb = TaskFeedback::new(TaskState::Aligning, serde_json::json!({"msg": "hello"}));
        assert_eq!(fb.msg(), "hello");
        assert_eq!(fb.state_code, 1);
    }
}
