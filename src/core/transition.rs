//! 纯状态迁移：(上下文, 事件) -> (新上下文, 副作用, 反馈信息)
//!
//! 不做任何 I/O。每次调用就是一次状态迁移（包括重新进入同一状态），由编排器发出恰好一条反馈，
//! 再执行返回的 Effect 并把结果转换为下一个 Event。

use serde_json::json;

use crate::config::ManipConfig;
use crate::core::geometry::{self, PlacementTarget};
use crate::core::join::{PartialFailure, Side};
use crate::core::state::{ExecutionContext, TaskGoal, TaskResult, TaskState};
use crate::core::{Failure, ManipError, PickFailure, RecoveryAction, RecoveryEngine};
use crate::robot::{GraspEstimate, GraspTarget, PlaneEstimate};

/// 驱动状态机的事件（来自任务开始、协作方结果或取消）
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started,
    Aligned { success: bool },
    /// 已到达预抓取位姿并采集点云，可发出估计请求
    PregraspReady,
    /// 汇合期间先到达的一侧
    EstimateArrived(Side),
    EstimatesReady {
        grasp: GraspEstimate,
        plane: PlaneEstimate,
    },
    EstimatesFailed(PartialFailure),
    GraspChecked { held: bool },
    /// 放置前扫描到的支撑面（None 表示未检测到）
    PlaneScanned(Option<PlaneEstimate>),
    Placed,
    /// 协作方返回错误
    Fault(String),
    Cancelled,
}

/// 由执行层完成的副作用
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Align { object_id: i64 },
    /// 先调用对准纠正动作，再重试对准
    RecoverAndAlign { object_id: i64 },
    /// 移动到预抓取位姿、读取末端位姿、水平微调、采集点云
    PrepareGrasp,
    /// 并发请求抓取与支撑面估计并等待两者
    AwaitEstimates,
    /// 汇合仍在进行，无需新动作
    KeepWaiting,
    /// 执行抓取并校验
    ExecutePick {
        target: GraspTarget,
        move_until_contact: bool,
    },
    /// 重新定位、稳定等待、采集点云并估计支撑面
    ScanForPlacement,
    /// 放置后收臂
    PlaceAndStow { target: PlacementTarget },
    /// 复位辅助位姿并发出结果
    Finish(TaskResult),
    /// 已 reset，直接发出失败结果
    Abort,
}

/// 一次迁移的产物
#[derive(Debug, Clone)]
pub struct Transition {
    pub context: ExecutionContext,
    pub effect: Effect,
    pub info: serde_json::Value,
}

impl Transition {
    fn to(mut context: ExecutionContext, state: TaskState, effect: Effect, info: serde_json::Value) -> Self {
        context.state = state;
        Self {
            context,
            effect,
            info,
        }
    }
}

fn msg(text: impl Into<String>) -> serde_json::Value {
    json!({ "msg": text.into() })
}

/// 所有终止路径共用：reset 后回到 Idle
fn abort(mut context: ExecutionContext, info: serde_json::Value) -> Transition {
    context.reset();
    Transition {
        context,
        effect: Effect::Abort,
        info,
    }
}

fn complete(context: ExecutionContext, result: TaskResult, info: serde_json::Value) -> Transition {
    Transition::to(context, TaskState::Complete, Effect::Finish(result), info)
}

/// 状态迁移函数
pub fn transition(ctx: &ExecutionContext, event: Event, cfg: &ManipConfig) -> Transition {
    let next = ctx.clone();
    let Some(goal) = ctx.goal else {
        return abort(next, msg("No active goal. Aborting."));
    };
    let engine = RecoveryEngine::new();

    match (ctx.state, event) {
        (_, Event::Cancelled) => abort(next, msg("Task preempted. Aborting.")),

        (TaskState::Placing, Event::Fault(reason)) => {
            placement_failure(next, &engine, &goal, reason)
        }

        (_, Event::Fault(reason)) => {
            debug_assert_eq!(engine.handle(&Failure::Fault(reason.clone()), &ctx.budgets), RecoveryAction::Abort);
            abort(next, json!({ "msg": "Collaborator failure. Aborting.", "error": reason }))
        }

        (TaskState::Idle, Event::Started) => {
            if !goal.is_pick {
                return Transition::to(
                    next,
                    TaskState::Placing,
                    Effect::ScanForPlacement,
                    msg("Trigger Request received. Placing"),
                );
            }
            if cfg.object_profile(goal.object_id).is_none() {
                return abort(
                    next,
                    json!({
                        "msg": "Unknown object class. Aborting.",
                        "error": ManipError::UnknownObject(goal.object_id).to_string(),
                    }),
                );
            }
            Transition::to(
                next,
                TaskState::Aligning,
                Effect::Align {
                    object_id: goal.object_id,
                },
                msg("Trigger Request received. Starting to find the object"),
            )
        }

        (TaskState::Aligning, Event::Aligned { success: true }) => Transition::to(
            next,
            TaskState::Picking,
            Effect::PrepareGrasp,
            msg("Servoing succeeded! Starting manipulation."),
        ),

        (TaskState::Aligning, Event::Aligned { success: false }) => {
            match engine.handle(&Failure::Alignment, &ctx.budgets) {
                RecoveryAction::RecoverThenRetry => {
                    let mut next = next;
                    next.budgets.alignment = ctx.budgets.alignment.increment();
                    let counter = next.budgets.alignment;
                    Transition::to(
                        next,
                        TaskState::Aligning,
                        Effect::RecoverAndAlign {
                            object_id: goal.object_id,
                        },
                        json!({
                            "msg": "Servoing failed. Attempting to recover from failure.",
                            "attempt": counter.attempted,
                            "allowed": counter.allowed,
                        }),
                    )
                }
                _ => abort(
                    next,
                    json!({
                        "msg": "Servoing failed. Aborting.",
                        "attempted": ctx.budgets.alignment.attempted,
                    }),
                ),
            }
        }

        (TaskState::Picking, Event::PregraspReady) => Transition::to(
            next,
            TaskState::AwaitingGraspAndPlane,
            Effect::AwaitEstimates,
            msg("At pregrasp pose. Waiting for grasp and plane estimates."),
        ),

        (TaskState::AwaitingGraspAndPlane, Event::EstimateArrived(Side::Grasp)) => Transition::to(
            next,
            TaskState::AwaitingPlane,
            Effect::KeepWaiting,
            msg("Grasp estimate received. Waiting for plane estimate."),
        ),

        (TaskState::AwaitingGraspAndPlane, Event::EstimateArrived(Side::Plane)) => Transition::to(
            next,
            TaskState::AwaitingGrasp,
            Effect::KeepWaiting,
            msg("Plane estimate received. Waiting for grasp estimate."),
        ),

        (state, Event::EstimatesReady { grasp, plane }) if state.is_awaiting() => {
            let Some(profile) = cfg.object_profile(goal.object_id) else {
                return abort(next, msg("Unknown object class. Aborting."));
            };
            let height = geometry::height_of_object(&grasp, &plane);
            let target = geometry::grasp_target(&grasp, profile, cfg.grasp_safety_bias);
            let mut next = next;
            next.grasp = Some(grasp);
            next.plane = Some(plane);
            next.height_of_object = Some(height);
            Transition::to(
                next,
                TaskState::Picking,
                Effect::ExecutePick {
                    target,
                    move_until_contact: profile.move_until_contact,
                },
                json!({
                    "msg": "Estimates received. Executing pick.",
                    "class": profile.name,
                    "height_of_object": height,
                    "move_until_contact": profile.move_until_contact,
                }),
            )
        }

        (state, Event::EstimatesFailed(detail)) if state.is_awaiting() => {
            pick_failure(next, &engine, PickFailure::Estimates { detail })
        }

        (TaskState::Picking, Event::GraspChecked { held: true }) => {
            let height = ctx.height_of_object.unwrap_or_default();
            complete(
                next,
                TaskResult::succeeded(height),
                json!({ "msg": "Pick succeeded!", "height_of_object": height }),
            )
        }

        (TaskState::Picking, Event::GraspChecked { held: false }) => {
            pick_failure(next, &engine, PickFailure::NotHeld)
        }

        (TaskState::Placing, Event::PlaneScanned(Some(plane))) => {
            let target = geometry::placement_target(&plane, goal.height_of_object, cfg.place_clearance);
            let mut next = next;
            next.plane = Some(plane);
            Transition::to(
                next,
                TaskState::Placing,
                Effect::PlaceAndStow { target },
                json!({ "msg": "Support plane found. Placing object.", "target": target }),
            )
        }

        (TaskState::Placing, Event::PlaneScanned(None)) => {
            placement_failure(next, &engine, &goal, "no support plane found".to_string())
        }

        (TaskState::Placing, Event::Placed) => complete(
            next,
            TaskResult::succeeded(goal.height_of_object),
            msg("Place succeeded!"),
        ),

        (state, event) => {
            tracing::warn!(%state, ?event, "Unexpected event for state");
            abort(
                next,
                json!({ "msg": "Unexpected event. Aborting.", "state": state, "event": format!("{event:?}") }),
            )
        }
    }
}

fn pick_failure(next: ExecutionContext, engine: &RecoveryEngine, failure: PickFailure) -> Transition {
    let detail = serde_json::to_value(&failure).unwrap_or_default();
    match engine.handle(&Failure::Pick(failure), &next.budgets) {
        RecoveryAction::Retry => {
            let mut next = next;
            next.budgets.pick = next.budgets.pick.increment();
            next.clear_estimates();
            next.height_of_object = None;
            let counter = next.budgets.pick;
            Transition::to(
                next,
                TaskState::Picking,
                Effect::PrepareGrasp,
                json!({
                    "msg": "Pick failed. Reattempting pick.",
                    "attempt": counter.attempted,
                    "allowed": counter.allowed,
                    "failure": detail,
                }),
            )
        }
        _ => {
            let attempted = next.budgets.pick.attempted;
            abort(
                next,
                json!({
                    "msg": "Pick failed. Cannot grasp successfully. Aborting.",
                    "attempted": attempted,
                    "failure": detail,
                }),
            )
        }
    }
}

/// 放置无重试策略：记录失败后照常进入 Complete，结果标记为失败
fn placement_failure(
    next: ExecutionContext,
    engine: &RecoveryEngine,
    goal: &TaskGoal,
    reason: String,
) -> Transition {
    let action = engine.handle(&Failure::Placement(reason.clone()), &next.budgets);
    debug_assert_eq!(action, RecoveryAction::Proceed);
    complete(
        next,
        TaskResult {
            success: false,
            height_of_object: goal.height_of_object,
        },
        json!({ "msg": "Placement failed. Completing without retry.", "error": reason }),
    )
}
