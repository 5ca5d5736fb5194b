//! 任务编排器：主控循环
//!
//! 负责：记录目标、调用 `transition` 决定下一步、执行副作用（调用协作方）、把结果转换为下一个事件，
//! 直到得到 Finish / Abort。每个协作方调用都与 CancellationToken 竞争，取消后不再发出任何运动指令。

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ManipConfig;
use crate::core::join::{EstimateJoin, JoinError};
use crate::core::state::{ExecutionContext, TaskFeedback, TaskGoal, TaskResult};
use crate::core::transition::{transition, Effect, Event};
use crate::core::ManipError;
use crate::robot::{Collaborators, JointGoal, RobotError};

/// 反馈发送端（只发送，不保留历史）
pub type FeedbackSender = mpsc::UnboundedSender<TaskFeedback>;

/// 与取消竞争的协作方调用
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ManipError>
where
    F: Future<Output = Result<T, RobotError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ManipError::Cancelled),
        res = fut => res.map_err(ManipError::from),
    }
}

pub struct Orchestrator {
    robot: Collaborators,
    config: Arc<ManipConfig>,
    context: ExecutionContext,
}

impl Orchestrator {
    pub fn new(robot: Collaborators, config: Arc<ManipConfig>) -> Self {
        let context = ExecutionContext::new(&config);
        Self {
            robot,
            config,
            context,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// 执行一个目标直到得到结果；每次调用恰好返回一个结果
    pub async fn run(
        &mut self,
        goal: TaskGoal,
        cancel: CancellationToken,
        feedback: &FeedbackSender,
    ) -> TaskResult {
        self.context.begin(goal);
        tracing::info!(
            object_id = goal.object_id,
            is_pick = goal.is_pick,
            height_of_object = goal.height_of_object,
            "Received {} request",
            if goal.is_pick { "pick" } else { "place" }
        );

        let mut event = match guarded(&cancel, self.robot.scene.set_target_object(goal.object_id)).await {
            Ok(()) => Event::Started,
            Err(e) => Self::event_from_error(e),
        };

        loop {
            if cancel.is_cancelled() {
                event = Event::Cancelled;
            }
            match self.advance(event, feedback) {
                Effect::Finish(result) => return self.finish(result, &cancel).await,
                Effect::Abort => {
                    self.context.reset();
                    if cancel.is_cancelled() {
                        tracing::info!(object_id = goal.object_id, "Task cancelled");
                    } else {
                        tracing::warn!(object_id = goal.object_id, "Task aborted");
                    }
                    return TaskResult::failed();
                }
                effect => {
                    event = match self.execute(effect, &cancel, feedback).await {
                        Ok(next) => next,
                        Err(e) => Self::event_from_error(e),
                    };
                }
            }
        }
    }

    /// 应用一次迁移并发出对应反馈
    fn advance(&mut self, event: Event, feedback: &FeedbackSender) -> Effect {
        let step = transition(&self.context, event, &self.config);
        self.context = step.context;
        let fb = TaskFeedback::new(self.context.state, step.info);
        tracing::info!(state = %fb.state, code = fb.state_code, info = %fb.info, "{}", fb.msg());
        // 接收端可能已放弃监听，反馈只发不保留
        let _ = feedback.send(fb);
        step.effect
    }

    fn event_from_error(err: ManipError) -> Event {
        match err {
            ManipError::Cancelled => Event::Cancelled,
            other => {
                tracing::warn!(error = %other, "Collaborator call failed");
                Event::Fault(other.to_string())
            }
        }
    }

    async fn execute(
        &mut self,
        effect: Effect,
        cancel: &CancellationToken,
        feedback: &FeedbackSender,
    ) -> Result<Event, ManipError> {
        tracing::debug!(?effect, "Executing effect");
        let robot = self.robot.clone();
        match effect {
            Effect::Align { object_id } => {
                let success = guarded(cancel, robot.alignment.align(object_id)).await?;
                Ok(Event::Aligned { success })
            }
            Effect::RecoverAndAlign { object_id } => {
                guarded(cancel, robot.alignment.recover_from_failure()).await?;
                let success = guarded(cancel, robot.alignment.align(object_id)).await?;
                Ok(Event::Aligned { success })
            }
            Effect::PrepareGrasp => {
                guarded(cancel, robot.manipulation.move_to_pregrasp()).await?;
                let pose = guarded(cancel, robot.manipulation.end_effector_pose()).await?;
                guarded(cancel, robot.alignment.align_horizontal(pose.position.x)).await?;
                guarded(cancel, robot.scene.capture_point_cloud()).await?;
                Ok(Event::PregraspReady)
            }
            Effect::AwaitEstimates => Ok(self.await_estimates(cancel, feedback).await),
            Effect::ExecutePick {
                target,
                move_until_contact,
            } => {
                guarded(cancel, robot.manipulation.pick(&target, move_until_contact)).await?;
                let held = guarded(cancel, robot.manipulation.check_grasp_succeeded()).await?;
                Ok(Event::GraspChecked { held })
            }
            Effect::ScanForPlacement => {
                guarded(cancel, robot.manipulation.move_to_pose(&JointGoal::placement_reposition())).await?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ManipError::Cancelled),
                    _ = tokio::time::sleep(self.config.settle_delay) => {}
                }
                guarded(cancel, robot.scene.capture_point_cloud()).await?;
                let plane = guarded(cancel, robot.scene.plane_estimate()).await?;
                Ok(Event::PlaneScanned(plane))
            }
            Effect::PlaceAndStow { target } => {
                guarded(
                    cancel,
                    robot
                        .manipulation
                        .place(target.lateral, target.longitudinal, target.height, 0.0),
                )
                .await?;
                guarded(cancel, robot.stow.stow()).await?;
                Ok(Event::Placed)
            }
            other @ (Effect::KeepWaiting | Effect::Finish(_) | Effect::Abort) => {
                Ok(Event::Fault(format!("effect {other:?} is not executable here")))
            }
        }
    }

    /// 并发请求两个估计；先到的一侧作为一次状态迁移发出反馈
    async fn await_estimates(&mut self, cancel: &CancellationToken, feedback: &FeedbackSender) -> Event {
        let join = EstimateJoin::new(self.config.join_timeout);
        let grasp_scene = Arc::clone(&self.robot.scene);
        let plane_scene = Arc::clone(&self.robot.scene);

        let outcome = join
            .await_both(
                async move { grasp_scene.grasp_estimate().await },
                async move { plane_scene.plane_estimate().await },
                cancel,
                |side| {
                    let _ = self.advance(Event::EstimateArrived(side), feedback);
                },
            )
            .await;

        match outcome {
            Ok((grasp, plane)) => Event::EstimatesReady { grasp, plane },
            Err(JoinError::Partial(detail)) => {
                tracing::warn!(%detail, "Estimate join failed");
                Event::EstimatesFailed(detail)
            }
            Err(JoinError::Cancelled) => Event::Cancelled,
        }
    }

    /// Complete：复位辅助位姿，reset 上下文，发出结果
    async fn finish(&mut self, result: TaskResult, cancel: &CancellationToken) -> TaskResult {
        let result = match guarded(
            cancel,
            self.robot.manipulation.move_to_pose(&JointGoal::auxiliary_reset()),
        )
        .await
        {
            Ok(()) => result,
            Err(ManipError::Cancelled) => {
                tracing::info!("Cancelled before auxiliary reset");
                TaskResult::failed()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auxiliary pose reset failed");
                result
            }
        };
        self.context.reset();
        tracing::info!(success = result.success, height_of_object = result.height_of_object, "Work complete");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::state::TaskState;
    use crate::robot::{RobotCall, SimScript, SimulatedRobot};

    fn cfg() -> Arc<ManipConfig> {
        let mut app = AppConfig::default();
        app.object_detection.class_list = vec!["cup".into(), "bottle".into(), "apple".into()];
        app.manipulation.settle_delay_ms = 0;
        app.manipulation.join_timeout_ms = 500;
        Arc::new(ManipConfig::from_app_config(&app).unwrap())
    }

    fn setup(script: SimScript) -> (Arc<SimulatedRobot>, Orchestrator) {
        let robot = Arc::new(SimulatedRobot::new(script));
        let orch = Orchestrator::new(Collaborators::from_robot(robot.clone()), cfg());
        (robot, orch)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TaskFeedback>) -> Vec<TaskFeedback> {
        let mut out = Vec::new();
        while let Ok(fb) = rx.try_recv() {
            out.push(fb);
        }
        out
    }

    #[tokio::test]
    async fn test_pick_emits_feedback_per_transition() {
        let (robot, mut orch) = setup(SimScript::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = orch.run(TaskGoal::pick(2), CancellationToken::new(), &tx).await;

        assert!(result.success);
        let states: Vec<TaskState> = drain(&mut rx).iter().map(|f| f.state).collect();
        assert_eq!(states.first(), Some(&TaskState::Aligning));
        assert_eq!(states.last(), Some(&TaskState::Complete));
        assert!(states.contains(&TaskState::AwaitingGraspAndPlane));
        assert!(orch.context().is_clean());
        assert_eq!(robot.count(|c| matches!(c, RobotCall::SetTarget(2))), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_no_motion() {
        let (robot, mut orch) = setup(SimScript::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orch.run(TaskGoal::pick(2), cancel, &tx).await;
        assert!(!result.success);
        assert_eq!(robot.count(RobotCall::is_motion), 0);
        let fbs = drain(&mut rx);
        assert_eq!(fbs.len(), 1);
        assert_eq!(fbs[0].state, TaskState::Idle);
    }

    #[tokio::test]
    async fn test_grasp_estimate_error_exhausts_pick_budget() {
        let (robot, mut orch) = setup(SimScript::default());
        robot.set_script(SimScript::default().with_grasp_error(RobotError::Unavailable("grasp node".into())));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = orch.run(TaskGoal::pick(2), CancellationToken::new(), &tx).await;
        assert!(!result.success);
        assert_eq!(robot.count(|c| matches!(c, RobotCall::Pick { .. })), 0);
        assert_eq!(robot.count(|c| matches!(c, RobotCall::MoveToPregrasp)), 4);
        assert!(orch.context().is_clean());
    }
}
