//! 脚本化仿真机器人（用于测试与演示，无需真实硬件）
//!
//! 一个对象同时实现四个协作方接口：按 [`SimScript`] 预设的结果应答，记录每次调用，
//! 并统计尚未结束的感知请求数，便于验证取消 / 超时后请求被释放。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{Alignment, Manipulation, RobotError, ScenePerception, StowService};
use super::types::{
    EndEffectorPose, GraspEstimate, GraspTarget, JointGoal, PlaneBounds, PlaneEstimate, Point3,
};

/// 仿真机器人收到的一次调用
#[derive(Debug, Clone, PartialEq)]
pub enum RobotCall {
    SetTarget(i64),
    Align(i64),
    RecoverAlignment,
    AlignHorizontal(f64),
    MoveToPregrasp,
    EndEffectorPose,
    CapturePointCloud,
    GraspEstimate,
    PlaneEstimate,
    Pick {
        target: GraspTarget,
        move_until_contact: bool,
    },
    CheckGrasp,
    Place {
        x: f64,
        y: f64,
        z: f64,
        yaw: f64,
    },
    MoveToPose(JointGoal),
    Stow,
}

impl RobotCall {
    /// 是否为会驱动执行器的物理动作
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            RobotCall::MoveToPregrasp
                | RobotCall::Pick { .. }
                | RobotCall::Place { .. }
                | RobotCall::MoveToPose(_)
                | RobotCall::Stow
        )
    }
}

/// 仿真应答脚本
#[derive(Debug, Clone)]
pub struct SimScript {
    /// 逐次对准结果，用尽后使用 default_align
    pub align_outcomes: VecDeque<bool>,
    pub default_align: bool,
    pub grasp: Option<GraspEstimate>,
    pub plane: Option<PlaneEstimate>,
    pub grasp_error: Option<RobotError>,
    pub plane_error: Option<RobotError>,
    pub grasp_delay: Duration,
    pub plane_delay: Duration,
    /// 逐次抓取校验结果，用尽后使用 default_grasp_check
    pub grasp_checks: VecDeque<bool>,
    pub default_grasp_check: bool,
    pub motion_delay: Duration,
    pub place_error: Option<RobotError>,
    pub ee_pose: EndEffectorPose,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            align_outcomes: VecDeque::new(),
            default_align: true,
            grasp: Some(GraspEstimate {
                center: Point3::new(0.5, 0.0, 0.8),
                yaw: 0.0,
            }),
            plane: Some(PlaneEstimate {
                height: 0.75,
                bounds: PlaneBounds {
                    xmin: -0.3,
                    xmax: 0.4,
                    ymin: 0.1,
                    ymax: 0.6,
                },
            }),
            grasp_error: None,
            plane_error: None,
            grasp_delay: Duration::ZERO,
            plane_delay: Duration::ZERO,
            grasp_checks: VecDeque::new(),
            default_grasp_check: true,
            motion_delay: Duration::ZERO,
            place_error: None,
            ee_pose: EndEffectorPose {
                position: Point3::new(0.1, 0.0, 0.9),
            },
        }
    }
}

impl SimScript {
    pub fn with_align_outcomes(mut self, outcomes: impl IntoIterator<Item = bool>) -> Self {
        self.align_outcomes = outcomes.into_iter().collect();
        self
    }

    pub fn with_default_align(mut self, success: bool) -> Self {
        self.default_align = success;
        self
    }

    pub fn with_grasp(mut self, grasp: Option<GraspEstimate>) -> Self {
        self.grasp = grasp;
        self
    }

    pub fn with_plane(mut self, plane: Option<PlaneEstimate>) -> Self {
        self.plane = plane;
        self
    }

    pub fn with_grasp_error(mut self, err: RobotError) -> Self {
        self.grasp_error = Some(err);
        self
    }

    pub fn with_plane_error(mut self, err: RobotError) -> Self {
        self.plane_error = Some(err);
        self
    }

    pub fn with_estimate_delays(mut self, grasp: Duration, plane: Duration) -> Self {
        self.grasp_delay = grasp;
        self.plane_delay = plane;
        self
    }

    pub fn with_grasp_checks(mut self, checks: impl IntoIterator<Item = bool>) -> Self {
        self.grasp_checks = checks.into_iter().collect();
        self
    }

    pub fn with_default_grasp_check(mut self, success: bool) -> Self {
        self.default_grasp_check = success;
        self
    }

    pub fn with_motion_delay(mut self, delay: Duration) -> Self {
        self.motion_delay = delay;
        self
    }

    pub fn with_place_error(mut self, err: RobotError) -> Self {
        self.place_error = Some(err);
        self
    }
}

/// 请求开始时加一，结束或被丢弃（abort）时减一
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 仿真机器人
#[derive(Debug, Default)]
pub struct SimulatedRobot {
    script: Mutex<SimScript>,
    calls: Mutex<Vec<RobotCall>>,
    outstanding: Arc<AtomicUsize>,
}

impl SimulatedRobot {
    pub fn new(script: SimScript) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 运行期替换脚本（如先抓取再放置的演示）
    pub fn set_script(&self, script: SimScript) {
        *lock(&self.script) = script;
    }

    /// 全部调用记录（按发生顺序）
    pub fn calls(&self) -> Vec<RobotCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, pred: impl Fn(&RobotCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// 尚未结束的抓取 / 支撑面估计请求数
    pub fn outstanding_estimates(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn record(&self, call: RobotCall) {
        tracing::debug!(?call, "sim robot call");
        lock(&self.calls).push(call);
    }

    fn script(&self) -> MutexGuard<'_, SimScript> {
        lock(&self.script)
    }

    async fn motion(&self) {
        let delay = self.script().motion_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Alignment for SimulatedRobot {
    async fn align(&self, object_id: i64) -> Result<bool, RobotError> {
        self.record(RobotCall::Align(object_id));
        let mut script = self.script();
        let default = script.default_align;
        Ok(script.align_outcomes.pop_front().unwrap_or(default))
    }

    async fn recover_from_failure(&self) -> Result<(), RobotError> {
        self.record(RobotCall::RecoverAlignment);
        Ok(())
    }

    async fn align_horizontal(&self, ee_x: f64) -> Result<(), RobotError> {
        self.record(RobotCall::AlignHorizontal(ee_x));
        Ok(())
    }
}

#[async_trait]
impl Manipulation for SimulatedRobot {
    async fn move_to_pregrasp(&self) -> Result<(), RobotError> {
        self.record(RobotCall::MoveToPregrasp);
        self.motion().await;
        Ok(())
    }

    async fn end_effector_pose(&self) -> Result<EndEffectorPose, RobotError> {
        self.record(RobotCall::EndEffectorPose);
        Ok(self.script().ee_pose)
    }

    async fn pick(&self, target: &GraspTarget, move_until_contact: bool) -> Result<(), RobotError> {
        self.record(RobotCall::Pick {
            target: *target,
            move_until_contact,
        });
        self.motion().await;
        Ok(())
    }

    async fn check_grasp_succeeded(&self) -> Result<bool, RobotError> {
        self.record(RobotCall::CheckGrasp);
        let mut script = self.script();
        let default = script.default_grasp_check;
        Ok(script.grasp_checks.pop_front().unwrap_or(default))
    }

    async fn place(&self, x: f64, y: f64, z: f64, yaw: f64) -> Result<(), RobotError> {
        self.record(RobotCall::Place { x, y, z, yaw });
        self.motion().await;
        match self.script().place_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn move_to_pose(&self, goal: &JointGoal) -> Result<(), RobotError> {
        self.record(RobotCall::MoveToPose(goal.clone()));
        self.motion().await;
        Ok(())
    }
}

#[async_trait]
impl ScenePerception for SimulatedRobot {
    async fn set_target_object(&self, object_id: i64) -> Result<(), RobotError> {
        self.record(RobotCall::SetTarget(object_id));
        Ok(())
    }

    async fn capture_point_cloud(&self) -> Result<(), RobotError> {
        self.record(RobotCall::CapturePointCloud);
        Ok(())
    }

    async fn grasp_estimate(&self) -> Result<Option<GraspEstimate>, RobotError> {
        let _guard = InFlight::enter(&self.outstanding);
        self.record(RobotCall::GraspEstimate);
        let (delay, result, err) = {
            let s = self.script();
            (s.grasp_delay, s.grasp, s.grasp_error.clone())
        };
        tokio::time::sleep(delay).await;
        match err {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    async fn plane_estimate(&self) -> Result<Option<PlaneEstimate>, RobotError> {
        let _guard = InFlight::enter(&self.outstanding);
        self.record(RobotCall::PlaneEstimate);
        let (delay, result, err) = {
            let s = self.script();
            (s.plane_delay, s.plane, s.plane_error.clone())
        };
        tokio::time::sleep(delay).await;
        match err {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }
}

#[async_trait]
impl StowService for SimulatedRobot {
    async fn stow(&self) -> Result<(), RobotError> {
        self.record(RobotCall::Stow);
        self.motion().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_alignment_then_default() {
        let robot = SimulatedRobot::new(
            SimScript::default()
                .with_align_outcomes([false, true])
                .with_default_align(false),
        );
        assert!(!robot.align(1).await.unwrap());
        assert!(robot.align(1).await.unwrap());
        assert!(!robot.align(1).await.unwrap());
        assert_eq!(robot.count(|c| matches!(c, RobotCall::Align(1))), 3);
    }

    #[tokio::test]
    async fn test_aborted_estimate_is_released() {
        let robot = Arc::new(SimulatedRobot::new(
            SimScript::default().with_estimate_delays(Duration::from_secs(30), Duration::ZERO),
        ));
        let r = Arc::clone(&robot);
        let handle = tokio::spawn(async move { r.grasp_estimate().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(robot.outstanding_estimates(), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(robot.outstanding_estimates(), 0);
    }

    #[tokio::test]
    async fn test_place_error_is_reported() {
        let robot = SimulatedRobot::new(
            SimScript::default().with_place_error(RobotError::Motion("blocked".into())),
        );
        let err = robot.place(0.1, 0.0, 0.9, 0.0).await.unwrap_err();
        assert_eq!(err, RobotError::Motion("blocked".into()));
        assert!(robot.calls()[0].is_motion());
    }
}
