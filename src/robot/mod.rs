//! 机器人协作方：接口定义、几何类型与脚本化仿真实现

pub mod sim;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use sim::{RobotCall, SimScript, SimulatedRobot};
pub use traits::{Alignment, Manipulation, RobotError, ScenePerception, StowService};
pub use types::{
    EndEffectorPose, GraspEstimate, GraspTarget, JointCommand, JointGoal, JointMode, PlaneBounds,
    PlaneEstimate, Point3,
};

/// 一次任务执行所需的全部协作方句柄（可廉价克隆）
#[derive(Clone)]
pub struct Collaborators {
    pub alignment: Arc<dyn Alignment>,
    pub manipulation: Arc<dyn Manipulation>,
    pub scene: Arc<dyn ScenePerception>,
    pub stow: Arc<dyn StowService>,
}

impl Collaborators {
    /// 由同时实现四个接口的单一机器人对象构建
    pub fn from_robot<R>(robot: Arc<R>) -> Self
    where
        R: Alignment + Manipulation + ScenePerception + StowService + 'static,
    {
        Self {
            alignment: robot.clone(),
            manipulation: robot.clone(),
            scene: robot.clone(),
            stow: robot,
        }
    }
}
