//! 外部协作方接口：视觉对准、机械臂操作、场景感知、收臂服务
//!
//! 编排器只依赖这些 trait；真实驱动与仿真实现都在边界之外替换。

use async_trait::async_trait;
use thiserror::Error;

use super::types::{EndEffectorPose, GraspEstimate, GraspTarget, JointGoal, PlaneEstimate};

/// 协作方调用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobotError {
    #[error("Motion failed: {0}")]
    Motion(String),

    #[error("Perception failed: {0}")]
    Perception(String),

    #[error("Service call failed: {0}")]
    Service(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// 视觉对准（让机器人正对目标物体）
#[async_trait]
pub trait Alignment: Send + Sync {
    /// 对准 objectId 对应的物体，返回是否成功
    async fn align(&self, object_id: i64) -> Result<bool, RobotError>;

    /// 对准失败后的纠正动作（每次失败调用一次，之后再重试对准）
    async fn recover_from_failure(&self) -> Result<(), RobotError>;

    /// 到达预抓取位姿后，依据末端 x 坐标做水平微调
    async fn align_horizontal(&self, ee_x: f64) -> Result<(), RobotError>;
}

/// 机械臂 / 底盘操作
#[async_trait]
pub trait Manipulation: Send + Sync {
    async fn move_to_pregrasp(&self) -> Result<(), RobotError>;

    async fn end_effector_pose(&self) -> Result<EndEffectorPose, RobotError>;

    async fn pick(&self, target: &GraspTarget, move_until_contact: bool) -> Result<(), RobotError>;

    async fn check_grasp_succeeded(&self) -> Result<bool, RobotError>;

    async fn place(&self, x: f64, y: f64, z: f64, yaw: f64) -> Result<(), RobotError>;

    /// 关节空间运动（如头部转向、底盘旋转）
    async fn move_to_pose(&self, goal: &JointGoal) -> Result<(), RobotError>;
}

/// 场景 / 感知：点云采集与抓取、支撑面估计
#[async_trait]
pub trait ScenePerception: Send + Sync {
    async fn set_target_object(&self, object_id: i64) -> Result<(), RobotError>;

    async fn capture_point_cloud(&self) -> Result<(), RobotError>;

    /// 未检测到时返回 None
    async fn grasp_estimate(&self) -> Result<Option<GraspEstimate>, RobotError>;

    /// 未检测到时返回 None
    async fn plane_estimate(&self) -> Result<Option<PlaneEstimate>, RobotError>;
}

/// 收臂服务：放置成功后调用
#[async_trait]
pub trait StowService: Send + Sync {
    async fn stow(&self) -> Result<(), RobotError>;
}
