//! 协作方之间传递的几何 / 感知数据

use serde::{Deserialize, Serialize};

/// 三维点（机器人基座系，米）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 分量相加
    pub fn offset_by(self, delta: [f64; 3]) -> Self {
        Self {
            x: self.x + delta[0],
            y: self.y + delta[1],
            z: self.z + delta[2],
        }
    }
}

/// 抓取位姿估计：抓取中心与偏航角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraspEstimate {
    pub center: Point3,
    pub yaw: f64,
}

/// 支撑面包围盒（机器人相对坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneBounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

/// 支撑面估计：高度与包围盒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneEstimate {
    pub height: f64,
    pub bounds: PlaneBounds,
}

/// 末端执行器位姿（仅需位置）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EndEffectorPose {
    pub position: Point3,
}

/// 已施加类别偏移后的抓取目标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraspTarget {
    pub center: Point3,
    pub yaw: f64,
}

/// 关节命令方式：绝对位置或相对增量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JointMode {
    To,
    By,
}

/// 单个关节命令，序列化键形如 `head_pan;to`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointCommand {
    pub joint: String,
    pub mode: JointMode,
    pub value: f64,
}

impl JointCommand {
    pub fn key(&self) -> String {
        let mode = match self.mode {
            JointMode::To => "to",
            JointMode::By => "by",
        };
        format!("{};{}", self.joint, mode)
    }
}

/// 关节空间目标（一组同时执行的关节命令）
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JointGoal {
    pub commands: Vec<JointCommand>,
}

impl JointGoal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, joint: &str, value: f64) -> Self {
        self.commands.push(JointCommand {
            joint: joint.to_string(),
            mode: JointMode::To,
            value,
        });
        self
    }

    pub fn by(mut self, joint: &str, value: f64) -> Self {
        self.commands.push(JointCommand {
            joint: joint.to_string(),
            mode: JointMode::By,
            value,
        });
        self
    }

    /// 放置前重新定位：头部转向侧面、底盘旋转 90°
    pub fn placement_reposition() -> Self {
        Self::new()
            .to("head_pan", -std::f64::consts::FRAC_PI_2)
            .by("base_rotate", std::f64::consts::FRAC_PI_2)
    }

    /// 任务结束时复位辅助位姿（头部回正）
    pub fn auxiliary_reset() -> Self {
        Self::new().to("head_pan", 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_goal_keys() {
        let goal = JointGoal::placement_reposition();
        let keys: Vec<String> = goal.commands.iter().map(JointCommand::key).collect();
        assert_eq!(keys, vec!["head_pan;to", "base_rotate;by"]);
        assert_eq!(goal.commands[1].value, std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_point_offset() {
        let p = Point3::new(0.5, 0.0, 0.8).offset_by([0.01, -0.02, 0.03]);
        assert!((p.x - 0.51).abs() < 1e-12);
        assert!((p.y + 0.02).abs() < 1e-12);
        assert!((p.z - 0.83).abs() < 1e-12);
    }
}
