//! 派生几何量：物体高度、带类别偏移的抓取目标、放置目标点

use serde::Serialize;

use crate::config::ObjectProfile;
use crate::robot::{GraspEstimate, GraspTarget, PlaneEstimate};

/// 物体高度 = |抓取中心 z − 支撑面高度|
pub fn height_of_object(grasp: &GraspEstimate, plane: &PlaneEstimate) -> f64 {
    (grasp.center.z - plane.height).abs()
}

/// 对抓取中心施加类别偏移；竖直分量额外扣除固定安全量
pub fn grasp_target(grasp: &GraspEstimate, profile: &ObjectProfile, safety_bias: f64) -> GraspTarget {
    let [dx, dy, dz] = profile.offset;
    GraspTarget {
        center: grasp.center.offset_by([dx, dy, dz - safety_bias]),
        yaw: grasp.yaw,
    }
}

/// 放置目标（`place(x = lateral, y = longitudinal, z = height)`）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementTarget {
    pub lateral: f64,
    pub longitudinal: f64,
    pub height: f64,
    /// 支撑面是否横跨机器人前向轴两侧
    pub forward_centered: bool,
}

/// 选择放置点
///
/// 包围盒横跨前向轴（xmin·xmax < 0）时无需移动底盘，纵向取 0；否则取包围盒中心。
/// 高度 = 支撑面高度 + 物体高度 + 余量。
pub fn placement_target(plane: &PlaneEstimate, height_of_object: f64, clearance: f64) -> PlacementTarget {
    let b = &plane.bounds;
    let forward_centered = b.xmin * b.xmax < 0.0;
    let lateral = (b.ymin + b.ymax) / 2.0;
    let longitudinal = if forward_centered {
        0.0
    } else {
        (b.xmin + b.xmax) / 2.0
    };
    PlacementTarget {
        lateral,
        longitudinal,
        height: plane.height + height_of_object + clearance,
        forward_centered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{PlaneBounds, Point3};

    fn plane(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> PlaneEstimate {
        PlaneEstimate {
            height: 0.75,
            bounds: PlaneBounds {
                xmin,
                xmax,
                ymin,
                ymax,
            },
        }
    }

    #[test]
    fn test_straddling_surface_is_forward_centered() {
        let t = placement_target(&plane(-0.3, 0.4, 0.1, 0.6), 0.05, 0.1);
        assert!(t.forward_centered);
        assert!((t.lateral - 0.35).abs() < 1e-9);
        assert_eq!(t.longitudinal, 0.0);
        assert!((t.height - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_one_sided_surface_uses_box_center() {
        let t = placement_target(&plane(0.2, 0.6, -0.2, 0.4), 0.0, 0.1);
        assert!(!t.forward_centered);
        assert!((t.lateral - 0.1).abs() < 1e-9);
        assert!((t.longitudinal - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_height_of_object_is_absolute() {
        let g = GraspEstimate {
            center: Point3::new(0.5, 0.0, 0.7),
            yaw: 0.0,
        };
        assert!((height_of_object(&g, &plane(0.0, 1.0, 0.0, 1.0)) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_grasp_target_subtracts_safety_bias_vertically() {
        let g = GraspEstimate {
            center: Point3::new(0.5, 0.1, 0.8),
            yaw: 0.3,
        };
        let profile = ObjectProfile {
            name: "apple".into(),
            offset: [0.01, 0.0, 0.03],
            move_until_contact: true,
        };
        let t = grasp_target(&g, &profile, 0.02);
        assert!((t.center.x - 0.51).abs() < 1e-9);
        assert!((t.center.y - 0.1).abs() < 1e-9);
        assert!((t.center.z - 0.81).abs() < 1e-9);
        assert_eq!(t.yaw, 0.3);
    }
}
