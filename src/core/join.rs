//! 感知结果汇合：并发等待抓取估计与支撑面估计
//!
//! 两个请求作为独立 tokio 任务发出；两者都成功才返回配对结果。任一方失败 / 缺失 / 超时
//! 即返回 PartialFailure 并中止仍在进行的另一方；收到取消时同样中止所有未完成请求。

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError as TaskJoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::robot::{GraspEstimate, PlaneEstimate, RobotError};

/// 哪一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Grasp,
    Plane,
    Both,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Grasp => write!(f, "grasp"),
            Side::Plane => write!(f, "plane"),
            Side::Both => write!(f, "grasp and plane"),
        }
    }
}

/// 失败原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// 感知方应答「未检测到」
    Missing,
    /// 感知方返回错误
    Failed(String),
    TimedOut,
}

/// 部分失败：指明失败的一侧
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailure {
    pub side: Side,
    pub reason: FailureReason,
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            FailureReason::Missing => write!(f, "{} estimate not found", self.side),
            FailureReason::Failed(msg) => write!(f, "{} estimate failed: {}", self.side, msg),
            FailureReason::TimedOut => write!(f, "{} estimate timed out", self.side),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinError {
    Partial(PartialFailure),
    Cancelled,
}

/// drop 时中止任务，保证未完成的请求被释放
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type EstimateResult<T> = Result<Option<T>, RobotError>;

/// 汇合器（仅持有超时配置）
#[derive(Debug, Clone, Copy)]
pub struct EstimateJoin {
    timeout: Duration,
}

impl EstimateJoin {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 并发发出两个请求并等待两者完成
    ///
    /// `on_first` 在第一个成功结果到达、另一侧仍未完成时调用一次，参数为先到的一侧。
    pub async fn await_both<G, P>(
        &self,
        grasp: G,
        plane: P,
        cancel: &CancellationToken,
        mut on_first: impl FnMut(Side),
    ) -> Result<(GraspEstimate, PlaneEstimate), JoinError>
    where
        G: Future<Output = EstimateResult<GraspEstimate>> + Send + 'static,
        P: Future<Output = EstimateResult<PlaneEstimate>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(JoinError::Cancelled);
        }

        let mut grasp_task = AbortOnDrop(tokio::spawn(grasp));
        let mut plane_task = AbortOnDrop(tokio::spawn(plane));
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut grasp_out: Option<GraspEstimate> = None;
        let mut plane_out: Option<PlaneEstimate> = None;

        loop {
            if let (Some(g), Some(p)) = (grasp_out, plane_out) {
                return Ok((g, p));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Estimate join cancelled, releasing outstanding requests");
                    return Err(JoinError::Cancelled);
                }
                res = &mut grasp_task.0, if grasp_out.is_none() => {
                    let g = settle(Side::Grasp, res)?;
                    grasp_out = Some(g);
                    if plane_out.is_none() {
                        on_first(Side::Grasp);
                    }
                }
                res = &mut plane_task.0, if plane_out.is_none() => {
                    let p = settle(Side::Plane, res)?;
                    plane_out = Some(p);
                    if grasp_out.is_none() {
                        on_first(Side::Plane);
                    }
                }
                _ = &mut deadline => {
                    let side = match (grasp_out.is_some(), plane_out.is_some()) {
                        (true, false) => Side::Plane,
                        (false, true) => Side::Grasp,
                        _ => Side::Both,
                    };
                    tracing::warn!(%side, timeout_ms = self.timeout.as_millis() as u64, "Estimate join timed out");
                    return Err(JoinError::Partial(PartialFailure {
                        side,
                        reason: FailureReason::TimedOut,
                    }));
                }
            }
        }
    }
}

fn settle<T>(
    side: Side,
    res: Result<EstimateResult<T>, TaskJoinError>,
) -> Result<T, JoinError> {
    let reason = match res {
        Ok(Ok(Some(value))) => return Ok(value),
        Ok(Ok(None)) => FailureReason::Missing,
        Ok(Err(e)) => FailureReason::Failed(e.to_string()),
        Err(e) => FailureReason::Failed(format!("request task ended abnormally: {e}")),
    };
    Err(JoinError::Partial(PartialFailure { side, reason }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{PlaneBounds, Point3};

    fn grasp() -> GraspEstimate {
        GraspEstimate {
            center: Point3::new(0.5, 0.0, 0.8),
            yaw: 0.0,
        }
    }

    fn plane() -> PlaneEstimate {
        PlaneEstimate {
            height: 0.75,
            bounds: PlaneBounds {
                xmin: -0.3,
                xmax: 0.4,
                ymin: 0.1,
                ymax: 0.6,
            },
        }
    }

    fn delayed<T: Send + 'static>(
        ms: u64,
        value: EstimateResult<T>,
    ) -> impl Future<Output = EstimateResult<T>> + Send + 'static {
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            value
        }
    }

    #[tokio::test]
    async fn test_both_succeed() {
        let join = EstimateJoin::new(Duration::from_secs(1));
        let mut firsts = Vec::new();
        let (g, p) = join
            .await_both(
                delayed(10, Ok(Some(grasp()))),
                delayed(40, Ok(Some(plane()))),
                &CancellationToken::new(),
                |side| firsts.push(side),
            )
            .await
            .unwrap();
        assert_eq!(g, grasp());
        assert_eq!(p, plane());
        assert_eq!(firsts, vec![Side::Grasp]);
    }

    #[tokio::test]
    async fn test_missing_plane_is_partial_failure() {
        let join = EstimateJoin::new(Duration::from_secs(1));
        let err = join
            .await_both(
                delayed(30, Ok(Some(grasp()))),
                delayed(0, Ok(None)),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JoinError::Partial(PartialFailure {
                side: Side::Plane,
                reason: FailureReason::Missing,
            })
        );
    }

    #[tokio::test]
    async fn test_grasp_error_is_partial_failure() {
        let join = EstimateJoin::new(Duration::from_secs(1));
        let err = join
            .await_both(
                delayed(0, Err(RobotError::Perception("no cloud".into()))),
                delayed(0, Ok(Some(plane()))),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        match err {
            JoinError::Partial(pf) => {
                assert_eq!(pf.side, Side::Grasp);
                assert!(matches!(pf.reason, FailureReason::Failed(ref m) if m.contains("no cloud")));
            }
            other => panic!("Expected partial failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_names_pending_side() {
        let join = EstimateJoin::new(Duration::from_millis(50));
        let err = join
            .await_both(
                delayed(0, Ok(Some(grasp()))),
                delayed(5_000, Ok(Some(plane()))),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JoinError::Partial(PartialFailure {
                side: Side::Plane,
                reason: FailureReason::TimedOut,
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_releases_requests() {
        let join = EstimateJoin::new(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = join
            .await_both(
                delayed(5_000, Ok(Some(grasp()))),
                delayed(5_000, Ok(Some(plane()))),
                &cancel,
                |_| {},
            )
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
