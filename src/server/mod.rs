//! 任务服务：接收目标、抢占正在执行的目标、投递反馈与结果
//!
//! 单一执行槽：后台 worker 按到达顺序逐个执行目标。新目标到达时立即取消当前目标的 token，
//! 被抢占的目标走 Abort 路径并照常得到一个失败结果；每个目标恰好一个结果。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{ManipError, Orchestrator, TaskFeedback, TaskGoal, TaskResult};

/// 调用方持有的目标句柄：反馈流 + 结果
#[derive(Debug)]
pub struct GoalHandle {
    pub id: String,
    pub feedback: mpsc::UnboundedReceiver<TaskFeedback>,
    pub result: oneshot::Receiver<TaskResult>,
}

impl GoalHandle {
    /// 等待结果，并收集该目标发出的全部反馈
    pub async fn outcome(mut self) -> Result<(TaskResult, Vec<TaskFeedback>), ManipError> {
        let result = self.result.await.map_err(|_| ManipError::ServerClosed)?;
        let mut feedback = Vec::new();
        while let Some(fb) = self.feedback.recv().await {
            feedback.push(fb);
        }
        Ok((result, feedback))
    }
}

struct Job {
    id: String,
    goal: TaskGoal,
    cancel: CancellationToken,
    feedback: mpsc::UnboundedSender<TaskFeedback>,
    result: oneshot::Sender<TaskResult>,
}

#[derive(Debug, Clone)]
struct ActiveGoal {
    id: String,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveGoal>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 任务服务（可克隆，克隆体共享同一执行槽）
#[derive(Clone)]
pub struct TaskServer {
    jobs: mpsc::UnboundedSender<Job>,
    active: ActiveSlot,
    shutdown: CancellationToken,
    /// worker 退出时取消
    stopped: CancellationToken,
}

impl TaskServer {
    /// 启动后台 worker；必须在 tokio 运行时内调用
    pub fn start(orchestrator: Orchestrator) -> Self {
        Self::with_shutdown(orchestrator, CancellationToken::new())
    }

    /// 以外部关闭 token 启动：token 取消后拒绝新目标，并取消正在执行的目标
    pub fn with_shutdown(orchestrator: Orchestrator, shutdown: CancellationToken) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let active: ActiveSlot = Arc::new(Mutex::new(None));
        let stopped = CancellationToken::new();
        tokio::spawn(worker(
            orchestrator,
            rx,
            Arc::clone(&active),
            shutdown.clone(),
            stopped.clone(),
        ));
        Self {
            jobs,
            active,
            shutdown,
            stopped,
        }
    }

    /// 提交新目标；若已有目标在执行则将其抢占
    pub fn send_goal(&self, goal: TaskGoal) -> Result<GoalHandle, ManipError> {
        if self.shutdown.is_cancelled() {
            return Err(ManipError::ServerClosed);
        }

        let id = format!("goal_{}", Uuid::new_v4());
        let cancel = self.shutdown.child_token();
        let (fb_tx, fb_rx) = mpsc::unbounded_channel();
        let (res_tx, res_rx) = oneshot::channel();

        {
            let mut slot = lock(&self.active);
            let previous = slot.replace(ActiveGoal {
                id: id.clone(),
                cancel: cancel.clone(),
            });
            if let Some(prev) = previous {
                tracing::info!(preempted = %prev.id, by = %id, "Preempting active goal");
                prev.cancel.cancel();
            }
        }

        let job = Job {
            id: id.clone(),
            goal,
            cancel,
            feedback: fb_tx,
            result: res_tx,
        };
        if self.jobs.send(job).is_err() {
            lock(&self.active).take();
            return Err(ManipError::ServerClosed);
        }

        tracing::info!(goal_id = %id, object_id = goal.object_id, is_pick = goal.is_pick, "Goal accepted");
        Ok(GoalHandle {
            id,
            feedback: fb_rx,
            result: res_rx,
        })
    }

    /// 取消当前目标；没有目标在执行时返回 false
    pub fn cancel(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(active) => {
                tracing::info!(goal_id = %active.id, "Cancel requested");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn active_goal_id(&self) -> Option<String> {
        lock(&self.active).as_ref().map(|a| a.id.clone())
    }

    /// 停止接收目标，取消当前目标并等待 worker 退出（任一克隆调用都会等待）
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stopped.cancelled().await;
    }
}

async fn worker(
    mut orchestrator: Orchestrator,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    active: ActiveSlot,
    shutdown: CancellationToken,
    stopped: CancellationToken,
) {
    // 正常退出或 panic 展开时都会触发
    let _stopped = stopped.drop_guard();
    let mut closed = false;
    loop {
        let job = tokio::select! {
            job = jobs.recv() => job,
            _ = shutdown.cancelled(), if !closed => {
                // 已排队的目标仍会以取消状态执行完毕，各自得到结果
                jobs.close();
                closed = true;
                continue;
            }
        };
        let Some(job) = job else { break };

        let result = orchestrator.run(job.goal, job.cancel, &job.feedback).await;
        {
            let mut slot = lock(&active);
            if slot.as_ref().is_some_and(|a| a.id == job.id) {
                slot.take();
            }
        }
        tracing::info!(goal_id = %job.id, success = result.success, "Goal finished");
        if job.result.send(result).is_err() {
            tracing::debug!(goal_id = %job.id, "Result receiver dropped");
        }
    }
    tracing::info!("Task server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{AppConfig, ManipConfig};
    use crate::robot::{Collaborators, SimScript, SimulatedRobot};

    fn server(script: SimScript) -> (Arc<SimulatedRobot>, TaskServer) {
        let mut app = AppConfig::default();
        app.object_detection.class_list = vec!["cup".into(), "bottle".into(), "apple".into()];
        app.manipulation.settle_delay_ms = 0;
        let cfg = Arc::new(ManipConfig::from_app_config(&app).unwrap());
        let robot = Arc::new(SimulatedRobot::new(script));
        let orch = Orchestrator::new(Collaborators::from_robot(robot.clone()), cfg);
        (robot, TaskServer::start(orch))
    }

    #[tokio::test]
    async fn test_goal_ids_are_unique() {
        let (_robot, server) = server(SimScript::default());
        let a = server.send_goal(TaskGoal::pick(0)).unwrap();
        let b = server.send_goal(TaskGoal::pick(0)).unwrap();
        assert!(a.id.starts_with("goal_"));
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_idle_server_is_not_busy() {
        let (_robot, server) = server(SimScript::default());
        assert!(!server.is_busy());
        assert!(!server.cancel());

        let handle = server.send_goal(TaskGoal::pick(2)).unwrap();
        assert!(server.is_busy());
        let (result, _) = handle.outcome().await.unwrap();
        assert!(result.success);
        assert!(!server.is_busy());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_goals() {
        let (_robot, server) = server(
            SimScript::default().with_estimate_delays(Duration::from_secs(5), Duration::from_secs(5)),
        );
        let handle = server.send_goal(TaskGoal::pick(2)).unwrap();
        server.shutdown().await;

        let (result, _) = handle.outcome().await.unwrap();
        assert!(!result.success);
        assert!(matches!(server.send_goal(TaskGoal::pick(2)), Err(ManipError::ServerClosed)));
    }

    #[tokio::test]
    async fn test_every_clone_waits_for_worker_exit() {
        let (_robot, server) = server(
            SimScript::default().with_estimate_delays(Duration::from_secs(5), Duration::from_secs(5)),
        );
        let mut handle = server.send_goal(TaskGoal::pick(2)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = server.clone();
        let first_done = tokio::spawn(async move { first.shutdown().await });
        tokio::task::yield_now().await;

        server.shutdown().await;
        assert!(!server.is_busy());
        assert!(!handle.result.try_recv().unwrap().success);
        first_done.await.unwrap();
    }
}
