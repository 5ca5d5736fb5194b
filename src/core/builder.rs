//! 运行时构建器：统一的初始化逻辑
//!
//! 演示入口与集成测试共用：由配置与协作方构建编排器，再启动任务服务。

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{load_manip_config, ManipConfig};
use crate::core::{ManipError, Orchestrator};
use crate::robot::Collaborators;
use crate::server::TaskServer;

/// 运行时构建器
pub struct RuntimeBuilder {
    config: Arc<ManipConfig>,
    shutdown: Option<CancellationToken>,
}

impl RuntimeBuilder {
    pub fn new(config: ManipConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: None,
        }
    }

    /// 从配置文件加载（None 时按默认路径搜索），叠加 `MANIP__*` 环境变量
    pub fn from_config_file(path: Option<PathBuf>) -> Result<Self, ManipError> {
        Ok(Self::new(load_manip_config(path)?))
    }

    /// 关联外部关闭 token（通常来自 ShutdownManager）
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build_orchestrator(&self, robot: Collaborators) -> Orchestrator {
        Orchestrator::new(robot, Arc::clone(&self.config))
    }

    /// 构建编排器并启动任务服务；必须在 tokio 运行时内调用
    pub fn start(self, robot: Collaborators) -> TaskServer {
        let orchestrator = self.build_orchestrator(robot);
        tracing::info!(
            classes = self.config.class_count(),
            max_alignment_attempts = self.config.max_alignment_attempts,
            max_pick_attempts = self.config.max_pick_attempts,
            "Starting task server"
        );
        match self.shutdown {
            Some(token) => TaskServer::with_shutdown(orchestrator, token),
            None => TaskServer::start(orchestrator),
        }
    }
}
