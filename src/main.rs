//! Manip 演示入口
//!
//! 初始化日志、加载配置，针对仿真机器人执行一次抓取 / 放置，或先抓取再放置。
//!
//! 用法：`manip [--config <path>] pick <objectId>`
//!       `manip [--config <path>] place <objectId> <heightOfObject>`
//!       `manip [--config <path>] demo <objectId>`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use manip::core::{run_with_graceful_shutdown, RuntimeBuilder, ShutdownManager};
use manip::robot::{Collaborators, SimulatedRobot};
use manip::{observability, TaskGoal, TaskResult, TaskServer};

#[derive(Debug, Parser)]
#[command(name = "manip", about = "抓取 / 放置任务编排演示（仿真机器人）")]
struct Cli {
    /// 额外的配置文件（叠加在 config/default.toml 之上）
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum CliCommand {
    /// 抓取 objectId 对应的物体
    Pick { object_id: i64 },
    /// 放置物体，heightOfObject 来自此前的抓取结果
    Place { object_id: i64, height_of_object: f64 },
    /// 先抓取，成功后用得到的物体高度放置
    Demo { object_id: i64 },
}

async fn execute(server: &TaskServer, goal: TaskGoal) -> anyhow::Result<TaskResult> {
    let handle = server.send_goal(goal)?;
    let goal_id = handle.id.clone();
    let (result, feedback) = handle.outcome().await?;
    tracing::info!(goal_id = %goal_id, feedback = feedback.len(), "Goal settled");
    println!("{}", serde_json::to_string(&result)?);
    Ok(result)
}

async fn run_command(server: &TaskServer, command: CliCommand) -> anyhow::Result<()> {
    match command {
        CliCommand::Pick { object_id: id } => {
            execute(server, TaskGoal::pick(id)).await?;
        }
        CliCommand::Place {
            object_id: id,
            height_of_object,
        } => {
            execute(server, TaskGoal::place(id, height_of_object)).await?;
        }
        CliCommand::Demo { object_id: id } => {
            let picked = execute(server, TaskGoal::pick(id)).await?;
            if !picked.success {
                bail!("pick failed, skipping place");
            }
            execute(server, TaskGoal::place(id, picked.height_of_object)).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let shutdown = Arc::new(ShutdownManager::new());
    let runtime = RuntimeBuilder::from_config_file(cli.config)
        .context("Failed to load config")?
        .with_shutdown(shutdown.token());

    let robot = Arc::new(SimulatedRobot::default());
    let server = runtime.start(Collaborators::from_robot(robot));

    match run_with_graceful_shutdown(Arc::clone(&shutdown), &server, run_command(&server, cli.command)).await {
        Some(outcome) => outcome,
        None => {
            tracing::info!(reason = ?shutdown.reason(), "Interrupted, active goal preempted");
            Ok(())
        }
    }
}
