//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANIP__*` 覆盖（双下划线表示嵌套，如 `MANIP__MANIPULATION__N_MAX_PICK_ATTEMPTS=5`）。
//! 启动时加载一次并转换为不可变的 [`ManipConfig`]，运行期只读共享。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 配置加载 / 校验错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid config value `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub object_detection: ObjectDetectionSection,
    pub manipulation: ManipulationSection,
}

/// [object_detection] 段：类别标签表，下标即 objectId
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObjectDetectionSection {
    #[serde(default)]
    pub class_list: Vec<String>,
}

/// [manipulation] 段：重试上限、按类别的偏移与接触策略、放置余量与各类等待时间
#[derive(Debug, Clone, Deserialize)]
pub struct ManipulationSection {
    #[serde(default = "default_max_attempts")]
    pub n_max_servo_attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub n_max_pick_attempts: u32,
    /// 类别名 -> 抓取中心偏移 [dx, dy, dz]
    #[serde(default)]
    pub offsets: HashMap<String, Vec<f64>>,
    /// 类别名 -> 是否「移动直到接触」
    #[serde(default)]
    pub contact: HashMap<String, bool>,
    /// 从竖直偏移中扣除的固定安全量（米）
    #[serde(default = "default_grasp_safety_bias")]
    pub grasp_safety_bias: f64,
    /// 放置高度额外余量（米）
    #[serde(default = "default_place_clearance")]
    pub place_clearance: f64,
    /// 放置前重新定位后的稳定等待（毫秒）
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// 等待抓取 / 支撑面估计的超时（毫秒）
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_grasp_safety_bias() -> f64 {
    0.02
}

fn default_place_clearance() -> f64 {
    0.1
}

fn default_settle_delay_ms() -> u64 {
    5000
}

fn default_join_timeout_ms() -> u64 {
    10_000
}

impl Default for ManipulationSection {
    fn default() -> Self {
        Self {
            n_max_servo_attempts: default_max_attempts(),
            n_max_pick_attempts: default_max_attempts(),
            offsets: HashMap::new(),
            contact: HashMap::new(),
            grasp_safety_bias: default_grasp_safety_bias(),
            place_clearance: default_place_clearance(),
            settle_delay_ms: default_settle_delay_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

/// 单个物体类别的抓取参数
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProfile {
    pub name: String,
    pub offset: [f64; 3],
    pub move_until_contact: bool,
}

/// 运行期使用的不可变配置（由 AppConfig 校验转换而来）
#[derive(Debug, Clone, PartialEq)]
pub struct ManipConfig {
    profiles: Vec<ObjectProfile>,
    pub max_alignment_attempts: u32,
    pub max_pick_attempts: u32,
    pub grasp_safety_bias: f64,
    pub place_clearance: f64,
    pub settle_delay: Duration,
    pub join_timeout: Duration,
}

impl ManipConfig {
    /// 校验并转换原始配置；类别缺少偏移时用零向量，缺少接触标志时为 false
    pub fn from_app_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let m = &cfg.manipulation;
        if cfg.object_detection.class_list.is_empty() {
            return Err(invalid("object_detection.class_list", "must not be empty"));
        }
        if m.n_max_servo_attempts == 0 {
            return Err(invalid("manipulation.n_max_servo_attempts", "must be at least 1"));
        }
        if m.n_max_pick_attempts == 0 {
            return Err(invalid("manipulation.n_max_pick_attempts", "must be at least 1"));
        }
        for (key, value) in [
            ("manipulation.grasp_safety_bias", m.grasp_safety_bias),
            ("manipulation.place_clearance", m.place_clearance),
        ] {
            if !value.is_finite() {
                return Err(invalid(key, "must be a finite number"));
            }
        }

        let mut profiles = Vec::with_capacity(cfg.object_detection.class_list.len());
        for name in &cfg.object_detection.class_list {
            let offset = match m.offsets.get(name).map(Vec::as_slice) {
                Some(&[dx, dy, dz]) if [dx, dy, dz].iter().all(|v| v.is_finite()) => [dx, dy, dz],
                Some(_) => {
                    return Err(invalid(
                        &format!("manipulation.offsets.{name}"),
                        "must be three finite numbers",
                    ))
                }
                None => {
                    tracing::warn!(class = %name, "No grasp offset configured, using zero offset");
                    [0.0; 3]
                }
            };
            let move_until_contact = m.contact.get(name).copied().unwrap_or_else(|| {
                tracing::warn!(class = %name, "No contact flag configured, defaulting to false");
                false
            });
            profiles.push(ObjectProfile {
                name: name.clone(),
                offset,
                move_until_contact,
            });
        }

        Ok(Self {
            profiles,
            max_alignment_attempts: m.n_max_servo_attempts,
            max_pick_attempts: m.n_max_pick_attempts,
            grasp_safety_bias: m.grasp_safety_bias,
            place_clearance: m.place_clearance,
            settle_delay: Duration::from_millis(m.settle_delay_ms),
            join_timeout: Duration::from_millis(m.join_timeout_ms),
        })
    }

    /// 按 objectId（类别表下标）查找类别参数
    pub fn object_profile(&self, object_id: i64) -> Option<&ObjectProfile> {
        usize::try_from(object_id)
            .ok()
            .and_then(|idx| self.profiles.get(idx))
    }

    pub fn class_count(&self) -> usize {
        self.profiles.len()
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// 从 config 目录加载配置，环境变量 MANIP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANIP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANIP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}

/// 加载并校验，得到运行期配置
pub fn load_manip_config(config_path: Option<PathBuf>) -> Result<ManipConfig, ConfigError> {
    let app = load_config(config_path)?;
    ManipConfig::from_app_config(&app)
}
