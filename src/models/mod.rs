// 数据模型模块 - 配置与状态快照

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// 重新导出其他模块的类型
pub use crate::analysis::HistoryEntry;
pub use crate::llm::{Classification, OracleConfig};
pub use crate::session::{SessionPhase, StartOutcome};

use crate::analysis::aggregator::{DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_HISTORY_CAPACITY};

/// 应用配置（部分更新）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 采样配置
    pub capture_settings: Option<CaptureSettings>,
    /// 识别服务配置
    pub oracle_config: Option<OracleConfig>,
    /// 历史容量
    pub history_capacity: Option<usize>,
    /// 入选阈值
    pub acceptance_threshold: Option<f64>,
    /// 日志配置
    pub logger_settings: Option<LoggerSettings>,
}

/// 采样设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// 采样间隔（毫秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 图片质量(1-100)
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
    /// 是否水平镜像
    #[serde(default = "default_mirror")]
    pub mirror: bool,
    /// 视频设备
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_interval_ms() -> u64 {
    1500
}

fn default_image_quality() -> u8 {
    80
}

fn default_mirror() -> bool {
    true
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            image_quality: default_image_quality(),
            mirror: default_mirror(),
            device: DeviceConfig::default(),
        }
    }
}

/// 视频设备配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    /// 主屏幕
    #[default]
    Screen,
    /// 静态图片
    Still { path: PathBuf },
}

/// 日志设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// 日志级别: trace / debug / info / warn / error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 日志目录，为空时使用平台默认目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

/// 持久化的应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAppConfig {
    #[serde(default)]
    pub capture_settings: CaptureSettings,
    #[serde(default)]
    pub oracle_config: OracleConfig,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    #[serde(default)]
    pub logger_settings: LoggerSettings,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_acceptance_threshold() -> f64 {
    DEFAULT_ACCEPTANCE_THRESHOLD
}

impl Default for PersistedAppConfig {
    fn default() -> Self {
        Self {
            capture_settings: CaptureSettings::default(),
            oracle_config: OracleConfig::default(),
            history_capacity: default_history_capacity(),
            acceptance_threshold: default_acceptance_threshold(),
            logger_settings: LoggerSettings::default(),
        }
    }
}

impl PersistedAppConfig {
    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.capture_settings.interval_ms == 0 {
            return Err(anyhow!("采样间隔必须大于0"));
        }
        if !(1..=100).contains(&self.capture_settings.image_quality) {
            return Err(anyhow!(
                "图片质量必须在1-100之间: {}",
                self.capture_settings.image_quality
            ));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(anyhow!(
                "入选阈值必须在0-1之间: {}",
                self.acceptance_threshold
            ));
        }
        if self.history_capacity == 0 {
            return Err(anyhow!("历史容量必须大于0"));
        }
        Ok(())
    }
}

/// 调度统计快照
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatsSnapshot {
    pub ticks: u64,
    pub dropped_ticks: u64,
    pub classify_calls: u64,
    pub completed_cycles: u64,
}

/// 会话状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub error: Option<String>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    /// 调度器是否已装载
    pub armed: bool,
    /// 是否有识别请求进行中
    pub in_flight: bool,
    /// 采样间隔（毫秒）
    pub capture_interval_ms: u64,
    pub stats: SchedulerStatsSnapshot,
}

/// 结果快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSnapshot {
    pub current: Option<Classification>,
    /// 最新的在前
    pub history: Vec<HistoryEntry>,
    /// 历史容量
    pub history_capacity: usize,
    pub consecutive_errors: u32,
}

/// 展示层读取的完整快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub session: SessionStatus,
    pub results: ResultsSnapshot,
}
