// 手势识别监视器 - 主库

// 声明模块
pub mod actors;
pub mod analysis;
pub mod capture;
pub mod commands;
pub mod event_bus;
pub mod llm;
pub mod logger;
pub mod models;
pub mod session;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

// 导入必要的类型
use actors::{ResultsActor, ResultsHandle, SessionActor, SessionHandle};
use analysis::ResultAggregator;
use capture::scheduler::CaptureScheduler;
use capture::{FrameSource, ScreenDevice, StillImageDevice, VideoDevice};
use event_bus::{AppEvent, EventBus};
use llm::{ClassificationProvider, InferenceGateway};
use models::*;
use settings::SettingsManager;

/// 事件总线缓冲区大小
const EVENT_BUS_CAPACITY: usize = 256;

/// 应用状态
///
/// - 会话：阶段状态机与采样调度器
/// - 结果：当前结果与历史记录
/// - 事件总线：展示层订阅变化
#[derive(Clone)]
pub struct AppState {
    /// 会话Handle
    pub session: SessionHandle,
    /// 结果Handle
    pub results: ResultsHandle,
    /// 事件总线
    pub event_bus: Arc<EventBus>,
    /// 配置管理器
    pub settings: Option<Arc<SettingsManager>>,
}

impl AppState {
    /// 按配置组装各组件并启动后台Actor，必须在 tokio 运行时中调用
    pub fn build(
        config: &PersistedAppConfig,
        device: Arc<dyn VideoDevice>,
        provider: Arc<dyn ClassificationProvider>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));

        // 初始化结果聚合（使用Actor模式，无需锁）
        let aggregator =
            ResultAggregator::new(config.history_capacity, config.acceptance_threshold);
        let (results_actor, results) = ResultsActor::new(aggregator, event_bus.clone());
        tokio::spawn(results_actor.run());

        let capture = &config.capture_settings;
        let frame_source = Arc::new(FrameSource::new(
            device,
            capture.image_quality,
            capture.mirror,
        ));

        let gateway = Arc::new(
            InferenceGateway::new(provider).with_timeout(
                config
                    .oracle_config
                    .request_timeout_secs
                    .map(Duration::from_secs),
            ),
        );

        // 初始化调度器
        let scheduler = CaptureScheduler::new(
            frame_source,
            gateway,
            results.clone(),
            Duration::from_millis(capture.interval_ms),
        );

        let (session_actor, session) =
            SessionActor::new(scheduler, results.clone(), event_bus.clone());
        tokio::spawn(session_actor.run());

        Self {
            session,
            results,
            event_bus,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: Arc<SettingsManager>) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// 按配置打开视频设备
pub fn open_device(config: &DeviceConfig) -> Result<Arc<dyn VideoDevice>> {
    match config {
        DeviceConfig::Screen => Ok(Arc::new(ScreenDevice::open())),
        DeviceConfig::Still { path } => Ok(Arc::new(StillImageDevice::open(path)?)),
    }
}

/// 平台默认配置文件路径
pub fn default_config_path() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string())
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config", home)
    };
    PathBuf::from(base)
        .join("gesture-analyzer")
        .join("config.json")
}

/// 把识别事件输出到日志，作为最简单的展示层
fn spawn_event_reporter(mut receiver: broadcast::Receiver<AppEvent>) {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(AppEvent::ClassificationCompleted {
                    classification,
                    accepted,
                    ..
                }) => {
                    let marker = if accepted { "✓" } else { " " };
                    info!(
                        "{} {} {} ({:.0}%) - {}",
                        marker,
                        classification.glyph,
                        classification.label,
                        classification.confidence * 100.0,
                        classification.description
                    );
                    if let Some(action) = classification.suggested_action {
                        info!("  建议: {}", action);
                    }
                }
                Ok(AppEvent::SessionFailed { reason }) => {
                    error!("设备访问被拒绝，请检查权限后重试: {}", reason);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("事件处理落后，跳过 {} 条", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// 启动应用：加载配置、初始化日志、开始采样，Ctrl-C 停止
pub async fn run(config_path: PathBuf) -> Result<()> {
    let settings = Arc::new(SettingsManager::new(config_path).await?);
    let config = settings.get().await;

    let _log_guard = logger::init(&config.logger_settings)?;
    info!("配置文件: {:?}", settings.path());

    let device = open_device(&config.capture_settings.device)?;

    // 创建共享的 HTTP 客户端（复用连接池）
    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow!("无法创建 HTTP 客户端: {}", e))?;
    let provider = llm::build_provider(http_client, &config.oracle_config)?;
    if !provider.is_configured() {
        warn!("识别服务 {} 未配置，所有结果都将是 error", provider.name());
    }

    let state = AppState::build(&config, device, provider).with_settings(settings);
    spawn_event_reporter(state.event_bus.subscribe());

    match commands::start_capture(&state).await.map_err(|e| anyhow!(e))? {
        StartOutcome::DeviceDenied(reason) => {
            return Err(anyhow!("设备访问被拒绝: {}", reason));
        }
        outcome => info!("会话启动结果: {:?}", outcome),
    }

    info!("按 Ctrl-C 停止");
    tokio::signal::ctrl_c().await?;

    commands::stop_capture(&state).await.map_err(|e| anyhow!(e))?;
    let snapshot = commands::get_snapshot(&state).await.map_err(|e| anyhow!(e))?;
    let stats = snapshot.session.stats;
    info!(
        "已停止: 触发 {} 次, 丢弃 {} 次, 识别 {} 次, 历史 {} 条",
        stats.ticks,
        stats.dropped_ticks,
        stats.classify_calls,
        snapshot.results.history.len()
    );
    for entry in &snapshot.results.history {
        info!(
            "  {} {} {} ({:.0}%)",
            entry.captured_at,
            entry.classification.glyph,
            entry.classification.label,
            entry.classification.confidence * 100.0
        );
    }

    Ok(())
}
