//! 会话控制命令
//!
//! 展示层只通过这些命令写入状态，包括：
//! - 开始 / 停止采样
//! - 重置失败状态
//! - 读取快照与历史

use crate::models::{HistoryEntry, MonitorSnapshot, StartOutcome};
use crate::AppState;
use tracing::info;

/// 开始采样
pub async fn start_capture(state: &AppState) -> Result<StartOutcome, String> {
    let outcome = state
        .session
        .start()
        .await
        .ok_or_else(|| "会话服务不可用".to_string())?;

    match &outcome {
        StartOutcome::Started => info!("开始采样"),
        StartOutcome::AlreadyRunning => info!("采样已在进行中"),
        StartOutcome::Rejected => info!("会话处于失败状态，忽略开始请求"),
        StartOutcome::DeviceDenied(reason) => info!("设备访问被拒绝: {}", reason),
    }

    Ok(outcome)
}

/// 停止采样
pub async fn stop_capture(state: &AppState) -> Result<bool, String> {
    let stopped = state.session.stop().await;
    if stopped {
        info!("停止采样");
    }
    Ok(stopped)
}

/// 重置失败状态（用户手动重试设备访问前调用）
pub async fn reset_session(state: &AppState) -> Result<bool, String> {
    Ok(state.session.reset().await)
}

/// 获取完整快照
pub async fn get_snapshot(state: &AppState) -> Result<MonitorSnapshot, String> {
    let session = state.session.get().await;
    let results = state.results.snapshot().await;
    Ok(MonitorSnapshot { session, results })
}

/// 获取历史记录（最新的在前）
pub async fn get_history(state: &AppState) -> Result<Vec<HistoryEntry>, String> {
    Ok(state.results.snapshot().await.history)
}

/// 检查后台Actor是否正常
pub async fn health_check(state: &AppState) -> Result<bool, String> {
    let session_ok = state.session.health_check().await;
    let results_ok = state.results.health_check().await;
    Ok(session_ok && results_ok)
}
