//! 配置管理命令
//!
//! 配置修改写回文件，下次启动时生效

use crate::models::{AppConfig, PersistedAppConfig};
use crate::AppState;
use tracing::info;

/// 获取应用配置
pub async fn get_app_config(state: &AppState) -> Result<PersistedAppConfig, String> {
    let settings = state
        .settings
        .as_ref()
        .ok_or_else(|| "配置未加载".to_string())?;
    Ok(settings.get().await)
}

/// 更新配置
pub async fn update_config(
    state: &AppState,
    config: AppConfig,
) -> Result<PersistedAppConfig, String> {
    let settings = state
        .settings
        .as_ref()
        .ok_or_else(|| "配置未加载".to_string())?;

    let updated = settings.update(config).await.map_err(|e| e.to_string())?;
    info!("配置已更新，将在下次启动时生效");
    Ok(updated)
}
