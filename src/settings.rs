use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::{AppConfig, PersistedAppConfig};

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<PersistedAppConfig>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                match serde_json::from_slice::<PersistedAppConfig>(&bytes) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("配置文件解析失败，使用默认配置: {}", e);
                        PersistedAppConfig::default()
                    }
                }
            }
            _ => {
                let default = PersistedAppConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                info!("已创建默认配置文件: {:?}", path);
                default
            }
        };

        initial
            .validate()
            .with_context(|| format!("配置文件无效: {:?}", path))?;

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn get(&self) -> PersistedAppConfig {
        self.data.read().await.clone()
    }

    /// 合并部分配置，校验通过后写回文件
    pub async fn update(&self, update: AppConfig) -> Result<PersistedAppConfig> {
        let mut config = self.data.write().await;
        let mut next = config.clone();

        if let Some(capture) = update.capture_settings {
            next.capture_settings = capture;
        }
        if let Some(oracle) = update.oracle_config {
            next.oracle_config = oracle;
        }
        if let Some(capacity) = update.history_capacity {
            next.history_capacity = capacity;
        }
        if let Some(threshold) = update.acceptance_threshold {
            next.acceptance_threshold = threshold;
        }
        if let Some(logger) = update.logger_settings {
            next.logger_settings = logger;
        }

        next.validate()?;
        self.save(&next).await?;
        *config = next;
        Ok(config.clone())
    }

    async fn save(&self, config: &PersistedAppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
