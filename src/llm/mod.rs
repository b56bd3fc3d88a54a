// LLM模块 - 远程手势识别服务的接入层

pub mod plugin;
pub mod qwen;

pub use plugin::{Classification, ClassificationProvider, OracleError, ProviderCapabilities};
pub use qwen::QwenProvider;

use crate::capture::EncodedImage;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 识别服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// 当前使用的 provider: "qwen" 或 "openai"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 为空时回退到环境变量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// 覆盖默认提示词
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// 单次识别超时（秒），为空表示不限制
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            prompt: None,
            request_timeout_secs: None,
        }
    }
}

fn default_provider() -> String {
    "qwen".to_string()
}

pub(crate) fn default_model() -> String {
    "qwen-vl-max-latest".to_string()
}

pub(crate) fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

/// 根据配置创建提供商
pub fn build_provider(
    client: reqwest::Client,
    config: &OracleConfig,
) -> anyhow::Result<Arc<dyn ClassificationProvider>> {
    let provider: Arc<dyn ClassificationProvider> = match config.provider.as_str() {
        // "openai" 是 Qwen 的别名（因为使用 OpenAI 兼容接口）
        "qwen" | "openai" => Arc::new(QwenProvider::from_config(client, config)),
        other => return Err(anyhow!("未知的 provider: {}", other)),
    };

    ensure_frame_support(provider.as_ref())?;
    Ok(provider)
}

/// 采样帧固定为 JPEG，提供商必须支持视觉输入和该格式
fn ensure_frame_support(provider: &dyn ClassificationProvider) -> anyhow::Result<()> {
    let capabilities = provider.capabilities();
    if !capabilities.vision_support {
        return Err(anyhow!("{} 不支持图像输入", provider.name()));
    }
    if !capabilities
        .supported_image_formats
        .iter()
        .any(|format| format.eq_ignore_ascii_case("jpeg"))
    {
        return Err(anyhow!("{} 不支持 JPEG 图像", provider.name()));
    }
    Ok(())
}

/// 识别网关
///
/// 每次调用只向提供商发送一次请求。任何传输、解析或服务端错误都不会向上传播，
/// 而是替换为固定的错误占位结果，保证采样循环不会因识别失败而中断
pub struct InferenceGateway {
    provider: Arc<dyn ClassificationProvider>,
    request_timeout: Option<Duration>,
}

impl InferenceGateway {
    pub fn new(provider: Arc<dyn ClassificationProvider>) -> Self {
        Self {
            provider,
            request_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 识别一帧图像，失败时返回占位结果
    pub async fn classify(&self, image: &EncodedImage) -> Classification {
        let started = std::time::Instant::now();

        let result = match self.request_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.provider.classify_image(image)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("识别超时 (> {}ms)", limit.as_millis())),
                }
            }
            None => self.provider.classify_image(image).await,
        };

        match result {
            Ok(classification) => {
                debug!(
                    "{} 识别完成: {} ({:.2}), 耗时 {}ms",
                    self.provider.name(),
                    classification.label,
                    classification.confidence,
                    started.elapsed().as_millis()
                );
                classification
            }
            Err(e) => {
                warn!(
                    "{} 识别失败，使用占位结果: {:#} (耗时 {}ms)",
                    self.provider.name(),
                    e,
                    started.elapsed().as_millis()
                );
                Classification::error_sentinel()
            }
        }
    }
}
