// 阿里通义千问提供商实现 - 单帧手势识别

use super::plugin::*;
use super::OracleConfig;
use crate::capture::EncodedImage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use llm_json::{loads, repair_json, RepairOptions};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// API key 的环境变量回退
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// 默认任务提示词
pub const DEFAULT_GESTURE_PROMPT: &str = r#"Analyze the hand gesture in this image.
Identify one of: Thumbs Up, Thumbs Down, Peace Sign, Open Palm, Fist, Pointing, OK Sign, Rock On, Call Me, Wave.
If no hand or no clear gesture is visible, use the label "None".
Respond with a single JSON object and nothing else:
{"label": string, "confidence": number between 0 and 1, "description": string, "glyph": a single emoji for the gesture, "suggestedAction": optional string}"#;

/// Qwen提供商（阿里通义千问，OpenAI 兼容接口）
pub struct QwenProvider {
    api_key: Option<String>,
    model: String,
    client: Client,
    base_url: String,
    prompt: String,
}

impl QwenProvider {
    /// 创建新的Qwen提供商（接受共享的HTTP客户端以复用连接池）
    pub fn new(client: Client) -> Self {
        Self {
            api_key: None,
            model: super::default_model(),
            client,
            base_url: super::default_base_url(),
            prompt: DEFAULT_GESTURE_PROMPT.to_string(),
        }
    }

    /// 按配置创建
    pub fn from_config(client: Client, config: &OracleConfig) -> Self {
        let mut provider = Self::new(client);
        provider.configure(config);
        provider
    }

    /// 应用配置
    pub fn configure(&mut self, config: &OracleConfig) {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()));

        match api_key {
            Some(key) => {
                info!("✓ Qwen API key 已设置 (长度: {} 字符)", key.len());
                self.api_key = Some(key);
            }
            None => warn!("✗ 未配置 Qwen API key，识别请求将全部失败"),
        }

        self.model = config.model.clone();
        self.base_url = config.base_url.trim_end_matches('/').to_string();
        if let Some(prompt) = config.prompt.as_ref().filter(|p| !p.trim().is_empty()) {
            self.prompt = prompt.clone();
        }

        info!(
            "✓ Qwen提供商配置完成: model={}, base_url={}, api_key_configured={}",
            self.model,
            self.base_url,
            self.api_key.is_some()
        );
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request_body(&self, image: &EncodedImage) -> Value {
        let image_url = format!(
            "data:{};base64,{}",
            image.mime_type,
            general_purpose::STANDARD.encode(&image.bytes)
        );

        json!({
            "model": self.model,
            "response_format": {"type": "json_object"},  // 保证结构化输出
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image_url",
                            "image_url": { "url": image_url }
                        },
                        {
                            "type": "text",
                            "text": self.prompt
                        }
                    ]
                }
            ],
            "max_tokens": 300,
            "temperature": 0.2
        })
    }

    /// 调用Qwen API，返回模型输出的文本内容
    async fn call_qwen_api(&self, image: &EncodedImage) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Qwen API key未配置"))?;

        let start_time = std::time::Instant::now();
        let request_body = self.build_request_body(image);

        debug!(
            "调用Qwen API: model={}, base_url={}, 图片 {} 字节",
            self.model,
            self.base_url,
            image.bytes.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Qwen API错误: {} {}", status, error_text);
            return Err(anyhow!("Qwen API调用失败: {} {}", status, error_text));
        }

        let response_data: QwenResponse = response.json().await?;
        debug!("Qwen API 响应耗时 {}ms", start_time.elapsed().as_millis());

        let choice = response_data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Qwen API 响应中没有 choices"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("LLM 响应因达到 token 限制而被截断 (finish_reason=length)");
        }

        choice
            .message
            .content
            .ok_or_else(|| anyhow!(OracleError::EmptyContent))
    }
}

/// 解析模型输出文本为识别结果
///
/// 先尝试严格解析，失败后去掉代码块标记并用 llm_json 修复
pub fn parse_classification_content(content: &str) -> Result<Classification, OracleError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(OracleError::EmptyContent);
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let cleaned = strip_code_fence(trimmed);
            let repaired = repair_json(cleaned, &RepairOptions::default())
                .map_err(|e| OracleError::Unparseable(e.to_string()))?;
            loads(&repaired, &RepairOptions::default())
                .map_err(|e| OracleError::Unparseable(e.to_string()))?
        }
    };

    Classification::from_oracle_value(&value)
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl ClassificationProvider for QwenProvider {
    async fn classify_image(&self, image: &EncodedImage) -> Result<Classification> {
        let content = self.call_qwen_api(image).await?;
        let classification = parse_classification_content(&content)?;
        debug!(
            "Qwen 识别结果: {} ({:.2})",
            classification.label, classification.confidence
        );
        Ok(classification)
    }

    fn name(&self) -> &str {
        "Qwen"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            vision_support: true,
            supported_image_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct QwenResponse {
    choices: Vec<QwenChoice>,
}

#[derive(Debug, Deserialize)]
struct QwenChoice {
    message: QwenMessage,
    finish_reason: Option<String>, // 完成原因：stop, length, etc
}

#[derive(Debug, Deserialize)]
struct QwenMessage {
    content: Option<String>,
}
