// LLM插件系统 - 定义手势识别提供商接口和数据结构

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capture::EncodedImage;

/// 识别失败时的占位标签
pub const ERROR_LABEL: &str = "error";
/// 未检测到手势时的标签
pub const NONE_LABEL: &str = "none";
/// 占位结果的描述
pub const ERROR_DESCRIPTION: &str = "Failed to analyze frame.";
/// 占位结果的图标
pub const ERROR_GLYPH: &str = "⚠";

/// 一次识别调用的结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// 手势标签
    pub label: String,
    /// 置信度（0-1）
    pub confidence: f64,
    /// 可读描述
    pub description: String,
    /// 显示图标
    pub glyph: String,
    /// 建议动作（可选）
    #[serde(rename = "suggestedAction", skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl Classification {
    /// 识别失败时使用的固定占位结果
    pub fn error_sentinel() -> Self {
        Self {
            label: ERROR_LABEL.to_string(),
            confidence: 0.0,
            description: ERROR_DESCRIPTION.to_string(),
            glyph: ERROR_GLYPH.to_string(),
            suggested_action: None,
        }
    }

    /// 标签是否为占位值（none / error），大小写不敏感
    pub fn is_placeholder(&self) -> bool {
        let label = self.label.trim();
        label.eq_ignore_ascii_case(NONE_LABEL) || label.eq_ignore_ascii_case(ERROR_LABEL)
    }

    pub fn is_error(&self) -> bool {
        self.label.trim().eq_ignore_ascii_case(ERROR_LABEL)
    }

    /// 从模型返回的 JSON 对象构造识别结果
    ///
    /// 模型的结构化输出无法强制保证，这里逐字段校验：
    /// 必填字段必须存在且为字符串，confidence 必须是 [0, 1] 内的数字
    pub fn from_oracle_value(value: &Value) -> Result<Self, OracleError> {
        let object = value.as_object().ok_or(OracleError::NotAnObject)?;

        let label = required_str(object, "label")?;
        if label.trim().is_empty() {
            return Err(OracleError::EmptyField("label"));
        }

        let confidence = object
            .get("confidence")
            .ok_or(OracleError::MissingField("confidence"))?
            .as_f64()
            .ok_or(OracleError::InvalidConfidence)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(OracleError::ConfidenceOutOfRange(confidence));
        }

        let description = required_str(object, "description")?;
        // 兼容部分模型返回 emoji 字段
        let glyph = match object.get("glyph").or_else(|| object.get("emoji")) {
            Some(Value::String(glyph)) => glyph.clone(),
            Some(_) => return Err(OracleError::WrongType("glyph")),
            None => return Err(OracleError::MissingField("glyph")),
        };

        let suggested_action = object
            .get("suggestedAction")
            .or_else(|| object.get("suggested_action"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            label: label.trim().to_string(),
            confidence,
            description,
            glyph,
            suggested_action,
        })
    }
}

fn required_str(
    object: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<String, OracleError> {
    match object.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(OracleError::WrongType(field)),
        None => Err(OracleError::MissingField(field)),
    }
}

/// 模型响应校验错误
#[derive(Debug, Error, PartialEq)]
pub enum OracleError {
    #[error("响应不是 JSON 对象")]
    NotAnObject,
    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),
    #[error("字段类型错误: {0}")]
    WrongType(&'static str),
    #[error("字段为空: {0}")]
    EmptyField(&'static str),
    #[error("confidence 不是数字")]
    InvalidConfidence,
    #[error("confidence 超出范围: {0}")]
    ConfidenceOutOfRange(f64),
    #[error("响应内容为空")]
    EmptyContent,
    #[error("无法解析响应内容: {0}")]
    Unparseable(String),
}

/// 提供商能力描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// 是否支持视觉
    pub vision_support: bool,
    /// 支持的图片格式
    pub supported_image_formats: Vec<String>,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            vision_support: true,
            supported_image_formats: vec!["jpeg".to_string()],
        }
    }
}

/// 手势识别提供商接口
///
/// 实现方只负责一次请求、一次响应，不做重试和缓存；
/// 错误向上返回，由 `InferenceGateway` 统一吸收
#[async_trait]
pub trait ClassificationProvider: Send + Sync {
    /// 识别一帧图像
    async fn classify_image(&self, image: &EncodedImage) -> Result<Classification>;

    /// 获取提供商名称
    fn name(&self) -> &str;

    /// 检查是否已配置
    fn is_configured(&self) -> bool;

    /// 获取提供商能力
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_complete_response() {
        let value = json!({
            "label": "Thumbs Up",
            "confidence": 0.92,
            "description": "A raised thumb",
            "glyph": "👍",
            "suggestedAction": "Approve"
        });

        let result = Classification::from_oracle_value(&value).unwrap();
        assert_eq!(result.label, "Thumbs Up");
        assert_eq!(result.glyph, "👍");
        assert_eq!(result.suggested_action.as_deref(), Some("Approve"));
    }

    #[test]
    fn test_parse_emoji_alias_and_missing_action() {
        let value = json!({
            "label": "Fist",
            "confidence": 0.7,
            "description": "Closed hand",
            "emoji": "✊"
        });

        let result = Classification::from_oracle_value(&value).unwrap();
        assert_eq!(result.glyph, "✊");
        assert!(result.suggested_action.is_none());
    }

    #[test]
    fn test_reject_invalid_confidence() {
        let out_of_range = json!({
            "label": "Fist", "confidence": 1.4, "description": "", "glyph": "✊"
        });
        assert_eq!(
            Classification::from_oracle_value(&out_of_range),
            Err(OracleError::ConfidenceOutOfRange(1.4))
        );

        let as_string = json!({
            "label": "Fist", "confidence": "0.9", "description": "", "glyph": "✊"
        });
        assert_eq!(
            Classification::from_oracle_value(&as_string),
            Err(OracleError::InvalidConfidence)
        );
    }

    #[test]
    fn test_reject_missing_fields() {
        let value = json!({ "label": "Fist", "confidence": 0.9, "glyph": "✊" });
        assert_eq!(
            Classification::from_oracle_value(&value),
            Err(OracleError::MissingField("description"))
        );

        assert_eq!(
            Classification::from_oracle_value(&json!([1, 2])),
            Err(OracleError::NotAnObject)
        );
    }

    #[test]
    fn test_placeholder_labels() {
        let mut c = Classification::error_sentinel();
        assert!(c.is_placeholder());
        assert!(c.is_error());

        c.label = "None".to_string();
        assert!(c.is_placeholder());
        assert!(!c.is_error());

        c.label = "Peace".to_string();
        assert!(!c.is_placeholder());
    }
}
