//! 命令模块
//!
//! 提供展示层调用的命令接口，按功能分组：
//! - control: 会话控制命令
//! - config: 配置管理命令

pub mod config;
pub mod control;

// 重新导出所有命令
pub use config::*;
pub use control::*;

#[cfg(test)]
pub(crate) mod tests {
    use crate::capture::tests::TestDevice;
    use crate::capture::EncodedImage;
    use crate::llm::{Classification, ClassificationProvider};
    use crate::models::PersistedAppConfig;
    use crate::AppState;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FistProvider;

    #[async_trait]
    impl ClassificationProvider for FistProvider {
        async fn classify_image(&self, _image: &EncodedImage) -> anyhow::Result<Classification> {
            Ok(Classification {
                label: "Fist".to_string(),
                confidence: 0.8,
                description: "Closed hand".to_string(),
                glyph: "✊".to_string(),
                suggested_action: None,
            })
        }

        fn name(&self) -> &str {
            "fist"
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    /// 使用测试设备和固定结果提供商构建应用状态
    pub(crate) fn test_state() -> (AppState, Arc<TestDevice>) {
        let device = Arc::new(TestDevice::active());
        let state = AppState::build(
            &PersistedAppConfig::default(),
            device.clone(),
            Arc::new(FistProvider),
        );
        (state, device)
    }
}
