// 视频设备实现
//
// ScreenDevice 截取主屏幕画面，StillImageDevice 重复输出一张静态图片（用于无摄像头环境演示）

use super::{CaptureError, DeviceStatus, VideoDevice};
use anyhow::Result;
use image::RgbaImage;
use screenshots::Screen;
use std::path::Path;
use tracing::{info, warn};

/// 主屏幕设备
pub struct ScreenDevice {
    screen: Option<Screen>,
    name: String,
}

impl ScreenDevice {
    /// 打开主屏幕，失败时设备保持拒绝状态
    pub fn open() -> Self {
        match Screen::all() {
            Ok(screens) => {
                info!("检测到 {} 个屏幕", screens.len());
                let screen = screens
                    .iter()
                    .find(|s| s.display_info.is_primary)
                    .or_else(|| screens.first())
                    .cloned();

                if let Some(screen) = screen {
                    let display_info = screen.display_info;
                    info!(
                        "使用屏幕: {}x{} @ ({}, {})",
                        display_info.width, display_info.height, display_info.x, display_info.y
                    );
                }

                Self {
                    screen,
                    name: "screen".to_string(),
                }
            }
            Err(e) => {
                warn!("获取屏幕列表失败: {}", e);
                Self {
                    screen: None,
                    name: "screen".to_string(),
                }
            }
        }
    }
}

impl VideoDevice for ScreenDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> DeviceStatus {
        match self.screen {
            Some(_) => DeviceStatus::Active,
            None => DeviceStatus::Denied("未找到可用屏幕或无屏幕录制权限".to_string()),
        }
    }

    fn current_frame(&self) -> Result<RgbaImage, CaptureError> {
        let screen = self
            .screen
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceDenied("未找到可用屏幕".to_string()))?;

        screen
            .capture()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("截取屏幕失败: {}", e)))
    }
}

/// 静态图片设备
pub struct StillImageDevice {
    frame: RgbaImage,
    name: String,
}

impl StillImageDevice {
    pub fn open(path: &Path) -> Result<Self> {
        let frame = image::open(path)
            .map_err(|e| anyhow::anyhow!("读取图片失败 {:?}: {}", path, e))?
            .to_rgba8();
        info!(
            "已加载静态图片设备: {:?} ({}x{})",
            path,
            frame.width(),
            frame.height()
        );

        Ok(Self::from_image(frame, path.display().to_string()))
    }

    pub fn from_image(frame: RgbaImage, name: String) -> Self {
        Self { frame, name }
    }
}

impl VideoDevice for StillImageDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> DeviceStatus {
        if self.frame.width() == 0 || self.frame.height() == 0 {
            DeviceStatus::Initializing
        } else {
            DeviceStatus::Active
        }
    }

    fn current_frame(&self) -> Result<RgbaImage, CaptureError> {
        Ok(self.frame.clone())
    }
}
