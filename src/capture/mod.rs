// 采集模块 - 从视频设备获取当前帧并编码为JPEG

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ColorType, DynamicImage, RgbaImage};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

pub mod device;
pub mod scheduler;

pub use device::{ScreenDevice, StillImageDevice};

/// 编码后的帧
#[derive(Clone, Debug)]
pub struct EncodedImage {
    /// 编码数据
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// MIME类型
    pub mime_type: &'static str,
}

/// 采集错误
#[derive(Debug, Error)]
pub enum CaptureError {
    /// 设备暂无可用帧（初始化中或尺寸为0），跳过本次采样即可
    #[error("设备暂不可用: {0}")]
    DeviceUnavailable(String),
    /// 设备访问被拒绝，需要外部重试
    #[error("设备访问被拒绝: {0}")]
    DeviceDenied(String),
    #[error("图像编码失败: {0}")]
    Encode(#[from] image::ImageError),
    #[error("采集任务异常: {0}")]
    Worker(String),
}

/// 设备状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// 正在输出画面
    Active,
    /// 已授权但尚未产生画面
    Initializing,
    /// 未启用
    Inactive,
    /// 权限被拒绝
    Denied(String),
}

/// 视频设备端口
///
/// 设备的获取、授权和释放由外部负责，这里只按需拉取当前画面
pub trait VideoDevice: Send + Sync {
    /// 设备名称
    fn name(&self) -> &str;

    /// 当前状态
    fn status(&self) -> DeviceStatus;

    /// 读取当前画面（阻塞调用）
    fn current_frame(&self) -> Result<RgbaImage, CaptureError>;
}

/// 帧源 - 包装视频设备，输出镜像后的JPEG快照
pub struct FrameSource {
    device: Arc<dyn VideoDevice>,
    /// JPEG质量(1-100)
    image_quality: u8,
    /// 是否水平镜像
    mirror: bool,
}

impl FrameSource {
    pub fn new(device: Arc<dyn VideoDevice>, image_quality: u8, mirror: bool) -> Self {
        Self {
            device,
            image_quality: image_quality.clamp(1, 100),
            mirror,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// 设备是否处于输出状态
    pub fn is_active(&self) -> bool {
        self.device.status() == DeviceStatus::Active
    }

    /// 检查设备访问权限，被拒绝时返回原因
    pub fn check_access(&self) -> Result<(), CaptureError> {
        match self.device.status() {
            DeviceStatus::Denied(reason) => Err(CaptureError::DeviceDenied(reason)),
            _ => Ok(()),
        }
    }

    /// 获取当前帧
    pub async fn acquire(&self) -> Result<EncodedImage, CaptureError> {
        match self.device.status() {
            DeviceStatus::Active => {}
            DeviceStatus::Denied(reason) => return Err(CaptureError::DeviceDenied(reason)),
            DeviceStatus::Initializing => {
                return Err(CaptureError::DeviceUnavailable("设备初始化中".to_string()))
            }
            DeviceStatus::Inactive => {
                return Err(CaptureError::DeviceUnavailable("设备未启用".to_string()))
            }
        }

        let device = Arc::clone(&self.device);
        let quality = self.image_quality;
        let mirror = self.mirror;

        let image = tokio::task::spawn_blocking(move || {
            let frame = device.current_frame()?;
            encode_frame(frame, quality, mirror)
        })
        .await
        .map_err(|e| CaptureError::Worker(e.to_string()))??;

        trace!(
            "采集帧成功: {}x{}, {} 字节",
            image.width,
            image.height,
            image.bytes.len()
        );
        Ok(image)
    }
}

/// 镜像并编码为JPEG
pub fn encode_frame(
    frame: RgbaImage,
    quality: u8,
    mirror: bool,
) -> Result<EncodedImage, CaptureError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::DeviceUnavailable(format!(
            "画面尺寸无效: {}x{}",
            width, height
        )));
    }

    let frame = if mirror {
        imageops::flip_horizontal(&frame)
    } else {
        frame
    };

    // JPEG 不支持透明通道
    let rgb = DynamicImage::ImageRgba8(frame).to_rgb8();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)?;

    Ok(EncodedImage {
        bytes,
        width,
        height,
        mime_type: "image/jpeg",
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;

    /// 测试用设备：状态和画面可随时修改
    pub(crate) struct TestDevice {
        pub status: Mutex<DeviceStatus>,
        pub frame: Mutex<RgbaImage>,
    }

    impl TestDevice {
        pub(crate) fn active() -> Self {
            Self {
                status: Mutex::new(DeviceStatus::Active),
                frame: Mutex::new(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]))),
            }
        }

        pub(crate) fn set_status(&self, status: DeviceStatus) {
            *self.status.lock().unwrap() = status;
        }
    }

    impl VideoDevice for TestDevice {
        fn name(&self) -> &str {
            "test"
        }

        fn status(&self) -> DeviceStatus {
            self.status.lock().unwrap().clone()
        }

        fn current_frame(&self) -> Result<RgbaImage, CaptureError> {
            Ok(self.frame.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_acquire_produces_jpeg() {
        let source = FrameSource::new(Arc::new(TestDevice::active()), 80, true);
        assert!(source.is_active());

        let image = source.acquire().await.unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(image.mime_type, "image/jpeg");
        // JPEG SOI 标记
        assert_eq!(&image.bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_zero_sized_frame_is_unavailable() {
        let device = TestDevice::active();
        *device.frame.lock().unwrap() = RgbaImage::new(0, 0);
        let source = FrameSource::new(Arc::new(device), 80, true);

        assert!(matches!(
            source.acquire().await,
            Err(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_status_gates_acquire() {
        let device = Arc::new(TestDevice::active());
        let source = FrameSource::new(device.clone(), 80, false);

        device.set_status(DeviceStatus::Initializing);
        assert!(!source.is_active());
        assert!(matches!(
            source.acquire().await,
            Err(CaptureError::DeviceUnavailable(_))
        ));

        device.set_status(DeviceStatus::Denied("permission denied".to_string()));
        assert!(matches!(
            source.acquire().await,
            Err(CaptureError::DeviceDenied(_))
        ));
        assert!(source.check_access().is_err());
    }

    #[test]
    fn test_mirror_flips_horizontally() {
        // 左半白、右半黑
        let frame = RgbaImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });

        let decode = |mirror: bool| {
            let encoded = encode_frame(frame.clone(), 95, mirror).unwrap();
            assert_eq!((encoded.width, encoded.height), (16, 8));
            image::load_from_memory(&encoded.bytes).unwrap().to_rgb8()
        };

        let mirrored = decode(true);
        assert!(mirrored.get_pixel(2, 4)[0] < 64);
        assert!(mirrored.get_pixel(13, 4)[0] > 192);

        let plain = decode(false);
        assert!(plain.get_pixel(2, 4)[0] > 192);
        assert!(plain.get_pixel(13, 4)[0] < 64);
    }
}
