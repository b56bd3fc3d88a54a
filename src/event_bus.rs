// 事件总线 - 用于模块间解耦通信
//
// 展示层通过订阅事件观察会话阶段和识别结果
// 使用 tokio::sync::broadcast 实现事件分发

use crate::llm::Classification;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 应用事件枚举
#[derive(Debug, Clone)]
pub enum AppEvent {
    // --- 会话事件 ---

    /// 会话开始
    SessionStarted {
        session_id: Uuid,
    },

    /// 会话停止
    SessionStopped,

    /// 会话失败（设备访问被拒绝）
    SessionFailed {
        reason: String,
    },

    /// 失败状态已重置
    SessionReset,

    // --- 识别事件 ---

    /// 一次识别完成（包括 none / error）
    ClassificationCompleted {
        classification: Classification,
        captured_at: i64,
        accepted: bool,
    },
}

/// 事件总线
///
/// 支持多个订阅者同时接收事件
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃(这是正常的)
    pub fn publish(&self, event: AppEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
