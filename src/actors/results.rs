// Results Actor - 使用Actor模式管理当前结果和历史记录
//
// 聚合器只由本Actor持有，所有写入经由消息串行化，保证写入顺序即调用完成顺序

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::analysis::ResultAggregator;
use crate::event_bus::{AppEvent, EventBus};
use crate::llm::Classification;
use crate::models::ResultsSnapshot;

/// 连续失败达到该次数时输出告警
const ERROR_STREAK_WARN_EVERY: u32 = 10;

/// 结果命令
pub enum ResultsCommand {
    /// 写入一次识别结果
    Ingest {
        classification: Classification,
        captured_at: i64,
        reply: oneshot::Sender<bool>,
    },

    /// 清空当前结果（历史保留）
    ClearCurrent {
        reply: oneshot::Sender<()>,
    },

    /// 获取快照
    Snapshot {
        reply: oneshot::Sender<ResultsSnapshot>,
    },

    /// 健康检查
    HealthCheck {
        reply: oneshot::Sender<()>,
    },
}

/// 结果Actor
pub struct ResultsActor {
    receiver: mpsc::Receiver<ResultsCommand>,
    aggregator: ResultAggregator, // 无需Mutex
    event_bus: Arc<EventBus>,
}

impl ResultsActor {
    /// 创建新的Actor
    pub fn new(aggregator: ResultAggregator, event_bus: Arc<EventBus>) -> (Self, ResultsHandle) {
        let (sender, receiver) = mpsc::channel(50);
        let actor = Self {
            receiver,
            aggregator,
            event_bus,
        };
        let handle = ResultsHandle { sender };
        (actor, handle)
    }

    /// 运行Actor
    pub async fn run(mut self) {
        info!("Results Actor 已启动");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                ResultsCommand::Ingest {
                    classification,
                    captured_at,
                    reply,
                } => {
                    let accepted = self.aggregator.ingest(classification.clone(), captured_at);

                    if accepted {
                        debug!(
                            "写入历史: {} {} ({:.2}), 历史 {} 条",
                            classification.glyph,
                            classification.label,
                            classification.confidence,
                            self.aggregator.history().len()
                        );
                    }

                    let streak = self.aggregator.consecutive_errors();
                    if streak > 0 && streak % ERROR_STREAK_WARN_EVERY == 0 {
                        warn!("识别服务已连续失败 {} 次", streak);
                    }

                    self.event_bus.publish(AppEvent::ClassificationCompleted {
                        classification,
                        captured_at,
                        accepted,
                    });
                    let _ = reply.send(accepted);
                }

                ResultsCommand::ClearCurrent { reply } => {
                    self.aggregator.clear_current();
                    let _ = reply.send(());
                }

                ResultsCommand::Snapshot { reply } => {
                    let _ = reply.send(ResultsSnapshot {
                        current: self.aggregator.current().cloned(),
                        history: self.aggregator.history().to_vec(),
                        history_capacity: self.aggregator.history().capacity(),
                        consecutive_errors: self.aggregator.consecutive_errors(),
                    });
                }

                ResultsCommand::HealthCheck { reply } => {
                    let _ = reply.send(());
                }
            }
        }

        info!("Results Actor 已停止");
    }
}

/// 结果Handle
#[derive(Clone)]
pub struct ResultsHandle {
    sender: mpsc::Sender<ResultsCommand>,
}

impl ResultsHandle {
    /// 写入识别结果，返回是否进入历史
    pub async fn ingest(&self, classification: Classification, captured_at: i64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(ResultsCommand::Ingest {
                classification,
                captured_at,
                reply,
            })
            .await
            .is_err()
        {
            warn!("Results Actor 已停止，识别结果被丢弃");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 清空当前结果
    pub async fn clear_current(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(ResultsCommand::ClearCurrent { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// 获取快照
    pub async fn snapshot(&self) -> ResultsSnapshot {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ResultsCommand::Snapshot { reply }).await.ok();
        rx.await.unwrap_or_default()
    }

    /// 健康检查
    /// 返回true表示Actor正常运行，超时时间为5秒
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(ResultsCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            warn!("Results Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!("Results Actor 健康检查失败: Actor已停止");
                false
            }
            Err(_) => {
                warn!("Results Actor 健康检查失败: 超时(5秒)");
                false
            }
        }
    }
}
