// Session Actor - 使用Actor模式管理会话阶段和采样调度器
//
// 阶段转换与调度器装载/卸载在同一个Actor内串行执行，两者不会出现不一致

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::ResultsHandle;
use crate::capture::scheduler::CaptureScheduler;
use crate::capture::CaptureError;
use crate::event_bus::{AppEvent, EventBus};
use crate::models::SessionStatus;
use crate::session::{SessionPhase, SessionState, StartOutcome};

/// 会话命令
pub enum SessionCommand {
    /// 开始采样
    Start {
        reply: oneshot::Sender<StartOutcome>,
    },

    /// 停止采样
    Stop {
        reply: oneshot::Sender<bool>,
    },

    /// 进入失败状态
    Fail {
        reason: String,
    },

    /// 从失败状态恢复到空闲
    Reset {
        reply: oneshot::Sender<bool>,
    },

    /// 获取状态
    Get {
        reply: oneshot::Sender<SessionStatus>,
    },

    /// 健康检查
    HealthCheck {
        reply: oneshot::Sender<()>,
    },
}

/// 会话Actor
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionCommand>,
    /// 弱引用自身通道，交给采样任务用于上报设备失败，不阻止Actor在Handle全部释放后退出
    weak_sender: mpsc::WeakSender<SessionCommand>,
    state: SessionState, // 无需RwLock
    scheduler: CaptureScheduler,
    results: ResultsHandle,
    event_bus: Arc<EventBus>,
}

impl SessionActor {
    /// 创建新的Actor
    pub fn new(
        scheduler: CaptureScheduler,
        results: ResultsHandle,
        event_bus: Arc<EventBus>,
    ) -> (Self, SessionHandle) {
        let (sender, receiver) = mpsc::channel(50);
        let actor = Self {
            receiver,
            weak_sender: sender.downgrade(),
            state: SessionState::new(),
            scheduler,
            results,
            event_bus,
        };
        let handle = SessionHandle { sender };
        (actor, handle)
    }

    /// 运行Actor
    pub async fn run(mut self) {
        info!("Session Actor 已启动");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Start { reply } => {
                    let outcome = self.handle_start().await;
                    let _ = reply.send(outcome);
                }

                SessionCommand::Stop { reply } => {
                    let stopped = self.handle_stop().await;
                    let _ = reply.send(stopped);
                }

                SessionCommand::Fail { reason } => {
                    self.handle_fail(reason);
                }

                SessionCommand::Reset { reply } => {
                    let reset = self.state.reset();
                    if reset {
                        info!("会话失败状态已重置");
                        self.event_bus.publish(AppEvent::SessionReset);
                    }
                    let _ = reply.send(reset);
                }

                SessionCommand::Get { reply } => {
                    let _ = reply.send(self.status());
                }

                SessionCommand::HealthCheck { reply } => {
                    let _ = reply.send(());
                }
            }
        }

        self.scheduler.disarm();
        info!("Session Actor 已停止");
    }

    async fn handle_start(&mut self) -> StartOutcome {
        match self.state.phase() {
            SessionPhase::Running => return StartOutcome::AlreadyRunning,
            SessionPhase::Failed => {
                warn!("会话处于失败状态，需先重置: {:?}", self.state.error());
                return StartOutcome::Rejected;
            }
            SessionPhase::Idle => {}
        }

        if let Err(CaptureError::DeviceDenied(reason)) =
            self.scheduler.frame_source().check_access()
        {
            self.handle_fail(reason.clone());
            return StartOutcome::DeviceDenied(reason);
        }

        let outcome = self.state.start();
        if outcome == StartOutcome::Started {
            // 新一轮激活不显示上一轮的结果
            self.results.clear_current().await;
            self.scheduler.arm(WeakSessionHandle {
                sender: self.weak_sender.clone(),
            });

            if let Some(session_id) = self.state.session_id() {
                info!("会话已开始: {}", session_id);
                self.event_bus.publish(AppEvent::SessionStarted { session_id });
            }
        }
        outcome
    }

    async fn handle_stop(&mut self) -> bool {
        if !self.state.stop() {
            return false;
        }

        self.scheduler.disarm();
        self.results.clear_current().await;
        info!("会话已停止");
        self.event_bus.publish(AppEvent::SessionStopped);
        true
    }

    fn handle_fail(&mut self, reason: String) {
        let previous = self.state.phase();
        self.state.fail(reason.clone());
        self.scheduler.disarm();

        if previous != SessionPhase::Failed {
            error!("会话进入失败状态: {}", reason);
            self.event_bus.publish(AppEvent::SessionFailed { reason });
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.state.phase(),
            error: self.state.error().map(str::to_string),
            session_id: self.state.session_id(),
            started_at: self.state.started_at(),
            armed: self.scheduler.is_armed(),
            in_flight: self.scheduler.in_flight(),
            capture_interval_ms: self.scheduler.capture_interval().as_millis() as u64,
            stats: self.scheduler.stats(),
        }
    }
}

/// 会话Handle
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// 获取不延长Actor生命周期的弱Handle
    pub fn downgrade(&self) -> WeakSessionHandle {
        WeakSessionHandle {
            sender: self.sender.downgrade(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_sender(sender: mpsc::Sender<SessionCommand>) -> Self {
        Self { sender }
    }

    /// 开始采样
    pub async fn start(&self) -> Option<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(SessionCommand::Start { reply }).await.ok()?;
        rx.await.ok()
    }

    /// 停止采样，返回是否发生转换
    pub async fn stop(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.sender.send(SessionCommand::Stop { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 进入失败状态
    pub async fn fail(&self, reason: impl Into<String>) {
        let _ = self
            .sender
            .send(SessionCommand::Fail {
                reason: reason.into(),
            })
            .await;
    }

    /// 重置失败状态
    pub async fn reset(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.sender.send(SessionCommand::Reset { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 获取会话状态
    pub async fn get(&self) -> SessionStatus {
        let (reply, rx) = oneshot::channel();
        self.sender.send(SessionCommand::Get { reply }).await.ok();
        rx.await.unwrap_or_default()
    }

    /// 健康检查
    /// 返回true表示Actor正常运行，超时时间为5秒
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(SessionCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            warn!("Session Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!("Session Actor 健康检查失败: Actor已停止");
                false
            }
            Err(_) => {
                warn!("Session Actor 健康检查失败: 超时(5秒)");
                false
            }
        }
    }
}

/// 会话弱Handle
#[derive(Clone)]
pub struct WeakSessionHandle {
    sender: mpsc::WeakSender<SessionCommand>,
}

impl WeakSessionHandle {
    /// Actor 仍有外部Handle时返回可用的Handle
    pub fn upgrade(&self) -> Option<SessionHandle> {
        self.sender.upgrade().map(|sender| SessionHandle { sender })
    }
}
