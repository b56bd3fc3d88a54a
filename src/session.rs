// 会话状态机 - Idle / Running / Failed
//
// 只负责阶段转换本身，清空当前结果、启停调度器由 SessionActor 根据转换结果执行

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    Failed,
}

/// start() 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome", content = "reason")]
pub enum StartOutcome {
    /// 进入运行状态
    Started,
    /// 已在运行，无操作
    AlreadyRunning,
    /// 处于失败状态，需先 reset
    Rejected,
    /// 设备访问被拒绝，已进入失败状态
    DeviceDenied(String),
}

/// 会话状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    phase: SessionPhase,
    /// 最近一次失败原因
    error: Option<String>,
    /// 本次运行的会话ID
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Idle → Running；Running 时无操作；Failed 时拒绝
    pub fn start(&mut self) -> StartOutcome {
        match self.phase {
            SessionPhase::Running => StartOutcome::AlreadyRunning,
            SessionPhase::Failed => StartOutcome::Rejected,
            SessionPhase::Idle => {
                self.phase = SessionPhase::Running;
                self.error = None;
                self.session_id = Some(Uuid::new_v4());
                self.started_at = Some(Utc::now());
                StartOutcome::Started
            }
        }
    }

    /// Running → Idle，返回是否发生转换
    pub fn stop(&mut self) -> bool {
        if self.phase != SessionPhase::Running {
            return false;
        }
        self.phase = SessionPhase::Idle;
        self.session_id = None;
        self.started_at = None;
        true
    }

    /// 任意状态 → Failed，返回转换前是否在运行
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let was_running = self.is_running();
        self.phase = SessionPhase::Failed;
        self.error = Some(reason.into());
        self.session_id = None;
        self.started_at = None;
        was_running
    }

    /// Failed → Idle，清除失败原因
    pub fn reset(&mut self) -> bool {
        if self.phase != SessionPhase::Failed {
            return false;
        }
        self.phase = SessionPhase::Idle;
        self.error = None;
        true
    }
}
