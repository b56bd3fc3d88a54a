// 采样调度器 - 负责定时采样和单飞控制
//
// 装载(arm)后立即执行一次采样，之后按固定间隔触发。
// 识别调用未完成时到来的采样直接丢弃，不排队、不补发，保证同一时刻最多一个识别请求

use super::{CaptureError, FrameSource};
use crate::actors::{ResultsHandle, WeakSessionHandle};
use crate::llm::InferenceGateway;
use crate::models::SchedulerStatsSnapshot;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// 识别进行中标志
///
/// 检查与置位是一次原子的 compare_exchange，释放由 `InFlightPermit` 在 drop 时完成
#[derive(Debug, Default)]
pub struct InFlightGuard {
    flag: AtomicBool,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占用，已被占用时返回 None
    pub fn try_acquire(self: &Arc<Self>) -> Option<InFlightPermit> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit {
                guard: Arc::clone(self),
            })
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// 占用凭证，drop 时清除标志
#[derive(Debug)]
pub struct InFlightPermit {
    guard: Arc<InFlightGuard>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.guard.flag.store(false, Ordering::Release);
    }
}

/// 调度统计
#[derive(Debug, Default)]
struct SchedulerStats {
    /// 触发次数
    ticks: AtomicU64,
    /// 因识别进行中被丢弃的次数
    dropped_ticks: AtomicU64,
    /// 发出的识别请求数
    classify_calls: AtomicU64,
    /// 完成并写入结果的次数
    completed_cycles: AtomicU64,
}

impl SchedulerStats {
    fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            dropped_ticks: self.dropped_ticks.load(Ordering::Relaxed),
            classify_calls: self.classify_calls.load(Ordering::Relaxed),
            completed_cycles: self.completed_cycles.load(Ordering::Relaxed),
        }
    }
}

/// 单次采样所需的上下文
struct CycleContext {
    frame_source: Arc<FrameSource>,
    gateway: Arc<InferenceGateway>,
    results: ResultsHandle,
    /// 弱引用，不阻止会话Actor退出
    session: WeakSessionHandle,
    guard: Arc<InFlightGuard>,
    stats: Arc<SchedulerStats>,
}

/// 采样调度器
pub struct CaptureScheduler {
    frame_source: Arc<FrameSource>,
    gateway: Arc<InferenceGateway>,
    results: ResultsHandle,
    /// 采样间隔
    capture_interval: Duration,
    guard: Arc<InFlightGuard>,
    stats: Arc<SchedulerStats>,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    /// 创建新的调度器
    pub fn new(
        frame_source: Arc<FrameSource>,
        gateway: Arc<InferenceGateway>,
        results: ResultsHandle,
        capture_interval: Duration,
    ) -> Self {
        Self {
            frame_source,
            gateway,
            results,
            capture_interval,
            guard: Arc::new(InFlightGuard::new()),
            stats: Arc::new(SchedulerStats::default()),
            cancel_token: None,
            handle: None,
        }
    }

    pub fn frame_source(&self) -> &Arc<FrameSource> {
        &self.frame_source
    }

    pub fn capture_interval(&self) -> Duration {
        self.capture_interval
    }

    /// 是否已装载
    pub fn is_armed(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// 是否有识别请求未完成
    pub fn in_flight(&self) -> bool {
        self.guard.is_set()
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    /// 装载调度器，启动采样循环。已装载时返回 false
    pub fn arm(&mut self, session: WeakSessionHandle) -> bool {
        if self.is_armed() {
            return false;
        }

        let ctx = Arc::new(CycleContext {
            frame_source: Arc::clone(&self.frame_source),
            gateway: Arc::clone(&self.gateway),
            results: self.results.clone(),
            session,
            guard: Arc::clone(&self.guard),
            stats: Arc::clone(&self.stats),
        });

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            ctx,
            self.capture_interval,
            cancel_token.clone(),
        ));

        info!(
            "采样调度器已装载，间隔: {}ms, 设备: {}, 识别服务: {}",
            self.capture_interval.as_millis(),
            self.frame_source.device_name(),
            self.gateway.provider_name()
        );

        self.cancel_token = Some(cancel_token);
        self.handle = Some(handle);
        true
    }

    /// 卸载调度器：立即停止后续采样，已发出的识别请求继续完成并写入结果
    pub fn disarm(&mut self) -> bool {
        let Some(token) = self.cancel_token.take() else {
            return false;
        };
        token.cancel();
        // 循环在下一次轮询时退出，这里不等待
        self.handle.take();

        if self.in_flight() {
            info!("采样调度器已卸载，等待进行中的识别完成");
        } else {
            info!("采样调度器已卸载");
        }
        true
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn tick_loop(ctx: Arc<CycleContext>, period: Duration, cancel_token: CancellationToken) {
    // interval 的第一次 tick 立即完成，即装载后立刻采样一次
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!("采样循环退出");
                break;
            }
            _ = ticker.tick() => {
                on_tick(&ctx);
            }
        }
    }
}

fn on_tick(ctx: &Arc<CycleContext>) {
    ctx.stats.ticks.fetch_add(1, Ordering::Relaxed);

    let Some(permit) = ctx.guard.try_acquire() else {
        ctx.stats.dropped_ticks.fetch_add(1, Ordering::Relaxed);
        trace!("上一次识别尚未完成，丢弃本次采样");
        return;
    };

    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        run_cycle(&ctx, permit).await;
    });
}

async fn run_cycle(ctx: &CycleContext, permit: InFlightPermit) {
    let captured_at = Utc::now().timestamp_millis();

    let frame = match ctx.frame_source.acquire().await {
        Ok(frame) => frame,
        Err(CaptureError::DeviceUnavailable(reason)) => {
            trace!("设备暂无画面，跳过本次采样: {}", reason);
            return;
        }
        Err(CaptureError::DeviceDenied(reason)) => {
            error!("设备访问被拒绝: {}", reason);
            drop(permit);
            match ctx.session.upgrade() {
                Some(session) => session.fail(reason).await,
                None => debug!("会话已释放，忽略设备失败通知"),
            }
            return;
        }
        Err(e) => {
            warn!("采集帧失败，跳过本次采样: {}", e);
            return;
        }
    };

    ctx.stats.classify_calls.fetch_add(1, Ordering::Relaxed);
    let classification = ctx.gateway.classify(&frame).await;
    ctx.results.ingest(classification, captured_at).await;
    ctx.stats.completed_cycles.fetch_add(1, Ordering::Relaxed);

    // 结果写入后才释放
    drop(permit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{ResultsActor, SessionCommand, SessionHandle};
    use crate::analysis::ResultAggregator;
    use crate::capture::tests::TestDevice;
    use crate::capture::{DeviceStatus, EncodedImage};
    use crate::event_bus::EventBus;
    use crate::llm::{Classification, ClassificationProvider};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// 测试用提供商：固定延迟，记录并发数
    struct SlowProvider {
        latency: Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowProvider {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClassificationProvider for SlowProvider {
        async fn classify_image(&self, _image: &EncodedImage) -> anyhow::Result<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            tokio::time::sleep(self.latency).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Classification {
                label: "Fist".to_string(),
                confidence: 0.9,
                description: "Closed hand".to_string(),
                glyph: "✊".to_string(),
                suggested_action: None,
            })
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    struct Fixture {
        scheduler: CaptureScheduler,
        device: Arc<TestDevice>,
        provider: Arc<SlowProvider>,
        results: ResultsHandle,
        session: SessionHandle,
        session_rx: mpsc::Receiver<SessionCommand>,
    }

    fn fixture(latency: Duration) -> Fixture {
        let device = Arc::new(TestDevice::active());
        let provider = SlowProvider::new(latency);
        let frame_source = Arc::new(FrameSource::new(device.clone(), 80, true));
        let gateway = Arc::new(InferenceGateway::new(provider.clone()));

        let (actor, results) = ResultsActor::new(
            ResultAggregator::default(),
            Arc::new(EventBus::new(16)),
        );
        tokio::spawn(actor.run());

        let (session_tx, session_rx) = mpsc::channel(8);
        let scheduler = CaptureScheduler::new(
            frame_source,
            gateway,
            results.clone(),
            Duration::from_millis(1500),
        );

        Fixture {
            scheduler,
            device,
            provider,
            results,
            session: SessionHandle::from_sender(session_tx),
            session_rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let mut f = fixture(Duration::from_millis(100));
        assert!(f.scheduler.arm(f.session.downgrade()));
        assert!(!f.scheduler.arm(f.session.downgrade()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 1);

        let snapshot = f.results.snapshot().await;
        assert_eq!(snapshot.current.unwrap().label, "Fist");
        f.scheduler.disarm();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_inference_drops_ticks() {
        let mut f = fixture(Duration::from_millis(4000));
        f.scheduler.arm(f.session.downgrade());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        f.scheduler.disarm();

        let calls = f.provider.calls.load(Ordering::SeqCst) as u64;
        let stats = f.scheduler.stats();

        assert_eq!(f.provider.max_active.load(Ordering::SeqCst), 1);
        // 0s、4.5s、9s 三次请求，其余采样全部丢弃
        assert_eq!(calls, 3);
        assert!(calls <= (10_000f64 / 1500.0).ceil() as u64 + 1);
        assert_eq!(stats.ticks, stats.dropped_ticks + calls);
        assert!(stats.dropped_ticks >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_keeps_in_flight_result() {
        let mut f = fixture(Duration::from_millis(1000));
        f.scheduler.arm(f.session.downgrade());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.scheduler.in_flight());

        assert!(f.scheduler.disarm());
        assert!(!f.scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(!f.scheduler.in_flight());
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 1);

        let snapshot = f.results.snapshot().await;
        assert_eq!(snapshot.current.unwrap().label, "Fist");
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(f.scheduler.stats().completed_cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_device_skips_silently() {
        let mut f = fixture(Duration::from_millis(10));
        f.device.set_status(DeviceStatus::Initializing);
        f.scheduler.arm(f.session.downgrade());

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 0);
        assert!(!f.scheduler.in_flight());

        // 设备就绪后恢复采样
        f.device.set_status(DeviceStatus::Active);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 1);

        f.scheduler.disarm();
        assert!(f.results.snapshot().await.current.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_device_reports_failure() {
        let mut f = fixture(Duration::from_millis(10));
        f.device
            .set_status(DeviceStatus::Denied("camera permission denied".to_string()));
        f.scheduler.arm(f.session.downgrade());

        match f.session_rx.recv().await {
            Some(SessionCommand::Fail { reason }) => {
                assert_eq!(reason, "camera permission denied");
            }
            _ => panic!("未收到失败通知"),
        }
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 0);
        f.scheduler.disarm();
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_after_session_released_is_ignored() {
        let mut f = fixture(Duration::from_millis(10));
        f.device
            .set_status(DeviceStatus::Denied("camera permission denied".to_string()));

        let weak = f.session.downgrade();
        drop(f.session);
        drop(f.session_rx);
        assert!(weak.upgrade().is_none());

        f.scheduler.arm(weak);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.provider.calls.load(Ordering::SeqCst), 0);
        assert!(!f.scheduler.in_flight());
        f.scheduler.disarm();
    }

    #[test]
    fn test_guard_is_single_flight() {
        let guard = Arc::new(InFlightGuard::new());
        let permit = guard.try_acquire().expect("first acquire");
        assert!(guard.is_set());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_set());
        assert!(guard.try_acquire().is_some());
    }
}
