//! 데드맨 스위치.
//!
//! 하트비트가 제한 시간 안에 오지 않으면 모든 주문을 한 번 취소합니다.
//! 무장할 때마다 하나의 `tokio` 타이머 작업이 만들어지고, 재무장하면 이전 작업은
//! 중단됩니다. 만료 시에는 잠금 아래에서 세대 번호를 다시 확인하므로 늦게 도착한
//! 하트비트가 있어도 두 번 발사되지 않습니다.
//!
//! 만료 판단은 `tokio` 시계(`Instant`)만 사용합니다. `SwitchState::Armed`의
//! `deadline`은 같은 시점의 벽시계 표시값이며 발사 시각을 결정하지 않습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};
use trader_core::ValidationError;

use crate::error::FacadeError;

/// 기본 최대 제한 시간 (24시간).
pub const DEFAULT_MAX_SWITCH_TIMEOUT: Duration = Duration::from_secs(86_400);

/// 만료 시 호출되는 전체 취소 경로.
#[async_trait]
pub trait CancelAllHandler: Send + Sync {
    /// 모든 주문을 취소하고 취소된 수를 반환합니다.
    async fn cancel_all(&self) -> Result<usize, FacadeError>;
}

/// 스위치 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SwitchState {
    Disarmed,
    /// `deadline`은 참고용 벽시계 시각
    Armed { deadline: DateTime<Utc> },
}

impl SwitchState {
    pub fn is_armed(&self) -> bool {
        matches!(self, SwitchState::Armed { .. })
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            SwitchState::Armed { deadline } => Some(*deadline),
            SwitchState::Disarmed => None,
        }
    }
}

/// 만료 시 전체 취소 실패.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchFailure {
    pub fired_at: DateTime<Utc>,
    pub error: String,
}

#[derive(Debug)]
struct SwitchInner {
    generation: u64,
    state: SwitchState,
    timeout: Option<Duration>,
    expires_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

/// 세션 단위 데드맨 스위치.
pub struct DeadMansSwitch {
    handler: Arc<dyn CancelAllHandler>,
    inner: Arc<Mutex<SwitchInner>>,
    fired: Arc<AtomicU64>,
    failures: broadcast::Sender<SwitchFailure>,
    max_timeout: Duration,
}

fn lock(inner: &Mutex<SwitchInner>) -> MutexGuard<'_, SwitchInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeadMansSwitch {
    pub fn new(handler: Arc<dyn CancelAllHandler>) -> Self {
        let (failures, _) = broadcast::channel(64);
        Self {
            handler,
            inner: Arc::new(Mutex::new(SwitchInner {
                generation: 0,
                state: SwitchState::Disarmed,
                timeout: None,
                expires_at: None,
                timer: None,
            })),
            fired: Arc::new(AtomicU64::new(0)),
            failures,
            max_timeout: DEFAULT_MAX_SWITCH_TIMEOUT,
        }
    }

    /// 허용하는 최대 제한 시간을 설정합니다.
    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// 스위치를 무장하거나 마감 시각을 교체합니다. `timeout`이 0이면 해제합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    ///
    /// # Errors
    /// `timeout`이 최대 제한 시간을 넘으면 `timeout_secs` 필드의 `ValidationError`.
    /// 이때 기존 상태는 바뀌지 않습니다.
    pub fn arm(&self, timeout: Duration) -> Result<SwitchState, ValidationError> {
        if timeout.is_zero() {
            return Ok(self.disarm());
        }
        if timeout > self.max_timeout {
            return Err(ValidationError::new(
                "timeout_secs",
                format!(
                    "제한 시간 {}초가 최대값 {}초를 초과합니다",
                    timeout.as_secs(),
                    self.max_timeout.as_secs()
                ),
            ));
        }
        let deadline = wall_deadline(timeout)?;

        let mut inner = lock(&self.inner);
        Ok(self.schedule(&mut inner, timeout, deadline))
    }

    /// 마지막 무장 시간으로 마감 시각을 연장합니다. 해제 상태면 아무것도 하지 않습니다.
    pub fn heartbeat(&self) -> SwitchState {
        let mut inner = lock(&self.inner);
        let Some(timeout) = inner.timeout else {
            return inner.state;
        };
        match wall_deadline(timeout) {
            Ok(deadline) => self.schedule(&mut inner, timeout, deadline),
            Err(e) => {
                warn!(reason = %e.reason, "Heartbeat ignored");
                inner.state
            }
        }
    }

    pub fn disarm(&self) -> SwitchState {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        if inner.state.is_armed() {
            info!("Dead man's switch disarmed");
        }
        inner.state = SwitchState::Disarmed;
        inner.timeout = None;
        inner.expires_at = None;
        inner.state
    }

    /// 이전 타이머를 중단하고 새 세대의 타이머를 시작합니다.
    fn schedule(
        &self,
        inner: &mut SwitchInner,
        timeout: Duration,
        deadline: DateTime<Utc>,
    ) -> SwitchState {
        inner.generation += 1;
        let generation = inner.generation;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }

        let expires_at = Instant::now() + timeout;
        inner.state = SwitchState::Armed { deadline };
        inner.timeout = Some(timeout);
        inner.expires_at = Some(expires_at);
        inner.timer = Some(tokio::spawn(expire_at(
            expires_at,
            generation,
            Arc::clone(&self.inner),
            Arc::clone(&self.handler),
            Arc::clone(&self.fired),
            self.failures.clone(),
        )));

        info!(
            timeout_secs = timeout.as_secs(),
            %deadline,
            "Dead man's switch armed"
        );
        inner.state
    }

    pub fn state(&self) -> SwitchState {
        lock(&self.inner).state
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.state().deadline()
    }

    /// 현재 무장에 사용된 제한 시간.
    pub fn timeout(&self) -> Option<Duration> {
        lock(&self.inner).timeout
    }

    /// 발사까지 남은 시간 (`tokio` 시계 기준).
    pub fn remaining(&self) -> Option<Duration> {
        lock(&self.inner)
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// 만료로 전체 취소가 발사된 횟수.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Acquire)
    }

    /// 만료 시 전체 취소 실패를 구독합니다.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<SwitchFailure> {
        self.failures.subscribe()
    }
}

impl Drop for DeadMansSwitch {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.inner).timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for DeadMansSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadMansSwitch")
            .field("state", &self.state())
            .field("fired", &self.fired_count())
            .finish()
    }
}

fn wall_deadline(timeout: Duration) -> Result<DateTime<Utc>, ValidationError> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| Utc::now().checked_add_signed(timeout))
        .ok_or_else(|| {
            ValidationError::new(
                "timeout_secs",
                format!("제한 시간 {}초를 시각으로 표현할 수 없습니다", timeout.as_secs()),
            )
        })
}

async fn expire_at(
    expires_at: Instant,
    generation: u64,
    inner: Arc<Mutex<SwitchInner>>,
    handler: Arc<dyn CancelAllHandler>,
    fired: Arc<AtomicU64>,
    failures: broadcast::Sender<SwitchFailure>,
) {
    tokio::time::sleep_until(expires_at).await;

    let timeout = {
        let mut guard = lock(&inner);
        if guard.generation != generation {
            return;
        }
        // 이후의 재무장이 진행 중인 취소를 중단하지 않도록 핸들을 떼어냅니다.
        guard.state = SwitchState::Disarmed;
        guard.expires_at = None;
        guard.timer = None;
        guard.timeout.take()
    };

    fired.fetch_add(1, Ordering::AcqRel);
    warn!(
        timeout_secs = timeout.map(|t| t.as_secs()),
        "Dead man's switch expired, canceling all orders"
    );

    match handler.cancel_all().await {
        Ok(count) => info!(count, "Dead man's switch cancel-all completed"),
        Err(e) => {
            error!(error = %e, "Dead man's switch cancel-all failed");
            let _ = failures.send(SwitchFailure {
                fired_at: Utc::now(),
                error: e.to_string(),
            });
        }
    }
}
