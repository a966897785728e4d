//! 재시도 정책과 재시도 요청 실행기.
//!
//! 실행기는 시도마다 서명 → 전송 → 분류를 수행합니다:
//! - `Transient`: 지수 백오프 후 재시도, 한도 초과 시 `RetriesExhausted`
//! - `Rejected`: 즉시 반환
//! - `Fatal`: 즉시 반환하고 실행기를 정지 상태로 전환 (`resume` 전까지 `Halted`)
//!
//! 모든 시도는 `ExecutionReport`의 `AttemptRecord`로 호출자에게 돌아갑니다.

use crate::traits::{RequestSigner, Transport};
use crate::ExchangeError;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use trader_core::{ErrorClass, RetryConfig, VenueRequest, VenueResponse};

// ==================== 정책 ====================

/// 불변 재시도 정책.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    unsafe_max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// 지터 10%, 비멱등 요청 1회 제한으로 정책을 생성합니다.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unsafe_max_attempts: 1,
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_fraction: 0.1,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter_fraction)
        .with_unsafe_max_attempts(config.unsafe_max_attempts)
    }

    /// 재시도 없이 한 번만 시도하는 정책.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO).with_jitter(0.0)
    }

    /// 지터 비율을 설정합니다 (0.0 ~ 1.0으로 제한).
    pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// 비멱등 요청의 최대 시도 횟수를 설정합니다.
    pub fn with_unsafe_max_attempts(mut self, attempts: u32) -> Self {
        self.unsafe_max_attempts = attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn unsafe_max_attempts(&self) -> u32 {
        self.unsafe_max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// 요청 종류에 적용되는 최대 시도 횟수.
    pub fn attempts_for(&self, request: &VenueRequest) -> u32 {
        if request.is_idempotent() {
            self.max_attempts
        } else {
            self.unsafe_max_attempts.min(self.max_attempts)
        }
    }

    /// 지터 적용 전 대기 시간: `min(base * 2^(n-1), max)`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// `attempt`번째 실패 후 대기 시간.
    ///
    /// 지터를 적용한 뒤 직전 대기(`previous`)보다 짧아지지 않게 하고 `max`로 제한합니다.
    pub fn backoff(&self, attempt: u32, previous: Option<Duration>) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jittered = if self.jitter_fraction == 0.0 || nominal.is_zero() {
            nominal
        } else {
            let spread =
                rand::thread_rng().gen_range(-self.jitter_fraction..=self.jitter_fraction);
            nominal.mul_f64(1.0 + spread)
        };
        jittered
            .max(previous.unwrap_or_default())
            .min(self.max_delay)
    }
}

// ==================== 결과 ====================

/// 단일 시도의 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed(ErrorClass),
}

/// 단일 시도 기록.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1부터 시작하는 시도 번호
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// 실패 시 에러 메시지
    pub error: Option<String>,
    /// 서명부터 응답까지 걸린 시간
    pub elapsed: Duration,
    /// 이 시도 후 대기한 백오프 (다음 시도가 없으면 `None`)
    pub delay: Option<Duration>,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }
}

/// 실행 실패.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// 거래소가 요청을 거부함
    #[error("Venue rejected request: {0}")]
    Rejected(ExchangeError),

    /// 인증/서명 실패
    #[error("Fatal venue error, requests halted: {0}")]
    Fatal(ExchangeError),

    /// 재시도 한도 초과
    #[error("Retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: ExchangeError },

    /// 이전 치명적 에러로 요청이 중단된 상태
    #[error("Execution halted after a fatal error; resume required")]
    Halted,

    /// 요청과 맞지 않는 응답
    #[error("Unexpected venue response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ExecutionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ExecutionError::Rejected(_) | ExecutionError::UnexpectedResponse { .. } => {
                ErrorClass::Rejected
            }
            ExecutionError::Fatal(_) | ExecutionError::Halted => ErrorClass::Fatal,
            ExecutionError::RetriesExhausted { .. } => ErrorClass::Transient,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// 원인이 된 거래소 에러.
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            ExecutionError::Rejected(e)
            | ExecutionError::Fatal(e)
            | ExecutionError::RetriesExhausted { last: e, .. } => Some(e),
            _ => None,
        }
    }
}

/// 실행 결과와 시도 기록.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// 요청 종류 (`VenueRequest::kind`)
    pub request_kind: &'static str,
    pub result: Result<VenueResponse, ExecutionError>,
    pub attempts: Vec<AttemptRecord>,
}

impl ExecutionReport {
    /// 전송까지 간 시도 수.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// 시도 시간과 백오프 대기를 합한 전체 소요 시간.
    pub fn total_elapsed(&self) -> Duration {
        self.attempts
            .iter()
            .map(|a| a.elapsed + a.delay.unwrap_or_default())
            .sum()
    }

    /// 백오프 대기 목록.
    pub fn delays(&self) -> Vec<Duration> {
        self.attempts.iter().filter_map(|a| a.delay).collect()
    }

    pub fn into_result(self) -> Result<VenueResponse, ExecutionError> {
        self.result
    }
}

// ==================== 실행기 ====================

/// 서명 → 전송을 재시도 정책으로 감싸는 실행기.
pub struct RetryingExecutor {
    signer: Arc<dyn RequestSigner>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    halted: AtomicBool,
}

impl RetryingExecutor {
    pub fn new(
        signer: Arc<dyn RequestSigner>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            signer,
            transport,
            policy,
            halted: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 치명적 에러로 정지된 상태인지 확인합니다.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// 자격증명을 고친 뒤 요청을 재개합니다.
    pub fn resume(&self) {
        if self.halted.swap(false, Ordering::AcqRel) {
            warn!(transport = self.transport.name(), "Venue requests resumed");
        }
    }

    /// 요청을 실행합니다.
    pub async fn execute(&self, request: &VenueRequest) -> ExecutionReport {
        let request_kind = request.kind();
        let mut attempts = Vec::new();

        if self.is_halted() {
            return ExecutionReport {
                request_kind,
                result: Err(ExecutionError::Halted),
                attempts,
            };
        }

        let max_attempts = self.policy.attempts_for(request);
        let mut attempt = 0;
        let mut previous_delay = None;

        let result = loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = match self.signer.sign(request).await {
                Ok(signed) => self.transport.send(&signed).await,
                Err(e) => Err(e),
            };
            let elapsed = started.elapsed();

            let err = match outcome {
                Ok(response) => {
                    debug!(request = request_kind, attempt, ?elapsed, "Venue request succeeded");
                    attempts.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Succeeded,
                        error: None,
                        elapsed,
                        delay: None,
                    });
                    break Ok(response);
                }
                Err(err) => err,
            };

            let class = err.classify();
            let delay = (class == ErrorClass::Transient && attempt < max_attempts)
                .then(|| self.policy.backoff(attempt, previous_delay));
            previous_delay = delay.or(previous_delay);

            attempts.push(AttemptRecord {
                attempt,
                outcome: AttemptOutcome::Failed(class),
                error: Some(err.to_string()),
                elapsed,
                delay,
            });

            match (class, delay) {
                (ErrorClass::Transient, Some(delay)) => {
                    warn!(
                        request = request_kind,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient venue failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                (ErrorClass::Transient, None) => {
                    warn!(request = request_kind, attempt, error = %err, "Retries exhausted");
                    break Err(ExecutionError::RetriesExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                (ErrorClass::Rejected, _) => {
                    warn!(request = request_kind, error = %err, "Venue rejected request");
                    break Err(ExecutionError::Rejected(err));
                }
                (ErrorClass::Fatal, _) => {
                    self.halted.store(true, Ordering::Release);
                    error!(
                        request = request_kind,
                        transport = self.transport.name(),
                        error = %err,
                        "Fatal venue error, halting further requests"
                    );
                    break Err(ExecutionError::Fatal(err));
                }
            }
        };

        ExecutionReport {
            request_kind,
            result,
            attempts,
        }
    }
}
