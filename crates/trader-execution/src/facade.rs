//! 실행 파사드.
//!
//! 검증기 → 레지스트리 등록 → 재시도 실행기 → 레지스트리 전이 순서로 주문을
//! 처리하는 공개 API입니다. 데드맨 스위치는 만료 시 같은 전체 취소 경로를 사용합니다.
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_core::AppConfig;
//! use trader_execution::ExecutionFacade;
//! use rust_decimal_macros::dec;
//!
//! let facade = ExecutionFacade::from_config(&AppConfig::load_default()?)?;
//! let order = facade.limit_buy("XBTUSD", dec!(0.001), dec!(35000)).await?;
//! facade.arm_dead_mans_switch(60).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};
use trader_core::{
    normalize_pair, order_span, Amount, AppConfig, CancelTarget, ErrorClass, InstrumentBoard,
    Order, OrderAck, OrderEvent, OrderListFilter, OrderRequest, OrderStatusType, Price, VenueMode,
    VenueOrderUpdate, VenueRequest, VenueResponse,
};
use trader_exchange::{
    AttemptOutcome, ExchangeError, ExecutionError, KrakenCredentials, KrakenHttpTransport,
    KrakenSigner, PassthroughSigner, RequestSigner, RetryPolicy, RetryingExecutor, SimulatedVenue,
    Transport,
};
use uuid::Uuid;

use crate::dead_mans_switch::{CancelAllHandler, DeadMansSwitch, SwitchFailure, SwitchState};
use crate::error::{FacadeError, FacadeResult};
use crate::registry::{OrderLookup, OrderRegistry, QueryFilter};
use crate::validator::{validate, ValidationContext};

/// 종료 주문 조회 시 주문 생성 시각보다 앞당겨 보는 여유.
const CLOSED_LOOKUP_SLACK_SECS: i64 = 60;

/// 데드맨 스위치 무장 결과.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmReceipt {
    pub state: SwitchState,
    /// 로컬 스위치 마감 시각 (해제 시 `None`)
    pub current_deadline: Option<DateTime<Utc>>,
    /// 거래소 측 cancel-all-after 발동 시각 (미러링 시)
    pub venue_trigger_time: Option<DateTime<Utc>>,
}

/// 주문 조회 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub filter: QueryFilter,
    /// 체결 ID 포함 여부
    pub include_trades: bool,
    /// 반환 전에 거래소에서 상태를 새로 고칠지 여부
    pub refresh: bool,
}

impl QueryRequest {
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(QueryFilter::Ids(ids.into_iter().map(Into::into).collect()))
    }

    pub fn time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(QueryFilter::TimeRange { start, end })
    }

    pub fn all() -> Self {
        Self::new(QueryFilter::All)
    }

    fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            include_trades: false,
            refresh: false,
        }
    }

    pub fn with_trades(mut self) -> Self {
        self.include_trades = true;
        self
    }

    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// 거래소에서 주문을 다시 찾을 때 쓰는 조건 (클라이언트 주문 ID 우선).
fn venue_lookup_filter(order: &Order) -> Option<OrderListFilter> {
    match (order.client_order_id(), order.user_ref()) {
        (Some(id), _) => Some(OrderListFilter::by_client_id(id)),
        (None, Some(user_ref)) => Some(OrderListFilter::by_user_ref(user_ref)),
        (None, None) => None,
    }
}

fn targets(target: &CancelTarget, order: &Order) -> bool {
    match target {
        CancelTarget::ClientOrderId(id) => order.client_order_id() == Some(id.as_str()),
        CancelTarget::UserRef(user_ref) => order.user_ref() == Some(*user_ref),
        CancelTarget::VenueOrderId(id) => order.venue_order_id.as_deref() == Some(id.as_str()),
    }
}

/// 레지스트리, 실행기, 거래쌍 보드를 묶은 공유 코어.
struct ExecutionCore {
    registry: OrderRegistry,
    executor: RetryingExecutor,
    instruments: Arc<InstrumentBoard>,
    /// 제출 결과를 확인하지 못해 `Submitted`로 남은 주문
    unresolved: Mutex<HashSet<Uuid>>,
}

impl ExecutionCore {
    async fn submit(&self, request: OrderRequest) -> FacadeResult<Order> {
        let pair = normalize_pair(&request.pair);
        let ctx = ValidationContext::for_pair(self.instruments.as_ref(), &pair);
        let normalized = validate(&request, &ctx).inspect_err(|e| {
            warn!(field = %e.field, reason = %e.reason, "Order validation failed");
        })?;

        let validate_only = normalized.validate_only;
        let order = self
            .registry
            .register(Order::from_validated(normalized.clone()))?;
        let order_id = order.id;
        let key = OrderLookup::ById(order_id);
        self.registry
            .transition(&key, OrderStatusType::Submitted, None)?;

        let report = self
            .executor
            .execute(&VenueRequest::AddOrder(normalized))
            .await;
        debug!(
            %order_id,
            attempts = report.attempt_count(),
            elapsed = ?report.total_elapsed(),
            "Submission finished"
        );
        let saw_transient = report
            .attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::Failed(ErrorClass::Transient));

        let failure = match report.into_result() {
            Ok(VenueResponse::Order(ack)) if ack.accepted => {
                return self.record_acceptance(&key, ack, validate_only);
            }
            Ok(VenueResponse::Order(ack)) => ExecutionError::Rejected(ExchangeError::OrderRejected(
                ack.error.unwrap_or_else(|| "rejected by venue".to_string()),
            )),
            Ok(other) => ExecutionError::UnexpectedResponse {
                expected: "order",
                actual: other.kind(),
            },
            Err(err) => err,
        };

        match &failure {
            ExecutionError::RetriesExhausted { attempts, .. } if !validate_only => {
                // 거래소 도달 여부를 알 수 없으므로 SUBMITTED로 남겨 조회로 확인합니다.
                self.unresolved().insert(order_id);
                warn!(%order_id, attempts, "Submission outcome unknown, order left in SUBMITTED");
            }
            ExecutionError::Rejected(_) if saw_transient && !validate_only => {
                // 응답을 잃은 앞선 시도가 이미 접수됐을 수 있습니다.
                match self.find_at_venue(&order).await {
                    Ok(Some(update)) => return self.adopt(order_id, &update),
                    Ok(None) => {
                        self.reject(&key, &failure)?;
                    }
                    Err(e) => {
                        self.unresolved().insert(order_id);
                        warn!(%order_id, error = %e, "Recovery lookup failed, order left in SUBMITTED");
                    }
                }
            }
            _ => {
                self.reject(&key, &failure)?;
            }
        }

        Err(FacadeError::OrderFailed {
            order_id,
            source: failure,
        })
    }

    fn reject(&self, key: &OrderLookup, failure: &ExecutionError) -> FacadeResult<Order> {
        let reason = failure.to_string();
        Ok(self
            .registry
            .transition_with(key, OrderStatusType::Rejected, |order| {
                order.reject_reason = Some(reason);
            })?)
    }

    fn unresolved(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.unresolved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 아직 결과를 모르는 주문 (생성 순). 이미 다른 경로로 해소된 항목은 정리합니다.
    fn unresolved_orders(&self) -> Vec<Order> {
        let mut orders = Vec::new();
        self.unresolved().retain(|id| match self.registry.find(&OrderLookup::ById(*id)) {
            Some(order) if order.status == OrderStatusType::Submitted => {
                orders.push(order);
                true
            }
            _ => false,
        });
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// 클라이언트 주문 ID(없으면 userref)로 거래소에서 주문을 찾습니다.
    ///
    /// 미체결 목록을 먼저 보고 없으면 종료 목록을 봅니다. 다른 로컬 주문에 이미
    /// 연결된 거래소 주문은 건너뜁니다.
    async fn find_at_venue(&self, order: &Order) -> FacadeResult<Option<VenueOrderUpdate>> {
        let Some(filter) = venue_lookup_filter(order) else {
            return Ok(None);
        };
        let since = order.created_at - chrono::Duration::seconds(CLOSED_LOOKUP_SLACK_SECS);
        let requests = [
            VenueRequest::OpenOrders(filter.clone()),
            VenueRequest::ClosedOrders {
                filter,
                start: Some(since),
                end: None,
            },
        ];

        for request in &requests {
            let orders = match self.executor.execute(request).await.into_result()? {
                VenueResponse::Orders { orders } => orders,
                other => {
                    return Err(ExecutionError::UnexpectedResponse {
                        expected: "orders",
                        actual: other.kind(),
                    }
                    .into())
                }
            };
            let unclaimed = orders.into_iter().find(|update| {
                self.registry
                    .find(&OrderLookup::ByVenueId(update.venue_order_id.clone()))
                    .map_or(true, |known| known.id == order.id)
            });
            if unclaimed.is_some() {
                return Ok(unclaimed);
            }
        }
        Ok(None)
    }

    fn adopt(&self, order_id: Uuid, update: &VenueOrderUpdate) -> FacadeResult<Order> {
        let adopted = self
            .registry
            .apply_update(&OrderLookup::ById(order_id), update)?;
        self.unresolved().remove(&order_id);
        info!(
            %order_id,
            venue_order_id = %update.venue_order_id,
            status = %adopted.status,
            "Recovered order from venue"
        );
        Ok(adopted)
    }

    /// 결과를 모르는 주문을 거래소 기록과 맞춥니다.
    ///
    /// 거래소에 있으면 그 상태를 반영하고 없으면 `Rejected`로 마감합니다.
    /// 접수 마감 시각이 남았거나 찾을 키가 없는 주문은 그대로 둡니다.
    async fn resolve_unknown(&self, order: &Order) -> FacadeResult<Order> {
        if venue_lookup_filter(order).is_none() {
            warn!(order_id = %order.id, "No client id or userref, order cannot be resolved");
            return Ok(order.clone());
        }
        if let Some(update) = self.find_at_venue(order).await? {
            return self.adopt(order.id, &update);
        }
        if order.request.deadline.is_some_and(|deadline| deadline > Utc::now()) {
            debug!(order_id = %order.id, "Order may still reach the venue");
            return Ok(order.clone());
        }

        let rejected = self.registry.transition_with(
            &OrderLookup::ById(order.id),
            OrderStatusType::Rejected,
            |o| o.reject_reason = Some("not found at venue after unconfirmed submission".to_string()),
        )?;
        self.unresolved().remove(&order.id);
        warn!(order_id = %order.id, "Unconfirmed order not found at venue, marked REJECTED");
        Ok(rejected)
    }

    fn record_acceptance(
        &self,
        key: &OrderLookup,
        ack: OrderAck,
        validate_only: bool,
    ) -> FacadeResult<Order> {
        let accepted = self
            .registry
            .transition_with(key, OrderStatusType::Accepted, |order| {
                if ack.venue_order_id.is_some() {
                    order.venue_order_id = ack.venue_order_id;
                }
                order.description = ack.description;
            })?;

        if validate_only {
            // 드라이런은 거래소에 남지 않습니다.
            return Ok(self
                .registry
                .transition(key, OrderStatusType::Expired, None)?);
        }
        if accepted.venue_order_id.is_some() {
            return Ok(self.registry.transition(key, OrderStatusType::Open, None)?);
        }
        Ok(accepted)
    }

    async fn cancel(&self, target: CancelTarget) -> FacadeResult<bool> {
        let report = self
            .executor
            .execute(&VenueRequest::CancelOrder(target.clone()))
            .await;

        match report.into_result() {
            Ok(VenueResponse::Canceled { count }) => {
                let local: Vec<Order> = match &target {
                    CancelTarget::ClientOrderId(id) => self
                        .registry
                        .find(&OrderLookup::ByClientId(id.clone()))
                        .into_iter()
                        .collect(),
                    CancelTarget::VenueOrderId(id) => self
                        .registry
                        .find(&OrderLookup::ByVenueId(id.clone()))
                        .into_iter()
                        .collect(),
                    CancelTarget::UserRef(user_ref) => self.registry.find_all_by_user_ref(*user_ref),
                };
                let targeted = local.into_iter().filter(|o| {
                    o.status.is_cancelable() || o.status == OrderStatusType::Submitted
                });
                self.mark_canceled(targeted);

                info!(%target, count, "Cancel completed");
                Ok(count > 0)
            }
            Ok(other) => Err(ExecutionError::UnexpectedResponse {
                expected: "canceled",
                actual: other.kind(),
            }
            .into()),
            Err(ExecutionError::Rejected(ExchangeError::OrderNotFound(_))) => {
                info!(%target, "Cancel target not found on venue");
                let pending = self
                    .unresolved_orders()
                    .into_iter()
                    .filter(|o| targets(&target, o));
                for order in pending {
                    if let Err(e) = self.resolve_unknown(&order).await {
                        warn!(order_id = %order.id, error = %e, "Failed to resolve unconfirmed order");
                    }
                }
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn cancel_all_orders(&self) -> FacadeResult<usize> {
        let report = self.executor.execute(&VenueRequest::CancelAll).await;
        match report.into_result()? {
            VenueResponse::Canceled { count } => {
                let resting = self
                    .registry
                    .all_open()
                    .into_iter()
                    .filter(|o| o.status.is_cancelable());
                let unconfirmed = self.unresolved_orders();
                self.mark_canceled(resting.chain(unconfirmed));

                info!(count, "Cancel-all completed");
                Ok(count)
            }
            other => Err(ExecutionError::UnexpectedResponse {
                expected: "canceled",
                actual: other.kind(),
            }
            .into()),
        }
    }

    fn mark_canceled(&self, orders: impl Iterator<Item = Order>) {
        for order in orders {
            if let Err(e) = self
                .registry
                .advance(&OrderLookup::ById(order.id), OrderStatusType::Canceled)
            {
                warn!(order_id = %order.id, error = %e, "Failed to record cancellation");
            }
        }
    }

    async fn refresh(&self, filter: &QueryFilter, include_trades: bool) -> FacadeResult<()> {
        let unconfirmed = self.unresolved_orders();
        for order in unconfirmed.iter().filter(|o| filter.matches(o)) {
            self.resolve_unknown(order).await?;
        }

        let venue_order_ids: Vec<String> = self
            .registry
            .query(filter)
            .into_iter()
            .filter_map(|o| o.venue_order_id)
            .collect();
        if venue_order_ids.is_empty() {
            return Ok(());
        }

        let request = VenueRequest::QueryOrders {
            venue_order_ids,
            include_trades,
        };
        match self.executor.execute(&request).await.into_result()? {
            VenueResponse::Orders { orders } => {
                for update in orders {
                    let key = OrderLookup::ByVenueId(update.venue_order_id.clone());
                    if let Err(e) = self.registry.apply_update(&key, &update) {
                        warn!(
                            venue_order_id = %update.venue_order_id,
                            error = %e,
                            "Failed to apply venue update"
                        );
                    }
                }
                Ok(())
            }
            other => Err(ExecutionError::UnexpectedResponse {
                expected: "orders",
                actual: other.kind(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl CancelAllHandler for ExecutionCore {
    async fn cancel_all(&self) -> Result<usize, FacadeError> {
        self.cancel_all_orders().await
    }
}

/// 주문 실행 파사드. `Arc`로 공유해 여러 호출자가 동시에 사용할 수 있습니다.
pub struct ExecutionFacade {
    core: Arc<ExecutionCore>,
    switch: DeadMansSwitch,
    mirror_to_venue: bool,
}

impl ExecutionFacade {
    pub fn new(
        signer: Arc<dyn RequestSigner>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        instruments: InstrumentBoard,
    ) -> Self {
        let core = Arc::new(ExecutionCore {
            registry: OrderRegistry::new(),
            executor: RetryingExecutor::new(signer, transport, policy),
            instruments: Arc::new(instruments),
            unresolved: Mutex::default(),
        });
        let switch = DeadMansSwitch::new(core.clone());

        Self {
            core,
            switch,
            mirror_to_venue: false,
        }
    }

    /// 시뮬레이션 거래소에 연결된 파사드.
    pub fn simulated(venue: Arc<SimulatedVenue>, policy: RetryPolicy) -> Self {
        Self::new(
            Arc::new(PassthroughSigner),
            venue,
            policy,
            InstrumentBoard::new(),
        )
    }

    /// 설정으로부터 파사드를 구성합니다.
    ///
    /// # Errors
    /// 실거래 모드에서 자격증명이나 HTTP 클라이언트 구성이 잘못되면 `FacadeError::Setup`.
    pub fn from_config(config: &AppConfig) -> FacadeResult<Self> {
        let (signer, transport): (Arc<dyn RequestSigner>, Arc<dyn Transport>) =
            match config.venue.mode {
                VenueMode::Live => {
                    let credentials = KrakenCredentials::from_config(&config.venue)?;
                    (
                        Arc::new(KrakenSigner::new(credentials)),
                        Arc::new(KrakenHttpTransport::from_config(&config.venue)?),
                    )
                }
                VenueMode::Simulated => (
                    Arc::new(PassthroughSigner),
                    Arc::new(SimulatedVenue::new()),
                ),
            };

        info!(
            venue = %config.venue.name,
            mode = ?config.venue.mode,
            transport = transport.name(),
            "Execution facade configured"
        );

        let instruments = InstrumentBoard::with_leverage_limits(config.leverage_limits());
        let facade = Self::new(
            signer,
            transport,
            RetryPolicy::from_config(&config.retry),
            instruments,
        )
        .with_mirror_to_venue(config.dead_mans_switch.mirror_to_venue)
        .with_max_switch_timeout(Duration::from_secs(config.dead_mans_switch.max_timeout_secs));

        Ok(facade)
    }

    /// 데드맨 스위치를 거래소 cancel-all-after에도 반영합니다.
    pub fn with_mirror_to_venue(mut self, mirror: bool) -> Self {
        self.mirror_to_venue = mirror;
        self
    }

    /// 데드맨 스위치가 허용하는 최대 제한 시간을 설정합니다. 스위치는 해제 상태로 다시 만들어집니다.
    pub fn with_max_switch_timeout(mut self, max_timeout: Duration) -> Self {
        self.switch = DeadMansSwitch::new(self.core.clone()).with_max_timeout(max_timeout);
        self
    }

    // ==================== 주문 ====================

    /// 주문을 검증하고 제출합니다.
    ///
    /// # Errors
    /// - 검증 실패: `FacadeError::Validation` (거래소 호출 없음)
    /// - 활성 주문과 클라이언트 주문 ID 중복: `FacadeError::Registry`
    /// - 거래소 실패: `FacadeError::OrderFailed` (주문은 레지스트리에 남음)
    pub async fn submit(&self, request: OrderRequest) -> FacadeResult<Order> {
        let span = order_span!("submit", normalize_pair(&request.pair));
        self.core.submit(request).instrument(span).await
    }

    /// 주문 하나(또는 같은 userref의 주문들)를 취소합니다.
    ///
    /// 거래소에 대상이 없으면 `Ok(false)`.
    pub async fn cancel(&self, target: CancelTarget) -> FacadeResult<bool> {
        self.core.cancel(target).await
    }

    /// 모든 주문을 취소하고 거래소가 보고한 취소 수를 반환합니다.
    pub async fn cancel_all(&self) -> FacadeResult<usize> {
        self.core.cancel_all_orders().await
    }

    /// 데드맨 스위치를 무장합니다. `timeout_secs`가 0이면 해제합니다.
    ///
    /// # Errors
    /// 최대 제한 시간을 넘으면 `FacadeError::Validation` (스위치와 거래소 모두 그대로).
    pub async fn arm_dead_mans_switch(&self, timeout_secs: u64) -> FacadeResult<ArmReceipt> {
        let state = self.switch.arm(Duration::from_secs(timeout_secs))?;
        self.receipt(state, timeout_secs).await
    }

    /// 마지막 무장 시간으로 마감을 연장합니다.
    ///
    /// 해제 상태면 아무것도 하지 않고 `Disarmed` 영수증을 돌려줍니다 (거래소 호출 없음).
    pub async fn heartbeat(&self) -> FacadeResult<ArmReceipt> {
        let state = self.switch.heartbeat();
        match (state, self.switch.timeout()) {
            (SwitchState::Armed { .. }, Some(timeout)) => {
                self.receipt(state, timeout.as_secs()).await
            }
            _ => Ok(ArmReceipt {
                state,
                current_deadline: None,
                venue_trigger_time: None,
            }),
        }
    }

    async fn receipt(&self, state: SwitchState, timeout_secs: u64) -> FacadeResult<ArmReceipt> {
        let venue_trigger_time = if self.mirror_to_venue {
            let request = VenueRequest::CancelAllAfter { timeout_secs };
            match self.core.executor.execute(&request).await.into_result()? {
                VenueResponse::CancelAllAfter { trigger_time, .. } => trigger_time,
                other => {
                    return Err(ExecutionError::UnexpectedResponse {
                        expected: "cancel_all_after",
                        actual: other.kind(),
                    }
                    .into())
                }
            }
        } else {
            None
        };

        Ok(ArmReceipt {
            state,
            current_deadline: state.deadline(),
            venue_trigger_time,
        })
    }

    /// 주문 스냅샷을 등록 순으로 조회합니다.
    pub async fn query(&self, request: QueryRequest) -> FacadeResult<Vec<Order>> {
        if request.refresh {
            self.core
                .refresh(&request.filter, request.include_trades)
                .await?;
        }

        let mut orders = self.core.registry.query(&request.filter);
        if !request.include_trades {
            for order in &mut orders {
                order.trades.clear();
            }
        }
        Ok(orders)
    }

    // ==================== 편의 메서드 ====================

    pub async fn market_buy(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::market_buy(pair, volume)).await
    }

    pub async fn market_sell(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::market_sell(pair, volume)).await
    }

    pub async fn limit_buy(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::limit_buy(pair, volume, price)).await
    }

    pub async fn limit_sell(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::limit_sell(pair, volume, price)).await
    }

    pub async fn stop_loss_buy(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::stop_loss_buy(pair, volume, trigger_price))
            .await
    }

    pub async fn stop_loss_sell(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::stop_loss_sell(pair, volume, trigger_price))
            .await
    }

    pub async fn take_profit_buy(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::take_profit_buy(pair, volume, trigger_price))
            .await
    }

    pub async fn take_profit_sell(
        &self,
        pair: impl Into<String>,
        volume: impl Into<Amount>,
        trigger_price: impl Into<Amount>,
    ) -> FacadeResult<Order> {
        self.submit(OrderRequest::take_profit_sell(pair, volume, trigger_price))
            .await
    }

    // ==================== 상태 ====================

    /// 가격 피드의 최신 가격을 반영합니다 (퍼센트 트레일링 거리 변환용).
    pub fn update_price(&self, pair: &str, price: Price) {
        self.core.instruments.update_price(pair, price);
    }

    pub fn instruments(&self) -> &InstrumentBoard {
        &self.core.instruments
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.core.registry
    }

    pub fn dead_mans_switch(&self) -> &DeadMansSwitch {
        &self.switch
    }

    /// 주문 생명주기 이벤트를 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.core.registry.subscribe()
    }

    /// 데드맨 스위치 만료 시 전체 취소 실패를 구독합니다.
    pub fn subscribe_switch_errors(&self) -> broadcast::Receiver<SwitchFailure> {
        self.switch.subscribe_errors()
    }

    /// 치명적 거래소 에러로 요청이 중단된 상태인지 확인합니다.
    pub fn is_halted(&self) -> bool {
        self.core.executor.is_halted()
    }

    /// 자격증명 문제를 해결한 뒤 거래소 요청을 재개합니다.
    pub fn resume(&self) {
        self.core.executor.resume();
    }
}

impl std::fmt::Debug for ExecutionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionFacade")
            .field("orders", &self.core.registry.len())
            .field("switch", &self.switch)
            .field("mirror_to_venue", &self.mirror_to_venue)
            .field("halted", &self.is_halted())
            .finish()
    }
}
