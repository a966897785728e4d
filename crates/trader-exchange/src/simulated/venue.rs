//! 메모리 시뮬레이션 거래소 구현.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use trader_core::{
    normalize_pair, CancelTarget, DecimalExt, NormalizedOrder, OrderAck, OrderKind,
    OrderListFilter, OrderStatusType, Price, Quantity, VenueOrderUpdate, VenueRequest,
    VenueResponse,
};

use crate::traits::{ExchangeResult, RequestSigner, SignedRequest, Transport};
use crate::ExchangeError;

/// 시뮬레이션 거래소 설정.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// 시장가 주문을 접수 즉시 전량 체결할지 여부
    pub fill_market_orders: bool,
    /// 거래소 주문 ID 접두사
    pub order_id_prefix: String,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            fill_market_orders: true,
            order_id_prefix: "OSIM".to_string(),
        }
    }
}

/// 기록된 호출.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// 호출 순번 (1부터)
    pub sequence: u64,
    pub request: VenueRequest,
    pub nonce: u64,
    /// 스크립트된 실패로 응답했는지 여부
    pub failed: bool,
}

#[derive(Debug, Clone)]
struct SimOrder {
    venue_order_id: String,
    order: NormalizedOrder,
    status: OrderStatusType,
    filled_volume: Quantity,
    average_price: Option<Price>,
    trades: Vec<String>,
    /// 최종 상태에 도달한 시각
    closed_at: Option<DateTime<Utc>>,
}

impl SimOrder {
    fn set_status(&mut self, status: OrderStatusType) {
        self.status = status;
        if status.is_final() && self.closed_at.is_none() {
            self.closed_at = Some(Utc::now());
        }
    }

    fn listed_by(&self, filter: &OrderListFilter) -> bool {
        filter.matches(self.order.client_order_id.as_deref(), self.order.user_ref)
    }

    fn description(&self) -> String {
        let order = &self.order;
        let mut descr = format!(
            "{} {} {} @ {}",
            order.side.as_str(),
            order.volume.to_wire_string(),
            order.pair,
            order.order_type()
        );
        if let Some(price) = order.kind.price() {
            descr.push_str(&format!(" {}", price.to_wire_string()));
        }
        if let Some(leverage) = order.leverage {
            descr.push_str(&format!(" with {} leverage", leverage));
        }
        descr
    }

    fn to_update(&self, include_trades: bool) -> VenueOrderUpdate {
        VenueOrderUpdate {
            venue_order_id: self.venue_order_id.clone(),
            client_order_id: self.order.client_order_id.clone(),
            user_ref: self.order.user_ref,
            status: self.status,
            filled_volume: self.filled_volume,
            average_price: self.average_price,
            trades: if include_trades {
                self.trades.clone()
            } else {
                Vec::new()
            },
            description: Some(self.description()),
        }
    }

    fn matches(&self, target: &CancelTarget) -> bool {
        match target {
            CancelTarget::VenueOrderId(id) => &self.venue_order_id == id,
            CancelTarget::ClientOrderId(id) => self.order.client_order_id.as_ref() == Some(id),
            CancelTarget::UserRef(r) => self.order.user_ref == Some(*r),
        }
    }
}

#[derive(Debug, Default)]
struct VenueState {
    orders: Vec<SimOrder>,
    market_prices: HashMap<String, Price>,
    scripted_failures: VecDeque<ExchangeError>,
    calls: Vec<RecordedCall>,
    next_order_seq: u64,
    next_trade_seq: u64,
}

impl VenueState {
    fn next_trade_id(&mut self) -> String {
        self.next_trade_seq += 1;
        format!("TSIM-{:06}", self.next_trade_seq)
    }

    fn add_order(&mut self, config: &SimulatedConfig, order: &NormalizedOrder) -> ExchangeResult<VenueResponse> {
        if let Some(cl_ord_id) = &order.client_order_id {
            let duplicate = self.orders.iter().any(|o| {
                o.status.is_active() && o.order.client_order_id.as_ref() == Some(cl_ord_id)
            });
            if duplicate {
                return Err(ExchangeError::OrderRejected(format!(
                    "EOrder:Duplicate cl_ord_id {}",
                    cl_ord_id
                )));
            }
        }

        self.next_order_seq += 1;
        let mut sim = SimOrder {
            venue_order_id: format!("{}-{:06}", config.order_id_prefix, self.next_order_seq),
            order: order.clone(),
            status: OrderStatusType::Open,
            filled_volume: Decimal::ZERO,
            average_price: None,
            trades: Vec::new(),
            closed_at: None,
        };

        if order.validate_only {
            return Ok(VenueResponse::Order(OrderAck {
                accepted: true,
                venue_order_id: None,
                description: Some(sim.description()),
                error: None,
            }));
        }

        if config.fill_market_orders && matches!(order.kind, OrderKind::Market) {
            sim.set_status(OrderStatusType::Filled);
            sim.filled_volume = order.volume;
            sim.average_price = self.market_prices.get(&order.pair).copied();
            let trade_id = self.next_trade_id();
            sim.trades.push(trade_id);
        }

        let ack = OrderAck {
            accepted: true,
            venue_order_id: Some(sim.venue_order_id.clone()),
            description: Some(sim.description()),
            error: None,
        };
        self.orders.push(sim);
        Ok(VenueResponse::Order(ack))
    }

    fn cancel(&mut self, target: Option<&CancelTarget>) -> ExchangeResult<VenueResponse> {
        let mut count = 0;
        for order in self.orders.iter_mut() {
            let selected = target.map_or(true, |t| order.matches(t));
            if selected && order.status.is_active() {
                order.set_status(OrderStatusType::Canceled);
                count += 1;
            }
        }

        match target {
            Some(target) if count == 0 => Err(ExchangeError::OrderNotFound(format!(
                "EOrder:Unknown order ({})",
                target
            ))),
            _ => Ok(VenueResponse::Canceled { count }),
        }
    }

    fn query(&self, ids: &[String], include_trades: bool) -> VenueResponse {
        let orders = self
            .orders
            .iter()
            .filter(|o| ids.contains(&o.venue_order_id))
            .map(|o| o.to_update(include_trades))
            .collect();
        VenueResponse::Orders { orders }
    }

    fn open_orders(&self, filter: &OrderListFilter) -> VenueResponse {
        let orders = self
            .orders
            .iter()
            .filter(|o| o.status.is_active() && o.listed_by(filter))
            .map(|o| o.to_update(filter.include_trades))
            .collect();
        VenueResponse::Orders { orders }
    }

    fn closed_orders(
        &self,
        filter: &OrderListFilter,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> VenueResponse {
        let orders = self
            .orders
            .iter()
            .filter(|o| o.listed_by(filter))
            .filter(|o| {
                o.closed_at.is_some_and(|closed| {
                    start.map_or(true, |s| closed >= s) && end.map_or(true, |e| closed <= e)
                })
            })
            .map(|o| o.to_update(filter.include_trades))
            .collect();
        VenueResponse::Orders { orders }
    }

    fn cancel_all_after(&self, timeout_secs: u64) -> ExchangeResult<VenueResponse> {
        let now = Utc::now();
        let trigger_time = if timeout_secs == 0 {
            None
        } else {
            let trigger = i64::try_from(timeout_secs)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .and_then(|timeout| now.checked_add_signed(timeout))
                .ok_or_else(|| {
                    ExchangeError::OrderRejected(format!(
                        "EGeneral:Invalid arguments:timeout {}",
                        timeout_secs
                    ))
                })?;
            Some(trigger)
        };
        Ok(VenueResponse::CancelAllAfter {
            current_time: Some(now),
            trigger_time,
        })
    }
}

/// 메모리 시뮬레이션 거래소.
///
/// 주문 접수/취소/조회를 처리하고 모든 호출을 기록합니다.
/// `fail_next`로 다음 호출들의 실패를 스크립트할 수 있습니다.
#[derive(Debug, Default)]
pub struct SimulatedVenue {
    config: SimulatedConfig,
    state: Mutex<VenueState>,
}

impl SimulatedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimulatedConfig) -> Self {
        Self {
            config,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, VenueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 다음 호출 하나를 주어진 에러로 실패시킵니다. 여러 번 호출하면 순서대로 쌓입니다.
    pub fn fail_next(&self, error: ExchangeError) {
        self.state().scripted_failures.push_back(error);
    }

    /// 다음 `times`번의 호출을 실패시킵니다.
    pub fn fail_times(&self, times: usize, error: ExchangeError) {
        let mut state = self.state();
        for _ in 0..times {
            state.scripted_failures.push_back(error.clone());
        }
    }

    /// 시장가 체결에 사용할 가격을 설정합니다.
    pub fn set_market_price(&self, pair: &str, price: Price) {
        self.state().market_prices.insert(normalize_pair(pair), price);
    }

    /// 주문에 체결을 반영합니다 (부분 또는 전량).
    pub fn fill(&self, venue_order_id: &str, volume: Quantity, price: Price) -> ExchangeResult<()> {
        let mut state = self.state();
        let trade_id = state.next_trade_id();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.venue_order_id == venue_order_id && o.status.is_active())
            .ok_or_else(|| ExchangeError::OrderNotFound(venue_order_id.to_string()))?;

        let previous_notional = order.average_price.unwrap_or_default() * order.filled_volume;
        let filled = (order.filled_volume + volume).min(order.order.volume);
        order.average_price = Some((previous_notional + price * (filled - order.filled_volume)) / filled);
        order.filled_volume = filled;
        order.trades.push(trade_id);
        order.set_status(if filled >= order.order.volume {
            OrderStatusType::Filled
        } else {
            OrderStatusType::PartiallyFilled
        });
        Ok(())
    }

    /// 기록된 모든 호출.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// 특정 종류의 호출 수.
    pub fn call_count_of(&self, kind: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.request.kind() == kind)
            .count()
    }

    /// 거래소 측에서 활성 상태인 주문 수.
    pub fn open_order_count(&self) -> usize {
        self.state()
            .orders
            .iter()
            .filter(|o| o.status.is_active())
            .count()
    }
}

#[async_trait]
impl Transport for SimulatedVenue {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(&self, signed: &SignedRequest) -> ExchangeResult<VenueResponse> {
        let mut state = self.state();
        let sequence = state.calls.len() as u64 + 1;
        let scripted = state.scripted_failures.pop_front();
        state.calls.push(RecordedCall {
            sequence,
            request: signed.request.clone(),
            nonce: signed.nonce,
            failed: scripted.is_some(),
        });

        if let Some(err) = scripted {
            debug!(request = signed.request.kind(), sequence, error = %err, "Scripted failure");
            return Err(err);
        }

        match &signed.request {
            VenueRequest::AddOrder(order) => state.add_order(&self.config, order),
            VenueRequest::CancelOrder(target) => state.cancel(Some(target)),
            VenueRequest::CancelAll => state.cancel(None),
            VenueRequest::CancelAllAfter { timeout_secs } => state.cancel_all_after(*timeout_secs),
            VenueRequest::QueryOrders {
                venue_order_ids,
                include_trades,
            } => Ok(state.query(venue_order_ids, *include_trades)),
            VenueRequest::OpenOrders(filter) => Ok(state.open_orders(filter)),
            VenueRequest::ClosedOrders { filter, start, end } => {
                Ok(state.closed_orders(filter, *start, *end))
            }
        }
    }
}

/// 서명 없이 논리 요청을 그대로 전달하는 서명기 (시뮬레이션 거래소용).
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSigner;

#[async_trait]
impl RequestSigner for PassthroughSigner {
    async fn sign(&self, request: &VenueRequest) -> ExchangeResult<SignedRequest> {
        Ok(SignedRequest {
            request: request.clone(),
            path: format!("/simulated/{}", request.kind()),
            headers: Vec::new(),
            body: String::new(),
            nonce: 0,
        })
    }
}
