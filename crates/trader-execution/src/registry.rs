//! 주문 레지스트리.
//!
//! 제공 기능:
//! - 주문의 유일한 정본 상태 보관
//! - 생명주기 그래프를 따르는 상태 전이
//! - 클라이언트 주문 ID / userref / 거래소 주문 ID 색인
//! - 주문 이벤트 브로드캐스트
//!
//! 모든 변경은 하나의 쓰기 잠금 구간에서 끝나며 I/O 중에는 잠금을 잡지 않습니다.
//! 조회는 복제된 스냅샷을 반환합니다.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};
use trader_core::{Order, OrderEvent, OrderStatusType, VenueOrderUpdate};
use uuid::Uuid;

use crate::error::RegistryError;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 주문 조회 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderLookup {
    ById(Uuid),
    ByClientId(String),
    ByUserRef(i32),
    ByVenueId(String),
}

impl fmt::Display for OrderLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderLookup::ById(id) => write!(f, "id={}", id),
            OrderLookup::ByClientId(id) => write!(f, "client_order_id={}", id),
            OrderLookup::ByUserRef(r) => write!(f, "userref={}", r),
            OrderLookup::ByVenueId(id) => write!(f, "venue_order_id={}", id),
        }
    }
}

/// 조회 필터.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// 내부 ID, 클라이언트 주문 ID 또는 거래소 주문 ID 중 하나와 일치
    Ids(Vec<String>),
    /// `start <= created_at < end`
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    All,
}

impl QueryFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            QueryFilter::Ids(ids) => ids.iter().any(|id| {
                order.id.to_string() == *id
                    || order.client_order_id() == Some(id.as_str())
                    || order.venue_order_id.as_deref() == Some(id.as_str())
            }),
            QueryFilter::TimeRange { start, end } => {
                order.created_at >= *start && order.created_at < *end
            }
            QueryFilter::All => true,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    orders: HashMap<Uuid, Order>,
    /// 등록 순서
    sequence: Vec<Uuid>,
    /// 클라이언트 주문 ID별 주문 (재사용 이력 포함, 등록 순)
    by_client_id: HashMap<String, Vec<Uuid>>,
    by_user_ref: HashMap<i32, Vec<Uuid>>,
    by_venue_id: HashMap<String, Uuid>,
}

impl RegistryState {
    /// 후보 중 활성 주문을 우선하고, 없으면 가장 최근 주문을 선택합니다.
    fn pick(&self, candidates: &[Uuid]) -> Option<Uuid> {
        candidates
            .iter()
            .rev()
            .find(|id| self.orders.get(*id).is_some_and(|o| o.is_active()))
            .or_else(|| candidates.last())
            .copied()
    }

    fn resolve(&self, lookup: &OrderLookup) -> Option<Uuid> {
        match lookup {
            OrderLookup::ById(id) => self.orders.contains_key(id).then_some(*id),
            OrderLookup::ByClientId(id) => self.by_client_id.get(id).and_then(|c| self.pick(c)),
            OrderLookup::ByUserRef(r) => self.by_user_ref.get(r).and_then(|c| self.pick(c)),
            OrderLookup::ByVenueId(id) => self.by_venue_id.get(id).copied(),
        }
    }

    fn index_venue_id(&mut self, order_id: Uuid) {
        if let Some(venue_id) = self.orders.get(&order_id).and_then(|o| o.venue_order_id.clone()) {
            self.by_venue_id.insert(venue_id, order_id);
        }
    }

    /// 상태 하나를 전이합니다. 이벤트는 `events`에 쌓입니다.
    fn apply_transition(
        &mut self,
        order_id: Uuid,
        to: OrderStatusType,
        events: &mut Vec<OrderEvent>,
    ) -> Result<(), RegistryError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RegistryError::NotFound(OrderLookup::ById(order_id).to_string()))?;

        let from = order.status;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition { order_id, from, to });
        }

        let now = Utc::now();
        order.status = to;
        order.updated_at = now;
        if to == OrderStatusType::Accepted {
            order.accepted = true;
        }

        events.push(OrderEvent::StatusChanged {
            order_id,
            client_order_id: order.request.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            from,
            to,
            timestamp: now,
        });
        Ok(())
    }

    /// `Submitted` 주문을 거래소가 이미 접수했다면 `Accepted`를 거쳐 이동합니다.
    ///
    /// 경로 전체를 먼저 검사하므로 실패 시 주문은 변경되지 않습니다.
    fn advance(
        &mut self,
        order_id: Uuid,
        to: OrderStatusType,
        events: &mut Vec<OrderEvent>,
    ) -> Result<(), RegistryError> {
        let from = self
            .orders
            .get(&order_id)
            .map(|o| o.status)
            .ok_or_else(|| RegistryError::NotFound(OrderLookup::ById(order_id).to_string()))?;

        let via_accepted = from == OrderStatusType::Submitted
            && !matches!(to, OrderStatusType::Accepted | OrderStatusType::Rejected);
        let last_hop = if via_accepted {
            OrderStatusType::Accepted
        } else {
            from
        };
        if !last_hop.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition { order_id, from, to });
        }

        if via_accepted {
            self.apply_transition(order_id, OrderStatusType::Accepted, events)?;
        }
        self.apply_transition(order_id, to, events)
    }

    fn snapshot(&self, order_id: Uuid) -> Result<Order, RegistryError> {
        self.orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(OrderLookup::ById(order_id).to_string()))
    }

    fn remove(&mut self, order_id: Uuid) {
        let Some(order) = self.orders.remove(&order_id) else {
            return;
        };
        self.sequence.retain(|id| *id != order_id);
        if let Some(client_id) = order.client_order_id() {
            if let Some(ids) = self.by_client_id.get_mut(client_id) {
                ids.retain(|id| *id != order_id);
                if ids.is_empty() {
                    self.by_client_id.remove(client_id);
                }
            }
        }
        if let Some(user_ref) = order.user_ref() {
            if let Some(ids) = self.by_user_ref.get_mut(&user_ref) {
                ids.retain(|id| *id != order_id);
                if ids.is_empty() {
                    self.by_user_ref.remove(&user_ref);
                }
            }
        }
        if let Some(venue_id) = &order.venue_order_id {
            self.by_venue_id.remove(venue_id);
        }
    }
}

/// 동시 접근 가능한 주문 테이블.
#[derive(Debug)]
pub struct OrderRegistry {
    state: RwLock<RegistryState>,
    events: broadcast::Sender<OrderEvent>,
}

impl Default for OrderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, events: Vec<OrderEvent>) {
        for event in events {
            // 구독자가 없으면 버려집니다.
            let _ = self.events.send(event);
        }
    }

    /// 주문 이벤트를 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    /// 주문을 등록합니다.
    ///
    /// # Errors
    /// 같은 클라이언트 주문 ID를 가진 활성 주문이 있으면 `DuplicateClientId`.
    /// 최종 상태에 도달한 주문의 ID는 재사용할 수 있습니다.
    pub fn register(&self, order: Order) -> Result<Order, RegistryError> {
        let order_id = order.id;
        let event = {
            let mut state = self.write();

            if let Some(client_id) = order.client_order_id() {
                let duplicate = state.by_client_id.get(client_id).is_some_and(|ids| {
                    ids.iter()
                        .any(|id| state.orders.get(id).is_some_and(|o| o.is_active()))
                });
                if duplicate {
                    return Err(RegistryError::DuplicateClientId(client_id.to_string()));
                }
                state
                    .by_client_id
                    .entry(client_id.to_string())
                    .or_default()
                    .push(order_id);
            }
            if let Some(user_ref) = order.user_ref() {
                state.by_user_ref.entry(user_ref).or_default().push(order_id);
            }

            let event = OrderEvent::Registered {
                order_id,
                client_order_id: order.request.client_order_id.clone(),
                timestamp: order.created_at,
            };
            state.sequence.push(order_id);
            state.orders.insert(order_id, order);
            state.index_venue_id(order_id);
            event
        };

        debug!(%order_id, "Order registered");
        self.publish(vec![event]);
        self.find(&OrderLookup::ById(order_id))
            .ok_or_else(|| RegistryError::NotFound(OrderLookup::ById(order_id).to_string()))
    }

    /// 상태를 전이합니다. `venue_order_id`가 주어지면 함께 기록합니다.
    pub fn transition(
        &self,
        lookup: &OrderLookup,
        to: OrderStatusType,
        venue_order_id: Option<String>,
    ) -> Result<Order, RegistryError> {
        self.transition_with(lookup, to, |order| {
            if venue_order_id.is_some() {
                order.venue_order_id = venue_order_id;
            }
        })
    }

    /// 상태를 전이하면서 부가 필드(설명, 거부 사유 등)를 갱신합니다.
    ///
    /// `annotate`는 전이가 허용된 뒤에만 호출되며 상태와 ID는 바꿀 수 없습니다.
    pub fn transition_with<F>(
        &self,
        lookup: &OrderLookup,
        to: OrderStatusType,
        annotate: F,
    ) -> Result<Order, RegistryError>
    where
        F: FnOnce(&mut Order),
    {
        let mut events = Vec::new();
        let snapshot = {
            let mut state = self.write();
            let order_id = state
                .resolve(lookup)
                .ok_or_else(|| RegistryError::NotFound(lookup.to_string()))?;

            state.apply_transition(order_id, to, &mut events)?;
            if let Some(order) = state.orders.get_mut(&order_id) {
                let status = order.status;
                annotate(order);
                order.status = status;
                order.id = order_id;
            }
            state.index_venue_id(order_id);
            state.snapshot(order_id)?
        };

        info!(
            order_id = %snapshot.id,
            venue_order_id = ?snapshot.venue_order_id,
            status = %snapshot.status,
            "Order status changed"
        );
        self.publish(events);
        Ok(snapshot)
    }

    /// 거래소가 접수를 확인한 `Submitted` 주문은 `Accepted`를 거쳐 `to`로 이동합니다.
    pub fn advance(&self, lookup: &OrderLookup, to: OrderStatusType) -> Result<Order, RegistryError> {
        let mut events = Vec::new();
        let snapshot = {
            let mut state = self.write();
            let order_id = state
                .resolve(lookup)
                .ok_or_else(|| RegistryError::NotFound(lookup.to_string()))?;
            state.advance(order_id, to, &mut events)?;
            state.snapshot(order_id)?
        };

        info!(order_id = %snapshot.id, status = %snapshot.status, "Order status advanced");
        self.publish(events);
        Ok(snapshot)
    }

    /// 거래소 조회 결과(체결, 상태)를 반영합니다.
    ///
    /// 상태가 같으면 체결 정보만 갱신하며, 다르면 생명주기 그래프를 따라 전이합니다.
    pub fn apply_update(
        &self,
        lookup: &OrderLookup,
        update: &VenueOrderUpdate,
    ) -> Result<Order, RegistryError> {
        let mut events = Vec::new();
        let snapshot = {
            let mut state = self.write();
            let order_id = state
                .resolve(lookup)
                .ok_or_else(|| RegistryError::NotFound(lookup.to_string()))?;

            let current = state.snapshot(order_id)?;
            let status_changed = current.status != update.status
                || (update.status == OrderStatusType::PartiallyFilled
                    && update.filled_volume != current.filled_volume);
            if status_changed {
                state.advance(order_id, update.status, &mut events)?;
            }

            let now = Utc::now();
            if let Some(order) = state.orders.get_mut(&order_id) {
                if order.venue_order_id.is_none() {
                    order.venue_order_id = Some(update.venue_order_id.clone());
                }
                if update.description.is_some() {
                    order.description = update.description.clone();
                }
                if !update.trades.is_empty() {
                    order.trades = update.trades.clone();
                }
                if order.filled_volume != update.filled_volume
                    || order.average_price != update.average_price
                {
                    order.filled_volume = update.filled_volume;
                    order.average_price = update.average_price;
                    order.updated_at = now;
                    events.push(OrderEvent::FillUpdated {
                        order_id,
                        filled_volume: update.filled_volume,
                        average_price: update.average_price,
                        timestamp: now,
                    });
                }
            }
            state.index_venue_id(order_id);
            state.snapshot(order_id)?
        };

        debug!(
            order_id = %snapshot.id,
            status = %snapshot.status,
            filled = %snapshot.filled_volume,
            "Venue update applied"
        );
        self.publish(events);
        Ok(snapshot)
    }

    pub fn find(&self, lookup: &OrderLookup) -> Option<Order> {
        let state = self.read();
        state
            .resolve(lookup)
            .and_then(|id| state.orders.get(&id).cloned())
    }

    /// 같은 userref를 가진 모든 주문 (등록 순).
    pub fn find_all_by_user_ref(&self, user_ref: i32) -> Vec<Order> {
        let state = self.read();
        state
            .by_user_ref
            .get(&user_ref)
            .map(|ids| ids.iter().filter_map(|id| state.orders.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// 최종 상태가 아닌 주문 (등록 순).
    pub fn all_open(&self) -> Vec<Order> {
        self.query(&QueryFilter::All)
            .into_iter()
            .filter(Order::is_active)
            .collect()
    }

    /// 필터와 일치하는 주문 (등록 순).
    pub fn query(&self, filter: &QueryFilter) -> Vec<Order> {
        let state = self.read();
        state
            .sequence
            .iter()
            .filter_map(|id| state.orders.get(id))
            .filter(|order| filter.matches(order))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `older_than`보다 먼저 갱신된 최종 상태 주문을 제거합니다.
    pub fn prune_terminal(&self, older_than: DateTime<Utc>) -> usize {
        let mut state = self.write();
        let stale: Vec<Uuid> = state
            .orders
            .values()
            .filter(|o| o.status.is_final() && o.updated_at < older_than)
            .map(|o| o.id)
            .collect();
        for id in &stale {
            state.remove(*id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "Pruned terminal orders");
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use trader_core::{NormalizedOrder, OrderKind, Side};

    fn order(client_id: Option<&str>, user_ref: Option<i32>) -> Order {
        Order::from_validated(NormalizedOrder {
            pair: "XBTUSD".to_string(),
            side: Side::Buy,
            kind: OrderKind::Limit { price: dec!(35000) },
            volume: dec!(1),
            leverage: None,
            flags: BTreeSet::new(),
            trigger: None,
            start_time: None,
            expire_time: None,
            deadline: None,
            time_in_force: None,
            reduce_only: false,
            validate_only: false,
            user_ref,
            client_order_id: client_id.map(str::to_string),
            close: None,
        })
    }

    fn open(registry: &OrderRegistry, order: &Order, venue_id: &str) {
        let key = OrderLookup::ById(order.id);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();
        registry
            .transition(&key, OrderStatusType::Accepted, Some(venue_id.to_string()))
            .unwrap();
        registry.transition(&key, OrderStatusType::Open, None).unwrap();
    }

    #[test]
    fn test_duplicate_client_id() {
        let registry = OrderRegistry::new();
        let first = registry.register(order(Some("abc"), None)).unwrap();

        assert_eq!(
            registry.register(order(Some("abc"), None)),
            Err(RegistryError::DuplicateClientId("abc".to_string()))
        );

        // 최종 상태가 되면 재사용 가능
        let key = OrderLookup::ById(first.id);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();
        registry.transition(&key, OrderStatusType::Rejected, None).unwrap();
        let second = registry.register(order(Some("abc"), None)).unwrap();

        let found = registry.find(&OrderLookup::ByClientId("abc".into())).unwrap();
        assert_eq!(found.id, second.id);
    }

    #[test]
    fn test_invalid_transition() {
        let registry = OrderRegistry::new();
        let order = registry.register(order(None, None)).unwrap();

        let err = registry
            .transition(&OrderLookup::ById(order.id), OrderStatusType::Filled, None)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTransition {
                order_id: order.id,
                from: OrderStatusType::Validated,
                to: OrderStatusType::Filled,
            }
        );
        assert!(matches!(
            registry.transition(&OrderLookup::ByVenueId("nope".into()), OrderStatusType::Open, None),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_indexes() {
        let registry = OrderRegistry::new();
        let a = registry.register(order(Some("a"), Some(7))).unwrap();
        let b = registry.register(order(None, Some(7))).unwrap();
        open(&registry, &a, "OVENUE-A");

        assert_eq!(registry.find(&OrderLookup::ByVenueId("OVENUE-A".into())).unwrap().id, a.id);
        assert_eq!(registry.find(&OrderLookup::ByUserRef(7)).unwrap().id, b.id);
        let all: Vec<_> = registry.find_all_by_user_ref(7).into_iter().map(|o| o.id).collect();
        assert_eq!(all, vec![a.id, b.id]);
    }

    #[test]
    fn test_all_open_in_registration_order() {
        let registry = OrderRegistry::new();
        let ids: Vec<Uuid> = (0..5)
            .map(|i| registry.register(order(Some(&format!("c{}", i)), None)).unwrap().id)
            .collect();

        let key = OrderLookup::ById(ids[2]);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();
        registry.transition(&key, OrderStatusType::Rejected, None).unwrap();

        let open: Vec<Uuid> = registry.all_open().into_iter().map(|o| o.id).collect();
        assert_eq!(open, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[test]
    fn test_apply_update_fills() {
        let registry = OrderRegistry::new();
        let order = registry.register(order(Some("f"), None)).unwrap();
        open(&registry, &order, "OFILL");
        let key = OrderLookup::ByVenueId("OFILL".into());

        let mut update = VenueOrderUpdate {
            venue_order_id: "OFILL".to_string(),
            client_order_id: Some("f".to_string()),
            user_ref: None,
            status: OrderStatusType::PartiallyFilled,
            filled_volume: dec!(0.4),
            average_price: Some(dec!(35000)),
            trades: vec!["T1".to_string()],
            description: None,
        };
        let partial = registry.apply_update(&key, &update).unwrap();
        assert_eq!(partial.status, OrderStatusType::PartiallyFilled);
        assert_eq!(partial.remaining_volume(), dec!(0.6));

        update.status = OrderStatusType::Filled;
        update.filled_volume = dec!(1);
        update.trades.push("T2".to_string());
        let filled = registry.apply_update(&key, &update).unwrap();
        assert_eq!(filled.status, OrderStatusType::Filled);
        assert_eq!(filled.remaining_volume(), Decimal::ZERO);
        assert_eq!(filled.trades.len(), 2);
    }

    #[test]
    fn test_advance_from_submitted() {
        let registry = OrderRegistry::new();
        let order = registry.register(order(None, None)).unwrap();
        let key = OrderLookup::ById(order.id);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();

        let canceled = registry.advance(&key, OrderStatusType::Canceled).unwrap();
        assert_eq!(canceled.status, OrderStatusType::Canceled);
        assert!(canceled.accepted);
    }

    #[tokio::test]
    async fn test_failed_advance_leaves_order_untouched() {
        let registry = OrderRegistry::new();
        let order = registry.register(order(Some("half"), None)).unwrap();
        let key = OrderLookup::ById(order.id);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();
        let mut events = registry.subscribe();

        // Accepted -> Validated 는 허용되지 않는 두 번째 단계
        let update = VenueOrderUpdate {
            venue_order_id: "OHALF".to_string(),
            client_order_id: Some("half".to_string()),
            user_ref: None,
            status: OrderStatusType::Validated,
            filled_volume: Decimal::ZERO,
            average_price: None,
            trades: Vec::new(),
            description: None,
        };
        let err = registry.apply_update(&key, &update).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTransition {
                order_id: order.id,
                from: OrderStatusType::Submitted,
                to: OrderStatusType::Validated,
            }
        );

        let unchanged = registry.find(&key).unwrap();
        assert_eq!(unchanged.status, OrderStatusType::Submitted);
        assert!(!unchanged.accepted);
        assert!(unchanged.venue_order_id.is_none());
        assert!(registry.find(&OrderLookup::ByVenueId("OHALF".into())).is_none());
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let registry = OrderRegistry::new();
        let mut events = registry.subscribe();
        let order = registry.register(order(None, None)).unwrap();
        registry
            .transition(&OrderLookup::ById(order.id), OrderStatusType::Submitted, None)
            .unwrap();

        assert!(matches!(events.recv().await.unwrap(), OrderEvent::Registered { .. }));
        match events.recv().await.unwrap() {
            OrderEvent::StatusChanged { from, to, .. } => {
                assert_eq!(from, OrderStatusType::Validated);
                assert_eq!(to, OrderStatusType::Submitted);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_prune_terminal() {
        let registry = OrderRegistry::new();
        let done = registry.register(order(Some("done"), Some(1))).unwrap();
        let live = registry.register(order(Some("live"), None)).unwrap();
        let key = OrderLookup::ById(done.id);
        registry.transition(&key, OrderStatusType::Submitted, None).unwrap();
        registry.transition(&key, OrderStatusType::Rejected, None).unwrap();

        assert_eq!(registry.prune_terminal(Utc::now() + chrono::Duration::seconds(1)), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.find(&OrderLookup::ByClientId("done".into())).is_none());
        assert!(registry.find_all_by_user_ref(1).is_empty());
        assert_eq!(registry.find(&OrderLookup::ById(live.id)).unwrap().id, live.id);
    }
}
