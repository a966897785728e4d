//! Kraken REST 커넥터.
//!
//! - `KrakenSigner`: nonce 생성, form 본문 인코딩, `API-Sign` 서명
//! - `KrakenHttpTransport`: reqwest 기반 전송 및 `{"error": [...], "result": {...}}` 디코딩
//!
//! 서명: `HMAC-SHA512(base64decode(secret), path + SHA256(nonce + body))`를 base64로 인코딩.

use crate::traits::{ExchangeResult, RequestSigner, SignedRequest, Transport};
use crate::ExchangeError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use trader_core::{
    mask_key, CancelTarget, DecimalExt, NormalizedOrder, OrderAck, OrderKind, OrderListFilter,
    OrderStatusType, Price, VenueConfig, VenueOrderUpdate, VenueRequest, VenueResponse,
};

type HmacSha512 = Hmac<Sha512>;

const ADD_ORDER_PATH: &str = "/0/private/AddOrder";
const CANCEL_ORDER_PATH: &str = "/0/private/CancelOrder";
const CANCEL_ALL_PATH: &str = "/0/private/CancelAll";
const CANCEL_ALL_AFTER_PATH: &str = "/0/private/CancelAllOrdersAfter";
const QUERY_ORDERS_PATH: &str = "/0/private/QueryOrders";
const OPEN_ORDERS_PATH: &str = "/0/private/OpenOrders";
const CLOSED_ORDERS_PATH: &str = "/0/private/ClosedOrders";

// ============================================================================
// 자격증명 / nonce
// ============================================================================

/// Kraken API 자격증명.
///
/// `Debug` 구현은 API 키를 마스킹하고 시크릿을 출력하지 않습니다.
#[derive(Clone)]
pub struct KrakenCredentials {
    api_key: String,
    api_secret: SecretString,
}

impl KrakenCredentials {
    /// 자격증명을 생성합니다. 시크릿은 base64여야 합니다.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> ExchangeResult<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ExchangeError::SigningError(
                "API key and secret cannot be empty".to_string(),
            ));
        }
        STANDARD
            .decode(api_secret.as_bytes())
            .map_err(|e| ExchangeError::SigningError(format!("Invalid base64 API secret: {}", e)))?;

        Ok(Self {
            api_key,
            api_secret: SecretString::from(api_secret),
        })
    }

    pub fn from_config(config: &VenueConfig) -> ExchangeResult<Self> {
        Self::new(config.api_key.clone(), config.api_secret.clone())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn masked_api_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

impl fmt::Debug for KrakenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KrakenCredentials")
            .field("api_key", &self.masked_api_key())
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}

/// 마이크로초 기반의 엄격히 증가하는 nonce 생성기.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 nonce. 시계가 뒤로 가도 직전 값보다 큽니다.
    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();

        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// `API-Sign` 값을 계산합니다.
pub fn sign_payload(
    secret_b64: &str,
    path: &str,
    nonce: u64,
    post_data: &str,
) -> ExchangeResult<String> {
    let secret = STANDARD
        .decode(secret_b64.as_bytes())
        .map_err(|e| ExchangeError::SigningError(format!("Invalid base64 API secret: {}", e)))?;

    let digest = Sha256::digest(format!("{}{}", nonce, post_data).as_bytes());

    let mut mac = HmacSha512::new_from_slice(&secret)
        .map_err(|e| ExchangeError::SigningError(e.to_string()))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// 요청 인코딩
// ============================================================================

/// 가격 필드의 wire 표현. 트레일링 거리는 `+` 접두사가 붙은 상대값입니다.
fn price_param(kind: &OrderKind, price: Price) -> String {
    match kind {
        OrderKind::TrailingStop { .. } | OrderKind::TrailingStopLimit { .. } => {
            format!("+{}", price.to_wire_string())
        }
        _ => price.to_wire_string(),
    }
}

fn push_order_params(params: &mut Vec<(&'static str, String)>, order: &NormalizedOrder) {
    params.push(("pair", order.pair.clone()));
    params.push(("type", order.side.as_str().to_string()));
    params.push(("ordertype", order.order_type().as_str().to_string()));
    params.push(("volume", order.volume.to_wire_string()));

    if let Some(price) = order.kind.price() {
        params.push(("price", price_param(&order.kind, price)));
    }
    if let Some(price2) = order.kind.price2() {
        params.push(("price2", price_param(&order.kind, price2)));
    }
    if let Some(trigger) = order.trigger {
        params.push(("trigger", trigger.as_str().to_string()));
    }
    if let Some(leverage) = order.leverage {
        params.push(("leverage", leverage.to_string()));
    }
    if order.reduce_only {
        params.push(("reduce_only", "true".to_string()));
    }
    if let Some(start) = order.start_time {
        params.push(("starttm", start.timestamp().to_string()));
    }
    if let Some(expire) = order.expire_time {
        params.push(("expiretm", expire.timestamp().to_string()));
    }
    if let Some(deadline) = order.deadline {
        params.push(("deadline", deadline.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }
    if let Some(user_ref) = order.user_ref {
        params.push(("userref", user_ref.to_string()));
    }
    if let Some(cl_ord_id) = &order.client_order_id {
        params.push(("cl_ord_id", cl_ord_id.clone()));
    }
    if order.validate_only {
        params.push(("validate", "true".to_string()));
    }
    if !order.flags.is_empty() {
        let flags: Vec<_> = order.flags.iter().map(|f| f.as_str()).collect();
        params.push(("oflags", flags.join(",")));
    }
    if let Some(tif) = order.time_in_force {
        params.push(("timeinforce", tif.as_str().to_string()));
    }
    if let Some(close) = &order.close {
        params.push(("close[ordertype]", close.kind.order_type().as_str().to_string()));
        if let Some(price) = close.kind.price() {
            params.push(("close[price]", price_param(&close.kind, price)));
        }
        if let Some(price2) = close.kind.price2() {
            params.push(("close[price2]", price_param(&close.kind, price2)));
        }
    }
}

fn push_list_params(params: &mut Vec<(&'static str, String)>, filter: &OrderListFilter) {
    if filter.include_trades {
        params.push(("trades", "true".to_string()));
    }
    if let Some(user_ref) = filter.user_ref {
        params.push(("userref", user_ref.to_string()));
    }
    if let Some(cl_ord_id) = &filter.client_order_id {
        params.push(("cl_ord_id", cl_ord_id.clone()));
    }
}

/// 논리 요청을 엔드포인트 경로와 form 파라미터(nonce 제외)로 변환합니다.
pub fn encode_request(request: &VenueRequest) -> (&'static str, Vec<(&'static str, String)>) {
    let mut params = Vec::new();
    let path = match request {
        VenueRequest::AddOrder(order) => {
            push_order_params(&mut params, order);
            ADD_ORDER_PATH
        }
        VenueRequest::CancelOrder(target) => {
            match target {
                CancelTarget::VenueOrderId(id) => params.push(("txid", id.clone())),
                CancelTarget::UserRef(r) => params.push(("userref", r.to_string())),
                CancelTarget::ClientOrderId(id) => params.push(("cl_ord_id", id.clone())),
            }
            CANCEL_ORDER_PATH
        }
        VenueRequest::CancelAll => CANCEL_ALL_PATH,
        VenueRequest::CancelAllAfter { timeout_secs } => {
            params.push(("timeout", timeout_secs.to_string()));
            CANCEL_ALL_AFTER_PATH
        }
        VenueRequest::QueryOrders {
            venue_order_ids,
            include_trades,
        } => {
            if *include_trades {
                params.push(("trades", "true".to_string()));
            }
            params.push(("txid", venue_order_ids.join(",")));
            QUERY_ORDERS_PATH
        }
        VenueRequest::OpenOrders(filter) => {
            push_list_params(&mut params, filter);
            OPEN_ORDERS_PATH
        }
        VenueRequest::ClosedOrders { filter, start, end } => {
            push_list_params(&mut params, filter);
            if let Some(start) = start {
                params.push(("start", start.timestamp().to_string()));
            }
            if let Some(end) = end {
                params.push(("end", end.timestamp().to_string()));
            }
            params.push(("closetime", "both".to_string()));
            CLOSED_ORDERS_PATH
        }
    };
    (path, params)
}

/// `nonce`를 앞에 둔 form-urlencoded 본문.
pub fn form_body(nonce: u64, params: &[(&'static str, String)]) -> String {
    std::iter::once(format!("nonce={}", nonce))
        .chain(
            params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))),
        )
        .collect::<Vec<_>>()
        .join("&")
}

// ============================================================================
// 서명기
// ============================================================================

/// Kraken 요청 서명기.
#[derive(Debug)]
pub struct KrakenSigner {
    credentials: KrakenCredentials,
    nonces: NonceGenerator,
}

impl KrakenSigner {
    pub fn new(credentials: KrakenCredentials) -> Self {
        Self {
            credentials,
            nonces: NonceGenerator::new(),
        }
    }
}

#[async_trait]
impl RequestSigner for KrakenSigner {
    async fn sign(&self, request: &VenueRequest) -> ExchangeResult<SignedRequest> {
        let (path, params) = encode_request(request);
        let nonce = self.nonces.next();
        let body = form_body(nonce, &params);
        let signature = sign_payload(
            self.credentials.api_secret.expose_secret(),
            path,
            nonce,
            &body,
        )?;

        debug!(path, nonce, api_key = %self.credentials.masked_api_key(), "Signed request");

        Ok(SignedRequest {
            request: request.clone(),
            path: path.to_string(),
            headers: vec![
                ("API-Key".to_string(), self.credentials.api_key.clone()),
                ("API-Sign".to_string(), signature),
            ],
            body,
            nonce,
        })
    }
}

// ============================================================================
// 응답 디코딩
// ============================================================================

#[derive(Debug, Deserialize)]
struct KrakenEnvelope {
    #[serde(default)]
    error: Vec<String>,
    result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddOrderResult {
    #[serde(default)]
    txid: Vec<String>,
    descr: Option<OrderDescription>,
}

#[derive(Debug, Deserialize)]
struct OrderDescription {
    order: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelAfterResult {
    current_time: Option<String>,
    trigger_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenOrdersResult {
    open: BTreeMap<String, KrakenOrderInfo>,
}

#[derive(Debug, Deserialize)]
struct ClosedOrdersResult {
    closed: BTreeMap<String, KrakenOrderInfo>,
}

#[derive(Debug, Deserialize)]
struct KrakenOrderInfo {
    status: String,
    #[serde(default)]
    vol: String,
    #[serde(default)]
    vol_exec: String,
    #[serde(default)]
    price: String,
    userref: Option<i32>,
    cl_ord_id: Option<String>,
    descr: Option<OrderDescription>,
    #[serde(default)]
    trades: Vec<String>,
}

impl KrakenOrderInfo {
    /// # Errors
    /// 알 수 없는 상태 문자열이면 `ExchangeError::ParseError`.
    fn into_update(self, venue_order_id: String) -> ExchangeResult<VenueOrderUpdate> {
        let volume = Decimal::from_str(&self.vol).unwrap_or_default();
        let filled = Decimal::from_str(&self.vol_exec).unwrap_or_default();
        let average_price = Decimal::from_str(&self.price)
            .ok()
            .filter(|p| !p.is_zero());

        let status = match self.status.as_str() {
            "pending" => OrderStatusType::Accepted,
            "open" if filled.is_zero() => OrderStatusType::Open,
            "open" => OrderStatusType::PartiallyFilled,
            "closed" if !volume.is_zero() && filled < volume => OrderStatusType::PartiallyFilled,
            "closed" => OrderStatusType::Filled,
            "canceled" => OrderStatusType::Canceled,
            "expired" => OrderStatusType::Expired,
            other => {
                warn!(status = other, venue_order_id = %venue_order_id, "Unknown order status");
                return Err(ExchangeError::ParseError(format!(
                    "Unknown order status '{}' for {}",
                    other, venue_order_id
                )));
            }
        };

        Ok(VenueOrderUpdate {
            venue_order_id,
            client_order_id: self.cl_ord_id,
            user_ref: self.userref.filter(|r| *r != 0),
            status,
            filled_volume: filled,
            average_price,
            trades: self.trades,
            description: self.descr.and_then(|d| d.order),
        })
    }
}

fn into_updates(orders: BTreeMap<String, KrakenOrderInfo>) -> ExchangeResult<VenueResponse> {
    let orders = orders
        .into_iter()
        .map(|(id, info)| info.into_update(id))
        .collect::<ExchangeResult<Vec<_>>>()?;
    Ok(VenueResponse::Orders { orders })
}

/// Kraken 에러 문자열을 `ExchangeError`로 매핑합니다.
pub fn map_error(message: &str) -> ExchangeError {
    let msg = message.to_string();
    let starts = |prefix: &str| message.starts_with(prefix);

    if starts("EAPI:Rate limit exceeded")
        || starts("EOrder:Rate limit exceeded")
        || starts("EGeneral:Too many requests")
    {
        ExchangeError::RateLimited(msg)
    } else if starts("EService:") || starts("EGeneral:Temporary lockout") {
        ExchangeError::ServiceUnavailable(msg)
    } else if starts("EAPI:Invalid key") || starts("EGeneral:Permission denied") {
        ExchangeError::Unauthorized(msg)
    } else if starts("EAPI:Invalid signature") {
        ExchangeError::InvalidSignature(msg)
    } else if starts("EAPI:Invalid nonce") {
        ExchangeError::InvalidNonce(msg)
    } else if starts("EOrder:Insufficient funds") || starts("EOrder:Insufficient margin") {
        ExchangeError::InsufficientBalance(msg)
    } else if starts("EQuery:Unknown asset pair") {
        ExchangeError::UnknownPair(msg)
    } else if starts("EOrder:Unknown order") {
        ExchangeError::OrderNotFound(msg)
    } else if starts("EOrder:") || starts("EGeneral:Invalid arguments") {
        ExchangeError::OrderRejected(msg)
    } else {
        let code = message.split(':').next().unwrap_or_default().to_string();
        ExchangeError::ApiError { code, message: msg }
    }
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// 응답 본문을 요청 종류에 맞는 `VenueResponse`로 디코딩합니다.
pub fn decode_response(request: &VenueRequest, body: &str) -> ExchangeResult<VenueResponse> {
    let envelope: KrakenEnvelope = serde_json::from_str(body)?;
    if let Some(first) = envelope.error.first() {
        return Err(map_error(first));
    }
    let result = envelope
        .result
        .ok_or_else(|| ExchangeError::ParseError("Missing 'result' field".to_string()))?;

    let response = match request {
        VenueRequest::AddOrder(_) => {
            let parsed: AddOrderResult = serde_json::from_value(result)?;
            VenueResponse::Order(OrderAck {
                accepted: true,
                venue_order_id: parsed.txid.into_iter().next(),
                description: parsed.descr.and_then(|d| d.order),
                error: None,
            })
        }
        VenueRequest::CancelOrder(_) | VenueRequest::CancelAll => {
            let parsed: CancelResult = serde_json::from_value(result)?;
            VenueResponse::Canceled {
                count: parsed.count,
            }
        }
        VenueRequest::CancelAllAfter { .. } => {
            let parsed: CancelAfterResult = serde_json::from_value(result)?;
            VenueResponse::CancelAllAfter {
                current_time: parse_time(parsed.current_time),
                trigger_time: parse_time(parsed.trigger_time),
            }
        }
        VenueRequest::QueryOrders { .. } => into_updates(serde_json::from_value(result)?)?,
        VenueRequest::OpenOrders(_) => {
            into_updates(serde_json::from_value::<OpenOrdersResult>(result)?.open)?
        }
        VenueRequest::ClosedOrders { .. } => {
            into_updates(serde_json::from_value::<ClosedOrdersResult>(result)?.closed)?
        }
    };
    Ok(response)
}

// ============================================================================
// HTTP 전송
// ============================================================================

/// reqwest 기반 Kraken 전송 계층.
pub struct KrakenHttpTransport {
    client: Client,
    base_url: String,
}

impl KrakenHttpTransport {
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> ExchangeResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &VenueConfig) -> ExchangeResult<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }
}

#[async_trait]
impl Transport for KrakenHttpTransport {
    fn name(&self) -> &str {
        "kraken"
    }

    async fn send(&self, signed: &SignedRequest) -> ExchangeResult<VenueResponse> {
        let url = format!("{}{}", self.base_url, signed.path);
        debug!(path = %signed.path, nonce = signed.nonce, "POST (signed)");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(signed.body.clone());
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited(format!("HTTP {}", status)));
        }
        if status.is_server_error() {
            return Err(ExchangeError::ServiceUnavailable(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            // Kraken은 4xx에도 에러 봉투를 돌려주는 경우가 있습니다.
            return match decode_response(&signed.request, &body) {
                Err(err) => Err(err),
                Ok(_) => Err(ExchangeError::ApiError {
                    code: status.as_u16().to_string(),
                    message: body,
                }),
            };
        }

        decode_response(&signed.request, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use trader_core::{ConditionalClose, Leverage, OrderFlag, OrderKind, Side, TimeInForce};

    const DOC_SECRET: &str =
        "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";

    fn order() -> NormalizedOrder {
        NormalizedOrder {
            pair: "XBTUSD".to_string(),
            side: Side::Buy,
            kind: OrderKind::Limit { price: dec!(37500) },
            volume: dec!(1.25),
            leverage: None,
            flags: BTreeSet::new(),
            trigger: None,
            start_time: None,
            expire_time: None,
            deadline: None,
            time_in_force: None,
            reduce_only: false,
            validate_only: false,
            user_ref: None,
            client_order_id: None,
            close: None,
        }
    }

    #[test]
    fn test_signature_reference_vector() {
        let signature = sign_payload(
            DOC_SECRET,
            "/0/private/AddOrder",
            1616492376594,
            "nonce=1616492376594&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25",
        )
        .unwrap();

        assert_eq!(
            signature,
            "4/dpxb3iT4tp/ZCVEwSnEsLxx0bqyhLpdfOpc6fn7OR8+UClSV5n9E6aSS8MPtnRfp32bAb0nmbRn6H8ndwLUQ=="
        );
    }

    #[test]
    fn test_nonce_strictly_increasing() {
        let nonces = NonceGenerator::new();
        let mut last = 0;
        for _ in 0..1000 {
            let next = nonces.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_credentials_reject_bad_secret() {
        assert!(matches!(
            KrakenCredentials::new("key", "not base64!!"),
            Err(ExchangeError::SigningError(_))
        ));
        let creds = KrakenCredentials::new("abcdefghijklmnop", DOC_SECRET).unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("abcd***mnop"));
        assert!(!debug.contains(DOC_SECRET));
    }

    #[test]
    fn test_encode_add_order_full() {
        let mut order = order();
        order.kind = OrderKind::StopLossLimit {
            trigger_price: dec!(30000),
            limit_price: dec!(29900.50),
        };
        order.leverage = Some("3:1".parse::<Leverage>().unwrap());
        order.flags = [OrderFlag::PostOnly, OrderFlag::FeeInQuote].into_iter().collect();
        order.time_in_force = Some(TimeInForce::GTC);
        order.client_order_id = Some("bot-1".to_string());
        order.close = Some(ConditionalClose {
            kind: OrderKind::TakeProfit {
                trigger_price: dec!(40000),
            },
        });

        let (path, params) = encode_request(&VenueRequest::AddOrder(order));
        assert_eq!(path, ADD_ORDER_PATH);

        let body = form_body(42, &params);
        assert!(body.starts_with("nonce=42&pair=XBTUSD&type=buy&ordertype=stop-loss-limit"));
        assert!(body.contains("price=30000&price2=29900.5"));
        assert!(body.contains("leverage=3%3A1"));
        assert!(body.contains("oflags=post%2Cfciq"));
        assert!(body.contains("cl_ord_id=bot-1"));
        assert!(body.contains("close%5Bordertype%5D=take-profit&close%5Bprice%5D=40000"));
    }

    #[test]
    fn test_encode_cancel_and_query() {
        let (path, params) =
            encode_request(&VenueRequest::CancelOrder(CancelTarget::ClientOrderId("c-1".into())));
        assert_eq!(path, CANCEL_ORDER_PATH);
        assert_eq!(params, vec![("cl_ord_id", "c-1".to_string())]);

        let (path, params) = encode_request(&VenueRequest::QueryOrders {
            venue_order_ids: vec!["A".into(), "B".into()],
            include_trades: true,
        });
        assert_eq!(path, QUERY_ORDERS_PATH);
        assert_eq!(
            params,
            vec![("trades", "true".to_string()), ("txid", "A,B".to_string())]
        );
    }

    #[test]
    fn test_encode_trailing_offsets_are_signed() {
        let mut order = order();
        order.kind = OrderKind::TrailingStop { offset: dec!(50) };
        let (_, params) = encode_request(&VenueRequest::AddOrder(order.clone()));
        assert!(params.contains(&("price", "+50".to_string())));

        order.kind = OrderKind::TrailingStopLimit {
            offset: dec!(50),
            limit_offset: dec!(12.5),
        };
        let (_, params) = encode_request(&VenueRequest::AddOrder(order.clone()));
        assert!(params.contains(&("price", "+50".to_string())));
        assert!(params.contains(&("price2", "+12.5".to_string())));

        order.kind = OrderKind::Limit { price: dec!(37500) };
        order.close = Some(ConditionalClose {
            kind: OrderKind::TrailingStop { offset: dec!(80) },
        });
        let (_, params) = encode_request(&VenueRequest::AddOrder(order));
        assert!(params.contains(&("price", "37500".to_string())));
        assert!(params.contains(&("close[price]", "+80".to_string())));
    }

    #[test]
    fn test_encode_deadline_rfc3339() {
        let mut order = order();
        order.deadline = Some(
            DateTime::parse_from_rfc3339("2026-10-19T12:00:05Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let (_, params) = encode_request(&VenueRequest::AddOrder(order));
        assert!(params.contains(&("deadline", "2026-10-19T12:00:05.000Z".to_string())));
    }

    #[test]
    fn test_encode_order_lists() {
        let (path, params) =
            encode_request(&VenueRequest::OpenOrders(OrderListFilter::by_client_id("c-1")));
        assert_eq!(path, OPEN_ORDERS_PATH);
        assert_eq!(params, vec![("cl_ord_id", "c-1".to_string())]);

        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (path, params) = encode_request(&VenueRequest::ClosedOrders {
            filter: OrderListFilter::by_user_ref(7).with_trades(),
            start: Some(start),
            end: None,
        });
        assert_eq!(path, CLOSED_ORDERS_PATH);
        assert_eq!(
            params,
            vec![
                ("trades", "true".to_string()),
                ("userref", "7".to_string()),
                ("start", "1700000000".to_string()),
                ("closetime", "both".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_order_lists() {
        let open = r#"{"error":[],"result":{"open":{
            "OOPEN-1":{"status":"open","vol":"1","vol_exec":"0","price":"0","cl_ord_id":"c-1"}
        }}}"#;
        let request = VenueRequest::OpenOrders(OrderListFilter::by_client_id("c-1"));
        let VenueResponse::Orders { orders } = decode_response(&request, open).unwrap() else {
            panic!("expected orders");
        };
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].venue_order_id, "OOPEN-1");
        assert_eq!(orders[0].status, OrderStatusType::Open);

        let closed = r#"{"error":[],"result":{"count":1,"closed":{
            "OCLOSED-1":{"status":"closed","vol":"1","vol_exec":"1","price":"35000","cl_ord_id":"c-1"}
        }}}"#;
        let request = VenueRequest::ClosedOrders {
            filter: OrderListFilter::by_client_id("c-1"),
            start: None,
            end: None,
        };
        let VenueResponse::Orders { orders } = decode_response(&request, closed).unwrap() else {
            panic!("expected orders");
        };
        assert_eq!(orders[0].status, OrderStatusType::Filled);
        assert_eq!(orders[0].average_price, Some(dec!(35000)));
    }

    #[test]
    fn test_decode_unknown_status_is_parse_error() {
        let body = r#"{"error":[],"result":{
            "OODD-1":{"status":"suspended","vol":"1","vol_exec":"0","price":"0"}
        }}"#;
        let request = VenueRequest::QueryOrders {
            venue_order_ids: vec!["OODD-1".into()],
            include_trades: false,
        };
        assert!(matches!(
            decode_response(&request, body),
            Err(ExchangeError::ParseError(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        use trader_core::ErrorClass::*;
        let cases = [
            ("EAPI:Rate limit exceeded", Transient),
            ("EService:Unavailable", Transient),
            ("EService:Busy", Transient),
            ("EAPI:Invalid key", Fatal),
            ("EAPI:Invalid signature", Fatal),
            ("EAPI:Invalid nonce", Fatal),
            ("EGeneral:Permission denied", Fatal),
            ("EOrder:Insufficient funds", Rejected),
            ("EQuery:Unknown asset pair", Rejected),
            ("EGeneral:Invalid arguments:volume", Rejected),
            ("EOrder:Order minimum not met", Rejected),
        ];
        for (message, class) in cases {
            assert_eq!(map_error(message).classify(), class, "{}", message);
        }
    }

    #[test]
    fn test_decode_query_orders() {
        let body = r#"{"error":[],"result":{
            "OABC-1":{"status":"open","vol":"2","vol_exec":"0.5","price":"35010.0","userref":0,
                      "cl_ord_id":"bot-1","descr":{"order":"buy 2 XBTUSD @ limit 35000"},"trades":["T1"]},
            "OABC-2":{"status":"canceled","vol":"1","vol_exec":"0","price":"0","userref":7}
        }}"#;
        let request = VenueRequest::QueryOrders {
            venue_order_ids: vec!["OABC-1".into(), "OABC-2".into()],
            include_trades: true,
        };
        let VenueResponse::Orders { orders } = decode_response(&request, body).unwrap() else {
            panic!("expected orders");
        };
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatusType::PartiallyFilled);
        assert_eq!(orders[0].filled_volume, dec!(0.5));
        assert_eq!(orders[0].client_order_id.as_deref(), Some("bot-1"));
        assert_eq!(orders[0].user_ref, None);
        assert_eq!(orders[1].status, OrderStatusType::Canceled);
        assert_eq!(orders[1].average_price, None);
        assert_eq!(orders[1].user_ref, Some(7));
    }

    #[tokio::test]
    async fn test_http_add_order_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", ADD_ORDER_PATH)
            .match_header("API-Key", "abcdefghijklmnop")
            .match_header("API-Sign", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error":[],"result":{"descr":{"order":"buy 1.25 XBTUSD @ limit 37500"},"txid":["OUF4EM-FRGI2-MQMWZD"]}}"#)
            .create_async()
            .await;

        let signer = KrakenSigner::new(KrakenCredentials::new("abcdefghijklmnop", DOC_SECRET).unwrap());
        let transport =
            KrakenHttpTransport::new(server.url(), std::time::Duration::from_secs(5)).unwrap();

        let signed = signer.sign(&VenueRequest::AddOrder(order())).await.unwrap();
        assert!(signed.header("api-sign").is_some());
        let response = transport.send(&signed).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            response,
            VenueResponse::Order(OrderAck {
                accepted: true,
                venue_order_id: Some("OUF4EM-FRGI2-MQMWZD".to_string()),
                description: Some("buy 1.25 XBTUSD @ limit 37500".to_string()),
                error: None,
            })
        );
    }

    #[tokio::test]
    async fn test_http_error_classes() {
        let mut server = mockito::Server::new_async().await;
        let _unavailable = server
            .mock("POST", CANCEL_ALL_PATH)
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;
        let _invalid_key = server
            .mock("POST", CANCEL_ALL_AFTER_PATH)
            .with_status(200)
            .with_body(r#"{"error":["EAPI:Invalid key"]}"#)
            .create_async()
            .await;

        let signer = KrakenSigner::new(KrakenCredentials::new("abcdefghijklmnop", DOC_SECRET).unwrap());
        let transport =
            KrakenHttpTransport::new(server.url(), std::time::Duration::from_secs(5)).unwrap();

        let signed = signer.sign(&VenueRequest::CancelAll).await.unwrap();
        assert!(matches!(
            transport.send(&signed).await,
            Err(ExchangeError::ServiceUnavailable(_))
        ));

        let signed = signer
            .sign(&VenueRequest::CancelAllAfter { timeout_secs: 60 })
            .await
            .unwrap();
        assert!(matches!(
            transport.send(&signed).await,
            Err(ExchangeError::Unauthorized(_))
        ));
    }
}
