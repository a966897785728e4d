//! 주문 검증기.
//!
//! `OrderRequest`를 `NormalizedOrder`로 변환하는 순수 함수입니다. 규칙은 항상
//! 같은 순서로 적용되며 첫 번째 위반에서 멈춥니다.
//!
//! 1. 거래쌍 (정규화 후 비어 있지 않음)
//! 2. 수량 (양수, 퍼센트 불가)
//! 3. 가격 (유형별 필수/금지, 양수, 퍼센트는 트레일링 유형만)
//! 4. 가격2 (지정가 트리거 유형에서만 필수)
//! 5. 아이스버그 (가격 필수)
//! 6. 포지션 정산 (가격/가격2/레버리지/조건부 청산 금지)
//! 7. 레버리지 (`N:1` 형식, 거래쌍 최대값 이하)
//! 8. 시간 (`start_time < expire_time`, GTD는 만료 시각 필수, 접수 마감은 미래)
//! 9. 클라이언트 주문 ID (1..=64자, `[A-Za-z0-9-_]`)
//! 10. 조건부 청산 (청산 가능 유형, 가격 규칙은 3–4와 동일)

use chrono::Utc;
use trader_core::{
    normalize_pair, Amount, ConditionalClose, ConditionalCloseRequest, DecimalExt,
    InstrumentCatalog, Leverage, NormalizedOrder, OrderKind, OrderRequest, OrderType, Price,
    Quantity, TimeInForce, ValidationError, ValidationResult,
};

/// 클라이언트 주문 ID 최대 길이.
pub const MAX_CLIENT_ORDER_ID_LEN: usize = 64;

/// 검증에 필요한 거래쌍 정보.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValidationContext {
    /// 최대 레버리지 (없으면 레버리지 주문 불가)
    pub max_leverage: Option<u32>,
    /// 퍼센트 트레일링 거리를 절대값으로 바꿀 기준 가격
    pub reference_price: Option<Price>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 카탈로그에서 거래쌍 정보를 조회합니다.
    pub fn for_pair(catalog: &dyn InstrumentCatalog, pair: &str) -> Self {
        Self {
            max_leverage: catalog.max_leverage(pair),
            reference_price: catalog.reference_price(pair),
        }
    }

    pub fn with_max_leverage(mut self, max_leverage: u32) -> Self {
        self.max_leverage = Some(max_leverage);
        self
    }

    pub fn with_reference_price(mut self, price: Price) -> Self {
        self.reference_price = Some(price);
        self
    }
}

/// 주문 요청을 검증하고 정규화합니다.
pub fn validate(request: &OrderRequest, ctx: &ValidationContext) -> ValidationResult<NormalizedOrder> {
    let order_type = request.order_type;

    // 1
    let pair = normalize_pair(&request.pair);
    if pair.is_empty() {
        return Err(ValidationError::new("pair", "거래쌍이 비어 있습니다"));
    }

    // 2
    let volume = resolve_volume(&request.volume)?;

    // 3, 4, 5
    let kind = resolve_kind(
        order_type,
        request.price.as_ref(),
        request.price2.as_ref(),
        ctx,
        "",
    )?;

    // 6
    if order_type == OrderType::SettlePosition {
        if request.leverage.is_some() {
            return Err(ValidationError::new(
                "leverage",
                "settle-position 주문에는 레버리지를 지정할 수 없습니다",
            ));
        }
        if request.close.is_some() {
            return Err(ValidationError::new(
                "close",
                "settle-position 주문에는 조건부 청산을 붙일 수 없습니다",
            ));
        }
    }

    // 7
    let leverage = request
        .leverage
        .as_deref()
        .map(|raw| resolve_leverage(raw, ctx))
        .transpose()?;

    // 8
    if let (Some(start), Some(expire)) = (request.start_time, request.expire_time) {
        if start >= expire {
            return Err(ValidationError::new(
                "expire_time",
                format!("만료 시각({})은 시작 시각({})보다 늦어야 합니다", expire, start),
            ));
        }
    }
    if request.time_in_force == Some(TimeInForce::GTD) && request.expire_time.is_none() {
        return Err(ValidationError::new(
            "expire_time",
            "GTD 주문에는 만료 시각이 필요합니다",
        ));
    }

    if let Some(deadline) = request.deadline {
        if deadline <= Utc::now() {
            return Err(ValidationError::new(
                "deadline",
                format!("접수 마감 시각({})이 이미 지났습니다", deadline),
            ));
        }
    }

    // 9
    if let Some(client_order_id) = &request.client_order_id {
        validate_client_order_id(client_order_id)?;
    }

    // 10
    let close = request
        .close
        .as_ref()
        .map(|close| resolve_close(close, ctx))
        .transpose()?;

    Ok(NormalizedOrder {
        pair,
        side: request.side,
        kind,
        volume,
        leverage,
        flags: request.flags.clone(),
        trigger: request.trigger,
        start_time: request.start_time,
        expire_time: request.expire_time,
        deadline: request.deadline,
        time_in_force: request.time_in_force,
        reduce_only: request.reduce_only,
        validate_only: request.validate_only,
        user_ref: request.user_ref,
        client_order_id: request.client_order_id.clone(),
        close,
    })
}

fn resolve_volume(volume: &Amount) -> ValidationResult<Quantity> {
    match volume {
        Amount::Value(v) if v.is_strictly_positive() => Ok(*v),
        Amount::Value(v) => Err(ValidationError::new(
            "volume",
            format!("수량은 0보다 커야 합니다 (입력: {})", v),
        )),
        Amount::Percent(_) => Err(ValidationError::new(
            "volume",
            "수량은 퍼센트로 지정할 수 없습니다",
        )),
        Amount::Raw(raw) => Err(ValidationError::new(
            "volume",
            format!("숫자로 해석할 수 없습니다: '{}'", raw),
        )),
    }
}

/// 가격 필드 하나를 양의 절대값으로 해석합니다.
fn resolve_amount(
    field: &str,
    amount: &Amount,
    trailing: bool,
    ctx: &ValidationContext,
) -> ValidationResult<Price> {
    match amount {
        Amount::Value(v) if v.is_strictly_positive() => Ok(*v),
        Amount::Value(v) => Err(ValidationError::new(
            field,
            format!("0보다 커야 합니다 (입력: {})", v),
        )),
        Amount::Percent(_) if !trailing => Err(ValidationError::new(
            field,
            "퍼센트 값은 트레일링 유형에서만 허용됩니다",
        )),
        Amount::Percent(pct) => {
            if !pct.is_strictly_positive() {
                return Err(ValidationError::new(
                    field,
                    format!("0보다 커야 합니다 (입력: {}%)", pct),
                ));
            }
            let reference = ctx.reference_price.ok_or_else(|| {
                ValidationError::new(field, "퍼센트 거리를 변환할 기준 가격이 없습니다")
            })?;
            let distance = pct.percent_of(reference);
            if !distance.is_strictly_positive() {
                return Err(ValidationError::new(
                    field,
                    format!("변환된 거리가 0 이하입니다 ({}% of {})", pct, reference),
                ));
            }
            Ok(distance)
        }
        Amount::Raw(raw) => Err(ValidationError::new(
            field,
            format!("숫자로 해석할 수 없습니다: '{}'", raw),
        )),
    }
}

/// 유형과 가격 필드로 `OrderKind`를 만듭니다. `prefix`는 에러 필드 이름 앞에 붙습니다.
fn resolve_kind(
    order_type: OrderType,
    price: Option<&Amount>,
    price2: Option<&Amount>,
    ctx: &ValidationContext,
    prefix: &str,
) -> ValidationResult<OrderKind> {
    let price_field = format!("{}price", prefix);
    let price2_field = format!("{}price2", prefix);
    let trailing = order_type.is_trailing();

    let price = match (order_type.requires_price(), price) {
        (true, Some(amount)) => Some(resolve_amount(&price_field, amount, trailing, ctx)?),
        (true, None) => {
            return Err(ValidationError::new(
                price_field,
                format!("{} 주문에는 가격이 필요합니다", order_type),
            ))
        }
        (false, Some(_)) => {
            return Err(ValidationError::new(
                price_field,
                format!("{} 주문에는 가격을 지정할 수 없습니다", order_type),
            ))
        }
        (false, None) => None,
    };

    let price2 = match (order_type.uses_price2(), price2) {
        (true, Some(amount)) => Some(resolve_amount(&price2_field, amount, trailing, ctx)?),
        (true, None) => {
            return Err(ValidationError::new(
                price2_field,
                format!("{} 주문에는 price2가 필요합니다", order_type),
            ))
        }
        (false, Some(_)) => {
            return Err(ValidationError::new(
                price2_field,
                format!(
                    "price2는 지정가 트리거 유형에서만 허용됩니다 ({} 주문)",
                    order_type
                ),
            ))
        }
        (false, None) => None,
    };

    let missing = || {
        ValidationError::new(
            format!("{}price", prefix),
            format!("{} 주문에는 가격이 필요합니다", order_type),
        )
    };

    let kind = match order_type {
        OrderType::Market => OrderKind::Market,
        OrderType::Limit => OrderKind::Limit {
            price: price.ok_or_else(missing)?,
        },
        // 수량은 전체 크기, 가격은 필수
        OrderType::Iceberg => OrderKind::Iceberg {
            price: price.ok_or_else(missing)?,
        },
        OrderType::StopLoss => OrderKind::StopLoss {
            trigger_price: price.ok_or_else(missing)?,
        },
        OrderType::TakeProfit => OrderKind::TakeProfit {
            trigger_price: price.ok_or_else(missing)?,
        },
        OrderType::TrailingStop => OrderKind::TrailingStop {
            offset: price.ok_or_else(missing)?,
        },
        OrderType::StopLossLimit | OrderType::TakeProfitLimit | OrderType::TrailingStopLimit => {
            let first = price.ok_or_else(missing)?;
            let second = price2.ok_or_else(|| {
                ValidationError::new(
                    format!("{}price2", prefix),
                    format!("{} 주문에는 price2가 필요합니다", order_type),
                )
            })?;
            match order_type {
                OrderType::StopLossLimit => OrderKind::StopLossLimit {
                    trigger_price: first,
                    limit_price: second,
                },
                OrderType::TakeProfitLimit => OrderKind::TakeProfitLimit {
                    trigger_price: first,
                    limit_price: second,
                },
                _ => OrderKind::TrailingStopLimit {
                    offset: first,
                    limit_offset: second,
                },
            }
        }
        OrderType::SettlePosition => OrderKind::SettlePosition,
    };

    Ok(kind)
}

fn resolve_leverage(raw: &str, ctx: &ValidationContext) -> ValidationResult<Leverage> {
    let leverage: Leverage = raw
        .parse()
        .map_err(|reason: String| ValidationError::new("leverage", reason))?;

    let max = ctx.max_leverage.ok_or_else(|| {
        ValidationError::new("leverage", "이 거래쌍은 레버리지 거래를 지원하지 않습니다")
    })?;
    if leverage.ratio() > max {
        return Err(ValidationError::new(
            "leverage",
            format!("레버리지 {}가 최대값 {}:1을 초과합니다", leverage, max),
        ));
    }
    Ok(leverage)
}

fn validate_client_order_id(id: &str) -> ValidationResult<()> {
    if id.is_empty() || id.chars().count() > MAX_CLIENT_ORDER_ID_LEN {
        return Err(ValidationError::new(
            "client_order_id",
            format!("길이는 1..={}자여야 합니다", MAX_CLIENT_ORDER_ID_LEN),
        ));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ValidationError::new(
            "client_order_id",
            format!("허용되지 않는 문자 '{}'", bad),
        ));
    }
    Ok(())
}

fn resolve_close(
    close: &ConditionalCloseRequest,
    ctx: &ValidationContext,
) -> ValidationResult<ConditionalClose> {
    if !close.order_type.is_close_eligible() {
        return Err(ValidationError::new(
            "close.order_type",
            format!("{}는 조건부 청산 유형으로 사용할 수 없습니다", close.order_type),
        ));
    }
    let kind = resolve_kind(
        close.order_type,
        close.price.as_ref(),
        close.price2.as_ref(),
        ctx,
        "close.",
    )?;
    Ok(ConditionalClose { kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use trader_core::Side;

    fn ctx() -> ValidationContext {
        ValidationContext::new()
            .with_max_leverage(5)
            .with_reference_price(dec!(40000))
    }

    #[test]
    fn test_limit_order_normalized() {
        let request = OrderRequest::limit_buy(" xbt usd ", dec!(0.001), dec!(35000.00));
        let order = validate(&request, &ctx()).unwrap();

        assert_eq!(order.pair, "XBTUSD");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.kind, OrderKind::Limit { price: dec!(35000) });
        assert_eq!(order.volume, dec!(0.001));
    }

    #[test]
    fn test_empty_pair_checked_first() {
        let request = OrderRequest::limit_buy("  ", dec!(-1), dec!(0));
        assert_eq!(validate(&request, &ctx()).unwrap_err().field, "pair");
    }

    #[test]
    fn test_volume_rules() {
        for volume in ["0", "-0.5", "abc", "5%"] {
            let request = OrderRequest::market_buy("XBTUSD", volume);
            let err = validate(&request, &ctx()).unwrap_err();
            assert_eq!(err.field, "volume", "volume {}", volume);
        }
    }

    #[test]
    fn test_price_presence_per_type() {
        let market_with_price = OrderRequest::market_sell("XBTUSD", dec!(1)).with_price(dec!(100));
        assert_eq!(validate(&market_with_price, &ctx()).unwrap_err().field, "price");

        let limit_without_price = OrderRequest::new("XBTUSD", Side::Buy, OrderType::Limit, dec!(1));
        assert_eq!(validate(&limit_without_price, &ctx()).unwrap_err().field, "price");

        let iceberg = OrderRequest::new("XBTUSD", Side::Buy, OrderType::Iceberg, dec!(10));
        assert_eq!(validate(&iceberg, &ctx()).unwrap_err().field, "price");
    }

    #[test]
    fn test_percent_only_for_trailing() {
        let limit = OrderRequest::limit_buy("XBTUSD", dec!(1), "+5%");
        let err = validate(&limit, &ctx()).unwrap_err();
        assert_eq!(err.field, "price");

        let trailing = OrderRequest::trailing_stop("XBTUSD", Side::Sell, dec!(1), "+2.5%");
        let order = validate(&trailing, &ctx()).unwrap();
        assert_eq!(order.kind, OrderKind::TrailingStop { offset: dec!(1000) });

        let no_reference = validate(&trailing, &ValidationContext::new()).unwrap_err();
        assert_eq!(no_reference.field, "price");
    }

    #[test]
    fn test_price2_rules() {
        let stop_limit = OrderRequest::new("XBTUSD", Side::Sell, OrderType::StopLossLimit, dec!(1))
            .with_price(dec!(30000));
        assert_eq!(validate(&stop_limit, &ctx()).unwrap_err().field, "price2");

        let ok = stop_limit.with_price2(dec!(29900));
        assert_eq!(
            validate(&ok, &ctx()).unwrap().kind,
            OrderKind::StopLossLimit {
                trigger_price: dec!(30000),
                limit_price: dec!(29900)
            }
        );

        let trailing_limit =
            OrderRequest::new("XBTUSD", Side::Sell, OrderType::TrailingStopLimit, dec!(1))
                .with_price("+1%")
                .with_price2("+0.5%");
        assert_eq!(
            validate(&trailing_limit, &ctx()).unwrap().kind,
            OrderKind::TrailingStopLimit {
                offset: dec!(400),
                limit_offset: dec!(200)
            }
        );
    }

    #[test]
    fn test_settle_position_restrictions() {
        let with_leverage =
            OrderRequest::settle_position("XBTUSD", Side::Sell, dec!(1)).with_leverage("2:1");
        assert_eq!(validate(&with_leverage, &ctx()).unwrap_err().field, "leverage");

        let with_price =
            OrderRequest::settle_position("XBTUSD", Side::Sell, dec!(1)).with_price(dec!(1));
        assert_eq!(validate(&with_price, &ctx()).unwrap_err().field, "price");
    }

    #[test]
    fn test_leverage_rules() {
        let base = || OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000));

        assert!(validate(&base().with_leverage("5:1"), &ctx()).is_ok());
        for bad in ["0:1", "3", "3:2", "03:1", "x:1", " 2:1 ", "2:1\n"] {
            let err = validate(&base().with_leverage(bad), &ctx()).unwrap_err();
            assert_eq!(err.field, "leverage", "leverage {}", bad);
        }

        let too_high = validate(&base().with_leverage("6:1"), &ctx()).unwrap_err();
        assert_eq!(too_high.field, "leverage");

        let unsupported =
            validate(&base().with_leverage("2:1"), &ValidationContext::new()).unwrap_err();
        assert_eq!(unsupported.field, "leverage");
    }

    #[test]
    fn test_time_rules() {
        let now = Utc::now();
        let inverted = OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000))
            .with_start_time(now + Duration::minutes(10))
            .with_expire_time(now);
        assert_eq!(validate(&inverted, &ctx()).unwrap_err().field, "expire_time");

        let gtd = OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000))
            .with_time_in_force(TimeInForce::GTD);
        assert_eq!(validate(&gtd, &ctx()).unwrap_err().field, "expire_time");

        let gtd_ok = gtd.with_expire_time(now + Duration::hours(1));
        assert!(validate(&gtd_ok, &ctx()).is_ok());

        let stale = OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000))
            .with_deadline(now - Duration::seconds(1));
        assert_eq!(validate(&stale, &ctx()).unwrap_err().field, "deadline");

        let deadline = now + Duration::seconds(30);
        let timely = OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000)).with_deadline(deadline);
        assert_eq!(validate(&timely, &ctx()).unwrap().deadline, Some(deadline));
    }

    #[test]
    fn test_client_order_id_rules() {
        let base = || OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000));

        assert!(validate(&base().with_client_id("bot_1-A"), &ctx()).is_ok());
        assert!(validate(&base().with_client_id("a".repeat(64)), &ctx()).is_ok());

        for bad in [String::new(), "a".repeat(65), "has space".to_string(), "sl/ash".to_string()] {
            let err = validate(&base().with_client_id(bad.clone()), &ctx()).unwrap_err();
            assert_eq!(err.field, "client_order_id", "id {:?}", bad);
        }
    }

    #[test]
    fn test_conditional_close_rules() {
        let base = || OrderRequest::limit_buy("XBTUSD", dec!(1), dec!(35000));

        let market_close = base().with_close(ConditionalCloseRequest::new(OrderType::Market));
        assert_eq!(
            validate(&market_close, &ctx()).unwrap_err().field,
            "close.order_type"
        );

        let missing_price = base().with_close(ConditionalCloseRequest::new(OrderType::TakeProfit));
        assert_eq!(
            validate(&missing_price, &ctx()).unwrap_err().field,
            "close.price"
        );

        let stray_price2 = base().with_close(
            ConditionalCloseRequest::new(OrderType::Limit)
                .with_price(dec!(40000))
                .with_price2(dec!(1)),
        );
        assert_eq!(
            validate(&stray_price2, &ctx()).unwrap_err().field,
            "close.price2"
        );

        let ok = base().with_close(
            ConditionalCloseRequest::new(OrderType::StopLossLimit)
                .with_price(dec!(30000))
                .with_price2(dec!(29000)),
        );
        let order = validate(&ok, &ctx()).unwrap();
        assert_eq!(
            order.close.unwrap().kind,
            OrderKind::StopLossLimit {
                trigger_price: dec!(30000),
                limit_price: dec!(29000)
            }
        );
    }

    #[test]
    fn test_fail_fast_order() {
        // 수량과 price2가 모두 잘못되면 수량이 먼저 보고됩니다.
        let request = OrderRequest::limit_buy("XBTUSD", dec!(0), dec!(35000)).with_price2(dec!(1));
        assert_eq!(validate(&request, &ctx()).unwrap_err().field, "volume");
    }
}
