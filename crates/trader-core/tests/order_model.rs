//! 주문 모델 및 설정 통합 테스트.

use proptest::prelude::*;
use rust_decimal::Decimal;
use trader_core::{normalize_pair, Amount, AppConfig, Leverage, OrderStatusType, VenueMode};

const ALL_STATUSES: [OrderStatusType; 10] = [
    OrderStatusType::Created,
    OrderStatusType::Validated,
    OrderStatusType::Submitted,
    OrderStatusType::Accepted,
    OrderStatusType::Open,
    OrderStatusType::PartiallyFilled,
    OrderStatusType::Filled,
    OrderStatusType::Canceled,
    OrderStatusType::Expired,
    OrderStatusType::Rejected,
];

#[test]
fn test_terminal_states_have_no_successors() {
    for from in ALL_STATUSES.iter().filter(|s| s.is_final()) {
        for to in ALL_STATUSES {
            assert!(!from.can_transition_to(to), "{} -> {}", from, to);
        }
    }
}

#[test]
fn test_cancelable_states_are_active() {
    for status in ALL_STATUSES {
        if status.is_cancelable() {
            assert!(status.is_active(), "{}", status);
            assert!(status.can_transition_to(OrderStatusType::Canceled));
        }
    }
}

#[test]
fn test_default_config_file_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
    let config = AppConfig::load(path).unwrap();

    assert_eq!(config.venue.mode, VenueMode::Simulated);
    assert_eq!(config.venue.name, "kraken");
    assert!(config.retry.max_attempts >= 1);
    assert_eq!(config.retry.unsafe_max_attempts, 1);
    assert_eq!(config.dead_mans_switch.max_timeout_secs, 86_400);
}

proptest! {
    #[test]
    fn prop_amount_parses_plain_decimals(mantissa in any::<i64>(), scale in 0u32..10) {
        let value = Decimal::new(mantissa, scale);
        prop_assert_eq!(Amount::parse(&value.to_string()), Amount::Value(value));
    }

    #[test]
    fn prop_amount_percent_suffix(mantissa in 0i64..100_000, scale in 0u32..4) {
        let value = Decimal::new(mantissa, scale);
        prop_assert_eq!(Amount::parse(&format!("+{}%", value)), Amount::Percent(value));
        prop_assert_eq!(Amount::parse(&format!("{}%", value)), Amount::Percent(value));
    }

    #[test]
    fn prop_leverage_accepts_only_n_to_one(ratio in 1u32..1000) {
        let leverage: Leverage = format!("{}:1", ratio).parse().unwrap();
        prop_assert_eq!(leverage.ratio(), ratio);
        prop_assert_eq!(leverage.to_string(), format!("{}:1", ratio));

        let wrong_denominator = format!("{}:2", ratio);
        let leading_zero = format!("0{}:1", ratio);
        prop_assert!(wrong_denominator.parse::<Leverage>().is_err());
        prop_assert!(leading_zero.parse::<Leverage>().is_err());
        prop_assert!(ratio.to_string().parse::<Leverage>().is_err());
    }

    #[test]
    fn prop_normalize_pair_idempotent(pair in "[ a-zA-Z/]{0,12}") {
        let once = normalize_pair(&pair);
        prop_assert_eq!(normalize_pair(&once), once);
    }
}
