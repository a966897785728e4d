//! 거래쌍 심볼 정규화.

/// 거래쌍 문자열을 정규화합니다: 모든 공백을 제거하고 대문자로 변환합니다.
///
/// 결과가 비어 있으면 검증 단계에서 `pair` 필드 에러가 됩니다.
pub fn normalize_pair(pair: &str) -> String {
    pair.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pair() {
        assert_eq!(normalize_pair(" xbt usd "), "XBTUSD");
        assert_eq!(normalize_pair("XBT/EUR"), "XBT/EUR");
        assert_eq!(normalize_pair(" \t "), "");
    }
}
