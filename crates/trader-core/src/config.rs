//! 설정 관리.
//!
//! TOML 파일을 읽은 뒤 `TRADER__` 접두사 환경 변수로 덮어씁니다
//! (예: `TRADER__RETRY__MAX_ATTEMPTS=5`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 거래소 연결 설정
    pub venue: VenueConfig,
    /// 재시도 정책
    pub retry: RetryConfig,
    /// 데드맨 스위치 설정
    pub dead_mans_switch: DeadMansSwitchConfig,
    /// 거래쌍별 설정 (키: 거래쌍)
    pub instruments: HashMap<String, InstrumentConfig>,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 거래소 연결 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueMode {
    /// 메모리 시뮬레이션 거래소 (모의 세션)
    #[default]
    Simulated,
    /// 실제 REST API
    Live,
}

/// 거래소 연결 설정.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VenueConfig {
    /// 거래소 이름
    pub name: String,
    /// 연결 방식
    pub mode: VenueMode,
    /// REST API 기본 URL
    pub base_url: String,
    /// API 키
    pub api_key: String,
    /// API 시크릿 (base64)
    pub api_secret: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: "kraken".to_string(),
            mode: VenueMode::Simulated,
            base_url: "https://api.kraken.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            timeout_secs: 30,
        }
    }
}

impl VenueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for VenueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueConfig")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("api_key", &mask_key(&self.api_key))
            .field("api_secret", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// API 키를 앞뒤 4자만 남기고 가립니다 (`abcd***wxyz`).
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

/// 재시도 정책 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 멱등 요청의 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 멱등이 아닌 요청의 최대 시도 횟수
    pub unsafe_max_attempts: u32,
    /// 첫 재시도 대기 (밀리초)
    pub base_delay_ms: u64,
    /// 최대 대기 (밀리초)
    pub max_delay_ms: u64,
    /// 지터 비율 (0.0 ~ 1.0)
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unsafe_max_attempts: 1,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_fraction: 0.1,
        }
    }
}

/// 데드맨 스위치 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadMansSwitchConfig {
    /// 거래소 측 cancel-all-after에도 타임아웃을 반영할지 여부
    pub mirror_to_venue: bool,
    /// 허용하는 최대 타임아웃 (초)
    pub max_timeout_secs: u64,
}

impl Default for DeadMansSwitchConfig {
    fn default() -> Self {
        Self {
            mirror_to_venue: false,
            max_timeout_secs: 86_400,
        }
    }
}

/// 거래쌍 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// 최대 레버리지 (없으면 레버리지 주문 거부)
    pub max_leverage: Option<u32>,
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::env_source())
            .build()?
            .try_deserialize()
    }

    /// TOML 문자열과 환경 변수에서 설정을 로드합니다.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .add_source(Self::env_source())
            .build()?
            .try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    fn env_source() -> config::Environment {
        config::Environment::with_prefix("TRADER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    /// 설정된 최대 레버리지 목록 (거래쌍, 비율). 키 대소문자는 보존되지 않을 수 있습니다.
    pub fn leverage_limits(&self) -> impl Iterator<Item = (&str, u32)> {
        self.instruments
            .iter()
            .filter_map(|(pair, cfg)| cfg.max_leverage.map(|max| (pair.as_str(), max)))
    }
}
