//! 도메인 타입 -- 심각도 레벨과 스택 트레이스 정책
//!
//! [`Level`]은 정수 기반 심각도이며, 값이 클수록 심각합니다.
//! 임계값으로 [`Level::SILENT`]를 사용하면 모든 출력이 비활성화됩니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 로그 심각도 레벨
///
/// 표준 레벨은 `TRACE(10) < DEBUG(20) < INFO(30) < WARN(40) < ERROR(50) < FATAL(60)`
/// 순서이며, 임의의 정수 레벨도 허용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u32);

impl Level {
    /// 추적용 상세 로그
    pub const TRACE: Level = Level(10);
    /// 디버그 로그
    pub const DEBUG: Level = Level(20);
    /// 일반 정보
    pub const INFO: Level = Level(30);
    /// 경고
    pub const WARN: Level = Level(40);
    /// 에러
    pub const ERROR: Level = Level(50);
    /// 치명적 에러
    pub const FATAL: Level = Level(60);
    /// 임계값 전용 sentinel -- 어떤 레코드도 통과시키지 않습니다.
    pub const SILENT: Level = Level(u32::MAX);

    /// 정수 값으로 레벨을 생성합니다.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// 레벨의 정수 값을 반환합니다.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// 표준 레벨이면 이름을 반환합니다.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::TRACE => Some("trace"),
            Self::DEBUG => Some("debug"),
            Self::INFO => Some("info"),
            Self::WARN => Some("warn"),
            Self::ERROR => Some("error"),
            Self::FATAL => Some("fatal"),
            Self::SILENT => Some("silent"),
            _ => None,
        }
    }

    /// 이 레벨을 임계값으로 사용할 때 `record_level`을 통과시키는지 확인합니다.
    pub fn admits(self, record_level: Level) -> bool {
        self != Self::SILENT && self <= record_level
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::INFO
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::TRACE),
            "debug" => Ok(Self::DEBUG),
            "info" => Ok(Self::INFO),
            "warn" | "warning" => Ok(Self::WARN),
            "error" => Ok(Self::ERROR),
            "fatal" => Ok(Self::FATAL),
            "silent" => Ok(Self::SILENT),
            other => other
                .parse::<u32>()
                .map(Self)
                .map_err(|_| format!("unknown level '{other}'")),
        }
    }
}

// 설정 파일에서는 "info" 같은 이름과 30 같은 정수를 모두 허용합니다.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(u32),
    Name(String),
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match LevelRepr::deserialize(deserializer)? {
            LevelRepr::Number(n) => Ok(Self(n)),
            LevelRepr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// 에러 스택 트레이스 포함 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackTracePolicy {
    /// 스택을 항상 제거
    Never,
    /// 스택을 항상 유지 (기본값)
    #[default]
    Always,
    /// 지정 레벨 이상에서만 유지
    FromLevel(Level),
}

impl StackTracePolicy {
    /// 주어진 레벨의 레코드가 스택을 유지해야 하는지 확인합니다.
    pub fn keeps_stack(self, level: Level) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::FromLevel(min) => min <= level,
        }
    }
}
