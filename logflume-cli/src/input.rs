//! 표준 입력 한 줄을 로그 이벤트로 변환합니다.
//!
//! JSON 객체 줄은 `level`, `message`(또는 `msg`) 키를 읽고 나머지 키를 meta로
//! 사용합니다. 그 밖의 줄은 그대로 INFO 메시지가 됩니다.

use logflume_core::record::Fields;
use logflume_core::types::Level;
use serde_json::Value;

/// 입력 한 줄에서 얻은 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub level: Level,
    pub message: String,
    pub meta: Fields,
}

/// 한 줄을 파싱합니다. 공백뿐인 줄은 `None`입니다.
pub fn parse_line(line: &str) -> Option<InputEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(trimmed) else {
        return Some(plain(trimmed));
    };

    let level = match fields.remove("level") {
        Some(value) => match parse_level(&value) {
            Some(level) => level,
            None => {
                // 알 수 없는 레벨 값은 meta에 남겨 둠
                tracing::debug!(value = %value, "unrecognized level in input, using info");
                fields.insert("level".to_owned(), value);
                Level::INFO
            }
        },
        None => Level::INFO,
    };

    let message = match fields.remove("message").or_else(|| fields.remove("msg")) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    Some(InputEvent {
        level,
        message,
        meta: fields,
    })
}

fn plain(line: &str) -> InputEvent {
    InputEvent {
        level: Level::INFO,
        message: line.to_owned(),
        meta: Fields::new(),
    }
}

fn parse_level(value: &Value) -> Option<Level> {
    match value {
        Value::String(name) => name.parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Level::new),
        _ => None,
    }
}
