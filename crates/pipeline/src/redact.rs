//! 민감 필드 마스킹 스테이지
//!
//! 점으로 구분된 경로(`user.password`, `headers.authorization`)에 해당하는 값을
//! `meta`와 바인딩 컨텍스트 양쪽에서 [`REDACTED`]로 대체합니다.
//! 경로 중간의 배열은 각 객체 원소에 나머지 경로를 적용합니다.

use serde_json::Value;

use logflume_core::record::{Fields, LogRecord};

use crate::error::{PipelineError, StageError};
use crate::middleware::{Middleware, Next};

/// 마스킹된 값
pub const REDACTED: &str = "[REDACTED]";

/// 경로 기반 마스킹 스테이지
#[derive(Debug, Clone)]
pub struct Redactor {
    paths: Vec<Vec<String>>,
}

impl Redactor {
    /// 경로 목록으로 마스킹 스테이지를 생성합니다.
    ///
    /// 빈 경로나 빈 구간(`a..b`)이 있으면 실패합니다.
    pub fn new<I, P>(paths: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
            if path.is_empty() || segments.iter().any(String::is_empty) {
                return Err(PipelineError::config(
                    "redact_paths",
                    format!("invalid path '{path}'"),
                ));
            }
            parsed.push(segments);
        }
        Ok(Self { paths: parsed })
    }

    /// 레코드를 마스킹하고 대체한 값의 수를 반환합니다.
    pub fn redact(&self, record: &mut LogRecord) -> usize {
        let mut count = 0;
        for path in &self.paths {
            count += redact_path(&mut record.meta, path);
            count += redact_path(record.bound_context_mut(), path);
        }
        count
    }

    /// 등록된 경로 목록 (점 표기)
    pub fn paths(&self) -> Vec<String> {
        self.paths.iter().map(|p| p.join(".")).collect()
    }
}

fn redact_path(fields: &mut Fields, path: &[String]) -> usize {
    let Some((head, rest)) = path.split_first() else {
        return 0;
    };
    let Some(value) = fields.get_mut(head) else {
        return 0;
    };
    if rest.is_empty() {
        *value = Value::String(REDACTED.to_owned());
        return 1;
    }
    redact_value(value, rest)
}

fn redact_value(value: &mut Value, rest: &[String]) -> usize {
    match value {
        Value::Object(map) => redact_path(map, rest),
        Value::Array(items) => items.iter_mut().map(|item| redact_value(item, rest)).sum(),
        _ => 0,
    }
}

impl Middleware for Redactor {
    fn name(&self) -> &str {
        "redact"
    }

    fn handle(&mut self, mut record: LogRecord, next: Next<'_>) -> Result<(), StageError> {
        let replaced = self.redact(&mut record);
        if replaced > 0 {
            tracing::trace!(record_id = record.id(), replaced, "fields redacted");
        }
        next.proceed(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logflume_core::types::Level;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(Redactor::new(["user..password"]).is_err());
        assert!(Redactor::new([""]).is_err());
        assert!(Redactor::new(["ok", "also.ok"]).is_ok());
    }

    #[test]
    fn masks_top_level_and_nested_meta() {
        let redactor = Redactor::new(["password", "user.token"]).unwrap();
        let mut record = LogRecord::new(Level::INFO, "login", 0)
            .with_attachment(fields(json!({
                "password": "hunter2",
                "user": {"name": "kim", "token": "abc"}
            })));

        assert_eq!(redactor.redact(&mut record), 2);
        assert_eq!(record.meta["password"], json!(REDACTED));
        assert_eq!(record.meta["user"]["token"], json!(REDACTED));
        assert_eq!(record.meta["user"]["name"], json!("kim"));
    }

    #[test]
    fn masks_bound_context() {
        let redactor = Redactor::new(["session"]).unwrap();
        let mut record = LogRecord::new(Level::INFO, "x", 0)
            .with_bound_context(fields(json!({"session": "s-1", "tenant": "acme"})));

        redactor.redact(&mut record);
        assert_eq!(record.bound_context()["session"], json!(REDACTED));
        assert_eq!(record.bound_context()["tenant"], json!("acme"));
    }

    #[test]
    fn descends_into_arrays_of_objects() {
        let redactor = Redactor::new(["cards.number"]).unwrap();
        let mut record = LogRecord::new(Level::INFO, "pay", 0).with_attachment(fields(json!({
            "cards": [{"number": "4111"}, {"number": "5500"}, "not-an-object"]
        })));

        assert_eq!(redactor.redact(&mut record), 2);
        assert_eq!(record.meta["cards"][1]["number"], json!(REDACTED));
        assert_eq!(record.meta["cards"][2], json!("not-an-object"));
    }

    #[test]
    fn missing_paths_are_ignored() {
        let redactor = Redactor::new(["a.b.c"]).unwrap();
        let mut record =
            LogRecord::new(Level::INFO, "x", 0).with_attachment(fields(json!({"a": {"b": 1}})));
        assert_eq!(redactor.redact(&mut record), 0);
        assert_eq!(record.meta["a"]["b"], json!(1));
    }

    #[test]
    fn paths_round_trip_to_dot_notation() {
        let redactor = Redactor::new(["a.b", "c"]).unwrap();
        assert_eq!(redactor.paths(), vec!["a.b", "c"]);
    }
}
