//! 로그 레코드 -- 파이프라인을 흐르는 기본 단위
//!
//! [`LogRecord`]는 생성 시점에 ID와 타임스탬프가 결정되며, 메시지는 변경할 수 없습니다.
//! 미들웨어는 `meta`, `correlation_id`, `error`를 수정할 수 있지만,
//! 체인을 빠져나간 뒤에는 `Arc<LogRecord>`로 공유되어 읽기 전용이 됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Level;

/// 키-값 페이로드 (meta, bound context 공용)
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// 구조화된 에러 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// 에러 메시지
    pub message: String,
    /// 스택 트레이스
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// 에러 코드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// 에러 타입명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ErrorInfo {
    /// 메시지만 가진 에러 정보를 생성합니다.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// 스택 트레이스를 설정합니다.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// 에러 코드를 설정합니다.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// 에러 타입명을 설정합니다.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `std::error::Error`에서 에러 정보를 만듭니다.
    ///
    /// `source()` 체인은 스택 대신 줄 단위로 이어 붙입니다.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
            code: None,
            name: None,
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// 로그 호출에 붙는 부가 정보
///
/// 호출 지점은 필드 페이로드 또는 명시적 에러 중 하나를 전달합니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Attachment {
    /// 부가 정보 없음
    #[default]
    None,
    /// 키-값 필드
    Meta(Fields),
    /// 구조화된 에러
    Error(ErrorInfo),
}

impl From<Fields> for Attachment {
    fn from(fields: Fields) -> Self {
        Self::Meta(fields)
    }
}

impl From<ErrorInfo> for Attachment {
    fn from(error: ErrorInfo) -> Self {
        Self::Error(error)
    }
}

impl From<()> for Attachment {
    fn from(_: ()) -> Self {
        Self::None
    }
}

/// 파이프라인을 흐르는 로그 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    id: String,
    level: Level,
    message: String,
    timestamp: u64,
    /// 미들웨어가 수정할 수 있는 키-값 페이로드
    #[serde(default)]
    pub meta: Fields,
    #[serde(default, rename = "context")]
    bound_context: Fields,
    /// 이벤트 간 상관관계 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// 구조화된 에러
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl LogRecord {
    /// 새 레코드를 생성합니다. ID는 UUID v4로 할당됩니다.
    ///
    /// `timestamp`는 주입된 [`Clock`](crate::clock::Clock)에서 읽은 밀리초 값이어야 합니다.
    pub fn new(level: Level, message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            timestamp,
            meta: Fields::new(),
            bound_context: Fields::new(),
            correlation_id: None,
            error: None,
        }
    }

    /// 부가 정보를 적용합니다.
    pub fn with_attachment(mut self, attachment: impl Into<Attachment>) -> Self {
        match attachment.into() {
            Attachment::None => {}
            Attachment::Meta(fields) => self.meta.extend(fields),
            Attachment::Error(error) => self.error = Some(error),
        }
        self
    }

    /// meta 필드를 하나 추가합니다.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// bound context를 설정합니다.
    pub fn with_bound_context(mut self, context: Fields) -> Self {
        self.bound_context = context;
        self
    }

    /// 상관관계 ID를 설정합니다.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// 에러 정보를 설정합니다.
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// 레코드 고유 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 심각도 레벨
    pub fn level(&self) -> Level {
        self.level
    }

    /// 메시지
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 논리적 이벤트 시각 (밀리초)
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// 상위 스코프에서 상속된 context
    pub fn bound_context(&self) -> &Fields {
        &self.bound_context
    }

    /// bound context에 없는 키만 `defaults`에서 채웁니다.
    ///
    /// 이미 존재하는 키는 덮어쓰지 않습니다.
    pub fn inherit_context(&mut self, defaults: &Fields) {
        for (key, value) in defaults {
            if !self.bound_context.contains_key(key) {
                self.bound_context.insert(key.clone(), value.clone());
            }
        }
    }

    /// bound context를 가변 참조로 반환합니다 (마스킹 등 체인 내부 처리용).
    pub fn bound_context_mut(&mut self) -> &mut Fields {
        &mut self.bound_context
    }

    /// meta 위에 bound context를 덮어쓴 병합 뷰를 반환합니다.
    ///
    /// bound context 키는 meta 키에 의해 가려지지 않습니다.
    pub fn merged_fields(&self) -> Fields {
        let mut merged = self.meta.clone();
        for (key, value) in &self.bound_context {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// meta 또는 bound context에서 필드를 찾습니다. bound context가 우선합니다.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.bound_context.get(key).or_else(|| self.meta.get(key))
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.level,
            self.message,
            &self.id[..8.min(self.id.len())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn new_record_has_unique_id() {
        let a = LogRecord::new(Level::INFO, "a", 0);
        let b = LogRecord::new(Level::INFO, "a", 0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn attachment_meta_extends_meta() {
        let record = LogRecord::new(Level::INFO, "hello", 5)
            .with_field("a", 1)
            .with_attachment(fields(&[("b", json!(2))]));
        assert_eq!(record.meta.get("a"), Some(&json!(1)));
        assert_eq!(record.meta.get("b"), Some(&json!(2)));
        assert!(record.error.is_none());
    }

    #[test]
    fn attachment_error_sets_error() {
        let record = LogRecord::new(Level::ERROR, "boom", 5)
            .with_attachment(ErrorInfo::new("disk full").with_code("ENOSPC"));
        let error = record.error.as_ref().unwrap();
        assert_eq!(error.message, "disk full");
        assert_eq!(error.code.as_deref(), Some("ENOSPC"));
        assert!(record.meta.is_empty());
    }

    #[test]
    fn bound_context_is_not_overwritten_by_meta() {
        let record = LogRecord::new(Level::INFO, "m", 0)
            .with_bound_context(fields(&[("service", json!("api"))]))
            .with_field("service", "leaf")
            .with_field("extra", true);
        let merged = record.merged_fields();
        assert_eq!(merged.get("service"), Some(&json!("api")));
        assert_eq!(merged.get("extra"), Some(&json!(true)));
        assert_eq!(record.meta.get("service"), Some(&json!("leaf")));
        assert_eq!(record.field("service"), Some(&json!("api")));
    }

    #[test]
    fn inherit_context_keeps_existing_keys() {
        let mut record = LogRecord::new(Level::INFO, "m", 0)
            .with_bound_context(fields(&[("env", json!("staging"))]));
        record.inherit_context(&fields(&[("env", json!("prod")), ("host", json!("h1"))]));
        assert_eq!(record.bound_context().get("env"), Some(&json!("staging")));
        assert_eq!(record.bound_context().get("host"), Some(&json!("h1")));
    }

    #[test]
    fn error_info_from_error_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::other("inner"));
        let info = ErrorInfo::from_error(&err);
        assert_eq!(info.message, "outer");
        assert_eq!(info.stack.as_deref(), Some("caused by: inner"));
    }

    #[test]
    fn serializes_context_under_its_own_key() {
        let record = LogRecord::new(Level::WARN, "slow", 42)
            .with_bound_context(fields(&[("req", json!("r-1"))]))
            .with_correlation_id("c-9");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["level"], json!(40));
        assert_eq!(value["timestamp"], json!(42));
        assert_eq!(value["context"]["req"], json!("r-1"));
        assert_eq!(value["correlation_id"], json!("c-9"));
        assert!(value.get("error").is_none());
    }
}
