//! 스코프 (child logger) -- bound context 트리 노드
//!
//! [`Scope`]는 생성 시점에 고정된 부모 context를 `Arc`로 들고(읽기 전용),
//! 자신만의 추가 binding을 가집니다. 자식을 만든 뒤 부모에 추가한 binding은
//! 자식에게 전달되지 않습니다. 레지스트리 없이 호출자가 소유하며,
//! 참조가 사라지면 함께 해제됩니다.
//!
//! 레코드는 생성 시점의 context 스냅샷을 가지므로, 이후 binding을 변경해도
//! 이미 생성된 레코드에는 영향이 없습니다.

use std::sync::Arc;

use crate::clock::Clock;
use crate::record::{Attachment, Fields, LogRecord};
use crate::types::Level;

/// bound context를 가진 로깅 스코프
#[derive(Debug, Clone, Default)]
pub struct Scope {
    name: String,
    inherited: Arc<Fields>,
    bindings: Fields,
}

impl Scope {
    /// 루트 스코프를 생성합니다.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherited: Arc::new(Fields::new()),
            bindings: Fields::new(),
        }
    }

    /// 자식 스코프를 생성합니다.
    ///
    /// 자식은 호출 시점의 context 스냅샷을 상속하며, 이름은 `parent:child` 형식입니다.
    /// 자식을 clone하면 같은 스냅샷을 공유합니다.
    pub fn child(&self, name: &str, bindings: Fields) -> Self {
        let name = if self.name.is_empty() {
            name.to_owned()
        } else {
            format!("{}:{name}", self.name)
        };
        Self {
            name,
            inherited: Arc::new(self.context()),
            bindings,
        }
    }

    /// 스코프 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 이 스코프 자신의 binding에 값을 추가하거나 갱신합니다.
    pub fn bind(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.bindings.insert(key.into(), value.into());
    }

    /// 이 스코프 자신의 binding에서 키를 제거합니다.
    ///
    /// 상속된 키는 제거할 수 없습니다.
    pub fn unbind(&mut self, key: &str) -> Option<serde_json::Value> {
        self.bindings.remove(key)
    }

    /// 상속 context와 자신의 binding을 합친 스냅샷을 반환합니다.
    ///
    /// 같은 키가 있으면 자식 binding이 우선합니다.
    pub fn context(&self) -> Fields {
        let mut merged = (*self.inherited).clone();
        for (key, value) in &self.bindings {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// 이 스코프의 context가 스냅샷된 레코드를 생성합니다.
    pub fn record(
        &self,
        clock: &dyn Clock,
        level: Level,
        message: impl Into<String>,
        attachment: impl Into<Attachment>,
    ) -> LogRecord {
        LogRecord::new(level, message, clock.now_millis())
            .with_bound_context(self.context())
            .with_attachment(attachment)
    }
}
