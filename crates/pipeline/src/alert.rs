//! 임계치 알림 -- 조건에 맞는 레코드를 누적하고 임계치 도달 시 핸들러를 호출합니다.
//!
//! [`ThresholdAlerter`]는 통과형 스테이지입니다. 레코드를 관찰만 하고 항상 다음
//! 스테이지로 전달합니다.
//!
//! # 규칙별 동작
//! 1. `when(record)`가 거짓이면 무시합니다.
//! 2. 윈도우가 설정되어 있으면 `now - entry.timestamp > window_ms`인 항목을 앞에서부터 제거합니다.
//! 3. 레코드를 누적합니다.
//! 4. 누적 수가 `threshold` 이상이고 쿨다운을 벗어났으면 누적 전체로 알림을 발생시키고
//!    누적을 비웁니다. 쿨다운에 막히면 누적을 유지합니다.
//!
//! 핸들러는 엔진 런타임에서 비동기로 실행되며 실패와 panic은 진단 채널로 보고됩니다.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use logflume_core::metrics as m;
use logflume_core::pipeline::BoxFuture;
use logflume_core::record::LogRecord;

use crate::diagnostics::{Diagnostic, FailureKind, panic_message};
use crate::error::{AlertError, PipelineError, StageError};
use crate::middleware::{Middleware, Next};

/// 발생한 알림
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// 알림 ID (UUID v4)
    pub id: String,
    /// 규칙 이름
    pub rule: String,
    /// 누적된 레코드 (관측 순서)
    pub records: Vec<LogRecord>,
    /// 발생 시각 (마지막 레코드의 타임스탬프)
    pub fired_at: u64,
}

impl Alert {
    fn new(rule: &str, records: Vec<LogRecord>, fired_at: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule: rule.to_owned(),
            records,
            fired_at,
        }
    }
}

/// 알림 핸들러
///
/// `Fn(Alert) -> impl Future<Output = Result<(), AlertError>>` 클로저와
/// `mpsc::Sender<Alert>`에 대해 구현되어 있습니다.
pub trait AlertHandler: Send + Sync {
    /// 알림을 처리합니다.
    fn on_alert(&self, alert: Alert) -> BoxFuture<'static, Result<(), AlertError>>;
}

impl<F, Fut> AlertHandler for F
where
    F: Fn(Alert) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AlertError>> + Send + 'static,
{
    fn on_alert(&self, alert: Alert) -> BoxFuture<'static, Result<(), AlertError>> {
        Box::pin(self(alert))
    }
}

impl AlertHandler for mpsc::Sender<Alert> {
    fn on_alert(&self, alert: Alert) -> BoxFuture<'static, Result<(), AlertError>> {
        let tx = self.clone();
        Box::pin(async move {
            tx.send(alert)
                .await
                .map_err(|_| AlertError::new("alert receiver dropped"))
        })
    }
}

type Predicate = Box<dyn Fn(&LogRecord) -> bool + Send>;

/// 알림 규칙
pub struct AlertRule {
    name: String,
    when: Predicate,
    handler: Arc<dyn AlertHandler>,
    threshold: usize,
    window_ms: Option<u64>,
    cooldown_ms: u64,
}

impl AlertRule {
    /// 새 규칙을 생성합니다. 기본값: threshold 1, 윈도우 없음, 쿨다운 0.
    pub fn new<W, H>(name: impl Into<String>, when: W, handler: H) -> Self
    where
        W: Fn(&LogRecord) -> bool + Send + 'static,
        H: AlertHandler + 'static,
    {
        Self {
            name: name.into(),
            when: Box::new(when),
            handler: Arc::new(handler),
            threshold: 1,
            window_ms: None,
            cooldown_ms: 0,
        }
    }

    /// 알림 발생에 필요한 누적 수
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// 누적 윈도우 (밀리초)
    pub fn window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = Some(window_ms);
        self
    }

    /// 연속 알림 사이의 최소 간격 (밀리초)
    pub fn cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// 규칙 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() {
            return Err(PipelineError::config("alert.name", "must not be empty"));
        }
        if self.threshold == 0 {
            return Err(PipelineError::config(
                format!("alert.{}.threshold", self.name),
                "must be greater than 0",
            ));
        }
        if self.window_ms == Some(0) {
            return Err(PipelineError::config(
                format!("alert.{}.window_ms", self.name),
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 규칙과 누적 상태
struct RuleState {
    rule: AlertRule,
    matched: VecDeque<LogRecord>,
    last_fired_at: Option<u64>,
}

impl RuleState {
    fn observe(&mut self, record: &LogRecord) -> Option<Alert> {
        if !(self.rule.when)(record) {
            return None;
        }
        let now = record.timestamp();

        if let Some(window) = self.rule.window_ms {
            while let Some(front) = self.matched.front()
                && now.saturating_sub(front.timestamp()) > window
            {
                self.matched.pop_front();
            }
        }

        self.matched.push_back(record.clone());
        if self.matched.len() < self.rule.threshold {
            return None;
        }

        if let Some(last) = self.last_fired_at
            && now.saturating_sub(last) < self.rule.cooldown_ms
        {
            tracing::debug!(
                rule = %self.rule.name,
                accumulated = self.matched.len(),
                "alert suppressed by cooldown"
            );
            return None;
        }

        let records: Vec<LogRecord> = self.matched.drain(..).collect();
        self.last_fired_at = Some(now);
        Some(Alert::new(&self.rule.name, records, now))
    }
}

/// 임계치 알림 스테이지
#[derive(Default)]
pub struct ThresholdAlerter {
    rules: Vec<RuleState>,
    fired: u64,
}

impl ThresholdAlerter {
    /// 규칙이 없는 알리미를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙 목록으로 알리미를 생성합니다.
    pub fn with_rules(rules: impl IntoIterator<Item = AlertRule>) -> Result<Self, PipelineError> {
        let mut alerter = Self::new();
        for rule in rules {
            alerter.add_rule(rule)?;
        }
        Ok(alerter)
    }

    /// 규칙을 추가합니다.
    pub fn add_rule(&mut self, rule: AlertRule) -> Result<(), PipelineError> {
        rule.validate()?;
        tracing::debug!(
            rule = %rule.name,
            threshold = rule.threshold,
            window_ms = ?rule.window_ms,
            cooldown_ms = rule.cooldown_ms,
            "alert rule registered"
        );
        self.rules.push(RuleState {
            rule,
            matched: VecDeque::new(),
            last_fired_at: None,
        });
        Ok(())
    }

    /// 레코드를 관찰하고 이번에 발생한 알림을 반환합니다.
    ///
    /// 핸들러는 호출하지 않습니다.
    pub fn observe(&mut self, record: &LogRecord) -> Vec<Alert> {
        let alerts: Vec<Alert> = self
            .rules
            .iter_mut()
            .filter_map(|state| state.observe(record))
            .collect();
        self.fired += alerts.len() as u64;
        alerts
    }

    /// 규칙의 현재 누적 수
    pub fn pending(&self, rule: &str) -> Option<usize> {
        self.rules
            .iter()
            .find(|state| state.rule.name == rule)
            .map(|state| state.matched.len())
    }

    /// 등록된 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 발생한 알림 총 수
    pub fn fired_count(&self) -> u64 {
        self.fired
    }
}

impl Middleware for ThresholdAlerter {
    fn name(&self) -> &str {
        "alert"
    }

    fn handle(&mut self, record: LogRecord, next: Next<'_>) -> Result<(), StageError> {
        for state in &mut self.rules {
            let Some(alert) = state.observe(&record) else {
                continue;
            };
            self.fired += 1;
            let rule = state.rule.name.clone();
            tracing::info!(
                rule = %rule,
                records = alert.records.len(),
                alert_id = %alert.id,
                "alert fired"
            );
            metrics::counter!(m::ALERTS_FIRED_TOTAL, m::LABEL_RULE => rule.clone()).increment(1);
            // 핸들러의 panic은 진단으로만 보고하고 레코드는 계속 전달
            let handler = &state.rule.handler;
            match panic::catch_unwind(AssertUnwindSafe(|| handler.on_alert(alert))) {
                Ok(task) => next
                    .context()
                    .spawn_reported(FailureKind::AlertCallback, rule, task),
                Err(payload) => next.context().diagnostics().report(Diagnostic::new(
                    FailureKind::AlertCallback,
                    rule,
                    format!("handler panicked: {}", panic_message(payload.as_ref())),
                )),
            }
        }
        next.proceed(record)
    }
}
