//! 미들웨어 체인 -- 순서가 있는 변환/필터 스테이지
//!
//! 각 스테이지는 `handle(record, next)`를 구현합니다.
//! `next.proceed(record)`를 호출하면 (수정되었을 수 있는) 레코드가 다음 스테이지로
//! 넘어가고, 호출하지 않으면 레코드는 조용히 드롭됩니다.
//!
//! # 보장
//! - 스테이지는 등록 순서대로 실행됩니다.
//! - [`Next`]는 값으로 소비되므로 `proceed`는 최대 한 번만 호출할 수 있습니다.
//! - 레코드는 값으로 이동하므로 스테이지가 체인 이후까지 가변 참조를 남길 수 없습니다.
//!
//! 스테이지는 동기 함수입니다. 비동기 부수 효과(예: 알림 전송)는
//! [`StageContext::spawn_reported`]로 엔진 런타임에 띄우고, 실패는 진단 채널로 보고됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use logflume_pipeline::middleware::{self, Chain};
//!
//! let mut chain = Chain::new();
//! chain.push(middleware::map("tenant", |record| {
//!     record.meta.insert("tenant".into(), "acme".into());
//! }));
//! chain.push(middleware::filter("no-health", |record| record.message() != "GET /health"));
//! ```

use std::fmt;
use std::future::Future;

use logflume_core::record::LogRecord;
use tokio::runtime::Handle;

use crate::diagnostics::{Diagnostic, Diagnostics, FailureKind, catch_panic};
use crate::error::StageError;

/// 미들웨어 스테이지
pub trait Middleware: Send {
    /// 스테이지 이름 (진단 보고에 사용)
    fn name(&self) -> &str;

    /// 레코드를 처리합니다.
    ///
    /// 레코드를 전달하려면 `next.proceed(record)`를 호출하고 그 결과를 반환합니다.
    /// 호출하지 않으면 레코드는 드롭됩니다.
    fn handle(&mut self, record: LogRecord, next: Next<'_>) -> Result<(), StageError>;
}

/// 스테이지가 사용할 수 있는 엔진 자원
pub struct StageContext {
    diagnostics: Diagnostics,
    runtime: Option<Handle>,
}

impl StageContext {
    /// 현재 tokio 런타임(있다면)을 사용하는 컨텍스트를 생성합니다.
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            runtime: Handle::try_current().ok(),
        }
    }

    /// 지정 런타임을 사용하는 컨텍스트를 생성합니다.
    pub fn with_runtime(diagnostics: Diagnostics, runtime: Handle) -> Self {
        Self {
            diagnostics,
            runtime: Some(runtime),
        }
    }

    /// 진단 핸들
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// 비동기 작업을 띄우고, 실패하거나 panic이 나면 진단 채널로 보고합니다.
    ///
    /// 런타임이 없으면 작업을 실행하지 않고 실패로 보고합니다.
    pub fn spawn_reported<F, E>(&self, kind: FailureKind, source: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let source = source.into();
        let Some(runtime) = &self.runtime else {
            self.diagnostics.report(Diagnostic::new(
                kind,
                source,
                "no tokio runtime available to run task",
            ));
            return;
        };
        let diagnostics = self.diagnostics.clone();
        runtime.spawn(async move {
            let message = match catch_panic(task).await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("task panicked: {panic}"),
            };
            diagnostics.report(Diagnostic::new(kind, source, message));
        });
    }
}

/// 다음 스테이지로의 연결
///
/// 값으로 소비되므로 한 번의 `handle` 호출에서 최대 한 번만 전달할 수 있습니다.
pub struct Next<'a> {
    rest: &'a mut [Box<dyn Middleware>],
    ctx: &'a StageContext,
    out: &'a mut Option<LogRecord>,
}

impl<'a> Next<'a> {
    /// 레코드를 다음 스테이지(또는 체인 출구)로 전달합니다.
    pub fn proceed(self, record: LogRecord) -> Result<(), StageError> {
        let Next { rest, ctx, out } = self;
        match rest.split_first_mut() {
            Some((stage, rest)) => stage.handle(record, Next { rest, ctx, out }),
            None => {
                *out = Some(record);
                Ok(())
            }
        }
    }

    /// 엔진 자원
    pub fn context(&self) -> &StageContext {
        self.ctx
    }
}

/// 미들웨어 체인
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Middleware>>,
}

impl Chain {
    /// 빈 체인을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 체인 끝에 스테이지를 추가합니다.
    pub fn push(&mut self, stage: impl Middleware + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// 박싱된 스테이지를 추가합니다.
    pub fn push_boxed(&mut self, stage: Box<dyn Middleware>) {
        self.stages.push(stage);
    }

    /// 스테이지 수
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// 체인이 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// 등록 순서대로 스테이지 이름을 반환합니다.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 레코드를 체인에 통과시킵니다.
    ///
    /// 마지막 스테이지까지 전달된 레코드는 `Ok(Some(record))`,
    /// 중간에 드롭된 레코드는 `Ok(None)`을 반환합니다.
    pub fn run(
        &mut self,
        record: LogRecord,
        ctx: &StageContext,
    ) -> Result<Option<LogRecord>, StageError> {
        let mut out = None;
        Next {
            rest: &mut self.stages,
            ctx,
            out: &mut out,
        }
        .proceed(record)?;
        Ok(out)
    }
}

/// 클로저 기반 스테이지
pub struct FnMiddleware<F> {
    name: String,
    f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: FnMut(LogRecord, Next<'_>) -> Result<(), StageError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, record: LogRecord, next: Next<'_>) -> Result<(), StageError> {
        (self.f)(record, next)
    }
}

/// `(record, next)` 클로저로 스테이지를 만듭니다.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnMiddleware<F>
where
    F: FnMut(LogRecord, Next<'_>) -> Result<(), StageError> + Send,
{
    FnMiddleware {
        name: name.into(),
        f,
    }
}

/// 레코드를 수정한 뒤 항상 전달하는 스테이지를 만듭니다.
pub fn map<F>(
    name: impl Into<String>,
    mut f: F,
) -> FnMiddleware<impl FnMut(LogRecord, Next<'_>) -> Result<(), StageError> + Send>
where
    F: FnMut(&mut LogRecord) + Send,
{
    from_fn(name, move |mut record: LogRecord, next: Next<'_>| {
        f(&mut record);
        next.proceed(record)
    })
}

/// 조건을 만족하는 레코드만 전달하는 스테이지를 만듭니다.
pub fn filter<F>(
    name: impl Into<String>,
    mut keep: F,
) -> FnMiddleware<impl FnMut(LogRecord, Next<'_>) -> Result<(), StageError> + Send>
where
    F: FnMut(&LogRecord) -> bool + Send,
{
    from_fn(name, move |record: LogRecord, next: Next<'_>| {
        if keep(&record) {
            next.proceed(record)
        } else {
            Ok(())
        }
    })
}
