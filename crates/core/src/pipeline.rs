//! 파이프라인 trait -- 출력 대상(Sink) 확장 포인트 정의

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::SinkError;
use crate::record::LogRecord;
use crate::types::Level;

/// `dyn` 호환 trait에서 사용하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 완성된 로그 레코드를 받는 출력 대상
///
/// 새로운 출력 대상(콘솔, 파일, 네트워크 등)을 지원하려면 이 trait을 구현합니다.
/// 엔진은 sink마다 전용 태스크를 두고 `deliver`를 순서대로 호출하므로,
/// 한 sink 안에서의 전달 순서는 `emit` 호출 순서와 같습니다.
///
/// # 구현 예시
/// ```ignore
/// struct Stdout;
///
/// impl Sink for Stdout {
///     fn name(&self) -> &str { "stdout" }
///
///     fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
///         Box::pin(async move {
///             println!("{record}");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Sink: Send {
    /// 고유 이름 (런타임 추가/제거에 사용)
    fn name(&self) -> &str;

    /// 이 sink가 받는 최소 레벨. `None`이면 모든 레코드를 받습니다.
    fn level(&self) -> Option<Level> {
        None
    }

    /// 레코드를 기록하거나 기록을 예약합니다.
    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>>;

    /// 내부 버퍼를 비웁니다.
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }

    /// 자원을 해제합니다. 이후 `deliver`는 호출되지 않습니다.
    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn level(&self) -> Option<Level> {
        (**self).level()
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        (**self).deliver(record)
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        (**self).flush()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        (**self).close()
    }
}
